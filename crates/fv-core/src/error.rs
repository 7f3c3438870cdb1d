//! Unified error type for the filmvault application.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for HTTP handlers to derive a status code via [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in filmvault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "film", "file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Caller-supplied input (file name, extension) failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A path escaped its trusted base directory.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The media type is not one we can serve.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// None of the requested byte ranges fit inside the file.
    #[error("Range not satisfiable for size {size}")]
    RangeNotSatisfiable {
        /// Size of the file in bytes.
        size: u64,
    },

    /// The catalog backend failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) failed to spawn or returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::AccessDenied(_) => 403,
            Error::UnsupportedMediaType(_) => 415,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 500,
            Error::Probe(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Classify an I/O error raised while opening `path`.
    ///
    /// Missing files become [`Error::NotFound`] and permission problems become
    /// [`Error::AccessDenied`]; everything else stays an I/O error.
    pub fn from_open(err: std::io::Error, path: impl fmt::Display) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::not_found("file", path),
            std::io::ErrorKind::PermissionDenied => {
                Error::AccessDenied(format!("permission denied opening {path}"))
            }
            _ => Error::Io { source: err },
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
