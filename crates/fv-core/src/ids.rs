//! Catalog program identifier.
//!
//! Program ids come from broadcast guide data (`"MV001234560000"`) or plain
//! numbers, so they are kept as opaque strings and compared by their textual
//! form.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted length of a program identifier.
const MAX_PROGRAM_ID_LEN: usize = 64;

/// Identifier of a film in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProgramId(String);

impl ProgramId {
    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProgramId {
    type Err = crate::Error;

    /// Accept ASCII alphanumerics plus `-` and `_`, up to 64 characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > MAX_PROGRAM_ID_LEN {
            return Err(crate::Error::Validation("Invalid program id".into()));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(crate::Error::Validation("Invalid program id".into()));
        }
        Ok(Self(s.to_owned()))
    }
}

/// Catalog rows store the id either as a JSON string or a JSON number.
impl<'de> Deserialize<'de> for ProgramId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "program id must be a string or number, got {other}"
            ))),
        }
    }
}
