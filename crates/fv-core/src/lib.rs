//! fv-core: shared types, errors, configuration, and container classification.
//!
//! This crate is the foundational dependency for all other fv-* crates,
//! providing the unified error type, the program identifier used by the
//! catalog, media container rules, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::ProgramId;
pub use media::{Container, ContainerClass, Dispatch};
