//! # fv-media
//!
//! Filesystem-facing building blocks for serving films:
//!
//! - [`resolver`]: turn an untrusted file name plus a trusted base directory
//!   into an open, verified [`MediaAsset`].
//! - [`sniff`]: magic-byte content type checks against the claimed container.
//! - [`range`]: HTTP `Range` header parsing.
//! - [`sibling`]: discovery of pre-transcoded MP4 copies next to an original.
//! - [`registry`]: process-wide table of open descriptors and child
//!   processes, swept periodically for leaks.

pub mod range;
pub mod registry;
pub mod resolver;
pub mod sibling;
pub mod sniff;

pub use range::{ByteRange, RangeRequest};
pub use registry::{FdLease, FdRegistry, ResourceKind};
pub use resolver::{MediaAsset, PathResolver};
