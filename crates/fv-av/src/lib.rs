//! # fv-av
//!
//! External audio/video tooling for filmvault.
//!
//! - **Tool discovery** ([`ToolRegistry`]) finds ffmpeg and ffprobe, honouring
//!   configured overrides before falling back to `PATH`.
//! - **Command execution** ([`ToolCommand`]) runs a tool to completion with a
//!   timeout, or spawns it with piped output for streaming.
//! - **Probing** ([`FfprobeTimingProbe`]) reads a file's duration and primary
//!   video codec through the [`DurationProbe`] seam.
//! - **Remux planning** ([`RemuxPlan`]) builds the ffmpeg argument list for
//!   fragmented MP4 output on stdout.

pub mod command;
pub mod probe;
pub mod remux;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use probe::{DurationProbe, FfprobeTimingProbe, MediaTiming};
pub use remux::{RemuxInput, RemuxPlan, VideoMode};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
