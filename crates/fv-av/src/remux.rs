//! ffmpeg invocation for live remuxing to fragmented MP4.
//!
//! The output is written to stdout as a fragmented MP4 (`empty_moov` plus
//! keyframe fragments) so a browser can start playback before the process
//! finishes. Subtitles are dropped; the first video and audio streams are
//! mapped when present.

use std::path::PathBuf;

use crate::command::ToolCommand;

/// Where ffmpeg reads the source from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemuxInput {
    /// Open this path.
    Path(PathBuf),
    /// Read the already-open descriptor passed as stdin. It must be a regular
    /// file so ffmpeg can seek it.
    Stdin,
}

impl RemuxInput {
    fn as_arg(&self) -> String {
        match self {
            RemuxInput::Path(p) => p.to_string_lossy().into_owned(),
            RemuxInput::Stdin => "/dev/stdin".to_string(),
        }
    }
}

/// How the video stream is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoMode {
    Copy,
    Encode(String),
}

impl VideoMode {
    /// Copy when the codec is browser-friendly or unknown, otherwise encode
    /// with `fallback`.
    pub fn choose(codec: Option<&str>, copyable: &[String], fallback: &str) -> Self {
        match codec {
            Some(c) if !copyable.iter().any(|k| k.eq_ignore_ascii_case(c)) => {
                VideoMode::Encode(fallback.to_string())
            }
            _ => VideoMode::Copy,
        }
    }
}

/// A planned ffmpeg remux.
#[derive(Debug, Clone)]
pub struct RemuxPlan {
    input: RemuxInput,
    start_secs: f64,
    video: VideoMode,
    audio_codec: String,
    fragment_duration_us: u64,
}

impl RemuxPlan {
    pub fn new(input: RemuxInput) -> Self {
        Self {
            input,
            start_secs: 0.0,
            video: VideoMode::Copy,
            audio_codec: "aac".into(),
            fragment_duration_us: 1_000_000,
        }
    }

    /// Seek the input before decoding. Non-finite or non-positive values mean
    /// "from the start".
    pub fn start_at(mut self, secs: f64) -> Self {
        self.start_secs = if secs.is_finite() && secs > 0.0 { secs } else { 0.0 };
        self
    }

    pub fn video(mut self, mode: VideoMode) -> Self {
        self.video = mode;
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    pub fn fragment_duration_us(mut self, us: u64) -> Self {
        self.fragment_duration_us = us;
        self
    }

    pub fn start_secs(&self) -> f64 {
        self.start_secs
    }

    /// The full ffmpeg argument list.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-analyzeduration",
            "2147483647",
            "-probesize",
            "2147483647",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if self.start_secs > 0.0 {
            args.push("-ss".into());
            args.push(format!("{:.3}", self.start_secs));
        }

        args.push("-i".into());
        args.push(self.input.as_arg());
        args.extend(["-sn", "-map", "0:v?", "-map", "0:a?"].map(String::from));

        args.push("-c:v".into());
        match &self.video {
            VideoMode::Copy => args.push("copy".into()),
            VideoMode::Encode(encoder) => {
                args.push(encoder.clone());
                args.extend(["-preset", "veryfast"].map(String::from));
            }
        }

        args.push("-c:a".into());
        args.push(self.audio_codec.clone());
        args.extend(
            [
                "-movflags",
                "frag_keyframe+empty_moov+default_base_moof",
                "-frag_duration",
            ]
            .map(String::from),
        );
        args.push(self.fragment_duration_us.to_string());
        args.extend(["-f", "mp4", "pipe:1"].map(String::from));
        args
    }

    /// Build a [`ToolCommand`] for the given ffmpeg binary.
    pub fn command(&self, ffmpeg: PathBuf) -> ToolCommand {
        let mut cmd = ToolCommand::new(ffmpeg);
        cmd.args(self.args());
        cmd
    }
}
