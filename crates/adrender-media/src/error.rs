//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use adrender_models::TimestampError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("failed to spawn encoder process: {message}")]
    SpawnFailed { message: String },

    #[error("encoder failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("encoder exited successfully but produced no output: {0}")]
    EmptyOutput(PathBuf),

    #[error("encoding timed out after {0} seconds")]
    Timeout(u64),

    #[error("download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("downloaded file from {url} is empty")]
    EmptyDownload { url: String },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] TimestampError),

    #[error("cannot build arguments: {0}")]
    ArgumentBuild(String),

    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an encoder failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an argument build error.
    pub fn argument_build(message: impl Into<String>) -> Self {
        Self::ArgumentBuild(message.into())
    }

    /// Create a security violation error.
    pub fn security_violation(message: impl Into<String>) -> Self {
        Self::SecurityViolation(message.into())
    }

    /// True for failures of a single execution attempt, the class the
    /// hardware-to-software fallback policy retries.
    pub fn is_attempt_failure(&self) -> bool {
        matches!(
            self,
            MediaError::SpawnFailed { .. }
                | MediaError::FfmpegFailed { .. }
                | MediaError::EmptyOutput(_)
                | MediaError::Timeout(_)
        )
    }

    /// Stable code for the job-record error surface.
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => "encoder_unavailable",
            MediaError::SpawnFailed { .. }
            | MediaError::FfmpegFailed { .. }
            | MediaError::EmptyOutput(_) => "process_failed",
            MediaError::Timeout(_) => "timeout",
            MediaError::DownloadFailed { .. }
            | MediaError::EmptyDownload { .. }
            | MediaError::FileNotFound(_) => "source_unavailable",
            MediaError::InvalidTimestamp(_) | MediaError::ArgumentBuild(_) => "argument_build",
            MediaError::SecurityViolation(_) => "validation",
            MediaError::InvalidVideo(_) => "source_unavailable",
            MediaError::FfprobeFailed { .. } => "probe_failed",
            MediaError::Io(_) => "io",
            MediaError::JsonParse(_) => "internal",
        }
    }
}
