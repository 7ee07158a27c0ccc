//! FFmpeg CLI wrapper for render jobs.
//!
//! This crate provides:
//! - Argument builders per job kind (edit, timed plan, concat)
//! - A process runner with `time=` progress parsing and timeouts
//! - Source resolution (local paths and streamed HTTP downloads)
//! - Encoder availability detection
//! - Path-safety checks for client-supplied paths

pub mod args;
pub mod command;
pub mod encoders;
pub mod error;
pub mod paths;
pub mod probe;
pub mod progress;
pub mod resolve;

pub use args::{build_concat, build_simple_edit, build_timed_plan, BuiltCommand};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use encoders::{detect_encoders, find_encoder_binary, EncoderPool};
pub use error::{MediaError, MediaResult};
pub use paths::verify_allowed_path;
pub use probe::{get_duration, probe_media, MediaInfo};
pub use progress::{parse_time_marker, EncodeProgress};
pub use resolve::{classify_source, is_url_shaped, SourceRef, SourceResolver};
