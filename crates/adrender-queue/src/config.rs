//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

use adrender_models::EncodingConfig;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Encoder binary name or path
    pub encoder_binary: PathBuf,
    /// Maximum jobs waiting in the pending list (backpressure limit)
    pub max_pending: usize,
    /// Maximum job records retained; oldest terminal records are evicted
    pub max_jobs: usize,
    /// Wall-clock ceiling for one encoding attempt
    pub attempt_timeout: Duration,
    /// Hard cap on concat output duration, seconds
    pub max_concat_duration: f64,
    /// Scratch directory for downloaded sources
    pub scratch_dir: PathBuf,
    /// Output directory for produced artifacts
    pub output_dir: PathBuf,
    /// Upload directory clients may reference local paths under
    pub upload_dir: PathBuf,
    /// Encoding parameters shared by all jobs
    pub encoding: EncodingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            encoder_binary: PathBuf::from("ffmpeg"),
            max_pending: 100,
            max_jobs: 100,
            attempt_timeout: Duration::from_secs(600),
            max_concat_duration: 120.0,
            scratch_dir: PathBuf::from("/tmp/adrender"),
            output_dir: PathBuf::from("/data/outputs"),
            upload_dir: PathBuf::from("/data/uploads"),
            encoding: EncodingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            encoder_binary: std::env::var("RENDER_ENCODER_BINARY")
                .map(PathBuf::from)
                .unwrap_or(defaults.encoder_binary),
            max_pending: std::env::var("RENDER_MAX_PENDING")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_pending),
            max_jobs: std::env::var("RENDER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_jobs),
            attempt_timeout: Duration::from_secs(
                std::env::var("RENDER_ATTEMPT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_concat_duration: std::env::var("RENDER_MAX_CONCAT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concat_duration),
            scratch_dir: std::env::var("RENDER_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            output_dir: std::env::var("RENDER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            upload_dir: std::env::var("RENDER_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            encoding: EncodingConfig::default(),
        }
    }

    /// Directories client-supplied local paths must live under.
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        vec![
            self.upload_dir.clone(),
            self.output_dir.clone(),
            self.scratch_dir.clone(),
        ]
    }
}
