//! Job records and lifecycle state.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encoding::Encoder;
use crate::kind::JobKind;

/// Number of log lines kept in the tail ring buffer.
pub const LOG_TAIL_LINES: usize = 200;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority. Higher weight is dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Numeric weight used for pending-list ordering.
    pub fn weight(&self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Normal => 1,
            Priority::Low => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Job state machine: `queued -> running -> done | error`.
///
/// There are no other edges. Encoder fallback happens inside a single
/// `running` episode and is not visible as a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the pending list
    #[default]
    Queued,
    /// Pipeline task is executing
    Running,
    /// Completed successfully, artifacts available
    Done,
    /// Failed, error recorded
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured error recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Stable error code (e.g. "source_unavailable", "timeout")
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Metadata for an output file produced by a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Artifact type (currently always "video")
    pub kind: String,
    /// MIME type
    pub mime: String,
    /// Absolute path on the output filesystem
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// A render job tracked through `queued -> running -> done | error`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job kind with its validated input spec
    pub kind: JobKind,

    /// Scheduling priority
    #[serde(default)]
    pub priority: Priority,

    /// Current state
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100), monotonically non-decreasing while running
    #[serde(default)]
    pub progress_percent: u8,

    /// Estimated seconds remaining, once progress is meaningful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,

    /// Exact argument vector used, recorded before spawn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<Vec<String>>,

    /// Encoder that produced the result (records whether fallback occurred)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder_used: Option<Encoder>,

    /// Outputs produced on success
    #[serde(default)]
    pub artifacts: Vec<Artifact>,

    /// Error recorded on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Scratch paths owned by this job, removed when it leaves `running`
    #[serde(default)]
    pub temp_files: Vec<PathBuf>,

    /// Bounded log tail for the polling view
    #[serde(default)]
    pub logs_tail: VecDeque<String>,

    /// Full ordered log for debugging
    #[serde(default)]
    pub full_log: Vec<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(kind: JobKind, priority: Priority) -> Self {
        Self {
            id: JobId::new(),
            kind,
            priority,
            status: JobStatus::Queued,
            progress_percent: 0,
            eta_seconds: None,
            command_line: None,
            encoder_used: None,
            artifacts: Vec::new(),
            error: None,
            temp_files: Vec::new(),
            logs_tail: VecDeque::new(),
            full_log: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Transition to `running`.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition to `done` with the produced artifacts.
    pub fn complete(&mut self, artifacts: Vec<Artifact>, encoder: Encoder) {
        self.status = JobStatus::Done;
        self.progress_percent = 100;
        self.eta_seconds = Some(0);
        self.artifacts = artifacts;
        self.encoder_used = Some(encoder);
        self.completed_at = Some(Utc::now());
    }

    /// Transition to `error`.
    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Error;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Update progress, never moving backwards and never reporting 100
    /// before the job is done.
    pub fn set_progress(&mut self, percent: u8) {
        let clamped = percent.min(99);
        if clamped > self.progress_percent {
            self.progress_percent = clamped;
        }
    }

    /// Append one log line to both the tail ring and the full log.
    pub fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.logs_tail.len() >= LOG_TAIL_LINES {
            self.logs_tail.pop_front();
        }
        self.logs_tail.push_back(line.clone());
        self.full_log.push(line);
    }

    /// Register a scratch path for unconditional cleanup.
    pub fn register_temp_file(&mut self, path: PathBuf) {
        self.temp_files.push(path);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::EditSpec;

    fn edit_job() -> Job {
        let spec = EditSpec {
            source_path: Some("/data/uploads/in.mp4".into()),
            ..Default::default()
        };
        Job::new(JobKind::SimpleEdit(spec), Priority::Normal)
    }

    #[test]
    fn test_state_transitions() {
        let mut job = edit_job();
        assert_eq!(job.status, JobStatus::Queued);

        job.start();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        job.complete(Vec::new(), Encoder::Software);
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress_percent, 100);
        assert!(job.is_terminal());
    }

    #[test]
    fn test_progress_is_monotone_and_capped() {
        let mut job = edit_job();
        job.start();

        job.set_progress(40);
        assert_eq!(job.progress_percent, 40);

        // Never moves backwards
        job.set_progress(10);
        assert_eq!(job.progress_percent, 40);

        // Never reaches 100 while running
        job.set_progress(100);
        assert_eq!(job.progress_percent, 99);
    }

    #[test]
    fn test_log_tail_is_bounded() {
        let mut job = edit_job();
        for i in 0..(LOG_TAIL_LINES + 50) {
            job.push_log(format!("line {i}"));
        }
        assert_eq!(job.logs_tail.len(), LOG_TAIL_LINES);
        assert_eq!(job.full_log.len(), LOG_TAIL_LINES + 50);
        assert_eq!(job.logs_tail.front().unwrap(), "line 50");
    }

    #[test]
    fn test_priority_weights() {
        assert!(Priority::High.weight() > Priority::Normal.weight());
        assert!(Priority::Normal.weight() > Priority::Low.weight());
    }
}
