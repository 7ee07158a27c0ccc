//! Queue error types.

use thiserror::Error;

use adrender_media::MediaError;
use adrender_models::JobError;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("queue is full (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Stable code for the job-record error surface.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::Validation(_) => "validation",
            QueueError::QueueOverflow { .. } => "queue_overflow",
            QueueError::NotFound(_) => "not_found",
            QueueError::Media(e) => e.code(),
            QueueError::Io(_) => "io",
        }
    }

    /// Convert into the structured error recorded on a failed job.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.code(), self.to_string())
    }
}
