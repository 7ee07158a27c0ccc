//! Shared data models for the AdRender backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their kinds, and input specs
//! - The job status state machine and priorities
//! - Encoder selection and encoding configuration
//! - Artifacts and structured job errors
//! - Timestamp parsing utilities

pub mod encoding;
pub mod job;
pub mod kind;
pub mod timestamp;

// Re-export common types
pub use encoding::{Encoder, EncodingConfig};
pub use job::{Artifact, Job, JobError, JobId, JobStatus, Priority, LOG_TAIL_LINES};
pub use kind::{
    AudioOpts, ConcatSpec, EditSpec, ExecutionPlan, JobKind, PlanSegment, Resize, TimePoint,
    Transition, TrimWindow,
};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
