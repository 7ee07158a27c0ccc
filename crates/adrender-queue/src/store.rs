//! In-memory job store with bounded retention.
//!
//! The store is the only shared mutable structure besides the pending
//! list. Each job's pipeline is a single sequential task, so no two tasks
//! ever mutate the same job concurrently; the mutex only guards the map
//! itself.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use adrender_models::{Artifact, Encoder, Job, JobError, JobId, JobStatus, Priority};

/// Snapshot of a job returned to polling clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: String,
    pub kind: &'static str,
    pub priority: Priority,
    pub status: JobStatus,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    pub logs_tail: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    /// Convenience pointer to the first artifact's location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder_used: Option<Encoder>,
}

/// Full log view for debugging a specific job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogs {
    pub job_id: String,
    pub lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl JobView {
    fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            kind: job.kind.as_str(),
            priority: job.priority,
            status: job.status,
            progress_percent: job.progress_percent,
            eta_seconds: job.eta_seconds,
            logs_tail: job.logs_tail.iter().cloned().collect(),
            command: job.command_line.as_ref().map(|args| args.join(" ")),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            artifacts: job.artifacts.clone(),
            output_url: job
                .artifacts
                .first()
                .map(|a| a.path.display().to_string()),
            error: job.error.clone(),
            encoder_used: job.encoder_used,
        }
    }
}

struct StoreInner {
    jobs: HashMap<String, Job>,
    /// Creation order, oldest first, for eviction
    order: VecDeque<String>,
}

/// Bounded in-memory map of job id to job record.
#[derive(Clone)]
pub struct JobStore {
    inner: Arc<Mutex<StoreInner>>,
    max_jobs: usize,
}

impl JobStore {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                jobs: HashMap::new(),
                order: VecDeque::new(),
            })),
            max_jobs: max_jobs.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock only means another task panicked mid-update;
        // the map itself is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a new job, evicting the oldest terminal record when over
    /// capacity. Non-terminal jobs are never evicted: every submitted job
    /// reaches a terminal state.
    pub fn insert(&self, job: Job) {
        let mut inner = self.lock();
        let id = job.id.to_string();

        if inner.jobs.len() >= self.max_jobs {
            if let Some(pos) = inner
                .order
                .iter()
                .position(|old| inner.jobs.get(old).is_some_and(|j| j.is_terminal()))
            {
                if let Some(old) = inner.order.remove(pos) {
                    inner.jobs.remove(&old);
                    debug!("Evicted job record {}", old);
                }
            }
        }

        inner.order.push_back(id.clone());
        inner.jobs.insert(id, job);
    }

    /// Snapshot a job for polling clients.
    pub fn view(&self, id: &JobId) -> Option<JobView> {
        self.lock().jobs.get(id.as_str()).map(JobView::from_job)
    }

    /// Full logs and command line for a job.
    pub fn logs(&self, id: &JobId) -> Option<JobLogs> {
        self.lock().jobs.get(id.as_str()).map(|job| JobLogs {
            job_id: job.id.to_string(),
            lines: job.full_log.clone(),
            command: job.command_line.as_ref().map(|args| args.join(" ")),
        })
    }

    /// Mutate a job in place. Returns false if the id is unknown.
    pub fn update<F>(&self, id: &JobId, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        match self.lock().jobs.get_mut(id.as_str()) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Read a derived value from a job.
    pub fn read<F, T>(&self, id: &JobId, f: F) -> Option<T>
    where
        F: FnOnce(&Job) -> T,
    {
        self.lock().jobs.get(id.as_str()).map(f)
    }

    /// Take ownership of the job's temp file list for cleanup.
    pub fn take_temp_files(&self, id: &JobId) -> Vec<PathBuf> {
        self.lock()
            .jobs
            .get_mut(id.as_str())
            .map(|job| std::mem::take(&mut job.temp_files))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
