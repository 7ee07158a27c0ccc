//! The render job scheduler.
//!
//! A single explicitly constructed object owns the job store, the pending
//! list, and the concurrency gate. Hosts (HTTP layer, tests) hold it
//! behind an `Arc` and call `submit`/`view`/`logs`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use adrender_media::{verify_allowed_path, EncoderPool, SourceResolver};
use adrender_models::{Job, JobId, JobKind, Priority};

use crate::config::SchedulerConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::{JobLogs, JobStore, JobView};

/// Receipt returned by a successful submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: &'static str,
    pub queue_position: usize,
}

/// Pending-list entry ordered by (priority weight desc, enqueue seq asc).
#[derive(Debug, Clone)]
struct PendingEntry {
    weight: u8,
    seq: u64,
    job_id: JobId,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher weight first, then earlier sequence.
        self.weight
            .cmp(&other.weight)
            .then(other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingEntry {}

struct PendingQueue {
    heap: BinaryHeap<PendingEntry>,
    next_seq: u64,
}

/// The scheduler: job store + pending list + concurrency gate.
pub struct Scheduler {
    pub(crate) config: SchedulerConfig,
    pub(crate) store: JobStore,
    pub(crate) pool: EncoderPool,
    pub(crate) resolver: SourceResolver,
    pending: Mutex<PendingQueue>,
    slots: Arc<Semaphore>,
}

impl Scheduler {
    /// Create a scheduler with the given config and detected encoder pool.
    pub fn new(config: SchedulerConfig, pool: EncoderPool) -> QueueResult<Arc<Self>> {
        std::fs::create_dir_all(&config.scratch_dir)?;
        std::fs::create_dir_all(&config.output_dir)?;

        let resolver = SourceResolver::new(&config.scratch_dir);
        let slots = Arc::new(Semaphore::new(pool.slots));
        let store = JobStore::new(config.max_jobs);

        info!(
            "Scheduler ready: {} slot(s), encoder binary {}",
            pool.slots,
            config.encoder_binary.display()
        );

        Ok(Arc::new(Self {
            config,
            store,
            pool,
            resolver,
            pending: Mutex::new(PendingQueue {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            slots,
        }))
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingQueue> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate and enqueue a job. Returns synchronously; errors here
    /// never create a job record.
    pub fn submit(
        self: &Arc<Self>,
        kind: JobKind,
        priority: Priority,
    ) -> QueueResult<SubmitReceipt> {
        if !kind.has_source() {
            return Err(QueueError::validation(
                "input spec declares no source reference",
            ));
        }

        // Client-supplied local paths are confined to the allowed roots.
        let roots = self.config.allowed_roots();
        for path in kind.declared_paths() {
            verify_allowed_path(path, &roots)
                .map_err(|e| QueueError::validation(e.to_string()))?;
        }

        let job = Job::new(kind, priority);
        let job_id = job.id.clone();

        let queue_position = {
            let mut pending = self.lock_pending();
            if pending.heap.len() >= self.config.max_pending {
                return Err(QueueError::QueueOverflow {
                    capacity: self.config.max_pending,
                });
            }

            let entry = PendingEntry {
                weight: priority.weight(),
                seq: pending.next_seq,
                job_id: job_id.clone(),
            };
            pending.next_seq += 1;

            // Position = jobs that would dequeue before this one, plus one.
            let ahead = pending.heap.iter().filter(|e| **e > entry).count();

            // The record must be visible before the entry can be popped by
            // a concurrently draining slot.
            self.store.insert(job);
            pending.heap.push(entry);
            ahead + 1
        };

        debug!(job_id = %job_id, "Job queued at position {}", queue_position);

        self.drain();

        Ok(SubmitReceipt {
            job_id: job_id.to_string(),
            status: "queued",
            queue_position,
        })
    }

    /// Pull pending jobs while a concurrency slot is free.
    ///
    /// Called after every submission and every job completion, so slots
    /// never sit idle with pending work.
    pub fn drain(self: &Arc<Self>) {
        loop {
            let permit = match Arc::clone(&self.slots).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let entry = self.lock_pending().heap.pop();
            let entry = match entry {
                Some(entry) => entry,
                None => return, // permit dropped, slot stays free
            };

            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                scheduler.run_job(entry.job_id).await;
                drop(permit);
                // A slot just freed up; pick up the next pending job.
                scheduler.drain();
            });
        }
    }

    /// Snapshot a job for polling clients.
    pub fn view(&self, id: &JobId) -> QueueResult<JobView> {
        self.store
            .view(id)
            .ok_or_else(|| QueueError::not_found(id.to_string()))
    }

    /// Full logs + command line for a job.
    pub fn logs(&self, id: &JobId) -> QueueResult<JobLogs> {
        self.store
            .logs(id)
            .ok_or_else(|| QueueError::not_found(id.to_string()))
    }

    /// Jobs currently waiting in the pending list.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().heap.len()
    }

    /// Concurrency slots currently free.
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
