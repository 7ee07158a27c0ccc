//! Application state.

use std::sync::Arc;

use adrender_queue::Scheduler;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    /// Create new application state around an already-built scheduler.
    pub fn new(config: ApiConfig, scheduler: Arc<Scheduler>) -> Self {
        Self { config, scheduler }
    }
}
