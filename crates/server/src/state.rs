// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use remote_exec_jobs::{CommandExecutor, FileRoot, JobRegistry};
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Spawns commands and owns a handle to the job registry.
    pub executor: CommandExecutor,
    /// Shared secret every request must present.
    pub auth_token: String,
    /// Cancelled when the server should stop accepting requests.
    pub shutdown: CancellationToken,
    /// Delay between answering `/exit` and triggering `shutdown`.
    pub exit_grace: Duration,
    /// Largest accepted `/upload` body.
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build the state from validated configuration, starting the registry loop.
    pub fn from_config(config: &ServerConfig, shutdown: CancellationToken) -> Arc<Self> {
        let registry = JobRegistry::spawn(config.poll_interval);
        Arc::new(Self {
            start_time: Instant::now(),
            executor: CommandExecutor::new(registry, config.files.clone()),
            auth_token: config.auth_token.clone(),
            shutdown,
            exit_grace: config.exit_grace,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    /// State with a fresh registry, for tests and embedding.
    pub fn new(
        auth_token: impl Into<String>,
        files: FileRoot,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            executor: CommandExecutor::new(JobRegistry::spawn(poll_interval), files),
            auth_token: auth_token.into(),
            shutdown: CancellationToken::new(),
            exit_grace: Duration::from_millis(1000),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        })
    }

    pub fn registry(&self) -> &JobRegistry {
        self.executor.registry()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
