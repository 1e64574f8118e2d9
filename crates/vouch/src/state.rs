//! Application state and shared resources.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::evidence::EvidenceStore;
use crate::session::SessionHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Handle to the session driver
    pub session: SessionHandle,

    /// Evidence store (for readiness probes)
    pub store: Arc<dyn EvidenceStore>,

    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, session: SessionHandle, store: Arc<dyn EvidenceStore>) -> Self {
        Self {
            config: Arc::new(config),
            session,
            store,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
