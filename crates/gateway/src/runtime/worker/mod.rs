//! Per-meeting worker lifecycle.
//!
//! The manager trait has two backends: a local container runtime (spawns
//! the `docker` binary) and an orchestrator (Kubernetes batch Jobs via the
//! REST API). [`service::WorkerService`] wraps either with the credential
//! pool so a failed start never leaks a credential.

pub mod container;
pub mod orchestrator;
pub mod service;

use async_trait::async_trait;

use cf_domain::config::{WorkerBackendKind, WorkerConfig};
use cf_domain::error::Result;
use cf_domain::worker::WorkerStatus;

pub const WORKER_PREFIX: &str = "realtime-worker";

/// Backend-agnostic worker lifecycle operations.
///
/// `start_worker` must be idempotent under concurrent requests for the same
/// meeting: check status first, and treat a creation collision as success
/// by returning the existing worker id.
#[async_trait]
pub trait WorkerManager: Send + Sync {
    async fn start_worker(&self, meeting_id: &str, credential_index: usize) -> Result<String>;
    async fn stop_worker(&self, worker_id: &str) -> Result<bool>;
    async fn get_status(&self, worker_id: &str) -> Result<WorkerStatus>;
    async fn list_workers(&self, meeting_id: Option<&str>) -> Result<Vec<WorkerStatus>>;
    /// Remove exited workers; returns how many were reaped.
    async fn cleanup_stopped_workers(&self) -> Result<usize>;
}

/// `realtime-worker-<sanitized meeting id>`.
pub fn worker_name(meeting_id: &str) -> String {
    let safe: String = meeting_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    format!("{WORKER_PREFIX}-{safe}")
}

/// Inverse of [`worker_name`].
pub fn meeting_id_of(worker_id: &str) -> String {
    worker_id
        .strip_prefix(&format!("{WORKER_PREFIX}-"))
        .unwrap_or(worker_id)
        .to_string()
}

/// Label-safe meeting id for orchestrator selectors.
pub fn label_safe(meeting_id: &str) -> String {
    meeting_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

pub fn backend_from_config(config: &WorkerConfig) -> std::sync::Arc<dyn WorkerManager> {
    match config.backend {
        WorkerBackendKind::Container => {
            std::sync::Arc::new(container::ContainerWorkerManager::new(config))
        }
        WorkerBackendKind::Orchestrator => {
            std::sync::Arc::new(orchestrator::OrchestratorWorkerManager::from_env(config))
        }
    }
}
