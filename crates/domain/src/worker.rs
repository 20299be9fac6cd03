//! Worker lifecycle types shared by the gateway's worker manager and its
//! admin API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatusKind {
    Pending,
    Running,
    Stopped,
    Failed,
    NotFound,
}

/// Point-in-time status of one per-meeting worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub meeting_id: String,
    pub status: WorkerStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A live meeting → worker binding, including the pooled credential index
/// injected into the worker's environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub worker_id: String,
    pub meeting_id: String,
    pub credential_index: usize,
    pub status: WorkerStatusKind,
}
