//! Worker lifecycle + credential pool, glued.
//!
//! The pool assignment happens before the backend call; a failed start
//! releases the credential immediately so the slot never leaks.

use std::sync::Arc;

use cf_domain::error::Result;
use cf_domain::worker::{WorkerAssignment, WorkerStatus};

use crate::runtime::pool::CredentialPool;

use super::{meeting_id_of, WorkerManager};

pub struct WorkerService {
    pool: Arc<CredentialPool>,
    manager: Arc<dyn WorkerManager>,
}

impl WorkerService {
    pub fn new(pool: Arc<CredentialPool>, manager: Arc<dyn WorkerManager>) -> Self {
        Self { pool, manager }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Allocate a credential and start the worker. Idempotent per meeting:
    /// the pool returns the existing index and the backend the existing id.
    pub async fn start(&self, meeting_id: &str) -> Result<WorkerAssignment> {
        let credential_index = self.pool.allocate(meeting_id)?;

        match self.manager.start_worker(meeting_id, credential_index).await {
            Ok(worker_id) => {
                let status = self.manager.get_status(&worker_id).await?;
                Ok(WorkerAssignment {
                    worker_id,
                    meeting_id: meeting_id.to_string(),
                    credential_index,
                    status: status.status,
                })
            }
            Err(e) => {
                // The slot must not stay booked for a worker that never ran.
                self.pool.release(meeting_id);
                Err(e)
            }
        }
    }

    /// Stop the worker and release the meeting's credential.
    pub async fn stop(&self, worker_id: &str) -> Result<bool> {
        let stopped = self.manager.stop_worker(worker_id).await?;
        self.pool.release(&meeting_id_of(worker_id));
        Ok(stopped)
    }

    /// Worker-reported completion: reap the worker and free the credential.
    pub async fn complete(&self, meeting_id: &str) -> Result<()> {
        let worker_id = super::worker_name(meeting_id);
        let _ = self.manager.stop_worker(&worker_id).await;
        self.pool.release(meeting_id);
        Ok(())
    }

    pub async fn status(&self, worker_id: &str) -> Result<WorkerStatus> {
        self.manager.get_status(worker_id).await
    }

    pub async fn list(&self, meeting_id: Option<&str>) -> Result<Vec<WorkerStatus>> {
        self.manager.list_workers(meeting_id).await
    }

    pub async fn cleanup(&self) -> Result<usize> {
        self.manager.cleanup_stopped_workers().await
    }
}
