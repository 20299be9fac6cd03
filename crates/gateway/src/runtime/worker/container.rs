//! Container-runtime worker backend.
//!
//! Drives the local `docker` binary: one detached container per meeting,
//! credential and meeting id passed via environment. Used for single-host
//! and dev deployments; clusters use the orchestrator backend.

use async_trait::async_trait;
use tokio::process::Command;

use cf_domain::config::WorkerConfig;
use cf_domain::error::{Error, Result};
use cf_domain::worker::{WorkerStatus, WorkerStatusKind};

use super::{meeting_id_of, worker_name, WorkerManager, WORKER_PREFIX};

pub struct ContainerWorkerManager {
    image: String,
    network: String,
    backend_api_url: String,
    env_passthrough: Vec<String>,
}

impl ContainerWorkerManager {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            image: config.image.clone(),
            network: config.network.clone(),
            backend_api_url: config.backend_api_url.clone(),
            env_passthrough: config.env_passthrough.clone(),
        }
    }

    async fn run_docker(&self, args: &[&str]) -> Result<(i32, String, String)> {
        tracing::debug!(command = %args.join(" "), "running docker command");
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::external("docker", e))?;
        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

/// Map a `docker inspect` state to our status kind.
fn map_container_state(state: &str, exit_code: Option<i32>) -> WorkerStatusKind {
    match state {
        "created" | "restarting" => WorkerStatusKind::Pending,
        "running" | "paused" => WorkerStatusKind::Running,
        "removing" => WorkerStatusKind::Stopped,
        "exited" => {
            if exit_code == Some(0) {
                WorkerStatusKind::Stopped
            } else {
                WorkerStatusKind::Failed
            }
        }
        "dead" => WorkerStatusKind::Failed,
        _ => WorkerStatusKind::NotFound,
    }
}

#[async_trait]
impl WorkerManager for ContainerWorkerManager {
    async fn start_worker(&self, meeting_id: &str, credential_index: usize) -> Result<String> {
        let name = worker_name(meeting_id);

        let existing = self.get_status(&name).await?;
        match existing.status {
            WorkerStatusKind::Running | WorkerStatusKind::Pending => {
                tracing::warn!(worker_id = %name, "worker already running");
                return Ok(name);
            }
            WorkerStatusKind::Stopped | WorkerStatusKind::Failed => {
                let _ = self.run_docker(&["rm", "-f", &name]).await;
            }
            WorkerStatusKind::NotFound => {}
        }

        let credential_env = format!("CLOVA_STT_SECRET_{credential_index}");
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.clone(),
            "--network".into(),
            self.network.clone(),
            "-e".into(),
            format!("MEETING_ID={meeting_id}"),
            "-e".into(),
            format!("BACKEND_API_URL={}", self.backend_api_url),
        ];
        // The pooled credential lands in the worker under its generic name.
        if let Ok(secret) = std::env::var(&credential_env) {
            args.push("-e".into());
            args.push(format!("CLOVA_STT_SECRET={secret}"));
        } else {
            tracing::warn!(env = %credential_env, "credential env var unset, worker starts without STT secret");
        }
        for key in &self.env_passthrough {
            if let Ok(value) = std::env::var(key) {
                args.push("-e".into());
                args.push(format!("{key}={value}"));
            }
        }
        args.push(self.image.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let (code, _stdout, stderr) = self.run_docker(&arg_refs).await?;
        if code != 0 {
            return Err(Error::External {
                service: "docker".into(),
                message: format!("worker start failed: {stderr}"),
            });
        }

        tracing::info!(worker_id = %name, meeting_id, credential_index, "worker started");
        Ok(name)
    }

    async fn stop_worker(&self, worker_id: &str) -> Result<bool> {
        let (code, _stdout, stderr) = self.run_docker(&["stop", worker_id]).await?;
        if code != 0 {
            tracing::warn!(worker_id, error = %stderr, "worker stop failed");
            return Ok(false);
        }
        tracing::info!(worker_id, "worker stopped");
        Ok(true)
    }

    async fn get_status(&self, worker_id: &str) -> Result<WorkerStatus> {
        let meeting_id = meeting_id_of(worker_id);
        let (code, stdout, _stderr) = self
            .run_docker(&[
                "inspect",
                "--format",
                "{{.State.Status}}|{{.State.ExitCode}}",
                worker_id,
            ])
            .await?;

        if code != 0 {
            return Ok(WorkerStatus {
                worker_id: worker_id.to_string(),
                meeting_id,
                status: WorkerStatusKind::NotFound,
                exit_code: None,
                error_message: None,
            });
        }

        let mut parts = stdout.split('|');
        let state = parts.next().unwrap_or_default();
        let exit_code = parts.next().and_then(|c| c.parse::<i32>().ok());
        let status = map_container_state(state, exit_code);

        Ok(WorkerStatus {
            worker_id: worker_id.to_string(),
            meeting_id,
            status,
            exit_code,
            error_message: (status == WorkerStatusKind::Failed)
                .then(|| format!("container exited with code {}", exit_code.unwrap_or(-1))),
        })
    }

    async fn list_workers(&self, meeting_id: Option<&str>) -> Result<Vec<WorkerStatus>> {
        let filter = format!("name={WORKER_PREFIX}");
        let (code, stdout, _stderr) = self
            .run_docker(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"])
            .await?;
        if code != 0 || stdout.is_empty() {
            return Ok(vec![]);
        }

        let mut workers = Vec::new();
        for name in stdout.lines().filter(|n| !n.is_empty()) {
            let status = self.get_status(name).await?;
            if let Some(wanted) = meeting_id {
                if status.meeting_id != wanted {
                    continue;
                }
            }
            workers.push(status);
        }
        Ok(workers)
    }

    async fn cleanup_stopped_workers(&self) -> Result<usize> {
        let mut removed = 0;
        for worker in self.list_workers(None).await? {
            if matches!(
                worker.status,
                WorkerStatusKind::Stopped | WorkerStatusKind::Failed
            ) {
                let (code, _, _) = self.run_docker(&["rm", &worker.worker_id]).await?;
                if code == 0 {
                    removed += 1;
                    tracing::info!(worker_id = %worker.worker_id, "worker container removed");
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_state_mapping() {
        assert_eq!(map_container_state("created", None), WorkerStatusKind::Pending);
        assert_eq!(map_container_state("restarting", None), WorkerStatusKind::Pending);
        assert_eq!(map_container_state("running", None), WorkerStatusKind::Running);
        assert_eq!(map_container_state("paused", None), WorkerStatusKind::Running);
        assert_eq!(map_container_state("removing", None), WorkerStatusKind::Stopped);
        assert_eq!(map_container_state("exited", Some(0)), WorkerStatusKind::Stopped);
        assert_eq!(map_container_state("exited", Some(1)), WorkerStatusKind::Failed);
        assert_eq!(map_container_state("dead", None), WorkerStatusKind::Failed);
        assert_eq!(map_container_state("mystery", None), WorkerStatusKind::NotFound);
    }
}
