//! Orchestrator worker backend: one Kubernetes batch Job per meeting.
//!
//! Talks to the Kubernetes REST API directly over reqwest with the
//! in-cluster service-account token (or a configured URL for out-of-cluster
//! dev). Jobs never retry (`backoffLimit: 0`) and self-delete after a TTL;
//! a 409 on creation means another controller instance won the race and is
//! treated as success.

use async_trait::async_trait;
use serde_json::{json, Value};

use cf_domain::config::WorkerConfig;
use cf_domain::error::{Error, Result};
use cf_domain::worker::{WorkerStatus, WorkerStatusKind};

use super::{label_safe, meeting_id_of, worker_name, WorkerManager};

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

pub struct OrchestratorWorkerManager {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    namespace: String,
    image: String,
    backend_api_url: String,
    ttl_seconds_after_finished: u64,
}

impl OrchestratorWorkerManager {
    pub fn from_env(config: &WorkerConfig) -> Self {
        let base_url = if !config.orchestrator_url.is_empty() {
            config.orchestrator_url.clone()
        } else {
            let host = std::env::var("KUBERNETES_SERVICE_HOST").unwrap_or_default();
            let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
            format!("https://{host}:{port}")
        };
        let token = std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN)
            .ok()
            .map(|t| t.trim().to_string());

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url,
            token,
            namespace: config.namespace.clone(),
            image: config.image.clone(),
            backend_api_url: config.backend_api_url.clone(),
            ttl_seconds_after_finished: config.ttl_seconds_after_finished,
        }
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.base_url, self.namespace
        )
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub(crate) fn build_job_manifest(
        &self,
        job_name: &str,
        meeting_id: &str,
        credential_index: usize,
    ) -> Value {
        let labels = json!({
            "app": "realtime-worker",
            "managed-by": "cf-gateway",
            "meeting-id": label_safe(meeting_id),
            "credential-index": credential_index.to_string(),
        });
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": job_name,
                "namespace": self.namespace,
                "labels": labels,
            },
            "spec": {
                "ttlSecondsAfterFinished": self.ttl_seconds_after_finished,
                "backoffLimit": 0,
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": "worker",
                            "image": self.image,
                            "imagePullPolicy": "Always",
                            "env": [
                                { "name": "MEETING_ID", "value": meeting_id },
                                { "name": "BACKEND_API_URL", "value": self.backend_api_url },
                                {
                                    "name": "CLOVA_STT_SECRET",
                                    "valueFrom": {
                                        "secretKeyRef": {
                                            "name": "confab-secrets",
                                            "key": format!("CLOVA_STT_SECRET_{credential_index}"),
                                        }
                                    }
                                },
                            ],
                            "envFrom": [
                                { "configMapRef": { "name": "confab-config" } },
                                { "secretRef": { "name": "confab-secrets" } },
                            ],
                            "resources": {
                                "requests": { "memory": "128Mi", "cpu": "100m" },
                                "limits": { "memory": "512Mi", "cpu": "500m" },
                            },
                        }],
                    },
                },
            },
        })
    }

    async fn delete_job(&self, job_name: &str) -> Result<bool> {
        let url = format!("{}/{job_name}?propagationPolicy=Background", self.jobs_url());
        let response = self
            .request(self.http.delete(&url))
            .send()
            .await
            .map_err(|e| Error::external("orchestrator", e))?;
        match response.status() {
            status if status.is_success() => {
                tracing::info!(worker_id = job_name, "worker job deleted");
                Ok(true)
            }
            reqwest::StatusCode::NOT_FOUND => Ok(true),
            status => {
                tracing::warn!(worker_id = job_name, %status, "worker job delete failed");
                Ok(false)
            }
        }
    }

    fn status_from_job(job: &Value) -> (WorkerStatusKind, Option<i32>, Option<String>) {
        let status = &job["status"];
        let kind = if status["succeeded"].as_u64().unwrap_or(0) > 0 {
            WorkerStatusKind::Stopped
        } else if status["failed"].as_u64().unwrap_or(0) > 0 {
            WorkerStatusKind::Failed
        } else if status["active"].as_u64().unwrap_or(0) > 0 {
            WorkerStatusKind::Running
        } else {
            WorkerStatusKind::Pending
        };

        let (exit_code, error_message) = match kind {
            WorkerStatusKind::Stopped => (Some(0), None),
            WorkerStatusKind::Failed => {
                let message = status["conditions"]
                    .as_array()
                    .and_then(|conditions| {
                        conditions
                            .iter()
                            .find(|c| c["type"] == "Failed")
                            .and_then(|c| c["message"].as_str())
                    })
                    .map(String::from);
                (Some(1), message)
            }
            _ => (None, None),
        };
        (kind, exit_code, error_message)
    }

    fn worker_status(job: &Value, fallback_name: &str) -> WorkerStatus {
        let worker_id = job["metadata"]["name"]
            .as_str()
            .unwrap_or(fallback_name)
            .to_string();
        let meeting_id = meeting_id_of(&worker_id);
        let (status, exit_code, error_message) = Self::status_from_job(job);
        WorkerStatus {
            worker_id,
            meeting_id,
            status,
            exit_code,
            error_message,
        }
    }
}

#[async_trait]
impl WorkerManager for OrchestratorWorkerManager {
    async fn start_worker(&self, meeting_id: &str, credential_index: usize) -> Result<String> {
        let job_name = worker_name(meeting_id);

        let existing = self.get_status(&job_name).await?;
        match existing.status {
            WorkerStatusKind::Running => {
                tracing::warn!(worker_id = %job_name, "worker job already running");
                return Ok(job_name);
            }
            WorkerStatusKind::Stopped | WorkerStatusKind::Failed | WorkerStatusKind::Pending => {
                self.delete_job(&job_name).await?;
            }
            WorkerStatusKind::NotFound => {}
        }

        let manifest = self.build_job_manifest(&job_name, meeting_id, credential_index);
        let response = self
            .request(self.http.post(self.jobs_url()).json(&manifest))
            .send()
            .await
            .map_err(|e| Error::external("orchestrator", e))?;

        match response.status() {
            status if status.is_success() => {
                tracing::info!(
                    worker_id = %job_name,
                    meeting_id,
                    credential_index,
                    "worker job created"
                );
                Ok(job_name)
            }
            reqwest::StatusCode::CONFLICT => {
                // Another controller instance created it first.
                tracing::info!(worker_id = %job_name, "worker job already exists");
                Ok(job_name)
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(Error::External {
                    service: "orchestrator".into(),
                    message: format!("job creation failed ({status}): {detail}"),
                })
            }
        }
    }

    async fn stop_worker(&self, worker_id: &str) -> Result<bool> {
        self.delete_job(worker_id).await
    }

    async fn get_status(&self, worker_id: &str) -> Result<WorkerStatus> {
        let url = format!("{}/{worker_id}", self.jobs_url());
        let response = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(|e| Error::external("orchestrator", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(WorkerStatus {
                worker_id: worker_id.to_string(),
                meeting_id: meeting_id_of(worker_id),
                status: WorkerStatusKind::NotFound,
                exit_code: None,
                error_message: None,
            });
        }
        if !response.status().is_success() {
            return Err(Error::External {
                service: "orchestrator".into(),
                message: format!("job status query failed ({})", response.status()),
            });
        }

        let job: Value = response
            .json()
            .await
            .map_err(|e| Error::external("orchestrator", e))?;
        Ok(Self::worker_status(&job, worker_id))
    }

    async fn list_workers(&self, meeting_id: Option<&str>) -> Result<Vec<WorkerStatus>> {
        let mut selector = "app=realtime-worker,managed-by=cf-gateway".to_string();
        if let Some(meeting_id) = meeting_id {
            selector.push_str(&format!(",meeting-id={}", label_safe(meeting_id)));
        }
        let url = format!("{}?labelSelector={selector}", self.jobs_url());
        let response = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(|e| Error::external("orchestrator", e))?;
        if !response.status().is_success() {
            return Err(Error::External {
                service: "orchestrator".into(),
                message: format!("job list failed ({})", response.status()),
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::external("orchestrator", e))?;
        let items = body["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .map(|job| Self::worker_status(job, ""))
            .collect())
    }

    async fn cleanup_stopped_workers(&self) -> Result<usize> {
        // ttlSecondsAfterFinished is the primary reaper; this is manual backup.
        let mut removed = 0;
        for worker in self.list_workers(None).await? {
            if matches!(
                worker.status,
                WorkerStatusKind::Stopped | WorkerStatusKind::Failed
            ) && self.delete_job(&worker.worker_id).await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> OrchestratorWorkerManager {
        let config = WorkerConfig {
            orchestrator_url: "https://kube.internal:6443".into(),
            ..WorkerConfig::default()
        };
        OrchestratorWorkerManager::from_env(&config)
    }

    #[test]
    fn manifest_carries_labels_ttl_and_credential() {
        let manifest = manager().build_job_manifest("realtime-worker-m1", "m1", 2);

        assert_eq!(manifest["metadata"]["labels"]["app"], "realtime-worker");
        assert_eq!(manifest["metadata"]["labels"]["meeting-id"], "m1");
        assert_eq!(manifest["metadata"]["labels"]["credential-index"], "2");
        assert_eq!(manifest["spec"]["backoffLimit"], 0);
        assert_eq!(manifest["spec"]["ttlSecondsAfterFinished"], 300);
        assert_eq!(
            manifest["spec"]["template"]["spec"]["restartPolicy"],
            "Never"
        );

        let env = manifest["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_array()
            .unwrap()
            .clone();
        assert!(env.iter().any(|e| e["name"] == "MEETING_ID" && e["value"] == "m1"));
        let secret = env.iter().find(|e| e["name"] == "CLOVA_STT_SECRET").unwrap();
        assert_eq!(
            secret["valueFrom"]["secretKeyRef"]["key"],
            "CLOVA_STT_SECRET_2"
        );
    }

    #[test]
    fn job_status_mapping() {
        let succeeded = serde_json::json!({"status": {"succeeded": 1}});
        assert_eq!(
            OrchestratorWorkerManager::status_from_job(&succeeded).0,
            WorkerStatusKind::Stopped
        );

        let failed = serde_json::json!({
            "status": {
                "failed": 1,
                "conditions": [{"type": "Failed", "message": "BackoffLimitExceeded"}],
            }
        });
        let (kind, exit_code, message) = OrchestratorWorkerManager::status_from_job(&failed);
        assert_eq!(kind, WorkerStatusKind::Failed);
        assert_eq!(exit_code, Some(1));
        assert_eq!(message.as_deref(), Some("BackoffLimitExceeded"));

        let active = serde_json::json!({"status": {"active": 1}});
        assert_eq!(
            OrchestratorWorkerManager::status_from_job(&active).0,
            WorkerStatusKind::Running
        );

        let pending = serde_json::json!({"status": {}});
        assert_eq!(
            OrchestratorWorkerManager::status_from_job(&pending).0,
            WorkerStatusKind::Pending
        );
    }
}
