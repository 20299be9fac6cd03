use serde::{Deserialize, Serialize};

/// Which backend provisions per-meeting worker processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerBackendKind {
    /// Spawn a local container via the `docker` binary.
    #[default]
    Container,
    /// Create a batch Job through the orchestrator REST API.
    Orchestrator,
}

/// Worker lifecycle settings shared by both backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub backend: WorkerBackendKind,
    /// Worker container image.
    #[serde(default = "d_image")]
    pub image: String,
    /// Container network (container backend only).
    #[serde(default = "d_network")]
    pub network: String,
    /// Orchestrator namespace (orchestrator backend only).
    #[serde(default = "d_namespace")]
    pub namespace: String,
    /// Orchestrator API base URL. Empty = in-cluster default.
    #[serde(default)]
    pub orchestrator_url: String,
    /// Seconds a finished Job lingers before the orchestrator reaps it.
    #[serde(default = "d_ttl")]
    pub ttl_seconds_after_finished: u64,
    /// Backend base URL injected into workers as `BACKEND_API_URL`.
    #[serde(default = "d_backend_url")]
    pub backend_api_url: String,
    /// Environment variable names passed through from the gateway process to
    /// container workers (media transport credentials, log level and the like).
    #[serde(default = "d_env_passthrough")]
    pub env_passthrough: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: WorkerBackendKind::default(),
            image: d_image(),
            network: d_network(),
            namespace: d_namespace(),
            orchestrator_url: String::new(),
            ttl_seconds_after_finished: d_ttl(),
            backend_api_url: d_backend_url(),
            env_passthrough: d_env_passthrough(),
        }
    }
}

fn d_image() -> String {
    "confab-worker:latest".into()
}

fn d_network() -> String {
    "confab-network".into()
}

fn d_namespace() -> String {
    "confab".into()
}

fn d_ttl() -> u64 {
    300
}

fn d_backend_url() -> String {
    "http://backend:8000".into()
}

fn d_env_passthrough() -> Vec<String> {
    [
        "LIVEKIT_WS_URL",
        "LIVEKIT_API_KEY",
        "LIVEKIT_API_SECRET",
        "CLOVA_STT_ENDPOINT",
        "BACKEND_API_KEY",
        "AGENT_ENABLED",
        "AGENT_WAKE_WORD",
        "TTS_SERVER_URL",
        "LOG_LEVEL",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
