use serde::{Deserialize, Serialize};

/// Gateway HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the axum listener.
    #[serde(default = "d_bind")]
    pub bind: String,
    /// Environment variable holding the worker API bearer token.
    /// If the env var is unset, worker endpoints accept any caller (dev mode).
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Allowed CORS origins. Empty = allow any (dev mode).
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// ICE servers handed to clients in the room payload.
    #[serde(default = "d_ice_servers")]
    pub ice_servers: Vec<String>,
    /// Cap on participants per meeting room.
    #[serde(default = "d_max_participants")]
    pub max_participants: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: d_bind(),
            api_token_env: d_api_token_env(),
            cors_origins: Vec::new(),
            ice_servers: d_ice_servers(),
            max_participants: d_max_participants(),
        }
    }
}

fn d_bind() -> String {
    "0.0.0.0:8000".into()
}

fn d_api_token_env() -> String {
    "CF_API_TOKEN".into()
}

fn d_ice_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".into()]
}

fn d_max_participants() -> usize {
    8
}
