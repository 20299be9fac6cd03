//! Worker configuration — pure environment, per the process-boundary
//! contract with the worker manager.

use cf_domain::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct WorkerEnv {
    pub meeting_id: String,
    pub backend_api_url: String,
    pub backend_api_key: Option<String>,
    pub agent_enabled: bool,
    pub wake_word: String,
    pub stt_endpoint: String,
    pub stt_secret: Option<String>,
    /// Empty = TTS disabled.
    pub tts_server_url: Option<String>,
    pub media_ws_url: String,
    pub media_api_key: Option<String>,
    pub media_api_secret: Option<String>,
    pub log_level: String,
}

impl WorkerEnv {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lookup-injected constructor so tests run without touching the
    /// process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let meeting_id = get("MEETING_ID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidInput("MEETING_ID is not set".into()))?;

        let truthy = |v: &str| matches!(v, "1" | "true" | "TRUE" | "yes");

        Ok(Self {
            meeting_id,
            backend_api_url: get("BACKEND_API_URL")
                .unwrap_or_else(|| "http://backend:8000".into()),
            backend_api_key: get("BACKEND_API_KEY").filter(|v| !v.is_empty()),
            agent_enabled: get("AGENT_ENABLED").map(|v| truthy(&v)).unwrap_or(true),
            wake_word: get("AGENT_WAKE_WORD").unwrap_or_else(|| "부덕아".into()),
            stt_endpoint: get("CLOVA_STT_ENDPOINT")
                .unwrap_or_else(|| "wss://clovaspeech-gw.ncloud.com/ws".into()),
            stt_secret: get("CLOVA_STT_SECRET").filter(|v| !v.is_empty()),
            tts_server_url: get("TTS_SERVER_URL").filter(|v| !v.is_empty()),
            media_ws_url: get("LIVEKIT_WS_URL").unwrap_or_else(|| "ws://livekit:7880".into()),
            media_api_key: get("LIVEKIT_API_KEY").filter(|v| !v.is_empty()),
            media_api_secret: get("LIVEKIT_API_SECRET").filter(|v| !v.is_empty()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }
}
