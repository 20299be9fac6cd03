use serde::{Deserialize, Serialize};

/// LLM provider connection settings (chat-completions wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. Unset env var disables the
    /// LLM entirely; callers fall back to deterministic paths.
    #[serde(default = "d_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default = "d_llm_temperature")]
    pub temperature: f32,
    #[serde(default = "d_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_llm_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_base_url(),
            api_key_env: d_llm_api_key_env(),
            model: d_llm_model(),
            temperature: d_llm_temperature(),
            max_tokens: d_llm_max_tokens(),
            request_timeout_secs: d_llm_timeout_secs(),
        }
    }
}

fn d_llm_base_url() -> String {
    "https://clovastudio.stream.ntruss.com/v1/openai".into()
}

fn d_llm_api_key_env() -> String {
    "NCP_CLOVASTUDIO_API_KEY".into()
}

fn d_llm_model() -> String {
    "HCX-005".into()
}

fn d_llm_temperature() -> f32 {
    0.2
}

fn d_llm_max_tokens() -> u32 {
    1024
}

fn d_llm_timeout_secs() -> u64 {
    60
}

/// Streaming STT connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "d_stt_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the per-worker credential
    /// (set by the worker manager from the pooled index).
    #[serde(default = "d_stt_secret_env")]
    pub secret_env: String,
    #[serde(default = "d_stt_language")]
    pub language: String,
    /// PCM sample rate the media transport delivers.
    #[serde(default = "d_stt_sample_rate")]
    pub sample_rate: u32,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            endpoint: d_stt_endpoint(),
            secret_env: d_stt_secret_env(),
            language: d_stt_language(),
            sample_rate: d_stt_sample_rate(),
        }
    }
}

fn d_stt_endpoint() -> String {
    "wss://clovaspeech-gw.ncloud.com/ws".into()
}

fn d_stt_secret_env() -> String {
    "CLOVA_STT_SECRET".into()
}

fn d_stt_language() -> String {
    "ko".into()
}

fn d_stt_sample_rate() -> u32 {
    16_000
}

/// TTS synthesis server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Empty = TTS disabled.
    #[serde(default)]
    pub server_url: String,
    #[serde(default = "d_tts_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "d_tts_target_sample_rate")]
    pub target_sample_rate: u32,
    #[serde(default = "d_tts_queue_capacity")]
    pub queue_capacity: usize,
    /// Consecutive synthesis failures that flush the queue.
    #[serde(default = "d_tts_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            sample_rate: d_tts_sample_rate(),
            target_sample_rate: d_tts_target_sample_rate(),
            queue_capacity: d_tts_queue_capacity(),
            max_consecutive_failures: d_tts_max_consecutive_failures(),
        }
    }
}

fn d_tts_sample_rate() -> u32 {
    44_100
}

fn d_tts_target_sample_rate() -> u32 {
    48_000
}

fn d_tts_queue_capacity() -> usize {
    50
}

fn d_tts_max_consecutive_failures() -> u32 {
    5
}
