//! TTS synthesis client: one sentence in, raw PCM out.

use cf_domain::config::TtsConfig;
use cf_domain::error::{Error, Result};

#[async_trait::async_trait]
pub trait TtsClient: Send + Sync {
    /// Synthesize one sentence to PCM bytes. `Ok(None)` means the server
    /// declined the text (empty after normalization, unsupported, etc.).
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>>;
}

pub struct HttpTtsClient {
    server_url: String,
    sample_rate: u32,
    client: reqwest::Client,
}

impl HttpTtsClient {
    pub fn new(cfg: &TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::external("tts", e))?;
        Ok(Self {
            server_url: cfg.server_url.trim_end_matches('/').to_string(),
            sample_rate: cfg.sample_rate,
            client,
        })
    }
}

#[async_trait::async_trait]
impl TtsClient for HttpTtsClient {
    async fn synthesize(&self, text: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .post(format!("{}/synthesize", self.server_url))
            .json(&serde_json::json!({
                "text": text,
                "sampleRate": self.sample_rate,
            }))
            .send()
            .await
            .map_err(|e| Error::external("tts", e))?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::External {
                service: "tts".into(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::external("tts", e))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }
}
