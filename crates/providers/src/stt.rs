//! Streaming speech-to-text client.
//!
//! One session per speaker: raw PCM goes in, interim and final segments come
//! back on a channel. The production implementation speaks the Clova Speech
//! WebSocket protocol; tests swap in a scripted session.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use cf_domain::config::SttConfig;
use cf_domain::error::{Error, Result};

/// One recognition result for a speaker, interim or final.
#[derive(Debug, Clone, PartialEq)]
pub struct SttSegment {
    pub text: String,
    /// Meeting-relative milliseconds.
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
    pub min_confidence: Option<f32>,
    pub is_final: bool,
}

/// An open per-speaker recognition session.
#[async_trait::async_trait]
pub trait SttSession: Send + Sync {
    /// Feed raw PCM frames.
    async fn send_audio(&self, pcm: &[u8]) -> Result<()>;
    /// Promote finalization after a VAD speech-end signal.
    async fn mark_end_of_speech(&self) -> Result<()>;
    /// Tear the session down. Idempotent.
    async fn close(&self);
}

/// Factory for per-speaker sessions.
#[async_trait::async_trait]
pub trait SttClient: Send + Sync {
    async fn open_session(&self) -> Result<(Box<dyn SttSession>, mpsc::Receiver<SttSegment>)>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebSocket implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SpeechWsClient {
    endpoint: String,
    secret: String,
    language: String,
    sample_rate: u32,
}

impl SpeechWsClient {
    pub fn new(cfg: &SttConfig, secret: String) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            secret,
            language: cfg.language.clone(),
            sample_rate: cfg.sample_rate,
        }
    }
}

enum Command {
    Audio(Vec<u8>),
    EndOfSpeech,
    Close,
}

struct WsSession {
    commands: mpsc::Sender<Command>,
}

#[async_trait::async_trait]
impl SttSession for WsSession {
    async fn send_audio(&self, pcm: &[u8]) -> Result<()> {
        self.commands
            .send(Command::Audio(pcm.to_vec()))
            .await
            .map_err(|_| Error::external("stt", "session closed"))
    }

    async fn mark_end_of_speech(&self) -> Result<()> {
        self.commands
            .send(Command::EndOfSpeech)
            .await
            .map_err(|_| Error::external("stt", "session closed"))
    }

    async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

/// Wire shape of a recognition result frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    #[serde(default)]
    text: String,
    #[serde(default)]
    start_ms: u64,
    #[serde(default)]
    end_ms: u64,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    min_confidence: Option<f32>,
    #[serde(default)]
    is_final: bool,
}

#[async_trait::async_trait]
impl SttClient for SpeechWsClient {
    async fn open_session(&self) -> Result<(Box<dyn SttSession>, mpsc::Receiver<SttSegment>)> {
        let mut request = self
            .endpoint
            .clone()
            .into_client_request()
            .map_err(|e| Error::external("stt", e))?;
        request.headers_mut().insert(
            "X-CLOVASPEECH-API-KEY",
            self.secret
                .parse()
                .map_err(|_| Error::external("stt", "invalid secret header"))?,
        );

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::external("stt", e))?;
        let (mut sink, mut stream) = socket.split();

        // Recognition config goes first.
        let config = serde_json::json!({
            "language": self.language,
            "sampleRate": self.sample_rate,
            "format": "pcm16",
            "useInterim": true,
        });
        sink.send(WsMessage::Text(config.to_string()))
            .await
            .map_err(|e| Error::external("stt", e))?;

        let (command_tx, mut command_rx) = mpsc::channel::<Command>(256);
        let (result_tx, result_rx) = mpsc::channel::<SttSegment>(64);

        // Writer: forwards audio and control frames until Close.
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let outcome = match command {
                    Command::Audio(pcm) => sink.send(WsMessage::Binary(pcm)).await,
                    Command::EndOfSpeech => {
                        sink.send(WsMessage::Text(
                            serde_json::json!({ "type": "endOfSpeech" }).to_string(),
                        ))
                        .await
                    }
                    Command::Close => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, "stt writer failed, closing session");
                    break;
                }
            }
        });

        // Reader: parses result frames into segments.
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        let Ok(wire) = serde_json::from_str::<WireResult>(&text) else {
                            tracing::debug!("ignoring unparseable stt frame");
                            continue;
                        };
                        let segment = SttSegment {
                            text: wire.text,
                            start_ms: wire.start_ms,
                            end_ms: wire.end_ms,
                            confidence: wire.confidence,
                            min_confidence: wire.min_confidence,
                            is_final: wire.is_final,
                        };
                        if result_tx.send(segment).await.is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        });

        Ok((Box::new(WsSession { commands: command_tx }), result_rx))
    }
}
