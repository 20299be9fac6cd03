//! Media transport contract and the WebSocket bridge implementation.
//!
//! The WebRTC stack itself is a collaborator; the worker only needs
//! participant/audio/VAD events in and PCM/chat/state messages out. The
//! bridge speaks a small JSON protocol to the media server's bot endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use cf_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interrupt flag
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cooperative barge-in signal shared by the TTS loop and playback.
/// Set exactly on wake-word detection of a new utterance.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Completes when the flag is next set (used to abort playback sleeps).
    pub async fn triggered(&self) {
        if self.is_set() {
            return;
        }
        self.notify.notified().await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum MediaEvent {
    ParticipantJoined { user_id: String, user_name: String },
    ParticipantLeft { user_id: String },
    AudioFrame { user_id: String, pcm: Vec<u8> },
    VadSpeechStart { user_id: String },
    VadSpeechEnd { user_id: String },
}

#[async_trait::async_trait]
pub trait MediaTransport: Send + Sync {
    /// Join the meeting as the bot participant and start the event feed.
    async fn connect(&self) -> Result<mpsc::Receiver<MediaEvent>>;
    async fn disconnect(&self);
    /// Play PCM into the meeting, checking `interrupt` between frames.
    /// Returns `true` if playback ran to completion.
    async fn play_pcm(&self, pcm: &[u8], interrupt: &InterruptFlag) -> Result<bool>;
    async fn send_chat_message(&self, text: &str) -> Result<()>;
    /// Agent UI state: `listening` / `thinking` / `speaking` / `idle`.
    async fn send_agent_state(&self, state: &str) -> Result<()>;
    /// Ephemeral progress text shown above the bot avatar.
    async fn send_agent_status(&self, text: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebSocket bridge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// PCM frame duration used when pacing playback into the bridge.
const FRAME_MS: u64 = 20;
/// 48 kHz, 16-bit mono.
const PLAYBACK_BYTES_PER_FRAME: usize = 48_000 * 2 / 1000 * FRAME_MS as usize;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum BridgeInbound {
    #[serde(rename_all = "camelCase")]
    ParticipantJoined { user_id: String, user_name: String },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { user_id: String },
    #[serde(rename_all = "camelCase")]
    Audio { user_id: String, pcm: String },
    #[serde(rename_all = "camelCase")]
    Vad { user_id: String, event: String },
}

pub struct BridgeTransport {
    url: String,
    meeting_id: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    outbound: Mutex<Option<mpsc::Sender<WsMessage>>>,
}

impl BridgeTransport {
    pub fn new(
        url: &str,
        meeting_id: &str,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            meeting_id: meeting_id.to_string(),
            api_key,
            api_secret,
            outbound: Mutex::new(None),
        }
    }

    async fn send_json(&self, value: serde_json::Value) -> Result<()> {
        let sender = self.outbound.lock().clone();
        let Some(sender) = sender else {
            return Err(Error::external("media", "bridge not connected"));
        };
        sender
            .send(WsMessage::Text(value.to_string()))
            .await
            .map_err(|_| Error::external("media", "bridge connection closed"))
    }

    async fn send_binary(&self, bytes: Vec<u8>) -> Result<()> {
        let sender = self.outbound.lock().clone();
        let Some(sender) = sender else {
            return Err(Error::external("media", "bridge not connected"));
        };
        sender
            .send(WsMessage::Binary(bytes))
            .await
            .map_err(|_| Error::external("media", "bridge connection closed"))
    }
}

#[async_trait::async_trait]
impl MediaTransport for BridgeTransport {
    async fn connect(&self) -> Result<mpsc::Receiver<MediaEvent>> {
        let mut url = format!("{}/bot?meetingId={}", self.url, self.meeting_id);
        if let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) {
            url.push_str(&format!("&apiKey={key}&apiSecret={secret}"));
        }

        let (socket, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::external("media", e))?;
        let (mut sink, mut stream) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WsMessage>(256);
        *self.outbound.lock() = Some(outbound_tx);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        let (event_tx, event_rx) = mpsc::channel::<MediaEvent>(256);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let Ok(WsMessage::Text(text)) = message else {
                    if matches!(message, Ok(WsMessage::Close(_)) | Err(_)) {
                        break;
                    }
                    continue;
                };
                let Ok(inbound) = serde_json::from_str::<BridgeInbound>(&text) else {
                    tracing::debug!("ignoring unparseable bridge frame");
                    continue;
                };
                let event = match inbound {
                    BridgeInbound::ParticipantJoined { user_id, user_name } => {
                        MediaEvent::ParticipantJoined { user_id, user_name }
                    }
                    BridgeInbound::ParticipantLeft { user_id } => {
                        MediaEvent::ParticipantLeft { user_id }
                    }
                    BridgeInbound::Audio { user_id, pcm } => {
                        let Ok(pcm) =
                            base64::engine::general_purpose::STANDARD.decode(pcm.as_bytes())
                        else {
                            continue;
                        };
                        MediaEvent::AudioFrame { user_id, pcm }
                    }
                    BridgeInbound::Vad { user_id, event } => match event.as_str() {
                        "speech_start" => MediaEvent::VadSpeechStart { user_id },
                        "speech_end" => MediaEvent::VadSpeechEnd { user_id },
                        _ => continue,
                    },
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            tracing::info!("media bridge stream closed");
        });

        Ok(event_rx)
    }

    async fn disconnect(&self) {
        *self.outbound.lock() = None;
    }

    async fn play_pcm(&self, pcm: &[u8], interrupt: &InterruptFlag) -> Result<bool> {
        for frame in pcm.chunks(PLAYBACK_BYTES_PER_FRAME) {
            if interrupt.is_set() {
                return Ok(false);
            }
            self.send_binary(frame.to_vec()).await?;
            // Pace frames in real time; wake immediately on barge-in.
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(FRAME_MS)) => {}
                _ = interrupt.triggered() => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn send_chat_message(&self, text: &str) -> Result<()> {
        self.send_json(serde_json::json!({ "type": "chat", "content": text })).await
    }

    async fn send_agent_state(&self, state: &str) -> Result<()> {
        self.send_json(serde_json::json!({ "type": "agent-state", "state": state })).await
    }

    async fn send_agent_status(&self, text: &str) -> Result<()> {
        self.send_json(serde_json::json!({ "type": "agent-status", "content": text })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_flag_set_clear() {
        let flag = InterruptFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.clear();
        assert!(!flag.is_set());
    }

    #[tokio::test]
    async fn triggered_returns_immediately_when_set() {
        let flag = InterruptFlag::new();
        flag.set();
        tokio::time::timeout(std::time::Duration::from_millis(10), flag.triggered())
            .await
            .expect("already-set flag must not block");
    }

    #[test]
    fn bridge_inbound_parses() {
        let joined: BridgeInbound = serde_json::from_str(
            r#"{"type":"participant-joined","userId":"u1","userName":"Ana"}"#,
        )
        .unwrap();
        assert!(matches!(joined, BridgeInbound::ParticipantJoined { .. }));

        let vad: BridgeInbound =
            serde_json::from_str(r#"{"type":"vad","userId":"u1","event":"speech_end"}"#).unwrap();
        assert!(matches!(vad, BridgeInbound::Vad { .. }));
    }
}
