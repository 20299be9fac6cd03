//! Streaming event types: LLM token streams and the agent SSE contract
//! consumed by workers.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM and agent streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while streaming an LLM completion.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text token chunk.
    Token { text: String },
    /// Stream is finished.
    Done { finish_reason: Option<String> },
    /// An error occurred during streaming.
    Error { message: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent SSE contract (orchestration → worker)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events the orchestration service streams to workers over SSE.
///
/// Wire form: `event: <name>` + `data: {"content": ...}`. Workers consume
/// strictly: the first `status` flips the UI to "thinking", the first
/// `message` chunk to "speaking".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentEvent {
    Status { content: String },
    Message { content: String },
    Done,
    Error { message: String },
}

impl AgentEvent {
    /// SSE `event:` field name.
    pub fn event_name(&self) -> &'static str {
        match self {
            AgentEvent::Status { .. } => "status",
            AgentEvent::Message { .. } => "message",
            AgentEvent::Done => "done",
            AgentEvent::Error { .. } => "error",
        }
    }

    /// SSE `data:` payload.
    pub fn data(&self) -> serde_json::Value {
        match self {
            AgentEvent::Status { content } | AgentEvent::Message { content } => {
                serde_json::json!({ "content": content })
            }
            AgentEvent::Done => serde_json::json!({}),
            AgentEvent::Error { message } => serde_json::json!({ "content": message }),
        }
    }

    /// Rebuild from an SSE frame. Unknown event names are dropped by callers.
    pub fn from_frame(event: &str, data: &str) -> Option<Self> {
        let content = serde_json::from_str::<serde_json::Value>(data)
            .ok()
            .and_then(|v| v.get("content").and_then(|c| c.as_str()).map(String::from))
            .unwrap_or_default();
        match event {
            "status" => Some(AgentEvent::Status { content }),
            "message" => Some(AgentEvent::Message { content }),
            "done" => Some(AgentEvent::Done),
            "error" => Some(AgentEvent::Error { message: content }),
            _ => None,
        }
    }
}
