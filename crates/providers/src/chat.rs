//! Chat-completions LLM adapter.
//!
//! Talks to any endpoint that follows the OpenAI chat completions contract
//! (Clova Studio's OpenAI-compatible surface in production). Non-streaming
//! calls carry tool definitions for the planner; streaming calls feed the
//! response generator token by token.

use serde_json::Value;

use cf_domain::config::LlmConfig;
use cf_domain::error::{Error, Result};
use cf_domain::stream::{BoxStream, StreamEvent};
use cf_domain::tool::{ChatMessage, ChatRole, ToolCall, ToolDefinition};

use crate::sse;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

pub struct ChatApiProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    default_max_tokens: u32,
    client: reqwest::Client,
}

impl ChatApiProvider {
    /// Build from config. Returns `None` when the API key env var is unset
    /// so callers can fall back to deterministic paths.
    pub fn from_config(cfg: &LlmConfig) -> Option<Result<Self>> {
        let api_key = std::env::var(&cfg.api_key_env).ok()?;
        Some(Self::new(cfg, api_key))
    }

    pub fn new(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::external("llm", e))?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            default_temperature: cfg.temperature,
            default_max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();
        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "temperature": req.temperature.unwrap_or(self.default_temperature),
            "max_tokens": req.max_tokens.unwrap_or(self.default_max_tokens),
            "stream": stream,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    async fn post(&self, body: Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::external("llm", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::External {
                service: "llm".into(),
                message: format!("HTTP {status}: {}", truncate(&detail, 300)),
            });
        }
        Ok(response)
    }
}

fn msg_to_wire(msg: &ChatMessage) -> Value {
    let role = match msg.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    };
    serde_json::json!({ "role": role, "content": msg.content })
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pull the assistant message out of a non-streaming completion payload.
fn parse_completion(value: &Value) -> ChatResponse {
    let choice = &value["choices"][0];
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let name = call["function"]["name"].as_str().unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            let raw_args = call["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments = serde_json::from_str(raw_args).unwrap_or_else(|e| {
                tracing::warn!(tool = name, error = %e, "tool call arguments are not valid JSON; defaulting to empty object");
                Value::Object(Default::default())
            });
            tool_calls.push(ToolCall {
                call_id: call["id"].as_str().unwrap_or_default().to_string(),
                tool_name: name.to_string(),
                arguments,
            });
        }
    }

    ChatResponse {
        content,
        tool_calls,
        finish_reason: choice["finish_reason"].as_str().map(String::from),
    }
}

#[async_trait::async_trait]
impl LlmProvider for ChatApiProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(&req, false);
        let response = self.post(body).await?;
        let value: Value = response.json().await.map_err(|e| Error::external("llm", e))?;
        Ok(parse_completion(&value))
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_body(&req, true);
        let response = self.post(body).await?;

        let frames = sse::frame_stream(response, "llm");
        let stream = async_stream::stream! {
            let mut frames = frames;
            let mut done_emitted = false;
            use futures_util::StreamExt;
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) => {
                        if frame.data == "[DONE]" {
                            if !done_emitted {
                                done_emitted = true;
                                yield Ok(StreamEvent::Done { finish_reason: Some("stop".into()) });
                            }
                            break;
                        }
                        let Ok(value) = serde_json::from_str::<Value>(&frame.data) else {
                            continue;
                        };
                        let choice = &value["choices"][0];
                        if let Some(text) = choice["delta"]["content"].as_str() {
                            if !text.is_empty() {
                                yield Ok(StreamEvent::Token { text: text.to_string() });
                            }
                        }
                        if let Some(reason) = choice["finish_reason"].as_str() {
                            done_emitted = true;
                            yield Ok(StreamEvent::Done { finish_reason: Some(reason.to_string()) });
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
            if !done_emitted {
                yield Ok(StreamEvent::Done { finish_reason: Some("stop".into()) });
            }
        };

        Ok(Box::pin(stream))
    }
}
