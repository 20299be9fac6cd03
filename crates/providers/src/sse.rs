//! Shared SSE parsing used by the LLM adapter and the worker's agent-event
//! stream.
//!
//! Events are delimited by `\n\n`. Each block may carry `event:`, `data:`,
//! `id:` and `retry:` lines; we keep the event name (the agent contract
//! routes on it) and the data payload.

use cf_domain::error::{Error, Result};
use cf_domain::stream::BoxStream;

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// Concatenated `data:` payload.
    pub data: String,
}

/// Extract complete frames from an SSE buffer.
///
/// The buffer is drained in place: consumed bytes are removed and any
/// trailing partial event remains for the next call. Blocks without a
/// `data:` line are skipped.
pub fn drain_frames(buffer: &mut String) -> Vec<SseFrame> {
    let mut frames = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // remove the \n\n delimiter

        let mut event = None;
        let mut data_lines: Vec<String> = Vec::new();
        for line in block.lines() {
            let line = line.trim();
            if let Some(name) = line.strip_prefix("event:") {
                event = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }

        if !data_lines.is_empty() {
            frames.push(SseFrame {
                event,
                data: data_lines.join("\n"),
            });
        } else if event.is_some() {
            // Event with no payload (e.g. `event: done`).
            frames.push(SseFrame {
                event,
                data: String::new(),
            });
        }
    }

    frames
}

/// Build a stream of [`SseFrame`]s from a `reqwest::Response`.
///
/// Buffers incoming chunks, drains complete frames, and flushes any partial
/// trailing event when the body closes.
pub fn frame_stream(
    response: reqwest::Response,
    service: &'static str,
) -> BoxStream<'static, Result<SseFrame>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for frame in drain_frames(&mut buffer) {
                        yield Ok(frame);
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for frame in drain_frames(&mut buffer) {
                            yield Ok(frame);
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(Error::external(service, e));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_frame() {
        let mut buf = String::from("event: message\ndata: {\"content\":\"hi\"}\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("message"));
        assert_eq!(frames[0].data, "{\"content\":\"hi\"}");
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_frames() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "first");
        assert_eq!(frames[1].data, "second");
    }

    #[test]
    fn partial_frame_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn event_without_data_is_kept() {
        let mut buf = String::from("event: done\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("done"));
        assert!(frames[0].data.is_empty());
    }

    #[test]
    fn ignores_id_and_retry_lines() {
        let mut buf = String::from("id: 42\nretry: 5000\nevent: status\ndata: payload\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("status"));
        assert_eq!(frames[0].data, "payload");
    }

    #[test]
    fn incremental_buffering() {
        let mut buf = String::from("data: chunk1");
        assert!(drain_frames(&mut buf).is_empty());

        buf.push_str("\n\nevent: message\ndata: chunk2\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, "chunk1");
        assert_eq!(frames[1].event.as_deref(), Some("message"));
        assert!(buf.is_empty());
    }

    #[test]
    fn done_sentinel_preserved() {
        let mut buf = String::from("data: [DONE]\n\n");
        let frames = drain_frames(&mut buf);
        assert_eq!(frames[0].data, "[DONE]");
    }
}
