//! REST/SSE client workers use to talk to the gateway: transcript upload,
//! context updates, meeting completion, and the agent event stream.

use futures_util::StreamExt;

use cf_domain::error::{Error, Result};
use cf_domain::stream::{AgentEvent, BoxStream};
use cf_domain::transcript::{TranscriptSegmentRequest, TranscriptSegmentResponse};
use cf_providers::sse;

pub struct BackendClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::external("backend", e))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            Err(Error::External {
                service: "backend".into(),
                message: format!("HTTP {status}: {detail}"),
            })
        }
    }

    /// Persist a finalized STT segment; the gateway assigns the monotonic id.
    pub async fn send_transcript_segment(
        &self,
        meeting_id: &str,
        segment: &TranscriptSegmentRequest,
    ) -> Result<TranscriptSegmentResponse> {
        let url = format!("{}/v1/meetings/{meeting_id}/transcript-segments", self.base_url);
        let response = self
            .request(self.http.post(&url).json(segment))
            .send()
            .await
            .map_err(|e| Error::external("backend", e))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::external("backend", e))
    }

    /// Context pre-warm / realtime refresh up to the given transcript id.
    pub async fn update_agent_context(
        &self,
        meeting_id: &str,
        pre_transcript_id: Option<u64>,
    ) -> Result<()> {
        let url = format!("{}/v1/meetings/{meeting_id}/agent-context", self.base_url);
        let response = self
            .request(
                self.http
                    .post(&url)
                    .json(&serde_json::json!({ "pre_transcript_id": pre_transcript_id })),
            )
            .send()
            .await
            .map_err(|e| Error::external("backend", e))?;
        Self::check(response).await?;
        Ok(())
    }

    /// Report meeting completion after the grace period.
    pub async fn complete_meeting(&self, meeting_id: &str) -> Result<()> {
        let url = format!("{}/v1/meetings/{meeting_id}/complete", self.base_url);
        let response = self
            .request(self.http.post(&url))
            .send()
            .await
            .map_err(|e| Error::external("backend", e))?;
        Self::check(response).await?;
        Ok(())
    }

    /// Consume the agent SSE stream for a wake-word-triggered transcript.
    /// Unknown event names are dropped; the stream ends at `done`/`error`.
    pub async fn stream_agent_events(
        &self,
        meeting_id: &str,
        transcript_id: u64,
    ) -> Result<BoxStream<'static, Result<AgentEvent>>> {
        let url = format!(
            "{}/v1/meetings/{meeting_id}/agent-stream?transcript_id={transcript_id}",
            self.base_url
        );
        let response = self
            .request(self.http.get(&url))
            .send()
            .await
            .map_err(|e| Error::external("backend", e))?;
        let response = Self::check(response).await?;

        let frames = sse::frame_stream(response, "backend");
        let stream = async_stream::stream! {
            let mut frames = frames;
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) => {
                        let Some(name) = frame.event.as_deref() else {
                            continue;
                        };
                        let Some(event) = AgentEvent::from_frame(name, &frame.data) else {
                            tracing::debug!(event = name, "ignoring unknown agent event");
                            continue;
                        };
                        let terminal =
                            matches!(event, AgentEvent::Done | AgentEvent::Error { .. });
                        yield Ok(event);
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
