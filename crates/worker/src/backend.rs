//! Backend API seam.
//!
//! The worker logic talks to this trait; production wires it to
//! [`cf_backend_client::BackendClient`], tests to a scripted double.

use async_trait::async_trait;

use cf_backend_client::BackendClient;
use cf_domain::error::Result;
use cf_domain::stream::{AgentEvent, BoxStream};
use cf_domain::transcript::{TranscriptSegmentRequest, TranscriptSegmentResponse};

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn send_transcript_segment(
        &self,
        meeting_id: &str,
        segment: &TranscriptSegmentRequest,
    ) -> Result<TranscriptSegmentResponse>;

    async fn update_agent_context(
        &self,
        meeting_id: &str,
        pre_transcript_id: Option<u64>,
    ) -> Result<()>;

    async fn complete_meeting(&self, meeting_id: &str) -> Result<()>;

    async fn stream_agent_events(
        &self,
        meeting_id: &str,
        transcript_id: u64,
    ) -> Result<BoxStream<'static, Result<AgentEvent>>>;
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn send_transcript_segment(
        &self,
        meeting_id: &str,
        segment: &TranscriptSegmentRequest,
    ) -> Result<TranscriptSegmentResponse> {
        BackendClient::send_transcript_segment(self, meeting_id, segment).await
    }

    async fn update_agent_context(
        &self,
        meeting_id: &str,
        pre_transcript_id: Option<u64>,
    ) -> Result<()> {
        BackendClient::update_agent_context(self, meeting_id, pre_transcript_id).await
    }

    async fn complete_meeting(&self, meeting_id: &str) -> Result<()> {
        BackendClient::complete_meeting(self, meeting_id).await
    }

    async fn stream_agent_events(
        &self,
        meeting_id: &str,
        transcript_id: u64,
    ) -> Result<BoxStream<'static, Result<AgentEvent>>> {
        BackendClient::stream_agent_events(self, meeting_id, transcript_id).await
    }
}
