//! Persistence collaborator contracts.
//!
//! The relational metadata store is external to this core; these traits
//! define exactly the operations the core invokes on it. The gateway ships
//! in-memory implementations for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transcript::{TranscriptSegmentRequest, Utterance};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeetingStatus {
    Scheduled,
    Ongoing,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,
    pub team_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub host_id: String,
    pub status: MeetingStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub participant_ids: Vec<String>,
    /// Filled in by the summary pipeline once the meeting completes.
    pub summary: Option<String>,
}

#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn get(&self, meeting_id: &str) -> Result<MeetingRecord>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MeetingRecord>>;
    async fn upcoming_for_user(&self, user_id: &str) -> Result<Vec<MeetingRecord>>;
    async fn create(&self, record: MeetingRecord) -> Result<MeetingRecord>;
    async fn update(&self, record: MeetingRecord) -> Result<MeetingRecord>;
    async fn delete(&self, meeting_id: &str) -> Result<()>;
    /// Enforces the SCHEDULED → ONGOING → COMPLETED transition order,
    /// returning `Conflict` on violations.
    async fn set_status(&self, meeting_id: &str, status: MeetingStatus) -> Result<MeetingRecord>;
    async fn add_participant(&self, meeting_id: &str, user_id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Teams & users
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMemberRecord {
    pub team_id: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub user_name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn get(&self, team_id: &str) -> Result<TeamRecord>;
    async fn teams_for_user(&self, user_id: &str) -> Result<Vec<TeamRecord>>;
    async fn members(&self, team_id: &str) -> Result<Vec<TeamMemberRecord>>;
    async fn team_for_meeting(&self, meeting_id: &str) -> Result<Option<TeamRecord>>;
    async fn user_profile(&self, user_id: &str) -> Result<UserProfile>;
    async fn create(&self, record: TeamRecord) -> Result<TeamRecord>;
    async fn update(&self, record: TeamRecord) -> Result<TeamRecord>;
    async fn delete(&self, team_id: &str) -> Result<()>;
    /// Returns `Conflict` if the user is already a member.
    async fn add_member(&self, team_id: &str, user_id: &str, user_name: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcripts & chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persist a finalized segment, assigning the next monotonic id for the
    /// meeting, and return the stored utterance.
    async fn append(
        &self,
        meeting_id: &str,
        segment: TranscriptSegmentRequest,
    ) -> Result<Utterance>;
    /// Most recent utterances, oldest first.
    async fn recent(&self, meeting_id: &str, limit: usize) -> Result<Vec<Utterance>>;
    async fn get(&self, meeting_id: &str, utterance_id: u64) -> Result<Utterance>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub id: String,
    pub meeting_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(
        &self,
        meeting_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<ChatMessageRecord>;
}
