//! In-memory implementations of the persistence collaborator contracts.
//!
//! The production deployment points these traits at the relational store;
//! dev setups and tests run on these.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use cf_domain::error::{Error, Result};
use cf_domain::stores::{
    ChatMessageRecord, ChatStore, MeetingRecord, MeetingStatus, MeetingStore, TeamMemberRecord,
    TeamRecord, TeamStore, TranscriptStore, UserProfile,
};
use cf_domain::transcript::{TranscriptSegmentRequest, Utterance};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Meetings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryMeetingStore {
    meetings: RwLock<HashMap<String, MeetingRecord>>,
}

impl InMemoryMeetingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn transition_allowed(from: MeetingStatus, to: MeetingStatus) -> bool {
    matches!(
        (from, to),
        (MeetingStatus::Scheduled, MeetingStatus::Ongoing)
            | (MeetingStatus::Ongoing, MeetingStatus::Completed)
    )
}

#[async_trait]
impl MeetingStore for InMemoryMeetingStore {
    async fn get(&self, meeting_id: &str) -> Result<MeetingRecord> {
        self.meetings
            .read()
            .get(meeting_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("meeting {meeting_id}")))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MeetingRecord>> {
        let mut list: Vec<MeetingRecord> = self
            .meetings
            .read()
            .values()
            .filter(|m| m.participant_ids.iter().any(|p| p == user_id) || m.host_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        Ok(list)
    }

    async fn upcoming_for_user(&self, user_id: &str) -> Result<Vec<MeetingRecord>> {
        let now = Utc::now();
        Ok(self
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(|m| {
                m.status == MeetingStatus::Scheduled
                    && m.scheduled_at.map(|t| t > now).unwrap_or(true)
            })
            .collect())
    }

    async fn create(&self, record: MeetingRecord) -> Result<MeetingRecord> {
        let mut meetings = self.meetings.write();
        if meetings.contains_key(&record.id) {
            return Err(Error::Conflict(format!("meeting {} already exists", record.id)));
        }
        meetings.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, record: MeetingRecord) -> Result<MeetingRecord> {
        let mut meetings = self.meetings.write();
        if !meetings.contains_key(&record.id) {
            return Err(Error::NotFound(format!("meeting {}", record.id)));
        }
        meetings.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, meeting_id: &str) -> Result<()> {
        self.meetings
            .write()
            .remove(meeting_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("meeting {meeting_id}")))
    }

    async fn set_status(&self, meeting_id: &str, status: MeetingStatus) -> Result<MeetingRecord> {
        let mut meetings = self.meetings.write();
        let meeting = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| Error::NotFound(format!("meeting {meeting_id}")))?;
        if !transition_allowed(meeting.status, status) {
            return Err(Error::Conflict(format!(
                "cannot transition meeting {meeting_id} from {:?} to {status:?}",
                meeting.status
            )));
        }
        meeting.status = status;
        Ok(meeting.clone())
    }

    async fn add_participant(&self, meeting_id: &str, user_id: &str) -> Result<()> {
        let mut meetings = self.meetings.write();
        let meeting = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| Error::NotFound(format!("meeting {meeting_id}")))?;
        if meeting.participant_ids.iter().any(|p| p == user_id) {
            return Err(Error::Conflict(format!(
                "user {user_id} already in meeting {meeting_id}"
            )));
        }
        meeting.participant_ids.push(user_id.to_string());
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Teams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryTeamStore {
    teams: RwLock<HashMap<String, TeamRecord>>,
    members: RwLock<Vec<TeamMemberRecord>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
    meeting_teams: RwLock<HashMap<String, String>>,
}

impl InMemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_profile(&self, profile: UserProfile) {
        self.profiles.write().insert(profile.user_id.clone(), profile);
    }

    pub fn bind_meeting(&self, meeting_id: &str, team_id: &str) {
        self.meeting_teams
            .write()
            .insert(meeting_id.to_string(), team_id.to_string());
    }
}

#[async_trait]
impl TeamStore for InMemoryTeamStore {
    async fn get(&self, team_id: &str) -> Result<TeamRecord> {
        self.teams
            .read()
            .get(team_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("team {team_id}")))
    }

    async fn teams_for_user(&self, user_id: &str) -> Result<Vec<TeamRecord>> {
        let members = self.members.read();
        let teams = self.teams.read();
        let mut list: Vec<TeamRecord> = members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| teams.get(&m.team_id).cloned())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn members(&self, team_id: &str) -> Result<Vec<TeamMemberRecord>> {
        Ok(self
            .members
            .read()
            .iter()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn team_for_meeting(&self, meeting_id: &str) -> Result<Option<TeamRecord>> {
        let team_id = self.meeting_teams.read().get(meeting_id).cloned();
        match team_id {
            Some(team_id) => Ok(self.teams.read().get(&team_id).cloned()),
            None => Ok(None),
        }
    }

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }

    async fn create(&self, record: TeamRecord) -> Result<TeamRecord> {
        self.teams.write().insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, record: TeamRecord) -> Result<TeamRecord> {
        let mut teams = self.teams.write();
        if !teams.contains_key(&record.id) {
            return Err(Error::NotFound(format!("team {}", record.id)));
        }
        teams.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, team_id: &str) -> Result<()> {
        self.members.write().retain(|m| m.team_id != team_id);
        self.teams
            .write()
            .remove(team_id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("team {team_id}")))
    }

    async fn add_member(&self, team_id: &str, user_id: &str, user_name: &str) -> Result<()> {
        let mut members = self.members.write();
        if members.iter().any(|m| m.team_id == team_id && m.user_id == user_id) {
            return Err(Error::Conflict(format!(
                "user {user_id} already in team {team_id}"
            )));
        }
        members.push(TeamMemberRecord {
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        });
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcripts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct MeetingTranscript {
    next_id: u64,
    utterances: Vec<Utterance>,
}

/// Assigns strictly increasing utterance ids per meeting.
#[derive(Default)]
pub struct InMemoryTranscriptStore {
    transcripts: RwLock<HashMap<String, MeetingTranscript>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn append(
        &self,
        meeting_id: &str,
        segment: TranscriptSegmentRequest,
    ) -> Result<Utterance> {
        let mut transcripts = self.transcripts.write();
        let transcript = transcripts.entry(meeting_id.to_string()).or_default();
        transcript.next_id += 1;
        let utterance = Utterance {
            id: transcript.next_id,
            speaker_id: segment.user_id.clone(),
            speaker_name: segment.user_name.clone().unwrap_or(segment.user_id),
            text: segment.text,
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            absolute_timestamp: Utc::now(),
            confidence: segment.confidence,
            topic: None,
        };
        transcript.utterances.push(utterance.clone());
        Ok(utterance)
    }

    async fn recent(&self, meeting_id: &str, limit: usize) -> Result<Vec<Utterance>> {
        let transcripts = self.transcripts.read();
        let Some(transcript) = transcripts.get(meeting_id) else {
            return Ok(vec![]);
        };
        let utterances = &transcript.utterances;
        let start = utterances.len().saturating_sub(limit);
        Ok(utterances[start..].to_vec())
    }

    async fn get(&self, meeting_id: &str, utterance_id: u64) -> Result<Utterance> {
        self.transcripts
            .read()
            .get(meeting_id)
            .and_then(|t| t.utterances.iter().find(|u| u.id == utterance_id).cloned())
            .ok_or_else(|| Error::NotFound(format!("utterance {utterance_id}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct InMemoryChatStore {
    messages: RwLock<Vec<ChatMessageRecord>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, meeting_id: &str) -> Vec<ChatMessageRecord> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.meeting_id == meeting_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn append(
        &self,
        meeting_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<ChatMessageRecord> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("empty chat message".into()));
        }
        let record = ChatMessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            meeting_id: meeting_id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.write().push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(user: &str, text: &str) -> TranscriptSegmentRequest {
        TranscriptSegmentRequest {
            user_id: user.into(),
            user_name: Some(user.to_uppercase()),
            start_ms: 0,
            end_ms: 1000,
            text: text.into(),
            confidence: 0.9,
            min_confidence: None,
            agent_call: false,
            agent_call_keyword: None,
            agent_call_confidence: None,
        }
    }

    #[tokio::test]
    async fn transcript_ids_are_monotonic_per_meeting() {
        let store = InMemoryTranscriptStore::new();
        let a = store.append("m1", segment("u1", "one")).await.unwrap();
        let b = store.append("m1", segment("u2", "two")).await.unwrap();
        let other = store.append("m2", segment("u1", "first")).await.unwrap();

        assert!(a.id < b.id);
        assert_eq!(other.id, 1);

        let recent = store.recent("m1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, a.id);
    }

    #[tokio::test]
    async fn meeting_status_transitions_enforced() {
        let store = InMemoryMeetingStore::new();
        store
            .create(MeetingRecord {
                id: "m1".into(),
                team_id: None,
                title: "주간 회의".into(),
                description: None,
                host_id: "h".into(),
                status: MeetingStatus::Scheduled,
                scheduled_at: None,
                participant_ids: vec!["h".into()],
                summary: None,
            })
            .await
            .unwrap();

        // SCHEDULED → COMPLETED skips a step.
        let err = store
            .set_status("m1", MeetingStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        store.set_status("m1", MeetingStatus::Ongoing).await.unwrap();
        // Starting twice conflicts.
        let err = store.set_status("m1", MeetingStatus::Ongoing).await.unwrap_err();
        assert_eq!(err.code(), "conflict");

        store.set_status("m1", MeetingStatus::Completed).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_team_member_conflicts() {
        let store = InMemoryTeamStore::new();
        store
            .create(TeamRecord {
                id: "t1".into(),
                name: "플랫폼팀".into(),
                description: None,
            })
            .await
            .unwrap();
        store.add_member("t1", "u1", "Ana").await.unwrap();
        let err = store.add_member("t1", "u1", "Ana").await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(store.members("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_chat_message_is_invalid() {
        let store = InMemoryChatStore::new();
        let err = store.append("m1", "u1", "   ").await.unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }
}
