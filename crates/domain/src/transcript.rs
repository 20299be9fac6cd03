//! Transcript and context data model: utterances, topic segments and the
//! periodic context snapshot shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finalized STT segment attributed to one speaker.
///
/// Created by the worker on STT finalization, never mutated afterwards.
/// Ids are assigned by the transcript store and are strictly increasing
/// within a meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub id: u64,
    pub speaker_id: String,
    pub speaker_name: String,
    pub text: String,
    /// Meeting-relative milliseconds.
    pub start_ms: u64,
    pub end_ms: u64,
    pub absolute_timestamp: DateTime<Utc>,
    /// STT confidence in `[0, 1]`.
    pub confidence: f32,
    /// Topic assigned by the context engine at ingest.
    #[serde(default)]
    pub topic: Option<String>,
}

/// An L1 entry: the digest of a contiguous utterance range under one topic.
///
/// Created on the first L1 update for a topic and afterwards only extended
/// by recursive summarization; prior segments are read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSegment {
    pub id: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub key_decisions: Vec<String>,
    #[serde(default)]
    pub pending_items: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub start_utterance_id: u64,
    pub end_utterance_id: u64,
}

/// Periodic snapshot of a meeting's context state, written to the
/// persistence collaborator so a restarted worker can pick up mid-meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub meeting_id: String,
    pub current_topic: String,
    pub l1_segments: Vec<TopicSegment>,
    pub last_summarized_utterance_id: Option<u64>,
    pub last_l1_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speakers_stats: Option<serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript upload (worker → gateway)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegmentRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub confidence: f32,
    #[serde(default)]
    pub min_confidence: Option<f32>,
    #[serde(default)]
    pub agent_call: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_call_keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_call_confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegmentResponse {
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips() {
        let snapshot = ContextSnapshot {
            meeting_id: "m1".into(),
            current_topic: "Pricing".into(),
            l1_segments: vec![TopicSegment {
                id: "s1".into(),
                name: "Intro".into(),
                summary: "Kickoff.".into(),
                key_points: vec!["scope agreed".into()],
                key_decisions: vec![],
                pending_items: vec![],
                participants: vec!["Ana".into()],
                keywords: vec!["kickoff".into()],
                start_utterance_id: 1,
                end_utterance_id: 12,
            }],
            last_summarized_utterance_id: Some(12),
            last_l1_update: Utc::now(),
            speakers_stats: None,
        };
        let raw = serde_json::to_string(&snapshot).unwrap();
        let back: ContextSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.current_topic, "Pricing");
        assert_eq!(back.l1_segments.len(), 1);
        assert_eq!(back.last_summarized_utterance_id, Some(12));
    }

    #[test]
    fn segment_request_defaults() {
        let raw = r#"{"user_id":"u1","start_ms":0,"end_ms":900,"text":"hi","confidence":0.92}"#;
        let req: TranscriptSegmentRequest = serde_json::from_str(raw).unwrap();
        assert!(!req.agent_call);
        assert!(req.agent_call_keyword.is_none());
    }
}
