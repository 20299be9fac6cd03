//! Per-speaker utterance tracking.
//!
//! Keeps a bounded recent-utterance buffer per speaker plus simple stats
//! that ride along in the context snapshot.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cf_domain::transcript::Utterance;

#[derive(Debug, Clone, Serialize)]
pub struct SpeakerStats {
    pub speaker_name: String,
    pub utterance_count: usize,
    pub last_spoke_at: DateTime<Utc>,
}

pub struct SpeakerContext {
    max_buffer_per_speaker: usize,
    buffers: HashMap<String, VecDeque<Utterance>>,
    stats: HashMap<String, SpeakerStats>,
}

impl SpeakerContext {
    pub fn new(max_buffer_per_speaker: usize) -> Self {
        Self {
            max_buffer_per_speaker,
            buffers: HashMap::new(),
            stats: HashMap::new(),
        }
    }

    pub fn add_utterance(&mut self, utterance: &Utterance) {
        let buffer = self.buffers.entry(utterance.speaker_id.clone()).or_default();
        if buffer.len() == self.max_buffer_per_speaker {
            buffer.pop_front();
        }
        buffer.push_back(utterance.clone());

        let stats = self
            .stats
            .entry(utterance.speaker_id.clone())
            .or_insert_with(|| SpeakerStats {
                speaker_name: utterance.speaker_name.clone(),
                utterance_count: 0,
                last_spoke_at: utterance.absolute_timestamp,
            });
        stats.speaker_name = utterance.speaker_name.clone();
        stats.utterance_count += 1;
        stats.last_spoke_at = utterance.absolute_timestamp;
    }

    pub fn speakers(&self) -> Vec<&str> {
        self.stats.values().map(|s| s.speaker_name.as_str()).collect()
    }

    pub fn recent_for(&self, speaker_id: &str) -> Vec<Utterance> {
        self.buffers
            .get(speaker_id)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot payload: speaker_id → stats.
    pub fn stats_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.stats).unwrap_or(serde_json::Value::Null)
    }
}
