use serde::{Deserialize, Serialize};

/// Knobs for the per-meeting context engine (L0 buffers, L1 summarization
/// cadence, topic detection, snapshot cadence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Capacity of the raw L0 window.
    #[serde(default = "d_l0_max_turns")]
    pub l0_max_turns: usize,
    /// Capacity of the current-topic buffer. Bounds memory when a topic
    /// never transitions.
    #[serde(default = "d_l0_topic_buffer_max_turns")]
    pub l0_topic_buffer_max_turns: usize,
    /// Include wall-clock timestamps when formatting utterances for prompts.
    #[serde(default)]
    pub l0_include_timestamps: bool,

    /// Unsummarized-turn count that triggers an L1 update.
    #[serde(default = "d_l1_update_turn_threshold")]
    pub l1_update_turn_threshold: usize,
    /// Minutes since the last L1 update that trigger a time-based update.
    #[serde(default = "d_l1_update_interval_minutes")]
    pub l1_update_interval_minutes: u64,
    /// Minimum new utterances required for the time-based trigger to fire.
    #[serde(default = "d_l1_min_new_utterances_for_time_trigger")]
    pub l1_min_new_utterances_for_time_trigger: usize,
    /// Run the LLM topic detector every N turns. 0 disables the periodic check.
    #[serde(default = "d_l1_topic_check_interval_turns")]
    pub l1_topic_check_interval_turns: usize,
    /// Keyword-based fast path for topic-transition hints.
    #[serde(default = "d_true")]
    pub topic_quick_check_enabled: bool,
    /// Token cap for summarization calls.
    #[serde(default = "d_l1_summary_max_tokens")]
    pub l1_summary_max_tokens: u32,

    /// Per-speaker buffer cap in the speaker context tracker.
    #[serde(default = "d_speaker_buffer_max_per_speaker")]
    pub speaker_buffer_max_per_speaker: usize,

    /// Snapshot after this many ingested utterances.
    #[serde(default = "d_db_sync_utterance_threshold")]
    pub db_sync_utterance_threshold: usize,
    /// Snapshot at least this often regardless of volume.
    #[serde(default = "d_db_sync_interval_seconds")]
    pub db_sync_interval_seconds: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            l0_max_turns: d_l0_max_turns(),
            l0_topic_buffer_max_turns: d_l0_topic_buffer_max_turns(),
            l0_include_timestamps: false,
            l1_update_turn_threshold: d_l1_update_turn_threshold(),
            l1_update_interval_minutes: d_l1_update_interval_minutes(),
            l1_min_new_utterances_for_time_trigger: d_l1_min_new_utterances_for_time_trigger(),
            l1_topic_check_interval_turns: d_l1_topic_check_interval_turns(),
            topic_quick_check_enabled: true,
            l1_summary_max_tokens: d_l1_summary_max_tokens(),
            speaker_buffer_max_per_speaker: d_speaker_buffer_max_per_speaker(),
            db_sync_utterance_threshold: d_db_sync_utterance_threshold(),
            db_sync_interval_seconds: d_db_sync_interval_seconds(),
        }
    }
}

fn d_l0_max_turns() -> usize {
    50
}

fn d_l0_topic_buffer_max_turns() -> usize {
    200
}

fn d_l1_update_turn_threshold() -> usize {
    12
}

fn d_l1_update_interval_minutes() -> u64 {
    5
}

fn d_l1_min_new_utterances_for_time_trigger() -> usize {
    3
}

fn d_l1_topic_check_interval_turns() -> usize {
    6
}

fn d_l1_summary_max_tokens() -> u32 {
    800
}

fn d_speaker_buffer_max_per_speaker() -> usize {
    30
}

fn d_db_sync_utterance_threshold() -> usize {
    20
}

fn d_db_sync_interval_seconds() -> u64 {
    120
}

fn d_true() -> bool {
    true
}
