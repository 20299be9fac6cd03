//! Per-meeting context manager.
//!
//! Ingest path: stamp the utterance with the current topic, append to both
//! L0 buffers, then decide whether an L1 update is due (topic change, turn
//! count, or elapsed time). L1 updates are serialized per meeting behind an
//! async gate; ingestion only takes the short state lock, so utterances keep
//! buffering while a summarization is in flight.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use cf_domain::config::ContextConfig;
use cf_domain::transcript::{ContextSnapshot, TopicSegment, Utterance};

use crate::snapshot::SnapshotStore;
use crate::speaker::SpeakerContext;
use crate::summarize::{merge_unique, Summarizer};
use crate::topic::TopicDetector;

const INITIAL_TOPIC: &str = "Intro";

/// Why an L1 update fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    TopicChange,
    ManualTopicChange,
    TurnLimit,
    TimeLimit,
}

impl UpdateReason {
    fn closes_topic(self) -> bool {
        matches!(self, UpdateReason::TopicChange | UpdateReason::ManualTopicChange)
    }

    fn as_str(self) -> &'static str {
        match self {
            UpdateReason::TopicChange => "topic_change",
            UpdateReason::ManualTopicChange => "manual_topic_change",
            UpdateReason::TurnLimit => "turn_limit",
            UpdateReason::TimeLimit => "time_limit",
        }
    }
}

struct Inner {
    l0_buffer: VecDeque<Utterance>,
    l0_topic_buffer: VecDeque<Utterance>,
    l1_segments: Vec<TopicSegment>,
    current_topic: String,
    turn_count_since_l1: usize,
    last_summarized_utterance_id: Option<u64>,
    last_l1_update: DateTime<Utc>,
    utterances_since_db_sync: usize,
    last_db_sync: DateTime<Utc>,
    speakers: SpeakerContext,
}

impl Inner {
    fn unsummarized(&self) -> Vec<Utterance> {
        match self.last_summarized_utterance_id {
            None => self.l0_topic_buffer.iter().cloned().collect(),
            Some(last) => self
                .l0_topic_buffer
                .iter()
                .filter(|u| u.id > last)
                .cloned()
                .collect(),
        }
    }

    fn current_segment_summary(&self) -> String {
        self.l1_segments
            .iter()
            .rev()
            .find(|s| s.name == self.current_topic)
            .map(|s| s.summary.clone())
            .unwrap_or_default()
    }

    fn next_generated_topic_name(&self) -> String {
        format!("Topic_{}", self.l1_segments.len() + 1)
    }

    fn push_bounded(buffer: &mut VecDeque<Utterance>, capacity: usize, utterance: Utterance) {
        if buffer.len() == capacity {
            buffer.pop_front();
        }
        buffer.push_back(utterance);
    }
}

pub struct ContextManager {
    meeting_id: String,
    config: ContextConfig,
    summarizer: Summarizer,
    detector: TopicDetector,
    snapshots: Arc<dyn SnapshotStore>,
    inner: Mutex<Inner>,
    /// Serializes L1 updates; ingestion never blocks on this.
    l1_gate: tokio::sync::Mutex<()>,
}

impl ContextManager {
    pub fn new(
        meeting_id: impl Into<String>,
        config: ContextConfig,
        summarizer: Summarizer,
        detector: TopicDetector,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let now = Utc::now();
        let speakers = SpeakerContext::new(config.speaker_buffer_max_per_speaker);
        Self {
            meeting_id: meeting_id.into(),
            config,
            summarizer,
            detector,
            snapshots,
            inner: Mutex::new(Inner {
                l0_buffer: VecDeque::new(),
                l0_topic_buffer: VecDeque::new(),
                l1_segments: Vec::new(),
                current_topic: INITIAL_TOPIC.to_string(),
                turn_count_since_l1: 0,
                last_summarized_utterance_id: None,
                last_l1_update: now,
                utterances_since_db_sync: 0,
                last_db_sync: now,
                speakers,
            }),
            l1_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Ingest
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn add_utterance(&self, utterance: Utterance) {
        if utterance.text.trim().is_empty() {
            return;
        }

        // Stage 1: buffer under the short state lock and collect what the
        // trigger decision needs.
        let (unsummarized_len, quick_hit, interval_hit, recent_window, previous_summary) = {
            let mut inner = self.inner.lock();
            let mut stamped = utterance;
            stamped.topic = Some(inner.current_topic.clone());

            Inner::push_bounded(&mut inner.l0_buffer, self.config.l0_max_turns, stamped.clone());
            Inner::push_bounded(
                &mut inner.l0_topic_buffer,
                self.config.l0_topic_buffer_max_turns,
                stamped.clone(),
            );
            inner.turn_count_since_l1 += 1;
            inner.speakers.add_utterance(&stamped);

            let quick_hit =
                self.config.topic_quick_check_enabled && self.detector.quick_check(&stamped.text);
            let interval = self.config.l1_topic_check_interval_turns;
            let interval_hit = interval > 0 && inner.turn_count_since_l1 % interval == 0;

            let recent_window: Vec<Utterance> = inner
                .l0_buffer
                .iter()
                .rev()
                .take(5)
                .rev()
                .cloned()
                .collect();
            (
                inner.unsummarized().len(),
                quick_hit,
                interval_hit,
                recent_window,
                inner.current_segment_summary(),
            )
        };

        // Stage 2: trigger decision. Nothing to summarize → no update.
        if unsummarized_len > 0 {
            let mut fired = false;

            if quick_hit || interval_hit {
                let detection = self.detector.detect(&recent_window, &previous_summary).await;
                if detection.topic_changed {
                    self.update_l1(UpdateReason::TopicChange, detection.current_topic)
                        .await;
                    fired = true;
                }
            }

            if !fired {
                if unsummarized_len >= self.config.l1_update_turn_threshold {
                    self.update_l1(UpdateReason::TurnLimit, None).await;
                } else {
                    let elapsed = Utc::now() - self.inner.lock().last_l1_update;
                    if elapsed > Duration::minutes(self.config.l1_update_interval_minutes as i64)
                        && unsummarized_len >= self.config.l1_min_new_utterances_for_time_trigger
                    {
                        self.update_l1(UpdateReason::TimeLimit, None).await;
                    }
                }
            }
        }

        self.maybe_sync_to_db();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // L1 update
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn update_l1(&self, reason: UpdateReason, next_topic: Option<String>) {
        let _gate = self.l1_gate.lock().await;

        // Snapshot inputs under the state lock; release it for the LLM call.
        let (utterances, topic_name, previous_summary) = {
            let inner = self.inner.lock();
            let utterances = inner.unsummarized();
            if utterances.is_empty() {
                return;
            }
            let previous = inner
                .l1_segments
                .iter()
                .rev()
                .find(|s| s.name == inner.current_topic)
                .map(|s| s.summary.clone());
            (utterances, inner.current_topic.clone(), previous)
        };

        tracing::info!(
            meeting_id = %self.meeting_id,
            reason = reason.as_str(),
            new_utterances = utterances.len(),
            "L1 update triggered"
        );

        let last_id = utterances[utterances.len() - 1].id;
        let summarized_names: Vec<String> = crate::summarize::collect_participants(&utterances);

        enum Outcome {
            Extend(crate::summarize::RecursiveSummary),
            Fresh(crate::summarize::TopicSummary),
        }

        let outcome = match &previous_summary {
            Some(previous) => Outcome::Extend(
                self.summarizer
                    .recursive_summarize(previous, &utterances)
                    .await,
            ),
            None => Outcome::Fresh(self.summarizer.summarize_topic(&utterances, &topic_name).await),
        };

        // Apply under the state lock.
        {
            let mut inner = self.inner.lock();
            match outcome {
                Outcome::Extend(payload) => {
                    if let Some(segment) = inner
                        .l1_segments
                        .iter_mut()
                        .rev()
                        .find(|s| s.name == topic_name)
                    {
                        if !payload.summary.is_empty() {
                            segment.summary = payload.summary;
                        }
                        if !payload.key_points.is_empty() {
                            segment.key_points = payload.key_points;
                        }
                        segment.end_utterance_id = last_id;
                        segment.keywords = merge_unique(&segment.keywords, &payload.keywords);
                        segment.participants = merge_unique(&segment.participants, &summarized_names);
                    }
                }
                Outcome::Fresh(payload) => {
                    let segment = TopicSegment {
                        id: uuid::Uuid::new_v4().to_string(),
                        name: topic_name.clone(),
                        summary: payload.summary,
                        key_points: payload.key_points,
                        key_decisions: payload.decisions,
                        pending_items: payload.pending,
                        participants: payload.participants,
                        keywords: payload.keywords,
                        start_utterance_id: utterances[0].id,
                        end_utterance_id: last_id,
                    };
                    inner.l1_segments.push(segment);
                }
            }

            inner.last_summarized_utterance_id = Some(last_id);

            if reason.closes_topic() {
                // Utterances that arrived while the summary ran stay;
                // everything summarized leaves the topic buffer.
                inner.l0_topic_buffer.retain(|u| u.id > last_id);
                inner.last_summarized_utterance_id = None;
                inner.current_topic =
                    next_topic.unwrap_or_else(|| inner.next_generated_topic_name());
            }

            inner.last_l1_update = Utc::now();
            inner.turn_count_since_l1 = 0;
        }

        // Immediate snapshot after every L1 update.
        self.sync_to_db().await;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Snapshots & restore
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn build_snapshot(&self) -> ContextSnapshot {
        let inner = self.inner.lock();
        ContextSnapshot {
            meeting_id: self.meeting_id.clone(),
            current_topic: inner.current_topic.clone(),
            l1_segments: inner.l1_segments.clone(),
            last_summarized_utterance_id: inner.last_summarized_utterance_id,
            last_l1_update: inner.last_l1_update,
            speakers_stats: Some(inner.speakers.stats_json()),
        }
    }

    async fn sync_to_db(&self) {
        let snapshot = self.build_snapshot();
        if let Err(e) = self.snapshots.save(&snapshot).await {
            tracing::error!(meeting_id = %self.meeting_id, error = %e, "context snapshot failed");
        }
        let mut inner = self.inner.lock();
        inner.utterances_since_db_sync = 0;
        inner.last_db_sync = Utc::now();
    }

    /// Fire-and-forget periodic snapshot; never stalls ingestion.
    fn maybe_sync_to_db(&self) {
        let due = {
            let mut inner = self.inner.lock();
            inner.utterances_since_db_sync += 1;
            inner.utterances_since_db_sync >= self.config.db_sync_utterance_threshold
                || (Utc::now() - inner.last_db_sync).num_seconds()
                    >= self.config.db_sync_interval_seconds as i64
        };
        if due {
            let snapshot = self.build_snapshot();
            {
                let mut inner = self.inner.lock();
                inner.utterances_since_db_sync = 0;
                inner.last_db_sync = Utc::now();
            }
            let store = self.snapshots.clone();
            let meeting_id = self.meeting_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.save(&snapshot).await {
                    tracing::error!(meeting_id = %meeting_id, error = %e, "context snapshot failed");
                }
            });
        }
    }

    /// Rebuild L1 state from the latest snapshot. Returns whether one existed.
    pub async fn restore(&self) -> bool {
        match self.snapshots.load(&self.meeting_id).await {
            Ok(Some(snapshot)) => {
                let mut inner = self.inner.lock();
                inner.l1_segments = snapshot.l1_segments;
                inner.current_topic = snapshot.current_topic;
                inner.last_summarized_utterance_id = snapshot.last_summarized_utterance_id;
                inner.last_l1_update = snapshot.last_l1_update;
                tracing::info!(meeting_id = %self.meeting_id, "context restored from snapshot");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::error!(meeting_id = %self.meeting_id, error = %e, "context restore failed");
                false
            }
        }
    }

    /// Lazily refill L0 from the transcript collaborator after a restore.
    pub fn rehydrate_l0(&self, utterances: Vec<Utterance>) {
        let mut inner = self.inner.lock();
        let last = inner.last_summarized_utterance_id;
        for mut utterance in utterances {
            utterance.topic = Some(inner.current_topic.clone());
            Inner::push_bounded(&mut inner.l0_buffer, self.config.l0_max_turns, utterance.clone());
            if last.map_or(true, |id| utterance.id > id) {
                Inner::push_bounded(
                    &mut inner.l0_topic_buffer,
                    self.config.l0_topic_buffer_max_turns,
                    utterance,
                );
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Manual topic control
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn force_topic_change(&self, new_topic_name: impl Into<String>) {
        let new_topic_name = new_topic_name.into();
        let buffered = !self.inner.lock().l0_topic_buffer.is_empty();
        if buffered {
            self.update_l1(UpdateReason::ManualTopicChange, Some(new_topic_name.clone()))
                .await;
        } else {
            self.inner.lock().current_topic = new_topic_name.clone();
        }
        tracing::info!(meeting_id = %self.meeting_id, topic = %new_topic_name, "manual topic change");
    }

    pub fn add_topic_keywords(&self, keywords: Vec<String>) {
        self.detector.add_custom_keywords(keywords);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Accessors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn l0_utterances(&self, limit: Option<usize>) -> Vec<Utterance> {
        let inner = self.inner.lock();
        let all: Vec<Utterance> = inner.l0_buffer.iter().cloned().collect();
        match limit {
            Some(n) if n < all.len() => all[all.len() - n..].to_vec(),
            _ => all,
        }
    }

    pub fn topic_utterances(&self) -> Vec<Utterance> {
        self.inner.lock().l0_topic_buffer.iter().cloned().collect()
    }

    pub fn l1_segments(&self) -> Vec<TopicSegment> {
        self.inner.lock().l1_segments.clone()
    }

    pub fn topic_flow(&self) -> Vec<String> {
        self.inner.lock().l1_segments.iter().map(|s| s.name.clone()).collect()
    }

    pub fn current_topic(&self) -> String {
        self.inner.lock().current_topic.clone()
    }

    pub fn last_summarized_utterance_id(&self) -> Option<u64> {
        self.inner.lock().last_summarized_utterance_id
    }

    /// Current snapshot shape, for callers that persist or inspect state.
    pub fn snapshot(&self) -> ContextSnapshot {
        self.build_snapshot()
    }

    /// Compose the context string handed to the agent pipeline: topic
    /// digests first, then the tail of the raw window.
    pub fn compose_agent_context(&self, recent_limit: usize) -> String {
        let inner = self.inner.lock();
        let mut sections = Vec::new();

        if !inner.l1_segments.is_empty() {
            let digests = inner
                .l1_segments
                .iter()
                .map(|s| format!("## {}\n{}", s.name, s.summary))
                .collect::<Vec<_>>()
                .join("\n\n");
            sections.push(format!("[토픽 요약]\n{digests}"));
        }

        let recent: Vec<String> = inner
            .l0_buffer
            .iter()
            .rev()
            .take(recent_limit)
            .rev()
            .map(|u| format!("[{}] {}", u.speaker_name, u.text))
            .collect();
        if !recent.is_empty() {
            sections.push(format!("[최근 발화]\n{}", recent.join("\n")));
        }

        sections.join("\n\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::InMemorySnapshotStore;
    use cf_domain::error::Result;
    use cf_domain::stream::{BoxStream, StreamEvent};
    use cf_providers::{ChatRequest, ChatResponse, LlmProvider};
    use std::collections::VecDeque as Deque;

    /// LLM double: pops scripted responses; errors once the script runs out.
    struct ScriptedLlm {
        responses: Mutex<Deque<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
            self.calls.lock().push(req.messages[0].content.clone());
            let content = self
                .responses
                .lock()
                .pop_front()
                .ok_or_else(|| cf_domain::Error::external("llm", "script exhausted"))?;
            Ok(ChatResponse {
                content,
                tool_calls: vec![],
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(
            &self,
            _req: ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Ok(Box::pin(futures_util::stream::empty()))
        }
    }

    fn utterance(id: u64, speaker: &str, text: &str) -> Utterance {
        Utterance {
            id,
            speaker_id: speaker.to_lowercase(),
            speaker_name: speaker.into(),
            text: text.into(),
            start_ms: id * 1000,
            end_ms: id * 1000 + 800,
            absolute_timestamp: Utc::now(),
            confidence: 0.9,
            topic: None,
        }
    }

    fn manager_without_llm(config: ContextConfig) -> ContextManager {
        let summarizer = Summarizer::new(None, &config);
        let detector = TopicDetector::new(None);
        ContextManager::new(
            "m1",
            config,
            summarizer,
            detector,
            Arc::new(InMemorySnapshotStore::new()),
        )
    }

    fn quiet_config() -> ContextConfig {
        // High thresholds: nothing triggers unless a test asks for it.
        ContextConfig {
            l1_update_turn_threshold: 1000,
            l1_topic_check_interval_turns: 0,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 600,
            ..ContextConfig::default()
        }
    }

    #[tokio::test]
    async fn empty_text_is_ignored() {
        let manager = manager_without_llm(quiet_config());
        manager.add_utterance(utterance(1, "Ana", "   ")).await;
        assert!(manager.l0_utterances(None).is_empty());
        assert!(manager.topic_utterances().is_empty());
    }

    #[tokio::test]
    async fn utterances_are_stamped_with_current_topic() {
        let manager = manager_without_llm(quiet_config());
        manager.add_utterance(utterance(1, "Ana", "킥오프 시작합니다")).await;
        let l0 = manager.l0_utterances(None);
        assert_eq!(l0[0].topic.as_deref(), Some("Intro"));
    }

    #[tokio::test]
    async fn l0_window_is_bounded() {
        let config = ContextConfig {
            l0_max_turns: 3,
            ..quiet_config()
        };
        let manager = manager_without_llm(config);
        for i in 1..=5 {
            manager.add_utterance(utterance(i, "Ana", "계속 이야기")).await;
        }
        let l0 = manager.l0_utterances(None);
        assert_eq!(l0.len(), 3);
        assert_eq!(l0[0].id, 3);
    }

    #[tokio::test]
    async fn turn_limit_creates_then_extends_segment() {
        let config = ContextConfig {
            l1_update_turn_threshold: 3,
            l1_topic_check_interval_turns: 0,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 600,
            ..ContextConfig::default()
        };
        let manager = manager_without_llm(config);

        for i in 1..=3 {
            manager.add_utterance(utterance(i, "Ana", "첫 구간 발화")).await;
        }
        let segments = manager.l1_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "Intro");
        assert_eq!(segments[0].start_utterance_id, 1);
        assert_eq!(segments[0].end_utterance_id, 3);
        assert_eq!(manager.last_summarized_utterance_id(), Some(3));

        for i in 4..=6 {
            manager.add_utterance(utterance(i, "Ben", "둘째 구간 발화")).await;
        }
        let segments = manager.l1_segments();
        // Same topic: recursive extension, not a second segment.
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_utterance_id, 6);
        assert!(segments[0].participants.contains(&"Ana".to_string()));
        assert!(segments[0].participants.contains(&"Ben".to_string()));
        assert_eq!(manager.last_summarized_utterance_id(), Some(6));
    }

    #[tokio::test]
    async fn topic_change_closes_segment_and_resets_buffers() {
        // Detector fires on every turn (interval 1) and the scripted LLM
        // reports a change to "Pricing" on the 12th utterance.
        let mut responses = vec![];
        for _ in 0..11 {
            responses.push(r#"{"topic_changed": false}"#);
        }
        responses.push(r#"{"topic_changed": true, "current_topic": "Pricing"}"#);
        let llm = ScriptedLlm::new(responses);

        let config = ContextConfig {
            l1_update_turn_threshold: 1000,
            l1_topic_check_interval_turns: 1,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 600,
            ..ContextConfig::default()
        };
        // Summarizer without LLM: detector uses the scripted one, summary
        // falls back deterministically.
        let summarizer = Summarizer::new(None, &config);
        let detector = TopicDetector::new(Some(llm));
        let manager = ContextManager::new(
            "m1",
            config,
            summarizer,
            detector,
            Arc::new(InMemorySnapshotStore::new()),
        );

        for i in 1..=12 {
            manager.add_utterance(utterance(i, "Ana", "인트로 논의")).await;
        }

        let segments = manager.l1_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "Intro");
        assert_eq!(manager.current_topic(), "Pricing");
        assert!(manager.topic_utterances().is_empty());
        assert_eq!(manager.last_summarized_utterance_id(), None);
    }

    #[tokio::test]
    async fn generated_topic_name_when_llm_gives_none() {
        let llm = ScriptedLlm::new(vec![r#"{"topic_changed": true}"#]);
        let config = ContextConfig {
            l1_update_turn_threshold: 1000,
            l1_topic_check_interval_turns: 1,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 600,
            ..ContextConfig::default()
        };
        let summarizer = Summarizer::new(None, &config);
        let manager = ContextManager::new(
            "m1",
            config,
            summarizer,
            TopicDetector::new(Some(llm)),
            Arc::new(InMemorySnapshotStore::new()),
        );

        manager.add_utterance(utterance(1, "Ana", "주제 이야기")).await;
        assert_eq!(manager.current_topic(), "Topic_2");
    }

    #[tokio::test]
    async fn time_trigger_requires_minimum_utterances() {
        let config = ContextConfig {
            l1_update_turn_threshold: 1000,
            l1_topic_check_interval_turns: 0,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 0,
            l1_min_new_utterances_for_time_trigger: 3,
            ..ContextConfig::default()
        };
        let manager = manager_without_llm(config);

        manager.add_utterance(utterance(1, "Ana", "하나")).await;
        manager.add_utterance(utterance(2, "Ana", "둘")).await;
        assert!(manager.l1_segments().is_empty());

        manager.add_utterance(utterance(3, "Ana", "셋")).await;
        assert_eq!(manager.l1_segments().len(), 1);
    }

    #[tokio::test]
    async fn force_topic_change_with_empty_buffer_only_renames() {
        let manager = manager_without_llm(quiet_config());
        manager.force_topic_change("Roadmap").await;
        assert_eq!(manager.current_topic(), "Roadmap");
        assert!(manager.l1_segments().is_empty());
    }

    #[tokio::test]
    async fn force_topic_change_summarizes_buffered_utterances() {
        let manager = manager_without_llm(quiet_config());
        manager.add_utterance(utterance(1, "Ana", "인트로 발화")).await;
        manager.force_topic_change("Roadmap").await;

        let segments = manager.l1_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "Intro");
        assert_eq!(manager.current_topic(), "Roadmap");
        assert!(manager.topic_utterances().is_empty());
    }

    #[tokio::test]
    async fn snapshot_saved_and_restored() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let config = ContextConfig {
            l1_update_turn_threshold: 2,
            l1_topic_check_interval_turns: 0,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 600,
            ..ContextConfig::default()
        };
        let manager = ContextManager::new(
            "m1",
            config.clone(),
            Summarizer::new(None, &config),
            TopicDetector::new(None),
            store.clone(),
        );
        manager.add_utterance(utterance(1, "Ana", "하나")).await;
        manager.add_utterance(utterance(2, "Ana", "둘")).await;
        assert_eq!(manager.l1_segments().len(), 1);

        // A fresh manager restores L1 state from the same store.
        let restored = ContextManager::new(
            "m1",
            config.clone(),
            Summarizer::new(None, &config),
            TopicDetector::new(None),
            store,
        );
        assert!(restored.restore().await);
        assert_eq!(restored.l1_segments().len(), 1);
        assert_eq!(restored.last_summarized_utterance_id(), Some(2));

        restored.rehydrate_l0(vec![utterance(1, "Ana", "하나"), utterance(2, "Ana", "둘")]);
        assert_eq!(restored.l0_utterances(None).len(), 2);
        // Already-summarized utterances stay out of the topic buffer.
        assert!(restored.topic_utterances().is_empty());
    }

    #[tokio::test]
    async fn compose_agent_context_orders_sections() {
        let config = ContextConfig {
            l1_update_turn_threshold: 2,
            l1_topic_check_interval_turns: 0,
            topic_quick_check_enabled: false,
            l1_update_interval_minutes: 600,
            ..ContextConfig::default()
        };
        let manager = manager_without_llm(config);
        manager.add_utterance(utterance(1, "Ana", "첫 발화")).await;
        manager.add_utterance(utterance(2, "Ben", "둘째 발화")).await;

        let context = manager.compose_agent_context(10);
        let topics_at = context.find("[토픽 요약]").unwrap();
        let recent_at = context.find("[최근 발화]").unwrap();
        assert!(topics_at < recent_at);
        assert!(context.contains("## Intro"));
        assert!(context.contains("[Ben] 둘째 발화"));
    }
}
