//! Per-meeting context manager registry.
//!
//! One [`ContextManager`] per active meeting, created lazily. Creation
//! restores the latest snapshot and rehydrates the L0 window from the
//! transcript store, so a restarted gateway picks up mid-meeting.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use cf_context::{ContextManager, SnapshotStore, Summarizer, TopicDetector};
use cf_domain::config::ContextConfig;
use cf_domain::stores::TranscriptStore;
use cf_domain::transcript::Utterance;
use cf_providers::LlmProvider;

pub struct ContextService {
    config: ContextConfig,
    llm: Option<Arc<dyn LlmProvider>>,
    snapshots: Arc<dyn SnapshotStore>,
    transcripts: Arc<dyn TranscriptStore>,
    managers: RwLock<HashMap<String, Arc<ContextManager>>>,
}

impl ContextService {
    pub fn new(
        config: ContextConfig,
        llm: Option<Arc<dyn LlmProvider>>,
        snapshots: Arc<dyn SnapshotStore>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            config,
            llm,
            snapshots,
            transcripts,
            managers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, meeting_id: &str) -> Arc<ContextManager> {
        if let Some(manager) = self.managers.read().get(meeting_id) {
            return manager.clone();
        }

        let manager = Arc::new(ContextManager::new(
            meeting_id,
            self.config.clone(),
            Summarizer::new(self.llm.clone(), &self.config),
            TopicDetector::new(self.llm.clone()),
            self.snapshots.clone(),
        ));

        if manager.restore().await {
            match self.transcripts.recent(meeting_id, self.config.l0_max_turns).await {
                Ok(utterances) => manager.rehydrate_l0(utterances),
                Err(e) => {
                    tracing::warn!(meeting_id, error = %e, "L0 rehydration failed");
                }
            }
        }

        // Double-checked: another caller may have built one meanwhile.
        let mut managers = self.managers.write();
        managers
            .entry(meeting_id.to_string())
            .or_insert(manager)
            .clone()
    }

    pub async fn ingest(&self, meeting_id: &str, utterance: Utterance) {
        let manager = self.get_or_create(meeting_id).await;
        manager.add_utterance(utterance).await;
    }

    /// Context string for an agent run; empty if the meeting has none yet.
    pub async fn agent_context(&self, meeting_id: &str) -> String {
        self.get_or_create(meeting_id).await.compose_agent_context(10)
    }

    pub fn drop_meeting(&self, meeting_id: &str) {
        self.managers.write().remove(meeting_id);
    }
}
