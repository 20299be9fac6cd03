//! Context snapshot persistence contract.
//!
//! The relational store is a collaborator; the engine only needs `save` and
//! `load` of the JSON snapshot shape. Snapshot failures are logged by the
//! caller and never stall ingestion.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use cf_domain::error::Result;
use cf_domain::transcript::ContextSnapshot;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &ContextSnapshot) -> Result<()>;
    async fn load(&self, meeting_id: &str) -> Result<Option<ContextSnapshot>>;
}

/// Keeps the latest snapshot per meeting in memory.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, ContextSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: &ContextSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .insert(snapshot.meeting_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, meeting_id: &str) -> Result<Option<ContextSnapshot>> {
        Ok(self.snapshots.read().get(meeting_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let store = InMemorySnapshotStore::new();
        let mut snapshot = ContextSnapshot {
            meeting_id: "m1".into(),
            current_topic: "Intro".into(),
            l1_segments: vec![],
            last_summarized_utterance_id: None,
            last_l1_update: Utc::now(),
            speakers_stats: None,
        };
        store.save(&snapshot).await.unwrap();

        snapshot.current_topic = "Pricing".into();
        store.save(&snapshot).await.unwrap();

        let loaded = store.load("m1").await.unwrap().unwrap();
        assert_eq!(loaded.current_topic, "Pricing");
        assert!(store.load("m2").await.unwrap().is_none());
    }
}
