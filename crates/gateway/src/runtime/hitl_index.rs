//! Pending HITL request index.
//!
//! Maps the public `hitl_request_id` (what clients resume with) to the
//! graph `run_id` (what the checkpointer is keyed on). Entries survive
//! resolution so duplicate resumes still find their run and hit the
//! graph's idempotent replay path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// A mutation awaiting (or past) confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct HitlEntry {
    pub request_id: String,
    pub run_id: String,
    pub tool_name: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
}

#[derive(Default)]
pub struct HitlIndex {
    entries: RwLock<HashMap<String, HitlEntry>>,
}

impl HitlIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request_id: &str, run_id: &str, tool_name: &str, user_id: &str) {
        self.entries.write().insert(
            request_id.to_string(),
            HitlEntry {
                request_id: request_id.to_string(),
                run_id: run_id.to_string(),
                tool_name: tool_name.to_string(),
                user_id: user_id.to_string(),
                created_at: Utc::now(),
                resolved: false,
            },
        );
    }

    pub fn run_id_for(&self, request_id: &str) -> Option<String> {
        self.entries.read().get(request_id).map(|e| e.run_id.clone())
    }

    pub fn mark_resolved(&self, request_id: &str) {
        if let Some(entry) = self.entries.write().get_mut(request_id) {
            entry.resolved = true;
        }
    }

    /// Unresolved requests, for dashboard introspection.
    pub fn list_pending(&self) -> Vec<HitlEntry> {
        let mut pending: Vec<HitlEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| !e.resolved)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }
}
