//! Built-in tool catalog.
//!
//! Query tools are read-only lookups against the metadata stores and the
//! knowledge graph; mutation tools (spotlight only) change meetings and
//! teams and are gated behind HITL confirmation. All handlers receive the
//! caller's `user_id` via [`crate::registry::ToolContext`].

pub mod mutation;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;

use cf_domain::stores::{MeetingStore, TeamStore, TranscriptStore};
use cf_kg::KgRepository;

use crate::hitl::{OptionsProvider, SelectOption};
use crate::registry::ToolRegistry;

/// Collaborators the tool handlers close over.
pub struct ToolEnv {
    pub meetings: Arc<dyn MeetingStore>,
    pub teams: Arc<dyn TeamStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub kg: Arc<dyn KgRepository>,
    /// HMAC key for signed team invite links.
    pub invite_secret: String,
    /// Public base URL invite links point at.
    pub invite_base_url: String,
}

/// Build the full catalog for one process.
pub fn build_registry(env: Arc<ToolEnv>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    query::register(&mut registry, &env);
    mutation::register(&mut registry, &env);
    tracing::info!(tools = registry.len(), "tool registry built");
    registry
}

/// Resolves HITL `options_source` lists from the stores.
pub struct StoreOptionsProvider {
    teams: Arc<dyn TeamStore>,
}

impl StoreOptionsProvider {
    pub fn new(teams: Arc<dyn TeamStore>) -> Self {
        Self { teams }
    }
}

#[async_trait]
impl OptionsProvider for StoreOptionsProvider {
    async fn options(&self, source: &str, user_id: &str) -> Vec<SelectOption> {
        match source {
            "user_teams" => match self.teams.teams_for_user(user_id).await {
                Ok(teams) => teams
                    .into_iter()
                    .map(|t| SelectOption {
                        value: t.id,
                        label: t.name,
                    })
                    .collect(),
                Err(e) => {
                    tracing::error!(error = %e, "failed to load user teams for HITL options");
                    Vec::new()
                }
            },
            other => {
                tracing::warn!(source = other, "unknown options_source");
                Vec::new()
            }
        }
    }
}
