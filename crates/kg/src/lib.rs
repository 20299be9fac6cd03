//! Knowledge-graph repository contract.
//!
//! The graph database and its query pipeline live outside this core; this
//! crate defines the read operations the summarizer and agent tools invoke,
//! plus a static in-memory implementation for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use cf_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Latest-status decision for a team ("ground truth").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub title: String,
    pub status: String,
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
    pub assignee_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub description: String,
    pub assignee_id: String,
    pub assignee_name: Option<String>,
    pub status: String,
    pub due: Option<DateTime<Utc>>,
}

/// One hit from the graph search pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Node kind: "decision", "action_item", "meeting", "person", …
    pub kind: String,
    pub title: String,
    pub snippet: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repository trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read-only view of the knowledge graph.
#[async_trait]
pub trait KgRepository: Send + Sync {
    /// Free-text search scoped to the caller's teams.
    async fn search(&self, query: &str, team_ids: &[String]) -> Result<Vec<SearchHit>>;
    /// Latest decisions for a team.
    async fn ground_truth(&self, team_id: &str) -> Result<Vec<Decision>>;
    /// Open action items assigned to a user.
    async fn action_items_for(&self, assignee_id: &str) -> Result<Vec<ActionItem>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory repository seeded at startup. Search is naive substring
/// matching over titles and snippets, which is all dev setups need.
#[derive(Default)]
pub struct StaticKg {
    decisions: RwLock<Vec<Decision>>,
    action_items: RwLock<Vec<ActionItem>>,
    hits: RwLock<Vec<SearchHit>>,
}

impl StaticKg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_decision(&self, decision: Decision) {
        self.decisions.write().push(decision);
    }

    pub fn seed_action_item(&self, item: ActionItem) {
        self.action_items.write().push(item);
    }

    pub fn seed_hit(&self, hit: SearchHit) {
        self.hits.write().push(hit);
    }
}

#[async_trait]
impl KgRepository for StaticKg {
    async fn search(&self, query: &str, _team_ids: &[String]) -> Result<Vec<SearchHit>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<SearchHit> = self
            .hits
            .read()
            .iter()
            .filter(|h| {
                h.title.to_lowercase().contains(&needle)
                    || h.snippet.to_lowercase().contains(&needle)
                    || needle
                        .split_whitespace()
                        .any(|word| h.title.contains(word) || h.snippet.contains(word))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }

    async fn ground_truth(&self, team_id: &str) -> Result<Vec<Decision>> {
        Ok(self
            .decisions
            .read()
            .iter()
            .filter(|d| d.team_id.as_deref() == Some(team_id))
            .cloned()
            .collect())
    }

    async fn action_items_for(&self, assignee_id: &str) -> Result<Vec<ActionItem>> {
        Ok(self
            .action_items
            .read()
            .iter()
            .filter(|a| a.assignee_id == assignee_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, snippet: &str, score: f32) -> SearchHit {
        SearchHit {
            kind: "decision".into(),
            title: title.into(),
            snippet: snippet.into(),
            score,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn search_matches_and_ranks() {
        let kg = StaticKg::new();
        kg.seed_hit(hit("교육 프로그램 개편", "담당자: 김수진", 0.7));
        kg.seed_hit(hit("분기 예산", "재무팀 검토", 0.9));

        let hits = kg.search("교육 프로그램", &[]).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "교육 프로그램 개편");
    }

    #[tokio::test]
    async fn ground_truth_filters_by_team() {
        let kg = StaticKg::new();
        kg.seed_decision(Decision {
            id: "d1".into(),
            title: "배포 주기 변경".into(),
            status: "confirmed".into(),
            team_id: Some("t1".into()),
            assignee_id: None,
            assignee_name: None,
            updated_at: Utc::now(),
        });

        assert_eq!(kg.ground_truth("t1").await.unwrap().len(), 1);
        assert!(kg.ground_truth("t2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn action_items_filter_by_assignee() {
        let kg = StaticKg::new();
        kg.seed_action_item(ActionItem {
            id: "a1".into(),
            description: "문서 정리".into(),
            assignee_id: "u1".into(),
            assignee_name: Some("김수진".into()),
            status: "open".into(),
            due: None,
        });

        assert_eq!(kg.action_items_for("u1").await.unwrap().len(), 1);
        assert!(kg.action_items_for("u2").await.unwrap().is_empty());
    }
}
