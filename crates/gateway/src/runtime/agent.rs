//! Agent run glue: builds graph states from meeting context, spawns runs,
//! and routes HITL interrupts through the request index.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use cf_domain::error::{Error, Result};
use cf_domain::stores::{TeamStore, TranscriptStore};
use cf_domain::stream::AgentEvent;
use cf_orchestration::hitl::HitlResume;
use cf_orchestration::{AgentMode, Graph, GraphOutcome, HitlPayload, OrchestrationState};

use super::contexts::ContextService;
use super::hitl_index::HitlIndex;

/// Events a spotlight consumer sees: the plain agent stream plus HITL
/// interrupt payloads.
#[derive(Debug, Clone)]
pub enum SpotlightEvent {
    Agent(AgentEvent),
    Hitl(HitlPayload),
}

pub struct AgentService {
    graph: Arc<Graph>,
    contexts: Arc<ContextService>,
    transcripts: Arc<dyn TranscriptStore>,
    teams: Arc<dyn TeamStore>,
    hitl: Arc<HitlIndex>,
    wake_word: String,
}

impl AgentService {
    pub fn new(
        graph: Arc<Graph>,
        contexts: Arc<ContextService>,
        transcripts: Arc<dyn TranscriptStore>,
        teams: Arc<dyn TeamStore>,
        hitl: Arc<HitlIndex>,
        wake_word: String,
    ) -> Self {
        Self {
            graph,
            contexts,
            transcripts,
            teams,
            hitl,
            wake_word,
        }
    }

    pub fn hitl(&self) -> &HitlIndex {
        &self.hitl
    }

    /// Voice run for a wake-word-triggered transcript. The wake word itself
    /// is stripped from the query; the meeting context rides along.
    pub async fn voice_run(
        &self,
        meeting_id: &str,
        transcript_id: u64,
    ) -> Result<mpsc::Receiver<AgentEvent>> {
        let utterance = self.transcripts.get(meeting_id, transcript_id).await?;
        let query = {
            let stripped = utterance.text.replace(&self.wake_word, " ");
            let stripped = stripped.trim().to_string();
            if stripped.is_empty() {
                utterance.text.clone()
            } else {
                stripped
            }
        };

        let mut state = OrchestrationState::new(
            AgentMode::Voice,
            utterance.speaker_id.clone(),
            Some(meeting_id.to_string()),
            query,
        );
        state.planning_context = self.contexts.agent_context(meeting_id).await;

        let (tx, rx) = mpsc::channel(64);
        let graph = self.graph.clone();
        tokio::spawn(async move {
            match graph.run(state, &tx).await {
                Ok(GraphOutcome::Completed(_)) => {}
                Ok(GraphOutcome::Interrupted { run_id, .. }) => {
                    // Voice mode carries no mutation tools; an interrupt here
                    // is a wiring bug, not a user flow.
                    tracing::error!(run_id = %run_id, "unexpected interrupt in voice run");
                    let _ = tx
                        .send(AgentEvent::Error {
                            message: "unexpected interrupt".into(),
                        })
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(AgentEvent::Error { message: e.to_string() }).await;
                }
            }
        });
        Ok(rx)
    }

    /// Spotlight run for a standalone user message.
    pub async fn spotlight_run(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<mpsc::Receiver<SpotlightEvent>> {
        if message.trim().is_empty() {
            return Err(Error::InvalidInput("empty message".into()));
        }

        let mut state = OrchestrationState::new(AgentMode::Spotlight, user_id, None, message);
        let teams = self.teams.teams_for_user(user_id).await.unwrap_or_default();
        state.user_context = serde_json::json!({
            "teams": teams.iter().map(|t| serde_json::json!({"id": t.id, "name": t.name})).collect::<Vec<_>>(),
            "current_time": Utc::now().to_rfc3339(),
        });

        let (tx, rx) = mpsc::channel(64);
        let (agent_tx, mut agent_rx) = mpsc::channel(64);

        // Forward plain agent events.
        let forward_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = agent_rx.recv().await {
                if forward_tx.send(SpotlightEvent::Agent(event)).await.is_err() {
                    break;
                }
            }
        });

        let graph = self.graph.clone();
        let hitl = self.hitl.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            match graph.run(state, &agent_tx).await {
                Ok(GraphOutcome::Completed(_)) => {}
                Ok(GraphOutcome::Interrupted { run_id, payload }) => {
                    hitl.insert(&payload.hitl_request_id, &run_id, &payload.tool_name, &user_id);
                    let _ = tx.send(SpotlightEvent::Hitl(payload)).await;
                    let _ = tx.send(SpotlightEvent::Agent(AgentEvent::Done)).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(SpotlightEvent::Agent(AgentEvent::Error {
                            message: e.to_string(),
                        }))
                        .await;
                }
            }
        });
        Ok(rx)
    }

    /// Resume a suspended HITL run by its public request id.
    pub async fn resume(
        &self,
        request_id: &str,
        resume: HitlResume,
    ) -> Result<mpsc::Receiver<SpotlightEvent>> {
        let Some(run_id) = self.hitl.run_id_for(request_id) else {
            return Err(Error::NotFound(format!("hitl request {request_id}")));
        };
        self.hitl.mark_resolved(request_id);

        let (tx, rx) = mpsc::channel(64);
        let (agent_tx, mut agent_rx) = mpsc::channel(64);

        let forward_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = agent_rx.recv().await {
                if forward_tx.send(SpotlightEvent::Agent(event)).await.is_err() {
                    break;
                }
            }
        });

        let graph = self.graph.clone();
        let hitl = self.hitl.clone();
        tokio::spawn(async move {
            match graph.resume(&run_id, resume, &agent_tx).await {
                Ok(GraphOutcome::Completed(_)) => {}
                Ok(GraphOutcome::Interrupted { run_id, payload }) => {
                    // The resumed run picked another mutation round.
                    hitl.insert(&payload.hitl_request_id, &run_id, &payload.tool_name, "");
                    let _ = tx.send(SpotlightEvent::Hitl(payload)).await;
                    let _ = tx.send(SpotlightEvent::Agent(AgentEvent::Done)).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(SpotlightEvent::Agent(AgentEvent::Error {
                            message: e.to_string(),
                        }))
                        .await;
                }
            }
        });
        Ok(rx)
    }
}
