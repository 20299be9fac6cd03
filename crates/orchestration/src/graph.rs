//! Graph runtime.
//!
//! Drives the node sequence over one [`OrchestrationState`]: (voice only)
//! simple router → planner → tool executor → evaluator → loop-or-generate.
//! Mutation tools interrupt the run; the state is checkpointed and resumed
//! later with the client's confirm/cancel value. Resuming the same request
//! twice never executes the tool twice — the post-resume state is saved
//! back under the same run id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use cf_domain::config::AgentConfig;
use cf_domain::error::{Error, Result};
use cf_domain::stream::AgentEvent;
use cf_domain::tool::ChatMessage;
use cf_providers::LlmProvider;

use crate::evaluator;
use crate::generator;
use crate::hitl::{HitlPayload, HitlResume, OptionsProvider, ResumeAction};
use crate::planner;
use crate::registry::ToolRegistry;
use crate::router;
use crate::state::{
    AgentMode, EvalStatus, HitlStatus, OrchestrationState, RESET_TOOL_RESULTS,
    SEARCH_RESULT_MARKER,
};
use crate::tools_node::{self, ToolOutcome};

pub type EventSink = mpsc::Sender<AgentEvent>;

/// Send an event, ignoring a gone receiver (the consumer hung up).
pub async fn emit(events: &EventSink, event: AgentEvent) {
    let _ = events.send(event).await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Checkpointer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persists suspended (and finished-after-resume) run state.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, run_id: &str, state: &OrchestrationState) -> Result<()>;
    async fn load(&self, run_id: &str) -> Result<Option<OrchestrationState>>;
}

#[derive(Default)]
pub struct InMemoryCheckpointer {
    states: RwLock<HashMap<String, String>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, run_id: &str, state: &OrchestrationState) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        self.states.write().insert(run_id.to_string(), raw);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<OrchestrationState>> {
        match self.states.read().get(run_id) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the nodes need, wired once at startup.
pub struct GraphDeps {
    /// `None` = LLM disabled; every node has a deterministic fallback.
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub registry: Arc<ToolRegistry>,
    pub options: Arc<dyn OptionsProvider>,
    pub checkpoints: Arc<dyn Checkpointer>,
    pub config: AgentConfig,
}

/// How one `run`/`resume` call ended.
#[derive(Debug)]
pub enum GraphOutcome {
    Completed(Box<OrchestrationState>),
    /// Suspended on a mutation confirmation; state is checkpointed.
    Interrupted {
        run_id: String,
        payload: HitlPayload,
    },
}

pub struct Graph {
    deps: GraphDeps,
}

impl Graph {
    pub fn new(deps: GraphDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &GraphDeps {
        &self.deps
    }

    /// Run a fresh state to completion or first interrupt.
    pub async fn run(&self, mut state: OrchestrationState, events: &EventSink) -> Result<GraphOutcome> {
        emit(events, AgentEvent::Status { content: "생각 중...".into() }).await;

        if state.mode == AgentMode::Voice {
            router::route_simple(&mut state, &self.deps).await;
            let canned = state
                .simple
                .as_ref()
                .filter(|s| s.is_simple_query)
                .and_then(|s| s.simple_response.clone());
            if let Some(response) = canned {
                state.response = response.clone();
                emit(events, AgentEvent::Message { content: response }).await;
                emit(events, AgentEvent::Done).await;
                return Ok(GraphOutcome::Completed(Box::new(state)));
            }
        }

        self.drive(state, events, false).await
    }

    /// Resume a suspended run with the client's confirm/cancel value.
    ///
    /// Idempotent per `hitl_request_id`: once the run resumed (executed or
    /// cancelled), replaying the resume returns the stored final state and
    /// never re-executes the tool.
    pub async fn resume(
        &self,
        run_id: &str,
        resume: HitlResume,
        events: &EventSink,
    ) -> Result<GraphOutcome> {
        let Some(mut state) = self.deps.checkpoints.load(run_id).await? else {
            return Err(Error::NotFound(format!("run {run_id}")));
        };

        match state.hitl.status {
            HitlStatus::Pending => {}
            HitlStatus::Executed | HitlStatus::Cancelled => {
                // Replay: surface the stored outcome, run nothing.
                tracing::info!(run_id, "duplicate resume, returning stored outcome");
                if !state.response.is_empty() {
                    emit(events, AgentEvent::Message { content: state.response.clone() }).await;
                }
                emit(events, AgentEvent::Done).await;
                return Ok(GraphOutcome::Completed(Box::new(state)));
            }
            _ => {
                return Err(Error::Conflict(format!(
                    "run {run_id} is not awaiting confirmation"
                )));
            }
        }

        match resume.action {
            ResumeAction::Cancel => {
                state.hitl.status = HitlStatus::Cancelled;
                state.hitl.silent_cancel = resume.silent;
                state.clear_tool_selection();
                if resume.silent {
                    state.push_tool_results(RESET_TOOL_RESULTS);
                    state.response.clear();
                } else {
                    state.push_tool_results("작업이 취소되었습니다.");
                    state.response = "작업이 취소되었습니다.".to_string();
                    emit(events, AgentEvent::Message { content: state.response.clone() }).await;
                }
                emit(events, AgentEvent::Done).await;
                self.deps.checkpoints.save(run_id, &state).await?;
                tracing::info!(run_id, silent = resume.silent, "mutation cancelled");
                Ok(GraphOutcome::Completed(Box::new(state)))
            }
            ResumeAction::Confirm => {
                if let Some(params) = resume.params {
                    merge_params(&mut state.tool_args, params);
                }
                state.hitl.status = HitlStatus::Confirmed;
                self.drive(state, events, true).await
            }
        }
    }

    /// The planner → tools → evaluator loop, then the generator.
    /// `resume_execute` enters at the tool executor with confirmed HITL.
    async fn drive(
        &self,
        mut state: OrchestrationState,
        events: &EventSink,
        mut resume_execute: bool,
    ) -> Result<GraphOutcome> {
        loop {
            if !resume_execute {
                planner::create_plan(&mut state, &self.deps).await;

                // Composite escalation: the sub-query becomes the active
                // turn; the planner already pointed it at the search tool.
                if let Some(subquery) = state.next_subquery.take() {
                    state.messages.push(ChatMessage::user(subquery));
                }

                if state.selected_tool.is_none() {
                    break;
                }
            }
            resume_execute = false;

            match tools_node::execute_tool(&mut state, &self.deps, events).await {
                ToolOutcome::Interrupt(payload) => {
                    self.deps.checkpoints.save(&state.run_id, &state).await?;
                    return Ok(GraphOutcome::Interrupted {
                        run_id: state.run_id.clone(),
                        payload,
                    });
                }
                ToolOutcome::Executed => {}
            }

            evaluator::evaluate(&mut state, &self.deps).await;
            let status = state
                .evaluation
                .as_ref()
                .map(|e| e.status)
                .unwrap_or(EvalStatus::Success);
            if status == EvalStatus::Success {
                // Composite escalation: the evaluator lets search results
                // through, but a composite query still owes a second tool
                // round — hand the results back to the planner, which
                // queues the sub-query.
                let query = state.query().to_string();
                let second_round_due = state.tool_results.contains(SEARCH_RESULT_MARKER)
                    && crate::composite::detect_composite_query(&query, &self.deps.config)
                    && !crate::composite::is_subquery(&query, &self.deps.config)
                    && state.retry_count < self.deps.config.planning_max_retry;
                if second_round_due {
                    continue;
                }
                break;
            }
            // Retry / replanning: back to the planner.
        }

        generator::generate(&mut state, &self.deps, events).await;
        emit(events, AgentEvent::Done).await;

        // Runs that went through HITL keep their final state so duplicate
        // resumes stay idempotent.
        if state.hitl.request_id.is_some() {
            self.deps.checkpoints.save(&state.run_id, &state).await?;
        }

        Ok(GraphOutcome::Completed(Box::new(state)))
    }
}

fn merge_params(args: &mut serde_json::Value, params: serde_json::Value) {
    if let (Some(target), Some(source)) = (args.as_object_mut(), params.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test support
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━


// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
