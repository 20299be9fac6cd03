//! The shared graph state, serialized by the checkpointer across interrupts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cf_domain::tool::{ChatMessage, ChatRole};

/// Sentinel that resets the accumulated `tool_results` instead of appending.
pub const RESET_TOOL_RESULTS: &str = "__CLEAR_TOOL_RESULTS__";

/// Prefix stamped on knowledge-graph search tool output. The planner and
/// evaluator route on its presence.
pub const SEARCH_RESULT_MARKER: &str = "[KG 검색 결과";

/// The knowledge-graph search tool; composite sub-queries go straight to it
/// without another planner LLM round.
pub const SEARCH_TOOL_NAME: &str = "kg_search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Voice,
    Spotlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Query,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HitlStatus {
    #[default]
    None,
    Pending,
    Confirmed,
    Cancelled,
    Executed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Success,
    Retry,
    Replanning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluation: String,
    pub status: EvalStatus,
    pub reason: String,
}

/// Fast-router verdict for trivially answerable queries (voice mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRoute {
    pub is_simple_query: bool,
    pub category: String,
    pub simple_response: Option<String>,
    pub confidence: f32,
}

/// HITL bookkeeping carried inside the graph state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitlState {
    #[serde(default)]
    pub status: HitlStatus,
    pub request_id: Option<String>,
    pub tool_name: Option<String>,
    /// Whether a cancel was silent (empty reply) or explicit.
    #[serde(default)]
    pub silent_cancel: bool,
}

/// Per-run graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub run_id: String,
    pub mode: AgentMode,
    pub user_id: String,
    /// Voice runs are bound to a meeting; spotlight runs are not.
    pub meeting_id: Option<String>,

    /// Ordered conversation; the last user message is the active query.
    pub messages: Vec<ChatMessage>,
    /// Caller context for spotlight (teams, current time, …).
    #[serde(default)]
    pub user_context: Value,
    /// Meeting context string composed by the context engine.
    #[serde(default)]
    pub planning_context: String,
    #[serde(default)]
    pub additional_context: String,

    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub need_tools: bool,
    #[serde(default)]
    pub can_answer: bool,

    pub selected_tool: Option<String>,
    #[serde(default)]
    pub tool_args: Value,
    pub tool_category: Option<ToolCategory>,
    /// Accumulated tool output (reset via [`RESET_TOOL_RESULTS`]).
    #[serde(default)]
    pub tool_results: String,

    #[serde(default)]
    pub retry_count: u32,
    /// Total planner/evaluator iterations, bounded by the hard ceiling.
    #[serde(default)]
    pub iterations: u32,
    pub evaluation: Option<Evaluation>,
    /// Follow-up query queued by composite-query detection.
    pub next_subquery: Option<String>,

    pub simple: Option<SimpleRoute>,
    #[serde(default)]
    pub hitl: HitlState,

    #[serde(default)]
    pub response: String,
}

impl OrchestrationState {
    pub fn new(
        mode: AgentMode,
        user_id: impl Into<String>,
        meeting_id: Option<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            user_id: user_id.into(),
            meeting_id,
            messages: vec![ChatMessage::user(query)],
            user_context: Value::Null,
            planning_context: String::new(),
            additional_context: String::new(),
            plan: String::new(),
            need_tools: false,
            can_answer: false,
            selected_tool: None,
            tool_args: Value::Object(Default::default()),
            tool_category: None,
            tool_results: String::new(),
            retry_count: 0,
            iterations: 0,
            evaluation: None,
            next_subquery: None,
            simple: None,
            hitl: HitlState::default(),
            response: String::new(),
        }
    }

    /// The active query: the most recent user message.
    pub fn query(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// Append to (or reset) the tool-results accumulator.
    pub fn push_tool_results(&mut self, chunk: &str) {
        if chunk == RESET_TOOL_RESULTS {
            self.tool_results.clear();
        } else {
            self.tool_results.push_str(chunk);
        }
    }

    /// Clear the per-round tool selection after execution.
    pub fn clear_tool_selection(&mut self) {
        self.selected_tool = None;
        self.tool_args = Value::Object(Default::default());
        self.tool_category = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_last_user_message() {
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "첫 질문");
        assert_eq!(state.query(), "첫 질문");

        state.messages.push(ChatMessage::assistant("답변"));
        state.messages.push(ChatMessage::user("후속 질문"));
        assert_eq!(state.query(), "후속 질문");
    }

    #[test]
    fn tool_results_accumulate_and_reset() {
        let mut state = OrchestrationState::new(AgentMode::Spotlight, "u1", None, "q");
        state.push_tool_results("\n[get_team 결과]\nA팀\n");
        state.push_tool_results("\n[kg_search 결과]\n2건\n");
        assert!(state.tool_results.contains("A팀"));
        assert!(state.tool_results.contains("2건"));

        state.push_tool_results(RESET_TOOL_RESULTS);
        assert!(state.tool_results.is_empty());
    }

    #[test]
    fn state_round_trips_through_serde() {
        let mut state = OrchestrationState::new(AgentMode::Spotlight, "u1", None, "회의 만들어줘");
        state.hitl.status = HitlStatus::Pending;
        state.hitl.request_id = Some("req-1".into());
        state.selected_tool = Some("create_meeting".into());
        state.tool_category = Some(ToolCategory::Mutation);

        let raw = serde_json::to_string(&state).unwrap();
        let back: OrchestrationState = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.hitl.status, HitlStatus::Pending);
        assert_eq!(back.selected_tool.as_deref(), Some("create_meeting"));
        assert_eq!(back.tool_category, Some(ToolCategory::Mutation));
        assert_eq!(back.query(), "회의 만들어줘");
    }
}
