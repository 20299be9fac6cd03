//! Planning node.
//!
//! Decides the next move from accumulated results: answer directly after a
//! completed mutation, escalate a composite query into a second tool round,
//! or ask the LLM (with the mode's tool schemas bound) to pick a tool or
//! answer outright. Bounded by the planner retry cap; planning failures
//! degrade to a direct-answer path, never an error to the caller.

use cf_domain::tool::{ChatMessage, ChatRole};
use cf_providers::{ChatRequest, LlmProvider};

use crate::composite;
use crate::graph::GraphDeps;
use crate::state::{OrchestrationState, AgentMode, SEARCH_RESULT_MARKER};

/// History window handed to the planner LLM (excluding the active query).
const HISTORY_WINDOW: usize = 10;

fn system_prompt(state: &OrchestrationState) -> String {
    let mut prompt = match state.mode {
        AgentMode::Voice => {
            "당신은 회의 중 음성으로 호출되는 비서입니다. 필요한 경우에만 도구를 호출하고, \
             도구 없이 답할 수 있으면 짧고 명확하게 한국어로 답하세요."
                .to_string()
        }
        AgentMode::Spotlight => {
            "당신은 회의와 팀을 관리하는 비서입니다. 조회와 변경 도구를 모두 사용할 수 있으며, \
             변경 작업은 실행 전에 사용자 확인 절차를 거칩니다. 한국어로 답하세요."
                .to_string()
        }
    };

    if !state.user_context.is_null() {
        prompt.push_str(&format!("\n\n[사용자 정보]\n{}", state.user_context));
    }

    let mut planning_context = state.planning_context.clone();
    if !state.tool_results.is_empty() {
        planning_context = if planning_context.is_empty() {
            format!("[이전 도구 실행 결과]\n{}", state.tool_results)
        } else {
            format!(
                "[이전 도구 실행 결과]\n{}\n\n{}",
                state.tool_results, planning_context
            )
        };
    }
    if !planning_context.is_empty() {
        prompt.push_str(&format!("\n\n[컨텍스트]\n{planning_context}"));
    }

    prompt
}

/// Set the state to a direct-answer path with no tool round.
fn direct_answer(state: &mut OrchestrationState, plan: &str) {
    state.plan = plan.to_string();
    state.need_tools = false;
    state.can_answer = true;
    state.clear_tool_selection();
}

pub async fn create_plan(state: &mut OrchestrationState, deps: &GraphDeps) {
    let query = state.query().to_string();
    let config = &deps.config;

    if state.retry_count >= config.planning_max_retry {
        tracing::warn!(run_id = %state.run_id, "planner retry cap reached, answering directly");
        direct_answer(state, "재시도 제한 도달");
        return;
    }

    // Completed mutation → answer from the result, no more tools.
    if composite::has_mutation_success(&state.tool_results, config) {
        direct_answer(state, "도구 결과 기반 응답");
        return;
    }

    // A search result block is present: either escalate a composite query
    // into its second round, or answer from the results.
    if state.tool_results.contains(SEARCH_RESULT_MARKER) {
        if composite::detect_composite_query(&query, config) && !composite::is_subquery(&query, config)
        {
            tracing::info!(run_id = %state.run_id, "composite query detected, queueing sub-query");
            let subquery = composite::extract_next_step_query(&query);
            state.plan = "복합 쿼리 다음 단계".to_string();
            state.need_tools = true;
            state.can_answer = false;
            // The sub-query goes straight to the search tool, no extra
            // LLM round.
            state.selected_tool = Some(crate::state::SEARCH_TOOL_NAME.to_string());
            state.tool_args = serde_json::json!({ "query": subquery });
            state.tool_category = Some(crate::state::ToolCategory::Query);
            state.next_subquery = Some(subquery);
            state.retry_count += 1;
            return;
        }
        direct_answer(state, "검색 결과 기반 응답");
        return;
    }

    let Some(llm) = deps.llm.as_ref() else {
        direct_answer(state, "질문 분석 불가");
        return;
    };

    let tools = deps.registry.definitions_for_mode(state.mode);
    let mut messages = vec![ChatMessage::system(system_prompt(state))];
    // Prior turns, bounded; the active query goes last.
    let history: Vec<ChatMessage> = state
        .messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .cloned()
        .collect();
    if history.len() > 1 {
        let start = history.len().saturating_sub(HISTORY_WINDOW + 1);
        messages.extend(history[start..history.len() - 1].iter().cloned());
    }
    messages.push(ChatMessage::user(&query));

    let request = ChatRequest {
        messages,
        tools,
        ..Default::default()
    };

    match llm.chat(request).await {
        Ok(response) => {
            if let Some(call) = response.tool_calls.first() {
                let category = deps
                    .registry
                    .category_of(&call.tool_name)
                    .unwrap_or(crate::state::ToolCategory::Query);
                tracing::info!(
                    run_id = %state.run_id,
                    tool = %call.tool_name,
                    category = ?category,
                    "planner selected tool"
                );
                state.selected_tool = Some(call.tool_name.clone());
                state.tool_args = call.arguments.clone();
                state.tool_category = Some(category);
                state.need_tools = false;
                state.can_answer = true;
                state.plan = format!("도구 실행: {}", call.tool_name);
                // A tool round after prior results counts against the cap.
                if !state.tool_results.is_empty() {
                    state.retry_count += 1;
                }
            } else {
                state.response = response.content.clone();
                if !response.content.is_empty() {
                    state.messages.push(ChatMessage::assistant(response.content));
                }
                direct_answer(state, "직접 응답");
            }
        }
        Err(e) => {
            tracing::error!(run_id = %state.run_id, error = %e, "planning failed");
            direct_answer(state, "질문 분석 중 오류 발생");
        }
    }
}
