//! Response generation node.
//!
//! Produces the final natural-language answer and streams it as `message`
//! events. Bypass paths: an answer the planner already produced, a canned
//! simple-router response, and mutation-success results (echoed verbatim,
//! no LLM round trip). The guide category gets its own prompt.

use futures_util::StreamExt;

use cf_domain::stream::{AgentEvent, StreamEvent};
use cf_domain::tool::ChatMessage;
use cf_providers::{ChatRequest, LlmProvider};

use crate::composite;
use crate::graph::{emit, EventSink, GraphDeps};
use crate::state::{AgentMode, OrchestrationState};

const APOLOGY: &str = "죄송해요, 지금은 답변을 드리기 어려워요. 잠시 후 다시 시도해 주세요.";

fn generator_prompt(state: &OrchestrationState, guide: bool) -> String {
    let channel = match state.mode {
        AgentMode::Voice => {
            "음성으로 읽힐 답변입니다. 짧은 문장, 구어체, 목록/마크다운 금지."
        }
        AgentMode::Spotlight => "채팅으로 표시될 답변입니다. 간결하고 명확하게.",
    };
    let mut prompt = if guide {
        format!(
            "당신은 이 서비스의 사용법을 안내하는 비서입니다. 기능 안내에 집중해 한국어로 답하세요.\n{channel}"
        )
    } else {
        format!("당신은 회의 비서입니다. 아래 정보를 바탕으로 한국어로 답하세요.\n{channel}")
    };

    if !state.planning_context.is_empty() {
        prompt.push_str(&format!("\n\n[회의 컨텍스트]\n{}", state.planning_context));
    }
    if !state.additional_context.is_empty() {
        prompt.push_str(&format!("\n\n[추가 컨텍스트]\n{}", state.additional_context));
    }
    if !state.tool_results.is_empty() {
        prompt.push_str(&format!("\n\n[도구 실행 결과]\n{}", state.tool_results));
    }
    prompt
}

/// Pull the success line out of mutation results for the echo bypass.
fn mutation_echo(state: &OrchestrationState, deps: &GraphDeps) -> Option<String> {
    if !composite::has_mutation_success(&state.tool_results, &deps.config) {
        return None;
    }
    let line = state
        .tool_results
        .lines()
        .rev()
        .find(|line| {
            deps.config
                .mutation_success_markers
                .iter()
                .any(|marker| line.contains(marker.as_str()))
        })
        .map(|line| line.trim().to_string())?;
    Some(line)
}

pub async fn generate(state: &mut OrchestrationState, deps: &GraphDeps, events: &EventSink) {
    // Canned simple-router answer.
    if let Some(simple) = &state.simple {
        if simple.is_simple_query {
            if let Some(response) = simple.simple_response.clone() {
                state.response = response.clone();
                emit(events, AgentEvent::Message { content: response }).await;
                return;
            }
        }
    }

    // Mutation success: echo the result, skip the LLM entirely.
    if let Some(echo) = mutation_echo(state, deps) {
        state.response = echo.clone();
        emit(events, AgentEvent::Message { content: echo }).await;
        return;
    }

    // The planner already answered directly.
    if !state.response.is_empty() {
        let response = state.response.clone();
        emit(events, AgentEvent::Message { content: response }).await;
        return;
    }

    let guide = state
        .simple
        .as_ref()
        .map(|s| s.category == "guide")
        .unwrap_or(false);

    let Some(llm) = deps.llm.as_ref() else {
        let fallback = if state.tool_results.trim().is_empty() {
            APOLOGY.to_string()
        } else {
            state.tool_results.trim().to_string()
        };
        state.response = fallback.clone();
        emit(events, AgentEvent::Message { content: fallback }).await;
        return;
    };

    let request = ChatRequest {
        messages: vec![
            ChatMessage::system(generator_prompt(state, guide)),
            ChatMessage::user(state.query()),
        ],
        ..Default::default()
    };

    match llm.chat_stream(request).await {
        Ok(mut stream) => {
            let mut accumulated = String::new();
            while let Some(event) = stream.next().await {
                match event {
                    Ok(StreamEvent::Token { text }) => {
                        accumulated.push_str(&text);
                        emit(events, AgentEvent::Message { content: text }).await;
                    }
                    Ok(StreamEvent::Done { .. }) => break,
                    Ok(StreamEvent::Error { message }) => {
                        tracing::error!(run_id = %state.run_id, error = %message, "generation stream failed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(run_id = %state.run_id, error = %e, "generation stream failed");
                        break;
                    }
                }
            }
            if accumulated.is_empty() {
                accumulated = APOLOGY.to_string();
                emit(events, AgentEvent::Message { content: accumulated.clone() }).await;
            }
            state.messages.push(ChatMessage::assistant(accumulated.clone()));
            state.response = accumulated;
        }
        Err(e) => {
            tracing::error!(run_id = %state.run_id, error = %e, "generation failed");
            state.response = APOLOGY.to_string();
            emit(events, AgentEvent::Message { content: APOLOGY.to_string() }).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{deps_with_llm, deps_without_llm, sink, ScriptedLlm};
    use crate::state::SimpleRoute;

    #[tokio::test]
    async fn mutation_success_is_echoed_without_llm() {
        // An LLM is configured but must not be consulted.
        let llm = ScriptedLlm::with_text("절대 쓰이면 안 됨");
        let deps = deps_with_llm(llm);
        let mut state = OrchestrationState::new(AgentMode::Spotlight, "u1", None, "회의 만들어줘");
        state.push_tool_results("\n[create_meeting 결과]\n'주간 회의' 회의가 생성되었습니다\n");

        let (events, mut rx) = sink();
        generate(&mut state, &deps, &events).await;
        assert_eq!(state.response, "'주간 회의' 회의가 생성되었습니다");
        let event = rx.try_recv().unwrap();
        assert!(matches!(event, AgentEvent::Message { .. }));
    }

    #[tokio::test]
    async fn simple_route_short_circuits() {
        let deps = deps_without_llm();
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "안녕");
        state.simple = Some(SimpleRoute {
            is_simple_query: true,
            category: "greeting".into(),
            simple_response: Some("안녕하세요!".into()),
            confidence: 0.98,
        });

        let (events, _rx) = sink();
        generate(&mut state, &deps, &events).await;
        assert_eq!(state.response, "안녕하세요!");
    }

    #[tokio::test]
    async fn streams_tokens_and_accumulates() {
        let llm = ScriptedLlm::with_stream(vec!["어제 ", "회의 결과는 ", "공유되었습니다."]);
        let deps = deps_with_llm(llm);
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "어제 회의 알려줘");

        let (events, mut rx) = sink();
        generate(&mut state, &deps, &events).await;
        assert_eq!(state.response, "어제 회의 결과는 공유되었습니다.");

        let mut chunks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::Message { content } = event {
                chunks.push(content);
            }
        }
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn no_llm_falls_back_to_tool_results_then_apology() {
        let deps = deps_without_llm();
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "질문");
        state.push_tool_results("\n[get_meetings 결과]\n오늘 회의 2건\n");

        let (events, _rx) = sink();
        generate(&mut state, &deps, &events).await;
        assert!(state.response.contains("오늘 회의 2건"));

        let mut empty = OrchestrationState::new(AgentMode::Voice, "u1", None, "질문");
        let (events, _rx) = sink();
        generate(&mut empty, &deps, &events).await;
        assert_eq!(empty.response, APOLOGY);
    }
}
