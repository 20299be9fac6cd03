//! Simple-query router (voice mode).
//!
//! A fast pre-planner classifier: greetings and usage questions skip the
//! whole tool pipeline. Any failure routes to the full pipeline — the
//! router can only ever shortcut, never block.

use serde::Deserialize;

use cf_domain::tool::ChatMessage;
use cf_providers::json::parse_lenient;
use cf_providers::{ChatRequest, LlmProvider};

use crate::graph::GraphDeps;
use crate::state::{OrchestrationState, SimpleRoute};

#[derive(Debug, Deserialize)]
struct WireRoute {
    #[serde(default)]
    is_simple_query: bool,
    #[serde(default)]
    category: String,
    #[serde(default)]
    simple_response: Option<String>,
    #[serde(default)]
    confidence: f32,
}

pub async fn route_simple(state: &mut OrchestrationState, deps: &GraphDeps) {
    if !deps.config.simple_router_enabled {
        return;
    }
    let query = state.query().to_string();
    if query.is_empty() {
        state.simple = Some(SimpleRoute {
            is_simple_query: false,
            category: "other".into(),
            simple_response: None,
            confidence: 0.0,
        });
        return;
    }
    let Some(llm) = deps.llm.as_ref() else {
        return;
    };

    let prompt = format!(
        "사용자 발화를 분류해 JSON으로만 답하세요.\n\
         도구 없이 바로 답할 수 있는 인사/사용법 질문이면 is_simple_query=true로 하고 \
         simple_response에 짧은 답을 넣으세요.\n\
         형식: {{\"is_simple_query\": bool, \"category\": \"greeting|guide|other\", \
         \"simple_response\": \"답변 또는 null\", \"confidence\": 0.0}}\n\n발화: {query}"
    );

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        json_mode: true,
        max_tokens: Some(200),
        ..Default::default()
    };

    match llm.chat(request).await {
        Ok(response) => {
            let Some(wire) = parse_lenient::<WireRoute>(&response.content) else {
                tracing::warn!(run_id = %state.run_id, "simple router returned unparseable output");
                return;
            };
            tracing::info!(
                run_id = %state.run_id,
                is_simple = wire.is_simple_query,
                category = %wire.category,
                confidence = wire.confidence,
                "simple router verdict"
            );
            if wire.is_simple_query {
                state.plan = format!("간단한 쿼리: {}", wire.category);
                state.need_tools = false;
            }
            state.simple = Some(SimpleRoute {
                is_simple_query: wire.is_simple_query,
                category: wire.category,
                simple_response: wire.simple_response.filter(|s| !s.is_empty()),
                confidence: wire.confidence,
            });
        }
        Err(e) => {
            tracing::warn!(run_id = %state.run_id, error = %e, "simple router failed");
            state.simple = Some(SimpleRoute {
                is_simple_query: false,
                category: "error".into(),
                simple_response: None,
                confidence: 0.0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{deps_with_llm, deps_without_llm, ScriptedLlm};
    use crate::state::AgentMode;

    #[tokio::test]
    async fn simple_greeting_is_routed() {
        let llm = ScriptedLlm::with_text(
            r#"{"is_simple_query": true, "category": "greeting", "simple_response": "안녕하세요!", "confidence": 0.97}"#,
        );
        let deps = deps_with_llm(llm);
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "부덕아 안녕");
        route_simple(&mut state, &deps).await;

        let simple = state.simple.as_ref().unwrap();
        assert!(simple.is_simple_query);
        assert_eq!(simple.category, "greeting");
        assert_eq!(simple.simple_response.as_deref(), Some("안녕하세요!"));
    }

    #[tokio::test]
    async fn router_failure_is_not_simple() {
        let deps = deps_without_llm();
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "질문");
        route_simple(&mut state, &deps).await;
        // No LLM: router stays silent, pipeline continues.
        assert!(state.simple.is_none());
    }
}
