//! Tool execution node.
//!
//! Query tools run immediately. Mutation tools first surface a HITL
//! interrupt: the node builds the confirmation payload and hands control
//! back to the runner, which checkpoints the state and suspends the run.
//! On a confirmed resume the node executes with the merged arguments; the
//! caller's user id is injected outside the LLM-visible schema.

use serde_json::Value;

use cf_domain::stream::AgentEvent;

use crate::graph::{emit, EventSink, GraphDeps};
use crate::hitl::{self, HitlPayload};
use crate::registry::ToolContext;
use crate::state::{HitlStatus, OrchestrationState, ToolCategory};

pub enum ToolOutcome {
    Executed,
    /// Mutation awaiting confirmation; the runner checkpoints and suspends.
    Interrupt(HitlPayload),
}

pub async fn execute_tool(
    state: &mut OrchestrationState,
    deps: &GraphDeps,
    events: &EventSink,
) -> ToolOutcome {
    let Some(tool_name) = state.selected_tool.clone() else {
        tracing::warn!(run_id = %state.run_id, "no tool selected");
        state.push_tool_results("도구가 선택되지 않았습니다.");
        return ToolOutcome::Executed;
    };

    let Some(spec) = deps.registry.spec(&tool_name).cloned() else {
        tracing::error!(run_id = %state.run_id, tool = %tool_name, "tool not found");
        state.push_tool_results(&format!("'{tool_name}' 도구를 찾을 수 없습니다."));
        state.clear_tool_selection();
        return ToolOutcome::Executed;
    };

    // ── HITL gate for mutations ──────────────────────────────────
    if spec.category == ToolCategory::Mutation && state.hitl.status != HitlStatus::Confirmed {
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            run_id = %state.run_id,
            tool = %tool_name,
            hitl_request_id = %request_id,
            "mutation tool requires confirmation"
        );
        let payload = hitl::build_payload(
            &spec,
            &state.tool_args,
            &state.user_id,
            deps.options.as_ref(),
            request_id.clone(),
        )
        .await;
        state.hitl.status = HitlStatus::Pending;
        state.hitl.request_id = Some(request_id);
        state.hitl.tool_name = Some(tool_name);
        return ToolOutcome::Interrupt(payload);
    }

    // ── Execute ──────────────────────────────────────────────────
    emit(events, AgentEvent::Status {
        content: format!("도구 실행 중: {tool_name}"),
    })
    .await;

    let handler = deps
        .registry
        .handler(&tool_name)
        .expect("spec implies handler");
    let context = ToolContext {
        user_id: state.user_id.clone(),
        args: state.tool_args.clone(),
    };

    match handler(context).await {
        Ok(result) => {
            let formatted = format_result(&tool_name, &result);
            state.push_tool_results(&formatted);
            if spec.category == ToolCategory::Mutation {
                state.hitl.status = HitlStatus::Executed;
            }
        }
        Err(e) => {
            // Tool failures become result text so the generator can surface
            // a graceful message instead of the run erroring out.
            tracing::error!(run_id = %state.run_id, tool = %tool_name, error = %e, "tool execution failed");
            state.push_tool_results(&format!("\n[{tool_name} 오류]\n{e}\n"));
        }
    }

    state.clear_tool_selection();
    ToolOutcome::Executed
}

/// Shape a handler result into the accumulator: an `error` key wins, then a
/// `message` key, then the raw JSON.
fn format_result(tool_name: &str, result: &Value) -> String {
    if let Some(error) = result.get("error").and_then(Value::as_str) {
        return format!("\n[{tool_name} 오류]\n{error}\n");
    }
    if let Some(message) = result.get("message").and_then(Value::as_str) {
        return format!("\n[{tool_name} 결과]\n{message}\n");
    }
    format!("\n[{tool_name} 결과]\n{result}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{deps_with_tool, sink};
    use crate::registry::{object_schema, HitlFieldSpec, ToolSpec};
    use crate::state::AgentMode;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn mutation_spec() -> ToolSpec {
        ToolSpec {
            name: "create_team".into(),
            description: "팀 생성".into(),
            parameters: object_schema(&[("name", "string", "팀 이름", true)]),
            category: ToolCategory::Mutation,
            modes: None,
            display_template: Some("'{{name}}' 팀을 만들까요?".into()),
            hitl_fields: vec![HitlFieldSpec::new("name", "text", "팀 이름")],
        }
    }

    fn counting_handler(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(ToolContext) -> BoxFuture<'static, cf_domain::Result<Value>> + Send + Sync + 'static
    {
        move |_ctx| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"success": true, "message": "팀이 생성되었습니다"}))
            })
        }
    }

    #[tokio::test]
    async fn mutation_interrupts_before_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let deps = deps_with_tool(mutation_spec(), counting_handler(calls.clone()));
        let mut state = OrchestrationState::new(AgentMode::Spotlight, "u1", None, "팀 만들어줘");
        state.selected_tool = Some("create_team".into());
        state.tool_args = serde_json::json!({"name": "플랫폼팀"});
        state.tool_category = Some(ToolCategory::Mutation);

        let (events, _rx) = sink();
        match execute_tool(&mut state, &deps, &events).await {
            ToolOutcome::Interrupt(payload) => {
                assert_eq!(payload.tool_name, "create_team");
                assert_eq!(payload.confirmation_message, "'플랫폼팀' 팀을 만들까요?");
                assert!(!payload.hitl_request_id.is_empty());
            }
            ToolOutcome::Executed => panic!("expected interrupt"),
        }
        // The tool must NOT have run.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.hitl.status, HitlStatus::Pending);
    }

    #[tokio::test]
    async fn confirmed_mutation_executes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let deps = deps_with_tool(mutation_spec(), counting_handler(calls.clone()));
        let mut state = OrchestrationState::new(AgentMode::Spotlight, "u1", None, "팀 만들어줘");
        state.selected_tool = Some("create_team".into());
        state.tool_args = serde_json::json!({"name": "플랫폼팀"});
        state.hitl.status = HitlStatus::Confirmed;

        let (events, _rx) = sink();
        match execute_tool(&mut state, &deps, &events).await {
            ToolOutcome::Executed => {}
            ToolOutcome::Interrupt(_) => panic!("unexpected interrupt"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(state.tool_results.contains("팀이 생성되었습니다"));
        assert_eq!(state.hitl.status, HitlStatus::Executed);
        assert!(state.selected_tool.is_none());
    }

    #[tokio::test]
    async fn handler_error_becomes_result_text() {
        let spec = ToolSpec {
            name: "get_team".into(),
            description: "팀 조회".into(),
            parameters: object_schema(&[]),
            category: ToolCategory::Query,
            modes: None,
            display_template: None,
            hitl_fields: vec![],
        };
        let deps = deps_with_tool(spec, |_ctx| {
            Box::pin(async { Err(cf_domain::Error::NotFound("team t9".into())) })
        });
        let mut state = OrchestrationState::new(AgentMode::Voice, "u1", None, "팀 알려줘");
        state.selected_tool = Some("get_team".into());

        let (events, _rx) = sink();
        execute_tool(&mut state, &deps, &events).await;
        assert!(state.tool_results.contains("[get_team 오류]"));
        assert!(state.tool_results.contains("team t9"));
    }

    #[test]
    fn result_formatting_precedence() {
        let with_error = serde_json::json!({"error": "권한 없음", "message": "ignored"});
        assert!(format_result("t", &with_error).contains("[t 오류]\n권한 없음"));

        let with_message = serde_json::json!({"message": "3건 조회"});
        assert!(format_result("t", &with_message).contains("[t 결과]\n3건 조회"));

        let raw = serde_json::json!({"count": 2});
        assert!(format_result("t", &raw).contains("\"count\":2"));
    }
}
