//! Evaluation node.
//!
//! Fast paths first: completed mutations and non-empty search results are
//! success without an LLM round trip. Otherwise an LLM judges the results
//! against the plan. Anything ambiguous or broken resolves to success —
//! the generator always gets a chance to answer.

use serde::Deserialize;

use cf_domain::tool::ChatMessage;
use cf_providers::json::parse_lenient;
use cf_providers::{ChatRequest, LlmProvider};

use crate::composite;
use crate::graph::GraphDeps;
use crate::state::{EvalStatus, Evaluation, OrchestrationState, SEARCH_RESULT_MARKER};

#[derive(Debug, Deserialize)]
struct WireEvaluation {
    #[serde(default)]
    evaluation: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    reason: String,
}

fn forced_success(evaluation: &str, reason: &str) -> Evaluation {
    Evaluation {
        evaluation: evaluation.to_string(),
        status: EvalStatus::Success,
        reason: reason.to_string(),
    }
}

pub async fn evaluate(state: &mut OrchestrationState, deps: &GraphDeps) {
    let config = &deps.config;
    state.iterations += 1;

    // Hard ceiling: never loop forever.
    if state.iterations >= config.max_iterations || state.retry_count >= config.planning_max_retry {
        tracing::warn!(
            run_id = %state.run_id,
            iterations = state.iterations,
            retry_count = state.retry_count,
            "evaluation ceiling reached, forcing success"
        );
        state.evaluation = Some(forced_success(
            "최대 재시도 횟수 도달",
            "더 이상 재시도하지 않고 현재 결과로 응답 생성",
        ));
        return;
    }

    if composite::has_mutation_success(&state.tool_results, config) {
        state.evaluation = Some(forced_success(
            "변경 작업 완료",
            "변경 작업이 성공적으로 완료됨",
        ));
        return;
    }

    if state.tool_results.contains(SEARCH_RESULT_MARKER) {
        state.evaluation = Some(forced_success("검색 결과 충분", "검색에서 결과 획득"));
        return;
    }

    let Some(llm) = deps.llm.as_ref() else {
        state.evaluation = Some(forced_success("평가 생략", "LLM 비활성화"));
        return;
    };

    let prompt = format!(
        "도구 실행 결과가 질문에 답하기에 충분한지 평가해 JSON으로만 답하세요.\n\
         형식: {{\"evaluation\": \"한 줄 요약\", \"status\": \"success|retry|replanning\", \"reason\": \"이유\"}}\n\n\
         질문: {}\n계획: {}\n재시도 횟수: {}\n도구 실행 결과:\n{}",
        state.query(),
        state.plan,
        state.retry_count,
        if state.tool_results.is_empty() {
            "도구 실행 결과 없음"
        } else {
            &state.tool_results
        },
    );

    let request = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        json_mode: true,
        max_tokens: Some(300),
        ..Default::default()
    };

    match llm.chat(request).await {
        Ok(response) => {
            let wire = parse_lenient::<WireEvaluation>(&response.content);
            let Some(wire) = wire else {
                state.evaluation = Some(forced_success("평가 실패", "평가 응답 파싱 불가"));
                return;
            };
            let status = match wire.status.as_str() {
                "retry" => EvalStatus::Retry,
                "replanning" => EvalStatus::Replanning,
                "success" => EvalStatus::Success,
                other => {
                    tracing::warn!(status = other, "invalid evaluation status, coercing to success");
                    EvalStatus::Success
                }
            };
            if matches!(status, EvalStatus::Retry | EvalStatus::Replanning) {
                state.retry_count += 1;
            }
            state.evaluation = Some(Evaluation {
                evaluation: wire.evaluation,
                status,
                reason: wire.reason,
            });
        }
        Err(e) => {
            tracing::error!(run_id = %state.run_id, error = %e, "evaluation failed");
            state.evaluation = Some(forced_success(
                "평가 실패",
                "평가 중 오류 발생, 현재 결과로 응답 생성",
            ));
        }
    }
}
