//! Topic-change detection.
//!
//! Two paths: a keyword quick check on the latest utterance (cheap, runs on
//! every ingest when enabled) and an LLM check over the recent window plus
//! the previous topic summary. LLM failure means "no change" — a missed
//! transition only delays segmentation, it never loses content.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use cf_domain::tool::ChatMessage;
use cf_domain::transcript::Utterance;
use cf_providers::json::parse_lenient;
use cf_providers::{ChatRequest, LlmProvider};

/// Outcome of a topic-change check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicDetection {
    #[serde(default)]
    pub topic_changed: bool,
    #[serde(default)]
    pub current_topic: Option<String>,
}

const TRANSITION_HINTS: &[&str] = &[
    "다음 주제",
    "다음 안건",
    "넘어가",
    "넘어갑시다",
    "다른 얘기",
    "다른 이야기",
    "그건 그렇고",
    "본론으로",
    "이제",
    "next topic",
    "moving on",
    "let's move",
];

pub struct TopicDetector {
    llm: Option<Arc<dyn LlmProvider>>,
    custom_keywords: RwLock<Vec<String>>,
}

impl TopicDetector {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            llm,
            custom_keywords: RwLock::new(Vec::new()),
        }
    }

    /// Extend the quick-check vocabulary at runtime.
    pub fn add_custom_keywords(&self, keywords: Vec<String>) {
        self.custom_keywords
            .write()
            .extend(keywords.into_iter().filter(|k| !k.is_empty()));
    }

    /// Keyword fast path: does the text lexically hint at a transition?
    pub fn quick_check(&self, text: &str) -> bool {
        TRANSITION_HINTS.iter().any(|hint| text.contains(hint))
            || self
                .custom_keywords
                .read()
                .iter()
                .any(|hint| text.contains(hint.as_str()))
    }

    /// LLM check over the recent window. Returns "no change" on any failure.
    pub async fn detect(
        &self,
        recent_utterances: &[Utterance],
        previous_topic_summary: &str,
    ) -> TopicDetection {
        let Some(llm) = self.llm.as_ref() else {
            return TopicDetection::default();
        };
        if recent_utterances.is_empty() {
            return TopicDetection::default();
        }

        let window = recent_utterances
            .iter()
            .map(|u| format!("[{}] {}", u.speaker_name, u.text))
            .collect::<Vec<_>>()
            .join("\n");
        let previous = if previous_topic_summary.is_empty() {
            "(none)"
        } else {
            previous_topic_summary
        };
        let prompt = format!(
            "회의 주제가 바뀌었는지 판단해 JSON으로만 답하세요.\n\
             형식: {{\"topic_changed\": true|false, \"current_topic\": \"새 주제명 (바뀐 경우)\"}}\n\n\
             이전 주제 요약:\n{previous}\n\n최근 대화:\n{window}"
        );

        let request = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(200),
            json_mode: true,
            ..Default::default()
        };
        match llm.chat(request).await {
            Ok(response) => {
                let detection =
                    parse_lenient::<TopicDetection>(&response.content).unwrap_or_default();
                // Normalize an empty proposed name to None so the caller
                // generates `Topic_N` instead.
                TopicDetection {
                    topic_changed: detection.topic_changed,
                    current_topic: detection
                        .current_topic
                        .filter(|name| !name.trim().is_empty()),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "topic detection LLM call failed");
                TopicDetection::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_check_matches_builtin_hints() {
        let detector = TopicDetector::new(None);
        assert!(detector.quick_check("자, 다음 주제로 넘어갑시다"));
        assert!(detector.quick_check("ok, moving on to budget"));
        assert!(!detector.quick_check("좋은 의견입니다"));
    }

    #[test]
    fn quick_check_matches_custom_keywords() {
        let detector = TopicDetector::new(None);
        assert!(!detector.quick_check("스프린트 회고 시작할까요"));
        detector.add_custom_keywords(vec!["회고".into()]);
        assert!(detector.quick_check("스프린트 회고 시작할까요"));
    }

    #[tokio::test]
    async fn detect_without_llm_reports_no_change() {
        let detector = TopicDetector::new(None);
        let detection = detector.detect(&[], "prev").await;
        assert!(!detection.topic_changed);
        assert!(detection.current_topic.is_none());
    }
}
