//! LLM-backed topic summarization with deterministic fallbacks.
//!
//! Two shapes: a fresh topic summary (full structured fields) and a
//! recursive summary that folds new utterances into an existing digest.
//! Any LLM failure — disabled, timeout, malformed JSON — degrades to a
//! deterministic summary; utterances are never dropped because of it.

use std::sync::Arc;

use serde_json::Value;

use cf_domain::config::ContextConfig;
use cf_domain::tool::ChatMessage;
use cf_domain::transcript::Utterance;
use cf_providers::json::parse_lenient;
use cf_providers::{ChatRequest, LlmProvider};

/// Structured output of a fresh topic summarization.
#[derive(Debug, Clone, Default)]
pub struct TopicSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub pending: Vec<String>,
    pub participants: Vec<String>,
    pub keywords: Vec<String>,
}

/// Structured output of a recursive (extend-the-segment) summarization.
#[derive(Debug, Clone, Default)]
pub struct RecursiveSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub keywords: Vec<String>,
}

pub struct Summarizer {
    llm: Option<Arc<dyn LlmProvider>>,
    include_timestamps: bool,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, config: &ContextConfig) -> Self {
        Self {
            llm,
            include_timestamps: config.l0_include_timestamps,
            max_tokens: config.l1_summary_max_tokens,
        }
    }

    // ── Prompts ────────────────────────────────────────────────────

    fn topic_prompt(&self, topic_name: &str, utterances_text: &str) -> String {
        format!(
            "다음은 회의에서 '{topic_name}' 주제로 나눈 대화입니다.\n\
             핵심을 요약해 JSON으로만 답하세요.\n\
             형식: {{\"summary\": \"한 문단 요약\", \"key_points\": [], \
             \"decisions\": [], \"pending\": [], \"participants\": [], \"keywords\": []}}\n\n\
             대화:\n{utterances_text}"
        )
    }

    fn recursive_prompt(
        &self,
        previous_summary: &str,
        start_turn: u64,
        end_turn: u64,
        utterances_text: &str,
    ) -> String {
        let previous = if previous_summary.is_empty() {
            "(empty)"
        } else {
            previous_summary
        };
        format!(
            "기존 요약에 새 대화({start_turn}~{end_turn}턴)를 반영해 갱신된 요약을 JSON으로만 답하세요.\n\
             형식: {{\"summary\": \"갱신된 요약\", \"key_points\": [], \"keywords\": []}}\n\n\
             기존 요약:\n{previous}\n\n새 대화:\n{utterances_text}"
        )
    }

    // ── Public API ─────────────────────────────────────────────────

    /// Summarize a fresh topic. Falls back deterministically on LLM failure.
    pub async fn summarize_topic(&self, utterances: &[Utterance], topic_name: &str) -> TopicSummary {
        let prompt = self.topic_prompt(topic_name, &self.format_utterances(utterances));

        if let Some(data) = self.call_llm(&prompt).await {
            let summary = data
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            if !summary.is_empty() {
                let mut participants = normalize_list(data.get("participants"));
                if participants.is_empty() {
                    participants = collect_participants(utterances);
                }
                return TopicSummary {
                    summary,
                    key_points: normalize_list(data.get("key_points")),
                    decisions: normalize_list(data.get("decisions")),
                    pending: normalize_list(data.get("pending")),
                    participants,
                    keywords: normalize_list(data.get("keywords")),
                };
            }
        }

        TopicSummary {
            summary: fallback_summary(topic_name, utterances),
            participants: collect_participants(utterances),
            ..Default::default()
        }
    }

    /// Fold new utterances into an existing digest.
    pub async fn recursive_summarize(
        &self,
        previous_summary: &str,
        new_utterances: &[Utterance],
    ) -> RecursiveSummary {
        let (start, end) = match (new_utterances.first(), new_utterances.last()) {
            (Some(first), Some(last)) => (first.id, last.id),
            _ => (0, 0),
        };
        let prompt = self.recursive_prompt(
            previous_summary,
            start,
            end,
            &self.format_utterances(new_utterances),
        );

        if let Some(data) = self.call_llm(&prompt).await {
            let summary = data
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            if !summary.is_empty() {
                return RecursiveSummary {
                    summary,
                    key_points: normalize_list(data.get("key_points")),
                    keywords: normalize_list(data.get("keywords")),
                };
            }
        }

        // Fallback: previous summary plus a truncated last-utterance note.
        let last_text = new_utterances.last().map(|u| u.text.as_str()).unwrap_or("");
        RecursiveSummary {
            summary: format!("{previous_summary}\n업데이트: {}", truncate(last_text, 120))
                .trim()
                .to_string(),
            ..Default::default()
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    async fn call_llm(&self, prompt: &str) -> Option<Value> {
        let llm = self.llm.as_ref()?;
        let request = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(self.max_tokens),
            json_mode: true,
            ..Default::default()
        };
        match llm.chat(request).await {
            Ok(response) => parse_lenient::<Value>(&response.content),
            Err(e) => {
                tracing::warn!(error = %e, "context summarization LLM call failed");
                None
            }
        }
    }

    fn format_utterances(&self, utterances: &[Utterance]) -> String {
        utterances
            .iter()
            .map(|u| {
                if self.include_timestamps {
                    format!(
                        "[{}] {}: {}",
                        u.absolute_timestamp.format("%H:%M:%S"),
                        u.speaker_name,
                        u.text
                    )
                } else {
                    format!("[{}] {}", u.speaker_name, u.text)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalize an LLM response value to `Vec<String>`: lists pass through,
/// a bare string becomes a single element, anything else is stringified.
pub fn normalize_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Null => None,
                Value::String(_) => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(other) => vec![other.to_string()],
    }
}

/// Merge two lists keeping first-seen order and dropping duplicates.
pub fn merge_unique(existing: &[String], new_items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    existing
        .iter()
        .chain(new_items.iter())
        .filter(|item| !item.is_empty() && seen.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Speaker names in first-spoke order, deduped.
pub fn collect_participants(utterances: &[Utterance]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    utterances
        .iter()
        .filter(|u| !u.speaker_name.is_empty() && seen.insert(u.speaker_name.as_str()))
        .map(|u| u.speaker_name.clone())
        .collect()
}

fn fallback_summary(topic_name: &str, utterances: &[Utterance]) -> String {
    if utterances.is_empty() {
        return format!("{topic_name} 논의 요약 없음.");
    }
    let first = &utterances[0].text;
    let last = &utterances[utterances.len() - 1].text;
    format!(
        "{topic_name} 논의 {}턴. 시작: {} / 마지막: {}",
        utterances.len(),
        truncate(first, 80),
        truncate(last, 80)
    )
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utterance(id: u64, speaker: &str, text: &str) -> Utterance {
        Utterance {
            id,
            speaker_id: speaker.to_lowercase(),
            speaker_name: speaker.into(),
            text: text.into(),
            start_ms: id * 1000,
            end_ms: id * 1000 + 800,
            absolute_timestamp: Utc::now(),
            confidence: 0.9,
            topic: None,
        }
    }

    #[test]
    fn normalize_list_variants() {
        assert!(normalize_list(None).is_empty());
        assert!(normalize_list(Some(&Value::Null)).is_empty());
        assert_eq!(
            normalize_list(Some(&serde_json::json!(["a", "", "b"]))),
            vec!["a", "b"]
        );
        assert_eq!(normalize_list(Some(&serde_json::json!("solo"))), vec!["solo"]);
        assert_eq!(normalize_list(Some(&serde_json::json!(3))), vec!["3"]);
    }

    #[test]
    fn merge_unique_preserves_order() {
        let merged = merge_unique(
            &["a".into(), "b".into()],
            &["b".into(), "c".into(), "a".into()],
        );
        assert_eq!(merged, vec!["a", "b", "c"]);
    }

    #[test]
    fn collect_participants_dedupes_in_order() {
        let utterances = vec![
            utterance(1, "Ana", "hi"),
            utterance(2, "Ben", "hey"),
            utterance(3, "Ana", "again"),
        ];
        assert_eq!(collect_participants(&utterances), vec!["Ana", "Ben"]);
    }

    #[tokio::test]
    async fn disabled_llm_falls_back_deterministically() {
        let summarizer = Summarizer::new(None, &ContextConfig::default());
        let utterances = vec![
            utterance(1, "Ana", "가격 정책을 정해야 합니다"),
            utterance(2, "Ben", "다음 주까지 초안을 만들죠"),
        ];
        let summary = summarizer.summarize_topic(&utterances, "Pricing").await;
        assert!(summary.summary.contains("Pricing"));
        assert!(summary.summary.contains("2턴"));
        assert_eq!(summary.participants, vec!["Ana", "Ben"]);
        assert!(summary.key_points.is_empty());
    }

    #[tokio::test]
    async fn recursive_fallback_appends_update_line() {
        let summarizer = Summarizer::new(None, &ContextConfig::default());
        let utterances = vec![utterance(9, "Ana", "결론은 내일 공유합니다")];
        let result = summarizer.recursive_summarize("이전 요약.", &utterances).await;
        assert!(result.summary.starts_with("이전 요약."));
        assert!(result.summary.contains("업데이트: 결론은"));
    }
}
