//! Lenient JSON extraction for LLM responses.
//!
//! Models wrap JSON in prose or code fences more often than not. Parsing
//! tries the raw text first, then the substring between the first `{` and
//! the last `}`.

use serde::de::DeserializeOwned;

/// Extract the candidate JSON object substring from LLM output.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parse a typed value out of possibly prose-wrapped LLM output.
/// Returns `None` on any parse failure; callers fall back deterministically.
pub fn parse_lenient<T: DeserializeOwned>(text: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(text) {
        return Some(value);
    }
    let candidate = extract_json_object(text)?;
    serde_json::from_str::<T>(candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Detection {
        topic_changed: bool,
        #[serde(default)]
        current_topic: Option<String>,
    }

    #[test]
    fn parses_clean_json() {
        let parsed: Detection = parse_lenient(r#"{"topic_changed": true, "current_topic": "Pricing"}"#).unwrap();
        assert!(parsed.topic_changed);
        assert_eq!(parsed.current_topic.as_deref(), Some("Pricing"));
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = "Sure! Here is the result:\n```json\n{\"topic_changed\": false}\n```\nHope that helps.";
        let parsed: Detection = parse_lenient(raw).unwrap();
        assert!(!parsed.topic_changed);
    }

    #[test]
    fn nested_braces_survive_extraction() {
        let raw = "prefix {\"topic_changed\": true, \"current_topic\": \"{deep}\"} suffix";
        let parsed: Detection = parse_lenient(raw).unwrap();
        assert_eq!(parsed.current_topic.as_deref(), Some("{deep}"));
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_lenient::<Detection>("no json here").is_none());
        assert!(parse_lenient::<Detection>("{broken").is_none());
        assert!(parse_lenient::<Detection>("}{").is_none());
    }
}
