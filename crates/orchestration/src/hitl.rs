//! Human-in-the-loop interrupt payloads.
//!
//! The payload shape is part of the external contract: clients render a
//! confirmation form from `required_fields` and resume the run with
//! `{action, params?, silent?}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::ToolSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// One input field in the HITL confirmation form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredField {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub input_type: String,
    pub placeholder: String,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    pub default_value: Option<Value>,
    /// Human label for the default (UUID → name, select fields only).
    pub default_display: Option<String>,
}

/// The interrupt payload surfaced to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlPayload {
    pub tool_name: String,
    pub params: Value,
    /// Display values for already-extracted params (UUID → label).
    pub params_display: Value,
    pub required_fields: Vec<RequiredField>,
    pub display_template: Option<String>,
    pub confirmation_message: String,
    pub hitl_request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeAction {
    Confirm,
    Cancel,
}

/// The value supplied when a suspended run resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlResume {
    pub action: ResumeAction,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub silent: bool,
}

/// Loads dynamic option lists (e.g. `user_teams`) for select fields.
#[async_trait]
pub trait OptionsProvider: Send + Sync {
    async fn options(&self, source: &str, user_id: &str) -> Vec<SelectOption>;
}

/// Provider that knows no sources; every lookup yields an empty list.
pub struct NoOptions;

#[async_trait]
impl OptionsProvider for NoOptions {
    async fn options(&self, source: &str, _user_id: &str) -> Vec<SelectOption> {
        tracing::warn!(source, "unknown options_source");
        Vec::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payload construction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Substitute `{{param}}` placeholders with extracted argument values.
pub fn render_template(template: &str, args: &Value) -> String {
    let mut rendered = template.to_string();
    if let Some(object) = args.as_object() {
        for (key, value) in object {
            let replacement = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), &replacement);
        }
    }
    rendered
}

/// Build the confirmation message: the display template when declared,
/// otherwise a generic prompt listing the extracted parameters.
pub fn confirmation_message(spec: &ToolSpec, args: &Value) -> String {
    if let Some(template) = &spec.display_template {
        return render_template(template, args);
    }

    let mut lines = vec![format!("{}을(를) 수행할까요?", spec.description)];
    let extracted: Vec<(String, String)> = args
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| {
                    let shown = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), shown)
                })
                .collect()
        })
        .unwrap_or_default();
    if !extracted.is_empty() {
        lines.push(String::new());
        lines.push("입력된 정보:".to_string());
        for (key, value) in extracted {
            lines.push(format!("  - {key}: {value}"));
        }
    }
    lines.join("\n")
}

/// Assemble the full interrupt payload for a mutation tool.
///
/// Dynamic `options_source` lists are loaded once per source; argument
/// UUIDs are substituted with human labels in `params_display` and field
/// defaults. Fields that gained options are promoted from `text` to
/// `select`.
pub async fn build_payload(
    spec: &ToolSpec,
    args: &Value,
    user_id: &str,
    options_provider: &dyn OptionsProvider,
    request_id: String,
) -> HitlPayload {
    let mut options_cache: std::collections::HashMap<String, Vec<SelectOption>> =
        std::collections::HashMap::new();

    for field in &spec.hitl_fields {
        if let Some(source) = &field.options_source {
            if !options_cache.contains_key(source) {
                let options = options_provider.options(source, user_id).await;
                options_cache.insert(source.clone(), options);
            }
        }
    }

    let label_for = |source: &Option<String>, value: &Value| -> Option<String> {
        let source = source.as_ref()?;
        let options = options_cache.get(source)?;
        let needle = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        options.iter().find(|o| o.value == needle).map(|o| o.label.clone())
    };

    let mut required_fields = Vec::new();
    let mut params_display = serde_json::Map::new();

    for field in &spec.hitl_fields {
        let default_value = args.get(&field.name).cloned().filter(|v| !v.is_null());
        let default_display = default_value
            .as_ref()
            .and_then(|v| label_for(&field.options_source, v));

        let options = field
            .options_source
            .as_ref()
            .and_then(|s| options_cache.get(s))
            .cloned()
            .unwrap_or_default();
        let input_type = if !options.is_empty() && field.input_type == "text" {
            "select".to_string()
        } else {
            field.input_type.clone()
        };

        if let Some(value) = &default_value {
            let shown = default_display.clone().unwrap_or_else(|| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            params_display.insert(field.name.clone(), Value::String(shown));
        }

        required_fields.push(RequiredField {
            name: field.name.clone(),
            description: if field.placeholder.is_empty() {
                field.name.clone()
            } else {
                field.placeholder.clone()
            },
            field_type: "str".into(),
            required: field.required,
            input_type,
            placeholder: field.placeholder.clone(),
            options,
            default_value,
            default_display,
        });
    }

    HitlPayload {
        tool_name: spec.name.clone(),
        params: args.clone(),
        params_display: Value::Object(params_display),
        required_fields,
        display_template: spec.display_template.clone(),
        confirmation_message: confirmation_message(spec, args),
        hitl_request_id: request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{object_schema, HitlFieldSpec};
    use crate::state::ToolCategory;

    struct TeamsOptions;

    #[async_trait]
    impl OptionsProvider for TeamsOptions {
        async fn options(&self, source: &str, _user_id: &str) -> Vec<SelectOption> {
            if source == "user_teams" {
                vec![SelectOption {
                    value: "team-uuid-1".into(),
                    label: "플랫폼팀".into(),
                }]
            } else {
                vec![]
            }
        }
    }

    fn create_meeting_spec() -> ToolSpec {
        ToolSpec {
            name: "create_meeting".into(),
            description: "새로운 회의 생성".into(),
            parameters: object_schema(&[("team_id", "string", "팀", true)]),
            category: ToolCategory::Mutation,
            modes: None,
            display_template: Some("{{team_id}} 팀에 '{{title}}' 회의를 만들까요?".into()),
            hitl_fields: vec![
                HitlFieldSpec::new("team_id", "text", "팀을 선택하세요").options_source("user_teams"),
                HitlFieldSpec::new("title", "text", "회의 제목"),
                HitlFieldSpec::new("scheduled_at", "datetime", "회의 시간").optional(),
            ],
        }
    }

    #[test]
    fn template_substitution() {
        let args = serde_json::json!({"team_id": "t1", "title": "주간 회의"});
        let rendered = render_template("{{team_id}} 팀에 '{{title}}' 회의를 만들까요?", &args);
        assert_eq!(rendered, "t1 팀에 '주간 회의' 회의를 만들까요?");
    }

    #[test]
    fn fallback_confirmation_lists_params() {
        let mut spec = create_meeting_spec();
        spec.display_template = None;
        let args = serde_json::json!({"title": "주간 회의", "skip": null});
        let message = confirmation_message(&spec, &args);
        assert!(message.contains("수행할까요?"));
        assert!(message.contains("title: 주간 회의"));
        assert!(!message.contains("skip"));
    }

    #[tokio::test]
    async fn payload_resolves_dynamic_options_and_labels() {
        let spec = create_meeting_spec();
        let args = serde_json::json!({"team_id": "team-uuid-1", "title": "주간 회의"});
        let payload = build_payload(&spec, &args, "u1", &TeamsOptions, "req-1".into()).await;

        assert_eq!(payload.hitl_request_id, "req-1");
        assert_eq!(payload.required_fields.len(), 3);

        let team_field = &payload.required_fields[0];
        assert_eq!(team_field.input_type, "select");
        assert_eq!(team_field.options.len(), 1);
        assert_eq!(team_field.default_display.as_deref(), Some("플랫폼팀"));

        // UUID replaced by the human label in the display map.
        assert_eq!(payload.params_display["team_id"], "플랫폼팀");
        assert_eq!(payload.params_display["title"], "주간 회의");
        // Raw params keep the UUID for execution.
        assert_eq!(payload.params["team_id"], "team-uuid-1");
    }

    #[test]
    fn resume_value_parses_wire_shape() {
        let raw = r#"{"action": "confirm", "params": {"title": "바뀐 제목"}}"#;
        let resume: HitlResume = serde_json::from_str(raw).unwrap();
        assert_eq!(resume.action, ResumeAction::Confirm);
        assert!(!resume.silent);

        let raw = r#"{"action": "cancel", "silent": true}"#;
        let resume: HitlResume = serde_json::from_str(raw).unwrap();
        assert_eq!(resume.action, ResumeAction::Cancel);
        assert!(resume.silent);
    }
}
