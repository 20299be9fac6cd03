//! Static tool catalog.
//!
//! Tools are registered once at init into a typed map: a JSON-schema spec
//! the LLM sees, HITL metadata for mutation confirmation, and the handler
//! itself. The caller's `user_id` is injected at invocation time and is
//! never part of the LLM-visible schema.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use cf_domain::error::Result;
use cf_domain::tool::ToolDefinition;

use crate::state::{AgentMode, ToolCategory};

/// Per-parameter HITL field configuration.
#[derive(Debug, Clone)]
pub struct HitlFieldSpec {
    pub name: String,
    /// "text" | "textarea" | "datetime" | "select" | …
    pub input_type: String,
    /// Dynamic option source (e.g. "user_teams"); resolved at interrupt time.
    pub options_source: Option<String>,
    pub placeholder: String,
    pub required: bool,
}

impl HitlFieldSpec {
    pub fn new(name: &str, input_type: &str, placeholder: &str) -> Self {
        Self {
            name: name.into(),
            input_type: input_type.into(),
            options_source: None,
            placeholder: placeholder.into(),
            required: true,
        }
    }

    pub fn options_source(mut self, source: &str) -> Self {
        self.options_source = Some(source.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Everything the graph knows about one tool besides its handler.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the LLM-visible parameters.
    pub parameters: Value,
    pub category: ToolCategory,
    /// `None` = available in every mode.
    pub modes: Option<Vec<AgentMode>>,
    /// `{{param}}` template shown in the HITL confirmation UI.
    pub display_template: Option<String>,
    pub hitl_fields: Vec<HitlFieldSpec>,
}

/// Invocation context handed to handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub args: Value,
}

impl ToolContext {
    /// String argument accessor, treating `null`/missing as absent.
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

pub type ToolHandler = Arc<dyn Fn(ToolContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

struct RegisteredTool {
    spec: ToolSpec,
    handler: ToolHandler,
}

/// The process-wide tool catalog, built once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name replaces the previous entry.
    pub fn register<F>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(ToolContext) -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static,
    {
        let name = spec.name.clone();
        if self
            .tools
            .insert(name.clone(), RegisteredTool { spec, handler: Arc::new(handler) })
            .is_some()
        {
            tracing::warn!(tool = %name, "tool re-registered, previous entry replaced");
        }
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    pub fn handler(&self, name: &str) -> Option<ToolHandler> {
        self.tools.get(name).map(|t| t.handler.clone())
    }

    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.spec(name).map(|s| s.category)
    }

    pub fn is_mutation(&self, name: &str) -> bool {
        self.category_of(name) == Some(ToolCategory::Mutation)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// LLM-visible definitions for one mode. Tools with `modes: None` are
    /// unrestricted; others must list the mode explicitly.
    pub fn definitions_for_mode(&self, mode: AgentMode) -> Vec<ToolDefinition> {
        let mut specs: Vec<&ToolSpec> = self
            .tools
            .values()
            .map(|t| &t.spec)
            .filter(|s| s.modes.as_ref().map_or(true, |modes| modes.contains(&mode)))
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
            .into_iter()
            .map(|s| ToolDefinition {
                name: s.name.clone(),
                description: s.description.clone(),
                parameters: s.parameters.clone(),
            })
            .collect()
    }
}

/// Build a JSON-schema object from `(name, type, description, required)` rows.
pub fn object_schema(fields: &[(&str, &str, &str, bool)]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, ty, description, req) in fields {
        properties.insert(
            (*name).to_string(),
            serde_json::json!({ "type": ty, "description": description }),
        );
        if *req {
            required.push(Value::String((*name).to_string()));
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
