//! Agent orchestration graph.
//!
//! A small state machine over [`state::OrchestrationState`]: planner →
//! tool executor → evaluator → response generator, with an explicit
//! checkpointer so mutation tools can suspend on a human-in-the-loop
//! interrupt and resume later. Two variants share the machinery: **voice**
//! (query tools only, simple-router fast path) and **spotlight** (query +
//! mutation tools, HITL on mutations).

pub mod composite;
pub mod evaluator;
pub mod generator;
pub mod graph;
pub mod hitl;
pub mod planner;
pub mod registry;
pub mod router;
pub mod state;
pub mod tools;
pub mod tools_node;

pub use graph::{Checkpointer, Graph, GraphDeps, GraphOutcome, InMemoryCheckpointer};
pub use hitl::{HitlPayload, HitlResume, OptionsProvider, SelectOption};
pub use registry::{ToolContext, ToolRegistry, ToolSpec};
pub use state::{AgentMode, OrchestrationState, ToolCategory};
