//! Per-meeting context engine.
//!
//! Maintains the two-level transcript hierarchy: L0 (bounded raw window plus
//! a bounded current-topic buffer) and L1 (ordered topic segments produced by
//! incremental summarization). Topic-change detection decides when a segment
//! closes; recursive summarization extends the open one.

pub mod manager;
pub mod snapshot;
pub mod speaker;
pub mod summarize;
pub mod topic;

pub use manager::ContextManager;
pub use snapshot::{InMemorySnapshotStore, SnapshotStore};
pub use summarize::Summarizer;
pub use topic::TopicDetector;
