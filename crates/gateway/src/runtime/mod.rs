//! Gateway runtime services: credential pool, per-meeting context managers,
//! agent run glue, HITL request index and the worker lifecycle.

pub mod agent;
pub mod contexts;
pub mod hitl_index;
pub mod pool;
pub mod worker;
