//! Confab gateway: per-meeting WebSocket signaling hub, meeting-room REST,
//! the transcript/agent API workers talk to, and the worker lifecycle
//! manager with its pooled STT credentials.

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod signaling;
pub mod runtime;
pub mod state;
pub mod stores;
