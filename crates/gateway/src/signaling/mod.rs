//! WebSocket signaling: connection registry, message dispatch, socket loop.

pub mod dispatch;
pub mod registry;
pub mod ws;

pub use registry::ConnectionRegistry;
