//! Shared application state passed to all handlers.

use std::sync::Arc;

use cf_domain::config::Config;
use cf_domain::stores::{ChatStore, MeetingStore, TeamStore, TranscriptStore};

use crate::auth::AuthVerifier;
use crate::runtime::agent::AgentService;
use crate::runtime::contexts::ContextService;
use crate::runtime::worker::service::WorkerService;
use crate::signaling::ConnectionRegistry;

/// Fields are grouped by concern:
/// - **Core** — config, caller auth
/// - **Signaling** — the per-meeting connection registry
/// - **Persistence collaborators** — meetings, teams, transcripts, chat
/// - **Runtime** — context engine, agent graph glue, worker lifecycle
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub auth: Arc<dyn AuthVerifier>,
    /// SHA-256 of the worker API token; `None` = dev mode (no auth).
    pub api_token_hash: Option<Arc<Vec<u8>>>,

    // ── Signaling ─────────────────────────────────────────────────
    pub registry: Arc<ConnectionRegistry>,

    // ── Persistence collaborators ─────────────────────────────────
    pub meetings: Arc<dyn MeetingStore>,
    pub teams: Arc<dyn TeamStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub chat: Arc<dyn ChatStore>,

    // ── Runtime ───────────────────────────────────────────────────
    pub contexts: Arc<ContextService>,
    pub agent: Arc<AgentService>,
    pub workers: Arc<WorkerService>,
}
