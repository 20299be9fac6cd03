//! AppState construction: initialize every subsystem and wire it together.

use std::sync::Arc;

use cf_context::InMemorySnapshotStore;
use cf_domain::config::Config;
use cf_kg::StaticKg;
use cf_orchestration::tools::{build_registry, StoreOptionsProvider, ToolEnv};
use cf_orchestration::{Graph, GraphDeps, InMemoryCheckpointer};
use cf_providers::{ChatApiProvider, LlmProvider};

use crate::auth::{hash_token, DevAuth};
use crate::runtime::agent::AgentService;
use crate::runtime::contexts::ContextService;
use crate::runtime::hitl_index::HitlIndex;
use crate::runtime::pool::CredentialPool;
use crate::runtime::worker::backend_from_config;
use crate::runtime::worker::service::WorkerService;
use crate::signaling::ConnectionRegistry;
use crate::state::AppState;
use crate::stores::{
    InMemoryChatStore, InMemoryMeetingStore, InMemoryTeamStore, InMemoryTranscriptStore,
};

/// Initialize every subsystem and return a fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── LLM provider (optional — unset key degrades gracefully) ────
    let llm: Option<Arc<dyn LlmProvider>> = match ChatApiProvider::from_config(&config.llm) {
        Some(Ok(provider)) => {
            tracing::info!(model = %config.llm.model, "LLM provider ready");
            Some(Arc::new(provider))
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "LLM provider init failed, running without LLM");
            None
        }
        None => {
            tracing::info!(
                env = %config.llm.api_key_env,
                "LLM API key unset, summaries and planning run on fallbacks"
            );
            None
        }
    };

    // ── Persistence collaborators (in-memory for dev) ──────────────
    let meetings = Arc::new(InMemoryMeetingStore::new());
    let teams = Arc::new(InMemoryTeamStore::new());
    let transcripts = Arc::new(InMemoryTranscriptStore::new());
    let chat = Arc::new(InMemoryChatStore::new());
    let kg = Arc::new(StaticKg::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());

    // ── Context engine ─────────────────────────────────────────────
    let contexts = Arc::new(ContextService::new(
        config.context.clone(),
        llm.clone(),
        snapshots,
        transcripts.clone(),
    ));

    // ── Tool registry + orchestration graph ────────────────────────
    let tool_env = Arc::new(ToolEnv {
        meetings: meetings.clone(),
        teams: teams.clone(),
        transcripts: transcripts.clone(),
        kg,
        invite_secret: std::env::var("CF_INVITE_SECRET").unwrap_or_else(|_| "dev-invite".into()),
        invite_base_url: std::env::var("CF_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into()),
    });
    let registry = Arc::new(build_registry(tool_env));
    let graph = Arc::new(Graph::new(GraphDeps {
        llm,
        registry,
        options: Arc::new(StoreOptionsProvider::new(teams.clone())),
        checkpoints: Arc::new(InMemoryCheckpointer::new()),
        config: config.agent.clone(),
    }));

    let hitl = Arc::new(HitlIndex::new());
    let agent = Arc::new(AgentService::new(
        graph,
        contexts.clone(),
        transcripts.clone(),
        teams.clone(),
        hitl,
        config.agent.wake_word.clone(),
    ));

    // ── Worker lifecycle ───────────────────────────────────────────
    let pool = Arc::new(CredentialPool::new(&config.credentials));
    let manager = backend_from_config(&config.worker);
    let workers = Arc::new(WorkerService::new(pool, manager));
    tracing::info!(backend = ?config.worker.backend, "worker manager ready");

    // ── API token (worker auth) ────────────────────────────────────
    let api_token_hash = std::env::var(&config.server.api_token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| Arc::new(hash_token(&t)));
    if api_token_hash.is_none() {
        tracing::warn!("worker API token unset, worker endpoints are open (dev mode)");
    }

    Ok(AppState {
        config,
        auth: Arc::new(DevAuth),
        api_token_hash,
        registry: Arc::new(ConnectionRegistry::new()),
        meetings,
        teams,
        transcripts,
        chat,
        contexts,
        agent,
        workers,
    })
}
