use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cf_backend_client::BackendClient;
use cf_domain::config::{SttConfig, TtsConfig};
use cf_providers::stt::SpeechWsClient;
use cf_providers::HttpTtsClient;
use cf_worker::media::BridgeTransport;
use cf_worker::tts::TtsPipeline;
use cf_worker::{RealtimeWorker, WorkerEnv};

/// Exit codes: 0 graceful completion, 1 fatal init failure. The
/// orchestrator kills the process externally on TTL expiry.
#[tokio::main]
async fn main() {
    let env = match WorkerEnv::from_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&env.log_level);

    match build_and_run(env).await {
        Ok(()) => {
            tracing::info!("worker exiting cleanly");
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal init failure");
            std::process::exit(1);
        }
    }
}

async fn build_and_run(env: WorkerEnv) -> cf_domain::Result<()> {
    tracing::info!(meeting_id = %env.meeting_id, "worker booting");

    let backend = Arc::new(BackendClient::new(
        &env.backend_api_url,
        env.backend_api_key.clone(),
    )?);

    let stt_secret = env.stt_secret.clone().ok_or_else(|| {
        cf_domain::Error::InvalidInput("CLOVA_STT_SECRET is not set".into())
    })?;
    let stt_config = SttConfig {
        endpoint: env.stt_endpoint.clone(),
        ..SttConfig::default()
    };
    let stt = Arc::new(SpeechWsClient::new(&stt_config, stt_secret));

    let transport = Arc::new(BridgeTransport::new(
        &env.media_ws_url,
        &env.meeting_id,
        env.media_api_key.clone(),
        env.media_api_secret.clone(),
    ));

    // TTS is optional: no server URL, no speech out.
    let tts_config = TtsConfig::default();
    let tts_pipeline = match &env.tts_server_url {
        Some(url) => {
            let client: Arc<dyn cf_providers::TtsClient> = Arc::new(HttpTtsClient::new(&TtsConfig {
                server_url: url.clone(),
                ..tts_config.clone()
            })?);
            let pipeline = TtsPipeline::new(
                tts_config.queue_capacity,
                tts_config.max_consecutive_failures,
            );
            tokio::spawn(pipeline.clone().run(client, transport.clone()));
            tracing::info!(server = %url, "TTS pipeline enabled");
            Some(pipeline)
        }
        None => {
            tracing::info!("TTS disabled (TTS_SERVER_URL unset)");
            None
        }
    };

    let worker = Arc::new(RealtimeWorker::new(
        env,
        backend,
        transport,
        stt,
        tts_pipeline,
    ));

    // SIGINT/SIGTERM trigger a clean stop.
    let signal_worker = worker.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_worker.request_stop();
    });

    worker.run().await
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
