use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_agent::{
    create_router, AppState, Config, FileSinkFactory, GeminiResponder, HttpTranscriber,
    MurfSynthesizer, OriginalCredentials, PipelineOrchestrator, SessionStore,
};

#[derive(Debug, Parser)]
#[command(name = "voice-agent", version, about = "Conversational voice agent server")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-agent")]
    config: String,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.logging.level.to_lowercase())),
        )
        .init();

    info!("Voice Agent v{}", env!("CARGO_PKG_VERSION"));
    for issue in cfg.validate() {
        warn!("Config issue: {}", issue);
    }

    info!("Initializing AI services...");
    let store = Arc::new(SessionStore::new());
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store,
        Arc::new(HttpTranscriber::new(&cfg.stages.stt)?),
        Arc::new(GeminiResponder::new(&cfg.stages.llm)?),
        Arc::new(MurfSynthesizer::new(&cfg.stages.tts)?),
        cfg.chat.history_window,
    ));

    for health in orchestrator.stage_health() {
        info!(
            "Stage {} ({}): available={}",
            health.stage, health.provider, health.available
        );
    }

    let state = AppState::new(
        orchestrator,
        OriginalCredentials::from_config(&cfg.stages),
        Arc::new(FileSinkFactory::new(cfg.recording.uploads_path())),
    )
    .with_progress_every(cfg.recording.progress_every)
    .with_word_delay(Duration::from_millis(cfg.chat.stream_word_delay_ms))
    .with_max_upload_bytes(cfg.chat.max_upload_bytes())
    .with_static_dir(&cfg.static_dir);

    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
