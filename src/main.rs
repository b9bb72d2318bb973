use anyhow::Context;
use lims_approval::api::{AppState, build_router};
use lims_approval::config::AppConfig;
use lims_approval::store::SledRepository;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = AppConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("config error")?;

    let repo = SledRepository::open(&config.db_path)
        .with_context(|| format!("failed to open approval store at {}", config.db_path))?;

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("server bind error on {bind_addr}"))?;

    info!(
        env = %config.rust_env,
        host = %config.api_host,
        port = config.api_port,
        db_path = %config.db_path,
        pending_scope = %config.pending_scope,
        max_conflict_retries = config.max_conflict_retries,
        "lims-approval started"
    );

    let state = AppState::new(config, repo);
    let flush_repo = state.engine.repository().clone();
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime error")?;

    flush_repo.flush().context("failed to flush approval store")?;
    info!("lims-approval stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
