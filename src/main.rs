use anyhow::{Context, Result};
use crimestats::{server, Config};
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use warp::Filter;

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    // RUST_LOG wins; LOG_LEVEL is the deploy-time knob
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    info!("startup");

    // ─── 2) config: optional YAML file, then env overrides ───────────
    let mut config = match env::var("CRIMESTATS_CONFIG") {
        Ok(path) => Config::load(&path).with_context(|| format!("loading config {}", path))?,
        Err(_) => Config::default(),
    };
    config.apply_env();
    info!(
        dataset = %config.dataset_path.display(),
        entries = %config.entries_path.display(),
        timeout = ?config.request_timeout(),
        "configured"
    );
    if !config.dataset_path.is_file() {
        // every query re-reads the file, so it may appear later
        tracing::warn!(dataset = %config.dataset_path.display(), "dataset not found yet");
    }

    // ─── 3) serve ────────────────────────────────────────────────────
    let port = config.port;
    let routes = server::routes(server::AppState::new(config)).with(warp::log("crimestats"));

    info!("Server running on port {}", port);
    info!("Health check: http://localhost:{}/health", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
