use anyhow::{Context, Result};
use presence_service::{config::AppConfig, metrics_server, observability, serve, sinks::load_presence_table};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let serve_cfg = cfg
        .serve
        .as_ref()
        .context("a [serve] section is required to run the lookup service")?;

    let table = load_presence_table(&cfg.output.path)?;
    tracing::info!(
        path = %cfg.output.path.display(),
        rows = table.len(),
        households = table.households(),
        digest = %table.digest(),
        "presence table loaded"
    );

    serve::serve(&serve_cfg.bind_addr, serve::LookupState::new(table, serve_cfg.threshold)).await
}
