use std::{env, path::PathBuf};

use anyhow::{bail, Result};
use presence_service::{
    config::{AppConfig, InputKind},
    metrics_server, observability,
    sinks::PresenceCsvSink,
    train,
};

/// Recompute the presence table.
///
/// usage: train_presence [<power_csv> <temperature_csv> [<output_csv>]]
///
/// Positional paths override the configured csv input and output.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() == 1 || args.len() > 3 {
        bail!("usage: train_presence [<power_csv> <temperature_csv> [<output_csv>]]");
    }

    let mut cfg = AppConfig::load()?;
    if args.len() >= 2 {
        cfg.input.kind = InputKind::Csv;
        cfg.input.power_path = Some(PathBuf::from(&args[0]));
        cfg.input.temperature_path = Some(PathBuf::from(&args[1]));
    }
    if let Some(output) = args.get(2) {
        cfg.output.path = PathBuf::from(output);
    }

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let (power, temperature) = train::load_inputs(&cfg).await?;
    let sink = PresenceCsvSink::new(&cfg.output.path);
    let run = train::run(power, temperature, &cfg.thresholds, cfg.model.aggregation, &sink).await?;

    tracing::info!(report = ?run.report, "done");
    Ok(())
}
