use std::{path::Path, sync::Arc};

use anyhow::{bail, Context};
use presence_client::domain::Reading;
use sqlx::postgres::PgPoolOptions;

use crate::config::{AppConfig, InputConfig, InputKind};
use crate::model::{estimate_presence, AggregationStrategy, PresenceRun, Thresholds};
use crate::pipeline::{PipelineError, PresenceSink, ReadingPipeline, Source};
use crate::sources::{QuestDbReadingSource, ReadingColumns, ReadingCsvFileSource};
use crate::transform::ReadingValidation;

async fn collect_validated<S>(source: S, series: &'static str) -> Result<Vec<Reading>, PipelineError>
where
    S: Source<Reading> + Send + Sync + 'static,
{
    ReadingPipeline {
        source,
        transforms: vec![Arc::new(ReadingValidation::new(series))],
    }
    .collect()
    .await
}

fn columns(input: &InputConfig, value: &str) -> ReadingColumns {
    ReadingColumns {
        household: input.household_column.clone(),
        timestamp: input.timestamp_column.clone(),
        value: value.to_string(),
    }
}

/// Read both series from delimited files, validating every row.
pub async fn read_csv_inputs(
    input: &InputConfig,
    power_path: &Path,
    temperature_path: &Path,
) -> Result<(Vec<Reading>, Vec<Reading>), PipelineError> {
    let delimiter = input.delimiter as u8;
    let power = ReadingCsvFileSource::new(power_path, columns(input, &input.power_column))
        .with_delimiter(delimiter);
    let temperature = ReadingCsvFileSource::new(temperature_path, columns(input, &input.temperature_column))
        .with_delimiter(delimiter);

    futures::try_join!(
        collect_validated(power, "power"),
        collect_validated(temperature, "temperature"),
    )
}

/// Load both series from the configured input.
pub async fn load_inputs(cfg: &AppConfig) -> anyhow::Result<(Vec<Reading>, Vec<Reading>)> {
    tracing::info!(kind = ?cfg.input.kind, "loading data");
    let input = &cfg.input;

    let series = match input.kind {
        InputKind::Csv => {
            let (Some(power_path), Some(temperature_path)) = (&input.power_path, &input.temperature_path) else {
                bail!("input.power_path and input.temperature_path are required for csv input");
            };
            read_csv_inputs(input, power_path, temperature_path).await?
        }
        InputKind::Questdb => {
            let qdb = cfg
                .questdb
                .as_ref()
                .context("input.kind = \"questdb\" requires a [questdb] section")?;
            let (start, end) = qdb.window()?;
            let pool = PgPoolOptions::new()
                .max_connections(qdb.max_connections)
                .connect(&qdb.uri)
                .await?;

            let power = QuestDbReadingSource::new(
                pool.clone(),
                &qdb.power_table,
                &input.household_column,
                &input.power_column,
            )
            .with_window(start, end);
            let temperature = QuestDbReadingSource::new(
                pool,
                &qdb.temperature_table,
                &input.household_column,
                &input.temperature_column,
            )
            .with_window(start, end);
            futures::try_join!(
                collect_validated(power, "power"),
                collect_validated(temperature, "temperature"),
            )?
        }
    };

    Ok(series)
}

/// Estimate presence and hand the table to `sink`. Nothing is written when
/// estimation fails.
pub async fn run<K: PresenceSink>(
    power: Vec<Reading>,
    temperature: Vec<Reading>,
    thresholds: &Thresholds,
    strategy: AggregationStrategy,
    sink: &K,
) -> Result<PresenceRun, PipelineError> {
    let run = estimate_presence(power, temperature, thresholds, strategy)?;

    tracing::info!("writing user probabilities");
    sink.write(&run.table).await?;
    metrics::counter!("presence_training_runs_total").increment(1);
    tracing::info!(digest = %run.table.digest(), rows = run.table.len(), "training run complete");

    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PresenceTable;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        written: Mutex<Vec<PresenceTable>>,
    }

    #[async_trait::async_trait]
    impl PresenceSink for MemorySink {
        async fn write(&self, table: &PresenceTable) -> Result<(), PipelineError> {
            self.written.lock().unwrap().push(table.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn invalid_thresholds_write_nothing() {
        let sink = MemorySink::default();
        let res = run(
            vec![],
            vec![],
            &Thresholds { power: f64::INFINITY, temperature: 40.0 },
            AggregationStrategy::Mean,
            &sink,
        )
        .await;

        assert!(matches!(res, Err(PipelineError::Model(_))));
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_run_writes_once() {
        let sink = MemorySink::default();
        let run = run(
            vec![],
            vec![],
            &Thresholds { power: 5000.0, temperature: 40.0 },
            AggregationStrategy::Mean,
            &sink,
        )
        .await
        .unwrap();

        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], run.table);
    }

    #[tokio::test]
    async fn csv_inputs_use_the_configured_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let power_path = dir.path().join("power.csv");
        let temperature_path = dir.path().join("temperature.csv");
        std::fs::write(&power_path, "user;utc_datetime;electricity\nu1;2021-03-01 08:00:00;120.5\n").unwrap();
        std::fs::write(&temperature_path, "user;utc_datetime;inside\nu1;2021-03-01 08:00:00;21.0\n").unwrap();

        let cfg = AppConfig::from_toml(
            r#"
            [thresholds]
            power = 5000.0
            temperature = 40.0

            [input]
            delimiter = ";"

            [output]
            path = "out.csv"
            "#,
        )
        .unwrap();

        let (power, temperature) = read_csv_inputs(&cfg.input, &power_path, &temperature_path)
            .await
            .unwrap();
        assert_eq!(power[0].value, 120.5);
        assert_eq!(temperature[0].value, 21.0);
    }
}
