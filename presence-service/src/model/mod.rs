//! Unsupervised household presence model.
//!
//! Both series are cleaned, joined, averaged per calendar hour and compared
//! with the household's own history at the same hour and part of day. The
//! resulting quantile ranks are combined into one presence probability per
//! household and hour of day.

pub mod align;
pub mod clean;
pub mod hourly;
pub mod presence;
pub mod quantile;

use presence_client::domain::Reading;
use serde::Deserialize;

pub use align::{align, parse_timestamp, AlignedRecord};
pub use clean::{clean, CleanReport, CleanedReading, CleanedSeries};
pub use hourly::{aggregate, part_of_day, HourlySample};
pub use presence::{
    aggregate_presence, score_samples, AggregationStrategy, PartialScores, PresenceTable,
    ScoredSample,
};
pub use quantile::{
    build_profiles, quantile_levels, score, KeySelector, ProfileIndex, QuantileGrid,
    QuantileProfile, TemporalKey,
};

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("invalid {name} threshold {value}: must be a finite number")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Outlier cutoffs; readings at or above these are treated as sensor errors.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Thresholds {
    pub power: f64,
    pub temperature: f64,
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, value) in [("power", self.power), ("temperature", self.temperature)] {
            if !value.is_finite() {
                return Err(ModelError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }
}

/// Counters describing one training run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub power: CleanReport,
    pub temperature: CleanReport,
    pub aligned_records: usize,
    pub unmatched_temperature: usize,
    pub hourly_samples: usize,
    pub hour_profiles: usize,
    pub part_of_day_profiles: usize,
    pub constant_profiles: usize,
    pub skipped_samples: usize,
    pub table_rows: usize,
}

#[derive(Debug, Clone)]
pub struct PresenceRun {
    pub table: PresenceTable,
    pub report: RunReport,
}

/// Run the whole model over one batch of power and temperature readings.
///
/// Pure apart from logging: the same input always yields the same table.
pub fn estimate_presence(
    power: Vec<Reading>,
    temperature: Vec<Reading>,
    thresholds: &Thresholds,
    strategy: AggregationStrategy,
) -> Result<PresenceRun, ModelError> {
    thresholds.validate()?;
    let mut report = RunReport::default();

    tracing::info!(
        power_readings = power.len(),
        temperature_readings = temperature.len(),
        "removing outliers"
    );
    let power = clean(power, thresholds.power);
    let temperature = clean(temperature, thresholds.temperature);
    report.power = power.report;
    report.temperature = temperature.report;
    metrics::counter!("presence_outliers_replaced_total", "series" => "power")
        .increment((power.report.outliers - power.report.unresolved) as u64);
    metrics::counter!("presence_outliers_replaced_total", "series" => "temperature")
        .increment((temperature.report.outliers - temperature.report.unresolved) as u64);
    if power.report.unresolved + temperature.report.unresolved > 0 {
        tracing::warn!(
            power_unresolved = power.report.unresolved,
            temperature_unresolved = temperature.report.unresolved,
            "households without any in-range reading; values left missing"
        );
    }

    let aligned = align(power.readings, temperature.readings);
    report.aligned_records = aligned.len();
    report.unmatched_temperature = aligned.iter().filter(|r| r.power.is_none()).count();
    tracing::info!(
        aligned = report.aligned_records,
        without_power = report.unmatched_temperature,
        "series aligned"
    );

    let samples = aggregate(&aligned);
    report.hourly_samples = samples.len();

    tracing::info!(hourly_samples = samples.len(), "creating quantile values");
    let hourly = ProfileIndex::build(&samples, KeySelector::Hour);
    let daily = ProfileIndex::build(&samples, KeySelector::PartOfDay);
    report.hour_profiles = hourly.len();
    report.part_of_day_profiles = daily.len();
    report.constant_profiles = hourly.constant_profiles() + daily.constant_profiles();
    if report.constant_profiles > 0 {
        tracing::debug!(
            constant_profiles = report.constant_profiles,
            "profiles built from a single distinct value score only 0 or 1"
        );
    }

    tracing::info!(?strategy, "calculating presence probabilities per hour");
    let batch = score_samples(samples, &hourly, &daily, strategy);
    report.skipped_samples = batch.skipped;
    if batch.skipped > 0 {
        metrics::counter!("presence_samples_skipped_total").increment(batch.skipped as u64);
        tracing::warn!(skipped = batch.skipped, "hourly samples without any partial score");
    }

    let table = aggregate_presence(&batch.scored);
    report.table_rows = table.len();
    tracing::info!(
        rows = table.len(),
        households = table.households(),
        "presence table computed"
    );

    Ok(PresenceRun { table, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    fn readings(household: &str, start: OffsetDateTime, step: Duration, values: &[f64]) -> Vec<Reading> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| Reading {
                ts: start + step * i as i32,
                household_id: household.to_string(),
                value,
            })
            .collect()
    }

    #[test]
    fn thresholds_must_be_finite() {
        let ok = Thresholds { power: 5000.0, temperature: 40.0 };
        assert!(ok.validate().is_ok());

        let bad = Thresholds { power: f64::NAN, temperature: 40.0 };
        assert!(matches!(
            bad.validate(),
            Err(ModelError::InvalidThreshold { name: "power", .. })
        ));

        let err = estimate_presence(vec![], vec![], &bad, AggregationStrategy::Mean).unwrap_err();
        assert!(err.to_string().contains("power"));
    }

    #[test]
    fn empty_input_gives_empty_table() {
        let run = estimate_presence(
            vec![],
            vec![],
            &Thresholds { power: 1.0, temperature: 1.0 },
            AggregationStrategy::Mean,
        )
        .unwrap();
        assert!(run.table.is_empty());
        assert_eq!(run.report, RunReport::default());
    }

    #[test]
    fn report_counts_each_stage() {
        let start = datetime!(2021-03-01 07:50:00 UTC);
        let minute = Duration::minutes(1);
        // 20 minutes across hours 7 and 8; power only for the first 10.
        let temperature = readings("u1", start, minute, &[20.0; 20]);
        let mut power_values = vec![100.0; 10];
        power_values[4] = 9000.0;
        let power = readings("u1", start, minute, &power_values);

        let run = estimate_presence(
            power,
            temperature,
            &Thresholds { power: 5000.0, temperature: 40.0 },
            AggregationStrategy::Mean,
        )
        .unwrap();

        assert_eq!(run.report.power, CleanReport { outliers: 1, unresolved: 0 });
        assert_eq!(run.report.aligned_records, 20);
        assert_eq!(run.report.unmatched_temperature, 10);
        assert_eq!(run.report.hourly_samples, 2);
        assert_eq!(run.report.hour_profiles, 2);
        assert_eq!(run.report.part_of_day_profiles, 1);
        assert_eq!(run.report.skipped_samples, 0);
        assert_eq!(run.report.table_rows, 2);
        assert_eq!(run.table.get("u1", 7), Some(1.0));
        assert!(run.table.get("u1", 8).is_some());
    }
}
