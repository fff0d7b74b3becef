use std::collections::BTreeMap;

use presence_client::domain::PresenceEstimate;
use serde::Deserialize;

use super::hourly::HourlySample;
use super::quantile::{KeySelector, ProfileIndex, QuantileGrid};

/// How the partial scores of one hourly sample are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy {
    /// Unweighted mean of the partial scores.
    #[default]
    Mean,
    /// Strongest single signal.
    Max,
}

impl AggregationStrategy {
    /// `None` when there is nothing to combine.
    pub fn combine(self, scores: &[f64]) -> Option<f64> {
        if scores.is_empty() {
            return None;
        }
        let combined = match self {
            Self::Mean => scores.iter().sum::<f64>() / scores.len() as f64,
            Self::Max => scores.iter().copied().fold(f64::MIN, f64::max),
        };
        Some(combined.clamp(0.0, 1.0))
    }
}

/// Quantile ranks of one hourly sample within its household's profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialScores {
    pub temperature_hour: Option<f64>,
    pub temperature_part_of_day: Option<f64>,
    pub power_hour: Option<f64>,
    pub power_part_of_day: Option<f64>,
}

impl PartialScores {
    pub fn defined(&self) -> Vec<f64> {
        [
            self.temperature_hour,
            self.temperature_part_of_day,
            self.power_hour,
            self.power_part_of_day,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSample {
    pub sample: HourlySample,
    pub scores: PartialScores,
    pub prob_presence: f64,
}

fn grid_score(observed: Option<f64>, grid: Option<&QuantileGrid>) -> Option<f64> {
    Some(grid?.score(observed?))
}

/// Score one sample against the hour and part-of-day profiles of its own
/// household.
pub fn partial_scores(
    sample: &HourlySample,
    hourly: &ProfileIndex,
    daily: &ProfileIndex,
) -> PartialScores {
    let by_hour = hourly.get(&sample.household_id, KeySelector::Hour.key_of(sample));
    let by_part = daily.get(&sample.household_id, KeySelector::PartOfDay.key_of(sample));

    PartialScores {
        temperature_hour: grid_score(
            sample.mean_temperature,
            by_hour.and_then(|p| p.temperature.as_ref()),
        ),
        temperature_part_of_day: grid_score(
            sample.mean_temperature,
            by_part.and_then(|p| p.temperature.as_ref()),
        ),
        power_hour: grid_score(sample.mean_power, by_hour.and_then(|p| p.power.as_ref())),
        power_part_of_day: grid_score(sample.mean_power, by_part.and_then(|p| p.power.as_ref())),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredBatch {
    pub scored: Vec<ScoredSample>,
    /// Samples without a single defined partial score.
    pub skipped: usize,
}

/// Score every sample; samples with no defined partial score are skipped.
pub fn score_samples(
    samples: Vec<HourlySample>,
    hourly: &ProfileIndex,
    daily: &ProfileIndex,
    strategy: AggregationStrategy,
) -> ScoredBatch {
    let mut batch = ScoredBatch::default();
    for sample in samples {
        let scores = partial_scores(&sample, hourly, daily);
        match strategy.combine(&scores.defined()) {
            Some(prob_presence) => batch.scored.push(ScoredSample {
                sample,
                scores,
                prob_presence,
            }),
            None => batch.skipped += 1,
        }
    }
    batch
}

/// Presence probability per household and hour of day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceTable {
    rows: Vec<PresenceEstimate>,
}

impl PresenceTable {
    /// Rows are sorted by household and hour; later duplicates of a
    /// (household, hour) pair are dropped.
    pub fn from_rows(mut rows: Vec<PresenceEstimate>) -> Self {
        rows.sort_by(|a, b| {
            a.household_id
                .cmp(&b.household_id)
                .then_with(|| a.hour.cmp(&b.hour))
        });
        rows.dedup_by(|later, earlier| {
            later.household_id == earlier.household_id && later.hour == earlier.hour
        });
        Self { rows }
    }

    pub fn rows(&self) -> &[PresenceEstimate] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<PresenceEstimate> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, household_id: &str, hour: u8) -> Option<f64> {
        self.rows
            .binary_search_by(|r| {
                r.household_id
                    .as_str()
                    .cmp(household_id)
                    .then_with(|| r.hour.cmp(&hour))
            })
            .ok()
            .map(|i| self.rows[i].prob_presence)
    }

    pub fn households(&self) -> usize {
        let mut count = 0;
        let mut last: Option<&str> = None;
        for r in &self.rows {
            if last != Some(r.household_id.as_str()) {
                count += 1;
                last = Some(r.household_id.as_str());
            }
        }
        count
    }

    /// Content hash of the table, stable across runs on identical input.
    pub fn digest(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&(self.rows.len() as u64).to_le_bytes());
        for r in &self.rows {
            h.update(&(r.household_id.len() as u32).to_le_bytes());
            h.update(r.household_id.as_bytes());
            h.update(&[r.hour]);
            h.update(&r.prob_presence.to_bits().to_le_bytes());
        }
        h.finalize().to_hex().to_string()
    }
}

/// Mean presence per (household, hour of day) across all scored days.
pub fn aggregate_presence(scored: &[ScoredSample]) -> PresenceTable {
    let mut acc: BTreeMap<(&str, u8), (f64, usize)> = BTreeMap::new();
    for s in scored {
        let (sum, n) = acc
            .entry((s.sample.household_id.as_str(), s.sample.hour))
            .or_insert((0.0, 0));
        *sum += s.prob_presence;
        *n += 1;
    }

    // BTreeMap iteration is already sorted and unique.
    PresenceTable {
        rows: acc
            .into_iter()
            .map(|((household_id, hour), (sum, n))| PresenceEstimate {
                household_id: household_id.to_string(),
                hour,
                prob_presence: (sum / n as f64).clamp(0.0, 1.0),
            })
            .collect(),
    }
}
