//! Per-household empirical quantile profiles and the lookup that turns a
//! reading into its position in such a profile.

use std::collections::BTreeMap;

use super::hourly::HourlySample;

/// Number of points on the quantile grid: 0%, 5%, ..., 100%.
pub const QUANTILE_STEPS: usize = 21;

pub type QuantileLevels = [f64; QUANTILE_STEPS];

/// The 21 quantile levels 0.00, 0.05, ..., 1.00.
pub fn quantile_levels() -> QuantileLevels {
    std::array::from_fn(|i| i as f64 / (QUANTILE_STEPS - 1) as f64)
}

/// Linear-interpolation quantile of an ascending, non-empty slice.
///
/// Position `h = (n - 1) * q`; the result interpolates between the two
/// order statistics around `h`.
pub fn empirical_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let h = last as f64 * q.clamp(0.0, 1.0);
    let lo = (h.floor() as usize).min(last);
    let hi = (lo + 1).min(last);
    let frac = h - lo as f64;

    let (a, b) = (sorted[lo], sorted[hi]);
    Some((a + frac * (b - a)).clamp(a, b))
}

/// Estimated probability mass below `observed`.
///
/// Returns the level of the last profile value `<= observed`. An observation
/// below every profile value scores `0.0`; one at or above the maximum scores
/// the top level.
pub fn score(observed: f64, profile_values: &[f64], levels: &[f64]) -> f64 {
    let at_or_below = profile_values.partition_point(|&p| p <= observed);
    at_or_below
        .checked_sub(1)
        .and_then(|i| levels.get(i))
        .copied()
        .unwrap_or(0.0)
}

/// The 21 quantile values of one signal, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileGrid {
    values: QuantileLevels,
}

impl QuantileGrid {
    /// Build from raw observations; `None` when there are none.
    pub fn from_observations(mut observations: Vec<f64>) -> Option<Self> {
        observations.retain(|v| v.is_finite());
        observations.sort_by(f64::total_cmp);
        if observations.is_empty() {
            return None;
        }

        let levels = quantile_levels();
        let mut values = [0.0; QUANTILE_STEPS];
        for (slot, &q) in values.iter_mut().zip(levels.iter()) {
            *slot = empirical_quantile(&observations, q)?;
        }
        Some(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn score(&self, observed: f64) -> f64 {
        score(observed, &self.values, &quantile_levels())
    }

    /// All 21 values equal: the profile came from a single distinct value.
    pub fn is_constant(&self) -> bool {
        self.values[0] == self.values[QUANTILE_STEPS - 1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemporalKey {
    Hour(u8),
    PartOfDay(u8),
}

/// Which temporal key a profile set is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySelector {
    Hour,
    PartOfDay,
}

impl KeySelector {
    pub fn key_of(self, sample: &HourlySample) -> TemporalKey {
        match self {
            Self::Hour => TemporalKey::Hour(sample.hour),
            Self::PartOfDay => TemporalKey::PartOfDay(sample.part_of_day),
        }
    }
}

/// One household's normal behaviour at one temporal key.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileProfile {
    pub household_id: String,
    pub key: TemporalKey,
    pub levels: QuantileLevels,
    /// `None` when no sample in the group had a temperature.
    pub temperature: Option<QuantileGrid>,
    /// `None` when no sample in the group had a power reading.
    pub power: Option<QuantileGrid>,
    /// Hourly samples the profile was built from.
    pub observations: usize,
}

/// Group samples by (household, temporal key) and build one profile each.
///
/// Profiles are returned ordered by household, then key.
pub fn build_profiles(samples: &[HourlySample], selector: KeySelector) -> Vec<QuantileProfile> {
    let mut groups: BTreeMap<(&str, TemporalKey), Vec<&HourlySample>> = BTreeMap::new();
    for s in samples {
        groups
            .entry((s.household_id.as_str(), selector.key_of(s)))
            .or_default()
            .push(s);
    }

    groups
        .into_iter()
        .map(|((household_id, key), group)| QuantileProfile {
            household_id: household_id.to_string(),
            key,
            levels: quantile_levels(),
            temperature: QuantileGrid::from_observations(
                group.iter().filter_map(|s| s.mean_temperature).collect(),
            ),
            power: QuantileGrid::from_observations(
                group.iter().filter_map(|s| s.mean_power).collect(),
            ),
            observations: group.len(),
        })
        .collect()
}

/// Profiles addressable by (household, temporal key).
#[derive(Debug, Clone, Default)]
pub struct ProfileIndex {
    profiles: BTreeMap<String, BTreeMap<TemporalKey, QuantileProfile>>,
}

impl ProfileIndex {
    pub fn build(samples: &[HourlySample], selector: KeySelector) -> Self {
        build_profiles(samples, selector).into_iter().collect()
    }

    pub fn get(&self, household_id: &str, key: TemporalKey) -> Option<&QuantileProfile> {
        self.profiles.get(household_id)?.get(&key)
    }

    pub fn len(&self) -> usize {
        self.profiles.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuantileProfile> {
        self.profiles.values().flat_map(BTreeMap::values)
    }

    /// Profiles whose temperature or power grid is constant.
    pub fn constant_profiles(&self) -> usize {
        self.iter()
            .filter(|p| {
                p.temperature.as_ref().is_some_and(QuantileGrid::is_constant)
                    || p.power.as_ref().is_some_and(QuantileGrid::is_constant)
            })
            .count()
    }
}

impl FromIterator<QuantileProfile> for ProfileIndex {
    fn from_iter<I: IntoIterator<Item = QuantileProfile>>(iter: I) -> Self {
        let mut index = Self::default();
        for p in iter {
            index
                .profiles
                .entry(p.household_id.clone())
                .or_default()
                .insert(p.key, p);
        }
        index
    }
}
