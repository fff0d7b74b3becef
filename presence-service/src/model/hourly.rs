use std::collections::BTreeMap;

use super::align::AlignedRecord;

/// Hours per part-of-day bucket; gives four buckets, 0-3.
pub const HOURS_PER_PART_OF_DAY: u8 = 6;

pub fn part_of_day(hour: u8) -> u8 {
    hour / HOURS_PER_PART_OF_DAY
}

/// Mean readings of one household during one calendar hour.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySample {
    pub household_id: String,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub mean_temperature: Option<f64>,
    pub mean_power: Option<f64>,
    pub part_of_day: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.n += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

/// Collapse aligned records to one sample per (household, month, day, hour).
///
/// Missing values are left out of the mean rather than counted as zero.
/// Samples come back ordered by household, month, day and hour.
pub fn aggregate(aligned: &[AlignedRecord]) -> Vec<HourlySample> {
    let mut groups: BTreeMap<(&str, u8, u8, u8), (Mean, Mean)> = BTreeMap::new();

    for r in aligned {
        let (temperature, power) = groups
            .entry((r.household_id.as_str(), r.month, r.day, r.hour))
            .or_default();
        temperature.push(r.temperature);
        power.push(r.power);
    }

    groups
        .into_iter()
        .map(|((household_id, month, day, hour), (temperature, power))| HourlySample {
            household_id: household_id.to_string(),
            month,
            day,
            hour,
            mean_temperature: temperature.value(),
            mean_power: power.value(),
            part_of_day: part_of_day(hour),
        })
        .collect()
}
