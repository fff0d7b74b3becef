use std::collections::HashMap;

use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

use super::clean::CleanedReading;
use super::ModelError;

/// Timestamp layouts without an offset; these are read as UTC.
const NAIVE_FORMATS: &[&[FormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

/// Parse a timestamp into a UTC instant.
///
/// RFC 3339 values are converted to UTC; values without an offset are taken
/// to already be UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, ModelError> {
    let trimmed = raw.trim();

    let rfc_err = match OffsetDateTime::parse(trimmed, &Rfc3339) {
        Ok(ts) => {
            return ts
                .checked_to_offset(UtcOffset::UTC)
                .ok_or_else(|| ModelError::InvalidTimestamp {
                    value: raw.to_string(),
                    reason: "instant is out of range in UTC".to_string(),
                })
        }
        Err(e) => e,
    };

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(trimmed, fmt).ok())
        .map(PrimitiveDateTime::assume_utc)
        .ok_or_else(|| ModelError::InvalidTimestamp {
            value: raw.to_string(),
            reason: rfc_err.to_string(),
        })
}

/// A temperature reading joined with the power reading at the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRecord {
    pub household_id: String,
    pub ts: OffsetDateTime,
    pub temperature: Option<f64>,
    pub power: Option<f64>,
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
}

fn sort_cleaned(series: &mut [CleanedReading]) {
    series.sort_by(|a, b| {
        a.household_id
            .cmp(&b.household_id)
            .then_with(|| a.ts.cmp(&b.ts))
    });
}

/// Left outer join of temperature (driving side) with power on
/// `(household, timestamp)`.
///
/// Every temperature reading yields exactly one record. When power holds
/// several readings at the same key, the first one in time order wins.
pub fn align(
    mut power: Vec<CleanedReading>,
    mut temperature: Vec<CleanedReading>,
) -> Vec<AlignedRecord> {
    sort_cleaned(&mut power);
    sort_cleaned(&mut temperature);

    let mut power_at: HashMap<(&str, OffsetDateTime), Option<f64>> =
        HashMap::with_capacity(power.len());
    for p in &power {
        power_at
            .entry((p.household_id.as_str(), p.ts))
            .or_insert(p.value);
    }

    temperature
        .iter()
        .map(|t| {
            // Readings from the sources are already UTC.
            let ts = t.ts.checked_to_offset(UtcOffset::UTC).unwrap_or(t.ts);
            let power = power_at
                .get(&(t.household_id.as_str(), t.ts))
                .copied()
                .flatten();
            AlignedRecord {
                household_id: t.household_id.clone(),
                ts,
                temperature: t.value,
                power,
                year: ts.year(),
                month: u8::from(ts.month()),
                day: ts.day(),
                hour: ts.hour(),
            }
        })
        .collect()
}
