use presence_client::domain::Reading;
use time::OffsetDateTime;

/// A reading after outlier removal.
///
/// `value` is `None` only when the household has no in-range reading at all,
/// so there is nothing to interpolate from.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedReading {
    pub household_id: String,
    pub ts: OffsetDateTime,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Readings at or above the threshold (or non-finite).
    pub outliers: usize,
    /// Outliers that could not be filled.
    pub unresolved: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSeries {
    pub readings: Vec<CleanedReading>,
    pub report: CleanReport,
}

/// Order readings by household, then time. Stable, so duplicates keep their
/// input order.
pub fn sort_readings(series: &mut [Reading]) {
    series.sort_by(|a, b| {
        a.household_id
            .cmp(&b.household_id)
            .then_with(|| a.ts.cmp(&b.ts))
    });
}

/// Replace every value `>= threshold` by a linear interpolation between the
/// nearest in-range neighbours of the same household.
///
/// Interpolation is weighted by time. A gap at the start or end of a
/// household's series takes the single nearest in-range value. A household
/// without any in-range value keeps its rows with `value: None`.
pub fn clean(mut series: Vec<Reading>, threshold: f64) -> CleanedSeries {
    sort_readings(&mut series);

    let mut readings: Vec<CleanedReading> = series
        .into_iter()
        .map(|r| {
            let in_range = r.value.is_finite() && r.value < threshold;
            CleanedReading {
                household_id: r.household_id,
                ts: r.ts,
                value: in_range.then_some(r.value),
            }
        })
        .collect();

    let outliers = readings.iter().filter(|r| r.value.is_none()).count();
    let mut unresolved = 0;
    if outliers > 0 {
        for household in readings.chunk_by_mut(|a, b| a.household_id == b.household_id) {
            unresolved += fill_gaps(household);
        }
    }

    CleanedSeries {
        readings,
        report: CleanReport { outliers, unresolved },
    }
}

/// Fills missing values of one household in place; returns how many stayed
/// missing.
fn fill_gaps(rows: &mut [CleanedReading]) -> usize {
    let anchors: Vec<(usize, OffsetDateTime, f64)> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.value.map(|v| (i, r.ts, v)))
        .collect();

    if anchors.is_empty() {
        return rows.len();
    }

    // `next` is the first anchor positioned after row `i`.
    let mut next = 0;
    for (i, row) in rows.iter_mut().enumerate() {
        while next < anchors.len() && anchors[next].0 <= i {
            next += 1;
        }
        if row.value.is_some() {
            continue;
        }

        let before = next.checked_sub(1).map(|k| anchors[k]);
        let after = anchors.get(next).copied();
        row.value = match (before, after) {
            (Some(b), Some(a)) => Some(interpolate(b, a, i, row.ts)),
            (Some((_, _, v)), None) | (None, Some((_, _, v))) => Some(v),
            (None, None) => None,
        };
    }

    0
}

fn interpolate(
    before: (usize, OffsetDateTime, f64),
    after: (usize, OffsetDateTime, f64),
    idx: usize,
    ts: OffsetDateTime,
) -> f64 {
    let (b_idx, b_ts, b_val) = before;
    let (a_idx, a_ts, a_val) = after;

    let span = (a_ts - b_ts).as_seconds_f64();
    let frac = if span > 0.0 {
        (ts - b_ts).as_seconds_f64() / span
    } else {
        // Same timestamp on both sides: fall back to row positions.
        (idx - b_idx) as f64 / (a_idx - b_idx) as f64
    };

    let value = b_val + frac.clamp(0.0, 1.0) * (a_val - b_val);
    value.clamp(b_val.min(a_val), b_val.max(a_val))
}
