use crate::pipeline::{Envelope, PipelineError, Transform};
use presence_client::domain::Reading;
use time::macros::datetime;

/// Pure validation of a `Reading`.
///
/// Rules:
/// - value must be a finite number.
/// - household id must not be blank.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01).
///
/// Out-of-range magnitudes are not rejected here; the model treats them as
/// outliers and interpolates over them.
pub fn validate_reading(env: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
    let r = &env.payload;

    if !r.value.is_finite() {
        return Err(PipelineError::Transform(format!(
            "non-numeric value {} for household '{}'",
            r.value, r.household_id
        )));
    }

    if r.household_id.trim().is_empty() {
        return Err(PipelineError::Transform("household id must not be empty".to_string()));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.ts < min_ts || r.ts >= max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

/// Validation step for one named series, e.g. `"power"`.
#[derive(Clone)]
pub struct ReadingValidation {
    series: &'static str,
}

impl ReadingValidation {
    pub fn new(series: &'static str) -> Self {
        Self { series }
    }
}

#[async_trait::async_trait]
impl Transform<Reading, Reading> for ReadingValidation {
    async fn apply(&self, input: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
        match validate_reading(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_reading_rejected_total", "series" => self.series)
                    .increment(1);
                Err(e)
            }
        }
    }
}
