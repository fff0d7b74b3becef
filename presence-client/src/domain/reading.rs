use time::OffsetDateTime;

/// A single sensor reading for one household.
///
/// The same shape carries both power draw and indoor temperature; which one
/// a value is depends on the series it was loaded from.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Reading {
    pub ts: OffsetDateTime,
    pub household_id: String,
    pub value: f64,
}
