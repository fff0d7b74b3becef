/// One row of the persisted presence table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PresenceEstimate {
    pub household_id: String,
    /// Hour of day, 0-23 (UTC).
    pub hour: u8,
    pub prob_presence: f64,
}
