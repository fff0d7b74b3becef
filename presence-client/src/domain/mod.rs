pub mod presence_estimate;
pub mod reading;

pub use presence_estimate::PresenceEstimate;
pub use reading::Reading;
