pub mod config;
pub mod metrics_server;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod serve;
pub mod sinks;
pub mod sources;
pub mod train;
pub mod transform;

pub use model::{estimate_presence, PresenceTable};
pub use pipeline::{Envelope, PipelineError};
