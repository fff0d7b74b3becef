pub mod presence_csv;

pub use presence_csv::{load_presence_table, PresenceCsvSink};
