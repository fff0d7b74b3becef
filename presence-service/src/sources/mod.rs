pub mod questdb_readings;
pub mod reading_csv_file;

pub use questdb_readings::QuestDbReadingSource;
pub use reading_csv_file::{ReadingColumns, ReadingCsvFileSource};
