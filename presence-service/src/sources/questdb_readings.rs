use presence_client::{
    db::reading_queries::{load_readings, ReadingTable},
    domain::Reading,
};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::pipeline::{Envelope, PipelineError, ReadingStream, Source};

/// Reads one series from a QuestDB table over pgwire.
pub struct QuestDbReadingSource {
    pool: PgPool,
    table: String,
    household_column: String,
    value_column: String,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
}

impl QuestDbReadingSource {
    pub fn new(pool: PgPool, table: &str, household_column: &str, value_column: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
            household_column: household_column.to_string(),
            value_column: value_column.to_string(),
            start: None,
            end: None,
        }
    }

    /// Restrict to readings in `[start, end)`.
    pub fn with_window(mut self, start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

#[async_trait::async_trait]
impl Source<Reading> for QuestDbReadingSource {
    async fn stream(&self) -> ReadingStream<Reading> {
        let pool = self.pool.clone();
        let table = self.table.clone();
        let household_column = self.household_column.clone();
        let value_column = self.value_column.clone();
        let (start, end) = (self.start, self.end);

        let s = async_stream::try_stream! {
            let source = ReadingTable {
                table: &table,
                household_column: &household_column,
                value_column: &value_column,
            };
            let rows = load_readings(&pool, &source, start, end)
                .await
                .map_err(|e| PipelineError::Source(format!("questdb query on '{table}' failed: {e}")))?;
            tracing::info!(table = %table, rows = rows.len(), "loaded readings from questdb");

            for reading in rows {
                yield Envelope::new(reading);
            }
        };

        Box::pin(s)
    }
}
