use anyhow::{bail, Result};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::Reading;

/// Column names of a reading table in QuestDB.
#[derive(Debug, Clone)]
pub struct ReadingTable<'a> {
    pub table: &'a str,
    pub household_column: &'a str,
    pub value_column: &'a str,
}

fn check_identifier(ident: &str) -> Result<()> {
    if ident.is_empty() || !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid SQL identifier '{ident}'");
    }
    Ok(())
}

/// Fetch every reading of a table, ordered by household and time.
///
/// The table and column names cannot be bound as parameters, so they are
/// restricted to `[A-Za-z0-9_]` before being spliced into the query.
pub async fn load_readings(
    pool: &PgPool,
    source: &ReadingTable<'_>,
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
) -> Result<Vec<Reading>> {
    check_identifier(source.table)?;
    check_identifier(source.household_column)?;
    check_identifier(source.value_column)?;

    let sql = format!(
        r#"
        SELECT
            ts,
            {household} AS household_id,
            CAST({value} AS DOUBLE) AS value
        FROM {table}
        WHERE ($1 IS NULL OR ts >= $1)
          AND ($2 IS NULL OR ts <  $2)
        ORDER BY {household}, ts
        "#,
        household = source.household_column,
        value = source.value_column,
        table = source.table,
    );

    let rows = sqlx::query_as::<_, Reading>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
