use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use presence_client::domain::Reading;

use crate::model::parse_timestamp;
use crate::pipeline::{Envelope, PipelineError, ReadingStream, Source};

/// Header names of a reading file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingColumns {
    pub household: String,
    pub timestamp: String,
    pub value: String,
}

impl ReadingColumns {
    /// `user`, `utc_datetime` and the given value column.
    pub fn with_value(value: &str) -> Self {
        Self {
            household: "user".to_string(),
            timestamp: "utc_datetime".to_string(),
            value: value.to_string(),
        }
    }
}

/// Delimited-text source for one reading series.
///
/// Columns are looked up by header name, so extra columns and any column
/// order are accepted. Every row must carry a household, a parsable timestamp
/// and a numeric value; the first bad row fails the stream.
pub struct ReadingCsvFileSource {
    path: PathBuf,
    columns: ReadingColumns,
    delimiter: u8,
}

impl ReadingCsvFileSource {
    pub fn new<P: Into<PathBuf>>(path: P, columns: ReadingColumns) -> Self {
        Self {
            path: path.into(),
            columns,
            delimiter: b',',
        }
    }

    /// Field separator, as configured by `input.delimiter`. Defaults to `,`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

struct ColumnIndex {
    household: usize,
    timestamp: usize,
    value: usize,
}

fn locate_columns(headers: &StringRecord, columns: &ReadingColumns) -> Result<ColumnIndex, PipelineError> {
    let find = |name: &str| -> Result<usize, PipelineError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in CSV header")))
    };

    Ok(ColumnIndex {
        household: find(&columns.household)?,
        timestamp: find(&columns.timestamp)?,
        value: find(&columns.value)?,
    })
}

fn record_to_reading(record: &StringRecord, idx: &ColumnIndex, line: u64) -> Result<Reading, PipelineError> {
    let get = |i: usize| -> Result<&str, PipelineError> {
        record
            .get(i)
            .map(str::trim)
            .ok_or_else(|| PipelineError::Source(format!("line {line}: record has too few fields")))
    };

    let household_id = get(idx.household)?.to_string();
    let ts = parse_timestamp(get(idx.timestamp)?)?;

    let value_str = get(idx.value)?;
    let value: f64 = value_str
        .parse()
        .map_err(|e| PipelineError::Source(format!("line {line}: invalid value '{value_str}': {e}")))?;

    Ok(Reading {
        ts,
        household_id,
        value,
    })
}

#[async_trait::async_trait]
impl Source<Reading> for ReadingCsvFileSource {
    async fn stream(&self) -> ReadingStream<Reading> {
        // Blocking reader inside a single async task; files are read once per
        // training run.
        let path = self.path.clone();
        let columns = self.columns.clone();
        let delimiter = self.delimiter;
        let s = async_stream::try_stream! {
            let file = File::open(&path)
                .map_err(|e| PipelineError::Source(format!("failed to open {}: {e}", path.display())))?;
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
                .clone();
            let idx = locate_columns(&headers, &columns)?;

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read CSV record: {e}"
                )))?;
                let line = record.position().map(|p| p.line()).unwrap_or_default();

                let reading = match record_to_reading(&record, &idx, line) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("reading_csv_parse_errors_total").increment(1);
                        Err(e)?
                    }
                };
                metrics::counter!("reading_csv_records_total").increment(1);

                yield Envelope::new(reading);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;
    use time::macros::datetime;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    async fn read_all(source: ReadingCsvFileSource) -> Result<Vec<Reading>, PipelineError> {
        source.stream().await.map_ok(|env| env.payload).try_collect().await
    }

    #[tokio::test]
    async fn reads_rows_by_header_name() {
        let file = write_file(
            "utc_datetime,electricity,user\n\
             2021-03-01 08:00:00,120.5,u1\n\
             2021-03-01T08:01:00Z,80,u2\n",
        );

        let readings = read_all(ReadingCsvFileSource::new(file.path(), ReadingColumns::with_value("electricity")))
            .await
            .unwrap();

        assert_eq!(
            readings,
            vec![
                Reading {
                    ts: datetime!(2021-03-01 08:00:00 UTC),
                    household_id: "u1".to_string(),
                    value: 120.5,
                },
                Reading {
                    ts: datetime!(2021-03-01 08:01:00 UTC),
                    household_id: "u2".to_string(),
                    value: 80.0,
                },
            ]
        );
    }

    #[tokio::test]
    async fn pipe_delimited_files_are_supported() {
        let file = write_file("user|utc_datetime|inside\nu1|2021-03-01 08:00:00|21.0\n");
        let source = ReadingCsvFileSource::new(file.path(), ReadingColumns::with_value("inside"))
            .with_delimiter(b'|');

        let readings = read_all(source).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value, 21.0);
    }

    #[tokio::test]
    async fn missing_value_column_fails() {
        let file = write_file("user,utc_datetime,inside\nu1,2021-03-01 08:00:00,21.0\n");
        let err = read_all(ReadingCsvFileSource::new(file.path(), ReadingColumns::with_value("electricity")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("electricity"));
    }

    #[tokio::test]
    async fn malformed_timestamp_fails_the_stream() {
        let file = write_file("user,utc_datetime,inside\nu1,not-a-date,21.0\n");
        let err = read_all(ReadingCsvFileSource::new(file.path(), ReadingColumns::with_value("inside")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
    }

    #[tokio::test]
    async fn non_numeric_value_fails_the_stream() {
        let file = write_file("user,utc_datetime,inside\nu1,2021-03-01 08:00:00,\n");
        let err = read_all(ReadingCsvFileSource::new(file.path(), ReadingColumns::with_value("inside")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(msg) if msg.contains("line 2")));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let source = ReadingCsvFileSource::new("/nonexistent/readings.csv", ReadingColumns::with_value("inside"));
        assert!(matches!(read_all(source).await, Err(PipelineError::Source(_))));
    }
}
