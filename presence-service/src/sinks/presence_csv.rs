use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use presence_client::domain::PresenceEstimate;
use serde::{Deserialize, Serialize};

use crate::model::PresenceTable;
use crate::pipeline::{PipelineError, PresenceSink};

/// On-disk row layout: `user,hour,prob_presence`.
#[derive(Debug, Serialize, Deserialize)]
struct PresenceRecord {
    user: String,
    hour: u8,
    prob_presence: f64,
}

impl From<&PresenceEstimate> for PresenceRecord {
    fn from(e: &PresenceEstimate) -> Self {
        Self {
            user: e.household_id.clone(),
            hour: e.hour,
            prob_presence: e.prob_presence,
        }
    }
}

impl From<PresenceRecord> for PresenceEstimate {
    fn from(r: PresenceRecord) -> Self {
        PresenceEstimate {
            household_id: r.user,
            hour: r.hour,
            prob_presence: r.prob_presence,
        }
    }
}

/// Writes the presence table as CSV.
///
/// The table goes to `<path>.tmp` first and is renamed over `path` only once
/// fully written, so a failed run leaves the previous artifact in place.
pub struct PresenceCsvSink {
    path: PathBuf,
}

impl PresenceCsvSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_blocking(&self, table: &PresenceTable) -> Result<(), PipelineError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| PipelineError::Sink(format!("failed to create {}: {e}", dir.display())))?;
        }

        let tmp = self.tmp_path();
        let result = write_rows(&tmp, table).and_then(|()| {
            fs::rename(&tmp, &self.path).map_err(|e| {
                PipelineError::Sink(format!("failed to replace {}: {e}", self.path.display()))
            })
        });

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

fn write_rows(path: &Path, table: &PresenceTable) -> Result<(), PipelineError> {
    let sink_err = |e: csv::Error| PipelineError::Sink(format!("failed to write {}: {e}", path.display()));

    let mut wtr = csv::Writer::from_path(path).map_err(sink_err)?;
    for row in table.rows() {
        wtr.serialize(PresenceRecord::from(row)).map_err(sink_err)?;
    }
    wtr.flush()
        .map_err(|e| PipelineError::Sink(format!("failed to flush {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait::async_trait]
impl PresenceSink for PresenceCsvSink {
    async fn write(&self, table: &PresenceTable) -> Result<(), PipelineError> {
        // Small table (households x 24 rows); written synchronously.
        self.write_blocking(table)?;
        metrics::counter!("presence_table_rows_written_total").increment(table.len() as u64);
        tracing::info!(path = %self.path.display(), rows = table.len(), "presence table written");
        Ok(())
    }
}

/// Load a table previously written by [`PresenceCsvSink`].
pub fn load_presence_table(path: &Path) -> Result<PresenceTable, PipelineError> {
    let mut rdr = csv::Reader::from_path(path)
        .map_err(|e| PipelineError::Source(format!("failed to open {}: {e}", path.display())))?;

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for record in rdr.deserialize::<PresenceRecord>() {
        let record = record
            .map_err(|e| PipelineError::Source(format!("invalid row in {}: {e}", path.display())))?;
        if record.hour > 23 || !(0.0..=1.0).contains(&record.prob_presence) {
            return Err(PipelineError::Source(format!(
                "row out of range in {}: user={} hour={} prob_presence={}",
                path.display(),
                record.user,
                record.hour,
                record.prob_presence
            )));
        }
        if !seen.insert((record.user.clone(), record.hour)) {
            return Err(PipelineError::Source(format!(
                "duplicate row in {}: user={} hour={}",
                path.display(),
                record.user,
                record.hour
            )));
        }
        rows.push(PresenceEstimate::from(record));
    }

    Ok(PresenceTable::from_rows(rows))
}
