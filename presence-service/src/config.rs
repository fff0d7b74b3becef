use serde::Deserialize;
use std::{fs, path::PathBuf};
use time::OffsetDateTime;

use crate::model::{parse_timestamp, AggregationStrategy, Thresholds};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Csv,
    Questdb,
}

fn default_power_column() -> String {
    "electricity".to_string()
}

fn default_temperature_column() -> String {
    "inside".to_string()
}

fn default_household_column() -> String {
    "user".to_string()
}

fn default_timestamp_column() -> String {
    "utc_datetime".to_string()
}

fn default_delimiter() -> char {
    ','
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub kind: InputKind,
    pub power_path: Option<PathBuf>,
    pub temperature_path: Option<PathBuf>,
    #[serde(default = "default_household_column")]
    pub household_column: String,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_power_column")]
    pub power_column: String,
    #[serde(default = "default_temperature_column")]
    pub temperature_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub aggregation: AggregationStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestDbConfig {
    pub uri: String,
    pub max_connections: u32,
    pub power_table: String,
    pub temperature_table: String,
    /// Inclusive lower bound on reading timestamps.
    pub start: Option<String>,
    /// Exclusive upper bound.
    pub end: Option<String>,
}

impl QuestDbConfig {
    /// The `[start, end)` window to load, parsed like input timestamps.
    pub fn window(&self) -> anyhow::Result<(Option<OffsetDateTime>, Option<OffsetDateTime>)> {
        let start = self.start.as_deref().map(parse_timestamp).transpose()?;
        let end = self.end.as_deref().map(parse_timestamp).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                anyhow::bail!("questdb.start must be before questdb.end");
            }
        }
        Ok((start, end))
    }
}

fn default_presence_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
    pub bind_addr: String,
    #[serde(default = "default_presence_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub thresholds: Thresholds,
    #[serde(default)]
    pub model: ModelConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub questdb: Option<QuestDbConfig>,
    pub serve: Option<ServeConfig>,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("PRESENCE_CONFIG").unwrap_or_else(|_| "presence-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.thresholds.validate()?;

        if !self.input.delimiter.is_ascii() {
            anyhow::bail!("input.delimiter must be a single ASCII character");
        }
        if self.input.kind == InputKind::Questdb && self.questdb.is_none() {
            anyhow::bail!("input.kind = \"questdb\" requires a [questdb] section");
        }
        if let Some(qdb) = &self.questdb {
            qdb.window()?;
        }
        if let Some(serve) = &self.serve {
            if !(0.0..=1.0).contains(&serve.threshold) {
                anyhow::bail!("serve.threshold must be within [0, 1], got {}", serve.threshold);
            }
        }
        Ok(())
    }
}
