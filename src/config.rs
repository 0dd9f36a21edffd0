//! Process configuration, read from `FLEETBOOK_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the journal file.
    pub data_dir: PathBuf,
    /// Optional JSON fleet file installed at startup.
    pub fleet_file: Option<PathBuf>,
    /// Prometheus exporter port. Disabled when unset.
    pub metrics_port: Option<u16>,
    /// Journal appends that trigger a compaction.
    pub compact_threshold: u64,
    /// How often the compactor checks the threshold.
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fleet_file: None,
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys fall back to defaults;
    /// set but unparsable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Config {
            data_dir: lookup("FLEETBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            fleet_file: lookup("FLEETBOOK_FLEET_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            metrics_port: parse_opt(&lookup, "FLEETBOOK_METRICS_PORT")?,
            compact_threshold: parse_opt(&lookup, "FLEETBOOK_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parse_opt::<u64>(&lookup, "FLEETBOOK_COMPACT_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
        };

        if config.compact_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "FLEETBOOK_COMPACT_INTERVAL_SECS".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("fleetbook.wal")
    }
}

fn parse_opt<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(String),
}
