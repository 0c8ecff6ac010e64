//! Configuration types for staged-articles

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline behavior configuration (batching, concurrency, leases, retries)
///
/// Groups settings that shape how dispatch cycles claim and process articles.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of articles claimed per dispatch cycle (default: 32)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of articles processed concurrently within a cycle (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Lease duration in seconds (default: 300)
    ///
    /// An article in `Processing` whose lease is older than this is treated
    /// as abandoned and becomes reclaimable by another worker.
    #[serde(default = "default_lease_duration_secs")]
    pub lease_duration_secs: i64,

    /// Maximum processing attempts before a transient failure is promoted
    /// to a permanent `Failed` state (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            lease_duration_secs: default_lease_duration_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Data storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file (default: "./staged_articles.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Background cycle runner configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Interval between dispatch cycles in seconds (default: 30)
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
        }
    }
}

/// Main configuration for the article pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`pipeline`](PipelineConfig) — batching, concurrency, leases, retries
/// - [`persistence`](PersistenceConfig) — database path
/// - [`runner`](RunnerConfig) — background cycle scheduling
///
/// Sub-config fields are flattened for serialization, so the JSON/TOML
/// format stays unnested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pipeline behavior settings
    #[serde(flatten)]
    pub pipeline: PipelineConfig,

    /// Data storage settings
    #[serde(flatten)]
    pub persistence: PersistenceConfig,

    /// Background cycle runner settings
    #[serde(flatten)]
    pub runner: RunnerConfig,
}

impl Config {
    /// Lease duration as a chrono duration for timestamp arithmetic
    pub fn lease_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pipeline.lease_duration_secs)
    }

    /// Interval between background dispatch cycles
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.runner.cycle_interval_secs)
    }

    /// Validate the configuration, returning the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(Error::Config {
                message: "batch_size must be at least 1".into(),
                key: Some("batch_size".into()),
            });
        }
        if self.pipeline.concurrency == 0 {
            return Err(Error::Config {
                message: "concurrency must be at least 1".into(),
                key: Some("concurrency".into()),
            });
        }
        if self.pipeline.lease_duration_secs <= 0 {
            return Err(Error::Config {
                message: "lease_duration_secs must be positive".into(),
                key: Some("lease_duration_secs".into()),
            });
        }
        if self.pipeline.max_attempts < 1 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".into(),
                key: Some("max_attempts".into()),
            });
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_concurrency() -> usize {
    4
}

fn default_lease_duration_secs() -> i64 {
    300
}

fn default_max_attempts() -> i64 {
    3
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./staged_articles.db")
}

fn default_cycle_interval_secs() -> u64 {
    30
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.batch_size, 32);
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.pipeline.lease_duration_secs, 300);
        assert_eq!(config.pipeline.max_attempts, 3);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = Config {
            pipeline: PipelineConfig {
                batch_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("batch_size")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = Config {
            pipeline: PipelineConfig {
                concurrency: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_lease_is_rejected() {
        let config = Config {
            pipeline: PipelineConfig {
                lease_duration_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_from_flat_json() {
        let json = r#"{
            "batch_size": 10,
            "concurrency": 3,
            "lease_duration_secs": 60,
            "max_attempts": 5,
            "database_path": "/tmp/articles.db",
            "cycle_interval_secs": 15
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.pipeline.concurrency, 3);
        assert_eq!(config.pipeline.max_attempts, 5);
        assert_eq!(
            config.persistence.database_path,
            PathBuf::from("/tmp/articles.db")
        );
        assert_eq!(config.runner.cycle_interval_secs, 15);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.pipeline.batch_size, 32);
        assert_eq!(config.runner.cycle_interval_secs, 30);
    }
}
