//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::logger::{LoggerConfig, QueueBackend};
use crate::queue::FullPolicy;

/// Environment variable naming the TOML file to load
pub const CONFIG_PATH_ENV: &str = "EPOCHLOG_CONFIG";

/// Prefix of `EPOCHLOG__section__field` overrides
pub const ENV_PREFIX: &str = "EPOCHLOG__";

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    /// Missing required configuration field.
    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpochlogConfig {
    /// Writer configuration.
    pub writer: Option<WriterConfigSpec>,
    /// Queue backend configuration.
    pub queue: Option<QueueConfigSpec>,
    /// Epoch reclamation configuration.
    pub epoch: Option<EpochConfigSpec>,
}

impl EpochlogConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from the `EPOCHLOG_CONFIG` env var (if set),
    /// then apply `EPOCHLOG__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_ENV).ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }
            let path = key[ENV_PREFIX.len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["writer", "root_dir"] => {
                    self.writer_mut().root_dir = Some(PathBuf::from(value));
                }
                ["writer", "batch_threshold"] => {
                    self.writer_mut().batch_threshold = Some(parse_value(&key, &value)?);
                }
                ["writer", "batch_capacity"] => {
                    self.writer_mut().batch_capacity = Some(parse_value(&key, &value)?);
                }
                ["writer", "flush_interval_ms"] => {
                    self.writer_mut().flush_interval_ms = Some(parse_value(&key, &value)?);
                }
                ["writer", "max_file_bytes"] => {
                    self.writer_mut().max_file_bytes = Some(parse_value(&key, &value)?);
                }
                ["writer", "sync_on_flush"] => {
                    self.writer_mut().sync_on_flush = Some(parse_value(&key, &value)?);
                }
                ["queue", "kind"] => {
                    self.queue_mut().kind = Some(value);
                }
                ["queue", "capacity"] => {
                    self.queue_mut().capacity = Some(parse_value(&key, &value)?);
                }
                ["queue", "full_policy"] => {
                    self.queue_mut().full_policy = Some(value);
                }
                ["queue", "block_timeout_ms"] => {
                    self.queue_mut().block_timeout_ms = Some(parse_value(&key, &value)?);
                }
                ["epoch", "retire_threshold"] => {
                    self.epoch_mut().retire_threshold = Some(parse_value(&key, &value)?);
                }
                ["epoch", "reclaim_interval_ms"] => {
                    self.epoch_mut().reclaim_interval_ms = Some(parse_value(&key, &value)?);
                }
                ["epoch", "background_reclaim"] => {
                    self.epoch_mut().background_reclaim = Some(parse_value(&key, &value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build a `LoggerConfig` using defaults plus overrides.
    pub fn to_logger_config(&self) -> Result<LoggerConfig, ConfigError> {
        let mut config = LoggerConfig::default();
        if let Some(writer) = &self.writer {
            writer.apply_to(&mut config);
        }
        if let Some(queue) = &self.queue {
            config.queue = queue.resolve()?;
        }
        if let Some(epoch) = &self.epoch {
            epoch.apply_to(&mut config);
        }
        Ok(config)
    }

    fn writer_mut(&mut self) -> &mut WriterConfigSpec {
        self.writer.get_or_insert_with(Default::default)
    }

    fn queue_mut(&mut self) -> &mut QueueConfigSpec {
        self.queue.get_or_insert_with(Default::default)
    }

    fn epoch_mut(&mut self) -> &mut EpochConfigSpec {
        self.epoch.get_or_insert_with(Default::default)
    }
}

/// Writer configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriterConfigSpec {
    /// Root directory for day directories.
    pub root_dir: Option<PathBuf>,
    /// Pending records that wake the writer.
    pub batch_threshold: Option<usize>,
    /// Most records per batch.
    pub batch_capacity: Option<usize>,
    /// Writer wake-up timeout in milliseconds.
    pub flush_interval_ms: Option<u64>,
    /// Rotation size in bytes.
    pub max_file_bytes: Option<u64>,
    /// Sync after every batch.
    pub sync_on_flush: Option<bool>,
}

impl WriterConfigSpec {
    fn apply_to(&self, config: &mut LoggerConfig) {
        if let Some(value) = &self.root_dir {
            config.root_dir = value.clone();
        }
        if let Some(value) = self.batch_threshold {
            config.batch_threshold = value.max(1);
        }
        if let Some(value) = self.batch_capacity {
            config.batch_capacity = value.max(1);
        }
        if let Some(value) = self.flush_interval_ms {
            config.flush_interval = Duration::from_millis(value.max(1));
        }
        if let Some(value) = self.max_file_bytes {
            config.max_file_bytes = value.max(1);
        }
        if let Some(value) = self.sync_on_flush {
            config.sync_on_flush = value;
        }
    }
}

/// Queue backend configuration from TOML/env.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfigSpec {
    /// Backend kind: "linked" or "ring".
    pub kind: Option<String>,
    /// Ring capacity.
    pub capacity: Option<usize>,
    /// Ring full policy: "reject" or "block".
    pub full_policy: Option<String>,
    /// Longest a blocking push waits, in milliseconds.
    pub block_timeout_ms: Option<u64>,
}

impl QueueConfigSpec {
    fn resolve(&self) -> Result<QueueBackend, ConfigError> {
        let kind = self.kind.as_deref().map(|v| v.to_ascii_lowercase());

        match kind.as_deref() {
            None | Some("linked") => Ok(QueueBackend::Linked),
            Some("ring") => {
                let capacity = self
                    .capacity
                    .ok_or_else(|| ConfigError::MissingField("queue.capacity".into()))?;
                if capacity == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "queue.capacity".into(),
                        value: "0".into(),
                    });
                }
                Ok(QueueBackend::Ring {
                    capacity,
                    policy: self.resolve_policy()?,
                })
            }
            Some(other) => Err(ConfigError::InvalidValue {
                key: "queue.kind".into(),
                value: other.into(),
            }),
        }
    }

    fn resolve_policy(&self) -> Result<FullPolicy, ConfigError> {
        let policy = self.full_policy.as_deref().map(|v| v.to_ascii_lowercase());

        match policy.as_deref() {
            None | Some("reject") => Ok(FullPolicy::Reject),
            Some("block") => {
                let timeout_ms = self
                    .block_timeout_ms
                    .ok_or_else(|| ConfigError::MissingField("queue.block_timeout_ms".into()))?;
                Ok(FullPolicy::Block {
                    timeout: Duration::from_millis(timeout_ms),
                })
            }
            Some(other) => Err(ConfigError::InvalidValue {
                key: "queue.full_policy".into(),
                value: other.into(),
            }),
        }
    }
}

/// Epoch reclamation overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpochConfigSpec {
    /// Retired nodes per thread before a sweep.
    pub retire_threshold: Option<usize>,
    /// Background reclaimer period in milliseconds.
    pub reclaim_interval_ms: Option<u64>,
    /// Whether to run the background reclaimer.
    pub background_reclaim: Option<bool>,
}

impl EpochConfigSpec {
    fn apply_to(&self, config: &mut LoggerConfig) {
        if let Some(value) = self.retire_threshold {
            config.retire_threshold = value.max(1);
        }
        if let Some(value) = self.reclaim_interval_ms {
            config.reclaim_interval = Duration::from_millis(value.max(1));
        }
        if let Some(value) = self.background_reclaim {
            config.background_reclaim = value;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
