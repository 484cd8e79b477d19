use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_PARTITION_ID: &str = "FLOWCORE_PARTITION_ID";
pub const ENV_LOG: &str = "FLOWCORE_LOG";
pub const ENV_TERMINATE_BATCH_SIZE: &str = "FLOWCORE_TERMINATE_BATCH_SIZE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub partition_id: u16,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,
    pub message: MessageConfig,
    pub subscription: SubscriptionConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    pub ttl_check_interval_ms: u64,
    /// Upper bound of messages expired per sweep.
    pub expire_batch_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// A pending subscription command is re-sent once its sent time is older.
    pub pending_retry_timeout_ms: i64,
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Children terminated per batch command.
    pub terminate_batch_size: usize,
    /// Commands processed per step of the run loop before yielding.
    pub max_commands_per_step: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partition_id: 1,
            log_filter: "info".to_string(),
            message: MessageConfig::default(),
            subscription: SubscriptionConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            ttl_check_interval_ms: 60_000,
            expire_batch_limit: 100,
        }
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            pending_retry_timeout_ms: 10_000,
            sweep_interval_ms: 5_000,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            terminate_batch_size: 100,
            max_commands_per_step: 1_000,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with process environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `FLOWCORE_*` overrides looked up through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_PARTITION_ID) {
            self.partition_id = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    name: ENV_PARTITION_ID,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log_filter = value;
        }
        if let Some(value) = lookup(ENV_TERMINATE_BATCH_SIZE) {
            self.processing.terminate_batch_size =
                value.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidValue {
                        name: ENV_TERMINATE_BATCH_SIZE,
                        value: value.clone(),
                        reason: e.to_string(),
                    }
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.terminate_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "processing.terminate_batch_size",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.processing.max_commands_per_step == 0 {
            return Err(ConfigError::InvalidValue {
                name: "processing.max_commands_per_step",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.subscription.pending_retry_timeout_ms < 0 {
            return Err(ConfigError::InvalidValue {
                name: "subscription.pending_retry_timeout_ms",
                value: self.subscription.pending_retry_timeout_ms.to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = EngineConfig::load_from_str(
            r#"
partition_id: 3
processing:
  terminate_batch_size: 7
"#,
        )
        .unwrap();
        assert_eq!(config.partition_id, 3);
        assert_eq!(config.processing.terminate_batch_size, 7);
        assert_eq!(config.processing.max_commands_per_step, 1_000);
        assert_eq!(config.message, MessageConfig::default());
    }

    #[test]
    fn overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            (ENV_PARTITION_ID, "9"),
            (ENV_LOG, "flowcore_core=debug"),
            (ENV_TERMINATE_BATCH_SIZE, "2"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.partition_id, 9);
        assert_eq!(config.log_filter, "flowcore_core=debug");
        assert_eq!(config.processing.terminate_batch_size, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::default()
            .with_overrides(|name| (name == ENV_PARTITION_ID).then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: ENV_PARTITION_ID, .. }));

        let err = EngineConfig::load_from_str("processing:\n  terminate_batch_size: 0\n").unwrap_err();
        assert!(err.to_string().contains("terminate_batch_size"));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = EngineConfig::load_from_str("partition_id: [").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
