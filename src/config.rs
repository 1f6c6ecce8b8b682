// src/config.rs

//! Controller configuration
//!
//! Read from a TOML file; every key is optional.
//!
//! ```toml
//! queue_capacity = 16
//! step_budget = 100000
//! include_entities = true
//! package_uniqueness = true
//! gvk_uniqueness = true
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 100
//! max_delay_ms = 5000
//! jitter = 0.1
//! ```

use crate::builder::BuilderOptions;
use crate::controller::RetryPolicy;
use crate::solver::{SolverOptions, DEFAULT_STEP_BUDGET};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Default bound on pending notifications per Resolution
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pending notifications buffered per Resolution before coalescing
    pub queue_capacity: usize,

    /// Search decisions allowed per pass, 0 for unlimited
    pub step_budget: u64,

    pub include_entities: bool,
    pub package_uniqueness: bool,
    pub gvk_uniqueness: bool,

    /// Backoff for conflicting or failed status writes
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            step_budget: DEFAULT_STEP_BUDGET,
            include_entities: true,
            package_uniqueness: true,
            gvk_uniqueness: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::InvalidValue {
                key: "retry.max_delay_ms",
                reason: format!(
                    "{} is below base_delay_ms {}",
                    self.retry.max_delay_ms, self.retry.base_delay_ms
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::InvalidValue {
                key: "retry.jitter",
                reason: format!("{} is outside 0.0..=1.0", self.retry.jitter),
            });
        }
        Ok(())
    }

    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            include_entities: self.include_entities,
            package_uniqueness: self.package_uniqueness,
            gvk_uniqueness: self.gvk_uniqueness,
        }
    }

    pub fn solver_options(&self, cancel: Option<Arc<AtomicBool>>) -> SolverOptions {
        SolverOptions {
            step_budget: self.step_budget,
            cancel,
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Parse controller configuration from a TOML file
pub fn parse_config_file(path: &Path) -> Result<ControllerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_string(&content)
}

/// Parse controller configuration from a TOML string
pub fn parse_config_string(content: &str) -> Result<ControllerConfig, ConfigError> {
    let config: ControllerConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config_string("").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.step_budget, 100_000);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_parse_config_string() {
        let toml = r#"
queue_capacity = 4
step_budget = 0
gvk_uniqueness = false

[retry]
max_attempts = 2
jitter = 0.0
"#;
        let config = parse_config_string(toml).unwrap();
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.step_budget, 0);
        assert!(!config.gvk_uniqueness);
        assert!(config.package_uniqueness);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 100);

        let options = config.builder_options();
        assert!(!options.gvk_uniqueness);
        assert_eq!(config.solver_options(None).step_budget, 0);
    }

    #[test]
    fn test_invalid_values() {
        let err = parse_config_string("queue_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "queue_capacity", .. }));

        let err = parse_config_string("[retry]\njitter = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "retry.jitter", .. }));

        let err = parse_config_string("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "retry.max_attempts", .. }));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config_string("queue_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_parse_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deppy.toml");
        std::fs::write(&path, "step_budget = 50\n").unwrap();
        assert_eq!(parse_config_file(&path).unwrap().step_budget, 50);
        assert!(matches!(
            parse_config_file(&dir.path().join("missing.toml")),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = ControllerConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(parse_config_string(&rendered).unwrap(), config);
    }
}
