// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every check runs and all failures are reported together.

use crate::{ConfigError, ConfigResult, StreamnetConfig};

/// Level names accepted by `logging.level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    OutOfRange {
        field: String,
        value: String,
        range: String,
    },
    MissingRequired {
        field: String,
    },
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, value, range } => {
                write!(f, "{} = {} is outside valid range {}", field, value, range)
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every failed check
pub fn validate_config(config: &StreamnetConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }
    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// All problems found in `config`, in a stable order
pub fn collect_errors(config: &StreamnetConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_aggregator(config, &mut errors);
    validate_runtime(config, &mut errors);
    validate_logging(config, &mut errors);
    errors
}

fn validate_aggregator(config: &StreamnetConfig, errors: &mut Vec<ConfigValidationError>) {
    let decay = config.aggregator.decay_factor;
    if decay.is_nan() || !(0.0..1.0).contains(&decay) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "aggregator.decay_factor".to_string(),
            value: decay.to_string(),
            range: "[0.0, 1.0)".to_string(),
        });
    }
}

fn validate_runtime(config: &StreamnetConfig, errors: &mut Vec<ConfigValidationError>) {
    if let Some(path) = &config.runtime.model_path {
        if path.as_os_str().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: "runtime.model_path".to_string(),
            });
        }
    }
}

fn validate_logging(config: &StreamnetConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("'{}' is not one of {}", config.logging.level, LOG_LEVELS.join(", ")),
        });
    }
    if config.logging.file_logging {
        if config.logging.log_dir.as_os_str().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: "logging.log_dir".to_string(),
            });
        }
        if config.logging.retention_runs == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: "logging.retention_runs".to_string(),
                reason: "must keep at least the current run".to_string(),
            });
        }
    }
}
