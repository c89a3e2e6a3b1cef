// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # StreamNet Configuration System
//!
//! Type-safe configuration for streaming inference:
//! - TOML file parsing (`streamnet_configuration.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//! - Validation that reports every problem at once
//!
//! ## Usage
//!
//! ```rust,no_run
//! use streamnet_config::{load_config, validate_config};
//!
//! let config = load_config(None, None).expect("Failed to load config");
//! validate_config(&config).expect("Invalid config");
//! println!("Decay factor: {}", config.aggregator.decay_factor);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{
    apply_cli_overrides, apply_environment_overrides, find_config_file, load_config,
    CONFIG_FILE_NAME, CONFIG_PATH_ENV,
};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Everything that can go wrong between locating the TOML file and handing
/// a validated [`StreamnetConfig`] to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not located: {0}")]
    FileNotFound(String),

    #[error("Cannot read configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed streamnet configuration: {0}")]
    ParseError(String),

    #[error("Configuration rejected: {0}")]
    ValidationError(String),

    #[error("Bad override value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
