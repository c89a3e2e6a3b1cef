// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones winning:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, StreamnetConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for when no path is given
pub const CONFIG_FILE_NAME: &str = "streamnet_configuration.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "STREAMNET_CONFIG_PATH";

/// Find the configuration file
///
/// Search order:
/// 1. `STREAMNET_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "{} points at {}, which does not exist",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        for ancestor in cwd.ancestors().skip(1).take(5) {
            search_paths.push(ancestor.join(CONFIG_FILE_NAME));
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let searched: Vec<String> = search_paths.iter().map(|p| p.display().to_string()).collect();
    Err(ConfigError::FileNotFound(format!(
        "searched [{}]; set {} to point elsewhere",
        searched.join(", "),
        CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is missing, unreadable or contains invalid TOML.
/// Values are not range-checked here; call [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<StreamnetConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: StreamnetConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

fn parse_value<T: std::str::FromStr>(source: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}' cannot be parsed", source, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `STREAMNET_DECAY_FACTOR` -> `aggregator.decay_factor`
/// - `STREAMNET_APPLY_SOFTMAX` -> `aggregator.apply_softmax`
/// - `STREAMNET_MODEL_PATH` -> `runtime.model_path`
/// - `STREAMNET_MAX_PARALLEL_SEQUENCES` -> `runtime.max_parallel_sequences`
/// - `STREAMNET_LOG_LEVEL` -> `logging.level`
/// - `STREAMNET_LOG_DIR` -> `logging.log_dir`
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` when a numeric variable does not parse.
pub fn apply_environment_overrides(config: &mut StreamnetConfig) -> ConfigResult<()> {
    if let Ok(value) = env::var("STREAMNET_DECAY_FACTOR") {
        config.aggregator.decay_factor = parse_value("STREAMNET_DECAY_FACTOR", &value)?;
    }
    if let Ok(value) = env::var("STREAMNET_APPLY_SOFTMAX") {
        config.aggregator.apply_softmax = parse_flag(&value);
    }
    if let Ok(value) = env::var("STREAMNET_MODEL_PATH") {
        config.runtime.model_path = Some(PathBuf::from(value));
    }
    if let Ok(value) = env::var("STREAMNET_MAX_PARALLEL_SEQUENCES") {
        config.runtime.max_parallel_sequences =
            parse_value("STREAMNET_MAX_PARALLEL_SEQUENCES", &value)?;
    }
    if let Ok(value) = env::var("STREAMNET_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("STREAMNET_LOG_DIR") {
        config.logging.log_dir = PathBuf::from(value);
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - CLI arguments keyed by setting, e.g. `{"decay_factor": "0.9", "log_level": "debug"}`
pub fn apply_cli_overrides(
    config: &mut StreamnetConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("decay_factor") {
        config.aggregator.decay_factor = parse_value("decay_factor", value)?;
    }
    if let Some(value) = cli_args.get("apply_softmax") {
        config.aggregator.apply_softmax = parse_flag(value);
    }
    if let Some(value) = cli_args.get("model_path") {
        config.runtime.model_path = Some(PathBuf::from(value));
    }
    if let Some(value) = cli_args.get("max_parallel_sequences") {
        config.runtime.max_parallel_sequences = parse_value("max_parallel_sequences", value)?;
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("file_logging") {
        config.logging.file_logging = parse_flag(value);
    }
    Ok(())
}
