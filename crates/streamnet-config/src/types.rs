// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to a section of `streamnet_configuration.toml`. Every
//! field has a default, so a partial (or empty) file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamnetConfig {
    pub aggregator: AggregatorConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Running-belief settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Weight of the previous belief, in `[0, 1)`
    pub decay_factor: f32,
    /// Apply softmax to model outputs; disable for models ending in a softmax
    pub apply_softmax: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.8,
            apply_softmax: true,
        }
    }
}

/// Model loading and sequence scheduling
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// JSON graph to load at startup
    pub model_path: Option<PathBuf>,
    /// Sequences streamed concurrently (0 = one per available core)
    pub max_parallel_sequences: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,
    pub file_logging: bool,
    pub log_dir: PathBuf,
    /// Run directories kept when file logging is enabled
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: PathBuf::from("./logs"),
            retention_runs: 10,
        }
    }
}
