// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `[logging]` section of the TOML file → subscriber settings

use streamnet_config::LoggingConfig as LoggingSection;
use streamnet_observability::{LogFormat, LoggingConfig};

/// Build subscriber settings from the configuration file's logging section.
///
/// The console format is not part of the file; callers pick it (the CLI
/// exposes `--json-logs`).
pub fn logging_settings(section: &LoggingSection, format: LogFormat) -> LoggingConfig {
    let LoggingSection {
        level,
        file_logging,
        log_dir,
        retention_runs,
    } = section;
    LoggingConfig {
        level: level.clone(),
        format,
        file_logging: *file_logging,
        log_dir: log_dir.clone(),
        retention_runs: *retention_runs,
    }
}
