// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output always; with the `file-logging` feature, also JSON logs in
//! a timestamped run folder:
//!
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       └── streamnet.log
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Keeps background log writers alive; drop it last to flush file output.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    fn console_only() -> Self {
        Self {
            #[cfg(feature = "file-logging")]
            _file_guards: Vec::new(),
            log_dir: None,
        }
    }

    /// Run folder receiving file logs, if file logging is on
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// `EnvFilter` for the configured base level plus per-crate debug flags.
pub fn build_filter(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = debug_flags.to_filter_string(&config.level);
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter directives: {}", directives))
}

/// Install the global subscriber.
///
/// # Errors
/// Fails if a global subscriber is already installed, the filter does not
/// parse, or file logging is requested but cannot be set up.
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let console: BoxedLayer = match config.format {
        LogFormat::Text => fmt::layer()
            .with_target(false)
            .with_filter(build_filter(debug_flags, config)?)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_filter(build_filter(debug_flags, config)?)
            .boxed(),
    };
    let mut layers = vec![console];

    let guard = if config.file_logging {
        attach_file_output(&mut layers, debug_flags, config)?
    } else {
        LoggingGuard::console_only()
    };

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    if let Some(dir) = guard.log_dir() {
        tracing::info!(log_dir = %dir.display(), "file logging enabled");
    }
    Ok(guard)
}

/// Initialize logging with default settings
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingConfig::default())
}

#[cfg(feature = "file-logging")]
fn attach_file_output(
    layers: &mut Vec<BoxedLayer>,
    debug_flags: &CrateDebugFlags,
    config: &LoggingConfig,
) -> Result<LoggingGuard> {
    let run_folder = config.log_dir.join(run_dir_name(Utc::now()));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;
    cleanup_old_runs(&config.log_dir, config.retention_runs)?;

    let appender = tracing_appender::rolling::never(&run_folder, "streamnet.log");
    let (writer, file_guard) = tracing_appender::non_blocking(appender);
    layers.push(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(build_filter(debug_flags, config)?)
            .boxed(),
    );

    Ok(LoggingGuard {
        _file_guards: vec![file_guard],
        log_dir: Some(run_folder),
    })
}

#[cfg(not(feature = "file-logging"))]
fn attach_file_output(
    _layers: &mut Vec<BoxedLayer>,
    _debug_flags: &CrateDebugFlags,
    _config: &LoggingConfig,
) -> Result<LoggingGuard> {
    anyhow::bail!("file logging requested but the `file-logging` feature is not enabled")
}

/// Folder name for a run started at `started`
pub fn run_dir_name(started: DateTime<Utc>) -> String {
    format!("{}{}", RUN_PREFIX, started.format(RUN_TIMESTAMP_FORMAT))
}

/// Delete all but the `keep` most recent `run_*` folders under `base_log_dir`.
/// Other entries are left alone. Returns the number of folders removed.
pub fn cleanup_old_runs(base_log_dir: &Path, keep: usize) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let mut runs: Vec<(PathBuf, NaiveDateTime)> = Vec::new();
    let entries = std::fs::read_dir(base_log_dir)
        .with_context(|| format!("Failed to list log directory: {}", base_log_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let started = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RUN_PREFIX))
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, RUN_TIMESTAMP_FORMAT).ok());
        if let Some(started) = started {
            runs.push((path, started));
        }
    }

    // Oldest first
    runs.sort_by_key(|(_, started)| *started);
    let excess = runs.len().saturating_sub(keep);
    for (path, _) in runs.iter().take(excess) {
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove old log directory: {}", path.display()))?;
    }
    Ok(excess)
}
