// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # streamnet-observability
//!
//! Logging setup shared by every StreamNet binary and test harness, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files in a timestamped run directory

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Known StreamNet crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "streamnet",
    "streamnet-core",
    "streamnet-config",
    "streamnet-observability",
];

/// Environment variable listing crates to debug (comma-separated, or `all`)
pub const DEBUG_ENV: &str = "STREAMNET_DEBUG";
