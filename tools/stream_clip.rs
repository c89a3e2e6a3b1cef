// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stream a recorded clip through a converted model, one frame at a time.
//!
//! The clip is an `ndarray` JSON document of shape `(frames, height, width,
//! channels)`. Each frame's estimate is printed as one JSON line, followed by
//! the end-of-video prediction.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Array4, Axis};
use tracing::{info, warn};

use streamnet::config::{load_config, ConfigError, StreamnetConfig};
use streamnet::observability::{init_logging, parse_debug_flags, LogFormat};
use streamnet::{logging_settings, Pipeline};

/// Frame-by-frame classification of a recorded clip
#[derive(Parser, Debug)]
#[command(name = "stream_clip", version, long_about = None)]
struct Args {
    /// Clip to stream (ndarray JSON, shape frames x height x width x channels)
    #[arg(short, long)]
    clip: PathBuf,

    /// Model graph JSON (overrides runtime.model_path)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Configuration file (default: search for streamnet_configuration.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Belief decay factor in [0, 1)
    #[arg(long)]
    decay: Option<f32>,

    /// Crates to log at debug level (comma-separated, or "all")
    #[arg(long, value_name = "CRATES")]
    debug: Option<String>,

    /// Log as JSON instead of text
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn load_configuration(args: &Args) -> Result<StreamnetConfig> {
    let mut overrides = HashMap::new();
    if let Some(model) = &args.model {
        overrides.insert("model_path".to_string(), model.display().to_string());
    }
    if let Some(decay) = args.decay {
        overrides.insert("decay_factor".to_string(), decay.to_string());
    }

    match load_config(args.config.as_deref(), Some(&overrides)) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) if args.config.is_none() => {
            let mut config = StreamnetConfig::default();
            streamnet::config::apply_environment_overrides(&mut config)?;
            streamnet::config::apply_cli_overrides(&mut config, &overrides)?;
            Ok(config)
        }
        Err(e) => Err(e).context("Failed to load configuration"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_configuration(&args)?;

    let mut debug_flags = parse_debug_flags();
    if let Some(crates) = &args.debug {
        debug_flags.merge_env_value(crates);
    }
    let format = if args.json_logs { LogFormat::Json } else { LogFormat::Text };
    let _log_guard = init_logging(&debug_flags, &logging_settings(&config.logging, format))?;

    let mut pipeline = Pipeline::from_config(&config)?;

    let clip_json = fs::read_to_string(&args.clip)
        .with_context(|| format!("Failed to read clip: {}", args.clip.display()))?;
    let clip: Array4<f32> = serde_json::from_str(&clip_json)
        .with_context(|| format!("Clip is not a 4D ndarray document: {}", args.clip.display()))?;
    info!(frames = clip.len_of(Axis(0)), clip = %args.clip.display(), "streaming clip");

    let session = pipeline.session_mut();
    for frame in clip.axis_iter(Axis(0)) {
        let estimate = session.push_frame(frame)?;
        println!("{}", serde_json::to_string(&estimate)?);
    }

    match session.finish() {
        Some(prediction) => println!("{}", serde_json::to_string(&prediction)?),
        None => warn!("clip contained no frames"),
    }
    Ok(())
}
