// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # StreamNet - streaming inference for causal video networks
//!
//! Networks trained on whole clips with causal 3D convolutions can classify a
//! live video one frame at a time. StreamNet converts the trained graph so
//! each temporal convolution keeps its own short history of frames, then folds
//! per-frame class scores into a decaying running belief.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! streamnet = "0.1"  # Default: config + observability
//! ```
//!
//! ## Feature Flags
//!
//! - **`config`** (default): TOML configuration with env / CLI overrides
//! - **`observability`** (default): `tracing` subscriber setup
//! - **`file-logging`**: JSON log files per run
//!
//! ## Usage
//!
//! ```rust,no_run
//! use streamnet::prelude::*;
//!
//! let config = streamnet::config::load_config(None, None)?;
//! let mut pipeline = Pipeline::from_config(&config)?;
//! # let frames: Vec<ndarray::Array3<f32>> = Vec::new();
//! for frame in &frames {
//!     let estimate = pipeline.session_mut().push_frame(frame.view())?;
//!     println!("frame {} -> class {}", estimate.frame_index, estimate.predicted_class);
//! }
//! let prediction = pipeline.session_mut().finish();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: streamnet-config, streamnet-observability  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Inference: streamnet-core                              │
//! │  (causal conv, FIFO buffers, conversion, aggregation)   │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Pipeline: config → model → session                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export the inference core
pub use streamnet_core as inference;

#[cfg(feature = "config")]
pub use streamnet_config as config;

#[cfg(feature = "observability")]
pub use streamnet_observability as observability;

#[cfg(feature = "config")]
mod pipeline;

#[cfg(feature = "config")]
pub use pipeline::{Pipeline, PipelineError};

#[cfg(all(feature = "config", feature = "observability"))]
mod logging;

#[cfg(all(feature = "config", feature = "observability"))]
pub use logging::logging_settings;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use streamnet_core::collaborators::{Evaluator, ParameterStore, Quantizer, Trainer};
    pub use streamnet_core::{
        run_sequences_parallel, FrameEstimate, FrameShape, LayerKind, ModelGraph, Parameterized,
        Prediction, SequenceOutcome, StreamError, StreamingAggregator, StreamingModel,
        StreamingSession,
    };

    #[cfg(feature = "config")]
    pub use crate::config::StreamnetConfig;

    #[cfg(feature = "config")]
    pub use crate::pipeline::{Pipeline, PipelineError};
}
