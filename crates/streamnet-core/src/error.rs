// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for model construction, conversion and streaming execution

use crate::tensor::FrameShape;

/// Errors raised by the streaming inference core.
///
/// Construction and conversion problems are reported eagerly, naming the
/// offending layer where one exists. Numerical problems (NaN/Inf) are not
/// errors and propagate through the arithmetic unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Invalid kernel for layer '{layer}': {reason}")]
    InvalidKernel { layer: String, reason: String },

    #[error("Buffer capacity mismatch for layer '{layer}': kernel temporal size is {expected}, buffer holds {actual}")]
    BufferCapacityMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported temporal layer '{layer}': {reason}")]
    UnsupportedTemporalLayer { layer: String, reason: String },

    #[error("Shape mismatch at '{context}': expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid model graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sequence already finalized after {frames} frames; call reset() before feeding a new sequence")]
    SequenceFinalized { frames: u64 },

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub(crate) fn frame_mismatch(context: &str, expected: FrameShape, actual: FrameShape) -> Self {
        StreamError::ShapeMismatch {
            context: context.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn invalid_kernel(layer: &str, reason: impl Into<String>) -> Self {
        StreamError::InvalidKernel {
            layer: layer.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for streaming core operations
pub type Result<T> = std::result::Result<T, StreamError>;
