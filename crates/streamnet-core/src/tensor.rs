// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Frame shapes and spatial window geometry
//!
//! A frame is an `(height, width, channels)` array; a sequence stacks frames
//! along a leading time axis `(time, height, width, channels)`.

use ndarray::{ArrayView3, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::{Result, StreamError};

/// Per-frame tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FrameShape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Shape of a single frame
    pub fn of(frame: &ArrayView3<f32>) -> Self {
        let (height, width, channels) = frame.dim();
        Self::new(height, width, channels)
    }

    /// Shape of every frame in a `(time, height, width, channels)` sequence
    pub fn of_sequence(sequence: &ArrayView4<f32>) -> Self {
        let (_, height, width, channels) = sequence.dim();
        Self::new(height, width, channels)
    }

    /// Number of scalars in one frame
    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    /// Fail with a shape-mismatch error unless `frame` has exactly this shape.
    pub fn expect_frame(&self, context: &str, frame: &ArrayView3<f32>) -> Result<()> {
        let actual = FrameShape::of(frame);
        if actual != *self {
            return Err(StreamError::frame_mismatch(context, *self, actual));
        }
        Ok(())
    }

    /// Same as [`FrameShape::expect_frame`] for every frame of a sequence.
    pub fn expect_sequence(&self, context: &str, sequence: &ArrayView4<f32>) -> Result<()> {
        let actual = FrameShape::of_sequence(sequence);
        if actual != *self {
            return Err(StreamError::frame_mismatch(context, *self, actual));
        }
        Ok(())
    }
}

impl Display for FrameShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Spatial padding mode. `Same` follows the usual convention of placing the
/// smaller half of the padding before the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Same,
    Valid,
}

/// Stride and padding of a sliding spatial window (height and width share both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialGeometry {
    pub stride: usize,
    pub padding: Padding,
}

impl Default for SpatialGeometry {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: Padding::Same,
        }
    }
}

impl SpatialGeometry {
    pub const fn new(stride: usize, padding: Padding) -> Self {
        Self { stride, padding }
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        if self.stride == 0 {
            return Err(StreamError::invalid_kernel(layer, "spatial stride must be >= 1"));
        }
        Ok(())
    }

    /// Output extent along one spatial axis, or `None` when a `Valid` window
    /// does not fit inside the input.
    pub fn output_extent(&self, input: usize, window: usize) -> Option<usize> {
        match self.padding {
            Padding::Same => Some(input.div_ceil(self.stride)),
            Padding::Valid => {
                if window > input {
                    None
                } else {
                    Some((input - window) / self.stride + 1)
                }
            }
        }
    }

    /// Number of implicit zero rows/columns placed before the data.
    pub fn leading_pad(&self, input: usize, window: usize) -> usize {
        match self.padding {
            Padding::Valid => 0,
            Padding::Same => {
                let output = input.div_ceil(self.stride);
                let needed = (output.saturating_sub(1) * self.stride + window).saturating_sub(input);
                needed / 2
            }
        }
    }

    /// Output frame shape for a `(window_h, window_w)` kernel producing
    /// `out_channels` channels.
    pub(crate) fn output_shape(
        &self,
        layer: &str,
        input: FrameShape,
        window: (usize, usize),
        out_channels: usize,
    ) -> Result<FrameShape> {
        let height = self.output_extent(input.height, window.0);
        let width = self.output_extent(input.width, window.1);
        match (height, width) {
            (Some(height), Some(width)) => Ok(FrameShape::new(height, width, out_channels)),
            _ => Err(StreamError::ShapeMismatch {
                context: layer.to_string(),
                expected: format!("input of at least {}x{} for a valid window", window.0, window.1),
                actual: input.to_string(),
            }),
        }
    }
}

/// Length of the leading time axis
pub fn sequence_len(sequence: &ArrayView4<f32>) -> usize {
    sequence.len_of(Axis(0))
}
