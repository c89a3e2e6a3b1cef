// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! 3D convolution with a temporal axis
//!
//! ## Whole-sequence mode
//!
//! ```text
//! padded = [0; left] ++ x[0..T] ++ [0; right]
//! y[t]   = bias + Σ_{dt=0}^{K-1} conv2d(padded[t + dt], kernel[dt])
//! ```
//!
//! With causal padding `left = K - 1` and `right = 0`, so `y[t]` reads
//! `x[t-K+1 ..= t]` only. Temporal stride is always 1; a larger stride would
//! drop frames and make per-frame outputs impossible.

use ndarray::{s, Array1, Array4, Array5, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use super::spatial::{accumulate_window, biased_frame, expected_in_channels, validate_taps, Conv2d};
use crate::error::{Result, StreamError};
use crate::tensor::{sequence_len, FrameShape, SpatialGeometry};

/// How the time axis is padded in whole-sequence mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPadding {
    /// K-1 zero frames before the sequence, none after
    #[default]
    Causal,
    /// Zero frames split around the sequence; outputs depend on future frames
    Centered,
}

impl TemporalPadding {
    /// `(before, after)` zero frames for a kernel of temporal size `k`.
    pub fn pads(&self, k: usize) -> (usize, usize) {
        let total = k.saturating_sub(1);
        match self {
            TemporalPadding::Causal => (total, 0),
            TemporalPadding::Centered => (total / 2, total - total / 2),
        }
    }
}

/// Trained 3D convolution, kernel laid out `(temporal, kh, kw, in, out)`.
///
/// A causal instance is the batch form of the causal convolution operator;
/// its streaming form is [`crate::buffered::BufferedConv3d`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv3d {
    kernel: Array5<f32>,
    bias: Option<Array1<f32>>,
    #[serde(default)]
    geometry: SpatialGeometry,
    #[serde(default)]
    depthwise: bool,
    #[serde(default)]
    temporal_padding: TemporalPadding,
}

impl Conv3d {
    pub fn new(
        kernel: Array5<f32>,
        bias: Option<Array1<f32>>,
        geometry: SpatialGeometry,
        temporal_padding: TemporalPadding,
    ) -> Result<Self> {
        let conv = Self {
            kernel,
            bias,
            geometry,
            depthwise: false,
            temporal_padding,
        };
        conv.validate("conv3d")?;
        Ok(conv)
    }

    /// Causal convolution, the form that can be streamed.
    pub fn causal(
        kernel: Array5<f32>,
        bias: Option<Array1<f32>>,
        geometry: SpatialGeometry,
    ) -> Result<Self> {
        Self::new(kernel, bias, geometry, TemporalPadding::Causal)
    }

    /// Causal depthwise convolution, kernel `(temporal, kh, kw, 1, channels)`.
    pub fn causal_depthwise(
        kernel: Array5<f32>,
        bias: Option<Array1<f32>>,
        geometry: SpatialGeometry,
    ) -> Result<Self> {
        let conv = Self {
            kernel,
            bias,
            geometry,
            depthwise: true,
            temporal_padding: TemporalPadding::Causal,
        };
        conv.validate("depthwise_conv3d")?;
        Ok(conv)
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        let (kt, kh, kw, in_c, out_c) = self.kernel.dim();
        if kt < 1 {
            return Err(StreamError::invalid_kernel(layer, "temporal kernel size must be >= 1"));
        }
        self.geometry.validate(layer)?;
        validate_taps(layer, (kh, kw, in_c, out_c), self.bias.as_ref(), self.depthwise)
    }

    pub fn temporal_size(&self) -> usize {
        self.kernel.len_of(Axis(0))
    }

    /// Temporal size 1: no dependence on other frames.
    pub fn is_spatial_only(&self) -> bool {
        self.temporal_size() == 1
    }

    pub fn temporal_padding(&self) -> TemporalPadding {
        self.temporal_padding
    }

    pub fn kernel(&self) -> &Array5<f32> {
        &self.kernel
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// Kernel and bias borrowed together for in-place rewriting.
    pub(crate) fn parts_mut(&mut self) -> (&mut Array5<f32>, Option<&mut Array1<f32>>) {
        (&mut self.kernel, self.bias.as_mut())
    }

    pub fn geometry(&self) -> SpatialGeometry {
        self.geometry
    }

    pub fn is_depthwise(&self) -> bool {
        self.depthwise
    }

    /// Spatial taps applied to the frame `dt` steps after the oldest one in the window.
    pub(crate) fn taps(&self, dt: usize) -> ArrayView4<'_, f32> {
        self.kernel.index_axis(Axis(0), dt)
    }

    pub fn output_shape(&self, layer: &str, input: FrameShape) -> Result<FrameShape> {
        let (_, kh, kw, in_c, out_c) = self.kernel.dim();
        let expected = expected_in_channels(in_c, out_c, self.depthwise);
        if input.channels != expected {
            return Err(StreamError::ShapeMismatch {
                context: layer.to_string(),
                expected: format!("{} input channels", expected),
                actual: input.to_string(),
            });
        }
        self.geometry.output_shape(layer, input, (kh, kw), out_c)
    }

    /// Convolve a whole `(time, h, w, c)` sequence, producing one output per input frame.
    pub fn forward_sequence(&self, layer: &str, sequence: ArrayView4<f32>) -> Result<Array4<f32>> {
        let in_shape = FrameShape::of_sequence(&sequence);
        let out_shape = self.output_shape(layer, in_shape)?;
        let frames = sequence_len(&sequence);
        let k = self.temporal_size();
        let (before, after) = self.temporal_padding.pads(k);

        let mut padded = Array4::<f32>::zeros((
            before + frames + after,
            in_shape.height,
            in_shape.width,
            in_shape.channels,
        ));
        padded.slice_mut(s![before..before + frames, .., .., ..]).assign(&sequence);

        let (out_h, out_w, out_c) = out_shape.as_tuple();
        let mut output = Array4::<f32>::zeros((frames, out_h, out_w, out_c));
        for t in 0..frames {
            let mut frame_out = biased_frame(out_shape, self.bias.as_ref());
            for dt in 0..k {
                accumulate_window(
                    padded.index_axis(Axis(0), t + dt),
                    self.taps(dt),
                    self.geometry,
                    self.depthwise,
                    &mut frame_out,
                );
            }
            output.index_axis_mut(Axis(0), t).assign(&frame_out);
        }
        Ok(output)
    }

    /// Re-express a temporal-size-1 convolution as a 2D convolution with the
    /// same weights. Returns `None` for larger temporal kernels.
    pub fn to_conv2d(&self) -> Option<Conv2d> {
        if !self.is_spatial_only() {
            return None;
        }
        Some(Conv2d::from_parts_unchecked(
            self.taps(0).to_owned(),
            self.bias.clone(),
            self.geometry,
            self.depthwise,
        ))
    }
}
