// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bufferized (streaming) form of a trained causal temporal convolution
//!
//! ```text
//! step(x_t):
//!     fifo.push(x_t)                         // fifo = [x_{t-K+1}, ..., x_t]
//!     y_t = bias + Σ_dt conv2d(fifo[dt], kernel[dt])
//! ```
//!
//! The kernel is the trained layer's kernel, untouched. Each output frame is
//! bit-identical to the matching frame of [`Conv3d::forward_sequence`].

use ndarray::{Array3, ArrayView3};

use crate::error::{Result, StreamError};
use crate::fifo::FifoBuffer;
use crate::ops::spatial::{accumulate_window, biased_frame};
use crate::ops::{Conv2d, Conv3d, TemporalPadding};
use crate::tensor::FrameShape;

/// Streaming adapter owning one FIFO buffer sized to the temporal kernel.
#[derive(Debug, Clone)]
pub struct BufferedConv3d {
    conv: Conv3d,
    buffer: FifoBuffer,
    output_shape: FrameShape,
}

impl BufferedConv3d {
    /// Wrap a causal convolution that receives frames of `input_shape`.
    pub fn new(layer: &str, conv: Conv3d, input_shape: FrameShape) -> Result<Self> {
        let buffer = FifoBuffer::new(conv.temporal_size(), input_shape)?;
        Self::from_parts(layer, conv, buffer)
    }

    /// Wrap a convolution with an explicitly provided buffer. The buffer must
    /// hold exactly `temporal_size` frames of the layer's input shape.
    pub fn from_parts(layer: &str, conv: Conv3d, buffer: FifoBuffer) -> Result<Self> {
        conv.validate(layer)?;
        if conv.temporal_padding() != TemporalPadding::Causal {
            return Err(StreamError::UnsupportedTemporalLayer {
                layer: layer.to_string(),
                reason: "only causally padded temporal convolutions can be streamed".to_string(),
            });
        }
        if buffer.capacity() != conv.temporal_size() {
            return Err(StreamError::BufferCapacityMismatch {
                layer: layer.to_string(),
                expected: conv.temporal_size(),
                actual: buffer.capacity(),
            });
        }
        let output_shape = conv.output_shape(layer, buffer.frame_shape())?;
        Ok(Self {
            conv,
            buffer,
            output_shape,
        })
    }

    pub fn conv(&self) -> &Conv3d {
        &self.conv
    }

    pub(crate) fn conv_mut(&mut self) -> &mut Conv3d {
        &mut self.conv
    }

    pub fn buffer(&self) -> &FifoBuffer {
        &self.buffer
    }

    pub fn input_shape(&self) -> FrameShape {
        self.buffer.frame_shape()
    }

    pub fn output_shape(&self) -> FrameShape {
        self.output_shape
    }

    /// Consume one input frame and produce the matching output frame.
    pub fn step(&mut self, frame: ArrayView3<f32>) -> Result<Array3<f32>> {
        self.buffer.push(frame)?;
        let mut out = biased_frame(self.output_shape, self.conv.bias());
        for (dt, past) in self.buffer.iter().enumerate() {
            accumulate_window(
                past,
                self.conv.taps(dt),
                self.conv.geometry(),
                self.conv.is_depthwise(),
                &mut out,
            );
        }
        Ok(out)
    }

    /// Forget all past frames.
    pub fn reset(&mut self) {
        self.buffer.reset();
    }
}

/// Streaming replacement for a temporal layer.
#[derive(Debug, Clone)]
pub enum Bufferized {
    /// Temporal kernel > 1: stateful, FIFO-backed
    Buffered(BufferedConv3d),
    /// Temporal kernel == 1: plain per-frame 2D convolution, no state
    Flattened(Conv2d),
}

/// Convert one trained `Conv3d` into its streaming form.
pub fn bufferize(layer: &str, conv: &Conv3d, input_shape: FrameShape) -> Result<Bufferized> {
    if let Some(conv2d) = conv.to_conv2d() {
        conv2d.output_shape(layer, input_shape)?;
        return Ok(Bufferized::Flattened(conv2d));
    }
    Ok(Bufferized::Buffered(BufferedConv3d::new(layer, conv.clone(), input_shape)?))
}
