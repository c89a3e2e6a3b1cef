// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Layer kinds and the weight interface shared by batch and streaming layers

use ndarray::{
    Array, Array1, Array3, Array4, ArrayView3, ArrayView4, ArrayViewD, ArrayViewMutD, Axis, Dimension,
};
use serde::{Deserialize, Serialize};

use crate::buffered::BufferedConv3d;
use crate::error::{Result, StreamError};
use crate::ops::{self, Activation, BatchNorm, Conv2d, Conv3d, Dense, MaxPool2d};
use crate::tensor::{sequence_len, FrameShape};

/// Every kind of node a model graph can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    /// Graph entry point; forwards the input unchanged
    Input,
    Conv3d(Conv3d),
    Conv2d(Conv2d),
    BatchNorm(BatchNorm),
    Activation { activation: Activation },
    MaxPool2d(MaxPool2d),
    GlobalAvgPool,
    Dense(Dense),
    /// Elementwise sum of two inputs
    Add,
}

impl LayerKind {
    /// Short lowercase name used in logs and conversion reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Input => "input",
            LayerKind::Conv3d(_) => "conv3d",
            LayerKind::Conv2d(_) => "conv2d",
            LayerKind::BatchNorm(_) => "batch_norm",
            LayerKind::Activation { .. } => "activation",
            LayerKind::MaxPool2d(_) => "max_pool2d",
            LayerKind::GlobalAvgPool => "global_avg_pool",
            LayerKind::Dense(_) => "dense",
            LayerKind::Add => "add",
        }
    }

    /// Number of input edges the layer consumes.
    pub fn arity(&self) -> usize {
        match self {
            LayerKind::Input => 0,
            LayerKind::Add => 2,
            _ => 1,
        }
    }

    /// True when outputs depend on more than the current frame.
    pub fn is_temporal(&self) -> bool {
        matches!(self, LayerKind::Conv3d(conv) if !conv.is_spatial_only())
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        match self {
            LayerKind::Conv3d(conv) => conv.validate(layer),
            LayerKind::Conv2d(conv) => conv.validate(layer),
            LayerKind::BatchNorm(norm) => norm.validate(layer),
            LayerKind::MaxPool2d(pool) => pool.validate(layer),
            LayerKind::Dense(dense) => dense.validate(layer),
            LayerKind::Input
            | LayerKind::Activation { .. }
            | LayerKind::GlobalAvgPool
            | LayerKind::Add => Ok(()),
        }
    }

    fn check_arity<T>(&self, layer: &str, inputs: &[T]) -> Result<()> {
        if inputs.len() != self.arity() {
            return Err(StreamError::InvalidGraph(format!(
                "layer '{}' ({}) takes {} input(s), got {}",
                layer,
                self.type_name(),
                self.arity(),
                inputs.len()
            )));
        }
        Ok(())
    }

    /// Per-frame output shape given per-frame input shapes.
    pub fn output_shape(&self, layer: &str, inputs: &[FrameShape]) -> Result<FrameShape> {
        if matches!(self, LayerKind::Input) {
            return Err(StreamError::InvalidGraph(format!(
                "layer '{}': input nodes are created by the graph itself",
                layer
            )));
        }
        self.check_arity(layer, inputs)?;
        let input = inputs[0];
        match self {
            LayerKind::Input => unreachable!("handled above"),
            LayerKind::Conv3d(conv) => conv.output_shape(layer, input),
            LayerKind::Conv2d(conv) => conv.output_shape(layer, input),
            LayerKind::BatchNorm(norm) => norm.output_shape(layer, input),
            LayerKind::Activation { .. } => Ok(input),
            LayerKind::MaxPool2d(pool) => pool.output_shape(layer, input),
            LayerKind::GlobalAvgPool => Ok(FrameShape::new(1, 1, input.channels)),
            LayerKind::Dense(dense) => dense.output_shape(layer, input),
            LayerKind::Add => {
                if inputs[1] != input {
                    return Err(StreamError::frame_mismatch(layer, input, inputs[1]));
                }
                Ok(input)
            }
        }
    }

    /// Run a frame-local layer on one frame.
    ///
    /// Temporal convolutions (kernel size > 1) are rejected here; they only run
    /// in whole-sequence mode or after conversion to [`BufferedConv3d`].
    pub fn forward_frame(&self, layer: &str, inputs: &[ArrayView3<f32>]) -> Result<Array3<f32>> {
        if matches!(self, LayerKind::Input) {
            return match inputs {
                [frame] => Ok(frame.to_owned()),
                _ => Err(StreamError::InvalidGraph(format!(
                    "input layer '{}' expects exactly one frame",
                    layer
                ))),
            };
        }
        self.check_arity(layer, inputs)?;
        let frame = inputs[0].view();
        match self {
            LayerKind::Input => unreachable!("handled above"),
            LayerKind::Conv3d(conv) => match conv.to_conv2d() {
                Some(conv2d) => conv2d.forward_frame(layer, frame),
                None => Err(StreamError::UnsupportedTemporalLayer {
                    layer: layer.to_string(),
                    reason: format!(
                        "temporal kernel of size {} needs past frames; convert the graph before streaming",
                        conv.temporal_size()
                    ),
                }),
            },
            LayerKind::Conv2d(conv) => conv.forward_frame(layer, frame),
            LayerKind::BatchNorm(norm) => norm.forward_frame(layer, frame),
            LayerKind::Activation { activation } => Ok(activation.forward_frame(frame)),
            LayerKind::MaxPool2d(pool) => pool.forward_frame(layer, frame),
            LayerKind::GlobalAvgPool => Ok(ops::global_avg_pool(frame)),
            LayerKind::Dense(dense) => dense.forward_frame(layer, frame),
            LayerKind::Add => ops::add_frames(layer, frame, inputs[1].view()),
        }
    }

    /// Run the layer over whole `(time, h, w, c)` sequences.
    pub fn forward_sequence(
        &self,
        layer: &str,
        inputs: &[ArrayView4<f32>],
    ) -> Result<Array4<f32>> {
        if let LayerKind::Conv3d(conv) = self {
            self.check_arity(layer, inputs)?;
            return conv.forward_sequence(layer, inputs[0].view());
        }
        if matches!(self, LayerKind::Input) {
            return match inputs {
                [sequence] => Ok(sequence.to_owned()),
                _ => Err(StreamError::InvalidGraph(format!(
                    "input layer '{}' expects exactly one sequence",
                    layer
                ))),
            };
        }
        self.check_arity(layer, inputs)?;

        let frames = sequence_len(&inputs[0]);
        for other in &inputs[1..] {
            if sequence_len(other) != frames {
                return Err(StreamError::ShapeMismatch {
                    context: layer.to_string(),
                    expected: format!("{} frames", frames),
                    actual: format!("{} frames", sequence_len(other)),
                });
            }
        }
        let in_shapes: Vec<FrameShape> = inputs.iter().map(FrameShape::of_sequence).collect();
        let out_shape = self.output_shape(layer, &in_shapes)?;

        let mut output = Array4::<f32>::zeros((
            frames,
            out_shape.height,
            out_shape.width,
            out_shape.channels,
        ));
        for t in 0..frames {
            let frame_inputs: Vec<ArrayView3<f32>> =
                inputs.iter().map(|seq| seq.index_axis(Axis(0), t)).collect();
            let frame_out = self.forward_frame(layer, &frame_inputs)?;
            output.index_axis_mut(Axis(0), t).assign(&frame_out);
        }
        Ok(output)
    }
}

/// Named read-only view of one weight tensor.
#[derive(Debug)]
pub struct WeightView<'a> {
    pub name: &'static str,
    pub tensor: ArrayViewD<'a, f32>,
}

/// Named mutable view of one weight tensor. The shape is fixed; only values
/// can be rewritten.
#[derive(Debug)]
pub struct WeightViewMut<'a> {
    pub name: &'static str,
    pub tensor: ArrayViewMutD<'a, f32>,
}

/// Uniform access to a layer's learned tensors, implemented identically by
/// batch layers and their streaming replacements so an external quantizer
/// can inspect and rewrite either.
pub trait Parameterized {
    fn weights(&self) -> Vec<WeightView<'_>>;

    fn weights_mut(&mut self) -> Vec<WeightViewMut<'_>>;

    /// Total number of scalar parameters
    fn parameter_count(&self) -> usize {
        self.weights().iter().map(|w| w.tensor.len()).sum()
    }
}

fn kernel_and_bias<'a, D: Dimension>(
    kernel: &'a Array<f32, D>,
    bias: Option<&'a Array1<f32>>,
) -> Vec<WeightView<'a>> {
    let mut weights = vec![WeightView {
        name: "kernel",
        tensor: kernel.view().into_dyn(),
    }];
    if let Some(bias) = bias {
        weights.push(WeightView {
            name: "bias",
            tensor: bias.view().into_dyn(),
        });
    }
    weights
}

fn kernel_and_bias_mut<'a, D: Dimension>(
    kernel: &'a mut Array<f32, D>,
    bias: Option<&'a mut Array1<f32>>,
) -> Vec<WeightViewMut<'a>> {
    let mut weights = vec![WeightViewMut {
        name: "kernel",
        tensor: kernel.view_mut().into_dyn(),
    }];
    if let Some(bias) = bias {
        weights.push(WeightViewMut {
            name: "bias",
            tensor: bias.view_mut().into_dyn(),
        });
    }
    weights
}

impl Parameterized for LayerKind {
    fn weights(&self) -> Vec<WeightView<'_>> {
        match self {
            LayerKind::Conv3d(conv) => kernel_and_bias(conv.kernel(), conv.bias()),
            LayerKind::Conv2d(conv) => kernel_and_bias(conv.kernel(), conv.bias()),
            LayerKind::Dense(dense) => kernel_and_bias(dense.kernel(), dense.bias()),
            LayerKind::BatchNorm(norm) => norm
                .parameters()
                .into_iter()
                .map(|(name, tensor)| WeightView {
                    name,
                    tensor: tensor.view().into_dyn(),
                })
                .collect(),
            LayerKind::Input
            | LayerKind::Activation { .. }
            | LayerKind::MaxPool2d(_)
            | LayerKind::GlobalAvgPool
            | LayerKind::Add => Vec::new(),
        }
    }

    fn weights_mut(&mut self) -> Vec<WeightViewMut<'_>> {
        match self {
            LayerKind::Conv3d(conv) => {
                let (kernel, bias) = conv.parts_mut();
                kernel_and_bias_mut(kernel, bias)
            }
            LayerKind::Conv2d(conv) => {
                let (kernel, bias) = conv.parts_mut();
                kernel_and_bias_mut(kernel, bias)
            }
            LayerKind::Dense(dense) => {
                let (kernel, bias) = dense.parts_mut();
                kernel_and_bias_mut(kernel, bias)
            }
            LayerKind::BatchNorm(norm) => norm
                .parameters_mut()
                .into_iter()
                .map(|(name, tensor)| WeightViewMut {
                    name,
                    tensor: tensor.view_mut().into_dyn(),
                })
                .collect(),
            LayerKind::Input
            | LayerKind::Activation { .. }
            | LayerKind::MaxPool2d(_)
            | LayerKind::GlobalAvgPool
            | LayerKind::Add => Vec::new(),
        }
    }
}

impl Parameterized for BufferedConv3d {
    fn weights(&self) -> Vec<WeightView<'_>> {
        kernel_and_bias(self.conv().kernel(), self.conv().bias())
    }

    fn weights_mut(&mut self) -> Vec<WeightViewMut<'_>> {
        let (kernel, bias) = self.conv_mut().parts_mut();
        kernel_and_bias_mut(kernel, bias)
    }
}
