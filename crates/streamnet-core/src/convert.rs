// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Batch graph → streaming graph conversion
//!
//! Each layer kind maps to exactly one [`ConversionRule`]; the match in
//! [`conversion_rule`] is exhaustive, so adding a layer kind forces a decision
//! here. The converted graph keeps node order, names, connectivity and
//! weights, and changes only how temporal layers execute.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::buffered::{bufferize, BufferedConv3d, Bufferized};
use crate::error::{Result, StreamError};
use crate::graph::{InputSignature, ModelGraph, NodeId, INPUT_NODE_NAME};
use crate::layer::{LayerKind, Parameterized, WeightView, WeightViewMut};
use crate::ops::TemporalPadding;
use crate::tensor::FrameShape;

/// What the converter does with one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionRule {
    /// Causal temporal convolution: replaced by a FIFO-backed adapter
    Bufferize,
    /// Temporal kernel of size 1: re-expressed as a 2D convolution
    FlattenTo2d,
    /// Frame-local layer: kept unchanged
    PassThrough,
    /// Temporal layer that cannot run on a frame-by-frame stream
    Reject(&'static str),
}

/// The per-kind conversion table.
pub fn conversion_rule(kind: &LayerKind) -> ConversionRule {
    match kind {
        LayerKind::Conv3d(conv) if conv.is_spatial_only() => ConversionRule::FlattenTo2d,
        LayerKind::Conv3d(conv) => match conv.temporal_padding() {
            TemporalPadding::Causal => ConversionRule::Bufferize,
            TemporalPadding::Centered => ConversionRule::Reject(
                "temporal padding is centered, so outputs depend on frames that have not arrived yet",
            ),
        },
        LayerKind::Input
        | LayerKind::Conv2d(_)
        | LayerKind::BatchNorm(_)
        | LayerKind::Activation { .. }
        | LayerKind::MaxPool2d(_)
        | LayerKind::GlobalAvgPool
        | LayerKind::Dense(_)
        | LayerKind::Add => ConversionRule::PassThrough,
    }
}

/// Which layers were replaced and which were left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub bufferized: Vec<String>,
    pub flattened: Vec<String>,
    /// Layers not recognized as temporal, carried over unchanged
    pub passed_through: Vec<String>,
}

impl ConversionReport {
    /// Layers the converter skipped (kept unchanged)
    pub fn skipped(&self) -> &[String] {
        &self.passed_through
    }

    pub fn converted_count(&self) -> usize {
        self.bufferized.len() + self.flattened.len()
    }
}

/// Runtime form of one node in a converted graph.
#[derive(Debug, Clone)]
pub enum StreamingOp {
    /// Stateful temporal convolution
    Buffered(BufferedConv3d),
    /// Stateless frame-local layer (including flattened convolutions)
    Stateless(LayerKind),
}

impl Parameterized for StreamingOp {
    fn weights(&self) -> Vec<WeightView<'_>> {
        match self {
            StreamingOp::Buffered(layer) => layer.weights(),
            StreamingOp::Stateless(kind) => kind.weights(),
        }
    }

    fn weights_mut(&mut self) -> Vec<WeightViewMut<'_>> {
        match self {
            StreamingOp::Buffered(layer) => layer.weights_mut(),
            StreamingOp::Stateless(kind) => kind.weights_mut(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamingNode {
    pub name: String,
    pub op: StreamingOp,
    pub inputs: Vec<NodeId>,
}

/// Converted graph: consumes one frame per [`StreamingModel::step`] and keeps
/// its temporal context in the FIFO buffers of its buffered layers.
///
/// Buffer state belongs to exactly one sequence. Call [`StreamingModel::reset`]
/// before feeding an unrelated sequence; stale frames otherwise leak into the
/// first `K - 1` outputs of the next one. To process sequences concurrently,
/// clone the model so each sequence owns its buffers.
#[derive(Debug, Clone)]
pub struct StreamingModel {
    nodes: Vec<StreamingNode>,
    shapes: Vec<FrameShape>,
    output: NodeId,
    report: ConversionReport,
    frames_seen: u64,
}

impl StreamingModel {
    /// Convert a trained graph. Fails on the first layer that looks temporal
    /// but cannot be streamed, naming it.
    pub fn convert(graph: &ModelGraph) -> Result<Self> {
        let mut report = ConversionReport::default();
        let mut nodes = Vec::with_capacity(graph.nodes().len());

        for (id, node) in graph.nodes().iter().enumerate() {
            let rule = conversion_rule(&node.kind);
            let op = match (rule, &node.kind) {
                (ConversionRule::Reject(reason), _) => {
                    return Err(StreamError::UnsupportedTemporalLayer {
                        layer: node.name.clone(),
                        reason: reason.to_string(),
                    });
                }
                (ConversionRule::PassThrough, kind) => {
                    if !matches!(kind, LayerKind::Input) {
                        report.passed_through.push(node.name.clone());
                    }
                    StreamingOp::Stateless(kind.clone())
                }
                (ConversionRule::Bufferize | ConversionRule::FlattenTo2d, LayerKind::Conv3d(conv)) => {
                    let input_shape = graph.shapes()[node.inputs[0]];
                    match bufferize(&node.name, conv, input_shape)? {
                        Bufferized::Buffered(layer) => {
                            report.bufferized.push(node.name.clone());
                            StreamingOp::Buffered(layer)
                        }
                        Bufferized::Flattened(conv2d) => {
                            report.flattened.push(node.name.clone());
                            StreamingOp::Stateless(LayerKind::Conv2d(conv2d))
                        }
                    }
                }
                (_, kind) => {
                    return Err(StreamError::InvalidGraph(format!(
                        "node {} '{}': rule {:?} does not apply to {}",
                        id,
                        node.name,
                        rule,
                        kind.type_name()
                    )));
                }
            };
            debug!(layer = %node.name, rule = ?rule, "converted layer for streaming");
            nodes.push(StreamingNode {
                name: node.name.clone(),
                op,
                inputs: node.inputs.clone(),
            });
        }

        info!(
            bufferized = report.bufferized.len(),
            flattened = report.flattened.len(),
            passed_through = report.passed_through.len(),
            "converted model graph to streaming form"
        );
        Ok(Self {
            nodes,
            shapes: graph.shapes().to_vec(),
            output: graph.output(),
            report,
            frames_seen: 0,
        })
    }

    pub fn conversion_report(&self) -> &ConversionReport {
        &self.report
    }

    pub fn nodes(&self) -> &[StreamingNode] {
        &self.nodes
    }

    pub fn input_shape(&self) -> FrameShape {
        self.shapes[0]
    }

    pub fn output_shape(&self) -> FrameShape {
        self.shapes[self.output]
    }

    pub fn input_signature(&self) -> InputSignature {
        InputSignature::SingleFrame {
            frame: self.input_shape(),
        }
    }

    /// Frames consumed since conversion or the last reset.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// All FIFO-backed layers with their names
    pub fn buffered_layers(&self) -> impl Iterator<Item = (&str, &BufferedConv3d)> {
        self.nodes.iter().filter_map(|node| match &node.op {
            StreamingOp::Buffered(layer) => Some((node.name.as_str(), layer)),
            StreamingOp::Stateless(_) => None,
        })
    }

    /// Feed the next frame of the current sequence and return the output
    /// node's frame for this time step.
    pub fn step(&mut self, frame: ArrayView3<f32>) -> Result<Array3<f32>> {
        self.input_shape().expect_frame(INPUT_NODE_NAME, &frame)?;
        let mut values: Vec<Array3<f32>> = Vec::with_capacity(self.output + 1);
        for node in self.nodes.iter_mut().take(self.output + 1) {
            let out = {
                let inputs: Vec<ArrayView3<f32>> = if node.inputs.is_empty() {
                    vec![frame.view()]
                } else {
                    node.inputs.iter().map(|&i| values[i].view()).collect()
                };
                match &mut node.op {
                    StreamingOp::Buffered(layer) => layer.step(inputs[0].view())?,
                    StreamingOp::Stateless(kind) => kind.forward_frame(&node.name, &inputs)?,
                }
            };
            values.push(out);
        }
        self.frames_seen += 1;
        trace!(frame = self.frames_seen, "streaming step complete");
        values
            .pop()
            .ok_or_else(|| StreamError::InvalidGraph("streaming model has no nodes".to_string()))
    }

    /// Clear every buffer, returning the model to its freshly converted state.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            if let StreamingOp::Buffered(layer) = &mut node.op {
                layer.reset();
            }
        }
        debug!(frames = self.frames_seen, "streaming model buffers reset");
        self.frames_seen = 0;
    }

    /// Learned tensors of every parameterized node, keyed by node name, in
    /// the same layout as [`ModelGraph::layer_weights`].
    pub fn layer_weights(&self) -> Vec<(&str, Vec<WeightView<'_>>)> {
        self.nodes
            .iter()
            .map(|node| (node.name.as_str(), node.op.weights()))
            .filter(|(_, weights)| !weights.is_empty())
            .collect()
    }

    pub fn layer_weights_mut(&mut self) -> Vec<(&str, Vec<WeightViewMut<'_>>)> {
        self.nodes
            .iter_mut()
            .map(|node| {
                let StreamingNode { name, op, .. } = node;
                (name.as_str(), op.weights_mut())
            })
            .filter(|(_, weights)| !weights.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{Activation, Conv3d};
    use crate::tensor::SpatialGeometry;
    use ndarray::{Array4, Array5, Axis};

    fn temporal(k: usize, padding: TemporalPadding) -> LayerKind {
        LayerKind::Conv3d(
            Conv3d::new(
                Array5::from_shape_fn((k, 1, 1, 1, 1), |(t, ..)| (t + 1) as f32),
                None,
                SpatialGeometry::default(),
                padding,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_rule_table() {
        assert_eq!(
            conversion_rule(&temporal(3, TemporalPadding::Causal)),
            ConversionRule::Bufferize
        );
        assert_eq!(
            conversion_rule(&temporal(1, TemporalPadding::Centered)),
            ConversionRule::FlattenTo2d
        );
        assert!(matches!(
            conversion_rule(&temporal(3, TemporalPadding::Centered)),
            ConversionRule::Reject(_)
        ));
        assert_eq!(conversion_rule(&LayerKind::Add), ConversionRule::PassThrough);
    }

    #[test]
    fn test_rejection_names_layer() {
        let mut builder = ModelGraph::builder(FrameShape::new(1, 1, 1));
        builder.then("ok", temporal(2, TemporalPadding::Causal)).unwrap();
        builder.then("lookahead", temporal(3, TemporalPadding::Centered)).unwrap();
        let graph = builder.finish();
        match StreamingModel::convert(&graph) {
            Err(StreamError::UnsupportedTemporalLayer { layer, .. }) => assert_eq!(layer, "lookahead"),
            other => panic!("expected rejection, got {:?}", other.map(|m| m.report)),
        }
    }

    #[test]
    fn test_report_and_signature() {
        let mut builder = ModelGraph::builder(FrameShape::new(1, 1, 1));
        builder.then("t", temporal(3, TemporalPadding::Causal)).unwrap();
        builder.then("p", temporal(1, TemporalPadding::Causal)).unwrap();
        builder
            .then(
                "act",
                LayerKind::Activation {
                    activation: Activation::Relu,
                },
            )
            .unwrap();
        let model = StreamingModel::convert(&builder.finish()).unwrap();
        let report = model.conversion_report();
        assert_eq!(report.bufferized, vec!["t"]);
        assert_eq!(report.flattened, vec!["p"]);
        assert_eq!(report.skipped(), &["act".to_string()]);
        assert_eq!(
            model.input_signature(),
            InputSignature::SingleFrame {
                frame: FrameShape::new(1, 1, 1)
            }
        );
        assert_eq!(model.buffered_layers().count(), 1);
    }

    #[test]
    fn test_step_matches_batch_and_reset_clears_state() {
        let mut builder = ModelGraph::builder(FrameShape::new(1, 1, 1));
        builder.then("t", temporal(3, TemporalPadding::Causal)).unwrap();
        let graph = builder.finish();
        let clip = Array4::from_shape_fn((5, 1, 1, 1), |(t, ..)| t as f32 + 1.0);
        let batch = graph.forward_sequence(clip.view()).unwrap();

        let mut model = StreamingModel::convert(&graph).unwrap();
        for _ in 0..2 {
            for (t, frame) in clip.axis_iter(Axis(0)).enumerate() {
                assert_eq!(model.step(frame).unwrap(), batch.index_axis(Axis(0), t));
            }
            assert_eq!(model.frames_seen(), 5);
            model.reset();
            assert_eq!(model.frames_seen(), 0);
        }
    }
}
