// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Trained (batch) model graph
//!
//! Nodes are kept in topological order: a node may only read outputs of nodes
//! added before it, so the graph is acyclic by construction. Node 0 is always
//! the input. Per-frame shapes are inferred as nodes are added, and any
//! mismatch between a producer and its consumer is rejected immediately.

mod io;

use ndarray::{Array4, ArrayView4};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::layer::{LayerKind, Parameterized, WeightView, WeightViewMut};
use crate::tensor::FrameShape;

pub use io::GraphDocument;

/// Index of a node inside its graph
pub type NodeId = usize;

/// Name of the implicit input node
pub const INPUT_NODE_NAME: &str = "input";

/// One named layer and the nodes it reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKind,
    #[serde(default)]
    pub inputs: Vec<NodeId>,
}

/// What a model expects to be fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignature {
    /// A whole `(time, h, w, c)` clip at once
    Sequence { frame: FrameShape },
    /// One `(h, w, c)` frame per call, sequence length unbounded
    SingleFrame { frame: FrameShape },
}

impl InputSignature {
    pub fn frame_shape(&self) -> FrameShape {
        match self {
            InputSignature::Sequence { frame } | InputSignature::SingleFrame { frame } => *frame,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelGraph {
    nodes: Vec<Node>,
    shapes: Vec<FrameShape>,
    output: NodeId,
}

impl ModelGraph {
    /// Start a graph whose input frames have `input_shape`.
    pub fn builder(input_shape: FrameShape) -> GraphBuilder {
        GraphBuilder::new(input_shape)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Per-frame output shape of every node, indexed by [`NodeId`]
    pub fn shapes(&self) -> &[FrameShape] {
        &self.shapes
    }

    pub fn input_shape(&self) -> FrameShape {
        self.shapes[0]
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn output_shape(&self) -> FrameShape {
        self.shapes[self.output]
    }

    pub fn input_signature(&self) -> InputSignature {
        InputSignature::Sequence {
            frame: self.input_shape(),
        }
    }

    /// Run the whole graph over a `(time, h, w, c)` clip, returning the
    /// output node's `(time, h', w', c')` result.
    pub fn forward_sequence(&self, sequence: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.input_shape()
            .expect_sequence(INPUT_NODE_NAME, &sequence)?;
        let mut values: Vec<Array4<f32>> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let out = if node.inputs.is_empty() {
                node.kind.forward_sequence(&node.name, &[sequence.view()])?
            } else {
                let inputs: Vec<ArrayView4<f32>> =
                    node.inputs.iter().map(|&i| values[i].view()).collect();
                node.kind.forward_sequence(&node.name, &inputs)?
            };
            values.push(out);
        }
        values.truncate(self.output + 1);
        values
            .pop()
            .ok_or_else(|| StreamError::InvalidGraph("graph has no nodes".to_string()))
    }

    /// Learned tensors of every parameterized node, keyed by node name.
    pub fn layer_weights(&self) -> Vec<(&str, Vec<WeightView<'_>>)> {
        self.nodes
            .iter()
            .map(|node| (node.name.as_str(), node.kind.weights()))
            .filter(|(_, weights)| !weights.is_empty())
            .collect()
    }

    /// Mutable counterpart of [`ModelGraph::layer_weights`].
    pub fn layer_weights_mut(&mut self) -> Vec<(&str, Vec<WeightViewMut<'_>>)> {
        self.nodes
            .iter_mut()
            .map(|node| {
                let Node { name, kind, .. } = node;
                (name.as_str(), kind.weights_mut())
            })
            .filter(|(_, weights)| !weights.is_empty())
            .collect()
    }

    /// Rebuild from raw nodes, re-running every structural and shape check.
    pub(crate) fn from_nodes(input_shape: FrameShape, nodes: Vec<Node>, output: NodeId) -> Result<Self> {
        let mut iter = nodes.into_iter();
        match iter.next() {
            Some(first) if matches!(first.kind, LayerKind::Input) && first.inputs.is_empty() => {
                let mut builder = GraphBuilder::with_input_name(input_shape, first.name);
                for node in iter {
                    builder.layer(node.name, node.kind, &node.inputs)?;
                }
                builder.finish_at(output)
            }
            _ => Err(StreamError::InvalidGraph(
                "first node must be an input node without inputs".to_string(),
            )),
        }
    }
}

/// Incremental, validating constructor for [`ModelGraph`].
#[derive(Debug)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    shapes: Vec<FrameShape>,
    names: HashSet<String>,
}

impl GraphBuilder {
    pub fn new(input_shape: FrameShape) -> Self {
        Self::with_input_name(input_shape, INPUT_NODE_NAME.to_string())
    }

    fn with_input_name(input_shape: FrameShape, name: String) -> Self {
        let mut names = HashSet::new();
        names.insert(name.clone());
        Self {
            nodes: vec![Node {
                name,
                kind: LayerKind::Input,
                inputs: Vec::new(),
            }],
            shapes: vec![input_shape],
            names,
        }
    }

    /// Id of the input node
    pub fn input(&self) -> NodeId {
        0
    }

    /// Id of the most recently added node
    pub fn last(&self) -> NodeId {
        self.nodes.len() - 1
    }

    /// Append a layer reading from `inputs` (all already in the graph).
    pub fn layer(
        &mut self,
        name: impl Into<String>,
        kind: LayerKind,
        inputs: &[NodeId],
    ) -> Result<NodeId> {
        let name = name.into();
        if matches!(kind, LayerKind::Input) {
            return Err(StreamError::InvalidGraph(format!(
                "'{}': a graph has exactly one input node",
                name
            )));
        }
        if self.names.contains(&name) {
            return Err(StreamError::InvalidGraph(format!("duplicate layer name '{}'", name)));
        }
        let id = self.nodes.len();
        if let Some(&bad) = inputs.iter().find(|&&i| i >= id) {
            return Err(StreamError::InvalidGraph(format!(
                "layer '{}' reads node {} which is not defined before it",
                name, bad
            )));
        }
        kind.validate(&name)?;
        let in_shapes: Vec<FrameShape> = inputs.iter().map(|&i| self.shapes[i]).collect();
        let shape = kind.output_shape(&name, &in_shapes)?;
        debug!(
            layer = %name,
            kind = kind.type_name(),
            output_shape = %shape,
            "added layer to model graph"
        );

        self.names.insert(name.clone());
        self.nodes.push(Node {
            name,
            kind,
            inputs: inputs.to_vec(),
        });
        self.shapes.push(shape);
        Ok(id)
    }

    /// Append a layer reading from the most recently added node.
    pub fn then(&mut self, name: impl Into<String>, kind: LayerKind) -> Result<NodeId> {
        let previous = self.last();
        self.layer(name, kind, &[previous])
    }

    /// Finish with the last added node as output.
    pub fn finish(self) -> ModelGraph {
        let output = self.last();
        ModelGraph {
            nodes: self.nodes,
            shapes: self.shapes,
            output,
        }
    }

    /// Finish with an explicit output node.
    pub fn finish_at(self, output: NodeId) -> Result<ModelGraph> {
        if output >= self.nodes.len() {
            return Err(StreamError::InvalidGraph(format!(
                "output node {} does not exist ({} nodes)",
                output,
                self.nodes.len()
            )));
        }
        Ok(ModelGraph {
            nodes: self.nodes,
            shapes: self.shapes,
            output,
        })
    }
}
