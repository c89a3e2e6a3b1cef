// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! JSON persistence for trained graphs
//!
//! The on-disk form lists the input frame shape, the nodes in topological
//! order with their weights, and the output node. Loading rebuilds the graph
//! through [`super::GraphBuilder`], so a hand-edited or corrupted file fails
//! the same checks as code that builds the graph directly.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use super::{ModelGraph, Node, NodeId};
use crate::error::{Result, StreamError};
use crate::tensor::FrameShape;

/// Serialized form of a [`ModelGraph`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub input_shape: FrameShape,
    pub nodes: Vec<Node>,
    pub output: NodeId,
}

impl From<&ModelGraph> for GraphDocument {
    fn from(graph: &ModelGraph) -> Self {
        GraphDocument {
            input_shape: graph.input_shape(),
            nodes: graph.nodes.clone(),
            output: graph.output,
        }
    }
}

impl TryFrom<GraphDocument> for ModelGraph {
    type Error = StreamError;

    fn try_from(doc: GraphDocument) -> Result<Self> {
        ModelGraph::from_nodes(doc.input_shape, doc.nodes, doc.output)
    }
}

impl ModelGraph {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&GraphDocument::from(self))?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        ModelGraph::try_from(doc)
    }

    /// Write the graph (topology and weights) to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), nodes = self.nodes.len(), "saved model graph");
        Ok(())
    }

    /// Load and validate a graph previously written by [`ModelGraph::save`]
    /// or exported by a trainer in the same format.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let graph = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            nodes = graph.nodes.len(),
            input_shape = %graph.input_shape(),
            "loaded model graph"
        );
        Ok(graph)
    }
}
