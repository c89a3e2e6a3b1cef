// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Seams for the tools that surround streaming inference
//!
//! Training, quantization and hardware export live outside this crate. They
//! reach model weights through [`ParameterStore`], which batch graphs and
//! converted streaming models implement identically, so a quantizer written
//! against one works unchanged on the other.

use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::convert::StreamingModel;
use crate::error::{Result, StreamError};
use crate::graph::ModelGraph;
use crate::layer::{WeightView, WeightViewMut};
use crate::session::{run_sequences_parallel, StreamingSession};

/// Named weight tensors of a whole model, grouped by layer.
pub trait ParameterStore {
    fn parameters(&self) -> Vec<(&str, Vec<WeightView<'_>>)>;

    fn parameters_mut(&mut self) -> Vec<(&str, Vec<WeightViewMut<'_>>)>;

    fn parameter_count(&self) -> usize {
        self.parameters()
            .iter()
            .flat_map(|(_, weights)| weights.iter())
            .map(|w| w.tensor.len())
            .sum()
    }
}

impl ParameterStore for ModelGraph {
    fn parameters(&self) -> Vec<(&str, Vec<WeightView<'_>>)> {
        self.layer_weights()
    }

    fn parameters_mut(&mut self) -> Vec<(&str, Vec<WeightViewMut<'_>>)> {
        self.layer_weights_mut()
    }
}

impl ParameterStore for StreamingModel {
    fn parameters(&self) -> Vec<(&str, Vec<WeightView<'_>>)> {
        self.layer_weights()
    }

    fn parameters_mut(&mut self) -> Vec<(&str, Vec<WeightViewMut<'_>>)> {
        self.layer_weights_mut()
    }
}

/// Hyper-parameters handed to a [`Trainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSchedule {
    pub learning_rate: f32,
    pub steps: usize,
    pub epochs: usize,
    /// Frames per training clip
    pub sequence_length: usize,
}

impl TrainingSchedule {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(StreamError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.steps == 0 || self.epochs == 0 || self.sequence_length == 0 {
            return Err(StreamError::InvalidConfig(
                "steps, epochs and sequence_length must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trains the batch graph in place.
pub trait Trainer {
    fn compile(&mut self, model: &mut ModelGraph, schedule: &TrainingSchedule) -> Result<()>;
}

/// Named scalar results of an evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics(BTreeMap<String, f64>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// One labelled clip.
#[derive(Debug, Clone)]
pub struct LabeledSequence {
    pub frames: Array4<f32>,
    pub label: usize,
}

pub trait Evaluator {
    fn evaluate(&self, model: &ModelGraph, dataset: &[LabeledSequence]) -> Result<Metrics>;
}

/// Converts the graph and scores end-of-video predictions of the streaming
/// pipeline, reporting `accuracy`, `sequences` and `failed`.
#[derive(Debug, Clone)]
pub struct StreamingAccuracy {
    pub decay: f32,
    pub max_parallel: usize,
}

impl Evaluator for StreamingAccuracy {
    fn evaluate(&self, model: &ModelGraph, dataset: &[LabeledSequence]) -> Result<Metrics> {
        let session = StreamingSession::new(StreamingModel::convert(model)?, self.decay)?;
        let clips: Vec<Array4<f32>> = dataset.iter().map(|s| s.frames.clone()).collect();
        let outcomes = run_sequences_parallel(&session, &clips, self.max_parallel)?;

        let mut correct = 0usize;
        let mut failed = 0usize;
        for (sample, outcome) in dataset.iter().zip(&outcomes) {
            match outcome {
                Ok(outcome) => {
                    if outcome.prediction.as_ref().map(|p| p.class_index) == Some(sample.label) {
                        correct += 1;
                    }
                }
                Err(_) => failed += 1,
            }
        }

        let mut metrics = Metrics::new();
        let accuracy = if dataset.is_empty() {
            0.0
        } else {
            correct as f64 / dataset.len() as f64
        };
        metrics.insert("accuracy", accuracy);
        metrics.insert("sequences", dataset.len() as f64);
        metrics.insert("failed", failed as f64);
        info!(accuracy, sequences = dataset.len(), failed, "streaming evaluation complete");
        Ok(metrics)
    }
}

/// Settings handed to a [`Quantizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationParams {
    pub bits: u8,
    #[serde(default = "default_symmetric")]
    pub symmetric: bool,
    #[serde(default)]
    pub per_channel: bool,
}

fn default_symmetric() -> bool {
    true
}

impl Default for QuantizationParams {
    fn default() -> Self {
        Self {
            bits: 8,
            symmetric: true,
            per_channel: false,
        }
    }
}

/// Rewrites or exports model weights at reduced precision.
///
/// `calibration` holds representative clips for activation ranges.
pub trait Quantizer {
    type Output;

    fn quantize(
        &self,
        model: &mut dyn ParameterStore,
        params: &QuantizationParams,
        calibration: &[Array4<f32>],
    ) -> Result<Self::Output>;
}

/// Turns a quantizer's output into a deployable artifact.
pub trait HardwareConverter<Q> {
    type Artifact;

    fn convert(&self, quantized: &Q) -> Result<Self::Artifact>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerKind;
    use crate::ops::{Conv3d, Dense};
    use crate::tensor::{FrameShape, SpatialGeometry};
    use ndarray::{arr1, arr2, Array5};

    fn graph() -> ModelGraph {
        let mut builder = ModelGraph::builder(FrameShape::new(1, 1, 1));
        builder
            .then(
                "temporal",
                LayerKind::Conv3d(
                    Conv3d::causal(
                        Array5::from_elem((3, 1, 1, 1, 1), 1.0),
                        Some(arr1(&[0.0])),
                        SpatialGeometry::default(),
                    )
                    .unwrap(),
                ),
            )
            .unwrap();
        builder
            .then("head", LayerKind::Dense(Dense::new(arr2(&[[1.0, -1.0]]), None).unwrap()))
            .unwrap();
        builder.finish()
    }

    #[test]
    fn test_parameter_count_matches_across_forms() {
        let graph = graph();
        let streaming = StreamingModel::convert(&graph).unwrap();
        assert_eq!(graph.parameter_count(), 3 + 1 + 2);
        assert_eq!(streaming.parameter_count(), graph.parameter_count());
    }

    #[test]
    fn test_schedule_validation() {
        let good = TrainingSchedule {
            learning_rate: 1e-3,
            steps: 10,
            epochs: 2,
            sequence_length: 8,
        };
        assert!(good.validate().is_ok());
        let bad = TrainingSchedule { epochs: 0, ..good.clone() };
        assert!(bad.validate().is_err());
        let bad = TrainingSchedule { learning_rate: f32::NAN, ..good };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_streaming_accuracy() {
        let dataset = vec![
            LabeledSequence {
                frames: Array4::from_elem((4, 1, 1, 1), 1.0),
                label: 0,
            },
            LabeledSequence {
                frames: Array4::from_elem((4, 1, 1, 1), -1.0),
                label: 1,
            },
            LabeledSequence {
                frames: Array4::from_elem((4, 1, 1, 1), -1.0),
                label: 0,
            },
        ];
        let evaluator = StreamingAccuracy {
            decay: 0.8,
            max_parallel: 2,
        };
        let metrics = evaluator.evaluate(&graph(), &dataset).unwrap();
        assert!((metrics.get("accuracy").unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics.get("failed"), Some(0.0));
    }
}
