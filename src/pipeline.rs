// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration → converted model → streaming session

use ndarray::Array4;
use tracing::info;

use streamnet_config::{validate_config, ConfigError, StreamnetConfig};
use streamnet_core::{
    run_sequences_parallel, ModelGraph, SequenceOutcome, StreamError, StreamingModel, StreamingSession,
};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("No model configured: set runtime.model_path or STREAMNET_MODEL_PATH")]
    MissingModel,
}

/// A ready-to-stream session plus the parallelism used for batches of videos.
#[derive(Debug, Clone)]
pub struct Pipeline {
    session: StreamingSession,
    max_parallel: usize,
}

impl Pipeline {
    /// Validate `config`, load the graph at `runtime.model_path` and convert it.
    pub fn from_config(config: &StreamnetConfig) -> Result<Self, PipelineError> {
        validate_config(config)?;
        let path = config
            .runtime
            .model_path
            .as_deref()
            .ok_or(PipelineError::MissingModel)?;
        let graph = ModelGraph::load(path)?;
        Self::from_graph(&graph, config)
    }

    /// Convert an in-memory graph using the aggregator and runtime settings of `config`.
    pub fn from_graph(graph: &ModelGraph, config: &StreamnetConfig) -> Result<Self, PipelineError> {
        validate_config(config)?;
        let model = StreamingModel::convert(graph)?;
        let report = model.conversion_report().clone();
        let session = StreamingSession::new(model, config.aggregator.decay_factor)?
            .with_probability_outputs(!config.aggregator.apply_softmax);
        info!(
            bufferized = ?report.bufferized,
            flattened = ?report.flattened,
            decay = config.aggregator.decay_factor,
            "streaming pipeline ready"
        );
        Ok(Self {
            session,
            max_parallel: config.runtime.max_parallel_sequences,
        })
    }

    pub fn session(&self) -> &StreamingSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut StreamingSession {
        &mut self.session
    }

    /// Stream independent videos concurrently; results keep input order.
    pub fn run_batch(
        &self,
        sequences: &[Array4<f32>],
    ) -> Result<Vec<Result<SequenceOutcome, StreamError>>, PipelineError> {
        Ok(run_sequences_parallel(&self.session, sequences, self.max_parallel)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array5};
    use streamnet_core::{Conv3d, Dense, FrameShape, LayerKind, SpatialGeometry};

    fn graph() -> ModelGraph {
        let mut builder = ModelGraph::builder(FrameShape::new(1, 1, 1));
        builder
            .then(
                "temporal",
                LayerKind::Conv3d(
                    Conv3d::causal(Array5::from_elem((2, 1, 1, 1, 1), 1.0), None, SpatialGeometry::default())
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
    fn test_missing_model_path() {
        assert!(matches!(
            Pipeline::from_config(&StreamnetConfig::default()),
            Err(PipelineError::MissingModel)
        ));
    }

    #[test]
    fn test_invalid_decay_rejected_before_loading() {
        let mut config = StreamnetConfig::default();
        config.aggregator.decay_factor = 1.5;
        assert!(matches!(
            Pipeline::from_graph(&graph(), &config),
            Err(PipelineError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[test]
    fn test_loads_model_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        graph().save(&path).unwrap();

        let mut config = StreamnetConfig::default();
        config.runtime.model_path = Some(path);
        config.runtime.max_parallel_sequences = 2;
        let pipeline = Pipeline::from_config(&config).unwrap();

        let clips = vec![Array4::from_elem((3, 1, 1, 1), 1.0), Array4::from_elem((3, 1, 1, 1), -1.0)];
        let outcomes = pipeline.run_batch(&clips).unwrap();
        let classes: Vec<usize> = outcomes
            .into_iter()
            .map(|o| o.unwrap().prediction.unwrap().class_index)
            .collect();
        assert_eq!(classes, vec![0, 1]);
    }
}
