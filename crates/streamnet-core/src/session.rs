// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! One converted model plus one aggregator, i.e. the full per-video pipeline.
//!
//! A session owns all per-sequence state. Concurrent sequences each get their
//! own clone, so nothing mutable is shared between them.

use ndarray::{Array4, ArrayView3, ArrayView4, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregator::{AggregatorState, Prediction, StreamingAggregator};
use crate::convert::StreamingModel;
use crate::error::{Result, StreamError};

/// Per-frame output of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEstimate {
    pub frame_index: u64,
    /// Raw output of the model for this frame, flattened
    pub scores: Vec<f32>,
    pub belief: Vec<f32>,
    pub predicted_class: usize,
}

/// Result of running one whole sequence through a fresh session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceOutcome {
    pub frames: Vec<FrameEstimate>,
    pub prediction: Option<Prediction>,
}

#[derive(Debug, Clone)]
pub struct StreamingSession {
    model: StreamingModel,
    aggregator: StreamingAggregator,
    probability_outputs: bool,
}

impl StreamingSession {
    pub fn new(model: StreamingModel, decay: f32) -> Result<Self> {
        let aggregator = StreamingAggregator::new(decay)?;
        Ok(Self {
            model,
            aggregator,
            probability_outputs: false,
        })
    }

    /// Treat model outputs as probabilities (the model ends in a softmax)
    /// instead of raw scores.
    pub fn with_probability_outputs(mut self, enabled: bool) -> Self {
        self.probability_outputs = enabled;
        self
    }

    pub fn model(&self) -> &StreamingModel {
        &self.model
    }

    pub fn aggregator(&self) -> &StreamingAggregator {
        &self.aggregator
    }

    /// Run one frame through the model and fold its scores into the belief.
    ///
    /// After [`finish`](Self::finish) the frame is rejected before it reaches
    /// any buffer.
    pub fn push_frame(&mut self, frame: ArrayView3<f32>) -> Result<FrameEstimate> {
        if self.aggregator.state() == AggregatorState::Finalized {
            return Err(StreamError::SequenceFinalized {
                frames: self.aggregator.frames_seen(),
            });
        }
        let output = self.model.step(frame)?;
        let scores: Vec<f32> = output.iter().copied().collect();
        let belief = if self.probability_outputs {
            self.aggregator.push_probabilities(&scores)?
        } else {
            self.aggregator.push_scores(&scores)?
        }
        .to_vec();
        let predicted_class = self.aggregator.predicted_class().ok_or_else(|| {
            StreamError::InvalidGraph("model produced an empty score vector".to_string())
        })?;
        Ok(FrameEstimate {
            frame_index: self.aggregator.frames_seen() - 1,
            scores,
            belief,
            predicted_class,
        })
    }

    /// End the current video and return its prediction.
    pub fn finish(&mut self) -> Option<Prediction> {
        self.aggregator.finalize()
    }

    /// Clear model buffers and belief so an unrelated video can start.
    pub fn reset(&mut self) {
        self.model.reset();
        self.aggregator.reset();
    }

    /// Reset, stream every frame of `sequence`, then finish.
    pub fn run_sequence(&mut self, sequence: ArrayView4<f32>) -> Result<SequenceOutcome> {
        self.reset();
        let frames = sequence
            .axis_iter(Axis(0))
            .map(|frame| self.push_frame(frame))
            .collect::<Result<Vec<_>>>()?;
        let prediction = self.finish();
        debug!(
            frames = frames.len(),
            class = prediction.as_ref().map(|p| p.class_index),
            "sequence complete"
        );
        Ok(SequenceOutcome { frames, prediction })
    }
}

/// Stream several videos concurrently, each through its own clone of
/// `template`.
///
/// `max_parallel == 0` uses rayon's global pool; otherwise a dedicated pool of
/// that many threads is built. Results keep the order of `sequences`, and one
/// failing sequence does not affect the others.
pub fn run_sequences_parallel(
    template: &StreamingSession,
    sequences: &[Array4<f32>],
    max_parallel: usize,
) -> Result<Vec<Result<SequenceOutcome>>> {
    let run = || -> Vec<Result<SequenceOutcome>> {
        sequences
            .par_iter()
            .map(|sequence| {
                let mut session = template.clone();
                session.run_sequence(sequence.view())
            })
            .collect()
    };

    let results = if max_parallel == 0 {
        run()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_parallel)
            .thread_name(|i| format!("streamnet-seq-{}", i))
            .build()
            .map_err(|e| StreamError::ThreadPool(e.to_string()))?;
        pool.install(run)
    };

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!(failed, total = sequences.len(), "some sequences failed");
    }
    info!(sequences = sequences.len(), max_parallel, "parallel streaming run complete");
    Ok(results)
}
