// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Running class belief over a stream of per-frame scores
//!
//! ```text
//! belief_0 = softmax(scores_0)
//! belief_t = softmax(scores_t) + decay * belief_{t-1}
//! ```
//!
//! The belief is not renormalised, so its entries grow towards
//! `1 / (1 - decay)` on a steady stream. Only the argmax is meaningful as a
//! prediction.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Result, StreamError};

/// Decay factor used when none is configured
pub const REFERENCE_DECAY_FACTOR: f32 = 0.8;

/// Numerically stable softmax (the maximum is subtracted before exponentiating).
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; ties go to the lowest index.
///
/// A later entry only wins when it compares strictly greater, so unordered
/// (NaN) comparisons also keep the earlier index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v.partial_cmp(&b) != Some(Ordering::Greater) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregatorState {
    Accumulating,
    Finalized,
}

/// End-of-video result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_index: usize,
    pub belief: Vec<f32>,
    pub frames: u64,
}

/// Exponentially decayed belief for one in-flight video.
#[derive(Debug, Clone)]
pub struct StreamingAggregator {
    decay: f32,
    belief: Option<Vec<f32>>,
    frames: u64,
    state: AggregatorState,
}

impl StreamingAggregator {
    /// `decay` must lie in `[0, 1)`.
    pub fn new(decay: f32) -> Result<Self> {
        if decay.is_nan() || !(0.0..1.0).contains(&decay) {
            return Err(StreamError::InvalidConfig(format!(
                "decay factor must be in [0, 1), got {}",
                decay
            )));
        }
        Ok(Self {
            decay,
            belief: None,
            frames: 0,
            state: AggregatorState::Accumulating,
        })
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    /// Current belief, `None` before the first frame.
    pub fn belief(&self) -> Option<&[f32]> {
        self.belief.as_deref()
    }

    pub fn predicted_class(&self) -> Option<usize> {
        self.belief.as_deref().and_then(argmax)
    }

    /// Fold in one frame of raw class scores (logits).
    pub fn push_scores(&mut self, scores: &[f32]) -> Result<&[f32]> {
        self.push_probabilities(&softmax(scores))
    }

    /// Fold in one frame of class probabilities, for models whose last layer
    /// already applies a softmax.
    pub fn push_probabilities(&mut self, probabilities: &[f32]) -> Result<&[f32]> {
        if self.state == AggregatorState::Finalized {
            return Err(StreamError::SequenceFinalized { frames: self.frames });
        }
        if probabilities.is_empty() {
            return Err(StreamError::ShapeMismatch {
                context: "aggregator".to_string(),
                expected: "at least one class".to_string(),
                actual: "0 classes".to_string(),
            });
        }
        let decay = self.decay;
        let belief = match self.belief.take() {
            None => probabilities.to_vec(),
            Some(previous) => {
                if previous.len() != probabilities.len() {
                    let expected = previous.len();
                    self.belief = Some(previous);
                    return Err(StreamError::ShapeMismatch {
                        context: "aggregator".to_string(),
                        expected: format!("{} classes", expected),
                        actual: format!("{} classes", probabilities.len()),
                    });
                }
                probabilities
                    .iter()
                    .zip(previous.iter())
                    .map(|(&p, &b)| p + decay * b)
                    .collect()
            }
        };
        self.frames += 1;
        trace!(frame = self.frames, "belief updated");
        Ok(self.belief.insert(belief).as_slice())
    }

    /// Close the current video. Returns `None` if no frame was pushed.
    pub fn finalize(&mut self) -> Option<Prediction> {
        self.state = AggregatorState::Finalized;
        let belief = self.belief.clone()?;
        let class_index = argmax(&belief)?;
        debug!(class_index, frames = self.frames, "sequence finalized");
        Some(Prediction {
            class_index,
            belief,
            frames: self.frames,
        })
    }

    /// Forget the current video and accept a new one.
    pub fn reset(&mut self) {
        self.belief = None;
        self.frames = 0;
        self.state = AggregatorState::Accumulating;
    }
}

impl Default for StreamingAggregator {
    fn default() -> Self {
        Self {
            decay: REFERENCE_DECAY_FACTOR,
            belief: None,
            frames: 0,
            state: AggregatorState::Accumulating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_decayed_belief_sequence() {
        let mut agg = StreamingAggregator::new(0.8).unwrap();
        assert_close(agg.push_probabilities(&[0.9, 0.1]).unwrap(), &[0.9, 0.1]);
        assert_eq!(agg.predicted_class(), Some(0));
        assert_close(agg.push_probabilities(&[0.2, 0.8]).unwrap(), &[0.92, 0.88]);
        assert_eq!(agg.predicted_class(), Some(0));
        assert_close(agg.push_probabilities(&[0.1, 0.9]).unwrap(), &[0.836, 1.604]);
        assert_eq!(agg.predicted_class(), Some(1));
        assert_eq!(agg.frames_seen(), 3);
    }

    #[test]
    fn test_scores_go_through_softmax() {
        let mut agg = StreamingAggregator::new(0.8).unwrap();
        let logits = [0.9f32.ln(), 0.1f32.ln()];
        assert_close(agg.push_scores(&logits).unwrap(), &[0.9, 0.1]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_scores() {
        let p = softmax(&[1000.0, 1000.0]);
        assert_close(&p, &[0.5, 0.5]);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[0.5, 0.5, 0.1]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_nan_belief_keeps_lowest_index() {
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), Some(0));
        assert_eq!(argmax(&[0.2, f32::NAN, 0.1]), Some(0));

        let mut agg = StreamingAggregator::new(0.8).unwrap();
        agg.push_scores(&[f32::NAN, 1.0]).unwrap();
        agg.push_scores(&[2.0, -2.0]).unwrap();
        assert!(agg.belief().unwrap().iter().all(|b| b.is_nan()));
        assert_eq!(agg.predicted_class(), Some(0));
    }

    #[test]
    fn test_decay_range_checked() {
        assert!(StreamingAggregator::new(0.0).is_ok());
        for bad in [1.0, -0.1, f32::NAN] {
            assert!(matches!(
                StreamingAggregator::new(bad),
                Err(StreamError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_finalize_blocks_pushes_until_reset() {
        let mut agg = StreamingAggregator::default();
        assert!(agg.finalize().is_none());
        agg.reset();

        agg.push_probabilities(&[0.3, 0.7]).unwrap();
        let prediction = agg.finalize().unwrap();
        assert_eq!(prediction.class_index, 1);
        assert_eq!(prediction.frames, 1);
        assert_eq!(agg.state(), AggregatorState::Finalized);
        assert!(matches!(
            agg.push_probabilities(&[0.3, 0.7]),
            Err(StreamError::SequenceFinalized { frames: 1 })
        ));

        agg.reset();
        agg.reset();
        assert_eq!(agg.belief(), None);
        assert_eq!(agg.frames_seen(), 0);
        assert_eq!(agg.state(), AggregatorState::Accumulating);
    }

    #[test]
    fn test_class_count_mismatch_keeps_belief() {
        let mut agg = StreamingAggregator::default();
        agg.push_probabilities(&[0.5, 0.5]).unwrap();
        assert!(matches!(
            agg.push_probabilities(&[1.0]),
            Err(StreamError::ShapeMismatch { .. })
        ));
        assert_eq!(agg.belief(), Some(&[0.5, 0.5][..]));
        assert_eq!(agg.frames_seen(), 1);
    }
}
