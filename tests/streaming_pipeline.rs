// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End to end: TOML config → saved graph → streaming pipeline.

use std::fs;

use ndarray::{arr1, Array2, Array4, Array5, Axis};
use streamnet::config::load_config;
use streamnet::inference::{softmax, Activation, Conv3d, Dense, SpatialGeometry, StreamingAggregator};
use streamnet::prelude::*;

fn classifier() -> ModelGraph {
    let mut builder = ModelGraph::builder(FrameShape::new(3, 3, 1));
    builder
        .then(
            "motion",
            LayerKind::Conv3d(
                // Frame difference: x[t] - x[t-1]
                Conv3d::causal(
                    Array5::from_shape_vec((2, 1, 1, 1, 2), vec![-1.0, 1.0, 1.0, -1.0]).unwrap(),
                    None,
                    SpatialGeometry::default(),
                )
                .unwrap(),
            ),
        )
        .unwrap();
    builder
        .then(
            "rectify",
            LayerKind::Activation {
                activation: Activation::Relu,
            },
        )
        .unwrap();
    builder.then("pool", LayerKind::GlobalAvgPool).unwrap();
    builder
        .then(
            "head",
            LayerKind::Dense(Dense::new(Array2::eye(2), Some(arr1(&[0.0, 0.0]))).unwrap()),
        )
        .unwrap();
    builder.finish()
}

/// Brightening clips are class 0, darkening clips class 1.
fn ramp(frames: usize, step: f32) -> Array4<f32> {
    Array4::from_shape_fn((frames, 3, 3, 1), |(t, ..)| 5.0 + step * t as f32)
}

#[test]
fn test_config_file_drives_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("classifier.json");
    classifier().save(&model_path).unwrap();

    let config_path = dir.path().join("streamnet_configuration.toml");
    fs::write(
        &config_path,
        format!(
            "[aggregator]\ndecay_factor = 0.5\n\n[runtime]\nmodel_path = {:?}\nmax_parallel_sequences = 2\n",
            model_path.display().to_string()
        ),
    )
    .unwrap();

    let config = load_config(Some(&config_path), None).unwrap();
    assert_eq!(config.aggregator.decay_factor, 0.5);
    let pipeline = Pipeline::from_config(&config).unwrap();

    let clips = vec![ramp(6, 1.0), ramp(6, -1.0), ramp(4, 2.0)];
    let outcomes = pipeline.run_batch(&clips).unwrap();
    let classes: Vec<usize> = outcomes
        .iter()
        .map(|o| o.as_ref().unwrap().prediction.as_ref().unwrap().class_index)
        .collect();
    assert_eq!(classes, vec![0, 1, 0]);
}

#[test]
fn test_pipeline_matches_batch_scores_and_manual_aggregation() {
    let graph = classifier();
    let mut config = StreamnetConfig::default();
    config.aggregator.decay_factor = 0.8;
    let mut pipeline = Pipeline::from_graph(&graph, &config).unwrap();

    let clip = ramp(5, -0.5);
    let batch = graph.forward_sequence(clip.view()).unwrap();
    let mut reference = StreamingAggregator::new(0.8).unwrap();

    for (t, frame) in clip.axis_iter(Axis(0)).enumerate() {
        let estimate = pipeline.session_mut().push_frame(frame).unwrap();
        let scores: Vec<f32> = batch.index_axis(Axis(0), t).iter().copied().collect();
        assert_eq!(estimate.scores, scores);
        let expected = reference.push_probabilities(&softmax(&scores)).unwrap();
        assert_eq!(estimate.belief.as_slice(), expected);
    }
    let prediction = pipeline.session_mut().finish().unwrap();
    assert_eq!(prediction.frames, 5);
    assert_eq!(prediction.class_index, 1);
}
