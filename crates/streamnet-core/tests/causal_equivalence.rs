// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Streamed outputs must equal batch outputs at every step, exactly.

mod common;

use common::{clip, kernel5, residual_graph, vector};
use ndarray::{Array4, Axis};
use streamnet_core::{
    bufferize, BufferedConv3d, Bufferized, Conv3d, FrameShape, Padding, SpatialGeometry, StreamingModel,
    StreamingSession,
};

#[test]
fn test_buffered_layer_matches_batch_for_many_kernels() {
    let cases = [
        (1usize, 1usize, SpatialGeometry::default()),
        (2, 3, SpatialGeometry::default()),
        (3, 3, SpatialGeometry::new(2, Padding::Same)),
        (5, 2, SpatialGeometry::new(1, Padding::Valid)),
        (4, 1, SpatialGeometry::new(2, Padding::Valid)),
    ];
    let input = FrameShape::new(6, 5, 3);
    for (seed, (kt, ks, geometry)) in cases.into_iter().enumerate() {
        let seed = seed as u32 * 10;
        let conv = Conv3d::causal(kernel5(seed, (kt, ks, ks, 3, 2)), Some(vector(seed + 1, 2)), geometry)
            .unwrap();
        let sequence = clip(seed + 2, 9, input);
        let batch = conv.forward_sequence("conv", sequence.view()).unwrap();

        let mut layer = BufferedConv3d::new("conv", conv, input).unwrap();
        for (t, frame) in sequence.axis_iter(Axis(0)).enumerate() {
            let streamed = layer.step(frame).unwrap();
            assert_eq!(
                streamed,
                batch.index_axis(Axis(0), t),
                "kernel {}x{}x{} diverged at frame {}",
                kt,
                ks,
                ks,
                t
            );
        }
    }
}

#[test]
fn test_sequence_shorter_than_kernel() {
    let input = FrameShape::new(3, 3, 1);
    let conv = Conv3d::causal(kernel5(3, (6, 3, 3, 1, 1)), None, SpatialGeometry::default()).unwrap();
    let sequence = clip(4, 2, input);
    let batch = conv.forward_sequence("conv", sequence.view()).unwrap();
    let mut layer = BufferedConv3d::new("conv", conv, input).unwrap();
    for (t, frame) in sequence.axis_iter(Axis(0)).enumerate() {
        assert_eq!(layer.step(frame).unwrap(), batch.index_axis(Axis(0), t));
    }
}

#[test]
fn test_temporal_size_one_flattens_to_stateless_conv2d() {
    let input = FrameShape::new(4, 4, 2);
    let conv = Conv3d::causal(kernel5(11, (1, 3, 3, 2, 3)), Some(vector(12, 3)), SpatialGeometry::default())
        .unwrap();
    let conv2d = match bufferize("pointwise", &conv, input).unwrap() {
        Bufferized::Flattened(conv2d) => conv2d,
        Bufferized::Buffered(_) => panic!("temporal size 1 must not allocate a buffer"),
    };

    let sequence = clip(13, 5, input);
    let batch = conv.forward_sequence("pointwise", sequence.view()).unwrap();
    // Frames fed in reverse: no state, so order does not matter
    for t in (0..5).rev() {
        let out = conv2d
            .forward_frame("pointwise", sequence.index_axis(Axis(0), t))
            .unwrap();
        assert_eq!(out, batch.index_axis(Axis(0), t));
    }
}

#[test]
fn test_whole_graph_streams_exactly() {
    let graph = residual_graph(3);
    let sequence = clip(21, 12, graph.input_shape());
    let batch = graph.forward_sequence(sequence.view()).unwrap();
    assert_eq!(batch.dim(), (12, 1, 1, 3));

    let mut streaming = StreamingModel::convert(&graph).unwrap();
    assert_eq!(streaming.output_shape(), graph.output_shape());
    for (t, frame) in sequence.axis_iter(Axis(0)).enumerate() {
        let out = streaming.step(frame).unwrap();
        assert_eq!(out, batch.index_axis(Axis(0), t), "graph diverged at frame {}", t);
    }
}

#[test]
fn test_nan_frame_propagates_like_batch() {
    let graph = residual_graph(2);
    let mut sequence = clip(41, 10, graph.input_shape());
    sequence[[3, 2, 1, 0]] = f32::NAN;
    let batch = graph.forward_sequence(sequence.view()).unwrap();

    let mut streaming = StreamingModel::convert(&graph).unwrap();
    for (t, frame) in sequence.axis_iter(Axis(0)).enumerate() {
        let out = streaming.step(frame).unwrap();
        let expected = batch.index_axis(Axis(0), t);
        for (s, b) in out.iter().zip(expected.iter()) {
            assert_eq!(s.is_nan(), b.is_nan(), "NaN positions differ at frame {}", t);
            if !b.is_nan() {
                assert_eq!(s.to_bits(), b.to_bits(), "graph diverged at frame {}", t);
            }
        }
    }
    assert!(batch.index_axis(Axis(0), 2).iter().all(|v| v.is_finite()));
    assert!(batch.index_axis(Axis(0), 3).iter().any(|v| v.is_nan()));
    // Longest temporal reach is stem (2) + depthwise (3) - 1 frames
    assert!(batch.index_axis(Axis(0), 9).iter().all(|v| v.is_finite()));

    let mut session = StreamingSession::new(StreamingModel::convert(&graph).unwrap(), 0.8).unwrap();
    let outcome = session.run_sequence(sequence.view()).unwrap();
    assert!(outcome.frames[2].belief.iter().all(|b| b.is_finite()));
    let last = &outcome.frames[9];
    assert!(last.scores.iter().all(|s| s.is_finite()));
    assert!(last.belief.iter().all(|b| b.is_nan()));
    assert_eq!(outcome.prediction.unwrap().class_index, 0);
}

#[test]
fn test_reset_replays_first_sequence_exactly() {
    let graph = residual_graph(2);
    let a = clip(31, 7, graph.input_shape());
    let b = clip(32, 4, graph.input_shape());
    let mut streaming = StreamingModel::convert(&graph).unwrap();

    let run = |model: &mut StreamingModel, seq: &Array4<f32>| -> Vec<_> {
        seq.axis_iter(Axis(0)).map(|f| model.step(f).unwrap()).collect()
    };
    let first = run(&mut streaming, &a);
    streaming.reset();
    run(&mut streaming, &b);
    streaming.reset();
    assert_eq!(run(&mut streaming, &a), first);
}

#[test]
fn test_missing_reset_leaks_previous_frames() {
    let graph = residual_graph(2);
    let a = clip(41, 5, graph.input_shape());
    let mut streaming = StreamingModel::convert(&graph).unwrap();
    let first = streaming.step(a.index_axis(Axis(0), 0)).unwrap();
    for frame in a.axis_iter(Axis(0)).skip(1) {
        streaming.step(frame).unwrap();
    }
    // Without reset the buffers still hold the previous clip
    assert_ne!(streaming.step(a.index_axis(Axis(0), 0)).unwrap(), first);
}
