// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Independent videos must not see each other's frames or beliefs.

mod common;

use common::{clip, residual_graph};
use ndarray::{Array4, Axis};
use rayon::prelude::*;
use streamnet_core::{
    run_sequences_parallel, FifoBuffer, FrameShape, StreamingAggregator, StreamingModel, StreamingSession,
};

fn clips(count: u32, shape: FrameShape) -> Vec<Array4<f32>> {
    (0..count).map(|i| clip(100 + i, 6 + i as usize % 4, shape)).collect()
}

#[test]
fn test_concurrent_models_match_sequential_runs() {
    let graph = residual_graph(3);
    let template = StreamingModel::convert(&graph).unwrap();
    let inputs = clips(8, graph.input_shape());

    let concurrent: Vec<Vec<_>> = inputs
        .par_iter()
        .map(|seq| {
            let mut model = template.clone();
            seq.axis_iter(Axis(0)).map(|f| model.step(f).unwrap()).collect()
        })
        .collect();

    for (seq, streamed) in inputs.iter().zip(concurrent) {
        let batch = graph.forward_sequence(seq.view()).unwrap();
        for (t, out) in streamed.iter().enumerate() {
            assert_eq!(out, &batch.index_axis(Axis(0), t));
        }
    }
}

#[test]
fn test_parallel_sessions_are_isolated() {
    let graph = residual_graph(4);
    let template = StreamingSession::new(StreamingModel::convert(&graph).unwrap(), 0.8).unwrap();
    let inputs = clips(6, graph.input_shape());

    let parallel = run_sequences_parallel(&template, &inputs, 4).unwrap();
    let global_pool = run_sequences_parallel(&template, &inputs, 0).unwrap();
    for ((seq, a), b) in inputs.iter().zip(parallel).zip(global_pool) {
        let mut session = template.clone();
        let expected = session.run_sequence(seq.view()).unwrap();
        assert_eq!(a.unwrap(), expected);
        assert_eq!(b.unwrap(), expected);
    }
    // The template itself never consumed a frame
    assert_eq!(template.model().frames_seen(), 0);
    assert_eq!(template.aggregator().frames_seen(), 0);
}

#[test]
fn test_fifo_reset_is_idempotent() {
    let shape = FrameShape::new(2, 2, 1);
    let fresh = FifoBuffer::new(3, shape).unwrap();
    let mut fifo = fresh.clone();
    let data = clip(7, 4, shape);
    for frame in data.axis_iter(Axis(0)) {
        fifo.push(frame).unwrap();
    }
    fifo.reset();
    let once = fifo.read();
    fifo.reset();
    assert_eq!(fifo.read(), once);
    assert_eq!(once, fresh.read());
    assert_eq!(fifo.pushes_since_reset(), 0);
}

#[test]
fn test_fifo_holds_most_recent_frames_in_order() {
    let shape = FrameShape::new(1, 2, 2);
    let mut fifo = FifoBuffer::new(3, shape).unwrap();
    let data = clip(9, 7, shape);
    for (pushed, frame) in data.axis_iter(Axis(0)).enumerate() {
        fifo.push(frame).unwrap();
        let contents = fifo.read();
        assert_eq!(contents.len_of(Axis(0)), 3);
        let kept = (pushed + 1).min(3);
        for k in 0..kept {
            // Newest frame sits last
            assert_eq!(
                contents.index_axis(Axis(0), 2 - k),
                data.index_axis(Axis(0), pushed - k)
            );
        }
        for slot in 0..3 - kept {
            assert!(contents.index_axis(Axis(0), slot).iter().all(|&v| v == 0.0));
        }
    }
}

#[test]
fn test_aggregator_reset_is_idempotent() {
    let mut agg = StreamingAggregator::new(0.5).unwrap();
    agg.push_scores(&[1.0, 2.0, 3.0]).unwrap();
    agg.reset();
    agg.reset();
    assert!(agg.belief().is_none());
    let fresh = StreamingAggregator::new(0.5).unwrap().push_scores(&[0.0, 1.0, 0.0]).unwrap().to_vec();
    assert_eq!(agg.push_scores(&[0.0, 1.0, 0.0]).unwrap(), fresh.as_slice());
}
