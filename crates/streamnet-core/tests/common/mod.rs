// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities and helpers
#![allow(dead_code)]

use ndarray::{arr1, Array1, Array2, Array4, Array5};
use streamnet_core::{
    Activation, BatchNorm, Conv3d, Dense, FrameShape, LayerKind, ModelGraph, SpatialGeometry,
    TemporalPadding,
};

/// Deterministic pseudo-random values in `[-1, 1)`, no RNG dependency needed.
pub fn pattern(seed: u32, index: usize) -> f32 {
    let mut x = seed.wrapping_mul(0x9E37_79B9) ^ (index as u32).wrapping_mul(0x85EB_CA6B);
    x ^= x >> 15;
    x = x.wrapping_mul(0x2C1B_3C6D);
    x ^= x >> 12;
    (x % 2000) as f32 / 1000.0 - 1.0
}

/// A `(frames, h, w, c)` clip filled from [`pattern`].
pub fn clip(seed: u32, frames: usize, shape: FrameShape) -> Array4<f32> {
    let (h, w, c) = shape.as_tuple();
    let mut i = 0;
    Array4::from_shape_simple_fn((frames, h, w, c), || {
        i += 1;
        pattern(seed, i)
    })
}

pub fn kernel5(seed: u32, dims: (usize, usize, usize, usize, usize)) -> Array5<f32> {
    let mut i = 0;
    Array5::from_shape_simple_fn(dims, || {
        i += 1;
        pattern(seed, i) * 0.5
    })
}

pub fn vector(seed: u32, len: usize) -> Array1<f32> {
    Array1::from_shape_fn(len, |i| pattern(seed, i) * 0.1)
}

pub fn relu() -> LayerKind {
    LayerKind::Activation {
        activation: Activation::Relu,
    }
}

/// conv → BN → ReLU → depthwise temporal conv → residual add → pool → dense
pub fn residual_graph(classes: usize) -> ModelGraph {
    let input = FrameShape::new(5, 4, 2);
    let mut builder = ModelGraph::builder(input);
    builder
        .then(
            "stem",
            LayerKind::Conv3d(
                Conv3d::causal(kernel5(1, (2, 3, 3, 2, 4)), Some(vector(2, 4)), SpatialGeometry::default())
                    .unwrap(),
            ),
        )
        .unwrap();
    builder
        .then(
            "stem_bn",
            LayerKind::BatchNorm(
                BatchNorm::new(
                    arr1(&[1.0, 0.5, 2.0, 1.5]),
                    vector(3, 4),
                    vector(4, 4),
                    arr1(&[1.0, 0.25, 4.0, 2.0]),
                    1e-3,
                )
                .unwrap(),
            ),
        )
        .unwrap();
    let act = builder.then("stem_relu", relu()).unwrap();
    let temporal = builder
        .then(
            "temporal_dw",
            LayerKind::Conv3d(
                Conv3d::causal_depthwise(kernel5(5, (3, 3, 3, 1, 4)), Some(vector(6, 4)), SpatialGeometry::default())
                    .unwrap(),
            ),
        )
        .unwrap();
    builder.layer("residual", LayerKind::Add, &[act, temporal]).unwrap();
    builder
        .then(
            "pointwise",
            LayerKind::Conv3d(
                Conv3d::new(
                    kernel5(7, (1, 1, 1, 4, 4)),
                    None,
                    SpatialGeometry::default(),
                    TemporalPadding::Causal,
                )
                .unwrap(),
            ),
        )
        .unwrap();
    builder.then("pool", LayerKind::GlobalAvgPool).unwrap();
    builder
        .then(
            "classifier",
            LayerKind::Dense(
                Dense::new(
                    Array2::from_shape_fn((4, classes), |(i, j)| pattern(8, i * classes + j)),
                    Some(vector(9, classes)),
                )
                .unwrap(),
            ),
        )
        .unwrap();
    builder.finish()
}

/// Assert that two f32 values are approximately equal
pub fn assert_approx_eq(a: f32, b: f32, epsilon: f32) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} ≈ {}, but difference was {}",
        a,
        b,
        (a - b).abs()
    );
}
