// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Numerical operators shared by batch and streaming execution

pub mod frame;
pub mod spatial;
pub mod temporal;

pub use frame::{add_frames, global_avg_pool, Activation, BatchNorm, Dense, MaxPool2d};
pub use spatial::Conv2d;
pub use temporal::{Conv3d, TemporalPadding};
