// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # StreamNet Core
//!
//! Frame-by-frame inference for networks trained on whole video clips.
//!
//! A trained [`ModelGraph`] runs causal 3D convolutions over `(time, h, w, c)`
//! sequences. [`StreamingModel::convert`] turns every causal temporal
//! convolution into a [`BufferedConv3d`] that keeps the last `K` frames in a
//! zero-initialised [`FifoBuffer`], so the converted graph accepts one frame
//! per call and reproduces the batch outputs exactly. A
//! [`StreamingAggregator`] folds per-frame class scores into a decayed running
//! belief.
//!
//! ```text
//! ModelGraph ──convert──▶ StreamingModel ──step(frame)──▶ scores ──▶ StreamingAggregator
//! ```
//!
//! ## Example
//!
//! ```
//! use ndarray::{Array4, Array5, Axis};
//! use streamnet_core::{Conv3d, FrameShape, LayerKind, ModelGraph, SpatialGeometry, StreamingModel};
//!
//! let mut builder = ModelGraph::builder(FrameShape::new(1, 1, 1));
//! let conv = Conv3d::causal(Array5::from_elem((3, 1, 1, 1, 1), 1.0), None, SpatialGeometry::default())?;
//! builder.then("temporal", LayerKind::Conv3d(conv))?;
//! let graph = builder.finish();
//!
//! let clip = Array4::from_elem((5, 1, 1, 1), 1.0);
//! let batch = graph.forward_sequence(clip.view())?;
//!
//! let mut streaming = StreamingModel::convert(&graph)?;
//! for (t, frame) in clip.axis_iter(Axis(0)).enumerate() {
//!     assert_eq!(streaming.step(frame)?, batch.index_axis(Axis(0), t));
//! }
//! # Ok::<(), streamnet_core::StreamError>(())
//! ```

pub mod aggregator;
pub mod buffered;
pub mod collaborators;
pub mod convert;
pub mod error;
pub mod fifo;
pub mod graph;
pub mod layer;
pub mod ops;
pub mod session;
pub mod tensor;

pub use aggregator::{softmax, AggregatorState, Prediction, StreamingAggregator, REFERENCE_DECAY_FACTOR};
pub use buffered::{bufferize, BufferedConv3d, Bufferized};
pub use convert::{conversion_rule, ConversionReport, ConversionRule, StreamingModel, StreamingOp};
pub use error::{Result, StreamError};
pub use fifo::FifoBuffer;
pub use graph::{GraphBuilder, GraphDocument, InputSignature, ModelGraph, Node, NodeId};
pub use layer::{LayerKind, Parameterized, WeightView, WeightViewMut};
pub use ops::{Activation, BatchNorm, Conv2d, Conv3d, Dense, MaxPool2d, TemporalPadding};
pub use session::{run_sequences_parallel, FrameEstimate, SequenceOutcome, StreamingSession};
pub use tensor::{FrameShape, Padding, SpatialGeometry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
