// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity frame FIFO
//!
//! Holds the `capacity` most recent frames of one layer's input. Storage is a
//! single `(capacity, h, w, c)` array used as a ring, which amounts to one
//! independent ring per `(row, column, channel)` coordinate, all advancing in
//! lockstep.
//!
//! The buffer starts out full of zero frames. That initial state plays the
//! role of the `capacity - 1` causal padding frames of whole-sequence mode, so
//! a buffer of capacity K reproduces a temporal kernel of size K exactly.

use ndarray::{Array4, ArrayView3, Axis};

use crate::error::{Result, StreamError};
use crate::tensor::FrameShape;

#[derive(Debug, Clone)]
pub struct FifoBuffer {
    slots: Array4<f32>,
    frame_shape: FrameShape,
    /// Slot holding the oldest frame, which the next push overwrites
    oldest: usize,
    pushes: u64,
}

impl FifoBuffer {
    /// Create a zero-filled buffer. Capacity must be at least 1.
    pub fn new(capacity: usize, frame_shape: FrameShape) -> Result<Self> {
        if capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "FIFO buffer capacity must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            slots: Array4::zeros((
                capacity,
                frame_shape.height,
                frame_shape.width,
                frame_shape.channels,
            )),
            frame_shape,
            oldest: 0,
            pushes: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len_of(Axis(0))
    }

    pub fn frame_shape(&self) -> FrameShape {
        self.frame_shape
    }

    /// Frames pushed since construction or the last [`FifoBuffer::reset`].
    pub fn pushes_since_reset(&self) -> u64 {
        self.pushes
    }

    /// Insert the newest frame, evicting the oldest.
    pub fn push(&mut self, frame: ArrayView3<f32>) -> Result<()> {
        self.frame_shape.expect_frame("fifo push", &frame)?;
        self.slots.index_axis_mut(Axis(0), self.oldest).assign(&frame);
        self.oldest = (self.oldest + 1) % self.capacity();
        self.pushes += 1;
        Ok(())
    }

    /// Frames from oldest to newest, without copying.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = ArrayView3<'_, f32>> + '_ {
        let capacity = self.capacity();
        (0..capacity).map(move |i| self.slots.index_axis(Axis(0), (self.oldest + i) % capacity))
    }

    /// Most recently pushed frame (a zero frame right after a reset).
    pub fn newest(&self) -> ArrayView3<'_, f32> {
        let capacity = self.capacity();
        self.slots.index_axis(Axis(0), (self.oldest + capacity - 1) % capacity)
    }

    /// Copy of the contents ordered oldest to newest, `(capacity, h, w, c)`.
    pub fn read(&self) -> Array4<f32> {
        let mut ordered = Array4::<f32>::zeros(self.slots.raw_dim());
        for (i, frame) in self.iter().enumerate() {
            ordered.index_axis_mut(Axis(0), i).assign(&frame);
        }
        ordered
    }

    /// Return to the all-zero state of a fresh buffer.
    pub fn reset(&mut self) {
        self.slots.fill(0.0);
        self.oldest = 0;
        self.pushes = 0;
    }
}
