// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Frame-local operators: normalization, activations, pooling, dense heads
//! and residual merges. None of these look across time.

use ndarray::{Array1, Array2, Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};
use crate::tensor::{FrameShape, SpatialGeometry};

/// Inference-mode batch normalization with frozen statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    moving_mean: Array1<f32>,
    moving_variance: Array1<f32>,
    epsilon: f32,
}

impl BatchNorm {
    pub fn new(
        gamma: Array1<f32>,
        beta: Array1<f32>,
        moving_mean: Array1<f32>,
        moving_variance: Array1<f32>,
        epsilon: f32,
    ) -> Result<Self> {
        let norm = Self {
            gamma,
            beta,
            moving_mean,
            moving_variance,
            epsilon,
        };
        norm.validate("batch_norm")?;
        Ok(norm)
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        let channels = self.gamma.len();
        for (name, len) in [
            ("beta", self.beta.len()),
            ("moving_mean", self.moving_mean.len()),
            ("moving_variance", self.moving_variance.len()),
        ] {
            if len != channels {
                return Err(StreamError::invalid_kernel(
                    layer,
                    format!("{} has {} entries, gamma has {}", name, len, channels),
                ));
            }
        }
        if self.epsilon.is_nan() || self.epsilon < 0.0 {
            return Err(StreamError::invalid_kernel(layer, "epsilon must be >= 0"));
        }
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub(crate) fn parameters(&self) -> [(&'static str, &Array1<f32>); 4] {
        [
            ("gamma", &self.gamma),
            ("beta", &self.beta),
            ("moving_mean", &self.moving_mean),
            ("moving_variance", &self.moving_variance),
        ]
    }

    pub(crate) fn parameters_mut(&mut self) -> [(&'static str, &mut Array1<f32>); 4] {
        [
            ("gamma", &mut self.gamma),
            ("beta", &mut self.beta),
            ("moving_mean", &mut self.moving_mean),
            ("moving_variance", &mut self.moving_variance),
        ]
    }

    pub fn output_shape(&self, layer: &str, input: FrameShape) -> Result<FrameShape> {
        if input.channels != self.channels() {
            return Err(StreamError::ShapeMismatch {
                context: layer.to_string(),
                expected: format!("{} channels", self.channels()),
                actual: input.to_string(),
            });
        }
        Ok(input)
    }

    pub fn forward_frame(&self, layer: &str, frame: ArrayView3<f32>) -> Result<Array3<f32>> {
        self.output_shape(layer, FrameShape::of(&frame))?;
        let scale: Array1<f32> = Zip::from(&self.gamma)
            .and(&self.moving_variance)
            .map_collect(|&g, &v| g / (v + self.epsilon).sqrt());
        let mut out = frame.to_owned();
        for mut pixel in out.lanes_mut(Axis(2)) {
            Zip::from(&mut pixel)
                .and(&scale)
                .and(&self.moving_mean)
                .and(&self.beta)
                .for_each(|x, &s, &m, &b| *x = (*x - m) * s + b);
        }
        Ok(out)
    }
}

/// Pointwise non-linearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Relu,
    /// ReLU clipped at 6
    Relu6,
}

impl Activation {
    /// NaN passes through unchanged (`f32::max` would replace it).
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => {
                if x < 0.0 {
                    0.0
                } else {
                    x
                }
            }
            Activation::Relu6 => {
                if x < 0.0 {
                    0.0
                } else if x > 6.0 {
                    6.0
                } else {
                    x
                }
            }
        }
    }

    pub fn forward_frame(&self, frame: ArrayView3<f32>) -> Array3<f32> {
        frame.mapv(|x| self.apply(x))
    }
}

/// Spatial max pooling over square windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub pool_size: usize,
    pub geometry: SpatialGeometry,
}

impl MaxPool2d {
    pub fn new(pool_size: usize, geometry: SpatialGeometry) -> Result<Self> {
        let pool = Self {
            pool_size,
            geometry,
        };
        pool.validate("max_pool2d")?;
        Ok(pool)
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StreamError::invalid_kernel(layer, "pool size must be >= 1"));
        }
        self.geometry.validate(layer)
    }

    pub fn output_shape(&self, layer: &str, input: FrameShape) -> Result<FrameShape> {
        self.geometry
            .output_shape(layer, input, (self.pool_size, self.pool_size), input.channels)
    }

    pub fn forward_frame(&self, layer: &str, frame: ArrayView3<f32>) -> Result<Array3<f32>> {
        let in_shape = FrameShape::of(&frame);
        let out_shape = self.output_shape(layer, in_shape)?;
        let pad_top = self.geometry.leading_pad(in_shape.height, self.pool_size) as isize;
        let pad_left = self.geometry.leading_pad(in_shape.width, self.pool_size) as isize;
        let stride = self.geometry.stride as isize;

        let mut out = Array3::<f32>::from_elem(out_shape.as_tuple(), f32::NEG_INFINITY);
        for ((oy, ox, c), value) in out.indexed_iter_mut() {
            for ky in 0..self.pool_size as isize {
                let iy = oy as isize * stride + ky - pad_top;
                if iy < 0 || iy >= in_shape.height as isize {
                    continue;
                }
                for kx in 0..self.pool_size as isize {
                    let ix = ox as isize * stride + kx - pad_left;
                    if ix < 0 || ix >= in_shape.width as isize {
                        continue;
                    }
                    let x = frame[[iy as usize, ix as usize, c]];
                    if x > *value || x.is_nan() {
                        *value = x;
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Mean over height and width, producing a `1x1xC` frame.
pub fn global_avg_pool(frame: ArrayView3<f32>) -> Array3<f32> {
    let (h, w, c) = frame.dim();
    let count = (h * w) as f32;
    let mut out = Array3::<f32>::zeros((1, 1, c));
    for pixel in frame.lanes(Axis(2)) {
        Zip::from(out.slice_mut(ndarray::s![0, 0, ..]))
            .and(&pixel)
            .for_each(|acc, &x| *acc += x);
    }
    out.mapv_inplace(|v| v / count);
    out
}

/// Fully connected head over the flattened frame (row-major `h, w, c`),
/// producing a `1x1xunits` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    kernel: Array2<f32>,
    bias: Option<Array1<f32>>,
}

impl Dense {
    /// `kernel` is `(in_features, units)`.
    pub fn new(kernel: Array2<f32>, bias: Option<Array1<f32>>) -> Result<Self> {
        let dense = Self { kernel, bias };
        dense.validate("dense")?;
        Ok(dense)
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        let (features, units) = self.kernel.dim();
        if features == 0 || units == 0 {
            return Err(StreamError::invalid_kernel(layer, "dense kernel must be non-empty"));
        }
        if let Some(bias) = &self.bias {
            if bias.len() != units {
                return Err(StreamError::invalid_kernel(
                    layer,
                    format!("bias has {} entries for {} units", bias.len(), units),
                ));
            }
        }
        Ok(())
    }

    pub fn units(&self) -> usize {
        self.kernel.len_of(Axis(1))
    }

    pub fn kernel(&self) -> &Array2<f32> {
        &self.kernel
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// Kernel and bias borrowed together for in-place rewriting.
    pub(crate) fn parts_mut(&mut self) -> (&mut Array2<f32>, Option<&mut Array1<f32>>) {
        (&mut self.kernel, self.bias.as_mut())
    }

    pub fn output_shape(&self, layer: &str, input: FrameShape) -> Result<FrameShape> {
        let features = self.kernel.len_of(Axis(0));
        if input.len() != features {
            return Err(StreamError::ShapeMismatch {
                context: layer.to_string(),
                expected: format!("{} input features", features),
                actual: format!("{} ({} features)", input, input.len()),
            });
        }
        Ok(FrameShape::new(1, 1, self.units()))
    }

    pub fn forward_frame(&self, layer: &str, frame: ArrayView3<f32>) -> Result<Array3<f32>> {
        let out_shape = self.output_shape(layer, FrameShape::of(&frame))?;
        let flat: Array1<f32> = frame.iter().copied().collect();
        let mut logits = flat.dot(&self.kernel);
        if let Some(bias) = &self.bias {
            logits += bias;
        }
        logits
            .into_shape_with_order(out_shape.as_tuple())
            .map_err(|e| StreamError::ShapeMismatch {
                context: layer.to_string(),
                expected: out_shape.to_string(),
                actual: e.to_string(),
            })
    }
}

/// Elementwise sum of two equally shaped frames.
pub fn add_frames(layer: &str, a: ArrayView3<f32>, b: ArrayView3<f32>) -> Result<Array3<f32>> {
    FrameShape::of(&a).expect_frame(layer, &b)?;
    Ok(&a + &b)
}
