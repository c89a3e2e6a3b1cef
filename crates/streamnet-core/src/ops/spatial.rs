// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Spatial (per-frame) convolution
//!
//! [`accumulate_window`] is the only arithmetic path for convolutions in this
//! crate. Batch temporal convolution, flattened 2D convolution and the
//! FIFO-buffered streaming adapter all call it with the same operand order,
//! so their outputs agree bit-for-bit.

use ndarray::{Array1, Array3, Array4, ArrayView3, ArrayView4};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};
use crate::tensor::{FrameShape, SpatialGeometry};

/// Allocate an output frame filled with the per-channel bias (or zeros).
pub(crate) fn biased_frame(shape: FrameShape, bias: Option<&Array1<f32>>) -> Array3<f32> {
    let mut out = Array3::<f32>::zeros(shape.as_tuple());
    if let Some(bias) = bias {
        for mut pixel in out.lanes_mut(ndarray::Axis(2)) {
            pixel.assign(bias);
        }
    }
    out
}

/// Add the spatial convolution of `frame` with `taps` into `out`.
///
/// `taps` is `(kh, kw, in_channels, out_channels)`. For depthwise kernels
/// `in_channels == 1` and output channel `c` reads input channel `c` only.
/// Positions outside the frame contribute nothing (implicit zero padding).
pub(crate) fn accumulate_window(
    frame: ArrayView3<f32>,
    taps: ArrayView4<f32>,
    geometry: SpatialGeometry,
    depthwise: bool,
    out: &mut Array3<f32>,
) {
    let (in_h, in_w, in_c) = frame.dim();
    let (kh, kw, _, out_c) = taps.dim();
    let (out_h, out_w, _) = out.dim();
    let pad_top = geometry.leading_pad(in_h, kh) as isize;
    let pad_left = geometry.leading_pad(in_w, kw) as isize;
    let stride = geometry.stride as isize;

    for oy in 0..out_h {
        for ox in 0..out_w {
            for ky in 0..kh {
                let iy = oy as isize * stride + ky as isize - pad_top;
                if iy < 0 || iy >= in_h as isize {
                    continue;
                }
                for kx in 0..kw {
                    let ix = ox as isize * stride + kx as isize - pad_left;
                    if ix < 0 || ix >= in_w as isize {
                        continue;
                    }
                    let (iy, ix) = (iy as usize, ix as usize);
                    if depthwise {
                        for c in 0..out_c {
                            out[[oy, ox, c]] += taps[[ky, kx, 0, c]] * frame[[iy, ix, c]];
                        }
                    } else {
                        for ci in 0..in_c {
                            let x = frame[[iy, ix, ci]];
                            for co in 0..out_c {
                                out[[oy, ox, co]] += taps[[ky, kx, ci, co]] * x;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Validate a `(kh, kw, in_channels, out_channels)` tap block and its bias.
pub(crate) fn validate_taps(
    layer: &str,
    taps: (usize, usize, usize, usize),
    bias: Option<&Array1<f32>>,
    depthwise: bool,
) -> Result<()> {
    let (kh, kw, in_c, out_c) = taps;
    if kh == 0 || kw == 0 || in_c == 0 || out_c == 0 {
        return Err(StreamError::invalid_kernel(
            layer,
            format!("kernel dimensions must be non-zero, got {}x{}x{}x{}", kh, kw, in_c, out_c),
        ));
    }
    if depthwise && in_c != 1 {
        return Err(StreamError::invalid_kernel(
            layer,
            format!("depthwise kernels take one input channel per filter, got {}", in_c),
        ));
    }
    if let Some(bias) = bias {
        if bias.len() != out_c {
            return Err(StreamError::invalid_kernel(
                layer,
                format!("bias has {} entries for {} output channels", bias.len(), out_c),
            ));
        }
    }
    Ok(())
}

/// Channels a kernel expects on its input.
pub(crate) fn expected_in_channels(in_c: usize, out_c: usize, depthwise: bool) -> usize {
    if depthwise {
        out_c
    } else {
        in_c
    }
}

/// 2D convolution applied independently to every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    kernel: Array4<f32>,
    bias: Option<Array1<f32>>,
    geometry: SpatialGeometry,
    #[serde(default)]
    depthwise: bool,
}

impl Conv2d {
    /// `kernel` is `(kh, kw, in_channels, out_channels)`.
    pub fn new(
        kernel: Array4<f32>,
        bias: Option<Array1<f32>>,
        geometry: SpatialGeometry,
    ) -> Result<Self> {
        let conv = Self {
            kernel,
            bias,
            geometry,
            depthwise: false,
        };
        conv.validate("conv2d")?;
        Ok(conv)
    }

    /// Depthwise variant: `kernel` is `(kh, kw, 1, channels)`.
    pub fn depthwise(
        kernel: Array4<f32>,
        bias: Option<Array1<f32>>,
        geometry: SpatialGeometry,
    ) -> Result<Self> {
        let conv = Self {
            kernel,
            bias,
            geometry,
            depthwise: true,
        };
        conv.validate("depthwise_conv2d")?;
        Ok(conv)
    }

    pub(crate) fn from_parts_unchecked(
        kernel: Array4<f32>,
        bias: Option<Array1<f32>>,
        geometry: SpatialGeometry,
        depthwise: bool,
    ) -> Self {
        Self {
            kernel,
            bias,
            geometry,
            depthwise,
        }
    }

    pub(crate) fn validate(&self, layer: &str) -> Result<()> {
        self.geometry.validate(layer)?;
        validate_taps(layer, self.kernel.dim(), self.bias.as_ref(), self.depthwise)
    }

    pub fn kernel(&self) -> &Array4<f32> {
        &self.kernel
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// Kernel and bias borrowed together for in-place rewriting.
    pub(crate) fn parts_mut(&mut self) -> (&mut Array4<f32>, Option<&mut Array1<f32>>) {
        (&mut self.kernel, self.bias.as_mut())
    }

    pub fn geometry(&self) -> SpatialGeometry {
        self.geometry
    }

    pub fn is_depthwise(&self) -> bool {
        self.depthwise
    }

    pub fn output_shape(&self, layer: &str, input: FrameShape) -> Result<FrameShape> {
        let (kh, kw, in_c, out_c) = self.kernel.dim();
        let expected = expected_in_channels(in_c, out_c, self.depthwise);
        if input.channels != expected {
            return Err(StreamError::ShapeMismatch {
                context: layer.to_string(),
                expected: format!("{} input channels", expected),
                actual: input.to_string(),
            });
        }
        self.geometry.output_shape(layer, input, (kh, kw), out_c)
    }

    pub fn forward_frame(&self, layer: &str, frame: ArrayView3<f32>) -> Result<Array3<f32>> {
        let out_shape = self.output_shape(layer, FrameShape::of(&frame))?;
        let mut out = biased_frame(out_shape, self.bias.as_ref());
        accumulate_window(frame, self.kernel.view(), self.geometry, self.depthwise, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Padding;
    use ndarray::{arr1, Array};

    #[test]
    fn test_identity_kernel_copies_frame() {
        let mut kernel = Array4::<f32>::zeros((3, 3, 2, 2));
        kernel[[1, 1, 0, 0]] = 1.0;
        kernel[[1, 1, 1, 1]] = 1.0;
        let conv = Conv2d::new(kernel, None, SpatialGeometry::default()).unwrap();

        let frame = Array::from_shape_fn((4, 4, 2), |(y, x, c)| (y * 8 + x * 2 + c) as f32);
        let out = conv.forward_frame("conv", frame.view()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_box_filter_with_zero_padding() {
        let kernel = Array4::<f32>::ones((3, 3, 1, 1));
        let conv = Conv2d::new(kernel, Some(arr1(&[0.5])), SpatialGeometry::default()).unwrap();
        let frame = Array3::<f32>::ones((3, 3, 1));
        let out = conv.forward_frame("conv", frame.view()).unwrap();
        // Corner sees 4 pixels, edge 6, centre 9
        assert_eq!(out[[0, 0, 0]], 4.5);
        assert_eq!(out[[0, 1, 0]], 6.5);
        assert_eq!(out[[1, 1, 0]], 9.5);
    }

    #[test]
    fn test_valid_strided_output_shape() {
        let kernel = Array4::<f32>::ones((2, 2, 3, 4));
        let conv = Conv2d::new(kernel, None, SpatialGeometry::new(2, Padding::Valid)).unwrap();
        let shape = conv.output_shape("conv", FrameShape::new(6, 5, 3)).unwrap();
        assert_eq!(shape, FrameShape::new(3, 2, 4));
    }

    #[test]
    fn test_depthwise_keeps_channels_separate() {
        let mut kernel = Array4::<f32>::zeros((1, 1, 1, 2));
        kernel[[0, 0, 0, 0]] = 2.0;
        kernel[[0, 0, 0, 1]] = -1.0;
        let conv = Conv2d::depthwise(kernel, None, SpatialGeometry::default()).unwrap();
        let frame = Array::from_shape_vec((1, 1, 2), vec![3.0, 5.0]).unwrap();
        let out = conv.forward_frame("dw", frame.view()).unwrap();
        assert_eq!(out.as_slice().unwrap(), &[6.0, -5.0]);
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let conv = Conv2d::new(Array4::<f32>::ones((1, 1, 3, 1)), None, SpatialGeometry::default())
            .unwrap();
        let frame = Array3::<f32>::zeros((2, 2, 2));
        assert!(matches!(
            conv.forward_frame("conv", frame.view()),
            Err(StreamError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_bias_length_checked() {
        let result = Conv2d::new(
            Array4::<f32>::ones((1, 1, 1, 2)),
            Some(arr1(&[1.0, 2.0, 3.0])),
            SpatialGeometry::default(),
        );
        assert!(matches!(result, Err(StreamError::InvalidKernel { .. })));
    }
}
