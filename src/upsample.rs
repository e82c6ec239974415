//! Sub-pixel convolution upsampler.
//!
//! A convolution produces `Cout * r^2` channels at the input resolution;
//! pixel shuffle then moves channel `c*r^2 + i*r + j` to output channel `c`
//! at sub-pixel offset (i, j) of the r x r block.

use crate::conv::{Conv2d, Conv2dConfig, Kernel};
use crate::error::{CodecError, Result};
use crate::quant::QuantPolicy;
use crate::scalar::Scalar;
use crate::tensor::{Shape4, Tensor4D};

/// Rearrange (N, C*r^2, H, W) into (N, C, H*r, W*r).
pub fn pixel_shuffle<T: Scalar>(input: &Tensor4D<T>, r: usize) -> Result<Tensor4D<T>> {
    if r == 0 {
        return Err(CodecError::config("upsample factor must be > 0"));
    }
    let s = input.shape();
    let rr = squared_factor(r)?;
    if s.c % rr != 0 {
        return Err(CodecError::config(format!(
            "pixel shuffle needs channels divisible by {} (r={}), got {}",
            rr, r, s.c
        )));
    }

    let out_shape = Shape4::new(s.n, s.c / rr, s.h * r, s.w * r);
    let mut out = vec![T::default(); out_shape.numel()];

    for n in 0..s.n {
        for c in 0..out_shape.c {
            for i in 0..r {
                for j in 0..r {
                    let plane = input.plane(n, c * rr + i * r + j);
                    for y in 0..s.h {
                        for x in 0..s.w {
                            out[out_shape.offset(n, c, y * r + i, x * r + j)] = plane[y * s.w + x];
                        }
                    }
                }
            }
        }
    }

    Tensor4D::new(out_shape, out)
}

fn squared_factor(r: usize) -> Result<usize> {
    r.checked_mul(r)
        .ok_or_else(|| CodecError::config(format!("upsample factor {} overflows", r)))
}

/// Convolution followed by pixel shuffle.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsampler<T> {
    conv: Conv2d<T>,
    factor: usize,
}

impl<T: Scalar> Upsampler<T> {
    /// The kernel's output channels must be divisible by `factor^2`.
    pub fn new(kernel: Kernel<T>, factor: usize, policy: QuantPolicy) -> Result<Self> {
        if factor == 0 {
            return Err(CodecError::config("upsample factor must be > 0"));
        }
        let out = kernel.config().out_channels;
        if out % squared_factor(factor)? != 0 {
            return Err(CodecError::config(format!(
                "upsampler conv produces {} channels, not divisible by {}^2",
                out, factor
            )));
        }
        Ok(Self {
            conv: Conv2d::new(kernel, policy),
            factor,
        })
    }

    /// Conv geometry of a 3x3 sub-pixel upsampler: padding 1, stride 1,
    /// `out_channels * r^2` conv outputs.
    pub fn subpel_conv3x3_config(in_channels: usize, out_channels: usize, r: usize) -> Conv2dConfig {
        Conv2dConfig::same(in_channels, out_channels * r * r, 3)
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn out_channels(&self) -> usize {
        self.conv.config().out_channels / (self.factor * self.factor)
    }

    pub fn forward(&self, input: &Tensor4D<T>) -> Result<Tensor4D<T>> {
        let expanded = self.conv.forward(input)?;
        pixel_shuffle(&expanded, self.factor)
    }
}
