//! 2D convolution engine.
//!
//! NCHW input, (Cout, Cin, kH, kW) weights, per-output-channel bias,
//! symmetric zero padding. Each output element is
//! `bias[o] + sum_{i,ky,kx} x[n, i, oy*s + ky - p, ox*s + kx - p] * w[o, i, ky, kx]`
//! accumulated in the domain's accumulator type.

use crate::error::{CodecError, Result};
use crate::quant::{quantize_at, QuantPoint, QuantPolicy};
use crate::scalar::Scalar;
use crate::tensor::{Shape4, Tensor4D};
use serde::{Deserialize, Serialize};

/// Declared shape and geometry of one convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    /// Square kernel side.
    pub kernel_size: usize,
    pub stride: usize,
    /// Zero padding on every side.
    pub padding: usize,
}

impl Conv2dConfig {
    /// Stride 1, no padding.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
        }
    }

    /// Stride 1 with `kernel_size / 2` padding, so odd kernels keep H and W.
    pub fn same(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::new(in_channels, out_channels, kernel_size).with_padding(kernel_size / 2)
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn weight_shape(&self) -> Shape4 {
        Shape4::new(
            self.out_channels,
            self.in_channels,
            self.kernel_size,
            self.kernel_size,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(CodecError::config(format!(
                "conv channels must be > 0 (in={}, out={})",
                self.in_channels, self.out_channels
            )));
        }
        if self.kernel_size == 0 {
            return Err(CodecError::config("conv kernel size must be > 0"));
        }
        if self.stride == 0 {
            return Err(CodecError::config("conv stride must be > 0"));
        }
        Ok(())
    }

    /// Output (H', W') for an (H, W) input.
    pub fn output_dims(&self, h: usize, w: usize) -> Result<(usize, usize)> {
        let oh = output_size(h, self.kernel_size, self.stride, self.padding)?;
        let ow = output_size(w, self.kernel_size, self.stride, self.padding)?;
        Ok((oh, ow))
    }
}

/// `floor((size + 2*padding - kernel) / stride) + 1`, rejecting
/// non-positive results.
pub fn output_size(size: usize, kernel: usize, stride: usize, padding: usize) -> Result<usize> {
    if stride == 0 {
        return Err(CodecError::config("conv stride must be > 0"));
    }
    let padded = padding
        .checked_mul(2)
        .and_then(|p| p.checked_add(size))
        .ok_or_else(|| CodecError::config(format!("conv padding {} overflows size {}", padding, size)))?;
    if size == 0 || kernel == 0 || padded < kernel {
        return Err(CodecError::config(format!(
            "non-positive conv output: size {} padding {} kernel {}",
            size, padding, kernel
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

/// Convolve `input` with `weight` (Cout, Cin, kH, kW) and an optional bias.
pub fn convolve<T: Scalar>(
    input: &Tensor4D<T>,
    weight: &Tensor4D<T>,
    bias: Option<&[T]>,
    stride: usize,
    padding: usize,
) -> Result<Tensor4D<T>> {
    let xs = input.shape();
    let ws = weight.shape();

    if xs.c != ws.c {
        return Err(CodecError::shape(
            "conv2d",
            format!("{} input channels", ws.c),
            format!("{} channels in {}", xs.c, xs),
        ));
    }
    if let Some(b) = bias {
        if b.len() != ws.n {
            return Err(CodecError::shape(
                "conv2d bias",
                format!("{} entries", ws.n),
                format!("{} entries", b.len()),
            ));
        }
    }

    let oh = output_size(xs.h, ws.h, stride, padding)?;
    let ow = output_size(xs.w, ws.w, stride, padding)?;
    let out_shape = Shape4::new(xs.n, ws.n, oh, ow);

    let x = input.data();
    let w = weight.data();
    let mut out = vec![T::default(); out_shape.numel()];

    let (cin, kh, kw) = (ws.c, ws.h, ws.w);
    let pad = padding as isize;

    for n in 0..xs.n {
        for o in 0..ws.n {
            let w_o = &w[o * cin * kh * kw..(o + 1) * cin * kh * kw];
            let b_o = bias.map(|b| b[o]);

            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = T::acc_zero();

                    for i in 0..cin {
                        let plane = &x[xs.offset(n, i, 0, 0)..][..xs.plane()];
                        let w_oi = &w_o[i * kh * kw..(i + 1) * kh * kw];

                        for ky in 0..kh {
                            let iy = (oy * stride + ky) as isize - pad;
                            if iy < 0 || iy >= xs.h as isize {
                                continue; // zero padding
                            }
                            let row = &plane[iy as usize * xs.w..][..xs.w];
                            for kx in 0..kw {
                                let ix = (ox * stride + kx) as isize - pad;
                                if ix < 0 || ix >= xs.w as isize {
                                    continue;
                                }
                                acc = T::mac(acc, row[ix as usize], w_oi[ky * kw + kx]);
                            }
                        }
                    }

                    if let Some(b) = b_o {
                        acc = T::acc_add(acc, b);
                    }
                    out[out_shape.offset(n, o, oy, ox)] = T::from_acc(acc);
                }
            }
        }
    }

    Tensor4D::new(out_shape, out)
}

/// Weights and bias owned by one convolution. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel<T> {
    config: Conv2dConfig,
    weight: Tensor4D<T>,
    bias: Vec<T>,
}

impl<T: Scalar> Kernel<T> {
    /// Build from explicit values; `weight` must have the config's
    /// (Cout, Cin, k, k) shape and `bias`, when given, Cout entries.
    pub fn new(config: Conv2dConfig, weight: Tensor4D<T>, bias: Option<Vec<T>>) -> Result<Self> {
        config.validate()?;
        if weight.shape() != config.weight_shape() {
            return Err(CodecError::shape(
                "kernel",
                config.weight_shape(),
                weight.shape(),
            ));
        }
        let bias = bias.unwrap_or_else(|| vec![T::default(); config.out_channels]);
        if bias.len() != config.out_channels {
            return Err(CodecError::shape(
                "kernel bias",
                format!("{} entries", config.out_channels),
                format!("{} entries", bias.len()),
            ));
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Every weight set to `weight`, every bias to `bias`.
    pub fn constant(config: Conv2dConfig, weight: T, bias: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            weight: Tensor4D::filled(config.weight_shape(), weight),
            bias: vec![bias; config.out_channels],
        })
    }

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor4D<T> {
        &self.weight
    }

    pub fn bias(&self) -> &[T] {
        &self.bias
    }
}

/// A convolution stage: kernel plus the policy applied to its output.
#[derive(Debug, Clone, PartialEq)]
pub struct Conv2d<T> {
    kernel: Kernel<T>,
    policy: QuantPolicy,
}

impl<T: Scalar> Conv2d<T> {
    pub fn new(kernel: Kernel<T>, policy: QuantPolicy) -> Self {
        Self { kernel, policy }
    }

    pub fn config(&self) -> &Conv2dConfig {
        self.kernel.config()
    }

    pub fn kernel(&self) -> &Kernel<T> {
        &self.kernel
    }

    pub fn policy(&self) -> QuantPolicy {
        self.policy
    }

    pub fn forward(&self, input: &Tensor4D<T>) -> Result<Tensor4D<T>> {
        let cfg = self.kernel.config();
        let mut out = convolve(
            input,
            &self.kernel.weight,
            Some(self.kernel.bias.as_slice()),
            cfg.stride,
            cfg.padding,
        )?;
        quantize_at(&mut out, self.policy, QuantPoint::PostConv);
        Ok(out)
    }
}
