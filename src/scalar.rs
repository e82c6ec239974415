//! Numeric domains of the datapath.
//!
//! Two element types implement [`Scalar`]:
//! - `f32`: the real domain used by the full-precision variants.
//! - `i32`: the fixed-point domain. After a Mod256 quantization point every
//!   value is in [0, 255]; between points the lane holds the raw
//!   accumulator result.
//!
//! A tensor's domain is its element type, so real and fixed tensors cannot
//! be mixed without an explicit conversion.

use crate::activation::LeakySlope;
use crate::lut::LutIndexMode;
use crate::primitives::{mul_slope_q8, round_ties_to_even_f32, wrap_mod256_f32, wrap_mod256_i64};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which numeric domain a tensor lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericDomain {
    Real,
    Fixed,
}

impl fmt::Display for NumericDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericDomain::Real => write!(f, "real"),
            NumericDomain::Fixed => write!(f, "fixed"),
        }
    }
}

/// Element type of a [`Tensor4D`](crate::tensor::Tensor4D).
pub trait Scalar: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Convolution accumulator.
    type Acc: Copy + fmt::Debug;

    const DOMAIN: NumericDomain;

    fn one() -> Self;

    fn from_i32(v: i32) -> Self;

    fn to_f32(self) -> f32;

    fn acc_zero() -> Self::Acc;

    /// `acc + x * w`
    fn mac(acc: Self::Acc, x: Self, w: Self) -> Self::Acc;

    fn acc_add(acc: Self::Acc, b: Self) -> Self::Acc;

    /// Narrow an accumulator back to a tensor element.
    fn from_acc(acc: Self::Acc) -> Self;

    /// Elementwise add for the residual skip.
    fn add(self, other: Self) -> Self;

    /// Map into [0, 255] with wraparound.
    fn wrap_mod256(self) -> Self;

    fn relu(self) -> Self;

    fn leaky_relu(self, slope: LeakySlope) -> Self;

    /// Table index for the sigmoid LUT.
    fn lut_index(self, mode: LutIndexMode) -> usize;

    /// Raw Q4.12 LUT sample as an element.
    fn from_q12(raw: u16) -> Self;
}

impl Scalar for f32 {
    type Acc = f32;

    const DOMAIN: NumericDomain = NumericDomain::Real;

    #[inline]
    fn one() -> Self {
        1.0
    }

    #[inline]
    fn from_i32(v: i32) -> Self {
        v as f32
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn acc_zero() -> f32 {
        0.0
    }

    #[inline]
    fn mac(acc: f32, x: f32, w: f32) -> f32 {
        acc + x * w
    }

    #[inline]
    fn acc_add(acc: f32, b: f32) -> f32 {
        acc + b
    }

    #[inline]
    fn from_acc(acc: f32) -> f32 {
        acc
    }

    #[inline]
    fn add(self, other: f32) -> f32 {
        self + other
    }

    #[inline]
    fn wrap_mod256(self) -> f32 {
        wrap_mod256_f32(self)
    }

    #[inline]
    fn relu(self) -> f32 {
        if self >= 0.0 {
            self
        } else {
            0.0
        }
    }

    #[inline]
    fn leaky_relu(self, slope: LeakySlope) -> f32 {
        if self >= 0.0 {
            self
        } else {
            slope.real() * self
        }
    }

    #[inline]
    fn lut_index(self, mode: LutIndexMode) -> usize {
        mode.index(round_ties_to_even_f32(self) as i64)
    }

    #[inline]
    fn from_q12(raw: u16) -> f32 {
        raw as f32
    }
}

impl Scalar for i32 {
    /// Products are summed at 64 bits; narrowing keeps the low 32 bits,
    /// which preserves the value modulo 256.
    type Acc = i64;

    const DOMAIN: NumericDomain = NumericDomain::Fixed;

    #[inline]
    fn one() -> Self {
        1
    }

    #[inline]
    fn from_i32(v: i32) -> Self {
        v
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn acc_zero() -> i64 {
        0
    }

    #[inline]
    fn mac(acc: i64, x: i32, w: i32) -> i64 {
        acc.wrapping_add(x as i64 * w as i64)
    }

    #[inline]
    fn acc_add(acc: i64, b: i32) -> i64 {
        acc.wrapping_add(b as i64)
    }

    #[inline]
    fn from_acc(acc: i64) -> i32 {
        acc as i32
    }

    #[inline]
    fn add(self, other: i32) -> i32 {
        self.wrapping_add(other)
    }

    #[inline]
    fn wrap_mod256(self) -> i32 {
        wrap_mod256_i64(self as i64) as i32
    }

    #[inline]
    fn relu(self) -> i32 {
        self.max(0)
    }

    #[inline]
    fn leaky_relu(self, slope: LeakySlope) -> i32 {
        if self >= 0 {
            self
        } else {
            mul_slope_q8(self, slope.q8())
        }
    }

    #[inline]
    fn lut_index(self, mode: LutIndexMode) -> usize {
        mode.index(self as i64)
    }

    #[inline]
    fn from_q12(raw: u16) -> i32 {
        raw as i32
    }
}
