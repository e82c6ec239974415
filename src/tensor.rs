//! Dense NCHW tensors.
//!
//! `Tensor4D<T>` is indexed (batch, channel, row, column) and stored
//! row-major. The element type fixes the numeric domain (see
//! [`Scalar`](crate::scalar::Scalar)).

use crate::error::{CodecError, Result};
use crate::primitives::round_ties_to_even_f32;
use crate::quant::QuantPolicy;
use crate::scalar::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a 4-D tensor: (batch, channels, height, width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape4 {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Shape4 {
    pub const fn new(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self { n, c, h, w }
    }

    pub fn numel(&self) -> usize {
        self.n * self.c * self.h * self.w
    }

    /// Elements in one (h, w) plane.
    #[inline]
    pub fn plane(&self) -> usize {
        self.h * self.w
    }

    /// Flat offset of (n, c, y, x).
    #[inline]
    pub fn offset(&self, n: usize, c: usize, y: usize, x: usize) -> usize {
        ((n * self.c + c) * self.h + y) * self.w + x
    }

    pub fn with_channels(&self, c: usize) -> Self {
        Self { c, ..*self }
    }
}

impl fmt::Display for Shape4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.n, self.c, self.h, self.w)
    }
}

/// A 4-D tensor owned by one forward-pass invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor4D<T> {
    shape: Shape4,
    data: Vec<T>,
}

impl<T: Scalar> Tensor4D<T> {
    /// Wrap a flat row-major buffer.
    pub fn new(shape: Shape4, data: Vec<T>) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(CodecError::shape(
                "tensor",
                format!("{} elements for {}", shape.numel(), shape),
                format!("{} elements", data.len()),
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Shape4) -> Self {
        Self::filled(shape, T::default())
    }

    pub fn filled(shape: Shape4, value: T) -> Self {
        Self {
            shape,
            data: vec![value; shape.numel()],
        }
    }

    /// Build a tensor from its (n, c, y, x) coordinates.
    pub fn from_fn(shape: Shape4, mut f: impl FnMut(usize, usize, usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(shape.numel());
        for n in 0..shape.n {
            for c in 0..shape.c {
                for y in 0..shape.h {
                    for x in 0..shape.w {
                        data.push(f(n, c, y, x));
                    }
                }
            }
        }
        Self { shape, data }
    }

    /// Values 0, 1, 2, ... in row-major order.
    pub fn arange(shape: Shape4) -> Self {
        let data = (0..shape.numel()).map(|i| T::from_i32(i as i32)).collect();
        Self { shape, data }
    }

    #[inline]
    pub fn shape(&self) -> Shape4 {
        self.shape
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn get(&self, n: usize, c: usize, y: usize, x: usize) -> T {
        self.data[self.shape.offset(n, c, y, x)]
    }

    #[inline]
    pub fn set(&mut self, n: usize, c: usize, y: usize, x: usize, value: T) {
        let idx = self.shape.offset(n, c, y, x);
        self.data[idx] = value;
    }

    /// One (h, w) plane as a slice.
    pub fn plane(&self, n: usize, c: usize) -> &[T] {
        let start = self.shape.offset(n, c, 0, 0);
        &self.data[start..start + self.shape.plane()]
    }

    pub fn map(&self, f: impl Fn(T) -> T) -> Self {
        Self {
            shape: self.shape,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn map_in_place(&mut self, f: impl Fn(T) -> T) {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
    }

    /// Elementwise sum; shapes must match exactly (no broadcasting).
    pub fn add(&self, other: &Self) -> Result<Self> {
        if self.shape != other.shape {
            return Err(CodecError::shape("add", self.shape, other.shape));
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| a.add(b))
            .collect();
        Ok(Self {
            shape: self.shape,
            data,
        })
    }
}

impl Tensor4D<f32> {
    /// Cross into the fixed domain. Values are rounded half-to-even and,
    /// under `Mod256`, wrapped.
    pub fn to_fixed(&self, policy: QuantPolicy) -> Tensor4D<i32> {
        let data = self
            .data
            .iter()
            .map(|&v| {
                let q = policy.apply(v);
                round_ties_to_even_f32(q) as i32
            })
            .collect();
        Tensor4D {
            shape: self.shape,
            data,
        }
    }
}

impl Tensor4D<i32> {
    /// Cross into the real domain.
    pub fn to_real(&self) -> Tensor4D<f32> {
        Tensor4D {
            shape: self.shape,
            data: self.data.iter().map(|&v| v as f32).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Tensor4D::<f32>::new(Shape4::new(1, 2, 2, 2), vec![0.0; 7]).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_offset_is_row_major() {
        let t = Tensor4D::<i32>::arange(Shape4::new(2, 3, 4, 5));
        assert_eq!(t.get(0, 0, 0, 1), 1);
        assert_eq!(t.get(0, 0, 1, 0), 5);
        assert_eq!(t.get(0, 1, 0, 0), 20);
        assert_eq!(t.get(1, 0, 0, 0), 60);
        assert_eq!(t.plane(0, 1)[0], 20);
    }

    #[test]
    fn test_add_requires_equal_shapes() {
        let a = Tensor4D::<i32>::filled(Shape4::new(1, 1, 2, 2), 1);
        let b = Tensor4D::<i32>::filled(Shape4::new(1, 2, 2, 2), 1);
        assert!(a.add(&b).unwrap_err().is_shape());
        assert_eq!(a.add(&a).unwrap().data(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_domain_crossing() {
        let real = Tensor4D::new(Shape4::new(1, 1, 1, 3), vec![-1.0f32, 2.5, 300.0]).unwrap();
        let fixed = real.to_fixed(QuantPolicy::Mod256);
        assert_eq!(fixed.data(), &[255, 2, 44]);
        let raw = real.to_fixed(QuantPolicy::None);
        assert_eq!(raw.data(), &[-1, 2, 300]);
        assert_eq!(fixed.to_real().data(), &[255.0, 2.0, 44.0]);
    }
}
