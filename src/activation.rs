//! Activation functions.
//!
//! The sigmoid variant is a table lookup; the target has no sigmoid unit,
//! so nothing here evaluates a transcendental at run time.

use crate::lut::{LutIndexMode, SigmoidLut};
use crate::primitives::slope_to_q8;
use crate::scalar::Scalar;
use crate::tensor::Tensor4D;
use std::sync::Arc;

/// Slopes below this behave as plain ReLU.
pub const RELU_SLOPE_THRESHOLD: f32 = 1e-4;

/// Negative-side slope of a LeakyReLU, kept in both real and Q0.8 form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakySlope {
    real: f32,
    q8: i32,
}

impl LeakySlope {
    pub fn new(slope: f32) -> Self {
        Self {
            real: slope,
            q8: slope_to_q8(slope),
        }
    }

    #[inline]
    pub fn real(&self) -> f32 {
        self.real
    }

    #[inline]
    pub fn q8(&self) -> i32 {
        self.q8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Identity,
    Relu,
    LeakyRelu(LeakySlope),
    /// Values become table indices and are replaced by the Q4.12 sample.
    SigmoidLut {
        table: Arc<SigmoidLut>,
        mode: LutIndexMode,
    },
}

impl Activation {
    /// LeakyReLU with `slope`, or ReLU when the slope is negligible.
    pub fn from_slope(slope: f32) -> Self {
        if slope < RELU_SLOPE_THRESHOLD {
            Activation::Relu
        } else {
            Activation::LeakyRelu(LeakySlope::new(slope))
        }
    }

    pub fn sigmoid(table: Arc<SigmoidLut>, mode: LutIndexMode) -> Self {
        Activation::SigmoidLut { table, mode }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Activation::Identity)
    }

    #[inline]
    pub fn apply_scalar<T: Scalar>(&self, v: T) -> T {
        match self {
            Activation::Identity => v,
            Activation::Relu => v.relu(),
            Activation::LeakyRelu(slope) => v.leaky_relu(*slope),
            Activation::SigmoidLut { table, mode } => {
                T::from_q12(table.lookup(v.lut_index(*mode) as u8))
            }
        }
    }

    pub fn apply<T: Scalar>(&self, input: &Tensor4D<T>) -> Tensor4D<T> {
        if self.is_identity() {
            return input.clone();
        }
        input.map(|v| self.apply_scalar(v))
    }

    pub fn apply_in_place<T: Scalar>(&self, tensor: &mut Tensor4D<T>) {
        if self.is_identity() {
            return;
        }
        tensor.map_in_place(|v| self.apply_scalar(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Shape4;

    #[test]
    fn test_tiny_slope_maps_to_relu() {
        assert_eq!(Activation::from_slope(0.0), Activation::Relu);
        assert_eq!(Activation::from_slope(0.00005), Activation::Relu);
        assert!(matches!(Activation::from_slope(0.01), Activation::LeakyRelu(_)));
    }

    #[test]
    fn test_leaky_relu_real() {
        let act = Activation::from_slope(0.5);
        let t = Tensor4D::new(Shape4::new(1, 1, 1, 3), vec![-4.0f32, 0.0, 3.0]).unwrap();
        assert_eq!(act.apply(&t).data(), &[-2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_relu_fixed() {
        let t = Tensor4D::new(Shape4::new(1, 1, 1, 3), vec![-4i32, 0, 3]).unwrap();
        assert_eq!(Activation::Relu.apply(&t).data(), &[0, 0, 3]);
        assert_eq!(Activation::Identity.apply(&t), t);
    }

    #[test]
    fn test_sigmoid_lut_lookup() {
        let table = Arc::new(SigmoidLut::generate());
        let act = Activation::sigmoid(table.clone(), LutIndexMode::Clamp);
        let t = Tensor4D::new(Shape4::new(1, 1, 1, 4), vec![128i32, -3, 400, 0]).unwrap();
        let out = act.apply(&t);
        assert_eq!(out.data(), &[2048, 1, 4094, 1]);

        let wrap = Activation::sigmoid(table, LutIndexMode::Wrap);
        // 384 wraps to 128
        let t = Tensor4D::new(Shape4::new(1, 1, 1, 2), vec![384.0f32, 127.6]).unwrap();
        let out = wrap.apply(&t);
        assert_eq!(out.data()[0], 2048.0);
        assert_eq!(out.data()[1], 2048.0);
    }
}
