//! Quantization policy applied at stage boundaries.
//!
//! The policy belongs to the stage, not to the tensor: the same convolution
//! runs pass-through in the full-precision variant and wraps mod 256 in the
//! hardware-parity variant.

use crate::scalar::Scalar;
use crate::tensor::Tensor4D;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point policy at a quantization point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantPolicy {
    /// Pass-through.
    #[default]
    None,
    /// Wrap every value into [0, 255].
    Mod256,
}

impl QuantPolicy {
    #[inline]
    pub fn apply<T: Scalar>(self, v: T) -> T {
        match self {
            QuantPolicy::None => v,
            QuantPolicy::Mod256 => v.wrap_mod256(),
        }
    }

    pub fn is_passthrough(self) -> bool {
        self == QuantPolicy::None
    }
}

/// Where in the dataflow a quantization happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantPoint {
    PostConv,
    PostActivation,
    PostResidualAdd,
}

impl fmt::Display for QuantPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuantPoint::PostConv => "post-conv",
            QuantPoint::PostActivation => "post-activation",
            QuantPoint::PostResidualAdd => "post-residual-add",
        };
        f.write_str(s)
    }
}

/// Return a quantized copy of `tensor`.
pub fn quantize<T: Scalar>(tensor: &Tensor4D<T>, policy: QuantPolicy) -> Tensor4D<T> {
    if policy.is_passthrough() {
        return tensor.clone();
    }
    tensor.map(|v| policy.apply(v))
}

/// Quantize in place at a named point of the dataflow.
pub fn quantize_at<T: Scalar>(tensor: &mut Tensor4D<T>, policy: QuantPolicy, point: QuantPoint) {
    if policy.is_passthrough() {
        return;
    }
    log::trace!("quantize {} at {} ({})", tensor.shape(), point, T::DOMAIN);
    tensor.map_in_place(|v| policy.apply(v));
}
