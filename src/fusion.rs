//! Context fusion: channel-axis concatenation.

use crate::error::{CodecError, Result};
use crate::scalar::Scalar;
use crate::tensor::Tensor4D;

/// Concatenate `primary` with `contexts` along the channel axis.
///
/// Output channels are the primary's first, then each context in argument
/// order. Batch and spatial dims must agree exactly; channel counts may
/// differ.
pub fn concat_channels<T: Scalar>(primary: &Tensor4D<T>, contexts: &[&Tensor4D<T>]) -> Result<Tensor4D<T>> {
    let ps = primary.shape();
    let mut channels = ps.c;

    for ctx in contexts {
        let cs = ctx.shape();
        if cs.n != ps.n || cs.h != ps.h || cs.w != ps.w {
            return Err(CodecError::shape(
                "context fusion",
                format!("[{}, _, {}, {}]", ps.n, ps.h, ps.w),
                cs,
            ));
        }
        channels += cs.c;
    }

    let out_shape = ps.with_channels(channels);
    let mut data = Vec::with_capacity(out_shape.numel());

    for n in 0..ps.n {
        for t in std::iter::once(primary).chain(contexts.iter().copied()) {
            let block = t.shape().c * t.shape().plane();
            data.extend_from_slice(&t.data()[n * block..(n + 1) * block]);
        }
    }

    Tensor4D::new(out_shape, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Shape4;

    fn bits(v: &[i32]) -> Tensor4D<i32> {
        Tensor4D::new(Shape4::new(1, v.len(), 1, 1), v.to_vec()).unwrap()
    }

    #[test]
    fn test_concat_bit_patterns() {
        let feature = bits(&[1, 0, 1, 0, 1, 0, 1, 0]);
        let context = bits(&[1, 1, 0, 0, 1, 1, 0, 0]);
        let out = concat_channels(&feature, &[&context]).unwrap();

        assert_eq!(out.shape(), Shape4::new(1, 16, 1, 1));
        let s: String = out.data().iter().map(|b| b.to_string()).collect();
        assert_eq!(s, "1010101011001100");
    }

    #[test]
    fn test_concat_keeps_batches_separate() {
        let a = Tensor4D::<i32>::from_fn(Shape4::new(2, 1, 1, 2), |n, _, _, x| (10 * n + x) as i32);
        let b = Tensor4D::<i32>::from_fn(Shape4::new(2, 2, 1, 2), |n, c, _, x| (100 + 10 * n + 2 * c + x) as i32);
        let out = concat_channels(&a, &[&b]).unwrap();

        assert_eq!(out.shape(), Shape4::new(2, 3, 1, 2));
        assert_eq!(out.data(), &[0, 1, 100, 101, 102, 103, 10, 11, 110, 111, 112, 113]);
    }

    #[test]
    fn test_concat_multiple_contexts_in_order() {
        let a = Tensor4D::filled(Shape4::new(1, 1, 2, 2), 1.0f32);
        let b = Tensor4D::filled(Shape4::new(1, 2, 2, 2), 2.0f32);
        let c = Tensor4D::filled(Shape4::new(1, 1, 2, 2), 3.0f32);
        let out = concat_channels(&a, &[&b, &c]).unwrap();
        assert_eq!(out.shape().c, 4);
        assert_eq!(out.get(0, 0, 1, 1), 1.0);
        assert_eq!(out.get(0, 2, 0, 0), 2.0);
        assert_eq!(out.get(0, 3, 0, 1), 3.0);
    }

    #[test]
    fn test_concat_rejects_spatial_and_batch_mismatch() {
        let a = Tensor4D::<f32>::zeros(Shape4::new(1, 1, 4, 4));
        let b = Tensor4D::<f32>::zeros(Shape4::new(1, 1, 2, 2));
        assert!(concat_channels(&a, &[&b]).unwrap_err().is_shape());

        let c = Tensor4D::<f32>::zeros(Shape4::new(2, 1, 4, 4));
        assert!(concat_channels(&a, &[&c]).unwrap_err().is_shape());
    }
}
