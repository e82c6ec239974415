//! End-to-end checks of the encoder/decoder datapath against the hardware
//! testbench setups.

use ctx_codec::pipeline::ShapeRecorder;
use ctx_codec::{
    concat_channels, convolve, ConstantWeights, ContextualDecoder, ContextualEncoder, DecoderConfig,
    EncoderConfig, LogObserver, NamedWeights, QuantPolicy, ResKernel, ResidualBlock,
    ResidualBlockConfig, Shape4, SigmoidLut, Tensor4D,
};

/// x = 1 (1 ch), context1 = 2 (3 ch), context2 = 3, context3 = 4 over a
/// 16x16 input, N = M = 1.
fn testbench_inputs<T: ctx_codec::Scalar>() -> [Tensor4D<T>; 4] {
    [
        Tensor4D::filled(Shape4::new(1, 1, 16, 16), T::from_i32(1)),
        Tensor4D::filled(Shape4::new(1, 3, 16, 16), T::from_i32(2)),
        Tensor4D::filled(Shape4::new(1, 1, 8, 8), T::from_i32(3)),
        Tensor4D::filled(Shape4::new(1, 1, 4, 4), T::from_i32(4)),
    ]
}

#[test]
fn conv_literal_case() {
    let input = Tensor4D::<f32>::arange(Shape4::new(1, 2, 4, 4));
    let weight = Tensor4D::filled(Shape4::new(1, 2, 2, 2), 1.0f32);
    let out = convolve(&input, &weight, Some(&[0.0f32][..]), 2, 0).unwrap();
    assert_eq!(out.shape(), Shape4::new(1, 1, 2, 2));
    assert_eq!(out.into_data(), vec![84.0, 100.0, 148.0, 164.0]);
}

#[test]
fn resblock_identity_case() {
    let config = ResidualBlockConfig::new(1)
        .with_slope(0.0)
        .with_activations(false, false)
        .with_kernel(ResKernel::K1);
    let block = ResidualBlock::constant(config, 1.0f32, 0.0, QuantPolicy::None).unwrap();
    let x = Tensor4D::new(Shape4::new(1, 1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(block.forward(&x).unwrap().into_data(), vec![2.0, 4.0, 6.0, 8.0]);
}

#[test]
fn fusion_literal_case() {
    let feature = Tensor4D::new(Shape4::new(1, 8, 1, 1), vec![1i32, 0, 1, 0, 1, 0, 1, 0]).unwrap();
    let context = Tensor4D::new(Shape4::new(1, 8, 1, 1), vec![1i32, 1, 0, 0, 1, 1, 0, 0]).unwrap();
    let out = concat_channels(&feature, &[&context]).unwrap();
    assert_eq!(out.into_data(), vec![1, 0, 1, 0, 1, 0, 1, 0, 1, 1, 0, 0, 1, 1, 0, 0]);
}

#[test]
fn sigmoid_lut_file_midpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sigmoid_lut.mem");
    SigmoidLut::generate().save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 256);
    assert_eq!(text.lines().nth(128), Some("0800"));
}

#[test]
fn shape_mismatches_are_rejected() {
    let a = Tensor4D::<i32>::zeros(Shape4::new(1, 1, 4, 4));
    let b = Tensor4D::<i32>::zeros(Shape4::new(1, 1, 4, 2));
    assert!(concat_channels(&a, &[&b]).unwrap_err().is_shape());

    let weight = Tensor4D::<i32>::zeros(Shape4::new(1, 2, 1, 1));
    assert!(convolve(&a, &weight, None, 1, 0).unwrap_err().is_shape());
}

#[test]
fn fixed_encoder_wraps_bias_only_output() {
    // Zero weights reduce every conv to its bias: 300 wraps to 44.
    let config = EncoderConfig::new(1, 2).with_policy(QuantPolicy::Mod256);
    let enc = ContextualEncoder::new(config, &ConstantWeights::new(0i32, 300)).unwrap();
    let [x, c1, c2, c3] = testbench_inputs::<i32>();
    let out = enc.forward(&x, &c1, &c2, &c3).unwrap();
    assert_eq!(out.shape(), Shape4::new(1, 2, 1, 1));
    assert_eq!(out.into_data(), vec![44, 44]);
}

#[test]
fn fixed_encoder_matches_real_mod256_emulation() {
    let config = EncoderConfig::new(1, 1).with_policy(QuantPolicy::Mod256);

    let fixed_enc = ContextualEncoder::new(config, &ConstantWeights::<i32>::unit()).unwrap();
    let [x, c1, c2, c3] = testbench_inputs::<i32>();
    let fixed = fixed_enc.forward(&x, &c1, &c2, &c3).unwrap();

    let real_enc = ContextualEncoder::new(config, &ConstantWeights::<f32>::unit()).unwrap();
    let [x, c1, c2, c3] = testbench_inputs::<f32>();
    let real = real_enc.forward(&x, &c1, &c2, &c3).unwrap();

    assert_eq!(fixed.shape(), Shape4::new(1, 1, 1, 1));
    assert_eq!(fixed.data(), &[169]);
    assert_eq!(fixed.to_real(), real);

    // Repeated invocations are bit-identical.
    let [x, c1, c2, c3] = testbench_inputs::<i32>();
    assert_eq!(fixed_enc.forward(&x, &c1, &c2, &c3).unwrap(), fixed);
}

#[test]
fn named_weights_reproduce_constant_fill() {
    let config = EncoderConfig::new(1, 1).with_policy(QuantPolicy::Mod256);
    let ones = |o, i, k| Tensor4D::filled(Shape4::new(o, i, k, k), 1i32);

    let mut named = NamedWeights::new();
    named
        .insert("conv1", ones(1, 4, 3), None)
        .insert("res1.conv1", ones(1, 2, 3), None)
        .insert("res1.conv2", ones(2, 1, 3), None)
        .insert("conv2", ones(1, 2, 3), None)
        .insert("res2.conv1", ones(1, 2, 3), None)
        .insert("res2.conv2", ones(2, 1, 3), None)
        .insert("conv3", ones(1, 2, 3), None)
        .insert("conv4", ones(1, 1, 3), None);
    assert_eq!(named.len(), 8);

    let from_named = ContextualEncoder::new(config, &named).unwrap();
    let from_const = ContextualEncoder::new(config, &ConstantWeights::<i32>::unit()).unwrap();

    let [x, c1, c2, c3] = testbench_inputs::<i32>();
    assert_eq!(
        from_named.forward(&x, &c1, &c2, &c3).unwrap(),
        from_const.forward(&x, &c1, &c2, &c3).unwrap()
    );
}

#[test]
fn real_decoder_expands_sixteen_times() {
    let dec = ContextualDecoder::new(DecoderConfig::new(4, 6), &ConstantWeights::<f32>::unit()).unwrap();
    let x = Tensor4D::filled(Shape4::new(1, 6, 4, 4), 1.0f32);
    let context3 = Tensor4D::filled(Shape4::new(1, 4, 16, 16), 1.0f32);
    let context2 = Tensor4D::filled(Shape4::new(1, 4, 32, 32), 1.0f32);

    let out = dec.forward_observed(&x, &context2, &context3, &mut LogObserver).unwrap();
    assert_eq!(out.shape(), Shape4::new(1, 1, 64, 64));
    assert!(out.data().iter().all(|v| v.is_finite() && *v > 0.0));
}

#[test]
fn fixed_decoder_known_output() {
    // Unit weights, nonnegative inputs: every LeakyReLU is the identity, so
    // the result is the exact integer datapath taken mod 256.
    let config = DecoderConfig::new(1, 1).with_policy(QuantPolicy::Mod256);
    let dec = ContextualDecoder::new(config, &ConstantWeights::<i32>::unit()).unwrap();
    let x = Tensor4D::filled(Shape4::new(1, 1, 1, 1), 1i32);
    let context3 = Tensor4D::filled(Shape4::new(1, 1, 4, 4), 2i32);
    let context2 = Tensor4D::filled(Shape4::new(1, 1, 8, 8), 3i32);

    let out = dec.forward(&x, &context2, &context3).unwrap();
    assert_eq!(out.shape(), Shape4::new(1, 1, 16, 16));

    let row = [218, 218, 118, 118, 190, 190, 116, 116, 116, 116, 190, 190, 118, 118, 218, 218];
    assert_eq!(&out.plane(0, 0)[..16], &row);
    assert_eq!(&out.plane(0, 0)[240..], &row);
    assert_eq!(out.data().iter().sum::<i32>(), 34864);

    // Swapping the two context values changes the result.
    let swapped = dec
        .forward(
            &x,
            &Tensor4D::filled(Shape4::new(1, 1, 8, 8), 2),
            &Tensor4D::filled(Shape4::new(1, 1, 4, 4), 3),
        )
        .unwrap();
    assert_ne!(swapped, out);
}

#[test]
fn fixed_decoder_stays_in_register_range() {
    let config = DecoderConfig::new(2, 3).with_policy(QuantPolicy::Mod256);
    let dec = ContextualDecoder::new(config, &ConstantWeights::<i32>::unit()).unwrap();
    let x = Tensor4D::filled(Shape4::new(1, 3, 2, 2), 5i32);
    let context3 = Tensor4D::filled(Shape4::new(1, 2, 8, 8), 7i32);
    let context2 = Tensor4D::filled(Shape4::new(1, 2, 16, 16), 9i32);

    let mut rec = ShapeRecorder::default();
    let out = dec.forward_observed(&x, &context2, &context3, &mut rec).unwrap();
    assert_eq!(out.shape(), Shape4::new(1, 1, 32, 32));
    assert!(out.data().iter().all(|v| (0..256).contains(v)));
    assert_eq!(rec.records.len(), dec.pipeline().stages().len());
}
