//! ctx_codec - Fixed-point contextual encoder/decoder datapath
//!
//! This crate models the forward pass of a learned image codec's contextual
//! encoder and decoder as it runs on an 8-bit fixed-point accelerator.
//!
//! Every intermediate activation can be wrapped mod 256 at the same points
//! the hardware does, so outputs match the Verilog testbench bit for bit.
//! The same stages also run in the real domain for full-precision reference
//! results.

pub mod error;
pub mod primitives;
pub mod scalar;
pub mod tensor;
pub mod quant;
pub mod lut;
pub mod activation;
pub mod conv;
pub mod resblock;
pub mod fusion;
pub mod upsample;
pub mod weights;
pub mod pipeline;
pub mod encoder;
pub mod decoder;

// Re-export commonly used types
pub use activation::Activation;
pub use conv::{convolve, Conv2d, Conv2dConfig, Kernel};
pub use decoder::{ContextualDecoder, DecoderConfig};
pub use encoder::{ContextualEncoder, EncoderConfig};
pub use error::{CodecError, Result};
pub use fusion::concat_channels;
pub use lut::{LutIndexMode, SigmoidLut};
pub use pipeline::{LogObserver, NoopObserver, Pipeline, PipelineStage, StageObserver};
pub use quant::{quantize, QuantPolicy};
pub use resblock::{ResKernel, ResidualBlock, ResidualBlockConfig};
pub use scalar::{NumericDomain, Scalar};
pub use tensor::{Shape4, Tensor4D};
pub use upsample::{pixel_shuffle, Upsampler};
pub use weights::{ConstantWeights, NamedWeights, WeightSource};
