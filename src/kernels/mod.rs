//! Integer convolution kernels over packed sub-byte tensors.

#[cfg(all(target_arch = "arm", target_feature = "dsp"))]
pub mod arm;
pub mod codec;
pub mod conv2d;
pub mod dsp;
pub mod gemm;
pub mod im2col;
pub mod quantization;
pub mod utils;

#[cfg(all(target_arch = "arm", not(target_feature = "dsp"), not(feature = "portable")))]
compile_error!(
    "32-bit ARM targets without the DSP extension are not supported; enable the `portable` feature to use the scalar kernels"
);

pub use conv2d::{conv_hwc, conv_hwc_with, ChannelConstraint, ConvGeometry, Padding};
pub use dsp::{Dsp, Native, Scalar};
pub use quantization::{Icn, PactCh, Requantize, ShiftPair, Thresholds};
