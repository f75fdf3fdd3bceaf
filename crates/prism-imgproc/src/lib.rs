#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// image statistics and noise level estimation.
pub mod analysis;

/// color transformations module.
pub mod color;

/// image denoising module.
pub mod denoise;

/// edge detection module.
pub mod edges;

/// 2d fourier transform and frequency domain filters.
pub mod fft;

/// image filtering module.
pub mod filter;

/// compute image histogram module.
pub mod histogram;

/// image processing metrics module.
pub mod metrics;

/// morphological operations module.
pub mod morphology;

/// parametric noise generators.
pub mod noise;

/// border handling for neighborhood operations.
pub mod padding;

/// module containing parallization utilities.
pub mod parallel;
