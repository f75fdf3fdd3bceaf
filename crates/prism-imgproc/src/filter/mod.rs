//! Filter operations
//!
//! This module provides the spatial filters of the engine: linear
//! convolutions, order statistic and edge preserving filters.

use prism_image::ImageError;

/// Filter kernels
pub mod kernels;

/// Filter operations
mod ops;
pub use ops::*;

/// Separable filter operations
mod separable_filter;
pub use separable_filter::*;

/// Dense 2d correlation
mod convolution;
pub use convolution::*;

mod median;
pub use median::median_blur;

mod bilateral;
pub use bilateral::bilateral_filter;

/// Check that a window size is a positive odd number.
pub(crate) fn ensure_odd(name: &'static str, size: usize) -> Result<(), ImageError> {
    if size == 0 || size % 2 == 0 {
        return Err(ImageError::invalid_param(
            name,
            format!("must be a positive odd number, got {size}"),
        ));
    }
    Ok(())
}
