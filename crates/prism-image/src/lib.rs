#![deny(missing_docs)]
//! Image types for the prism image processing engine.

/// raster image representation.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{saturate_u8, ImageSize, RasterImage};
