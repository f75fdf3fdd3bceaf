use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use prism_image::RasterImage;

use crate::error::ApiError;

/// Largest accepted width or height.
pub const MAX_DIMENSION: usize = 4096;

/// Decode an uploaded file into a raster.
///
/// Grayscale files keep a single channel, everything else is converted to
/// RGB and alpha is dropped.
pub fn decode(bytes: &[u8]) -> Result<(RasterImage, &'static str), ApiError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ApiError::UnsupportedImage(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ApiError::UnsupportedImage(e.to_string()))?;

    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ApiError::UnsupportedImage(format!(
            "{width}x{height} exceeds the {MAX_DIMENSION} pixel limit"
        )));
    }

    let (channels, data) = if decoded.color().has_color() {
        (3, decoded.to_rgb8().into_raw())
    } else {
        (1, decoded.to_luma8().into_raw())
    };
    let raster = RasterImage::new([width, height].into(), channels, data)
        .map_err(|e| ApiError::UnsupportedImage(e.to_string()))?;
    Ok((raster, format.extensions_str().first().copied().unwrap_or("bin")))
}

/// Encode a raster as PNG.
pub fn encode_png(raster: &RasterImage) -> Result<Vec<u8>, ApiError> {
    let (w, h) = (raster.width() as u32, raster.height() as u32);
    let data = raster.as_slice().to_vec();
    let dynamic = match raster.num_channels() {
        1 => GrayImage::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
        _ => RgbImage::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
    }
    .ok_or_else(|| ApiError::Internal("raster buffer does not match its size".to_string()))?;

    let mut buffer = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Encode a raster as a base64 PNG string.
pub fn encode_base64_png(raster: &RasterImage) -> Result<String, ApiError> {
    Ok(STANDARD.encode(encode_png(raster)?))
}
