use crate::parallel;
use prism_image::{saturate_u8, ImageError, RasterImage};

/// Define the RGB weights for the grayscale conversion.
const RW: f32 = 0.299;
const GW: f32 = 0.587;
const BW: f32 = 0.114;

/// Convert an image to grayscale using the formula:
///
/// Y = 0.299 * R + 0.587 * G + 0.114 * B
///
/// Grayscale inputs are returned as a copy.
///
/// # Example
///
/// ```
/// use prism_image::{ImageSize, RasterImage};
/// use prism_imgproc::color::gray_from_rgb;
///
/// let image = RasterImage::new(
///     ImageSize {
///         width: 1,
///         height: 1,
///     },
///     3,
///     vec![255, 255, 255],
/// )
/// .unwrap();
///
/// let gray = gray_from_rgb(&image).unwrap();
/// assert_eq!(gray.num_channels(), 1);
/// assert_eq!(gray.as_slice(), &[255]);
/// ```
pub fn gray_from_rgb(src: &RasterImage) -> Result<RasterImage, ImageError> {
    if !src.is_color() {
        return Ok(src.clone());
    }

    let mut data = vec![0u8; src.size().num_pixels()];

    // parallelize the grayscale conversion by rows
    parallel::par_iter_rows(src, &mut data, 1, |src_pixel, dst_pixel| {
        let r = src_pixel[0] as f32;
        let g = src_pixel[1] as f32;
        let b = src_pixel[2] as f32;
        dst_pixel[0] = saturate_u8(RW * r + GW * g + BW * b);
    });

    RasterImage::new(src.size(), 1, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_from_rgb() -> Result<(), ImageError> {
        let image = RasterImage::new([2, 1].into(), 3, vec![255, 0, 0, 0, 0, 255])?;
        let gray = gray_from_rgb(&image)?;
        assert_eq!(gray.as_slice(), &[76, 29]);
        Ok(())
    }
}
