use prism_image::{saturate_u8, ImageError, RasterImage};

use super::{ensure_odd, filter2d, kernels, separable_filter};

/// Blur an image using a box blur filter.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `kernel_size` - The odd side length of the kernel.
pub fn box_blur(src: &RasterImage, kernel_size: usize) -> Result<RasterImage, ImageError> {
    ensure_odd("kernel_size", kernel_size)?;
    let kernel = kernels::box_blur_kernel_1d(kernel_size);
    separable_filter(src, &kernel, &kernel)
}

/// Blur an image using a gaussian blur filter.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `kernel_size` - The odd side length of the kernel.
/// * `sigma` - The sigma of the gaussian kernel. Non-positive values derive
///   it from the kernel size.
///
/// # Example
///
/// ```
/// use prism_image::{ImageSize, RasterImage};
/// use prism_imgproc::filter::gaussian_blur;
///
/// let image = RasterImage::from_size_val(ImageSize { width: 4, height: 4 }, 1, 9).unwrap();
/// let blurred = gaussian_blur(&image, 3, 1.0).unwrap();
/// assert_eq!(blurred.as_slice(), image.as_slice());
/// ```
pub fn gaussian_blur(
    src: &RasterImage,
    kernel_size: usize,
    sigma: f32,
) -> Result<RasterImage, ImageError> {
    ensure_odd("kernel_size", kernel_size)?;
    if !sigma.is_finite() {
        return Err(ImageError::invalid_param("sigma", "must be finite"));
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        kernels::sigma_from_kernel_size(kernel_size)
    };
    let kernel = kernels::gaussian_kernel_1d(kernel_size, sigma);
    separable_filter(src, &kernel, &kernel)
}

/// Sharpen an image with the identity minus a scaled Laplacian.
///
/// A `strength` of zero returns the input unchanged.
pub fn sharpen(src: &RasterImage, strength: f32) -> Result<RasterImage, ImageError> {
    if !strength.is_finite() || strength < 0.0 {
        return Err(ImageError::invalid_param(
            "strength",
            format!("must be a non-negative number, got {strength}"),
        ));
    }
    filter2d(src, &kernels::sharpen_kernel(strength), (3, 3))
}

/// Sharpen an image by adding back its difference with a gaussian blur.
///
/// `output = input + strength * (input - blur(input, sigma))`. Samples whose
/// absolute difference with the blur is below `threshold` keep their
/// original value.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `sigma` - The sigma of the blur, the kernel size is derived from it.
/// * `strength` - The amount of detail added back.
/// * `threshold` - The minimum difference that gets sharpened.
pub fn unsharp_mask(
    src: &RasterImage,
    sigma: f32,
    strength: f32,
    threshold: f32,
) -> Result<RasterImage, ImageError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ImageError::invalid_param(
            "sigma",
            format!("must be positive, got {sigma}"),
        ));
    }
    if !strength.is_finite() || strength < 0.0 {
        return Err(ImageError::invalid_param(
            "strength",
            format!("must be a non-negative number, got {strength}"),
        ));
    }
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ImageError::invalid_param(
            "threshold",
            format!("must be a non-negative number, got {threshold}"),
        ));
    }

    let blurred = gaussian_blur(src, kernels::kernel_size_from_sigma(sigma), sigma)?;

    let data = src
        .as_slice()
        .iter()
        .zip(blurred.as_slice())
        .map(|(&s, &b)| {
            let (s, b) = (s as f32, b as f32);
            if threshold > 0.0 && (s - b).abs() < threshold {
                s as u8
            } else {
                saturate_u8((1.0 + strength) * s - strength * b)
            }
        })
        .collect();

    RasterImage::new(src.size(), src.num_channels(), data)
}

/// Apply the directional emboss kernel.
pub fn emboss(src: &RasterImage) -> Result<RasterImage, ImageError> {
    filter2d(src, &kernels::EMBOSS_KERNEL_3X3, (3, 3))
}

/// Boost the high frequencies by adding `input - blur(input)` back to the input.
///
/// Both the difference and the sum saturate in 8 bits.
pub fn high_pass(src: &RasterImage, kernel_size: usize) -> Result<RasterImage, ImageError> {
    let blurred = low_pass(src, kernel_size)?;
    let data = src
        .as_slice()
        .iter()
        .zip(blurred.as_slice())
        .map(|(&s, &b)| s.saturating_add(s.saturating_sub(b)))
        .collect();
    RasterImage::new(src.size(), src.num_channels(), data)
}

/// Smooth an image with a gaussian whose sigma is derived from `kernel_size`.
pub fn low_pass(src: &RasterImage, kernel_size: usize) -> Result<RasterImage, ImageError> {
    gaussian_blur(src, kernel_size, 0.0)
}

/// Apply a user supplied 3x3 kernel, given in row-major order.
pub fn custom_kernel(src: &RasterImage, kernel: &[f32; 9]) -> Result<RasterImage, ImageError> {
    filter2d(src, kernel, (3, 3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_image::ImageSize;

    fn variance(image: &RasterImage) -> f64 {
        let n = image.numel() as f64;
        let mean = image.as_slice().iter().map(|&v| v as f64).sum::<f64>() / n;
        image
            .as_slice()
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n
    }

    fn checkerboard(size: usize) -> Result<RasterImage, ImageError> {
        let data = (0..size * size)
            .map(|i| if (i / size + i % size) % 2 == 0 { 200 } else { 50 })
            .collect();
        RasterImage::new([size, size].into(), 1, data)
    }

    #[test]
    fn test_box_blur() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let mut data = vec![0u8; 25];
        data[12] = 90;
        let image = RasterImage::new(size, 1, data)?;
        let out = box_blur(&image, 3)?;

        #[rustfmt::skip]
        assert_eq!(
            out.as_slice(),
            &[
                0,  0,  0,  0, 0,
                0, 10, 10, 10, 0,
                0, 10, 10, 10, 0,
                0, 10, 10, 10, 0,
                0,  0,  0,  0, 0,
            ]
        );
        assert!(box_blur(&image, 4).is_err());
        Ok(())
    }

    #[test]
    fn test_gaussian_blur_reduces_variance() -> Result<(), ImageError> {
        let mut state = 12345u32;
        let data = (0..32 * 32)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                (state >> 24) as u8
            })
            .collect();
        let image = RasterImage::new([32, 32].into(), 1, data)?;
        let mut last = variance(&image);
        for sigma in [0.5, 1.0, 2.0, 3.0] {
            let out = gaussian_blur(&image, kernels::kernel_size_from_sigma(sigma), sigma)?;
            let v = variance(&out);
            assert!(v < last, "sigma {sigma}: {v} >= {last}");
            last = v;
        }
        Ok(())
    }

    #[test]
    fn test_sharpen() -> Result<(), ImageError> {
        let image = checkerboard(6)?;
        assert_eq!(sharpen(&image, 0.0)?, image);

        let out = sharpen(&image, 1.0)?;
        // 200 surrounded by 50: 5 * 200 - 4 * 50
        assert_eq!(out.get_pixel(2, 2, 0)?, 255);
        assert_eq!(out.get_pixel(3, 2, 0)?, 0);
        assert!(sharpen(&image, -1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_unsharp_mask_threshold() -> Result<(), ImageError> {
        let flat = RasterImage::from_size_val([4, 4].into(), 3, 77)?;
        assert_eq!(unsharp_mask(&flat, 1.0, 1.5, 0.0)?, flat);

        let image = checkerboard(8)?;
        let sharp = unsharp_mask(&image, 1.0, 1.0, 0.0)?;
        assert!(variance(&sharp) > variance(&image));

        let untouched = unsharp_mask(&image, 1.0, 1.0, 255.0)?;
        assert_eq!(untouched, image);
        Ok(())
    }

    #[test]
    fn test_high_and_low_pass() -> Result<(), ImageError> {
        let flat = RasterImage::from_size_val([5, 5].into(), 1, 128)?;
        assert_eq!(high_pass(&flat, 3)?, flat);
        assert_eq!(low_pass(&flat, 5)?, flat);

        let image = checkerboard(8)?;
        let out = high_pass(&image, 3)?;
        // bright samples only grow, dark ones saturate the difference at zero
        assert!(out.get_pixel(0, 0, 0)? >= 200);
        assert_eq!(out.get_pixel(1, 0, 0)?, 50);
        Ok(())
    }

    #[test]
    fn test_emboss_flat_image() -> Result<(), ImageError> {
        // kernel weights sum to one
        let flat = RasterImage::from_size_val([4, 3].into(), 3, 100)?;
        assert_eq!(emboss(&flat)?, flat);
        Ok(())
    }

    #[test]
    fn test_custom_kernel() -> Result<(), ImageError> {
        let image = RasterImage::new([3, 3].into(), 1, (1..=9).collect())?;
        #[rustfmt::skip]
        let kernel = [
            0.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
        ];
        let out = custom_kernel(&image, &kernel)?;
        assert_eq!(out.as_slice(), &[4, 5, 6, 7, 8, 9, 4, 5, 6]);
        Ok(())
    }
}
