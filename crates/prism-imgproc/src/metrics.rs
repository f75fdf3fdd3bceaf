use prism_image::{ImageError, RasterImage};

fn ensure_same_shape(image1: &RasterImage, image2: &RasterImage) -> Result<(), ImageError> {
    if image1.size() != image2.size() {
        return Err(ImageError::InvalidImageSize(
            image1.rows(),
            image1.cols(),
            image2.rows(),
            image2.cols(),
        ));
    }
    if image1.num_channels() != image2.num_channels() {
        return Err(ImageError::InvalidChannelShape(image1.numel(), image2.numel()));
    }
    Ok(())
}

/// Compute the mean squared error (MSE) between two images.
///
/// The MSE is defined as:
///
/// $ MSE = \frac{1}{n} \sum_{i=1}^{n} (I_1 - I_2)^2 $
///
/// where `I_1` and `I_2` are the two images and `n` is the number of samples.
///
/// # Example
///
/// ```
/// use prism_image::RasterImage;
/// use prism_imgproc::metrics::mse;
///
/// let image1 = RasterImage::new([2, 2].into(), 1, vec![0, 1, 2, 3]).unwrap();
/// let image2 = RasterImage::new([2, 2].into(), 1, vec![0, 3, 2, 3]).unwrap();
///
/// assert_eq!(mse(&image1, &image2).unwrap(), 1.0);
/// ```
pub fn mse(image1: &RasterImage, image2: &RasterImage) -> Result<f64, ImageError> {
    ensure_same_shape(image1, image2)?;

    let sum = image1
        .as_slice()
        .iter()
        .zip(image2.as_slice())
        .map(|(&a, &b)| (a as f64 - b as f64).powi(2))
        .sum::<f64>();

    Ok(sum / image1.numel() as f64)
}

/// Compute the peak signal-to-noise ratio (PSNR) between two 8-bit images.
///
/// $ PSNR = 10 \log_{10} \left( \frac{255^2}{MSE} \right) $
///
/// Identical images give `f64::INFINITY`.
pub fn psnr(image1: &RasterImage, image2: &RasterImage) -> Result<f64, ImageError> {
    let mse = mse(image1, image2)?;
    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (255.0 * 255.0 / mse).log10())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psnr() -> Result<(), ImageError> {
        let image1 = RasterImage::from_size_val([4, 4].into(), 3, 100)?;
        let image2 = RasterImage::from_size_val([4, 4].into(), 3, 110)?;
        assert_eq!(mse(&image1, &image2)?, 100.0);
        approx::assert_relative_eq!(psnr(&image1, &image2)?, 28.130803, epsilon = 1e-5);
        assert_eq!(psnr(&image1, &image1)?, f64::INFINITY);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch() -> Result<(), ImageError> {
        let image1 = RasterImage::from_size_val([4, 4].into(), 1, 0)?;
        let image2 = RasterImage::from_size_val([4, 3].into(), 1, 0)?;
        let image3 = RasterImage::from_size_val([4, 4].into(), 3, 0)?;
        assert!(mse(&image1, &image2).is_err());
        assert!(mse(&image1, &image3).is_err());
        Ok(())
    }
}
