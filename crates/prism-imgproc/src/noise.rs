//! Parametric noise generators.
//!
//! Every generator draws from the random source it is given and visits the
//! samples in row-major, channel-interleaved order, so a seeded source
//! reproduces the same output bit for bit.

use prism_image::{saturate_u8, ImageError, RasterImage};
use rand::Rng;

/// Draw a sample of the standard normal distribution (Box-Muller).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - U keeps the logarithm argument in (0, 1]
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Draw a sample of the Poisson distribution with mean `lambda`.
///
/// Uses Knuth's multiplication method below 30 and a rounded normal
/// approximation above.
pub fn poisson_sample<R: Rng + ?Sized>(lambda: f64, rng: &mut R) -> f64 {
    if lambda <= 0.0 {
        return 0.0;
    }
    if lambda >= 30.0 {
        let k = (lambda + lambda.sqrt() * standard_normal(rng)).round();
        return k.max(0.0);
    }

    let limit = (-lambda).exp();
    let mut k = 0.0;
    let mut p = rng.random::<f64>();
    while p > limit {
        k += 1.0;
        p *= rng.random::<f64>();
    }
    k
}

fn map_samples<F>(src: &RasterImage, mut f: F) -> Result<RasterImage, ImageError>
where
    F: FnMut(f64) -> f64,
{
    let data = src
        .as_slice()
        .iter()
        .map(|&v| saturate_u8(f(v as f64) as f32))
        .collect();
    RasterImage::new(src.size(), src.num_channels(), data)
}

fn ensure_non_negative(name: &'static str, value: f64) -> Result<(), ImageError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ImageError::invalid_param(
            name,
            format!("must be a non-negative number, got {value}"),
        ));
    }
    Ok(())
}

fn ensure_fraction(name: &'static str, value: f64) -> Result<(), ImageError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ImageError::invalid_param(
            name,
            format!("must be within [0, 1], got {value}"),
        ));
    }
    Ok(())
}

/// Add gaussian noise `N(mean, std^2)` to every sample and clip.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `mean` - The mean of the noise.
/// * `std` - The standard deviation of the noise.
/// * `rng` - The random source.
///
/// # Example
///
/// ```
/// use prism_image::RasterImage;
/// use prism_imgproc::noise::gaussian_noise;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let image = RasterImage::from_size_val([4, 4].into(), 1, 100).unwrap();
/// let a = gaussian_noise(&image, 0.0, 10.0, &mut StdRng::seed_from_u64(7)).unwrap();
/// let b = gaussian_noise(&image, 0.0, 10.0, &mut StdRng::seed_from_u64(7)).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn gaussian_noise<R: Rng + ?Sized>(
    src: &RasterImage,
    mean: f64,
    std: f64,
    rng: &mut R,
) -> Result<RasterImage, ImageError> {
    if !mean.is_finite() {
        return Err(ImageError::invalid_param("mean", "must be finite"));
    }
    ensure_non_negative("std", std)?;
    map_samples(src, |v| v + mean + std * standard_normal(rng))
}

/// Set a random fraction of the pixels to white (salt) or black (pepper).
///
/// Exactly `round(amount * W * H)` distinct pixels are picked; each becomes
/// salt with probability `salt_ratio`. Every channel of a picked pixel is
/// set.
pub fn salt_pepper_noise<R: Rng + ?Sized>(
    src: &RasterImage,
    amount: f64,
    salt_ratio: f64,
    rng: &mut R,
) -> Result<RasterImage, ImageError> {
    ensure_fraction("amount", amount)?;
    ensure_fraction("salt_ratio", salt_ratio)?;

    let num_pixels = src.size().num_pixels();
    let count = ((amount * num_pixels as f64).round() as usize).min(num_pixels);
    let channels = src.num_channels();

    let mut data = src.as_slice().to_vec();
    for idx in rand::seq::index::sample(rng, num_pixels, count).into_vec() {
        let value = if rng.random::<f64>() < salt_ratio {
            255
        } else {
            0
        };
        data[idx * channels..(idx + 1) * channels].fill(value);
    }

    RasterImage::new(src.size(), channels, data)
}

/// Replace every sample by `Poisson(v * scale) / scale` and clip.
///
/// Larger scales give relatively weaker noise.
pub fn poisson_noise<R: Rng + ?Sized>(
    src: &RasterImage,
    scale: f64,
    rng: &mut R,
) -> Result<RasterImage, ImageError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ImageError::invalid_param(
            "scale",
            format!("must be positive, got {scale}"),
        ));
    }
    map_samples(src, |v| poisson_sample(v * scale, rng) / scale)
}

/// Multiplicative noise `v * (1 + N(0, std^2))`, clipped.
pub fn speckle_noise<R: Rng + ?Sized>(
    src: &RasterImage,
    std: f64,
    rng: &mut R,
) -> Result<RasterImage, ImageError> {
    ensure_non_negative("std", std)?;
    map_samples(src, |v| v * (1.0 + std * standard_normal(rng)))
}

/// Add noise drawn uniformly from `[low, high)` to every sample and clip.
pub fn uniform_noise<R: Rng + ?Sized>(
    src: &RasterImage,
    low: f64,
    high: f64,
    rng: &mut R,
) -> Result<RasterImage, ImageError> {
    if !low.is_finite() || !high.is_finite() || low > high {
        return Err(ImageError::invalid_param(
            "high",
            format!("must be finite and not below low ({low}), got {high}"),
        ));
    }
    map_samples(src, |v| v + low + (high - low) * rng.random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn mean(image: &RasterImage) -> f64 {
        image.as_slice().iter().map(|&v| v as f64).sum::<f64>() / image.numel() as f64
    }

    #[test]
    fn test_standard_normal_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let samples = (0..20000).map(|_| standard_normal(&mut rng)).collect::<Vec<_>>();
        let m = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|s| (s - m).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(m.abs() < 0.05, "mean {m}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    fn test_gaussian_noise() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([64, 64].into(), 1, 128)?;
        let out = gaussian_noise(&image, 20.0, 1.0, &mut StdRng::seed_from_u64(1))?;
        assert!((mean(&out) - 148.0).abs() < 0.5);

        let again = gaussian_noise(&image, 20.0, 1.0, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(out, again);

        let clean = gaussian_noise(&image, 0.0, 0.0, &mut StdRng::seed_from_u64(1))?;
        assert_eq!(clean, image);
        assert!(gaussian_noise(&image, 0.0, -1.0, &mut StdRng::seed_from_u64(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_salt_pepper_counts() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([100, 100].into(), 1, 128)?;
        let out = salt_pepper_noise(&image, 0.1, 0.5, &mut StdRng::seed_from_u64(3))?;
        let salt = out.as_slice().iter().filter(|&&v| v == 255).count();
        let pepper = out.as_slice().iter().filter(|&&v| v == 0).count();
        assert_eq!(salt + pepper, 1000);
        assert!((400..=600).contains(&salt), "salt {salt}");
        Ok(())
    }

    #[test]
    fn test_salt_pepper_color_pixels() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([10, 10].into(), 3, 100)?;
        let out = salt_pepper_noise(&image, 0.5, 1.0, &mut StdRng::seed_from_u64(9))?;
        let white = out
            .as_slice()
            .chunks_exact(3)
            .filter(|px| px.iter().all(|&v| v == 255))
            .count();
        assert_eq!(white, 50);
        assert!(salt_pepper_noise(&image, 1.5, 0.5, &mut StdRng::seed_from_u64(9)).is_err());
        Ok(())
    }

    #[test]
    fn test_poisson_noise() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([32, 32].into(), 1, 100)?;
        let out = poisson_noise(&image, 10.0, &mut StdRng::seed_from_u64(5))?;
        assert!((mean(&out) - 100.0).abs() < 1.0);

        let black = RasterImage::from_size_val([4, 4].into(), 1, 0)?;
        assert_eq!(poisson_noise(&black, 1.0, &mut StdRng::seed_from_u64(5))?, black);
        assert!(poisson_noise(&image, 0.0, &mut StdRng::seed_from_u64(5)).is_err());

        let mut rng = StdRng::seed_from_u64(11);
        let small = (0..10000).map(|_| poisson_sample(4.0, &mut rng)).sum::<f64>() / 10000.0;
        assert!((small - 4.0).abs() < 0.1, "mean {small}");
        Ok(())
    }

    #[test]
    fn test_speckle_and_uniform() -> Result<(), ImageError> {
        let black = RasterImage::from_size_val([8, 8].into(), 3, 0)?;
        assert_eq!(speckle_noise(&black, 0.5, &mut StdRng::seed_from_u64(2))?, black);

        let image = RasterImage::from_size_val([16, 16].into(), 1, 128)?;
        let out = uniform_noise(&image, -10.0, 10.0, &mut StdRng::seed_from_u64(2))?;
        assert!(out.as_slice().iter().all(|&v| (118..=138).contains(&v)));
        assert!(uniform_noise(&image, 10.0, -10.0, &mut StdRng::seed_from_u64(2)).is_err());
        Ok(())
    }
}
