use prism_image::{ImageError, RasterImage};

use crate::color::gray_from_rgb;
use crate::filter::{filter2d_plane, kernels};
use crate::histogram::{histogram, percentile};

/// Summary statistics of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStatistics {
    /// Mean intensity.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Smallest sample.
    pub min: u8,
    /// Largest sample.
    pub max: u8,
    /// Median, averaging the two middle samples for even counts.
    pub median: f64,
}

/// Names of the channels of an image with `num_channels` channels.
pub fn channel_names(num_channels: usize) -> &'static [&'static str] {
    if num_channels == 3 {
        &["red", "green", "blue"]
    } else {
        &["intensity"]
    }
}

/// Compute per channel statistics of an image from its histograms.
///
/// # Example
///
/// ```
/// use prism_image::RasterImage;
/// use prism_imgproc::analysis::statistics;
///
/// let image = RasterImage::new([4, 1].into(), 1, vec![0, 10, 20, 30]).unwrap();
/// let stats = statistics(&image).unwrap();
/// assert_eq!(stats[0].mean, 15.0);
/// assert_eq!(stats[0].median, 15.0);
/// ```
pub fn statistics(src: &RasterImage) -> Result<Vec<ChannelStatistics>, ImageError> {
    let n = src.size().num_pixels() as f64;
    let stats = histogram(src)?
        .iter()
        .map(|hist| {
            let (sum, sum_sq) = hist
                .iter()
                .enumerate()
                .map(|(v, &count)| (v as f64, count as f64))
                .fold((0.0, 0.0), |(s, s2), (v, c)| (s + v * c, s2 + v * v * c));
            let mean = sum / n;
            let var = (sum_sq / n - mean * mean).max(0.0);

            let min = hist.iter().position(|&c| c > 0).unwrap_or(0) as u8;
            let max = hist.iter().rposition(|&c| c > 0).unwrap_or(0) as u8;

            ChannelStatistics {
                mean,
                std: var.sqrt(),
                min,
                max,
                median: percentile(hist, 50.0),
            }
        })
        .collect();
    Ok(stats)
}

/// Strategy to estimate the noise level of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseEstimator {
    /// Median absolute Laplacian response scaled by `1 / 0.6745`.
    Mad,
    /// `sqrt(var(L) / 2)` of the Laplacian response `L`.
    Laplacian,
    /// `sqrt((var(dx) + var(dy)) / 2)` of the forward differences.
    Difference,
}

fn mean_var(values: impl Iterator<Item = f64>) -> f64 {
    let (n, sum, sum_sq) = values.fold((0usize, 0.0, 0.0), |(n, s, s2), v| {
        (n + 1, s + v, s2 + v * v)
    });
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

fn median(values: &mut [f64]) -> f64 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }
    let (lower, upper, _) = values.select_nth_unstable_by(len / 2, |a, b| a.total_cmp(b));
    let upper = *upper;
    if len % 2 == 1 {
        return upper;
    }
    let lower = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lower + upper) / 2.0
}

/// Estimate the standard deviation of the noise in an image.
///
/// Color images are converted to grayscale first.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `method` - The estimation strategy.
pub fn estimate_noise(src: &RasterImage, method: NoiseEstimator) -> Result<f64, ImageError> {
    let gray = gray_from_rgb(src)?;
    let size = gray.size();
    let plane = gray.channel_f32(0)?;

    let sigma = match method {
        NoiseEstimator::Mad | NoiseEstimator::Laplacian => {
            let response = filter2d_plane(&plane, size, &kernels::LAPLACIAN_KERNEL_3X3, (3, 3));
            if method == NoiseEstimator::Mad {
                let mut abs = response.iter().map(|v| v.abs() as f64).collect::<Vec<_>>();
                median(&mut abs) / 0.6745
            } else {
                (mean_var(response.iter().map(|&v| v as f64)) / 2.0).sqrt()
            }
        }
        NoiseEstimator::Difference => {
            let w = size.width;
            let dx = plane
                .chunks_exact(w)
                .flat_map(|row| row.windows(2).map(|p| (p[1] - p[0]) as f64));
            let dy = plane
                .chunks_exact(w)
                .zip(plane.chunks_exact(w).skip(1))
                .flat_map(|(a, b)| a.iter().zip(b).map(|(p, q)| (q - p) as f64));
            ((mean_var(dx) + mean_var(dy)) / 2.0).sqrt()
        }
    };

    if !sigma.is_finite() {
        return Err(ImageError::Computation(format!(
            "noise estimate is not finite: {sigma}"
        )));
    }
    Ok(sigma)
}
