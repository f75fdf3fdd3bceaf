use prism_image::{ImageError, ImageSize, RasterImage};
use rayon::prelude::*;
use rustfft::num_complex::Complex;

use crate::fft::{plane_to_image, Fft2d};
use crate::filter::{ensure_odd, kernels, SeparableFilter};
use crate::padding::{pad_plane, BORDER_DEFAULT};
use crate::parallel;

/// Denoise an image with non-local means.
///
/// Every pixel becomes the weighted average of the pixels in its search
/// window, weighted by `exp(-d / h^2)` where `d` is the mean squared
/// difference between the template patches around both pixels. Patch
/// distances are read from an integral image of squared differences, one
/// per search offset. Channels are processed independently.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `h` - The filter strength, larger values smooth more.
/// * `template_window` - The odd side length of the compared patches.
/// * `search_window` - The odd side length of the search area.
pub fn non_local_means(
    src: &RasterImage,
    h: f32,
    template_window: usize,
    search_window: usize,
) -> Result<RasterImage, ImageError> {
    if !h.is_finite() || h <= 0.0 {
        return Err(ImageError::invalid_param(
            "h",
            format!("must be positive, got {h}"),
        ));
    }
    ensure_odd("template_window_size", template_window)?;
    ensure_odd("search_window_size", search_window)?;

    parallel::map_planes(src, |plane, size| {
        Ok(nlm_plane(plane, size, h, template_window / 2, search_window / 2))
    })
}

fn nlm_plane(src: &[f32], size: ImageSize, h: f32, t: usize, s: usize) -> Vec<f32> {
    let (w, hgt) = (size.width, size.height);
    let r = s + t;
    let padded = pad_plane(src, size, r, r, BORDER_DEFAULT);

    // template centers extend t pixels beyond the image on each side
    let (ew, eh) = (w + 2 * t, hgt + 2 * t);
    let patch_area = ((2 * t + 1) * (2 * t + 1)) as f64;
    let inv_h2 = 1.0 / (h as f64 * h as f64);

    let mut acc = vec![0.0f64; w * hgt];
    let mut weights = vec![0.0f64; w * hgt];
    let mut integral = vec![0.0f64; (ew + 1) * (eh + 1)];

    let s = s as isize;
    for dy in -s..=s {
        for dx in -s..=s {
            for ey in 0..eh {
                let mut row_sum = 0.0;
                for ex in 0..ew {
                    let a = padded.at(ex + s as usize, ey + s as usize);
                    let b = padded.at(
                        (ex as isize + s + dx) as usize,
                        (ey as isize + s + dy) as usize,
                    );
                    let d = (a - b) as f64;
                    row_sum += d * d;
                    integral[(ey + 1) * (ew + 1) + ex + 1] = integral[ey * (ew + 1) + ex + 1] + row_sum;
                }
            }

            let span = 2 * t + 1;
            acc.par_chunks_mut(w)
                .zip(weights.par_chunks_mut(w))
                .enumerate()
                .for_each(|(y, (acc_row, weight_row))| {
                    for x in 0..w {
                        let (x1, y1) = (x, y);
                        let (x2, y2) = (x + span, y + span);
                        let dist = (integral[y2 * (ew + 1) + x2] - integral[y1 * (ew + 1) + x2]
                            - integral[y2 * (ew + 1) + x1]
                            + integral[y1 * (ew + 1) + x1])
                            / patch_area;
                        let weight = (-dist.max(0.0) * inv_h2).exp();
                        let value = padded.at(
                            (x as isize + r as isize + dx) as usize,
                            (y as isize + r as isize + dy) as usize,
                        );
                        acc_row[x] += weight * value as f64;
                        weight_row[x] += weight;
                    }
                });
        }
    }

    acc.iter()
        .zip(&weights)
        .map(|(a, w)| (a / w) as f32)
        .collect()
}

/// Variances over the 3x3 neighborhood of every sample.
fn local_variances(plane: &[f32], size: ImageSize) -> Result<Vec<f32>, ImageError> {
    let kernel = kernels::box_blur_kernel_1d(3);
    let filter = SeparableFilter::new(&kernel, &kernel)?;
    let mean = filter.apply_plane(plane, size);
    let squares = plane.iter().map(|v| v * v).collect::<Vec<_>>();
    let mean_sq = filter.apply_plane(&squares, size);
    Ok(mean
        .iter()
        .zip(&mean_sq)
        .map(|(m, m2)| (m2 - m * m).max(0.0))
        .collect())
}

/// Estimate the variance of additive white noise in an image.
///
/// Takes the median of the 3x3 local variances of every channel, then
/// averages over the channels. Flat regions dominate the median, so edges
/// and texture barely bias the estimate.
pub fn estimate_noise_variance(src: &RasterImage) -> Result<f64, ImageError> {
    let size = src.size();
    let mut total = 0.0;
    for plane in src.planes_f32() {
        let mut variances = local_variances(&plane, size)?;
        let mid = variances.len() / 2;
        let (_, median, _) = variances.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        total += *median as f64;
    }
    Ok(total / src.num_channels() as f64)
}

/// Wiener denoising in the frequency domain.
///
/// For every frequency with power `P = |F|^2` the spectrum is scaled by
/// `max(P - sigma^2 * N, 0) / P`, where `N` is the number of pixels, which is
/// the expected power of white noise of variance `sigma^2`. The zero
/// frequency is kept as is so the mean intensity is preserved.
///
/// # Arguments
///
/// * `src` - The source image, channels are processed independently.
/// * `noise_variance` - The noise variance, estimated with
///   [`estimate_noise_variance`] when `None`.
///
/// # Returns
///
/// The filtered image and the noise variance that was used.
pub fn wiener_filter(
    src: &RasterImage,
    noise_variance: Option<f64>,
) -> Result<(RasterImage, f64), ImageError> {
    let sigma2 = match noise_variance {
        Some(v) if !v.is_finite() || v < 0.0 => {
            return Err(ImageError::invalid_param(
                "noise_variance",
                format!("must be a non-negative number, got {v}"),
            ))
        }
        Some(v) => v,
        None => estimate_noise_variance(src)?,
    };
    if !sigma2.is_finite() {
        return Err(ImageError::Computation(
            "noise variance estimate is not finite".to_string(),
        ));
    }

    let size = src.size();
    let fft = Fft2d::new(size);
    let noise_power = sigma2 * size.num_pixels() as f64;

    let channels = src
        .planes_f32()
        .iter()
        .map(|plane| {
            let mut spectrum = plane
                .iter()
                .map(|&v| Complex::new(v as f64, 0.0))
                .collect::<Vec<_>>();
            fft.forward(&mut spectrum)?;

            for v in spectrum.iter_mut().skip(1) {
                let power = v.norm_sqr();
                let gain = if power > 0.0 {
                    (power - noise_power).max(0.0) / power
                } else {
                    0.0
                };
                *v *= gain;
            }

            fft.inverse(&mut spectrum)?;
            let out = spectrum.iter().map(|v| v.re).collect::<Vec<_>>();
            if out.iter().any(|v| !v.is_finite()) {
                return Err(ImageError::Computation(
                    "wiener filter produced a non-finite value".to_string(),
                ));
            }
            plane_to_image(&out, size)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((RasterImage::from_channels(&channels)?, sigma2))
}
