use prism_image::{saturate_u8, ImageError, ImageSize, RasterImage};
use rayon::prelude::*;

use crate::filter::ensure_odd;
use crate::padding::{pad_plane, BORDER_DEFAULT};
use crate::parallel;

/// A 256-bin intensity histogram of one channel.
pub type Histogram = [u64; 256];

/// Compute the pixel intensity histogram of a buffer of 8-bit samples.
///
/// # Arguments
///
/// * `src` - The samples to count.
/// * `hist` - The output histogram, counts are accumulated into it.
/// * `num_bins` - The number of bins to use for the histogram.
///
/// # Errors
///
/// Returns an error if the number of bins is invalid.
///
/// # Example
///
/// ```
/// use prism_imgproc::histogram::compute_histogram;
///
/// let mut histogram = vec![0; 3];
///
/// compute_histogram(&[0, 2, 4, 128, 130, 132, 254, 255, 255], &mut histogram, 3).unwrap();
/// assert_eq!(histogram, vec![3, 3, 3]);
/// ```
pub fn compute_histogram(src: &[u8], hist: &mut [u64], num_bins: usize) -> Result<(), ImageError> {
    if num_bins == 0 || num_bins > 256 || hist.len() != num_bins {
        return Err(ImageError::invalid_param(
            "num_bins",
            format!("expected 1..=256 bins matching the output, got {num_bins}"),
        ));
    }

    let mut bin_lut = [0usize; 256];
    for (i, bin) in bin_lut.iter_mut().enumerate() {
        *bin = (i * num_bins) >> 8;
    }

    let counts = src
        .par_chunks(4096)
        .fold(
            || vec![0u64; num_bins],
            |mut local, chunk| {
                for &px in chunk {
                    local[bin_lut[px as usize]] += 1;
                }
                local
            },
        )
        .reduce(
            || vec![0u64; num_bins],
            |mut a, b| {
                for (i, val) in b.iter().enumerate() {
                    a[i] += val;
                }
                a
            },
        );

    for (h, c) in hist.iter_mut().zip(counts) {
        *h += c;
    }

    Ok(())
}

/// Compute the 256-bin histogram of every channel independently.
///
/// Returns one histogram for grayscale images and three (R, G, B) for color
/// images.
pub fn histogram(src: &RasterImage) -> Result<Vec<Histogram>, ImageError> {
    src.split_channels()?
        .iter()
        .map(|ch| {
            let mut hist = [0u64; 256];
            compute_histogram(ch.as_slice(), &mut hist, 256)?;
            Ok(hist)
        })
        .collect()
}

/// Build the equalization lookup table of a histogram.
///
/// `lut[v] = round(255 * (cdf(v) - cdf_min) / (total - cdf_min))`, where
/// `cdf_min` is the count of the lowest populated level. A histogram with a
/// single populated level yields the identity table.
pub fn equalize_lut(hist: &Histogram) -> [u8; 256] {
    let total: u64 = hist.iter().sum();
    let cdf_min = hist.iter().copied().find(|&h| h > 0).unwrap_or(0);

    let mut lut = [0u8; 256];
    if total == cdf_min {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let scale = 255.0 / (total - cdf_min) as f64;
    let mut cdf = 0u64;
    for (v, &h) in lut.iter_mut().zip(hist.iter()) {
        cdf += h;
        *v = (cdf.saturating_sub(cdf_min) as f64 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Global histogram equalization, applied to every channel independently.
pub fn equalize_global(src: &RasterImage) -> Result<RasterImage, ImageError> {
    let luts = histogram(src)?
        .iter()
        .map(equalize_lut)
        .collect::<Vec<_>>();
    parallel::apply_luts(src, &luts)
}

/// Contrast Limited Adaptive Histogram Equalization.
///
/// The image is split into a `tile_grid x tile_grid` grid. Each tile
/// histogram is clipped at `clip_limit * tile_pixels / 256`, the clipped mass
/// is redistributed over all bins, and the per-tile mappings are blended
/// bilinearly between tile centers.
///
/// # Arguments
///
/// * `src` - The input image, channels are processed independently.
/// * `clip_limit` - Contrast limit, at least 1.
/// * `tile_grid` - Number of tiles per axis, at least 2.
pub fn equalize_clahe(
    src: &RasterImage,
    clip_limit: f64,
    tile_grid: usize,
) -> Result<RasterImage, ImageError> {
    if !clip_limit.is_finite() || clip_limit < 1.0 {
        return Err(ImageError::invalid_param(
            "clip_limit",
            format!("must be a finite value >= 1, got {clip_limit}"),
        ));
    }
    if tile_grid < 2 {
        return Err(ImageError::invalid_param(
            "tile_size",
            format!("must be >= 2, got {tile_grid}"),
        ));
    }

    parallel::map_channels(src, |ch| {
        let data = clahe_plane(ch.as_slice(), ch.size(), clip_limit, tile_grid);
        RasterImage::new(ch.size(), 1, data)
    })
}

fn clip_histogram(hist: &mut [u32; 256], clip: u32) {
    let mut clipped = 0u32;
    for h in hist.iter_mut() {
        if *h > clip {
            clipped += *h - clip;
            *h = clip;
        }
    }

    let batch = clipped / 256;
    let mut residual = clipped - batch * 256;
    hist.iter_mut().for_each(|h| *h += batch);

    if residual > 0 {
        let step = (256 / residual as usize).max(1);
        let mut i = 0;
        while i < 256 && residual > 0 {
            hist[i] += 1;
            i += step;
            residual -= 1;
        }
    }
}

fn clahe_plane(src: &[u8], size: ImageSize, clip_limit: f64, grid: usize) -> Vec<u8> {
    let (w, h) = (size.width, size.height);
    let gx = grid.min(w);
    let gy = grid.min(h);

    let mut luts = vec![[0u8; 256]; gx * gy];
    luts.par_iter_mut().enumerate().for_each(|(t, lut)| {
        let (tx, ty) = (t % gx, t / gx);
        let (x0, x1) = (tx * w / gx, (tx + 1) * w / gx);
        let (y0, y1) = (ty * h / gy, (ty + 1) * h / gy);

        let mut hist = [0u32; 256];
        for y in y0..y1 {
            for &v in &src[y * w + x0..y * w + x1] {
                hist[v as usize] += 1;
            }
        }

        let tile_pixels = ((x1 - x0) * (y1 - y0)) as f64;
        let clip = ((clip_limit * tile_pixels / 256.0) as u32).max(1);
        clip_histogram(&mut hist, clip);

        let scale = 255.0 / tile_pixels;
        let mut sum = 0u32;
        for (v, &count) in lut.iter_mut().zip(hist.iter()) {
            sum += count;
            *v = saturate_u8((sum as f64 * scale) as f32);
        }
    });

    let inv_tw = gx as f32 / w as f32;
    let inv_th = gy as f32 / h as f32;

    // tile index pair and blend weight along one axis
    let axis = |p: usize, inv: f32, tiles: usize| {
        let f = p as f32 * inv - 0.5;
        let t1 = f.floor();
        let a = f - t1;
        let t1 = t1 as isize;
        let lo = t1.max(0) as usize;
        let hi = ((t1 + 1) as usize).min(tiles - 1);
        (lo, hi, a)
    };

    let mut dst = vec![0u8; w * h];
    parallel::par_fill_rows(&mut dst, w, |y, row| {
        let (ty1, ty2, ya) = axis(y, inv_th, gy);
        for (x, out) in row.iter_mut().enumerate() {
            let (tx1, tx2, xa) = axis(x, inv_tw, gx);
            let v = src[y * w + x] as usize;
            let l11 = luts[ty1 * gx + tx1][v] as f32;
            let l12 = luts[ty1 * gx + tx2][v] as f32;
            let l21 = luts[ty2 * gx + tx1][v] as f32;
            let l22 = luts[ty2 * gx + tx2][v] as f32;
            let top = l11 * (1.0 - xa) + l12 * xa;
            let bottom = l21 * (1.0 - xa) + l22 * xa;
            *out = saturate_u8(top * (1.0 - ya) + bottom * ya);
        }
    });

    dst
}

/// Adaptive histogram equalization over a sliding window.
///
/// Every pixel is remapped through the equalization mapping of its
/// `window x window` neighborhood. No clipping is applied.
///
/// # Arguments
///
/// * `src` - The input image, channels are processed independently.
/// * `window` - Odd side length of the neighborhood.
pub fn equalize_adaptive(src: &RasterImage, window: usize) -> Result<RasterImage, ImageError> {
    ensure_odd("window", window)?;

    parallel::map_channels(src, |ch| {
        let data = adaptive_plane(ch.as_slice(), ch.size(), window);
        RasterImage::new(ch.size(), 1, data)
    })
}

fn adaptive_plane(src: &[u8], size: ImageSize, window: usize) -> Vec<u8> {
    let r = window / 2;
    let padded = pad_plane(src, size, r, r, BORDER_DEFAULT);
    let n = (window * window) as u32;

    let mut dst = vec![0u8; size.num_pixels()];
    parallel::par_fill_rows(&mut dst, size.width, |y, row| {
        let mut hist = [0u32; 256];
        for dy in 0..window {
            for &v in &padded.row(y + dy)[..window] {
                hist[v as usize] += 1;
            }
        }

        for (x, out) in row.iter_mut().enumerate() {
            if x > 0 {
                for dy in 0..window {
                    hist[padded.at(x - 1, y + dy) as usize] -= 1;
                    hist[padded.at(x + window - 1, y + dy) as usize] += 1;
                }
            }

            let v = src[y * size.width + x] as usize;
            let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
            if cdf_min == n {
                *out = v as u8;
                continue;
            }
            let cdf: u32 = hist[..=v].iter().sum();
            let scaled = 255.0 * (cdf - cdf_min) as f32 / (n - cdf_min) as f32;
            *out = saturate_u8(scaled);
        }
    });

    dst
}

/// Value at percentile `p` (0-100) of the samples counted by `hist`, with
/// linear interpolation between neighbouring ranks.
pub fn percentile(hist: &Histogram, p: f64) -> f64 {
    let n: u64 = hist.iter().sum();
    if n == 0 {
        return 0.0;
    }

    let kth = |k: u64| -> f64 {
        let mut cum = 0u64;
        for (v, &c) in hist.iter().enumerate() {
            cum += c;
            if cum > k {
                return v as f64;
            }
        }
        255.0
    };

    let rank = p.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as u64;
    let frac = rank - lo as f64;
    let a = kth(lo);
    let b = kth((lo + 1).min(n - 1));
    a + frac * (b - a)
}

/// Linear contrast stretch between two percentiles.
///
/// Per channel, the `low_pct` and `high_pct` percentiles are mapped to 0 and
/// 255 and everything outside is clamped. A channel whose percentiles
/// coincide is left unchanged.
pub fn contrast_stretch(
    src: &RasterImage,
    low_pct: f64,
    high_pct: f64,
) -> Result<RasterImage, ImageError> {
    if !(0.0..=100.0).contains(&low_pct) {
        return Err(ImageError::invalid_param(
            "low_percentile",
            format!("must be within [0, 100], got {low_pct}"),
        ));
    }
    if !(0.0..=100.0).contains(&high_pct) || high_pct <= low_pct {
        return Err(ImageError::invalid_param(
            "high_percentile",
            format!("must be within ({low_pct}, 100], got {high_pct}"),
        ));
    }

    let luts = histogram(src)?
        .iter()
        .map(|hist| {
            let p_low = percentile(hist, low_pct);
            let p_high = percentile(hist, high_pct);
            let mut lut = [0u8; 256];
            for (i, v) in lut.iter_mut().enumerate() {
                *v = if p_high <= p_low {
                    i as u8
                } else {
                    saturate_u8(((i as f64 - p_low) * 255.0 / (p_high - p_low)) as f32)
                };
            }
            lut
        })
        .collect::<Vec<_>>();

    parallel::apply_luts(src, &luts)
}
