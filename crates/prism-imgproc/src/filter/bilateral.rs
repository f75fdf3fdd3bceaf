use prism_image::{saturate_u8, ImageError, RasterImage};

use crate::padding::{pad_plane, PaddedPlane, BORDER_DEFAULT};
use crate::parallel;

/// Edge preserving smoothing with joint spatial and intensity gaussian weights.
///
/// The neighborhood is the disc of radius `d / 2`. When `d <= 0` the radius
/// is derived from `sigma_space` as `round(1.5 * sigma_space)`. For color
/// images the intensity distance is the sum of the absolute channel
/// differences, so all channels share the same weights.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `d` - The diameter of the neighborhood.
/// * `sigma_color` - The sigma of the intensity weights.
/// * `sigma_space` - The sigma of the spatial weights.
pub fn bilateral_filter(
    src: &RasterImage,
    d: i32,
    sigma_color: f32,
    sigma_space: f32,
) -> Result<RasterImage, ImageError> {
    if !sigma_color.is_finite() || sigma_color <= 0.0 {
        return Err(ImageError::invalid_param(
            "sigma_color",
            format!("must be positive, got {sigma_color}"),
        ));
    }
    if !sigma_space.is_finite() || sigma_space <= 0.0 {
        return Err(ImageError::invalid_param(
            "sigma_space",
            format!("must be positive, got {sigma_space}"),
        ));
    }

    let radius = if d <= 0 {
        (sigma_space * 1.5).round() as usize
    } else {
        d as usize / 2
    }
    .max(1);

    let channels = src.num_channels();
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    // (dx, dy, weight) of every tap inside the disc
    let r = radius as isize;
    let mut taps = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let dist = ((dx * dx + dy * dy) as f32).sqrt();
            if dist > radius as f32 {
                continue;
            }
            taps.push((dx + r, dy + r, (dist * dist * space_coeff).exp()));
        }
    }

    let color_lut = (0..256 * channels)
        .map(|diff| ((diff * diff) as f32 * color_coeff).exp())
        .collect::<Vec<_>>();

    let planes = src
        .split_channels()?
        .iter()
        .map(|ch| pad_plane(ch.as_slice(), ch.size(), radius, radius, BORDER_DEFAULT))
        .collect::<Vec<PaddedPlane<u8>>>();

    let row_len = src.width() * channels;
    let mut dst = vec![0u8; src.numel()];
    parallel::par_fill_rows(&mut dst, row_len, |y, row| {
        let mut acc = vec![0.0f32; channels];
        for (x, pixel) in row.chunks_exact_mut(channels).enumerate() {
            acc.iter_mut().for_each(|a| *a = 0.0);
            let mut norm = 0.0;

            for &(tx, ty, space_w) in &taps {
                let (nx, ny) = (x + tx as usize, y + ty as usize);
                let diff: usize = planes
                    .iter()
                    .map(|p| p.at(nx, ny).abs_diff(p.at(x + radius, y + radius)) as usize)
                    .sum();
                let w = space_w * color_lut[diff];
                for (a, p) in acc.iter_mut().zip(&planes) {
                    *a += w * p.at(nx, ny) as f32;
                }
                norm += w;
            }

            for (out, a) in pixel.iter_mut().zip(&acc) {
                *out = saturate_u8(a / norm);
            }
        }
    });

    RasterImage::new(src.size(), channels, dst)
}
