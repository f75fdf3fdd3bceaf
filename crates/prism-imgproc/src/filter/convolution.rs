use prism_image::{ImageError, ImageSize, RasterImage};

use crate::padding::{pad_plane, BORDER_DEFAULT};
use crate::parallel;

/// Correlate a single channel plane with a dense 2D kernel.
///
/// # Arguments
///
/// * `src` - The plane samples in row-major order.
/// * `size` - The size of the plane.
/// * `kernel` - The kernel weights in row-major order.
/// * `kernel_size` - The kernel size as (width, height), both odd.
pub fn filter2d_plane(
    src: &[f32],
    size: ImageSize,
    kernel: &[f32],
    kernel_size: (usize, usize),
) -> Vec<f32> {
    let (kw, kh) = kernel_size;
    let padded = pad_plane(src, size, kw / 2, kh / 2, BORDER_DEFAULT);

    let mut dst = vec![0.0f32; size.num_pixels()];
    parallel::par_fill_rows(&mut dst, size.width, |y, row| {
        for (x, out) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (ky, kernel_row) in kernel.chunks_exact(kw).enumerate() {
                let src_row = &padded.row(y + ky)[x..x + kw];
                for (&k, &s) in kernel_row.iter().zip(src_row) {
                    acc += k * s;
                }
            }
            *out = acc;
        }
    });

    dst
}

/// Apply a dense 2D kernel to every channel of an image.
///
/// The kernel is applied as a correlation (not flipped) and the result is
/// rounded and saturated to 8 bits.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `kernel` - The kernel weights in row-major order.
/// * `kernel_size` - The kernel size as (width, height), both odd.
pub fn filter2d(
    src: &RasterImage,
    kernel: &[f32],
    kernel_size: (usize, usize),
) -> Result<RasterImage, ImageError> {
    let (kw, kh) = kernel_size;
    if kw % 2 == 0 || kh % 2 == 0 {
        return Err(ImageError::invalid_param(
            "kernel",
            format!("kernel dimensions must be odd, got {kw}x{kh}"),
        ));
    }
    if kernel.len() != kw * kh {
        return Err(ImageError::invalid_param(
            "kernel",
            format!("expected {} weights, got {}", kw * kh, kernel.len()),
        ));
    }
    if kernel.iter().any(|k| !k.is_finite()) {
        return Err(ImageError::invalid_param("kernel", "weights must be finite"));
    }

    parallel::map_planes(src, |plane, size| {
        Ok(filter2d_plane(plane, size, kernel, kernel_size))
    })
}
