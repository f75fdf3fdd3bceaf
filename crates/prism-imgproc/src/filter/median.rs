use prism_image::{ImageError, RasterImage};

use super::ensure_odd;
use crate::padding::{pad_plane, BORDER_DEFAULT};
use crate::parallel;

/// Replace every sample by the median of its `kernel_size x kernel_size` neighborhood.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `kernel_size` - The odd side length of the neighborhood.
pub fn median_blur(src: &RasterImage, kernel_size: usize) -> Result<RasterImage, ImageError> {
    ensure_odd("kernel_size", kernel_size)?;
    let r = kernel_size / 2;

    parallel::map_channels(src, |ch| {
        let padded = pad_plane(ch.as_slice(), ch.size(), r, r, BORDER_DEFAULT);
        let mut dst = vec![0u8; ch.size().num_pixels()];

        parallel::par_fill_rows(&mut dst, ch.width(), |y, row| {
            let mut window = Vec::with_capacity(kernel_size * kernel_size);
            for (x, out) in row.iter_mut().enumerate() {
                window.clear();
                for dy in 0..kernel_size {
                    window.extend_from_slice(&padded.row(y + dy)[x..x + kernel_size]);
                }
                let mid = window.len() / 2;
                *out = *window.select_nth_unstable(mid).1;
            }
        });

        RasterImage::new(ch.size(), 1, dst)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_removes_impulse() -> Result<(), ImageError> {
        let mut data = vec![10u8; 25];
        data[12] = 255;
        data[0] = 0;
        let image = RasterImage::new([5, 5].into(), 1, data)?;
        let out = median_blur(&image, 3)?;
        assert_eq!(out.as_slice(), &[10u8; 25]);
        Ok(())
    }

    #[test]
    fn test_median_color_and_parity() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let image = RasterImage::new(
            [3, 1].into(),
            3,
            vec![
                1, 50, 9,
                2, 60, 8,
                3, 40, 7,
            ],
        )?;
        let out = median_blur(&image, 3)?;
        // reflect-101 rows repeat the only row, so the window is 3x3 of the row triple
        assert_eq!(out.get_pixel(1, 0, 0)?, 2);
        assert_eq!(out.get_pixel(1, 0, 1)?, 50);
        assert_eq!(out.get_pixel(1, 0, 2)?, 8);
        assert!(median_blur(&image, 2).is_err());
        Ok(())
    }
}
