use prism_image::{ImageError, ImageSize, RasterImage};
use rayon::prelude::*;

use crate::padding::BORDER_DEFAULT;
use crate::parallel;

/// A separable 2D filter that applies horizontal and vertical 1D correlations sequentially.
///
/// Border samples are fetched through [`BORDER_DEFAULT`]; the source index of
/// every tap is precomputed once per column and once per row.
pub struct SeparableFilter {
    kernel_x: Vec<f32>,
    kernel_y: Vec<f32>,
}

impl SeparableFilter {
    /// Create a new separable filter with the given kernels.
    ///
    /// # Arguments
    ///
    /// * `kernel_x` - The horizontal kernel, odd length.
    /// * `kernel_y` - The vertical kernel, odd length.
    pub fn new(kernel_x: &[f32], kernel_y: &[f32]) -> Result<Self, ImageError> {
        if kernel_x.len() % 2 == 0 || kernel_y.len() % 2 == 0 {
            return Err(ImageError::invalid_param(
                "kernel_size",
                format!(
                    "separable kernels must have odd lengths, got {}x{}",
                    kernel_x.len(),
                    kernel_y.len()
                ),
            ));
        }

        Ok(Self {
            kernel_x: kernel_x.to_vec(),
            kernel_y: kernel_y.to_vec(),
        })
    }

    fn tap_indices(kernel_len: usize, len: usize) -> Vec<usize> {
        let half = (kernel_len / 2) as isize;
        (0..len)
            .flat_map(|i| {
                (0..kernel_len)
                    .map(move |k| BORDER_DEFAULT.map_index(i as isize + k as isize - half, len))
            })
            .collect()
    }

    /// Apply the filter to a single channel plane.
    pub fn apply_plane(&self, src: &[f32], size: ImageSize) -> Vec<f32> {
        let (w, h) = (size.width, size.height);
        let kx = self.kernel_x.len();
        let ky = self.kernel_y.len();
        let x_taps = Self::tap_indices(kx, w);
        let y_taps = Self::tap_indices(ky, h);

        // horizontal pass
        let mut temp = vec![0.0f32; w * h];
        parallel::par_fill_rows(&mut temp, w, |y, row| {
            let src_row = &src[y * w..(y + 1) * w];
            for (x, out) in row.iter_mut().enumerate() {
                *out = self
                    .kernel_x
                    .iter()
                    .zip(&x_taps[x * kx..(x + 1) * kx])
                    .map(|(&k, &sx)| k * src_row[sx])
                    .sum();
            }
        });

        // vertical pass
        let mut dst = vec![0.0f32; w * h];
        dst.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (&k, &sy) in self.kernel_y.iter().zip(&y_taps[y * ky..(y + 1) * ky]) {
                let temp_row = &temp[sy * w..(sy + 1) * w];
                row.iter_mut()
                    .zip(temp_row)
                    .for_each(|(d, &t)| *d += k * t);
            }
        });

        dst
    }
}

/// Apply a separable filter to every channel of an image.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
///
/// # Returns
///
/// The filtered image, rounded and saturated to 8 bits.
pub fn separable_filter(
    src: &RasterImage,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<RasterImage, ImageError> {
    let filter = SeparableFilter::new(kernel_x, kernel_y)?;
    parallel::map_planes(src, |plane, size| Ok(filter.apply_plane(plane, size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separable_filter_identity() -> Result<(), ImageError> {
        let image = RasterImage::new([3, 2].into(), 3, (0..18).collect())?;
        let out = separable_filter(&image, &[0.0, 1.0, 0.0], &[1.0])?;
        assert_eq!(out, image);
        Ok(())
    }

    #[test]
    fn test_separable_filter_reflect_border() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 1,
        };
        let filter = SeparableFilter::new(&[1.0, 1.0, 1.0], &[1.0])?;
        // reflect-101 row: 2 | 1 2 3 | 2
        let out = filter.apply_plane(&[1.0, 2.0, 3.0], size);
        assert_eq!(out, vec![5.0, 6.0, 7.0]);
        Ok(())
    }

    #[test]
    fn test_separable_filter_vertical() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 1,
            height: 3,
        };
        let filter = SeparableFilter::new(&[1.0], &[-1.0, 0.0, 1.0])?;
        let out = filter.apply_plane(&[1.0, 4.0, 9.0], size);
        assert_eq!(out, vec![0.0, 8.0, 0.0]);
        assert!(SeparableFilter::new(&[1.0, 1.0], &[1.0]).is_err());
        Ok(())
    }
}
