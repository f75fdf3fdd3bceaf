use prism_image::{ImageError, RasterImage};

use crate::filter::ensure_odd;
use crate::padding::{pad_plane, BORDER_DEFAULT};
use crate::parallel;

/// A morphological structuring element.
///
/// Stores a binary mask where 1 marks the pixels included in the operation.
///
/// # Example
///
/// ```rust
/// use prism_imgproc::morphology::Kernel;
///
/// let kernel = Kernel::ellipse(3);
/// assert_eq!(kernel.data(), &[0, 1, 0, 1, 1, 1, 0, 1, 0]);
/// ```
pub struct Kernel {
    data: Vec<u8>,
    size: usize,
}

impl Kernel {
    /// Create an elliptical structuring element inscribed in a `size x size` square.
    ///
    /// Each row spans `round(c * sqrt(1 - dy^2 / r^2))` pixels on both sides
    /// of the center column, where `r` and `c` are the half sizes.
    pub fn ellipse(size: usize) -> Self {
        let mut data = vec![0u8; size * size];
        let r = (size / 2) as f32;
        let c = r;

        for (i, row) in data.chunks_exact_mut(size).enumerate() {
            let dy = i as f32 - r;
            let dx = if r > 0.0 {
                (c * ((r * r - dy * dy) / (r * r)).max(0.0).sqrt()).round() as usize
            } else {
                0
            };
            let center = size / 2;
            let j1 = center.saturating_sub(dx);
            let j2 = (center + dx + 1).min(size);
            row[j1..j2].fill(1);
        }

        Self { data, size }
    }

    /// Get a reference to the kernel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the side length of the kernel.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A composition of erosions and dilations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOp {
    /// Erosion followed by dilation, removes small bright details.
    Opening,
    /// Dilation followed by erosion, removes small dark details.
    Closing,
    /// Opening followed by closing.
    OpenClose,
}

fn rank_filter(
    src: &RasterImage,
    kernel: &Kernel,
    pick: fn(u8, u8) -> u8,
    init: u8,
) -> Result<RasterImage, ImageError> {
    let k = kernel.size();
    let offsets = kernel
        .data()
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v != 0)
        .map(|(i, _)| (i % k, i / k))
        .collect::<Vec<_>>();

    parallel::map_channels(src, |ch| {
        let padded = pad_plane(ch.as_slice(), ch.size(), k / 2, k / 2, BORDER_DEFAULT);
        let mut dst = vec![0u8; ch.size().num_pixels()];
        parallel::par_fill_rows(&mut dst, ch.width(), |y, row| {
            for (x, out) in row.iter_mut().enumerate() {
                *out = offsets
                    .iter()
                    .fold(init, |acc, &(dx, dy)| pick(acc, padded.at(x + dx, y + dy)));
            }
        });
        RasterImage::new(ch.size(), 1, dst)
    })
}

/// Dilate an image using a [`Kernel`].
///
/// Each pixel is replaced by the maximum value in the neighborhood defined
/// by the kernel.
pub fn dilate(src: &RasterImage, kernel: &Kernel) -> Result<RasterImage, ImageError> {
    rank_filter(src, kernel, u8::max, 0)
}

/// Erode an image using a [`Kernel`].
///
/// Each pixel is replaced by the minimum value in the neighborhood defined
/// by the kernel.
pub fn erode(src: &RasterImage, kernel: &Kernel) -> Result<RasterImage, ImageError> {
    rank_filter(src, kernel, u8::min, 255)
}

/// Erosion followed by dilation.
pub fn open(src: &RasterImage, kernel: &Kernel) -> Result<RasterImage, ImageError> {
    dilate(&erode(src, kernel)?, kernel)
}

/// Dilation followed by erosion.
pub fn close(src: &RasterImage, kernel: &Kernel) -> Result<RasterImage, ImageError> {
    erode(&dilate(src, kernel)?, kernel)
}

/// Denoise an image with a morphological composition over an elliptical element.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `op` - The composition to apply.
/// * `kernel_size` - The odd side length of the structuring element.
pub fn morphological_denoise(
    src: &RasterImage,
    op: MorphOp,
    kernel_size: usize,
) -> Result<RasterImage, ImageError> {
    ensure_odd("kernel_size", kernel_size)?;
    let kernel = Kernel::ellipse(kernel_size);
    match op {
        MorphOp::Opening => open(src, &kernel),
        MorphOp::Closing => close(src, &kernel),
        MorphOp::OpenClose => close(&open(src, &kernel)?, &kernel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipse_kernel() {
        #[rustfmt::skip]
        assert_eq!(
            Kernel::ellipse(5).data(),
            &[
                0, 0, 1, 0, 0,
                1, 1, 1, 1, 1,
                1, 1, 1, 1, 1,
                1, 1, 1, 1, 1,
                0, 0, 1, 0, 0,
            ]
        );
        assert_eq!(Kernel::ellipse(1).data(), &[1]);
    }

    #[test]
    fn test_dilate_erode() -> Result<(), ImageError> {
        let mut data = vec![0u8; 25];
        data[12] = 255;
        let image = RasterImage::new([5, 5].into(), 1, data)?;
        let kernel = Kernel::ellipse(3);

        let dilated = dilate(&image, &kernel)?;
        #[rustfmt::skip]
        assert_eq!(
            dilated.as_slice(),
            &[
                0, 0,   0,   0, 0,
                0, 0,   255, 0, 0,
                0, 255, 255, 255, 0,
                0, 0,   255, 0, 0,
                0, 0,   0,   0, 0,
            ]
        );
        assert_eq!(erode(&dilated, &kernel)?, image);
        Ok(())
    }

    #[test]
    fn test_opening_and_closing() -> Result<(), ImageError> {
        let mut bright = vec![50u8; 49];
        bright[24] = 250;
        let bright = RasterImage::new([7, 7].into(), 1, bright)?;
        let flat = RasterImage::from_size_val([7, 7].into(), 1, 50)?;
        assert_eq!(morphological_denoise(&bright, MorphOp::Opening, 3)?, flat);

        let mut dark = vec![200u8; 49];
        dark[24] = 0;
        let dark = RasterImage::new([7, 7].into(), 1, dark)?;
        let flat = RasterImage::from_size_val([7, 7].into(), 1, 200)?;
        assert_eq!(morphological_denoise(&dark, MorphOp::Closing, 3)?, flat);
        assert_eq!(morphological_denoise(&dark, MorphOp::OpenClose, 5)?, flat);

        assert!(morphological_denoise(&dark, MorphOp::Closing, 4).is_err());
        Ok(())
    }
}
