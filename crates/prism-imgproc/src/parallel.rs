use prism_image::{ImageError, ImageSize, RasterImage};
use rayon::prelude::*;

/// Apply a function to each pixel of `src` in parallel, writing into `dst`.
///
/// `dst` must hold `src_pixels * dst_channels` samples.
pub fn par_iter_rows(
    src: &RasterImage,
    dst: &mut [u8],
    dst_channels: usize,
    f: impl Fn(&[u8], &mut [u8]) + Send + Sync,
) {
    let src_channels = src.num_channels();
    src.as_slice()
        .par_chunks_exact(src_channels * src.cols())
        .zip(dst.par_chunks_exact_mut(dst_channels * src.cols()))
        .for_each(|(src_chunk, dst_chunk)| {
            src_chunk
                .chunks_exact(src_channels)
                .zip(dst_chunk.chunks_exact_mut(dst_channels))
                .for_each(|(src_pixel, dst_pixel)| {
                    f(src_pixel, dst_pixel);
                });
        });
}

/// Fill every row of a row-major buffer in parallel.
///
/// The closure receives the row index and the mutable row slice.
pub fn par_fill_rows<T: Send>(
    dst: &mut [T],
    width: usize,
    f: impl Fn(usize, &mut [T]) + Send + Sync,
) {
    dst.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| f(y, row));
}

/// Run a float kernel on every channel of an image and restack the result.
///
/// The kernel receives the channel samples in row-major order and must
/// return a plane of the same length.
pub fn map_planes<F>(src: &RasterImage, f: F) -> Result<RasterImage, ImageError>
where
    F: Fn(&[f32], ImageSize) -> Result<Vec<f32>, ImageError> + Send + Sync,
{
    let size = src.size();
    let planes = src
        .planes_f32()
        .par_iter()
        .map(|plane| f(plane, size))
        .collect::<Result<Vec<_>, _>>()?;
    RasterImage::from_planes_f32(size, &planes)
}

/// Run an 8-bit kernel on every channel of an image and restack the result.
pub fn map_channels<F>(src: &RasterImage, f: F) -> Result<RasterImage, ImageError>
where
    F: Fn(&RasterImage) -> Result<RasterImage, ImageError> + Send + Sync,
{
    if !src.is_color() {
        return f(src);
    }
    let channels = src
        .split_channels()?
        .par_iter()
        .map(&f)
        .collect::<Result<Vec<_>, _>>()?;
    RasterImage::from_channels(&channels)
}

/// Remap every sample through a per-channel lookup table.
pub fn apply_luts(src: &RasterImage, luts: &[[u8; 256]]) -> Result<RasterImage, ImageError> {
    if luts.len() != src.num_channels() {
        return Err(ImageError::UnsupportedChannels(luts.len()));
    }
    let mut data = vec![0u8; src.numel()];
    par_iter_rows(src, &mut data, src.num_channels(), |src_pixel, dst_pixel| {
        for (c, (&s, d)) in src_pixel.iter().zip(dst_pixel.iter_mut()).enumerate() {
            *d = luts[c][s as usize];
        }
    });
    RasterImage::new(src.size(), src.num_channels(), data)
}
