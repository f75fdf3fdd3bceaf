use prism_image::{ImageError, ImageSize, RasterImage};

use crate::color::gray_from_rgb;
use crate::filter::{filter2d_plane, kernels, SeparableFilter};
use crate::parallel;

fn ensure_aperture(ksize: usize) -> Result<(), ImageError> {
    if !matches!(ksize, 1 | 3 | 5 | 7) {
        return Err(ImageError::invalid_param(
            "ksize",
            format!("must be one of 1, 3, 5 or 7, got {ksize}"),
        ));
    }
    Ok(())
}

fn gray_plane(src: &RasterImage) -> Result<Vec<f32>, ImageError> {
    gray_from_rgb(src)?.channel_f32(0)
}

/// Horizontal and vertical sobel derivatives of a plane.
fn sobel_gradients(
    plane: &[f32],
    size: ImageSize,
    ksize: usize,
) -> Result<(Vec<f32>, Vec<f32>), ImageError> {
    let (derivative, smoothing) = kernels::sobel_kernels_1d(ksize, 1);
    let gx = SeparableFilter::new(&derivative, &smoothing)?.apply_plane(plane, size);
    let gy = SeparableFilter::new(&smoothing, &derivative)?.apply_plane(plane, size);
    Ok((gx, gy))
}

/// Compute the sobel gradient magnitude of an image.
///
/// Color images are converted to grayscale first. The output is a single
/// channel image holding `sqrt(gx^2 + gy^2)` saturated to 8 bits.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `ksize` - The aperture size, one of 1, 3, 5 or 7.
pub fn sobel(src: &RasterImage, ksize: usize) -> Result<RasterImage, ImageError> {
    ensure_aperture(ksize)?;
    let plane = gray_plane(src)?;
    let (gx, gy) = sobel_gradients(&plane, src.size(), ksize)?;

    let magnitude = gx
        .iter()
        .zip(&gy)
        .map(|(x, y)| x.hypot(*y))
        .collect::<Vec<_>>();

    RasterImage::from_planes_f32(src.size(), &[magnitude])
}

/// Compute the absolute Laplacian response of an image.
///
/// Aperture size 1 uses the 4-neighbour kernel, larger sizes sum the second
/// sobel derivatives along both axes. The output is single channel.
pub fn laplacian(src: &RasterImage, ksize: usize) -> Result<RasterImage, ImageError> {
    ensure_aperture(ksize)?;
    let plane = gray_plane(src)?;
    let size = src.size();

    let response = if ksize == 1 {
        filter2d_plane(&plane, size, &kernels::LAPLACIAN_KERNEL_3X3, (3, 3))
    } else {
        let (derivative, smoothing) = kernels::sobel_kernels_1d(ksize, 2);
        let dxx = SeparableFilter::new(&derivative, &smoothing)?.apply_plane(&plane, size);
        let dyy = SeparableFilter::new(&smoothing, &derivative)?.apply_plane(&plane, size);
        dxx.iter().zip(&dyy).map(|(a, b)| a + b).collect()
    };

    let magnitude = response.iter().map(|v| v.abs()).collect::<Vec<_>>();
    RasterImage::from_planes_f32(size, &[magnitude])
}

/// Detect edges with the Canny algorithm.
///
/// Computes 3x3 sobel gradients with an L1 magnitude, thins them with
/// non-maximum suppression along the gradient direction and links them by
/// hysteresis: pixels above the high threshold seed edges that grow through
/// 8-connected pixels above the low threshold.
///
/// # Arguments
///
/// * `src` - The source image, converted to grayscale if needed.
/// * `threshold1` - One of the hysteresis thresholds.
/// * `threshold2` - The other hysteresis threshold.
///
/// # Returns
///
/// A single channel image with edges at 255 and background at 0.
pub fn canny(src: &RasterImage, threshold1: f32, threshold2: f32) -> Result<RasterImage, ImageError> {
    if !threshold1.is_finite() || threshold1 < 0.0 {
        return Err(ImageError::invalid_param(
            "threshold1",
            format!("must be a non-negative number, got {threshold1}"),
        ));
    }
    if !threshold2.is_finite() || threshold2 < 0.0 {
        return Err(ImageError::invalid_param(
            "threshold2",
            format!("must be a non-negative number, got {threshold2}"),
        ));
    }
    let (low, high) = if threshold1 <= threshold2 {
        (threshold1, threshold2)
    } else {
        (threshold2, threshold1)
    };

    let size = src.size();
    let plane = gray_plane(src)?;
    let (gx, gy) = sobel_gradients(&plane, size, 3)?;
    let magnitude = gx
        .iter()
        .zip(&gy)
        .map(|(x, y)| x.abs() + y.abs())
        .collect::<Vec<_>>();

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy, size, low);
    let edges = hysteresis(&thinned, size, low, high);

    RasterImage::new(size, 1, edges)
}

fn non_maximum_suppression(
    magnitude: &[f32],
    gx: &[f32],
    gy: &[f32],
    size: ImageSize,
    low: f32,
) -> Vec<f32> {
    let (w, h) = (size.width as isize, size.height as isize);
    let at = |x: isize, y: isize| {
        if x < 0 || y < 0 || x >= w || y >= h {
            0.0
        } else {
            magnitude[(y * w + x) as usize]
        }
    };

    let mut out = vec![0.0f32; magnitude.len()];
    parallel::par_fill_rows(&mut out, size.width, |y, row| {
        let y = y as isize;
        for (x, out) in row.iter_mut().enumerate() {
            let i = y as usize * size.width + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }

            let x = x as isize;
            let mut angle = gy[i].atan2(gx[i]).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            let (n1, n2) = if !(22.5..157.5).contains(&angle) {
                (at(x - 1, y), at(x + 1, y))
            } else if angle < 67.5 {
                (at(x + 1, y + 1), at(x - 1, y - 1))
            } else if angle < 112.5 {
                (at(x, y - 1), at(x, y + 1))
            } else {
                (at(x - 1, y + 1), at(x + 1, y - 1))
            };

            if m >= n1 && m >= n2 {
                *out = m;
            }
        }
    });
    out
}

fn hysteresis(thinned: &[f32], size: ImageSize, low: f32, high: f32) -> Vec<u8> {
    let (w, h) = (size.width, size.height);
    let mut out = vec![0u8; w * h];
    let mut stack = Vec::new();

    for start in 0..w * h {
        if thinned[start] < high || out[start] != 0 {
            continue;
        }
        out[start] = 255;
        stack.push(start);

        while let Some(i) = stack.pop() {
            let (x, y) = ((i % w) as isize, (i / w) as isize);
            for dy in -1..=1isize {
                for dx in -1..=1isize {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if out[n] == 0 && thinned[n] > 0.0 && thinned[n] >= low {
                        out[n] = 255;
                        stack.push(n);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_image(width: usize, height: usize, edge: usize) -> Result<RasterImage, ImageError> {
        let data = (0..width * height)
            .map(|i| if i % width < edge { 0 } else { 255 })
            .collect();
        RasterImage::new([width, height].into(), 1, data)
    }

    #[test]
    fn test_sobel_step() -> Result<(), ImageError> {
        let image = step_image(6, 3, 3)?;
        let out = sobel(&image, 3)?;
        assert_eq!(out.num_channels(), 1);
        for y in 0..3 {
            assert_eq!(out.get_pixel(0, y, 0)?, 0);
            assert_eq!(out.get_pixel(2, y, 0)?, 255);
            assert_eq!(out.get_pixel(3, y, 0)?, 255);
            assert_eq!(out.get_pixel(5, y, 0)?, 0);
        }
        assert!(sobel(&image, 4).is_err());
        Ok(())
    }

    #[test]
    fn test_sobel_color_input_is_gray() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([4, 4].into(), 3, 90)?;
        let out = sobel(&image, 5)?;
        assert_eq!(out.num_channels(), 1);
        assert!(out.as_slice().iter().all(|&v| v == 0));
        Ok(())
    }

    #[test]
    fn test_laplacian_impulse() -> Result<(), ImageError> {
        let mut data = vec![0u8; 25];
        data[12] = 10;
        let image = RasterImage::new([5, 5].into(), 1, data)?;
        let out = laplacian(&image, 1)?;
        assert_eq!(out.get_pixel(2, 2, 0)?, 40);
        assert_eq!(out.get_pixel(1, 2, 0)?, 10);
        assert_eq!(out.get_pixel(1, 1, 0)?, 0);

        let out = laplacian(&image, 3)?;
        // [[2, 0, 2], [0, -8, 0], [2, 0, 2]]
        assert_eq!(out.get_pixel(2, 2, 0)?, 80);
        assert_eq!(out.get_pixel(1, 1, 0)?, 20);
        assert_eq!(out.get_pixel(1, 2, 0)?, 0);
        Ok(())
    }

    #[test]
    fn test_canny_step_edge() -> Result<(), ImageError> {
        let image = step_image(20, 20, 10)?;
        let edges = canny(&image, 50.0, 150.0)?;
        let count = edges.as_slice().iter().filter(|&&v| v == 255).count();
        assert!(count > 0, "expected edges at sharp boundary");

        // only the columns next to the step respond
        for y in 0..20 {
            for x in (0..8).chain(12..20) {
                assert_eq!(edges.get_pixel(x, y, 0)?, 0);
            }
        }

        assert_eq!(canny(&image, 150.0, 50.0)?, edges);
        Ok(())
    }

    #[test]
    fn test_canny_flat_and_border() -> Result<(), ImageError> {
        let flat = RasterImage::from_size_val([7, 5].into(), 1, 200)?;
        assert!(canny(&flat, 10.0, 20.0)?.as_slice().iter().all(|&v| v == 0));

        let border = step_image(10, 10, 1)?;
        let edges = canny(&border, 1.0, 2.0)?;
        assert_eq!(edges.size(), border.size());
        Ok(())
    }
}
