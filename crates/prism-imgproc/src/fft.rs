use std::sync::Arc;

use prism_image::{saturate_u8, ImageError, ImageSize, RasterImage};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::color::gray_from_rgb;
use crate::parallel;

/// Planned forward and inverse 2D transforms for one image size.
///
/// Rows are transformed in place, the buffer is transposed, columns are
/// transformed as rows and the buffer is transposed back.
pub struct Fft2d {
    size: ImageSize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    /// Plan the transforms for images of the given size.
    pub fn new(size: ImageSize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            size,
            row_forward: planner.plan_fft_forward(size.width),
            row_inverse: planner.plan_fft_inverse(size.width),
            col_forward: planner.plan_fft_forward(size.height),
            col_inverse: planner.plan_fft_inverse(size.height),
        }
    }

    fn check_len(&self, data: &[Complex<f64>]) -> Result<(), ImageError> {
        if data.len() != self.size.num_pixels() {
            return Err(ImageError::InvalidChannelShape(
                data.len(),
                self.size.num_pixels(),
            ));
        }
        Ok(())
    }

    fn transpose(src: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
        let mut dst = vec![Complex::new(0.0, 0.0); src.len()];
        for (y, row) in src.chunks_exact(cols).enumerate() {
            for (x, &v) in row.iter().enumerate() {
                dst[x * rows + y] = v;
            }
        }
        dst
    }

    fn process(&self, data: &mut [Complex<f64>], row: &Arc<dyn Fft<f64>>, col: &Arc<dyn Fft<f64>>) {
        let (w, h) = (self.size.width, self.size.height);

        data.par_chunks_mut(w).for_each(|r| row.process(r));

        let mut transposed = Self::transpose(data, h, w);
        transposed.par_chunks_mut(h).for_each(|c| col.process(c));

        data.copy_from_slice(&Self::transpose(&transposed, w, h));
    }

    /// Forward transform of a row-major buffer, in place.
    pub fn forward(&self, data: &mut [Complex<f64>]) -> Result<(), ImageError> {
        self.check_len(data)?;
        self.process(data, &self.row_forward, &self.col_forward);
        Ok(())
    }

    /// Inverse transform of a row-major buffer, in place and normalized.
    pub fn inverse(&self, data: &mut [Complex<f64>]) -> Result<(), ImageError> {
        self.check_len(data)?;
        self.process(data, &self.row_inverse, &self.col_inverse);
        let norm = 1.0 / self.size.num_pixels() as f64;
        data.iter_mut().for_each(|v| *v *= norm);
        Ok(())
    }
}

/// Index of `(x, y)` once the zero frequency is moved to the center.
#[inline]
fn shifted_index(x: usize, y: usize, size: ImageSize) -> usize {
    let sy = (y + size.height / 2) % size.height;
    let sx = (x + size.width / 2) % size.width;
    sy * size.width + sx
}

/// Move the zero frequency of a spectrum to the center of the array.
pub fn fftshift<T: Copy + Default>(data: &[T], size: ImageSize) -> Vec<T> {
    let mut out = vec![T::default(); data.len()];
    for y in 0..size.height {
        for x in 0..size.width {
            out[shifted_index(x, y, size)] = data[y * size.width + x];
        }
    }
    out
}

/// Apply a centered real mask to every sample of a spectrum.
fn apply_centered_mask(spectrum: &mut [Complex<f64>], mask: &[f64], size: ImageSize) {
    spectrum
        .par_chunks_mut(size.width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                *v *= mask[shifted_index(x, y, size)];
            }
        });
}

/// Distance of every sample of a centered spectrum to its center.
fn center_distances(size: ImageSize) -> Vec<f64> {
    let (cy, cx) = ((size.height / 2) as f64, (size.width / 2) as f64);
    (0..size.num_pixels())
        .map(|i| {
            let (x, y) = ((i % size.width) as f64, (i / size.width) as f64);
            (y - cy).hypot(x - cx)
        })
        .collect()
}

fn to_complex(plane: &[f32]) -> Vec<Complex<f64>> {
    plane.iter().map(|&v| Complex::new(v as f64, 0.0)).collect()
}

fn ensure_finite(values: &[f64], what: &str) -> Result<(), ImageError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ImageError::Computation(format!(
            "{what} produced a non-finite value"
        )));
    }
    Ok(())
}

fn normalize_to_u8(values: &[f64], size: ImageSize) -> Result<RasterImage, ImageError> {
    let max = values.iter().cloned().fold(0.0f64, f64::max);
    let plane = values
        .iter()
        .map(|&v| if max > 0.0 { (v / max * 255.0) as f32 } else { 0.0 })
        .collect::<Vec<_>>();
    RasterImage::from_planes_f32(size, &[plane])
}

/// Compute the magnitude and phase spectra of an image.
///
/// Color images are converted to grayscale first.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `shift` - Whether to move the zero frequency to the center.
/// * `log_scale` - Whether to compress the magnitude with `log(1 + |F|)`.
///
/// # Returns
///
/// A tuple `(magnitude, phase)` of single channel images. The magnitude is
/// normalized so that its maximum maps to 255, the phase maps `[-pi, pi]`
/// linearly to `[0, 255]`.
pub fn fft_transform(
    src: &RasterImage,
    shift: bool,
    log_scale: bool,
) -> Result<(RasterImage, RasterImage), ImageError> {
    let size = src.size();
    let gray = gray_from_rgb(src)?;
    let mut spectrum = to_complex(&gray.channel_f32(0)?);
    Fft2d::new(size).forward(&mut spectrum)?;

    if shift {
        spectrum = fftshift(&spectrum, size);
    }

    let magnitude = spectrum
        .iter()
        .map(|v| if log_scale { v.norm().ln_1p() } else { v.norm() })
        .collect::<Vec<_>>();
    ensure_finite(&magnitude, "magnitude spectrum")?;

    let phase = spectrum
        .iter()
        .map(|v| ((v.arg() + std::f64::consts::PI) / (2.0 * std::f64::consts::PI) * 255.0) as f32)
        .collect::<Vec<_>>();

    Ok((
        normalize_to_u8(&magnitude, size)?,
        RasterImage::from_planes_f32(size, &[phase])?,
    ))
}

/// The band shape of a frequency filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Passes frequencies below the cutoff.
    Lowpass,
    /// Passes frequencies above the cutoff.
    Highpass,
    /// Passes frequencies between the two cutoffs.
    Bandpass,
    /// Blocks frequencies between the two cutoffs.
    Bandstop,
    /// Blocks a narrow ring around the cutoff.
    Notch,
}

/// The transition profile of a frequency filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMethod {
    /// Binary step.
    Ideal,
    /// Gaussian falloff.
    Gaussian,
    /// Butterworth falloff of a given order.
    Butterworth,
}

/// A radial frequency filter.
///
/// Cutoffs and the notch width are fractions of `D_max`, the distance from
/// the spectrum center to its corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyFilter {
    /// The band shape.
    pub filter_type: FilterType,
    /// The transition profile.
    pub method: FilterMethod,
    /// The cutoff, or the lower cutoff of band filters, in `[0, 1]`.
    pub cutoff: f64,
    /// The upper cutoff of band filters, in `[0, 1]`.
    pub cutoff_high: f64,
    /// The Butterworth order, at least 1.
    pub order: u32,
    /// The width of the notch ring.
    pub notch_width: f64,
}

impl FrequencyFilter {
    /// Check the filter parameters.
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(0.0..=1.0).contains(&self.cutoff) {
            return Err(ImageError::invalid_param(
                "cutoff",
                format!("must be within [0, 1], got {}", self.cutoff),
            ));
        }
        if matches!(self.filter_type, FilterType::Bandpass | FilterType::Bandstop) {
            if !(0.0..=1.0).contains(&self.cutoff_high) || self.cutoff_high <= self.cutoff {
                return Err(ImageError::invalid_param(
                    "cutoff_high",
                    format!(
                        "must be within ({}, 1], got {}",
                        self.cutoff, self.cutoff_high
                    ),
                ));
            }
        }
        if self.order == 0 {
            return Err(ImageError::invalid_param("order", "must be at least 1"));
        }
        if self.filter_type == FilterType::Notch
            && !(self.notch_width > 0.0 && self.notch_width <= 1.0)
        {
            return Err(ImageError::invalid_param(
                "notch_width",
                format!("must be within (0, 1], got {}", self.notch_width),
            ));
        }
        Ok(())
    }

    fn lowpass(&self, dn: f64, d0: f64) -> f64 {
        if d0 <= 0.0 {
            return if dn == 0.0 { 1.0 } else { 0.0 };
        }
        match self.method {
            FilterMethod::Ideal => {
                if dn <= d0 {
                    1.0
                } else {
                    0.0
                }
            }
            FilterMethod::Gaussian => (-(dn * dn) / (2.0 * d0 * d0)).exp(),
            FilterMethod::Butterworth => 1.0 / (1.0 + (dn / d0).powi(2 * self.order as i32)),
        }
    }

    fn bandpass(&self, dn: f64) -> f64 {
        match self.method {
            FilterMethod::Ideal => {
                if dn >= self.cutoff && dn <= self.cutoff_high {
                    1.0
                } else {
                    0.0
                }
            }
            _ => self.lowpass(dn, self.cutoff_high) * (1.0 - self.lowpass(dn, self.cutoff)),
        }
    }

    fn notch(&self, dn: f64) -> f64 {
        let offset = (dn - self.cutoff).abs();
        let w = self.notch_width;
        match self.method {
            FilterMethod::Ideal => {
                if offset <= w / 2.0 {
                    0.0
                } else {
                    1.0
                }
            }
            FilterMethod::Gaussian => 1.0 - (-(offset * offset) / (2.0 * w * w)).exp(),
            FilterMethod::Butterworth => {
                if offset == 0.0 {
                    0.0
                } else {
                    1.0 / (1.0 + (w / offset).powi(2 * self.order as i32))
                }
            }
        }
    }

    /// The gain of the filter at normalized distance `dn` from the center.
    pub fn response(&self, dn: f64) -> f64 {
        match self.filter_type {
            FilterType::Lowpass => self.lowpass(dn, self.cutoff),
            FilterType::Highpass => 1.0 - self.lowpass(dn, self.cutoff),
            FilterType::Bandpass => self.bandpass(dn),
            FilterType::Bandstop => 1.0 - self.bandpass(dn),
            FilterType::Notch => self.notch(dn),
        }
    }
}

/// Build the centered mask of a frequency filter.
///
/// Distances are normalized by `D_max = sqrt((H/2)^2 + (W/2)^2)`; a one
/// pixel image has every normalized distance at zero.
pub fn frequency_mask(size: ImageSize, filter: &FrequencyFilter) -> Result<Vec<f64>, ImageError> {
    filter.validate()?;
    let d_max = ((size.height / 2) as f64).hypot((size.width / 2) as f64);
    Ok(center_distances(size)
        .into_iter()
        .map(|d| {
            let dn = if d_max > 0.0 { d / d_max } else { 0.0 };
            filter.response(dn)
        })
        .collect())
}

/// Filter a plane through a centered spectral mask.
fn filter_plane(plane: &[f64], size: ImageSize, fft: &Fft2d, mask: &[f64]) -> Result<Vec<f64>, ImageError> {
    let mut spectrum = plane.iter().map(|&v| Complex::new(v, 0.0)).collect::<Vec<_>>();
    fft.forward(&mut spectrum)?;
    apply_centered_mask(&mut spectrum, mask, size);
    fft.inverse(&mut spectrum)?;
    Ok(spectrum.into_iter().map(|v| v.re).collect())
}

/// Apply a radial frequency filter to every channel of an image.
///
/// # Returns
///
/// A tuple `(filtered, mask)`: the filtered image with the input channel
/// count, and the centered mask as a single channel image scaled to 255.
///
/// # Example
///
/// ```
/// use prism_image::RasterImage;
/// use prism_imgproc::fft::{frequency_filter, FilterMethod, FilterType, FrequencyFilter};
///
/// let image = RasterImage::new([2, 2].into(), 1, vec![0, 100, 200, 100]).unwrap();
/// let filter = FrequencyFilter {
///     filter_type: FilterType::Lowpass,
///     method: FilterMethod::Ideal,
///     cutoff: 0.0,
///     cutoff_high: 1.0,
///     order: 2,
///     notch_width: 0.02,
/// };
/// let (out, _mask) = frequency_filter(&image, &filter).unwrap();
/// assert_eq!(out.as_slice(), &[100, 100, 100, 100]);
/// ```
pub fn frequency_filter(
    src: &RasterImage,
    filter: &FrequencyFilter,
) -> Result<(RasterImage, RasterImage), ImageError> {
    let size = src.size();
    let mask = frequency_mask(size, filter)?;
    let fft = Fft2d::new(size);

    let filtered = parallel::map_planes(src, |plane, size| {
        let plane = plane.iter().map(|&v| v as f64).collect::<Vec<_>>();
        let out = filter_plane(&plane, size, &fft, &mask)?;
        ensure_finite(&out, "frequency filter")?;
        Ok(out.into_iter().map(|v| v as f32).collect())
    })?;

    let mask_plane = mask.iter().map(|&m| (m * 255.0) as f32).collect::<Vec<_>>();
    Ok((filtered, RasterImage::from_planes_f32(size, &[mask_plane])?))
}

/// Illumination correction by filtering the log intensities.
///
/// The mask is `H(D) = (gamma_high - gamma_low) * (1 - exp(-c * D^2 / D0^2)) + gamma_low`
/// where `D` is the distance in pixels from the spectrum center and `D0` is
/// `cutoff`. Every channel is transformed with `log(1 + x)`, filtered,
/// mapped back with `exp(x) - 1` and clipped to `[0, 255]`.
///
/// # Returns
///
/// A tuple `(filtered, mask)` where the mask is normalized to its maximum.
pub fn homomorphic_filter(
    src: &RasterImage,
    gamma_low: f64,
    gamma_high: f64,
    cutoff: f64,
    c: f64,
) -> Result<(RasterImage, RasterImage), ImageError> {
    if !gamma_low.is_finite() || gamma_low < 0.0 {
        return Err(ImageError::invalid_param(
            "gamma_low",
            format!("must be a non-negative number, got {gamma_low}"),
        ));
    }
    if !gamma_high.is_finite() || gamma_high < 0.0 {
        return Err(ImageError::invalid_param(
            "gamma_high",
            format!("must be a non-negative number, got {gamma_high}"),
        ));
    }
    if !cutoff.is_finite() || cutoff <= 0.0 {
        return Err(ImageError::invalid_param(
            "cutoff",
            format!("must be a positive number of pixels, got {cutoff}"),
        ));
    }
    if !c.is_finite() || c <= 0.0 {
        return Err(ImageError::invalid_param(
            "c",
            format!("must be positive, got {c}"),
        ));
    }

    let size = src.size();
    let mask = center_distances(size)
        .into_iter()
        .map(|d| (gamma_high - gamma_low) * (1.0 - (-c * d * d / (cutoff * cutoff)).exp()) + gamma_low)
        .collect::<Vec<_>>();
    let fft = Fft2d::new(size);

    let filtered = parallel::map_planes(src, |plane, size| {
        let log_plane = plane.iter().map(|&v| (v as f64).ln_1p()).collect::<Vec<_>>();
        let out = filter_plane(&log_plane, size, &fft, &mask)?;
        let out = out.into_iter().map(f64::exp_m1).collect::<Vec<_>>();
        ensure_finite(&out, "homomorphic filter")?;
        Ok(out.into_iter().map(|v| v.clamp(0.0, 255.0) as f32).collect())
    })?;

    Ok((filtered, normalize_to_u8(&mask, size)?))
}

/// Saturating conversion of a real plane into an 8-bit single channel image.
pub(crate) fn plane_to_image(plane: &[f64], size: ImageSize) -> Result<RasterImage, ImageError> {
    let plane = plane.iter().map(|&v| saturate_u8(v as f32)).collect::<Vec<_>>();
    RasterImage::new(size, 1, plane)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(filter_type: FilterType, method: FilterMethod, cutoff: f64) -> FrequencyFilter {
        FrequencyFilter {
            filter_type,
            method,
            cutoff,
            cutoff_high: 0.7,
            order: 2,
            notch_width: 0.02,
        }
    }

    #[test]
    fn test_fft2d_roundtrip() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 3,
        };
        let input = (0..15).map(|v| Complex::new(v as f64, 0.0)).collect::<Vec<_>>();
        let fft = Fft2d::new(size);
        let mut data = input.clone();
        fft.forward(&mut data)?;
        approx::assert_relative_eq!(data[0].re, 105.0, epsilon = 1e-9);
        fft.inverse(&mut data)?;
        for (a, b) in data.iter().zip(&input) {
            approx::assert_relative_eq!(a.re, b.re, epsilon = 1e-9);
            approx::assert_relative_eq!(a.im, 0.0, epsilon = 1e-9);
        }
        assert!(fft.forward(&mut data[..4]).is_err());
        Ok(())
    }

    #[test]
    fn test_fftshift() {
        let size = ImageSize {
            width: 3,
            height: 2,
        };
        let shifted = fftshift(&[0, 1, 2, 3, 4, 5], size);
        assert_eq!(shifted, vec![5, 3, 4, 2, 0, 1]);
    }

    #[test]
    fn test_fft_transform_constant_image() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([4, 4].into(), 3, 10)?;
        let (magnitude, phase) = fft_transform(&image, true, true)?;
        assert_eq!(magnitude.num_channels(), 1);
        // only the centered DC term is non zero
        assert_eq!(magnitude.get_pixel(2, 2, 0)?, 255);
        assert_eq!(magnitude.get_pixel(0, 0, 0)?, 0);
        // zero phase sits in the middle of the range
        assert_eq!(phase.get_pixel(2, 2, 0)?, 128);

        let (unshifted, _) = fft_transform(&image, false, false)?;
        assert_eq!(unshifted.get_pixel(0, 0, 0)?, 255);
        Ok(())
    }

    #[test]
    fn test_masks() -> Result<(), ImageError> {
        let lp = filter(FilterType::Lowpass, FilterMethod::Ideal, 0.5);
        assert_eq!(lp.response(0.5), 1.0);
        assert_eq!(lp.response(0.51), 0.0);

        let hp = filter(FilterType::Highpass, FilterMethod::Gaussian, 0.3);
        approx::assert_relative_eq!(hp.response(0.0), 0.0);
        approx::assert_relative_eq!(hp.response(0.3), 1.0 - (-0.5f64).exp());

        let bw = filter(FilterType::Lowpass, FilterMethod::Butterworth, 0.4);
        approx::assert_relative_eq!(bw.response(0.4), 0.5);

        let bp = filter(FilterType::Bandpass, FilterMethod::Ideal, 0.3);
        assert_eq!(bp.response(0.5), 1.0);
        assert_eq!(bp.response(0.2), 0.0);
        let bs = filter(FilterType::Bandstop, FilterMethod::Ideal, 0.3);
        assert_eq!(bs.response(0.5), 0.0);

        let notch = filter(FilterType::Notch, FilterMethod::Ideal, 0.5);
        assert_eq!(notch.response(0.505), 0.0);
        assert_eq!(notch.response(0.6), 1.0);
        let notch = filter(FilterType::Notch, FilterMethod::Butterworth, 0.5);
        assert_eq!(notch.response(0.5), 0.0);

        let zero = filter(FilterType::Lowpass, FilterMethod::Gaussian, 0.0);
        assert_eq!(zero.response(0.0), 1.0);
        assert_eq!(zero.response(0.1), 0.0);
        Ok(())
    }

    #[test]
    fn test_mask_validation() {
        let size = ImageSize {
            width: 4,
            height: 4,
        };
        let mut f = filter(FilterType::Bandpass, FilterMethod::Gaussian, 0.8);
        assert!(frequency_mask(size, &f).is_err());
        f.cutoff = 0.2;
        assert!(frequency_mask(size, &f).is_ok());
        f.order = 0;
        assert!(frequency_mask(size, &f).is_err());
        assert!(frequency_mask(size, &filter(FilterType::Lowpass, FilterMethod::Ideal, 1.5)).is_err());
    }

    #[test]
    fn test_lowpass_zero_cutoff_gives_mean() -> Result<(), ImageError> {
        let image = RasterImage::new([4, 2].into(), 1, vec![0, 10, 20, 30, 40, 50, 60, 70])?;
        let f = filter(FilterType::Lowpass, FilterMethod::Ideal, 0.0);
        let (out, mask) = frequency_filter(&image, &f)?;
        assert!(out.as_slice().iter().all(|&v| v == 35));
        assert_eq!(mask.get_pixel(2, 1, 0)?, 255);
        assert_eq!(mask.as_slice().iter().filter(|&&v| v > 0).count(), 1);
        Ok(())
    }

    #[test]
    fn test_highpass_removes_constant() -> Result<(), ImageError> {
        let image = RasterImage::from_size_val([8, 8].into(), 3, 200)?;
        let f = filter(FilterType::Highpass, FilterMethod::Butterworth, 0.3);
        let (out, _) = frequency_filter(&image, &f)?;
        assert_eq!(out.num_channels(), 3);
        assert!(out.as_slice().iter().all(|&v| v == 0));
        Ok(())
    }

    #[test]
    fn test_homomorphic_flat_gain() -> Result<(), ImageError> {
        // equal gains leave the log image untouched
        let image = RasterImage::new([4, 4].into(), 1, (0..16).map(|v| v * 15).collect())?;
        let (out, mask) = homomorphic_filter(&image, 1.0, 1.0, 30.0, 1.0)?;
        assert_eq!(out, image);
        assert!(mask.as_slice().iter().all(|&v| v == 255));
        assert!(homomorphic_filter(&image, 0.3, 1.5, 0.0, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_plane_to_image() -> Result<(), ImageError> {
        let out = plane_to_image(&[-4.0, 12.4, 300.0], [3, 1].into())?;
        assert_eq!(out.as_slice(), &[0, 12, 255]);
        Ok(())
    }
}
