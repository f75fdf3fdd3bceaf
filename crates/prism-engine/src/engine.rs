use std::collections::BTreeMap;
use std::sync::Arc;

use prism_image::RasterImage;
use prism_imgproc::{
    analysis, denoise, edges,
    fft::{self, FilterType, FrequencyFilter},
    filter, histogram, morphology, noise,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::ProcessingError;
use crate::operation::{FrequencyParams, Operation};
use crate::request::ProcessingRequest;

/// A by-product of an operation, next to its main raster.
#[derive(Debug, Clone, PartialEq)]
pub enum Auxiliary {
    /// An image, such as a phase spectrum or a frequency mask.
    Raster(Arc<RasterImage>),
    /// One 256 bin histogram per channel.
    Histogram(Vec<Vec<u64>>),
    /// A single number.
    Scalar(f64),
    /// Named numbers.
    Scalars(BTreeMap<String, f64>),
}

impl Auxiliary {
    fn size_bytes(&self) -> usize {
        match self {
            Self::Raster(raster) => raster.numel(),
            Self::Histogram(hists) => hists.iter().map(|h| h.len() * 8).sum(),
            Self::Scalar(_) => 8,
            Self::Scalars(values) => values.keys().map(|k| k.len() + 8).sum(),
        }
    }
}

/// The output of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    /// The main output image.
    pub raster: Arc<RasterImage>,
    /// Operation specific by-products, keyed by name.
    pub auxiliary: BTreeMap<String, Auxiliary>,
}

impl ProcessingResult {
    fn new(raster: impl Into<Arc<RasterImage>>) -> Self {
        Self {
            raster: raster.into(),
            auxiliary: BTreeMap::new(),
        }
    }

    fn with(mut self, name: &str, aux: Auxiliary) -> Self {
        self.auxiliary.insert(name.to_string(), aux);
        self
    }

    /// Approximate memory held by the result.
    pub fn size_bytes(&self) -> usize {
        self.raster.numel() + self.auxiliary.values().map(Auxiliary::size_bytes).sum::<usize>()
    }
}

fn histogram_aux(image: &RasterImage) -> Result<Auxiliary, ProcessingError> {
    let hists = histogram::histogram(image)?;
    Ok(Auxiliary::Histogram(
        hists.iter().map(|h| h.to_vec()).collect(),
    ))
}

fn ensure_finite(name: &str, value: f64) -> Result<f64, ProcessingError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProcessingError::computation(format!(
            "{name} is not finite: {value}"
        )))
    }
}

fn frequency(
    image: &RasterImage,
    filter_type: FilterType,
    p: &FrequencyParams,
) -> Result<ProcessingResult, ProcessingError> {
    let filter = FrequencyFilter {
        filter_type,
        method: p.method,
        cutoff: p.cutoff,
        cutoff_high: p.cutoff_high,
        order: p.order,
        notch_width: p.notch_width,
    };
    let (filtered, mask) = fft::frequency_filter(image, &filter)?;
    Ok(ProcessingResult::new(filtered).with("mask", Auxiliary::Raster(Arc::new(mask))))
}

/// Runs validated requests against images.
///
/// The engine holds no state, every call is independent and may run on any
/// thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingEngine;

impl ProcessingEngine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Run a request on an image.
    ///
    /// Seeded noise is reproducible. Unseeded noise draws from an OS seeded
    /// generator.
    ///
    /// # Arguments
    ///
    /// * `image` - The source image, left untouched.
    /// * `request` - The validated request.
    ///
    /// # Returns
    ///
    /// The output raster and the by-products of the operation.
    pub fn process(
        &self,
        image: &Arc<RasterImage>,
        request: &ProcessingRequest,
    ) -> Result<ProcessingResult, ProcessingError> {
        let mut rng = match request.operation().seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        self.process_with_rng(image, request, &mut rng)
    }

    /// Run a request drawing randomness from `rng`.
    pub fn process_with_rng<R: Rng + ?Sized>(
        &self,
        image: &Arc<RasterImage>,
        request: &ProcessingRequest,
        rng: &mut R,
    ) -> Result<ProcessingResult, ProcessingError> {
        log::debug!(
            "running {} on image {} ({}, {} channels)",
            request.operation().id(),
            request.image_id(),
            image.size(),
            image.num_channels()
        );
        let result = run(image, request.operation(), rng)?;

        let (out, src) = (result.raster.size(), image.size());
        if out != src {
            return Err(ProcessingError::computation(format!(
                "{} produced a {out} image from a {src} image",
                request.operation().id()
            )));
        }
        Ok(result)
    }
}

fn run<R: Rng + ?Sized>(
    image: &Arc<RasterImage>,
    op: &Operation,
    rng: &mut R,
) -> Result<ProcessingResult, ProcessingError> {
    let src: &RasterImage = image;

    let result = match op {
        Operation::Histogram => {
            ProcessingResult::new(image.clone()).with("histogram", histogram_aux(src)?)
        }
        Operation::EqualizeGlobal => {
            let out = histogram::equalize_global(src)?;
            let hist = histogram_aux(&out)?;
            ProcessingResult::new(out).with("histogram", hist)
        }
        Operation::EqualizeClahe(p) => {
            let out = histogram::equalize_clahe(src, p.clip_limit, p.tile_size)?;
            let hist = histogram_aux(&out)?;
            ProcessingResult::new(out).with("histogram", hist)
        }
        Operation::EqualizeAdaptive(p) => {
            let out = histogram::equalize_adaptive(src, p.kernel_size)?;
            let hist = histogram_aux(&out)?;
            ProcessingResult::new(out).with("histogram", hist)
        }
        Operation::ContrastStretch(p) => {
            let out = histogram::contrast_stretch(src, p.low_percentile, p.high_percentile)?;
            let hist = histogram_aux(&out)?;
            ProcessingResult::new(out).with("histogram", hist)
        }

        Operation::Blur(p) | Operation::DenoiseGaussian(p) => {
            ProcessingResult::new(filter::gaussian_blur(src, p.kernel_size, p.sigma as f32)?)
        }
        Operation::BoxBlur(p) => ProcessingResult::new(filter::box_blur(src, p.kernel_size)?),
        Operation::Median(p) | Operation::DenoiseMedian(p) => {
            ProcessingResult::new(filter::median_blur(src, p.kernel_size)?)
        }
        Operation::Bilateral(p) | Operation::DenoiseBilateral(p) => ProcessingResult::new(
            filter::bilateral_filter(src, p.d, p.sigma_color as f32, p.sigma_space as f32)?,
        ),
        Operation::Sharpen { strength } => {
            ProcessingResult::new(filter::sharpen(src, *strength as f32)?)
        }
        Operation::UnsharpMask(p) => ProcessingResult::new(filter::unsharp_mask(
            src,
            p.sigma as f32,
            p.strength as f32,
            p.threshold as f32,
        )?),
        Operation::EdgeSobel { ksize } => ProcessingResult::new(edges::sobel(src, *ksize)?),
        Operation::EdgeLaplacian { ksize } => {
            ProcessingResult::new(edges::laplacian(src, *ksize)?)
        }
        Operation::EdgeCanny(p) => ProcessingResult::new(edges::canny(
            src,
            p.threshold1 as f32,
            p.threshold2 as f32,
        )?),
        Operation::Emboss => ProcessingResult::new(filter::emboss(src)?),
        Operation::HighPass(p) => ProcessingResult::new(filter::high_pass(src, p.kernel_size)?),
        Operation::LowPass(p) => ProcessingResult::new(filter::low_pass(src, p.kernel_size)?),
        Operation::Custom { kernel } => {
            let kernel = kernel.map(|v| v as f32);
            ProcessingResult::new(filter::custom_kernel(src, &kernel)?)
        }

        Operation::Fft(p) => {
            let (magnitude, phase) = fft::fft_transform(src, p.shift, p.log_scale)?;
            ProcessingResult::new(magnitude).with("phase", Auxiliary::Raster(Arc::new(phase)))
        }
        Operation::Lowpass(p) => frequency(src, FilterType::Lowpass, p)?,
        Operation::Highpass(p) => frequency(src, FilterType::Highpass, p)?,
        Operation::Bandpass(p) => frequency(src, FilterType::Bandpass, p)?,
        Operation::Bandstop(p) => frequency(src, FilterType::Bandstop, p)?,
        Operation::Notch(p) => frequency(src, FilterType::Notch, p)?,
        Operation::Homomorphic(p) => {
            let (out, mask) =
                fft::homomorphic_filter(src, p.gamma_low, p.gamma_high, p.cutoff, p.c)?;
            ProcessingResult::new(out).with("mask", Auxiliary::Raster(Arc::new(mask)))
        }

        Operation::GaussianNoise(p) => {
            ProcessingResult::new(noise::gaussian_noise(src, p.mean, p.std, rng)?)
        }
        Operation::SaltPepper(p) => ProcessingResult::new(noise::salt_pepper_noise(
            src,
            p.amount,
            p.salt_ratio,
            rng,
        )?),
        Operation::PoissonNoise(p) => {
            ProcessingResult::new(noise::poisson_noise(src, p.scale, rng)?)
        }
        Operation::SpeckleNoise(p) => {
            ProcessingResult::new(noise::speckle_noise(src, p.std, rng)?)
        }
        Operation::UniformNoise(p) => {
            ProcessingResult::new(noise::uniform_noise(src, p.low, p.high, rng)?)
        }

        Operation::Nlm(p) => ProcessingResult::new(denoise::non_local_means(
            src,
            p.h as f32,
            p.template_window_size,
            p.search_window_size,
        )?),
        Operation::Morphological(p) => ProcessingResult::new(
            morphology::morphological_denoise(src, p.operation, p.kernel_size)?,
        ),
        Operation::Wiener(p) => {
            let (out, variance) = denoise::wiener_filter(src, p.noise_variance)?;
            let variance = ensure_finite("noise variance", variance)?;
            ProcessingResult::new(out).with("noise_variance", Auxiliary::Scalar(variance))
        }

        Operation::Statistics => {
            let stats = analysis::statistics(src)?;
            let names = analysis::channel_names(src.num_channels());
            let mut values = BTreeMap::new();
            for (name, s) in names.iter().zip(&stats) {
                values.insert(format!("{name}_mean"), s.mean);
                values.insert(format!("{name}_std"), s.std);
                values.insert(format!("{name}_min"), s.min as f64);
                values.insert(format!("{name}_max"), s.max as f64);
                values.insert(format!("{name}_median"), s.median);
            }
            ProcessingResult::new(image.clone()).with("statistics", Auxiliary::Scalars(values))
        }
        Operation::EstimateNoise(p) => {
            let sigma = ensure_finite("noise level", analysis::estimate_noise(src, p.method)?)?;
            ProcessingResult::new(image.clone()).with("noise_level", Auxiliary::Scalar(sigma))
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OperationRegistry;
    use serde_json::{json, Map, Value};

    fn request(id: &str, params: Value) -> Result<ProcessingRequest, ProcessingError> {
        let raw = params.as_object().cloned().unwrap_or_default();
        OperationRegistry::new().validate(&"img".into(), id, &raw)
    }

    fn ramp(width: usize, height: usize, channels: usize) -> Arc<RasterImage> {
        let data = (0..width * height * channels)
            .map(|i| ((i * 37) % 256) as u8)
            .collect();
        match RasterImage::new([width, height].into(), channels, data) {
            Ok(image) => Arc::new(image),
            Err(err) => panic!("{err}"),
        }
    }

    #[test]
    fn test_every_operation_keeps_the_size() -> Result<(), ProcessingError> {
        let engine = ProcessingEngine::new();
        let registry = OperationRegistry::new();
        let image = ramp(24, 16, 3);
        for spec in registry.list() {
            let req = registry.validate(&"img".into(), spec.id, &Map::new())?;
            let result = engine.process(&image, &req)?;
            assert_eq!(result.raster.size(), image.size(), "{}", spec.id);
        }
        Ok(())
    }

    #[test]
    fn test_auxiliary_outputs() -> Result<(), ProcessingError> {
        let engine = ProcessingEngine::new();
        let image = ramp(16, 16, 1);

        let result = engine.process(&image, &request("histogram", json!({}))?)?;
        assert!(Arc::ptr_eq(&result.raster, &image));
        match result.auxiliary.get("histogram") {
            Some(Auxiliary::Histogram(hists)) => {
                assert_eq!(hists.len(), 1);
                assert_eq!(hists[0].iter().sum::<u64>(), 256);
            }
            other => panic!("unexpected {other:?}"),
        }

        let result = engine.process(&image, &request("fft", json!({}))?)?;
        assert!(matches!(result.auxiliary.get("phase"), Some(Auxiliary::Raster(_))));

        let result = engine.process(&image, &request("notch", json!({}))?)?;
        assert!(matches!(result.auxiliary.get("mask"), Some(Auxiliary::Raster(_))));

        let result = engine.process(&image, &request("wiener", json!({"noise_variance": 4}))?)?;
        assert_eq!(result.auxiliary.get("noise_variance"), Some(&Auxiliary::Scalar(4.0)));

        let result = engine.process(&image, &request("statistics", json!({}))?)?;
        match result.auxiliary.get("statistics") {
            Some(Auxiliary::Scalars(values)) => {
                assert_eq!(values.len(), 5);
                assert!(values.contains_key("intensity_median"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let result = engine.process(&image, &request("estimate_noise", json!({}))?)?;
        assert!(matches!(
            result.auxiliary.get("noise_level"),
            Some(Auxiliary::Scalar(v)) if *v >= 0.0
        ));
        Ok(())
    }

    #[test]
    fn test_seeded_noise_is_reproducible() -> Result<(), ProcessingError> {
        let engine = ProcessingEngine::new();
        let image = ramp(32, 32, 3);
        let req = request("gaussian_noise", json!({"std": 20, "seed": 42}))?;
        let a = engine.process(&image, &req)?;
        let b = engine.process(&image, &req)?;
        assert_eq!(a.raster, b.raster);
        assert_ne!(*a.raster, *image);
        Ok(())
    }

    #[test]
    fn test_single_level_image_edge_cases() -> Result<(), ProcessingError> {
        let engine = ProcessingEngine::new();
        let flat = Arc::new(RasterImage::from_size_val([8, 8].into(), 1, 77)?);

        let result = engine.process(&flat, &request("equalize_global", json!({}))?)?;
        assert_eq!(*result.raster, *flat);

        let result = engine.process(&flat, &request("contrast_stretch", json!({}))?)?;
        assert_eq!(*result.raster, *flat);
        Ok(())
    }

    #[test]
    fn test_one_pixel_image() -> Result<(), ProcessingError> {
        let engine = ProcessingEngine::new();
        let pixel = Arc::new(RasterImage::from_size_val([1, 1].into(), 3, 200)?);
        let result = engine.process(&pixel, &request("blur", json!({"kernel_size": 21}))?)?;
        assert_eq!(result.raster.as_slice(), &[200, 200, 200]);
        Ok(())
    }

    #[test]
    fn test_size_bytes_counts_auxiliary() -> Result<(), ProcessingError> {
        let engine = ProcessingEngine::new();
        let image = ramp(8, 8, 1);
        let plain = engine.process(&image, &request("box_blur", json!({}))?)?;
        assert_eq!(plain.size_bytes(), 64);
        let spectrum = engine.process(&image, &request("fft", json!({}))?)?;
        assert_eq!(spectrum.size_bytes(), 128);
        Ok(())
    }
}
