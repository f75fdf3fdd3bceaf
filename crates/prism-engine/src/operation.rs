use std::collections::BTreeMap;

use prism_imgproc::{analysis::NoiseEstimator, fft::FilterMethod, morphology::MorphOp};
use serde::Serialize;

use crate::error::ProcessingError;
use crate::params::{ParamSet, ParamValue};

/// The family an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Histogram computation and intensity remapping.
    Histogram,
    /// Spatial filters and edge detectors.
    Filter,
    /// Fourier transform and frequency domain filters.
    Frequency,
    /// Noise synthesis.
    Noise,
    /// Noise removal.
    Denoise,
    /// Image statistics.
    Analysis,
}

impl Category {
    /// Every category, in catalog order.
    pub const ALL: [Category; 6] = [
        Category::Histogram,
        Category::Filter,
        Category::Frequency,
        Category::Noise,
        Category::Denoise,
        Category::Analysis,
    ];

    /// The lowercase name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Histogram => "histogram",
            Category::Filter => "filter",
            Category::Frequency => "frequency",
            Category::Noise => "noise",
            Category::Denoise => "denoise",
            Category::Analysis => "analysis",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ProcessingError::invalid_param("category", format!("unknown category `{s}`")))
    }
}

/// Parameters of contrast limited adaptive equalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Clip limit relative to a uniform histogram.
    pub clip_limit: f64,
    /// Number of tiles along each axis.
    pub tile_size: usize,
}

/// Parameters of a percentile contrast stretch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchParams {
    /// Percentile mapped to 0.
    pub low_percentile: f64,
    /// Percentile mapped to 255.
    pub high_percentile: f64,
}

/// Parameters of a gaussian blur.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    /// Odd kernel side length.
    pub kernel_size: usize,
    /// Standard deviation of the kernel.
    pub sigma: f64,
}

/// A single odd window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelParams {
    /// Odd kernel side length.
    pub kernel_size: usize,
}

/// Parameters of a bilateral filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Neighborhood diameter, non-positive values derive it from `sigma_space`.
    pub d: i32,
    /// Intensity sigma.
    pub sigma_color: f64,
    /// Spatial sigma.
    pub sigma_space: f64,
}

/// Parameters of unsharp masking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnsharpParams {
    /// Blur sigma.
    pub sigma: f64,
    /// Amount of detail added back.
    pub strength: f64,
    /// Smallest difference that gets sharpened.
    pub threshold: f64,
}

/// Parameters of the Canny detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyParams {
    /// Low hysteresis threshold.
    pub threshold1: f64,
    /// High hysteresis threshold.
    pub threshold2: f64,
}

/// Parameters of the spectrum display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrumParams {
    /// Move the zero frequency to the center.
    pub shift: bool,
    /// Log compress the magnitude.
    pub log_scale: bool,
}

/// Parameters shared by the radial frequency filters.
///
/// Fields that a filter kind does not use keep their defaults and are not
/// part of its parameter list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyParams {
    /// Cutoff as a fraction of the maximum radius.
    pub cutoff: f64,
    /// Upper cutoff of band filters.
    pub cutoff_high: f64,
    /// Transition profile.
    pub method: FilterMethod,
    /// Butterworth order.
    pub order: u32,
    /// Width of the notch ring.
    pub notch_width: f64,
}

/// Parameters of the homomorphic filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomomorphicParams {
    /// Gain of the low frequencies.
    pub gamma_low: f64,
    /// Gain of the high frequencies.
    pub gamma_high: f64,
    /// Cutoff radius in pixels.
    pub cutoff: f64,
    /// Sharpness of the transition.
    pub c: f64,
}

/// Parameters of additive gaussian noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianNoiseParams {
    /// Noise mean.
    pub mean: f64,
    /// Noise standard deviation.
    pub std: f64,
    /// Seed of the random source.
    pub seed: Option<u64>,
}

/// Parameters of salt and pepper noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaltPepperParams {
    /// Fraction of pixels replaced.
    pub amount: f64,
    /// Fraction of replaced pixels set to white.
    pub salt_ratio: f64,
    /// Seed of the random source.
    pub seed: Option<u64>,
}

/// Parameters of poisson noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonParams {
    /// Photon count scale.
    pub scale: f64,
    /// Seed of the random source.
    pub seed: Option<u64>,
}

/// Parameters of speckle noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeckleParams {
    /// Standard deviation of the multiplicative term.
    pub std: f64,
    /// Seed of the random source.
    pub seed: Option<u64>,
}

/// Parameters of uniform noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformParams {
    /// Lower bound.
    pub low: f64,
    /// Upper bound.
    pub high: f64,
    /// Seed of the random source.
    pub seed: Option<u64>,
}

/// Parameters of non-local means.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlmParams {
    /// Filter strength.
    pub h: f64,
    /// Odd patch side length.
    pub template_window_size: usize,
    /// Odd search area side length.
    pub search_window_size: usize,
}

/// Parameters of morphological denoising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphologicalParams {
    /// Odd structuring element size.
    pub kernel_size: usize,
    /// Composition to apply.
    pub operation: MorphOp,
}

/// Parameters of the Wiener filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WienerParams {
    /// Noise variance, estimated when `None`.
    pub noise_variance: Option<f64>,
}

/// Parameters of noise level estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimateNoiseParams {
    /// Estimation strategy.
    pub method: NoiseEstimator,
}

/// A fully validated operation with typed parameters.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Operation {
    Histogram,
    EqualizeGlobal,
    EqualizeClahe(ClaheParams),
    EqualizeAdaptive(KernelParams),
    ContrastStretch(StretchParams),
    Blur(GaussianParams),
    BoxBlur(KernelParams),
    Median(KernelParams),
    Bilateral(BilateralParams),
    Sharpen { strength: f64 },
    UnsharpMask(UnsharpParams),
    EdgeSobel { ksize: usize },
    EdgeLaplacian { ksize: usize },
    EdgeCanny(CannyParams),
    Emboss,
    HighPass(KernelParams),
    LowPass(KernelParams),
    Custom { kernel: [f64; 9] },
    Fft(SpectrumParams),
    Lowpass(FrequencyParams),
    Highpass(FrequencyParams),
    Bandpass(FrequencyParams),
    Bandstop(FrequencyParams),
    Notch(FrequencyParams),
    Homomorphic(HomomorphicParams),
    GaussianNoise(GaussianNoiseParams),
    SaltPepper(SaltPepperParams),
    PoissonNoise(PoissonParams),
    SpeckleNoise(SpeckleParams),
    UniformNoise(UniformParams),
    DenoiseGaussian(GaussianParams),
    DenoiseMedian(KernelParams),
    DenoiseBilateral(BilateralParams),
    Nlm(NlmParams),
    Morphological(MorphologicalParams),
    Wiener(WienerParams),
    Statistics,
    EstimateNoise(EstimateNoiseParams),
}

fn method_from_str(s: &str) -> Result<FilterMethod, ProcessingError> {
    match s {
        "ideal" => Ok(FilterMethod::Ideal),
        "gaussian" => Ok(FilterMethod::Gaussian),
        "butterworth" => Ok(FilterMethod::Butterworth),
        other => Err(ProcessingError::invalid_param(
            "filter_method",
            format!("unknown method `{other}`"),
        )),
    }
}

fn method_str(method: FilterMethod) -> &'static str {
    match method {
        FilterMethod::Ideal => "ideal",
        FilterMethod::Gaussian => "gaussian",
        FilterMethod::Butterworth => "butterworth",
    }
}

fn morph_from_str(s: &str) -> Result<MorphOp, ProcessingError> {
    match s {
        "opening" => Ok(MorphOp::Opening),
        "closing" => Ok(MorphOp::Closing),
        "open_close" => Ok(MorphOp::OpenClose),
        other => Err(ProcessingError::invalid_param(
            "operation",
            format!("unknown operation `{other}`"),
        )),
    }
}

fn morph_str(op: MorphOp) -> &'static str {
    match op {
        MorphOp::Opening => "opening",
        MorphOp::Closing => "closing",
        MorphOp::OpenClose => "open_close",
    }
}

fn estimator_from_str(s: &str) -> Result<NoiseEstimator, ProcessingError> {
    match s {
        "mad" => Ok(NoiseEstimator::Mad),
        "laplacian" => Ok(NoiseEstimator::Laplacian),
        "difference" => Ok(NoiseEstimator::Difference),
        other => Err(ProcessingError::invalid_param(
            "method",
            format!("unknown method `{other}`"),
        )),
    }
}

fn estimator_str(method: NoiseEstimator) -> &'static str {
    match method {
        NoiseEstimator::Mad => "mad",
        NoiseEstimator::Laplacian => "laplacian",
        NoiseEstimator::Difference => "difference",
    }
}

fn seed_value(seed: Option<u64>) -> ParamValue {
    seed.map_or(ParamValue::Null, |s| ParamValue::Int(s as i64))
}

fn ensure_ordered(
    low_name: &str,
    low: f64,
    high_name: &'static str,
    high: f64,
    strict: bool,
) -> Result<(), ProcessingError> {
    let ok = if strict { low < high } else { low <= high };
    if !ok {
        let relation = if strict { "greater than" } else { "at least" };
        return Err(ProcessingError::invalid_param(
            high_name,
            format!("must be {relation} {low_name} ({low}), got {high}"),
        ));
    }
    Ok(())
}

impl GaussianParams {
    fn read(p: &ParamSet) -> Result<Self, ProcessingError> {
        Ok(Self {
            kernel_size: p.usize("kernel_size")?,
            sigma: p.float("sigma")?,
        })
    }
}

impl KernelParams {
    fn read(p: &ParamSet, name: &'static str) -> Result<Self, ProcessingError> {
        Ok(Self {
            kernel_size: p.usize(name)?,
        })
    }
}

impl BilateralParams {
    fn read(p: &ParamSet) -> Result<Self, ProcessingError> {
        let d = p.int("d")?;
        Ok(Self {
            d: i32::try_from(d).map_err(|_| ProcessingError::invalid_param("d", "out of range"))?,
            sigma_color: p.float("sigma_color")?,
            sigma_space: p.float("sigma_space")?,
        })
    }

    fn write(&self, out: &mut BTreeMap<&'static str, ParamValue>) {
        out.insert("d", ParamValue::Int(self.d as i64));
        out.insert("sigma_color", ParamValue::Float(self.sigma_color));
        out.insert("sigma_space", ParamValue::Float(self.sigma_space));
    }
}

impl FrequencyParams {
    fn read(p: &ParamSet, band: bool, notch: bool) -> Result<Self, ProcessingError> {
        let params = Self {
            cutoff: p.float("cutoff")?,
            cutoff_high: if band { p.float("cutoff_high")? } else { 1.0 },
            method: method_from_str(p.choice("filter_method")?)?,
            order: u32::try_from(p.int("filter_order")?)
                .map_err(|_| ProcessingError::invalid_param("filter_order", "out of range"))?,
            notch_width: if notch { p.float("notch_width")? } else { 0.05 },
        };
        if band {
            ensure_ordered("cutoff", params.cutoff, "cutoff_high", params.cutoff_high, true)?;
        }
        Ok(params)
    }

    fn write(&self, out: &mut BTreeMap<&'static str, ParamValue>, band: bool, notch: bool) {
        out.insert("cutoff", ParamValue::Float(self.cutoff));
        if band {
            out.insert("cutoff_high", ParamValue::Float(self.cutoff_high));
        }
        if notch {
            out.insert("notch_width", ParamValue::Float(self.notch_width));
        }
        out.insert("filter_method", ParamValue::Choice(method_str(self.method).to_string()));
        out.insert("filter_order", ParamValue::Int(self.order as i64));
    }
}

impl Operation {
    /// Build an operation from a complete validated parameter set.
    ///
    /// Runs the checks that involve more than one parameter.
    pub(crate) fn from_params(id: &str, p: &ParamSet) -> Result<Self, ProcessingError> {
        let op = match id {
            "histogram" => Self::Histogram,
            "equalize_global" => Self::EqualizeGlobal,
            "equalize_clahe" => Self::EqualizeClahe(ClaheParams {
                clip_limit: p.float("clip_limit")?,
                tile_size: p.usize("tile_size")?,
            }),
            "equalize_adaptive" => Self::EqualizeAdaptive(KernelParams::read(p, "window_size")?),
            "contrast_stretch" => {
                let params = StretchParams {
                    low_percentile: p.float("low_percentile")?,
                    high_percentile: p.float("high_percentile")?,
                };
                ensure_ordered(
                    "low_percentile",
                    params.low_percentile,
                    "high_percentile",
                    params.high_percentile,
                    true,
                )?;
                Self::ContrastStretch(params)
            }
            "blur" => Self::Blur(GaussianParams::read(p)?),
            "box_blur" => Self::BoxBlur(KernelParams::read(p, "kernel_size")?),
            "median" => Self::Median(KernelParams::read(p, "kernel_size")?),
            "bilateral" => Self::Bilateral(BilateralParams::read(p)?),
            "sharpen" => Self::Sharpen {
                strength: p.float("strength")?,
            },
            "unsharp_mask" => Self::UnsharpMask(UnsharpParams {
                sigma: p.float("sigma")?,
                strength: p.float("strength")?,
                threshold: p.float("threshold")?,
            }),
            "edge_sobel" => Self::EdgeSobel {
                ksize: p.usize("ksize")?,
            },
            "edge_laplacian" => Self::EdgeLaplacian {
                ksize: p.usize("ksize")?,
            },
            "edge_canny" => {
                let params = CannyParams {
                    threshold1: p.float("threshold1")?,
                    threshold2: p.float("threshold2")?,
                };
                ensure_ordered(
                    "threshold1",
                    params.threshold1,
                    "threshold2",
                    params.threshold2,
                    false,
                )?;
                Self::EdgeCanny(params)
            }
            "emboss" => Self::Emboss,
            "high_pass" => Self::HighPass(KernelParams::read(p, "kernel_size")?),
            "low_pass" => Self::LowPass(KernelParams::read(p, "kernel_size")?),
            "custom" => {
                let rows = p.matrix("kernel")?;
                let mut kernel = [0.0; 9];
                for (dst, src) in kernel.iter_mut().zip(rows.iter().flatten()) {
                    *dst = *src;
                }
                Self::Custom { kernel }
            }
            "fft" => Self::Fft(SpectrumParams {
                shift: p.flag("shift")?,
                log_scale: p.flag("log_scale")?,
            }),
            "lowpass" => Self::Lowpass(FrequencyParams::read(p, false, false)?),
            "highpass" => Self::Highpass(FrequencyParams::read(p, false, false)?),
            "bandpass" => Self::Bandpass(FrequencyParams::read(p, true, false)?),
            "bandstop" => Self::Bandstop(FrequencyParams::read(p, true, false)?),
            "notch" => Self::Notch(FrequencyParams::read(p, false, true)?),
            "homomorphic" => Self::Homomorphic(HomomorphicParams {
                gamma_low: p.float("gamma_low")?,
                gamma_high: p.float("gamma_high")?,
                cutoff: p.float("cutoff")?,
                c: p.float("c")?,
            }),
            "gaussian_noise" => Self::GaussianNoise(GaussianNoiseParams {
                mean: p.float("mean")?,
                std: p.float("std")?,
                seed: p.opt_u64("seed")?,
            }),
            "salt_pepper" => Self::SaltPepper(SaltPepperParams {
                amount: p.float("amount")?,
                salt_ratio: p.float("salt_ratio")?,
                seed: p.opt_u64("seed")?,
            }),
            "poisson_noise" => Self::PoissonNoise(PoissonParams {
                scale: p.float("scale")?,
                seed: p.opt_u64("seed")?,
            }),
            "speckle_noise" => Self::SpeckleNoise(SpeckleParams {
                std: p.float("std")?,
                seed: p.opt_u64("seed")?,
            }),
            "uniform_noise" => {
                let params = UniformParams {
                    low: p.float("low")?,
                    high: p.float("high")?,
                    seed: p.opt_u64("seed")?,
                };
                ensure_ordered("low", params.low, "high", params.high, true)?;
                Self::UniformNoise(params)
            }
            "denoise_gaussian" => Self::DenoiseGaussian(GaussianParams::read(p)?),
            "denoise_median" => Self::DenoiseMedian(KernelParams::read(p, "kernel_size")?),
            "denoise_bilateral" => Self::DenoiseBilateral(BilateralParams::read(p)?),
            "nlm" => Self::Nlm(NlmParams {
                h: p.float("h")?,
                template_window_size: p.usize("template_window_size")?,
                search_window_size: p.usize("search_window_size")?,
            }),
            "morphological" => Self::Morphological(MorphologicalParams {
                kernel_size: p.usize("kernel_size")?,
                operation: morph_from_str(p.choice("operation")?)?,
            }),
            "wiener" => Self::Wiener(WienerParams {
                noise_variance: p.opt_float("noise_variance")?,
            }),
            "statistics" => Self::Statistics,
            "estimate_noise" => Self::EstimateNoise(EstimateNoiseParams {
                method: estimator_from_str(p.choice("method")?)?,
            }),
            other => return Err(ProcessingError::UnknownOperation(other.to_string())),
        };
        Ok(op)
    }

    /// The registry id of the operation.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Histogram => "histogram",
            Self::EqualizeGlobal => "equalize_global",
            Self::EqualizeClahe(_) => "equalize_clahe",
            Self::EqualizeAdaptive(_) => "equalize_adaptive",
            Self::ContrastStretch(_) => "contrast_stretch",
            Self::Blur(_) => "blur",
            Self::BoxBlur(_) => "box_blur",
            Self::Median(_) => "median",
            Self::Bilateral(_) => "bilateral",
            Self::Sharpen { .. } => "sharpen",
            Self::UnsharpMask(_) => "unsharp_mask",
            Self::EdgeSobel { .. } => "edge_sobel",
            Self::EdgeLaplacian { .. } => "edge_laplacian",
            Self::EdgeCanny(_) => "edge_canny",
            Self::Emboss => "emboss",
            Self::HighPass(_) => "high_pass",
            Self::LowPass(_) => "low_pass",
            Self::Custom { .. } => "custom",
            Self::Fft(_) => "fft",
            Self::Lowpass(_) => "lowpass",
            Self::Highpass(_) => "highpass",
            Self::Bandpass(_) => "bandpass",
            Self::Bandstop(_) => "bandstop",
            Self::Notch(_) => "notch",
            Self::Homomorphic(_) => "homomorphic",
            Self::GaussianNoise(_) => "gaussian_noise",
            Self::SaltPepper(_) => "salt_pepper",
            Self::PoissonNoise(_) => "poisson_noise",
            Self::SpeckleNoise(_) => "speckle_noise",
            Self::UniformNoise(_) => "uniform_noise",
            Self::DenoiseGaussian(_) => "denoise_gaussian",
            Self::DenoiseMedian(_) => "denoise_median",
            Self::DenoiseBilateral(_) => "denoise_bilateral",
            Self::Nlm(_) => "nlm",
            Self::Morphological(_) => "morphological",
            Self::Wiener(_) => "wiener",
            Self::Statistics => "statistics",
            Self::EstimateNoise(_) => "estimate_noise",
        }
    }

    /// The family of the operation.
    pub fn category(&self) -> Category {
        match self {
            Self::Histogram
            | Self::EqualizeGlobal
            | Self::EqualizeClahe(_)
            | Self::EqualizeAdaptive(_)
            | Self::ContrastStretch(_) => Category::Histogram,
            Self::Blur(_)
            | Self::BoxBlur(_)
            | Self::Median(_)
            | Self::Bilateral(_)
            | Self::Sharpen { .. }
            | Self::UnsharpMask(_)
            | Self::EdgeSobel { .. }
            | Self::EdgeLaplacian { .. }
            | Self::EdgeCanny(_)
            | Self::Emboss
            | Self::HighPass(_)
            | Self::LowPass(_)
            | Self::Custom { .. } => Category::Filter,
            Self::Fft(_)
            | Self::Lowpass(_)
            | Self::Highpass(_)
            | Self::Bandpass(_)
            | Self::Bandstop(_)
            | Self::Notch(_)
            | Self::Homomorphic(_) => Category::Frequency,
            Self::GaussianNoise(_)
            | Self::SaltPepper(_)
            | Self::PoissonNoise(_)
            | Self::SpeckleNoise(_)
            | Self::UniformNoise(_) => Category::Noise,
            Self::DenoiseGaussian(_)
            | Self::DenoiseMedian(_)
            | Self::DenoiseBilateral(_)
            | Self::Nlm(_)
            | Self::Morphological(_)
            | Self::Wiener(_) => Category::Denoise,
            Self::Statistics | Self::EstimateNoise(_) => Category::Analysis,
        }
    }

    /// The seed of a noise operation, `None` for unseeded noise and for
    /// every other operation.
    pub fn seed(&self) -> Option<u64> {
        match self {
            Self::GaussianNoise(p) => p.seed,
            Self::SaltPepper(p) => p.seed,
            Self::PoissonNoise(p) => p.seed,
            Self::SpeckleNoise(p) => p.seed,
            Self::UniformNoise(p) => p.seed,
            _ => None,
        }
    }

    /// Whether repeating the operation on the same image gives the same result.
    ///
    /// Only noise operations without a seed are not deterministic.
    pub fn is_deterministic(&self) -> bool {
        self.category() != Category::Noise || self.seed().is_some()
    }

    /// Every parameter of the operation, defaults included, keyed by name.
    pub fn to_params(&self) -> BTreeMap<&'static str, ParamValue> {
        let mut out = BTreeMap::new();
        match self {
            Self::Histogram | Self::EqualizeGlobal | Self::Emboss | Self::Statistics => {}
            Self::EqualizeClahe(p) => {
                out.insert("clip_limit", ParamValue::Float(p.clip_limit));
                out.insert("tile_size", ParamValue::Int(p.tile_size as i64));
            }
            Self::EqualizeAdaptive(p) => {
                out.insert("window_size", ParamValue::Int(p.kernel_size as i64));
            }
            Self::ContrastStretch(p) => {
                out.insert("low_percentile", ParamValue::Float(p.low_percentile));
                out.insert("high_percentile", ParamValue::Float(p.high_percentile));
            }
            Self::Blur(p) | Self::DenoiseGaussian(p) => {
                out.insert("kernel_size", ParamValue::Int(p.kernel_size as i64));
                out.insert("sigma", ParamValue::Float(p.sigma));
            }
            Self::BoxBlur(p)
            | Self::Median(p)
            | Self::HighPass(p)
            | Self::LowPass(p)
            | Self::DenoiseMedian(p) => {
                out.insert("kernel_size", ParamValue::Int(p.kernel_size as i64));
            }
            Self::Bilateral(p) | Self::DenoiseBilateral(p) => p.write(&mut out),
            Self::Sharpen { strength } => {
                out.insert("strength", ParamValue::Float(*strength));
            }
            Self::UnsharpMask(p) => {
                out.insert("sigma", ParamValue::Float(p.sigma));
                out.insert("strength", ParamValue::Float(p.strength));
                out.insert("threshold", ParamValue::Float(p.threshold));
            }
            Self::EdgeSobel { ksize } | Self::EdgeLaplacian { ksize } => {
                out.insert("ksize", ParamValue::Int(*ksize as i64));
            }
            Self::EdgeCanny(p) => {
                out.insert("threshold1", ParamValue::Float(p.threshold1));
                out.insert("threshold2", ParamValue::Float(p.threshold2));
            }
            Self::Custom { kernel } => {
                let rows = kernel.chunks_exact(3).map(<[f64]>::to_vec).collect();
                out.insert("kernel", ParamValue::Matrix(rows));
            }
            Self::Fft(p) => {
                out.insert("shift", ParamValue::Bool(p.shift));
                out.insert("log_scale", ParamValue::Bool(p.log_scale));
            }
            Self::Lowpass(p) | Self::Highpass(p) => p.write(&mut out, false, false),
            Self::Bandpass(p) | Self::Bandstop(p) => p.write(&mut out, true, false),
            Self::Notch(p) => p.write(&mut out, false, true),
            Self::Homomorphic(p) => {
                out.insert("gamma_low", ParamValue::Float(p.gamma_low));
                out.insert("gamma_high", ParamValue::Float(p.gamma_high));
                out.insert("cutoff", ParamValue::Float(p.cutoff));
                out.insert("c", ParamValue::Float(p.c));
            }
            Self::GaussianNoise(p) => {
                out.insert("mean", ParamValue::Float(p.mean));
                out.insert("std", ParamValue::Float(p.std));
                out.insert("seed", seed_value(p.seed));
            }
            Self::SaltPepper(p) => {
                out.insert("amount", ParamValue::Float(p.amount));
                out.insert("salt_ratio", ParamValue::Float(p.salt_ratio));
                out.insert("seed", seed_value(p.seed));
            }
            Self::PoissonNoise(p) => {
                out.insert("scale", ParamValue::Float(p.scale));
                out.insert("seed", seed_value(p.seed));
            }
            Self::SpeckleNoise(p) => {
                out.insert("std", ParamValue::Float(p.std));
                out.insert("seed", seed_value(p.seed));
            }
            Self::UniformNoise(p) => {
                out.insert("low", ParamValue::Float(p.low));
                out.insert("high", ParamValue::Float(p.high));
                out.insert("seed", seed_value(p.seed));
            }
            Self::Nlm(p) => {
                out.insert("h", ParamValue::Float(p.h));
                out.insert(
                    "template_window_size",
                    ParamValue::Int(p.template_window_size as i64),
                );
                out.insert(
                    "search_window_size",
                    ParamValue::Int(p.search_window_size as i64),
                );
            }
            Self::Morphological(p) => {
                out.insert("kernel_size", ParamValue::Int(p.kernel_size as i64));
                out.insert(
                    "operation",
                    ParamValue::Choice(morph_str(p.operation).to_string()),
                );
            }
            Self::Wiener(p) => {
                out.insert(
                    "noise_variance",
                    p.noise_variance.map_or(ParamValue::Null, ParamValue::Float),
                );
            }
            Self::EstimateNoise(p) => {
                out.insert(
                    "method",
                    ParamValue::Choice(estimator_str(p.method).to_string()),
                );
            }
        }
        out
    }

    /// The canonical parameter string used in cache keys.
    pub fn canonical_params(&self) -> String {
        crate::params::canonical_string(&self.to_params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[(&'static str, ParamValue)]) -> ParamSet {
        ParamSet(values.iter().cloned().collect())
    }

    #[test]
    fn test_round_trip_through_params() -> Result<(), ProcessingError> {
        let params = set(&[
            ("cutoff", ParamValue::Float(0.2)),
            ("cutoff_high", ParamValue::Float(0.6)),
            ("filter_method", ParamValue::Choice("butterworth".to_string())),
            ("filter_order", ParamValue::Int(3)),
        ]);
        let op = Operation::from_params("bandpass", &params)?;
        assert_eq!(op.id(), "bandpass");
        assert_eq!(op.category(), Category::Frequency);
        assert_eq!(op.to_params(), params.0);
        assert_eq!(Operation::from_params("bandpass", &ParamSet(op.to_params()))?, op);
        Ok(())
    }

    #[test]
    fn test_cross_field_checks() {
        let params = set(&[
            ("cutoff", ParamValue::Float(0.6)),
            ("cutoff_high", ParamValue::Float(0.6)),
            ("filter_method", ParamValue::Choice("ideal".to_string())),
            ("filter_order", ParamValue::Int(2)),
        ]);
        let err = Operation::from_params("bandstop", &params).err();
        assert_eq!(err.as_ref().and_then(|e| e.field()), Some("cutoff_high"));

        let params = set(&[
            ("threshold1", ParamValue::Float(200.0)),
            ("threshold2", ParamValue::Float(100.0)),
        ]);
        assert!(Operation::from_params("edge_canny", &params).is_err());
    }

    #[test]
    fn test_determinism() -> Result<(), ProcessingError> {
        let unseeded = set(&[
            ("amount", ParamValue::Float(0.1)),
            ("salt_ratio", ParamValue::Float(0.5)),
            ("seed", ParamValue::Null),
        ]);
        let op = Operation::from_params("salt_pepper", &unseeded)?;
        assert!(!op.is_deterministic());

        let mut seeded = unseeded.clone();
        seeded.0.insert("seed", ParamValue::Int(7));
        let op = Operation::from_params("salt_pepper", &seeded)?;
        assert!(op.is_deterministic());
        assert_eq!(op.seed(), Some(7));

        assert!(Operation::Statistics.is_deterministic());
        Ok(())
    }

    #[test]
    fn test_unknown_operation() {
        let err = Operation::from_params("warp", &ParamSet::default()).err();
        assert!(matches!(err, Some(ProcessingError::UnknownOperation(_))));
    }
}
