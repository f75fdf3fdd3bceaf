use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProcessingError;
use crate::operation::{Category, Operation};
use crate::params::{ParamSet, ParamSpec, ParamValue};
use crate::request::{ImageId, ProcessingRequest};

/// The static declaration of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSpec {
    /// The stable identifier used in requests.
    pub id: &'static str,
    /// A human readable name.
    pub name: &'static str,
    /// The family of the operation.
    pub category: Category,
    /// The parameters, in display order.
    pub parameters: Vec<ParamSpec>,
}

impl OperationSpec {
    fn new(
        id: &'static str,
        name: &'static str,
        category: Category,
        parameters: Vec<ParamSpec>,
    ) -> Self {
        Self {
            id,
            name,
            category,
            parameters,
        }
    }

    /// The default value of every parameter, keyed by name.
    pub fn defaults(&self) -> BTreeMap<&'static str, ParamValue> {
        self.parameters
            .iter()
            .map(|p| (p.name, p.default.clone()))
            .collect()
    }
}

/// One entry of the exported catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry<'a> {
    /// A human readable name.
    pub name: &'static str,
    /// The family of the operation.
    pub category: Category,
    /// The parameter declarations.
    pub parameters: &'a [ParamSpec],
    /// The default value of every parameter.
    pub defaults: BTreeMap<&'static str, ParamValue>,
}

/// The exported catalog, keyed by operation id.
pub type Catalog<'a> = BTreeMap<&'static str, CatalogEntry<'a>>;

const MORPH_OPS: &[&str] = &["opening", "closing", "open_close"];
const FILTER_METHODS: &[&str] = &["ideal", "gaussian", "butterworth"];
const NOISE_ESTIMATORS: &[&str] = &["mad", "laplacian", "difference"];

fn kernel_size(default: i64) -> ParamSpec {
    ParamSpec::odd("kernel_size", 3, 21, default)
}

fn sigma() -> ParamSpec {
    ParamSpec::float("sigma", 0.1, 10.0, 0.1, 1.0)
}

fn bilateral_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::int("d", 0, 25, 9),
        ParamSpec::float("sigma_color", 1.0, 200.0, 1.0, 75.0),
        ParamSpec::float("sigma_space", 1.0, 200.0, 1.0, 75.0),
    ]
}

fn seed() -> ParamSpec {
    ParamSpec::int("seed", 0, i64::MAX, 0).nullable()
}

fn frequency_params(band: bool, notch: bool) -> Vec<ParamSpec> {
    let mut params = vec![ParamSpec::float("cutoff", 0.01, 0.99, 0.01, 0.3)];
    if band {
        params.push(ParamSpec::float("cutoff_high", 0.01, 0.99, 0.01, 0.7));
    }
    if notch {
        params.push(ParamSpec::float("notch_width", 0.01, 0.5, 0.01, 0.05));
    }
    params.push(ParamSpec::choice("filter_method", FILTER_METHODS, "gaussian"));
    params.push(ParamSpec::int("filter_order", 1, 10, 2));
    params
}

fn ksize() -> ParamSpec {
    ParamSpec::odd("ksize", 1, 7, 3)
}

fn build_specs() -> Vec<OperationSpec> {
    use Category::*;
    vec![
        // histogram
        OperationSpec::new("histogram", "Histogram", Histogram, vec![]),
        OperationSpec::new("equalize_global", "Global Equalization", Histogram, vec![]),
        OperationSpec::new(
            "equalize_clahe",
            "CLAHE",
            Histogram,
            vec![
                ParamSpec::float("clip_limit", 1.0, 10.0, 0.5, 2.0),
                ParamSpec::even("tile_size", 2, 16, 8),
            ],
        ),
        OperationSpec::new(
            "equalize_adaptive",
            "Adaptive Equalization",
            Histogram,
            vec![ParamSpec::odd("window_size", 3, 99, 31)],
        ),
        OperationSpec::new(
            "contrast_stretch",
            "Contrast Stretching",
            Histogram,
            vec![
                ParamSpec::float("low_percentile", 0.0, 100.0, 1.0, 2.0).clamped(),
                ParamSpec::float("high_percentile", 0.0, 100.0, 1.0, 98.0).clamped(),
            ],
        ),
        // spatial filters
        OperationSpec::new("blur", "Gaussian Blur", Filter, vec![kernel_size(5), sigma()]),
        OperationSpec::new("box_blur", "Box Blur", Filter, vec![kernel_size(5)]),
        OperationSpec::new("median", "Median Filter", Filter, vec![kernel_size(5)]),
        OperationSpec::new("bilateral", "Bilateral Filter", Filter, bilateral_params()),
        OperationSpec::new(
            "sharpen",
            "Sharpen",
            Filter,
            vec![ParamSpec::float("strength", 0.1, 5.0, 0.1, 1.0)],
        ),
        OperationSpec::new(
            "unsharp_mask",
            "Unsharp Mask",
            Filter,
            vec![
                sigma(),
                ParamSpec::float("strength", 0.1, 5.0, 0.1, 1.5),
                ParamSpec::float("threshold", 0.0, 255.0, 1.0, 0.0),
            ],
        ),
        OperationSpec::new("edge_sobel", "Sobel Edges", Filter, vec![ksize()]),
        OperationSpec::new("edge_laplacian", "Laplacian Edges", Filter, vec![ksize()]),
        OperationSpec::new(
            "edge_canny",
            "Canny Edges",
            Filter,
            vec![
                ParamSpec::float("threshold1", 0.0, 255.0, 1.0, 100.0),
                ParamSpec::float("threshold2", 0.0, 255.0, 1.0, 200.0),
            ],
        ),
        OperationSpec::new("emboss", "Emboss", Filter, vec![]),
        OperationSpec::new("high_pass", "High Pass", Filter, vec![kernel_size(3)]),
        OperationSpec::new("low_pass", "Low Pass", Filter, vec![kernel_size(5)]),
        OperationSpec::new(
            "custom",
            "Custom Kernel",
            Filter,
            vec![ParamSpec::matrix(
                "kernel",
                -100.0,
                100.0,
                vec![
                    vec![0.0, -1.0, 0.0],
                    vec![-1.0, 5.0, -1.0],
                    vec![0.0, -1.0, 0.0],
                ],
            )],
        ),
        // frequency domain
        OperationSpec::new(
            "fft",
            "Fourier Spectrum",
            Frequency,
            vec![
                ParamSpec::flag("shift", true),
                ParamSpec::flag("log_scale", true),
            ],
        ),
        OperationSpec::new("lowpass", "Low Pass", Frequency, frequency_params(false, false)),
        OperationSpec::new("highpass", "High Pass", Frequency, frequency_params(false, false)),
        OperationSpec::new("bandpass", "Band Pass", Frequency, frequency_params(true, false)),
        OperationSpec::new("bandstop", "Band Stop", Frequency, frequency_params(true, false)),
        OperationSpec::new("notch", "Notch", Frequency, frequency_params(false, true)),
        OperationSpec::new(
            "homomorphic",
            "Homomorphic Filter",
            Frequency,
            vec![
                ParamSpec::float("gamma_low", 0.0, 1.0, 0.05, 0.3),
                ParamSpec::float("gamma_high", 1.0, 3.0, 0.1, 1.5),
                ParamSpec::float("cutoff", 1.0, 200.0, 1.0, 30.0),
                ParamSpec::float("c", 0.1, 10.0, 0.1, 1.0),
            ],
        ),
        // noise
        OperationSpec::new(
            "gaussian_noise",
            "Gaussian Noise",
            Noise,
            vec![
                ParamSpec::float("mean", -50.0, 50.0, 1.0, 0.0),
                ParamSpec::float("std", 1.0, 100.0, 1.0, 25.0),
                seed(),
            ],
        ),
        OperationSpec::new(
            "salt_pepper",
            "Salt & Pepper",
            Noise,
            vec![
                ParamSpec::float("amount", 0.01, 0.5, 0.01, 0.05),
                ParamSpec::float("salt_ratio", 0.0, 1.0, 0.05, 0.5),
                seed(),
            ],
        ),
        OperationSpec::new(
            "poisson_noise",
            "Poisson Noise",
            Noise,
            vec![ParamSpec::float("scale", 0.1, 10.0, 0.1, 1.0), seed()],
        ),
        OperationSpec::new(
            "speckle_noise",
            "Speckle Noise",
            Noise,
            vec![ParamSpec::float("std", 0.01, 1.0, 0.01, 0.1), seed()],
        ),
        OperationSpec::new(
            "uniform_noise",
            "Uniform Noise",
            Noise,
            vec![
                ParamSpec::float("low", -100.0, 0.0, 1.0, -50.0),
                ParamSpec::float("high", 0.0, 100.0, 1.0, 50.0),
                seed(),
            ],
        ),
        // denoising
        OperationSpec::new(
            "denoise_gaussian",
            "Gaussian Denoise",
            Denoise,
            vec![kernel_size(5), sigma()],
        ),
        OperationSpec::new("denoise_median", "Median Denoise", Denoise, vec![kernel_size(5)]),
        OperationSpec::new(
            "denoise_bilateral",
            "Bilateral Denoise",
            Denoise,
            bilateral_params(),
        ),
        OperationSpec::new(
            "nlm",
            "Non-Local Means",
            Denoise,
            vec![
                ParamSpec::float("h", 1.0, 30.0, 1.0, 10.0),
                ParamSpec::odd("template_window_size", 3, 21, 7),
                ParamSpec::odd("search_window_size", 7, 51, 21),
            ],
        ),
        OperationSpec::new(
            "morphological",
            "Morphological Denoise",
            Denoise,
            vec![
                kernel_size(5),
                ParamSpec::choice("operation", MORPH_OPS, "opening"),
            ],
        ),
        OperationSpec::new(
            "wiener",
            "Wiener Filter",
            Denoise,
            vec![ParamSpec::float("noise_variance", 0.0, 10000.0, 1.0, 0.0).nullable()],
        ),
        // analysis
        OperationSpec::new("statistics", "Statistics", Analysis, vec![]),
        OperationSpec::new(
            "estimate_noise",
            "Noise Estimation",
            Analysis,
            vec![ParamSpec::choice("method", NOISE_ESTIMATORS, "mad")],
        ),
    ]
}

/// The fixed catalog of operations and their parameter domains.
///
/// Built once and never mutated, so it can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    specs: Vec<OperationSpec>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    /// Build the catalog.
    pub fn new() -> Self {
        Self {
            specs: build_specs(),
        }
    }

    /// Every operation, in catalog order.
    pub fn list(&self) -> &[OperationSpec] {
        &self.specs
    }

    /// Look up an operation by id.
    pub fn resolve(&self, id: &str) -> Result<&OperationSpec, ProcessingError> {
        self.specs
            .iter()
            .find(|spec| spec.id == id)
            .ok_or_else(|| ProcessingError::UnknownOperation(id.to_string()))
    }

    /// Validate raw parameters and build a request.
    ///
    /// Unknown parameter names are rejected, omitted parameters take their
    /// default and every value is coerced into its declared domain.
    ///
    /// # Arguments
    ///
    /// * `image_id` - The target image.
    /// * `id` - The operation id.
    /// * `raw` - The parameters as sent by the client.
    ///
    /// # Example
    ///
    /// ```
    /// use prism_engine::registry::OperationRegistry;
    /// use serde_json::json;
    ///
    /// let registry = OperationRegistry::new();
    /// let raw = json!({"kernel_size": "7"});
    /// let request = registry
    ///     .validate(&"img".into(), "blur", raw.as_object().unwrap())
    ///     .unwrap();
    /// assert_eq!(request.operation().canonical_params(), "kernel_size=7;sigma=1.00000e0");
    /// ```
    pub fn validate(
        &self,
        image_id: &ImageId,
        id: &str,
        raw: &Map<String, Value>,
    ) -> Result<ProcessingRequest, ProcessingError> {
        let spec = self.resolve(id)?;

        if let Some(unknown) = raw
            .keys()
            .find(|key| !spec.parameters.iter().any(|p| p.name == key.as_str()))
        {
            return Err(ProcessingError::invalid_param(
                unknown.clone(),
                format!("unknown parameter for `{id}`"),
            ));
        }

        let mut values = BTreeMap::new();
        for param in &spec.parameters {
            let value = match raw.get(param.name) {
                Some(raw_value) => param.coerce(raw_value)?,
                None => param.default.clone(),
            };
            values.insert(param.name, value);
        }

        let operation = Operation::from_params(id, &ParamSet(values))?;
        Ok(ProcessingRequest {
            image_id: image_id.clone(),
            operation,
        })
    }

    /// The whole catalog, keyed by operation id.
    pub fn catalog(&self) -> Catalog<'_> {
        self.entries(|_| true)
    }

    /// The catalog restricted to one category.
    pub fn catalog_for(&self, category: Category) -> Catalog<'_> {
        self.entries(|spec| spec.category == category)
    }

    fn entries(&self, keep: impl Fn(&OperationSpec) -> bool) -> Catalog<'_> {
        self.specs
            .iter()
            .filter(|spec| keep(spec))
            .map(|spec| {
                let entry = CatalogEntry {
                    name: spec.name,
                    category: spec.category,
                    parameters: &spec.parameters,
                    defaults: spec.defaults(),
                };
                (spec.id, entry)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_catalog_is_complete() -> Result<(), ProcessingError> {
        let registry = OperationRegistry::new();
        assert_eq!(registry.list().len(), 38);

        // every spec builds from its defaults
        for spec in registry.list() {
            let request = registry.validate(&"img".into(), spec.id, &Map::new())?;
            assert_eq!(request.operation().id(), spec.id);
            assert_eq!(request.operation().category(), spec.category);
            assert_eq!(request.operation().to_params(), spec.defaults());
        }

        let catalog = registry.catalog_for(Category::Noise);
        assert_eq!(catalog.len(), 5);
        assert!(catalog.contains_key("salt_pepper"));
        Ok(())
    }

    #[test]
    fn test_unknown_ids_and_names() {
        let registry = OperationRegistry::new();
        let err = registry.validate(&"img".into(), "warp", &Map::new()).err();
        assert!(matches!(err, Some(ProcessingError::UnknownOperation(_))));

        let err = registry
            .validate(&"img".into(), "blur", &raw(json!({"radius": 3})))
            .err();
        assert_eq!(err.as_ref().and_then(|e| e.field()), Some("radius"));
    }

    #[test]
    fn test_validation_errors_name_the_field() {
        let registry = OperationRegistry::new();
        let id = ImageId::from("img");
        let cases = [
            ("blur", json!({"kernel_size": 4}), "kernel_size"),
            ("equalize_clahe", json!({"tile_size": 3}), "tile_size"),
            ("edge_sobel", json!({"ksize": 9}), "ksize"),
            ("bandpass", json!({"cutoff": 0.5, "cutoff_high": 0.4}), "cutoff_high"),
            ("uniform_noise", json!({"low": 0, "high": 0}), "high"),
            ("morphological", json!({"operation": "erode"}), "operation"),
            ("gaussian_noise", json!({"seed": -1}), "seed"),
            ("nlm", json!({"search_window_size": 5}), "search_window_size"),
        ];
        for (op, params, field) in cases {
            let err = registry.validate(&id, op, &raw(params)).err();
            assert_eq!(err.as_ref().and_then(|e| e.field()), Some(field), "{op}");
        }
    }

    #[test]
    fn test_canonical_params_ignore_order_and_float_noise() -> Result<(), ProcessingError> {
        let registry = OperationRegistry::new();
        let id = ImageId::from("img");
        let a = registry.validate(&id, "blur", &raw(json!({"sigma": 1.5, "kernel_size": 7})))?;
        let b = registry.validate(
            &id,
            "blur",
            &raw(json!({"kernel_size": "7", "sigma": 1.5000000001})),
        )?;
        assert_eq!(
            a.operation().canonical_params(),
            b.operation().canonical_params()
        );

        let c = registry.validate(&id, "blur", &Map::new())?;
        let d = registry.validate(&id, "blur", &raw(json!({"kernel_size": 5, "sigma": 1.0})))?;
        assert_eq!(
            c.operation().canonical_params(),
            d.operation().canonical_params()
        );
        Ok(())
    }

    #[test]
    fn test_percentiles_are_clamped() -> Result<(), ProcessingError> {
        let registry = OperationRegistry::new();
        let request = registry.validate(
            &"img".into(),
            "contrast_stretch",
            &raw(json!({"low_percentile": -10, "high_percentile": 120})),
        )?;
        let params = request.operation().to_params();
        assert_eq!(params.get("low_percentile"), Some(&ParamValue::Float(0.0)));
        assert_eq!(params.get("high_percentile"), Some(&ParamValue::Float(100.0)));
        Ok(())
    }

    #[test]
    fn test_catalog_serializes() -> Result<(), serde_json::Error> {
        let registry = OperationRegistry::new();
        let value = serde_json::to_value(registry.catalog_for(Category::Denoise))?;
        assert_eq!(value["wiener"]["defaults"]["noise_variance"], Value::Null);
        assert_eq!(value["nlm"]["parameters"][1]["type"], json!("int"));
        assert_eq!(value["nlm"]["parameters"][1]["parity"], json!("odd"));
        assert_eq!(value["morphological"]["category"], json!("denoise"));
        Ok(())
    }
}
