use std::sync::Arc;

use prism_engine::{Auxiliary, OperationRegistry, ProcessingEngine, ProcessingError};
use prism_image::RasterImage;
use prism_imgproc::metrics::psnr;
use serde_json::{json, Map, Value};

fn run(image: &Arc<RasterImage>, id: &str, params: Value) -> Result<RasterImage, ProcessingError> {
    let raw = params.as_object().cloned().unwrap_or_default();
    let request = OperationRegistry::new().validate(&"img".into(), id, &raw)?;
    let result = ProcessingEngine::new().process(image, &request)?;
    Ok((*result.raster).clone())
}

fn gradient(width: usize, height: usize) -> Result<Arc<RasterImage>, ProcessingError> {
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (40 + x * 2 + y) as u8))
        .collect();
    Ok(Arc::new(RasterImage::new([width, height].into(), 1, data)?))
}

#[test]
fn custom_identity_kernel_is_a_no_op() -> Result<(), ProcessingError> {
    let image = gradient(17, 11)?;
    let out = run(
        &image,
        "custom",
        json!({"kernel": [[0, 0, 0], [0, 1, 0], [0, 0, 0]]}),
    )?;
    assert_eq!(out, *image);
    Ok(())
}

#[test]
fn equalization_keeps_intensity_order() -> Result<(), ProcessingError> {
    let image = gradient(32, 32)?;
    let out = run(&image, "equalize_global", json!({}))?;
    let src = image.as_slice();
    let dst = out.as_slice();
    for i in 0..src.len() {
        for j in 0..src.len() {
            if src[i] < src[j] {
                assert!(dst[i] <= dst[j]);
            }
        }
    }
    Ok(())
}

#[test]
fn denoising_improves_psnr() -> Result<(), ProcessingError> {
    let clean = gradient(48, 48)?;
    let noisy = Arc::new(run(&clean, "gaussian_noise", json!({"std": 20, "seed": 3}))?);
    let before = psnr(&clean, &noisy)?;

    for (id, params) in [
        ("denoise_gaussian", json!({})),
        ("denoise_median", json!({})),
        ("nlm", json!({"h": 20})),
        ("wiener", json!({})),
    ] {
        let denoised = run(&noisy, id, params)?;
        let after = psnr(&clean, &denoised)?;
        assert!(after > before, "{id}: {after} <= {before}");
    }
    Ok(())
}

#[test]
fn wiener_reports_the_estimated_variance() -> Result<(), ProcessingError> {
    let clean = gradient(32, 32)?;
    let noisy = Arc::new(run(&clean, "gaussian_noise", json!({"std": 10, "seed": 9}))?);
    let request = OperationRegistry::new().validate(&"img".into(), "wiener", &Map::new())?;
    let result = ProcessingEngine::new().process(&noisy, &request)?;
    match result.auxiliary.get("noise_variance") {
        Some(Auxiliary::Scalar(v)) => assert!(*v > 10.0, "variance {v}"),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn edge_outputs_are_single_channel() -> Result<(), ProcessingError> {
    let data = (0..12 * 12 * 3).map(|i| (i % 251) as u8).collect();
    let color = Arc::new(RasterImage::new([12, 12].into(), 3, data)?);
    for id in ["edge_sobel", "edge_laplacian", "edge_canny", "fft"] {
        let out = run(&color, id, json!({}))?;
        assert_eq!(out.num_channels(), 1, "{id}");
    }
    let out = run(&color, "blur", json!({}))?;
    assert_eq!(out.num_channels(), 3);
    Ok(())
}

#[test]
fn canny_output_is_binary() -> Result<(), ProcessingError> {
    let image = gradient(20, 20)?;
    let out = run(&image, "edge_canny", json!({"threshold1": 10, "threshold2": 30}))?;
    assert!(out.as_slice().iter().all(|&v| v == 0 || v == 255));
    Ok(())
}

#[test]
fn statistics_of_a_gradient() -> Result<(), ProcessingError> {
    let image = gradient(10, 1)?;
    let request = OperationRegistry::new().validate(&"img".into(), "statistics", &Map::new())?;
    let result = ProcessingEngine::new().process(&image, &request)?;
    let Some(Auxiliary::Scalars(values)) = result.auxiliary.get("statistics") else {
        panic!("missing statistics");
    };
    // samples are 40, 42, .., 58
    approx::assert_relative_eq!(values["intensity_mean"], 49.0);
    approx::assert_relative_eq!(values["intensity_median"], 49.0);
    approx::assert_relative_eq!(values["intensity_std"], 33.0f64.sqrt(), epsilon = 1e-9);
    assert_eq!(values["intensity_min"], 40.0);
    assert_eq!(values["intensity_max"], 58.0);
    Ok(())
}
