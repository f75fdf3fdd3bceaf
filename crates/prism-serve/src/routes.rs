use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prism_cache::{CacheStatus, Processor};
use prism_engine::{
    Auxiliary, Category, ImageId, Operation, ProcessingError, ProcessingResult,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::codec;
use crate::error::ApiError;
use crate::store::ImageStore;

/// Shared state of the handlers.
#[derive(Clone)]
pub struct AppState {
    /// Uploaded images.
    pub store: Arc<ImageStore>,
    /// Validation, processing and caching.
    pub processor: Arc<Processor>,
}

/// Build the router of the REST API.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to Prism!" }))
        .route("/api/images", post(upload_image).get(list_images))
        .route("/api/images/:id", get(get_image).delete(delete_image))
        .route("/api/operations", get(list_operations))
        .route(
            "/api/filters/available",
            get(|s: State<AppState>| category(s, Category::Filter)),
        )
        .route(
            "/api/histogram/available",
            get(|s: State<AppState>| category(s, Category::Histogram)),
        )
        .route(
            "/api/fourier/available",
            get(|s: State<AppState>| category(s, Category::Frequency)),
        )
        .route(
            "/api/noise/types",
            get(|s: State<AppState>| category(s, Category::Noise)),
        )
        .route(
            "/api/noise/denoise-methods",
            get(|s: State<AppState>| category(s, Category::Denoise)),
        )
        .route("/api/process", post(process))
        .route("/api/preview", post(preview))
        .route("/api/noise/compare", post(compare_denoise))
        .route("/api/cache/stats", get(cache_stats))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Run blocking work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

fn encode_auxiliary(
    auxiliary: &BTreeMap<String, Auxiliary>,
) -> Result<Map<String, Value>, ApiError> {
    let mut out = Map::new();
    for (name, aux) in auxiliary {
        let value = match aux {
            Auxiliary::Raster(raster) => Value::String(codec::encode_base64_png(raster)?),
            Auxiliary::Histogram(hists) => json!(hists),
            Auxiliary::Scalar(v) => json!(v),
            Auxiliary::Scalars(values) => json!(values),
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

#[derive(Serialize)]
struct ProcessResponse {
    success: bool,
    image_id: ImageId,
    operation: &'static str,
    params: Value,
    cache: CacheStatus,
    result_image: String,
    width: usize,
    height: usize,
    channels: usize,
    auxiliary: Map<String, Value>,
}

fn process_response(
    image_id: ImageId,
    operation: &Operation,
    result: &ProcessingResult,
    cache: CacheStatus,
) -> Result<ProcessResponse, ApiError> {
    Ok(ProcessResponse {
        success: true,
        image_id,
        operation: operation.id(),
        params: json!(operation.to_params()),
        cache,
        result_image: codec::encode_base64_png(&result.raster)?,
        width: result.raster.width(),
        height: result.raster.height(),
        channels: result.raster.num_channels(),
        auxiliary: encode_auxiliary(&result.auxiliary)?,
    })
}

async fn upload_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }
    let (raster, format) = blocking(move || codec::decode(&body)).await?;
    let info = state.store.insert(raster, format);
    log::info!(
        "stored image {} ({}x{}, {} channels)",
        info.image_id,
        info.width,
        info.height,
        info.channels
    );

    let mut body = json!(info);
    body["success"] = json!(true);
    Ok((StatusCode::CREATED, Json(body)))
}

async fn list_images(State(state): State<AppState>) -> Json<Value> {
    let images = state.store.list();
    Json(json!({"count": images.len(), "images": images}))
}

#[derive(Deserialize)]
struct ImageQuery {
    #[serde(default)]
    metadata: bool,
}

async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, ApiError> {
    let id = ImageId::from(id);
    let info = state
        .store
        .info(&id)
        .ok_or_else(|| ProcessingError::ImageNotFound(id.to_string()))?;
    if query.metadata {
        return Ok(Json(info).into_response());
    }

    let raster = state.processor.fetch(&id)?;
    let png = blocking(move || codec::encode_png(&raster)).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ImageId::from(id);
    if !state.store.remove(&id) {
        return Err(ProcessingError::ImageNotFound(id.to_string()).into());
    }
    let invalidated = state.processor.invalidate_image(&id);
    Ok(Json(json!({
        "success": true,
        "message": "Image deleted",
        "invalidated": invalidated,
    })))
}

#[derive(Deserialize)]
struct CategoryQuery {
    category: Option<String>,
}

async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<CategoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let registry = state.processor.registry();
    let catalog = match query.category {
        Some(name) => registry.catalog_for(name.parse::<Category>()?),
        None => registry.catalog(),
    };
    Ok(Json(json!({"operations": catalog})))
}

async fn category(State(state): State<AppState>, category: Category) -> Json<Value> {
    let catalog = state.processor.registry().catalog_for(category);
    Json(json!({"category": category, "operations": catalog}))
}

#[derive(Deserialize)]
struct ProcessBody {
    image_id: ImageId,
    operation: String,
    #[serde(default)]
    params: Map<String, Value>,
}

async fn process(
    State(state): State<AppState>,
    Json(body): Json<ProcessBody>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let response = blocking(move || {
        let processor = &state.processor;
        let request = processor
            .registry()
            .validate(&body.image_id, &body.operation, &body.params)?;
        let image = processor.fetch(&body.image_id)?;
        let (result, status) = processor.run(&image, &request)?;
        process_response(body.image_id, request.operation(), &result, status)
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct Region {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

#[derive(Deserialize)]
struct PreviewBody {
    image_id: ImageId,
    operation: String,
    #[serde(default)]
    params: Map<String, Value>,
    region: Option<Region>,
}

async fn preview(
    State(state): State<AppState>,
    Json(body): Json<PreviewBody>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let response = blocking(move || {
        let processor = &state.processor;
        let request = processor
            .registry()
            .validate(&body.image_id, &body.operation, &body.params)?;
        let mut image = processor.fetch(&body.image_id)?;
        if let Some(r) = &body.region {
            let cropped = image
                .crop(r.x, r.y, r.width, r.height)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            image = Arc::new(cropped);
        }
        let result = processor.run_uncached(&image, &request)?;
        process_response(body.image_id, request.operation(), &result, CacheStatus::Bypassed)
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct CompareBody {
    image_id: ImageId,
    methods: Option<Vec<String>>,
    #[serde(default)]
    params: Map<String, Value>,
}

async fn compare_denoise(
    State(state): State<AppState>,
    Json(body): Json<CompareBody>,
) -> Result<Json<Value>, ApiError> {
    let response = blocking(move || {
        let processor = &state.processor;
        let image = processor.fetch(&body.image_id)?;
        let methods = match body.methods {
            Some(methods) => methods,
            None => processor
                .registry()
                .list()
                .iter()
                .filter(|spec| spec.category == Category::Denoise)
                .map(|spec| spec.id.to_string())
                .collect(),
        };

        let mut results = Map::new();
        for method in methods {
            let spec = match processor.registry().resolve(&method) {
                Ok(spec) if spec.category == Category::Denoise => spec,
                _ => {
                    let error = format!("Unknown denoising method: {method}");
                    results.insert(method, json!({"error": error}));
                    continue;
                }
            };
            let params = match body.params.get(&method) {
                Some(Value::Object(params)) => params.clone(),
                _ => Map::new(),
            };
            let outcome = processor
                .registry()
                .validate(&body.image_id, &method, &params)
                .and_then(|request| processor.run(&image, &request));
            let entry = match outcome {
                Ok((result, status)) => json!({
                    "name": spec.name,
                    "cache": status,
                    "result_image": codec::encode_base64_png(&result.raster)?,
                }),
                Err(err) => json!({"name": spec.name, "error": err.root().to_string()}),
            };
            results.insert(method, entry);
        }
        Ok(json!({
            "success": true,
            "image_id": body.image_id,
            "results": results,
        }))
    })
    .await?;
    Ok(Json(response))
}

async fn cache_stats(State(state): State<AppState>) -> Json<Value> {
    let cache = state.processor.cache();
    let config = cache.config();
    Json(json!({
        "stats": cache.stats(),
        "capacity": config.capacity,
        "max_bytes": config.max_bytes,
        "ttl_secs": config.ttl.map(|ttl| ttl.as_secs()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use prism_cache::CacheConfig;
    use prism_image::RasterImage;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Arc::new(ImageStore::default());
        let processor = Arc::new(Processor::new(store.clone(), CacheConfig::default()));
        router(AppState { store, processor }, 1024 * 1024)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn upload(app: &Router) -> String {
        let data = (0..16 * 16 * 3).map(|i| (i * 7 % 256) as u8).collect();
        let raster = RasterImage::new([16, 16].into(), 3, data).unwrap();
        let png = codec::encode_png(&raster).unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/api/images")
            .body(Body::from(png))
            .unwrap();
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["width"], 16);
        assert_eq!(json["channels"], 3);
        json["image_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn upload_process_cache_delete_round_trip() {
        let app = app();
        let id = upload(&app).await;

        let body = json!({"image_id": id, "operation": "blur", "params": {"kernel_size": 3}});
        let (status, json) = send(&app, post_json("/api/process", body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cache"], "miss");
        assert_eq!(json["params"]["sigma"], 1.0);
        assert!(!json["result_image"].as_str().unwrap().is_empty());

        let (_, json) = send(&app, post_json("/api/process", body.clone())).await;
        assert_eq!(json["cache"], "hit");

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/images/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["invalidated"], 1);

        let (status, _) = send(&app, post_json("/api/process", body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_parameters_name_the_field() {
        let app = app();
        let id = upload(&app).await;
        let body = json!({"image_id": id, "operation": "median", "params": {"kernel_size": 4}});
        let (status, json) = send(&app, post_json("/api/process", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["field"], "kernel_size");

        let body = json!({"image_id": id, "operation": "warp"});
        let (status, _) = send(&app, post_json("/api/process", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fft_returns_phase_spectrum() {
        let app = app();
        let id = upload(&app).await;
        let body = json!({"image_id": id, "operation": "fft"});
        let (status, json) = send(&app, post_json("/api/process", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["channels"], 1);
        assert!(json["auxiliary"]["phase"].is_string());
    }

    #[tokio::test]
    async fn preview_crops_and_skips_the_cache() {
        let app = app();
        let id = upload(&app).await;
        let body = json!({
            "image_id": id,
            "operation": "sharpen",
            "region": {"x": 2, "y": 4, "width": 8, "height": 6},
        });
        let (status, json) = send(&app, post_json("/api/preview", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!((json["width"].clone(), json["height"].clone()), (json!(8), json!(6)));
        assert_eq!(json["cache"], "bypassed");

        let req = Request::builder().uri("/api/cache/stats").body(Body::empty()).unwrap();
        let (_, json) = send(&app, req).await;
        assert_eq!(json["stats"]["entries"], 0);

        let body = json!({
            "image_id": id,
            "operation": "sharpen",
            "region": {"x": 12, "y": 0, "width": 8, "height": 6},
        });
        let (status, _) = send(&app, post_json("/api/preview", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn compare_runs_every_denoiser() {
        let app = app();
        let id = upload(&app).await;
        let body = json!({
            "image_id": id,
            "methods": ["denoise_median", "nlm", "blur"],
            "params": {"nlm": {"search_window_size": 11}},
        });
        let (status, json) = send(&app, post_json("/api/noise/compare", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["results"]["denoise_median"]["result_image"].is_string());
        assert!(json["results"]["nlm"]["result_image"].is_string());
        assert!(json["results"]["blur"]["error"].is_string());
    }

    #[tokio::test]
    async fn catalogs_by_category() {
        let app = app();
        let req = Request::builder().uri("/api/noise/types").body(Body::empty()).unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["operations"].as_object().unwrap().len(), 5);

        let req = Request::builder()
            .uri("/api/operations?category=analysis")
            .body(Body::empty())
            .unwrap();
        let (_, json) = send(&app, req).await;
        assert!(json["operations"]["estimate_noise"].is_object());

        let req = Request::builder()
            .uri("/api/operations?category=warp")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn garbage_upload_is_rejected() {
        let app = app();
        let req = Request::builder()
            .method("POST")
            .uri("/api/images")
            .body(Body::from("not an image"))
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }
}
