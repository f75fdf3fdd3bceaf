use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prism_engine::ProcessingError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

/// Errors of the REST layer with their HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The uploaded bytes are not a supported image.
    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    /// The processing pipeline rejected or failed the request.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// A server side failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::UnsupportedImage(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Processing(err) => match err.root() {
                ProcessingError::InvalidParameter { .. }
                | ProcessingError::UnknownOperation(_) => StatusCode::BAD_REQUEST,
                ProcessingError::ImageNotFound(_) => StatusCode::NOT_FOUND,
                ProcessingError::UnsupportedImageShape(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ProcessingError::ComputationError { .. }
                | ProcessingError::CacheComputationFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self}");
        }

        let (error, field) = match &self {
            ApiError::Processing(err) => (
                err.root().to_string(),
                err.field().map(str::to_string),
            ),
            other => (other.to_string(), None),
        };
        (status, Json(ErrorBody { error, field })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_parameter_returns_400_with_field() {
        let err = ProcessingError::invalid_param("kernel_size", "must be odd");
        let (status, json) = body(err.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["field"], "kernel_size");
    }

    #[tokio::test]
    async fn missing_image_returns_404() {
        let (status, json) = body(ProcessingError::ImageNotFound("x".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json.get("field").is_none());
    }

    #[tokio::test]
    async fn cache_failures_are_unwrapped() {
        let inner = ProcessingError::UnsupportedImageShape("4 channels".into());
        let err = ProcessingError::CacheComputationFailed(Box::new(inner));
        let (status, json) = body(err.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"], "Unsupported image shape: 4 channels");
    }

    #[tokio::test]
    async fn computation_errors_return_500() {
        let (status, _) = body(ProcessingError::computation("nan").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
