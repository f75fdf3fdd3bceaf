use std::sync::Arc;

use prism_image::ImageError;

/// The error taxonomy of the processing pipeline.
///
/// Every variant is cheap to clone so a single failure can be handed to all
/// the callers waiting on the same cached computation.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ProcessingError {
    /// A parameter is missing, of the wrong type, out of range or of the
    /// wrong parity.
    #[error("Invalid parameter `{field}`: {detail}")]
    InvalidParameter {
        /// The offending parameter name.
        field: String,
        /// What is wrong and what is allowed.
        detail: String,
    },

    /// The operation id is not in the registry.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// No image is stored under the requested id.
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// The image has an unsupported channel count or degenerate dimensions.
    #[error("Unsupported image shape: {0}")]
    UnsupportedImageShape(String),

    /// A numeric routine failed.
    #[error("Computation failed: {message}")]
    ComputationError {
        /// A description of the failure.
        message: String,
        /// The kernel error that caused the failure, if any.
        #[source]
        source: Option<Arc<ImageError>>,
    },

    /// A failure that happened while computing a cached result.
    #[error("Cached computation failed: {0}")]
    CacheComputationFailed(Box<ProcessingError>),
}

impl ProcessingError {
    /// Shorthand to build an [`ProcessingError::InvalidParameter`].
    pub fn invalid_param(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Shorthand to build a [`ProcessingError::ComputationError`] without a cause.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::ComputationError {
            message: message.into(),
            source: None,
        }
    }

    /// The underlying error, with any cache wrapping removed.
    pub fn root(&self) -> &ProcessingError {
        match self {
            Self::CacheComputationFailed(inner) => inner.root(),
            other => other,
        }
    }

    /// The name of the offending field for parameter errors.
    pub fn field(&self) -> Option<&str> {
        match self.root() {
            Self::InvalidParameter { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<ImageError> for ProcessingError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::InvalidParameter { name, reason } => Self::InvalidParameter {
                field: name.to_string(),
                detail: reason,
            },
            ImageError::UnsupportedChannels(_)
            | ImageError::EmptyImage(..)
            | ImageError::InvalidChannelShape(..) => Self::UnsupportedImageShape(err.to_string()),
            other => Self::ComputationError {
                message: other.to_string(),
                source: Some(Arc::new(other)),
            },
        }
    }
}
