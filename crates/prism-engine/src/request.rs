use std::fmt;
use std::sync::Arc;

use prism_image::RasterImage;
use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// The opaque identifier of a stored image.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl ImageId {
    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ImageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A validated request to run one operation on one image.
///
/// Only [`crate::registry::OperationRegistry::validate`] builds requests, so
/// the parameters of a request are always complete and in range.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    pub(crate) image_id: ImageId,
    pub(crate) operation: Operation,
}

impl ProcessingRequest {
    /// The target image.
    pub fn image_id(&self) -> &ImageId {
        &self.image_id
    }

    /// The operation to run.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

/// Read access to stored images.
pub trait ImageSource: Send + Sync {
    /// Get the image stored under `id`, if any.
    fn fetch(&self, id: &ImageId) -> Option<Arc<RasterImage>>;
}
