use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use prism_engine::{ImageId, ImageSource};
use prism_image::RasterImage;
use serde::Serialize;

/// Metadata of a stored image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    /// The image id.
    pub image_id: ImageId,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Number of channels.
    pub channels: usize,
    /// Extension of the uploaded format.
    pub format: &'static str,
}

struct StoredImage {
    raster: Arc<RasterImage>,
    info: ImageInfo,
}

/// Uploaded images kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct ImageStore {
    images: RwLock<HashMap<ImageId, StoredImage>>,
}

impl ImageStore {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ImageId, StoredImage>> {
        self.images.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ImageId, StoredImage>> {
        self.images.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an image under a fresh id.
    pub fn insert(&self, raster: RasterImage, format: &'static str) -> ImageInfo {
        let image_id = ImageId::from(uuid::Uuid::new_v4().to_string());
        let info = ImageInfo {
            image_id: image_id.clone(),
            width: raster.width(),
            height: raster.height(),
            channels: raster.num_channels(),
            format,
        };
        let stored = StoredImage {
            raster: Arc::new(raster),
            info: info.clone(),
        };
        self.write().insert(image_id, stored);
        info
    }

    /// Metadata of a stored image.
    pub fn info(&self, id: &ImageId) -> Option<ImageInfo> {
        self.read().get(id).map(|s| s.info.clone())
    }

    /// Metadata of every stored image.
    pub fn list(&self) -> Vec<ImageInfo> {
        self.read().values().map(|s| s.info.clone()).collect()
    }

    /// Remove an image, returning whether it existed.
    pub fn remove(&self, id: &ImageId) -> bool {
        self.write().remove(id).is_some()
    }
}

impl ImageSource for ImageStore {
    fn fetch(&self, id: &ImageId) -> Option<Arc<RasterImage>> {
        self.read().get(id).map(|s| s.raster.clone())
    }
}
