use std::sync::Arc;

use prism_engine::{
    ImageId, ImageSource, OperationRegistry, ProcessingEngine, ProcessingError,
    ProcessingRequest, ProcessingResult,
};
use prism_image::RasterImage;
use serde_json::{Map, Value};

use crate::cache::{CacheStatus, ResultCache};
use crate::config::CacheConfig;

/// The processing service: validates requests, fetches images and serves
/// results through the cache.
///
/// Unseeded noise is never cached since repeating it must give a new draw.
pub struct Processor {
    registry: OperationRegistry,
    engine: ProcessingEngine,
    cache: ResultCache,
    source: Arc<dyn ImageSource>,
}

impl Processor {
    /// Create a processor reading images from `source`.
    pub fn new(source: Arc<dyn ImageSource>, config: CacheConfig) -> Self {
        Self {
            registry: OperationRegistry::new(),
            engine: ProcessingEngine::new(),
            cache: ResultCache::new(config),
            source,
        }
    }

    /// The operation catalog.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// The result cache.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Validate and run an operation on a stored image.
    ///
    /// # Arguments
    ///
    /// * `image_id` - The stored image.
    /// * `operation_id` - The registry id of the operation.
    /// * `params` - The raw client parameters.
    pub fn process(
        &self,
        image_id: &ImageId,
        operation_id: &str,
        params: &Map<String, Value>,
    ) -> Result<(Arc<ProcessingResult>, CacheStatus), ProcessingError> {
        let request = self.registry.validate(image_id, operation_id, params)?;
        let image = self.fetch(image_id)?;
        self.run(&image, &request)
    }

    /// Run a validated request, through the cache when it is deterministic.
    pub fn run(
        &self,
        image: &Arc<RasterImage>,
        request: &ProcessingRequest,
    ) -> Result<(Arc<ProcessingResult>, CacheStatus), ProcessingError> {
        if !request.operation().is_deterministic() {
            let result = self.engine.process(image, request)?;
            return Ok((Arc::new(result), CacheStatus::Bypassed));
        }
        self.cache
            .get_or_compute(request.image_id(), request.operation(), || {
                self.engine.process(image, request)
            })
    }

    /// Run a validated request on an arbitrary image, skipping the cache.
    pub fn run_uncached(
        &self,
        image: &Arc<RasterImage>,
        request: &ProcessingRequest,
    ) -> Result<ProcessingResult, ProcessingError> {
        self.engine.process(image, request)
    }

    /// Get a stored image.
    pub fn fetch(&self, image_id: &ImageId) -> Result<Arc<RasterImage>, ProcessingError> {
        self.source
            .fetch(image_id)
            .ok_or_else(|| ProcessingError::ImageNotFound(image_id.to_string()))
    }

    /// Drop the cached results of an image, to be called when it is deleted.
    pub fn invalidate_image(&self, image_id: &ImageId) -> usize {
        self.cache.invalidate_image(image_id)
    }
}
