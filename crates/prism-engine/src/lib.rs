#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// processing engine module.
pub mod engine;

/// error types for the processing pipeline.
pub mod error;

/// typed operations module.
pub mod operation;

/// parameter declarations and validated values.
pub mod params;

/// operation registry module.
pub mod registry;

/// processing requests and image access.
pub mod request;

pub use engine::{Auxiliary, ProcessingEngine, ProcessingResult};
pub use error::ProcessingError;
pub use operation::{Category, Operation};
pub use registry::{OperationRegistry, OperationSpec};
pub use request::{ImageId, ImageSource, ProcessingRequest};
