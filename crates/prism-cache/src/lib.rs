#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// result cache module.
pub mod cache;

/// cache configuration module.
pub mod config;

/// processor service combining the engine and the cache.
pub mod processor;

pub use cache::{CacheKey, CacheStats, CacheStatus, ResultCache};
pub use config::CacheConfig;
pub use processor::Processor;
