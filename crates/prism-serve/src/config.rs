use std::time::Duration;

use argh::FromArgs;
use prism_cache::CacheConfig;

/// Serves the prism image processing engine over HTTP
#[derive(Debug, FromArgs)]
pub struct Args {
    /// address to bind
    #[argh(option, default = "String::from(\"0.0.0.0\")")]
    pub host: String,

    /// port to listen on
    #[argh(option, short = 'p', default = "5000")]
    pub port: u16,

    /// maximum number of cached results
    #[argh(option, default = "100")]
    pub cache_capacity: usize,

    /// maximum size of the cached results in MiB
    #[argh(option, default = "256")]
    pub cache_max_mb: usize,

    /// lifetime of cached results in seconds, unset keeps them forever
    #[argh(option)]
    pub cache_ttl_secs: Option<u64>,

    /// maximum upload size in MiB
    #[argh(option, default = "16")]
    pub max_upload_mb: usize,
}

impl Args {
    /// The cache limits selected on the command line.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            max_bytes: self.cache_max_mb * 1024 * 1024,
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }

    /// The upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}
