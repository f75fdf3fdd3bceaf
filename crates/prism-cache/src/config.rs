use std::time::Duration;

/// Limits of a [`crate::ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub capacity: usize,
    /// Maximum total size of the cached results in bytes.
    pub max_bytes: usize,
    /// Entries older than this are recomputed, `None` keeps them forever.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_bytes: 256 * 1024 * 1024,
            ttl: None,
        }
    }
}
