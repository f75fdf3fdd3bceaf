use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use prism_engine::{ImageId, Operation, ProcessingError, ProcessingResult};
use serde::Serialize;

use crate::config::CacheConfig;

/// The identity of a cached result.
///
/// Two requests share a key when they target the same image with the same
/// operation and the same canonical parameters, defaults included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The source image.
    pub image_id: ImageId,
    /// The operation id.
    pub operation_id: &'static str,
    /// The canonical parameter string.
    pub params: String,
}

impl CacheKey {
    /// Build the key of `operation` applied to `image_id`.
    pub fn new(image_id: &ImageId, operation: &Operation) -> Self {
        Self {
            image_id: image_id.clone(),
            operation_id: operation.id(),
            params: operation.canonical_params(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.image_id, self.operation_id, self.params)
    }
}

/// How a result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from a stored entry.
    Hit,
    /// Computed by this caller.
    Miss,
    /// Computed by a concurrent caller this one waited for.
    Joined,
    /// Computed without touching the cache.
    Bypassed,
}

/// Counters of a [`ResultCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from a stored entry.
    pub hits: u64,
    /// Lookups that started a computation.
    pub misses: u64,
    /// Lookups that waited on a computation in flight.
    pub joins: u64,
    /// Entries dropped to respect the limits.
    pub evictions: u64,
    /// Entries dropped because they outlived the TTL.
    pub expirations: u64,
    /// Entries currently stored.
    pub entries: usize,
    /// Total size of the stored entries in bytes.
    pub bytes: usize,
}

type Outcome = Result<Arc<ProcessingResult>, ProcessingError>;

struct Entry {
    result: Arc<ProcessingResult>,
    created_at: Instant,
    last_used: u64,
    size_bytes: usize,
}

/// A computation in flight, shared with every caller asking for its key.
#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
    // set under the state lock when the image is invalidated mid-computation
    stale: AtomicBool,
}

impl Flight {
    fn publish(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<CacheKey, Entry>,
    in_flight: HashMap<CacheKey, Arc<Flight>>,
    tick: u64,
    bytes: usize,
    stats: CacheStats,
}

impl State {
    fn remove(&mut self, key: &CacheKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.bytes -= entry.size_bytes;
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        self.remove(&key);
        self.stats.evictions += 1;
        log::debug!("evicted {key}");
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A bounded cache of processing results with single-flight computation.
///
/// At most one computation per key runs at a time; concurrent callers for
/// the same key wait and share its outcome. Failures are handed to every
/// waiter and never stored.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use prism_cache::{CacheConfig, CacheStatus, ResultCache};
/// use prism_engine::{OperationRegistry, ProcessingEngine};
/// use prism_image::RasterImage;
///
/// let registry = OperationRegistry::new();
/// let request = registry
///     .validate(&"img".into(), "emboss", &Default::default())
///     .unwrap();
/// let image = Arc::new(RasterImage::from_size_val([4, 4].into(), 1, 9).unwrap());
///
/// let cache = ResultCache::new(CacheConfig::default());
/// let compute = || ProcessingEngine::new().process(&image, &request);
/// let (_, status) = cache
///     .get_or_compute(request.image_id(), request.operation(), compute)
///     .unwrap();
/// assert_eq!(status, CacheStatus::Miss);
/// let (_, status) = cache
///     .get_or_compute(request.image_id(), request.operation(), compute)
///     .unwrap();
/// assert_eq!(status, CacheStatus::Hit);
/// ```
pub struct ResultCache {
    config: CacheConfig,
    state: Mutex<State>,
}

impl ResultCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// The limits of the cache.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the result of `operation` on `image_id`, running `compute` on a miss.
    ///
    /// # Arguments
    ///
    /// * `image_id` - The source image.
    /// * `operation` - The validated operation.
    /// * `compute` - Produces the result when nothing is stored or in flight.
    ///
    /// # Returns
    ///
    /// The shared result and how it was obtained. A failed computation is
    /// returned as [`ProcessingError::CacheComputationFailed`].
    pub fn get_or_compute<F>(
        &self,
        image_id: &ImageId,
        operation: &Operation,
        compute: F,
    ) -> Result<(Arc<ProcessingResult>, CacheStatus), ProcessingError>
    where
        F: FnOnce() -> Result<ProcessingResult, ProcessingError>,
    {
        let key = CacheKey::new(image_id, operation);

        let mut state = lock(&self.state);
        state.tick += 1;
        let tick = state.tick;

        let expired = match (state.entries.get(&key), self.config.ttl) {
            (Some(entry), Some(ttl)) => entry.created_at.elapsed() > ttl,
            _ => false,
        };
        if expired {
            state.remove(&key);
            state.stats.expirations += 1;
            log::debug!("expired {key}");
        }

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.last_used = tick;
            let result = entry.result.clone();
            state.stats.hits += 1;
            log::debug!("hit {key}");
            return Ok((result, CacheStatus::Hit));
        }

        let in_flight = state.in_flight.get(&key).cloned();
        if let Some(flight) = in_flight {
            state.stats.joins += 1;
            drop(state);
            log::debug!("joining {key}");
            return flight.wait().map(|result| (result, CacheStatus::Joined));
        }

        let flight = Arc::new(Flight::default());
        state.in_flight.insert(key.clone(), flight.clone());
        state.stats.misses += 1;
        drop(state);
        log::debug!("miss {key}");

        let outcome: Outcome = match panic::catch_unwind(AssertUnwindSafe(compute)) {
            Ok(Ok(result)) => Ok(Arc::new(result)),
            Ok(Err(err)) => Err(ProcessingError::CacheComputationFailed(Box::new(err))),
            Err(payload) => Err(ProcessingError::CacheComputationFailed(Box::new(
                ProcessingError::computation(format!(
                    "computation panicked: {}",
                    panic_message(payload.as_ref())
                )),
            ))),
        };

        let mut state = lock(&self.state);
        if state
            .in_flight
            .get(&key)
            .is_some_and(|f| Arc::ptr_eq(f, &flight))
        {
            state.in_flight.remove(&key);
        }
        if let Ok(result) = &outcome {
            if flight.stale.load(Ordering::Relaxed) {
                log::debug!("dropping {key}, image invalidated during computation");
            } else {
                self.store(&mut state, key, result.clone());
            }
        }
        drop(state);

        flight.publish(outcome.clone());
        outcome.map(|result| (result, CacheStatus::Miss))
    }

    fn store(&self, state: &mut State, key: CacheKey, result: Arc<ProcessingResult>) {
        let size_bytes = result.size_bytes();
        if size_bytes > self.config.max_bytes || self.config.capacity == 0 {
            log::debug!("not caching {key}, {size_bytes} bytes over the limits");
            return;
        }

        state.remove(&key);
        while state.entries.len() >= self.config.capacity
            || state.bytes + size_bytes > self.config.max_bytes
        {
            if !state.evict_lru() {
                break;
            }
        }

        state.bytes += size_bytes;
        let entry = Entry {
            result,
            created_at: Instant::now(),
            last_used: state.tick,
            size_bytes,
        };
        state.entries.insert(key, entry);
    }

    /// Drop every entry computed from `image_id`.
    ///
    /// Computations in flight for the image still return to their callers
    /// but are not stored.
    ///
    /// # Returns
    ///
    /// The number of entries removed.
    pub fn invalidate_image(&self, image_id: &ImageId) -> usize {
        let mut state = lock(&self.state);
        state
            .in_flight
            .iter()
            .filter(|(key, _)| &key.image_id == image_id)
            .for_each(|(_, flight)| flight.stale.store(true, Ordering::Relaxed));

        let keys = state
            .entries
            .keys()
            .filter(|key| &key.image_id == image_id)
            .cloned()
            .collect::<Vec<_>>();
        for key in &keys {
            state.remove(key);
        }
        log::debug!("invalidated {} entries of image {image_id}", keys.len());
        keys.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.bytes = 0;
    }

    /// Whether a result is stored under `key`, ignoring its age.
    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.state).entries.contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            entries: state.entries.len(),
            bytes: state.bytes,
            ..state.stats
        }
    }
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
