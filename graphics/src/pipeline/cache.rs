//! Pipeline object cache.
//!
//! [`PipelineCache`] memoizes built backend pipelines by descriptor value. It
//! guarantees at most one successful build per unique descriptor for the
//! cache's lifetime, and serializes concurrent requests per key with a
//! single-flight discipline: a second request for a key already being built
//! waits for and reuses the in-flight result instead of building again.
//!
//! Pipelines are stored in an arena and addressed by stable [`PipelineId`]
//! indices; material instances hold an id, never an owning reference, so
//! there is no reference cycle between the instance cache and this cache.
//!
//! There is no eviction. [`clear`](PipelineCache::clear) destroys every entry
//! and must run before backend device teardown.

use std::hash::Hash;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::backend::GpuPipeline;
use crate::error::GraphicsError;

use super::descriptor::PipelineDescriptor;

/// Stable index of a cached pipeline object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(u32);

impl PipelineId {
    /// Arena index of this pipeline.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

enum Slot<V> {
    /// A builder is running for this key; waiters block on the condvar.
    Building,
    /// The key resolved to a value.
    Ready(V),
}

/// Keyed single-flight map.
///
/// `get_or_init` runs the initializer outside the lock, at most once
/// concurrently per key. A failed initializer releases its slot instead of
/// poisoning it, so the key stays buildable; the failure is returned to the
/// caller that ran the initializer, and a waiter that finds the slot released
/// takes over as the next builder.
pub(crate) struct SingleFlight<K, V> {
    slots: Mutex<FxHashMap<K, Slot<V>>>,
    ready: Condvar,
}

impl<K: Eq + Hash + Copy, V: Clone> SingleFlight<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(FxHashMap::default()),
            ready: Condvar::new(),
        }
    }

    /// Look up a resolved key without building.
    pub(crate) fn get(&self, key: K) -> Option<V> {
        match self.slots.lock().get(&key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Resolve `key`, running `init` if no other caller is doing so.
    pub(crate) fn get_or_init<F>(&self, key: K, init: F) -> Result<V, GraphicsError>
    where
        F: FnOnce() -> Result<V, GraphicsError>,
    {
        let mut slots = self.slots.lock();
        loop {
            match slots.get(&key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Building) => {}
                None => break,
            }
            // Re-check after waking: the build finished or failed and
            // released the slot.
            self.ready.wait(&mut slots);
        }

        slots.insert(key, Slot::Building);
        drop(slots);

        let result = init();

        let mut slots = self.slots.lock();
        match result {
            Ok(value) => {
                slots.insert(key, Slot::Ready(value.clone()));
                self.ready.notify_all();
                Ok(value)
            }
            Err(err) => {
                slots.remove(&key);
                self.ready.notify_all();
                Err(err)
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub(crate) fn clear(&self) {
        self.slots.lock().clear();
    }
}

/// Process-lifetime cache of built pipeline objects.
pub struct PipelineCache {
    flight: SingleFlight<u64, PipelineId>,
    pipelines: Mutex<Vec<GpuPipeline>>,
}

impl PipelineCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            flight: SingleFlight::new(),
            pipelines: Mutex::new(Vec::new()),
        }
    }

    /// Look up or build the pipeline for `descriptor`.
    ///
    /// Lookup is by descriptor value (stable hash), not caller identity.
    /// Concurrent requests for an equal descriptor observe exactly one build.
    /// A build failure is wrapped in [`GraphicsError::CacheBuildFailed`] and
    /// leaves every prior entry untouched.
    pub fn get_or_build<F>(
        &self,
        descriptor: &PipelineDescriptor,
        build: F,
    ) -> Result<PipelineId, GraphicsError>
    where
        F: FnOnce() -> Result<GpuPipeline, GraphicsError>,
    {
        let key = descriptor.stable_hash();
        self.flight.get_or_init(key, || {
            log::trace!("pipeline cache miss, building {key:016x}");
            let pipeline =
                build().map_err(|e| GraphicsError::CacheBuildFailed(e.to_string()))?;
            let mut pipelines = self.pipelines.lock();
            let id = PipelineId(pipelines.len() as u32);
            pipelines.push(pipeline);
            Ok(id)
        })
    }

    /// Look up an already-built pipeline without building.
    pub fn get(&self, descriptor: &PipelineDescriptor) -> Option<PipelineId> {
        self.flight.get(descriptor.stable_hash())
    }

    /// Run `f` against the pipeline object for `id`.
    ///
    /// Returns `None` if the id does not resolve (stale id after `clear`).
    pub fn with_pipeline<R>(&self, id: PipelineId, f: impl FnOnce(&GpuPipeline) -> R) -> Option<R> {
        self.pipelines.lock().get(id.index()).map(f)
    }

    /// Number of cached pipelines. The cache never evicts, so this is also
    /// the total number of unique descriptors built; useful to watch growth.
    pub fn len(&self) -> usize {
        self.pipelines.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy all cached pipelines.
    ///
    /// Must be called before the backend device is torn down, in that order;
    /// dropping the handles releases the backend objects they own.
    pub fn clear(&self) {
        let count = self.len();
        self.flight.clear();
        self.pipelines.lock().clear();
        if count > 0 {
            log::debug!("pipeline cache cleared ({count} entries)");
        }
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(PipelineCache: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::pipeline::state::BlendState;

    fn descriptor() -> PipelineDescriptor {
        PipelineDescriptor::new().with_blend(BlendState::alpha_blending())
    }

    #[test]
    fn test_at_most_one_build() {
        let cache = PipelineCache::new();
        let builds = AtomicUsize::new(0);

        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(GpuPipeline::Dummy)
        };

        let first = cache.get_or_build(&descriptor(), build).unwrap();
        let second = cache
            .get_or_build(&descriptor(), || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(GpuPipeline::Dummy)
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_descriptors_distinct_pipelines() {
        let cache = PipelineCache::new();
        let a = cache
            .get_or_build(&descriptor(), || Ok(GpuPipeline::Dummy))
            .unwrap();
        let b = cache
            .get_or_build(&PipelineDescriptor::new(), || Ok(GpuPipeline::Dummy))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_build_leaves_cache_consistent() {
        let cache = PipelineCache::new();
        let good = cache
            .get_or_build(&descriptor(), || Ok(GpuPipeline::Dummy))
            .unwrap();

        let failing = PipelineDescriptor::new();
        let err = cache
            .get_or_build(&failing, || {
                Err(GraphicsError::Internal("builder exploded".into()))
            })
            .unwrap_err();
        assert!(matches!(err, GraphicsError::CacheBuildFailed(_)));
        assert!(err.to_string().contains("builder exploded"));

        // The good entry survives, and the failed key can be retried.
        assert_eq!(cache.get(&descriptor()), Some(good));
        let retried = cache
            .get_or_build(&failing, || Ok(GpuPipeline::Dummy))
            .unwrap();
        assert_eq!(cache.get(&failing), Some(retried));
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = PipelineCache::new();
        cache
            .get_or_build(&descriptor(), || Ok(GpuPipeline::Dummy))
            .unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&descriptor()), None);
    }

    #[test]
    fn test_single_flight_under_contention() {
        let cache = Arc::new(PipelineCache::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let builds = builds.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_build(&descriptor(), || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            // Widen the race window so waiters actually pile up.
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(GpuPipeline::Dummy)
                        })
                        .unwrap()
                })
            })
            .collect();

        let ids: Vec<PipelineId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1, "exactly one build");
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers share it");
    }

    #[test]
    fn test_with_pipeline_resolves_id() {
        let cache = PipelineCache::new();
        let id = cache
            .get_or_build(&descriptor(), || Ok(GpuPipeline::Dummy))
            .unwrap();
        let seen = cache.with_pipeline(id, |p| matches!(p, GpuPipeline::Dummy));
        assert_eq!(seen, Some(true));
    }
}
