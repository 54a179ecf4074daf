//! Per-thread current-context tracking.
//!
//! GPU context activation is thread-affine: at most one context may be
//! current per thread at any time, and activating a context must deactivate
//! the previously-current one first. Rather than a thread-local raw pointer,
//! the mapping lives in an explicit process-wide [`ContextRegistry`] from
//! thread id to active context. The registry outlives every context it
//! tracks; contexts deregister themselves on destruction, so a dangling
//! "current" entry can never be observed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};
use std::thread::ThreadId;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::GraphicsError;

/// Unique identity of a device context for registry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The native activation surface a device context exposes to the registry.
///
/// Implemented by the real GL context and by the dummy test context.
pub trait DeviceContext: Send + Sync {
    /// Registry identity of this context.
    fn context_id(&self) -> ContextId;

    /// Make the native context current on the calling thread.
    ///
    /// Returns `false` when the native layer refuses (lost device, handle
    /// invalidated externally, wrong thread ownership).
    fn make_current_native(&self) -> bool;

    /// Release the native context from the calling thread.
    fn release_current_native(&self);
}

struct CurrentEntry {
    id: ContextId,
    context: Weak<dyn DeviceContext>,
}

/// Process-wide map from thread id to the thread's current context.
pub struct ContextRegistry {
    current: Mutex<FxHashMap<ThreadId, CurrentEntry>>,
}

static REGISTRY: LazyLock<ContextRegistry> = LazyLock::new(|| ContextRegistry {
    current: Mutex::new(FxHashMap::default()),
});

impl ContextRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static ContextRegistry {
        &REGISTRY
    }

    /// Make `context` current on the calling thread.
    ///
    /// Idempotent when the context is already current. Otherwise the
    /// previously-current context (if any) is deactivated first, then the new
    /// one is activated. On activation failure the thread's slot is left
    /// empty — never pointing at the failed context — and
    /// [`GraphicsError::ActivationFailed`] is returned.
    pub fn make_current<C>(&self, context: &Arc<C>) -> Result<(), GraphicsError>
    where
        C: DeviceContext + 'static,
    {
        let thread = std::thread::current().id();
        let id = context.context_id();

        let mut current = self.current.lock();
        if let Some(entry) = current.get(&thread) {
            if entry.id == id {
                return Ok(());
            }
            if let Some(previous) = entry.context.upgrade() {
                previous.release_current_native();
            }
            current.remove(&thread);
        }

        if !context.make_current_native() {
            return Err(GraphicsError::ActivationFailed(format!(
                "backend refused to make context {id:?} current on {thread:?}"
            )));
        }

        let context: Arc<dyn DeviceContext> = context.clone();
        current.insert(
            thread,
            CurrentEntry {
                id,
                context: Arc::downgrade(&context),
            },
        );
        log::trace!("context {id:?} made current on {thread:?}");
        Ok(())
    }

    /// The id of the calling thread's current context, if any.
    pub fn current_id(&self) -> Option<ContextId> {
        let thread = std::thread::current().id();
        self.current.lock().get(&thread).map(|entry| entry.id)
    }

    /// Deactivate the calling thread's current context, if any.
    pub fn release_current(&self) {
        let thread = std::thread::current().id();
        if let Some(entry) = self.current.lock().remove(&thread) {
            if let Some(context) = entry.context.upgrade() {
                context.release_current_native();
            }
            log::trace!("context {:?} released from {thread:?}", entry.id);
        }
    }

    /// Remove every entry pointing at `id`.
    ///
    /// Called from context destructors so a destroyed context can never be
    /// observed as current.
    pub fn forget(&self, id: ContextId) {
        self.current.lock().retain(|_, entry| entry.id != id);
    }
}

static_assertions::assert_impl_all!(ContextRegistry: Send, Sync);
