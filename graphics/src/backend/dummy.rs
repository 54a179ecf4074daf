//! Dummy backend for testing and development.
//!
//! Performs no GPU work but implements the full backend surface with call
//! counters, so the caching and elision guarantees can be verified without
//! GPU hardware. Also serves as the final fallback when no real backend
//! initializes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::pipeline::PipelineDescriptor;
use crate::shader::ComposedStage;
use crate::shader::uber::CompiledVariant;
use crate::types::TextureTarget;

use super::context::{ContextId, ContextRegistry, DeviceContext};
use super::shadow::ShadowState;
use super::{GpuPipeline, GpuShaderStage, PipelineBackend};

/// No-op backend with call counters.
#[derive(Debug, Default)]
pub struct DummyBackend {
    compiled_stages: AtomicUsize,
    built_pipelines: AtomicUsize,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shader stages compiled through this backend.
    pub fn compiled_stage_count(&self) -> usize {
        self.compiled_stages.load(Ordering::SeqCst)
    }

    /// Number of pipelines built through this backend.
    pub fn built_pipeline_count(&self) -> usize {
        self.built_pipelines.load(Ordering::SeqCst)
    }
}

impl PipelineBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn compile_stage(
        &self,
        composed: &ComposedStage,
        _entry_point: &str,
    ) -> Result<GpuShaderStage, GraphicsError> {
        self.compiled_stages.fetch_add(1, Ordering::SeqCst);
        log::trace!(
            "DummyBackend: compiling {:?} stage {:016x}",
            composed.stage,
            composed.content_hash
        );
        Ok(GpuShaderStage::Dummy {
            stage: composed.stage,
            content_hash: composed.content_hash,
        })
    }

    fn build_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
        _variant: &CompiledVariant,
    ) -> Result<GpuPipeline, GraphicsError> {
        self.built_pipelines.fetch_add(1, Ordering::SeqCst);
        log::trace!(
            "DummyBackend: building pipeline {:016x}",
            descriptor.stable_hash()
        );
        Ok(GpuPipeline::Dummy)
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);

/// No-op device context with shadow-state elision and call counters.
///
/// Shares [`ShadowState`] with the real context, so what the tests verify
/// about elision is exactly what the immediate backend executes.
pub struct DummyContext {
    id: ContextId,
    accept_activation: AtomicBool,
    activations: AtomicUsize,
    bind_calls: AtomicUsize,
    shadow: Mutex<ShadowState>,
}

impl DummyContext {
    /// Create a context that accepts activation.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ContextId::next(),
            accept_activation: AtomicBool::new(true),
            activations: AtomicUsize::new(0),
            bind_calls: AtomicUsize::new(0),
            shadow: Mutex::new(ShadowState::new()),
        })
    }

    /// Simulate external invalidation of the native handle: further
    /// activation attempts are refused.
    pub fn invalidate(&self) {
        self.accept_activation.store(false, Ordering::SeqCst);
    }

    /// Make this context current on the calling thread.
    pub fn activate(self: &Arc<Self>) -> Result<(), GraphicsError> {
        ContextRegistry::global().make_current(self)
    }

    /// Bind a texture, eliding the call when the shadow state already shows
    /// `handle` bound at (`slot`, `target`).
    pub fn bind_texture(&self, slot: u32, target: TextureTarget, handle: u64) {
        if self.shadow.lock().note_texture_bind(slot, target, handle) {
            self.bind_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Number of native activations performed.
    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Number of backend bind calls issued (elided calls excluded).
    pub fn bind_call_count(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }
}

impl DeviceContext for DummyContext {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn make_current_native(&self) -> bool {
        if self.accept_activation.load(Ordering::SeqCst) {
            self.activations.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn release_current_native(&self) {}
}

impl Drop for DummyContext {
    fn drop(&mut self) {
        ContextRegistry::global().forget(self.id);
    }
}

static_assertions::assert_impl_all!(DummyContext: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_elision() {
        let context = DummyContext::new();
        context.bind_texture(0, TextureTarget::Texture2D, 42);
        context.bind_texture(0, TextureTarget::Texture2D, 42);
        assert_eq!(context.bind_call_count(), 1);

        context.bind_texture(0, TextureTarget::Texture2D, 43);
        assert_eq!(context.bind_call_count(), 2);
    }

    #[test]
    fn test_invalidated_context_fails_activation() {
        // Own thread: the registry slot is per thread id.
        std::thread::spawn(|| {
            let context = DummyContext::new();
            context.invalidate();
            let err = context.activate().unwrap_err();
            assert!(matches!(err, GraphicsError::ActivationFailed(_)));
            assert_eq!(ContextRegistry::global().current_id(), None);
        })
        .join()
        .unwrap();
    }
}
