//! OpenGL backend: the immediate, stateful binding model.
//!
//! Pipeline state is not baked into a backend object. Building a pipeline
//! translates the descriptor into an ordered list of state-setting operations
//! and links the variant's shader program; binding applies only the deltas
//! against the owning [`Context`]'s shadow state.

mod api;
mod context;
mod pipeline;

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::materials::EngineTextureSlot;
use crate::pipeline::PipelineDescriptor;
use crate::shader::ComposedStage;
use crate::shader::uber::{CompiledVariant, ReflectedKind};

use super::{GpuPipeline, GpuShaderStage, PipelineBackend};

pub use api::{GLenum, GLuint, GlFunctions};
pub use context::{
    Api, Context, ContextParams, Extension, ExtensionStatus, NativeContext,
};
pub use pipeline::{Capability, GlPipeline, GlShader, RenderState, StateOp, StencilFace};

/// OpenGL pipeline backend over one initialized [`Context`].
pub struct GlBackend {
    context: Arc<Context>,
}

impl GlBackend {
    /// Initialize a context over the collaborator-supplied native handle and
    /// wrap it as a backend.
    pub fn new(
        native: Box<dyn NativeContext>,
        params: ContextParams,
    ) -> Result<Self, GraphicsError> {
        let context = Context::new(native);
        context.initialize(&params)?;
        Ok(Self { context })
    }

    /// Wrap an already-initialized context.
    pub fn with_context(context: Arc<Context>) -> Self {
        Self { context }
    }

    /// The backend's device context.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }
}

impl PipelineBackend for GlBackend {
    fn name(&self) -> &'static str {
        "OpenGL"
    }

    fn compile_stage(
        &self,
        composed: &ComposedStage,
        _entry_point: &str,
    ) -> Result<GpuShaderStage, GraphicsError> {
        let shader = self
            .context
            .compile_shader_source(composed.stage, &composed.glsl)?;
        Ok(GpuShaderStage::Gl(GlShader::new(
            shader,
            composed.stage,
            self.context.clone(),
        )))
    }

    fn build_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
        variant: &CompiledVariant,
    ) -> Result<GpuPipeline, GraphicsError> {
        let shaders: Vec<GLuint> = variant
            .stages
            .iter()
            .map(|stage| match &stage.handle {
                GpuShaderStage::Gl(shader) => Ok(shader.raw()),
                other => Err(GraphicsError::Internal(format!(
                    "non-GL shader handle {other:?} passed to the GL builder"
                ))),
            })
            .collect::<Result<_, _>>()?;

        let program = self.context.link_program(&shaders)?;

        // Well-known engine samplers always live at their fixed units; send
        // them once at link time, they never change afterwards.
        for binding in &variant.interface.bindings {
            if !matches!(binding.kind, ReflectedKind::Texture(_)) {
                continue;
            }
            if let Some(slot) = EngineTextureSlot::for_uniform(&binding.name) {
                self.context
                    .set_sampler_unit(program, &binding.name, slot.unit())?;
            }
        }

        Ok(GpuPipeline::Gl(GlPipeline::new(
            descriptor,
            program,
            self.context.clone(),
        )))
    }
}

static_assertions::assert_impl_all!(GlBackend: Send, Sync);

#[cfg(test)]
mod tests {
    use super::context::tests::{FAKE_DRIVER_LOCK, FAKE_STATE_CALLS, FakeNative};
    use super::*;
    use crate::shader::features::ShaderFeatureSet;
    use crate::shader::library::ShaderLibrary;
    use crate::shader::ShaderComposer;
    use std::sync::atomic::Ordering;

    fn on_own_thread(f: impl FnOnce() + Send + 'static) {
        std::thread::spawn(f).join().unwrap();
    }

    #[test]
    fn test_build_and_bind_pipeline_applies_deltas_once() {
        on_own_thread(|| {
            let _guard = FAKE_DRIVER_LOCK.lock();
            let backend = GlBackend::new(FakeNative::new(), ContextParams::default()).unwrap();
            let composer = ShaderComposer::new();
            let library = ShaderLibrary::standard();

            let basic = library.get("basic").unwrap();
            let variant = basic
                .select(&composer, &ShaderFeatureSet::new(), &backend)
                .unwrap();

            let descriptor = PipelineDescriptor::new().with_stages(variant.stage_keys());
            let pipeline = backend.build_pipeline(&descriptor, &variant).unwrap();
            let GpuPipeline::Gl(pipeline) = &pipeline else {
                panic!("GL backend produced a non-GL pipeline");
            };

            let before = FAKE_STATE_CALLS.load(Ordering::SeqCst);
            pipeline.bind().unwrap();
            let first_bind = FAKE_STATE_CALLS.load(Ordering::SeqCst) - before;
            assert!(first_bind > 0, "first bind issues the full state");

            pipeline.bind().unwrap();
            let second_bind = FAKE_STATE_CALLS.load(Ordering::SeqCst) - before - first_bind;
            assert_eq!(second_bind, 0, "rebinding the same pipeline is free");
        });
    }

    #[test]
    fn test_equal_descriptors_share_applied_state() {
        on_own_thread(|| {
            let _guard = FAKE_DRIVER_LOCK.lock();
            let backend = GlBackend::new(FakeNative::new(), ContextParams::default()).unwrap();
            let composer = ShaderComposer::new();
            let library = ShaderLibrary::standard();

            let basic = library.get("basic").unwrap();
            let variant_a = basic
                .select(&composer, &ShaderFeatureSet::new(), &backend)
                .unwrap();
            let variant_b = basic
                .select(&composer, &ShaderFeatureSet::new(), &backend)
                .unwrap();

            let descriptor = PipelineDescriptor::new().with_stages(variant_a.stage_keys());
            let first = backend.build_pipeline(&descriptor, &variant_a).unwrap();
            let second = backend.build_pipeline(&descriptor, &variant_b).unwrap();

            let (GpuPipeline::Gl(first), GpuPipeline::Gl(second)) = (&first, &second) else {
                panic!("GL backend produced a non-GL pipeline");
            };

            // Referential transparency: equal descriptors record equal ops.
            assert_eq!(first.ops(), second.ops());

            first.bind().unwrap();
            let before = FAKE_STATE_CALLS.load(Ordering::SeqCst);
            second.bind().unwrap();
            assert_eq!(
                FAKE_STATE_CALLS.load(Ordering::SeqCst),
                before,
                "an equal pipeline binds with zero state changes"
            );
        });
    }
}
