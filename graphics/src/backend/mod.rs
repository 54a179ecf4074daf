//! GPU backend abstraction layer.
//!
//! Two structurally different backends are normalized here:
//!
//! - `vulkan` — a pre-baked pipeline-object model: a descriptor is translated
//!   eagerly into immutable creation structures and exactly one pipeline
//!   object is created per unique descriptor.
//! - `gl` — an immediate, stateful binding model: a descriptor is translated
//!   into an ordered list of state-setting operations applied lazily against
//!   the context's shadow state.
//! - `dummy` — a no-op backend with call counters, used by the tests and as
//!   the final selection fallback.
//!
//! Each backend implements [`PipelineBackend`]. The strategy is selected once
//! at device-initialization time by [`select_backend`] and captured alongside
//! the caches; nothing re-dispatches per call.

pub mod context;
pub mod dummy;
pub mod shadow;

#[cfg(feature = "gl-backend")]
pub mod gl;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::Arc;

#[cfg(feature = "vulkan-backend")]
use ash::vk;

use crate::error::GraphicsError;
use crate::pipeline::PipelineDescriptor;
use crate::shader::uber::CompiledVariant;
use crate::shader::{ComposedStage, ShaderStage};

pub use context::{ContextId, ContextRegistry, DeviceContext};
pub use dummy::{DummyBackend, DummyContext};

/// Handle to a backend pipeline object.
#[allow(clippy::large_enum_variant)]
pub enum GpuPipeline {
    /// Dummy backend (no GPU object).
    Dummy,
    /// Immediate backend: recorded state-setting operations plus the linked
    /// program.
    #[cfg(feature = "gl-backend")]
    Gl(gl::GlPipeline),
    /// Vulkan backend: one immutable pipeline object.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        set_layout: vk::DescriptorSetLayout,
    },
}

impl std::fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuPipeline::Dummy"),
            #[cfg(feature = "gl-backend")]
            Self::Gl(pipeline) => f.debug_tuple("GpuPipeline::Gl").field(pipeline).finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { pipeline, .. } => f
                .debug_struct("GpuPipeline::Vulkan")
                .field("pipeline", pipeline)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuPipeline {
    fn drop(&mut self) {
        if let GpuPipeline::Vulkan {
            device,
            pipeline,
            layout,
            set_layout,
        } = self
        {
            unsafe {
                device.destroy_pipeline(*pipeline, None);
                device.destroy_pipeline_layout(*layout, None);
                device.destroy_descriptor_set_layout(*set_layout, None);
            }
        }
    }
}

/// Handle to a backend shader-stage object.
pub enum GpuShaderStage {
    /// Dummy backend: retains only identity.
    Dummy {
        stage: ShaderStage,
        content_hash: u64,
    },
    /// Immediate backend shader object.
    #[cfg(feature = "gl-backend")]
    Gl(gl::GlShader),
    /// Vulkan shader module.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        module: vk::ShaderModule,
        stage: ShaderStage,
    },
}

impl GpuShaderStage {
    /// The pipeline stage this object belongs to.
    pub fn stage(&self) -> ShaderStage {
        match self {
            Self::Dummy { stage, .. } => *stage,
            #[cfg(feature = "gl-backend")]
            Self::Gl(shader) => shader.stage(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { stage, .. } => *stage,
        }
    }
}

impl std::fmt::Debug for GpuShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy {
                stage,
                content_hash,
            } => f
                .debug_struct("GpuShaderStage::Dummy")
                .field("stage", stage)
                .field("content_hash", content_hash)
                .finish(),
            #[cfg(feature = "gl-backend")]
            Self::Gl(shader) => f.debug_tuple("GpuShaderStage::Gl").field(shader).finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { module, stage, .. } => f
                .debug_struct("GpuShaderStage::Vulkan")
                .field("module", module)
                .field("stage", stage)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuShaderStage {
    fn drop(&mut self) {
        if let GpuShaderStage::Vulkan { device, module, .. } = self {
            unsafe {
                device.destroy_shader_module(*module, None);
            }
        }
    }
}

/// Backend strategy for shader compilation and pipeline construction.
pub trait PipelineBackend: Send + Sync {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Compile one composed shader stage into a backend object.
    fn compile_stage(
        &self,
        composed: &ComposedStage,
        entry_point: &str,
    ) -> Result<GpuShaderStage, GraphicsError>;

    /// Translate a full descriptor (stages resolved) into a backend pipeline.
    ///
    /// Must be referentially transparent: equal descriptors produce pipelines
    /// with identical observable behavior.
    fn build_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
        variant: &CompiledVariant,
    ) -> Result<GpuPipeline, GraphicsError>;
}

/// One backend the engine may try to initialize.
pub enum BackendCandidate {
    /// Vulkan, over a device handle created by the device-init collaborator.
    #[cfg(feature = "vulkan-backend")]
    Vulkan { device: ash::Device },
    /// OpenGL, over a native context handle from the windowing collaborator.
    #[cfg(feature = "gl-backend")]
    Gl {
        native: Box<dyn gl::NativeContext>,
        params: gl::ContextParams,
    },
    /// No-op backend.
    Dummy,
}

/// Select and initialize the first working backend from `candidates`.
///
/// An activation or capability failure during a candidate's initialization is
/// logged and the next candidate is evaluated; the dummy backend is the final
/// fallback, so selection itself cannot fail.
pub fn select_backend(candidates: Vec<BackendCandidate>) -> Arc<dyn PipelineBackend> {
    for candidate in candidates {
        match candidate {
            #[cfg(feature = "vulkan-backend")]
            BackendCandidate::Vulkan { device } => {
                log::info!("Using Vulkan backend (ash)");
                return Arc::new(vulkan::VulkanBackend::new(device));
            }
            #[cfg(feature = "gl-backend")]
            BackendCandidate::Gl { native, params } => {
                match gl::GlBackend::new(native, params) {
                    Ok(backend) => {
                        log::info!("Using OpenGL backend");
                        return Arc::new(backend);
                    }
                    Err(e) => {
                        log::warn!("Failed to initialize OpenGL backend: {e}");
                    }
                }
            }
            BackendCandidate::Dummy => {
                log::info!("Using dummy backend");
                return Arc::new(DummyBackend::new());
            }
        }
    }

    log::info!("No backend candidate succeeded, using dummy backend");
    Arc::new(DummyBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_backend_falls_back_to_dummy() {
        let backend = select_backend(vec![]);
        assert_eq!(backend.name(), "Dummy");
    }

    #[test]
    fn test_select_backend_dummy_candidate() {
        let backend = select_backend(vec![BackendCandidate::Dummy]);
        assert_eq!(backend.name(), "Dummy");
    }

    #[test]
    fn test_shader_stage_handle_identity() {
        let handle = GpuShaderStage::Dummy {
            stage: ShaderStage::Fragment,
            content_hash: 42,
        };
        assert_eq!(handle.stage(), ShaderStage::Fragment);
    }
}
