//! Vulkan backend: the pre-baked pipeline-object model.
//!
//! Device and instance creation belong to the device-init collaborator; this
//! backend receives an `ash::Device` handle and owns only pipeline-state
//! translation. Each unique descriptor maps to exactly one immutable
//! pipeline object, created with a single call.

mod conversion;
mod pipeline;

pub use conversion::convert_texture_format;

use crate::error::GraphicsError;
use crate::pipeline::PipelineDescriptor;
use crate::shader::ComposedStage;
use crate::shader::uber::CompiledVariant;

use super::{GpuPipeline, GpuShaderStage, PipelineBackend};

/// Vulkan pipeline backend over a collaborator-supplied device.
pub struct VulkanBackend {
    device: ash::Device,
}

impl VulkanBackend {
    /// Wrap an already-created logical device.
    pub fn new(device: ash::Device) -> Self {
        Self { device }
    }

    /// The wrapped device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }
}

impl PipelineBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn compile_stage(
        &self,
        composed: &ComposedStage,
        entry_point: &str,
    ) -> Result<GpuShaderStage, GraphicsError> {
        let module = pipeline::create_shader_module(&self.device, composed, entry_point)?;
        Ok(GpuShaderStage::Vulkan {
            device: self.device.clone(),
            module,
            stage: composed.stage,
        })
    }

    fn build_pipeline(
        &self,
        descriptor: &PipelineDescriptor,
        variant: &CompiledVariant,
    ) -> Result<GpuPipeline, GraphicsError> {
        let (pipeline, layout, set_layout) =
            pipeline::build_graphics_pipeline(&self.device, descriptor, variant)?;
        Ok(GpuPipeline::Vulkan {
            device: self.device.clone(),
            pipeline,
            layout,
            set_layout,
        })
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send, Sync);
