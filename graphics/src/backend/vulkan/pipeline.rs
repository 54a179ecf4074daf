//! Vulkan graphics-pipeline construction.
//!
//! The pre-baked model: a descriptor is translated eagerly into the immutable
//! creation sub-structures, in dependency order, and exactly one
//! `vkCreateGraphicsPipelines` call is made per unique descriptor. A failure
//! in any sub-structure aborts the whole build; partial objects are never
//! returned.

use std::ffi::CString;

use ash::vk;

use crate::error::GraphicsError;
use crate::materials::{BindingLayout, BindingType};
use crate::mesh::{VertexLayout, VertexStepMode};
use crate::pipeline::{DynamicState, PipelineDescriptor, StencilFaceState, StencilState};
use crate::shader::ComposedStage;
use crate::shader::uber::CompiledVariant;

use super::conversion::{
    convert_blend_factor, convert_blend_operation, convert_compare_function, convert_cull_mode,
    convert_front_face, convert_polygon_mode, convert_shader_stage, convert_stencil_operation,
    convert_texture_format, convert_topology, convert_vertex_format,
};

/// Generate SPIR-V for a composed stage and wrap it in a shader module.
pub fn create_shader_module(
    device: &ash::Device,
    composed: &ComposedStage,
    entry_point: &str,
) -> Result<vk::ShaderModule, GraphicsError> {
    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        flags: naga::back::spv::WriterFlags::empty(),
        ..Default::default()
    };

    let naga_stage = match composed.stage {
        crate::shader::ShaderStage::Vertex => naga::ShaderStage::Vertex,
        crate::shader::ShaderStage::Fragment => naga::ShaderStage::Fragment,
        crate::shader::ShaderStage::Compute => naga::ShaderStage::Compute,
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: naga_stage,
        entry_point: entry_point.to_string(),
    };

    let spirv = naga::back::spv::write_vec(
        &composed.module,
        &composed.info,
        &options,
        Some(&pipeline_options),
    )
    .map_err(|e| {
        GraphicsError::VariantCompilationFailed(format!("SPIR-V generation error: {e}"))
    })?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&spirv);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
        GraphicsError::VariantCompilationFailed(format!("failed to create shader module: {e:?}"))
    })
}

/// Create the descriptor set layout for a variant's binding layout.
pub fn create_descriptor_set_layout(
    device: &ash::Device,
    layout: &BindingLayout,
) -> Result<vk::DescriptorSetLayout, GraphicsError> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = layout
        .entries
        .iter()
        .map(|entry| {
            let descriptor_type = match entry.binding_type {
                BindingType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
                BindingType::Texture | BindingType::TextureCube => {
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                }
            };
            vk::DescriptorSetLayoutBinding::default()
                .binding(entry.binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        })
        .collect();

    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&create_info, None) }.map_err(|e| {
        GraphicsError::Internal(format!("failed to create descriptor set layout: {e:?}"))
    })
}

/// Create a pipeline layout over one descriptor set layout.
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layout: vk::DescriptorSetLayout,
) -> Result<vk::PipelineLayout, GraphicsError> {
    let set_layouts = [set_layout];
    let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    unsafe { device.create_pipeline_layout(&create_info, None) }
        .map_err(|e| GraphicsError::Internal(format!("failed to create pipeline layout: {e:?}")))
}

/// Build the per-attachment blend states.
fn build_color_blend_attachments(
    descriptor: &PipelineDescriptor,
) -> Vec<vk::PipelineColorBlendAttachmentState> {
    descriptor
        .color_formats
        .iter()
        .map(|_| match &descriptor.blend {
            Some(blend) => vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(convert_blend_factor(blend.color.src_factor))
                .dst_color_blend_factor(convert_blend_factor(blend.color.dst_factor))
                .color_blend_op(convert_blend_operation(blend.color.operation))
                .src_alpha_blend_factor(convert_blend_factor(blend.alpha.src_factor))
                .dst_alpha_blend_factor(convert_blend_factor(blend.alpha.dst_factor))
                .alpha_blend_op(convert_blend_operation(blend.alpha.operation)),
            None => vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false),
        })
        .collect()
}

/// Build one face of the stencil state.
fn build_stencil_op(face: &StencilFaceState, stencil: &StencilState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: convert_stencil_operation(face.fail_op),
        pass_op: convert_stencil_operation(face.pass_op),
        depth_fail_op: convert_stencil_operation(face.depth_fail_op),
        compare_op: convert_compare_function(face.compare),
        compare_mask: stencil.read_mask,
        write_mask: stencil.write_mask,
        reference: stencil.reference,
    }
}

/// Build the dynamic-state list: viewport and scissor are always dynamic,
/// the rest follows the descriptor's toggles.
fn build_dynamic_state_list(descriptor: &PipelineDescriptor) -> Vec<vk::DynamicState> {
    let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    if descriptor
        .dynamic_state
        .contains(DynamicState::STENCIL_REFERENCE)
    {
        states.push(vk::DynamicState::STENCIL_REFERENCE);
    }
    if descriptor
        .dynamic_state
        .contains(DynamicState::BLEND_CONSTANTS)
    {
        states.push(vk::DynamicState::BLEND_CONSTANTS);
    }
    states
}

/// Build vertex binding descriptions from the layout's buffers.
fn build_vertex_bindings(layout: &VertexLayout) -> Vec<vk::VertexInputBindingDescription> {
    layout
        .buffers
        .iter()
        .enumerate()
        .map(|(index, buffer)| {
            vk::VertexInputBindingDescription::default()
                .binding(index as u32)
                .stride(buffer.stride)
                .input_rate(match buffer.step_mode {
                    VertexStepMode::Vertex => vk::VertexInputRate::VERTEX,
                    VertexStepMode::Instance => vk::VertexInputRate::INSTANCE,
                })
        })
        .collect()
}

/// Build vertex attribute descriptions from the layout's attributes.
fn build_vertex_attributes(layout: &VertexLayout) -> Vec<vk::VertexInputAttributeDescription> {
    layout
        .attributes
        .iter()
        .map(|attribute| {
            vk::VertexInputAttributeDescription::default()
                .location(attribute.semantic.location())
                .binding(attribute.buffer_index)
                .format(convert_vertex_format(attribute.format))
                .offset(attribute.offset)
        })
        .collect()
}

/// Build the complete pipeline for `descriptor` with exactly one creation
/// call.
///
/// Returns the pipeline together with the layout objects it was created
/// against; the caller owns all three.
pub fn build_graphics_pipeline(
    device: &ash::Device,
    descriptor: &PipelineDescriptor,
    variant: &CompiledVariant,
) -> Result<(vk::Pipeline, vk::PipelineLayout, vk::DescriptorSetLayout), GraphicsError> {
    let binding_layout = BindingLayout::from_interface(&variant.interface);
    let set_layout = create_descriptor_set_layout(device, &binding_layout)?;
    let pipeline_layout = match create_pipeline_layout(device, set_layout) {
        Ok(layout) => layout,
        Err(e) => {
            unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
            return Err(e);
        }
    };

    let entry_point = CString::new("main").expect("static entry point name");
    let mut modules = Vec::with_capacity(variant.stages.len());
    for stage in &variant.stages {
        match &stage.handle {
            crate::backend::GpuShaderStage::Vulkan { module, .. } => {
                modules.push((stage.stage, *module));
            }
            other => {
                unsafe {
                    device.destroy_pipeline_layout(pipeline_layout, None);
                    device.destroy_descriptor_set_layout(set_layout, None);
                }
                return Err(GraphicsError::Internal(format!(
                    "non-Vulkan shader handle {other:?} passed to the Vulkan builder"
                )));
            }
        }
    }

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = modules
        .iter()
        .map(|(stage, module)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(convert_shader_stage(*stage))
                .module(*module)
                .name(&entry_point)
        })
        .collect();

    let binding_descriptions = build_vertex_bindings(&descriptor.vertex_layout);
    let attribute_descriptions = build_vertex_attributes(&descriptor.vertex_layout);
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_topology(descriptor.topology))
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let raster = &descriptor.raster;
    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(convert_polygon_mode(raster.polygon_mode))
        .line_width(raster.line_width())
        .cull_mode(convert_cull_mode(raster.cull_mode))
        .front_face(convert_front_face(raster.front_face))
        .depth_bias_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth = &descriptor.depth_stencil;
    let mut depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth.depth_test)
        .depth_write_enable(depth.depth_write)
        .depth_compare_op(convert_compare_function(depth.depth_compare))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(depth.stencil.is_some());
    if let Some(stencil) = &depth.stencil {
        depth_stencil_state = depth_stencil_state
            .front(build_stencil_op(&stencil.front, stencil))
            .back(build_stencil_op(&stencil.back, stencil));
    }

    let color_blend_attachments = build_color_blend_attachments(descriptor);
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = build_dynamic_state_list(descriptor);
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_attachment_formats: Vec<vk::Format> = descriptor
        .color_formats
        .iter()
        .map(|format| convert_texture_format(*format))
        .collect();
    let depth_attachment_format = descriptor
        .depth_format
        .map(convert_texture_format)
        .unwrap_or(vk::Format::UNDEFINED);

    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_attachment_formats)
        .depth_attachment_format(depth_attachment_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        unsafe {
            device.destroy_pipeline_layout(pipeline_layout, None);
            device.destroy_descriptor_set_layout(set_layout, None);
        }
        GraphicsError::Internal(format!("failed to create graphics pipeline: {e:?}"))
    })?;

    Ok((pipelines[0], pipeline_layout, set_layout))
}
