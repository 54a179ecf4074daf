//! Material-facing pipeline composition.
//!
//! This module owns the binding-layout model and the material pipeline
//! instance cache that ties shader variant selection and pipeline caching
//! together.

mod bindings;
mod instances;

pub use bindings::{
    BindingLayout, BindingLayoutEntry, BindingType, EngineTextureSlot, ShaderStageFlags,
};
pub use instances::{MaterialPipelineInstance, MaterialPipelines};
