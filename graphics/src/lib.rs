//! # Nightshade Graphics
//!
//! Rendering-backend abstraction for the Nightshade engine.
//!
//! ## Overview
//!
//! This crate normalizes GPU pipeline state across two structurally different
//! backends and caches everything expensive:
//!
//! - [`PipelineDescriptor`] — a hashable, backend-agnostic value describing
//!   complete pipeline state.
//! - [`backend`] — the pre-baked Vulkan model, the immediate OpenGL model
//!   with shadow-state elision, and a dummy backend for tests.
//! - [`shader`] — uber-shader variant selection over a declared flag
//!   vocabulary, composed and validated through naga.
//! - [`PipelineCache`] / [`MaterialPipelines`] — two-level memoization with a
//!   per-key single-flight guarantee: one build per unique configuration for
//!   the process lifetime.
//!
//! ## Example
//!
//! ```ignore
//! use nightshade_graphics::{
//!     BackendCandidate, MaterialPipelines, PipelineDescriptor, ShaderFeatureSet, ShaderLibrary,
//!     select_backend,
//! };
//!
//! let backend = select_backend(vec![BackendCandidate::Dummy]);
//! let cache = MaterialPipelines::new(backend);
//! let library = ShaderLibrary::standard();
//!
//! let phong = library.get("phong").unwrap();
//! let descriptor = PipelineDescriptor::new();
//! let features = ShaderFeatureSet::from(["ALPHA_TEST"]);
//!
//! let instance = cache.get_or_create(&descriptor, &phong, &features)?;
//! // instance.pipeline() is ready for draw submission.
//! ```

pub mod backend;
pub mod error;
pub mod materials;
pub mod mesh;
pub mod pipeline;
pub mod shader;
pub mod types;

// Re-export main types for convenience
pub use backend::{
    BackendCandidate, ContextRegistry, DeviceContext, DummyBackend, DummyContext, GpuPipeline,
    GpuShaderStage, PipelineBackend, select_backend,
};
pub use error::GraphicsError;
pub use materials::{
    BindingLayout, BindingType, EngineTextureSlot, MaterialPipelineInstance, MaterialPipelines,
};
pub use mesh::{VertexAttribute, VertexAttributeFormat, VertexAttributeSemantic, VertexLayout};
pub use pipeline::{
    BlendState, DepthStencilState, DynamicState, PipelineCache, PipelineDescriptor, PipelineId,
    RasterState,
};
pub use shader::features::ShaderFeatureSet;
pub use shader::library::ShaderLibrary;
pub use shader::uber::UberShader;
pub use shader::{ShaderComposer, ShaderStage};
pub use types::{TextureFormat, TextureTarget};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Nightshade Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_standard_library_available() {
        let library = ShaderLibrary::standard();
        assert!(!library.is_empty());
    }
}
