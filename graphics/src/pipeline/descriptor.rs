//! Backend-agnostic pipeline descriptor.
//!
//! A [`PipelineDescriptor`] is an immutable, hashable value describing the
//! complete draw-time state of a pipeline. Structural equality of two
//! descriptors guarantees behaviorally identical backend pipelines, which is
//! what makes the descriptor usable as a cache key.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nightshade_core::mesh::PrimitiveTopology;

use crate::mesh::VertexLayout;
use crate::shader::ShaderStage;
use crate::types::TextureFormat;

use super::state::{BlendState, DepthStencilState, DynamicState, RasterState};

/// Identifies one resolved shader stage inside a descriptor.
///
/// The content hash collapses the compiled stage (source + rendered flag set)
/// into a value, so two descriptors agree exactly when their stage contents
/// agree. This is what lets two different feature-flag sets share one backend
/// pipeline when the preprocessor output coincides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStageKey {
    /// The pipeline stage this entry occupies.
    pub stage: ShaderStage,
    /// Stable hash of the compiled stage content.
    pub content_hash: u64,
}

/// Complete, backend-agnostic description of a graphics pipeline.
///
/// Descriptors are built once by the material layer and treated as immutable
/// values afterwards. The hash is stable across process runs for the same
/// logical content (see [`stable_hash`](Self::stable_hash)), and independent
/// of construction order: it is computed over the field values, and the only
/// ordered collections (shader stages, color formats) are ordered by meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineDescriptor {
    /// Color blend state; `None` disables blending.
    pub blend: Option<BlendState>,
    /// Depth and stencil state.
    pub depth_stencil: DepthStencilState,
    /// Rasterizer state.
    pub raster: RasterState,
    /// Vertex layout reference. Hashed structurally, not by pointer.
    pub vertex_layout: Arc<VertexLayout>,
    /// Resolved shader stages, in pipeline order. Empty on a base descriptor
    /// before variant selection.
    pub stages: Vec<ShaderStageKey>,
    /// Pipeline state left dynamic.
    pub dynamic_state: DynamicState,
    /// Primitive topology.
    pub topology: PrimitiveTopology,
    /// Color attachment formats, in attachment order.
    pub color_formats: Vec<TextureFormat>,
    /// Depth attachment format, if any.
    pub depth_format: Option<TextureFormat>,
}

impl PipelineDescriptor {
    /// Create a descriptor with default state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the blend state.
    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = Some(blend);
        self
    }

    /// Set the depth/stencil state.
    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }

    /// Set the rasterizer state.
    pub fn with_raster(mut self, raster: RasterState) -> Self {
        self.raster = raster;
        self
    }

    /// Set the vertex layout.
    pub fn with_vertex_layout(mut self, layout: Arc<VertexLayout>) -> Self {
        self.vertex_layout = layout;
        self
    }

    /// Set the dynamic-state toggles.
    pub fn with_dynamic_state(mut self, dynamic_state: DynamicState) -> Self {
        self.dynamic_state = dynamic_state;
        self
    }

    /// Set the primitive topology.
    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Add a color attachment format.
    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_formats.push(format);
        self
    }

    /// Set the depth attachment format.
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Derive a full descriptor from this base by attaching resolved stages.
    ///
    /// The base descriptor's own stage list is replaced, not appended to.
    pub fn with_stages(&self, stages: Vec<ShaderStageKey>) -> Self {
        let mut derived = self.clone();
        derived.stages = stages;
        derived
    }

    /// Stable hash of this descriptor, usable as a cache key.
    ///
    /// Uses `FxHasher`, which is deterministic: the same logical descriptor
    /// hashes identically across process runs, unlike the randomized default
    /// hasher.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{BlendState, DepthStencilState};

    fn sample_descriptor() -> PipelineDescriptor {
        PipelineDescriptor::new()
            .with_blend(BlendState::alpha_blending())
            .with_depth_stencil(DepthStencilState::read_only())
            .with_vertex_layout(VertexLayout::position_normal_uv())
            .with_color_format(TextureFormat::Bgra8UnormSrgb)
            .with_depth_format(TextureFormat::Depth32Float)
    }

    #[test]
    fn test_structural_equality() {
        // Separately built descriptors with equal content compare equal even
        // though their vertex layouts are distinct Arc allocations.
        assert_eq!(sample_descriptor(), sample_descriptor());
    }

    #[test]
    fn test_stable_hash_matches_equality() {
        assert_eq!(
            sample_descriptor().stable_hash(),
            sample_descriptor().stable_hash()
        );
    }

    #[test]
    fn test_hash_distinguishes_state() {
        let base = sample_descriptor();
        let mut no_blend = base.clone();
        no_blend.blend = None;
        assert_ne!(base.stable_hash(), no_blend.stable_hash());

        let mut culled = base.clone();
        culled.raster.cull_mode = None;
        assert_ne!(base.stable_hash(), culled.stable_hash());
    }

    #[test]
    fn test_with_stages_replaces() {
        let base = sample_descriptor();
        let derived = base.with_stages(vec![ShaderStageKey {
            stage: ShaderStage::Vertex,
            content_hash: 7,
        }]);
        assert!(base.stages.is_empty());
        assert_eq!(derived.stages.len(), 1);
        assert_ne!(base.stable_hash(), derived.stable_hash());

        // Re-deriving with the same stages is idempotent.
        let again = derived.with_stages(vec![ShaderStageKey {
            stage: ShaderStage::Vertex,
            content_hash: 7,
        }]);
        assert_eq!(derived, again);
    }
}
