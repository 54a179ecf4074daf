//! Vertex layout description.
//!
//! A [`VertexLayout`] describes how vertex attributes are spread across one or
//! more vertex buffers. Pipeline descriptors reference layouts through `Arc`
//! so that many descriptors can share one layout; the pipeline builders derive
//! their backend-native attribute and binding descriptions from it.

use std::sync::Arc;

/// Semantic meaning of a vertex attribute.
///
/// Each semantic owns a fixed shader location so that every shader variant
/// agrees on attribute numbering without per-variant negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeSemantic {
    /// Vertex position (typically float3).
    Position,
    /// Vertex normal (typically float3).
    Normal,
    /// Vertex tangent (typically float4, w = handedness).
    Tangent,
    /// Texture coordinates (typically float2).
    TexCoord,
    /// Secondary texture coordinates.
    TexCoord1,
    /// Vertex color (typically float4).
    Color,
    /// Per-instance translation (float3).
    InstanceOffset,
}

impl VertexAttributeSemantic {
    /// Shader input location for this semantic.
    pub fn location(&self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Tangent => 2,
            Self::TexCoord => 3,
            Self::TexCoord1 => 4,
            Self::Color => 5,
            Self::InstanceOffset => 6,
        }
    }
}

/// Data format of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Four 32-bit unsigned integers.
    Uint4,
    /// Four 8-bit unsigned normalized integers.
    Unorm8x4,
}

impl VertexAttributeFormat {
    /// Size in bytes of this format.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 | Self::Uint4 => 16,
            Self::Unorm8x4 => 4,
        }
    }
}

/// How a vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Buffer advances once per vertex (default).
    #[default]
    Vertex,
    /// Buffer advances once per instance.
    Instance,
}

/// Describes a single vertex buffer binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Stride in bytes between consecutive elements.
    pub stride: u32,
    /// How the buffer advances.
    pub step_mode: VertexStepMode,
}

impl VertexBufferLayout {
    /// Create a per-vertex buffer layout with the given stride.
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Vertex,
        }
    }

    /// Create a per-instance buffer layout.
    pub fn per_instance(stride: u32) -> Self {
        Self {
            stride,
            step_mode: VertexStepMode::Instance,
        }
    }
}

/// A single vertex attribute description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Semantic meaning of this attribute.
    pub semantic: VertexAttributeSemantic,
    /// Data format of this attribute.
    pub format: VertexAttributeFormat,
    /// Byte offset within the vertex buffer element.
    pub offset: u32,
    /// Index of the vertex buffer this attribute reads from.
    pub buffer_index: u32,
}

impl VertexAttribute {
    /// Create a new vertex attribute reading from buffer 0.
    pub fn new(semantic: VertexAttributeSemantic, format: VertexAttributeFormat, offset: u32) -> Self {
        Self {
            semantic,
            format,
            offset,
            buffer_index: 0,
        }
    }

    /// Set the buffer index for this attribute.
    pub fn at_buffer(mut self, buffer_index: u32) -> Self {
        self.buffer_index = buffer_index;
        self
    }
}

/// Describes the layout of vertex data across one or more buffers.
///
/// Layouts are wrapped in `Arc` and shared; a layout reference participates in
/// pipeline identity, so two descriptors using structurally equal layouts map
/// to the same pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Descriptions of each vertex buffer binding.
    pub buffers: Vec<VertexBufferLayout>,
    /// The vertex attributes, each referencing a buffer by index.
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Create a new empty vertex layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex buffer binding.
    pub fn with_buffer(mut self, buffer: VertexBufferLayout) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Add a vertex attribute.
    pub fn with_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Check if this layout has a specific semantic.
    pub fn has_semantic(&self, semantic: VertexAttributeSemantic) -> bool {
        self.attributes.iter().any(|attr| attr.semantic == semantic)
    }

    /// Validate that all attributes reference declared buffers.
    pub fn validate(&self) -> Result<(), String> {
        for attr in &self.attributes {
            if attr.buffer_index as usize >= self.buffers.len() {
                return Err(format!(
                    "attribute {:?} references buffer {} but only {} buffers defined",
                    attr.semantic,
                    attr.buffer_index,
                    self.buffers.len()
                ));
            }
        }
        Ok(())
    }

    /// Interleaved position + normal + texcoord layout (32 bytes per vertex).
    pub fn position_normal_uv() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(32))
                .with_attribute(VertexAttribute::new(
                    VertexAttributeSemantic::Position,
                    VertexAttributeFormat::Float3,
                    0,
                ))
                .with_attribute(VertexAttribute::new(
                    VertexAttributeSemantic::Normal,
                    VertexAttributeFormat::Float3,
                    12,
                ))
                .with_attribute(VertexAttribute::new(
                    VertexAttributeSemantic::TexCoord,
                    VertexAttributeFormat::Float2,
                    24,
                )),
        )
    }

    /// Position-only layout (12 bytes per vertex).
    pub fn position_only() -> Arc<Self> {
        Arc::new(
            Self::new()
                .with_buffer(VertexBufferLayout::new(12))
                .with_attribute(VertexAttribute::new(
                    VertexAttributeSemantic::Position,
                    VertexAttributeFormat::Float3,
                    0,
                )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        assert_eq!(VertexAttributeFormat::Float3.size(), 12);
        assert_eq!(VertexAttributeFormat::Unorm8x4.size(), 4);
    }

    #[test]
    fn test_semantic_locations_unique() {
        let all = [
            VertexAttributeSemantic::Position,
            VertexAttributeSemantic::Normal,
            VertexAttributeSemantic::Tangent,
            VertexAttributeSemantic::TexCoord,
            VertexAttributeSemantic::TexCoord1,
            VertexAttributeSemantic::Color,
            VertexAttributeSemantic::InstanceOffset,
        ];
        let mut locations: Vec<u32> = all.iter().map(|s| s.location()).collect();
        locations.sort_unstable();
        locations.dedup();
        assert_eq!(locations.len(), all.len());
    }

    #[test]
    fn test_layout_validation() {
        let valid = VertexLayout::position_normal_uv();
        assert!(valid.validate().is_ok());

        let invalid = VertexLayout::new().with_attribute(
            VertexAttribute::new(
                VertexAttributeSemantic::Position,
                VertexAttributeFormat::Float3,
                0,
            )
            .at_buffer(2),
        );
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_structural_equality() {
        // Two separately constructed layouts with the same content are equal,
        // which makes them interchangeable as pipeline cache key components.
        assert_eq!(
            *VertexLayout::position_normal_uv(),
            *VertexLayout::position_normal_uv()
        );
    }
}
