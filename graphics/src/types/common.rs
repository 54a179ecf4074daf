//! Common value types.

/// Texture formats relevant to pipeline creation (render-target formats).
///
/// Resource creation is handled by the device collaborator; only the formats
/// that participate in pipeline identity are modeled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    Rgba8Unorm,
    /// 8-bit RGBA, unsigned normalized, sRGB encoded.
    Rgba8UnormSrgb,
    /// 8-bit BGRA, unsigned normalized.
    Bgra8Unorm,
    /// 8-bit BGRA, unsigned normalized, sRGB encoded.
    Bgra8UnormSrgb,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float RGBA.
    Rgba32Float,
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Check if this is a depth or depth-stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm | Self::Depth24PlusStencil8 | Self::Depth32Float
        )
    }

    /// Check if this format carries a stencil aspect.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8)
    }
}

/// Texture binding target kinds.
///
/// The immediate backend shadows bound textures per (slot, target), so the
/// target participates in the shadow-state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// 2D texture.
    Texture2D,
    /// Array of 2D textures.
    Texture2DArray,
    /// 3D texture.
    Texture3D,
    /// Cubemap texture.
    Cubemap,
}

impl TextureTarget {
    /// Get a dense index for this target (used for shadow-state tables).
    pub fn index(&self) -> usize {
        match self {
            Self::Texture2D => 0,
            Self::Texture2DArray => 1,
            Self::Texture3D => 2,
            Self::Cubemap => 3,
        }
    }

    /// Number of distinct targets.
    pub const COUNT: usize = 4;
}

/// Comparison function for depth and stencil tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Never passes.
    Never,
    /// Passes if incoming < stored.
    Less,
    /// Passes if incoming == stored.
    Equal,
    /// Passes if incoming <= stored (default).
    #[default]
    LessEqual,
    /// Passes if incoming > stored.
    Greater,
    /// Passes if incoming != stored.
    NotEqual,
    /// Passes if incoming >= stored.
    GreaterEqual,
    /// Always passes.
    Always,
}
