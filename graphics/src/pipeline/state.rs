//! Pipeline state value types.
//!
//! All types here are plain hashable values: they participate in
//! [`PipelineDescriptor`](super::PipelineDescriptor) identity and therefore in
//! cache keys. Anything that cannot derive `Eq + Hash` directly (float bias
//! values) is stored as bits.

use crate::types::CompareFunction;

/// Blend factor for blending operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    /// 0.0
    #[default]
    Zero,
    /// 1.0
    One,
    /// Source color
    Src,
    /// 1 - source color
    OneMinusSrc,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination color
    Dst,
    /// 1 - destination color
    OneMinusDst,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
}

/// Blend operation for combining source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOperation {
    /// source + destination
    #[default]
    Add,
    /// source - destination
    Subtract,
    /// destination - source
    ReverseSubtract,
    /// min(source, destination)
    Min,
    /// max(source, destination)
    Max,
}

/// Blend component configuration (one for color, one for alpha).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    /// Source factor.
    pub src_factor: BlendFactor,
    /// Destination factor.
    pub dst_factor: BlendFactor,
    /// Blend operation.
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

impl BlendComponent {
    /// Standard alpha blending component (src over dst).
    pub fn over() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state for color blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    /// Color blend component.
    pub color: BlendComponent,
    /// Alpha blend component.
    pub alpha: BlendComponent,
}

impl BlendState {
    /// Standard alpha blending state.
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent::over(),
            alpha: BlendComponent::over(),
        }
    }

    /// Additive blending state.
    pub fn additive() -> Self {
        let component = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };
        Self {
            color: component,
            alpha: component,
        }
    }
}

/// Stencil operation applied on test outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOperation {
    /// Keep the stored value (default).
    #[default]
    Keep,
    /// Set the stored value to zero.
    Zero,
    /// Replace the stored value with the reference.
    Replace,
    /// Increment, clamping at maximum.
    IncrementClamp,
    /// Decrement, clamping at zero.
    DecrementClamp,
    /// Bitwise invert the stored value.
    Invert,
    /// Increment with wrap.
    IncrementWrap,
    /// Decrement with wrap.
    DecrementWrap,
}

/// Per-face stencil configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    /// Comparison against the stored value.
    pub compare: CompareFunction,
    /// Applied when the stencil test fails.
    pub fail_op: StencilOperation,
    /// Applied when the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// Applied when both tests pass.
    pub pass_op: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

/// Stencil test state for both faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StencilState {
    /// Front-face configuration.
    pub front: StencilFaceState,
    /// Back-face configuration.
    pub back: StencilFaceState,
    /// Read mask applied before comparison.
    pub read_mask: u32,
    /// Write mask applied to stored values.
    pub write_mask: u32,
    /// Reference value for the comparison.
    pub reference: u32,
}

/// Depth and stencil test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Whether the depth test is enabled.
    pub depth_test: bool,
    /// Whether depth writes are enabled.
    pub depth_write: bool,
    /// Depth comparison function.
    pub depth_compare: CompareFunction,
    /// Stencil test state; `None` disables the stencil test.
    pub stencil: Option<StencilState>,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare: CompareFunction::LessEqual,
            stencil: None,
        }
    }
}

impl DepthStencilState {
    /// Depth fully disabled (2D overlays).
    pub fn disabled() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_compare: CompareFunction::Always,
            stencil: None,
        }
    }

    /// Depth tested but not written (translucent geometry).
    pub fn read_only() -> Self {
        Self {
            depth_write: false,
            ..Self::default()
        }
    }
}

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// Front faces.
    Front,
    /// Back faces.
    Back,
}

/// Winding order of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise (default).
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Polygon fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    /// Filled polygons (default).
    #[default]
    Fill,
    /// Wireframe.
    Line,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    /// Which faces to cull; `None` disables culling.
    pub cull_mode: Option<Face>,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Polygon fill mode.
    pub polygon_mode: PolygonMode,
    /// Whether the scissor test is enabled.
    pub scissor_test: bool,
    /// Line width in pixels, stored as bits so the state stays hashable.
    pub line_width_bits: u32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: Some(Face::Back),
            front_face: FrontFace::Ccw,
            polygon_mode: PolygonMode::Fill,
            scissor_test: false,
            line_width_bits: 1.0f32.to_bits(),
        }
    }
}

impl RasterState {
    /// Line width in pixels.
    pub fn line_width(&self) -> f32 {
        f32::from_bits(self.line_width_bits)
    }

    /// Set the line width.
    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width_bits = width.to_bits();
        self
    }
}

bitflags::bitflags! {
    /// Pipeline state left dynamic (set per draw rather than baked in).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DynamicState: u32 {
        /// Viewport rectangle.
        const VIEWPORT = 1 << 0;
        /// Scissor rectangle.
        const SCISSOR = 1 << 1;
        /// Stencil reference value.
        const STENCIL_REFERENCE = 1 << 2;
        /// Blend constant color.
        const BLEND_CONSTANTS = 1 << 3;
    }
}
