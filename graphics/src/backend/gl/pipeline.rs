//! Immediate-mode pipeline translation.
//!
//! The OpenGL backend does not create a persistent pipeline object. A
//! descriptor is translated once into an ordered list of [`StateOp`]s; at
//! bind time only the deltas against the context's shadow render state are
//! issued. Binding the same pipeline twice in a row issues no state call at
//! all.

use std::sync::Arc;

use nightshade_core::mesh::PrimitiveTopology;
use rustc_hash::FxHashMap;

use crate::error::GraphicsError;
use crate::pipeline::{
    BlendFactor, BlendOperation, DynamicState, Face, FrontFace, PipelineDescriptor, PolygonMode,
    StencilFaceState,
};
use crate::shader::ShaderStage;
use crate::types::CompareFunction;

use super::api::{self, GLenum, GLint, GLuint, GlFunctions};
use super::context::Context;

/// A toggleable backend capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Color blending.
    Blend,
    /// Face culling.
    CullFace,
    /// Depth test.
    DepthTest,
    /// Scissor test.
    ScissorTest,
    /// Stencil test.
    StencilTest,
}

/// Which stencil face a state op addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilFace {
    /// Front-facing primitives.
    Front,
    /// Back-facing primitives.
    Back,
}

/// One recorded state-setting operation.
///
/// Ops carry backend-agnostic values; conversion to GL enums happens at issue
/// time so the recorded list stays comparable in tests and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    /// Enable or disable a capability.
    Capability(Capability, bool),
    /// Set separate blend factors.
    BlendFunc {
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
    /// Set separate blend equations.
    BlendEquation {
        color: BlendOperation,
        alpha: BlendOperation,
    },
    /// Toggle depth writes.
    DepthMask(bool),
    /// Set the depth comparison.
    DepthFunc(CompareFunction),
    /// Select which faces are culled.
    CullFace(Face),
    /// Set the front-face winding.
    FrontFaceWinding(FrontFace),
    /// Set the polygon fill mode.
    Polygon(PolygonMode),
    /// Set the rasterized line width (bits of an `f32`).
    LineWidth(u32),
    /// Per-face stencil comparison.
    StencilFunc {
        face: StencilFace,
        compare: CompareFunction,
        reference: i32,
        read_mask: u32,
    },
    /// Per-face stencil operations.
    StencilOps {
        face: StencilFace,
        fail: crate::pipeline::StencilOperation,
        depth_fail: crate::pipeline::StencilOperation,
        pass: crate::pipeline::StencilOperation,
    },
    /// Per-face stencil write mask.
    StencilWriteMask { face: StencilFace, mask: u32 },
}

/// Shadow copy of the backend render state, used to elide redundant ops.
#[derive(Debug, Default)]
pub struct RenderState {
    capabilities: FxHashMap<Capability, bool>,
    blend_func: Option<(BlendFactor, BlendFactor, BlendFactor, BlendFactor)>,
    blend_equation: Option<(BlendOperation, BlendOperation)>,
    depth_mask: Option<bool>,
    depth_func: Option<CompareFunction>,
    cull_face: Option<Face>,
    front_face: Option<FrontFace>,
    polygon_mode: Option<PolygonMode>,
    line_width: Option<u32>,
    stencil_func: FxHashMap<StencilFace, (CompareFunction, i32, u32)>,
    stencil_ops: FxHashMap<
        StencilFace,
        (
            crate::pipeline::StencilOperation,
            crate::pipeline::StencilOperation,
            crate::pipeline::StencilOperation,
        ),
    >,
    stencil_write_mask: FxHashMap<StencilFace, u32>,
}

impl RenderState {
    /// Create a state with nothing known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `op`, returning whether the backend call must be issued.
    pub fn note(&mut self, op: &StateOp) -> bool {
        match *op {
            StateOp::Capability(capability, enabled) => {
                self.capabilities.insert(capability, enabled) != Some(enabled)
            }
            StateOp::BlendFunc {
                src_color,
                dst_color,
                src_alpha,
                dst_alpha,
            } => {
                let value = (src_color, dst_color, src_alpha, dst_alpha);
                self.blend_func.replace(value) != Some(value)
            }
            StateOp::BlendEquation { color, alpha } => {
                self.blend_equation.replace((color, alpha)) != Some((color, alpha))
            }
            StateOp::DepthMask(enabled) => self.depth_mask.replace(enabled) != Some(enabled),
            StateOp::DepthFunc(func) => self.depth_func.replace(func) != Some(func),
            StateOp::CullFace(face) => self.cull_face.replace(face) != Some(face),
            StateOp::FrontFaceWinding(winding) => {
                self.front_face.replace(winding) != Some(winding)
            }
            StateOp::Polygon(mode) => self.polygon_mode.replace(mode) != Some(mode),
            StateOp::LineWidth(bits) => self.line_width.replace(bits) != Some(bits),
            StateOp::StencilFunc {
                face,
                compare,
                reference,
                read_mask,
            } => {
                let value = (compare, reference, read_mask);
                self.stencil_func.insert(face, value) != Some(value)
            }
            StateOp::StencilOps {
                face,
                fail,
                depth_fail,
                pass,
            } => {
                let value = (fail, depth_fail, pass);
                self.stencil_ops.insert(face, value) != Some(value)
            }
            StateOp::StencilWriteMask { face, mask } => {
                self.stencil_write_mask.insert(face, mask) != Some(mask)
            }
        }
    }

    /// Forget everything, forcing the next bind to re-issue all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Translate a descriptor into its ordered state-op list.
///
/// States flagged dynamic in the descriptor are left to the draw-submission
/// layer and produce no recorded op.
pub fn translate_descriptor(descriptor: &PipelineDescriptor) -> Vec<StateOp> {
    let mut ops = Vec::new();

    match &descriptor.blend {
        Some(blend) => {
            ops.push(StateOp::Capability(Capability::Blend, true));
            ops.push(StateOp::BlendFunc {
                src_color: blend.color.src_factor,
                dst_color: blend.color.dst_factor,
                src_alpha: blend.alpha.src_factor,
                dst_alpha: blend.alpha.dst_factor,
            });
            ops.push(StateOp::BlendEquation {
                color: blend.color.operation,
                alpha: blend.alpha.operation,
            });
        }
        None => ops.push(StateOp::Capability(Capability::Blend, false)),
    }

    let depth = &descriptor.depth_stencil;
    ops.push(StateOp::Capability(Capability::DepthTest, depth.depth_test));
    if depth.depth_test {
        ops.push(StateOp::DepthFunc(depth.depth_compare));
    }
    ops.push(StateOp::DepthMask(depth.depth_write));

    match &depth.stencil {
        Some(stencil) => {
            ops.push(StateOp::Capability(Capability::StencilTest, true));
            for (face, state) in [
                (StencilFace::Front, &stencil.front),
                (StencilFace::Back, &stencil.back),
            ] {
                push_stencil_face(
                    &mut ops,
                    face,
                    state,
                    stencil,
                    descriptor
                        .dynamic_state
                        .contains(DynamicState::STENCIL_REFERENCE),
                );
            }
        }
        None => ops.push(StateOp::Capability(Capability::StencilTest, false)),
    }

    let raster = &descriptor.raster;
    match raster.cull_mode {
        Some(face) => {
            ops.push(StateOp::Capability(Capability::CullFace, true));
            ops.push(StateOp::CullFace(face));
        }
        None => ops.push(StateOp::Capability(Capability::CullFace, false)),
    }
    ops.push(StateOp::FrontFaceWinding(raster.front_face));
    ops.push(StateOp::Polygon(raster.polygon_mode));
    ops.push(StateOp::LineWidth(raster.line_width_bits));
    if !descriptor.dynamic_state.contains(DynamicState::SCISSOR) {
        ops.push(StateOp::Capability(
            Capability::ScissorTest,
            raster.scissor_test,
        ));
    }

    ops
}

fn push_stencil_face(
    ops: &mut Vec<StateOp>,
    face: StencilFace,
    state: &StencilFaceState,
    stencil: &crate::pipeline::StencilState,
    reference_is_dynamic: bool,
) {
    if !reference_is_dynamic {
        ops.push(StateOp::StencilFunc {
            face,
            compare: state.compare,
            reference: stencil.reference as i32,
            read_mask: stencil.read_mask,
        });
    }
    ops.push(StateOp::StencilOps {
        face,
        fail: state.fail_op,
        depth_fail: state.depth_fail_op,
        pass: state.pass_op,
    });
    ops.push(StateOp::StencilWriteMask {
        face,
        mask: stencil.write_mask,
    });
}

/// Issue one op through the command table.
///
/// # Safety
///
/// The owning context must be current on the calling thread.
pub(crate) unsafe fn issue_op(functions: &GlFunctions, op: &StateOp) {
    unsafe {
        match *op {
            StateOp::Capability(capability, enabled) => {
                let cap = capability_to_gl(capability);
                if enabled {
                    (functions.glEnable)(cap);
                } else {
                    (functions.glDisable)(cap);
                }
            }
            StateOp::BlendFunc {
                src_color,
                dst_color,
                src_alpha,
                dst_alpha,
            } => (functions.glBlendFuncSeparate)(
                blend_factor_to_gl(src_color),
                blend_factor_to_gl(dst_color),
                blend_factor_to_gl(src_alpha),
                blend_factor_to_gl(dst_alpha),
            ),
            StateOp::BlendEquation { color, alpha } => (functions.glBlendEquationSeparate)(
                blend_operation_to_gl(color),
                blend_operation_to_gl(alpha),
            ),
            StateOp::DepthMask(enabled) => {
                (functions.glDepthMask)(if enabled { api::GL_TRUE } else { api::GL_FALSE })
            }
            StateOp::DepthFunc(func) => (functions.glDepthFunc)(compare_to_gl(func)),
            StateOp::CullFace(face) => (functions.glCullFace)(face_to_gl(face)),
            StateOp::FrontFaceWinding(winding) => (functions.glFrontFace)(match winding {
                FrontFace::Ccw => api::GL_CCW,
                FrontFace::Cw => api::GL_CW,
            }),
            StateOp::Polygon(mode) => match functions.glPolygonMode {
                Some(polygon_mode) => polygon_mode(
                    api::GL_FRONT_AND_BACK,
                    match mode {
                        PolygonMode::Fill => api::GL_FILL,
                        PolygonMode::Line => api::GL_LINE,
                    },
                ),
                None => {
                    if mode != PolygonMode::Fill {
                        log::warn!("glPolygonMode unavailable, wireframe mode ignored");
                    }
                }
            },
            StateOp::LineWidth(bits) => (functions.glLineWidth)(f32::from_bits(bits)),
            StateOp::StencilFunc {
                face,
                compare,
                reference,
                read_mask,
            } => (functions.glStencilFuncSeparate)(
                stencil_face_to_gl(face),
                compare_to_gl(compare),
                reference as GLint,
                read_mask,
            ),
            StateOp::StencilOps {
                face,
                fail,
                depth_fail,
                pass,
            } => (functions.glStencilOpSeparate)(
                stencil_face_to_gl(face),
                stencil_operation_to_gl(fail),
                stencil_operation_to_gl(depth_fail),
                stencil_operation_to_gl(pass),
            ),
            StateOp::StencilWriteMask { face, mask } => {
                (functions.glStencilMaskSeparate)(stencil_face_to_gl(face), mask)
            }
        }
    }
}

/// A compiled GL shader object.
pub struct GlShader {
    shader: GLuint,
    stage: ShaderStage,
    context: Arc<Context>,
}

impl GlShader {
    pub(crate) fn new(shader: GLuint, stage: ShaderStage, context: Arc<Context>) -> Self {
        Self {
            shader,
            stage,
            context,
        }
    }

    /// The pipeline stage this shader belongs to.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub(crate) fn raw(&self) -> GLuint {
        self.shader
    }
}

impl std::fmt::Debug for GlShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlShader")
            .field("shader", &self.shader)
            .field("stage", &self.stage)
            .finish()
    }
}

impl Drop for GlShader {
    fn drop(&mut self) {
        self.context.delete_shader(self.shader);
    }
}

/// A translated pipeline: recorded state ops plus the linked program.
pub struct GlPipeline {
    ops: Vec<StateOp>,
    program: GLuint,
    primitive_mode: GLenum,
    context: Arc<Context>,
}

impl GlPipeline {
    pub(crate) fn new(
        descriptor: &PipelineDescriptor,
        program: GLuint,
        context: Arc<Context>,
    ) -> Self {
        Self {
            ops: translate_descriptor(descriptor),
            program,
            primitive_mode: topology_to_gl(descriptor.topology),
            context,
        }
    }

    /// The recorded state-op list, in application order.
    pub fn ops(&self) -> &[StateOp] {
        &self.ops
    }

    /// GL primitive mode for draw submission.
    pub fn primitive_mode(&self) -> GLenum {
        self.primitive_mode
    }

    /// The linked program object.
    pub fn program(&self) -> GLuint {
        self.program
    }

    /// Apply this pipeline: issue only the state deltas, then bind the
    /// program. Binding the same pipeline twice issues nothing the second
    /// time.
    pub fn bind(&self) -> Result<(), GraphicsError> {
        self.context.ensure_current()?;
        let functions = self.context.functions_ref()?;
        {
            let mut state = self.context.render_state().lock();
            for op in &self.ops {
                if state.note(op) {
                    unsafe { issue_op(functions, op) };
                }
            }
        }
        self.context.use_program(self.program)
    }
}

impl std::fmt::Debug for GlPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlPipeline")
            .field("program", &self.program)
            .field("op_count", &self.ops.len())
            .finish()
    }
}

impl Drop for GlPipeline {
    fn drop(&mut self) {
        self.context.delete_program(self.program);
    }
}

fn capability_to_gl(capability: Capability) -> GLenum {
    match capability {
        Capability::Blend => api::GL_BLEND,
        Capability::CullFace => api::GL_CULL_FACE,
        Capability::DepthTest => api::GL_DEPTH_TEST,
        Capability::ScissorTest => api::GL_SCISSOR_TEST,
        Capability::StencilTest => api::GL_STENCIL_TEST,
    }
}

fn compare_to_gl(func: CompareFunction) -> GLenum {
    match func {
        CompareFunction::Never => api::GL_NEVER,
        CompareFunction::Less => api::GL_LESS,
        CompareFunction::Equal => api::GL_EQUAL,
        CompareFunction::LessEqual => api::GL_LEQUAL,
        CompareFunction::Greater => api::GL_GREATER,
        CompareFunction::NotEqual => api::GL_NOTEQUAL,
        CompareFunction::GreaterEqual => api::GL_GEQUAL,
        CompareFunction::Always => api::GL_ALWAYS,
    }
}

fn blend_factor_to_gl(factor: BlendFactor) -> GLenum {
    match factor {
        BlendFactor::Zero => api::GL_ZERO,
        BlendFactor::One => api::GL_ONE,
        BlendFactor::Src => api::GL_SRC_COLOR,
        BlendFactor::OneMinusSrc => api::GL_ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => api::GL_SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => api::GL_ONE_MINUS_SRC_ALPHA,
        BlendFactor::Dst => api::GL_DST_COLOR,
        BlendFactor::OneMinusDst => api::GL_ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => api::GL_DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => api::GL_ONE_MINUS_DST_ALPHA,
    }
}

fn blend_operation_to_gl(operation: BlendOperation) -> GLenum {
    match operation {
        BlendOperation::Add => api::GL_FUNC_ADD,
        BlendOperation::Subtract => api::GL_FUNC_SUBTRACT,
        BlendOperation::ReverseSubtract => api::GL_FUNC_REVERSE_SUBTRACT,
        BlendOperation::Min => api::GL_MIN,
        BlendOperation::Max => api::GL_MAX,
    }
}

fn face_to_gl(face: Face) -> GLenum {
    match face {
        Face::Front => api::GL_FRONT,
        Face::Back => api::GL_BACK,
    }
}

fn stencil_face_to_gl(face: StencilFace) -> GLenum {
    match face {
        StencilFace::Front => api::GL_FRONT,
        StencilFace::Back => api::GL_BACK,
    }
}

fn stencil_operation_to_gl(operation: crate::pipeline::StencilOperation) -> GLenum {
    use crate::pipeline::StencilOperation;
    match operation {
        StencilOperation::Keep => api::GL_KEEP,
        StencilOperation::Zero => api::GL_ZERO,
        StencilOperation::Replace => api::GL_REPLACE,
        StencilOperation::IncrementClamp => api::GL_INCR,
        StencilOperation::DecrementClamp => api::GL_DECR,
        StencilOperation::Invert => api::GL_INVERT,
        StencilOperation::IncrementWrap => api::GL_INCR_WRAP,
        StencilOperation::DecrementWrap => api::GL_DECR_WRAP,
    }
}

fn topology_to_gl(topology: PrimitiveTopology) -> GLenum {
    match topology {
        PrimitiveTopology::PointList => api::GL_POINTS,
        PrimitiveTopology::LineList => api::GL_LINES,
        PrimitiveTopology::LineStrip => api::GL_LINE_STRIP,
        PrimitiveTopology::TriangleList => api::GL_TRIANGLES,
        PrimitiveTopology::TriangleStrip => api::GL_TRIANGLE_STRIP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BlendState, DepthStencilState, RasterState, StencilState};

    fn descriptor() -> PipelineDescriptor {
        PipelineDescriptor::new()
            .with_blend(BlendState::alpha_blending())
            .with_depth_stencil(DepthStencilState::read_only())
    }

    #[test]
    fn test_translate_blend_enabled() {
        let ops = translate_descriptor(&descriptor());
        assert!(ops.contains(&StateOp::Capability(Capability::Blend, true)));
        assert!(ops.iter().any(|op| matches!(
            op,
            StateOp::BlendFunc {
                src_color: BlendFactor::SrcAlpha,
                dst_color: BlendFactor::OneMinusSrcAlpha,
                ..
            }
        )));
    }

    #[test]
    fn test_translate_blend_disabled() {
        let ops = translate_descriptor(&PipelineDescriptor::new());
        assert!(ops.contains(&StateOp::Capability(Capability::Blend, false)));
        assert!(!ops.iter().any(|op| matches!(op, StateOp::BlendFunc { .. })));
    }

    #[test]
    fn test_translate_depth_read_only() {
        let ops = translate_descriptor(&descriptor());
        assert!(ops.contains(&StateOp::Capability(Capability::DepthTest, true)));
        assert!(ops.contains(&StateOp::DepthMask(false)));
    }

    #[test]
    fn test_translate_stencil_faces() {
        let stencil = StencilState::default();
        let desc = PipelineDescriptor::new().with_depth_stencil(DepthStencilState {
            stencil: Some(stencil),
            ..DepthStencilState::default()
        });
        let ops = translate_descriptor(&desc);
        assert!(ops.contains(&StateOp::Capability(Capability::StencilTest, true)));
        let func_ops = ops
            .iter()
            .filter(|op| matches!(op, StateOp::StencilFunc { .. }))
            .count();
        assert_eq!(func_ops, 2, "one per face");
    }

    #[test]
    fn test_dynamic_stencil_reference_not_recorded() {
        let desc = PipelineDescriptor::new()
            .with_depth_stencil(DepthStencilState {
                stencil: Some(StencilState::default()),
                ..DepthStencilState::default()
            })
            .with_dynamic_state(DynamicState::STENCIL_REFERENCE);
        let ops = translate_descriptor(&desc);
        assert!(!ops.iter().any(|op| matches!(op, StateOp::StencilFunc { .. })));
        // Ops without a reference component are still recorded.
        assert!(ops.iter().any(|op| matches!(op, StateOp::StencilOps { .. })));
    }

    #[test]
    fn test_translate_cull_disabled() {
        let desc = PipelineDescriptor::new().with_raster(RasterState {
            cull_mode: None,
            ..RasterState::default()
        });
        let ops = translate_descriptor(&desc);
        assert!(ops.contains(&StateOp::Capability(Capability::CullFace, false)));
        assert!(!ops.iter().any(|op| matches!(op, StateOp::CullFace(_))));
    }

    #[test]
    fn test_render_state_elides_repeats() {
        let mut state = RenderState::new();
        let op = StateOp::Capability(Capability::Blend, true);
        assert!(state.note(&op));
        assert!(!state.note(&op));
        assert!(state.note(&StateOp::Capability(Capability::Blend, false)));
    }

    #[test]
    fn test_render_state_full_pipeline_second_pass_is_empty() {
        let mut state = RenderState::new();
        let ops = translate_descriptor(&descriptor());

        let first: usize = ops.iter().filter(|op| state.note(op)).count();
        assert_eq!(first, ops.len());

        let second: usize = ops.iter().filter(|op| state.note(op)).count();
        assert_eq!(second, 0, "re-applying the same pipeline issues nothing");
    }

    #[test]
    fn test_render_state_reset_reissues() {
        let mut state = RenderState::new();
        let op = StateOp::DepthMask(true);
        assert!(state.note(&op));
        state.reset();
        assert!(state.note(&op));
    }

    #[test]
    fn test_two_pipelines_only_differences_issue() {
        let mut state = RenderState::new();
        let blended = translate_descriptor(&descriptor());
        for op in &blended {
            state.note(op);
        }

        // Same descriptor but with blending off: only the blend toggle (and
        // nothing else) should need issuing.
        let mut opaque_desc = descriptor();
        opaque_desc.blend = None;
        let opaque = translate_descriptor(&opaque_desc);
        let issued: Vec<&StateOp> = opaque.iter().filter(|op| state.note(op)).collect();
        assert_eq!(issued, [&StateOp::Capability(Capability::Blend, false)]);
    }
}
