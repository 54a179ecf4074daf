//! Backend-agnostic pipeline description and caching.
//!
//! The pipeline layer has three pieces:
//!
//! - [`PipelineDescriptor`] — an immutable, hashable value fully determining
//!   a pipeline's draw-time behavior. Used as the cache key.
//! - state types ([`BlendState`], [`DepthStencilState`], [`RasterState`],
//!   [`DynamicState`]) — the descriptor's hashable components.
//! - [`PipelineCache`] — descriptor-keyed memoization of built backend
//!   pipelines with a per-key single-flight guarantee.
//!
//! Backend-specific translation of a descriptor lives with the backends
//! themselves (`backend::vulkan` builds one immutable pipeline object per
//! descriptor; `backend::gl` records state-setting operations applied lazily
//! against the context's shadow state).

mod cache;
mod descriptor;
mod state;

pub(crate) use cache::SingleFlight;

pub use cache::{PipelineCache, PipelineId};
pub use descriptor::{PipelineDescriptor, ShaderStageKey};
pub use state::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, DepthStencilState, DynamicState,
    Face, FrontFace, PolygonMode, RasterState, StencilFaceState, StencilOperation, StencilState,
};
