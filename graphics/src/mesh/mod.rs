//! Mesh-facing descriptions consumed by pipeline creation.
//!
//! Only the vertex *layout* lives here; vertex and index data management is
//! the responsibility of the asset collaborator.

mod layout;

pub use layout::{
    VertexAttribute, VertexAttributeFormat, VertexAttributeSemantic, VertexBufferLayout,
    VertexLayout, VertexStepMode,
};
