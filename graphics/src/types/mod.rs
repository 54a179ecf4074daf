//! Backend-agnostic value types shared across the graphics crate.

mod common;

pub use common::{CompareFunction, TextureFormat, TextureTarget};
