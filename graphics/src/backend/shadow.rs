//! Shadow copies of bound-resource state.
//!
//! State changes are assumed to dominate rendering cost, so a context keeps a
//! host-side mirror of what the backend already has bound and elides redundant
//! binding calls. The decision ("must this bind be issued?") is kept separate
//! from the issuing so both the real context and the dummy test context share
//! the exact same elision logic.

use rustc_hash::FxHashMap;

use crate::types::TextureTarget;

/// Host-side mirror of backend binding state.
#[derive(Debug, Default)]
pub struct ShadowState {
    /// Bound texture handle per (slot, target).
    bound_textures: FxHashMap<(u32, TextureTarget), u64>,
}

impl ShadowState {
    /// Create an empty shadow state (nothing known bound).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a texture bind, returning whether the backend call must be
    /// issued. Returns `false` when `handle` is already bound at
    /// (`slot`, `target`).
    pub fn note_texture_bind(&mut self, slot: u32, target: TextureTarget, handle: u64) -> bool {
        match self.bound_textures.insert((slot, target), handle) {
            Some(previous) if previous == handle => false,
            _ => true,
        }
    }

    /// The handle currently bound at (`slot`, `target`), if known.
    pub fn bound_texture(&self, slot: u32, target: TextureTarget) -> Option<u64> {
        self.bound_textures.get(&(slot, target)).copied()
    }

    /// Forget everything, e.g. after an external party touched the backend
    /// behind the context's back.
    pub fn reset(&mut self) {
        self.bound_textures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_bind_is_issued() {
        let mut shadow = ShadowState::new();
        assert!(shadow.note_texture_bind(0, TextureTarget::Texture2D, 7));
    }

    #[test]
    fn test_redundant_bind_is_elided() {
        let mut shadow = ShadowState::new();
        assert!(shadow.note_texture_bind(0, TextureTarget::Texture2D, 7));
        assert!(!shadow.note_texture_bind(0, TextureTarget::Texture2D, 7));
        assert_eq!(shadow.bound_texture(0, TextureTarget::Texture2D), Some(7));
    }

    #[test]
    fn test_different_slot_or_target_is_issued() {
        let mut shadow = ShadowState::new();
        shadow.note_texture_bind(0, TextureTarget::Texture2D, 7);
        assert!(shadow.note_texture_bind(1, TextureTarget::Texture2D, 7));
        assert!(shadow.note_texture_bind(0, TextureTarget::Cubemap, 7));
    }

    #[test]
    fn test_rebinding_different_handle_is_issued() {
        let mut shadow = ShadowState::new();
        shadow.note_texture_bind(0, TextureTarget::Texture2D, 7);
        assert!(shadow.note_texture_bind(0, TextureTarget::Texture2D, 8));
        assert_eq!(shadow.bound_texture(0, TextureTarget::Texture2D), Some(8));
    }

    #[test]
    fn test_reset_forgets_bindings() {
        let mut shadow = ShadowState::new();
        shadow.note_texture_bind(0, TextureTarget::Texture2D, 7);
        shadow.reset();
        assert!(shadow.note_texture_bind(0, TextureTarget::Texture2D, 7));
    }
}
