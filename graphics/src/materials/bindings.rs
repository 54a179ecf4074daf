//! Resource-binding layouts.
//!
//! A [`BindingLayout`] maps a compiled variant's logical uniform and sampler
//! slots to the fixed binding points the engine expects. Well-known engine
//! resources (overlay, reflection map, shadow maps) use the fixed slot table
//! in [`EngineTextureSlot`], so every shader variant agrees on slot numbering
//! without re-negotiation.

use crate::shader::uber::{ReflectedKind, ShaderInterface};
use crate::types::TextureTarget;

bitflags::bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

/// Type of resource expected at a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform buffer block.
    UniformBuffer,
    /// Sampled 2D (or array/3D) texture with its sampler.
    Texture,
    /// Sampled cubemap texture with its sampler.
    TextureCube,
}

/// One slot in a binding layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLayoutEntry {
    /// Binding slot index.
    pub binding: u32,
    /// Type of resource expected at this slot.
    pub binding_type: BindingType,
    /// Shader stages that can access this binding.
    pub visibility: ShaderStageFlags,
    /// Declared name in the shader, when derived by reflection.
    pub name: Option<String>,
}

impl BindingLayoutEntry {
    /// Create an entry visible to vertex and fragment stages.
    pub fn new(binding: u32, binding_type: BindingType) -> Self {
        Self {
            binding,
            binding_type,
            visibility: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            name: None,
        }
    }

    /// Set the shader stage visibility.
    pub fn with_visibility(mut self, visibility: ShaderStageFlags) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set the declared name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The binding slots a pipeline's resources occupy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingLayout {
    /// The slots, in binding order.
    pub entries: Vec<BindingLayoutEntry>,
}

impl BindingLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    pub fn with_entry(mut self, entry: BindingLayoutEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Look up an entry by declared name.
    pub fn entry(&self, name: &str) -> Option<&BindingLayoutEntry> {
        self.entries
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
    }

    /// Derive the layout from a compiled variant's reflected interface.
    ///
    /// Slot assignment, in precedence order: the fixed engine slot table for
    /// well-known names, then the binding declared in the source, then the
    /// next free material slot.
    pub fn from_interface(interface: &ShaderInterface) -> Self {
        let mut layout = Self::new();
        let mut next_uniform = 0u32;
        let mut next_texture = 0u32;

        for reflected in &interface.bindings {
            let entry = match reflected.kind {
                ReflectedKind::UniformBuffer => {
                    let binding = reflected.declared_binding.unwrap_or_else(|| {
                        let b = next_uniform;
                        next_uniform += 1;
                        b
                    });
                    next_uniform = next_uniform.max(binding + 1);
                    BindingLayoutEntry::new(binding, BindingType::UniformBuffer)
                        .with_name(&reflected.name)
                }
                ReflectedKind::Texture(target) => {
                    let unit = EngineTextureSlot::for_uniform(&reflected.name)
                        .map(|slot| slot.unit())
                        .or(reflected.declared_binding)
                        .unwrap_or_else(|| {
                            let u = next_texture;
                            next_texture += 1;
                            u
                        });
                    if unit < EngineTextureSlot::MATERIAL_UNIT_COUNT {
                        next_texture = next_texture.max(unit + 1);
                    }
                    let binding_type = if target == TextureTarget::Cubemap {
                        BindingType::TextureCube
                    } else {
                        BindingType::Texture
                    };
                    BindingLayoutEntry::new(unit, binding_type).with_name(&reflected.name)
                }
            };
            layout.entries.push(entry);
        }

        layout
    }
}

/// Fixed texture units for well-known engine resources.
///
/// Material textures occupy units `0..MATERIAL_UNIT_COUNT`; the engine slots
/// sit above them. The numbering is a baked convention shared by every
/// generated pipeline, so variants can be swapped under a material without
/// re-binding negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineTextureSlot {
    /// Full-screen overlay texture.
    Overlay,
    /// Environment reflection cubemap.
    ReflectionCube,
    /// Directional/spot shadow map for lights 0..=2.
    DirectionalShadow(u8),
    /// Point-light shadow cubemap for lights 0..=2.
    PointShadow(u8),
}

impl EngineTextureSlot {
    /// Units `0..MATERIAL_UNIT_COUNT` belong to material textures.
    pub const MATERIAL_UNIT_COUNT: u32 = 8;

    /// The fixed texture unit of this slot.
    pub fn unit(&self) -> u32 {
        match self {
            Self::Overlay => 8,
            Self::ReflectionCube => 9,
            Self::DirectionalShadow(index) => 10 + u32::from(*index),
            Self::PointShadow(index) => 13 + u32::from(*index),
        }
    }

    /// Map a well-known shader uniform name to its engine slot.
    pub fn for_uniform(name: &str) -> Option<Self> {
        match name {
            "TextureOverlay" => Some(Self::Overlay),
            "ReflectionMap" => Some(Self::ReflectionCube),
            "DirectionalShadowMap0" => Some(Self::DirectionalShadow(0)),
            "DirectionalShadowMap1" => Some(Self::DirectionalShadow(1)),
            "DirectionalShadowMap2" => Some(Self::DirectionalShadow(2)),
            "PointShadowMap0" => Some(Self::PointShadow(0)),
            "PointShadowMap1" => Some(Self::PointShadow(1)),
            "PointShadowMap2" => Some(Self::PointShadow(2)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::uber::ReflectedBinding;

    #[test]
    fn test_engine_slots_disjoint_and_stable() {
        let slots = [
            EngineTextureSlot::Overlay,
            EngineTextureSlot::ReflectionCube,
            EngineTextureSlot::DirectionalShadow(0),
            EngineTextureSlot::DirectionalShadow(1),
            EngineTextureSlot::DirectionalShadow(2),
            EngineTextureSlot::PointShadow(0),
            EngineTextureSlot::PointShadow(1),
            EngineTextureSlot::PointShadow(2),
        ];
        let mut units: Vec<u32> = slots.iter().map(EngineTextureSlot::unit).collect();
        units.sort_unstable();
        units.dedup();
        assert_eq!(units.len(), slots.len());
        // All above the material range.
        assert!(units
            .iter()
            .all(|&u| u >= EngineTextureSlot::MATERIAL_UNIT_COUNT));
    }

    #[test]
    fn test_well_known_uniform_names() {
        assert_eq!(
            EngineTextureSlot::for_uniform("ReflectionMap"),
            Some(EngineTextureSlot::ReflectionCube)
        );
        assert_eq!(
            EngineTextureSlot::for_uniform("DirectionalShadowMap2").map(|s| s.unit()),
            Some(12)
        );
        assert_eq!(EngineTextureSlot::for_uniform("DiffuseMap"), None);
    }

    #[test]
    fn test_from_interface_uses_engine_slots() {
        let interface = ShaderInterface {
            bindings: vec![
                ReflectedBinding {
                    name: "material_settings".into(),
                    kind: ReflectedKind::UniformBuffer,
                    declared_binding: Some(1),
                },
                ReflectedBinding {
                    name: "DiffuseMap".into(),
                    kind: ReflectedKind::Texture(TextureTarget::Texture2D),
                    declared_binding: Some(2),
                },
                ReflectedBinding {
                    name: "ReflectionMap".into(),
                    kind: ReflectedKind::Texture(TextureTarget::Cubemap),
                    declared_binding: None,
                },
            ],
        };

        let layout = BindingLayout::from_interface(&interface);
        assert_eq!(layout.entries.len(), 3);
        assert_eq!(layout.entry("material_settings").unwrap().binding, 1);
        assert_eq!(layout.entry("DiffuseMap").unwrap().binding, 2);

        let reflection = layout.entry("ReflectionMap").unwrap();
        assert_eq!(reflection.binding, EngineTextureSlot::ReflectionCube.unit());
        assert_eq!(reflection.binding_type, BindingType::TextureCube);
    }

    #[test]
    fn test_from_interface_sequential_fallback() {
        let interface = ShaderInterface {
            bindings: vec![
                ReflectedBinding {
                    name: "FirstMap".into(),
                    kind: ReflectedKind::Texture(TextureTarget::Texture2D),
                    declared_binding: None,
                },
                ReflectedBinding {
                    name: "SecondMap".into(),
                    kind: ReflectedKind::Texture(TextureTarget::Texture2D),
                    declared_binding: None,
                },
            ],
        };
        let layout = BindingLayout::from_interface(&interface);
        assert_eq!(layout.entry("FirstMap").unwrap().binding, 0);
        assert_eq!(layout.entry("SecondMap").unwrap().binding, 1);
    }
}
