//! Uber shaders and variant selection.
//!
//! An [`UberShader`] is a single base source per stage containing conditional
//! regions, together with the flag vocabulary each stage declares. Selecting a
//! variant renders a [`ShaderFeatureSet`] against the vocabulary, composes and
//! validates each stage, compiles the stages through the active backend, and
//! reflects the uniform/sampler interface from the validated IR.
//!
//! The selector holds no cache of its own; memoization is the material
//! pipeline cache's responsibility.

use nightshade_core::profiling::profile_scope;
use rustc_hash::FxHashSet;

use crate::backend::{GpuShaderStage, PipelineBackend};
use crate::error::GraphicsError;
use crate::pipeline::ShaderStageKey;
use crate::types::TextureTarget;

use super::features::ShaderFeatureSet;
use super::{ComposedStage, ShaderComposer, ShaderStage};

/// The set of flag tokens a shader stage recognizes.
///
/// Declared as a whitespace-separated token list alongside the stage source.
/// Tokens keep their declaration order; membership checks use a set.
#[derive(Debug, Clone, Default)]
pub struct FlagVocabulary {
    tokens: Vec<String>,
    lookup: FxHashSet<String>,
}

impl FlagVocabulary {
    /// Parse a whitespace-separated token list.
    pub fn parse(tokens: &str) -> Self {
        let tokens: Vec<String> = tokens.split_whitespace().map(str::to_string).collect();
        let lookup = tokens.iter().cloned().collect();
        Self { tokens, lookup }
    }

    /// Whether the vocabulary recognizes a flag name.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    /// Tokens in declaration order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Union of this vocabulary with another.
    pub fn merged_with(&self, other: &FlagVocabulary) -> FlagVocabulary {
        let mut merged = self.clone();
        for token in &other.tokens {
            if merged.lookup.insert(token.clone()) {
                merged.tokens.push(token.clone());
            }
        }
        merged
    }
}

/// Kind of resource a shader declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectedKind {
    /// Uniform buffer block.
    UniformBuffer,
    /// Sampled texture of the given target kind.
    Texture(TextureTarget),
}

/// One resource declared by a compiled variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    /// Declared name of the resource.
    pub name: String,
    /// What kind of resource it is.
    pub kind: ReflectedKind,
    /// Binding index declared in the source, if any.
    pub declared_binding: Option<u32>,
}

/// The uniform/sampler interface reflected from a compiled variant.
#[derive(Debug, Clone, Default)]
pub struct ShaderInterface {
    /// Declared resources, deduplicated by name across stages.
    pub bindings: Vec<ReflectedBinding>,
}

impl ShaderInterface {
    /// Look up a binding by name.
    pub fn binding(&self, name: &str) -> Option<&ReflectedBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    fn merge(&mut self, other: ShaderInterface) {
        for binding in other.bindings {
            match self.binding(&binding.name).map(|existing| existing.kind) {
                None => self.bindings.push(binding),
                Some(existing_kind) if existing_kind != binding.kind => {
                    log::warn!(
                        "shader interface: `{}` declared as {:?} and {:?} across stages",
                        binding.name,
                        existing_kind,
                        binding.kind
                    );
                }
                Some(_) => {}
            }
        }
    }
}

/// One backend-compiled stage of a variant.
#[derive(Debug)]
pub struct CompiledStage {
    /// The pipeline stage.
    pub stage: ShaderStage,
    /// Content hash of the composed source (pipeline identity component).
    pub content_hash: u64,
    /// Backend shader object.
    pub handle: GpuShaderStage,
}

/// A compiled, reflected shader variant ready for pipeline creation.
#[derive(Debug)]
pub struct CompiledVariant {
    /// Compiled stages in pipeline order.
    pub stages: Vec<CompiledStage>,
    /// Reflected resource interface.
    pub interface: ShaderInterface,
}

impl CompiledVariant {
    /// Stage keys for deriving a full pipeline descriptor.
    pub fn stage_keys(&self) -> Vec<ShaderStageKey> {
        self.stages
            .iter()
            .map(|s| ShaderStageKey {
                stage: s.stage,
                content_hash: s.content_hash,
            })
            .collect()
    }
}

/// A base shader source per stage plus the declared flag vocabularies.
#[derive(Debug, Clone, Default)]
pub struct UberShader {
    name: String,
    stages: Vec<UberStage>,
}

#[derive(Debug, Clone)]
struct UberStage {
    stage: ShaderStage,
    source: String,
    vocabulary: FlagVocabulary,
}

impl UberShader {
    /// Create an empty uber shader with a debug name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Register a stage source with its recognized flag vocabulary
    /// (a whitespace-separated token list). Replaces any previous source for
    /// the same stage.
    pub fn set_stage(&mut self, stage: ShaderStage, source: impl Into<String>, vocabulary: &str) {
        let entry = UberStage {
            stage,
            source: source.into(),
            vocabulary: FlagVocabulary::parse(vocabulary),
        };
        if let Some(existing) = self.stages.iter_mut().find(|s| s.stage == stage) {
            *existing = entry;
        } else {
            self.stages.push(entry);
        }
    }

    /// Replace a stage source, keeping its declared vocabulary.
    ///
    /// Used by the on-disk override hook; a source that is never set is an
    /// initialization error surfaced at selection time.
    pub fn override_stage_source(&mut self, stage: ShaderStage, source: impl Into<String>) {
        if let Some(existing) = self.stages.iter_mut().find(|s| s.stage == stage) {
            existing.source = source.into();
        }
    }

    /// Debug name of this uber shader.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a stage is registered.
    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }

    /// Union of all stage vocabularies, used for cache keying.
    pub fn vocabulary(&self) -> FlagVocabulary {
        self.stages
            .iter()
            .fold(FlagVocabulary::default(), |acc, s| {
                acc.merged_with(&s.vocabulary)
            })
    }

    /// Select and compile the variant described by `features`.
    ///
    /// Flags outside a stage's vocabulary are ignored for that stage; unset
    /// flags default to absent. A composition or backend compile failure is a
    /// hard error for this variant request — there is no retry here.
    pub fn select(
        &self,
        composer: &ShaderComposer,
        features: &ShaderFeatureSet,
        backend: &dyn PipelineBackend,
    ) -> Result<CompiledVariant, GraphicsError> {
        profile_scope!("shader_variant_select");

        if self.stages.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "uber shader `{}` has no stages",
                self.name
            )));
        }

        let mut stages = Vec::with_capacity(self.stages.len());
        let mut interface = ShaderInterface::default();

        for uber_stage in &self.stages {
            let defines = features.filtered(&uber_stage.vocabulary).to_defines();
            let composed = composer.compose(&uber_stage.source, uber_stage.stage, &defines)?;

            interface.merge(reflect_interface(&composed));

            let handle = backend.compile_stage(&composed, "main")?;
            log::trace!(
                "uber `{}`: compiled {:?} stage variant {:016x}",
                self.name,
                uber_stage.stage,
                composed.content_hash
            );

            stages.push(CompiledStage {
                stage: uber_stage.stage,
                content_hash: composed.content_hash,
                handle,
            });
        }

        Ok(CompiledVariant { stages, interface })
    }
}

/// Reflect the resource interface of a composed stage from its naga IR.
///
/// Sampler globals are skipped: the GLSL front end splits combined samplers
/// into an image plus a sampler, and the image carries the identity.
fn reflect_interface(composed: &ComposedStage) -> ShaderInterface {
    let module = &composed.module;
    let mut interface = ShaderInterface::default();

    for (handle, var) in module.global_variables.iter() {
        let kind = match &module.types[var.ty].inner {
            naga::TypeInner::Image { dim, arrayed, .. } => {
                let target = match (dim, arrayed) {
                    (naga::ImageDimension::D2, false) => TextureTarget::Texture2D,
                    (naga::ImageDimension::D2, true) => TextureTarget::Texture2DArray,
                    (naga::ImageDimension::D3, _) => TextureTarget::Texture3D,
                    (naga::ImageDimension::Cube, _) => TextureTarget::Cubemap,
                    (naga::ImageDimension::D1, _) => TextureTarget::Texture2D,
                };
                ReflectedKind::Texture(target)
            }
            naga::TypeInner::Sampler { .. } => continue,
            _ if var.space == naga::AddressSpace::Uniform => ReflectedKind::UniformBuffer,
            _ => continue,
        };

        let name = var
            .name
            .clone()
            .unwrap_or_else(|| format!("global_{}", handle.index()));

        interface.bindings.push(ReflectedBinding {
            name,
            kind,
            declared_binding: var.binding.as_ref().map(|b| b.binding),
        });
    }

    interface
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    const TEST_VERTEX: &str = r#"#version 450

layout(std140, binding = 0) uniform Transformations {
    mat4 world_view_proj;
} transformations;

layout(location = 0) in vec3 in_position;

void main() {
    gl_Position = transformations.world_view_proj * vec4(in_position, 1.0);
}
"#;

    const TEST_FRAGMENT: &str = r#"#version 450

layout(location = 0) out vec4 out_color;

void main() {
#ifdef ALPHA_TEST
    out_color = vec4(1.0, 0.0, 0.0, 0.5);
    if (out_color.a < 0.9)
        discard;
#else
    out_color = vec4(1.0);
#endif
}
"#;

    fn test_uber() -> UberShader {
        let mut uber = UberShader::new("test");
        uber.set_stage(ShaderStage::Vertex, TEST_VERTEX, "TRANSFORM");
        uber.set_stage(ShaderStage::Fragment, TEST_FRAGMENT, "ALPHA_TEST");
        uber
    }

    #[test]
    fn test_vocabulary_parse() {
        let vocabulary = FlagVocabulary::parse("ALPHA_TEST  SHADOW_MAPPING\nTRANSFORM");
        assert!(vocabulary.contains("ALPHA_TEST"));
        assert!(vocabulary.contains("TRANSFORM"));
        assert!(!vocabulary.contains("UNKNOWN"));
        assert_eq!(vocabulary.tokens().len(), 3);
    }

    #[test]
    fn test_vocabulary_union() {
        let uber = test_uber();
        let vocabulary = uber.vocabulary();
        assert!(vocabulary.contains("TRANSFORM"));
        assert!(vocabulary.contains("ALPHA_TEST"));
    }

    #[test]
    fn test_select_compiles_all_stages() {
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();
        let variant = test_uber()
            .select(&composer, &ShaderFeatureSet::new(), &backend)
            .unwrap();
        assert_eq!(variant.stages.len(), 2);
        assert_eq!(backend.compiled_stage_count(), 2);
    }

    #[test]
    fn test_unknown_flags_match_recognized_subset() {
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();
        let uber = test_uber();

        let recognized = ShaderFeatureSet::from(["ALPHA_TEST"]);
        let with_unknown = ShaderFeatureSet::from(["ALPHA_TEST", "NOT_A_REAL_FLAG"]);

        let a = uber.select(&composer, &recognized, &backend).unwrap();
        let b = uber.select(&composer, &with_unknown, &backend).unwrap();
        assert_eq!(a.stage_keys(), b.stage_keys());
    }

    #[test]
    fn test_flags_change_stage_content() {
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();
        let uber = test_uber();

        let plain = uber
            .select(&composer, &ShaderFeatureSet::new(), &backend)
            .unwrap();
        let alpha = uber
            .select(&composer, &ShaderFeatureSet::from(["ALPHA_TEST"]), &backend)
            .unwrap();
        // Vertex stage ignores ALPHA_TEST, fragment stage does not.
        assert_eq!(plain.stage_keys()[0], alpha.stage_keys()[0]);
        assert_ne!(plain.stage_keys()[1], alpha.stage_keys()[1]);
    }

    #[test]
    fn test_interface_reflection() {
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();
        let variant = test_uber()
            .select(&composer, &ShaderFeatureSet::new(), &backend)
            .unwrap();

        let uniforms: Vec<_> = variant
            .interface
            .bindings
            .iter()
            .filter(|b| b.kind == ReflectedKind::UniformBuffer)
            .collect();
        assert!(!uniforms.is_empty(), "uniform block not reflected");
        assert_eq!(uniforms[0].declared_binding, Some(0));
    }

    #[test]
    fn test_empty_uber_is_invalid() {
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();
        let uber = UberShader::new("empty");
        assert!(
            uber.select(&composer, &ShaderFeatureSet::new(), &backend)
                .is_err()
        );
    }
}
