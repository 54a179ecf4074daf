//! Shader composition and variant selection.
//!
//! This module owns the path from uber-shader GLSL source to a compiled,
//! reflected shader variant:
//!
//! - [`ShaderComposer`] — resolves `#include` directives and renders a set of
//!   compile-time defines, then parses and validates the result through naga.
//!   The textual conditional handling itself is naga's; the composer only
//!   prepares its inputs.
//! - [`ShaderFeatureSet`](features::ShaderFeatureSet) — the ordered flag set a
//!   material supplies to select a variant.
//! - [`UberShader`](uber::UberShader) — a base source per stage plus the flag
//!   vocabulary each stage recognizes; `select` produces a compiled variant.
//! - [`ShaderLibrary`](library::ShaderLibrary) — the built-in uber shaders.

pub mod features;
pub mod library;
pub mod uber;

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use nightshade_core::profiling::profile_scope;

use crate::error::GraphicsError;

/// Shader stage in the graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
}

impl ShaderStage {
    /// The define injected for this stage (`VERTEX`, `FRAGMENT`, `COMPUTE`).
    pub fn stage_define(&self) -> &'static str {
        match self {
            Self::Vertex => "VERTEX",
            Self::Fragment => "FRAGMENT",
            Self::Compute => "COMPUTE",
        }
    }

    fn naga_stage(&self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
            Self::Compute => naga::ShaderStage::Compute,
        }
    }
}

/// One composed and validated shader stage.
///
/// Carries both representations the backends need: the define-injected GLSL
/// text (consumed by the immediate backend's source compiler) and the
/// validated naga IR (consumed by the SPIR-V path and by interface
/// reflection).
pub struct ComposedStage {
    /// The pipeline stage.
    pub stage: ShaderStage,
    /// Final GLSL with includes resolved and defines injected.
    pub glsl: String,
    /// Parsed and validated module.
    pub module: naga::Module,
    /// Validation info, required by the SPIR-V writer.
    pub info: naga::valid::ModuleInfo,
    /// Stable hash of (stage, final source). Two flag sets that render to the
    /// same preprocessed source share this hash and therefore share pipelines.
    pub content_hash: u64,
}

impl std::fmt::Debug for ComposedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedStage")
            .field("stage", &self.stage)
            .field("content_hash", &self.content_hash)
            .field("source_len", &self.glsl.len())
            .finish()
    }
}

/// Shader composer for include resolution and define rendering.
///
/// The composer maintains a set of includable modules and composes final GLSL
/// by resolving `#include "path"` directives, then parses the result through
/// naga with the supplied defines.
pub struct ShaderComposer {
    /// Registered include sources: path -> source text.
    includes: HashMap<String, String>,
}

impl Default for ShaderComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderComposer {
    /// Create a new empty shader composer.
    pub fn new() -> Self {
        Self {
            includes: HashMap::new(),
        }
    }

    /// Register a single include source.
    ///
    /// The path is what appears in `#include "path"` directives.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    /// Compose a GLSL stage: resolve includes, apply defines, parse, validate.
    ///
    /// `defines` entries with an empty value become bare `#define NAME`;
    /// non-empty values become `#define NAME VALUE`. The stage define is added
    /// automatically. Returns [`GraphicsError::VariantCompilationFailed`] with
    /// the parser or validator diagnostic preserved verbatim on failure.
    pub fn compose(
        &self,
        source: &str,
        stage: ShaderStage,
        defines: &[(String, String)],
    ) -> Result<ComposedStage, GraphicsError> {
        profile_scope!("shader_compose");

        let mut included = HashSet::new();
        let resolved = self.resolve_includes(source, &mut included)?;
        let glsl = inject_defines(&resolved, stage, defines);

        let mut naga_defines = naga::FastHashMap::default();
        naga_defines.insert(stage.stage_define().to_string(), String::new());
        for (name, value) in defines {
            naga_defines.insert(name.clone(), value.clone());
        }

        let options = naga::front::glsl::Options {
            stage: stage.naga_stage(),
            defines: naga_defines,
        };

        let mut frontend = naga::front::glsl::Frontend::default();
        let module = frontend.parse(&options, &resolved).map_err(|errors| {
            GraphicsError::VariantCompilationFailed(format!("GLSL parse error:\n{errors}"))
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator.validate(&module).map_err(|e| {
            GraphicsError::VariantCompilationFailed(format!("validation error: {e}"))
        })?;

        let mut hasher = rustc_hash::FxHasher::default();
        stage.hash(&mut hasher);
        glsl.hash(&mut hasher);
        let content_hash = hasher.finish();

        Ok(ComposedStage {
            stage,
            glsl,
            module,
            info,
            content_hash,
        })
    }

    /// Resolve `#include "path"` directives recursively.
    fn resolve_includes(
        &self,
        source: &str,
        included: &mut HashSet<String>,
    ) -> Result<String, GraphicsError> {
        let mut result = String::with_capacity(source.len());

        for line in source.lines() {
            if let Some(path) = parse_include_directive(line.trim()) {
                // Skip if already included (prevent double-inclusion)
                if included.contains(path) {
                    continue;
                }
                included.insert(path.to_string());

                let include_source = self.includes.get(path).ok_or_else(|| {
                    GraphicsError::VariantCompilationFailed(format!(
                        "include not found: \"{path}\""
                    ))
                })?;

                let resolved = self.resolve_includes(include_source, included)?;
                result.push_str(&resolved);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Ok(result)
    }
}

/// Parse a `#include "path"` directive, returning the path if found.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    if let Some(inner) = rest.strip_prefix('"') {
        inner.strip_suffix('"')
    } else if let Some(inner) = rest.strip_prefix('<') {
        inner.strip_suffix('>')
    } else {
        None
    }
}

/// Inject `#define` lines after the `#version` directive.
///
/// The immediate backend hands this text to the driver's own compiler, which
/// must observe the same conditional selection naga did.
fn inject_defines(source: &str, stage: ShaderStage, defines: &[(String, String)]) -> String {
    let mut prelude = String::new();
    prelude.push_str(&format!("#define {}\n", stage.stage_define()));
    for (name, value) in defines {
        if value.is_empty() {
            prelude.push_str(&format!("#define {name}\n"));
        } else {
            prelude.push_str(&format!("#define {name} {value}\n"));
        }
    }

    match source.find("#version") {
        Some(pos) => {
            let line_end = source[pos..]
                .find('\n')
                .map(|i| pos + i + 1)
                .unwrap_or(source.len());
            let mut result = String::with_capacity(source.len() + prelude.len());
            result.push_str(&source[..line_end]);
            result.push_str(&prelude);
            result.push_str(&source[line_end..]);
            result
        }
        None => format!("{prelude}{source}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_FRAGMENT: &str = r#"#version 450

layout(location = 0) out vec4 out_color;

void main() {
#ifdef USE_RED
    out_color = vec4(1.0, 0.0, 0.0, 1.0);
#else
    out_color = vec4(0.0, 1.0, 0.0, 1.0);
#endif
}
"#;

    #[test]
    fn test_compose_simple() {
        let composer = ShaderComposer::new();
        let result = composer.compose(SIMPLE_FRAGMENT, ShaderStage::Fragment, &[]);
        assert!(result.is_ok(), "failed: {:?}", result.err());
    }

    #[test]
    fn test_compose_with_define() {
        let composer = ShaderComposer::new();
        let defines = vec![("USE_RED".to_string(), String::new())];
        let with = composer
            .compose(SIMPLE_FRAGMENT, ShaderStage::Fragment, &defines)
            .unwrap();
        let without = composer
            .compose(SIMPLE_FRAGMENT, ShaderStage::Fragment, &[])
            .unwrap();
        assert_ne!(with.content_hash, without.content_hash);
    }

    #[test]
    fn test_content_hash_deterministic() {
        let composer = ShaderComposer::new();
        let a = composer
            .compose(SIMPLE_FRAGMENT, ShaderStage::Fragment, &[])
            .unwrap();
        let b = composer
            .compose(SIMPLE_FRAGMENT, ShaderStage::Fragment, &[])
            .unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_include_resolution() {
        let mut composer = ShaderComposer::new();
        composer.register_include(
            "nightshade/math.glsl",
            "float saturate_f(float x) { return clamp(x, 0.0, 1.0); }",
        );

        let source = r#"#version 450
#include "nightshade/math.glsl"

layout(location = 0) out vec4 out_color;

void main() {
    out_color = vec4(saturate_f(1.5));
}
"#;
        let result = composer.compose(source, ShaderStage::Fragment, &[]);
        assert!(result.is_ok(), "failed: {:?}", result.err());
    }

    #[test]
    fn test_missing_include() {
        let composer = ShaderComposer::new();
        let source = "#version 450\n#include \"nonexistent.glsl\"\nvoid main() {}\n";
        let result = composer.compose(source, ShaderStage::Fragment, &[]);
        assert!(matches!(
            result,
            Err(GraphicsError::VariantCompilationFailed(_))
        ));
    }

    #[test]
    fn test_parse_error_preserves_diagnostic() {
        let composer = ShaderComposer::new();
        let source = "#version 450\nvoid main() { this is not glsl }\n";
        let err = composer
            .compose(source, ShaderStage::Fragment, &[])
            .unwrap_err();
        assert!(err.to_string().contains("GLSL parse error"));
    }

    #[test]
    fn test_inject_defines_after_version() {
        let injected = inject_defines(
            "#version 450\nvoid main() {}\n",
            ShaderStage::Vertex,
            &[("FOO".to_string(), "2".to_string())],
        );
        let version_pos = injected.find("#version").unwrap();
        let define_pos = injected.find("#define FOO 2").unwrap();
        assert!(version_pos < define_pos);
        assert!(injected.contains("#define VERTEX\n"));
    }

    #[test]
    fn test_parse_include_directive() {
        assert_eq!(
            parse_include_directive(r#"#include "foo/bar.glsl""#),
            Some("foo/bar.glsl")
        );
        assert_eq!(
            parse_include_directive("#include <foo/bar.glsl>"),
            Some("foo/bar.glsl")
        );
        assert_eq!(parse_include_directive("#define FOO"), None);
    }
}
