//! Built-in uber-shader library.
//!
//! The library registers the engine's base uber shaders ("basic" and "phong")
//! with their declared flag vocabularies. An on-disk override directory may
//! replace a built-in source before first use; the check happens once, at
//! registration, and is silently skipped when no override file exists.

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::uber::UberShader;
use super::ShaderStage;

/// Unlit base shader, vertex stage.
const BASIC_VERTEX_SOURCE: &str = r#"#version 450

layout(std140, binding = 0) uniform Transformations {
    mat4 world_view_proj;
} transformations;

layout(location = 0) in vec3 in_position;

#ifdef TEXTURE_MAPPING
layout(location = 3) in vec2 in_texcoord;
layout(location = 0) out vec2 frag_texcoord;
#endif

#ifdef FLAG_VERTEXCOLOR
layout(location = 5) in vec4 in_color;
layout(location = 1) out vec4 frag_color;
#endif

#ifdef FLAG_INSTANCING
layout(location = 6) in vec3 instance_offset;
#endif

void main() {
    vec3 position = in_position;
#ifdef FLAG_INSTANCING
    position += instance_offset;
#endif
#ifdef TRANSFORM
    gl_Position = transformations.world_view_proj * vec4(position, 1.0);
#else
    gl_Position = vec4(position, 1.0);
#endif
#ifdef TEXTURE_MAPPING
    frag_texcoord = in_texcoord;
#endif
#ifdef FLAG_VERTEXCOLOR
    frag_color = in_color;
#endif
}
"#;

/// Unlit base shader, fragment stage.
const BASIC_FRAGMENT_SOURCE: &str = r#"#version 450

layout(std140, binding = 1) uniform MaterialSettings {
    vec4 diffuse_color;
    float alpha_threshold;
} material_settings;

#ifdef TEXTURE_MAPPING
layout(location = 0) in vec2 frag_texcoord;
#ifdef DIFFUSE_MAPPING
layout(binding = 2) uniform sampler2D DiffuseMap;
#endif
#ifdef FLAG_TEXTUREOVERLAY
layout(binding = 8) uniform sampler2D TextureOverlay;
#endif
#endif

layout(location = 0) out vec4 out_color;

void main() {
    vec4 color = material_settings.diffuse_color;
#ifdef TEXTURE_MAPPING
#ifdef DIFFUSE_MAPPING
    color *= texture(DiffuseMap, frag_texcoord);
#endif
#ifdef FLAG_TEXTUREOVERLAY
    color *= texture(TextureOverlay, frag_texcoord);
#endif
#endif
#ifdef ALPHA_TEST
    if (color.a < material_settings.alpha_threshold)
        discard;
#endif
    out_color = color;
}
"#;

/// Directionally-lit base shader, vertex stage.
const PHONG_VERTEX_SOURCE: &str = r#"#version 450

layout(std140, binding = 0) uniform Transformations {
    mat4 world_view_proj;
    mat4 world;
    mat4 light_view_proj;
} transformations;

layout(location = 0) in vec3 in_position;
layout(location = 1) in vec3 in_normal;

layout(location = 1) out vec3 frag_normal;

#ifdef TEXTURE_MAPPING
layout(location = 3) in vec2 in_texcoord;
layout(location = 0) out vec2 frag_texcoord;
#endif

#ifdef SHADOW_MAPPING
layout(location = 2) out vec4 frag_shadow_coord;
#endif

#ifdef REFLECTION_MAPPING
layout(std140, binding = 4) uniform CameraSettings {
    vec4 eye_position;
} camera_settings;
layout(location = 3) out vec3 frag_reflect_dir;
#endif

#ifdef FLAG_INSTANCING
layout(location = 6) in vec3 instance_offset;
#endif

void main() {
    vec3 position = in_position;
#ifdef FLAG_INSTANCING
    position += instance_offset;
#endif
    vec4 world_position = transformations.world * vec4(position, 1.0);
    vec3 world_normal = normalize((transformations.world * vec4(in_normal, 0.0)).xyz);
    gl_Position = transformations.world_view_proj * vec4(position, 1.0);
    frag_normal = world_normal;
#ifdef TEXTURE_MAPPING
    frag_texcoord = in_texcoord;
#endif
#ifdef SHADOW_MAPPING
    frag_shadow_coord = transformations.light_view_proj * world_position;
#endif
#ifdef REFLECTION_MAPPING
    vec3 view_dir = normalize(world_position.xyz - camera_settings.eye_position.xyz);
    frag_reflect_dir = reflect(view_dir, world_normal);
#endif
}
"#;

/// Directionally-lit base shader, fragment stage.
const PHONG_FRAGMENT_SOURCE: &str = r#"#version 450

layout(std140, binding = 1) uniform MaterialSettings {
    vec4 diffuse_color;
    vec4 ambient_color;
    float alpha_threshold;
} material_settings;

layout(std140, binding = 3) uniform LightSettings {
    vec4 light_direction;
    vec4 light_color;
} light_settings;

layout(location = 1) in vec3 frag_normal;

#ifdef TEXTURE_MAPPING
layout(location = 0) in vec2 frag_texcoord;
#ifdef DIFFUSE_MAPPING
layout(binding = 2) uniform sampler2D DiffuseMap;
#endif
#endif

#ifdef SHADOW_MAPPING
layout(location = 2) in vec4 frag_shadow_coord;
layout(binding = 10) uniform sampler2D DirectionalShadowMap0;
#endif

#ifdef REFLECTION_MAPPING
layout(location = 3) in vec3 frag_reflect_dir;
layout(binding = 9) uniform samplerCube ReflectionMap;
#endif

layout(location = 0) out vec4 out_color;

void main() {
    vec3 normal = normalize(frag_normal);
    float lambert = max(dot(normal, -light_settings.light_direction.xyz), 0.0);
    vec4 color = material_settings.ambient_color
        + material_settings.diffuse_color * lambert * light_settings.light_color;

#ifdef TEXTURE_MAPPING
#ifdef DIFFUSE_MAPPING
    color *= texture(DiffuseMap, frag_texcoord);
#endif
#endif

#ifdef SHADOW_MAPPING
    vec3 shadow_coord = frag_shadow_coord.xyz / frag_shadow_coord.w;
    float shadow_depth = texture(DirectionalShadowMap0, shadow_coord.xy).r;
    if (shadow_depth < shadow_coord.z)
        color.rgb *= 0.5;
#endif

#ifdef REFLECTION_MAPPING
    color.rgb = mix(color.rgb, texture(ReflectionMap, frag_reflect_dir).rgb, 0.25);
#endif

#ifdef ALPHA_TEST
    if (color.a < material_settings.alpha_threshold)
        discard;
#endif

    out_color = color;
}
"#;

const BASIC_VERTEX_FLAGS: &str = "FLAG_BILLBOARD FLAG_INSTANCING FLAG_VERTEXCOLOR TEXTURE_MAPPING TRANSFORM";
const BASIC_FRAGMENT_FLAGS: &str = "ALPHA_TEST DIFFUSE_MAPPING FLAG_TEXTUREOVERLAY TEXTURE_MAPPING";
const PHONG_VERTEX_FLAGS: &str = "FLAG_INSTANCING REFLECTION_MAPPING SHADOW_MAPPING TEXTURE_MAPPING";
const PHONG_FRAGMENT_FLAGS: &str =
    "ALPHA_TEST DIFFUSE_MAPPING REFLECTION_MAPPING SHADOW_MAPPING TEXTURE_MAPPING";

/// Registry of named uber shaders.
pub struct ShaderLibrary {
    shaders: FxHashMap<String, Arc<UberShader>>,
}

impl ShaderLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self {
            shaders: FxHashMap::default(),
        }
    }

    /// Create a library with the built-in uber shaders registered.
    pub fn standard() -> Self {
        Self::standard_with_overrides(None)
    }

    /// Create the standard library, letting files under `override_dir`
    /// replace built-in sources.
    ///
    /// Override files are named `<shader>.<vert|frag>.glsl`. A missing file is
    /// skipped silently; this check runs exactly once, here.
    pub fn standard_with_overrides(override_dir: Option<&Path>) -> Self {
        let mut library = Self::new();

        let mut basic = UberShader::new("basic");
        basic.set_stage(ShaderStage::Vertex, BASIC_VERTEX_SOURCE, BASIC_VERTEX_FLAGS);
        basic.set_stage(
            ShaderStage::Fragment,
            BASIC_FRAGMENT_SOURCE,
            BASIC_FRAGMENT_FLAGS,
        );
        apply_overrides(&mut basic, override_dir);
        library.register(basic);

        let mut phong = UberShader::new("phong");
        phong.set_stage(ShaderStage::Vertex, PHONG_VERTEX_SOURCE, PHONG_VERTEX_FLAGS);
        phong.set_stage(
            ShaderStage::Fragment,
            PHONG_FRAGMENT_SOURCE,
            PHONG_FRAGMENT_FLAGS,
        );
        apply_overrides(&mut phong, override_dir);
        library.register(phong);

        library
    }

    /// Register an uber shader under its own name.
    pub fn register(&mut self, shader: UberShader) {
        self.shaders
            .insert(shader.name().to_string(), Arc::new(shader));
    }

    /// Look up an uber shader by name.
    pub fn get(&self, name: &str) -> Option<Arc<UberShader>> {
        self.shaders.get(name).cloned()
    }

    /// Remove an uber shader by name.
    pub fn unregister(&mut self, name: &str) {
        self.shaders.remove(name);
    }

    /// Number of registered shaders.
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

/// Replace built-in stage sources with on-disk overrides where present.
fn apply_overrides(shader: &mut UberShader, override_dir: Option<&Path>) {
    let Some(dir) = override_dir else {
        return;
    };

    for (stage, suffix) in [(ShaderStage::Vertex, "vert"), (ShaderStage::Fragment, "frag")] {
        let path = dir.join(format!("{}.{}.glsl", shader.name(), suffix));
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                log::info!("{} will be used to override built-in shader", path.display());
                shader.override_stage_source(stage, source);
            }
            Err(_) => {
                // No override present; keep the built-in source.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::shader::features::ShaderFeatureSet;
    use crate::shader::ShaderComposer;

    #[test]
    fn test_standard_library_contents() {
        let library = ShaderLibrary::standard();
        assert!(library.get("basic").is_some());
        assert!(library.get("phong").is_some());
        assert!(library.get("pbr").is_none());
        assert_eq!(library.len(), 2);
    }

    #[test]
    fn test_builtin_basic_compiles() {
        let library = ShaderLibrary::standard();
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();

        let basic = library.get("basic").unwrap();
        let result = basic.select(&composer, &ShaderFeatureSet::new(), &backend);
        assert!(result.is_ok(), "basic failed: {:?}", result.err());
    }

    #[test]
    fn test_builtin_phong_compiles_with_features() {
        let library = ShaderLibrary::standard();
        let backend = DummyBackend::new();
        let composer = ShaderComposer::new();

        let phong = library.get("phong").unwrap();
        let features = ShaderFeatureSet::from([
            "ALPHA_TEST",
            "TEXTURE_MAPPING",
            "DIFFUSE_MAPPING",
            "SHADOW_MAPPING",
        ]);
        let result = phong.select(&composer, &features, &backend);
        assert!(result.is_ok(), "phong failed: {:?}", result.err());

        let variant = result.unwrap();
        let shadow_map = variant.interface.binding("DirectionalShadowMap0");
        assert!(shadow_map.is_some());
        assert_eq!(shadow_map.unwrap().declared_binding, Some(10));
    }

    #[test]
    fn test_override_missing_dir_is_silent() {
        let library =
            ShaderLibrary::standard_with_overrides(Some(Path::new("/nonexistent/shaders")));
        assert!(library.get("basic").is_some());
    }

    #[test]
    fn test_unregister() {
        let mut library = ShaderLibrary::standard();
        library.unregister("phong");
        assert!(library.get("phong").is_none());
        assert_eq!(library.len(), 1);
    }
}
