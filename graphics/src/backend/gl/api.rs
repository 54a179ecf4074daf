//! Raw OpenGL entry points.
//!
//! The windowing collaborator owns context creation and hands us a symbol
//! loader; every command used by this backend is resolved through it at
//! context initialization. Core commands are mandatory — a missing one is a
//! [`GraphicsError::MissingCapability`] — while extension commands resolve to
//! `None`, after retrying known vendor fallback aliases.

use std::ffi::c_void;

use crate::error::GraphicsError;

pub type GLenum = u32;
pub type GLuint = u32;
pub type GLint = i32;
pub type GLsizei = i32;
pub type GLboolean = u8;
pub type GLbitfield = u32;
pub type GLfloat = f32;
pub type GLubyte = u8;
pub type GLchar = std::ffi::c_char;

/// Debug-output callback signature (`GL_KHR_debug` / `GL_ARB_debug_output`).
pub type GlDebugProc = extern "system" fn(
    source: GLenum,
    gltype: GLenum,
    id: GLuint,
    severity: GLenum,
    length: GLsizei,
    message: *const GLchar,
    user_param: *mut c_void,
);

// Symbolic constants, from the Khronos registry.
pub const GL_FALSE: GLboolean = 0;
pub const GL_TRUE: GLboolean = 1;

pub const GL_VENDOR: GLenum = 0x1F00;
pub const GL_RENDERER: GLenum = 0x1F01;
pub const GL_VERSION: GLenum = 0x1F02;
pub const GL_EXTENSIONS: GLenum = 0x1F03;

pub const GL_TEXTURE_2D: GLenum = 0x0DE1;
pub const GL_TEXTURE_3D: GLenum = 0x806F;
pub const GL_TEXTURE_2D_ARRAY: GLenum = 0x8C1A;
pub const GL_TEXTURE_CUBE_MAP: GLenum = 0x8513;
pub const GL_TEXTURE0: GLenum = 0x84C0;

pub const GL_BLEND: GLenum = 0x0BE2;
pub const GL_CULL_FACE: GLenum = 0x0B44;
pub const GL_DEPTH_TEST: GLenum = 0x0B71;
pub const GL_SCISSOR_TEST: GLenum = 0x0C11;
pub const GL_STENCIL_TEST: GLenum = 0x0B90;

pub const GL_ZERO: GLenum = 0;
pub const GL_ONE: GLenum = 1;
pub const GL_SRC_COLOR: GLenum = 0x0300;
pub const GL_ONE_MINUS_SRC_COLOR: GLenum = 0x0301;
pub const GL_SRC_ALPHA: GLenum = 0x0302;
pub const GL_ONE_MINUS_SRC_ALPHA: GLenum = 0x0303;
pub const GL_DST_ALPHA: GLenum = 0x0304;
pub const GL_ONE_MINUS_DST_ALPHA: GLenum = 0x0305;
pub const GL_DST_COLOR: GLenum = 0x0306;
pub const GL_ONE_MINUS_DST_COLOR: GLenum = 0x0307;

pub const GL_FUNC_ADD: GLenum = 0x8006;
pub const GL_MIN: GLenum = 0x8007;
pub const GL_MAX: GLenum = 0x8008;
pub const GL_FUNC_SUBTRACT: GLenum = 0x800A;
pub const GL_FUNC_REVERSE_SUBTRACT: GLenum = 0x800B;

pub const GL_NEVER: GLenum = 0x0200;
pub const GL_LESS: GLenum = 0x0201;
pub const GL_EQUAL: GLenum = 0x0202;
pub const GL_LEQUAL: GLenum = 0x0203;
pub const GL_GREATER: GLenum = 0x0204;
pub const GL_NOTEQUAL: GLenum = 0x0205;
pub const GL_GEQUAL: GLenum = 0x0206;
pub const GL_ALWAYS: GLenum = 0x0207;

pub const GL_FRONT: GLenum = 0x0404;
pub const GL_BACK: GLenum = 0x0405;
pub const GL_FRONT_AND_BACK: GLenum = 0x0408;

pub const GL_CW: GLenum = 0x0900;
pub const GL_CCW: GLenum = 0x0901;

pub const GL_LINE: GLenum = 0x1B01;
pub const GL_FILL: GLenum = 0x1B02;

pub const GL_KEEP: GLenum = 0x1E00;
pub const GL_REPLACE: GLenum = 0x1E01;
pub const GL_INCR: GLenum = 0x1E02;
pub const GL_DECR: GLenum = 0x1E03;
pub const GL_INVERT: GLenum = 0x150A;
pub const GL_INCR_WRAP: GLenum = 0x8507;
pub const GL_DECR_WRAP: GLenum = 0x8508;

pub const GL_FRAGMENT_SHADER: GLenum = 0x8B30;
pub const GL_VERTEX_SHADER: GLenum = 0x8B31;
pub const GL_COMPUTE_SHADER: GLenum = 0x91B9;
pub const GL_COMPILE_STATUS: GLenum = 0x8B81;
pub const GL_LINK_STATUS: GLenum = 0x8B82;
pub const GL_INFO_LOG_LENGTH: GLenum = 0x8B84;

pub const GL_POINTS: GLenum = 0x0000;
pub const GL_LINES: GLenum = 0x0001;
pub const GL_LINE_STRIP: GLenum = 0x0003;
pub const GL_TRIANGLES: GLenum = 0x0004;
pub const GL_TRIANGLE_STRIP: GLenum = 0x0005;

pub const GL_DEBUG_OUTPUT: GLenum = 0x92E0;
pub const GL_DEBUG_SOURCE_API: GLenum = 0x8246;
pub const GL_DEBUG_SOURCE_WINDOW_SYSTEM: GLenum = 0x8247;
pub const GL_DEBUG_SOURCE_SHADER_COMPILER: GLenum = 0x8248;
pub const GL_DEBUG_SOURCE_THIRD_PARTY: GLenum = 0x8249;
pub const GL_DEBUG_SOURCE_APPLICATION: GLenum = 0x824A;
pub const GL_DEBUG_SOURCE_OTHER: GLenum = 0x824B;
pub const GL_DEBUG_TYPE_ERROR: GLenum = 0x824C;
pub const GL_DEBUG_TYPE_DEPRECATED_BEHAVIOR: GLenum = 0x824D;
pub const GL_DEBUG_TYPE_UNDEFINED_BEHAVIOR: GLenum = 0x824E;
pub const GL_DEBUG_TYPE_PORTABILITY: GLenum = 0x824F;
pub const GL_DEBUG_TYPE_PERFORMANCE: GLenum = 0x8250;
pub const GL_DEBUG_TYPE_OTHER: GLenum = 0x8251;
pub const GL_DEBUG_SEVERITY_HIGH: GLenum = 0x9146;
pub const GL_DEBUG_SEVERITY_MEDIUM: GLenum = 0x9147;
pub const GL_DEBUG_SEVERITY_LOW: GLenum = 0x9148;
pub const GL_DEBUG_SEVERITY_NOTIFICATION: GLenum = 0x826B;

/// Vendor fallback aliases tried when a symbol is absent under its core name.
pub fn fallback_aliases(name: &str) -> &'static [&'static str] {
    match name {
        "glDebugMessageCallback" => &["glDebugMessageCallbackARB", "glDebugMessageCallbackAMD"],
        "glPolygonMode" => &["glPolygonModeNV"],
        _ => &[],
    }
}

/// Resolve a symbol through `loader`, retrying fallback aliases.
pub(crate) fn resolve_symbol(
    loader: &dyn Fn(&str) -> *const c_void,
    name: &str,
) -> *const c_void {
    let ptr = loader(name);
    if !ptr.is_null() {
        return ptr;
    }
    for alias in fallback_aliases(name) {
        let ptr = loader(alias);
        if !ptr.is_null() {
            log::debug!("resolved {name} through fallback alias {alias}");
            return ptr;
        }
    }
    std::ptr::null()
}

macro_rules! gl_functions {
    (
        core: { $($core:ident: fn($($core_arg:ty),*) $(-> $core_ret:ty)?,)* }
        extensions: { $($ext:ident: fn($($ext_arg:ty),*) $(-> $ext_ret:ty)?,)* }
    ) => {
        /// The resolved command table.
        ///
        /// Core commands are plain function pointers (loading fails without
        /// them); extension commands are `Option`s.
        #[allow(non_snake_case)]
        #[derive(Debug)]
        pub struct GlFunctions {
            $(pub $core: unsafe extern "system" fn($($core_arg),*) $(-> $core_ret)?,)*
            $(pub $ext: Option<unsafe extern "system" fn($($ext_arg),*) $(-> $ext_ret)?>,)*
        }

        impl GlFunctions {
            /// Resolve every command through `loader`.
            ///
            /// Fails with [`GraphicsError::MissingCapability`] naming the
            /// first absent core command.
            pub fn load(loader: &dyn Fn(&str) -> *const c_void) -> Result<Self, GraphicsError> {
                Ok(Self {
                    $($core: {
                        let ptr = resolve_symbol(loader, stringify!($core));
                        if ptr.is_null() {
                            return Err(GraphicsError::MissingCapability(format!(
                                "core function {} not found",
                                stringify!($core)
                            )));
                        }
                        // SAFETY: the loader returned a non-null pointer for
                        // this command name; the signature is the registry's.
                        unsafe { std::mem::transmute::<*const c_void, unsafe extern "system" fn($($core_arg),*) $(-> $core_ret)?>(ptr) }
                    },)*
                    $($ext: {
                        let ptr = resolve_symbol(loader, stringify!($ext));
                        if ptr.is_null() {
                            None
                        } else {
                            // SAFETY: as above.
                            Some(unsafe { std::mem::transmute::<*const c_void, unsafe extern "system" fn($($ext_arg),*) $(-> $ext_ret)?>(ptr) })
                        }
                    },)*
                })
            }
        }
    };
}

gl_functions! {
    core: {
        glGetString: fn(GLenum) -> *const GLubyte,
        glGetError: fn() -> GLenum,
        glEnable: fn(GLenum),
        glDisable: fn(GLenum),
        glActiveTexture: fn(GLenum),
        glBindTexture: fn(GLenum, GLuint),
        glBlendFuncSeparate: fn(GLenum, GLenum, GLenum, GLenum),
        glBlendEquationSeparate: fn(GLenum, GLenum),
        glDepthMask: fn(GLboolean),
        glDepthFunc: fn(GLenum),
        glCullFace: fn(GLenum),
        glFrontFace: fn(GLenum),
        glLineWidth: fn(GLfloat),
        glStencilFuncSeparate: fn(GLenum, GLenum, GLint, GLuint),
        glStencilOpSeparate: fn(GLenum, GLenum, GLenum, GLenum),
        glStencilMaskSeparate: fn(GLenum, GLuint),
        glCreateShader: fn(GLenum) -> GLuint,
        glShaderSource: fn(GLuint, GLsizei, *const *const GLchar, *const GLint),
        glCompileShader: fn(GLuint),
        glGetShaderiv: fn(GLuint, GLenum, *mut GLint),
        glGetShaderInfoLog: fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar),
        glDeleteShader: fn(GLuint),
        glCreateProgram: fn() -> GLuint,
        glAttachShader: fn(GLuint, GLuint),
        glLinkProgram: fn(GLuint),
        glGetProgramiv: fn(GLuint, GLenum, *mut GLint),
        glGetProgramInfoLog: fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar),
        glDeleteProgram: fn(GLuint),
        glUseProgram: fn(GLuint),
        glGetUniformLocation: fn(GLuint, *const GLchar) -> GLint,
        glUniform1i: fn(GLint, GLint),
    }
    extensions: {
        glPolygonMode: fn(GLenum, GLenum),
        glDebugMessageCallback: fn(GlDebugProc, *const c_void),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_fails_without_core_symbols() {
        let loader = |_: &str| -> *const c_void { std::ptr::null() };
        let err = GlFunctions::load(&loader).unwrap_err();
        match err {
            GraphicsError::MissingCapability(msg) => {
                assert!(msg.contains("glGetString"), "first core symbol named: {msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fallback_aliases_known_symbols() {
        assert!(fallback_aliases("glDebugMessageCallback")
            .contains(&"glDebugMessageCallbackARB"));
        assert!(fallback_aliases("glBindTexture").is_empty());
    }

    #[test]
    fn test_resolve_symbol_uses_fallback() {
        extern "system" fn stub() {}
        let loader = |name: &str| -> *const c_void {
            if name == "glDebugMessageCallbackARB" {
                stub as *const c_void
            } else {
                std::ptr::null()
            }
        };
        let resolved = resolve_symbol(&loader, "glDebugMessageCallback");
        assert!(!resolved.is_null());
        assert!(resolve_symbol(&loader, "glEnable").is_null());
    }
}
