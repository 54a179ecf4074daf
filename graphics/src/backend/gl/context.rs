//! OpenGL device context.
//!
//! A [`Context`] owns one native context handle for its lifetime and layers
//! three responsibilities on top of it:
//!
//! - activation bookkeeping through the process-wide
//!   [`ContextRegistry`](crate::backend::ContextRegistry) (one current context
//!   per thread, previous context deactivated first, deregistration on drop);
//! - entry-point resolution through the collaborator-supplied loader, with
//!   vendor fallback aliases and mandatory/optional distinction;
//! - shadow copies of bound state so redundant backend calls are elided.
//!
//! Initialization also parses the advertised version and extension strings,
//! negotiates the closest supported profile when the requested one is
//! unavailable, and routes backend debug messages into the logging channel.

use std::ffi::{CString, c_void};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::context::{ContextId, ContextRegistry, DeviceContext};
use crate::backend::shadow::ShadowState;
use crate::error::GraphicsError;
use crate::shader::ShaderStage;
use crate::types::TextureTarget;

use super::api::{self, GLchar, GLenum, GLint, GLsizei, GLubyte, GLuint, GlFunctions};
use super::pipeline::RenderState;

/// The API family a context exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Api {
    /// Desktop OpenGL.
    OpenGl,
    /// OpenGL ES.
    OpenGlEs,
}

/// Requested or negotiated context profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextParams {
    /// API family.
    pub api: Api,
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            api: Api::OpenGl,
            major: 3,
            minor: 3,
        }
    }
}

impl ContextParams {
    fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// Optional capabilities gated on the advertised extension set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// SPIR-V shader ingestion (`GL_ARB_gl_spirv`).
    SpirV,
    /// Debug message output (`GL_KHR_debug`, core since 4.3).
    DebugOutput,
    /// Anisotropic filtering (core since 4.6, vendor before).
    AnisotropicFilter,
}

/// How an optional capability is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionStatus {
    /// Not available on this context.
    #[default]
    NotSupported,
    /// Part of the negotiated core version.
    Core,
    /// Provided by an ARB/KHR extension.
    Arb,
    /// Provided by a vendor extension.
    Vendor,
}

/// Native hooks supplied by the windowing collaborator.
///
/// The collaborator keeps ownership of context *creation*; this trait is the
/// handle through which the engine drives it.
pub trait NativeContext: Send + Sync {
    /// Make the native context current on the calling thread.
    fn make_current(&self) -> bool;

    /// Release the native context from the calling thread.
    fn release_current(&self);

    /// Resolve a command address, GetProcAddress-style.
    fn get_proc_address(&self, name: &str) -> *const c_void;
}

struct NegotiatedState {
    params: ContextParams,
    extensions: FxHashSet<String>,
    extension_status: FxHashMap<Extension, ExtensionStatus>,
}

/// An OpenGL device context.
pub struct Context {
    id: ContextId,
    native: Box<dyn NativeContext>,
    functions: OnceLock<GlFunctions>,
    negotiated: OnceLock<NegotiatedState>,
    shadow: Mutex<ShadowState>,
    render_state: Mutex<RenderState>,
    active_unit: Mutex<Option<u32>>,
    current_program: Mutex<Option<GLuint>>,
}

impl Context {
    /// Wrap a native context handle. The context is unusable until
    /// [`initialize`](Self::initialize) succeeds.
    pub fn new(native: Box<dyn NativeContext>) -> Arc<Self> {
        Arc::new(Self {
            id: ContextId::next(),
            native,
            functions: OnceLock::new(),
            negotiated: OnceLock::new(),
            shadow: Mutex::new(ShadowState::new()),
            render_state: Mutex::new(RenderState::new()),
            active_unit: Mutex::new(None),
            current_program: Mutex::new(None),
        })
    }

    /// Resolve entry points, query capabilities and negotiate the profile.
    ///
    /// Must run on a thread where the context can become current. Fails with
    /// [`GraphicsError::ActivationFailed`] when activation is refused and
    /// [`GraphicsError::MissingCapability`] when a core command is absent.
    pub fn initialize(
        self: &Arc<Self>,
        requested: &ContextParams,
    ) -> Result<(), GraphicsError> {
        self.activate()?;

        let loader = |name: &str| self.native.get_proc_address(name);
        let functions = GlFunctions::load(&loader)?;

        let mut params = Self::parse_version(&functions, requested)?;
        let extensions = Self::parse_extensions(&functions);

        // An ES profile was requested but a desktop context was obtained:
        // prefer the highest compatible tier the extensions offer.
        if requested.api == Api::OpenGlEs && params.api != Api::OpenGlEs {
            let tiers = [
                ("GL_ARB_ES3_2_compatibility", 3, 2),
                ("GL_ARB_ES3_1_compatibility", 3, 1),
                ("GL_ARB_ES3_compatibility", 3, 0),
            ];
            match tiers.iter().find(|(ext, _, _)| extensions.contains(*ext)) {
                Some((ext, major, minor)) => {
                    log::warn!(
                        "requested OpenGL ES {}.{} unavailable, downgrading to ES {major}.{minor} via {ext}",
                        requested.major,
                        requested.minor
                    );
                    params = ContextParams {
                        api: Api::OpenGlEs,
                        major: *major,
                        minor: *minor,
                    };
                }
                None => {
                    log::warn!(
                        "desktop support for OpenGL ES is missing, falling back to OpenGL {}.{}",
                        params.major,
                        params.minor
                    );
                }
            }
        }

        let mut extension_status = FxHashMap::default();
        extension_status.insert(
            Extension::SpirV,
            if extensions.contains("GL_ARB_gl_spirv") {
                ExtensionStatus::Arb
            } else {
                ExtensionStatus::NotSupported
            },
        );
        extension_status.insert(
            Extension::DebugOutput,
            if params.api == Api::OpenGl && params.at_least(4, 3) {
                ExtensionStatus::Core
            } else if extensions.contains("GL_KHR_debug") {
                ExtensionStatus::Arb
            } else {
                ExtensionStatus::NotSupported
            },
        );
        extension_status.insert(
            Extension::AnisotropicFilter,
            if params.api == Api::OpenGl && params.at_least(4, 6) {
                ExtensionStatus::Core
            } else if extensions.contains("GL_EXT_texture_filter_anisotropic") {
                ExtensionStatus::Vendor
            } else {
                ExtensionStatus::NotSupported
            },
        );

        // Route backend debug messages into the logging channel (if the
        // entry point exists at all; it may have come from a vendor alias).
        if let Some(debug_message_callback) = functions.glDebugMessageCallback {
            unsafe {
                (functions.glEnable)(api::GL_DEBUG_OUTPUT);
                debug_message_callback(handle_debug_message, std::ptr::null());
            }
        }

        log::info!(
            "OpenGL context initialized: {:?} {}.{} ({} extensions)",
            params.api,
            params.major,
            params.minor,
            extensions.len()
        );

        self.functions
            .set(functions)
            .map_err(|_| GraphicsError::Internal("context initialized twice".into()))?;
        let _ = self.negotiated.set(NegotiatedState {
            params,
            extensions,
            extension_status,
        });

        Ok(())
    }

    /// Make this context current on the calling thread.
    ///
    /// Idempotent when already current; deactivates a previously-current
    /// context on this thread first.
    pub fn activate(self: &Arc<Self>) -> Result<(), GraphicsError> {
        ContextRegistry::global().make_current(self)
    }

    pub(crate) fn ensure_current(self: &Arc<Self>) -> Result<(), GraphicsError> {
        if ContextRegistry::global().current_id() == Some(self.id) {
            return Ok(());
        }
        self.activate()
    }

    fn functions(&self) -> Result<&GlFunctions, GraphicsError> {
        self.functions
            .get()
            .ok_or_else(|| GraphicsError::Internal("context not initialized".into()))
    }

    /// The negotiated profile, reported back to the device-init collaborator.
    pub fn profile(&self) -> Option<ContextParams> {
        self.negotiated.get().map(|n| n.params)
    }

    /// The advertised extension set.
    pub fn has_extension(&self, name: &str) -> bool {
        self.negotiated
            .get()
            .is_some_and(|n| n.extensions.contains(name))
    }

    /// How an optional capability is provided on this context.
    pub fn extension_status(&self, extension: Extension) -> ExtensionStatus {
        self.negotiated
            .get()
            .and_then(|n| n.extension_status.get(&extension).copied())
            .unwrap_or_default()
    }

    /// Look up a backend entry point.
    ///
    /// Retries known vendor fallback aliases before giving up. A missing
    /// mandatory entry point is [`GraphicsError::MissingCapability`]; a
    /// missing optional one resolves to `None`.
    pub fn resolve_function(
        &self,
        name: &str,
        mandatory: bool,
    ) -> Result<Option<*const c_void>, GraphicsError> {
        let loader = |symbol: &str| self.native.get_proc_address(symbol);
        let ptr = api::resolve_symbol(&loader, name);
        if ptr.is_null() {
            if mandatory {
                return Err(GraphicsError::MissingCapability(format!(
                    "mandatory function {name} not found"
                )));
            }
            return Ok(None);
        }
        Ok(Some(ptr))
    }

    /// Bind `handle` to texture `slot` for `target`.
    ///
    /// No-op when the shadow state already shows this exact binding; the
    /// elision is mandatory, state changes dominate rendering cost.
    pub fn bind_texture(
        self: &Arc<Self>,
        slot: u32,
        target: TextureTarget,
        handle: u64,
    ) -> Result<(), GraphicsError> {
        self.ensure_current()?;
        if !self.shadow.lock().note_texture_bind(slot, target, handle) {
            return Ok(());
        }

        let functions = self.functions()?;
        let mut active_unit = self.active_unit.lock();
        unsafe {
            if *active_unit != Some(slot) {
                (functions.glActiveTexture)(api::GL_TEXTURE0 + slot);
                *active_unit = Some(slot);
            }
            (functions.glBindTexture)(texture_target_to_gl(target), handle as GLuint);
        }
        Ok(())
    }

    /// Compile a shader stage from composed GLSL source.
    pub fn compile_shader_source(
        self: &Arc<Self>,
        stage: ShaderStage,
        source: &str,
    ) -> Result<GLuint, GraphicsError> {
        self.ensure_current()?;
        let functions = self.functions()?;

        let shader = unsafe { (functions.glCreateShader)(shader_stage_to_gl(stage)) };
        if shader == 0 {
            return Err(GraphicsError::VariantCompilationFailed(
                "glCreateShader returned 0".into(),
            ));
        }

        let c_source = CString::new(source).map_err(|_| {
            GraphicsError::InvalidParameter("shader source contains a null byte".into())
        })?;
        let sources = [c_source.as_ptr()];
        let lengths = [source.len() as GLint];

        unsafe {
            (functions.glShaderSource)(shader, 1, sources.as_ptr(), lengths.as_ptr());
            (functions.glCompileShader)(shader);
        }

        let mut status: GLint = 0;
        unsafe { (functions.glGetShaderiv)(shader, api::GL_COMPILE_STATUS, &mut status) };
        if status == GLint::from(api::GL_FALSE) {
            let info_log = read_info_log(shader, functions, InfoLogSource::Shader);
            unsafe { (functions.glDeleteShader)(shader) };
            return Err(GraphicsError::VariantCompilationFailed(info_log));
        }

        Ok(shader)
    }

    /// Link compiled stages into a program.
    pub fn link_program(self: &Arc<Self>, shaders: &[GLuint]) -> Result<GLuint, GraphicsError> {
        self.ensure_current()?;
        let functions = self.functions()?;

        let program = unsafe { (functions.glCreateProgram)() };
        if program == 0 {
            return Err(GraphicsError::VariantCompilationFailed(
                "glCreateProgram returned 0".into(),
            ));
        }

        unsafe {
            for &shader in shaders {
                (functions.glAttachShader)(program, shader);
            }
            (functions.glLinkProgram)(program);
        }

        let mut status: GLint = 0;
        unsafe { (functions.glGetProgramiv)(program, api::GL_LINK_STATUS, &mut status) };
        if status == GLint::from(api::GL_FALSE) {
            let info_log = read_info_log(program, functions, InfoLogSource::Program);
            unsafe { (functions.glDeleteProgram)(program) };
            return Err(GraphicsError::VariantCompilationFailed(info_log));
        }

        Ok(program)
    }

    /// Bind `program`, eliding the call when it is already in use.
    pub fn use_program(self: &Arc<Self>, program: GLuint) -> Result<(), GraphicsError> {
        self.ensure_current()?;
        let functions = self.functions()?;
        let mut current = self.current_program.lock();
        if *current != Some(program) {
            unsafe { (functions.glUseProgram)(program) };
            *current = Some(program);
        }
        Ok(())
    }

    /// Assign a sampler uniform its fixed texture unit. Missing uniforms are
    /// skipped: the variant may have compiled the sampler out.
    pub fn set_sampler_unit(
        self: &Arc<Self>,
        program: GLuint,
        name: &str,
        unit: u32,
    ) -> Result<(), GraphicsError> {
        self.use_program(program)?;
        let functions = self.functions()?;
        let c_name = CString::new(name).map_err(|_| {
            GraphicsError::InvalidParameter("uniform name contains a null byte".into())
        })?;
        unsafe {
            let location = (functions.glGetUniformLocation)(program, c_name.as_ptr());
            if location >= 0 {
                (functions.glUniform1i)(location, unit as GLint);
            }
        }
        Ok(())
    }

    /// Delete a shader object. Failures to re-activate the owning context are
    /// logged, not propagated, since this runs from destructors.
    pub(crate) fn delete_shader(self: &Arc<Self>, shader: GLuint) {
        if self.ensure_current().is_err() {
            log::warn!("leaking GL shader {shader}: context no longer activatable");
            return;
        }
        if let Ok(functions) = self.functions() {
            unsafe { (functions.glDeleteShader)(shader) };
        }
    }

    /// Delete a program object, same policy as [`delete_shader`](Self::delete_shader).
    pub(crate) fn delete_program(self: &Arc<Self>, program: GLuint) {
        if self.ensure_current().is_err() {
            log::warn!("leaking GL program {program}: context no longer activatable");
            return;
        }
        if let Ok(functions) = self.functions() {
            unsafe { (functions.glDeleteProgram)(program) };
        }
    }

    pub(crate) fn functions_ref(&self) -> Result<&GlFunctions, GraphicsError> {
        self.functions()
    }

    pub(crate) fn render_state(&self) -> &Mutex<RenderState> {
        &self.render_state
    }

    fn parse_version(
        functions: &GlFunctions,
        requested: &ContextParams,
    ) -> Result<ContextParams, GraphicsError> {
        let version = unsafe { read_gl_string(functions, api::GL_VERSION) }.ok_or_else(|| {
            GraphicsError::InitializationFailed("glGetString(GL_VERSION) returned null".into())
        })?;

        let api = if version.starts_with("OpenGL ES") {
            Api::OpenGlEs
        } else {
            Api::OpenGl
        };

        // "4.6.0 NVIDIA 535.54" or "OpenGL ES 3.2 Mesa": take the first
        // digit-dot-digit group.
        let bytes = version.as_bytes();
        let digit_at = bytes.iter().position(u8::is_ascii_digit);
        match digit_at {
            Some(i)
                if i + 2 < bytes.len()
                    && bytes[i + 1] == b'.'
                    && bytes[i + 2].is_ascii_digit() =>
            {
                Ok(ContextParams {
                    api,
                    major: bytes[i] - b'0',
                    minor: bytes[i + 2] - b'0',
                })
            }
            _ => {
                log::warn!("failed to decode OpenGL version: {version}");
                Ok(*requested)
            }
        }
    }

    fn parse_extensions(functions: &GlFunctions) -> FxHashSet<String> {
        let extensions = unsafe { read_gl_string(functions, api::GL_EXTENSIONS) };
        extensions
            .map(|list| list.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl DeviceContext for Context {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn make_current_native(&self) -> bool {
        self.native.make_current()
    }

    fn release_current_native(&self) {
        self.native.release_current();
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        ContextRegistry::global().forget(self.id);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("profile", &self.profile())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Context: Send, Sync);

enum InfoLogSource {
    Shader,
    Program,
}

fn read_info_log(object: GLuint, functions: &GlFunctions, source: InfoLogSource) -> String {
    let mut length: GLint = 0;
    unsafe {
        match source {
            InfoLogSource::Shader => {
                (functions.glGetShaderiv)(object, api::GL_INFO_LOG_LENGTH, &mut length)
            }
            InfoLogSource::Program => {
                (functions.glGetProgramiv)(object, api::GL_INFO_LOG_LENGTH, &mut length)
            }
        }
    }
    if length <= 0 {
        return String::from("(no diagnostic)");
    }

    let mut buffer = vec![0u8; length as usize];
    let mut written: GLsizei = 0;
    unsafe {
        let ptr = buffer.as_mut_ptr().cast::<GLchar>();
        match source {
            InfoLogSource::Shader => {
                (functions.glGetShaderInfoLog)(object, length, &mut written, ptr)
            }
            InfoLogSource::Program => {
                (functions.glGetProgramInfoLog)(object, length, &mut written, ptr)
            }
        }
    }
    buffer.truncate(written.max(0) as usize);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Read a static string from the backend.
///
/// # Safety
///
/// `functions.glGetString` must be a valid resolved entry point and the
/// context must be current on the calling thread.
unsafe fn read_gl_string(functions: &GlFunctions, name: GLenum) -> Option<String> {
    let ptr: *const GLubyte = unsafe { (functions.glGetString)(name) };
    if ptr.is_null() {
        return None;
    }
    let c_str = unsafe { std::ffi::CStr::from_ptr(ptr.cast()) };
    Some(c_str.to_string_lossy().into_owned())
}

fn texture_target_to_gl(target: TextureTarget) -> GLenum {
    match target {
        TextureTarget::Texture2D => api::GL_TEXTURE_2D,
        TextureTarget::Texture2DArray => api::GL_TEXTURE_2D_ARRAY,
        TextureTarget::Texture3D => api::GL_TEXTURE_3D,
        TextureTarget::Cubemap => api::GL_TEXTURE_CUBE_MAP,
    }
}

fn shader_stage_to_gl(stage: ShaderStage) -> GLenum {
    match stage {
        ShaderStage::Vertex => api::GL_VERTEX_SHADER,
        ShaderStage::Fragment => api::GL_FRAGMENT_SHADER,
        ShaderStage::Compute => api::GL_COMPUTE_SHADER,
    }
}

/// Translate a backend debug message into the engine's diagnostic channel.
///
/// Severity is preserved, never downgraded.
extern "system" fn handle_debug_message(
    source: GLenum,
    gltype: GLenum,
    id: GLuint,
    severity: GLenum,
    length: GLsizei,
    message: *const GLchar,
    _user_param: *mut c_void,
) {
    let text = if message.is_null() || length < 0 {
        String::from("(no message)")
    } else {
        let bytes =
            unsafe { std::slice::from_raw_parts(message.cast::<u8>(), length as usize) };
        String::from_utf8_lossy(bytes).into_owned()
    };

    let source_str = match source {
        api::GL_DEBUG_SOURCE_API => "OpenGL API",
        api::GL_DEBUG_SOURCE_WINDOW_SYSTEM => "Window system",
        api::GL_DEBUG_SOURCE_SHADER_COMPILER => "Shader compiler",
        api::GL_DEBUG_SOURCE_THIRD_PARTY => "Third party",
        api::GL_DEBUG_SOURCE_APPLICATION => "Application",
        api::GL_DEBUG_SOURCE_OTHER => "Other",
        _ => "Unknown",
    };

    let type_str = match gltype {
        api::GL_DEBUG_TYPE_ERROR => "Error",
        api::GL_DEBUG_TYPE_DEPRECATED_BEHAVIOR => "Deprecated behavior",
        api::GL_DEBUG_TYPE_UNDEFINED_BEHAVIOR => "Undefined behavior",
        api::GL_DEBUG_TYPE_PORTABILITY => "Portability",
        api::GL_DEBUG_TYPE_PERFORMANCE => "Performance",
        api::GL_DEBUG_TYPE_OTHER => "Other",
        _ => "Unknown",
    };

    match severity {
        api::GL_DEBUG_SEVERITY_HIGH => {
            log::error!("[GL {source_str}/{type_str}] (0x{id:x}) {text}");
        }
        api::GL_DEBUG_SEVERITY_MEDIUM => {
            log::warn!("[GL {source_str}/{type_str}] (0x{id:x}) {text}");
        }
        api::GL_DEBUG_SEVERITY_LOW => {
            log::info!("[GL {source_str}/{type_str}] (0x{id:x}) {text}");
        }
        _ => {
            log::debug!("[GL {source_str}/{type_str}] (0x{id:x}) {text}");
        }
    }
}
