//! Raw OpenGL 3.3 core bindings (generated by gl_generator in build.rs) and
//! the error-checking wrapper used for every GL call in this crate.

#![allow(clippy::all)]

use std::ffi::CStr;

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

/// Wraps a raw GL call. In debug builds, checks glGetError afterwards and
/// panics with the call site on any error, since a GL error here is always
/// a programming mistake rather than a runtime condition.
macro_rules! call {
    ($expr:expr) => {{
        let result = unsafe { $expr };
        if cfg!(debug_assertions) {
            let error = unsafe { crate::renderer::gl::GetError() };
            if error != crate::renderer::gl::NO_ERROR {
                let error_number_stringified;
                let error_name = match error {
                    crate::renderer::gl::INVALID_ENUM => "INVALID_ENUM",
                    crate::renderer::gl::INVALID_VALUE => "INVALID_VALUE",
                    crate::renderer::gl::INVALID_OPERATION => "INVALID_OPERATION",
                    crate::renderer::gl::OUT_OF_MEMORY => "OUT_OF_MEMORY",
                    crate::renderer::gl::INVALID_FRAMEBUFFER_OPERATION => {
                        "INVALID_FRAMEBUFFER_OPERATION"
                    }
                    _ => {
                        error_number_stringified = format!("{error}");
                        &error_number_stringified
                    }
                };
                panic!(
                    "OpenGL error {error_name} at {}:{}:{}",
                    file!(),
                    line!(),
                    column!(),
                );
            }
        }
        result
    }};
}
pub(crate) use call;

/// Logs the renderer and version strings plus a few implementation limits.
/// Only useful when diagnosing driver differences, hence debug level.
pub fn log_context_info() {
    fn get_string(name: types::GLenum) -> String {
        let ptr = call!(GetString(name));
        if ptr.is_null() {
            return String::from("<null>");
        }
        unsafe { CStr::from_ptr(ptr as *const _) }
            .to_string_lossy()
            .into_owned()
    }
    fn get_int(name: types::GLenum) -> i32 {
        let mut value = 0;
        call!(GetIntegerv(name, &mut value));
        value
    }

    log::debug!("renderer: {}", get_string(RENDERER));
    log::debug!("version: {}", get_string(VERSION));
    log::debug!("max texture size: {}", get_int(MAX_TEXTURE_SIZE));
    log::debug!("max vertex attribs: {}", get_int(MAX_VERTEX_ATTRIBS));
    log::debug!(
        "max texture image units: {}",
        get_int(MAX_TEXTURE_IMAGE_UNITS)
    );
}
