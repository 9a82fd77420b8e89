//! Shader source files carry multiple named sections delimited by
//! `#shader <name>` marker lines. The splitter turns one file into a
//! section map, and [`ShaderProgram`] compiles a vertex + fragment pair
//! from it into a linked GL program that owns every buffer handle
//! allocated through it.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Result};
use glam::{Mat4, Vec3};

use crate::renderer::gl;
use crate::renderer::gl::types::{GLenum, GLint, GLuint};

/// Splits shader file text into sections keyed by lowercase section name.
/// Lines before the first marker accumulate under the empty-string key.
/// Text is cumulative: a repeated marker appends to the existing section.
pub fn split_sections(source: &str) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current = String::new();
    for line in source.lines() {
        if let Some(name) = section_marker(line) {
            current = name;
            continue;
        }
        let text = sections.entry(current.clone()).or_default();
        text.push_str(line);
        text.push('\n');
    }
    sections
}

/// A marker is `#shader <name>` with at most one space between `#` and
/// `shader`, and nothing but the name after it.
fn section_marker(line: &str) -> Option<String> {
    let rest = line.strip_prefix('#')?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let rest = rest.strip_prefix("shader")?;
    let name = rest.trim();
    if name.is_empty() || name.len() == rest.len() {
        return None;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
        .then(|| name.to_ascii_lowercase())
}

/// Reads and splits a shader file. An unreadable file yields an empty map;
/// the builder then refuses the missing vertex/fragment sections.
pub fn parse_shader_file(path: &Path) -> HashMap<String, String> {
    log::info!("parsing shader file {}", path.display());
    match fs::read_to_string(path) {
        Ok(source) => split_sections(&source),
        Err(err) => {
            log::error!("could not read shader file {}: {err}", path.display());
            HashMap::new()
        }
    }
}

/// Pulls the vertex and fragment sources out of a section map, refusing
/// missing or empty sections before any GL work happens.
pub fn required_sources(sections: &HashMap<String, String>) -> Result<(&str, &str)> {
    let vertex = sections
        .get("vertex")
        .map(String::as_str)
        .unwrap_or_default();
    let fragment = sections
        .get("fragment")
        .map(String::as_str)
        .unwrap_or_default();
    ensure!(
        !vertex.trim().is_empty(),
        "shader file has no \"vertex\" section"
    );
    ensure!(
        !fragment.trim().is_empty(),
        "shader file has no \"fragment\" section"
    );
    Ok((vertex, fragment))
}

/// A uniform value, tagged with its type so the caller picks the upload
/// call explicitly at the point of use.
#[derive(Clone, Copy, Debug)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

/// A linked GL program together with every vertex-array and buffer handle
/// allocated through it. The handle lists are append-only; everything is
/// released together on drop.
pub struct ShaderProgram {
    id: GLuint,
    vaos: Vec<GLuint>,
    vbos: Vec<GLuint>,
    ebos: Vec<GLuint>,
}

impl ShaderProgram {
    /// Parses a sectioned shader file and builds a program from its
    /// vertex and fragment sections.
    pub fn from_file(path: &Path) -> Result<ShaderProgram> {
        let sections = parse_shader_file(path);
        let (vertex, fragment) = required_sources(&sections)?;
        ShaderProgram::build(vertex, fragment)
    }

    /// Compiles and links a program. Either a fully linked, validated
    /// program is returned or `Err`; no intermediate stage object
    /// survives a failure.
    pub fn build(vertex_source: &str, fragment_source: &str) -> Result<ShaderProgram> {
        ensure!(
            !vertex_source.trim().is_empty(),
            "vertex shader source is empty"
        );
        ensure!(
            !fragment_source.trim().is_empty(),
            "fragment shader source is empty"
        );

        let vertex_shader = compile_shader(gl::VERTEX_SHADER, vertex_source)?;
        let fragment_shader = match compile_shader(gl::FRAGMENT_SHADER, fragment_source) {
            Ok(shader) => shader,
            Err(err) => {
                // the vertex stage compiled fine, do not leak it
                gl::call!(gl::DeleteShader(vertex_shader));
                return Err(err);
            }
        };

        let program = gl::call!(gl::CreateProgram());
        gl::call!(gl::AttachShader(program, vertex_shader));
        gl::call!(gl::AttachShader(program, fragment_shader));
        log::info!("linking shader program");
        gl::call!(gl::LinkProgram(program));
        gl::call!(gl::ValidateProgram(program));
        let mut link_status = 0;
        gl::call!(gl::GetProgramiv(program, gl::LINK_STATUS, &mut link_status));

        gl::call!(gl::DetachShader(program, vertex_shader));
        gl::call!(gl::DetachShader(program, fragment_shader));
        gl::call!(gl::DeleteShader(vertex_shader));
        gl::call!(gl::DeleteShader(fragment_shader));

        if link_status == gl::FALSE as i32 {
            let info_log = program_info_log(program);
            gl::call!(gl::DeleteProgram(program));
            log::error!("failed to link shader program:\n{info_log}");
            bail!("shader program failed to link: {}", info_log.trim_end());
        }

        Ok(ShaderProgram {
            id: program,
            vaos: Vec::new(),
            vbos: Vec::new(),
            ebos: Vec::new(),
        })
    }

    pub fn bind(&self) {
        gl::call!(gl::UseProgram(self.id));
    }

    /// Uploads one uniform to the bound program. An unknown name is a
    /// silent no-op, matching GL's treatment of location -1.
    pub fn set(&self, name: &str, value: UniformValue) {
        let location = self.uniform_location(name);
        match value {
            UniformValue::Int(i) => gl::call!(gl::Uniform1i(location, i)),
            UniformValue::Float(f) => gl::call!(gl::Uniform1f(location, f)),
            UniformValue::Vec3(v) => {
                let v = v.to_array();
                gl::call!(gl::Uniform3fv(location, 1, v.as_ptr()));
            }
            UniformValue::Mat4(m) => {
                let m = m.to_cols_array();
                gl::call!(gl::UniformMatrix4fv(location, 1, gl::FALSE, m.as_ptr()));
            }
        }
    }

    fn uniform_location(&self, name: &str) -> GLint {
        let name = CString::new(name).expect("uniform names contain no nul bytes");
        gl::call!(gl::GetUniformLocation(self.id, name.as_ptr()))
    }

    fn attribute_location(&self, name: &str) -> Result<GLuint> {
        let cname = CString::new(name).expect("attribute names contain no nul bytes");
        let location = gl::call!(gl::GetAttribLocation(self.id, cname.as_ptr()));
        if location < 0 {
            bail!("shader program has no attribute named \"{name}\"");
        }
        Ok(location as GLuint)
    }

    /// Allocates a vertex-array object and leaves it bound, so following
    /// vbo/ebo allocations attach to it.
    pub fn vao_alloc(&mut self) -> GLuint {
        let mut vao = 0;
        gl::call!(gl::GenVertexArrays(1, &mut vao));
        gl::call!(gl::BindVertexArray(vao));
        self.vaos.push(vao);
        vao
    }

    /// Uploads static vertex data and points the named attribute at it.
    /// Must run inside the binding scope of a [`Self::vao_alloc`] call.
    pub fn vbo_alloc(&mut self, data: &[Vec3], attribute: &str) -> Result<GLuint> {
        let mut vbo = 0;
        gl::call!(gl::GenBuffers(1, &mut vbo));
        gl::call!(gl::BindBuffer(gl::ARRAY_BUFFER, vbo));
        let bytes: &[u8] = bytemuck::cast_slice(data);
        gl::call!(gl::BufferData(
            gl::ARRAY_BUFFER,
            bytes.len() as isize,
            bytes.as_ptr() as *const c_void,
            gl::STATIC_DRAW,
        ));
        let location = self.attribute_location(attribute)?;
        gl::call!(gl::EnableVertexAttribArray(location));
        gl::call!(gl::VertexAttribPointer(
            location,
            3,
            gl::FLOAT,
            gl::FALSE,
            0,
            std::ptr::null(),
        ));
        self.vbos.push(vbo);
        Ok(vbo)
    }

    /// Uploads a static index buffer into the bound vertex array.
    pub fn ebo_alloc(&mut self, indices: &[u32]) -> GLuint {
        let mut ebo = 0;
        gl::call!(gl::GenBuffers(1, &mut ebo));
        gl::call!(gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, ebo));
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        gl::call!(gl::BufferData(
            gl::ELEMENT_ARRAY_BUFFER,
            bytes.len() as isize,
            bytes.as_ptr() as *const c_void,
            gl::STATIC_DRAW,
        ));
        self.ebos.push(ebo);
        ebo
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        gl::call!(gl::DeleteVertexArrays(
            self.vaos.len() as i32,
            self.vaos.as_ptr(),
        ));
        gl::call!(gl::DeleteBuffers(self.vbos.len() as i32, self.vbos.as_ptr()));
        gl::call!(gl::DeleteBuffers(self.ebos.len() as i32, self.ebos.as_ptr()));
        gl::call!(gl::DeleteProgram(self.id));
    }
}

fn stage_name(kind: GLenum) -> &'static str {
    match kind {
        gl::VERTEX_SHADER => "vertex",
        gl::FRAGMENT_SHADER => "fragment",
        _ => "unknown",
    }
}

fn compile_shader(kind: GLenum, source: &str) -> Result<GLuint> {
    log::info!("compiling {} shader", stage_name(kind));
    let shader = gl::call!(gl::CreateShader(kind));
    let sources = [source.as_bytes().as_ptr() as *const i8];
    let source_lens = [source.len() as i32];
    gl::call!(gl::ShaderSource(
        shader,
        1,
        sources.as_ptr(),
        source_lens.as_ptr(),
    ));
    gl::call!(gl::CompileShader(shader));
    let mut compile_status = 0;
    gl::call!(gl::GetShaderiv(
        shader,
        gl::COMPILE_STATUS,
        &mut compile_status
    ));
    if compile_status == gl::FALSE as i32 {
        let info_log = shader_info_log(shader);
        gl::call!(gl::DeleteShader(shader));
        log::error!(
            "failed to compile {} shader:\n{info_log}\noffending source:\n{source}",
            stage_name(kind)
        );
        bail!(
            "{} shader failed to compile: {}",
            stage_name(kind),
            info_log.trim_end()
        );
    }
    Ok(shader)
}

fn shader_info_log(shader: GLuint) -> String {
    let mut info_log = [0u8; 4096];
    let mut length = 0;
    gl::call!(gl::GetShaderInfoLog(
        shader,
        info_log.len() as i32,
        &mut length,
        info_log.as_mut_ptr() as *mut i8,
    ));
    String::from_utf8_lossy(&info_log[..length as usize]).into_owned()
}

fn program_info_log(program: GLuint) -> String {
    let mut info_log = [0u8; 4096];
    let mut length = 0;
    gl::call!(gl::GetProgramInfoLog(
        program,
        info_log.len() as i32,
        &mut length,
        info_log.as_mut_ptr() as *mut i8,
    ));
    String::from_utf8_lossy(&info_log[..length as usize]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_accumulate_across_repeated_markers() {
        let source = "#shader a\none\n#shader b\ntwo\n#shader a\nthree\n";
        let sections = split_sections(source);
        assert_eq!(sections["a"], "one\nthree\n");
        assert_eq!(sections["b"], "two\n");
    }

    #[test]
    fn marker_names_are_lowercased() {
        let sections = split_sections("#shader VERTEX\nmain\n");
        assert_eq!(sections["vertex"], "main\n");
    }

    #[test]
    fn lines_before_first_marker_accumulate_under_empty_key() {
        let sections = split_sections("preamble\n#shader vertex\nmain\n");
        assert_eq!(sections[""], "preamble\n");
        assert_eq!(sections["vertex"], "main\n");
    }

    #[test]
    fn marker_allows_one_space_after_hash() {
        let sections = split_sections("# shader vertex\nmain\n");
        assert_eq!(sections["vertex"], "main\n");
    }

    #[test]
    fn non_marker_hash_lines_are_plain_content() {
        let sections = split_sections("#shader vertex\n#shadervertex\n#version 330 core\n");
        assert_eq!(sections["vertex"], "#shadervertex\n#version 330 core\n");
    }

    #[test]
    fn unreadable_file_yields_empty_map() {
        let sections = parse_shader_file(Path::new("does/not/exist.glsl"));
        assert!(sections.is_empty());
        assert!(required_sources(&sections).is_err());
    }

    #[test]
    fn misspelled_fragment_marker_fails_the_source_check() {
        let sections = split_sections("#shader vertex\nmain\n#shader fragmant\nmain\n");
        let err = required_sources(&sections).unwrap_err();
        assert!(err.to_string().contains("fragment"));
    }

    #[test]
    fn both_sections_present_pass_the_source_check() {
        let sections = split_sections("#shader vertex\nv\n#shader fragment\nf\n");
        let (vertex, fragment) = required_sources(&sections).unwrap();
        assert_eq!(vertex, "v\n");
        assert_eq!(fragment, "f\n");
    }

    #[test]
    fn empty_vertex_source_fails_before_any_gl_call() {
        // No GL context exists in tests; build must refuse the empty
        // source before reaching the driver.
        assert!(ShaderProgram::build("", "void main() {}").is_err());
        assert!(ShaderProgram::build("void main() {}", "  \n").is_err());
    }
}
