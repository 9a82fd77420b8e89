//! Model loading: walks a glTF document, flattens every primitive into a
//! drawable mesh record, uploads the vertex data to GPU buffers and
//! resolves referenced textures relative to the model file's directory.
//!
//! The parsed document is dropped as soon as extraction finishes; nothing
//! in a [`Model`] borrows from the importer.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::renderer::gl;
use crate::renderer::gl::types::{GLenum, GLuint};
use crate::renderer::shader::{ShaderProgram, UniformValue};

const ATTR_LOC_POSITION: GLuint = 0;
const ATTR_LOC_NORMAL: GLuint = 1;
const ATTR_LOC_TEX_COORDS: GLuint = 2;
const ATTR_LOC_TANGENT: GLuint = 3;
const ATTR_LOC_BITANGENT: GLuint = 4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coords: Vec2,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

/// Semantic role of a texture, named after the sampler uniform family it
/// feeds (`texture_diffuse1`, `texture_specular1`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Height,
}

impl TextureKind {
    fn uniform_prefix(self) -> &'static str {
        match self {
            TextureKind::Diffuse => "texture_diffuse",
            TextureKind::Specular => "texture_specular",
            TextureKind::Normal => "texture_normal",
            TextureKind::Height => "texture_height",
        }
    }
}

/// A GL texture handle (0 when the image failed to load) with its role and
/// the source path it was deduplicated by.
pub struct Texture {
    pub id: GLuint,
    pub kind: TextureKind,
    pub path: String,
}

/// CPU-side mesh record as extracted from the importer, validated before
/// any GPU upload happens. Texture entries index the model's texture table.
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub textures: Vec<usize>,
}

impl MeshData {
    /// Every index must reference a vertex of this mesh; anything else is
    /// broken input data and fails the whole import.
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertices.len();
        for &index in &self.indices {
            ensure!(
                (index as usize) < vertex_count,
                "mesh index {index} is out of range (mesh has {vertex_count} vertices)"
            );
        }
        ensure!(
            self.indices.len() % 3 == 0,
            "mesh index count {} is not a whole number of triangles",
            self.indices.len()
        );
        Ok(())
    }
}

/// One drawable unit: a vertex array with its vertex and index buffers,
/// plus the textures it samples. Buffers are deleted on drop.
pub struct Mesh {
    vao: GLuint,
    vbo: GLuint,
    ebo: GLuint,
    index_count: i32,
    textures: Vec<usize>,
}

impl Mesh {
    /// Uploads a validated mesh record into fresh GPU buffers.
    fn upload(data: &MeshData) -> Mesh {
        let mut vao = 0;
        gl::call!(gl::GenVertexArrays(1, &mut vao));
        gl::call!(gl::BindVertexArray(vao));

        let mut vbo = 0;
        gl::call!(gl::GenBuffers(1, &mut vbo));
        gl::call!(gl::BindBuffer(gl::ARRAY_BUFFER, vbo));
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&data.vertices);
        gl::call!(gl::BufferData(
            gl::ARRAY_BUFFER,
            vertex_bytes.len() as isize,
            vertex_bytes.as_ptr() as *const c_void,
            gl::STATIC_DRAW,
        ));

        let mut ebo = 0;
        gl::call!(gl::GenBuffers(1, &mut ebo));
        gl::call!(gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, ebo));
        let index_bytes: &[u8] = bytemuck::cast_slice(&data.indices);
        gl::call!(gl::BufferData(
            gl::ELEMENT_ARRAY_BUFFER,
            index_bytes.len() as isize,
            index_bytes.as_ptr() as *const c_void,
            gl::STATIC_DRAW,
        ));

        let stride = mem::size_of::<Vertex>() as i32;
        let attributes = [
            (ATTR_LOC_POSITION, 3, mem::offset_of!(Vertex, position)),
            (ATTR_LOC_NORMAL, 3, mem::offset_of!(Vertex, normal)),
            (ATTR_LOC_TEX_COORDS, 2, mem::offset_of!(Vertex, tex_coords)),
            (ATTR_LOC_TANGENT, 3, mem::offset_of!(Vertex, tangent)),
            (ATTR_LOC_BITANGENT, 3, mem::offset_of!(Vertex, bitangent)),
        ];
        for (location, size, offset) in attributes {
            gl::call!(gl::EnableVertexAttribArray(location));
            gl::call!(gl::VertexAttribPointer(
                location,
                size,
                gl::FLOAT,
                gl::FALSE,
                stride,
                offset as *const c_void,
            ));
        }
        gl::call!(gl::BindVertexArray(0));

        Mesh {
            vao,
            vbo,
            ebo,
            index_count: data.indices.len() as i32,
            textures: data.textures.clone(),
        }
    }

    fn draw(&self, shader: &ShaderProgram, textures: &[Texture]) {
        let mut counters: HashMap<TextureKind, u32> = HashMap::new();
        for (unit, &texture_index) in self.textures.iter().enumerate() {
            let texture = &textures[texture_index];
            let number = counters.entry(texture.kind).or_insert(0);
            *number += 1;
            gl::call!(gl::ActiveTexture(gl::TEXTURE0 + unit as u32));
            let name = format!("{}{}", texture.kind.uniform_prefix(), number);
            shader.set(&name, UniformValue::Int(unit as i32));
            gl::call!(gl::BindTexture(gl::TEXTURE_2D, texture.id));
        }

        gl::call!(gl::BindVertexArray(self.vao));
        gl::call!(gl::DrawElements(
            gl::TRIANGLES,
            self.index_count,
            gl::UNSIGNED_INT,
            std::ptr::null(),
        ));
        gl::call!(gl::BindVertexArray(0));
        gl::call!(gl::ActiveTexture(gl::TEXTURE0));
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        gl::call!(gl::DeleteVertexArrays(1, &self.vao));
        gl::call!(gl::DeleteBuffers(1, &self.vbo));
        gl::call!(gl::DeleteBuffers(1, &self.ebo));
    }
}

/// All meshes loaded from one model file, plus the shared texture table.
/// Immutable after load; the texture handles are deleted on drop.
pub struct Model {
    meshes: Vec<Mesh>,
    textures: Vec<Texture>,
    directory: PathBuf,
}

impl Model {
    /// Imports a model file. An unparseable file or incomplete scene graph
    /// fails the load; a missing texture image only degrades it.
    pub fn load(path: &Path) -> Result<Model> {
        log::info!("loading model {}", path.display());
        let directory = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let gltf = gltf::Gltf::open(path)
            .with_context(|| format!("could not parse model file {}", path.display()))?;
        let buffers = load_buffers(&gltf, &directory)?;

        let scene = gltf
            .default_scene()
            .or_else(|| gltf.scenes().next())
            .context("model file contains no scenes")?;

        let mut textures = Vec::new();
        let mut texture_cache = HashMap::new();
        let mut meshes = Vec::new();

        // Depth-first over the node tree in document order, a node's
        // meshes before its children, so draw order is deterministic.
        let mut node_stack: Vec<gltf::Node> = scene.nodes().collect();
        node_stack.reverse();
        while let Some(node) = node_stack.pop() {
            if let Some(mesh) = node.mesh() {
                for primitive in mesh.primitives() {
                    let data = extract_primitive(
                        &primitive,
                        &buffers,
                        &directory,
                        &mut textures,
                        &mut texture_cache,
                    )?;
                    data.validate()?;
                    meshes.push(Mesh::upload(&data));
                }
            }
            let children: Vec<gltf::Node> = node.children().collect();
            for child in children.into_iter().rev() {
                node_stack.push(child);
            }
        }
        ensure!(
            !meshes.is_empty(),
            "model file {} contains no meshes",
            path.display()
        );

        log::info!(
            "loaded {} meshes and {} textures from {}",
            meshes.len(),
            textures.len(),
            path.display()
        );
        Ok(Model {
            meshes,
            textures,
            directory,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn draw(&self, shader: &ShaderProgram) {
        for mesh in &self.meshes {
            mesh.draw(shader, &self.textures);
        }
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        // handle 0 marks a failed load; glDeleteTextures ignores zeros
        let texture_ids: Vec<GLuint> = self.textures.iter().map(|t| t.id).collect();
        gl::call!(gl::DeleteTextures(
            texture_ids.len() as i32,
            texture_ids.as_ptr(),
        ));
    }
}

/// Resolves every buffer of the document: the GLB binary chunk or a file
/// next to the model. A missing buffer is fatal, the geometry lives there.
fn load_buffers(gltf: &gltf::Gltf, directory: &Path) -> Result<Vec<Vec<u8>>> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .context("model file references a binary chunk it does not carry")?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                let buffer_path = directory.join(uri);
                let bin = fs::read(&buffer_path).with_context(|| {
                    format!("could not read model buffer {}", buffer_path.display())
                })?;
                buffer_data.push(bin);
            }
        }
    }
    Ok(buffer_data)
}

fn extract_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    directory: &Path,
    textures: &mut Vec<Texture>,
    texture_cache: &mut HashMap<(String, TextureKind), usize>,
) -> Result<MeshData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .context("mesh primitive has no positions")?
        .map(Vec3::from)
        .collect();
    let normals: Vec<Vec3> = match reader.read_normals() {
        Some(normals) => normals.map(Vec3::from).collect(),
        None => vec![Vec3::ZERO; positions.len()],
    };
    // Tangent space is undefined without texture coordinates.
    let tex_coords: Option<Vec<Vec2>> = reader
        .read_tex_coords(0)
        .map(|tc| tc.into_f32().map(Vec2::from).collect());
    let tangents: Option<Vec<[f32; 4]>> = if tex_coords.is_some() {
        reader.read_tangents().map(|t| t.collect())
    } else {
        None
    };

    let mut vertices = Vec::with_capacity(positions.len());
    for (i, &position) in positions.iter().enumerate() {
        let normal = normals.get(i).copied().unwrap_or(Vec3::ZERO);
        let tex = tex_coords
            .as_ref()
            .and_then(|tc| tc.get(i))
            .copied()
            .unwrap_or(Vec2::ZERO);
        let (tangent, bitangent) = match tangents.as_ref().and_then(|t| t.get(i)) {
            Some(&[x, y, z, w]) => {
                let tangent = Vec3::new(x, y, z);
                (tangent, normal.cross(tangent) * w)
            }
            None => (Vec3::ZERO, Vec3::ZERO),
        };
        vertices.push(Vertex {
            position,
            normal,
            tex_coords: tex,
            tangent,
            bitangent,
        });
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        // non-indexed primitives draw their vertices in order
        None => (0..vertices.len() as u32).collect(),
    };

    let material = primitive.material();
    let pbr = material.pbr_metallic_roughness();
    let mut texture_indices = Vec::new();
    let mut add = |texture: gltf::Texture, kind: TextureKind| {
        let index = resolve_texture(&texture, kind, buffers, directory, textures, texture_cache);
        texture_indices.push(index);
    };
    if let Some(info) = pbr.base_color_texture() {
        add(info.texture(), TextureKind::Diffuse);
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        add(info.texture(), TextureKind::Specular);
    }
    if let Some(normal) = material.normal_texture() {
        add(normal.texture(), TextureKind::Normal);
    }
    if let Some(occlusion) = material.occlusion_texture() {
        add(occlusion.texture(), TextureKind::Height);
    }

    Ok(MeshData {
        vertices,
        indices,
        textures: texture_indices,
    })
}

/// Returns the texture-table index for a referenced image, loading it on
/// first sight and reusing the entry for every later reference.
fn resolve_texture(
    texture: &gltf::Texture,
    kind: TextureKind,
    buffers: &[Vec<u8>],
    directory: &Path,
    textures: &mut Vec<Texture>,
    texture_cache: &mut HashMap<(String, TextureKind), usize>,
) -> usize {
    let source = texture.source().source();
    let cache_path = match &source {
        gltf::image::Source::Uri { uri, .. } => (*uri).to_string(),
        gltf::image::Source::View { view, .. } => format!("<buffer view {}>", view.index()),
    };
    if let Some(&index) = texture_cache.get(&(cache_path.clone(), kind)) {
        return index;
    }

    let id = match &source {
        gltf::image::Source::Uri { uri, .. } => texture_from_file(&directory.join(uri)),
        gltf::image::Source::View { view, .. } => {
            let buffer = &buffers[view.buffer().index()];
            let bytes = &buffer[view.offset()..view.offset() + view.length()];
            match image::load_from_memory(bytes) {
                Ok(decoded) => upload_texture(decoded),
                Err(err) => {
                    log::warn!("texture failed to decode from {cache_path}: {err}");
                    0
                }
            }
        }
    };

    let index = textures.len();
    textures.push(Texture {
        id,
        kind,
        path: cache_path.clone(),
    });
    texture_cache.insert((cache_path, kind), index);
    index
}

/// Loads one image file into a GL texture. A missing or undecodable file
/// logs a warning and yields handle 0; rendering continues without it.
fn texture_from_file(path: &Path) -> GLuint {
    log::info!("loading texture {}", path.display());
    match image::open(path) {
        Ok(decoded) => upload_texture(decoded),
        Err(err) => {
            log::warn!("texture failed to load from {}: {err}", path.display());
            0
        }
    }
}

fn upload_texture(decoded: image::DynamicImage) -> GLuint {
    use image::DynamicImage;

    // glTF and OBJ images address texels top-down, GL samples bottom-up
    let decoded = decoded.flipv();
    let (format, width, height, data): (GLenum, u32, u32, Vec<u8>) = match decoded {
        DynamicImage::ImageLuma8(img) => {
            let (w, h) = img.dimensions();
            (gl::RED, w, h, img.into_raw())
        }
        DynamicImage::ImageRgb8(img) => {
            let (w, h) = img.dimensions();
            (gl::RGB, w, h, img.into_raw())
        }
        DynamicImage::ImageRgba8(img) => {
            let (w, h) = img.dimensions();
            (gl::RGBA, w, h, img.into_raw())
        }
        other => {
            let img = other.to_rgba8();
            let (w, h) = img.dimensions();
            (gl::RGBA, w, h, img.into_raw())
        }
    };

    let mut texture = 0;
    gl::call!(gl::GenTextures(1, &mut texture));
    gl::call!(gl::BindTexture(gl::TEXTURE_2D, texture));
    // RGB rows are not necessarily 4-byte aligned
    gl::call!(gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1));
    gl::call!(gl::TexImage2D(
        gl::TEXTURE_2D,
        0,
        format as i32,
        width as i32,
        height as i32,
        0,
        format,
        gl::UNSIGNED_BYTE,
        data.as_ptr() as *const c_void,
    ));
    gl::call!(gl::GenerateMipmap(gl::TEXTURE_2D));
    gl::call!(gl::TexParameteri(
        gl::TEXTURE_2D,
        gl::TEXTURE_WRAP_S,
        gl::REPEAT as i32
    ));
    gl::call!(gl::TexParameteri(
        gl::TEXTURE_2D,
        gl::TEXTURE_WRAP_T,
        gl::REPEAT as i32
    ));
    gl::call!(gl::TexParameteri(
        gl::TEXTURE_2D,
        gl::TEXTURE_MIN_FILTER,
        gl::LINEAR_MIPMAP_LINEAR as i32
    ));
    gl::call!(gl::TexParameteri(
        gl::TEXTURE_2D,
        gl::TEXTURE_MAG_FILTER,
        gl::LINEAR as i32
    ));
    texture
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_data(vertex_count: usize, indices: Vec<u32>) -> MeshData {
        MeshData {
            vertices: vec![Vertex::zeroed(); vertex_count],
            indices,
            textures: Vec::new(),
        }
    }

    #[test]
    fn in_range_indices_validate() {
        assert!(mesh_data(3, vec![0, 1, 2]).validate().is_ok());
    }

    #[test]
    fn out_of_range_index_is_an_input_error() {
        let err = mesh_data(3, vec![0, 1, 3]).validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn partial_triangles_are_an_input_error() {
        assert!(mesh_data(4, vec![0, 1, 2, 3]).validate().is_err());
    }

    #[test]
    fn vertex_layout_is_packed() {
        // 3 + 3 + 2 + 3 + 3 floats, no padding: the GPU upload casts the
        // vertex slice to bytes with exactly this stride
        assert_eq!(mem::size_of::<Vertex>(), 14 * mem::size_of::<f32>());
    }

    #[test]
    fn texture_kinds_map_to_sampler_prefixes() {
        assert_eq!(TextureKind::Diffuse.uniform_prefix(), "texture_diffuse");
        assert_eq!(TextureKind::Height.uniform_prefix(), "texture_height");
    }
}
