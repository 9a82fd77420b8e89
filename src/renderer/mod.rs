//! Per-frame rendering: the imported model plus a small lamp cube, each
//! with its own shader program built from a sectioned source file.

use std::ffi::c_void;
use std::path::Path;

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use sdl2::video::Window;
use sdl2::VideoSubsystem;

use crate::camera::Camera;

mod gl;
mod model;
mod shader;

use gl::types::GLuint;
use model::Model;
use shader::{ShaderProgram, UniformValue};

const MODEL_SHADER_PATH: &str = "resources/shaders/model_loading.glsl";
const LAMP_SHADER_PATH: &str = "resources/shaders/lamp.glsl";

const MODEL_POSITION: Vec3 = Vec3::new(0.0, -2.8, -5.0);
const LAMP_POSITION: Vec3 = Vec3::new(1.0, 3.0, -1.0);

const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 100.0;

/// Unit cube for the lamp, counter-clockwise winding seen from outside.
const CUBE_POSITIONS: [Vec3; 8] = [
    Vec3::new(-0.5, -0.5, -0.5),
    Vec3::new(0.5, -0.5, -0.5),
    Vec3::new(0.5, 0.5, -0.5),
    Vec3::new(-0.5, 0.5, -0.5),
    Vec3::new(-0.5, -0.5, 0.5),
    Vec3::new(0.5, -0.5, 0.5),
    Vec3::new(0.5, 0.5, 0.5),
    Vec3::new(-0.5, 0.5, 0.5),
];
#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    4, 5, 6, 6, 7, 4, // front
    1, 0, 3, 3, 2, 1, // back
    0, 4, 7, 7, 3, 0, // left
    5, 1, 2, 2, 6, 5, // right
    3, 7, 6, 6, 2, 3, // top
    0, 1, 5, 5, 4, 0, // bottom
];

pub struct Renderer {
    model: Model,
    model_shader: ShaderProgram,
    lamp_shader: ShaderProgram,
    lamp_vao: GLuint,
    lamp_index_count: i32,
}

impl Renderer {
    pub fn new(video: &VideoSubsystem, window: &Window, model_path: &Path) -> Result<Renderer> {
        gl::load_with(|s| video.gl_get_proc_address(s) as *const c_void);
        video
            .gl_set_swap_interval(1)
            .map_err(anyhow::Error::msg)
            .context("could not enable vsync")?;
        let (w, h) = window.drawable_size();
        gl::call!(gl::Viewport(0, 0, w as i32, h as i32));
        gl::log_context_info();

        gl::call!(gl::Enable(gl::DEPTH_TEST));
        gl::call!(gl::DepthFunc(gl::LESS));
        gl::call!(gl::Enable(gl::CULL_FACE));
        gl::call!(gl::CullFace(gl::BACK));
        gl::call!(gl::FrontFace(gl::CCW));

        let model_shader = ShaderProgram::from_file(Path::new(MODEL_SHADER_PATH))?;
        let model = Model::load(model_path)?;

        let mut lamp_shader = ShaderProgram::from_file(Path::new(LAMP_SHADER_PATH))?;
        let lamp_vao = lamp_shader.vao_alloc();
        lamp_shader.vbo_alloc(&CUBE_POSITIONS, "position")?;
        lamp_shader.ebo_alloc(&CUBE_INDICES);
        gl::call!(gl::BindVertexArray(0));

        Ok(Renderer {
            model,
            model_shader,
            lamp_shader,
            lamp_vao,
            lamp_index_count: CUBE_INDICES.len() as i32,
        })
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        gl::call!(gl::Viewport(0, 0, width, height));
    }

    /// Draws one frame: the model slowly spinning about the vertical
    /// axis, then the lamp cube. `time` is seconds since startup.
    pub fn render(&mut self, camera: &Camera, aspect: f32, time: f32) {
        gl::call!(gl::ClearColor(0.05, 0.05, 0.05, 1.0));
        gl::call!(gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT));

        let view = camera.view_matrix();
        let projection = Mat4::perspective_rh_gl(camera.zoom_radians(), aspect, Z_NEAR, Z_FAR);

        let model_transform = Mat4::from_translation(MODEL_POSITION)
            * Mat4::from_rotation_y(time)
            * Mat4::from_scale(Vec3::splat(0.5));
        self.model_shader.bind();
        self.model_shader
            .set("model", UniformValue::Mat4(model_transform));
        self.model_shader.set("view", UniformValue::Mat4(view));
        self.model_shader
            .set("projection", UniformValue::Mat4(projection));
        self.model.draw(&self.model_shader);

        let lamp_transform =
            Mat4::from_translation(LAMP_POSITION) * Mat4::from_scale(Vec3::splat(0.1));
        self.lamp_shader.bind();
        self.lamp_shader
            .set("model", UniformValue::Mat4(lamp_transform));
        self.lamp_shader.set("view", UniformValue::Mat4(view));
        self.lamp_shader
            .set("projection", UniformValue::Mat4(projection));
        gl::call!(gl::BindVertexArray(self.lamp_vao));
        gl::call!(gl::DrawElements(
            gl::TRIANGLES,
            self.lamp_index_count,
            gl::UNSIGNED_INT,
            std::ptr::null(),
        ));
        gl::call!(gl::BindVertexArray(0));
    }
}
