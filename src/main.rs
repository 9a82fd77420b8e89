use std::env;
use std::error::Error;
use std::fmt::Display;
use std::path::Path;
use std::time::Instant;

use sdl2::event::{Event, WindowEvent};
use sdl2::keyboard::{Keycode, Scancode};
use sdl2::video::{GLProfile, Window};

mod camera;
mod renderer;

use camera::{Camera, Direction};
use renderer::Renderer;

const DEFAULT_MODEL_PATH: &str = "resources/models/cube/cube.gltf";
const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let model_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string());

    let sdl_context = sdl2::init().map_err(SdlErr)?;
    let video_subsystem = sdl_context.video().map_err(SdlErr)?;
    let gl_attr = video_subsystem.gl_attr();
    gl_attr.set_context_profile(GLProfile::Core);
    gl_attr.set_context_version(3, 3);
    let mut window = video_subsystem
        .window(env!("CARGO_PKG_NAME"), WINDOW_WIDTH, WINDOW_HEIGHT)
        .resizable()
        .opengl()
        .build()?;
    let _gl_context = window.gl_create_context().map_err(SdlErr)?;
    let mut event_pump = sdl_context.event_pump().map_err(SdlErr)?;
    // capture the mouse for camera look
    sdl_context.mouse().set_relative_mouse_mode(true);

    let mut renderer = Renderer::new(&video_subsystem, &window, Path::new(&model_path))?;
    let mut camera = Camera::new(glam::Vec3::new(0.0, 1.0, 3.0));
    // relative mouse mode reports deltas; accumulate them into a virtual
    // cursor position so the camera sees a continuous sample stream
    let mut cursor = (0.0f32, 0.0f32);

    let start = Instant::now();
    let mut last_frame = start;
    let mut fps_counter = FpsCounter::new();

    'running: loop {
        let now = Instant::now();
        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'running,
                Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'running,
                Event::Window {
                    win_event: WindowEvent::Resized(w, h),
                    ..
                } => renderer.resize(w, h),
                Event::MouseMotion { xrel, yrel, .. } => {
                    cursor.0 += xrel as f32;
                    cursor.1 += yrel as f32;
                    camera.process_mouse(cursor.0, cursor.1);
                }
                Event::MouseWheel { y, .. } => camera.process_scroll(y as f32),
                _ => {}
            }
        }

        let keys = event_pump.keyboard_state();
        if keys.is_scancode_pressed(Scancode::W) {
            camera.process_keyboard(Direction::Forward, dt);
        }
        if keys.is_scancode_pressed(Scancode::S) {
            camera.process_keyboard(Direction::Backward, dt);
        }
        if keys.is_scancode_pressed(Scancode::A) || keys.is_scancode_pressed(Scancode::Left) {
            camera.process_keyboard(Direction::Left, dt);
        }
        if keys.is_scancode_pressed(Scancode::D) || keys.is_scancode_pressed(Scancode::Right) {
            camera.process_keyboard(Direction::Right, dt);
        }
        if keys.is_scancode_pressed(Scancode::Up) {
            camera.process_keyboard(Direction::Up, dt);
        }
        if keys.is_scancode_pressed(Scancode::Down) {
            camera.process_keyboard(Direction::Down, dt);
        }

        let (w, h) = window.drawable_size();
        let aspect = w as f32 / h.max(1) as f32;
        renderer.render(&camera, aspect, start.elapsed().as_secs_f32());
        window.gl_swap_window();
        fps_counter.update(&mut window);
    }

    log::info!("exit");
    Ok(())
}

/// Keeps the window title showing a smoothed frames-per-second figure,
/// refreshed roughly every quarter second.
struct FpsCounter {
    last_update: Instant,
    frames: u32,
}

impl FpsCounter {
    fn new() -> FpsCounter {
        FpsCounter {
            last_update: Instant::now(),
            frames: 0,
        }
    }

    fn update(&mut self, window: &mut Window) {
        self.frames += 1;
        let elapsed = self.last_update.elapsed().as_secs_f64();
        if elapsed > 0.25 {
            let fps = self.frames as f64 / elapsed;
            let title = format!("{} @ {fps:.2} fps", env!("CARGO_PKG_NAME"));
            if let Err(err) = window.set_title(&title) {
                log::warn!("could not update window title: {err}");
            }
            self.last_update = Instant::now();
            self.frames = 0;
        }
    }
}

#[derive(Debug)]
pub struct SdlErr(String);
impl Display for SdlErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sdl error: {}", self.0)
    }
}
impl Error for SdlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
