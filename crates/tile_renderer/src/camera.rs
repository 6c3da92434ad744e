use glam::DVec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Map view parameters fed to [`crate::Renderer::init_view`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapCamera {
    /// Zoom scale around the viewport centre.
    pub scale: f64,
    /// Pitch in radians, 0 looks straight down.
    pub rot_x: f64,
    /// Bearing in radians.
    pub rot_z: f64,
    /// Metres per world pixel at the current zoom.
    pub ground_resolution: f64,
    /// World position of the viewport's top-left corner.
    pub offset: DVec2,
}

impl MapCamera {
    pub const MAX_PITCH: f64 = 1.0471975511965976; // 60°
    pub const MIN_SCALE: f64 = 0.25;
    pub const MAX_SCALE: f64 = 8.0;

    pub fn new(ground_resolution: f64) -> Self {
        Self {
            scale: 1.0,
            rot_x: 0.0,
            rot_z: 0.0,
            ground_resolution,
            offset: DVec2::ZERO,
        }
    }

    pub fn zoom_by(&mut self, factor: f64) {
        self.scale = (self.scale * factor).clamp(Self::MIN_SCALE, Self::MAX_SCALE);
    }

    pub fn pitch_by(&mut self, delta: f64) {
        self.rot_x = (self.rot_x + delta).clamp(0.0, Self::MAX_PITCH);
    }

    pub fn rotate_by(&mut self, delta: f64) {
        self.rot_z = (self.rot_z + delta).rem_euclid(std::f64::consts::TAU);
    }
}

/// Mouse input for [`MapCamera`]: left drag pans, right drag tilts and
/// rotates, the wheel zooms. A left press released without moving is a
/// click.
#[derive(Debug, Default)]
pub struct CameraController {
    left_down: bool,
    right_down: bool,
    dragged: bool,
    last_mouse: Option<(f64, f64)>,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Option<(f64, f64)> {
        self.last_mouse
    }

    /// Updates the camera. Returns the cursor position of a completed click.
    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut MapCamera) -> Option<(f64, f64)> {
        match event {
            WindowEvent::MouseInput { button, state, .. } => {
                let pressed = *state == ElementState::Pressed;
                match button {
                    MouseButton::Left => {
                        let click = self.left_down && !pressed && !self.dragged;
                        self.left_down = pressed;
                        if pressed {
                            self.dragged = false;
                        }
                        if click {
                            return self.last_mouse;
                        }
                    }
                    MouseButton::Right => self.right_down = pressed,
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor((position.x, position.y), camera);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y as f64,
                    MouseScrollDelta::PixelDelta(pos) => pos.y / 120.0,
                };
                camera.zoom_by(1.1_f64.powf(scroll));
            }
            _ => {}
        }
        None
    }

    fn handle_cursor(&mut self, xy: (f64, f64), camera: &mut MapCamera) {
        if let Some(last) = self.last_mouse {
            let dx = xy.0 - last.0;
            let dy = xy.1 - last.1;
            if self.left_down && (dx != 0.0 || dy != 0.0) {
                self.dragged = true;
                camera.offset -= DVec2::new(dx, dy) / camera.scale;
            }
            if self.right_down {
                camera.rotate_by(dx * 0.005);
                camera.pitch_by(-dy * 0.005);
            }
        }
        self.last_mouse = Some(xy);
    }
}
