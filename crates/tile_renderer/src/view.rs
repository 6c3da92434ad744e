//! View and projection setup.
//!
//! World space is map pixels at the current zoom, origin at the top-left of
//! the viewport, y down; z is metres above ground. Screen space is device
//! pixels (origin top-left) with normalized depth in `0..=1`.

use crate::gpu::ScissorRect;
use glam::{DMat4, DVec3, DVec4};
use std::f64::consts::PI;

pub const FIELD_OF_VIEW: f64 = PI / 4.0;

/// Near plane as a fraction of the camera depth of the nearest visible
/// ground point. Leaves room for content rising toward the camera.
pub const NEAR_FRACTION: f64 = 0.01;

/// Far plane inflation against horizon clipping.
const FAR_SAFETY: f64 = 1.005;

/// Steepest ray angle to the ground normal used for the far plane.
const MAX_RAY_ANGLE: f64 = 89.5 * PI / 180.0;

/// Highest valid z-index.
pub const MAX_Z_INDEX: u32 = 65535;

/// Depth value for a z-index; higher z-index means nearer to the camera.
pub fn depth_from_z_index(z_index: u32) -> f32 {
    let z = z_index.min(MAX_Z_INDEX);
    ((MAX_Z_INDEX - z) as f64 / 65536.0) as f32
}

/// Per-frame camera state built by [`View::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub width: f64,
    pub height: f64,
    /// Screen pixels per world pixel.
    pub scale: f64,
    /// Pitch in radians.
    pub rot_x: f64,
    /// Map rotation in radians.
    pub rot_z: f64,
    /// Metres per world pixel.
    pub ground_resolution: f64,
    /// World pixels per metre.
    pub z_meter_to_pixel: f64,
    /// Camera distance to the viewport centre.
    pub target_z: f64,
    pub near: f64,
    pub far: f64,
    pub view: DMat4,
    pub projection: DMat4,
    /// World -> clip.
    pub matrix: DMat4,
    pub inverse: DMat4,
    /// World -> screen pixels.
    pub screen: DMat4,
    pub inverse_screen: DMat4,
    /// Screen pixels -> clip, for content that ignores the map transform.
    pub fixed_view: DMat4,
}

impl View {
    pub fn new(width: u32, height: u32, scale: f64, rot_x: f64, rot_z: f64, ground_resolution: f64) -> Self {
        let width = width.max(1) as f64;
        let height = height.max(1) as f64;
        let ground_resolution = if ground_resolution > 0.0 { ground_resolution } else { 1.0 };
        let z_meter_to_pixel = 1.0 / ground_resolution;

        let half_fov = FIELD_OF_VIEW / 2.0;
        let target_z = (height / 2.0) / half_fov.tan();

        // Ground plane distance along its normal, then the top and bottom
        // edge rays.
        let ground_distance = target_z * rot_x.cos();
        let top_ray = (rot_x.abs() + half_fov).min(MAX_RAY_ANGLE);
        let far = ground_distance / top_ray.cos() * half_fov.cos() * FAR_SAFETY;
        let far = far.max(target_z * FAR_SAFETY);
        let bottom_ray = rot_x.abs() - half_fov;
        let near = ground_distance / bottom_ray.cos() * half_fov.cos() * NEAR_FRACTION;

        let projection = DMat4::perspective_rh(FIELD_OF_VIEW, width / height, near, far);
        let camera = DMat4::look_at_rh(
            DVec3::new(0.0, 0.0, -target_z),
            DVec3::ZERO,
            DVec3::new(0.0, -1.0, 0.0),
        );
        let center = DVec3::new(width / 2.0, height / 2.0, 0.0);
        let view = camera
            * DMat4::from_rotation_x(-rot_x)
            * DMat4::from_rotation_z(rot_z)
            * DMat4::from_scale(DVec3::new(scale, scale, -scale * z_meter_to_pixel))
            * DMat4::from_translation(-center);

        let matrix = projection * view;
        let to_screen = DMat4::from_translation(DVec3::new(width / 2.0, height / 2.0, 0.0))
            * DMat4::from_scale(DVec3::new(width / 2.0, -height / 2.0, 1.0));
        let screen = to_screen * matrix;
        let fixed_view = DMat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0);

        log::debug!(
            "init view {width}x{height} scale {scale} pitch {rot_x:.3} rotation {rot_z:.3} near {near} far {far:.1}"
        );

        Self {
            width,
            height,
            scale,
            rot_x,
            rot_z,
            ground_resolution,
            z_meter_to_pixel,
            target_z,
            near,
            far,
            view,
            projection,
            matrix,
            inverse: matrix.inverse(),
            screen,
            inverse_screen: screen.inverse(),
            fixed_view,
        }
    }

    /// World -> screen pixels plus normalized depth.
    pub fn project(&self, p: DVec3) -> DVec3 {
        self.screen.project_point3(p)
    }

    /// Screen pixels plus normalized depth -> world.
    pub fn unproject(&self, x: f64, y: f64, depth: f64) -> DVec3 {
        self.inverse_screen.project_point3(DVec3::new(x, y, depth))
    }

    /// World -> homogeneous clip coordinates.
    pub fn clip(&self, p: DVec3) -> DVec4 {
        self.matrix * p.extend(1.0)
    }

    /// Screen-space bounds of a world-space square at ground level.
    /// Above `max_scale`, or when a corner falls behind the camera, the
    /// whole canvas is returned.
    pub fn scissor(&self, x: f64, y: f64, size: f64, max_scale: f64) -> ScissorRect {
        let full = ScissorRect {
            x: 0,
            y: 0,
            width: self.width as u32,
            height: self.height as u32,
        };
        if self.scale > max_scale {
            return full;
        }
        let corners = [
            DVec3::new(x, y, 0.0),
            DVec3::new(x + size, y, 0.0),
            DVec3::new(x + size, y + size, 0.0),
            DVec3::new(x, y + size, 0.0),
        ];
        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for corner in corners {
            if self.clip(corner).w <= 0.0 {
                return full;
            }
            let p = self.project(corner);
            min = min.min(p);
            max = max.max(p);
        }
        let x0 = min.x.round().clamp(0.0, self.width);
        let y0 = min.y.round().clamp(0.0, self.height);
        let x1 = max.x.round().clamp(0.0, self.width);
        let y1 = max.y.round().clamp(0.0, self.height);
        ScissorRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0).max(0.0) as u32,
            height: (y1 - y0).max(0.0) as u32,
        }
    }
}

/// f64 matrix to column-major f32 uniform data.
pub fn to_uniform(m: &DMat4) -> [f32; 16] {
    m.as_mat4().to_cols_array()
}

/// Preview transform cache keyed by `(translate x, translate y, scale)`.
/// Consecutive preview draws usually share one transform.
#[derive(Debug, Default, Clone)]
pub struct PreviewCache {
    entry: Option<([u64; 3], DMat4)>,
    computed: usize,
}

impl PreviewCache {
    pub fn matrix(&mut self, view: &View, tx: f64, ty: f64, scale: f64) -> DMat4 {
        let key = [tx.to_bits(), ty.to_bits(), scale.to_bits()];
        if let Some((cached, m)) = self.entry {
            if cached == key {
                return m;
            }
        }
        let m = view.matrix
            * DMat4::from_translation(DVec3::new(tx, ty, 0.0))
            * DMat4::from_scale(DVec3::new(scale, scale, 1.0));
        self.entry = Some((key, m));
        self.computed += 1;
        m
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Matrices computed since construction.
    pub fn computed(&self) -> usize {
        self.computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: DVec3, b: DVec3) -> bool {
        (a - b).length() < 1e-6
    }

    #[test]
    fn flat_view_maps_world_to_pixels() {
        let view = View::new(800, 600, 1.0, 0.0, 0.0, 1.0);
        let origin = view.project(DVec3::ZERO);
        assert!(close(origin.truncate().extend(0.0), DVec3::ZERO), "{origin}");
        let corner = view.project(DVec3::new(800.0, 600.0, 0.0));
        assert!((corner.x - 800.0).abs() < 1e-6 && (corner.y - 600.0).abs() < 1e-6);
        let center = view.project(DVec3::new(400.0, 300.0, 0.0));
        assert!((center.x - 400.0).abs() < 1e-6 && (center.y - 300.0).abs() < 1e-6);
    }

    #[test]
    fn scale_zooms_around_center() {
        let view = View::new(800, 600, 2.0, 0.0, 0.0, 1.0);
        let p = view.project(DVec3::new(500.0, 300.0, 0.0));
        assert!((p.x - 600.0).abs() < 1e-6, "{p}");
        assert!((p.y - 300.0).abs() < 1e-6);
    }

    #[test]
    fn heights_move_toward_camera() {
        let view = View::new(800, 600, 1.0, 0.0, 0.0, 2.0);
        let ground = view.project(DVec3::new(100.0, 100.0, 0.0));
        let raised = view.project(DVec3::new(100.0, 100.0, 50.0));
        assert!(raised.z < ground.z);
        assert!((view.z_meter_to_pixel - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ground_stays_inside_clip_range_at_any_pitch() {
        for deg in [0.0_f64, 15.0, 30.0, 45.0, 60.0] {
            let view = View::new(1024, 768, 1.0, deg.to_radians(), 0.3, 1.0);
            for x in [0.0, 512.0, 1024.0] {
                for y in [0.0, 384.0, 768.0] {
                    let p = view.project(DVec3::new(x, y, 0.0));
                    assert!((0.0..=1.0).contains(&p.z), "pitch {deg} ({x},{y}) depth {}", p.z);
                }
            }
        }
    }

    #[test]
    fn near_plane_follows_the_closest_ground_point() {
        let flat = View::new(1024, 768, 1.0, 0.0, 0.0, 1.0);
        assert!((flat.near - flat.target_z * NEAR_FRACTION).abs() < 1e-9);
        assert!(flat.near < flat.far);

        let taller = View::new(1024, 1536, 1.0, 0.0, 0.0, 1.0);
        assert!((taller.near / flat.near - 2.0).abs() < 1e-9);

        let pitched = View::new(1024, 768, 1.0, 60f64.to_radians(), 0.0, 1.0);
        assert!(pitched.near < flat.near);
        assert!(pitched.near > 0.0);

        // Content rising most of the way to the camera is still in range.
        let tall = flat.project(DVec3::new(512.0, 384.0, flat.target_z * 0.9));
        assert!((0.0..=1.0).contains(&tall.z), "{}", tall.z);
    }

    #[test]
    fn unproject_inverts_project() {
        let view = View::new(640, 480, 1.5, 0.5, 1.0, 1.0);
        let world = DVec3::new(123.0, 222.0, 0.0);
        let s = view.project(world);
        assert!(close(view.unproject(s.x, s.y, s.z), world));
    }

    #[test]
    fn depth_decreases_with_z_index() {
        let mut prev = depth_from_z_index(0);
        assert!((prev - 65535.0 / 65536.0).abs() < 1e-7);
        for z in (1..=MAX_Z_INDEX).step_by(97).chain([MAX_Z_INDEX]) {
            let d = depth_from_z_index(z);
            assert!(d < prev, "z {z}");
            prev = d;
        }
        assert_eq!(depth_from_z_index(MAX_Z_INDEX), 0.0);
        assert_eq!(depth_from_z_index(u32::MAX), 0.0);
    }

    #[test]
    fn scissor_covers_tile_footprint() {
        let view = View::new(800, 600, 1.0, 0.0, 0.0, 1.0);
        let rect = view.scissor(100.0, 50.0, 256.0, 4.0);
        assert_eq!(
            rect,
            ScissorRect {
                x: 100,
                y: 50,
                width: 256,
                height: 256
            }
        );
    }

    #[test]
    fn scissor_clamps_and_widens() {
        let view = View::new(800, 600, 1.0, 0.0, 0.0, 1.0);
        let rect = view.scissor(700.0, -100.0, 256.0, 4.0);
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (700, 0, 100, 156));

        let zoomed = View::new(800, 600, 5.0, 0.0, 0.0, 1.0);
        let rect = zoomed.scissor(0.0, 0.0, 16.0, 4.0);
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (0, 0, 800, 600));
    }

    #[test]
    fn rotated_scissor_contains_corners() {
        let view = View::new(800, 600, 1.0, 0.0, PI / 4.0, 1.0);
        let rect = view.scissor(300.0, 200.0, 100.0, 4.0);
        let diagonal = 100.0 * 2f64.sqrt();
        assert!((rect.width as f64 - diagonal).abs() <= 1.0, "{rect:?}");
        assert!((rect.height as f64 - diagonal).abs() <= 1.0);
    }

    #[test]
    fn preview_cache_reuses_matrix() {
        let view = View::new(256, 256, 1.0, 0.0, 0.0, 1.0);
        let mut cache = PreviewCache::default();
        let a = cache.matrix(&view, 10.0, 20.0, 0.5);
        let b = cache.matrix(&view, 10.0, 20.0, 0.5);
        assert_eq!(a, b);
        assert_eq!(cache.computed(), 1);
        cache.matrix(&view, 10.0, 20.0, 2.0);
        assert_eq!(cache.computed(), 2);
        cache.invalidate();
        cache.matrix(&view, 10.0, 20.0, 2.0);
        assert_eq!(cache.computed(), 3);
    }
}
