//! Picking: nearest hit across tiles and layers for one screen position.

use crate::view::View;
use glam::{DMat4, DVec2, DVec3};
use tile_geometry::{BufferKind, FeatureId, GeometryBuffer, Ray, RayQuery};

/// Best hit found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Parameter along the world ray.
    pub distance: f64,
    pub feature: Option<FeatureId>,
    pub layer: Option<usize>,
    /// Hit position in world space.
    pub position: DVec3,
}

/// One pick operation. Call [`Raycaster::init`], then
/// [`Raycaster::intersect`] for every candidate buffer, then read
/// [`Raycaster::get_intersection_top`].
#[derive(Debug, Clone)]
pub struct Raycaster {
    world: Ray,
    screen: Ray,
    to_screen: DMat4,
    from_screen: DMat4,
    map_scale: f64,
    z_meter_to_pixel: f64,
    best: Option<Intersection>,
}

impl Default for Raycaster {
    fn default() -> Self {
        Self {
            world: Ray::new(DVec3::ZERO, DVec3::Z),
            screen: Ray::new(DVec3::ZERO, DVec3::Z),
            to_screen: DMat4::IDENTITY,
            from_screen: DMat4::IDENTITY,
            map_scale: 1.0,
            z_meter_to_pixel: 1.0,
            best: None,
        }
    }
}

impl Raycaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a pick at a screen pixel. `z_scale` exaggerates heights the
    /// same way the draw programs do.
    pub fn init(&mut self, view: &View, screen_x: f64, screen_y: f64, z_scale: f64) {
        let near = view.unproject(screen_x, screen_y, 0.0);
        let far = view.unproject(screen_x, screen_y, 1.0);
        let direction = (far - near).normalize_or_zero();
        self.world = Ray::new(near, direction);

        let origin = view.project(near);
        let ahead = view.project(near + direction);
        self.screen = Ray::new(origin, (ahead - origin).normalize_or_zero());

        self.to_screen = view.screen;
        self.from_screen = view.inverse_screen;
        self.map_scale = view.scale;
        self.z_meter_to_pixel = view.z_meter_to_pixel * z_scale;
        self.best = None;
    }

    pub fn world_ray(&self) -> &Ray {
        &self.world
    }

    pub fn screen_ray(&self) -> &Ray {
        &self.screen
    }

    /// Tests one tile buffer. `tile_x`/`tile_y` is the tile's world
    /// position and `tile_scale` its world pixels per tile pixel. Returns
    /// the hit distance within this buffer, whether or not it beat the
    /// running best.
    pub fn intersect(
        &mut self,
        tile_x: f64,
        tile_y: f64,
        tile_scale: f64,
        buffer: &GeometryBuffer,
        layer: Option<usize>,
    ) -> Option<f64> {
        if buffer.kind == BufferKind::Image || !buffer.pointer_events {
            return None;
        }
        let query = RayQuery {
            world: self.world,
            screen: self.screen,
            to_screen: self.to_screen,
            from_screen: self.from_screen,
            tile_origin: DVec2::new(tile_x, tile_y),
            tile_scale,
            map_scale: self.map_scale,
            z_meter_to_pixel: self.z_meter_to_pixel,
        };
        let hit = buffer.ray_intersects(&query)?;
        if self.best.map_or(true, |best| hit.distance < best.distance) {
            self.best = Some(Intersection {
                distance: hit.distance,
                feature: buffer.feature_at(hit.vertex),
                layer,
                position: self.world.at(hit.distance),
            });
        }
        Some(hit.distance)
    }

    pub fn get_intersection_top(&self) -> Option<&Intersection> {
        self.best.as_ref()
    }

    pub fn reset(&mut self) {
        self.best = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_geometry::template::ModelBuffer;
    use tile_geometry::TemplateBuffer;

    fn plate(id: FeatureId, height: f32) -> GeometryBuffer {
        let mut model = ModelBuffer::new();
        model.set_id_offset(id);
        model.add_mesh(
            &[[0.0, 0.0, height], [256.0, 0.0, height], [256.0, 256.0, height], [0.0, 256.0, height]],
            Some(&[0, 1, 2, 0, 2, 3]),
        );
        model.finalize().unwrap()
    }

    #[test]
    fn ray_points_into_the_screen() {
        let view = View::new(256, 256, 1.0, 0.0, 0.0, 1.0);
        let mut caster = Raycaster::new();
        caster.init(&view, 128.0, 128.0, 1.0);
        let ray = caster.world_ray();
        assert!((ray.origin.x - 128.0).abs() < 1e-6);
        assert!((ray.origin.y - 128.0).abs() < 1e-6);
        // Heights grow toward the camera, so the ray descends.
        assert!(ray.direction.z < 0.0);
        assert!(caster.screen_ray().direction.z > 0.0);
    }

    #[test]
    fn higher_surface_wins() {
        let view = View::new(256, 256, 1.0, 0.0, 0.0, 1.0);
        let mut caster = Raycaster::new();
        caster.init(&view, 100.0, 60.0, 1.0);
        let low = plate(1, 10.0);
        let high = plate(2, 40.0);
        caster.intersect(0.0, 0.0, 1.0, &low, Some(0));
        caster.intersect(0.0, 0.0, 1.0, &high, Some(1));
        let top = caster.get_intersection_top().unwrap();
        assert_eq!(top.feature, Some(2));
        assert_eq!(top.layer, Some(1));
        assert!((top.position.z - 40.0).abs() < 1e-3, "{}", top.position);
    }

    #[test]
    fn skips_images_and_opted_out_buffers() {
        let view = View::new(256, 256, 1.0, 0.0, 0.0, 1.0);
        let mut caster = Raycaster::new();
        caster.init(&view, 100.0, 100.0, 1.0);
        let mut silent = plate(1, 0.0);
        silent.pointer_events = false;
        assert!(caster.intersect(0.0, 0.0, 1.0, &silent, None).is_none());
        let mut image = plate(1, 0.0);
        image.kind = BufferKind::Image;
        assert!(caster.intersect(0.0, 0.0, 1.0, &image, None).is_none());
        assert!(caster.get_intersection_top().is_none());
    }

    #[test]
    fn reset_clears_the_best_hit() {
        let view = View::new(256, 256, 1.0, 0.0, 0.0, 1.0);
        let mut caster = Raycaster::new();
        caster.init(&view, 10.0, 10.0, 1.0);
        assert!(caster.intersect(0.0, 0.0, 1.0, &plate(3, 0.0), None).is_some());
        caster.reset();
        assert!(caster.get_intersection_top().is_none());
    }
}
