//! Per-primitive hit testing against finalized geometry buffers.
//!
//! Every tester decodes the packed vertex layout written by the matching
//! template buffer and reports the nearest hit as a distance along the
//! world ray, so hits from different buffers and tiles compare directly.
//!
//! World space is map pixels at the current zoom for x/y (y down) and
//! metres for z. Screen space is device pixels for x/y and normalized depth
//! for z.

use crate::geometry_buffer::{names, GeometryBuffer};
use crate::quantize::{decode_extent, decode_height, unpack_line_normal, unpack_point_coord};
use crate::raycast::{intersect_aabb, intersect_ellipsoid, intersect_triangle, Ray};
use glam::{DMat4, DVec2, DVec3};

/// Visibility flag in the low bits of a packed point x coordinate.
pub const POINT_VISIBLE: u8 = 0b10;

/// Vertices per point quad.
pub const POINT_VERTICES: usize = 6;

/// Vertices per box.
pub const BOX_VERTICES: usize = 36;

/// One pick query against one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayQuery {
    pub world: Ray,
    pub screen: Ray,
    /// World -> screen.
    pub to_screen: DMat4,
    /// Screen -> world.
    pub from_screen: DMat4,
    /// World position of the tile's top-left corner.
    pub tile_origin: DVec2,
    /// World pixels per tile pixel.
    pub tile_scale: f64,
    /// Screen pixels per world pixel.
    pub map_scale: f64,
    /// World pixels per metre of height.
    pub z_meter_to_pixel: f64,
}

impl RayQuery {
    /// Tile-local pixel position (+ height in metres) to world space.
    #[inline]
    pub fn tile_to_world(&self, x: f64, y: f64, z: f64) -> DVec3 {
        DVec3::new(
            self.tile_origin.x + x * self.tile_scale,
            self.tile_origin.y + y * self.tile_scale,
            z,
        )
    }

    #[inline]
    pub fn world_to_screen(&self, p: DVec3) -> DVec3 {
        self.to_screen.project_point3(p)
    }

    /// Converts a parameter along the screen ray into one along the world ray.
    pub fn screen_t_to_world(&self, t: f64) -> f64 {
        let world = self.from_screen.project_point3(self.screen.at(t));
        let dir = self.world.direction;
        let len2 = dir.length_squared();
        if len2 == 0.0 {
            return f64::INFINITY;
        }
        (world - self.world.origin).dot(dir) / len2
    }

    /// Screen pixels to world pixels.
    #[inline]
    pub fn screen_px_to_world(&self, px: f64) -> f64 {
        px / self.map_scale
    }

    /// Screen pixels to metres of height.
    #[inline]
    pub fn screen_px_to_meters(&self, px: f64) -> f64 {
        px / (self.map_scale * self.z_meter_to_pixel)
    }
}

/// Nearest hit inside one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Parameter along the world ray.
    pub distance: f64,
    /// First vertex of the hit primitive; resolves to a feature id through
    /// [`GeometryBuffer::feature_at`].
    pub vertex: u32,
}

pub trait RayIntersect {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit>;
}

fn nearer(best: Option<Hit>, candidate: Hit) -> Option<Hit> {
    match best {
        Some(b) if b.distance <= candidate.distance => Some(b),
        _ => Some(candidate),
    }
}

fn height_at(buffer: &GeometryBuffer, vertex: usize) -> f64 {
    buffer
        .attribute(names::A_HEIGHT)
        .and_then(|a| a.component(vertex, 0))
        .map(|h| decode_height(h as u16))
        .unwrap_or(0.0)
}

fn extent_at(buffer: &GeometryBuffer, vertex: usize) -> Option<(f64, f64)> {
    let pos = buffer.attribute(names::A_POSITION)?;
    let x = pos.component(vertex, 0)?;
    let y = pos.component(vertex, 1)?;
    Some((decode_extent(x as i16), decode_extent(y as i16)))
}

/// Screen-aligned quads: an axis-aligned box in screen space around the
/// projected anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointHit;

impl RayIntersect for PointHit {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        let pos = buffer.attribute(names::A_POSITION)?;
        let size = buffer.attribute(names::A_SIZE)?;
        let mut best = None;

        for v in (0..pos.vertex_count()).step_by(POINT_VERTICES) {
            let (Some(px), Some(py)) = (pos.component(v, 0), pos.component(v, 1)) else {
                continue;
            };
            let (x, flags) = unpack_point_coord(px as i16);
            if flags & POINT_VISIBLE == 0 {
                continue;
            }
            let (y, _) = unpack_point_coord(py as i16);

            let (w, h) = match size.size {
                1 => {
                    let d = size.component(v, 0).unwrap_or(0.0) * 2.0;
                    (d, d)
                }
                _ => (
                    size.component(v, 0).unwrap_or(0.0),
                    size.component(v, 1).unwrap_or(0.0),
                ),
            };

            let anchor = query.world_to_screen(query.tile_to_world(x, y, height_at(buffer, v)));
            let half = DVec3::new(w * 0.5, h * 0.5, 0.0);
            if let Some(t) = intersect_aabb(&query.screen, anchor - half, anchor + half) {
                best = nearer(
                    best,
                    Hit {
                        distance: query.screen_t_to_world(t),
                        vertex: v as u32,
                    },
                );
            }
        }
        best
    }
}

/// Stroke ribbons: triangles rebuilt from centre line plus extrusion normal
/// at the buffer's stroke width.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineHit;

impl RayIntersect for LineHit {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        let normal = buffer.attribute(names::A_NORMAL)?;
        let half_width = buffer
            .static_f32(names::U_STROKE_WIDTH)
            .map(|w| w as f64 * 0.5)
            .unwrap_or(0.5);
        let offset = query.screen_px_to_world(half_width);

        let vertex = |v: u32| -> Option<DVec3> {
            let v = v as usize;
            let (x, y) = extent_at(buffer, v)?;
            let (nx, _) = unpack_line_normal(normal.component(v, 0)? as i16);
            let (ny, _) = unpack_line_normal(normal.component(v, 1)? as i16);
            let base = query.tile_to_world(x, y, height_at(buffer, v));
            Some(base + DVec3::new(nx * offset, ny * offset, 0.0))
        };

        triangles_hit(buffer, query, vertex)
    }
}

/// Flat or extruded polygons with extent-encoded positions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolygonHit;

impl RayIntersect for PolygonHit {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        triangles_hit(buffer, query, |v| {
            let v = v as usize;
            let (x, y) = extent_at(buffer, v)?;
            Some(query.tile_to_world(x, y, height_at(buffer, v)))
        })
    }
}

/// Meshes with float positions (tile pixels, tile pixels, metres).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TerrainModelHit;

impl RayIntersect for TerrainModelHit {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        let pos = buffer.attribute(names::A_POSITION)?;
        triangles_hit(buffer, query, |v| {
            let v = v as usize;
            Some(query.tile_to_world(
                pos.component(v, 0)?,
                pos.component(v, 1)?,
                pos.component(v, 2)?,
            ))
        })
    }
}

fn triangles_hit(
    buffer: &GeometryBuffer,
    query: &RayQuery,
    vertex: impl Fn(u32) -> Option<DVec3>,
) -> Option<Hit> {
    let mut best = None;
    buffer.for_each_triangle(|[a, b, c]| {
        let (Some(v0), Some(v1), Some(v2)) = (vertex(a), vertex(b), vertex(c)) else {
            return;
        };
        if let Some(t) = intersect_triangle(&query.world, v0, v1, v2) {
            best = nearer(
                best,
                Hit {
                    distance: t,
                    vertex: a.min(b).min(c),
                },
            );
        }
    });
    best
}

/// Screen-sized boxes standing on the map: a world-space AABB per box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoxHit;

impl RayIntersect for BoxHit {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        let size = buffer.attribute(names::A_SIZE)?;
        let count = buffer.vertex_count();
        let mut best = None;

        for v in (0..count).step_by(BOX_VERTICES) {
            let Some((x, y)) = extent_at(buffer, v) else {
                continue;
            };
            let center = query.tile_to_world(x, y, height_at(buffer, v));
            let half = DVec3::new(
                query.screen_px_to_world(size.component(v, 0).unwrap_or(0.0) * 0.5),
                query.screen_px_to_world(size.component(v, 1).unwrap_or(0.0) * 0.5),
                query.screen_px_to_meters(size.component(v, 2).unwrap_or(0.0) * 0.5),
            );
            if let Some(t) = intersect_aabb(&query.world, center - half, center + half) {
                best = nearer(
                    best,
                    Hit {
                        distance: t,
                        vertex: v as u32,
                    },
                );
            }
        }
        best
    }
}

/// Screen-sized spheres: an ellipsoid in world space, since height is in
/// metres while x/y are in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereHit {
    pub vertices_per_sphere: usize,
}

impl RayIntersect for SphereHit {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        if self.vertices_per_sphere == 0 {
            return None;
        }
        let size = buffer.attribute(names::A_SIZE)?;
        let mut best = None;

        for v in (0..buffer.vertex_count()).step_by(self.vertices_per_sphere) {
            let Some((x, y)) = extent_at(buffer, v) else {
                continue;
            };
            let radius = size.component(v, 0).unwrap_or(0.0);
            let center = query.tile_to_world(x, y, height_at(buffer, v));
            let radii = DVec3::new(
                query.screen_px_to_world(radius),
                query.screen_px_to_world(radius),
                query.screen_px_to_meters(radius),
            );
            if let Some(t) = intersect_ellipsoid(&query.world, center, radii) {
                best = nearer(
                    best,
                    Hit {
                        distance: t,
                        vertex: v as u32,
                    },
                );
            }
        }
        best
    }
}

/// Hit test selected per buffer kind at finalize time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTester {
    Point(PointHit),
    Line(LineHit),
    Polygon(PolygonHit),
    Box(BoxHit),
    Sphere(SphereHit),
    TerrainModel(TerrainModelHit),
}

impl RayIntersect for HitTester {
    fn ray_intersects(&self, buffer: &GeometryBuffer, query: &RayQuery) -> Option<Hit> {
        match self {
            HitTester::Point(h) => h.ray_intersects(buffer, query),
            HitTester::Line(h) => h.ray_intersects(buffer, query),
            HitTester::Polygon(h) => h.ray_intersects(buffer, query),
            HitTester::Box(h) => h.ray_intersects(buffer, query),
            HitTester::Sphere(h) => h.ray_intersects(buffer, query),
            HitTester::TerrainModel(h) => h.ray_intersects(buffer, query),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Top-down query: world == screen in x/y, looking along +z from z = -100
    /// with screen depth equal to world z.
    pub(crate) fn top_down(x: f64, y: f64) -> RayQuery {
        let world = Ray::new(DVec3::new(x, y, -100.0), DVec3::Z);
        RayQuery {
            world,
            screen: world,
            to_screen: DMat4::IDENTITY,
            from_screen: DMat4::IDENTITY,
            tile_origin: DVec2::ZERO,
            tile_scale: 1.0,
            map_scale: 1.0,
            z_meter_to_pixel: 1.0,
        }
    }

    #[test]
    fn screen_t_maps_back_to_world_t() {
        let q = top_down(3.0, 4.0);
        assert!((q.screen_t_to_world(42.0) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn tile_to_world_applies_origin_and_scale() {
        let mut q = top_down(0.0, 0.0);
        q.tile_origin = DVec2::new(512.0, 256.0);
        q.tile_scale = 0.5;
        assert_eq!(q.tile_to_world(10.0, 20.0, 3.0), DVec3::new(517.0, 266.0, 3.0));
    }
}
