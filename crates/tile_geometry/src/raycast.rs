//! Ray/primitive intersection.
//!
//! All functions return the ray parameter `t` of the hit (distance along
//! `direction`, in units of its length) or `None` when the ray misses.
//! A miss is an ordinary outcome and never an error.

use glam::DVec3;

/// Determinant threshold below which a ray counts as parallel to a triangle.
pub const PARALLEL_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

/// Möller–Trumbore ray/triangle test.
pub fn intersect_triangle(ray: &Ray, v0: DVec3, v1: DVec3, v2: DVec3) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);

    if det.abs() < PARALLEL_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = ray.origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    if t < 0.0 {
        None
    } else {
        Some(t)
    }
}

/// Slab test against an axis-aligned box.
///
/// Returns the entry distance, or the exit distance when the origin is inside.
pub fn intersect_aabb(ray: &Ray, min: DVec3, max: DVec3) -> Option<f64> {
    let mut tmin = f64::NEG_INFINITY;
    let mut tmax = f64::INFINITY;

    for axis in 0..3 {
        let o = ray.origin[axis];
        let d = ray.direction[axis];
        let (lo, hi) = (min[axis], max[axis]);

        if d == 0.0 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t1 = (lo - o) * inv;
        let mut t2 = (hi - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        tmin = tmin.max(t1);
        tmax = tmax.min(t2);
    }

    if tmax < 0.0 || tmin > tmax {
        return None;
    }
    Some(if tmin >= 0.0 { tmin } else { tmax })
}

/// Ray/sphere test. Prefers the front root unless it lies behind the origin.
pub fn intersect_sphere(ray: &Ray, center: DVec3, radius: f64) -> Option<f64> {
    let oc = ray.origin - center;
    let a = ray.direction.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    nearest_positive_root(a, b, c)
}

/// Ray/axis-aligned-ellipsoid test, solved in radius-scaled coordinates.
pub fn intersect_ellipsoid(ray: &Ray, center: DVec3, radii: DVec3) -> Option<f64> {
    if radii.min_element() <= 0.0 {
        return None;
    }
    let inv = radii.recip();
    let o = (ray.origin - center) * inv;
    let d = ray.direction * inv;

    let a = d.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * o.dot(d);
    let c = o.length_squared() - 1.0;
    nearest_positive_root(a, b, c)
}

fn nearest_positive_root(a: f64, b: f64, c: f64) -> Option<f64> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let t0 = (-b - sq) / (2.0 * a);
    let t1 = (-b + sq) / (2.0 * a);
    if t0 >= 0.0 {
        Some(t0)
    } else if t1 >= 0.0 {
        Some(t1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ray(o: [f64; 3], d: [f64; 3]) -> Ray {
        Ray::new(DVec3::from(o), DVec3::from(d))
    }

    #[test]
    fn aabb_hit_distance() {
        let r = ray([0.0, 0.0, -10.0], [0.0, 0.0, 1.0]);
        let t = intersect_aabb(&r, DVec3::splat(-1.0), DVec3::splat(1.0));
        assert_eq!(t, Some(9.0));
    }

    #[test]
    fn aabb_miss() {
        let r = ray([0.0, 0.0, -10.0], [1.0, 0.0, 0.0]);
        assert_eq!(intersect_aabb(&r, DVec3::splat(-1.0), DVec3::splat(1.0)), None);
    }

    #[test]
    fn aabb_behind_origin_misses() {
        let r = ray([0.0, 0.0, 10.0], [0.0, 0.0, 1.0]);
        assert_eq!(intersect_aabb(&r, DVec3::splat(-1.0), DVec3::splat(1.0)), None);
    }

    #[test]
    fn aabb_from_inside_returns_exit() {
        let r = ray([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        assert_eq!(intersect_aabb(&r, DVec3::splat(-1.0), DVec3::splat(1.0)), Some(1.0));
    }

    #[test]
    fn triangle_hit_distance() {
        let r = ray([0.0, 0.0, -1.0], [0.0, 0.0, 1.0]);
        let t = intersect_triangle(
            &r,
            DVec3::new(-1.0, -1.0, 0.0),
            DVec3::new(1.0, -1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        );
        assert!((t.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn triangle_parallel_ray_misses() {
        let r = ray([0.0, 0.0, -1.0], [1.0, 0.0, 0.0]);
        let t = intersect_triangle(
            &r,
            DVec3::new(-1.0, -1.0, 0.0),
            DVec3::new(1.0, -1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        );
        assert_eq!(t, None);
    }

    #[test]
    fn triangle_outside_misses() {
        let r = ray([5.0, 5.0, -1.0], [0.0, 0.0, 1.0]);
        let t = intersect_triangle(
            &r,
            DVec3::new(-1.0, -1.0, 0.0),
            DVec3::new(1.0, -1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        );
        assert_eq!(t, None);
    }

    #[test]
    fn sphere_front_root() {
        let r = ray([0.0, 0.0, -5.0], [0.0, 0.0, 1.0]);
        let t = intersect_sphere(&r, DVec3::ZERO, 1.0).unwrap();
        assert!((t - 4.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_origin_inside_uses_back_root() {
        let r = ray([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        let t = intersect_sphere(&r, DVec3::ZERO, 2.0).unwrap();
        assert!((t - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sphere_negative_discriminant_misses() {
        let r = ray([3.0, 0.0, -5.0], [0.0, 0.0, 1.0]);
        assert_eq!(intersect_sphere(&r, DVec3::ZERO, 1.0), None);
    }

    #[test]
    fn ellipsoid_uses_scaled_radii() {
        let r = ray([0.0, 0.0, -10.0], [0.0, 0.0, 1.0]);
        let t = intersect_ellipsoid(&r, DVec3::ZERO, DVec3::new(1.0, 1.0, 3.0)).unwrap();
        assert!((t - 7.0).abs() < 1e-9);

        let side = ray([2.0, 0.0, -10.0], [0.0, 0.0, 1.0]);
        assert_eq!(
            intersect_ellipsoid(&side, DVec3::ZERO, DVec3::new(1.0, 1.0, 3.0)),
            None
        );
    }
}
