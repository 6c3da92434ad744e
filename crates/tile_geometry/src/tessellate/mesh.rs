//! Fixed-topology box and sphere meshes.
//!
//! Both are instanced by repetition: every vertex carries the instance
//! centre (extent units + quantized height), a unit-mesh offset in `a_point`
//! and its normal. The draw program scales `a_point` by the screen-pixel size.

use crate::flex::{FlexArray, FlexAttribute};
use crate::geometry_buffer::compute_normals;
use crate::hit::BOX_VERTICES;
use crate::quantize::{encode_extent, encode_height, NORMAL_SCALE};
use std::f64::consts::PI;

/// Unit cube corners (`±1`) and face normals (`±127`), two counter-clockwise
/// triangles per face.
pub fn box_vertices() -> [([i8; 3], [i8; 3]); BOX_VERTICES] {
    let mut out = [([0i8; 3], [0i8; 3]); BOX_VERTICES];
    let mut i = 0;
    for axis in 0..3 {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        for sign in [1i8, -1] {
            let mut normal = [0i8; 3];
            normal[axis] = sign * 127;

            // Quad corners in (u, v). Swapping the order for the negative face
            // keeps the winding counter-clockwise seen from outside.
            let mut quad = [(-1i8, -1i8), (1, -1), (1, 1), (-1, 1)];
            if sign < 0 {
                quad.reverse();
            }
            for k in [0, 1, 2, 0, 2, 3] {
                let mut corner = [0i8; 3];
                corner[axis] = sign;
                corner[u] = quad[k].0;
                corner[v] = quad[k].1;
                out[i] = (corner, normal);
                i += 1;
            }
        }
    }
    out
}

/// Growable box attributes.
#[derive(Debug, Clone)]
pub struct BoxVertices {
    pub position: FlexAttribute<i16>,
    pub height: FlexAttribute<u16>,
    pub point: FlexAttribute<i8>,
    pub normal: FlexAttribute<i8>,
    /// Width, height, depth in screen pixels.
    pub size: FlexAttribute<u16>,
    corners: [([i8; 3], [i8; 3]); BOX_VERTICES],
}

impl Default for BoxVertices {
    fn default() -> Self {
        Self {
            position: FlexAttribute::new(2),
            height: FlexAttribute::new(1),
            point: FlexAttribute::new(3),
            normal: FlexAttribute::normalized(3),
            size: FlexAttribute::new(3),
            corners: box_vertices(),
        }
    }
}

impl BoxVertices {
    pub fn vertex_count(&self) -> usize {
        self.position.vertex_count()
    }
}

/// Appends one box centred at `(x, y)` tile pixels, `z` metres.
pub fn add_box(out: &mut BoxVertices, x: f64, y: f64, z: f64, size: [f64; 3]) {
    let pos = [encode_extent(x), encode_extent(y)];
    let height = encode_height(z);
    let size = size.map(|s| s.round().clamp(0.0, u16::MAX as f64) as u16);
    for (corner, normal) in out.corners {
        out.position.push_vertex(&pos);
        out.height.push(height);
        out.point.push_vertex(&corner);
        out.normal.push_vertex(&normal);
        out.size.push_vertex(&size);
    }
}

/// Unit UV sphere with smooth normals. Poles are single vertices closed by a
/// triangle fan.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereMesh {
    /// Unit vertex offsets scaled by 127.
    pub points: Vec<[i8; 3]>,
    pub normals: Vec<[i8; 3]>,
    pub indices: Vec<u32>,
}

impl Default for SphereMesh {
    fn default() -> Self {
        Self::new(8, 12)
    }
}

impl SphereMesh {
    /// `rings` latitude bands (>= 2), `sectors` longitude slices (>= 3).
    pub fn new(rings: usize, sectors: usize) -> Self {
        let rings = rings.max(2);
        let sectors = sectors.max(3);

        let mut vertices: Vec<f32> = Vec::with_capacity((2 + (rings - 1) * sectors) * 3);
        vertices.extend_from_slice(&[0.0, 0.0, 1.0]);
        for r in 1..rings {
            let phi = r as f64 * PI / rings as f64;
            let (ring_radius, z) = (phi.sin(), phi.cos());
            for s in 0..sectors {
                let theta = s as f64 * 2.0 * PI / sectors as f64;
                vertices.extend_from_slice(&[
                    (ring_radius * theta.cos()) as f32,
                    (ring_radius * theta.sin()) as f32,
                    z as f32,
                ]);
            }
        }
        vertices.extend_from_slice(&[0.0, 0.0, -1.0]);

        let top = 0u32;
        let bottom = (vertices.len() / 3 - 1) as u32;
        let at = |r: usize, s: usize| (1 + r * sectors + s % sectors) as u32;

        let mut indices = Vec::with_capacity(sectors * 6 * (rings - 1));
        for s in 0..sectors {
            indices.extend_from_slice(&[top, at(0, s), at(0, s + 1)]);
        }
        for r in 0..rings - 2 {
            for s in 0..sectors {
                let (a, b, c, d) = (at(r, s), at(r + 1, s), at(r + 1, s + 1), at(r, s + 1));
                indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        for s in 0..sectors {
            indices.extend_from_slice(&[bottom, at(rings - 2, s + 1), at(rings - 2, s)]);
        }

        let normals = compute_normals(&vertices, Some(&indices))
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect();
        let points = vertices
            .chunks_exact(3)
            .map(|p| {
                let q = |c: f32| (c as f64 * NORMAL_SCALE).round() as i8;
                [q(p[0]), q(p[1]), q(p[2])]
            })
            .collect();

        Self { points, normals, indices }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }
}

/// Growable sphere attributes plus the expanded index list.
#[derive(Debug, Clone)]
pub struct SphereVertices {
    pub position: FlexAttribute<i16>,
    pub height: FlexAttribute<u16>,
    pub point: FlexAttribute<i8>,
    pub normal: FlexAttribute<i8>,
    /// Radius in screen pixels.
    pub size: FlexAttribute<u16>,
    pub index: FlexArray<u32>,
}

impl Default for SphereVertices {
    fn default() -> Self {
        Self {
            position: FlexAttribute::new(2),
            height: FlexAttribute::new(1),
            point: FlexAttribute::normalized(3),
            normal: FlexAttribute::normalized(3),
            size: FlexAttribute::new(1),
            index: FlexArray::new(),
        }
    }
}

impl SphereVertices {
    pub fn vertex_count(&self) -> usize {
        self.position.vertex_count()
    }
}

/// Appends one instance of `mesh` centred at `(x, y)` tile pixels, `z`
/// metres, with a screen-pixel `radius`.
pub fn add_sphere(out: &mut SphereVertices, mesh: &SphereMesh, x: f64, y: f64, z: f64, radius: f64) {
    let base = out.vertex_count() as u32;
    let pos = [encode_extent(x), encode_extent(y)];
    let height = encode_height(z);
    let radius = radius.round().clamp(0.0, u16::MAX as f64) as u16;

    for (point, normal) in mesh.points.iter().zip(&mesh.normals) {
        out.position.push_vertex(&pos);
        out.height.push(height);
        out.point.push_vertex(point);
        out.normal.push_vertex(normal);
        out.size.push(radius);
    }
    for &i in &mesh.indices {
        out.index.push(base + i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    }

    #[test]
    fn box_faces_wind_outwards() {
        let verts = box_vertices();
        for tri in verts.chunks_exact(3) {
            let p: Vec<[f64; 3]> = tri.iter().map(|(c, _)| c.map(|x| x as f64)).collect();
            let e1 = [p[1][0] - p[0][0], p[1][1] - p[0][1], p[1][2] - p[0][2]];
            let e2 = [p[2][0] - p[0][0], p[2][1] - p[0][1], p[2][2] - p[0][2]];
            let n = cross(e1, e2);
            let face = tri[0].1.map(|x| x as f64);
            let dot = n[0] * face[0] + n[1] * face[1] + n[2] * face[2];
            assert!(dot > 0.0, "{tri:?}");
            // All three corners lie on the face plane.
            assert!(tri.iter().all(|(_, normal)| *normal == tri[0].1));
        }
    }

    #[test]
    fn box_emits_36_vertices() {
        let mut out = BoxVertices::default();
        add_box(&mut out, 10.0, 20.0, 5.0, [8.0, 8.0, 16.0]);
        assert_eq!(out.vertex_count(), 36);
        assert_eq!(&out.size.data.as_slice()[..3], &[8, 8, 16]);
    }

    #[test]
    fn sphere_topology() {
        let mesh = SphereMesh::new(4, 6);
        assert_eq!(mesh.vertex_count(), 2 + 3 * 6);
        assert_eq!(mesh.indices.len(), 6 * 3 * 2 + 2 * 6 * 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
    }

    #[test]
    fn sphere_normals_point_outwards() {
        let mesh = SphereMesh::default();
        for (p, n) in mesh.points.iter().zip(&mesh.normals) {
            let dot: i32 = (0..3).map(|i| p[i] as i32 * n[i] as i32).sum();
            assert!(dot > 0, "{p:?} {n:?}");
        }
        assert_eq!(mesh.normals[0], [0, 0, 127]);
    }

    #[test]
    fn sphere_instances_offset_indices() {
        let mesh = SphereMesh::new(3, 4);
        let mut out = SphereVertices::default();
        add_sphere(&mut out, &mesh, 0.0, 0.0, 0.0, 10.0);
        add_sphere(&mut out, &mesh, 5.0, 5.0, 0.0, 10.0);
        let n = mesh.vertex_count() as u32;
        assert_eq!(out.vertex_count(), 2 * n as usize);
        let index = out.index.as_slice();
        assert_eq!(index[mesh.indices.len()], mesh.indices[0] + n);
    }
}
