//! Polygon fill and extrusion.

use crate::flex::{FlexArray, FlexAttribute};
use crate::geometry_buffer::compute_normals;
use crate::quantize::{encode_extent, encode_height};
use glam::DVec2;
use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};

/// Fill triangulation of `rings` (outer ring first, then holes) in tile
/// pixels. Returns `None` for degenerate input or when tessellation fails.
pub fn triangulate(rings: &[Vec<DVec2>]) -> Option<(Vec<DVec2>, Vec<u32>)> {
    let mut builder = Path::builder();
    let mut any = false;
    for ring in rings {
        let ring = open_ring(ring);
        if ring.len() < 3 {
            continue;
        }
        builder.begin(point(ring[0].x as f32, ring[0].y as f32));
        for p in &ring[1..] {
            builder.line_to(point(p.x as f32, p.y as f32));
        }
        builder.close();
        any = true;
    }
    if !any {
        return None;
    }
    let path = builder.build();

    let mut geometry: VertexBuffers<DVec2, u32> = VertexBuffers::new();
    let mut tessellator = FillTessellator::new();
    let result = tessellator.tessellate_path(
        &path,
        &FillOptions::default(),
        &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
            DVec2::new(vertex.position().x as f64, vertex.position().y as f64)
        }),
    );
    if let Err(err) = result {
        log::debug!("polygon tessellation failed: {err:?}");
        return None;
    }
    if geometry.indices.is_empty() {
        return None;
    }
    Some((geometry.vertices, geometry.indices))
}

/// Drops consecutive duplicates and the closing point of a closed ring.
fn open_ring(ring: &[DVec2]) -> Vec<DVec2> {
    let mut out: Vec<DVec2> = Vec::with_capacity(ring.len());
    for &p in ring {
        if p.is_finite() && out.last() != Some(&p) {
            out.push(p);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Shoelace area; positive for counter-clockwise rings in x-right/y-up terms.
pub fn signed_area(ring: &[DVec2]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    (0..n)
        .map(|i| ring[i].perp_dot(ring[(i + 1) % n]))
        .sum::<f64>()
        * 0.5
}

/// Growable flat-polygon attributes.
#[derive(Debug, Clone)]
pub struct PolygonVertices {
    pub position: FlexAttribute<i16>,
    pub height: Option<FlexAttribute<u16>>,
    pub index: FlexArray<u32>,
}

impl PolygonVertices {
    pub fn new(is_3d: bool) -> Self {
        Self {
            position: FlexAttribute::new(2),
            height: is_3d.then(|| FlexAttribute::new(1)),
            index: FlexArray::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.position.vertex_count()
    }
}

/// Fills a polygon at `height` metres. Returns the number of vertices added.
pub fn add_polygon(out: &mut PolygonVertices, rings: &[Vec<DVec2>], height: f64) -> usize {
    let Some((vertices, indices)) = triangulate(rings) else {
        return 0;
    };
    let base = out.vertex_count() as u32;
    let packed_height = encode_height(height);
    for v in &vertices {
        out.position.push_vertex(&[encode_extent(v.x), encode_extent(v.y)]);
        if let Some(h) = out.height.as_mut() {
            h.push(packed_height);
        }
    }
    for i in indices {
        out.index.push(base + i);
    }
    vertices.len()
}

/// Growable extrusion attributes. Non-indexed so every face keeps its own
/// flat normal.
#[derive(Debug, Clone)]
pub struct ExtrudeVertices {
    pub position: FlexAttribute<i16>,
    pub height: FlexAttribute<u16>,
    pub normal: FlexAttribute<i8>,
}

impl Default for ExtrudeVertices {
    fn default() -> Self {
        Self {
            position: FlexAttribute::new(2),
            height: FlexAttribute::new(1),
            normal: FlexAttribute::normalized(3),
        }
    }
}

impl ExtrudeVertices {
    pub fn vertex_count(&self) -> usize {
        self.position.vertex_count()
    }
}

/// Extrudes a polygon from `base` to `top` metres: roof triangles plus one
/// wall quad per ring edge, all facing outwards. Returns the number of
/// vertices added.
pub fn add_extrude(out: &mut ExtrudeVertices, rings: &[Vec<DVec2>], base: f64, top: f64) -> usize {
    let (base, top) = if base > top { (top, base) } else { (base, top) };
    let mut tris: Vec<[f32; 3]> = Vec::new();

    if let Some((vertices, indices)) = triangulate(rings) {
        for t in indices.chunks_exact(3) {
            let (a, mut b, mut c) = (
                vertices[t[0] as usize],
                vertices[t[1] as usize],
                vertices[t[2] as usize],
            );
            // Roof faces up (+z).
            if (b - a).perp_dot(c - a) < 0.0 {
                std::mem::swap(&mut b, &mut c);
            }
            for p in [a, b, c] {
                tris.push([p.x as f32, p.y as f32, top as f32]);
            }
        }
    }

    if top > base {
        for (i, ring) in rings.iter().enumerate() {
            let ring = open_ring(ring);
            if ring.len() < 3 {
                continue;
            }
            let is_hole = i > 0;
            // Walls face away from the solid: right of the edge for outer
            // rings wound counter-clockwise, left for holes.
            let face_right = (signed_area(&ring) > 0.0) != is_hole;

            for k in 0..ring.len() {
                let (a, b) = (ring[k], ring[(k + 1) % ring.len()]);
                let a0 = [a.x as f32, a.y as f32, base as f32];
                let b0 = [b.x as f32, b.y as f32, base as f32];
                let a1 = [a.x as f32, a.y as f32, top as f32];
                let b1 = [b.x as f32, b.y as f32, top as f32];
                if face_right {
                    tris.extend_from_slice(&[a0, b0, b1, a0, b1, a1]);
                } else {
                    tris.extend_from_slice(&[a0, b1, b0, a0, a1, b1]);
                }
            }
        }
    }

    let flat: Vec<f32> = tris.iter().flatten().copied().collect();
    let normals = compute_normals(&flat, None);
    for (p, n) in tris.iter().zip(normals.chunks_exact(3)) {
        out.position
            .push_vertex(&[encode_extent(p[0] as f64), encode_extent(p[1] as f64)]);
        out.height.push(encode_height(p[2] as f64));
        out.normal.push_vertex(n);
    }
    tris.len()
}
