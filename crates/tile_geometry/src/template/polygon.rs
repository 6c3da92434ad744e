use super::{TemplateBuffer, TemplateCore};
use crate::attribute::{Attribute, IndexData};
use crate::geometry_buffer::{names, CullFace, GeometryBuffer, PassMask};
use crate::hit::{HitTester, PolygonHit};
use crate::kind::BufferKind;
use crate::tessellate::{add_extrude, add_polygon, ExtrudeVertices, PolygonVertices};
use glam::DVec2;

/// Flat polygon fills, optionally lifted to a height.
#[derive(Debug, Clone)]
pub struct PolygonBuffer {
    core: TemplateCore,
    vertices: PolygonVertices,
}

impl PolygonBuffer {
    pub fn new(is_3d: bool) -> Self {
        Self {
            core: TemplateCore::new(is_3d),
            vertices: PolygonVertices::new(is_3d),
        }
    }

    /// Fills `rings` (outer ring, then holes) at `height` metres.
    pub fn add_polygon(&mut self, rings: &[Vec<DVec2>], height: f64) -> usize {
        add_polygon(&mut self.vertices, rings, height)
    }
}

impl TemplateBuffer for PolygonBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Polygon
    }

    fn vertex_count(&self) -> usize {
        self.vertices.vertex_count()
    }

    fn core(&self) -> &TemplateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TemplateCore {
        &mut self.core
    }

    fn finalize(self) -> Option<GeometryBuffer> {
        if self.is_empty() {
            return None;
        }
        let vertices = self.vertices;
        let mut buffer = self.core.start(BufferKind::Polygon);
        buffer.add_attribute(names::A_POSITION, Attribute::from(vertices.position));
        if let Some(h) = vertices.height {
            buffer.add_attribute(names::A_HEIGHT, Attribute::from(h));
        }
        buffer.add_index_group(IndexData::from_flex(vertices.index, false), None);
        buffer.passes = PassMask::OPAQUE;
        buffer.set_hit_tester(Some(HitTester::Polygon(PolygonHit)));
        Some(buffer)
    }
}

/// Extruded polygons (buildings).
#[derive(Debug, Clone)]
pub struct ExtrudeBuffer {
    core: TemplateCore,
    vertices: ExtrudeVertices,
    translucent: bool,
}

impl Default for ExtrudeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtrudeBuffer {
    pub fn new() -> Self {
        Self {
            core: TemplateCore::new(true),
            vertices: ExtrudeVertices::default(),
            translucent: false,
        }
    }

    pub fn add_extrude(&mut self, rings: &[Vec<DVec2>], base: f64, top: f64) -> usize {
        add_extrude(&mut self.vertices, rings, base, top)
    }

    /// Translucent extrusions draw in the alpha pass and again in the
    /// post-alpha pass to avoid blending over themselves.
    pub fn set_translucent(&mut self, translucent: bool) {
        self.translucent = translucent;
    }
}

impl TemplateBuffer for ExtrudeBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Extrude
    }

    fn vertex_count(&self) -> usize {
        self.vertices.vertex_count()
    }

    fn core(&self) -> &TemplateCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TemplateCore {
        &mut self.core
    }

    fn finalize(self) -> Option<GeometryBuffer> {
        if self.is_empty() {
            return None;
        }
        let first = self.core.first as u32;
        let count = self.count() as u32;
        let vertices = self.vertices;

        let mut buffer = self.core.start(BufferKind::Extrude);
        buffer.add_attribute(names::A_POSITION, Attribute::from(vertices.position));
        buffer.add_attribute(names::A_HEIGHT, Attribute::from(vertices.height));
        buffer.add_attribute(names::A_NORMAL, Attribute::from(vertices.normal));
        buffer.add_array_group(first, count, None);
        buffer.passes = if self.translucent {
            PassMask::ALPHA | PassMask::POST_ALPHA
        } else {
            PassMask::OPAQUE
        };
        buffer.set_cull_face(Some(CullFace::Back));
        buffer.set_hit_tester(Some(HitTester::Polygon(PolygonHit)));
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::tests::top_down;

    fn square(x: f64, y: f64, size: f64) -> Vec<DVec2> {
        vec![
            DVec2::new(x, y),
            DVec2::new(x + size, y),
            DVec2::new(x + size, y + size),
            DVec2::new(x, y + size),
        ]
    }

    #[test]
    fn polygon_hit_inside_fill_only() {
        let mut polygons = PolygonBuffer::new(false);
        polygons.set_id_offset(3);
        polygons.add_polygon(&[square(0.0, 0.0, 30.0), square(10.0, 10.0, 10.0)], 0.0);
        let buffer = polygons.finalize().unwrap();

        let hit = buffer.ray_intersects(&top_down(5.0, 5.0)).unwrap();
        assert_eq!(buffer.feature_at(hit.vertex), Some(3));
        assert!((hit.distance - 100.0).abs() < 1e-9);
        // Inside the hole.
        assert!(buffer.ray_intersects(&top_down(15.0, 15.0)).is_none());
    }

    #[test]
    fn extrude_hit_reports_nearest_face() {
        let mut extrude = ExtrudeBuffer::new();
        extrude.add_extrude(&[square(0.0, 0.0, 10.0)], 0.0, 20.0);
        let buffer = extrude.finalize().unwrap();
        // The ray starts below the base at z = -100 and travels up: the floor
        // is open, so the first face it meets is the roof at 20 m.
        let hit = buffer.ray_intersects(&top_down(5.0, 5.0)).unwrap();
        let roof = 20.0 + 100.0;
        assert!((hit.distance - roof).abs() < 0.2, "{}", hit.distance);
        assert_eq!(buffer.cull_face(), Some(CullFace::Back));
    }
}
