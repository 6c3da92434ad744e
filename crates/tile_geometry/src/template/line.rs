use super::{TemplateBuffer, TemplateCore};
use crate::attribute::Attribute;
use crate::geometry_buffer::{names, GeometryBuffer, PassMask, UniformValue};
use crate::hit::{HitTester, LineHit};
use crate::kind::BufferKind;
use crate::tessellate::{add_line_string, LineStringOptions, LineVertices};
use glam::DVec3;

#[derive(Debug, Clone)]
pub struct LineBuffer {
    core: TemplateCore,
    vertices: LineVertices,
    stroke_width: Option<f64>,
}

impl LineBuffer {
    /// `length_so_far` adds the per-vertex arc length used by dashed strokes.
    pub fn new(is_3d: bool, length_so_far: bool) -> Self {
        Self {
            core: TemplateCore::new(is_3d),
            vertices: LineVertices::new(is_3d, length_so_far),
            stroke_width: None,
        }
    }

    /// Strokes one line string. Returns the number of vertices added.
    pub fn add_line_string(&mut self, coords: &[DVec3], opts: &LineStringOptions) -> usize {
        add_line_string(&mut self.vertices, coords, opts)
    }

    /// Static stroke width in screen pixels, used by the draw program and
    /// the hit test.
    pub fn set_stroke_width(&mut self, width: f64) {
        self.stroke_width = Some(width);
    }
}

impl TemplateBuffer for LineBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Line
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

        let mut buffer = self.core.start(BufferKind::Line);
        buffer.add_attribute(names::A_POSITION, Attribute::from(vertices.position));
        buffer.add_attribute(names::A_NORMAL, Attribute::from(vertices.normal));
        if let Some(h) = vertices.height {
            buffer.add_attribute(names::A_HEIGHT, Attribute::from(h));
        }
        if let Some(l) = vertices.length_so_far {
            buffer.add_attribute(names::A_LENGTH_SO_FAR, Attribute::from(l));
        }
        if let Some(w) = self.stroke_width {
            buffer.add_uniform(names::U_STROKE_WIDTH, UniformValue::Float(w as f32));
        }
        buffer.add_array_group(first, count, None);
        buffer.passes = PassMask::OPAQUE;
        buffer.set_hit_tester(Some(HitTester::Line(LineHit)));
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::tests::top_down;

    #[test]
    fn stroke_width_widens_hit_area() {
        let build = |width: f64| {
            let mut lines = LineBuffer::new(false, false);
            lines.set_id_offset(9);
            lines.add_line_string(
                &[DVec3::new(10.0, 50.0, 0.0), DVec3::new(90.0, 50.0, 0.0)],
                &LineStringOptions::default(),
            );
            lines.set_stroke_width(width);
            lines.finalize().unwrap()
        };

        let thin = build(2.0);
        let wide = build(20.0);
        let ray = top_down(50.0, 55.0);
        assert!(thin.ray_intersects(&ray).is_none());

        let hit = wide.ray_intersects(&ray).unwrap();
        assert_eq!(wide.feature_at(hit.vertex), Some(9));
        assert!((hit.distance - 100.0).abs() < 1e-6);
    }
}
