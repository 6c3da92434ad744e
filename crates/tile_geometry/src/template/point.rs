use super::{TemplateBuffer, TemplateCore};
use crate::attribute::Attribute;
use crate::flex::FlexAttribute;
use crate::geometry_buffer::{names, GeometryBuffer, PassMask};
use crate::hit::{HitTester, PointHit, POINT_VERTICES};
use crate::kind::BufferKind;
use crate::quantize::encode_height;
use crate::tessellate::add_point;

/// Screen-aligned quads: plain points, text glyphs or icons.
#[derive(Debug, Clone)]
pub struct PointBuffer {
    kind: BufferKind,
    core: TemplateCore,
    position: FlexAttribute<i16>,
    height: Option<FlexAttribute<u16>>,
    /// Quad width and height in screen pixels.
    size: FlexAttribute<u16>,
    texcoord: Option<FlexAttribute<u16>>,
}

impl PointBuffer {
    fn with_kind(kind: BufferKind, is_3d: bool, textured: bool) -> Self {
        Self {
            kind,
            core: TemplateCore::new(is_3d),
            position: FlexAttribute::new(2),
            height: is_3d.then(|| FlexAttribute::new(1)),
            size: FlexAttribute::new(2),
            texcoord: textured.then(|| FlexAttribute::new(2)),
        }
    }

    pub fn new(is_3d: bool) -> Self {
        Self::with_kind(BufferKind::Point, is_3d, false)
    }

    pub fn text(is_3d: bool) -> Self {
        Self::with_kind(BufferKind::Text, is_3d, true)
    }

    pub fn icon(is_3d: bool) -> Self {
        Self::with_kind(BufferKind::Icon, is_3d, true)
    }

    fn push_common(&mut self, z: f64, size: [f64; 2]) {
        let size = size.map(|s| s.round().clamp(0.0, u16::MAX as f64) as u16);
        let height = encode_height(z);
        for _ in 0..POINT_VERTICES {
            self.size.push_vertex(&size);
            if let Some(h) = self.height.as_mut() {
                h.push(height);
            }
        }
    }

    /// Appends an untextured point quad. Textured builders get zero texture
    /// coordinates.
    pub fn add_point(&mut self, x: f64, y: f64, z: f64, size: [f64; 2], visible: bool, align_map: bool) {
        add_point(&mut self.position, x, y, visible, align_map);
        self.push_common(z, size);
        if let Some(tc) = self.texcoord.as_mut() {
            for _ in 0..POINT_VERTICES {
                tc.push_vertex(&[0, 0]);
            }
        }
    }

    /// Appends a glyph or icon quad; `uv` is the atlas rectangle
    /// `[u0, v0, u1, v1]` in texels.
    pub fn add_textured(
        &mut self,
        x: f64,
        y: f64,
        z: f64,
        size: [f64; 2],
        uv: [u16; 4],
        visible: bool,
        align_map: bool,
    ) {
        add_point(&mut self.position, x, y, visible, align_map);
        self.push_common(z, size);
        let tc = self.texcoord.get_or_insert_with(|| FlexAttribute::new(2));
        // Same corner order as the packed quad.
        let [u0, v0, u1, v1] = uv;
        for corner in [[u0, v0], [u1, v0], [u0, v1], [u1, v0], [u1, v1], [u0, v1]] {
            tc.push_vertex(&corner);
        }
    }
}

impl TemplateBuffer for PointBuffer {
    fn kind(&self) -> BufferKind {
        self.kind
    }

    fn vertex_count(&self) -> usize {
        self.position.vertex_count()
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

        let mut buffer = self.core.start(self.kind);
        buffer.add_attribute(names::A_POSITION, Attribute::from(self.position));
        buffer.add_attribute(names::A_SIZE, Attribute::from(self.size));
        if let Some(h) = self.height {
            buffer.add_attribute(names::A_HEIGHT, Attribute::from(h));
        }
        if let Some(tc) = self.texcoord {
            buffer.add_attribute(names::A_TEXCOORD, Attribute::from(tc));
        }
        buffer.add_array_group(first, count, None);
        buffer.passes = PassMask::ALPHA;
        buffer.set_hit_tester(Some(HitTester::Point(PointHit)));
        Some(buffer)
    }
}

/// Weighted point splats accumulated into a density texture.
#[derive(Debug, Clone)]
pub struct HeatmapBuffer {
    core: TemplateCore,
    position: FlexAttribute<i16>,
    /// Splat radius in screen pixels.
    size: FlexAttribute<u16>,
    weight: FlexAttribute<u8>,
}

impl Default for HeatmapBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatmapBuffer {
    pub fn new() -> Self {
        Self {
            core: TemplateCore::new(false),
            position: FlexAttribute::new(2),
            size: FlexAttribute::new(1),
            weight: FlexAttribute::normalized(1),
        }
    }

    /// `weight` in `[0, 1]`.
    pub fn add_point(&mut self, x: f64, y: f64, radius: f64, weight: f64) {
        add_point(&mut self.position, x, y, true, false);
        let radius = radius.round().clamp(0.0, u16::MAX as f64) as u16;
        let weight = (weight.clamp(0.0, 1.0) * 255.0).round() as u8;
        for _ in 0..POINT_VERTICES {
            self.size.push(radius);
            self.weight.push(weight);
        }
    }
}

impl TemplateBuffer for HeatmapBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Heatmap
    }

    fn vertex_count(&self) -> usize {
        self.position.vertex_count()
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

        let mut buffer = self.core.start(BufferKind::Heatmap);
        buffer.add_attribute(names::A_POSITION, Attribute::from(self.position));
        buffer.add_attribute(names::A_SIZE, Attribute::from(self.size));
        buffer.add_attribute(names::A_WEIGHT, Attribute::from(self.weight));
        buffer.add_array_group(first, count, None);
        buffer.passes = PassMask::ALPHA;
        buffer.set_hit_tester(Some(HitTester::Point(PointHit)));
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::tests::top_down;

    #[test]
    fn textured_quads_carry_atlas_corners() {
        let mut text = PointBuffer::text(false);
        text.add_textured(10.0, 10.0, 0.0, [12.0, 16.0], [0, 0, 12, 16], true, false);
        let buffer = text.finalize().unwrap();
        assert_eq!(buffer.kind, BufferKind::Text);
        let tc = buffer.attribute(names::A_TEXCOORD).unwrap();
        assert_eq!(tc.vertex_count(), 6);
        assert_eq!(tc.data.as_u16().unwrap()[8..10], [12, 16]);
    }

    #[test]
    fn point_hit_uses_screen_box() {
        let mut points = PointBuffer::new(false);
        points.set_id_offset(1);
        points.add_point(10.0, 10.0, 0.0, [8.0, 8.0], true, false);
        points.set_id_offset(2);
        points.add_point(40.0, 10.0, 0.0, [8.0, 8.0], true, false);
        let buffer = points.finalize().unwrap();

        let hit = buffer.ray_intersects(&top_down(41.0, 12.0)).unwrap();
        assert_eq!(buffer.feature_at(hit.vertex), Some(2));
        assert!((hit.distance - 100.0).abs() < 1e-9);

        assert!(buffer.ray_intersects(&top_down(25.0, 10.0)).is_none());
    }

    #[test]
    fn hidden_points_are_not_hit() {
        let mut points = PointBuffer::new(false);
        points.add_point(10.0, 10.0, 0.0, [8.0, 8.0], false, false);
        let buffer = points.finalize().unwrap();
        assert!(buffer.ray_intersects(&top_down(10.0, 10.0)).is_none());
    }

    #[test]
    fn heatmap_hit_uses_radius() {
        let mut heat = HeatmapBuffer::new();
        heat.add_point(50.0, 50.0, 10.0, 0.5);
        let buffer = heat.finalize().unwrap();
        assert!(buffer.ray_intersects(&top_down(58.0, 50.0)).is_some());
        assert!(buffer.ray_intersects(&top_down(62.0, 50.0)).is_none());
        assert_eq!(buffer.attribute(names::A_WEIGHT).unwrap().data.get(0), Some(128.0));
    }
}
