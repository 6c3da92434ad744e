//! Stateful per-tile builders that accumulate tessellated geometry and
//! finalize into immutable [`GeometryBuffer`]s.
//!
//! Finalizing an empty builder yields `None`; "no geometry on this tile" is a
//! normal outcome.

mod line;
mod mesh;
mod model;
mod point;
mod polygon;

pub use line::LineBuffer;
pub use mesh::{BoxBuffer, SphereBuffer};
pub use model::ModelBuffer;
pub use point::{HeatmapBuffer, PointBuffer};
pub use polygon::{ExtrudeBuffer, PolygonBuffer};

use crate::geometry_buffer::{FeatureId, GeometryBuffer, IdOffset};
use crate::kind::BufferKind;

pub trait TemplateBuffer {
    fn kind(&self) -> BufferKind;

    /// Total vertices pushed so far.
    fn vertex_count(&self) -> usize;

    fn core(&self) -> &TemplateCore;

    fn core_mut(&mut self) -> &mut TemplateCore;

    /// Vertices belonging to this builder's draw range.
    fn count(&self) -> usize {
        self.vertex_count().saturating_sub(self.core().first)
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Marks the current vertex count as the start of feature `id`.
    fn set_id_offset(&mut self, id: FeatureId) {
        let vertex = self.vertex_count() as u32;
        self.core_mut().id_offsets.push(IdOffset { vertex, id });
    }

    /// Trims the accumulated attributes into a geometry buffer.
    fn finalize(self) -> Option<GeometryBuffer>
    where
        Self: Sized;
}

/// Bookkeeping shared by every builder.
#[derive(Debug, Clone, Default)]
pub struct TemplateCore {
    /// First vertex of the draw range.
    pub first: usize,
    pub id_offsets: Vec<IdOffset>,
    pub is_3d: bool,
}

impl TemplateCore {
    pub fn new(is_3d: bool) -> Self {
        Self {
            is_3d,
            ..Self::default()
        }
    }

    /// Fresh buffer carrying the id-offset table and flatness.
    fn start(self, kind: BufferKind) -> GeometryBuffer {
        let mut buffer = GeometryBuffer::new(kind);
        buffer.flat = !self.is_3d;
        buffer.set_id_offsets(self.id_offsets);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry_buffer::{names, GroupKind, PassMask};
    use crate::hit::HitTester;
    use crate::tessellate::{LineStringOptions, SphereMesh};
    use glam::{DVec2, DVec3};

    fn square(x: f64, y: f64, size: f64) -> Vec<DVec2> {
        vec![
            DVec2::new(x, y),
            DVec2::new(x + size, y),
            DVec2::new(x + size, y + size),
            DVec2::new(x, y + size),
        ]
    }

    #[test]
    fn empty_builders_finalize_to_none() {
        assert!(PointBuffer::new(false).finalize().is_none());
        assert!(PointBuffer::text(false).finalize().is_none());
        assert!(HeatmapBuffer::new().finalize().is_none());
        assert!(LineBuffer::new(false, false).finalize().is_none());
        assert!(PolygonBuffer::new(false).finalize().is_none());
        assert!(ExtrudeBuffer::new().finalize().is_none());
        assert!(BoxBuffer::new().finalize().is_none());
        let mesh = SphereMesh::default();
        assert!(SphereBuffer::new(&mesh).finalize().is_none());
        assert!(ModelBuffer::new().finalize().is_none());
    }

    #[test]
    fn builder_with_only_clipped_geometry_is_empty() {
        let mut lines = LineBuffer::new(false, false);
        lines.set_id_offset(1);
        lines.add_line_string(
            &[DVec3::new(-900.0, -900.0, 0.0), DVec3::new(-800.0, -900.0, 0.0)],
            &LineStringOptions::default(),
        );
        assert!(lines.is_empty());
        assert!(lines.finalize().is_none());
    }

    #[test]
    fn id_offsets_map_vertices_to_features() {
        let mut points = PointBuffer::new(false);
        points.set_id_offset(100);
        points.add_point(10.0, 10.0, 0.0, [8.0, 8.0], true, false);
        points.set_id_offset(200);
        points.add_point(20.0, 10.0, 0.0, [8.0, 8.0], true, false);
        points.add_point(30.0, 10.0, 0.0, [8.0, 8.0], true, false);
        assert_eq!(points.count(), 18);

        let buffer = points.finalize().unwrap();
        assert_eq!(buffer.feature_at(0), Some(100));
        assert_eq!(buffer.feature_at(5), Some(100));
        assert_eq!(buffer.feature_at(6), Some(200));
        assert_eq!(buffer.feature_at(17), Some(200));
        assert_eq!(buffer.validate(), Ok(()));
    }

    #[test]
    fn polygon_finalizes_indexed_group() {
        let mut polygons = PolygonBuffer::new(false);
        polygons.set_id_offset(7);
        polygons.add_polygon(&[square(0.0, 0.0, 10.0)], 0.0);
        let buffer = polygons.finalize().unwrap();

        assert_eq!(buffer.groups().len(), 1);
        assert!(matches!(buffer.groups()[0].kind, GroupKind::Indexed { .. }));
        assert!(buffer.is_flat());
        assert!(buffer.attribute(names::A_HEIGHT).is_none());
        assert!(matches!(buffer.hit_tester(), Some(HitTester::Polygon(_))));
        assert_eq!(buffer.validate(), Ok(()));
    }

    #[test]
    fn line_finalizes_array_group() {
        let mut lines = LineBuffer::new(true, true);
        lines.add_line_string(
            &[DVec3::new(0.0, 0.0, 10.0), DVec3::new(50.0, 0.0, 10.0)],
            &LineStringOptions { length_so_far: true, ..Default::default() },
        );
        let buffer = lines.finalize().unwrap();
        assert!(!buffer.is_flat());
        assert!(!buffer.is_point_buffer());
        assert!(buffer.attribute(names::A_LENGTH_SO_FAR).is_some());
        assert_eq!(
            buffer.groups()[0].kind,
            GroupKind::Arrays { first: 0, count: 6 }
        );
        assert_eq!(buffer.validate(), Ok(()));
    }

    #[test]
    fn extrude_requests_post_alpha_when_translucent() {
        let mut extrude = ExtrudeBuffer::new();
        extrude.add_extrude(&[square(0.0, 0.0, 10.0)], 0.0, 20.0);
        extrude.set_translucent(true);
        let buffer = extrude.finalize().unwrap();
        assert!(buffer.needs_2_alpha_passes());
        assert!(buffer.passes.contains(PassMask::ALPHA));
        assert!(!buffer.is_point_buffer());
    }

    #[test]
    fn sphere_buffer_widens_index_past_u16() {
        let mesh = SphereMesh::new(16, 32);
        let per_sphere = mesh.vertex_count();
        let mut spheres = SphereBuffer::new(&mesh);
        let instances = 65536 / per_sphere + 1;
        for i in 0..instances {
            spheres.add_sphere((i % 200) as f64, 10.0, 0.0, 4.0);
        }
        let buffer = spheres.finalize().unwrap();
        match &buffer.groups()[0].kind {
            GroupKind::Indexed { index, .. } => {
                assert_eq!(index.element_type(), crate::attribute::ElementType::UnsignedInt)
            }
            GroupKind::Arrays { .. } => panic!("sphere buffers are indexed"),
        }
        assert!(matches!(
            buffer.hit_tester(),
            Some(HitTester::Sphere(h)) if h.vertices_per_sphere == per_sphere
        ));
    }
}
