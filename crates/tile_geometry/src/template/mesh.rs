use super::{TemplateBuffer, TemplateCore};
use crate::attribute::{Attribute, IndexData};
use crate::geometry_buffer::{names, CullFace, GeometryBuffer, PassMask};
use crate::hit::{BoxHit, HitTester, SphereHit};
use crate::kind::BufferKind;
use crate::tessellate::{add_box, add_sphere, BoxVertices, SphereMesh, SphereVertices};

/// Screen-sized boxes.
#[derive(Debug, Clone)]
pub struct BoxBuffer {
    core: TemplateCore,
    vertices: BoxVertices,
}

impl Default for BoxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxBuffer {
    pub fn new() -> Self {
        Self {
            core: TemplateCore::new(true),
            vertices: BoxVertices::default(),
        }
    }

    /// `size` is width, height and depth in screen pixels.
    pub fn add_box(&mut self, x: f64, y: f64, z: f64, size: [f64; 3]) {
        add_box(&mut self.vertices, x, y, z, size);
    }
}

impl TemplateBuffer for BoxBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Box
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
        let v = self.vertices;

        let mut buffer = self.core.start(BufferKind::Box);
        buffer.add_attribute(names::A_POSITION, Attribute::from(v.position));
        buffer.add_attribute(names::A_HEIGHT, Attribute::from(v.height));
        buffer.add_attribute(names::A_POINT, Attribute::from(v.point));
        buffer.add_attribute(names::A_NORMAL, Attribute::from(v.normal));
        buffer.add_attribute(names::A_SIZE, Attribute::from(v.size));
        buffer.add_array_group(first, count, None);
        buffer.passes = PassMask::OPAQUE;
        buffer.set_cull_face(Some(CullFace::Back));
        buffer.set_hit_tester(Some(HitTester::Box(BoxHit)));
        Some(buffer)
    }
}

/// Screen-sized spheres instanced from a shared unit mesh.
#[derive(Debug, Clone)]
pub struct SphereBuffer<'m> {
    core: TemplateCore,
    mesh: &'m SphereMesh,
    vertices: SphereVertices,
}

impl<'m> SphereBuffer<'m> {
    pub fn new(mesh: &'m SphereMesh) -> Self {
        Self {
            core: TemplateCore::new(true),
            mesh,
            vertices: SphereVertices::default(),
        }
    }

    pub fn add_sphere(&mut self, x: f64, y: f64, z: f64, radius: f64) {
        add_sphere(&mut self.vertices, self.mesh, x, y, z, radius);
    }
}

impl TemplateBuffer for SphereBuffer<'_> {
    fn kind(&self) -> BufferKind {
        BufferKind::Sphere
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
        let vertices_per_sphere = self.mesh.vertex_count();
        let v = self.vertices;

        let mut buffer = self.core.start(BufferKind::Sphere);
        buffer.add_attribute(names::A_POSITION, Attribute::from(v.position));
        buffer.add_attribute(names::A_HEIGHT, Attribute::from(v.height));
        buffer.add_attribute(names::A_POINT, Attribute::from(v.point));
        buffer.add_attribute(names::A_NORMAL, Attribute::from(v.normal));
        buffer.add_attribute(names::A_SIZE, Attribute::from(v.size));
        buffer.add_index_group(IndexData::from_flex(v.index, false), None);
        buffer.passes = PassMask::OPAQUE;
        buffer.set_cull_face(Some(CullFace::Back));
        buffer.set_hit_tester(Some(HitTester::Sphere(SphereHit { vertices_per_sphere })));
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::tests::top_down;

    #[test]
    fn box_hit_enters_bottom_face() {
        let mut boxes = BoxBuffer::new();
        boxes.set_id_offset(1);
        boxes.add_box(10.0, 10.0, 50.0, [10.0, 10.0, 20.0]);
        boxes.set_id_offset(2);
        boxes.add_box(40.0, 10.0, 50.0, [10.0, 10.0, 20.0]);
        let buffer = boxes.finalize().unwrap();

        let hit = buffer.ray_intersects(&top_down(42.0, 12.0)).unwrap();
        assert_eq!(buffer.feature_at(hit.vertex), Some(2));
        // Box spans 40..60 m; the ray enters at 40 m from z = -100.
        assert!((hit.distance - 140.0).abs() < 0.2, "{}", hit.distance);
        assert!(buffer.ray_intersects(&top_down(25.0, 10.0)).is_none());
    }

    #[test]
    fn sphere_hit_uses_ellipsoid() {
        let mesh = SphereMesh::new(4, 8);
        let mut spheres = SphereBuffer::new(&mesh);
        spheres.set_id_offset(5);
        spheres.add_sphere(20.0, 20.0, 0.0, 5.0);
        spheres.set_id_offset(6);
        spheres.add_sphere(60.0, 20.0, 0.0, 5.0);
        let buffer = spheres.finalize().unwrap();

        let hit = buffer.ray_intersects(&top_down(60.0, 20.0)).unwrap();
        assert_eq!(buffer.feature_at(hit.vertex), Some(6));
        assert!((hit.distance - 95.0).abs() < 1e-6);
        assert!(buffer.ray_intersects(&top_down(60.0, 26.0)).is_none());
    }
}
