use super::{TemplateBuffer, TemplateCore};
use crate::attribute::Attribute;
use crate::flex::{FlexArray, FlexAttribute};
use crate::geometry_buffer::{compute_normals, names, GeometryBuffer, PassMask};
use crate::hit::{HitTester, TerrainModelHit};
use crate::kind::BufferKind;

/// Generic triangle meshes (terrain, 3D models) with float positions in tile
/// pixels and metres.
#[derive(Debug, Clone)]
pub struct ModelBuffer {
    core: TemplateCore,
    position: FlexAttribute<f32>,
    index: Option<FlexArray<u32>>,
}

impl Default for ModelBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuffer {
    pub fn new() -> Self {
        Self {
            core: TemplateCore::new(true),
            position: FlexAttribute::new(3),
            index: None,
        }
    }

    /// Appends a mesh. Without `indices` the vertices are taken as a plain
    /// triangle list and shaded flat; mixing both styles in one buffer keeps
    /// the indexed form.
    pub fn add_mesh(&mut self, vertices: &[[f32; 3]], indices: Option<&[u32]>) {
        let base = self.position.vertex_count() as u32;
        for v in vertices {
            self.position.push_vertex(v);
        }
        match (indices, self.index.as_mut()) {
            (Some(idx), Some(index)) => idx.iter().for_each(|&i| index.push(base + i)),
            (Some(idx), None) => {
                let mut index = FlexArray::new();
                // Earlier plain triangles become explicit.
                (0..base).for_each(|i| index.push(i));
                idx.iter().for_each(|&i| index.push(base + i));
                self.index = Some(index);
            }
            (None, Some(index)) => (base..base + vertices.len() as u32).for_each(|i| index.push(i)),
            (None, None) => {}
        }
    }
}

impl TemplateBuffer for ModelBuffer {
    fn kind(&self) -> BufferKind {
        BufferKind::Model
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
        let positions = self.position.data.trim();
        let index = self.index.map(FlexArray::into_trimmed);
        let normals = compute_normals(&positions, index.as_deref());

        let mut buffer = self.core.start(BufferKind::Model);
        buffer.add_attribute(names::A_POSITION, Attribute::from_values(positions, 3));
        buffer.add_attribute(names::A_NORMAL, Attribute::from_values(normals, 3).normalized(true));
        match index {
            Some(index) => buffer.add_group(&index, false, None),
            None => buffer.add_array_group(first, count, None),
        }
        buffer.passes = PassMask::OPAQUE;
        buffer.set_hit_tester(Some(HitTester::TerrainModel(TerrainModelHit)));
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::tests::top_down;

    #[test]
    fn terrain_hit_follows_surface_height() {
        let mut model = ModelBuffer::new();
        model.set_id_offset(42);
        model.add_mesh(
            &[[0.0, 0.0, 0.0], [100.0, 0.0, 0.0], [100.0, 100.0, 50.0], [0.0, 100.0, 50.0]],
            Some(&[0, 1, 2, 0, 2, 3]),
        );
        let buffer = model.finalize().unwrap();
        let hit = buffer.ray_intersects(&top_down(50.0, 50.0)).unwrap();
        assert_eq!(buffer.feature_at(hit.vertex), Some(42));
        assert!((hit.distance - 125.0).abs() < 1e-6);
    }

    #[test]
    fn plain_triangles_use_array_group() {
        let mut model = ModelBuffer::new();
        model.add_mesh(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], None);
        let buffer = model.finalize().unwrap();
        assert_eq!(
            buffer.groups()[0].kind,
            crate::geometry_buffer::GroupKind::Arrays { first: 0, count: 3 }
        );
        assert_eq!(buffer.validate(), Ok(()));
    }

    #[test]
    fn mixed_meshes_switch_to_indexed() {
        let mut model = ModelBuffer::new();
        model.add_mesh(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], None);
        model.add_mesh(&[[5.0, 0.0, 0.0], [6.0, 0.0, 0.0], [5.0, 1.0, 0.0]], Some(&[0, 1, 2]));
        let buffer = model.finalize().unwrap();
        let mut tris = Vec::new();
        buffer.for_each_triangle(|t| tris.push(t));
        assert_eq!(tris, vec![[0, 1, 2], [3, 4, 5]]);
    }
}
