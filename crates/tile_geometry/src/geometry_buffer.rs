//! The finalized per-tile draw payload.
//!
//! A `GeometryBuffer` owns typed attributes, one or more draw groups, render
//! pass flags, uniform overrides and the id-offset table used to map a hit
//! vertex back to its feature. It is built once by a template buffer's
//! `finalize` and afterwards only its attribute `dirty` flags and uniform
//! cache change.

use crate::attribute::{Attribute, AttributeData, IndexData, ResourceId};
use crate::error::BufferError;
use crate::hit::{Hit, HitTester, RayIntersect, RayQuery};
use crate::kind::BufferKind;
use crate::quantize::quantize_normal;
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Standard attribute names shared by the builders, programs and hit tests.
pub mod names {
    pub const A_POSITION: &str = "a_position";
    pub const A_NORMAL: &str = "a_normal";
    pub const A_HEIGHT: &str = "a_height";
    pub const A_SIZE: &str = "a_size";
    pub const A_POINT: &str = "a_point";
    pub const A_TEXCOORD: &str = "a_texcoord";
    pub const A_LENGTH_SO_FAR: &str = "a_lengthSoFar";
    pub const A_WEIGHT: &str = "a_weight";

    pub const U_STROKE_WIDTH: &str = "u_strokeWidth";
    pub const U_FILL: &str = "u_fill";
    pub const U_TEXTURE: &str = "u_texture";
}

pub type FeatureId = u64;

/// Compositing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pass {
    Opaque,
    Alpha,
    PostAlpha,
}

impl Pass {
    /// Required draw order.
    pub const ORDER: [Pass; 3] = [Pass::Opaque, Pass::Alpha, Pass::PostAlpha];

    pub fn mask(self) -> PassMask {
        match self {
            Pass::Opaque => PassMask::OPAQUE,
            Pass::Alpha => PassMask::ALPHA,
            Pass::PostAlpha => PassMask::POST_ALPHA,
        }
    }
}

bitflags! {
    /// Passes a buffer participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassMask: u8 {
        const OPAQUE = 1;
        const ALPHA = 1 << 1;
        const POST_ALPHA = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    pub const ALL: ColorMask = ColorMask { r: true, g: true, b: true, a: true };
    pub const NONE: ColorMask = ColorMask { r: false, g: false, b: false, a: false };
    /// Colour channels on, alpha kept from the cleared surface.
    pub const RGB: ColorMask = ColorMask { r: true, g: true, b: true, a: false };
}

/// Per-buffer GL state that overrides the owning program's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateOverrides {
    pub blend: Option<bool>,
    pub depth: Option<bool>,
    pub scissor: Option<bool>,
    /// Stencil clipping to the tile footprint.
    pub clip: Option<bool>,
    pub depth_mask: Option<bool>,
    pub color_mask: Option<ColorMask>,
}

/// Opaque handle into the texture manager owned by the surrounding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
    Texture(TextureHandle),
}

impl UniformValue {
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            UniformValue::Float(v) => Some(v),
            UniformValue::Int(v) => Some(v as f32),
            _ => None,
        }
    }
}

/// A uniform whose value comes from a style expression and is resolved once
/// per frame.
pub trait DynamicUniform: Send + Sync {
    fn resolve(&self) -> UniformValue;
}

impl<F> DynamicUniform for F
where
    F: Fn() -> UniformValue + Send + Sync,
{
    fn resolve(&self) -> UniformValue {
        self()
    }
}

#[derive(Clone)]
pub enum Uniform {
    Static(UniformValue),
    Dynamic(Arc<dyn DynamicUniform>),
}

impl fmt::Debug for Uniform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uniform::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Uniform::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<UniformValue> for Uniform {
    fn from(value: UniformValue) -> Self {
        Uniform::Static(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKind {
    Indexed { id: ResourceId, index: IndexData },
    Arrays { first: u32, count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawGroup {
    pub kind: GroupKind,
    /// Topology override; `None` draws triangles.
    pub mode: Option<Primitive>,
}

impl DrawGroup {
    pub fn primitive(&self) -> Primitive {
        self.mode.unwrap_or(Primitive::Triangles)
    }

    /// Number of elements submitted by this group.
    pub fn element_count(&self) -> usize {
        match &self.kind {
            GroupKind::Indexed { index, .. } => index.len(),
            GroupKind::Arrays { count, .. } => *count as usize,
        }
    }
}

/// `(first vertex, feature id)` pair; sorted by vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdOffset {
    pub vertex: u32,
    pub id: FeatureId,
}

#[derive(Debug)]
pub struct GeometryBuffer {
    pub kind: BufferKind,
    attributes: BTreeMap<String, Attribute>,
    groups: Vec<DrawGroup>,
    uniforms: BTreeMap<String, Uniform>,
    uniform_cache: Option<BTreeMap<String, UniformValue>>,
    pub passes: PassMask,
    /// Geometry lies on the ground plane (no extrusion).
    pub flat: bool,
    pub overrides: StateOverrides,
    cull_face: Option<CullFace>,
    pub pointer_events: bool,
    id_offsets: Vec<IdOffset>,
    hit: Option<HitTester>,
}

/// A clone owns its GPU resources: every attribute and index array gets a
/// fresh [`ResourceId`] and is marked for upload, so releasing one copy
/// never frees buffers the other still draws with.
impl Clone for GeometryBuffer {
    fn clone(&self) -> Self {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, attr)| {
                let attr = Attribute {
                    id: ResourceId::next(),
                    dirty: true,
                    ..attr.clone()
                };
                (name.clone(), attr)
            })
            .collect();
        let groups = self
            .groups
            .iter()
            .map(|group| DrawGroup {
                kind: match &group.kind {
                    GroupKind::Indexed { index, .. } => GroupKind::Indexed {
                        id: ResourceId::next(),
                        index: index.clone(),
                    },
                    GroupKind::Arrays { first, count } => GroupKind::Arrays {
                        first: *first,
                        count: *count,
                    },
                },
                mode: group.mode,
            })
            .collect();
        Self {
            kind: self.kind,
            attributes,
            groups,
            uniforms: self.uniforms.clone(),
            uniform_cache: self.uniform_cache.clone(),
            passes: self.passes,
            flat: self.flat,
            overrides: self.overrides,
            cull_face: self.cull_face,
            pointer_events: self.pointer_events,
            id_offsets: self.id_offsets.clone(),
            hit: self.hit,
        }
    }
}

impl GeometryBuffer {
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            attributes: BTreeMap::new(),
            groups: Vec::new(),
            uniforms: BTreeMap::new(),
            uniform_cache: None,
            passes: PassMask::OPAQUE,
            flat: true,
            overrides: StateOverrides::default(),
            cull_face: None,
            pointer_events: true,
            id_offsets: Vec::new(),
            hit: None,
        }
    }

    /// Registers an attribute. The element type follows the payload variant;
    /// stride resets to 0 and the attribute is marked for upload.
    pub fn add_attribute(&mut self, name: impl Into<String>, mut attr: Attribute) {
        attr.stride = 0;
        attr.dirty = true;
        self.attributes.insert(name.into(), attr);
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = (&str, &mut Attribute)> {
        self.attributes.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Appends an indexed group. Storage is 16-bit unless an index exceeds
    /// 65535 or `wide` is requested.
    pub fn add_group(&mut self, indices: &[u32], wide: bool, mode: Option<Primitive>) {
        self.add_index_group(IndexData::from_indices(indices, wide), mode);
    }

    pub fn add_index_group(&mut self, index: IndexData, mode: Option<Primitive>) {
        self.groups.push(DrawGroup {
            kind: GroupKind::Indexed {
                id: ResourceId::next(),
                index,
            },
            mode,
        });
    }

    pub fn add_array_group(&mut self, first: u32, count: u32, mode: Option<Primitive>) {
        self.groups.push(DrawGroup {
            kind: GroupKind::Arrays { first, count },
            mode,
        });
    }

    pub fn groups(&self) -> &[DrawGroup] {
        &self.groups
    }

    pub fn add_uniform(&mut self, name: impl Into<String>, uniform: impl Into<Uniform>) {
        self.uniforms.insert(name.into(), uniform.into());
        self.uniform_cache = None;
    }

    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    /// Resolved uniform map, computed on first use and cached until
    /// [`clear_uniform_cache`](Self::clear_uniform_cache).
    pub fn uniform_data(&mut self) -> &BTreeMap<String, UniformValue> {
        let uniforms = &self.uniforms;
        self.uniform_cache.get_or_insert_with(|| {
            uniforms
                .iter()
                .map(|(name, u)| {
                    let value = match u {
                        Uniform::Static(v) => *v,
                        Uniform::Dynamic(d) => d.resolve(),
                    };
                    (name.clone(), value)
                })
                .collect()
        })
    }

    /// Alias of [`uniform_data`](Self::uniform_data).
    pub fn compile_uniforms(&mut self) -> &BTreeMap<String, UniformValue> {
        self.uniform_data()
    }

    pub fn clear_uniform_cache(&mut self) {
        self.uniform_cache = None;
    }

    pub fn has_cached_uniforms(&self) -> bool {
        self.uniform_cache.is_some()
    }

    /// Current value of a float uniform.
    pub fn static_f32(&self, name: &str) -> Option<f32> {
        match self.uniforms.get(name)? {
            Uniform::Static(v) => v.as_f32(),
            Uniform::Dynamic(d) => d.resolve().as_f32(),
        }
    }

    /// `None` disables backface culling.
    pub fn cull_face(&self) -> Option<CullFace> {
        self.cull_face
    }

    pub fn set_cull_face(&mut self, face: Option<CullFace>) {
        self.cull_face = face;
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.flat
    }

    /// True for every kind except lines and extrusions.
    pub fn is_point_buffer(&self) -> bool {
        !matches!(self.kind, BufferKind::Line | BufferKind::Extrude)
    }

    pub fn needs_2_alpha_passes(&self) -> bool {
        self.passes.contains(PassMask::POST_ALPHA)
    }

    pub fn set_id_offsets(&mut self, offsets: Vec<IdOffset>) {
        self.id_offsets = offsets;
    }

    pub fn id_offsets(&self) -> &[IdOffset] {
        &self.id_offsets
    }

    /// Feature owning vertex `vertex`, by bisecting the id-offset table.
    pub fn feature_at(&self, vertex: u32) -> Option<FeatureId> {
        let idx = self.id_offsets.partition_point(|o| o.vertex <= vertex);
        idx.checked_sub(1).map(|i| self.id_offsets[i].id)
    }

    pub fn set_hit_tester(&mut self, hit: Option<HitTester>) {
        self.hit = hit;
    }

    pub fn hit_tester(&self) -> Option<&HitTester> {
        self.hit.as_ref()
    }

    /// Primitive-specific ray test; `None` for buffers without a hit tester.
    pub fn ray_intersects(&self, query: &RayQuery) -> Option<Hit> {
        self.hit.as_ref()?.ray_intersects(self, query)
    }

    /// Vertex count of the first attribute (all attributes agree once
    /// [`validate`](Self::validate) passes).
    pub fn vertex_count(&self) -> usize {
        self.attributes
            .values()
            .next()
            .map(Attribute::vertex_count)
            .unwrap_or(0)
    }

    /// Calls `f` with the vertex indices of every triangle in every
    /// triangle-list group.
    pub fn for_each_triangle(&self, mut f: impl FnMut([u32; 3])) {
        for group in &self.groups {
            if group.primitive() != Primitive::Triangles {
                continue;
            }
            match &group.kind {
                GroupKind::Indexed { index, .. } => {
                    let n = index.len() / 3;
                    for t in 0..n {
                        if let (Some(a), Some(b), Some(c)) =
                            (index.get(t * 3), index.get(t * 3 + 1), index.get(t * 3 + 2))
                        {
                            f([a, b, c]);
                        }
                    }
                }
                GroupKind::Arrays { first, count } => {
                    let mut v = *first;
                    let end = first + count - count % 3;
                    while v < end {
                        f([v, v + 1, v + 2]);
                        v += 3;
                    }
                }
            }
        }
    }

    /// Checks the structural invariants: equal vertex counts across
    /// attributes and in-range indices.
    pub fn validate(&self) -> Result<(), BufferError> {
        let mut expected: Option<usize> = None;
        for (name, attr) in &self.attributes {
            if attr.size == 0 {
                return Err(BufferError::ZeroComponentSize { name: name.clone() });
            }
            let len = attr.data.len();
            if len % attr.size as usize != 0 {
                return Err(BufferError::RaggedAttribute {
                    name: name.clone(),
                    len,
                    size: attr.size,
                });
            }
            let count = attr.vertex_count();
            match expected {
                None => expected = Some(count),
                Some(e) if e != count => {
                    return Err(BufferError::VertexCountMismatch {
                        name: name.clone(),
                        expected: e,
                        found: count,
                    })
                }
                _ => {}
            }
        }

        let vertex_count = expected.unwrap_or(0);
        for (group, g) in self.groups.iter().enumerate() {
            match &g.kind {
                GroupKind::Indexed { index, .. } => {
                    if let Some(max) = index.max_index() {
                        if max as usize >= vertex_count {
                            return Err(BufferError::IndexOutOfRange {
                                group,
                                index: max,
                                vertex_count,
                            });
                        }
                    }
                }
                GroupKind::Arrays { first, count } => {
                    let end = first + count;
                    if end as usize > vertex_count {
                        return Err(BufferError::RangeOutOfBounds {
                            group,
                            first: *first,
                            end,
                            vertex_count,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Mutable access to the raw attribute payload; marks it for re-upload.
    pub fn modify_attribute(&mut self, name: &str, f: impl FnOnce(&mut AttributeData)) -> bool {
        match self.attributes.get_mut(name) {
            Some(attr) => {
                f(&mut attr.data);
                attr.dirty = true;
                true
            }
            None => false,
        }
    }
}

/// Per-vertex normals quantized to signed bytes.
///
/// `vertex` is a flat xyz array. With an `index` list, face normals are
/// summed per shared vertex (smooth shading); without one, every consecutive
/// vertex triple is an isolated triangle (flat shading).
pub fn compute_normals(vertex: &[f32], index: Option<&[u32]>) -> Vec<i8> {
    let vertex_count = vertex.len() / 3;
    let mut acc = vec![[0.0f64; 3]; vertex_count];

    let position = |i: usize| -> [f64; 3] {
        [
            vertex[i * 3] as f64,
            vertex[i * 3 + 1] as f64,
            vertex[i * 3 + 2] as f64,
        ]
    };

    let mut add_face = |a: usize, b: usize, c: usize| {
        if a >= vertex_count || b >= vertex_count || c >= vertex_count {
            return;
        }
        let (pa, pb, pc) = (position(a), position(b), position(c));
        let e1 = [pb[0] - pa[0], pb[1] - pa[1], pb[2] - pa[2]];
        let e2 = [pc[0] - pa[0], pc[1] - pa[1], pc[2] - pa[2]];
        let n = [
            e1[1] * e2[2] - e1[2] * e2[1],
            e1[2] * e2[0] - e1[0] * e2[2],
            e1[0] * e2[1] - e1[1] * e2[0],
        ];
        for v in [a, b, c] {
            acc[v][0] += n[0];
            acc[v][1] += n[1];
            acc[v][2] += n[2];
        }
    };

    match index {
        Some(index) => {
            for tri in index.chunks_exact(3) {
                add_face(tri[0] as usize, tri[1] as usize, tri[2] as usize);
            }
        }
        None => {
            for t in 0..vertex_count / 3 {
                add_face(t * 3, t * 3 + 1, t * 3 + 2);
            }
        }
    }

    acc.into_iter().flat_map(quantize_normal).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::ElementType;

    fn quad_buffer() -> GeometryBuffer {
        let mut buf = GeometryBuffer::new(BufferKind::Polygon);
        buf.add_attribute(
            names::A_POSITION,
            Attribute::from_values(vec![0i16, 0, 10, 0, 10, 10, 0, 10], 2),
        );
        buf.add_group(&[0, 1, 2, 0, 2, 3], false, None);
        buf
    }

    #[test]
    fn index_width_follows_values() {
        let mut buf = GeometryBuffer::new(BufferKind::Polygon);
        buf.add_group(&[0, 1, 65535], false, None);
        buf.add_group(&[0, 1, 65536], false, None);
        buf.add_group(&[0, 1, 2], true, Some(Primitive::Lines));

        let types: Vec<_> = buf
            .groups()
            .iter()
            .map(|g| match &g.kind {
                GroupKind::Indexed { index, .. } => index.element_type(),
                GroupKind::Arrays { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(
            types,
            vec![
                ElementType::UnsignedShort,
                ElementType::UnsignedInt,
                ElementType::UnsignedInt
            ]
        );
        assert_eq!(buf.groups()[2].primitive(), Primitive::Lines);
    }

    #[test]
    fn add_attribute_marks_dirty_and_resets_stride() {
        let mut attr = Attribute::from_values(vec![1.0f32, 2.0], 1);
        attr.stride = 12;
        attr.dirty = false;
        let mut buf = GeometryBuffer::new(BufferKind::Model);
        buf.add_attribute("a_value", attr);
        let attr = buf.attribute("a_value").unwrap();
        assert!(attr.dirty);
        assert_eq!(attr.stride, 0);
        assert_eq!(attr.element_type(), ElementType::Float);
    }

    #[test]
    fn uniform_cache_holds_until_cleared() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut buf = quad_buffer();
        buf.add_uniform("u_fill", UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));
        buf.add_uniform(
            "u_opacity",
            Uniform::Dynamic(Arc::new(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                UniformValue::Float(n as f32)
            })),
        );

        assert_eq!(buf.uniform_data()["u_opacity"], UniformValue::Float(0.0));
        assert_eq!(buf.uniform_data()["u_opacity"], UniformValue::Float(0.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        buf.clear_uniform_cache();
        assert!(!buf.has_cached_uniforms());
        assert_eq!(buf.compile_uniforms()["u_opacity"], UniformValue::Float(1.0));
        assert_eq!(buf.uniform_data()["u_fill"], UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn clone_gets_its_own_resource_ids() {
        let mut buf = quad_buffer();
        buf.attribute_mut(names::A_POSITION).unwrap().dirty = false;
        let copy = buf.clone();

        let (a, b) = (buf.attribute(names::A_POSITION).unwrap(), copy.attribute(names::A_POSITION).unwrap());
        assert_ne!(a.id, b.id);
        assert_eq!(a.data, b.data);
        assert!(b.dirty);
        let index_id = |g: &DrawGroup| match &g.kind {
            GroupKind::Indexed { id, .. } => *id,
            GroupKind::Arrays { .. } => unreachable!(),
        };
        assert_ne!(index_id(&buf.groups()[0]), index_id(&copy.groups()[0]));
        assert_eq!(copy.vertex_count(), buf.vertex_count());
    }

    #[test]
    fn cull_face_defaults_to_none() {
        let mut buf = quad_buffer();
        assert_eq!(buf.cull_face(), None);
        buf.set_cull_face(Some(CullFace::Back));
        assert_eq!(buf.cull_face(), Some(CullFace::Back));
    }

    #[test]
    fn post_alpha_bit_requests_second_pass() {
        let mut buf = quad_buffer();
        assert!(!buf.needs_2_alpha_passes());
        buf.passes = PassMask::ALPHA | PassMask::POST_ALPHA;
        assert!(buf.needs_2_alpha_passes());
    }

    #[test]
    fn point_buffer_predicate_excludes_lines_and_extrusions() {
        assert!(!GeometryBuffer::new(BufferKind::Line).is_point_buffer());
        assert!(!GeometryBuffer::new(BufferKind::Extrude).is_point_buffer());
        assert!(GeometryBuffer::new(BufferKind::Polygon).is_point_buffer());
        assert!(GeometryBuffer::new(BufferKind::Point).is_point_buffer());
    }

    #[test]
    fn feature_lookup_bisects_offsets() {
        let mut buf = quad_buffer();
        buf.set_id_offsets(vec![
            IdOffset { vertex: 0, id: 10 },
            IdOffset { vertex: 6, id: 11 },
            IdOffset { vertex: 12, id: 12 },
        ]);
        assert_eq!(buf.feature_at(0), Some(10));
        assert_eq!(buf.feature_at(5), Some(10));
        assert_eq!(buf.feature_at(6), Some(11));
        assert_eq!(buf.feature_at(400), Some(12));
    }

    #[test]
    fn validate_rejects_mismatched_attributes() {
        let mut buf = quad_buffer();
        assert_eq!(buf.validate(), Ok(()));
        buf.add_attribute(names::A_HEIGHT, Attribute::from_values(vec![0u16; 3], 1));
        assert!(matches!(
            buf.validate(),
            Err(BufferError::VertexCountMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let mut buf = quad_buffer();
        buf.add_group(&[0, 1, 4], false, None);
        assert!(matches!(
            buf.validate(),
            Err(BufferError::IndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn triangles_visit_indexed_and_array_groups() {
        let mut buf = quad_buffer();
        buf.add_array_group(0, 3, None);
        buf.add_array_group(0, 2, Some(Primitive::Lines));
        let mut tris = Vec::new();
        buf.for_each_triangle(|t| tris.push(t));
        assert_eq!(tris, vec![[0, 1, 2], [0, 2, 3], [0, 1, 2]]);
    }

    #[test]
    fn flat_normals_without_index() {
        // Counter-clockwise triangle in the xy plane faces +z.
        let vertex = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let normals = compute_normals(&vertex, None);
        assert_eq!(normals, vec![0, 0, 127, 0, 0, 127, 0, 0, 127]);
    }

    #[test]
    fn smooth_normals_average_shared_vertices() {
        // Two faces meeting at a right angle along the x axis.
        let vertex = [
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0, //
        ];
        let index = [0, 1, 2, 0, 3, 1];
        let normals = compute_normals(&vertex, Some(&index));
        // Shared vertices 0 and 1 point between +z and +y.
        assert_eq!(&normals[0..3], &[0, 90, 90]);
        assert_eq!(&normals[3..6], &[0, 90, 90]);
        assert_eq!(&normals[6..9], &[0, 0, 127]);
        assert_eq!(&normals[9..12], &[0, 127, 0]);
    }

    #[test]
    fn degenerate_triangle_gives_zero_normal() {
        let vertex = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        assert_eq!(compute_normals(&vertex, None), vec![0; 9]);
    }
}
