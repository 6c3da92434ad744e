//! Program contract and the per-kind program table.

use crate::buffer_cache::GpuBufferCache;
use crate::gpu::{AttributeLayout, GpuContext};
use crate::renderer::DrawContext;
use std::collections::BTreeMap;
use std::fmt;
use tile_geometry::{BufferKind, CullFace, GeometryBuffer, GroupKind, IndexData, Pass, UniformValue};

/// Per-draw uniforms pushed by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardUniform {
    Matrix,
    InverseMatrix,
    Resolution,
    Scale,
    TopLeft,
    TileScale,
    Rotate,
    FixedView,
    ZMeterToPixel,
}

impl StandardUniform {
    pub const ALL: [StandardUniform; 9] = [
        StandardUniform::Matrix,
        StandardUniform::InverseMatrix,
        StandardUniform::Resolution,
        StandardUniform::Scale,
        StandardUniform::TopLeft,
        StandardUniform::TileScale,
        StandardUniform::Rotate,
        StandardUniform::FixedView,
        StandardUniform::ZMeterToPixel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StandardUniform::Matrix => "u_matrix",
            StandardUniform::InverseMatrix => "u_inverseMatrix",
            StandardUniform::Resolution => "u_resolution",
            StandardUniform::Scale => "u_scale",
            StandardUniform::TopLeft => "u_topLeft",
            StandardUniform::TileScale => "u_tileScale",
            StandardUniform::Rotate => "u_rotate",
            StandardUniform::FixedView => "u_fixedView",
            StandardUniform::ZMeterToPixel => "u_zMeterToPixel",
        }
    }
}

/// GL state a program expects unless the buffer overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramState {
    pub blend: bool,
    pub depth: bool,
    pub scissor: bool,
    /// Stencil-clip to the tile footprint.
    pub clip: bool,
    pub depth_mask: bool,
    pub cull_face: Option<CullFace>,
}

impl ProgramState {
    pub fn for_kind(kind: BufferKind) -> Self {
        use BufferKind::*;
        match kind {
            // Labels and markers may cross tile borders.
            Point | Text | Icon => Self {
                blend: true,
                depth: true,
                scissor: false,
                clip: false,
                depth_mask: false,
                cull_face: None,
            },
            Line | Polygon | Rect | Image => Self {
                blend: true,
                depth: true,
                scissor: true,
                clip: true,
                depth_mask: true,
                cull_face: None,
            },
            Extrude | Box | Sphere | Model => Self {
                blend: false,
                depth: true,
                scissor: true,
                clip: false,
                depth_mask: true,
                cull_face: Some(CullFace::Back),
            },
            Heatmap => Self {
                blend: true,
                depth: false,
                scissor: false,
                clip: false,
                depth_mask: false,
                cull_face: None,
            },
        }
    }
}

/// A compiled shader program for one buffer kind.
///
/// Call order per draw: `init`, `init_attributes`, `init_uniforms`, the
/// standard uniforms through `set_uniform`, then `draw`.
pub trait Program {
    fn kind(&self) -> BufferKind;

    /// Whether this program draws anything in `pass`.
    fn pass(&self, _pass: Pass) -> bool {
        true
    }

    fn default_state(&self) -> ProgramState {
        ProgramState::for_kind(self.kind())
    }

    fn init(&mut self, _ctx: &mut dyn GpuContext, _buffer: &GeometryBuffer, _draw: &DrawContext) {}

    fn init_attributes(&mut self, ctx: &mut dyn GpuContext, buffer: &GeometryBuffer, cache: &GpuBufferCache);

    fn init_uniforms(&mut self, ctx: &mut dyn GpuContext, uniforms: &BTreeMap<String, UniformValue>);

    fn has_uniform(&self, _uniform: StandardUniform) -> bool {
        true
    }

    fn set_uniform(&mut self, ctx: &mut dyn GpuContext, uniform: StandardUniform, value: UniformValue) {
        ctx.set_uniform(uniform.name(), value);
    }

    fn draw(&mut self, ctx: &mut dyn GpuContext, buffer: &GeometryBuffer, cache: &GpuBufferCache);

    /// Called when another program takes over.
    fn disable_attributes(&mut self, ctx: &mut dyn GpuContext);

    /// Called when this program becomes active.
    fn bind_framebuffer(&mut self, _ctx: &mut dyn GpuContext) {}
}

/// Binds every attribute of the buffer by name and submits every group.
#[derive(Debug, Clone)]
pub struct StandardProgram {
    kind: BufferKind,
    framebuffer: Option<u32>,
    bound: Vec<String>,
}

impl StandardProgram {
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            framebuffer: None,
            bound: Vec::new(),
        }
    }

    /// Renders into an offscreen target instead of the default framebuffer.
    pub fn with_framebuffer(mut self, framebuffer: u32) -> Self {
        self.framebuffer = Some(framebuffer);
        self
    }
}

impl Program for StandardProgram {
    fn kind(&self) -> BufferKind {
        self.kind
    }

    fn pass(&self, pass: Pass) -> bool {
        match self.kind {
            BufferKind::Heatmap => pass == Pass::Alpha,
            _ => true,
        }
    }

    fn init_attributes(&mut self, ctx: &mut dyn GpuContext, buffer: &GeometryBuffer, cache: &GpuBufferCache) {
        for (name, attr) in buffer.attributes() {
            let Some(handle) = cache.get(attr.id) else {
                log::debug!("{:?}: attribute {name} not uploaded", self.kind);
                continue;
            };
            let layout = AttributeLayout {
                size: attr.size,
                element: attr.element_type(),
                normalized: attr.normalized,
                stride: attr.stride,
                offset: attr.offset,
            };
            ctx.bind_attribute(name, handle, layout);
            if !self.bound.iter().any(|b| b == name) {
                self.bound.push(name.to_owned());
            }
        }
    }

    fn init_uniforms(&mut self, ctx: &mut dyn GpuContext, uniforms: &BTreeMap<String, UniformValue>) {
        for (name, value) in uniforms {
            ctx.set_uniform(name, *value);
        }
    }

    fn draw(&mut self, ctx: &mut dyn GpuContext, buffer: &GeometryBuffer, cache: &GpuBufferCache) {
        for group in buffer.groups() {
            let mode = group.primitive();
            match &group.kind {
                GroupKind::Arrays { first, count } => ctx.draw_arrays(mode, *first, *count),
                GroupKind::Indexed { id, index } => {
                    if matches!(index, IndexData::U32(_)) && !ctx.supports_u32_indices() {
                        log::debug!("{:?}: skipping 32-bit index group", self.kind);
                        continue;
                    }
                    if let Some(handle) = cache.get(*id) {
                        ctx.draw_elements(mode, index.len() as u32, index.element_type(), handle);
                    }
                }
            }
        }
    }

    fn disable_attributes(&mut self, ctx: &mut dyn GpuContext) {
        for name in self.bound.drain(..) {
            ctx.disable_attribute(&name);
        }
    }

    fn bind_framebuffer(&mut self, ctx: &mut dyn GpuContext) {
        ctx.bind_framebuffer(self.framebuffer);
    }
}

/// Programs indexed by [`BufferKind`].
pub struct ProgramTable {
    programs: [Option<Box<dyn Program>>; BufferKind::COUNT],
}

impl Default for ProgramTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgramTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.registered()).finish()
    }
}

impl ProgramTable {
    pub fn new() -> Self {
        Self {
            programs: std::array::from_fn(|_| None),
        }
    }

    /// A [`StandardProgram`] for every kind.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for kind in BufferKind::ALL {
            table.register(Box::new(StandardProgram::new(kind)));
        }
        table
    }

    /// Registers `program` under its kind, returning the one it replaces.
    pub fn register(&mut self, program: Box<dyn Program>) -> Option<Box<dyn Program>> {
        let slot = &mut self.programs[program.kind().index()];
        slot.replace(program)
    }

    pub fn remove(&mut self, kind: BufferKind) -> Option<Box<dyn Program>> {
        self.programs[kind.index()].take()
    }

    pub fn get(&self, kind: BufferKind) -> Option<&dyn Program> {
        self.programs[kind.index()].as_deref()
    }

    pub fn get_mut(&mut self, kind: BufferKind) -> Option<&mut (dyn Program + 'static)> {
        self.programs[kind.index()].as_deref_mut()
    }

    pub fn contains(&self, kind: BufferKind) -> bool {
        self.programs[kind.index()].is_some()
    }

    pub fn registered(&self) -> impl Iterator<Item = BufferKind> + '_ {
        BufferKind::ALL.into_iter().filter(|&kind| self.contains(kind))
    }
}
