//! Per-tile draw orchestration.
//!
//! A frame runs `init_view`, then for each pass in [`Pass::ORDER`] calls
//! `set_pass` followed by `draw` for every visible tile buffer, ordered by
//! ascending z-index.

use crate::buffer_cache::GpuBufferCache;
use crate::gpu::{AttributeLayout, Builtin, Capability, ClearMask, CompareFunc, GpuContext, ProgramId, ScissorRect, StencilOp};
use crate::options::RendererOptions;
use crate::program::{ProgramState, ProgramTable, StandardUniform};
use crate::view::{depth_from_z_index, to_uniform, PreviewCache, View, MAX_Z_INDEX};
use glam::{DMat4, DVec2, DVec3};
use std::collections::HashSet;
use tile_geometry::{
    names, Attribute, BufferKind, ColorMask, GeometryBuffer, Pass, PassMask, Primitive, UniformValue,
};

pub const U_COLOR: &str = "u_color";
pub const U_WIDTH: &str = "u_width";

/// Square footprint in world pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRect {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

impl TileRect {
    pub fn new(x: f64, y: f64, size: f64) -> Self {
        Self { x, y, size }
    }

    fn key(&self) -> [u64; 3] {
        [self.x.to_bits(), self.y.to_bits(), self.size.to_bits()]
    }
}

/// Tile data from another zoom level shown in place of a missing tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preview {
    /// Translation applied to the source tile, world pixels.
    pub dx: f64,
    pub dy: f64,
    /// Source to destination zoom factor.
    pub scale: f64,
    /// Destination region the preview may cover.
    pub clip: TileRect,
}

/// One buffer of one tile, as handed to [`Renderer::draw`].
#[derive(Debug)]
pub struct TileDraw<'a> {
    pub buffer: &'a mut GeometryBuffer,
    pub tile: TileRect,
    /// World pixels per tile pixel.
    pub tile_scale: f64,
    pub z_index: u32,
    /// Per-tile stencil reference. Must be non-zero.
    pub stencil_ref: u8,
    pub preview: Option<Preview>,
}

/// Everything a single draw call needs, resolved up front.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawContext {
    pub pass: Pass,
    pub z_index: u32,
    pub min_3d_z_index: Option<u32>,
    pub depth: f32,
    pub depth_range: (f32, f32),
    pub stencil_ref: u8,
    /// Clip to the stencil reference.
    pub stencil: bool,
    pub scissor: Option<ScissorRect>,
    /// World -> clip, including any preview transform.
    pub matrix: DMat4,
    pub top_left: DVec2,
    pub tile_scale: f64,
    /// Preview zoom factor, 1 for regular tiles.
    pub zoom: f64,
    /// Flat content drawn above 3D content; depth testing is off.
    pub flat_above_3d: bool,
    /// `(factor, units)` for depth-tested flat content; nearer for higher
    /// z-index.
    pub polygon_offset: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingStencil {
    tile: TileRect,
    stencil_ref: u8,
}

/// Stencil quad, ground quad and grid border, in tile pixels.
#[derive(Debug)]
struct Resources {
    stencil: GeometryBuffer,
    ground: GeometryBuffer,
    grid: GeometryBuffer,
    tile_size: f64,
}

impl Resources {
    fn new(tile_size: u32) -> Self {
        let s = tile_size as f32;
        let quad = vec![0.0, 0.0, s, 0.0, s, s, 0.0, 0.0, s, s, 0.0, s];
        let border = vec![0.0, 0.0, s, 0.0, s, s, 0.0, s, 0.0, 0.0];
        Self {
            stencil: Self::buffer(quad.clone(), Primitive::Triangles),
            ground: Self::buffer(quad, Primitive::Triangles),
            grid: Self::buffer(border, Primitive::LineStrip),
            tile_size: tile_size.max(1) as f64,
        }
    }

    fn buffer(positions: Vec<f32>, mode: Primitive) -> GeometryBuffer {
        let count = (positions.len() / 2) as u32;
        let mut buffer = GeometryBuffer::new(BufferKind::Rect);
        buffer.add_attribute(names::A_POSITION, Attribute::from_values(positions, 2));
        buffer.add_array_group(0, count, Some(mode));
        buffer
    }

    fn get(&mut self, builtin: Builtin) -> &mut GeometryBuffer {
        match builtin {
            Builtin::Stencil => &mut self.stencil,
            Builtin::GroundDepth => &mut self.ground,
            Builtin::Grid => &mut self.grid,
        }
    }

    /// Maps the resource square onto `tile` under `matrix`.
    fn matrix(&self, matrix: DMat4, tile: TileRect) -> DMat4 {
        let s = tile.size / self.tile_size;
        matrix * DMat4::from_translation(DVec3::new(tile.x, tile.y, 0.0)) * DMat4::from_scale(DVec3::new(s, s, 1.0))
    }
}

pub struct Renderer {
    options: RendererOptions,
    programs: ProgramTable,
    cache: GpuBufferCache,
    view: Option<View>,
    preview: PreviewCache,
    pass: Pass,
    current: Option<ProgramId>,
    pending_stencil: Option<PendingStencil>,
    /// Stencil references written since the stencil buffer was last cleared.
    stencil_written: HashSet<u8>,
    resources: Resources,
    show_grid: bool,
    grid_drawn: HashSet<[u64; 3]>,
    warned: [bool; BufferKind::COUNT],
    destroyed: bool,
}

impl Renderer {
    pub fn new(ctx: &mut dyn GpuContext, programs: ProgramTable, options: RendererOptions) -> Self {
        if options.wide_indices && !ctx.supports_u32_indices() {
            log::warn!("32-bit element indices unavailable, falling back to 16-bit");
        }
        log::info!(
            "tile renderer ready: tile size {}, programs {:?}",
            options.tile_size,
            programs
        );
        Self {
            resources: Resources::new(options.tile_size),
            options,
            programs,
            cache: GpuBufferCache::new(),
            view: None,
            preview: PreviewCache::default(),
            pass: Pass::Opaque,
            current: None,
            pending_stencil: None,
            stencil_written: HashSet::new(),
            show_grid: false,
            grid_drawn: HashSet::new(),
            warned: [false; BufferKind::COUNT],
            destroyed: false,
        }
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    pub fn programs(&self) -> &ProgramTable {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramTable {
        &mut self.programs
    }

    pub fn cache(&self) -> &GpuBufferCache {
        &self.cache
    }

    pub fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn preview_cache(&self) -> &PreviewCache {
        &self.preview
    }

    pub fn init_view(&mut self, width: u32, height: u32, scale: f64, rot_x: f64, rot_z: f64, ground_resolution: f64) {
        self.view = Some(View::new(width, height, scale, rot_x, rot_z, ground_resolution));
        self.preview.invalidate();
    }

    pub fn set_pass(&mut self, ctx: &mut dyn GpuContext, pass: Pass) {
        self.pass = pass;
        self.grid_drawn.clear();
        if pass == Pass::PostAlpha {
            ctx.stencil_mask(0xff);
            ctx.clear(ClearMask::STENCIL);
            self.stencil_written.clear();
        }
    }

    /// Clears colour, depth and stencil.
    pub fn clear(&mut self, ctx: &mut dyn GpuContext, color: [f32; 4]) {
        ctx.clear_color(color);
        ctx.color_mask(ColorMask::ALL);
        ctx.depth_mask(true);
        ctx.stencil_mask(0xff);
        ctx.clear(ClearMask::COLOR | ClearMask::DEPTH | ClearMask::STENCIL);
        self.stencil_written.clear();
        self.pending_stencil = None;
    }

    pub fn set_background(&mut self, ctx: &mut dyn GpuContext, color: [f32; 4]) {
        self.clear(ctx, color);
    }

    pub fn grid(&mut self, show: bool) {
        self.show_grid = show;
    }

    /// Queues a stencil write of `stencil_ref` over `tile`. It is emitted
    /// before the next draw carrying the same reference that either takes
    /// part in the alpha pass or clips to the stencil. A reference already
    /// written since the last stencil clear is not queued again.
    pub fn init_stencil(&mut self, tile: TileRect, stencil_ref: u8) {
        if self.stencil_written.contains(&stencil_ref) {
            return;
        }
        self.pending_stencil = Some(PendingStencil { tile, stencil_ref });
    }

    /// Depth-only pre-pass over a tile footprint at ground level.
    pub fn init_ground_depth(&mut self, ctx: &mut dyn GpuContext, tile: TileRect) {
        let Some(view) = self.view.as_ref() else {
            log::warn!("init_ground_depth before init_view");
            return;
        };
        let matrix = self.resources.matrix(view.matrix, tile);
        self.activate(ctx, ProgramId::Builtin(Builtin::GroundDepth));
        ctx.color_mask(ColorMask::NONE);
        ctx.disable(Capability::Blend);
        ctx.disable(Capability::StencilTest);
        ctx.disable(Capability::ScissorTest);
        ctx.enable(Capability::DepthTest);
        ctx.depth_func(CompareFunc::Less);
        ctx.depth_mask(true);
        ctx.depth_range(0.0, (self.options.flat_depth_value - self.options.depth_epsilon).max(0.0));
        self.draw_builtin(ctx, Builtin::GroundDepth, matrix, &[]);
        ctx.color_mask(ColorMask::ALL);
    }

    /// Draws one tile buffer in the current pass. Returns whether anything
    /// was submitted.
    pub fn draw(&mut self, ctx: &mut dyn GpuContext, tile: TileDraw<'_>, min_3d_z_index: Option<u32>) -> bool {
        let kind = tile.buffer.kind;
        let Some(state) = self.programs.get(kind).map(|p| p.default_state()) else {
            self.warn_missing(kind);
            return false;
        };
        let program_pass = self.programs.get(kind).is_some_and(|p| p.pass(self.pass));

        let flat_above_3d = tile.buffer.is_flat() && min_3d_z_index.is_some_and(|min| tile.z_index > min);
        let mut passes = tile.buffer.passes;
        if flat_above_3d && passes.contains(PassMask::OPAQUE) {
            passes.remove(PassMask::OPAQUE);
            passes.insert(PassMask::ALPHA);
        }
        if !program_pass || !passes.contains(self.pass.mask()) {
            return false;
        }

        let Some(draw) = self.draw_context(&tile, &state, min_3d_z_index, flat_above_3d) else {
            log::warn!("draw before init_view");
            return false;
        };

        let wants_stencil = match self.pass {
            Pass::Opaque => draw.stencil,
            Pass::Alpha => true,
            Pass::PostAlpha => false,
        };
        if wants_stencil {
            if let Some(pending) = self.pending_stencil.filter(|p| p.stencil_ref == tile.stencil_ref) {
                self.pending_stencil = None;
                self.draw_stencil(ctx, pending);
            }
        }

        self.cache.upload(ctx, &mut *tile.buffer);
        self.activate(ctx, ProgramId::Buffer(kind));
        self.apply_state(ctx, &draw, &state, &*tile.buffer);

        let uniforms = tile.buffer.uniform_data().clone();
        let standard = self.standard_uniforms(&draw);
        let buffer: &GeometryBuffer = &*tile.buffer;
        let Some(program) = self.programs.get_mut(kind) else {
            return false;
        };
        program.init(ctx, buffer, &draw);
        program.init_attributes(ctx, buffer, &self.cache);
        program.init_uniforms(ctx, &uniforms);
        for (uniform, value) in standard {
            if program.has_uniform(uniform) {
                program.set_uniform(ctx, uniform, value);
            }
        }
        program.draw(ctx, buffer, &self.cache);

        if self.show_grid && self.pass == Pass::Alpha && self.grid_drawn.insert(tile.tile.key()) {
            self.draw_grid(ctx, &draw, tile.tile);
        }
        true
    }

    /// Releases the GPU buffers of an evicted tile buffer. Safe to repeat.
    pub fn release_buffer(&mut self, ctx: &mut dyn GpuContext, buffer: &GeometryBuffer) -> usize {
        self.cache.release(ctx, buffer)
    }

    /// Releases every GPU buffer still held, including the renderer's own.
    /// Safe to repeat.
    pub fn destroy(&mut self, ctx: &mut dyn GpuContext) {
        if self.destroyed {
            return;
        }
        self.deactivate(ctx);
        let released = self.cache.release_all(ctx);
        self.destroyed = true;
        log::info!("tile renderer destroyed, released {released} gpu buffers");
    }

    fn warn_missing(&mut self, kind: BufferKind) {
        let warned = &mut self.warned[kind.index()];
        if !*warned {
            *warned = true;
            log::warn!("no program registered for {} buffers, skipping", kind.name());
        }
    }

    fn draw_context(
        &mut self,
        tile: &TileDraw<'_>,
        state: &ProgramState,
        min_3d_z_index: Option<u32>,
        flat_above_3d: bool,
    ) -> Option<DrawContext> {
        let view = self.view.as_ref()?;
        let overrides = &tile.buffer.overrides;
        let max_scale = self.options.max_scissor_scale;

        let (matrix, zoom, scissor, stencil) = match tile.preview {
            Some(p) => {
                let matrix = self.preview.matrix(view, p.dx, p.dy, p.scale);
                let scissor = view.scissor(p.clip.x, p.clip.y, p.clip.size, max_scale);
                (matrix, p.scale, Some(scissor), true)
            }
            None => {
                let scissor = overrides
                    .scissor
                    .unwrap_or(state.scissor)
                    .then(|| view.scissor(tile.tile.x, tile.tile.y, tile.tile.size, max_scale));
                let stencil = overrides.clip.unwrap_or(state.clip);
                (view.matrix, 1.0, scissor, stencil)
            }
        };

        let depth = depth_from_z_index(tile.z_index);
        let depth_range = if tile.buffer.is_flat() {
            (self.options.flat_depth_value, depth)
        } else {
            (depth, depth)
        };
        let depth_test = overrides.depth.unwrap_or(state.depth) && !flat_above_3d;
        let polygon_offset = (depth_test && tile.buffer.is_flat())
            .then(|| (0.0, -(tile.z_index.min(MAX_Z_INDEX) as f32) * self.options.polygon_offset_units));

        Some(DrawContext {
            pass: self.pass,
            z_index: tile.z_index,
            min_3d_z_index,
            depth,
            depth_range,
            stencil_ref: tile.stencil_ref,
            stencil,
            scissor,
            matrix,
            top_left: DVec2::new(tile.tile.x, tile.tile.y),
            tile_scale: tile.tile_scale,
            zoom,
            flat_above_3d,
            polygon_offset,
        })
    }

    fn apply_state(&self, ctx: &mut dyn GpuContext, draw: &DrawContext, state: &ProgramState, buffer: &GeometryBuffer) {
        let overrides = &buffer.overrides;
        let pass = draw.pass;

        let blend = overrides.blend.unwrap_or(state.blend || pass != Pass::Opaque);
        ctx.set_enabled(Capability::Blend, blend);

        let depth_test = overrides.depth.unwrap_or(state.depth) && !draw.flat_above_3d;
        ctx.set_enabled(Capability::DepthTest, depth_test);
        ctx.depth_func(match pass {
            Pass::Opaque => CompareFunc::Less,
            Pass::Alpha | Pass::PostAlpha => CompareFunc::LessEqual,
        });

        let color_mask = overrides.color_mask.unwrap_or(ColorMask::ALL);
        let (depth_mask, color_mask) = match pass {
            // Depth-only prepass; colour follows in the post-alpha pass.
            Pass::Alpha if buffer.needs_2_alpha_passes() => (true, ColorMask::NONE),
            Pass::PostAlpha => (false, color_mask),
            _ => (overrides.depth_mask.unwrap_or(state.depth_mask), color_mask),
        };
        ctx.depth_mask(depth_mask);
        ctx.color_mask(color_mask);
        ctx.depth_range(draw.depth_range.0, draw.depth_range.1);

        match draw.polygon_offset {
            Some((factor, units)) => {
                ctx.enable(Capability::PolygonOffsetFill);
                ctx.polygon_offset(factor, units);
            }
            None => ctx.disable(Capability::PolygonOffsetFill),
        }

        match draw.scissor {
            Some(rect) => {
                ctx.enable(Capability::ScissorTest);
                ctx.scissor(rect);
            }
            None => ctx.disable(Capability::ScissorTest),
        }

        if pass == Pass::PostAlpha {
            // Passes while the reference exceeds the stored value, then
            // stores it, so each pixel blends once per tile.
            ctx.enable(Capability::StencilTest);
            ctx.stencil_mask(0xff);
            ctx.stencil_func(CompareFunc::Greater, draw.stencil_ref, 0xff);
            ctx.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Replace);
        } else if draw.stencil && self.stencil_written.contains(&draw.stencil_ref) {
            ctx.enable(Capability::StencilTest);
            ctx.stencil_mask(0x00);
            ctx.stencil_func(CompareFunc::Equal, draw.stencil_ref, 0xff);
            ctx.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
        } else {
            if draw.stencil {
                log::trace!("stencil {} not written yet, clipping by scissor only", draw.stencil_ref);
            }
            ctx.disable(Capability::StencilTest);
        }

        match buffer.cull_face().or(state.cull_face) {
            Some(face) => {
                ctx.enable(Capability::CullFace);
                ctx.cull_face(face);
            }
            None => ctx.disable(Capability::CullFace),
        }
    }

    fn standard_uniforms(&self, draw: &DrawContext) -> Vec<(StandardUniform, UniformValue)> {
        let Some(view) = self.view.as_ref() else {
            return Vec::new();
        };
        StandardUniform::ALL
            .into_iter()
            .map(|uniform| {
                let value = match uniform {
                    StandardUniform::Matrix => UniformValue::Mat4(to_uniform(&draw.matrix)),
                    StandardUniform::InverseMatrix => UniformValue::Mat4(to_uniform(&draw.matrix.inverse())),
                    StandardUniform::Resolution => UniformValue::Vec2([view.width as f32, view.height as f32]),
                    StandardUniform::Scale => UniformValue::Float((view.scale * draw.zoom) as f32),
                    StandardUniform::TopLeft => {
                        UniformValue::Vec2([draw.top_left.x as f32, draw.top_left.y as f32])
                    }
                    StandardUniform::TileScale => UniformValue::Float(draw.tile_scale as f32),
                    StandardUniform::Rotate => UniformValue::Float(view.rot_z as f32),
                    StandardUniform::FixedView => UniformValue::Mat4(to_uniform(&view.fixed_view)),
                    StandardUniform::ZMeterToPixel => UniformValue::Float(view.z_meter_to_pixel as f32),
                };
                (uniform, value)
            })
            .collect()
    }

    /// Makes `id` the active program, unbinding the previous one first.
    fn activate(&mut self, ctx: &mut dyn GpuContext, id: ProgramId) {
        if self.current == Some(id) {
            return;
        }
        self.deactivate(ctx);
        ctx.use_program(id);
        match id {
            ProgramId::Buffer(kind) => {
                if let Some(program) = self.programs.get_mut(kind) {
                    program.bind_framebuffer(ctx);
                }
            }
            ProgramId::Builtin(_) => ctx.bind_framebuffer(None),
        }
        self.current = Some(id);
    }

    fn deactivate(&mut self, ctx: &mut dyn GpuContext) {
        match self.current.take() {
            Some(ProgramId::Buffer(kind)) => {
                if let Some(program) = self.programs.get_mut(kind) {
                    program.disable_attributes(ctx);
                }
            }
            Some(ProgramId::Builtin(_)) => ctx.disable_attribute(names::A_POSITION),
            None => {}
        }
    }

    fn draw_stencil(&mut self, ctx: &mut dyn GpuContext, pending: PendingStencil) {
        let Some(view) = self.view.as_ref() else {
            return;
        };
        let matrix = self.resources.matrix(view.matrix, pending.tile);
        self.activate(ctx, ProgramId::Builtin(Builtin::Stencil));
        ctx.color_mask(ColorMask::NONE);
        ctx.depth_mask(false);
        ctx.disable(Capability::DepthTest);
        ctx.disable(Capability::Blend);
        ctx.enable(Capability::StencilTest);
        ctx.stencil_mask(0xff);
        ctx.stencil_func(CompareFunc::Always, pending.stencil_ref, 0xff);
        ctx.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Replace);
        self.draw_builtin(ctx, Builtin::Stencil, matrix, &[]);
        ctx.color_mask(ColorMask::ALL);
        self.stencil_written.insert(pending.stencil_ref);
    }

    fn draw_grid(&mut self, ctx: &mut dyn GpuContext, draw: &DrawContext, tile: TileRect) {
        let matrix = self.resources.matrix(draw.matrix, tile);
        self.activate(ctx, ProgramId::Builtin(Builtin::Grid));
        ctx.disable(Capability::DepthTest);
        ctx.disable(Capability::StencilTest);
        ctx.disable(Capability::ScissorTest);
        ctx.enable(Capability::Blend);
        ctx.color_mask(ColorMask::ALL);
        let uniforms = [
            (U_COLOR, UniformValue::Vec4(self.options.grid_color)),
            (U_WIDTH, UniformValue::Float(self.options.grid_width)),
        ];
        self.draw_builtin(ctx, Builtin::Grid, matrix, &uniforms);
    }

    fn draw_builtin(
        &mut self,
        ctx: &mut dyn GpuContext,
        builtin: Builtin,
        matrix: DMat4,
        uniforms: &[(&str, UniformValue)],
    ) {
        let buffer = self.resources.get(builtin);
        self.cache.upload(ctx, buffer);
        if let Some((name, attr)) = buffer.attributes().next() {
            if let Some(handle) = self.cache.get(attr.id) {
                let layout = AttributeLayout {
                    size: attr.size,
                    element: attr.element_type(),
                    normalized: attr.normalized,
                    stride: attr.stride,
                    offset: attr.offset,
                };
                ctx.bind_attribute(name, handle, layout);
            }
        }
        ctx.set_uniform(StandardUniform::Matrix.name(), UniformValue::Mat4(to_uniform(&matrix)));
        for (name, value) in uniforms {
            ctx.set_uniform(name, *value);
        }
        for group in buffer.groups() {
            ctx.draw_arrays(group.primitive(), 0, group.element_count() as u32);
        }
    }
}
