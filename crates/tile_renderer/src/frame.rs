//! GL-style state machine replayed into wgpu draw calls.
//!
//! [`FrameRecorder`] consumes the [`GlCommand`]s a frame issues and
//! snapshots the current state at every draw into a [`DrawCall`]. Clears
//! split the frame into [`Segment`]s, each encoded as one render pass whose
//! load ops carry the clear.

use crate::gpu::{AttributeLayout, Capability, ClearMask, CompareFunc, GlCommand, GpuBufferHandle, ProgramId, ScissorRect, StencilOp};
use crate::program::StandardUniform;
use crate::renderer::U_COLOR;
use crate::tile_pipeline::{
    attribute_slot, color_writes, compare_function, cull_mode, index_format, is_fill, stencil_operation, topology,
    DrawUniforms, PipelineKey, Shading, StencilKey, VertexStage, ATTRIBUTE_SLOTS, DEPTH_UNIT,
};
use std::collections::{BTreeMap, HashMap};
use tile_geometry::{names, ColorMask, CullFace, Primitive, UniformValue};

#[derive(Debug, Clone, Copy, PartialEq)]
struct GlState {
    blend: bool,
    depth_test: bool,
    depth_func: CompareFunc,
    depth_mask: bool,
    depth_range: (f32, f32),
    stencil_test: bool,
    stencil_func: CompareFunc,
    stencil_ref: u8,
    stencil_read_mask: u8,
    stencil_ops: (StencilOp, StencilOp, StencilOp),
    stencil_write_mask: u8,
    scissor_test: bool,
    scissor: Option<ScissorRect>,
    color_mask: ColorMask,
    polygon_offset_fill: bool,
    polygon_offset: (f32, f32),
    cull: bool,
    cull_face: CullFace,
    clear_color: [f32; 4],
}

impl Default for GlState {
    fn default() -> Self {
        Self {
            blend: false,
            depth_test: false,
            depth_func: CompareFunc::Less,
            depth_mask: true,
            depth_range: (0.0, 1.0),
            stencil_test: false,
            stencil_func: CompareFunc::Always,
            stencil_ref: 0,
            stencil_read_mask: 0xff,
            stencil_ops: (StencilOp::Keep, StencilOp::Keep, StencilOp::Keep),
            stencil_write_mask: 0xff,
            scissor_test: false,
            scissor: None,
            color_mask: ColorMask::ALL,
            polygon_offset_fill: false,
            polygon_offset: (0.0, 0.0),
            cull: false,
            cull_face: CullFace::Back,
            clear_color: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawRange {
    Arrays {
        first: u32,
        count: u32,
    },
    Elements {
        handle: GpuBufferHandle,
        count: u32,
        format: wgpu::IndexFormat,
    },
}

/// One draw with everything the encoder needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub key: PipelineKey,
    /// Attribute buffer per shader slot.
    pub attributes: [Option<GpuBufferHandle>; ATTRIBUTE_SLOTS],
    pub uniforms: DrawUniforms,
    /// Clamped to the frame; the full frame when scissoring is off.
    pub scissor: ScissorRect,
    pub stencil_reference: u32,
    pub range: DrawRange,
}

/// Draws sharing one render pass. The clears happen on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub clear_color: Option<[f32; 4]>,
    pub clear_depth: bool,
    pub clear_stencil: bool,
    pub draws: Vec<DrawCall>,
}

#[derive(Debug)]
pub struct FrameRecorder {
    width: u32,
    height: u32,
    state: GlState,
    program: Option<ProgramId>,
    /// An offscreen framebuffer is bound; its draws are not replayed.
    offscreen: bool,
    attributes: [Option<(GpuBufferHandle, AttributeLayout)>; ATTRIBUTE_SLOTS],
    /// Uniform values stick to the program they were set on.
    uniforms: HashMap<ProgramId, BTreeMap<String, UniformValue>>,
    segments: Vec<Segment>,
}

impl FrameRecorder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            state: GlState::default(),
            program: None,
            offscreen: false,
            attributes: [None; ATTRIBUTE_SLOTS],
            uniforms: HashMap::new(),
            segments: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn draw_count(&self) -> usize {
        self.segments.iter().map(|s| s.draws.len()).sum()
    }

    /// Hands over the recorded segments. State carries over to the next
    /// frame, as it does on a GL context.
    pub fn finish(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.segments)
    }

    pub fn apply(&mut self, cmd: &GlCommand) {
        match cmd {
            GlCommand::Enable(cap) => self.set_capability(*cap, true),
            GlCommand::Disable(cap) => self.set_capability(*cap, false),
            GlCommand::DepthFunc(func) => self.state.depth_func = *func,
            GlCommand::DepthMask(write) => self.state.depth_mask = *write,
            GlCommand::DepthRange(near, far) => self.state.depth_range = (*near, *far),
            GlCommand::StencilFunc { func, reference, mask } => {
                self.state.stencil_func = *func;
                self.state.stencil_ref = *reference;
                self.state.stencil_read_mask = *mask;
            }
            GlCommand::StencilOp { fail, depth_fail, pass } => self.state.stencil_ops = (*fail, *depth_fail, *pass),
            GlCommand::StencilMask(mask) => self.state.stencil_write_mask = *mask,
            GlCommand::Scissor(rect) => self.state.scissor = Some(*rect),
            GlCommand::ColorMask(mask) => self.state.color_mask = *mask,
            GlCommand::PolygonOffset { factor, units } => self.state.polygon_offset = (*factor, *units),
            GlCommand::CullFace(face) => self.state.cull_face = *face,
            GlCommand::ClearColor(color) => self.state.clear_color = *color,
            GlCommand::Clear(mask) => self.clear(*mask),
            GlCommand::CreateBuffer { .. } | GlCommand::UpdateBuffer { .. } | GlCommand::DeleteBuffer(_) => {}
            GlCommand::UseProgram(program) => self.program = Some(*program),
            GlCommand::BindAttribute { name, handle, layout } => {
                if let Some(slot) = attribute_slot(name) {
                    self.attributes[slot] = Some((*handle, *layout));
                }
            }
            GlCommand::DisableAttribute(name) => {
                if let Some(slot) = attribute_slot(name) {
                    self.attributes[slot] = None;
                }
            }
            GlCommand::SetUniform { name, value } => match self.program {
                Some(program) => {
                    self.uniforms.entry(program).or_default().insert(name.clone(), *value);
                }
                None => log::debug!("uniform {name} set without a program"),
            },
            GlCommand::BindFramebuffer(framebuffer) => self.offscreen = framebuffer.is_some(),
            GlCommand::DrawArrays { mode, first, count } => self.draw(
                *mode,
                DrawRange::Arrays {
                    first: *first,
                    count: *count,
                },
            ),
            GlCommand::DrawElements {
                mode,
                count,
                element,
                handle,
            } => match index_format(*element) {
                Some(format) => self.draw(
                    *mode,
                    DrawRange::Elements {
                        handle: *handle,
                        count: *count,
                        format,
                    },
                ),
                None => log::debug!("unsupported index type {element:?}"),
            },
        }
    }

    fn set_capability(&mut self, cap: Capability, on: bool) {
        let s = &mut self.state;
        match cap {
            Capability::Blend => s.blend = on,
            Capability::DepthTest => s.depth_test = on,
            Capability::StencilTest => s.stencil_test = on,
            Capability::ScissorTest => s.scissor_test = on,
            Capability::CullFace => s.cull = on,
            Capability::PolygonOffsetFill => s.polygon_offset_fill = on,
        }
    }

    /// Clears always cover the whole attachment; write masks only decide
    /// whether an attachment is cleared at all.
    fn clear(&mut self, mask: ClearMask) {
        if self.segments.last().map_or(true, |s| !s.draws.is_empty()) {
            self.segments.push(Segment::default());
        }
        let s = self.state;
        let Some(segment) = self.segments.last_mut() else {
            return;
        };
        if mask.contains(ClearMask::COLOR) && s.color_mask != ColorMask::NONE {
            segment.clear_color = Some(s.clear_color);
        }
        if mask.contains(ClearMask::DEPTH) && s.depth_mask {
            segment.clear_depth = true;
        }
        if mask.contains(ClearMask::STENCIL) && s.stencil_write_mask != 0 {
            segment.clear_stencil = true;
        }
    }

    fn draw(&mut self, mode: Primitive, range: DrawRange) {
        let Some(program) = self.program else {
            log::debug!("draw without a program");
            return;
        };
        if self.offscreen {
            log::trace!("{program:?}: offscreen draw skipped");
            return;
        }
        let fill = is_fill(mode);
        if fill && self.state.cull && self.state.cull_face == CullFace::FrontAndBack {
            return;
        }
        if self.attributes[0].is_none() {
            log::debug!("{program:?}: draw without {}", names::A_POSITION);
            return;
        }
        let Some(scissor) = self.scissor() else {
            return;
        };

        let call = DrawCall {
            program,
            key: self.pipeline_key(program, mode, &range),
            attributes: self.attributes.map(|a| a.map(|(handle, _)| handle)),
            uniforms: self.uniforms(program, fill),
            scissor,
            stencil_reference: self.state.stencil_ref as u32,
            range,
        };
        if self.segments.is_empty() {
            self.segments.push(Segment::default());
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.draws.push(call);
        }
    }

    /// `None` when the scissor rect misses the frame.
    fn scissor(&self) -> Option<ScissorRect> {
        let full = ScissorRect {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        };
        let rect = match (self.state.scissor_test, self.state.scissor) {
            (true, Some(rect)) => rect,
            _ => return Some(full),
        };
        let x = rect.x.min(self.width);
        let y = rect.y.min(self.height);
        let width = rect.width.min(self.width - x);
        let height = rect.height.min(self.height - y);
        (width > 0 && height > 0).then_some(ScissorRect { x, y, width, height })
    }

    fn pipeline_key(&self, program: ProgramId, mode: Primitive, range: &DrawRange) -> PipelineKey {
        let s = &self.state;
        let strip_index_format = match (mode, range) {
            (Primitive::LineStrip | Primitive::TriangleStrip, DrawRange::Elements { format, .. }) => Some(*format),
            _ => None,
        };
        let (fail, depth_fail, pass) = s.stencil_ops;
        PipelineKey {
            stage: VertexStage::for_program(program),
            topology: topology(mode),
            strip_index_format,
            blend: s.blend,
            depth_compare: if s.depth_test {
                compare_function(s.depth_func)
            } else {
                wgpu::CompareFunction::Always
            },
            depth_write: s.depth_test && s.depth_mask,
            stencil: s.stencil_test.then(|| StencilKey {
                compare: compare_function(s.stencil_func),
                fail: stencil_operation(fail),
                depth_fail: stencil_operation(depth_fail),
                pass: stencil_operation(pass),
                read_mask: s.stencil_read_mask,
                write_mask: s.stencil_write_mask,
            }),
            color_writes: color_writes(s.color_mask),
            cull_mode: if s.cull && is_fill(mode) {
                cull_mode(s.cull_face)
            } else {
                None
            },
        }
    }

    fn uniforms(&self, program: ProgramId, fill: bool) -> DrawUniforms {
        let mut u = DrawUniforms {
            resolution: [self.width as f32, self.height as f32],
            shading: Shading::for_program(program) as u32,
            ..DrawUniforms::default()
        };
        for (name, value) in self.uniforms.get(&program).into_iter().flatten() {
            set_uniform(&mut u, name, value);
        }

        let s = &self.state;
        u.depth_range = [s.depth_range.0, s.depth_range.1];
        // Only the constant term of the offset is emulated.
        if fill && s.polygon_offset_fill {
            u.depth_offset = s.polygon_offset.1 * DEPTH_UNIT;
        }
        for (slot, attr) in self.attributes.iter().enumerate() {
            if let Some((_, layout)) = attr {
                u.attributes[slot] = [
                    layout.element as u32,
                    layout.size as u32 | (layout.normalized as u32) << 8,
                    layout.stride,
                    layout.offset,
                ];
            }
        }
        u
    }
}

fn set_uniform(u: &mut DrawUniforms, name: &str, value: &UniformValue) {
    let standard = StandardUniform::ALL.into_iter().find(|s| s.name() == name);
    match (standard, *value) {
        (Some(StandardUniform::Matrix), UniformValue::Mat4(m)) => u.matrix = m,
        (Some(StandardUniform::FixedView), UniformValue::Mat4(m)) => u.fixed_view = m,
        (Some(StandardUniform::Resolution), UniformValue::Vec2(v)) => u.resolution = v,
        (Some(StandardUniform::TopLeft), UniformValue::Vec2(v)) => u.top_left = v,
        (Some(StandardUniform::TileScale), UniformValue::Float(v)) => u.tile_scale = v,
        (Some(StandardUniform::Scale), UniformValue::Float(v)) => u.scale = v,
        (Some(StandardUniform::ZMeterToPixel), UniformValue::Float(v)) => u.z_meter_to_pixel = v,
        (None, UniformValue::Vec4(c)) if name == U_COLOR => u.color = c,
        (None, UniformValue::Float(w)) if name == names::U_STROKE_WIDTH => u.stroke_width = w,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Builtin, RecordingContext};
    use crate::options::RendererOptions;
    use crate::program::ProgramTable;
    use crate::renderer::{Renderer, TileDraw, TileRect};
    use crate::view::depth_from_z_index;
    use glam::DVec2;
    use tile_geometry::template::PolygonBuffer;
    use tile_geometry::{BufferKind, ElementType, GeometryBuffer, Pass, TemplateBuffer};

    fn position(handle: u32) -> GlCommand {
        GlCommand::BindAttribute {
            name: names::A_POSITION.to_owned(),
            handle: GpuBufferHandle(handle),
            layout: AttributeLayout {
                size: 2,
                element: ElementType::Float,
                normalized: false,
                stride: 0,
                offset: 0,
            },
        }
    }

    fn replay(recorder: &mut FrameRecorder, cmds: &[GlCommand]) {
        for cmd in cmds {
            recorder.apply(cmd);
        }
    }

    fn polygon() -> GeometryBuffer {
        let mut p = PolygonBuffer::new(false);
        p.add_polygon(
            &[vec![
                DVec2::new(0.0, 0.0),
                DVec2::new(100.0, 0.0),
                DVec2::new(100.0, 100.0),
                DVec2::new(0.0, 100.0),
            ]],
            0.0,
        );
        p.finalize().unwrap()
    }

    #[test]
    fn clears_split_the_frame_into_passes() {
        let mut rec = FrameRecorder::new(64, 64);
        replay(
            &mut rec,
            &[
                GlCommand::ClearColor([0.5, 0.5, 0.5, 1.0]),
                GlCommand::Clear(ClearMask::all()),
                GlCommand::UseProgram(ProgramId::Builtin(Builtin::Stencil)),
                position(1),
                GlCommand::Enable(Capability::StencilTest),
                GlCommand::StencilFunc {
                    func: CompareFunc::Always,
                    reference: 3,
                    mask: 0xff,
                },
                GlCommand::StencilOp {
                    fail: StencilOp::Keep,
                    depth_fail: StencilOp::Keep,
                    pass: StencilOp::Replace,
                },
                GlCommand::ColorMask(ColorMask::NONE),
                GlCommand::DrawArrays {
                    mode: Primitive::Triangles,
                    first: 0,
                    count: 6,
                },
                GlCommand::Clear(ClearMask::STENCIL),
            ],
        );

        let segments = rec.finish();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].clear_color, Some([0.5, 0.5, 0.5, 1.0]));
        assert!(segments[0].clear_depth && segments[0].clear_stencil);

        let draw = &segments[0].draws[0];
        assert_eq!(draw.stencil_reference, 3);
        assert_eq!(draw.key.color_writes, wgpu::ColorWrites::empty());
        let stencil = draw.key.stencil.unwrap();
        assert_eq!(stencil.compare, wgpu::CompareFunction::Always);
        assert_eq!(stencil.pass, wgpu::StencilOperation::Replace);
        assert_eq!(draw.range, DrawRange::Arrays { first: 0, count: 6 });

        // Colour mask is still off, so only the stencil is cleared.
        assert_eq!(segments[1].clear_color, None);
        assert!(segments[1].clear_stencil && !segments[1].clear_depth);
        assert!(segments[1].draws.is_empty());
        assert!(rec.finish().is_empty());
    }

    #[test]
    fn renderer_frame_replays_stencil_then_tile() {
        let mut ctx = RecordingContext::default();
        let mut r = Renderer::new(&mut ctx, ProgramTable::standard(), RendererOptions::default());
        r.init_view(512, 512, 1.0, 0.0, 0.0, 1.0);
        let mut buffer = polygon();
        let tile = TileRect::new(0.0, 0.0, 256.0);

        r.clear(&mut ctx, [1.0, 1.0, 1.0, 1.0]);
        r.set_pass(&mut ctx, Pass::Opaque);
        r.init_stencil(tile, 4);
        assert!(r.draw(
            &mut ctx,
            TileDraw {
                buffer: &mut buffer,
                tile,
                tile_scale: 1.0,
                z_index: 10,
                stencil_ref: 4,
                preview: None,
            },
            None,
        ));

        let mut rec = FrameRecorder::new(512, 512);
        replay(&mut rec, &ctx.take());
        let segments = rec.finish();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].clear_color, Some([1.0; 4]));

        let draws = &segments[0].draws;
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].program, ProgramId::Builtin(Builtin::Stencil));
        assert_eq!(draws[0].key.stencil.map(|s| s.compare), Some(wgpu::CompareFunction::Always));
        assert_eq!(draws[0].uniforms.depth_offset, 0.0);

        let tile_draw = &draws[1];
        assert_eq!(tile_draw.program, ProgramId::Buffer(BufferKind::Polygon));
        assert_eq!(tile_draw.key.stage, VertexStage::Surface);
        assert_eq!(tile_draw.key.stencil.map(|s| s.compare), Some(wgpu::CompareFunction::Equal));
        assert_eq!(tile_draw.key.depth_compare, wgpu::CompareFunction::Less);
        assert_eq!(tile_draw.stencil_reference, 4);
        assert!(matches!(tile_draw.range, DrawRange::Elements { format: wgpu::IndexFormat::Uint16, .. }));

        let u = &tile_draw.uniforms;
        assert_eq!(u.depth_range, [1.0, depth_from_z_index(10)]);
        assert_eq!(u.depth_offset, -10.0 * DEPTH_UNIT);
        assert_eq!(u.attributes[0][0], ElementType::Short as u32);
        assert_eq!(u.attributes[0][1], 2);
        assert_eq!(u.resolution, [512.0, 512.0]);
        assert_eq!(u.shading, Shading::Flat as u32);
        assert!(tile_draw.attributes[0].is_some());
    }

    #[test]
    fn culling_both_faces_drops_only_filled_draws() {
        let mut rec = FrameRecorder::new(64, 64);
        replay(
            &mut rec,
            &[
                GlCommand::UseProgram(ProgramId::Builtin(Builtin::Grid)),
                position(1),
                GlCommand::Enable(Capability::CullFace),
                GlCommand::CullFace(CullFace::FrontAndBack),
                GlCommand::DrawArrays {
                    mode: Primitive::Triangles,
                    first: 0,
                    count: 3,
                },
                GlCommand::DrawArrays {
                    mode: Primitive::LineStrip,
                    first: 0,
                    count: 5,
                },
                GlCommand::CullFace(CullFace::Back),
                GlCommand::DrawArrays {
                    mode: Primitive::Triangles,
                    first: 0,
                    count: 3,
                },
            ],
        );
        let segments = rec.finish();
        let draws = &segments[0].draws;
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].key.topology, wgpu::PrimitiveTopology::LineStrip);
        assert_eq!(draws[0].key.cull_mode, None);
        assert_eq!(draws[1].key.cull_mode, Some(wgpu::Face::Back));
    }

    #[test]
    fn incomplete_draws_are_skipped() {
        let mut rec = FrameRecorder::new(64, 64);
        let draw = GlCommand::DrawArrays {
            mode: Primitive::Triangles,
            first: 0,
            count: 3,
        };
        // No program, then no position, then offscreen.
        rec.apply(&draw);
        rec.apply(&GlCommand::UseProgram(ProgramId::Buffer(BufferKind::Polygon)));
        rec.apply(&draw);
        rec.apply(&position(2));
        rec.apply(&GlCommand::BindFramebuffer(Some(1)));
        rec.apply(&draw);
        assert_eq!(rec.draw_count(), 0);

        rec.apply(&GlCommand::BindFramebuffer(None));
        rec.apply(&draw);
        assert_eq!(rec.draw_count(), 1);

        rec.apply(&GlCommand::DisableAttribute(names::A_POSITION.to_owned()));
        rec.apply(&draw);
        assert_eq!(rec.draw_count(), 1);
    }

    #[test]
    fn scissor_is_clamped_to_the_frame() {
        let mut rec = FrameRecorder::new(100, 80);
        let draw = GlCommand::DrawArrays {
            mode: Primitive::Triangles,
            first: 0,
            count: 3,
        };
        replay(
            &mut rec,
            &[
                GlCommand::UseProgram(ProgramId::Builtin(Builtin::Grid)),
                position(1),
                GlCommand::Scissor(ScissorRect {
                    x: 60,
                    y: 50,
                    width: 100,
                    height: 100,
                }),
                draw.clone(),
                GlCommand::Enable(Capability::ScissorTest),
                draw.clone(),
                GlCommand::Scissor(ScissorRect {
                    x: 200,
                    y: 0,
                    width: 10,
                    height: 10,
                }),
                draw,
            ],
        );
        let segments = rec.finish();
        let rects: Vec<_> = segments[0].draws.iter().map(|d| d.scissor).collect();
        assert_eq!(
            rects,
            vec![
                ScissorRect {
                    x: 0,
                    y: 0,
                    width: 100,
                    height: 80,
                },
                ScissorRect {
                    x: 60,
                    y: 50,
                    width: 40,
                    height: 30,
                },
            ]
        );
    }

    #[test]
    fn uniforms_stay_with_their_program() {
        let mut rec = FrameRecorder::new(64, 64);
        let line = ProgramId::Buffer(BufferKind::Line);
        let grid = ProgramId::Builtin(Builtin::Grid);
        let draw = GlCommand::DrawArrays {
            mode: Primitive::Triangles,
            first: 0,
            count: 3,
        };
        replay(
            &mut rec,
            &[
                GlCommand::UseProgram(line),
                position(1),
                GlCommand::SetUniform {
                    name: names::U_STROKE_WIDTH.to_owned(),
                    value: UniformValue::Float(6.0),
                },
                GlCommand::SetUniform {
                    name: StandardUniform::TopLeft.name().to_owned(),
                    value: UniformValue::Vec2([256.0, 512.0]),
                },
                GlCommand::SetUniform {
                    name: U_COLOR.to_owned(),
                    value: UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]),
                },
                draw.clone(),
                GlCommand::UseProgram(grid),
                draw.clone(),
                GlCommand::UseProgram(line),
                draw,
            ],
        );
        let segments = rec.finish();
        let draws = &segments[0].draws;
        assert_eq!(draws[0].uniforms.stroke_width, 6.0);
        assert_eq!(draws[0].uniforms.top_left, [256.0, 512.0]);
        assert_eq!(draws[0].uniforms.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(draws[0].key.stage, VertexStage::Line);
        assert_eq!(draws[1].uniforms, DrawUniforms {
            resolution: [64.0, 64.0],
            attributes: draws[1].uniforms.attributes,
            ..DrawUniforms::default()
        });
        assert_eq!(draws[2].uniforms, draws[0].uniforms);
    }
}
