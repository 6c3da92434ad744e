//! [`GpuContext`] backed by wgpu.
//!
//! Buffer commands hit the device immediately. State and draw commands go
//! through a [`FrameRecorder`]; [`WgpuContext::encode`] then turns the
//! recorded frame into render passes, one per clear, with a pipeline per
//! distinct state block and one uniform slot per draw.

use crate::context::GfxContext;
use crate::frame::{DrawCall, DrawRange, FrameRecorder};
use crate::gpu::{
    AttributeLayout, BufferTarget, Capability, ClearMask, CompareFunc, GlCommand, GpuBufferHandle, GpuContext,
    ProgramId, ScissorRect, StencilOp,
};
use crate::tile_pipeline::{DrawUniforms, TilePipelines, ATTRIBUTE_SLOTS};
use std::collections::HashMap;
use std::sync::Arc;
use tile_geometry::{ColorMask, CullFace, ElementType, Primitive, UniformValue};
use wgpu::util::DeviceExt;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

const ALIGN: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

/// Rounds up to the copy alignment. Empty data still gets one word, since
/// storage bindings may not be empty.
fn padded(data: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    let len = data.len().max(1).next_multiple_of(ALIGN);
    if data.len() == len {
        data.into()
    } else {
        let mut v = data.to_vec();
        v.resize(len, 0);
        v.into()
    }
}

struct Slot {
    buffer: wgpu::Buffer,
    target: BufferTarget,
}

type AttributeKey = [Option<GpuBufferHandle>; ATTRIBUTE_SLOTS];

pub struct WgpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    wide_indices: bool,
    buffers: HashMap<GpuBufferHandle, Slot>,
    next_handle: u32,
    recorder: FrameRecorder,
    pipelines: TilePipelines,
    uniform_buffer: Option<wgpu::Buffer>,
}

impl WgpuContext {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        color_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        wide_indices: bool,
    ) -> Self {
        let pipelines = TilePipelines::new(&device, color_format, DEPTH_FORMAT);
        Self {
            device,
            queue,
            wide_indices,
            buffers: HashMap::new(),
            next_handle: 1,
            recorder: FrameRecorder::new(width, height),
            pipelines,
            uniform_buffer: None,
        }
    }

    /// Renders into the surface format, or sRGB RGBA when headless.
    pub fn from_gfx(gfx: &GfxContext) -> Self {
        let format = gfx
            .config
            .as_ref()
            .map(|c| c.format)
            .unwrap_or(wgpu::TextureFormat::Rgba8UnormSrgb);
        Self::new(
            gfx.device.clone(),
            gfx.queue.clone(),
            format,
            gfx.size.width,
            gfx.size.height,
            gfx.wide_indices,
        )
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.recorder.resize(width, height);
    }

    pub fn buffer(&self, handle: GpuBufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle).map(|s| &s.buffer)
    }

    pub fn recorder(&self) -> &FrameRecorder {
        &self.recorder
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Drops the recorded frame without drawing it. Returns the number of
    /// draws dropped.
    pub fn discard_frame(&mut self) -> usize {
        self.recorder.finish().iter().map(|s| s.draws.len()).sum()
    }

    /// Encodes the recorded frame into `encoder`. Returns the number of
    /// draws issued.
    pub fn encode(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        color: &wgpu::TextureView,
        depth: &wgpu::TextureView,
    ) -> usize {
        let segments = self.recorder.finish();
        let draws: Vec<&DrawCall> = segments.iter().flat_map(|s| &s.draws).collect();
        for draw in &draws {
            self.pipelines.prepare(&self.device, draw.key);
        }

        let stride = self.pipelines.uniform_stride;
        let uniform_group = self.write_uniforms(&draws, stride);
        let mut attribute_groups: HashMap<AttributeKey, wgpu::BindGroup> = HashMap::new();
        for draw in &draws {
            if !attribute_groups.contains_key(&draw.attributes) {
                let group = self.attribute_group(&draw.attributes);
                attribute_groups.insert(draw.attributes, group);
            }
        }

        let mut index = 0u64;
        let mut issued = 0;
        for segment in &segments {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match segment.clear_color {
                            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: r as f64,
                                g: g as f64,
                                b: b as f64,
                                a: a as f64,
                            }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: if segment.clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if segment.clear_stencil {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &segment.draws {
                let offset = (index * stride) as u32;
                index += 1;
                let (Some(pipeline), Some(uniforms), Some(attributes)) = (
                    self.pipelines.get(&draw.key),
                    uniform_group.as_ref(),
                    attribute_groups.get(&draw.attributes),
                ) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, uniforms, &[offset]);
                pass.set_bind_group(1, attributes, &[]);
                let ScissorRect { x, y, width, height } = draw.scissor;
                pass.set_scissor_rect(x, y, width, height);
                pass.set_stencil_reference(draw.stencil_reference);
                match draw.range {
                    DrawRange::Arrays { first, count } => pass.draw(first..first + count, 0..1),
                    DrawRange::Elements { handle, count, format } => {
                        let Some(slot) = self.buffers.get(&handle) else {
                            log::debug!("draw with unknown index buffer {handle:?}");
                            continue;
                        };
                        pass.set_index_buffer(slot.buffer.slice(..), format);
                        pass.draw_indexed(0..count, 0, 0..1);
                    }
                }
                issued += 1;
            }
        }
        log::trace!(
            "encoded {issued} draws in {} passes, {} pipelines",
            segments.len(),
            self.pipelines.len()
        );
        issued
    }

    /// Packs every draw's uniforms at `stride` into the shared buffer.
    fn write_uniforms(&mut self, draws: &[&DrawCall], stride: u64) -> Option<wgpu::BindGroup> {
        if draws.is_empty() {
            return None;
        }
        let size = std::mem::size_of::<DrawUniforms>();
        let mut bytes = vec![0u8; draws.len() * stride as usize];
        for (i, draw) in draws.iter().enumerate() {
            let at = i * stride as usize;
            bytes[at..at + size].copy_from_slice(bytemuck::bytes_of(&draw.uniforms));
        }

        let needed = bytes.len() as u64;
        if self.uniform_buffer.as_ref().map_or(true, |b| b.size() < needed) {
            if let Some(old) = self.uniform_buffer.take() {
                old.destroy();
            }
            self.uniform_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Tile Uniform Buffer"),
                size: needed.next_power_of_two(),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        let buffer = self.uniform_buffer.as_ref()?;
        self.queue.write_buffer(buffer, 0, &bytes);

        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Uniform Bind Group"),
            layout: &self.pipelines.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(size as u64),
                }),
            }],
        }))
    }

    fn attribute_group(&self, attributes: &AttributeKey) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = attributes
            .iter()
            .enumerate()
            .map(|(binding, handle)| {
                let buffer = handle
                    .and_then(|h| self.buffers.get(&h))
                    .map(|s| &s.buffer)
                    .unwrap_or(&self.pipelines.empty_attribute);
                wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffer.as_entire_binding(),
                }
            })
            .collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Attribute Bind Group"),
            layout: &self.pipelines.attribute_layout,
            entries: &entries,
        })
    }

    fn usage(target: BufferTarget) -> wgpu::BufferUsages {
        match target {
            // Read by the vertex shader as raw words.
            BufferTarget::Vertex => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            BufferTarget::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        }
    }

    fn record(&mut self, cmd: GlCommand) {
        self.recorder.apply(&cmd);
    }
}

impl GpuContext for WgpuContext {
    fn enable(&mut self, cap: Capability) {
        self.record(GlCommand::Enable(cap));
    }

    fn disable(&mut self, cap: Capability) {
        self.record(GlCommand::Disable(cap));
    }

    fn depth_func(&mut self, func: CompareFunc) {
        self.record(GlCommand::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GlCommand::DepthMask(write));
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.record(GlCommand::DepthRange(near, far));
    }

    fn stencil_func(&mut self, func: CompareFunc, reference: u8, mask: u8) {
        self.record(GlCommand::StencilFunc { func, reference, mask });
    }

    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.record(GlCommand::StencilOp { fail, depth_fail, pass });
    }

    fn stencil_mask(&mut self, mask: u8) {
        self.record(GlCommand::StencilMask(mask));
    }

    fn scissor(&mut self, rect: ScissorRect) {
        self.record(GlCommand::Scissor(rect));
    }

    fn color_mask(&mut self, mask: ColorMask) {
        self.record(GlCommand::ColorMask(mask));
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(GlCommand::PolygonOffset { factor, units });
    }

    fn cull_face(&mut self, face: CullFace) {
        self.record(GlCommand::CullFace(face));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.record(GlCommand::ClearColor(color));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.record(GlCommand::Clear(mask));
    }

    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> GpuBufferHandle {
        let handle = GpuBufferHandle(self.next_handle);
        self.next_handle += 1;
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tile Buffer"),
            contents: &padded(data),
            usage: Self::usage(target),
        });
        self.buffers.insert(handle, Slot { buffer, target });
        handle
    }

    fn update_buffer(&mut self, handle: GpuBufferHandle, data: &[u8]) {
        let Some(slot) = self.buffers.get_mut(&handle) else {
            log::debug!("update of unknown gpu buffer {handle:?}");
            return;
        };
        let data = padded(data);
        if (data.len() as u64) <= slot.buffer.size() {
            self.queue.write_buffer(&slot.buffer, 0, &data);
        } else {
            slot.buffer.destroy();
            slot.buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Tile Buffer"),
                contents: &data,
                usage: Self::usage(slot.target),
            });
        }
    }

    fn delete_buffer(&mut self, handle: GpuBufferHandle) {
        if let Some(slot) = self.buffers.remove(&handle) {
            slot.buffer.destroy();
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.record(GlCommand::UseProgram(program));
    }

    fn bind_attribute(&mut self, name: &str, handle: GpuBufferHandle, layout: AttributeLayout) {
        self.record(GlCommand::BindAttribute {
            name: name.to_owned(),
            handle,
            layout,
        });
    }

    fn disable_attribute(&mut self, name: &str) {
        self.record(GlCommand::DisableAttribute(name.to_owned()));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.record(GlCommand::SetUniform {
            name: name.to_owned(),
            value,
        });
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<u32>) {
        self.record(GlCommand::BindFramebuffer(framebuffer));
    }

    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) {
        self.record(GlCommand::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: Primitive, count: u32, element: ElementType, handle: GpuBufferHandle) {
        self.record(GlCommand::DrawElements {
            mode,
            count,
            element,
            handle,
        });
    }

    fn supports_u32_indices(&self) -> bool {
        self.wide_indices
    }
}
