//! Immediate-mode GPU context contract.
//!
//! The renderer and the programs talk to the GPU only through
//! [`GpuContext`]. [`RecordingContext`] keeps every call as a [`GlCommand`]
//! so draw orchestration can be checked without a device.

use bitflags::bitflags;
use std::collections::HashSet;
use tile_geometry::{BufferKind, ColorMask, CullFace, ElementType, Primitive, UniformValue};

/// Opaque GPU buffer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuBufferHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
    ScissorTest,
    CullFace,
    PolygonOffsetFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        const COLOR = 1;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Pixel rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Built-in programs owned by the renderer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Stencil,
    GroundDepth,
    Grid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramId {
    Buffer(BufferKind),
    Builtin(Builtin),
}

/// Vertex layout of one bound attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLayout {
    pub size: u8,
    pub element: ElementType,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlCommand {
    Enable(Capability),
    Disable(Capability),
    DepthFunc(CompareFunc),
    DepthMask(bool),
    DepthRange(f32, f32),
    StencilFunc {
        func: CompareFunc,
        reference: u8,
        mask: u8,
    },
    StencilOp {
        fail: StencilOp,
        depth_fail: StencilOp,
        pass: StencilOp,
    },
    StencilMask(u8),
    Scissor(ScissorRect),
    ColorMask(ColorMask),
    PolygonOffset {
        factor: f32,
        units: f32,
    },
    CullFace(CullFace),
    ClearColor([f32; 4]),
    Clear(ClearMask),
    CreateBuffer {
        handle: GpuBufferHandle,
        target: BufferTarget,
        len: usize,
    },
    UpdateBuffer {
        handle: GpuBufferHandle,
        len: usize,
    },
    DeleteBuffer(GpuBufferHandle),
    UseProgram(ProgramId),
    BindAttribute {
        name: String,
        handle: GpuBufferHandle,
        layout: AttributeLayout,
    },
    DisableAttribute(String),
    SetUniform {
        name: String,
        value: UniformValue,
    },
    BindFramebuffer(Option<u32>),
    DrawArrays {
        mode: Primitive,
        first: u32,
        count: u32,
    },
    DrawElements {
        mode: Primitive,
        count: u32,
        element: ElementType,
        handle: GpuBufferHandle,
    },
}

pub trait GpuContext {
    fn enable(&mut self, cap: Capability);
    fn disable(&mut self, cap: Capability);

    fn set_enabled(&mut self, cap: Capability, on: bool) {
        if on {
            self.enable(cap);
        } else {
            self.disable(cap);
        }
    }

    fn depth_func(&mut self, func: CompareFunc);
    fn depth_mask(&mut self, write: bool);
    fn depth_range(&mut self, near: f32, far: f32);
    fn stencil_func(&mut self, func: CompareFunc, reference: u8, mask: u8);
    fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp);
    fn stencil_mask(&mut self, mask: u8);
    fn scissor(&mut self, rect: ScissorRect);
    fn color_mask(&mut self, mask: ColorMask);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn cull_face(&mut self, face: CullFace);
    fn clear_color(&mut self, color: [f32; 4]);
    fn clear(&mut self, mask: ClearMask);

    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> GpuBufferHandle;
    fn update_buffer(&mut self, handle: GpuBufferHandle, data: &[u8]);
    fn delete_buffer(&mut self, handle: GpuBufferHandle);

    fn use_program(&mut self, program: ProgramId);
    fn bind_attribute(&mut self, name: &str, handle: GpuBufferHandle, layout: AttributeLayout);
    fn disable_attribute(&mut self, name: &str);
    fn set_uniform(&mut self, name: &str, value: UniformValue);
    fn bind_framebuffer(&mut self, framebuffer: Option<u32>);
    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32);
    fn draw_elements(&mut self, mode: Primitive, count: u32, element: ElementType, handle: GpuBufferHandle);

    /// 32-bit element indices available.
    fn supports_u32_indices(&self) -> bool;
}

/// Records every call. Buffer handles are allocated sequentially from 1.
#[derive(Debug, Clone)]
pub struct RecordingContext {
    pub commands: Vec<GlCommand>,
    live: HashSet<GpuBufferHandle>,
    next_handle: u32,
    u32_indices: bool,
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RecordingContext {
    pub fn new(u32_indices: bool) -> Self {
        Self {
            commands: Vec::new(),
            live: HashSet::new(),
            next_handle: 1,
            u32_indices,
        }
    }

    /// Drains the recorded commands.
    pub fn take(&mut self) -> Vec<GlCommand> {
        std::mem::take(&mut self.commands)
    }

    /// GPU buffers created and not yet deleted.
    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    fn record(&mut self, cmd: GlCommand) {
        log::trace!("gl: {cmd:?}");
        self.commands.push(cmd);
    }
}

impl GpuContext for RecordingContext {
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
        self.live.insert(handle);
        self.record(GlCommand::CreateBuffer {
            handle,
            target,
            len: data.len(),
        });
        handle
    }

    fn update_buffer(&mut self, handle: GpuBufferHandle, data: &[u8]) {
        self.record(GlCommand::UpdateBuffer {
            handle,
            len: data.len(),
        });
    }

    fn delete_buffer(&mut self, handle: GpuBufferHandle) {
        self.live.remove(&handle);
        self.record(GlCommand::DeleteBuffer(handle));
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
        self.u32_indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_tracked_until_deleted() {
        let mut ctx = RecordingContext::default();
        let a = ctx.create_buffer(BufferTarget::Vertex, &[0; 8]);
        let b = ctx.create_buffer(BufferTarget::Index, &[0; 4]);
        assert_ne!(a, b);
        assert_eq!(ctx.live_buffers(), 2);
        ctx.delete_buffer(a);
        assert_eq!(ctx.live_buffers(), 1);
        assert_eq!(ctx.take().len(), 3);
        assert!(ctx.commands.is_empty());
    }

    #[test]
    fn set_enabled_dispatches() {
        let mut ctx = RecordingContext::default();
        ctx.set_enabled(Capability::Blend, true);
        ctx.set_enabled(Capability::DepthTest, false);
        assert_eq!(
            ctx.commands,
            vec![
                GlCommand::Enable(Capability::Blend),
                GlCommand::Disable(Capability::DepthTest)
            ]
        );
    }
}
