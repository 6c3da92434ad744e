//! GPU side of the map tile renderer.
//!
//! Geometry buffers from `tile_geometry` are drawn tile by tile through the
//! [`GpuContext`] contract in three passes (opaque, alpha, post-alpha), and
//! picked with the [`Raycaster`].

pub mod app;
pub mod buffer_cache;
pub mod camera;
pub mod context;
pub mod frame;
pub mod gpu;
pub mod options;
pub mod program;
pub mod raycaster;
pub mod renderer;
pub mod tile_pipeline;
pub mod view;
pub mod wgpu_context;

pub use buffer_cache::GpuBufferCache;
pub use frame::{DrawCall, FrameRecorder, Segment};
pub use gpu::{GlCommand, GpuBufferHandle, GpuContext, RecordingContext};
pub use options::RendererOptions;
pub use program::{Program, ProgramState, ProgramTable, StandardProgram, StandardUniform};
pub use raycaster::{Intersection, Raycaster};
pub use renderer::{DrawContext, Preview, Renderer, TileDraw, TileRect};
pub use view::{depth_from_z_index, View};
pub use wgpu_context::WgpuContext;
