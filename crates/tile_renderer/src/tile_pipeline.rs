// Render pipelines for tile buffers, keyed by the GL state a draw was
// recorded under. Attribute data is pulled from storage buffers and decoded
// in the vertex shader, since wgpu has no vertex formats for the packed
// single-component and three-byte layouts the tessellators produce.

use crate::gpu::{CompareFunc, ProgramId, StencilOp};
use std::collections::HashMap;
use tile_geometry::{names, BufferKind, ColorMask, CullFace, ElementType, Primitive};

pub const ATTRIBUTE_SLOTS: usize = 6;

/// Attributes a tile shader reads, in binding order.
pub const ATTRIBUTES: [&str; ATTRIBUTE_SLOTS] = [
    names::A_POSITION,
    names::A_NORMAL,
    names::A_HEIGHT,
    names::A_SIZE,
    names::A_POINT,
    names::A_WEIGHT,
];

/// Binding slot of a named attribute; `None` for attributes no shader reads.
pub fn attribute_slot(name: &str) -> Option<usize> {
    ATTRIBUTES.iter().position(|a| *a == name)
}

/// Smallest 24-bit depth step, the GL polygon offset unit.
pub const DEPTH_UNIT: f32 = 1.0 / 16_777_216.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Shading {
    Flat = 0,
    Lit = 1,
    /// Alpha falls off towards the quad rim.
    Radial = 2,
}

impl Shading {
    pub fn for_program(program: ProgramId) -> Self {
        match program {
            ProgramId::Buffer(BufferKind::Extrude | BufferKind::Box | BufferKind::Sphere | BufferKind::Model) => {
                Shading::Lit
            }
            ProgramId::Buffer(BufferKind::Heatmap) => Shading::Radial,
            _ => Shading::Flat,
        }
    }
}

/// How a program's vertices are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStage {
    /// Positions in tile space, height from the position or `a_height`.
    Surface,
    /// Centre line pushed out along the extrusion normal.
    Line,
    /// Screen-aligned quads around an anchor.
    Point,
    /// Unit boxes and spheres scaled to screen pixels.
    Mesh,
}

impl VertexStage {
    pub fn for_program(program: ProgramId) -> Self {
        match program {
            ProgramId::Buffer(BufferKind::Line) => VertexStage::Line,
            ProgramId::Buffer(BufferKind::Point | BufferKind::Text | BufferKind::Icon | BufferKind::Heatmap) => {
                VertexStage::Point
            }
            ProgramId::Buffer(BufferKind::Box | BufferKind::Sphere) => VertexStage::Mesh,
            ProgramId::Buffer(_) | ProgramId::Builtin(_) => VertexStage::Surface,
        }
    }

    pub fn entry_point(self) -> &'static str {
        match self {
            VertexStage::Surface => "vs_surface",
            VertexStage::Line => "vs_line",
            VertexStage::Point => "vs_point",
            VertexStage::Mesh => "vs_mesh",
        }
    }
}

/// Per-draw uniform block, one slot of the frame's dynamic uniform buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
    pub matrix: [f32; 16],          // 64 B
    pub fixed_view: [f32; 16],      // +64
    pub color: [f32; 4],            // +16 -> 144
    pub top_left: [f32; 2],         // +8
    pub resolution: [f32; 2],       // +8  -> 160
    pub tile_scale: f32,
    pub scale: f32,
    pub z_meter_to_pixel: f32,
    pub stroke_width: f32,          // +16 -> 176
    pub depth_range: [f32; 2],
    pub depth_offset: f32,
    pub shading: u32,               // +16 -> 192
    /// Per slot: GL element type (0 when unbound), `size | normalized << 8`,
    /// stride and offset in bytes.
    pub attributes: [[u32; 4]; ATTRIBUTE_SLOTS], // +96 -> 288
}

const _: [(); 288] = [(); core::mem::size_of::<DrawUniforms>()];

const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            matrix: IDENTITY,
            fixed_view: IDENTITY,
            color: [1.0; 4],
            top_left: [0.0; 2],
            resolution: [1.0; 2],
            tile_scale: 1.0,
            scale: 1.0,
            z_meter_to_pixel: 1.0,
            stroke_width: 1.0,
            depth_range: [0.0, 1.0],
            depth_offset: 0.0,
            shading: Shading::Flat as u32,
            attributes: [[0; 4]; ATTRIBUTE_SLOTS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilKey {
    pub compare: wgpu::CompareFunction,
    pub fail: wgpu::StencilOperation,
    pub depth_fail: wgpu::StencilOperation,
    pub pass: wgpu::StencilOperation,
    pub read_mask: u8,
    pub write_mask: u8,
}

impl StencilKey {
    fn state(&self) -> wgpu::StencilState {
        let face = wgpu::StencilFaceState {
            compare: self.compare,
            fail_op: self.fail,
            depth_fail_op: self.depth_fail,
            pass_op: self.pass,
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: self.read_mask as u32,
            write_mask: self.write_mask as u32,
        }
    }
}

/// Everything baked into a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub stage: VertexStage,
    pub topology: wgpu::PrimitiveTopology,
    /// Set for indexed strips only.
    pub strip_index_format: Option<wgpu::IndexFormat>,
    pub blend: bool,
    /// `Always` with writes off when the depth test is disabled.
    pub depth_compare: wgpu::CompareFunction,
    pub depth_write: bool,
    pub stencil: Option<StencilKey>,
    pub color_writes: wgpu::ColorWrites,
    pub cull_mode: Option<wgpu::Face>,
}

pub fn compare_function(func: CompareFunc) -> wgpu::CompareFunction {
    match func {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

pub fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
    }
}

pub fn topology(mode: Primitive) -> wgpu::PrimitiveTopology {
    match mode {
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub fn is_fill(mode: Primitive) -> bool {
    matches!(mode, Primitive::Triangles | Primitive::TriangleStrip)
}

pub fn color_writes(mask: ColorMask) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    writes.set(wgpu::ColorWrites::RED, mask.r);
    writes.set(wgpu::ColorWrites::GREEN, mask.g);
    writes.set(wgpu::ColorWrites::BLUE, mask.b);
    writes.set(wgpu::ColorWrites::ALPHA, mask.a);
    writes
}

/// `None` culls everything, which only affects filled primitives.
pub fn cull_mode(face: CullFace) -> Option<wgpu::Face> {
    match face {
        CullFace::Front => Some(wgpu::Face::Front),
        CullFace::Back => Some(wgpu::Face::Back),
        CullFace::FrontAndBack => None,
    }
}

pub fn index_format(element: ElementType) -> Option<wgpu::IndexFormat> {
    match element {
        ElementType::UnsignedShort => Some(wgpu::IndexFormat::Uint16),
        ElementType::UnsignedInt => Some(wgpu::IndexFormat::Uint32),
        _ => None,
    }
}

/// Uniform slot stride honouring the device's dynamic offset alignment.
pub fn uniform_stride(alignment: u32) -> u64 {
    let size = std::mem::size_of::<DrawUniforms>() as u64;
    size.next_multiple_of(alignment.max(1) as u64)
}

/// Layouts, shader and every pipeline built so far.
pub struct TilePipelines {
    shader: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub attribute_layout: wgpu::BindGroupLayout,
    /// Bound to attribute slots a draw leaves empty.
    pub empty_attribute: wgpu::Buffer,
    pub uniform_stride: u64,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl TilePipelines {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tile Uniform BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
        });

        let attribute_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..ATTRIBUTE_SLOTS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let attribute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tile Attribute BGL"),
            entries: &attribute_entries,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &attribute_layout],
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tile WGSL"),
            source: wgpu::ShaderSource::Wgsl(TILE_WGSL.into()),
        });

        let empty_attribute = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Empty Attribute"),
            size: wgpu::COPY_BUFFER_ALIGNMENT,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            shader,
            layout,
            uniform_layout,
            attribute_layout,
            empty_attribute,
            uniform_stride: uniform_stride(device.limits().min_uniform_buffer_offset_alignment),
            color_format,
            depth_format,
            pipelines: HashMap::new(),
        }
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Builds the pipeline for `key` unless it exists already.
    pub fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        log::debug!("building tile pipeline {key:?}");

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Tile Pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: key.stage.entry_point(),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: key.blend.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: key.color_writes,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: key.strip_index_format,
                // World y grows downwards, which mirrors winding in clip space.
                front_face: wgpu::FrontFace::Cw,
                cull_mode: key.cull_mode,
                ..wgpu::PrimitiveState::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: self.depth_format,
                depth_write_enabled: key.depth_write,
                depth_compare: key.depth_compare,
                stencil: key.stencil.map(|s| s.state()).unwrap_or_default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        self.pipelines.insert(key, pipeline);
    }
}

pub const TILE_WGSL: &str = r#"
struct DrawUniforms {
    matrix: mat4x4<f32>,
    fixed_view: mat4x4<f32>,
    color: vec4<f32>,
    top_left: vec2<f32>,
    resolution: vec2<f32>,
    tile_scale: f32,
    scale: f32,
    z_meter_to_pixel: f32,
    stroke_width: f32,
    depth_range: vec2<f32>,
    depth_offset: f32,
    shading: u32,
    attributes: array<vec4<u32>, 6>,
};
@group(0) @binding(0) var<uniform> U: DrawUniforms;

@group(1) @binding(0) var<storage, read> a_position: array<u32>;
@group(1) @binding(1) var<storage, read> a_normal: array<u32>;
@group(1) @binding(2) var<storage, read> a_height: array<u32>;
@group(1) @binding(3) var<storage, read> a_size: array<u32>;
@group(1) @binding(4) var<storage, read> a_point: array<u32>;
@group(1) @binding(5) var<storage, read> a_weight: array<u32>;

const POSITION: u32 = 0u;
const NORMAL: u32 = 1u;
const HEIGHT: u32 = 2u;
const SIZE: u32 = 3u;
const POINT: u32 = 4u;
const WEIGHT: u32 = 5u;

// GL element type codes.
const FLOAT: u32 = 0x1406u;

const EXTENT_SCALE: f32 = 32.0;
const POINT_SCALE: f32 = 8.0;
const LINE_NORMAL_SCALE: f32 = 8191.0;
const MAX_HEIGHT_M: f32 = 9000.0;

const LIT: u32 = 1u;
const RADIAL: u32 = 2u;
const LIGHT: vec3<f32> = vec3<f32>(-0.36, -0.48, 0.8);

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) shade: f32,
    @location(1) weight: f32,
    @location(2) uv: vec2<f32>,
}

fn word(slot: u32, i: u32) -> u32 {
    switch slot {
        case 0u: { return a_position[i]; }
        case 1u: { return a_normal[i]; }
        case 2u: { return a_height[i]; }
        case 3u: { return a_size[i]; }
        case 4u: { return a_point[i]; }
        default: { return a_weight[i]; }
    }
}

fn present(slot: u32) -> bool {
    return U.attributes[slot].x != 0u;
}

fn components(slot: u32) -> u32 {
    return U.attributes[slot].y & 0xffu;
}

fn element_bytes(ty: u32) -> u32 {
    switch ty {
        case 0x1400u, 0x1401u: { return 1u; }
        case 0x1402u, 0x1403u: { return 2u; }
        default: { return 4u; }
    }
}

// Raw element bits, sign-extended for signed types.
fn fetch_bits(slot: u32, vertex: u32, c: u32) -> i32 {
    let layout = U.attributes[slot];
    let bytes = element_bytes(layout.x);
    let stride = select(components(slot) * bytes, layout.z, layout.z != 0u);
    let at = layout.w + vertex * stride + c * bytes;
    let w = word(slot, at / 4u);
    let shift = (at % 4u) * 8u;
    switch layout.x {
        case 0x1400u: { return extractBits(bitcast<i32>(w), shift, 8u); }
        case 0x1401u: { return i32(extractBits(w, shift, 8u)); }
        case 0x1402u: { return extractBits(bitcast<i32>(w), shift, 16u); }
        case 0x1403u: { return i32(extractBits(w, shift, 16u)); }
        default: { return bitcast<i32>(w); }
    }
}

fn fetch(slot: u32, vertex: u32, c: u32) -> f32 {
    let layout = U.attributes[slot];
    if (layout.x == 0u || c >= components(slot)) {
        return 0.0;
    }
    let bits = fetch_bits(slot, vertex, c);
    let v = f32(bits);
    let normalized = (layout.y >> 8u) != 0u;
    switch layout.x {
        case 0x1400u: { return select(v, max(v / 127.0, -1.0), normalized); }
        case 0x1401u: { return select(v, v / 255.0, normalized); }
        case 0x1402u: { return select(v, max(v / 32767.0, -1.0), normalized); }
        case 0x1403u: { return select(v, v / 65535.0, normalized); }
        case 0x1405u: { return f32(bitcast<u32>(bits)); }
        case 0x1406u: { return bitcast<f32>(bits); }
        default: { return v; }
    }
}

fn tile_xy(v: u32) -> vec2<f32> {
    let p = vec2<f32>(fetch(POSITION, v, 0u), fetch(POSITION, v, 1u));
    if (U.attributes[POSITION].x == FLOAT) {
        return p;
    }
    return p / EXTENT_SCALE;
}

fn height_m(v: u32) -> f32 {
    if (components(POSITION) >= 3u) {
        return fetch(POSITION, v, 2u);
    }
    if (!present(HEIGHT)) {
        return 0.0;
    }
    return f32(fetch_bits(HEIGHT, v, 0u)) / 65535.0 * MAX_HEIGHT_M;
}

fn tile_to_world(xy: vec2<f32>, z: f32) -> vec3<f32> {
    return vec3<f32>(U.top_left + xy * U.tile_scale, z);
}

// glDepthRange plus polygon offset, applied to depths inside the clip volume.
fn remap_depth(clip: vec4<f32>) -> vec4<f32> {
    var out = clip;
    let z = clip.z / clip.w;
    if (clip.w > 0.0 && z >= 0.0 && z <= 1.0) {
        let d = mix(U.depth_range.x, U.depth_range.y, z) + U.depth_offset;
        out.z = clamp(d, 0.0, 1.0) * clip.w;
    }
    return out;
}

fn project(world: vec3<f32>) -> vec4<f32> {
    return remap_depth(U.matrix * vec4<f32>(world, 1.0));
}

fn lit(v: u32) -> f32 {
    if (U.shading != LIT || !present(NORMAL)) {
        return 1.0;
    }
    let n = vec3<f32>(fetch(NORMAL, v, 0u), fetch(NORMAL, v, 1u), fetch(NORMAL, v, 2u));
    let len = length(n);
    if (len == 0.0) {
        return 1.0;
    }
    return 0.65 + 0.35 * max(dot(n / len, LIGHT), 0.0);
}

fn surface_out(clip: vec4<f32>, v: u32) -> VSOut {
    var out: VSOut;
    out.clip = clip;
    out.shade = lit(v);
    out.weight = 1.0;
    out.uv = vec2<f32>(0.5);
    return out;
}

@vertex
fn vs_surface(@builtin(vertex_index) v: u32) -> VSOut {
    return surface_out(project(tile_to_world(tile_xy(v), height_m(v))), v);
}

@vertex
fn vs_line(@builtin(vertex_index) v: u32) -> VSOut {
    let n = vec2<f32>(
        f32(fetch_bits(NORMAL, v, 0u) & ~1i),
        f32(fetch_bits(NORMAL, v, 1u) & ~1i),
    ) / LINE_NORMAL_SCALE;
    let offset = U.stroke_width * 0.5 / U.scale;
    let world = tile_to_world(tile_xy(v), height_m(v)) + vec3<f32>(n * offset, 0.0);
    var out = surface_out(project(world), v);
    out.shade = 1.0;
    return out;
}

@vertex
fn vs_point(@builtin(vertex_index) v: u32) -> VSOut {
    var out: VSOut;
    let bx = fetch_bits(POSITION, v, 0u);
    let by = fetch_bits(POSITION, v, 1u);
    let corner = vec2<f32>(f32(bx & 1i), f32(by & 1i));
    let anchor = vec2<f32>(f32(bx >> 2u), f32(by >> 2u)) / POINT_SCALE;

    var size = vec2<f32>(fetch(SIZE, v, 0u), fetch(SIZE, v, 1u));
    if (components(SIZE) == 1u) {
        // Radius.
        size = vec2<f32>(size.x * 2.0);
    }
    let offset = (corner - vec2<f32>(0.5)) * size;
    let world = tile_to_world(anchor, height_m(v));

    if ((by & 2i) != 0i) {
        // Lies on the map and scales with it.
        out.clip = project(world + vec3<f32>(offset / U.scale, 0.0));
    } else {
        let clip = U.matrix * vec4<f32>(world, 1.0);
        let ndc = vec2<f32>(offset.x, -offset.y) * 2.0 / U.resolution;
        out.clip = remap_depth(vec4<f32>(clip.xy + ndc * clip.w, clip.zw));
    }
    if ((bx & 2i) == 0i) {
        // Hidden.
        out.clip = vec4<f32>(2.0, 2.0, 2.0, 1.0);
    }
    out.shade = 1.0;
    out.weight = select(1.0, fetch(WEIGHT, v, 0u), present(WEIGHT));
    out.uv = corner;
    return out;
}

@vertex
fn vs_mesh(@builtin(vertex_index) v: u32) -> VSOut {
    let unit = vec3<f32>(fetch(POINT, v, 0u), fetch(POINT, v, 1u), fetch(POINT, v, 2u));
    var px: vec3<f32>;
    if (components(SIZE) >= 3u) {
        px = unit * vec3<f32>(fetch(SIZE, v, 0u), fetch(SIZE, v, 1u), fetch(SIZE, v, 2u)) * 0.5;
    } else {
        px = unit * fetch(SIZE, v, 0u);
    }
    let world = tile_to_world(tile_xy(v), height_m(v))
        + vec3<f32>(px.xy / U.scale, px.z / (U.scale * U.z_meter_to_pixel));
    return surface_out(project(world), v);
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    var alpha = U.color.a * in.weight;
    if (U.shading == RADIAL) {
        let r = length(in.uv * 2.0 - vec2<f32>(1.0));
        if (r > 1.0) {
            discard;
        }
        alpha = alpha * (1.0 - r);
    }
    return vec4<f32>(U.color.rgb * in.shade, alpha);
}
"#;
