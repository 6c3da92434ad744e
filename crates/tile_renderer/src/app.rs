use crate::{
    camera::{CameraController, MapCamera},
    context::GfxContext,
    options::RendererOptions,
    program::ProgramTable,
    raycaster::Raycaster,
    renderer::{Renderer, TileDraw, TileRect, U_COLOR},
    wgpu_context::{WgpuContext, DEPTH_FORMAT},
};
use anyhow::Result;
use glam::{DVec2, DVec3};
use rayon::prelude::*;
use std::sync::Arc;
use tile_geometry::{
    tessellate::LineStringOptions,
    template::{ExtrudeBuffer, LineBuffer, PointBuffer, PolygonBuffer},
    GeometryBuffer, Pass, TemplateBuffer, UniformValue,
};
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const BACKGROUND: [f32; 4] = [0.93, 0.92, 0.89, 1.0];
/// Demo tiles per row and column.
const GRID: usize = 3;
/// Metres per world pixel of the demo data.
const GROUND_RESOLUTION: f64 = 2.0;

/// One buffer of a demo tile.
pub struct Layer {
    pub z_index: u32,
    pub buffer: GeometryBuffer,
}

pub struct DemoTile {
    /// Position in the tile grid, world pixels before panning.
    pub origin: DVec2,
    pub stencil_ref: u8,
    /// Sorted by ascending z-index.
    pub layers: Vec<Layer>,
}

impl DemoTile {
    fn rect(&self, offset: DVec2, size: f64) -> TileRect {
        TileRect::new(self.origin.x - offset.x, self.origin.y - offset.y, size)
    }
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<DVec2> {
    vec![
        DVec2::new(x0, y0),
        DVec2::new(x1, y0),
        DVec2::new(x1, y1),
        DVec2::new(x0, y1),
        DVec2::new(x0, y0),
    ]
}

fn colored(mut buffer: GeometryBuffer, color: [f32; 4]) -> GeometryBuffer {
    buffer.add_uniform(U_COLOR, UniformValue::Vec4(color));
    buffer
}

/// Park, roads, a building and a point of interest, in tile pixels.
fn demo_layers(index: usize, tile_size: f64) -> Vec<Layer> {
    let id = index as u64 * 100;
    let mut layers = Vec::new();

    let mut park = PolygonBuffer::new(false);
    park.set_id_offset(id + 1);
    park.add_polygon(&[square(24.0, 24.0, 120.0, 120.0)], 0.0);
    if let Some(buffer) = park.finalize() {
        layers.push(Layer {
            z_index: 1,
            buffer: colored(buffer, [0.6, 0.8, 0.5, 1.0]),
        });
    }

    let mut roads = LineBuffer::new(false, false);
    let opts = LineStringOptions {
        tile_size,
        ..LineStringOptions::default()
    };
    let mid = tile_size / 2.0;
    roads.set_id_offset(id + 2);
    roads.add_line_string(&[DVec3::new(0.0, mid, 0.0), DVec3::new(tile_size, mid, 0.0)], &opts);
    roads.set_id_offset(id + 3);
    roads.add_line_string(&[DVec3::new(mid, 0.0, 0.0), DVec3::new(mid, tile_size, 0.0)], &opts);
    roads.set_stroke_width(6.0);
    if let Some(buffer) = roads.finalize() {
        layers.push(Layer {
            z_index: 2,
            buffer: colored(buffer, [1.0, 1.0, 1.0, 1.0]),
        });
    }

    let mut building = ExtrudeBuffer::new();
    building.set_translucent(index % 2 == 1);
    building.set_id_offset(id + 4);
    building.add_extrude(&[square(150.0, 150.0, 210.0, 210.0)], 0.0, 30.0 + 10.0 * index as f64);
    if let Some(buffer) = building.finalize() {
        layers.push(Layer {
            z_index: 3,
            buffer: colored(buffer, [0.75, 0.7, 0.68, 0.8]),
        });
    }

    let mut poi = PointBuffer::new(false);
    poi.set_id_offset(id + 5);
    poi.add_point(72.0, 72.0, 0.0, [12.0, 12.0], true, false);
    if let Some(buffer) = poi.finalize() {
        layers.push(Layer {
            z_index: 4,
            buffer: colored(buffer, [0.85, 0.2, 0.2, 1.0]),
        });
    }

    layers.sort_by_key(|l| l.z_index);
    layers
}

fn depth_target(device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Tile Depth Stencil"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

pub struct App {
    pub gfx: GfxContext,
    pub gpu: WgpuContext,
    pub renderer: Renderer,
    pub camera: MapCamera,
    pub camera_controller: CameraController,
    pub raycaster: Raycaster,
    pub tiles: Vec<DemoTile>,
    _depth_tex: wgpu::Texture,
    depth: wgpu::TextureView,
    show_grid: bool,
}

impl App {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let gfx = GfxContext::new(window, None).await?;
        let mut gpu = WgpuContext::from_gfx(&gfx);
        let options = RendererOptions {
            wide_indices: gfx.wide_indices,
            ..RendererOptions::default()
        };
        let tile_size = options.tile_size as f64;
        let renderer = Renderer::new(&mut gpu, ProgramTable::standard(), options);
        let (_depth_tex, depth) = depth_target(&gfx.device, gfx.size);

        // Centre the tile grid in the viewport.
        let extent = tile_size * GRID as f64;
        let corner = DVec2::new(
            (gfx.size.width as f64 - extent) / 2.0,
            (gfx.size.height as f64 - extent) / 2.0,
        );
        let tiles: Vec<_> = (0..GRID * GRID)
            .into_par_iter()
            .map(|i| DemoTile {
                origin: corner + DVec2::new((i % GRID) as f64, (i / GRID) as f64) * tile_size,
                stencil_ref: (i + 1) as u8,
                layers: demo_layers(i, tile_size),
            })
            .collect();
        log::info!("{} demo tiles ready", tiles.len());

        Ok(Self {
            gfx,
            gpu,
            renderer,
            camera: MapCamera::new(GROUND_RESOLUTION),
            camera_controller: CameraController::new(),
            raycaster: Raycaster::new(),
            tiles,
            _depth_tex,
            depth,
            show_grid: false,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.gpu.resize(new_size.width, new_size.height);
            let (tex, view) = depth_target(&self.gfx.device, new_size);
            self._depth_tex = tex;
            self.depth = view;
        }
    }

    /// Returns true when the event was consumed.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        if let Some((x, y)) = self.camera_controller.handle_event(event, &mut self.camera) {
            self.pick(x, y);
        }

        match event {
            WindowEvent::Resized(physical_size) => self.resize(*physical_size),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                let step = 5f64.to_radians();
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyG) => {
                        self.show_grid = !self.show_grid;
                        self.renderer.grid(self.show_grid);
                    }
                    PhysicalKey::Code(KeyCode::ArrowUp) => self.camera.pitch_by(step),
                    PhysicalKey::Code(KeyCode::ArrowDown) => self.camera.pitch_by(-step),
                    PhysicalKey::Code(KeyCode::ArrowLeft) => self.camera.rotate_by(-step),
                    PhysicalKey::Code(KeyCode::ArrowRight) => self.camera.rotate_by(step),
                    _ => return false,
                }
                return true;
            }
            _ => {}
        }
        false
    }

    /// Logs the topmost feature under a screen position.
    pub fn pick(&mut self, x: f64, y: f64) {
        let Some(view) = self.renderer.view() else {
            return;
        };
        let size = self.renderer.options().tile_size as f64;
        self.raycaster.init(view, x, y, 1.0);
        for tile in &self.tiles {
            let rect = tile.rect(self.camera.offset, size);
            for (layer, l) in tile.layers.iter().enumerate() {
                self.raycaster.intersect(rect.x, rect.y, 1.0, &l.buffer, Some(layer));
            }
        }
        match self.raycaster.get_intersection_top() {
            Some(hit) => log::info!(
                "picked feature {:?} (layer {:?}) at {:.1}, {:.1}, {:.1}",
                hit.feature,
                hit.layer,
                hit.position.x,
                hit.position.y,
                hit.position.z
            ),
            None => log::info!("nothing at {x:.0}, {y:.0}"),
        }
    }

    /// Runs the three passes over every demo tile.
    fn draw_tiles(&mut self) {
        let camera = self.camera;
        let size = self.renderer.options().tile_size as f64;
        self.renderer.init_view(
            self.gfx.size.width,
            self.gfx.size.height,
            camera.scale,
            camera.rot_x,
            camera.rot_z,
            camera.ground_resolution,
        );
        self.renderer.clear(&mut self.gpu, BACKGROUND);

        let min_3d = self
            .tiles
            .iter()
            .flat_map(|t| &t.layers)
            .filter(|l| !l.buffer.is_flat())
            .map(|l| l.z_index)
            .min();

        for pass in Pass::ORDER {
            self.renderer.set_pass(&mut self.gpu, pass);
            for tile in &mut self.tiles {
                let rect = tile.rect(camera.offset, size);
                if pass == Pass::Opaque && min_3d.is_some() {
                    self.renderer.init_ground_depth(&mut self.gpu, rect);
                }
                // Clipped opaque draws and every alpha draw test the tile stencil.
                if pass != Pass::PostAlpha {
                    self.renderer.init_stencil(rect, tile.stencil_ref);
                }
                for layer in &mut tile.layers {
                    self.renderer.draw(
                        &mut self.gpu,
                        TileDraw {
                            buffer: &mut layer.buffer,
                            tile: rect,
                            tile_scale: 1.0,
                            z_index: layer.z_index,
                            stencil_ref: tile.stencil_ref,
                            preview: None,
                        },
                        min_3d,
                    );
                }
            }
        }
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.draw_tiles();

        let Some(surface) = self.gfx.surface.as_ref() else {
            let dropped = self.gpu.discard_frame();
            log::trace!("no surface, dropped {dropped} draws");
            return Ok(());
        };
        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e) => {
                self.gpu.discard_frame();
                return Err(e);
            }
        };
        let swap_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Tile Encoder"),
            });
        let draws = self.gpu.encode(&mut encoder, &swap_view, &self.depth);
        log::trace!(
            "frame: {draws} draws, {} gpu buffers, {} pipelines",
            self.renderer.cache().len(),
            self.gpu.pipeline_count()
        );

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        Ok(())
    }

    /// Releases every GPU buffer. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.renderer.destroy(&mut self.gpu);
    }
}
