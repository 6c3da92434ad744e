use anyhow::{anyhow, Result};
use std::sync::Arc;
use winit::window::Window;

/// Device, queue and (optionally) a configured window surface.
pub struct GfxContext {
    pub surface:            Option<wgpu::Surface<'static>>,
    pub device:             Arc<wgpu::Device>,
    pub queue:              Arc<wgpu::Queue>,
    pub config:             Option<wgpu::SurfaceConfiguration>,
    pub size:               winit::dpi::PhysicalSize<u32>,
    pub device_pixel_ratio: f64,
    /// 32-bit element indices supported by the adapter.
    pub wide_indices:       bool,
}

impl GfxContext {
    /// Opens a device bound to `window`. `device_pixel_ratio` defaults to the
    /// window's scale factor.
    pub async fn new(window: Arc<Window>, device_pixel_ratio: Option<f64>) -> Result<Self> {
        let size = window.inner_size();
        let device_pixel_ratio = device_pixel_ratio.unwrap_or_else(|| window.scale_factor());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        // The surface must outlive the window; `Arc` guarantees this.
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference:       wgpu::PowerPreference::HighPerformance,
                compatible_surface:     Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find a suitable GPU adapter."))?;
        let (device, queue, wide_indices) = Self::open(&adapter).await?;

        // Determine the surface format (prefer sRGB).
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no supported formats."))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage:                         wgpu::TextureUsages::RENDER_ATTACHMENT,
            format:                        surface_format,
            width:                         size.width.max(1),
            height:                        size.height.max(1),
            present_mode:                  wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats:                  vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        log::info!(
            "gpu context on {:?}, {}x{} @{device_pixel_ratio}",
            adapter.get_info().name,
            size.width,
            size.height
        );

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            config: Some(config),
            size,
            device_pixel_ratio,
            wide_indices,
        })
    }

    /// Opens a device without a surface, for offscreen rendering.
    pub async fn headless(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference:       wgpu::PowerPreference::HighPerformance,
                compatible_surface:     None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find a suitable GPU adapter."))?;
        let (device, queue, wide_indices) = Self::open(&adapter).await?;

        Ok(Self {
            surface: None,
            device,
            queue,
            config: None,
            size: winit::dpi::PhysicalSize::new(width.max(1), height.max(1)),
            device_pixel_ratio: 1.0,
            wide_indices,
        })
    }

    async fn open(adapter: &wgpu::Adapter) -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>, bool)> {
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label:             Some("Tile Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits:   wgpu::Limits::default(),
                },
                None,
            )
            .await?;
        let wide_indices = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::FULL_DRAW_INDEX_UINT32);
        if !wide_indices {
            log::warn!("adapter lacks full 32-bit index support");
        }
        Ok((Arc::new(device), Arc::new(queue), wide_indices))
    }

    /// Reconfigures the surface when the window size changes.
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            if let (Some(surface), Some(config)) = (self.surface.as_ref(), self.config.as_mut()) {
                config.width = new_size.width;
                config.height = new_size.height;
                surface.configure(&self.device, config);
            }
        }
    }

    /// Canvas size in CSS pixels.
    pub fn logical_size(&self) -> (f64, f64) {
        (
            self.size.width as f64 / self.device_pixel_ratio,
            self.size.height as f64 / self.device_pixel_ratio,
        )
    }
}
