/// Renderer configuration. Fixed for the lifetime of a [`crate::Renderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RendererOptions {
    /// Tile edge in tile pixels.
    pub tile_size: u32,
    /// Above this zoom scale the scissor covers the whole canvas.
    pub max_scissor_scale: f64,
    /// Near end of the depth range used by flat content.
    pub flat_depth_value: f32,
    /// Gap kept between the ground pre-pass depth and the flat depth value.
    pub depth_epsilon: f32,
    /// Polygon offset units per z-index step for depth-tested flat content.
    pub polygon_offset_units: f32,
    /// RGBA, 0..1.
    pub grid_color: [f32; 4],
    pub grid_width: f32,
    /// Request 32-bit element indices from the context.
    pub wide_indices: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            tile_size: 256,
            max_scissor_scale: 4.0,
            flat_depth_value: 1.0,
            depth_epsilon: 1.0 / 65536.0,
            polygon_offset_units: 1.0,
            grid_color: [1.0, 0.0, 0.0, 1.0],
            grid_width: 1.0,
            wide_indices: true,
        }
    }
}
