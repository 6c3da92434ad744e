//! Fixed-point packing of heights, normals and tile-local positions.
//!
//! Layouts (shared by the tessellators, the draw programs and the ray tests):
//! - heights: metres in `[0, MAX_HEIGHT_M]` -> `u16` full range.
//! - normals: unit vectors -> `i8` components scaled by 127.
//! - line normals: `round(n * LINE_NORMAL_SCALE)` in `i16`, lowest bit
//!   replaced by a flag (see [`pack_line_normal`]).
//! - line/polygon/box/sphere positions: tile pixels * `EXTENT_SCALE` in `i16`.
//! - point positions: `(round(px * POINT_SCALE) << 2) | flags` in `i16`.

/// Highest representable height in metres.
pub const MAX_HEIGHT_M: f64 = 9000.0;

/// Sub-pixel scale of tile-local integer positions.
pub const EXTENT_SCALE: f64 = 32.0;

/// Sub-pixel scale of point positions before the two flag bits are shifted in.
pub const POINT_SCALE: f64 = 8.0;

/// Quantization of line extrusion normals.
pub const LINE_NORMAL_SCALE: f64 = 8191.0;

/// Quantization of unit normals / unit mesh vertices.
pub const NORMAL_SCALE: f64 = 127.0;

/// Height step of one `u16` unit.
pub const HEIGHT_STEP_M: f64 = MAX_HEIGHT_M / 65535.0;

/// Packs a height in metres. Values outside `[0, 9000]` clamp to the
/// boundary; NaN packs as 0.
#[inline]
pub fn encode_height(meters: f64) -> u16 {
    if meters.is_nan() {
        return 0;
    }
    let clamped = meters.clamp(0.0, MAX_HEIGHT_M);
    (clamped / MAX_HEIGHT_M * 65535.0).round() as u16
}

#[inline]
pub fn decode_height(packed: u16) -> f64 {
    packed as f64 / 65535.0 * MAX_HEIGHT_M
}

/// Tile pixel coordinate to integer extent units.
#[inline]
pub fn encode_extent(px: f64) -> i16 {
    (px * EXTENT_SCALE)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

#[inline]
pub fn decode_extent(v: i16) -> f64 {
    v as f64 / EXTENT_SCALE
}

/// Point coordinate with two flag bits in the low bits.
#[inline]
pub fn pack_point_coord(px: f64, flags: u8) -> i16 {
    let scaled = (px * POINT_SCALE).round().clamp(-4096.0, 4095.0) as i32;
    ((scaled << 2) | (flags & 0b11) as i32) as i16
}

/// Inverse of [`pack_point_coord`]: `(pixel coordinate, flags)`.
#[inline]
pub fn unpack_point_coord(v: i16) -> (f64, u8) {
    let v = v as i32;
    ((v >> 2) as f64 / POINT_SCALE, (v & 0b11) as u8)
}

/// Packs one line-normal component; `flag` replaces the lowest bit.
#[inline]
pub fn pack_line_normal(n: f64, flag: bool) -> i16 {
    let q = (n * LINE_NORMAL_SCALE)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i32;
    ((q & !1) | flag as i32) as i16
}

/// Inverse of [`pack_line_normal`]: `(component, flag)`.
#[inline]
pub fn unpack_line_normal(v: i16) -> (f64, bool) {
    let v = v as i32;
    ((v & !1) as f64 / LINE_NORMAL_SCALE, v & 1 == 1)
}

/// Normalizes and quantizes a vector to signed bytes. Zero-length input
/// yields `[0, 0, 0]`.
#[inline]
pub fn quantize_normal(n: [f64; 3]) -> [i8; 3] {
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if !(len > 0.0) || !len.is_finite() {
        return [0, 0, 0];
    }
    [
        (n[0] / len * NORMAL_SCALE).round() as i8,
        (n[1] / len * NORMAL_SCALE).round() as i8,
        (n[2] / len * NORMAL_SCALE).round() as i8,
    ]
}

#[inline]
pub fn dequantize_normal(n: [i8; 3]) -> [f64; 3] {
    [
        n[0] as f64 / NORMAL_SCALE,
        n[1] as f64 / NORMAL_SCALE,
        n[2] as f64 / NORMAL_SCALE,
    ]
}
