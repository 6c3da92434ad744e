//! Point quad expansion.
//!
//! Each point becomes two triangles sharing one packed anchor. The two low
//! bits of each packed coordinate select the quad corner (bit 0) and carry a
//! per-point flag (bit 1): visibility on `x`, map alignment on `y`.

use crate::flex::FlexAttribute;
use crate::hit::{POINT_VERTICES, POINT_VISIBLE};
use crate::quantize::pack_point_coord;

/// Rotate/pitch the quad with the map instead of facing the screen.
pub const POINT_ALIGN_MAP: u8 = 0b10;

/// Corner selectors of the two triangles, `(x, y)`.
const QUAD_CORNERS: [(u8, u8); POINT_VERTICES] = [(0, 0), (1, 0), (0, 1), (1, 0), (1, 1), (0, 1)];

/// Appends one point quad anchored at `(x, y)` tile pixels.
pub fn add_point(position: &mut FlexAttribute<i16>, x: f64, y: f64, visible: bool, align_map: bool) {
    let x_flag = if visible { POINT_VISIBLE } else { 0 };
    let y_flag = if align_map { POINT_ALIGN_MAP } else { 0 };
    for (cx, cy) in QUAD_CORNERS {
        position.push_vertex(&[pack_point_coord(x, x_flag | cx), pack_point_coord(y, y_flag | cy)]);
    }
}

/// Toggles the visibility bit of point `index` in a packed 2-component
/// position array. Returns `false` when the point does not exist.
pub fn set_point_visible(position: &mut [i16], index: usize, visible: bool) -> bool {
    let start = index * POINT_VERTICES * 2;
    let end = start + POINT_VERTICES * 2;
    let Some(quad) = position.get_mut(start..end) else {
        return false;
    };
    for x in quad.iter_mut().step_by(2) {
        if visible {
            *x |= POINT_VISIBLE as i16;
        } else {
            *x &= !(POINT_VISIBLE as i16);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::unpack_point_coord;

    #[test]
    fn quad_has_four_distinct_corners() {
        let mut pos = FlexAttribute::new(2);
        add_point(&mut pos, 100.25, 40.0, true, false);
        assert_eq!(pos.vertex_count(), 6);

        let mut corners: Vec<(u8, u8)> = pos
            .data
            .as_slice()
            .chunks_exact(2)
            .map(|c| {
                let (x, fx) = unpack_point_coord(c[0]);
                let (y, fy) = unpack_point_coord(c[1]);
                assert_eq!((x, y), (100.25, 40.0));
                assert_eq!(fx & POINT_VISIBLE, POINT_VISIBLE);
                (fx & 1, fy & 1)
            })
            .collect();
        corners.sort();
        corners.dedup();
        assert_eq!(corners, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn visibility_toggles_without_moving_anchor() {
        let mut pos = FlexAttribute::new(2);
        add_point(&mut pos, 1.0, 2.0, true, true);
        add_point(&mut pos, 3.0, 4.0, true, true);
        let mut data = pos.data.trim();

        assert!(set_point_visible(&mut data, 1, false));
        assert!(!set_point_visible(&mut data, 2, false));

        for (i, c) in data.chunks_exact(2).enumerate() {
            let (x, fx) = unpack_point_coord(c[0]);
            let (_, fy) = unpack_point_coord(c[1]);
            assert_eq!(fx & POINT_VISIBLE != 0, i < 6);
            assert_eq!(fy & POINT_ALIGN_MAP, POINT_ALIGN_MAP);
            assert_eq!(x, if i < 6 { 1.0 } else { 3.0 });
        }
    }
}
