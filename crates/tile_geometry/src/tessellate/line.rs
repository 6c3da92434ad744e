//! Line-string stroking.
//!
//! A polyline in tile pixels is expanded into a triangulated ribbon. Every
//! vertex stores the centre-line position and a unit-width extrusion vector;
//! the draw program scales the extrusion by half the stroke width, so a
//! single tessellation serves every width. The low bit of each packed
//! extrusion component carries a flag: `x` marks vertices of join/cap fill
//! geometry ("alias" vertices), `y` marks the +normal side.

use crate::flex::FlexAttribute;
use crate::quantize::{encode_extent, encode_height, pack_line_normal};
use glam::{DVec2, DVec3};
use std::f64::consts::PI;

/// Miter joins whose bisector is longer than this fall back to bevel.
pub const MITER_LIMIT: f64 = 3.0;

/// Default clip margin around the tile, in pixels.
pub const DEFAULT_MARGIN: f64 = 20.0;

/// Adjacent segments whose normals cancel within this are treated as a
/// reversal.
const PARALLEL_EPSILON: f64 = 1e-9;

/// Maximum angle covered by one triangle of a round join or cap.
const ROUND_STEP: f64 = PI / 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Bevel,
    Round,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStringOptions {
    pub cap: LineCap,
    pub join: LineJoin,
    /// Perpendicular offset of the stroke centre, in tile pixels.
    pub offset: f64,
    /// Relative start of the rendered sub-line in `[0, 1]`.
    pub from: Option<f64>,
    /// Relative end of the rendered sub-line in `[0, 1]`.
    pub to: Option<f64>,
    /// Emit cumulative arc length per vertex (dashed lines).
    pub length_so_far: bool,
    pub is_ring: bool,
    pub tile_size: f64,
    pub margin: f64,
}

impl Default for LineStringOptions {
    fn default() -> Self {
        Self {
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            offset: 0.0,
            from: None,
            to: None,
            length_so_far: false,
            is_ring: false,
            tile_size: 256.0,
            margin: DEFAULT_MARGIN,
        }
    }
}

impl LineStringOptions {
    /// Cap and join actually used once offset and arc-length output are
    /// taken into account.
    pub fn effective_style(&self) -> (LineCap, LineJoin) {
        if self.length_so_far {
            (LineCap::Butt, LineJoin::None)
        } else if self.offset != 0.0 {
            let join = match self.join {
                LineJoin::None => LineJoin::None,
                _ => LineJoin::Miter,
            };
            (LineCap::Butt, join)
        } else {
            (self.cap, self.join)
        }
    }

    /// Absolute start/stop distances for a line of length `total`.
    /// Swapped fractions are corrected.
    pub fn trim_range(&self, total: f64) -> (f64, f64) {
        let mut from = self.from.unwrap_or(0.0).clamp(0.0, 1.0);
        let mut to = self.to.unwrap_or(1.0).clamp(0.0, 1.0);
        if from > to {
            std::mem::swap(&mut from, &mut to);
        }
        (from * total, to * total)
    }

    fn is_trimmed(&self) -> bool {
        self.from.is_some_and(|f| f > 0.0) || self.to.is_some_and(|t| t < 1.0)
    }
}

/// Growable ribbon attributes written by [`add_line_string`].
#[derive(Debug, Clone)]
pub struct LineVertices {
    /// Tile pixels * extent scale, 2 components.
    pub position: FlexAttribute<i16>,
    /// Packed extrusion vector, 2 components.
    pub normal: FlexAttribute<i16>,
    /// Quantized metres, 1 component; present for 3D lines.
    pub height: Option<FlexAttribute<u16>>,
    /// Arc length from the line start in tile pixels, 1 component.
    pub length_so_far: Option<FlexAttribute<f32>>,
}

impl LineVertices {
    pub fn new(is_3d: bool, length_so_far: bool) -> Self {
        Self {
            position: FlexAttribute::new(2),
            normal: FlexAttribute::new(2),
            height: is_3d.then(|| FlexAttribute::new(1)),
            length_so_far: length_so_far.then(|| FlexAttribute::new(1)),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.position.vertex_count()
    }

    fn push(&mut self, v: &RibbonVertex) {
        self.position
            .push_vertex(&[encode_extent(v.pos.x), encode_extent(v.pos.y)]);
        self.normal.push_vertex(&[
            pack_line_normal(v.ext.x, v.alias),
            pack_line_normal(v.ext.y, v.side),
        ]);
        if let Some(h) = self.height.as_mut() {
            h.push(encode_height(v.pos.z));
        }
        if let Some(l) = self.length_so_far.as_mut() {
            l.push(v.length as f32);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RibbonVertex {
    pos: DVec3,
    ext: DVec2,
    length: f64,
    alias: bool,
    side: bool,
}

#[derive(Debug, Clone, Copy)]
struct PathPoint {
    pos: DVec3,
    /// Arc length along the source line.
    length: f64,
}

/// Strokes `coords` (tile pixels, z in metres) into `out`. Returns the number
/// of vertices emitted; zero when everything was clipped or degenerate.
pub fn add_line_string(out: &mut LineVertices, coords: &[DVec3], opts: &LineStringOptions) -> usize {
    let start = out.vertex_count();

    let mut points = dedupe(coords);
    if points.len() < 2 {
        return 0;
    }

    let mut is_ring = opts.is_ring;
    if is_ring && points.first().map(|p| p.pos.truncate()) != points.last().map(|p| p.pos.truncate()) {
        let first = points[0];
        let last = points[points.len() - 1];
        let length = last.length + first.pos.truncate().distance(last.pos.truncate());
        points.push(PathPoint { pos: first.pos, length });
    }

    if opts.is_trimmed() {
        let total = points[points.len() - 1].length;
        let (abs_start, abs_stop) = opts.trim_range(total);
        points = trim(&points, abs_start, abs_stop);
        is_ring = false;
        if points.len() < 2 {
            return 0;
        }
    }

    let (cap, join) = opts.effective_style();
    let runs = clip(&points, -opts.margin, opts.tile_size + opts.margin);
    let ring = is_ring && runs.len() == 1 && runs[0].len() == points.len();

    for run in &runs {
        stroke(out, run, ring, cap, join, opts.offset);
    }

    out.vertex_count() - start
}

fn dedupe(coords: &[DVec3]) -> Vec<PathPoint> {
    let mut points: Vec<PathPoint> = Vec::with_capacity(coords.len());
    for &pos in coords {
        if !pos.is_finite() {
            continue;
        }
        match points.last() {
            Some(prev) if prev.pos.truncate() == pos.truncate() => {}
            Some(prev) => {
                let length = prev.length + prev.pos.truncate().distance(pos.truncate());
                points.push(PathPoint { pos, length });
            }
            None => points.push(PathPoint { pos, length: 0.0 }),
        }
    }
    points
}

fn lerp_point(a: &PathPoint, b: &PathPoint, t: f64) -> PathPoint {
    PathPoint {
        pos: a.pos.lerp(b.pos, t),
        length: a.length + (b.length - a.length) * t,
    }
}

/// Sub-line between two absolute arc lengths.
fn trim(points: &[PathPoint], abs_start: f64, abs_stop: f64) -> Vec<PathPoint> {
    let mut out = Vec::new();
    if abs_stop <= abs_start {
        return out;
    }
    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.length <= abs_start || a.length >= abs_stop {
            continue;
        }
        let span = b.length - a.length;
        if out.is_empty() {
            let t = ((abs_start - a.length) / span).max(0.0);
            out.push(lerp_point(a, b, t));
        }
        if b.length <= abs_stop {
            out.push(*b);
        } else {
            out.push(lerp_point(a, b, (abs_stop - a.length) / span));
            break;
        }
    }
    out.dedup_by(|b, a| a.pos.truncate() == b.pos.truncate());
    out
}

/// Liang–Barsky parametric clip of segment `a -> b` against `[lo, hi]²`.
fn clip_segment(a: DVec2, b: DVec2, lo: f64, hi: f64) -> Option<(f64, f64)> {
    let d = b - a;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let checks = [
        (-d.x, a.x - lo),
        (d.x, hi - a.x),
        (-d.y, a.y - lo),
        (d.y, hi - a.y),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    (t0 < t1).then_some((t0, t1))
}

/// Splits the path into runs of consecutive segments that touch the clip
/// rectangle. Segments fully outside are dropped; crossing segments are cut at
/// the boundary.
fn clip(points: &[PathPoint], lo: f64, hi: f64) -> Vec<Vec<PathPoint>> {
    let mut runs = Vec::new();
    let mut run: Vec<PathPoint> = Vec::new();

    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        match clip_segment(a.pos.truncate(), b.pos.truncate(), lo, hi) {
            Some((t0, t1)) => {
                let start = if t0 > 0.0 { lerp_point(a, b, t0) } else { *a };
                let end = if t1 < 1.0 { lerp_point(a, b, t1) } else { *b };
                if t0 > 0.0 && !run.is_empty() {
                    runs.push(std::mem::take(&mut run));
                }
                if run.is_empty() {
                    run.push(start);
                }
                run.push(end);
                if t1 < 1.0 {
                    runs.push(std::mem::take(&mut run));
                }
            }
            None => {
                if !run.is_empty() {
                    runs.push(std::mem::take(&mut run));
                }
            }
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }
    runs.retain(|r| r.len() >= 2);
    runs
}

#[inline]
fn perp(d: DVec2) -> DVec2 {
    DVec2::new(-d.y, d.x)
}

#[derive(Debug, Clone, Copy)]
enum JoinShape {
    /// Both segments share the mitered extrusion.
    Miter(DVec2),
    /// Segments keep their own normals; the gap is filled on the outer side.
    Fill { outer: f64, round: bool },
    /// Segments keep their own normals; nothing fills the gap.
    Open,
    /// The path doubles back on itself; the turning point is closed like a
    /// cap, rounded or squared off.
    Reverse { round: bool },
}

/// Join geometry between incoming normal `n1` and outgoing normal `n2`.
fn join_shape(n1: DVec2, n2: DVec2, d1: DVec2, d2: DVec2, join: LineJoin, offset: f64) -> JoinShape {
    let sum = n1 + n2;
    let exceeds = sum.length() < PARALLEL_EPSILON;

    let miter = if exceeds {
        None
    } else {
        let bisector = sum.normalize();
        let cos = bisector.dot(n1);
        let len = 1.0 / cos;
        (len.is_finite() && len <= MITER_LIMIT).then(|| bisector * len)
    };

    let turn = d1.perp_dot(d2);
    let outer = if turn > 0.0 { -1.0 } else { 1.0 };

    match join {
        LineJoin::None => JoinShape::Open,
        _ if exceeds && offset != 0.0 => JoinShape::Open,
        _ if exceeds => JoinShape::Reverse {
            round: join == LineJoin::Round,
        },
        LineJoin::Miter => match miter {
            Some(m) => JoinShape::Miter(m),
            None if offset != 0.0 => JoinShape::Open,
            None => JoinShape::Fill { outer, round: false },
        },
        LineJoin::Bevel => JoinShape::Fill { outer, round: false },
        LineJoin::Round => JoinShape::Fill { outer, round: true },
    }
}

fn emit_triangle(out: &mut LineVertices, a: &RibbonVertex, b: &RibbonVertex, c: &RibbonVertex) {
    out.push(a);
    out.push(b);
    out.push(c);
}

/// Triangle fan around `center` sweeping from `from` to `to` (both unit
/// extrusions) through the shorter arc, or through `via` when given.
fn emit_fan(out: &mut LineVertices, center: &RibbonVertex, from: DVec2, to: DVec2, via: Option<DVec2>) {
    let a0 = from.y.atan2(from.x);
    let mut sweep = to.y.atan2(to.x) - a0;
    if let Some(via) = via {
        // Pick the direction that passes through `via`.
        let mid = a0 + sweep * 0.5;
        if DVec2::new(mid.cos(), mid.sin()).dot(via) < 0.0 {
            sweep -= sweep.signum() * 2.0 * PI;
        }
    } else if sweep > PI {
        sweep -= 2.0 * PI;
    } else if sweep < -PI {
        sweep += 2.0 * PI;
    }

    let steps = ((sweep.abs() / ROUND_STEP).ceil() as usize).max(1);
    let rim = |i: usize| {
        let angle = a0 + sweep * i as f64 / steps as f64;
        let ext = DVec2::new(angle.cos(), angle.sin());
        RibbonVertex {
            ext,
            alias: true,
            side: ext.dot(from) >= 0.0,
            ..*center
        }
    };
    for i in 0..steps {
        emit_triangle(out, center, &rim(i), &rim(i + 1));
    }
}

fn stroke(out: &mut LineVertices, run: &[PathPoint], ring: bool, cap: LineCap, join: LineJoin, offset: f64) {
    let n = run.len();
    let seg_count = n - 1;

    let dirs: Vec<DVec2> = run
        .windows(2)
        .map(|p| (p[1].pos.truncate() - p[0].pos.truncate()).normalize_or_zero())
        .collect();
    let normals: Vec<DVec2> = dirs.iter().map(|&d| perp(d)).collect();

    // Join shape at interior vertex i (between segment i-1 and i). Rings also
    // join at vertex 0, whose previous point sits at len - 2.
    let join_at = |i: usize| -> Option<JoinShape> {
        let (prev, next) = if i > 0 && i < seg_count {
            (i - 1, i)
        } else if ring && (i == 0 || i == seg_count) {
            (seg_count - 1, 0)
        } else {
            return None;
        };
        Some(join_shape(normals[prev], normals[next], dirs[prev], dirs[next], join, offset))
    };

    let vertex = |p: &PathPoint, ext: DVec2, side: bool, alias: bool, center_ext: DVec2| RibbonVertex {
        pos: p.pos + (center_ext * offset).extend(0.0),
        ext,
        length: p.length,
        alias,
        side,
    };

    for s in 0..seg_count {
        let (p0, p1) = (&run[s], &run[s + 1]);
        let (d, nrm) = (dirs[s], normals[s]);
        if d == DVec2::ZERO {
            continue;
        }

        let start_join = join_at(s);
        let end_join = join_at(s + 1);

        let start_ext = match start_join {
            Some(JoinShape::Miter(m)) => m,
            _ => nrm,
        };
        let end_ext = match end_join {
            Some(JoinShape::Miter(m)) => m,
            _ => nrm,
        };

        let (mut l0, mut r0) = (start_ext, -start_ext);
        let (mut l1, mut r1) = (end_ext, -end_ext);
        if cap == LineCap::Square {
            if start_join.is_none() {
                l0 -= d;
                r0 -= d;
            }
            if end_join.is_none() {
                l1 += d;
                r1 += d;
            }
        }

        let a = vertex(p0, l0, true, false, start_ext);
        let b = vertex(p0, r0, false, false, start_ext);
        let c = vertex(p1, l1, true, false, end_ext);
        let e = vertex(p1, r1, false, false, end_ext);
        emit_triangle(out, &a, &b, &c);
        emit_triangle(out, &b, &e, &c);

        if cap == LineCap::Round {
            if start_join.is_none() {
                let center = vertex(p0, DVec2::ZERO, false, true, nrm);
                emit_fan(out, &center, nrm, -nrm, Some(-d));
            }
            if end_join.is_none() {
                let center = vertex(p1, DVec2::ZERO, false, true, nrm);
                emit_fan(out, &center, -nrm, nrm, Some(d));
            }
        }

        if let Some(JoinShape::Reverse { round }) = end_join {
            let center = vertex(p1, DVec2::ZERO, false, true, nrm);
            if round {
                emit_fan(out, &center, -nrm, nrm, Some(d));
            } else {
                let rim = |ext: DVec2| RibbonVertex {
                    ext,
                    alias: true,
                    side: ext.dot(nrm) >= 0.0,
                    ..center
                };
                let (a, b, c, e) = (rim(nrm), rim(nrm + d), rim(d - nrm), rim(-nrm));
                emit_triangle(out, &a, &b, &c);
                emit_triangle(out, &a, &c, &e);
            }
        }

        // Fill the gap towards the next segment on its outer side.
        if let Some(JoinShape::Fill { outer, round }) = end_join {
            let next = if s + 1 < seg_count { s + 1 } else { 0 };
            let n2 = normals[next];
            let center = vertex(p1, DVec2::ZERO, false, true, nrm);
            let from = nrm * outer;
            let to = n2 * outer;
            if round {
                emit_fan(out, &center, from, to, None);
            } else {
                let side = outer > 0.0;
                let rim_a = RibbonVertex { ext: from, alias: true, side, ..center };
                let rim_b = RibbonVertex { ext: to, alias: true, side, ..center };
                emit_triangle(out, &center, &rim_a, &rim_b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::{decode_extent, unpack_line_normal};

    fn line(points: &[[f64; 2]]) -> Vec<DVec3> {
        points.iter().map(|p| DVec3::new(p[0], p[1], 0.0)).collect()
    }

    fn extrusions(out: &LineVertices) -> Vec<DVec2> {
        out.normal
            .data
            .as_slice()
            .chunks_exact(2)
            .map(|c| DVec2::new(unpack_line_normal(c[0]).0, unpack_line_normal(c[1]).0))
            .collect()
    }

    #[test]
    fn straight_segment_emits_two_triangles() {
        let mut out = LineVertices::new(false, false);
        let n = add_line_string(&mut out, &line(&[[10.0, 10.0], [50.0, 10.0]]), &LineStringOptions::default());
        assert_eq!(n, 6);
        for e in extrusions(&out) {
            assert!((e.length() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn gentle_angle_keeps_miter() {
        let mut out = LineVertices::new(false, false);
        let n = add_line_string(
            &mut out,
            &line(&[[0.0, 0.0], [100.0, 0.0], [200.0, 10.0]]),
            &LineStringOptions::default(),
        );
        assert_eq!(n, 12);
        assert!(extrusions(&out).iter().all(|e| e.length() <= MITER_LIMIT + 1e-3));
    }

    #[test]
    fn sharp_angle_falls_back_to_bevel() {
        let mut out = LineVertices::new(false, false);
        let n = add_line_string(
            &mut out,
            &line(&[[0.0, 0.0], [100.0, 0.0], [0.0, 10.0]]),
            &LineStringOptions::default(),
        );
        // Two segments plus one bevel triangle.
        assert_eq!(n, 15);
        assert!(extrusions(&out).iter().all(|e| e.length() <= MITER_LIMIT + 1e-3));
    }

    #[test]
    fn reversal_emits_only_finite_vertices() {
        for join in [LineJoin::Miter, LineJoin::Bevel, LineJoin::Round, LineJoin::None] {
            let mut out = LineVertices::new(true, true);
            let opts = LineStringOptions { join, cap: LineCap::Round, ..Default::default() };
            let n = add_line_string(&mut out, &line(&[[10.0, 10.0], [60.0, 10.0], [10.0, 10.0]]), &opts);
            assert!(n >= 12, "{join:?}");
            assert!(extrusions(&out).iter().all(|e| e.is_finite()));
            let lengths = out.length_so_far.as_ref().unwrap();
            assert!(lengths.data.as_slice().iter().all(|l| l.is_finite()));
        }
    }

    #[test]
    fn bevel_on_reversal_with_offset_stays_finite() {
        let mut out = LineVertices::new(false, false);
        let opts = LineStringOptions { offset: 4.0, ..Default::default() };
        add_line_string(&mut out, &line(&[[10.0, 10.0], [60.0, 10.0], [10.0, 10.0]]), &opts);
        assert!(out.position.data.as_slice().iter().all(|&p| p != i16::MIN && p != i16::MAX));
    }

    #[test]
    fn trimming_covers_requested_fraction() {
        let coords = line(&[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0]]);
        let opts = LineStringOptions {
            from: Some(0.3),
            to: Some(0.7),
            length_so_far: true,
            ..Default::default()
        };
        let mut out = LineVertices::new(false, true);
        add_line_string(&mut out, &coords, &opts);

        let lengths = out.length_so_far.as_ref().unwrap().data.as_slice().to_vec();
        let min = lengths.iter().cloned().fold(f32::INFINITY, f32::min) as f64;
        let max = lengths.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
        assert!((min - 60.0).abs() < 1e-4);
        assert!((max - min - 0.4 * 200.0).abs() < 1e-4);

        let first_x = decode_extent(out.position.data.as_slice()[0]);
        assert!((first_x - 60.0).abs() < 1e-6);
    }

    #[test]
    fn swapped_trim_matches_ordered_trim() {
        let coords = line(&[[0.0, 0.0], [100.0, 0.0], [100.0, 100.0]]);
        let ordered = LineStringOptions { from: Some(0.3), to: Some(0.7), ..Default::default() };
        let swapped = LineStringOptions { from: Some(0.7), to: Some(0.3), ..Default::default() };

        let mut a = LineVertices::new(false, false);
        let mut b = LineVertices::new(false, false);
        add_line_string(&mut a, &coords, &ordered);
        add_line_string(&mut b, &coords, &swapped);
        assert_eq!(a.position.data.as_slice(), b.position.data.as_slice());
        assert_eq!(a.normal.data.as_slice(), b.normal.data.as_slice());
    }

    #[test]
    fn reversal_is_closed_past_the_turning_point() {
        let coords = line(&[[10.0, 10.0], [100.0, 10.0], [10.0, 10.0]]);

        let mut out = LineVertices::new(false, false);
        let n = add_line_string(&mut out, &coords, &LineStringOptions::default());
        // Two segments plus a squared-off closure.
        assert_eq!(n, 12 + 6);
        let ext = extrusions(&out);
        let tip = &ext[12..];
        assert!(tip.iter().any(|e| (e.x - 1.0).abs() < 1e-3 && (e.y - 1.0).abs() < 1e-3));
        assert!(tip.iter().any(|e| (e.x - 1.0).abs() < 1e-3 && (e.y + 1.0).abs() < 1e-3));

        let mut round = LineVertices::new(false, false);
        let opts = LineStringOptions { join: LineJoin::Round, ..Default::default() };
        let n = add_line_string(&mut round, &coords, &opts);
        // Half-circle fan of 8 triangles ahead of the turning point.
        assert_eq!(n, 12 + 8 * 3);
        assert!(extrusions(&round)[12..].iter().all(|e| e.x >= -1e-3));
    }

    #[test]
    fn segments_outside_tile_are_dropped() {
        let mut out = LineVertices::new(false, false);
        let n = add_line_string(
            &mut out,
            &line(&[[-500.0, -500.0], [-400.0, -500.0]]),
            &LineStringOptions::default(),
        );
        assert_eq!(n, 0);
    }

    #[test]
    fn crossing_segment_is_cut_at_margin() {
        let mut out = LineVertices::new(false, false);
        let opts = LineStringOptions::default();
        add_line_string(&mut out, &line(&[[-1000.0, 10.0], [10.0, 10.0]]), &opts);
        let xs: Vec<f64> = out
            .position
            .data
            .as_slice()
            .chunks_exact(2)
            .map(|c| decode_extent(c[0]))
            .collect();
        assert!(xs.iter().all(|&x| x >= -opts.margin - 1e-6));
    }

    #[test]
    fn arc_length_forces_butt_and_no_join() {
        let opts = LineStringOptions {
            cap: LineCap::Round,
            join: LineJoin::Round,
            length_so_far: true,
            ..Default::default()
        };
        assert_eq!(opts.effective_style(), (LineCap::Butt, LineJoin::None));

        let mut out = LineVertices::new(false, true);
        let n = add_line_string(&mut out, &line(&[[0.0, 0.0], [50.0, 0.0], [50.0, 50.0]]), &opts);
        assert_eq!(n, 12);
    }

    #[test]
    fn offset_forces_butt_and_miter() {
        let opts = LineStringOptions {
            cap: LineCap::Square,
            join: LineJoin::Round,
            offset: 2.0,
            ..Default::default()
        };
        assert_eq!(opts.effective_style(), (LineCap::Butt, LineJoin::Miter));
        let none = LineStringOptions { join: LineJoin::None, ..opts };
        assert_eq!(none.effective_style(), (LineCap::Butt, LineJoin::None));
    }

    #[test]
    fn round_caps_add_fans() {
        let mut out = LineVertices::new(false, false);
        let opts = LineStringOptions { cap: LineCap::Round, ..Default::default() };
        let n = add_line_string(&mut out, &line(&[[10.0, 10.0], [50.0, 10.0]]), &opts);
        // Ribbon plus two half-circle fans of 8 triangles.
        assert_eq!(n, 6 + 2 * 8 * 3);
    }

    #[test]
    fn square_caps_extend_along_tangent() {
        let mut out = LineVertices::new(false, false);
        let opts = LineStringOptions { cap: LineCap::Square, ..Default::default() };
        add_line_string(&mut out, &line(&[[10.0, 10.0], [50.0, 10.0]]), &opts);
        let ext = extrusions(&out);
        // First vertex: start, +normal side, pushed back along -x.
        assert!((ext[0].x + 1.0).abs() < 1e-3);
        assert!((ext[0].y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn closed_ring_joins_at_start() {
        let square = line(&[[10.0, 10.0], [50.0, 10.0], [50.0, 50.0], [10.0, 50.0]]);
        let mut out = LineVertices::new(false, false);
        let opts = LineStringOptions { is_ring: true, ..Default::default() };
        let n = add_line_string(&mut out, &square, &opts);
        // Four segments, all corners mitered.
        assert_eq!(n, 24);
        let diag = 2f64.sqrt();
        assert!((extrusions(&out)[0].length() - diag).abs() < 1e-3);
    }

    #[test]
    fn duplicate_points_are_skipped() {
        let mut out = LineVertices::new(false, false);
        let n = add_line_string(
            &mut out,
            &line(&[[10.0, 10.0], [10.0, 10.0], [50.0, 10.0], [50.0, 10.0]]),
            &LineStringOptions::default(),
        );
        assert_eq!(n, 6);
    }

    #[test]
    fn height_is_quantized_when_3d() {
        let mut out = LineVertices::new(true, false);
        let coords = vec![DVec3::new(0.0, 0.0, 9000.0), DVec3::new(10.0, 0.0, 0.0)];
        add_line_string(&mut out, &coords, &LineStringOptions::default());
        let h = out.height.as_ref().unwrap().data.as_slice();
        assert_eq!(h[0], 65535);
        assert_eq!(h[2], 0);
    }
}
