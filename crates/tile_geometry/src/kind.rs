/// Primitive kind of a geometry buffer. Selects the draw program and the hit
/// test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    Point,
    Text,
    Icon,
    Line,
    Polygon,
    Extrude,
    Box,
    Sphere,
    Heatmap,
    Rect,
    Image,
    Model,
}

impl BufferKind {
    pub const COUNT: usize = 12;

    pub const ALL: [BufferKind; Self::COUNT] = [
        BufferKind::Point,
        BufferKind::Text,
        BufferKind::Icon,
        BufferKind::Line,
        BufferKind::Polygon,
        BufferKind::Extrude,
        BufferKind::Box,
        BufferKind::Sphere,
        BufferKind::Heatmap,
        BufferKind::Rect,
        BufferKind::Image,
        BufferKind::Model,
    ];

    /// Slot in fixed-size per-kind tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferKind::Point => "Point",
            BufferKind::Text => "Text",
            BufferKind::Icon => "Icon",
            BufferKind::Line => "Line",
            BufferKind::Polygon => "Polygon",
            BufferKind::Extrude => "Extrude",
            BufferKind::Box => "Box",
            BufferKind::Sphere => "Sphere",
            BufferKind::Heatmap => "Heatmap",
            BufferKind::Rect => "Rect",
            BufferKind::Image => "Image",
            BufferKind::Model => "Model",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_cover_table() {
        for (i, kind) in BufferKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
