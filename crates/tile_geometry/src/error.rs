use thiserror::Error;

/// Structural problems found when validating a finalized geometry buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("attribute `{name}` has component size 0")]
    ZeroComponentSize { name: String },

    #[error("attribute `{name}` length {len} is not a multiple of its size {size}")]
    RaggedAttribute { name: String, len: usize, size: u8 },

    #[error("attribute `{name}` describes {found} vertices, expected {expected}")]
    VertexCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("group {group} references vertex {index} but only {vertex_count} exist")]
    IndexOutOfRange {
        group: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("group {group} draws vertices {first}..{end} but only {vertex_count} exist")]
    RangeOutOfBounds {
        group: usize,
        first: u32,
        end: u32,
        vertex_count: usize,
    },
}
