//! Tile geometry: the data side of the map tile renderer.
//!
//! - `flex`: growable typed arrays backing tessellator output.
//! - `quantize`: fixed-point packing shared by builders, programs and hit tests.
//! - `geometry_buffer`: the finalized per-tile draw payload.
//! - `tessellate`: line stroking, polygon fill/extrusion, box/sphere meshes,
//!   point quads.
//! - `template`: per-kind builders that finalize into geometry buffers.
//! - `raycast` / `hit`: ray-primitive intersection and per-kind hit tests.
//!
//! Tile-local coordinates are pixels of a tile (x right, y down); heights are
//! metres.

pub mod attribute;
pub mod error;
pub mod flex;
pub mod geometry_buffer;
pub mod hit;
pub mod kind;
pub mod quantize;
pub mod raycast;
pub mod tessellate;
pub mod template;

pub use attribute::{Attribute, AttributeData, ElementType, IndexData, ResourceId};
pub use error::BufferError;
pub use flex::{FlexArray, FlexAttribute};
pub use geometry_buffer::{
    compute_normals, names, ColorMask, CullFace, DrawGroup, DynamicUniform, FeatureId,
    GeometryBuffer, GroupKind, IdOffset, Pass, PassMask, Primitive, StateOverrides,
    TextureHandle, Uniform, UniformValue,
};
pub use hit::{Hit, HitTester, RayIntersect, RayQuery};
pub use kind::BufferKind;
pub use raycast::Ray;
pub use template::TemplateBuffer;
