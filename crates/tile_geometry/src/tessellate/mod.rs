//! Pure geometry expansion into growable vertex attributes.

pub mod line;
pub mod mesh;
pub mod point;
pub mod polygon;

pub use line::{add_line_string, LineCap, LineJoin, LineStringOptions, LineVertices};
pub use mesh::{add_box, add_sphere, box_vertices, BoxVertices, SphereMesh, SphereVertices};
pub use point::{add_point, set_point_visible, POINT_ALIGN_MAP};
pub use polygon::{add_extrude, add_polygon, triangulate, ExtrudeVertices, PolygonVertices};
