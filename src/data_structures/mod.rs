//! Viewer data structures: scene graph, geometry, materials and their GPU handles.
//!
//! - `handle` allocates resource ids and tracks their release
//! - `geometry` holds vertex data and derives normals, bounds and wireframes
//! - `material` is the closed set of material variants and their texture slots
//! - `texture` wraps decoded images and the depth render target
//! - `instance` holds local/world transformations
//! - `scene_graph` enables hierarchical scene organization
//! - `bounds` and `color` are small value types shared by all of the above

pub mod bounds;
pub mod color;
pub mod geometry;
pub mod handle;
pub mod instance;
pub mod material;
pub mod scene_graph;
pub mod texture;
