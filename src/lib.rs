//! flow-viewer
//!
//! An embeddable model viewer on wgpu with native and WASM support. A viewer
//! session shows one glTF or OBJ model at a time: it loads the model
//! asynchronously, scales it into a canonical box, adds a wireframe overlay,
//! and releases every GPU resource of the previous model when it is replaced
//! or the viewer is torn down.
//!
//! High-level modules
//! - `viewer`: the session owning scene, camera, controls and backend
//! - `loader`: asynchronous loads with latest-wins tickets
//! - `resources`: glTF/OBJ/HDR decoding and scene instantiation
//! - `dispose`, `normalize`, `overlay`: the asset lifecycle steps
//! - `config`: declarative configuration with deep-merging patches
//! - `render`, `pipelines`, `context`: the rendering backends
//! - `flow`: render loop scheduling and the windowed application
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod controls;
pub mod data_structures;
pub mod dispose;
pub mod events;
pub mod flow;
pub mod loader;
pub mod normalize;
pub mod overlay;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use config::{ConfigPatch, Settings};
pub use events::ViewerEvent;
pub use flow::{RenderLoop, ViewerOptions, run};
pub use render::{HeadlessBackend, RenderBackend, WgpuBackend};
pub use viewer::ViewerSession;
pub use winit::event::WindowEvent;
