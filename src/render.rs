//! Turning the scene into draw calls.
//!
//! [`collect_draws`] flattens the scene graph into [`DrawItem`]s: one per mesh
//! material group and one per line segment node, filtered by the camera's
//! layers. Backends only consume draw items and the released resource ids the
//! session hands them, so the lifecycle logic runs the same against a window
//! ([`WgpuBackend`]) and in tests ([`HeadlessBackend`]).

use std::{collections::HashMap, ops::Range, sync::Arc};

use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::PerspectiveCamera,
    context::Context,
    data_structures::{
        color::Color,
        geometry::Geometry,
        handle::ResourceId,
        instance::InstanceRaw,
        material::Material,
        scene_graph::{Layers, SceneNode},
    },
    pipelines::{
        GpuVertex,
        light::LightResources,
        lines::mk_line_pipeline,
        mesh::mk_mesh_pipeline,
    },
    scene::Scene,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    Lines,
}

#[derive(Clone, Debug)]
pub struct DrawItem<'a> {
    pub name: &'a str,
    pub topology: Topology,
    pub geometry: &'a Geometry,
    pub material: &'a Material,
    /// Index range if the geometry is indexed, vertex range otherwise.
    pub elements: Range<u32>,
    pub world: Matrix4<f32>,
}

impl DrawItem<'_> {
    pub fn color(&self) -> [f32; 4] {
        self.material.color.to_rgba(self.material.opacity())
    }
}

/// Everything `camera` sees of `scene`, grid first.
pub fn collect_draws<'a>(scene: &'a Scene, camera: &PerspectiveCamera) -> Vec<DrawItem<'a>> {
    let mut draws = Vec::new();
    let identity = Matrix4::identity();
    collect_node(scene.grid.lines(), &identity, camera.layers, &mut draws);
    collect_node(scene.model_holder.root(), &identity, camera.layers, &mut draws);
    draws
}

fn collect_node<'a>(
    node: &'a dyn SceneNode,
    parent: &Matrix4<f32>,
    visible: Layers,
    draws: &mut Vec<DrawItem<'a>>,
) {
    let world = node.get_local_transform().world(parent);
    if node.layers().test(visible) {
        if let Some(mesh) = node.as_mesh() {
            for group in mesh.geometry.groups() {
                let Some(material) = mesh
                    .materials
                    .iter()
                    .nth(group.material_index)
                    .or_else(|| mesh.materials.primary())
                else {
                    continue;
                };
                if material.opacity() <= 0.0 || group.elements.is_empty() {
                    continue;
                }
                draws.push(DrawItem {
                    name: &mesh.name,
                    topology: Topology::Triangles,
                    geometry: &mesh.geometry,
                    material,
                    elements: group.elements,
                    world,
                });
            }
        } else if let Some(lines) = node.as_line_segments() {
            if lines.material.opacity() > 0.0 && lines.geometry.element_count() > 0 {
                draws.push(DrawItem {
                    name: &lines.name,
                    topology: Topology::Lines,
                    geometry: &lines.geometry,
                    material: &lines.material,
                    elements: 0..lines.geometry.element_count() as u32,
                    world,
                });
            }
        }
    }
    for child in node.get_children() {
        collect_node(child.as_ref(), &world, visible, draws);
    }
}

/// Where the viewer's frames go.
pub trait RenderBackend {
    /// Called with the new viewport size; zero sizes never reach the backend.
    fn resize(&mut self, width: u32, height: u32);

    /// Frees the GPU objects behind resources the scene released.
    fn release(&mut self, ids: &[ResourceId]);

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> anyhow::Result<()>;
}

/// Summary of one frame drawn by a [`HeadlessBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub background: Option<Color>,
    pub meshes: usize,
    pub lines: usize,
    pub triangles: usize,
    /// Names of the drawn nodes in draw order.
    pub drawn: Vec<String>,
}

/// Backend without a GPU. Records what would have been drawn and freed.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    pub size: (u32, u32),
    pub frames: Vec<FrameRecord>,
    pub released: Vec<ResourceId>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            ..Default::default()
        }
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }
}

impl RenderBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn release(&mut self, ids: &[ResourceId]) {
        self.released.extend_from_slice(ids);
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> anyhow::Result<()> {
        let draws = collect_draws(scene, camera);
        let record = FrameRecord {
            background: scene.background,
            meshes: draws
                .iter()
                .filter(|d| d.topology == Topology::Triangles)
                .count(),
            lines: draws.iter().filter(|d| d.topology == Topology::Lines).count(),
            triangles: draws
                .iter()
                .filter(|d| d.topology == Topology::Triangles)
                .map(|d| d.elements.len() / 3)
                .sum(),
            drawn: draws.iter().map(|d| d.name.to_string()).collect(),
        };
        self.frames.push(record);
        Ok(())
    }
}

struct GeometryBuffers {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
}

/// Renders into a window surface.
pub struct WgpuBackend {
    ctx: Context,
    light: LightResources,
    mesh_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    geometries: HashMap<ResourceId, GeometryBuffers>,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let ctx = Context::new(window).await?;
        let light = LightResources::new(&ctx.device, bytemuck::Zeroable::zeroed());
        let mesh_pipeline = mk_mesh_pipeline(
            &ctx.device,
            &ctx.config,
            &ctx.camera.bind_group_layout,
            &light.bind_group_layout,
        );
        let line_pipeline = mk_line_pipeline(&ctx.device, &ctx.config, &ctx.camera.bind_group_layout);
        Ok(Self {
            ctx,
            light,
            mesh_pipeline,
            line_pipeline,
            geometries: HashMap::new(),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        self.ctx.window()
    }

    fn upload(&mut self, geometry: &Geometry) {
        if self.geometries.contains_key(&geometry.id()) {
            return;
        }
        let label = geometry.handle().label().to_string();
        let vertices = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents: bytemuck::cast_slice(&GpuVertex::from_geometry(geometry)),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = geometry.indices().map(|indices| {
            self.ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&label),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });
        log::trace!("uploaded geometry {} ({})", geometry.id(), label);
        self.geometries
            .insert(geometry.id(), GeometryBuffers { vertices, indices });
    }
}

impl RenderBackend for WgpuBackend {
    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }

    fn release(&mut self, ids: &[ResourceId]) {
        for id in ids {
            if let Some(buffers) = self.geometries.remove(id) {
                buffers.vertices.destroy();
                if let Some(indices) = buffers.indices {
                    indices.destroy();
                }
            }
        }
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> anyhow::Result<()> {
        self.ctx.window.request_redraw();
        // Rendering requires the surface to be configured
        if !self.ctx.is_surface_configured() {
            return Ok(());
        }

        let output = match self.ctx.surface.get_current_texture() {
            Ok(output) => output,
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.ctx.reconfigure();
                return Ok(());
            }
            Err(e) => anyhow::bail!("unable to acquire the next frame: {}", e),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.ctx.camera.uniform.update_view_proj(camera);
        self.ctx.queue.write_buffer(
            &self.ctx.camera.buffer,
            0,
            bytemuck::cast_slice(&[self.ctx.camera.uniform]),
        );
        self.light.update(&self.ctx.queue, scene);

        let draws = collect_draws(scene, camera);
        for draw in &draws {
            self.upload(draw.geometry);
        }
        let instances: Vec<InstanceRaw> = draws
            .iter()
            .map(|draw| InstanceRaw::new(&draw.world, draw.color()))
            .collect();
        let instance_buffer = (!instances.is_empty()).then(|| {
            self.ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Instance Buffer"),
                    contents: bytemuck::cast_slice(&instances),
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });

        let clear = match scene.background {
            Some(color) => color.into(),
            None => wgpu::Color::TRANSPARENT,
        };
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(instance_buffer) = &instance_buffer {
                render_pass.set_vertex_buffer(1, instance_buffer.slice(..));
                render_pass.set_bind_group(0, &self.ctx.camera.bind_group, &[]);
                let mut current = None;
                for (i, draw) in draws.iter().enumerate() {
                    let Some(buffers) = self.geometries.get(&draw.geometry.id()) else {
                        continue;
                    };
                    if current != Some(draw.topology) {
                        match draw.topology {
                            Topology::Triangles => {
                                render_pass.set_pipeline(&self.mesh_pipeline);
                                render_pass.set_bind_group(1, &self.light.bind_group, &[]);
                            }
                            Topology::Lines => render_pass.set_pipeline(&self.line_pipeline),
                        }
                        current = Some(draw.topology);
                    }
                    let instance = i as u32..i as u32 + 1;
                    render_pass.set_vertex_buffer(0, buffers.vertices.slice(..));
                    match &buffers.indices {
                        Some(indices) => {
                            render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                            render_pass.draw_indexed(draw.elements.clone(), 0, instance);
                        }
                        None => render_pass.draw(draw.elements.clone(), instance),
                    }
                }
            }
        }

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use cgmath::{Deg, Point3};

    use super::*;
    use crate::{
        config::Settings,
        data_structures::{
            geometry::{GeometryGroup, cube_positions_and_indices},
            handle::ResourceTracker,
            material::{MaterialKind, MaterialSet, StandardMaps},
            scene_graph::{ContainerNode, MeshNode},
        },
        overlay::{OVERLAY_LAYER, apply_overlay_visibility, build_overlays},
    };

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(Point3::new(-6.0, 7.0, 4.0), Deg(75.0), 800, 600)
    }

    fn material(tracker: &Rc<ResourceTracker>, name: &str) -> Rc<Material> {
        Rc::new(Material::new(
            tracker,
            name,
            MaterialKind::Standard(StandardMaps::default()),
            Color::WHITE,
        ))
    }

    fn scene_with_cube(tracker: &Rc<ResourceTracker>) -> Scene {
        let mut scene = Scene::new(tracker, &Settings::default());
        let (positions, indices) = cube_positions_and_indices(0.5);
        let geometry = Geometry::new(tracker, "cube", positions, Some(indices)).with_groups(vec![
            GeometryGroup {
                elements: 0..18,
                material_index: 0,
            },
            GeometryGroup {
                elements: 18..36,
                material_index: 1,
            },
        ]);
        let materials = MaterialSet::from(vec![material(tracker, "a"), material(tracker, "b")]);
        let mut root = ContainerNode::new("model");
        root.add_child(Box::new(MeshNode::new("cube", geometry, materials)));
        scene.model_holder.attach(Box::new(root));
        scene
    }

    #[test]
    fn one_draw_per_material_group() {
        let tracker = ResourceTracker::new();
        let scene = scene_with_cube(&tracker);
        let draws = collect_draws(&scene, &camera());
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].elements, 18..36);
        assert_eq!(draws[1].material.name, "b");
    }

    #[test]
    fn overlays_follow_the_camera_layer() {
        let tracker = ResourceTracker::new();
        let mut scene = scene_with_cube(&tracker);
        if let Some(asset) = scene.model_holder.asset_mut() {
            build_overlays(asset, &tracker, Color::WHITE);
        }
        let mut camera = camera();
        assert_eq!(collect_draws(&scene, &camera).len(), 2);

        apply_overlay_visibility(&mut camera, true);
        assert!(camera.layers.is_enabled(OVERLAY_LAYER));
        let draws = collect_draws(&scene, &camera);
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[2].topology, Topology::Lines);
    }

    #[test]
    fn hidden_grid_is_not_drawn() {
        let tracker = ResourceTracker::new();
        let mut scene = Scene::new(&tracker, &Settings::default());
        assert!(collect_draws(&scene, &camera()).is_empty());
        scene.grid.set_visible(true);
        let draws = collect_draws(&scene, &camera());
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].name, "grid");
    }

    #[test]
    fn headless_backend_records_frames() {
        let tracker = ResourceTracker::new();
        let scene = scene_with_cube(&tracker);
        let mut backend = HeadlessBackend::new(800, 600);
        backend.render(&scene, &camera()).unwrap();
        let frame = backend.last_frame().unwrap();
        assert_eq!(frame.meshes, 2);
        assert_eq!(frame.triangles, 12);
        assert_eq!(frame.background, Some(Color::BLACK));
    }
}
