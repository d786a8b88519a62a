//! The viewer session: one viewport showing at most one model.
//!
//! [`ViewerSession`] owns the scene, camera, orbit controls, rendering backend
//! and resource tracker. Every lifecycle operation (loading, configuration
//! updates, resizing, drawing and teardown) is a method on it and runs on the
//! session's thread. Loads finish asynchronously and are applied the next
//! time [`ViewerSession::poll_loads`] runs.

use std::rc::Rc;

use cgmath::Deg;
use winit::event::WindowEvent;

use crate::{
    camera::PerspectiveCamera,
    config::{ConfigPatch, Settings},
    controls::OrbitControls,
    data_structures::{
        handle::ResourceTracker,
        scene_graph::SceneNode,
        texture::{Texture, TextureMapping},
    },
    dispose::DisposalReport,
    events::{EventBus, ViewerEvent},
    loader::{AssetLoader, LoadTicket, LoaderMessage, Spawner},
    normalize::normalize,
    overlay::{apply_overlay_visibility, build_overlays},
    render::RenderBackend,
    resources::{ImageData, ModelData, instantiate},
    scene::Scene,
};

/// Sum of the triangles of every mesh below `root`. Normals are recomputed
/// on the way, overlays are not counted.
pub fn count_triangles(root: &mut dyn SceneNode) -> usize {
    let mut triangles = 0;
    root.traverse_mut(&mut |node| {
        if let Some(mesh) = node.as_mesh_mut() {
            mesh.geometry.compute_vertex_normals();
            triangles += mesh.geometry.triangle_count();
        }
    });
    triangles
}

pub struct ViewerSession<B: RenderBackend> {
    backend: B,
    tracker: Rc<ResourceTracker>,
    settings: Settings,
    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    events: EventBus,
    loader: AssetLoader,
    viewport: (u32, u32),
    last_progress: Option<(LoadTicket, u8)>,
    closed: bool,
}

impl<B: RenderBackend> ViewerSession<B> {
    /// Creates a session that loads on the platform's default executor.
    pub fn new(backend: B, patch: &ConfigPatch, viewport: (u32, u32)) -> Self {
        Self::with_spawner(backend, patch, viewport, Spawner::platform_default())
    }

    pub fn with_spawner(
        mut backend: B,
        patch: &ConfigPatch,
        viewport: (u32, u32),
        spawner: Spawner,
    ) -> Self {
        let settings = Settings::default().merged(patch);
        let tracker = ResourceTracker::new();
        let (width, height) = viewport;

        let mut camera = PerspectiveCamera::new(
            settings.camera.position.into(),
            Deg(settings.camera.fov),
            width,
            height,
        );
        camera.target = settings.controls.orbit_target.into();
        apply_overlay_visibility(&mut camera, settings.edges.enable);
        let controls = OrbitControls::new(&settings.controls, height);
        let scene = Scene::new(&tracker, &settings);

        let loader = AssetLoader::new(spawner);
        if let Some(path) = &settings.rendering.environment_path {
            loader.request_environment(path);
        }
        if width > 0 && height > 0 {
            backend.resize(width, height);
        }
        log::debug!("viewer session created with {:?}", settings);

        Self {
            backend,
            tracker,
            settings,
            scene,
            camera,
            controls,
            events: EventBus::default(),
            loader,
            viewport,
            last_progress: None,
            closed: false,
        }
    }

    /// Starts loading the model at `locator`. The previous model stays
    /// attached until the new one is ready. Empty locators are ignored.
    pub fn load_model(&mut self, locator: &str) -> Option<LoadTicket> {
        if self.closed {
            log::debug!("ignoring load of '{}' on a closed viewer", locator);
            return None;
        }
        let locator = locator.trim();
        if locator.is_empty() {
            return None;
        }
        Some(self.loader.request(locator))
    }

    /// Applies everything the loader finished since the last call.
    pub fn poll_loads(&mut self) {
        for message in self.loader.poll() {
            if self.closed {
                log::debug!("dropping {:?}, the viewer is closed", message);
                continue;
            }
            match message {
                LoaderMessage::Progress { ticket, percent } => self.report_progress(ticket, percent),
                LoaderMessage::Model {
                    ticket,
                    locator,
                    result,
                } => {
                    if !self.loader.is_latest(ticket) {
                        log::debug!("discarding stale {} of '{}'", ticket, locator);
                        continue;
                    }
                    match result {
                        Ok(data) => {
                            log::info!("{}: '{}' loaded", ticket, locator);
                            self.install_model(data);
                        }
                        Err(e) => log::error!("failed to load '{}': {:#}", locator, e),
                    }
                }
                LoaderMessage::Environment { locator, result } => match result {
                    Ok(image) => self.install_environment(image),
                    Err(e) => log::error!("failed to load environment '{}': {:#}", locator, e),
                },
            }
        }
    }

    fn report_progress(&mut self, ticket: LoadTicket, percent: u8) {
        if !self.loader.is_latest(ticket) {
            return;
        }
        if let Some((last_ticket, last_percent)) = self.last_progress {
            if last_ticket == ticket && percent <= last_percent {
                return;
            }
        }
        self.last_progress = Some((ticket, percent));
        self.events.push(ViewerEvent::Progress(percent));
    }

    /// Replaces the attached model with `data`: disposes the previous model,
    /// normalizes the new one, enables its shadows, builds its wireframe
    /// overlays, attaches it and publishes a `Load` event.
    pub fn install_model(&mut self, data: ModelData) {
        if self.closed {
            return;
        }
        let report = self.scene.model_holder.dispose_asset();
        if !report.is_empty() {
            log::debug!("disposed previous model: {}", report);
        }

        let mut asset = instantiate(data, &self.tracker);
        let fit = normalize(asset.as_mut());
        log::debug!("normalized '{}' with {:?}", asset.name(), fit);
        asset.traverse_mut(&mut |node| {
            if let Some(mesh) = node.as_mesh_mut() {
                mesh.cast_shadow = true;
                mesh.receive_shadow = true;
            }
        });
        build_overlays(asset.as_mut(), &self.tracker, self.settings.edges.color);
        apply_overlay_visibility(&mut self.camera, self.settings.edges.enable);
        let triangle_count = count_triangles(asset.as_mut());

        self.scene.model_holder.attach(asset);
        self.flush_releases();
        self.events.push(ViewerEvent::Load {
            camera_position: self.camera.position.into(),
            orbit_target: self.controls.target.into(),
            triangle_count,
        });
    }

    fn install_environment(&mut self, image: ImageData) {
        let mut texture = Texture::from_pixels(&self.tracker, &image.name, image.pixels);
        texture.mapping = TextureMapping::EquirectangularReflection;
        let report = self.scene.set_environment(texture);
        if !report.is_empty() {
            log::debug!("replaced environment: {}", report);
        }
    }

    /// Merges `patch` into the effective configuration and applies the
    /// parts that can change at runtime: grid visibility, overlay visibility
    /// and auto-rotation. Everything else only takes effect on construction.
    pub fn update_config(&mut self, patch: &ConfigPatch) {
        if self.closed || patch.is_empty() {
            return;
        }
        self.settings = self.settings.merged(patch);
        self.scene.grid.set_visible(self.settings.grid.enable);
        apply_overlay_visibility(&mut self.camera, self.settings.edges.enable);
        self.controls.set_auto_rotate(
            self.settings.controls.auto_rotate,
            self.settings.controls.auto_rotate_speed,
        );
        log::debug!("configuration updated: {:?}", patch);
    }

    pub fn update_config_json(&mut self, json: &str) -> anyhow::Result<()> {
        let patch = ConfigPatch::from_json(json)?;
        self.update_config(&patch);
        Ok(())
    }

    /// Adapts camera and backend to a new viewport. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.closed || !self.camera.set_aspect(width, height) {
            return false;
        }
        self.viewport = (width, height);
        self.controls.resize(height);
        self.backend.resize(width, height);
        true
    }

    /// Forwards pointer input to the orbit controls. Returns `true` if consumed.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        !self.closed && self.controls.handle_window_event(event)
    }

    /// Advances the orbit controls by `dt` seconds. A finished gesture
    /// publishes an `Update` event.
    pub fn update(&mut self, dt: f32) {
        if self.closed {
            return;
        }
        self.controls.update(&mut self.camera, dt);
        if self.controls.take_gesture_end() {
            self.events.push(ViewerEvent::Update {
                camera_position: self.camera.position.into(),
                orbit_target: self.controls.target.into(),
            });
        }
    }

    pub fn draw(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_releases();
        self.backend.render(&self.scene, &self.camera)
    }

    /// Hands released resource ids to the backend.
    fn flush_releases(&mut self) {
        let released = self.tracker.drain_released();
        if !released.is_empty() {
            self.backend.release(&released);
        }
    }

    /// Releases the model, grid and environment. Later calls do nothing.
    pub fn teardown(&mut self) -> DisposalReport {
        if self.closed {
            return DisposalReport::default();
        }
        let report = self.scene.dispose();
        self.flush_releases();
        self.closed = true;
        log::info!("viewer closed, released {}", report);
        report
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        self.events.drain()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn tracker(&self) -> &Rc<ResourceTracker> {
        &self.tracker
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn active_asset(&self) -> Option<&dyn SceneNode> {
        self.scene.model_holder.asset()
    }

    pub fn latest_ticket(&self) -> Option<LoadTicket> {
        self.loader.latest()
    }
}

impl<B: RenderBackend> Drop for ViewerSession<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
