//! The static part of the viewer's scene: lights, background, grid and the
//! holder the loaded model is attached to.

use std::rc::Rc;

use cgmath::Point3;

use crate::{
    config::{GridSettings, Settings},
    data_structures::{
        color::Color,
        geometry::Geometry,
        handle::ResourceTracker,
        material::{LineMaps, Material, MaterialKind},
        scene_graph::{ContainerNode, LineRole, LineSegmentsNode, SceneNode},
        texture::Texture,
    },
    dispose::{DisposalReport, dispose, dispose_texture},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub position: Point3<f32>,
    pub color: Color,
    pub intensity: f32,
    pub cast_shadow: bool,
    pub shadow_intensity: f32,
}

/// Line grid on the ground plane. Hiding it only fades its material out.
pub struct Grid {
    lines: LineSegmentsNode,
}

impl Grid {
    pub fn new(tracker: &Rc<ResourceTracker>, settings: &GridSettings) -> Self {
        let (positions, colors) = grid_lines(settings);
        let geometry = Geometry::new(tracker, "grid", positions, None).with_colors(colors);
        let material = Material::new(
            tracker,
            "grid",
            MaterialKind::LineBasic(LineMaps::default()),
            Color::WHITE,
        )
        .with_transparency(1.0);
        let mut grid = Self {
            lines: LineSegmentsNode::new("grid", geometry, Rc::new(material), LineRole::Helper),
        };
        grid.set_visible(settings.enable);
        grid
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.lines
            .material
            .set_opacity(if visible { 1.0 } else { 0.0 });
    }

    pub fn is_visible(&self) -> bool {
        self.lines.material.opacity() > 0.0
    }

    pub fn lines(&self) -> &LineSegmentsNode {
        &self.lines
    }

    pub fn dispose(&mut self) -> DisposalReport {
        dispose(&mut self.lines)
    }
}

/// Positions and vertex colours of a square grid centred on the origin.
/// Lines through the centre use `color1`, the others `color2`.
fn grid_lines(settings: &GridSettings) -> (Vec<[f32; 3]>, Vec<[f32; 3]>) {
    let divisions = settings.divisions.max(1);
    let step = settings.size / divisions as f32;
    let half = settings.size / 2.0;
    let centre = divisions / 2;

    let mut positions = Vec::with_capacity((divisions as usize + 1) * 4);
    let mut colors = Vec::with_capacity(positions.capacity());
    for i in 0..=divisions {
        let k = -half + i as f32 * step;
        let color = if i == centre {
            settings.color1
        } else {
            settings.color2
        };
        let rgb = [color.r, color.g, color.b];
        positions.extend_from_slice(&[[-half, 0.0, k], [half, 0.0, k], [k, 0.0, -half], [k, 0.0, half]]);
        colors.extend_from_slice(&[rgb; 4]);
    }
    (positions, colors)
}

/// Holds the one attached model.
pub struct ModelHolder {
    root: ContainerNode,
}

impl Default for ModelHolder {
    fn default() -> Self {
        Self {
            root: ContainerNode::new("model holder"),
        }
    }
}

impl ModelHolder {
    pub fn asset(&self) -> Option<&dyn SceneNode> {
        self.root.get_children().first().map(|asset| asset.as_ref())
    }

    pub fn asset_mut(&mut self) -> Option<&mut (dyn SceneNode + 'static)> {
        self.root.get_children_mut().first_mut().map(|asset| asset.as_mut())
    }

    pub fn has_asset(&self) -> bool {
        !self.root.get_children().is_empty()
    }

    /// Replaces the attached asset. The previous one is disposed first.
    pub fn attach(&mut self, asset: Box<dyn SceneNode>) -> DisposalReport {
        let report = self.dispose_asset();
        self.root.add_child(asset);
        report
    }

    /// Disposes and detaches the attached asset, if any.
    pub fn dispose_asset(&mut self) -> DisposalReport {
        let mut report = DisposalReport::default();
        for mut asset in self.root.get_children_mut().drain(..) {
            report.absorb(dispose(asset.as_mut()));
        }
        report
    }

    pub fn root(&self) -> &dyn SceneNode {
        &self.root
    }
}

pub struct Scene {
    /// `None` renders a transparent background.
    pub background: Option<Color>,
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
    environment: Option<Texture>,
    environment_light: Color,
    pub shadow_map: bool,
    pub grid: Grid,
    pub model_holder: ModelHolder,
}

impl Scene {
    pub fn new(tracker: &Rc<ResourceTracker>, settings: &Settings) -> Self {
        let rendering = &settings.rendering;
        let lighting = &settings.lighting;
        Self {
            background: rendering.background_color,
            ambient: AmbientLight {
                color: rendering.ambient_color,
                intensity: rendering.ambient_intensity,
            },
            directional: DirectionalLight {
                position: lighting.position.into(),
                color: lighting.color,
                intensity: lighting.intensity,
                cast_shadow: lighting.cast_shadow,
                shadow_intensity: lighting.shadow_intensity,
            },
            environment: None,
            environment_light: Color::BLACK,
            shadow_map: rendering.shadow_map,
            grid: Grid::new(tracker, &settings.grid),
            model_holder: ModelHolder::default(),
        }
    }

    pub fn environment(&self) -> Option<&Texture> {
        self.environment.as_ref()
    }

    /// Ambient radiance contributed by the environment map, its mean colour.
    pub fn environment_light(&self) -> Color {
        self.environment_light
    }

    /// Replaces the environment texture, releasing the previous one.
    pub fn set_environment(&mut self, texture: Texture) -> DisposalReport {
        let mut report = DisposalReport::default();
        self.environment_light = texture.mean_color();
        if let Some(previous) = self.environment.replace(texture) {
            dispose_texture(&previous, &mut report);
        }
        report
    }

    /// Releases everything the scene owns.
    pub fn dispose(&mut self) -> DisposalReport {
        let mut report = self.model_holder.dispose_asset();
        report.absorb(self.grid.dispose());
        if let Some(environment) = self.environment.take() {
            dispose_texture(&environment, &mut report);
        }
        self.environment_light = Color::BLACK;
        report
    }
}
