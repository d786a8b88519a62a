//! Viewer configuration.
//!
//! [`Settings`] is the effective configuration, always complete. Hosts hand in
//! [`ConfigPatch`]es where every field is optional; a patch is deep-merged over
//! the current settings: unspecified fields inherit, sections merge field by
//! field, values (numbers, colours, vectors) replace wholesale.
//!
//! Both types use the camelCase JSON layout of the host configuration:
//!
//! ```json
//! { "grid": { "enable": true }, "rendering": { "backgroundColor": null } }
//! ```

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::data_structures::color::Color;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for cgmath::Point3<f32> {
    fn from(v: Vec3) -> Self {
        cgmath::Point3::new(v.x, v.y, v.z)
    }
}

impl From<Vec3> for cgmath::Vector3<f32> {
    fn from(v: Vec3) -> Self {
        cgmath::Vector3::new(v.x, v.y, v.z)
    }
}

impl From<cgmath::Point3<f32>> for Vec3 {
    fn from(p: cgmath::Point3<f32>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

/// Applies a partial update in place.
pub trait Merge {
    type Patch;

    fn merge(&mut self, patch: &Self::Patch);
}

fn replace<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from a missing field (`None`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    pub fov: f32,
    pub position: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraPatch {
    pub fov: Option<f32>,
    pub position: Option<Vec3>,
}

impl Merge for CameraSettings {
    type Patch = CameraPatch;

    fn merge(&mut self, patch: &CameraPatch) {
        replace(&mut self.fov, &patch.fov);
        replace(&mut self.position, &patch.position);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsSettings {
    pub enable: bool,
    pub enable_zoom: bool,
    pub orbit_target: Vec3,
    pub rotate_speed: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlsPatch {
    pub enable: Option<bool>,
    pub enable_zoom: Option<bool>,
    pub orbit_target: Option<Vec3>,
    pub rotate_speed: Option<f32>,
    pub auto_rotate: Option<bool>,
    pub auto_rotate_speed: Option<f32>,
}

impl Merge for ControlsSettings {
    type Patch = ControlsPatch;

    fn merge(&mut self, patch: &ControlsPatch) {
        replace(&mut self.enable, &patch.enable);
        replace(&mut self.enable_zoom, &patch.enable_zoom);
        replace(&mut self.orbit_target, &patch.orbit_target);
        replace(&mut self.rotate_speed, &patch.rotate_speed);
        replace(&mut self.auto_rotate, &patch.auto_rotate);
        replace(&mut self.auto_rotate_speed, &patch.auto_rotate_speed);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingSettings {
    pub shadow_map: bool,
    /// `None` renders a transparent background.
    pub background_color: Option<Color>,
    pub ambient_color: Color,
    pub ambient_intensity: f32,
    /// Radiance HDR environment map. Its mean radiance is added to the ambient light;
    /// without one only the flat ambient colour lights the scene.
    pub environment_path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingPatch {
    pub shadow_map: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub background_color: Option<Option<Color>>,
    pub ambient_color: Option<Color>,
    pub ambient_intensity: Option<f32>,
    pub environment_path: Option<String>,
}

impl Merge for RenderingSettings {
    type Patch = RenderingPatch;

    fn merge(&mut self, patch: &RenderingPatch) {
        replace(&mut self.shadow_map, &patch.shadow_map);
        replace(&mut self.background_color, &patch.background_color);
        replace(&mut self.ambient_color, &patch.ambient_color);
        replace(&mut self.ambient_intensity, &patch.ambient_intensity);
        if patch.environment_path.is_some() {
            self.environment_path = patch.environment_path.clone();
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingSettings {
    pub position: Vec3,
    pub intensity: f32,
    pub color: Color,
    pub shadow_intensity: f32,
    pub cast_shadow: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingPatch {
    pub position: Option<Vec3>,
    pub intensity: Option<f32>,
    pub color: Option<Color>,
    pub shadow_intensity: Option<f32>,
    pub cast_shadow: Option<bool>,
}

impl Merge for LightingSettings {
    type Patch = LightingPatch;

    fn merge(&mut self, patch: &LightingPatch) {
        replace(&mut self.position, &patch.position);
        replace(&mut self.intensity, &patch.intensity);
        replace(&mut self.color, &patch.color);
        replace(&mut self.shadow_intensity, &patch.shadow_intensity);
        replace(&mut self.cast_shadow, &patch.cast_shadow);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSettings {
    pub size: f32,
    pub divisions: u32,
    /// Colour of the centre lines.
    pub color1: Color,
    pub color2: Color,
    pub enable: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPatch {
    pub size: Option<f32>,
    pub divisions: Option<u32>,
    pub color1: Option<Color>,
    pub color2: Option<Color>,
    pub enable: Option<bool>,
}

impl Merge for GridSettings {
    type Patch = GridPatch;

    fn merge(&mut self, patch: &GridPatch) {
        replace(&mut self.size, &patch.size);
        replace(&mut self.divisions, &patch.divisions);
        replace(&mut self.color1, &patch.color1);
        replace(&mut self.color2, &patch.color2);
        replace(&mut self.enable, &patch.enable);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSettings {
    pub color: Color,
    pub enable: bool,
    /// Kept for configuration compatibility; wgpu draws one pixel wide lines.
    pub linewidth: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgePatch {
    pub color: Option<Color>,
    pub enable: Option<bool>,
    pub linewidth: Option<f32>,
}

impl Merge for EdgeSettings {
    type Patch = EdgePatch;

    fn merge(&mut self, patch: &EdgePatch) {
        replace(&mut self.color, &patch.color);
        replace(&mut self.enable, &patch.enable);
        replace(&mut self.linewidth, &patch.linewidth);
    }
}

/// The effective, complete viewer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub camera: CameraSettings,
    pub controls: ControlsSettings,
    pub rendering: RenderingSettings,
    pub lighting: LightingSettings,
    pub grid: GridSettings,
    pub edges: EdgeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let warm_white = Color::new(253.0 / 255.0, 251.0 / 255.0, 211.0 / 255.0);
        Self {
            camera: CameraSettings {
                fov: 75.0,
                position: Vec3::new(-6.0, 7.0, 4.0),
            },
            controls: ControlsSettings {
                enable: true,
                enable_zoom: true,
                orbit_target: Vec3::new(0.0, 0.0, 0.0),
                rotate_speed: 0.5,
                auto_rotate: false,
                auto_rotate_speed: 1.0,
            },
            rendering: RenderingSettings {
                shadow_map: false,
                background_color: Some(Color::BLACK),
                ambient_color: warm_white,
                ambient_intensity: 0.5,
                environment_path: None,
            },
            lighting: LightingSettings {
                position: Vec3::new(5.0, 10.0, 7.5),
                intensity: 1.0,
                color: warm_white,
                shadow_intensity: 1.0,
                cast_shadow: false,
            },
            grid: GridSettings {
                size: 10.0,
                divisions: 5,
                color1: Color::WHITE,
                color2: Color::WHITE,
                enable: false,
            },
            edges: EdgeSettings {
                color: Color::WHITE,
                enable: false,
                linewidth: 1.0,
            },
        }
    }
}

impl Merge for Settings {
    type Patch = ConfigPatch;

    fn merge(&mut self, patch: &ConfigPatch) {
        if let Some(camera) = &patch.camera {
            self.camera.merge(camera);
        }
        if let Some(controls) = &patch.controls {
            self.controls.merge(controls);
        }
        if let Some(rendering) = &patch.rendering {
            self.rendering.merge(rendering);
        }
        if let Some(lighting) = &patch.lighting {
            self.lighting.merge(lighting);
        }
        if let Some(grid) = &patch.grid {
            self.grid.merge(grid);
        }
        if let Some(edges) = &patch.edges {
            self.edges.merge(edges);
        }
    }
}

impl Settings {
    /// A new value with `patch` merged over `self`.
    pub fn merged(&self, patch: &ConfigPatch) -> Settings {
        let mut settings = self.clone();
        settings.merge(patch);
        settings
    }

    /// Defaults with `patches` merged on top, in order.
    pub fn resolve<'a>(patches: impl IntoIterator<Item = &'a ConfigPatch>) -> Settings {
        patches
            .into_iter()
            .fold(Settings::default(), |settings, patch| settings.merged(patch))
    }
}

/// A partial configuration update as supplied by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls: Option<ControlsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering: Option<RenderingPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<LightingPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<EdgePatch>,
}

impl ConfigPatch {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid viewer configuration")
    }

    pub fn is_empty(&self) -> bool {
        self == &ConfigPatch::default()
    }
}
