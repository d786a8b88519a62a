//! Orbit-style camera navigation.
//!
//! The camera circles [`OrbitControls::target`] on a sphere. Dragging with the
//! left mouse button rotates, the wheel zooms, and auto-rotation spins the
//! camera around the Y axis. Motion is damped: input accumulates into a delta
//! that [`OrbitControls::update`] applies a fraction of every frame.

use std::f32::consts::{PI, TAU};

use cgmath::{InnerSpace, Point3, Vector3};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::{camera::PerspectiveCamera, config::ControlsSettings};

const DAMPING_FACTOR: f32 = 0.25;
const ZOOM_STEP: f32 = 0.95;
const MIN_POLAR: f32 = 1e-4;
const MIN_DISTANCE: f32 = 0.01;
const MAX_DISTANCE: f32 = 900.0;

#[derive(Clone, Debug)]
pub struct OrbitControls {
    pub enable_rotate: bool,
    pub enable_zoom: bool,
    pub enable_damping: bool,
    pub rotate_speed: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    pub target: Point3<f32>,
    theta_delta: f32,
    phi_delta: f32,
    zoom: f32,
    dragging: bool,
    cursor: Option<(f64, f64)>,
    viewport_height: f32,
    gesture_ended: bool,
}

impl OrbitControls {
    pub fn new(settings: &ControlsSettings, viewport_height: u32) -> Self {
        Self {
            enable_rotate: settings.enable,
            enable_zoom: settings.enable_zoom,
            enable_damping: true,
            rotate_speed: settings.rotate_speed,
            auto_rotate: settings.auto_rotate,
            auto_rotate_speed: settings.auto_rotate_speed,
            target: settings.orbit_target.into(),
            theta_delta: 0.0,
            phi_delta: 0.0,
            zoom: 1.0,
            dragging: false,
            cursor: None,
            viewport_height: viewport_height.max(1) as f32,
            gesture_ended: false,
        }
    }

    pub fn set_auto_rotate(&mut self, enabled: bool, speed: f32) {
        self.auto_rotate = enabled;
        self.auto_rotate_speed = speed;
    }

    pub fn resize(&mut self, viewport_height: u32) {
        if viewport_height > 0 {
            self.viewport_height = viewport_height as f32;
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Returns `true` if the event was consumed.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => self.begin_drag(),
                ElementState::Released => self.end_drag(),
            },
            WindowEvent::CursorMoved { position, .. } => self.drag_to(position.x, position.y),
            WindowEvent::CursorLeft { .. } => self.end_drag(),
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 100.0,
                };
                self.dolly(steps)
            }
            _ => false,
        }
    }

    pub fn begin_drag(&mut self) -> bool {
        if !self.enable_rotate {
            return false;
        }
        self.dragging = true;
        true
    }

    pub fn drag_to(&mut self, x: f64, y: f64) -> bool {
        let previous = self.cursor.replace((x, y));
        if !self.dragging {
            return false;
        }
        if let Some((px, py)) = previous {
            let scale = TAU * self.rotate_speed / self.viewport_height;
            self.rotate((x - px) as f32 * scale, (y - py) as f32 * scale);
        }
        true
    }

    pub fn end_drag(&mut self) -> bool {
        if !self.dragging {
            return false;
        }
        self.dragging = false;
        self.gesture_ended = true;
        true
    }

    /// Positive `steps` move the camera towards the target.
    pub fn dolly(&mut self, steps: f32) -> bool {
        if !self.enable_zoom || steps == 0.0 {
            return false;
        }
        self.zoom *= ZOOM_STEP.powf(steps);
        self.gesture_ended = true;
        true
    }

    /// Queues a rotation: `left` around the Y axis, `up` towards the pole.
    pub fn rotate(&mut self, left: f32, up: f32) {
        self.theta_delta -= left;
        self.phi_delta -= up;
    }

    /// Whether a gesture finished since the last call.
    pub fn take_gesture_end(&mut self) -> bool {
        std::mem::take(&mut self.gesture_ended)
    }

    fn auto_rotation_angle(&self, dt: f32) -> f32 {
        TAU / 60.0 * self.auto_rotate_speed * dt
    }

    /// Moves `camera` by the pending input. Returns `true` if the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera, dt: f32) -> bool {
        let offset = camera.position - self.target;
        let mut radius = offset.magnitude();
        let (mut theta, mut phi) = if radius > f32::EPSILON {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI / 2.0)
        };

        if self.auto_rotate && !self.dragging {
            theta -= self.auto_rotation_angle(dt);
        }
        let factor = if self.enable_damping { DAMPING_FACTOR } else { 1.0 };
        theta += self.theta_delta * factor;
        phi = (phi + self.phi_delta * factor).clamp(MIN_POLAR, PI - MIN_POLAR);
        radius = (radius * self.zoom).clamp(MIN_DISTANCE, MAX_DISTANCE);

        let new_offset = Vector3::new(
            radius * phi.sin() * theta.sin(),
            radius * phi.cos(),
            radius * phi.sin() * theta.cos(),
        );
        let moved = (new_offset - offset).magnitude2() > 1e-12 || camera.target != self.target;
        camera.position = self.target + new_offset;
        camera.target = self.target;

        if self.enable_damping {
            self.theta_delta *= 1.0 - DAMPING_FACTOR;
            self.phi_delta *= 1.0 - DAMPING_FACTOR;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
        }
        self.zoom = 1.0;
        moved
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, MetricSpace};

    use super::*;
    use crate::config::Settings;

    fn setup() -> (OrbitControls, PerspectiveCamera) {
        let settings = Settings::default();
        let camera = PerspectiveCamera::new(
            settings.camera.position.into(),
            Deg(settings.camera.fov),
            800,
            600,
        );
        (OrbitControls::new(&settings.controls, 600), camera)
    }

    #[test]
    fn idle_controls_keep_the_camera() {
        let (mut controls, mut camera) = setup();
        let before = camera.position;
        controls.update(&mut camera, 1.0 / 60.0);
        assert!(camera.position.distance(before) < 1e-4);
    }

    #[test]
    fn auto_rotate_orbits_at_constant_distance() {
        let (mut controls, mut camera) = setup();
        controls.set_auto_rotate(true, 2.0);
        let radius = camera.position.distance(controls.target);
        let height = camera.position.y;
        let before = camera.position;

        assert!(controls.update(&mut camera, 0.5));
        assert!((camera.position.distance(controls.target) - radius).abs() < 1e-3);
        assert!((camera.position.y - height).abs() < 1e-3);
        assert!(camera.position.distance(before) > 0.1);
    }

    #[test]
    fn drag_release_ends_the_gesture() {
        let (mut controls, mut camera) = setup();
        assert!(controls.begin_drag());
        controls.drag_to(100.0, 100.0);
        controls.drag_to(160.0, 100.0);
        assert!(!controls.take_gesture_end());
        assert!(controls.end_drag());
        assert!(controls.take_gesture_end());
        assert!(!controls.take_gesture_end());
        assert!(controls.update(&mut camera, 1.0 / 60.0));
    }

    #[test]
    fn disabled_rotation_ignores_drags() {
        let (mut controls, _) = setup();
        controls.enable_rotate = false;
        assert!(!controls.begin_drag());
        assert!(!controls.drag_to(10.0, 10.0));
        assert!(!controls.end_drag());
    }

    #[test]
    fn wheel_zooms_towards_target() {
        let (mut controls, mut camera) = setup();
        let radius = camera.position.distance(controls.target);
        assert!(controls.dolly(3.0));
        controls.update(&mut camera, 1.0 / 60.0);
        assert!(camera.position.distance(controls.target) < radius);

        controls.enable_zoom = false;
        assert!(!controls.dolly(1.0));
    }
}
