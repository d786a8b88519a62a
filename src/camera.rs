//! Perspective camera and its GPU uniform.

use cgmath::{Deg, EuclideanSpace, Matrix4, Point3, Vector3, perspective};

use crate::data_structures::scene_graph::Layers;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 1000.0;

#[derive(Clone, Debug)]
pub struct PerspectiveCamera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    pub fovy: Deg<f32>,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
    /// Render layers this camera sees. Layer 0 holds the scene itself.
    pub layers: Layers,
}

impl PerspectiveCamera {
    pub fn new(position: Point3<f32>, fovy: Deg<f32>, width: u32, height: u32) -> Self {
        let mut camera = Self {
            position,
            target: Point3::origin(),
            up: Vector3::unit_y(),
            fovy,
            aspect: 1.0,
            znear: Z_NEAR,
            zfar: Z_FAR,
            layers: Layers::default(),
        };
        camera.set_aspect(width, height);
        camera
    }

    /// Zero sized viewports keep the previous aspect ratio.
    pub fn set_aspect(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.aspect = width as f32 / height as f32;
        true
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }
}

// We need this for Rust to store our data correctly for the shaders
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &PerspectiveCamera) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = camera.view_projection().into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_viewport_keeps_aspect() {
        let mut camera = PerspectiveCamera::new(Point3::new(-6.0, 7.0, 4.0), Deg(75.0), 800, 400);
        assert_eq!(camera.aspect, 2.0);
        assert!(!camera.set_aspect(0, 300));
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn view_projection_is_finite() {
        let camera = PerspectiveCamera::new(Point3::new(0.0, 1.0, 5.0), Deg(60.0), 1280, 720);
        let vp: [[f32; 4]; 4] = camera.view_projection().into();
        assert!(vp.iter().flatten().all(|v| v.is_finite()));
    }
}
