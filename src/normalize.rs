//! Fitting a loaded model to the viewer's canonical size and origin.
//!
//! After normalization the model's bounding box diagonal is [`TARGET_DIAGONAL`],
//! it is centred over the world origin on X/Z and rests on the Y = 0 plane.

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::data_structures::{bounds::Aabb, scene_graph::SceneNode};

pub const TARGET_DIAGONAL: f32 = 5.0;

/// The scale factor and translation a normalization applied to the root.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub offset: Vector3<f32>,
}

impl Normalization {
    fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

/// World space bounds of all meshes below `root`, the root transform included.
///
/// Line segments (overlays, helpers) don't count towards the model's extent.
pub fn bounding_box(root: &dyn SceneNode) -> Aabb {
    let mut aabb = Aabb::empty();
    root.traverse(&Matrix4::identity(), &mut |node, world| {
        if let Some(mesh) = node.as_mesh() {
            aabb.union(&mesh.geometry.bounding_box().transformed(world));
        }
    });
    aabb
}

fn is_finite(aabb: &Aabb) -> bool {
    [aabb.min, aabb.max]
        .iter()
        .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
}

/// Scales and moves `root` so that the model fits the canonical box.
///
/// Degenerate models (no vertices, a single point, non-finite coordinates)
/// keep their scale.
pub fn normalize(root: &mut dyn SceneNode) -> Normalization {
    let aabb = bounding_box(root);
    if aabb.is_empty() || !is_finite(&aabb) {
        log::warn!("'{}' has no usable bounds, leaving it as is", root.name());
        return Normalization::identity();
    }

    let diagonal = aabb.diagonal();
    let scale = if diagonal > f32::EPSILON && diagonal.is_finite() {
        TARGET_DIAGONAL / diagonal
    } else {
        log::debug!("'{}' has a degenerate diagonal of {}", root.name(), diagonal);
        1.0
    };
    let mut transform = root.get_local_transform().clone();
    transform.scale *= scale;
    root.set_local_transform(transform);

    let aabb = bounding_box(root);
    let center = aabb.center();
    let offset = Vector3::new(-center.x, -aabb.min.y, -center.z);
    let mut transform = root.get_local_transform().clone();
    transform.position += offset;
    root.set_local_transform(transform);

    log::debug!(
        "normalized '{}': diagonal {} -> {}, offset {:?}",
        root.name(),
        diagonal,
        diagonal * scale,
        offset
    );
    Normalization { scale, offset }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use cgmath::{Deg, Quaternion, Rotation3};

    use super::*;
    use crate::data_structures::{
        color::Color,
        instance::Instance,
        geometry::{Geometry, cube_positions_and_indices},
        handle::ResourceTracker,
        material::{LineMaps, Material, MaterialKind, MaterialSet, StandardMaps},
        scene_graph::{ContainerNode, LineRole, LineSegmentsNode, MeshNode},
    };

    const EPS: f32 = 1e-4;

    fn material(tracker: &Rc<ResourceTracker>) -> Rc<Material> {
        Rc::new(Material::new(
            tracker,
            "mat",
            MaterialKind::Standard(StandardMaps::default()),
            Color::WHITE,
        ))
    }

    fn offset_cube(tracker: &Rc<ResourceTracker>, position: Vector3<f32>) -> MeshNode {
        let (positions, indices) = cube_positions_and_indices(0.5);
        let mut mesh = MeshNode::new(
            "cube",
            Geometry::new(tracker, "cube", positions, Some(indices)),
            MaterialSet::Single(material(tracker)),
        );
        mesh.set_local_transform(Instance {
            position,
            rotation: Quaternion::from_angle_y(Deg(30.0)),
            scale: Vector3::new(1.0, 3.0, 2.0),
        });
        mesh
    }

    fn assert_canonical(root: &dyn SceneNode) {
        let aabb = bounding_box(root);
        assert!((aabb.diagonal() - TARGET_DIAGONAL).abs() < EPS, "{:?}", aabb);
        assert!(aabb.center().x.abs() < EPS);
        assert!(aabb.center().z.abs() < EPS);
        assert!(aabb.min.y.abs() < EPS);
    }

    #[test]
    fn fits_model_into_canonical_box() {
        let tracker = ResourceTracker::new();
        let mut root = ContainerNode::new("model");
        root.add_child(Box::new(offset_cube(&tracker, Vector3::new(30.0, -12.0, 7.0))));
        root.add_child(Box::new(offset_cube(&tracker, Vector3::new(34.0, -10.0, 9.0))));
        root.set_local_transform(Instance::from(Vector3::new(1.0, 2.0, 3.0)));
        let mut root: Box<dyn SceneNode> = Box::new(root);

        let applied = normalize(root.as_mut());
        assert!(applied.scale < 1.0);
        assert_canonical(root.as_ref());
    }

    #[test]
    fn rotated_child_under_stretched_parent_is_measured_in_world_space() {
        let tracker = ResourceTracker::new();
        let (positions, indices) = cube_positions_and_indices(0.5);
        let mut child = MeshNode::new(
            "bar",
            Geometry::new(&tracker, "bar", positions, Some(indices)),
            MaterialSet::Single(material(&tracker)),
        );
        // a 4 x 1 x 1 bar lying along x, turned upright
        child.set_local_transform(Instance {
            rotation: Quaternion::from_angle_z(Deg(90.0)),
            scale: Vector3::new(4.0, 1.0, 1.0),
            ..Default::default()
        });
        let mut root = ContainerNode::new("stretched");
        root.set_local_transform(Instance {
            scale: Vector3::new(1.0, 3.0, 1.0),
            ..Default::default()
        });
        root.add_child(Box::new(child));

        let aabb = bounding_box(&root);
        let size = aabb.size();
        assert!((size.x - 1.0).abs() < EPS, "{:?}", size);
        assert!((size.y - 12.0).abs() < EPS, "{:?}", size);
        assert!((size.z - 1.0).abs() < EPS, "{:?}", size);

        normalize(&mut root);
        assert_canonical(&root);
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let tracker = ResourceTracker::new();
        let mut mesh = offset_cube(&tracker, Vector3::new(-4.0, 8.0, 0.5));
        normalize(&mut mesh);
        let once = mesh.get_local_transform().clone();

        let again = normalize(&mut mesh);
        assert!((again.scale - 1.0).abs() < EPS);
        let twice = mesh.get_local_transform();
        assert!((twice.position - once.position).x.abs() < EPS);
        assert!((twice.position - once.position).y.abs() < EPS);
        assert!((twice.position - once.position).z.abs() < EPS);
        assert_canonical(&mesh);
    }

    #[test]
    fn empty_model_keeps_identity() {
        let mut root = ContainerNode::new("empty");
        let applied = normalize(&mut root);
        assert_eq!(applied.scale, 1.0);
        assert_eq!(root.get_local_transform(), &Instance::default());
    }

    #[test]
    fn single_point_is_moved_but_not_scaled() {
        let tracker = ResourceTracker::new();
        let mut mesh = MeshNode::new(
            "point",
            Geometry::new(&tracker, "point", vec![[2.0, 3.0, 4.0]; 3], None),
            MaterialSet::Single(material(&tracker)),
        );
        let applied = normalize(&mut mesh);
        assert_eq!(applied.scale, 1.0);
        assert_eq!(applied.offset, Vector3::new(-2.0, -3.0, -4.0));
    }

    #[test]
    fn line_segments_do_not_count() {
        let tracker = ResourceTracker::new();
        let mut mesh = offset_cube(&tracker, Vector3::new(0.0, 0.0, 0.0));
        let huge = Geometry::new(&tracker, "huge", vec![[-500.0; 3], [500.0; 3]], None);
        let line_material = Rc::new(Material::new(
            &tracker,
            "edges",
            MaterialKind::LineBasic(LineMaps::default()),
            Color::WHITE,
        ));
        mesh.add_child(Box::new(LineSegmentsNode::new(
            "edges",
            huge,
            line_material,
            LineRole::Overlay,
        )));

        normalize(&mut mesh);
        assert_canonical(&mesh);
    }
}
