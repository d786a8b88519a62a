//! Wireframe overlays for loaded models.
//!
//! Every mesh gets one line segment child holding the unique edges of its
//! geometry. Overlays live on [`OVERLAY_LAYER`] only, so showing or hiding them
//! is a single bit flip on the camera's layer mask.

use std::rc::Rc;

use crate::{
    camera::PerspectiveCamera,
    data_structures::{
        color::Color,
        geometry::Geometry,
        handle::ResourceTracker,
        material::{LineMaps, Material, MaterialKind},
        scene_graph::{LineRole, LineSegmentsNode, SceneNode},
    },
};

pub const OVERLAY_LAYER: u32 = 1;

/// Attaches an overlay to every mesh below `root` that has none yet.
///
/// All overlays share one line material of `color`. Returns how many were built.
pub fn build_overlays(root: &mut dyn SceneNode, tracker: &Rc<ResourceTracker>, color: Color) -> usize {
    let mut material: Option<Rc<Material>> = None;
    let mut built = 0;
    root.traverse_mut(&mut |node| {
        let Some(mesh) = node.as_mesh_mut() else {
            return;
        };
        if mesh.has_overlay() {
            return;
        }
        let positions = mesh.geometry.wireframe_positions();
        if positions.is_empty() {
            return;
        }
        let material = material
            .get_or_insert_with(|| {
                Rc::new(Material::new(
                    tracker,
                    "edges",
                    MaterialKind::LineBasic(LineMaps::default()),
                    color,
                ))
            })
            .clone();
        let label = format!("{} edges", mesh.name);
        let geometry = Geometry::new(tracker, &label, positions, None);
        let overlay = LineSegmentsNode::new(&label, geometry, material, LineRole::Overlay)
            .on_layer(OVERLAY_LAYER);
        mesh.add_child(Box::new(overlay));
        built += 1;
    });
    log::debug!("built {} wireframe overlays for '{}'", built, root.name());
    built
}

pub fn apply_overlay_visibility(camera: &mut PerspectiveCamera, enabled: bool) {
    camera.layers.toggle(OVERLAY_LAYER, enabled);
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Point3};

    use super::*;
    use crate::data_structures::{
        geometry::cube_positions_and_indices,
        material::{MaterialSet, StandardMaps},
        scene_graph::{ContainerNode, MeshNode},
    };

    fn cube(tracker: &Rc<ResourceTracker>, name: &str) -> MeshNode {
        let (positions, indices) = cube_positions_and_indices(1.0);
        let material = Rc::new(Material::new(
            tracker,
            name,
            MaterialKind::Standard(StandardMaps::default()),
            Color::WHITE,
        ));
        MeshNode::new(
            name,
            Geometry::new(tracker, name, positions, Some(indices)),
            MaterialSet::Single(material),
        )
    }

    #[test]
    fn overlays_share_one_material_on_layer_one() {
        let tracker = ResourceTracker::new();
        let mut root = ContainerNode::new("model");
        root.add_child(Box::new(cube(&tracker, "a")));
        root.add_child(Box::new(cube(&tracker, "b")));
        let mut root: Box<dyn SceneNode> = Box::new(root);

        assert_eq!(build_overlays(root.as_mut(), &tracker, Color::BLACK), 2);

        let overlays: Vec<&LineSegmentsNode> = root
            .get_children()
            .iter()
            .filter_map(|child| child.as_mesh())
            .flat_map(|mesh| mesh.overlays())
            .collect();
        assert_eq!(overlays.len(), 2);
        assert!(Rc::ptr_eq(&overlays[0].material, &overlays[1].material));
        assert_eq!(overlays[0].material.color, Color::BLACK);
        assert!(overlays.iter().all(|o| o.layers().is_enabled(OVERLAY_LAYER)));
        assert!(overlays.iter().all(|o| !o.layers().is_enabled(0)));
    }

    #[test]
    fn rebuilding_does_not_duplicate() {
        let tracker = ResourceTracker::new();
        let mut mesh = cube(&tracker, "cube");
        assert_eq!(build_overlays(&mut mesh, &tracker, Color::WHITE), 1);
        assert_eq!(build_overlays(&mut mesh, &tracker, Color::WHITE), 0);
        assert_eq!(mesh.overlays().count(), 1);
    }

    #[test]
    fn visibility_flips_the_camera_layer() {
        let mut camera = PerspectiveCamera::new(Point3::new(0.0, 0.0, 5.0), Deg(75.0), 4, 3);
        apply_overlay_visibility(&mut camera, true);
        assert!(camera.layers.is_enabled(OVERLAY_LAYER));
        assert!(camera.layers.is_enabled(0));
        apply_overlay_visibility(&mut camera, false);
        assert!(!camera.layers.is_enabled(OVERLAY_LAYER));
    }
}
