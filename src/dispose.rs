//! Releasing every GPU resource a scene subtree owns.
//!
//! Disposal walks the subtree once. Meshes release their material(s), the
//! textures sitting in the material slots and their geometry; overlay children
//! are detached from their mesh and released with it. Releases are best-effort:
//! a failing handle is logged and counted, the walk always completes.

use std::fmt;

use crate::data_structures::{
    handle::GpuHandle,
    material::{
        DiffuseMaps, LineMaps, Material, MaterialKind, MaterialSet, PhongMaps, PhysicalMaps,
        StandardMaps, TextureRef,
    },
    scene_graph::{LineSegmentsNode, SceneNode},
    texture::Texture,
};

/// What a disposal pass released. Shared resources are only counted once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposalReport {
    pub geometries: usize,
    pub materials: usize,
    pub textures: usize,
    pub overlays: usize,
    pub warnings: usize,
}

impl DisposalReport {
    pub fn released(&self) -> usize {
        self.geometries + self.materials + self.textures
    }

    pub fn is_empty(&self) -> bool {
        self.released() == 0 && self.overlays == 0
    }

    pub fn absorb(&mut self, other: DisposalReport) {
        self.geometries += other.geometries;
        self.materials += other.materials;
        self.textures += other.textures;
        self.overlays += other.overlays;
        self.warnings += other.warnings;
    }
}

impl fmt::Display for DisposalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} geometries, {} materials, {} textures, {} overlays ({} warnings)",
            self.geometries, self.materials, self.textures, self.overlays, self.warnings
        )
    }
}

/// Releases everything reachable from `root`, including `root` itself.
pub fn dispose(root: &mut dyn SceneNode) -> DisposalReport {
    let mut report = DisposalReport::default();
    root.traverse_mut(&mut |node| {
        if let Some(mesh) = node.as_mesh_mut() {
            dispose_materials(&mesh.materials, &mut report);
            if release(mesh.geometry.handle(), &mut report) {
                report.geometries += 1;
            }
            for mut overlay in mesh.take_overlays() {
                if let Some(lines) = overlay.as_line_segments_mut() {
                    dispose_line_segments(lines, &mut report);
                    report.overlays += 1;
                }
            }
        } else if let Some(lines) = node.as_line_segments_mut() {
            dispose_line_segments(lines, &mut report);
        }
    });
    log::debug!("disposed '{}': {}", root.name(), report);
    report
}

pub fn dispose_texture(texture: &Texture, report: &mut DisposalReport) {
    if release(texture.handle(), report) {
        report.textures += 1;
    }
}

fn dispose_line_segments(lines: &LineSegmentsNode, report: &mut DisposalReport) {
    dispose_material(&lines.material, report);
    if release(lines.geometry.handle(), report) {
        report.geometries += 1;
    }
}

fn dispose_materials(materials: &MaterialSet, report: &mut DisposalReport) {
    for material in materials.iter() {
        dispose_material(material, report);
    }
}

fn dispose_material(material: &Material, report: &mut DisposalReport) {
    match &material.kind {
        MaterialKind::Standard(maps) => dispose_standard_maps(maps, report),
        MaterialKind::Physical(PhysicalMaps {
            standard,
            clearcoat,
            clearcoat_roughness,
        }) => {
            dispose_standard_maps(standard, report);
            dispose_slot(clearcoat, report);
            dispose_slot(clearcoat_roughness, report);
        }
        MaterialKind::Basic(DiffuseMaps {
            albedo,
            environment,
        })
        | MaterialKind::Lambert(DiffuseMaps {
            albedo,
            environment,
        }) => {
            dispose_slot(albedo, report);
            dispose_slot(environment, report);
        }
        MaterialKind::Phong(PhongMaps {
            albedo,
            specular,
            bump,
            normal,
        }) => {
            dispose_slot(albedo, report);
            dispose_slot(specular, report);
            dispose_slot(bump, report);
            dispose_slot(normal, report);
        }
        MaterialKind::LineBasic(LineMaps { albedo }) => dispose_slot(albedo, report),
        MaterialKind::Other { type_name } => {
            if !material.handle().is_released() {
                log::warn!(
                    "unknown material type '{}' on '{}', releasing the material only",
                    type_name,
                    material.name
                );
                report.warnings += 1;
            }
        }
    }
    if release(material.handle(), report) {
        report.materials += 1;
    }
}

fn dispose_standard_maps(maps: &StandardMaps, report: &mut DisposalReport) {
    dispose_slot(&maps.albedo, report);
    dispose_slot(&maps.environment, report);
    dispose_slot(&maps.roughness, report);
    dispose_slot(&maps.metalness, report);
}

fn dispose_slot(slot: &TextureRef, report: &mut DisposalReport) {
    if let Some(texture) = slot {
        dispose_texture(texture, report);
    }
}

/// `true` if this call released the handle.
fn release(handle: &GpuHandle, report: &mut DisposalReport) -> bool {
    match handle.release() {
        Ok(released) => released,
        Err(e) => {
            log::warn!("failed to release {:?} '{}': {:#}", handle.kind(), handle.label(), e);
            report.warnings += 1;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        data_structures::{
            color::Color,
            geometry::{Geometry, cube_positions_and_indices},
            handle::ResourceTracker,
            material::TextureSlot,
            scene_graph::{ContainerNode, LineRole, MeshNode},
        },
        overlay,
    };

    fn cube_mesh(tracker: &Rc<ResourceTracker>, name: &str, materials: MaterialSet) -> MeshNode {
        let (positions, indices) = cube_positions_and_indices(0.5);
        MeshNode::new(name, Geometry::new(tracker, name, positions, Some(indices)), materials)
    }

    fn material(tracker: &Rc<ResourceTracker>, kind: MaterialKind) -> Rc<Material> {
        Rc::new(Material::new(tracker, "mat", kind, Color::WHITE))
    }

    #[test]
    fn releases_every_resource_exactly_once() {
        let tracker = ResourceTracker::new();
        let shared = Rc::new(Texture::from_pixels(&tracker, "shared", image::RgbaImage::new(1, 1)));

        let mut physical = Material::new(
            &tracker,
            "paint",
            MaterialKind::Physical(PhysicalMaps::default()),
            Color::WHITE,
        );
        physical.set_texture(TextureSlot::Albedo, shared.clone()).unwrap();
        physical.set_texture(TextureSlot::ClearcoatRoughness, shared.clone()).unwrap();
        let mut phong = Material::new(
            &tracker,
            "plastic",
            MaterialKind::Phong(PhongMaps::default()),
            Color::WHITE,
        );
        phong.set_texture(TextureSlot::Bump, shared.clone()).unwrap();

        let mut root = ContainerNode::new("asset");
        root.add_child(Box::new(cube_mesh(
            &tracker,
            "a",
            MaterialSet::Multi(vec![Rc::new(physical), Rc::new(phong)]),
        )));
        root.add_child(Box::new(cube_mesh(
            &tracker,
            "b",
            MaterialSet::Single(material(&tracker, MaterialKind::Lambert(DiffuseMaps::default()))),
        )));
        let mut root: Box<dyn SceneNode> = Box::new(root);
        overlay::build_overlays(root.as_mut(), &tracker, Color::WHITE);

        let report = dispose(root.as_mut());
        assert_eq!(report.textures, 1);
        assert_eq!(report.materials, 4); // three mesh materials plus the shared edge material
        assert_eq!(report.geometries, 4); // two meshes, two overlays
        assert_eq!(report.overlays, 2);
        assert_eq!(report.warnings, 0);
        assert_eq!(tracker.live_count(), 0);
        assert_eq!(tracker.release_count(shared.id()), 1);
    }

    #[test]
    fn overlays_are_detached_not_orphaned() {
        let tracker = ResourceTracker::new();
        let mut mesh: Box<dyn SceneNode> = Box::new(cube_mesh(
            &tracker,
            "cube",
            MaterialSet::Single(material(&tracker, MaterialKind::Standard(StandardMaps::default()))),
        ));
        overlay::build_overlays(mesh.as_mut(), &tracker, Color::WHITE);
        assert_eq!(mesh.get_children().len(), 1);

        dispose(mesh.as_mut());
        assert!(mesh.get_children().is_empty());
    }

    #[test]
    fn unknown_material_is_released_with_a_warning() {
        let tracker = ResourceTracker::new();
        let exotic = material(
            &tracker,
            MaterialKind::Other {
                type_name: "toon".to_string(),
            },
        );
        let mut mesh = cube_mesh(&tracker, "cube", MaterialSet::Single(exotic.clone()));

        let report = dispose(&mut mesh);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.materials, 1);
        assert!(exotic.handle().is_released());
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let tracker = ResourceTracker::new();
        let mut mesh = cube_mesh(
            &tracker,
            "cube",
            MaterialSet::Single(material(&tracker, MaterialKind::Basic(DiffuseMaps::default()))),
        );
        assert!(!dispose(&mut mesh).is_empty());
        assert!(dispose(&mut mesh).is_empty());
    }

    #[test]
    fn failures_do_not_stop_the_walk() {
        let tracker = ResourceTracker::new();
        let mut root = ContainerNode::new("asset");
        root.add_child(Box::new(cube_mesh(
            &tracker,
            "a",
            MaterialSet::Single(material(&tracker, MaterialKind::Standard(StandardMaps::default()))),
        )));
        root.add_child(Box::new(cube_mesh(
            &tracker,
            "b",
            MaterialSet::Single(material(&tracker, MaterialKind::Standard(StandardMaps::default()))),
        )));
        drop(tracker);

        let mut root: Box<dyn SceneNode> = Box::new(root);
        let report = dispose(root.as_mut());
        assert_eq!(report.warnings, 4);
        for child in root.get_children() {
            let mesh = child.as_mesh().unwrap();
            assert!(mesh.geometry.handle().is_released());
        }
    }

    #[test]
    fn standalone_line_segments_are_released() {
        let tracker = ResourceTracker::new();
        let mut grid = LineSegmentsNode::new(
            "grid",
            Geometry::new(&tracker, "grid", vec![[0.0; 3]; 4], None),
            material(&tracker, MaterialKind::LineBasic(LineMaps::default())),
            LineRole::Helper,
        );
        let report = dispose(&mut grid);
        assert_eq!((report.geometries, report.materials), (1, 1));
        assert_eq!(tracker.live_count(), 0);
    }
}
