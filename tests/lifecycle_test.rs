mod common;

use std::collections::HashSet;

use cgmath::{Matrix4, SquareMatrix};
use common::test_utils::*;
use flow_viewer::{
    ConfigPatch, ViewerEvent,
    data_structures::handle::{ResourceId, ResourceKind},
    normalize::{TARGET_DIAGONAL, bounding_box},
};

fn mesh_geometry_ids(viewer: &flow_viewer::ViewerSession<flow_viewer::HeadlessBackend>) -> Vec<ResourceId> {
    let mut ids = Vec::new();
    if let Some(asset) = viewer.active_asset() {
        asset.traverse(&Matrix4::identity(), &mut |node, _| {
            if let Some(mesh) = node.as_mesh() {
                ids.push(mesh.geometry.id());
            }
        });
    }
    ids
}

#[test]
fn loading_a_cube_reports_its_triangles() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path(), "cube.gltf", 1.0);
    let mut viewer = headless_session(&ConfigPatch::default());

    let events = load_and_poll(&mut viewer, &cube);

    assert_eq!(triangle_count(&events), Some(12));
    assert_eq!(progress(&events), vec![100]);
    assert!(matches!(events.last(), Some(ViewerEvent::Load { .. })));
}

#[test]
fn loaded_model_is_fitted_to_the_canonical_box() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path(), "large.gltf", 40.0);
    let mut viewer = headless_session(&ConfigPatch::default());
    load_and_poll(&mut viewer, &cube);

    let bounds = bounding_box(viewer.active_asset().unwrap());
    assert!((bounds.diagonal() - TARGET_DIAGONAL).abs() < 1e-3);
    assert!(bounds.min.y.abs() < 1e-4);
    let center = bounds.center();
    assert!(center.x.abs() < 1e-4);
    assert!(center.z.abs() < 1e-4);
}

#[test]
fn replacing_a_model_releases_the_previous_one_once() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_cube(dir.path(), "first.gltf", 1.0);
    let second = write_cube(dir.path(), "second.gltf", 2.0);
    let mut viewer = headless_session(&ConfigPatch::default());

    load_and_poll(&mut viewer, &first);
    let old = mesh_geometry_ids(&viewer);
    assert_eq!(old.len(), 1);

    let events = load_and_poll(&mut viewer, &second);
    assert_eq!(triangle_count(&events), Some(12));

    let tracker = viewer.tracker();
    for id in &old {
        assert!(!tracker.is_live(*id));
        assert_eq!(tracker.release_count(*id), 1);
        assert!(viewer.backend().released.contains(id));
    }
    assert_ne!(mesh_geometry_ids(&viewer), old);
}

#[test]
fn only_the_latest_request_is_installed() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_cube(dir.path(), "first.gltf", 1.0);
    let second = write_cube(dir.path(), "second.gltf", 1.0);
    let mut viewer = headless_session(&ConfigPatch::default());

    let a = viewer.load_model(&first).unwrap();
    let b = viewer.load_model(&second).unwrap();
    assert!(b > a);
    viewer.poll_loads();

    let events = viewer.drain_events();
    let loads = events
        .iter()
        .filter(|e| matches!(e, ViewerEvent::Load { .. }))
        .count();
    assert_eq!(loads, 1);
    assert_eq!(viewer.latest_ticket(), Some(b));
    // The stale model was never instantiated, so nothing had to be released.
    viewer.draw().unwrap();
    assert!(viewer.backend().released.is_empty());
}

#[test]
fn failed_load_keeps_the_current_model() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path(), "cube.gltf", 1.0);
    let mut viewer = headless_session(&ConfigPatch::default());
    load_and_poll(&mut viewer, &cube);
    let ids = mesh_geometry_ids(&viewer);

    let missing = dir.path().join("missing.gltf");
    let events = load_and_poll(&mut viewer, missing.to_str().unwrap());

    assert_eq!(triangle_count(&events), None);
    assert_eq!(mesh_geometry_ids(&viewer), ids);
    assert!(viewer.tracker().is_live(ids[0]));
}

#[test]
fn stray_index_fails_the_load_and_keeps_the_current_model() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path(), "cube.gltf", 1.0);
    let stray = write_cube_with_stray_index(dir.path());
    let mut viewer = headless_session(&ConfigPatch::default());
    load_and_poll(&mut viewer, &cube);
    let ids = mesh_geometry_ids(&viewer);

    let events = load_and_poll(&mut viewer, &stray);

    assert_eq!(triangle_count(&events), None);
    assert_eq!(mesh_geometry_ids(&viewer), ids);
    viewer.draw().unwrap();
    assert!(viewer.backend().released.is_empty());
}

#[test]
fn progress_counts_external_resources() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_textured_cube(dir.path());
    let mut viewer = headless_session(&ConfigPatch::default());

    let events = load_and_poll(&mut viewer, &model);

    assert_eq!(progress(&events), vec![33, 67, 100]);
    assert_eq!(triangle_count(&events), Some(24));
}

#[test]
fn shared_texture_is_released_once() {
    let dir = tempfile::tempdir().unwrap();
    let model = write_textured_cube(dir.path());
    let mut viewer = headless_session(&ConfigPatch::default());
    load_and_poll(&mut viewer, &model);

    assert_eq!(viewer.tracker().live_of(ResourceKind::Texture), 1);

    let report = viewer.teardown();
    assert_eq!(report.textures, 1);
    assert_eq!(viewer.tracker().live_count(), 0);

    let released = &viewer.backend().released;
    let unique: HashSet<_> = released.iter().collect();
    assert_eq!(unique.len(), released.len());
}

#[test]
fn toggling_edges_does_not_rebuild_the_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let cube = write_cube(dir.path(), "cube.gltf", 1.0);
    let patch = ConfigPatch::from_json(r#"{ "edges": { "enable": true } }"#).unwrap();
    let mut viewer = headless_session(&patch);
    load_and_poll(&mut viewer, &cube);

    viewer.draw().unwrap();
    assert_eq!(viewer.backend().last_frame().unwrap().lines, 1);
    let live = viewer.tracker().live_count();

    viewer
        .update_config_json(r#"{ "edges": { "enable": false } }"#)
        .unwrap();
    viewer.draw().unwrap();
    assert_eq!(viewer.backend().last_frame().unwrap().lines, 0);
    assert_eq!(viewer.tracker().live_count(), live);

    viewer
        .update_config_json(r#"{ "edges": { "enable": true } }"#)
        .unwrap();
    viewer.draw().unwrap();
    assert_eq!(viewer.backend().last_frame().unwrap().lines, 1);
    assert_eq!(viewer.tracker().live_count(), live);
}

#[test]
fn null_background_renders_transparent() {
    let patch = ConfigPatch::from_json(r#"{ "rendering": { "backgroundColor": null } }"#).unwrap();
    let mut viewer = headless_session(&patch);
    viewer.draw().unwrap();

    assert_eq!(viewer.backend().last_frame().unwrap().background, None);
}

#[test]
fn obj_models_load_through_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quad.obj");
    std::fs::write(
        &path,
        "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
    )
    .unwrap();
    let mut viewer = headless_session(&ConfigPatch::default());

    let events = load_and_poll(&mut viewer, path.to_str().unwrap());

    assert_eq!(triangle_count(&events), Some(2));
    viewer.draw().unwrap();
    assert_eq!(viewer.backend().last_frame().unwrap().triangles, 2);
}
