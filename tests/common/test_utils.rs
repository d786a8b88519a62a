use std::{io::Cursor, path::Path};

use base64::Engine as _;
use flow_viewer::{
    ConfigPatch, HeadlessBackend, ViewerEvent, ViewerSession,
    data_structures::geometry::cube_positions_and_indices, loader::Spawner,
};
use serde_json::{Value, json};

/// A session that loads synchronously and renders nowhere.
pub fn headless_session(patch: &ConfigPatch) -> ViewerSession<HeadlessBackend> {
    ViewerSession::with_spawner(
        HeadlessBackend::new(800, 600),
        patch,
        (800, 600),
        Spawner::Blocking,
    )
}

/// Loads `locator` and applies the result, returning the events it produced.
pub fn load_and_poll(viewer: &mut ViewerSession<HeadlessBackend>, locator: &str) -> Vec<ViewerEvent> {
    viewer.load_model(locator);
    viewer.poll_loads();
    viewer.drain_events()
}

pub fn triangle_count(events: &[ViewerEvent]) -> Option<usize> {
    events.iter().find_map(|event| match event {
        ViewerEvent::Load { triangle_count, .. } => Some(*triangle_count),
        _ => None,
    })
}

pub fn progress(events: &[ViewerEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            ViewerEvent::Progress(percent) => Some(*percent),
            _ => None,
        })
        .collect()
}

/// Vertex and index data of an indexed cube, packed the way glTF buffers are.
fn cube_buffer(half_extent: f32) -> (Vec<u8>, usize, usize) {
    let (positions, indices) = cube_positions_and_indices(half_extent);
    let mut bytes = Vec::new();
    for p in &positions {
        for c in p {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }
    let position_bytes = bytes.len();
    for i in &indices {
        bytes.extend_from_slice(&i.to_le_bytes());
    }
    (bytes, position_bytes, indices.len())
}

/// glTF document of one cube mesh.
///
/// * `buffer_uri` is the buffer's URI; `None` embeds it as a base64 data URI.
/// * `primitives` repeats the cube primitive, each with its own material.
/// * `texture_uri` gives every material the same base colour texture.
fn cube_document(
    half_extent: f32,
    buffer_uri: Option<&str>,
    primitives: usize,
    texture_uri: Option<&str>,
) -> (Value, Vec<u8>) {
    let (bytes, position_bytes, index_count) = cube_buffer(half_extent);
    let h = half_extent;
    let uri = match buffer_uri {
        Some(uri) => uri.to_string(),
        None => format!(
            "data:application/octet-stream;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        ),
    };
    let materials: Vec<Value> = (0..primitives)
        .map(|i| {
            let mut pbr = json!({ "baseColorFactor": [1.0, 1.0, 1.0, 1.0] });
            if texture_uri.is_some() {
                pbr["baseColorTexture"] = json!({ "index": 0 });
            }
            json!({ "name": format!("material {}", i), "pbrMetallicRoughness": pbr })
        })
        .collect();
    let mesh_primitives: Vec<Value> = (0..primitives)
        .map(|i| json!({ "attributes": { "POSITION": 0 }, "indices": 1, "material": i }))
        .collect();

    let mut document = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "cube", "mesh": 0, "translation": [3.0, 1.0, -2.0] }],
        "meshes": [{ "primitives": mesh_primitives }],
        "materials": materials,
        "buffers": [{ "byteLength": bytes.len(), "uri": uri }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": position_bytes },
            { "buffer": 0, "byteOffset": position_bytes, "byteLength": bytes.len() - position_bytes }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": position_bytes / 12, "type": "VEC3",
                "min": [-h, -h, -h], "max": [h, h, h]
            },
            { "bufferView": 1, "componentType": 5125, "count": index_count, "type": "SCALAR" }
        ]
    });
    if let Some(texture_uri) = texture_uri {
        document["images"] = json!([{ "uri": texture_uri }]);
        document["textures"] = json!([{ "source": 0 }]);
    }
    (document, bytes)
}

/// Writes a self-contained cube glTF into `dir` and returns its path.
pub fn write_cube(dir: &Path, name: &str, half_extent: f32) -> String {
    let (document, _) = cube_document(half_extent, None, 1, None);
    let path = dir.join(name);
    std::fs::write(&path, document.to_string()).unwrap();
    path.to_str().unwrap().to_string()
}

/// Writes a cube whose buffer and texture live in separate files. The mesh
/// has two primitives with two materials sharing the texture.
pub fn write_textured_cube(dir: &Path) -> String {
    let (document, bytes) = cube_document(1.0, Some("cube.bin"), 2, Some("checker.png"));
    std::fs::write(dir.join("cube.bin"), bytes).unwrap();
    std::fs::write(dir.join("checker.png"), png_bytes()).unwrap();
    let path = dir.join("textured.gltf");
    std::fs::write(&path, document.to_string()).unwrap();
    path.to_str().unwrap().to_string()
}

/// Writes a cube whose last index points past the end of its vertex buffer.
pub fn write_cube_with_stray_index(dir: &Path) -> String {
    let (document, mut bytes) = cube_document(1.0, Some("stray.bin"), 1, None);
    let last = bytes.len() - 4;
    bytes[last..].copy_from_slice(&999u32.to_le_bytes());
    std::fs::write(dir.join("stray.bin"), bytes).unwrap();
    let path = dir.join("stray.gltf");
    std::fs::write(&path, document.to_string()).unwrap();
    path.to_str().unwrap().to_string()
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_fn(2, 2, |x, y| {
        if (x + y) % 2 == 0 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 255])
        }
    });
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}
