//! glTF 2.0 loading (`.gltf` with external or embedded buffers, and `.glb`).

use anyhow::{Context, anyhow};
use cgmath::Quaternion;
use futures::future::try_join_all;
use gltf::{buffer, image::Source, mesh::Mode};

use crate::{
    data_structures::{color::Color, instance::Instance, material::TextureSlot, texture::decode_rgba},
    resources::{
        ImageData, LoadProgress, MaterialData, MaterialModel, ModelData, NodeData, PrimitiveData,
        ProgressCounter, fetch_uri, is_data_uri, load_binary,
    },
};

/// Loads a glTF document and everything it references.
///
/// Progress counts the document itself plus every buffer and image stored in a
/// separate file. Embedded data (GLB chunk, data URIs) is part of the document.
pub async fn load(locator: &str, progress: LoadProgress) -> anyhow::Result<ModelData> {
    let bytes = load_binary(locator)
        .await
        .with_context(|| format!("failed to read '{}'", locator))?;
    let gltf::Gltf { document, blob } =
        gltf::Gltf::from_slice(&bytes).with_context(|| format!("'{}' is not valid glTF", locator))?;

    let external_buffers = document
        .buffers()
        .filter(|b| matches!(b.source(), buffer::Source::Uri(uri) if !is_data_uri(uri)))
        .count();
    let external_images = document
        .images()
        .filter(|i| matches!(i.source(), Source::Uri { uri, .. } if !is_data_uri(uri)))
        .count();
    let progress = ProgressCounter::new(1 + external_buffers + external_images, progress);
    progress.item_done();

    let buffers = try_join_all(document.buffers().map(|b| {
        let blob = blob.as_deref();
        let progress = &progress;
        async move {
            match b.source() {
                buffer::Source::Bin => blob
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| anyhow!("buffer {} refers to a missing GLB chunk", b.index())),
                buffer::Source::Uri(uri) => {
                    let data = fetch_uri(locator, uri).await?;
                    if !is_data_uri(uri) {
                        progress.item_done();
                    }
                    Ok(data)
                }
            }
        }
    }))
    .await?;

    let images = try_join_all(document.images().map(|image| {
        let buffers = &buffers;
        let progress = &progress;
        async move {
            let name = image
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("image {}", image.index()));
            let pixels = match image.source() {
                Source::View { view, mime_type } => {
                    let data = buffers
                        .get(view.buffer().index())
                        .and_then(|b| b.get(view.offset()..view.offset() + view.length()))
                        .ok_or_else(|| anyhow!("image '{}' points outside its buffer", name))?;
                    decode_rgba(data, mime_extension(Some(mime_type)))?
                }
                Source::Uri { uri, mime_type } => {
                    let data = fetch_uri(locator, uri).await?;
                    if !is_data_uri(uri) {
                        progress.item_done();
                    }
                    let hint = mime_extension(mime_type).or_else(|| uri_extension(uri));
                    decode_rgba(&data, hint)
                        .with_context(|| format!("failed to decode image '{}'", name))?
                }
            };
            Ok::<_, anyhow::Error>(ImageData { name, pixels })
        }
    }))
    .await?;

    // Materials address textures, textures address images.
    let textures = document
        .textures()
        .filter_map(|texture| images.get(texture.source().index()).cloned())
        .collect();
    let materials = document.materials().map(|m| read_material(&m)).collect();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("'{}' contains no scene", locator))?;
    let roots = scene
        .nodes()
        .map(|node| read_node(&node, &buffers))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ModelData {
        name: scene
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| locator.to_string()),
        roots,
        materials,
        textures,
    })
}

fn mime_extension(mime_type: Option<&str>) -> Option<&str> {
    mime_type.and_then(|mime| mime.split('/').next_back())
}

fn uri_extension(uri: &str) -> Option<&str> {
    if is_data_uri(uri) {
        return None;
    }
    uri.rsplit_once('.').map(|(_, ext)| ext)
}

fn read_material(material: &gltf::Material) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();

    let model = if material.unlit() {
        MaterialModel::Basic
    } else if material.transmission().is_some()
        || material.volume().is_some()
        || material.ior().is_some()
        || material.specular().is_some()
    {
        MaterialModel::Physical
    } else {
        MaterialModel::Standard
    };

    let mut textures = Vec::new();
    if let Some(info) = pbr.base_color_texture() {
        textures.push((TextureSlot::Albedo, info.texture().index()));
    }
    if model != MaterialModel::Basic {
        // one texture packs both channels
        if let Some(info) = pbr.metallic_roughness_texture() {
            textures.push((TextureSlot::Roughness, info.texture().index()));
            textures.push((TextureSlot::Metalness, info.texture().index()));
        }
    }

    MaterialData {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material {}", material.index().unwrap_or_default())),
        model,
        color: Color::new(r, g, b),
        opacity: a,
        transparent: material.alpha_mode() == gltf::material::AlphaMode::Blend,
        textures,
    }
}

fn read_node(node: &gltf::Node, buffers: &[Vec<u8>]) -> anyhow::Result<NodeData> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Instance {
        position: translation.into(),
        rotation: Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: scale.into(),
    };

    let mut primitives = Vec::new();
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                log::warn!(
                    "skipping {:?} primitive {} of mesh {:?}",
                    primitive.mode(),
                    primitive.index(),
                    mesh.name()
                );
                continue;
            }
            primitives.push(read_primitive(&primitive, buffers)?);
        }
    }

    let children = node
        .children()
        .map(|child| read_node(&child, buffers))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let name = node
        .name()
        .or_else(|| node.mesh().and_then(|mesh| mesh.name()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("node {}", node.index()));
    Ok(NodeData {
        name,
        transform,
        primitives,
        children,
    })
}

fn read_primitive(primitive: &gltf::Primitive, buffers: &[Vec<u8>]) -> anyhow::Result<PrimitiveData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| anyhow!("primitive {} has no positions", primitive.index()))?
        .collect();
    Ok(PrimitiveData {
        positions,
        normals: reader.read_normals().map(Iterator::collect),
        indices: reader.read_indices().map(|indices| indices.into_u32().collect()),
        material: primitive.material().index(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "tri", "mesh": 0, "translation": [1, 2, 3] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
        "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [1, 0, 0, 0.5] }, "alphaMode": "BLEND" }],
        "buffers": [{ "byteLength": 36, "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA" }],
        "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [0, 0, 0], "max": [1, 1, 0]
        }]
    }"#;

    #[test]
    fn loads_embedded_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.gltf");
        std::fs::write(&path, TRIANGLE).unwrap();

        let steps = Arc::new(Mutex::new(Vec::new()));
        let recorded = steps.clone();
        let progress: LoadProgress = Arc::new(move |loaded, total| {
            recorded.lock().unwrap().push((loaded, total));
        });
        let model = futures::executor::block_on(load(path.to_str().unwrap(), progress)).unwrap();

        assert_eq!(*steps.lock().unwrap(), vec![(1, 1)]);
        let node = &model.roots[0];
        assert_eq!(node.name, "tri");
        assert_eq!(node.transform.position, cgmath::Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(node.primitives[0].positions[1], [1.0, 0.0, 0.0]);
        assert!(node.primitives[0].indices.is_none());

        let material = &model.materials[0];
        assert_eq!(material.model, MaterialModel::Standard);
        assert!(material.transparent);
        assert_eq!(material.opacity, 0.5);
    }

    #[test]
    fn missing_file_is_an_error() {
        let progress: LoadProgress = Arc::new(|_, _| {});
        let result = futures::executor::block_on(load("does/not/exist.gltf", progress));
        assert!(result.is_err());
    }
}
