//! Wavefront OBJ loading with optional MTL material libraries.

use std::{
    collections::HashMap,
    io::{BufReader, Cursor},
};

use anyhow::Context;

use crate::{
    data_structures::{color::Color, material::TextureSlot, texture::decode_rgba},
    resources::{
        ImageData, LoadProgress, MaterialData, MaterialModel, ModelData, NodeData, PrimitiveData,
        ProgressCounter, extension, load_binary, load_string, resolve_uri,
    },
};

/// Loads an OBJ file. Materials come from the MTL libraries it references and
/// are read as Phong materials. Progress counts the OBJ file plus every
/// distinct texture file.
pub async fn load(locator: &str, progress: LoadProgress) -> anyhow::Result<ModelData> {
    let obj_text = load_string(locator)
        .await
        .with_context(|| format!("failed to read '{}'", locator))?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let path = resolve_uri(locator, &p);
            async move {
                match load_string(&path).await {
                    Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
                    Err(e) => {
                        log::warn!("material library '{}' not found: {:#}", path, e);
                        Err(tobj::LoadError::OpenFileFailed)
                    }
                }
            }
        },
    )
    .await
    .with_context(|| format!("'{}' is not a valid OBJ file", locator))?;

    let obj_materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("'{}' is rendered without materials: {}", locator, e);
        Vec::new()
    });

    let mut texture_paths: Vec<String> = Vec::new();
    let mut materials = Vec::with_capacity(obj_materials.len());
    for m in &obj_materials {
        let mut textures = Vec::new();
        let maps = [
            (TextureSlot::Albedo, m.diffuse_texture.as_ref()),
            (TextureSlot::Specular, m.specular_texture.as_ref()),
            // tobj reads `bump` and `map_Bump` into `normal_texture`
            (TextureSlot::Bump, m.normal_texture.as_ref()),
            (TextureSlot::Normal, m.unknown_param.get("norm")),
        ];
        for (slot, path) in maps {
            let Some(path) = path else { continue };
            let path = resolve_uri(locator, path);
            let index = match texture_paths.iter().position(|p| *p == path) {
                Some(index) => index,
                None => {
                    texture_paths.push(path);
                    texture_paths.len() - 1
                }
            };
            textures.push((slot, index));
        }
        let [r, g, b] = m.diffuse.unwrap_or([1.0, 1.0, 1.0]);
        let opacity = m.dissolve.unwrap_or(1.0);
        materials.push(MaterialData {
            name: m.name.clone(),
            model: MaterialModel::Phong,
            color: Color::new(r, g, b),
            opacity,
            transparent: opacity < 1.0,
            textures,
        });
    }

    let progress = ProgressCounter::new(1 + texture_paths.len(), progress);
    progress.item_done();

    // Missing images leave a hole that instantiation skips with a warning.
    let mut images = HashMap::new();
    for (index, path) in texture_paths.iter().enumerate() {
        match load_image(path).await {
            Ok(image) => {
                images.insert(index, image);
            }
            Err(e) => log::warn!("skipping texture '{}': {:#}", path, e),
        }
        progress.item_done();
    }
    let (materials, textures) = compact_textures(materials, images);

    let roots = models
        .into_iter()
        .map(|model| NodeData {
            name: model.name,
            primitives: vec![read_mesh(model.mesh)],
            ..Default::default()
        })
        .collect();

    Ok(ModelData {
        name: locator.to_string(),
        roots,
        materials,
        textures,
    })
}

async fn load_image(path: &str) -> anyhow::Result<ImageData> {
    let data = load_binary(path).await?;
    let ext = extension(path);
    Ok(ImageData {
        name: path.to_string(),
        pixels: decode_rgba(&data, ext.as_deref())?,
    })
}

/// Drops references to textures that failed to load and renumbers the rest.
fn compact_textures(
    mut materials: Vec<MaterialData>,
    mut images: HashMap<usize, ImageData>,
) -> (Vec<MaterialData>, Vec<ImageData>) {
    let mut remap = HashMap::new();
    let mut textures = Vec::new();
    let mut keys: Vec<usize> = images.keys().copied().collect();
    keys.sort_unstable();
    for old in keys {
        if let Some(image) = images.remove(&old) {
            remap.insert(old, textures.len());
            textures.push(image);
        }
    }
    for material in &mut materials {
        material.textures = material
            .textures
            .iter()
            .filter_map(|(slot, old)| remap.get(old).map(|new| (*slot, *new)))
            .collect();
    }
    (materials, textures)
}

fn read_mesh(mesh: tobj::Mesh) -> PrimitiveData {
    let triples = |flat: &[f32]| -> Vec<[f32; 3]> {
        flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
    };
    let positions = triples(&mesh.positions);
    let normals = (mesh.normals.len() == mesh.positions.len()).then(|| triples(&mesh.normals));
    PrimitiveData {
        positions,
        normals,
        indices: Some(mesh.indices),
        material: mesh.material_id,
    }
}
