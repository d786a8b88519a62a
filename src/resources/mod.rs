/**
 * This module contains all logic for loading meshes/materials/textures from external files.
 *
 * Loading happens in two stages. The async loaders (`gltf_model`, `obj_model`,
 * `environment`) fetch and decode files into plain CPU data ([`ModelData`]),
 * which is `Send` and can be produced on any executor. [`instantiate`] then
 * turns that data into scene nodes with tracked GPU handles on the viewer's
 * thread.
 */
pub mod environment;
pub mod gltf_model;
pub mod obj_model;

use std::{
    collections::HashMap,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, anyhow, bail};
use base64::Engine as _;

use crate::data_structures::{
    color::Color,
    geometry::{Geometry, GeometryGroup},
    handle::ResourceTracker,
    instance::Instance,
    material::{
        DiffuseMaps, Material, MaterialKind, MaterialSet, PhongMaps, PhysicalMaps, StandardMaps,
        TextureSlot,
    },
    scene_graph::{ContainerNode, MeshNode, SceneNode},
    texture::Texture,
};

/// Called with `(items_loaded, items_total)` whenever a file of a model finished loading.
pub type LoadProgress = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ImageData {
    pub name: String,
    pub pixels: image::RgbaImage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaterialModel {
    Standard,
    Physical,
    Basic,
    Lambert,
    Phong,
    Other(String),
}

#[derive(Clone, Debug)]
pub struct MaterialData {
    pub name: String,
    pub model: MaterialModel,
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    /// Slot and index into [`ModelData::textures`].
    pub textures: Vec<(TextureSlot, usize)>,
}

#[derive(Clone, Debug, Default)]
pub struct PrimitiveData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub indices: Option<Vec<u32>>,
    /// Index into [`ModelData::materials`]; `None` uses a default material.
    pub material: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct NodeData {
    pub name: String,
    pub transform: Instance,
    pub primitives: Vec<PrimitiveData>,
    pub children: Vec<NodeData>,
}

/// A decoded model file, not yet attached to any viewer.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub name: String,
    pub roots: Vec<NodeData>,
    pub materials: Vec<MaterialData>,
    pub textures: Vec<ImageData>,
}

impl ModelData {
    /// Checks that every index refers to a vertex of its own primitive and that
    /// the merged vertices of each mesh stay addressable with `u32` indices.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.roots.iter().try_for_each(validate_node)
    }
}

fn validate_node(node: &NodeData) -> anyhow::Result<()> {
    let mut merged: usize = 0;
    for (idx, primitive) in node.primitives.iter().enumerate() {
        let vertex_count = primitive.positions.len();
        if let Some(indices) = &primitive.indices {
            if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                bail!(
                    "primitive {} of mesh '{}' references vertex {} but has only {} vertices",
                    idx,
                    node.name,
                    bad,
                    vertex_count
                );
            }
        }
        merged = merged
            .checked_add(vertex_count)
            .filter(|&total| u32::try_from(total).is_ok())
            .ok_or_else(|| anyhow!("mesh '{}' has too many vertices for 32 bit indices", node.name))?;
    }
    node.children.iter().try_for_each(validate_node)
}

/// Counts loaded files and forwards every step to a [`LoadProgress`].
pub struct ProgressCounter {
    loaded: AtomicUsize,
    total: usize,
    report: LoadProgress,
}

impl ProgressCounter {
    pub fn new(total: usize, report: LoadProgress) -> Self {
        Self {
            loaded: AtomicUsize::new(0),
            total: total.max(1),
            report,
        }
    }

    pub fn item_done(&self) {
        let loaded = self.loaded.fetch_add(1, Ordering::SeqCst) + 1;
        (self.report)(loaded.min(self.total), self.total);
    }
}

/// Loads a model file, picking the format from the file extension.
pub async fn load_model_data(locator: &str, progress: LoadProgress) -> anyhow::Result<ModelData> {
    let data = match extension(locator).as_deref() {
        Some("gltf") | Some("glb") => gltf_model::load(locator, progress).await?,
        Some("obj") => obj_model::load(locator, progress).await?,
        Some(other) => bail!("unsupported model format '.{}'", other),
        None => bail!("cannot tell the model format of '{}'", locator),
    };
    data.validate()
        .with_context(|| format!("invalid geometry in '{}'", locator))?;
    Ok(data)
}

/// Lower case file extension of a path or URL, ignoring query and fragment.
pub fn extension(locator: &str) -> Option<String> {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Resolves `uri` relative to the directory of `base`.
pub fn resolve_uri(base: &str, uri: &str) -> String {
    if uri.contains("://") || uri.starts_with('/') || uri.starts_with("data:") {
        return uri.to_string();
    }
    match base.rfind(['/', '\\']) {
        Some(idx) => format!("{}{}", &base[..=idx], uri),
        None => uri.to_string(),
    }
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decodes a `data:` URI. Only the base64 form carries binary payloads.
pub fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI without payload"))?;
    if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .context("invalid base64 in data URI")
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Fetches an asset referenced from the file at `base`.
pub async fn fetch_uri(base: &str, uri: &str) -> anyhow::Result<Vec<u8>> {
    if is_data_uri(uri) {
        return decode_data_uri(uri);
    }
    let resolved = resolve_uri(base, uri);
    load_binary(&resolved)
        .await
        .with_context(|| format!("failed to load '{}'", resolved))
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    if let Ok(url) = reqwest::Url::parse(file_name) {
        return Ok(url);
    }
    let window = web_sys::window().ok_or_else(|| anyhow!("no browser window"))?;
    let href = window
        .location()
        .href()
        .map_err(|e| anyhow!("cannot read page location: {:?}", e))?;
    Ok(reqwest::Url::parse(&href)?.join(file_name)?)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.error_for_status()?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = std::fs::read_to_string(file_name)?;

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url)
            .await?
            .error_for_status()?
            .bytes()
            .await?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = std::fs::read(file_name)?;

    Ok(data)
}

/// Builds the scene subtree of a loaded model.
///
/// Materials and textures are created the first time a mesh references them,
/// so every handle allocated here is reachable from the returned tree.
pub fn instantiate(data: ModelData, tracker: &Rc<ResourceTracker>) -> Box<dyn SceneNode> {
    let ModelData {
        name,
        roots,
        materials,
        textures,
    } = data;
    let mut builder = SceneBuilder {
        tracker,
        material_data: materials,
        image_data: textures,
        materials: HashMap::new(),
        textures: HashMap::new(),
    };
    let mut root = ContainerNode::new(&name);
    for node in roots {
        root.add_child(builder.node(node));
    }
    Box::new(root)
}

struct SceneBuilder<'t> {
    tracker: &'t Rc<ResourceTracker>,
    material_data: Vec<MaterialData>,
    image_data: Vec<ImageData>,
    materials: HashMap<Option<usize>, Rc<Material>>,
    textures: HashMap<usize, Rc<Texture>>,
}

impl SceneBuilder<'_> {
    fn node(&mut self, data: NodeData) -> Box<dyn SceneNode> {
        let NodeData {
            name,
            transform,
            primitives,
            children,
        } = data;
        let mut node: Box<dyn SceneNode> = if primitives.is_empty() {
            Box::new(ContainerNode::new(&name))
        } else {
            let materials: Vec<Rc<Material>> = primitives
                .iter()
                .map(|primitive| self.material(primitive.material))
                .collect();
            let geometry = self.geometry(&name, primitives);
            Box::new(MeshNode::new(&name, geometry, MaterialSet::from(materials)))
        };
        node.set_local_transform(transform);
        for child in children {
            node.add_child(self.node(child));
        }
        node
    }

    /// Merges all primitives of a mesh into one geometry with one group per primitive.
    fn geometry(&self, name: &str, primitives: Vec<PrimitiveData>) -> Geometry {
        let any_indexed = primitives.iter().any(|p| p.indices.is_some());
        let all_normals = primitives.iter().all(|p| {
            p.normals
                .as_ref()
                .is_some_and(|normals| normals.len() == p.positions.len())
        });

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut indices = Vec::new();
        let mut groups = Vec::new();
        for (material_index, primitive) in primitives.into_iter().enumerate() {
            let base = positions.len() as u32;
            let start = if any_indexed { indices.len() } else { positions.len() };
            if any_indexed {
                match &primitive.indices {
                    Some(own) => indices.extend(own.iter().map(|i| i + base)),
                    None => indices.extend(base..base + primitive.positions.len() as u32),
                }
            }
            positions.extend_from_slice(&primitive.positions);
            if let Some(own) = primitive.normals {
                normals.extend(own);
            }
            let end = if any_indexed { indices.len() } else { positions.len() };
            groups.push(GeometryGroup {
                elements: start as u32..end as u32,
                material_index,
            });
        }

        let mut geometry = Geometry::new(
            self.tracker,
            name,
            positions,
            any_indexed.then_some(indices),
        );
        if all_normals {
            geometry = geometry.with_normals(normals);
        } else {
            geometry.compute_vertex_normals();
        }
        if groups.len() > 1 {
            geometry = geometry.with_groups(groups);
        }
        geometry
    }

    fn material(&mut self, index: Option<usize>) -> Rc<Material> {
        if let Some(material) = self.materials.get(&index) {
            return material.clone();
        }
        let data = index.and_then(|idx| self.material_data.get(idx)).cloned();
        let material = match data {
            Some(data) => self.build_material(data),
            None => {
                if let Some(idx) = index {
                    log::warn!("material {} does not exist, using the default material", idx);
                }
                Material::new(
                    self.tracker,
                    "default",
                    MaterialKind::Standard(StandardMaps::default()),
                    Color::WHITE,
                )
            }
        };
        let material = Rc::new(material);
        self.materials.insert(index, material.clone());
        material
    }

    fn build_material(&mut self, data: MaterialData) -> Material {
        let kind = match data.model {
            MaterialModel::Standard => MaterialKind::Standard(StandardMaps::default()),
            MaterialModel::Physical => MaterialKind::Physical(PhysicalMaps::default()),
            MaterialModel::Basic => MaterialKind::Basic(DiffuseMaps::default()),
            MaterialModel::Lambert => MaterialKind::Lambert(DiffuseMaps::default()),
            MaterialModel::Phong => MaterialKind::Phong(PhongMaps::default()),
            MaterialModel::Other(type_name) => MaterialKind::Other { type_name },
        };
        let mut material = Material::new(self.tracker, &data.name, kind, data.color);
        if data.transparent {
            material = material.with_transparency(data.opacity);
        }
        for (slot, texture_index) in data.textures {
            let Some(texture) = self.texture(texture_index) else {
                log::warn!(
                    "material '{}' references missing texture {}",
                    data.name,
                    texture_index
                );
                continue;
            };
            if let Err(e) = material.set_texture(slot, texture) {
                log::warn!("{:#}", e);
            }
        }
        material
    }

    fn texture(&mut self, index: usize) -> Option<Rc<Texture>> {
        if let Some(texture) = self.textures.get(&index) {
            return Some(texture.clone());
        }
        let image = self.image_data.get(index)?;
        let texture = Rc::new(Texture::from_pixels(
            self.tracker,
            &image.name,
            image.pixels.clone(),
        ));
        self.textures.insert(index, texture.clone());
        Some(texture)
    }
}
