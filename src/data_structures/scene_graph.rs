//! Scene graph and hierarchical scene organization.
//!
//! A scene is a tree of boxed [`SceneNode`]s. Each node owns its children and a
//! local [`Instance`]; world transforms are derived while traversing. Three node
//! kinds exist: plain [`ContainerNode`]s for hierarchy, [`MeshNode`]s carrying a
//! geometry with its material(s), and [`LineSegmentsNode`]s for wireframe
//! overlays and helpers such as the grid.

use std::{fmt, rc::Rc};

use cgmath::Matrix4;

use crate::data_structures::{
    geometry::Geometry,
    instance::Instance,
    material::{Material, MaterialSet},
};

/// Bitmask of render layers. A node is drawn when its mask intersects the camera's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layers(u32);

impl Layers {
    /// Mask with only `layer` enabled.
    pub const fn new(layer: u32) -> Self {
        Self(1 << layer)
    }

    pub const fn none() -> Self {
        Self(0)
    }

    pub fn set(&mut self, layer: u32) {
        self.0 = 1 << layer;
    }

    pub fn enable(&mut self, layer: u32) {
        self.0 |= 1 << layer;
    }

    pub fn disable(&mut self, layer: u32) {
        self.0 &= !(1 << layer);
    }

    pub fn toggle(&mut self, layer: u32, enabled: bool) {
        if enabled {
            self.enable(layer)
        } else {
            self.disable(layer)
        }
    }

    pub fn is_enabled(&self, layer: u32) -> bool {
        self.0 & (1 << layer) != 0
    }

    pub fn test(&self, other: Layers) -> bool {
        self.0 & other.0 != 0
    }

    pub fn mask(&self) -> u32 {
        self.0
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::new(0)
    }
}

/// What a line segment node is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineRole {
    /// Wireframe derived from the parent mesh; removed together with it.
    Overlay,
    /// Scene furniture like the grid.
    Helper,
}

pub trait SceneNode {
    fn name(&self) -> &str;

    fn get_local_transform(&self) -> &Instance;

    fn set_local_transform(&mut self, instance: Instance);

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>>;

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>>;

    fn add_child(&mut self, child: Box<dyn SceneNode>) {
        self.get_children_mut().push(child);
    }

    fn layers(&self) -> Layers;

    fn as_mesh(&self) -> Option<&MeshNode> {
        None
    }

    fn as_mesh_mut(&mut self) -> Option<&mut MeshNode> {
        None
    }

    fn as_line_segments(&self) -> Option<&LineSegmentsNode> {
        None
    }

    fn as_line_segments_mut(&mut self) -> Option<&mut LineSegmentsNode> {
        None
    }
}

impl<'a> dyn SceneNode + 'a {
    /**
     * Depth-first walk handing every node its world transform.
     * `parent` is the world transform of whatever holds `self`.
     */
    pub fn traverse(
        &self,
        parent: &Matrix4<f32>,
        visit: &mut dyn FnMut(&dyn SceneNode, &Matrix4<f32>),
    ) {
        let world = self.get_local_transform().world(parent);
        visit(self, &world);
        for child in self.get_children() {
            child.traverse(&world, visit);
        }
    }

    /// Pre-order mutable walk. Children added by `visit` are visited as well.
    pub fn traverse_mut(&mut self, visit: &mut dyn FnMut(&mut dyn SceneNode)) {
        visit(self);
        for child in self.get_children_mut() {
            child.traverse_mut(visit);
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .get_children()
            .iter()
            .map(|child| child.node_count())
            .sum::<usize>()
    }
}

impl fmt::Debug for dyn SceneNode + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("name", &self.name())
            .field("children", self.get_children())
            .finish()
    }
}

pub struct ContainerNode {
    pub name: String,
    transform: Instance,
    layers: Layers,
    children: Vec<Box<dyn SceneNode>>,
}

impl ContainerNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transform: Instance::default(),
            layers: Layers::default(),
            children: Vec::new(),
        }
    }
}

impl SceneNode for ContainerNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_local_transform(&self) -> &Instance {
        &self.transform
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.transform = instance;
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn layers(&self) -> Layers {
        self.layers
    }
}

/// A renderable node: one geometry drawn with one or more materials.
pub struct MeshNode {
    pub name: String,
    pub geometry: Geometry,
    pub materials: MaterialSet,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    transform: Instance,
    layers: Layers,
    children: Vec<Box<dyn SceneNode>>,
}

impl MeshNode {
    pub fn new(name: &str, geometry: Geometry, materials: MaterialSet) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            materials,
            cast_shadow: false,
            receive_shadow: false,
            transform: Instance::default(),
            layers: Layers::default(),
            children: Vec::new(),
        }
    }

    pub fn overlays(&self) -> impl Iterator<Item = &LineSegmentsNode> {
        self.children
            .iter()
            .filter_map(|child| child.as_line_segments())
            .filter(|lines| lines.role == LineRole::Overlay)
    }

    pub fn has_overlay(&self) -> bool {
        self.overlays().next().is_some()
    }

    /// Detaches the overlay children, leaving every other child in place.
    pub fn take_overlays(&mut self) -> Vec<Box<dyn SceneNode>> {
        let (overlays, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.children)
            .into_iter()
            .partition(|child| {
                child
                    .as_line_segments()
                    .is_some_and(|lines| lines.role == LineRole::Overlay)
            });
        self.children = rest;
        overlays
    }
}

impl SceneNode for MeshNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_local_transform(&self) -> &Instance {
        &self.transform
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.transform = instance;
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn layers(&self) -> Layers {
        self.layers
    }

    fn as_mesh(&self) -> Option<&MeshNode> {
        Some(self)
    }

    fn as_mesh_mut(&mut self) -> Option<&mut MeshNode> {
        Some(self)
    }
}

/// Line list geometry drawn with a single line material.
pub struct LineSegmentsNode {
    pub name: String,
    pub geometry: Geometry,
    pub material: Rc<Material>,
    pub role: LineRole,
    transform: Instance,
    layers: Layers,
    children: Vec<Box<dyn SceneNode>>,
}

impl LineSegmentsNode {
    pub fn new(name: &str, geometry: Geometry, material: Rc<Material>, role: LineRole) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            material,
            role,
            transform: Instance::default(),
            layers: Layers::default(),
            children: Vec::new(),
        }
    }

    pub fn on_layer(mut self, layer: u32) -> Self {
        self.layers.set(layer);
        self
    }
}

impl SceneNode for LineSegmentsNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_local_transform(&self) -> &Instance {
        &self.transform
    }

    fn set_local_transform(&mut self, instance: Instance) {
        self.transform = instance;
    }

    fn get_children(&self) -> &Vec<Box<dyn SceneNode>> {
        &self.children
    }

    fn get_children_mut(&mut self) -> &mut Vec<Box<dyn SceneNode>> {
        &mut self.children
    }

    fn layers(&self) -> Layers {
        self.layers
    }

    fn as_line_segments(&self) -> Option<&LineSegmentsNode> {
        Some(self)
    }

    fn as_line_segments_mut(&mut self) -> Option<&mut LineSegmentsNode> {
        Some(self)
    }
}
