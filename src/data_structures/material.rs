//! Materials as a closed set of variants with fixed texture slots.
//!
//! Each [`MaterialKind`] carries its own map struct, so the set of textures a
//! material can own is known statically. Disposal matches over the kind instead
//! of looking materials up by type name; [`MaterialKind::Other`] is the explicit
//! fallback for anything the viewer does not know.

use std::{cell::Cell, rc::Rc};

use anyhow::bail;

use crate::data_structures::{
    color::Color,
    handle::{GpuHandle, ResourceId, ResourceKind, ResourceTracker},
    texture::Texture,
};

pub type TextureRef = Option<Rc<Texture>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Albedo,
    Environment,
    Roughness,
    Metalness,
    Clearcoat,
    ClearcoatRoughness,
    Specular,
    Bump,
    Normal,
}

#[derive(Debug, Default)]
pub struct StandardMaps {
    pub albedo: TextureRef,
    pub environment: TextureRef,
    pub roughness: TextureRef,
    pub metalness: TextureRef,
}

#[derive(Debug, Default)]
pub struct PhysicalMaps {
    pub standard: StandardMaps,
    pub clearcoat: TextureRef,
    pub clearcoat_roughness: TextureRef,
}

/// Maps of the unlit (basic) and lambert materials.
#[derive(Debug, Default)]
pub struct DiffuseMaps {
    pub albedo: TextureRef,
    pub environment: TextureRef,
}

#[derive(Debug, Default)]
pub struct PhongMaps {
    pub albedo: TextureRef,
    pub specular: TextureRef,
    pub bump: TextureRef,
    pub normal: TextureRef,
}

#[derive(Debug, Default)]
pub struct LineMaps {
    pub albedo: TextureRef,
}

#[derive(Debug)]
pub enum MaterialKind {
    Standard(StandardMaps),
    Physical(PhysicalMaps),
    Basic(DiffuseMaps),
    Lambert(DiffuseMaps),
    Phong(PhongMaps),
    LineBasic(LineMaps),
    /// A material the viewer has no slot schema for.
    Other { type_name: String },
}

impl MaterialKind {
    pub fn type_name(&self) -> &str {
        match self {
            MaterialKind::Standard(_) => "standard",
            MaterialKind::Physical(_) => "physical",
            MaterialKind::Basic(_) => "basic",
            MaterialKind::Lambert(_) => "lambert",
            MaterialKind::Phong(_) => "phong",
            MaterialKind::LineBasic(_) => "line-basic",
            MaterialKind::Other { type_name } => type_name.as_str(),
        }
    }

    /// The texture slots this kind owns.
    pub fn slots(&self) -> &'static [TextureSlot] {
        use TextureSlot::*;
        match self {
            MaterialKind::Standard(_) => &[Albedo, Environment, Roughness, Metalness],
            MaterialKind::Physical(_) => &[
                Albedo,
                Environment,
                Roughness,
                Metalness,
                Clearcoat,
                ClearcoatRoughness,
            ],
            MaterialKind::Basic(_) | MaterialKind::Lambert(_) => &[Albedo, Environment],
            MaterialKind::Phong(_) => &[Albedo, Specular, Bump, Normal],
            MaterialKind::LineBasic(_) => &[Albedo],
            MaterialKind::Other { .. } => &[],
        }
    }

    fn slot(&self, slot: TextureSlot) -> Option<&TextureRef> {
        use TextureSlot::*;
        match (self, slot) {
            (MaterialKind::Standard(m), Albedo) => Some(&m.albedo),
            (MaterialKind::Standard(m), Environment) => Some(&m.environment),
            (MaterialKind::Standard(m), Roughness) => Some(&m.roughness),
            (MaterialKind::Standard(m), Metalness) => Some(&m.metalness),
            (MaterialKind::Physical(m), Albedo) => Some(&m.standard.albedo),
            (MaterialKind::Physical(m), Environment) => Some(&m.standard.environment),
            (MaterialKind::Physical(m), Roughness) => Some(&m.standard.roughness),
            (MaterialKind::Physical(m), Metalness) => Some(&m.standard.metalness),
            (MaterialKind::Physical(m), Clearcoat) => Some(&m.clearcoat),
            (MaterialKind::Physical(m), ClearcoatRoughness) => Some(&m.clearcoat_roughness),
            (MaterialKind::Basic(m) | MaterialKind::Lambert(m), Albedo) => Some(&m.albedo),
            (MaterialKind::Basic(m) | MaterialKind::Lambert(m), Environment) => {
                Some(&m.environment)
            }
            (MaterialKind::Phong(m), Albedo) => Some(&m.albedo),
            (MaterialKind::Phong(m), Specular) => Some(&m.specular),
            (MaterialKind::Phong(m), Bump) => Some(&m.bump),
            (MaterialKind::Phong(m), Normal) => Some(&m.normal),
            (MaterialKind::LineBasic(m), Albedo) => Some(&m.albedo),
            _ => None,
        }
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> Option<&mut TextureRef> {
        use TextureSlot::*;
        match (self, slot) {
            (MaterialKind::Standard(maps), slot) => standard_slot(maps, slot),
            (MaterialKind::Physical(maps), Clearcoat) => Some(&mut maps.clearcoat),
            (MaterialKind::Physical(maps), ClearcoatRoughness) => {
                Some(&mut maps.clearcoat_roughness)
            }
            (MaterialKind::Physical(maps), slot) => standard_slot(&mut maps.standard, slot),
            (MaterialKind::Basic(maps) | MaterialKind::Lambert(maps), Albedo) => {
                Some(&mut maps.albedo)
            }
            (MaterialKind::Basic(maps) | MaterialKind::Lambert(maps), Environment) => {
                Some(&mut maps.environment)
            }
            (MaterialKind::Phong(maps), Albedo) => Some(&mut maps.albedo),
            (MaterialKind::Phong(maps), Specular) => Some(&mut maps.specular),
            (MaterialKind::Phong(maps), Bump) => Some(&mut maps.bump),
            (MaterialKind::Phong(maps), Normal) => Some(&mut maps.normal),
            (MaterialKind::LineBasic(maps), Albedo) => Some(&mut maps.albedo),
            _ => None,
        }
    }
}

fn standard_slot(maps: &mut StandardMaps, slot: TextureSlot) -> Option<&mut TextureRef> {
    match slot {
        TextureSlot::Albedo => Some(&mut maps.albedo),
        TextureSlot::Environment => Some(&mut maps.environment),
        TextureSlot::Roughness => Some(&mut maps.roughness),
        TextureSlot::Metalness => Some(&mut maps.metalness),
        _ => None,
    }
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub color: Color,
    pub transparent: bool,
    opacity: Cell<f32>,
    handle: GpuHandle,
}

impl Material {
    pub fn new(tracker: &Rc<ResourceTracker>, name: &str, kind: MaterialKind, color: Color) -> Self {
        let label = format!("{} ({})", name, kind.type_name());
        Self {
            name: name.to_string(),
            kind,
            color,
            transparent: false,
            opacity: Cell::new(1.0),
            handle: tracker.allocate(ResourceKind::Material, &label),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    pub fn handle(&self) -> &GpuHandle {
        &self.handle
    }

    pub fn opacity(&self) -> f32 {
        self.opacity.get()
    }

    /// Opacity is live state: it can change while the material is shared and drawn.
    pub fn set_opacity(&self, opacity: f32) {
        self.opacity.set(opacity.clamp(0.0, 1.0));
    }

    pub fn with_transparency(mut self, opacity: f32) -> Self {
        self.transparent = true;
        self.set_opacity(opacity);
        self
    }

    /// Puts `texture` into `slot`, failing if this kind has no such slot.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: Rc<Texture>) -> anyhow::Result<()> {
        let type_name = self.kind.type_name().to_string();
        match self.kind.slot_mut(slot) {
            Some(target) => {
                *target = Some(texture);
                Ok(())
            }
            None => bail!("{} material '{}' has no {:?} slot", type_name, self.name, slot),
        }
    }

    /// The occupied texture slots, in schema order.
    pub fn textures(&self) -> Vec<(TextureSlot, &Rc<Texture>)> {
        self.kind
            .slots()
            .iter()
            .filter_map(|&slot| Some((slot, self.kind.slot(slot)?.as_ref()?)))
            .collect()
    }
}

/// The material(s) of a mesh: one, or one per sub-geometry group.
#[derive(Debug)]
pub enum MaterialSet {
    Single(Rc<Material>),
    Multi(Vec<Rc<Material>>),
}

impl MaterialSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Rc<Material>> {
        match self {
            MaterialSet::Single(material) => std::slice::from_ref(material).iter(),
            MaterialSet::Multi(materials) => materials.iter(),
        }
    }

    pub fn primary(&self) -> Option<&Rc<Material>> {
        self.iter().next()
    }

    pub fn len(&self) -> usize {
        self.iter().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Rc<Material>>> for MaterialSet {
    fn from(mut materials: Vec<Rc<Material>>) -> Self {
        if materials.len() == 1 {
            MaterialSet::Single(materials.remove(0))
        } else {
            MaterialSet::Multi(materials)
        }
    }
}
