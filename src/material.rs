// src/material.rs
//! Scene materials and the texture slots progressive upgrades land in.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::descriptor::MapKind;
use crate::loader::{Loaded, Upgrade};
use crate::registry::GpuResource;

/// Texture slots of a PBR material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapSlot {
    Albedo,
    Normal,
    Roughness,
    Metalness,
    AmbientOcclusion,
    Emissive,
}

impl MapSlot {
    pub const ALL: [MapSlot; 6] = [
        MapSlot::Albedo,
        MapSlot::Normal,
        MapSlot::Roughness,
        MapSlot::Metalness,
        MapSlot::AmbientOcclusion,
        MapSlot::Emissive,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// Slots a generated map feeds. The packed ORM texture serves three.
    pub fn for_map(kind: MapKind) -> &'static [MapSlot] {
        match kind {
            MapKind::Albedo => &[MapSlot::Albedo],
            MapKind::Normal => &[MapSlot::Normal],
            MapKind::Roughness => &[
                MapSlot::Roughness,
                MapSlot::Metalness,
                MapSlot::AmbientOcclusion,
            ],
        }
    }
}

/// Anything that can sit in a material slot.
pub trait IntoMaterialMap {
    fn into_map(self) -> Arc<dyn GpuResource>;
}

impl<R: GpuResource + 'static> IntoMaterialMap for Arc<R> {
    fn into_map(self) -> Arc<dyn GpuResource> {
        self
    }
}

pub struct Material {
    pub name: String,
    maps: [Option<Arc<dyn GpuResource>>; 6],
    /// Per-material uniform block, if the backend allocated one.
    pub uniforms: Option<Arc<dyn GpuResource>>,
    needs_update: bool,
    version: u64,
}

/// Materials are shared between the scene graph and whoever applies upgrades.
pub type SharedMaterial = Arc<Mutex<Material>>;

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            maps: Default::default(),
            uniforms: None,
            needs_update: false,
            version: 0,
        }
    }

    pub fn shared(self) -> SharedMaterial {
        Arc::new(Mutex::new(self))
    }

    pub fn map(&self, slot: MapSlot) -> Option<&Arc<dyn GpuResource>> {
        self.maps[slot.index()].as_ref()
    }

    /// Occupied slots.
    pub fn maps(&self) -> impl Iterator<Item = (MapSlot, &Arc<dyn GpuResource>)> {
        MapSlot::ALL
            .into_iter()
            .filter_map(move |slot| self.map(slot).map(|m| (slot, m)))
    }

    /// Swaps the texture in `slot` and flags the material for re-upload.
    ///
    /// The previous texture is only released, never disposed here.
    pub fn apply_upgrade(&mut self, slot: MapSlot, texture: impl IntoMaterialMap) {
        self.set_slot(slot, texture.into_map());
    }

    /// Applies one generated map to every slot it feeds.
    pub fn apply_map(&mut self, kind: MapKind, texture: impl IntoMaterialMap) {
        let texture = texture.into_map();
        for &slot in MapSlot::for_map(kind) {
            self.set_slot(slot, texture.clone());
        }
    }

    fn set_slot(&mut self, slot: MapSlot, texture: Arc<dyn GpuResource>) {
        self.maps[slot.index()] = Some(texture);
        self.needs_update = true;
        self.version += 1;
    }

    pub fn clear_map(&mut self, slot: MapSlot) {
        if self.maps[slot.index()].take().is_some() {
            self.needs_update = true;
            self.version += 1;
        }
    }

    #[inline]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Returns and resets the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.needs_update)
    }

    /// Bumped on every slot change.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Outstanding upgrades for one material.
///
/// Poll once per frame; arrived high-resolution maps are applied and the
/// material marked dirty.
pub struct PendingMaps<T> {
    material: SharedMaterial,
    pending: Vec<(MapKind, Upgrade<T>)>,
}

impl<T> PendingMaps<T>
where
    T: IntoMaterialMap,
{
    pub fn new(material: SharedMaterial) -> Self {
        Self {
            material,
            pending: Vec::new(),
        }
    }

    /// Puts the placeholder in place now and remembers the upgrade.
    pub fn track(&mut self, kind: MapKind, placeholder: Option<Loaded<T>>, upgrade: Upgrade<T>) {
        if let Some(loaded) = placeholder {
            self.material.lock().apply_map(kind, loaded.resource);
        }
        self.pending.push((kind, upgrade));
    }

    /// Applies every upgrade that has arrived. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        let material = &self.material;
        self.pending.retain_mut(|(kind, upgrade)| match upgrade.try_take() {
            None => true,
            Some(Ok(loaded)) => {
                let mut m = material.lock();
                debug!("{}: {kind} upgraded to {:?}", m.name, loaded.tier);
                m.apply_map(*kind, loaded.resource);
                applied += 1;
                false
            }
            Some(Err(err)) => {
                // The placeholder stays in place.
                if !err.is_cancelled() {
                    warn!("{}: {kind} upgrade failed: {err}", material.lock().name);
                }
                false
            }
        });
        applied
    }

    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn material(&self) -> &SharedMaterial {
        &self.material
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct Dummy(&'static str);

    impl GpuResource for Dummy {
        fn label(&self) -> &str {
            self.0
        }

        fn dispose(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn apply_upgrade_swaps_and_marks_dirty() {
        let mut m = Material::new("hull");
        assert!(!m.needs_update());
        m.apply_upgrade(MapSlot::Albedo, Arc::new(Dummy("low")));
        m.apply_upgrade(MapSlot::Albedo, Arc::new(Dummy("high")));
        assert_eq!(m.map(MapSlot::Albedo).unwrap().label(), "high");
        assert!(m.take_dirty());
        assert!(!m.take_dirty());
        assert_eq!(m.version(), 2);
    }

    #[test]
    fn packed_orm_fills_three_slots_with_one_texture() {
        let mut m = Material::new("crate");
        m.apply_map(MapKind::Roughness, Arc::new(Dummy("orm")));
        let slots: Vec<_> = m.maps().map(|(s, _)| s).collect();
        assert_eq!(
            slots,
            vec![MapSlot::Roughness, MapSlot::Metalness, MapSlot::AmbientOcclusion]
        );
        let a = m.map(MapSlot::Roughness).unwrap();
        let b = m.map(MapSlot::AmbientOcclusion).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn clear_map_only_dirties_when_occupied() {
        let mut m = Material::new("floor");
        m.clear_map(MapSlot::Emissive);
        assert!(!m.needs_update());
        m.apply_upgrade(MapSlot::Emissive, Arc::new(Dummy("glow")));
        m.take_dirty();
        m.clear_map(MapSlot::Emissive);
        assert!(m.needs_update());
        assert!(m.map(MapSlot::Emissive).is_none());
    }
}
