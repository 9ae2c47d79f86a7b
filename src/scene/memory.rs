//! In-memory scene for tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{ObjectId, Placement, Scene, SceneError};

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub label: String,
    pub geometry: Vec<u8>,
    pub placement: Placement,
}

#[derive(Debug, Default)]
pub struct MemoryScene {
    pub objects: BTreeMap<ObjectId, MemoryObject>,
    pub mesh_export: bool,
}

impl MemoryScene {
    pub fn insert(&mut self, label: &str, placement: Placement) -> ObjectId {
        let id = ObjectId::new();
        self.objects.insert(
            id.clone(),
            MemoryObject {
                label: label.to_string(),
                geometry: b"ISO-10303-21;".to_vec(),
                placement,
            },
        );
        id
    }
}

impl Scene for MemoryScene {
    fn import_exchange_file(&mut self, path: &Path, label: &str) -> Result<ObjectId, SceneError> {
        let geometry = fs::read(path)?;
        let id = ObjectId::new();
        self.objects.insert(
            id.clone(),
            MemoryObject {
                label: label.to_string(),
                geometry,
                placement: Placement::default(),
            },
        );
        Ok(id)
    }

    fn export_exchange_file(&self, id: &ObjectId, path: &Path) -> Result<(), SceneError> {
        let object = self
            .objects
            .get(id)
            .ok_or_else(|| SceneError::UnknownObject(id.clone()))?;
        fs::write(path, &object.geometry)?;
        Ok(())
    }

    fn export_mesh(&self, id: &ObjectId, path: &Path) -> Result<bool, SceneError> {
        if !self.mesh_export {
            return Ok(false);
        }
        self.export_exchange_file(id, path)?;
        Ok(true)
    }

    fn remove_object(&mut self, id: &ObjectId) -> Result<(), SceneError> {
        self.objects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SceneError::UnknownObject(id.clone()))
    }

    fn label(&self, id: &ObjectId) -> Option<String> {
        self.objects.get(id).map(|o| o.label.clone())
    }

    fn placement(&self, id: &ObjectId) -> Option<Placement> {
        self.objects.get(id).map(|o| o.placement)
    }

    fn set_placement(&mut self, id: &ObjectId, placement: Placement) -> Result<(), SceneError> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or_else(|| SceneError::UnknownObject(id.clone()))?;
        object.placement = placement;
        Ok(())
    }
}
