//! CAD collaborator seam.
//!
//! The sync engine never touches geometry. It asks a [`Scene`] to import and
//! export exchange files and to read or write object placements, and keeps
//! its own bookkeeping in a [`MetadataTable`] keyed by object identity.

pub mod file;

#[cfg(test)]
pub mod memory;

pub use file::FileScene;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use ulid::Ulid;

use crate::codec::record::{DEFAULT_ROTATION, DEFAULT_SCALE, DEFAULT_TRANSLATION};
use crate::codec::Vec3;
use crate::token::Token;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to import {path}: {reason}")]
    Import { path: String, reason: String },
    #[error("Failed to export object {id} to {path}: {reason}")]
    Export {
        id: ObjectId,
        path: String,
        reason: String,
    },
    #[error("Object not found: {0}")]
    UnknownObject(ObjectId),
    #[error("Workspace IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Workspace JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Serialize for SceneError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Identity of a local object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new() -> Self {
        ObjectId(format!("obj_{}", Ulid::new()))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        ObjectId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local pose of an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub translation: Vec3,
    /// Euler degrees in (Z, Y, X) order: yaw, pitch, roll.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            translation: DEFAULT_TRANSLATION,
            rotation: DEFAULT_ROTATION,
            scale: DEFAULT_SCALE,
        }
    }
}

/// Placement change applied by pull sync or a live update.
/// Live updates carry no scale, so an absent scale keeps the current one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementUpdate {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Option<Vec3>,
}

impl PlacementUpdate {
    pub fn apply_to(&self, placement: &mut Placement) {
        placement.translation = self.translation;
        placement.rotation = self.rotation;
        if let Some(scale) = self.scale {
            placement.scale = scale;
        }
    }
}

/// What the engine remembers about a synchronized object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Remote descriptor link; the key live and pull updates match on.
    pub reference_path: String,
    pub exchange_path: String,
    pub token: Token,
    pub last_sync: DateTime<Utc>,
}

impl SyncMetadata {
    pub fn new(reference_path: impl Into<String>, exchange_path: impl Into<String>, token: Token) -> Self {
        Self {
            reference_path: reference_path.into(),
            exchange_path: exchange_path.into(),
            token,
            last_sync: Utc::now(),
        }
    }
}

/// Side table of sync metadata keyed by object identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTable {
    entries: BTreeMap<ObjectId, SyncMetadata>,
}

impl MetadataTable {
    pub fn tag(&mut self, id: ObjectId, metadata: SyncMetadata) {
        self.entries.insert(id, metadata);
    }

    pub fn untag(&mut self, id: &ObjectId) -> Option<SyncMetadata> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&SyncMetadata> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut SyncMetadata> {
        self.entries.get_mut(id)
    }

    /// Every object tagged with this reference path.
    pub fn find_by_reference(&self, reference_path: &str) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, meta)| meta.reference_path == reference_path)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Tagged objects whose reference lives under the given project folder.
    pub fn within_project<'a>(
        &'a self,
        project_url: &'a str,
    ) -> impl Iterator<Item = (&'a ObjectId, &'a SyncMetadata)> + 'a {
        let project = project_url.trim_end_matches('/');
        self.entries.iter().filter(move |(_, meta)| {
            meta.reference_path
                .strip_prefix(project)
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &SyncMetadata)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The CAD document as seen by the sync engine.
pub trait Scene: Send {
    /// Materialize a new object from an exchange file.
    fn import_exchange_file(&mut self, path: &Path, label: &str) -> Result<ObjectId, SceneError>;

    /// Write an object's geometry as an exchange file.
    fn export_exchange_file(&self, id: &ObjectId, path: &Path) -> Result<(), SceneError>;

    /// Write an object's mesh for the descriptor refresh. Returns `false`
    /// when the scene has no mesh export, in which case the refresh is skipped.
    fn export_mesh(&self, _id: &ObjectId, _path: &Path) -> Result<bool, SceneError> {
        Ok(false)
    }

    fn remove_object(&mut self, id: &ObjectId) -> Result<(), SceneError>;

    fn label(&self, id: &ObjectId) -> Option<String>;

    fn placement(&self, id: &ObjectId) -> Option<Placement>;

    fn set_placement(&mut self, id: &ObjectId, placement: Placement) -> Result<(), SceneError>;
}

/// A scene plus the engine's metadata about its objects.
#[derive(Debug, Default)]
pub struct Workspace<S> {
    pub scene: S,
    pub tags: MetadataTable,
}

/// The single lock shared by user-initiated syncs and live updates.
pub type SharedWorkspace<S> = Arc<Mutex<Workspace<S>>>;

impl<S: Scene> Workspace<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene,
            tags: MetadataTable::default(),
        }
    }

    pub fn into_shared(self) -> SharedWorkspace<S> {
        Arc::new(Mutex::new(self))
    }

    /// Apply an update to every object tagged with `reference_path`.
    /// Returns how many objects changed; zero means nothing is imported yet.
    /// Tagged objects that no longer exist in the scene are skipped.
    pub fn apply_update(
        &mut self,
        reference_path: &str,
        update: &PlacementUpdate,
    ) -> Result<usize, SceneError> {
        let mut applied = 0;
        for id in self.tags.find_by_reference(reference_path) {
            let Some(mut placement) = self.scene.placement(&id) else {
                tracing::warn!(object = %id, reference = %reference_path, "Tagged object missing from scene, skipped");
                continue;
            };
            update.apply_to(&mut placement);
            self.scene.set_placement(&id, placement)?;
            if let Some(meta) = self.tags.get_mut(&id) {
                meta.last_sync = Utc::now();
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Drop objects and their tags, e.g. when an import batch is rolled back.
    pub fn discard(&mut self, ids: &[ObjectId]) {
        for id in ids {
            if let Err(e) = self.scene.remove_object(id) {
                tracing::warn!(object = %id, error = %e, "Failed to remove object during rollback");
            }
            self.tags.untag(id);
        }
    }
}
