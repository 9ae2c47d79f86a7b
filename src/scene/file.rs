//! JSON-file scene used by the command-line binary.
//!
//! Layout under the workspace root:
//!   workspace.json      objects, placements and sync metadata
//!   objects/<id>.stp    geometry copied in on import

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{MetadataTable, ObjectId, Placement, Scene, SceneError, Workspace};
use crate::cache::atomic_write;

const WORKSPACE_FILE: &str = "workspace.json";
const OBJECTS_DIR: &str = "objects";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileObject {
    pub label: String,
    pub placement: Placement,
    /// Geometry file name under `objects/`.
    pub geometry: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkspaceDocument {
    #[serde(default)]
    objects: BTreeMap<ObjectId, FileObject>,
    #[serde(default)]
    tags: MetadataTable,
}

#[derive(Debug)]
pub struct FileScene {
    root: PathBuf,
    objects: BTreeMap<ObjectId, FileObject>,
}

impl FileScene {
    /// Load the workspace at `root`, or start an empty one.
    pub fn load(root: impl Into<PathBuf>) -> Result<Workspace<FileScene>, SceneError> {
        let root = root.into();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        let path = root.join(WORKSPACE_FILE);
        let document: WorkspaceDocument = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            WorkspaceDocument::default()
        };
        debug!(path = %path.display(), objects = document.objects.len(), "Loaded workspace");
        Ok(Workspace {
            scene: FileScene {
                root,
                objects: document.objects,
            },
            tags: document.tags,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn objects(&self) -> impl Iterator<Item = (&ObjectId, &FileObject)> {
        self.objects.iter()
    }

    pub fn get(&self, id: &ObjectId) -> Option<&FileObject> {
        self.objects.get(id)
    }

    pub fn geometry_path(&self, object: &FileObject) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(&object.geometry)
    }

    fn object(&self, id: &ObjectId) -> Result<&FileObject, SceneError> {
        self.objects
            .get(id)
            .ok_or_else(|| SceneError::UnknownObject(id.clone()))
    }
}

impl Workspace<FileScene> {
    /// Persist objects and tags atomically.
    pub fn save(&self) -> Result<(), SceneError> {
        let document = WorkspaceDocumentRef {
            objects: &self.scene.objects,
            tags: &self.tags,
        };
        let content = serde_json::to_string_pretty(&document)?;
        atomic_write(&self.scene.root.join(WORKSPACE_FILE), content.as_bytes())?;
        Ok(())
    }
}

#[derive(Serialize)]
struct WorkspaceDocumentRef<'a> {
    objects: &'a BTreeMap<ObjectId, FileObject>,
    tags: &'a MetadataTable,
}

impl Scene for FileScene {
    fn import_exchange_file(&mut self, path: &Path, label: &str) -> Result<ObjectId, SceneError> {
        let id = ObjectId::new();
        let geometry = format!("{}.stp", id);
        fs::copy(path, self.root.join(OBJECTS_DIR).join(&geometry)).map_err(|e| {
            SceneError::Import {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        self.objects.insert(
            id.clone(),
            FileObject {
                label: label.to_string(),
                placement: Placement::default(),
                geometry,
            },
        );
        debug!(object = %id, label = %label, "Imported exchange file");
        Ok(id)
    }

    fn export_exchange_file(&self, id: &ObjectId, path: &Path) -> Result<(), SceneError> {
        let object = self.object(id)?;
        fs::copy(self.geometry_path(object), path).map_err(|e| SceneError::Export {
            id: id.clone(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn remove_object(&mut self, id: &ObjectId) -> Result<(), SceneError> {
        let object = self
            .objects
            .remove(id)
            .ok_or_else(|| SceneError::UnknownObject(id.clone()))?;
        let geometry = self.root.join(OBJECTS_DIR).join(&object.geometry);
        if geometry.exists() {
            fs::remove_file(geometry)?;
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SyncMetadata;
    use crate::token::Token;

    #[test]
    fn test_import_export_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bracket.stp");
        fs::write(&source, b"ISO-10303-21; bracket").unwrap();

        let mut workspace = FileScene::load(dir.path().join("ws")).unwrap();
        let id = workspace.scene.import_exchange_file(&source, "Bracket").unwrap();
        workspace
            .scene
            .set_placement(
                &id,
                Placement {
                    translation: [1.0, -2.0, 3.0],
                    ..Placement::default()
                },
            )
            .unwrap();
        workspace.tags.tag(
            id.clone(),
            SyncMetadata::new("p/assets/Bracket/Bracket.usda", "p/assets/Bracket/Bracket.stp", Token::generate()),
        );
        workspace.save().unwrap();

        let reloaded = FileScene::load(dir.path().join("ws")).unwrap();
        assert_eq!(reloaded.scene.label(&id).as_deref(), Some("Bracket"));
        assert_eq!(reloaded.scene.placement(&id).unwrap().translation, [1.0, -2.0, 3.0]);
        assert_eq!(reloaded.tags.len(), 1);

        let out = dir.path().join("out.stp");
        reloaded.scene.export_exchange_file(&id, &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"ISO-10303-21; bracket");
    }

    #[test]
    fn test_remove_object_deletes_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.stp");
        fs::write(&source, b"").unwrap();

        let mut workspace = FileScene::load(dir.path()).unwrap();
        let id = workspace.scene.import_exchange_file(&source, "A").unwrap();
        let geometry = workspace.scene.geometry_path(workspace.scene.get(&id).unwrap());
        assert!(geometry.exists());

        workspace.scene.remove_object(&id).unwrap();
        assert!(!geometry.exists());
        assert!(matches!(
            workspace.scene.remove_object(&id),
            Err(SceneError::UnknownObject(_))
        ));
    }
}
