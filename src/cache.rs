//! Local State Cache
//!
//! Plain-text, one-value-per-file records under the session-local directory:
//! the current and last project link, current and secondary asset links, the
//! current assembly, and one permission record per link kind and slot.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const PROJECT_LINK: &str = "project_link.txt";
const LAST_PROJECT_LINK: &str = "last_project_link.txt";
const ASSEMBLY_LINK: &str = "assembly_link.txt";
const PROJECT_PERMISSION: &str = "project_permission.txt";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("State cache IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Serialize for CacheError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Which link a permission record or link entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    AssetUsd,
    AssetStp,
    Project,
}

impl LinkKind {
    fn stem(self) -> &'static str {
        match self {
            LinkKind::AssetUsd => "usd",
            LinkKind::AssetStp => "stp",
            LinkKind::Project => "project",
        }
    }
}

/// Asset links come in a primary and a secondary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Slot {
    #[default]
    Primary,
    Secondary,
}

impl Slot {
    fn prefix(self) -> &'static str {
        match self {
            Slot::Primary => "",
            Slot::Secondary => "secondary_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionStatus {
    OkAccess,
    NoAccess,
    Unknown,
}

impl PermissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionStatus::OkAccess => "OK_ACCESS",
            PermissionStatus::NoAccess => "NO_ACCESS",
            PermissionStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "OK_ACCESS" => PermissionStatus::OkAccess,
            "NO_ACCESS" => PermissionStatus::NoAccess,
            _ => PermissionStatus::Unknown,
        }
    }
}

/// Persisted key/value store owned by one local session.
#[derive(Debug, Clone)]
pub struct StateCache {
    dir: PathBuf,
}

impl StateCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn project_link(&self) -> Result<Option<String>, CacheError> {
        self.read(PROJECT_LINK)
    }

    pub fn last_project_link(&self) -> Result<Option<String>, CacheError> {
        self.read(LAST_PROJECT_LINK)
    }

    /// Store the current project; it also becomes the last project link.
    pub fn set_project_link(&self, link: &str) -> Result<(), CacheError> {
        if self.project_link()?.as_deref() != Some(link) {
            self.remove(PROJECT_PERMISSION)?;
        }
        self.write(PROJECT_LINK, link)?;
        self.write(LAST_PROJECT_LINK, link)
    }

    pub fn assembly_link(&self) -> Result<Option<String>, CacheError> {
        self.read(ASSEMBLY_LINK)
    }

    pub fn set_assembly_link(&self, link: &str) -> Result<(), CacheError> {
        self.write(ASSEMBLY_LINK, link)
    }

    pub fn asset_link(&self, kind: LinkKind, slot: Slot) -> Result<Option<String>, CacheError> {
        self.read(&link_key(kind, slot))
    }

    /// Store an asset link. A changed link drops the permission record that
    /// belonged to the previous one.
    pub fn set_asset_link(&self, kind: LinkKind, slot: Slot, link: &str) -> Result<(), CacheError> {
        if self.asset_link(kind, slot)?.as_deref() != Some(link) {
            self.remove(&permission_key(kind, slot))?;
        }
        self.write(&link_key(kind, slot), link)
    }

    pub fn permission(&self, kind: LinkKind, slot: Slot) -> Result<PermissionStatus, CacheError> {
        Ok(self
            .read(&permission_key(kind, slot))?
            .map(|text| PermissionStatus::parse(&text))
            .unwrap_or(PermissionStatus::Unknown))
    }

    pub fn set_permission(
        &self,
        kind: LinkKind,
        slot: Slot,
        status: PermissionStatus,
    ) -> Result<(), CacheError> {
        match status {
            PermissionStatus::Unknown => self.clear_permission(kind, slot),
            _ => self.write(&permission_key(kind, slot), status.as_str()),
        }
    }

    pub fn clear_permission(&self, kind: LinkKind, slot: Slot) -> Result<(), CacheError> {
        self.remove(&permission_key(kind, slot))
    }

    /// Remove all asset-scoped entries and the current assembly.
    pub fn clear_assets(&self) -> Result<(), CacheError> {
        for kind in [LinkKind::AssetUsd, LinkKind::AssetStp] {
            for slot in [Slot::Primary, Slot::Secondary] {
                self.remove(&link_key(kind, slot))?;
                self.remove(&permission_key(kind, slot))?;
            }
        }
        self.remove(ASSEMBLY_LINK)
    }

    /// Remove everything except the last project link.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.clear_assets()?;
        self.remove(PROJECT_LINK)?;
        self.remove(PROJECT_PERMISSION)?;
        debug!(dir = %self.dir.display(), "State cache cleared");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.dir.join(key);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let value = text.lines().next().unwrap_or("").trim().to_string();
                Ok((!value.is_empty()).then_some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.dir.join(key);
        atomic_write(&path, value.as_bytes()).map_err(io_error(&path))
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.dir.join(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

fn link_key(kind: LinkKind, slot: Slot) -> String {
    match kind {
        LinkKind::Project => PROJECT_LINK.to_string(),
        _ => format!("{}{}_link.txt", slot.prefix(), kind.stem()),
    }
}

fn permission_key(kind: LinkKind, slot: Slot) -> String {
    match kind {
        LinkKind::Project => PROJECT_PERMISSION.to_string(),
        _ => format!("{}{}_permission.txt", slot.prefix(), kind.stem()),
    }
}

/// Atomic write: write to a .tmp sibling then rename into place.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, StateCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = StateCache::open(dir.path().join("session_local")).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_values_survive_reopen() {
        let (_dir, cache) = cache();
        cache.set_project_link("omniverse://h/Projects/demo").unwrap();
        cache
            .set_asset_link(LinkKind::AssetUsd, Slot::Primary, "omniverse://h/Projects/demo/assets/A/A.usda")
            .unwrap();
        cache
            .set_permission(LinkKind::AssetUsd, Slot::Primary, PermissionStatus::OkAccess)
            .unwrap();

        let reopened = StateCache::open(cache.dir()).unwrap();
        assert_eq!(
            reopened.project_link().unwrap().as_deref(),
            Some("omniverse://h/Projects/demo")
        );
        assert_eq!(
            reopened.permission(LinkKind::AssetUsd, Slot::Primary).unwrap(),
            PermissionStatus::OkAccess
        );
        assert_eq!(
            reopened.permission(LinkKind::AssetUsd, Slot::Secondary).unwrap(),
            PermissionStatus::Unknown
        );
    }

    #[test]
    fn test_clear_keeps_last_project_link() {
        let (_dir, cache) = cache();
        cache.set_project_link("omniverse://h/Projects/demo").unwrap();
        cache.set_asset_link(LinkKind::AssetStp, Slot::Secondary, "x.stp").unwrap();
        cache.set_assembly_link("omniverse://h/Projects/demo/assembly/a.usda").unwrap();
        cache
            .set_permission(LinkKind::Project, Slot::Primary, PermissionStatus::OkAccess)
            .unwrap();

        cache.clear().unwrap();

        assert_eq!(cache.project_link().unwrap(), None);
        assert_eq!(cache.assembly_link().unwrap(), None);
        assert_eq!(cache.asset_link(LinkKind::AssetStp, Slot::Secondary).unwrap(), None);
        assert_eq!(
            cache.permission(LinkKind::Project, Slot::Primary).unwrap(),
            PermissionStatus::Unknown
        );
        assert_eq!(
            cache.last_project_link().unwrap().as_deref(),
            Some("omniverse://h/Projects/demo")
        );
    }

    #[test]
    fn test_changing_link_drops_its_permission() {
        let (_dir, cache) = cache();
        cache.set_asset_link(LinkKind::AssetUsd, Slot::Primary, "a.usda").unwrap();
        cache
            .set_permission(LinkKind::AssetUsd, Slot::Primary, PermissionStatus::NoAccess)
            .unwrap();

        cache.set_asset_link(LinkKind::AssetUsd, Slot::Primary, "a.usda").unwrap();
        assert_eq!(
            cache.permission(LinkKind::AssetUsd, Slot::Primary).unwrap(),
            PermissionStatus::NoAccess
        );

        cache.set_asset_link(LinkKind::AssetUsd, Slot::Primary, "b.usda").unwrap();
        assert_eq!(
            cache.permission(LinkKind::AssetUsd, Slot::Primary).unwrap(),
            PermissionStatus::Unknown
        );
    }

    #[test]
    fn test_one_value_per_file() {
        let (_dir, cache) = cache();
        cache
            .set_permission(LinkKind::AssetStp, Slot::Secondary, PermissionStatus::NoAccess)
            .unwrap();
        let text = fs::read_to_string(cache.dir().join("secondary_stp_permission.txt")).unwrap();
        assert_eq!(text, "NO_ACCESS");
    }
}
