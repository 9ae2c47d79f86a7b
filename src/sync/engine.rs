use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::SyncError;
use crate::bridge::{flags, CommandRequest, ErrorSentinel, Operation, Response, Transport};
use crate::cache::{CacheError, LinkKind, PermissionStatus, Slot, StateCache};
use crate::checkpoint::{CheckpointTarget, Checkpointer};
use crate::codec::{axis, decode_records, encode_srt_argument, ComponentRecord, Vec3};
use crate::live::{LiveLauncher, LiveSession, LiveTarget};
use crate::names::{clean_url, component_name, file_name, validate_name, validate_project_link};
use crate::scene::{ObjectId, Placement, PlacementUpdate, Scene, SharedWorkspace, SyncMetadata};
use crate::token::Token;

/// Exact bytes of an asset exchange file that has never been uploaded.
pub const PLACEHOLDER_CONTENT: &[u8] = b"EMPTY_FILE";

const ASSET_LIST_USD: &str = "usdlist.txt";
const ASSET_LIST_STP: &str = "stplist.txt";
const ASSEMBLY_IMPORTED: &str = "Imported assembly into CAD";

pub fn is_placeholder(bytes: &[u8]) -> bool {
    bytes == PLACEHOLDER_CONTENT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    #[default]
    Disconnected,
    ProjectSelected,
    /// An assembly is identified and persisted; sync operations are allowed.
    Ready,
}

/// Explicit session state owned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub state: SyncState,
    pub project_url: Option<String>,
    pub assembly_url: Option<String>,
}

/// The two remote files of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLinks {
    pub name: String,
    pub usd: String,
    pub stp: String,
}

impl AssetLinks {
    pub fn new(usd: impl Into<String>, stp: impl Into<String>) -> Self {
        let usd = usd.into();
        Self {
            name: component_name(&usd),
            usd,
            stp: stp.into(),
        }
    }
}

/// Outcome of one auth check; already written to the permission record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheck {
    pub link: String,
    pub kind: LinkKind,
    pub status: PermissionStatus,
    #[serde(skip)]
    pub sentinel: Option<ErrorSentinel>,
    pub reason: Option<String>,
}

impl AccessCheck {
    pub fn into_result(self, operation: &'static str) -> Result<Self, SyncError> {
        match (self.status, self.sentinel) {
            (PermissionStatus::OkAccess, _) => Ok(self),
            (_, Some(sentinel)) => Err(SyncError::from_sentinel(
                operation,
                &self.link,
                sentinel,
                self.reason.as_deref().unwrap_or(""),
            )),
            _ => Err(SyncError::PermissionDenied {
                link: self.link,
                reason: "access check did not grant access".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAccess {
    pub links: AssetLinks,
    pub usd: PermissionStatus,
    pub stp: PermissionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub token: Token,
    pub components: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub token: Token,
    pub applied: usize,
    /// References with no local object yet.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedAssembly {
    pub url: String,
    pub token: Token,
    pub objects: Vec<ObjectId>,
    /// Components whose asset has no geometry yet.
    pub placeholders: Vec<String>,
}

pub struct SyncEngine<S: Scene> {
    transport: Arc<dyn Transport>,
    checkpointer: Checkpointer,
    cache: StateCache,
    staging_dir: PathBuf,
    workspace: SharedWorkspace<S>,
    session: Session,
}

impl<S: Scene + 'static> SyncEngine<S> {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: StateCache,
        staging_dir: impl Into<PathBuf>,
        workspace: SharedWorkspace<S>,
    ) -> Self {
        Self {
            checkpointer: Checkpointer::new(transport.clone()),
            transport,
            cache,
            staging_dir: staging_dir.into(),
            workspace,
            session: Session::default(),
        }
    }

    /// Rebuild the session from the state cache of a previous run.
    pub fn restore(
        transport: Arc<dyn Transport>,
        cache: StateCache,
        staging_dir: impl Into<PathBuf>,
        workspace: SharedWorkspace<S>,
    ) -> Result<Self, SyncError> {
        let mut engine = Self::new(transport, cache, staging_dir, workspace);
        let project = engine.cache.project_link()?;
        let granted = engine.cache.permission(LinkKind::Project, Slot::Primary)?
            == PermissionStatus::OkAccess;
        if let (Some(project), true) = (project, granted) {
            engine.session.project_url = Some(project);
            engine.session.state = SyncState::ProjectSelected;
            if let Some(assembly) = engine.cache.assembly_link()? {
                engine.session.assembly_url = Some(assembly);
                engine.session.state = SyncState::Ready;
            }
        }
        debug!(state = ?engine.session.state, "Session restored");
        Ok(engine)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SyncState {
        self.session.state
    }

    pub fn workspace(&self) -> SharedWorkspace<S> {
        self.workspace.clone()
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    // ---- project ----

    /// Auth-check a link and record the result for its kind and slot.
    pub fn check_access(
        &self,
        link: &str,
        kind: LinkKind,
        slot: Slot,
    ) -> Result<AccessCheck, SyncError> {
        let operation = match kind {
            LinkKind::Project => Operation::AuthProject,
            _ => Operation::Auth,
        };
        let request = CommandRequest::new(operation).with_url(link);
        let response = match self.transport.invoke(&request) {
            Ok(response) => response,
            Err(e) => {
                self.cache.clear_permission(kind, slot)?;
                return Err(e.into());
            }
        };

        let denial = response.sentinels().into_iter().find(|(s, _)| {
            matches!(
                s,
                ErrorSentinel::NoPermission | ErrorSentinel::NotFound | ErrorSentinel::NoAuth
            )
        });
        let check = match denial {
            Some((sentinel, line)) => AccessCheck {
                link: link.to_string(),
                kind,
                status: PermissionStatus::NoAccess,
                sentinel: Some(sentinel),
                reason: Some(line.trim().to_string()),
            },
            None if !response.exit.success => {
                self.cache.clear_permission(kind, slot)?;
                return Err(exit_failure(operation, &response));
            }
            None => AccessCheck {
                link: link.to_string(),
                kind,
                status: PermissionStatus::OkAccess,
                sentinel: None,
                reason: None,
            },
        };
        self.cache.set_permission(kind, slot, check.status)?;
        debug!(link = %link, status = check.status.as_str(), "Access checked");
        Ok(check)
    }

    /// Select a project. Connecting while connected starts from a clean session.
    pub fn connect_project(&mut self, link: &str) -> Result<String, SyncError> {
        let project = validate_project_link(link)?;
        if self.session.state != SyncState::Disconnected {
            info!(from = ?self.session.project_url, to = %project, "Switching project");
            self.disconnect()?;
        }

        let check = self.check_access(&project, LinkKind::Project, Slot::Primary)?;
        if let Err(e) = check.into_result("connect") {
            self.cache.clear_permission(LinkKind::Project, Slot::Primary)?;
            return Err(e);
        }

        self.cache.set_project_link(&project)?;
        self.cache
            .set_permission(LinkKind::Project, Slot::Primary, PermissionStatus::OkAccess)?;
        self.session = Session {
            state: SyncState::ProjectSelected,
            project_url: Some(project.clone()),
            assembly_url: None,
        };
        info!(project = %project, "Connected to project");
        Ok(project)
    }

    /// Connect again to the last project of a previous session.
    pub fn reconnect(&mut self) -> Result<String, SyncError> {
        let last = self
            .cache
            .last_project_link()?
            .ok_or_else(|| SyncError::InvalidLink("no previous project to reconnect to".to_string()))?;
        self.connect_project(&last)
    }

    pub fn disconnect(&mut self) -> Result<(), SyncError> {
        self.cache.clear()?;
        self.clear_staging();
        self.session = Session::default();
        info!("Disconnected");
        Ok(())
    }

    pub fn create_project(&self, host: &str, name: &str, public: bool) -> Result<String, SyncError> {
        validate_name("project", name)?;
        let host = host.trim();
        if host.is_empty() || host.contains('/') {
            return Err(SyncError::InvalidLink(format!("invalid host name '{}'", host)));
        }

        let mut request = CommandRequest::new(Operation::CreateProject)
            .arg(flags::PROJECT_NAME, name)
            .arg(flags::HOST_NAME, host);
        if public {
            request = request.switch(flags::MAKE_PUBLIC);
        }
        let response = self.transport.invoke(&request)?;

        if let Some(line) = response.lines().find(|line| is_rejection(line)) {
            return Err(SyncError::RemoteRejected {
                operation: "create project",
                message: line.to_string(),
            });
        }
        if !response.exit.success {
            return Err(exit_failure(Operation::CreateProject, &response));
        }
        let url = response
            .lines()
            .filter_map(url_token)
            .next()
            .map(clean_url)
            .ok_or_else(|| SyncError::RemoteRejected {
                operation: "create project",
                message: "no project URL was reported".to_string(),
            })?;
        info!(project = %url, "Project created");
        Ok(url)
    }

    // ---- assets ----

    pub fn create_asset(&self, name: &str) -> Result<AssetAccess, SyncError> {
        validate_name("asset", name)?;
        let project = self.require_project()?.to_string();
        let token = Token::generate();

        let request = CommandRequest::new(Operation::CreateAsset)
            .with_url(&project)
            .with_token(Some(&token))
            .arg(flags::ASSET_NAME, name);
        let response = self.run("create asset", &project, &request)?;

        let usd = response.lines().find(|line| line.contains(".usd"));
        let stp = response.lines().find(|line| line.contains(".stp"));
        let (Some(usd), Some(stp)) = (usd, stp) else {
            return Err(SyncError::RemoteRejected {
                operation: "create asset",
                message: format!("no asset links were reported for '{}'", name),
            });
        };
        let links = AssetLinks::new(clean_url(usd), clean_url(stp));
        info!(asset = %links.name, token = %token, "Asset created");
        self.select_asset(links, Slot::Primary)
    }

    /// Assets of the current project, paired by base name.
    pub fn list_assets(&self) -> Result<Vec<AssetLinks>, SyncError> {
        let project = self.require_project()?.to_string();
        self.ensure_staging()?;
        let usd_list = self.staging_dir.join(ASSET_LIST_USD);
        let stp_list = self.staging_dir.join(ASSET_LIST_STP);
        for path in [&usd_list, &stp_list] {
            remove_if_exists(path)?;
        }

        let request = CommandRequest::new(Operation::FindAssetFiles)
            .with_url(&project)
            .arg(flags::LOCAL_DIRECTORY, self.staging_dir.display().to_string());
        let response = self.run("list assets", &project, &request)?;

        let usd_links = read_list(&usd_list)?
            .unwrap_or_else(|| lines_with(&response, ".usd"));
        let stp_links = read_list(&stp_list)?
            .unwrap_or_else(|| lines_with(&response, ".stp"));

        let assets: Vec<AssetLinks> = usd_links
            .iter()
            .filter_map(|usd| {
                let name = component_name(usd);
                match stp_links.iter().find(|stp| component_name(stp) == name) {
                    Some(stp) => Some(AssetLinks::new(usd.clone(), stp.clone())),
                    None => {
                        debug!(usd = %usd, "Descriptor without exchange file, skipped");
                        None
                    }
                }
            })
            .collect();
        Ok(assets)
    }

    /// Make an asset current (or secondary) and refresh its permission records.
    pub fn select_asset(&self, links: AssetLinks, slot: Slot) -> Result<AssetAccess, SyncError> {
        self.require_project()?;
        self.cache.set_asset_link(LinkKind::AssetUsd, slot, &links.usd)?;
        self.cache.set_asset_link(LinkKind::AssetStp, slot, &links.stp)?;
        let usd = self.check_access(&links.usd, LinkKind::AssetUsd, slot)?;
        let stp = self.check_access(&links.stp, LinkKind::AssetStp, slot)?;
        info!(asset = %links.name, usd = usd.status.as_str(), stp = stp.status.as_str(), "Asset selected");
        Ok(AssetAccess {
            links,
            usd: usd.status,
            stp: stp.status,
        })
    }

    pub fn current_asset(&self, slot: Slot) -> Result<AssetLinks, SyncError> {
        let usd = self.cache.asset_link(LinkKind::AssetUsd, slot)?;
        let stp = self.cache.asset_link(LinkKind::AssetStp, slot)?;
        match (usd, stp) {
            (Some(usd), Some(stp)) => Ok(AssetLinks::new(usd, stp)),
            _ => Err(SyncError::NoAsset),
        }
    }

    /// Upload an object's geometry to the current asset and tag the object.
    /// With a `message`, every uploaded file also gets a checkpoint under the
    /// push token.
    pub fn push_asset(&self, id: &ObjectId, message: Option<&str>) -> Result<PushReport, SyncError> {
        self.require_project()?;
        let links = self.current_asset(Slot::Primary)?;
        self.permission_gate(&links.usd, LinkKind::AssetUsd, Slot::Primary)?;
        self.permission_gate(&links.stp, LinkKind::AssetStp, Slot::Primary)?;

        let token = Token::generate();
        self.ensure_staging()?;
        let upload = self.staging_dir.join(token.upload_file_name("stp"));
        let mesh = self.staging_dir.join(token.upload_file_name("stl"));
        let has_mesh = {
            let workspace = self.workspace.lock();
            workspace.scene.export_exchange_file(id, &upload)?;
            workspace.scene.export_mesh(id, &mesh)?
        };

        let result = self.upload_asset(&links, &token, &upload, has_mesh);
        for path in [&upload, &mesh] {
            let _ = fs::remove_file(path);
        }
        result?;

        if let Some(message) = message {
            self.checkpointer.checkpoint(
                CheckpointTarget::ExchangeFile,
                &links.stp,
                Some(&token),
                message,
            );
            if has_mesh {
                self.checkpointer
                    .checkpoint(CheckpointTarget::Descriptor, &links.usd, Some(&token), message);
            }
        }

        self.workspace.lock().tags.tag(
            id.clone(),
            SyncMetadata::new(&links.usd, &links.stp, token.clone()),
        );
        info!(object = %id, asset = %links.name, token = %token, "Asset pushed");
        Ok(PushReport {
            token,
            components: 1,
        })
    }

    fn upload_asset(
        &self,
        links: &AssetLinks,
        token: &Token,
        upload: &Path,
        has_mesh: bool,
    ) -> Result<(), SyncError> {
        let request = CommandRequest::new(Operation::PushNonUsd)
            .with_url(&links.stp)
            .with_token(Some(token))
            .arg(flags::LOCAL_NON_USD_FILENAME, upload.display().to_string());
        self.run("push exchange file", &links.stp, &request)?;

        if has_mesh {
            let request = CommandRequest::new(Operation::PushUsd)
                .with_url(&links.usd)
                .with_token(Some(token))
                .arg(flags::LOCAL_DIRECTORY, self.staging_dir.display().to_string());
            self.run("push descriptor", &links.usd, &request)?;
        }
        Ok(())
    }

    /// Download the current asset's exchange file into a new tagged object.
    pub fn pull_asset(&self) -> Result<ObjectId, SyncError> {
        self.require_project()?;
        let links = self.current_asset(Slot::Primary)?;
        self.permission_gate(&links.stp, LinkKind::AssetStp, Slot::Primary)?;
        let token = Token::generate();
        self.pull_exchange(&links.usd, &links.stp, &token)
    }

    fn pull_exchange(&self, usd: &str, stp: &str, token: &Token) -> Result<ObjectId, SyncError> {
        self.ensure_staging()?;
        let download = self.staging_dir.join(token.download_file_name("stp"));
        remove_if_exists(&download)?;

        let request = CommandRequest::new(Operation::PullNonUsd)
            .with_url(stp)
            .with_token(Some(token))
            .arg(flags::LOCAL_NON_USD_FILENAME, download.display().to_string());
        self.run("pull exchange file", stp, &request)?;

        let bytes = match fs::read(&download) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SyncError::RemoteUnavailable(format!(
                    "pull of {} produced no file",
                    stp
                )));
            }
            Err(e) => return Err(staging_error(&download, e)),
        };
        if is_placeholder(&bytes) {
            let _ = fs::remove_file(&download);
            info!(asset = %stp, "Asset is a placeholder, nothing to import");
            return Err(SyncError::PlaceholderAsset(stp.to_string()));
        }

        let label = component_name(stp);
        let id = {
            let mut workspace = self.workspace.lock();
            let id = workspace.scene.import_exchange_file(&download, &label)?;
            workspace
                .tags
                .tag(id.clone(), SyncMetadata::new(usd, stp, token.clone()));
            id
        };
        let _ = fs::remove_file(&download);
        info!(object = %id, asset = %stp, token = %token, "Asset pulled");
        Ok(id)
    }

    /// Re-derive an unknown permission record; refuse on a cached denial.
    fn permission_gate(&self, link: &str, kind: LinkKind, slot: Slot) -> Result<(), SyncError> {
        match self.cache.permission(kind, slot)? {
            PermissionStatus::OkAccess => Ok(()),
            PermissionStatus::NoAccess => Err(SyncError::PermissionDenied {
                link: link.to_string(),
                reason: "the cached permission record is NO_ACCESS".to_string(),
            }),
            PermissionStatus::Unknown => self
                .check_access(link, kind, slot)?
                .into_result("permission check")
                .map(|_| ()),
        }
    }

    // ---- assemblies ----

    /// Create an assembly from pushed objects. An empty list lets the remote
    /// side include every asset of the project.
    pub fn create_assembly(&mut self, name: &str, objects: &[ObjectId]) -> Result<String, SyncError> {
        validate_name("assembly", name)?;
        let project = self.require_project()?.to_string();

        let mut usd_links: Vec<String> = Vec::new();
        let mut stp_links: Vec<String> = Vec::new();
        {
            let workspace = self.workspace.lock();
            for id in objects {
                let meta = workspace
                    .tags
                    .get(id)
                    .ok_or_else(|| SyncError::UntrackedObject(id.clone()))?;
                if !usd_links.contains(&meta.reference_path) {
                    usd_links.push(meta.reference_path.clone());
                    stp_links.push(meta.exchange_path.clone());
                }
            }
        }

        let token = Token::generate();
        let mut request = CommandRequest::new(Operation::CreateAssembly)
            .with_url(&project)
            .with_token(Some(&token))
            .arg(flags::ASSEMBLY_NAME, name);
        if !usd_links.is_empty() {
            request = request
                .args(flags::ASSET_USD_LINKS, usd_links.iter().cloned())
                .args(flags::ASSET_STP_LINKS, stp_links.iter().cloned());
        }
        let response = self.run("create assembly", &project, &request)?;

        let marker = format!("{}/assembly", project);
        let url = response
            .lines()
            .find(|line| line.contains(&marker) && line.contains(".usd"))
            .map(clean_url)
            .ok_or_else(|| SyncError::RemoteRejected {
                operation: "create assembly",
                message: format!("no assembly URL was reported for '{}'", name),
            })?;

        let message = format!("Add asset to assembly in {}", file_name(&url));
        for usd in &usd_links {
            self.checkpointer
                .checkpoint(CheckpointTarget::Descriptor, usd, Some(&token), &message);
        }

        self.mark_ready(&url)?;
        info!(assembly = %url, components = usd_links.len(), token = %token, "Assembly created");
        Ok(url)
    }

    pub fn list_assemblies(&self) -> Result<Vec<String>, SyncError> {
        let project = self.require_project()?.to_string();
        let request = CommandRequest::new(Operation::FindAssemblies).with_url(&project);
        let response = self.run("list assemblies", &project, &request)?;

        let mut assemblies: Vec<String> = Vec::new();
        for line in response.lines() {
            if line.contains("/assembly") && line.contains(".usd") {
                let url = clean_url(line);
                if !assemblies.contains(&url) {
                    assemblies.push(url);
                }
            }
        }
        Ok(assemblies)
    }

    /// Import every component of an existing assembly and place it.
    /// A failing component rolls back every object imported so far.
    pub fn open_assembly(&mut self, url: &str) -> Result<OpenedAssembly, SyncError> {
        self.require_project()?;
        let url = clean_url(url.trim());
        if !url.contains("/assembly") {
            return Err(SyncError::InvalidLink(format!(
                "'{}' is not an assembly link",
                url
            )));
        }

        let token = Token::generate();
        let records = self.fetch_records(&url, &token)?;

        let mut objects = Vec::new();
        let mut placeholders = Vec::new();
        if let Err(e) = self.import_components(&records, &token, &mut objects, &mut placeholders) {
            warn!(assembly = %url, error = %e, imported = objects.len(), "Assembly import failed, rolling back");
            self.workspace.lock().discard(&objects);
            return Err(e);
        }

        self.checkpointer.checkpoint(
            CheckpointTarget::Descriptor,
            &url,
            Some(&token),
            ASSEMBLY_IMPORTED,
        );
        if let Err(e) = self.mark_ready(&url) {
            self.workspace.lock().discard(&objects);
            return Err(e);
        }
        info!(
            assembly = %url,
            objects = objects.len(),
            placeholders = placeholders.len(),
            "Assembly opened"
        );
        Ok(OpenedAssembly {
            url,
            token,
            objects,
            placeholders,
        })
    }

    fn import_components(
        &self,
        records: &[ComponentRecord],
        token: &Token,
        objects: &mut Vec<ObjectId>,
        placeholders: &mut Vec<String>,
    ) -> Result<(), SyncError> {
        for record in records {
            match self.pull_exchange(&record.reference_path, &record.exchange_path, token) {
                Ok(id) => {
                    objects.push(id.clone());
                    let placement = Placement {
                        translation: record.translation,
                        rotation: record.rotation_zyx(),
                        scale: record.scale,
                    };
                    self.workspace.lock().scene.set_placement(&id, placement)?;
                }
                Err(SyncError::PlaceholderAsset(link)) => {
                    warn!(asset = %link, "Component has no geometry yet, skipped");
                    placeholders.push(link);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Send every tagged component's placement in one move call.
    pub fn push_sync(&self) -> Result<PushReport, SyncError> {
        let assembly = self.require_assembly()?.to_string();
        let project = self.require_project()?.to_string();
        let token = Token::generate();

        let mut references = Vec::new();
        let mut translations: Vec<Vec3> = Vec::new();
        let mut rotations: Vec<Vec3> = Vec::new();
        {
            let workspace = self.workspace.lock();
            for (id, meta) in workspace.tags.within_project(&project) {
                let Some(placement) = workspace.scene.placement(id) else {
                    warn!(object = %id, "Tagged object missing from scene, skipped");
                    continue;
                };
                references.push(meta.reference_path.clone());
                translations.push(placement.translation);
                rotations.push(axis::local_to_move_argument(placement.rotation));
            }
        }

        if references.is_empty() {
            info!(assembly = %assembly, "No tagged components to push");
            return Ok(PushReport {
                token,
                components: 0,
            });
        }

        let request = CommandRequest::new(Operation::MoveAssembly)
            .with_url(&assembly)
            .with_token(Some(&token))
            .args(flags::SET_ROT_XYZ, encode_srt_argument(&rotations)?)
            .args(flags::SET_TRANSFORM, encode_srt_argument(&translations)?)
            .args(flags::ASSET_USD_LINKS, references.iter().cloned());
        self.run("move assembly", &assembly, &request)?;

        let mut workspace = self.workspace.lock();
        let synced: Vec<ObjectId> = workspace
            .tags
            .within_project(&project)
            .map(|(id, _)| id.clone())
            .collect();
        for id in synced {
            if let Some(meta) = workspace.tags.get_mut(&id) {
                meta.last_sync = chrono::Utc::now();
            }
        }
        info!(assembly = %assembly, components = references.len(), token = %token, "Placements pushed");
        Ok(PushReport {
            token,
            components: references.len(),
        })
    }

    /// Overwrite local placements from the remote assembly.
    pub fn pull_sync(&self) -> Result<PullReport, SyncError> {
        let assembly = self.require_assembly()?.to_string();
        let token = Token::generate();
        let records = self.fetch_records(&assembly, &token)?;

        let mut applied = 0;
        let mut skipped = Vec::new();
        let mut workspace = self.workspace.lock();
        for record in records {
            let update = PlacementUpdate {
                translation: record.translation,
                rotation: record.rotation_zyx(),
                scale: Some(record.scale),
            };
            match workspace.apply_update(&record.reference_path, &update)? {
                0 => {
                    debug!(reference = %record.reference_path, "No local object for reference");
                    skipped.push(record.reference_path);
                }
                n => applied += n,
            }
        }
        info!(assembly = %assembly, applied, skipped = skipped.len(), "Placements pulled");
        Ok(PullReport {
            token,
            applied,
            skipped,
        })
    }

    fn fetch_records(&self, url: &str, token: &Token) -> Result<Vec<ComponentRecord>, SyncError> {
        let request = CommandRequest::new(Operation::GetPrimReferenceXforms)
            .with_url(url)
            .with_token(Some(token));
        let response = self.run("read assembly", url, &request)?;
        Ok(decode_records(response.lines())?)
    }

    // ---- live ----

    pub fn find_live_sessions(&self, launcher: &LiveLauncher) -> Result<Vec<String>, SyncError> {
        let assembly = self.require_assembly()?;
        Ok(launcher.find_sessions(assembly)?)
    }

    /// Join a live session on the current assembly. Nothing is spawned when
    /// the assembly has no sessions or the name is not among them.
    pub fn start_live(
        &self,
        launcher: &LiveLauncher,
        session_name: &str,
    ) -> Result<LiveSession, SyncError> {
        let assembly = self.require_assembly()?.to_string();
        let project = self.require_project()?.to_string();
        let sessions = launcher.find_sessions(&assembly)?;
        if !sessions.iter().any(|s| s == session_name) {
            return Err(SyncError::UnknownSession {
                session: session_name.to_string(),
                assembly,
            });
        }
        let target = LiveTarget {
            assembly_url: assembly,
            session_name: session_name.to_string(),
            project_url: project,
        };
        Ok(LiveSession::start(
            launcher.program(),
            target,
            self.workspace.clone(),
        )?)
    }

    // ---- helpers ----

    fn require_project(&self) -> Result<&str, SyncError> {
        self.session
            .project_url
            .as_deref()
            .ok_or(SyncError::NotConnected)
    }

    fn require_assembly(&self) -> Result<&str, SyncError> {
        self.require_project()?;
        match (self.session.state, self.session.assembly_url.as_deref()) {
            (SyncState::Ready, Some(url)) => Ok(url),
            _ => Err(SyncError::NoAssembly),
        }
    }

    /// Persist the identified assembly, then move the session to `Ready`.
    /// A failed write leaves the session untouched.
    fn mark_ready(&mut self, assembly: &str) -> Result<(), SyncError> {
        self.cache.set_assembly_link(assembly)?;
        debug!(assembly = %assembly, "Assembly identified");
        self.session.assembly_url = Some(assembly.to_string());
        self.session.state = SyncState::Ready;
        Ok(())
    }

    /// Invoke and turn sentinels and failed exits into errors.
    fn run(
        &self,
        operation: &'static str,
        link: &str,
        request: &CommandRequest,
    ) -> Result<Response, SyncError> {
        let response = self.transport.invoke(request)?;
        if let Some((sentinel, line)) = response.first_sentinel() {
            return Err(SyncError::from_sentinel(operation, link, sentinel, line));
        }
        if !response.exit.success {
            return Err(exit_failure(request.operation, &response));
        }
        Ok(response)
    }

    fn ensure_staging(&self) -> Result<(), SyncError> {
        fs::create_dir_all(&self.staging_dir).map_err(|e| staging_error(&self.staging_dir, e))
    }

    fn clear_staging(&self) {
        let Ok(entries) = fs::read_dir(&self.staging_dir) else {
            return;
        };
        for entry in entries.flatten() {
            if entry.path().is_file() {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

fn exit_failure(operation: Operation, response: &Response) -> SyncError {
    SyncError::RemoteUnavailable(format!(
        "{} exited with status {}{}",
        operation.flag(),
        response
            .exit
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string()),
        response
            .stderr_summary()
            .map(|s| format!(": {}", s))
            .unwrap_or_default()
    ))
}

/// First token of a line that reports a link.
fn url_token(line: &str) -> Option<&str> {
    line.split_whitespace().next().filter(|token| token.contains("://"))
}

/// A sentinel or a leading error marker; lines reporting a link never count.
fn is_rejection(line: &str) -> bool {
    if url_token(line).is_some() {
        return false;
    }
    ErrorSentinel::detect(line).is_some()
        || line
            .trim_start_matches('[')
            .get(..5)
            .is_some_and(|head| head.eq_ignore_ascii_case("error"))
}

fn staging_error(path: &Path, source: std::io::Error) -> SyncError {
    SyncError::Cache(CacheError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn remove_if_exists(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(staging_error(path, e)),
    }
}

fn read_list(path: &Path) -> Result<Option<Vec<String>>, SyncError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(clean_url)
                .collect(),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(staging_error(path, e)),
    }
}

fn lines_with(response: &Response, needle: &str) -> Vec<String> {
    response
        .lines()
        .filter(|line| line.contains("://") && line.contains(needle))
        .map(clean_url)
        .collect()
}
