//! Nucleus Sync CLI
//!
//! Command-line interface for project, asset, assembly and live-session sync
//! against a Nucleus store. Every command prints one JSON document on stdout;
//! logs go to stderr (`RUST_LOG` overrides the default filter).

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use nucleus_sync_lib::{
    parse_vec3, resolve_program, AssetLinks, Config, FileScene, LiveCommand, LiveLauncher,
    ObjectId, Placement, ProcessTransport, Scene, Session, Slot, StateCache, SyncEngine,
    SyncError, SyncMetadata, Transport,
};

type CliResult = Result<String, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "nucleus-sync")]
#[command(about = "Nucleus Sync CLI - asset and assembly sync with a Nucleus store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project connection commands
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Asset commands
    Asset {
        #[command(subcommand)]
        action: AssetAction,
    },
    /// Assembly commands
    Assembly {
        #[command(subcommand)]
        action: AssemblyAction,
    },
    /// Live session commands
    Live {
        #[command(subcommand)]
        action: LiveAction,
    },
    /// Local workspace commands
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Connect to a project link
    Connect {
        /// Project link, e.g. omniverse://host/Projects/demo
        link: String,
    },
    /// Connect to the last project again
    Reconnect,
    /// Forget the current project and all cached links
    Disconnect,
    /// Create a project on a host
    Create {
        /// Nucleus host name
        host: String,
        /// Project name (letters, digits, underscores)
        name: String,
        /// Make the project readable by everyone
        #[arg(long)]
        public: bool,
    },
    /// Show the current session
    Status,
}

#[derive(Subcommand)]
enum AssetAction {
    /// Create an asset in the current project and select it
    Create { name: String },
    /// List the assets of the current project
    List,
    /// Select an asset by its descriptor and exchange-file links
    Select {
        usd: String,
        stp: String,
        /// Store in the secondary slot
        #[arg(long)]
        secondary: bool,
    },
    /// Upload a workspace object to the selected asset
    Push {
        /// Workspace object ID
        object_id: String,
        /// Checkpoint comment for the uploaded files
        #[arg(long)]
        message: Option<String>,
    },
    /// Download the selected asset into the workspace
    Pull,
}

#[derive(Subcommand)]
enum AssemblyAction {
    /// Create an assembly from pushed workspace objects
    Create {
        name: String,
        /// Workspace object IDs (all project assets when omitted)
        objects: Vec<String>,
    },
    /// List the assemblies of the current project
    List,
    /// Import an existing assembly into the workspace
    Open { url: String },
    /// Send local placements to the open assembly
    Push,
    /// Overwrite local placements from the open assembly
    Pull,
}

#[derive(Subcommand)]
enum LiveAction {
    /// List live sessions on the open assembly
    Sessions,
    /// Join a live session; reads `t` (transform test) or `q` (quit) from stdin
    Start { session: String },
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// Import a local exchange file as a new object
    Add {
        path: PathBuf,
        #[arg(short, long)]
        label: Option<String>,
    },
    /// List workspace objects
    List,
    /// Change an object's placement
    Move {
        object_id: String,
        /// Translation as x,y,z
        #[arg(short, long, allow_hyphen_values = true)]
        translation: Option<String>,
        /// Rotation as z,y,x degrees
        #[arg(short, long, allow_hyphen_values = true)]
        rotation: Option<String>,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput<'a> {
    session: &'a Session,
    asset: Option<AssetLinks>,
    local_directory: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UrlOutput {
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ObjectOutput {
    id: ObjectId,
    label: String,
    placement: Placement,
    sync: Option<SyncMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveStopOutput {
    session: String,
    exit_code: Option<i32>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

// ============ Main ============

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nucleus_sync_lib=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = open_engine().and_then(|(config, mut engine)| {
        let output = match cli.command {
            Commands::Project { action } => handle_project(&config, &mut engine, action),
            Commands::Asset { action } => handle_asset(&engine, action),
            Commands::Assembly { action } => handle_assembly(&mut engine, action),
            Commands::Live { action } => handle_live(&config, &engine, action),
            Commands::Workspace { action } => handle_workspace(&engine, action),
        };
        save_workspace(&engine)?;
        output
    });

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: e.to_string() };
            match serde_json::to_string(&error) {
                Ok(json) => println!("{}", json),
                Err(_) => println!(r#"{{"error": "unprintable error"}}"#),
            }
            std::process::exit(1);
        }
    }
}

fn open_engine() -> Result<(Config, SyncEngine<FileScene>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let program = resolve_program(&config.cli_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Remote CLI not resolved; calls will fail until it is installed");
        config.cli_path.clone()
    });
    let transport: Arc<dyn Transport> = Arc::new(ProcessTransport::new(program));
    let cache = StateCache::open(config.local_directory.clone())?;
    let workspace = FileScene::load(config.workspace_dir())?.into_shared();
    let engine = SyncEngine::restore(transport, cache, config.staging_dir(), workspace)?;
    Ok((config, engine))
}

fn save_workspace(engine: &SyncEngine<FileScene>) -> Result<(), Box<dyn std::error::Error>> {
    engine.workspace().lock().save()?;
    Ok(())
}

// ============ Handlers ============

fn handle_project(config: &Config, engine: &mut SyncEngine<FileScene>, action: ProjectAction) -> CliResult {
    match action {
        ProjectAction::Connect { link } => {
            let url = engine.connect_project(&link)?;
            Ok(serde_json::to_string(&UrlOutput { url })?)
        }
        ProjectAction::Reconnect => {
            let url = engine.reconnect()?;
            Ok(serde_json::to_string(&UrlOutput { url })?)
        }
        ProjectAction::Disconnect => {
            engine.disconnect()?;
            Ok(r#"{"status": "disconnected"}"#.to_string())
        }
        ProjectAction::Create { host, name, public } => {
            let url = engine.create_project(&host, &name, public)?;
            Ok(serde_json::to_string(&UrlOutput { url })?)
        }
        ProjectAction::Status => {
            let output = StatusOutput {
                session: engine.session(),
                asset: engine.current_asset(Slot::Primary).ok(),
                local_directory: config.local_directory.display().to_string(),
            };
            Ok(serde_json::to_string(&output)?)
        }
    }
}

fn handle_asset(engine: &SyncEngine<FileScene>, action: AssetAction) -> CliResult {
    match action {
        AssetAction::Create { name } => Ok(serde_json::to_string(&engine.create_asset(&name)?)?),
        AssetAction::List => Ok(serde_json::to_string(&engine.list_assets()?)?),
        AssetAction::Select { usd, stp, secondary } => {
            let slot = if secondary { Slot::Secondary } else { Slot::Primary };
            let access = engine.select_asset(AssetLinks::new(usd, stp), slot)?;
            Ok(serde_json::to_string(&access)?)
        }
        AssetAction::Push { object_id, message } => {
            let report = engine.push_asset(&ObjectId::from_string(object_id), message.as_deref())?;
            Ok(serde_json::to_string(&report)?)
        }
        AssetAction::Pull => {
            let id = engine.pull_asset()?;
            Ok(serde_json::to_string(&describe(engine, &id))?)
        }
    }
}

fn handle_assembly(engine: &mut SyncEngine<FileScene>, action: AssemblyAction) -> CliResult {
    match action {
        AssemblyAction::Create { name, objects } => {
            let ids: Vec<ObjectId> = objects.into_iter().map(ObjectId::from_string).collect();
            let url = engine.create_assembly(&name, &ids)?;
            Ok(serde_json::to_string(&UrlOutput { url })?)
        }
        AssemblyAction::List => Ok(serde_json::to_string(&engine.list_assemblies()?)?),
        AssemblyAction::Open { url } => Ok(serde_json::to_string(&engine.open_assembly(&url)?)?),
        AssemblyAction::Push => Ok(serde_json::to_string(&engine.push_sync()?)?),
        AssemblyAction::Pull => Ok(serde_json::to_string(&engine.pull_sync()?)?),
    }
}

fn handle_live(config: &Config, engine: &SyncEngine<FileScene>, action: LiveAction) -> CliResult {
    let program = resolve_program(&config.live_cli_path)?;
    let launcher = LiveLauncher::new(program);
    match action {
        LiveAction::Sessions => Ok(serde_json::to_string(&engine.find_live_sessions(&launcher)?)?),
        LiveAction::Start { session } => {
            let mut live = engine.start_live(&launcher, &session)?;

            // Events stream as JSON lines until the reader threads finish.
            let printer = live.take_events().map(|events| {
                std::thread::spawn(move || {
                    for event in events {
                        if let Ok(json) = serde_json::to_string(&event) {
                            println!("{}", json);
                        }
                    }
                })
            });

            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                match line.trim() {
                    "t" => live
                        .send(LiveCommand::TransformTest)
                        .map_err(SyncError::from)?,
                    "q" | "quit" => break,
                    "" => {}
                    other => tracing::warn!(input = %other, "Unknown live command; use t or q"),
                }
            }

            let exit_code = live.stop()?;
            if let Some(printer) = printer {
                let _ = printer.join();
            }
            Ok(serde_json::to_string(&LiveStopOutput { session, exit_code })?)
        }
    }
}

fn handle_workspace(engine: &SyncEngine<FileScene>, action: WorkspaceAction) -> CliResult {
    match action {
        WorkspaceAction::Add { path, label } => {
            let label = label.unwrap_or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "object".to_string())
            });
            let id = engine.workspace().lock().scene.import_exchange_file(&path, &label)?;
            Ok(serde_json::to_string(&describe(engine, &id))?)
        }
        WorkspaceAction::List => {
            let workspace = engine.workspace();
            let workspace = workspace.lock();
            let objects: Vec<ObjectOutput> = workspace
                .scene
                .objects()
                .map(|(id, object)| ObjectOutput {
                    id: id.clone(),
                    label: object.label.clone(),
                    placement: object.placement,
                    sync: workspace.tags.get(id).cloned(),
                })
                .collect();
            Ok(serde_json::to_string(&objects)?)
        }
        WorkspaceAction::Move { object_id, translation, rotation } => {
            let id = ObjectId::from_string(object_id);
            {
                let workspace = engine.workspace();
                let mut workspace = workspace.lock();
                let mut placement = workspace
                    .scene
                    .placement(&id)
                    .ok_or_else(|| format!("Unknown workspace object {}", id))?;
                if let Some(text) = translation {
                    placement.translation = parse_vec3(&format!("({})", text))?;
                }
                if let Some(text) = rotation {
                    placement.rotation = parse_vec3(&format!("({})", text))?;
                }
                workspace.scene.set_placement(&id, placement)?;
            }
            Ok(serde_json::to_string(&describe(engine, &id))?)
        }
    }
}

fn describe(engine: &SyncEngine<FileScene>, id: &ObjectId) -> Option<ObjectOutput> {
    let workspace = engine.workspace();
    let workspace = workspace.lock();
    Some(ObjectOutput {
        id: id.clone(),
        label: workspace.scene.label(id)?,
        placement: workspace.scene.placement(id)?,
        sync: workspace.tags.get(id).cloned(),
    })
}
