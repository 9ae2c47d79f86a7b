//! Live session process and update application.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::parser::parse_live_line;
use super::LiveError;
use crate::bridge::process::spawn_error;
use crate::bridge::{flags, CommandRequest, Operation};
use crate::codec::{axis, Vec3};
use crate::scene::{PlacementUpdate, Scene, SharedWorkspace};

/// How long shutdown waits for the process to answer the quit command.
const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while collecting the exit status of a process that closed stdout.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Single-character control channel of the live CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveCommand {
    /// Ask the process to broadcast a test transform.
    TransformTest,
    Quit,
    /// The terminate signal (ESC).
    Terminate,
}

impl LiveCommand {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LiveCommand::TransformTest => b"t\n",
            LiveCommand::Quit => b"q\n",
            LiveCommand::Terminate => b"\x1b\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LiveEvent {
    #[serde(rename_all = "camelCase")]
    Placement {
        reference_path: String,
        translation: Vec3,
        /// Local (Z, Y, X) order.
        rotation: Vec3,
        /// Number of local objects updated.
        applied: usize,
    },
    #[serde(rename_all = "camelCase")]
    SessionEnded { exit_code: Option<i32> },
}

/// Which live session to join and which project filters its output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTarget {
    pub assembly_url: String,
    pub session_name: String,
    pub project_url: String,
}

/// Applies live update lines to the shared workspace.
pub struct LiveLineHandler<S> {
    workspace: SharedWorkspace<S>,
    project_url: String,
}

impl<S: Scene> LiveLineHandler<S> {
    pub fn new(workspace: SharedWorkspace<S>, project_url: impl Into<String>) -> Self {
        Self {
            workspace,
            project_url: project_url.into(),
        }
    }

    /// Apply every update on the line, in order, under the workspace lock.
    pub fn handle_line(&self, line: &str) -> Vec<LiveEvent> {
        let Some(updates) = parse_live_line(line, &self.project_url) else {
            return Vec::new();
        };

        let mut workspace = self.workspace.lock();
        updates
            .into_iter()
            .map(|update| {
                let rotation = axis::remote_to_local(update.rotation_xyz);
                let change = PlacementUpdate {
                    translation: update.translation,
                    rotation,
                    scale: None,
                };
                let applied = match workspace.apply_update(&update.reference_path, &change) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(reference = %update.reference_path, error = %e, "Failed to apply live update");
                        0
                    }
                };
                debug!(reference = %update.reference_path, applied, "Live update");
                LiveEvent::Placement {
                    reference_path: update.reference_path,
                    translation: update.translation,
                    rotation,
                    applied,
                }
            })
            .collect()
    }
}

/// Counts stdout lines so shutdown can wait for the process to respond.
#[derive(Default)]
struct Activity {
    state: Mutex<(u64, bool)>,
    changed: Condvar,
}

impl Activity {
    fn line(&self) {
        self.state.lock().0 += 1;
        self.changed.notify_all();
    }

    fn eof(&self) {
        self.state.lock().1 = true;
        self.changed.notify_all();
    }

    fn lines_seen(&self) -> u64 {
        self.state.lock().0
    }

    /// Block until a line past `seen` arrives or stdout closes.
    fn wait_past(&self, seen: u64, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        while state.0 <= seen && !state.1 {
            if self.changed.wait_for(&mut state, timeout).timed_out() {
                return false;
            }
        }
        true
    }
}

/// A running live CLI process bound to one assembly and session.
pub struct LiveSession {
    target: LiveTarget,
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    activity: Arc<Activity>,
    events: Option<Receiver<LiveEvent>>,
    readers: Vec<JoinHandle<()>>,
    exit_code: Option<i32>,
}

impl LiveSession {
    pub fn start<S: Scene + 'static>(
        program: &Path,
        target: LiveTarget,
        workspace: SharedWorkspace<S>,
    ) -> Result<Self, LiveError> {
        let request = CommandRequest::new(Operation::StartLive)
            .with_url(&target.assembly_url)
            .arg(flags::SESSION_NAME, &target.session_name);

        let mut child = Command::new(program)
            .args(request.argv())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LiveError::Bridge(spawn_error(program, e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();

        let child = Arc::new(Mutex::new(child));
        let running = Arc::new(AtomicBool::new(true));
        let stopping = Arc::new(AtomicBool::new(false));
        let activity = Arc::new(Activity::default());
        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();

        if let Some(stdout) = stdout {
            let handler = LiveLineHandler::new(workspace, target.project_url.clone());
            let child = child.clone();
            let running = running.clone();
            let stopping = stopping.clone();
            let activity = activity.clone();
            readers.push(
                thread::Builder::new()
                    .name("live-stdout".to_string())
                    .spawn(move || {
                        read_updates(stdout, &handler, &tx, &activity);
                        running.store(false, Ordering::SeqCst);
                        activity.eof();
                        if !stopping.load(Ordering::SeqCst) {
                            let exit_code = collect_exit(&child, &stopping);
                            warn!(code = ?exit_code, "Live session process exited unexpectedly");
                            let _ = tx.send(LiveEvent::SessionEnded { exit_code });
                        }
                    })?,
            );
        }

        if let Some(stderr) = stderr {
            readers.push(
                thread::Builder::new()
                    .name("live-stderr".to_string())
                    .spawn(move || {
                        for line in BufReader::new(stderr).split(b'\n').map_while(Result::ok) {
                            let line = String::from_utf8_lossy(&line);
                            let line = line.trim_end();
                            if !line.is_empty() {
                                debug!(target: "nucleus_sync_lib::live", stderr = %line);
                            }
                        }
                    })?,
            );
        }

        info!(
            pid,
            assembly = %target.assembly_url,
            session = %target.session_name,
            "Live session started"
        );

        Ok(Self {
            target,
            child,
            stdin,
            running,
            stopping,
            activity,
            events: Some(rx),
            readers,
            exit_code: None,
        })
    }

    pub fn target(&self) -> &LiveTarget {
        &self.target
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Event stream; `None` once taken.
    pub fn events(&self) -> Option<&Receiver<LiveEvent>> {
        self.events.as_ref()
    }

    pub fn take_events(&mut self) -> Option<Receiver<LiveEvent>> {
        self.events.take()
    }

    /// Write a command to the session. A session that exited without
    /// [`LiveSession::stop`] reports [`LiveError::Ended`].
    pub fn send(&mut self, command: LiveCommand) -> Result<(), LiveError> {
        if !self.is_running() {
            if self.stopping.load(Ordering::SeqCst) {
                return Err(LiveError::NotRunning);
            }
            return Err(LiveError::Ended(format!(
                "Live session '{}' ended unexpectedly",
                self.target.session_name
            )));
        }
        let stdin = self.stdin.as_mut().ok_or(LiveError::NotRunning)?;
        stdin.write_all(command.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    /// Shut down cooperatively: send quit, wait for the process to answer,
    /// close its input, then wait for it to exit. Returns the exit code.
    pub fn stop(&mut self) -> Result<Option<i32>, LiveError> {
        if self.stdin.is_none() && self.readers.is_empty() {
            return Ok(self.exit_code);
        }
        self.stopping.store(true, Ordering::SeqCst);

        let seen = self.activity.lines_seen();
        if let Some(stdin) = self.stdin.as_mut() {
            let sent = stdin
                .write_all(LiveCommand::Quit.as_bytes())
                .and_then(|_| stdin.flush());
            match sent {
                Ok(()) => {
                    if !self.activity.wait_past(seen, ACK_TIMEOUT) {
                        warn!("Live session did not answer the quit command");
                    }
                }
                Err(e) => debug!(error = %e, "Live session no longer reading input"),
            }
        }
        drop(self.stdin.take());

        let status = self.child.lock().wait()?;
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
        self.running.store(false, Ordering::SeqCst);
        self.exit_code = status.code();
        info!(code = ?self.exit_code, session = %self.target.session_name, "Live session stopped");
        Ok(self.exit_code)
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("target", &self.target)
            .field("running", &self.is_running())
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.stopping.store(true, Ordering::SeqCst);
            drop(self.stdin.take());
            let mut child = self.child.lock();
            if let Ok(None) = child.try_wait() {
                warn!(session = %self.target.session_name, "Killing live session on drop");
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

fn read_updates<R: Read, S: Scene>(
    stdout: R,
    handler: &LiveLineHandler<S>,
    tx: &Sender<LiveEvent>,
    activity: &Activity,
) {
    for line in BufReader::new(stdout).split(b'\n') {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Live session stdout read failed");
                break;
            }
        };
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches('\r');
        debug!(target: "nucleus_sync_lib::live", "{}", line);
        for event in handler.handle_line(line) {
            let _ = tx.send(event);
        }
        activity.line();
    }
}

/// Exit code of a process whose stdout closed, without holding the child lock
/// while it is still running.
fn collect_exit(child: &Mutex<Child>, stopping: &AtomicBool) -> Option<i32> {
    loop {
        match child.lock().try_wait() {
            Ok(Some(status)) => return status.code(),
            Ok(None) if stopping.load(Ordering::SeqCst) => return None,
            Ok(None) => thread::sleep(EXIT_POLL),
            Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::memory::MemoryScene;
    use crate::scene::{Placement, SyncMetadata, Workspace};
    use crate::token::Token;

    fn workspace_with(reference: &str) -> (SharedWorkspace<MemoryScene>, crate::scene::ObjectId) {
        let mut workspace = Workspace::new(MemoryScene::default());
        let id = workspace.scene.insert("A", Placement::default());
        workspace.tags.tag(
            id.clone(),
            SyncMetadata::new(reference, crate::codec::exchange_path_for(reference), Token::generate()),
        );
        (workspace.into_shared(), id)
    }

    #[test]
    fn test_live_line_updates_tagged_object() {
        let (workspace, id) = workspace_with("ref/A.usd");
        let handler = LiveLineHandler::new(workspace.clone(), "myproj");

        let events = handler.handle_line("myproj|ref/A.usd|(1.0, 2.0, 3.0)|(10.0, 0.0, 0.0)|");

        let placement = workspace.lock().scene.placement(&id).unwrap();
        assert_eq!(placement.translation, [1.0, 2.0, 3.0]);
        assert_eq!(placement.rotation, [0.0, 0.0, 10.0]);
        assert_eq!(placement.scale, [1.0, 1.0, 1.0]);
        assert!(matches!(events.as_slice(), [LiveEvent::Placement { applied: 1, .. }]));
    }

    #[test]
    fn test_lines_for_other_projects_are_ignored() {
        let (workspace, id) = workspace_with("ref/A.usd");
        let handler = LiveLineHandler::new(workspace.clone(), "myproj");

        assert!(handler
            .handle_line("otherproj|ref/A.usd|(1.0, 2.0, 3.0)|(10.0, 0.0, 0.0)|")
            .is_empty());
        assert_eq!(workspace.lock().scene.placement(&id).unwrap(), Placement::default());
    }

    #[test]
    fn test_updates_apply_in_arrival_order() {
        let (workspace, id) = workspace_with("ref/A.usd");
        let handler = LiveLineHandler::new(workspace.clone(), "myproj");

        handler.handle_line("myproj|ref/A.usd|(1.0, 0.0, 0.0)|(0.0, 0.0, 0.0)|");
        handler.handle_line("myproj|ref/A.usd|(2.0, 0.0, 0.0)|(0.0, 0.0, 0.0)|");

        assert_eq!(workspace.lock().scene.placement(&id).unwrap().translation, [2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(LiveCommand::TransformTest.as_bytes(), b"t\n");
        assert_eq!(LiveCommand::Quit.as_bytes(), b"q\n");
        assert_eq!(LiveCommand::Terminate.as_bytes()[0], 27);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("live-cli.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn target() -> LiveTarget {
            LiveTarget {
                assembly_url: "omniverse://h/proj/assembly/myAssy.usda".to_string(),
                session_name: "review".to_string(),
                project_url: "omniverse://h/proj".to_string(),
            }
        }

        #[test]
        fn test_session_applies_updates_and_stops_cleanly() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(
                dir.path(),
                r#"echo "joined $4"
echo "omniverse://h/proj|omniverse://h/proj/assets/A/A.usda|(1.0, 2.0, 3.0)|(10.0, 0.0, 0.0)|"
while read cmd; do
  case "$cmd" in
    t) echo "transform test";;
    q) echo "leaving"; exit 0;;
  esac
done"#,
            );
            let (workspace, id) = workspace_with("omniverse://h/proj/assets/A/A.usda");

            let mut session = LiveSession::start(&program, target(), workspace.clone()).unwrap();
            let events = session.take_events().unwrap();

            let event = events.recv_timeout(Duration::from_secs(10)).unwrap();
            assert!(matches!(event, LiveEvent::Placement { applied: 1, .. }));
            assert_eq!(
                workspace.lock().scene.placement(&id).unwrap().rotation,
                [0.0, 0.0, 10.0]
            );

            session.send(LiveCommand::TransformTest).unwrap();
            assert_eq!(session.stop().unwrap(), Some(0));
            assert!(!session.is_running());
            assert!(events.try_iter().all(|e| !matches!(e, LiveEvent::SessionEnded { .. })));
            assert!(matches!(session.send(LiveCommand::Quit), Err(LiveError::NotRunning)));
        }

        #[test]
        fn test_unexpected_exit_reports_session_ended() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "echo starting\nexit 3");
            let (workspace, _) = workspace_with("ref/A.usd");

            let mut session = LiveSession::start(&program, target(), workspace).unwrap();
            let events = session.take_events().unwrap();

            let ended = events
                .iter()
                .find(|e| matches!(e, LiveEvent::SessionEnded { .. }))
                .unwrap();
            assert_eq!(ended, LiveEvent::SessionEnded { exit_code: Some(3) });
            assert!(!session.is_running());
            let err = session.send(LiveCommand::TransformTest).unwrap_err();
            assert!(matches!(&err, LiveError::Ended(reason) if reason.contains("review")));
            assert!(matches!(
                crate::sync::SyncError::from(err),
                crate::sync::SyncError::SessionEnded(_)
            ));
            assert_eq!(session.stop().unwrap(), Some(3));
        }
    }
}
