//! Transport that runs the remote CLI as a child process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{BridgeError, CommandRequest, ExitInfo, Response, Transport};

/// Runs one CLI process per request and waits for it to finish.
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: PathBuf,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Transport for ProcessTransport {
    fn invoke(&self, request: &CommandRequest) -> Result<Response, BridgeError> {
        let argv = request.argv();
        let started = Instant::now();
        debug!(
            program = %self.program.display(),
            operation = request.operation.flag(),
            url = ?request.nucleus_url,
            "Invoking remote CLI"
        );

        let output = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(&self.program, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let response = Response::new(&stdout, &stderr, ExitInfo::from(output.status));

        for line in &response.stdout_lines {
            debug!(target: "nucleus_sync_lib::cli", "{}", line);
        }
        if !response.exit.success {
            warn!(
                operation = request.operation.flag(),
                code = ?response.exit.code,
                stderr = response.stderr_summary().unwrap_or(""),
                "Remote CLI exited with failure"
            );
        }
        debug!(
            operation = request.operation.flag(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Remote CLI finished"
        );
        Ok(response)
    }
}

pub(crate) fn spawn_error(program: &Path, e: std::io::Error) -> BridgeError {
    if e.kind() == ErrorKind::NotFound {
        BridgeError::NotFound(program.display().to_string())
    } else {
        BridgeError::Spawn {
            program: program.display().to_string(),
            source: e,
        }
    }
}

/// Resolve a configured CLI path. Bare names are looked up on PATH.
pub fn resolve_program(configured: &Path) -> Result<PathBuf, BridgeError> {
    if configured.exists() {
        return Ok(configured.to_path_buf());
    }
    if configured.components().count() == 1 {
        #[cfg(unix)]
        let lookup = Command::new("which").arg(configured).output();
        #[cfg(windows)]
        let lookup = Command::new("where").arg(configured).output();

        if let Ok(output) = lookup {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if !path.is_empty() {
                    info!(path = %path, "Resolved remote CLI from PATH");
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }
    Err(BridgeError::NotFound(configured.display().to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::Operation;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-cli.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_process_transport_passes_argv_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), r#"for a in "$@"; do printf '%s\r\n' "$a"; done"#);
        let transport = ProcessTransport::new(&program);

        let request = CommandRequest::new(Operation::PushNonUsd)
            .with_url("omniverse://h/p/assets/A/A.stp")
            .arg("--local_non_usd_filename", "/tmp/with space/x.stp");
        let response = transport.invoke(&request).unwrap();

        assert!(response.exit.success);
        assert_eq!(response.stdout_lines, request.argv());
    }

    #[test]
    fn test_process_transport_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "echo boom >&2\nexit 3");
        let response = ProcessTransport::new(&program)
            .invoke(&CommandRequest::new(Operation::Auth))
            .unwrap();

        assert_eq!(response.exit.code, Some(3));
        assert!(!response.exit.success);
        assert_eq!(response.stderr_summary(), Some("boom"));
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let err = ProcessTransport::new("/nonexistent/nucleus-cli")
            .invoke(&CommandRequest::new(Operation::Auth))
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[test]
    fn test_resolve_program_prefers_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exit 0");
        assert_eq!(resolve_program(&program).unwrap(), program);
        assert!(resolve_program(Path::new("/nonexistent/dir/cli")).is_err());
    }
}
