//! Structured result of one remote CLI invocation.

use serde::Serialize;

/// Error sentinels the remote CLI prints on stdout.
///
/// A sentinel is a signal carried in the response, never a failure of the
/// bridge itself; callers decide how severe it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSentinel {
    NoPermission,
    NotFound,
    NoAuth,
    Error,
}

impl ErrorSentinel {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorSentinel::NoPermission => "NO_PERMISSION",
            ErrorSentinel::NotFound => "NOT_FOUND",
            ErrorSentinel::NoAuth => "NO_AUTH",
            ErrorSentinel::Error => "ERROR",
        }
    }

    /// Classify one stdout line. Specific sentinels win over the generic one.
    pub fn detect(line: &str) -> Option<Self> {
        let line = line.trim();
        for sentinel in [
            ErrorSentinel::NoPermission,
            ErrorSentinel::NotFound,
            ErrorSentinel::NoAuth,
        ] {
            if line.contains(sentinel.as_str()) {
                return Some(sentinel);
            }
        }
        if line.starts_with("[ERROR]") || line.starts_with("ERROR") {
            return Some(ErrorSentinel::Error);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitInfo {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

impl ExitInfo {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            success: true,
        }
    }

    pub fn failure(code: i32) -> Self {
        Self {
            code: Some(code),
            success: false,
        }
    }
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub stdout_lines: Vec<String>,
    pub stderr: String,
    pub exit: ExitInfo,
}

impl Response {
    pub fn new(stdout: &str, stderr: &str, exit: ExitInfo) -> Self {
        Self {
            stdout_lines: split_lines(stdout),
            stderr: stderr.to_string(),
            exit,
        }
    }

    /// Successful response with the given stdout, for scripted transports.
    pub fn ok(stdout: &str) -> Self {
        Self::new(stdout, "", ExitInfo::success())
    }

    /// Every sentinel line in stdout, in order.
    pub fn sentinels(&self) -> Vec<(ErrorSentinel, &str)> {
        self.stdout_lines
            .iter()
            .filter_map(|line| ErrorSentinel::detect(line).map(|s| (s, line.as_str())))
            .collect()
    }

    pub fn first_sentinel(&self) -> Option<(ErrorSentinel, &str)> {
        self.stdout_lines
            .iter()
            .find_map(|line| ErrorSentinel::detect(line).map(|s| (s, line.as_str())))
    }

    /// Trimmed, non-empty stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout_lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
    }

    /// First non-empty stderr line, used in failure messages.
    pub fn stderr_summary(&self) -> Option<&str> {
        self.stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// Split CLI output on CRLF or LF, dropping the empty tail after a final newline.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_crlf_and_lf() {
        assert_eq!(split_lines("a\r\nb\r\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\nb"), vec!["a", "b"]);
        assert_eq!(split_lines(""), Vec::<String>::new());
    }

    #[test]
    fn test_sentinel_detection() {
        assert_eq!(
            ErrorSentinel::detect("[ERROR] NO_AUTH: Cannot authenticate with omniverse://h/p"),
            Some(ErrorSentinel::NoAuth)
        );
        assert_eq!(
            ErrorSentinel::detect("[ERROR] NOT_FOUND: Provided file link at:"),
            Some(ErrorSentinel::NotFound)
        );
        assert_eq!(
            ErrorSentinel::detect("NO_PERMISSION: Cannot access file"),
            Some(ErrorSentinel::NoPermission)
        );
        assert_eq!(
            ErrorSentinel::detect("ERROR: Asset with this name already exists!"),
            Some(ErrorSentinel::Error)
        );
        assert_eq!(ErrorSentinel::detect("Connected username: raska"), None);
        assert_eq!(ErrorSentinel::detect("NO_SESSION_FOUND"), None);
    }

    #[test]
    fn test_response_sentinels_are_carried_not_fatal() {
        let response = Response::ok(
            "Connecting to omniverse://h/p\r\n[ERROR] NO_PERMISSION: Cannot access file\r\n",
        );
        assert!(response.exit.success);
        assert_eq!(response.sentinels().len(), 1);
        assert_eq!(
            response.first_sentinel().map(|(s, _)| s),
            Some(ErrorSentinel::NoPermission)
        );
        assert_eq!(response.lines().count(), 2);
    }
}
