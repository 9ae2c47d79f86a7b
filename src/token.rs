//! Short operation tokens.
//!
//! One token tags every remote call of a single user-level operation, so the
//! remote history can be grouped back into that operation. It also names the
//! local staging files of the operation.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_LEN: usize = 5;

/// Prefix used in checkpoint descriptors when no token was supplied.
pub const NO_TOKEN: &str = "NO_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn generate() -> Self {
        let value: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        Token(value)
    }

    /// Wrap an existing token, e.g. one read back from sync metadata.
    pub fn from_string(value: impl Into<String>) -> Self {
        Token(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Staging file name for an upload of the given extension.
    pub fn upload_file_name(&self, extension: &str) -> String {
        format!("{}upload.{}", self.0, extension)
    }

    /// Staging file name for a download of the given extension.
    pub fn download_file_name(&self, extension: &str) -> String {
        format!("{}download.{}", self.0, extension)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Checkpoint descriptor as recorded remotely: `"<token> - <message>"`.
pub fn checkpoint_descriptor(token: Option<&Token>, message: &str) -> String {
    let prefix = token.map(Token::as_str).unwrap_or(NO_TOKEN);
    format!("{} - {}", prefix, message)
}
