//! Remote CLI operations and argument-vector construction.
//!
//! Every request becomes a plain argument list handed straight to the
//! process spawn; nothing is ever joined into a shell string.

use serde::Serialize;

use crate::token::Token;

/// One operation of the remote-store CLI. Each maps to exactly one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Auth,
    AuthProject,
    FindAssetFiles,
    CreateProject,
    CreateAsset,
    CreateAssembly,
    FindAssemblies,
    GetPrimReferenceXforms,
    MoveAssembly,
    PushUsd,
    PushNonUsd,
    PullNonUsd,
    AddCheckpointToUsd,
    AddCheckpointToNonUsd,
    FindSessions,
    StartLive,
}

impl Operation {
    pub fn flag(self) -> &'static str {
        match self {
            Operation::Auth => "--auth",
            Operation::AuthProject => "--auth_project",
            Operation::FindAssetFiles => "--find_stp_and_usd_files",
            Operation::CreateProject => "--create_new_project",
            Operation::CreateAsset => "--create_new_asset",
            Operation::CreateAssembly => "--create_new_assembly",
            Operation::FindAssemblies => "--find_existing_assemblies",
            Operation::GetPrimReferenceXforms => "--get_prim_reference_xforms",
            Operation::MoveAssembly => "--move_assembly",
            Operation::PushUsd => "--push",
            Operation::PushNonUsd => "--push_non_usd",
            Operation::PullNonUsd => "--pull_non_usd",
            Operation::AddCheckpointToUsd => "--add_checkpoint_to_usd",
            Operation::AddCheckpointToNonUsd => "--add_checkpoint_to_non_usd",
            Operation::FindSessions => "--find_sessions",
            Operation::StartLive => "--start_live",
        }
    }
}

/// Flags understood by the remote CLI beyond the operation flag itself.
pub mod flags {
    pub const NUCLEUS_URL: &str = "--nucleus_url";
    pub const TOKEN: &str = "--token";
    pub const CUSTOM_CHECKPOINT: &str = "--custom_checkpoint";
    pub const PROJECT_NAME: &str = "--project_name";
    pub const HOST_NAME: &str = "--host_name";
    pub const MAKE_PUBLIC: &str = "--make_public";
    pub const ASSET_NAME: &str = "--asset_name";
    pub const ASSEMBLY_NAME: &str = "--assembly_name";
    pub const ASSET_USD_LINKS: &str = "--asset_usd_links";
    pub const ASSET_STP_LINKS: &str = "--asset_stp_links";
    pub const SET_ROT_XYZ: &str = "--set_rot_xyz";
    pub const SET_TRANSFORM: &str = "--set_transform";
    pub const LOCAL_DIRECTORY: &str = "--local_directory";
    pub const LOCAL_NON_USD_FILENAME: &str = "--local_non_usd_filename";
    pub const SESSION_NAME: &str = "--session_name";
}

/// A single remote CLI call: operation, target URL, audit tag and extra flags.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub operation: Operation,
    pub nucleus_url: Option<String>,
    pub token: Option<Token>,
    pub checkpoint: Option<String>,
    /// Extra flags in insertion order; switches carry no values.
    pub args: Vec<(&'static str, Vec<String>)>,
}

impl CommandRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            nucleus_url: None,
            token: None,
            checkpoint: None,
            args: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.nucleus_url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: Option<&Token>) -> Self {
        self.token = token.cloned();
        self
    }

    pub fn with_checkpoint(mut self, message: impl Into<String>) -> Self {
        self.checkpoint = Some(message.into());
        self
    }

    /// Add a flag with a single value.
    pub fn arg(mut self, flag: &'static str, value: impl Into<String>) -> Self {
        self.args.push((flag, vec![value.into()]));
        self
    }

    /// Add a flag followed by several values (`nargs='+'` on the far side).
    pub fn args<I, V>(mut self, flag: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.args
            .push((flag, values.into_iter().map(Into::into).collect()));
        self
    }

    /// Add a value-less flag.
    pub fn switch(mut self, flag: &'static str) -> Self {
        self.args.push((flag, Vec::new()));
        self
    }

    /// Build the argument vector passed to the spawned process.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(ref url) = self.nucleus_url {
            argv.push(flags::NUCLEUS_URL.to_string());
            argv.push(url.clone());
        }
        argv.push(self.operation.flag().to_string());
        if let Some(ref token) = self.token {
            argv.push(flags::TOKEN.to_string());
            argv.push(token.to_string());
        }
        if let Some(ref message) = self.checkpoint {
            argv.push(flags::CUSTOM_CHECKPOINT.to_string());
            argv.push(message.clone());
        }
        for (flag, values) in &self.args {
            argv.push(flag.to_string());
            argv.extend(values.iter().cloned());
        }
        argv
    }

    /// Values recorded for an extra flag.
    pub fn values(&self, flag: &str) -> Option<&[String]> {
        self.args
            .iter()
            .find(|(f, _)| *f == flag)
            .map(|(_, values)| values.as_slice())
    }

    /// First value recorded for an extra flag.
    pub fn value(&self, flag: &str) -> Option<&str> {
        self.values(flag)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn has_switch(&self, flag: &str) -> bool {
        self.args.iter().any(|(f, _)| *f == flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_order() {
        let token = Token::from_string("Ab3x9");
        let request = CommandRequest::new(Operation::AddCheckpointToUsd)
            .with_url("omniverse://host/proj/assets/A/A.usda")
            .with_token(Some(&token))
            .with_checkpoint("Add asset to assembly in my Assy.usda");

        assert_eq!(
            request.argv(),
            vec![
                "--nucleus_url",
                "omniverse://host/proj/assets/A/A.usda",
                "--add_checkpoint_to_usd",
                "--token",
                "Ab3x9",
                "--custom_checkpoint",
                "Add asset to assembly in my Assy.usda",
            ]
        );
    }

    #[test]
    fn test_paths_with_spaces_stay_single_arguments() {
        let request = CommandRequest::new(Operation::PullNonUsd)
            .with_url("omniverse://host/proj/assets/A/A.stp")
            .arg(flags::LOCAL_NON_USD_FILENAME, "/tmp/my dir/Ab3x9download.stp");

        let argv = request.argv();
        assert_eq!(argv.len(), 5);
        assert_eq!(argv[4], "/tmp/my dir/Ab3x9download.stp");
    }

    #[test]
    fn test_multi_value_and_switch_flags() {
        let request = CommandRequest::new(Operation::CreateProject)
            .arg(flags::PROJECT_NAME, "demo")
            .arg(flags::HOST_NAME, "localhost")
            .switch(flags::MAKE_PUBLIC)
            .args(flags::ASSET_USD_LINKS, ["a.usd", "b.usd"]);

        assert_eq!(
            request.argv(),
            vec![
                "--create_new_project",
                "--project_name",
                "demo",
                "--host_name",
                "localhost",
                "--make_public",
                "--asset_usd_links",
                "a.usd",
                "b.usd",
            ]
        );
        assert!(request.has_switch(flags::MAKE_PUBLIC));
        assert_eq!(request.value(flags::HOST_NAME), Some("localhost"));
        assert_eq!(request.values(flags::ASSET_USD_LINKS).map(|v| v.len()), Some(2));
    }
}
