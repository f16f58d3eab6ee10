//! Error taxonomy for the provisioning flow.
//!
//! Configuration errors are always fatal. Filesystem and most subprocess
//! errors are recovered where they happen (logged, flow proceeds); the
//! variants below are what reaches a caller when a step decides not to
//! recover.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::MissingField;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("no app config found at '{}'; you're not currently in an APP directory", path.display())]
    ConfigMissing { path: PathBuf },

    #[error(
        "app config is missing required field(s): {}; run the update command to complete it",
        join_fields(missing)
    )]
    ConfigIncomplete { missing: Vec<MissingField> },

    #[error("invalid app config '{}': {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("app type is '{configured}' but '{requested}' was requested; app type cannot change after the first build")]
    AppTypeMismatch { configured: String, requested: String },

    #[error("failed to create directory '{}': {source}", path.display())]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} '{}' failed: {source}", path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bundle template not found: '{}'", path.display())]
    BundleMissing { path: PathBuf },

    #[error("failed to start `{command}`: {source}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {}\n{output}", exit_label(*exit_code))]
    ProcessFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("`{command}` did not finish within {}s", timeout.as_secs())]
    ProcessTimedOut { command: String, timeout: Duration },

    #[error("{target} not ready after {attempts} attempt(s) over {}s", waited.as_secs())]
    ReadinessTimeout {
        target: String,
        attempts: u32,
        waited: Duration,
    },

    #[error("provisioning cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("stopping before {stage}: {cause}")]
    StageGated { stage: String, cause: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("invalid tool settings '{}': {reason}", path.display())]
    Settings { path: PathBuf, reason: String },
}

impl ProvisionError {
    /// Stable machine-readable identifier.
    pub fn code(&self) -> &'static str {
        match self {
            ProvisionError::ConfigMissing { .. } => "DRUDOCK_CONFIG_MISSING",
            ProvisionError::ConfigIncomplete { .. } => "DRUDOCK_CONFIG_INCOMPLETE",
            ProvisionError::ConfigInvalid { .. } => "DRUDOCK_CONFIG_INVALID",
            ProvisionError::AppTypeMismatch { .. } => "DRUDOCK_APP_TYPE_MISMATCH",
            ProvisionError::DirectoryCreateFailed { .. } => "DRUDOCK_DIRECTORY_CREATE_FAILED",
            ProvisionError::Filesystem { .. } => "DRUDOCK_FILESYSTEM",
            ProvisionError::BundleMissing { .. } => "DRUDOCK_BUNDLE_MISSING",
            ProvisionError::ProcessSpawn { .. } => "DRUDOCK_PROCESS_SPAWN",
            ProvisionError::ProcessFailed { .. } => "DRUDOCK_PROCESS_FAILED",
            ProvisionError::ProcessTimedOut { .. } => "DRUDOCK_PROCESS_TIMEOUT",
            ProvisionError::ReadinessTimeout { .. } => "DRUDOCK_READINESS_TIMEOUT",
            ProvisionError::Cancelled { .. } => "DRUDOCK_CANCELLED",
            ProvisionError::StageGated { .. } => "DRUDOCK_STAGE_GATED",
            ProvisionError::Prompt(_) => "DRUDOCK_PROMPT",
            ProvisionError::Settings { .. } => "DRUDOCK_SETTINGS",
        }
    }

    /// Process exit status for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::ConfigMissing { .. } => 0,
            ProvisionError::ConfigIncomplete { .. }
            | ProvisionError::ConfigInvalid { .. }
            | ProvisionError::AppTypeMismatch { .. }
            | ProvisionError::Settings { .. } => 2,
            ProvisionError::DirectoryCreateFailed { .. }
            | ProvisionError::Filesystem { .. }
            | ProvisionError::BundleMissing { .. } => 3,
            ProvisionError::ProcessSpawn { .. }
            | ProvisionError::ProcessFailed { .. }
            | ProvisionError::ProcessTimedOut { .. } => 4,
            ProvisionError::ReadinessTimeout { .. } => 5,
            ProvisionError::StageGated { .. } => 6,
            ProvisionError::Prompt(_) => 7,
            ProvisionError::Cancelled { .. } => 130,
        }
    }

    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }
}

fn join_fields(missing: &[MissingField]) -> String {
    missing
        .iter()
        .map(|field| field.key())
        .collect::<Vec<_>>()
        .join(", ")
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
