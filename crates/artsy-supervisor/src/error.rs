// ABOUTME: Error types for the artsy supervisor
// ABOUTME: Fatal startup failures and the exit codes they map to

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a supervisor run.
///
/// Anything not listed here (missing browser, missing `xset`, signaling a
/// process that already exited) is absorbed where it happens and logged.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Required program is not on PATH
    #[error("required program '{program}' was not found on PATH")]
    MissingPrerequisite { program: String },

    /// Server command is empty
    #[error("server command is empty")]
    EmptyServerCommand,

    /// Data directory layout could not be created
    #[error("failed to prepare data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client for the readiness probe could not be built
    #[error("failed to build readiness HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A child process could not be started
    #[error("failed to spawn {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    /// Server never answered the readiness probe
    #[error("server did not become ready at {url} after {attempts} attempts")]
    ReadinessTimeout { url: String, attempts: u32 },

    /// Server process died before it answered the readiness probe
    #[error("server exited before becoming ready (exit code {code:?})")]
    ServerExitedEarly { code: Option<i32> },
}

impl SupervisorError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// True when nothing was spawned before the error surfaced.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::MissingPrerequisite { .. }
                | Self::EmptyServerCommand
                | Self::DataDir { .. }
                | Self::HttpClient(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
