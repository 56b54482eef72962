//! Error types for the step transform pipeline and the entrypoint runtime.

use std::path::PathBuf;

/// Result type alias for steprun operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while transforming steps or running an entrypoint.
///
/// Transform and resolution errors happen before any container exists and
/// abort the whole pipeline. Wait and run errors happen inside a single
/// container and travel downstream only through `.err` markers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Transform Errors
    // =========================================================================
    /// Malformed manifest or option.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The step template could not be merged into a step.
    #[error("invalid step template: {0}")]
    InvalidTemplate(String),

    /// A step definition is internally inconsistent.
    #[error("invalid step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    /// A container reached ordering without a command to run.
    #[error("container '{container}' has no command after entrypoint resolution")]
    MissingCommand { container: String },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Failed to parse image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    /// Registry manifest or config lookup failed.
    #[error("failed to look up image '{reference}': {reason}")]
    ImageLookupFailed { reference: String, reason: String },

    /// No usable registry credentials for the namespace/identity pair.
    #[error("no registry credentials for {namespace}/{service_account}: {reason}")]
    CredentialsUnavailable {
        namespace: String,
        service_account: String,
        reason: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// A predecessor failed or was skipped (its `.err` marker appeared).
    #[error("error marker found for {}, skipping step", path.display())]
    WaitSkipped { path: PathBuf },

    /// Watching for a marker failed.
    #[error("failed waiting for {}: {reason}", path.display())]
    WaitFailed { path: PathBuf, reason: String },

    /// The real command failed to start or exited non-zero.
    #[error("command '{command}' failed: {reason}")]
    RunFailed {
        command: String,
        exit_code: Option<i32>,
        reason: String,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true for the cascading failure kind: a predecessor already
    /// failed and this step never ran.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::WaitSkipped { .. })
    }

    /// Returns true if this error happened before any container ran.
    pub fn is_pre_execution(&self) -> bool {
        !matches!(
            self,
            Error::WaitSkipped { .. }
                | Error::WaitFailed { .. }
                | Error::RunFailed { .. }
                | Error::Io(_)
        )
    }

    /// Exit code for the entrypoint process.
    ///
    /// A failing command's own exit code is passed through; every other
    /// failure exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::RunFailed {
                exit_code: Some(code),
                ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::InvalidInput(e.to_string())
    }
}
