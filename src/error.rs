//! Error types for Stevedore
//!
//! All modules use `StevedoreResult<T>` as their return type. Every fatal
//! variant names the pipeline stage it belongs to (classify, detect, plan,
//! cache, build, run) so failures are attributable from the message alone.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stevedore operations
pub type StevedoreResult<T> = Result<T, StevedoreError>;

/// All errors that can occur in Stevedore
#[derive(Error, Debug)]
pub enum StevedoreError {
    // Classification errors (fatal before any build attempt)
    #[error("classify: cannot interpret target: {0}")]
    Classification(String),

    #[error("classify: unbalanced quoting in command: {0}")]
    UnbalancedQuotes(String),

    // Detection errors
    #[error("detect: failed to read directory {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("detect: no recognizable project in {0}")]
    NoProject(PathBuf),

    // Plan errors
    #[error("plan: {0} projects cannot be containerized yet")]
    UnsupportedEcosystem(String),

    // Cache errors
    #[error("cache: metadata store unreadable at {path}: {reason}")]
    CacheStoreCorruption { path: PathBuf, reason: String },

    #[error("cache: timed out waiting for build lock on key {0}")]
    BuildLockTimeout(String),

    // Engine errors
    #[error("Container engine '{0}' not found. Install Finch from https://runfinch.com/")]
    EngineNotFound(String),

    #[error("Engine VM failed to start: {0}")]
    VmStart(String),

    #[error("build: engine reported failure building {image}:\n{output_tail}")]
    BuildFailure { image: String, output_tail: String },

    #[error("run: container failed to start: {0}")]
    Launch(String),

    // Git errors
    #[error("git clone failed for {url}: {reason}")]
    GitClone { url: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StevedoreError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if error is retryable by re-invocation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BuildFailure { .. } | Self::VmStart(_) | Self::BuildLockTimeout(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineNotFound(_) => Some("Install Finch from https://runfinch.com/"),
            Self::NoProject(_) => {
                Some("Expected package.json, pyproject.toml, setup.py, requirements.txt, or Cargo.toml")
            }
            Self::BuildFailure { .. } => Some("Re-run with -vv to see the full build log"),
            _ => None,
        }
    }
}
