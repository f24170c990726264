//! Error types for imgsync
//!
//! All modules use `ImgsyncResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for imgsync operations
pub type ImgsyncResult<T> = Result<T, ImgsyncError>;

/// All errors that can occur in imgsync
#[derive(Error, Debug)]
pub enum ImgsyncError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open file {path}: {source}")]
    CannotOpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid image list sources in {path}: {reason}")]
    SourcesInvalid { path: PathBuf, reason: String },

    #[error("Refusing to write {0}: serialized sources are empty")]
    EmptySerialization(PathBuf),

    #[error("Unknown dispatcher: {0}")]
    UnknownDispatcher(String),

    // Image list errors
    #[error("Invalid image list: {0}")]
    InvalidImageList(String),

    #[error("Image list '{0}' has not been fetched yet")]
    ListNotFetched(String),

    #[error("Image list '{0}' already exists")]
    DuplicatedImageList(String),

    #[error("Image list not found: {0}")]
    ListNotFound(String),

    #[error("Request to {uri} failed: {reason}")]
    Transport {
        uri: String,
        status: Option<u16>,
        reason: String,
    },

    // Image errors
    #[error("Image already downloaded in this run: {0}")]
    AlreadyDownloaded(PathBuf),

    #[error("Download of image '{id}' failed ({}): {reason}", status_label(.status))]
    DownloadFailed {
        id: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Verification of image '{id}' failed: expected {expected}, obtained {obtained}")]
    VerificationFailed {
        id: String,
        expected: String,
        obtained: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Cache errors
    #[error("Cache at {0} is locked by another sync")]
    CacheLocked(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no status".to_string(),
    }
}

impl ImgsyncError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid image list error
    pub fn invalid_list(reason: impl Into<String>) -> Self {
        Self::InvalidImageList(reason.into())
    }

    /// Whether a sync can skip the failing item and carry on.
    ///
    /// Per-list and per-image faults are recoverable; configuration and
    /// precondition violations are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidImageList(_)
                | Self::Transport { .. }
                | Self::DownloadFailed { .. }
                | Self::VerificationFailed { .. }
                | Self::Json(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CannotOpenFile { .. } => {
                Some("Add a list with: imgsync add <name> --url <url>")
            }
            Self::DuplicatedImageList(_) => Some("Use --force to overwrite the existing list"),
            Self::ListNotFound(_) => Some("Run: imgsync lists"),
            Self::CacheLocked(_) => Some("Wait for the running sync to finish"),
            Self::UnknownDispatcher(_) => Some("Supported dispatchers: noop, log"),
            _ => None,
        }
    }
}
