//! Error types for the video library

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while walking the filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Permission denied when accessing a file or directory
    PermissionDenied,
    /// File or directory not found (vanished or broken symlink)
    NotFound,
    /// I/O error during file operations
    IoError,
    /// Directory already visited through a symlink
    SymlinkLoop,
    /// Invalid path encoding
    InvalidPath,
}

/// Represents a filesystem error isolated to a single entry
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(path.clone()),
            format!("Not found: {:?}", path),
        )
    }

    /// Create a symlink loop error
    pub fn symlink_loop(path: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::SymlinkLoop,
            Some(path.clone()),
            format!("Directory already visited: {:?}", path),
        )
    }

    /// Classify an I/O error raised while inspecting `path`
    pub fn from_io(path: PathBuf, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, Some(path), err.to_string())
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        if err.loop_ancestor().is_some() {
            return Self::new(ScanErrorKind::SymlinkLoop, path, err.to_string());
        }
        let kind = match err.io_error().map(|e| e.kind()) {
            Some(std::io::ErrorKind::PermissionDenied) => ScanErrorKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) => ScanErrorKind::NotFound,
            _ => ScanErrorKind::IoError,
        };
        Self::new(kind, path, err.to_string())
    }
}

/// The media prober could not inspect a file
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch prober: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("prober exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("unreadable prober output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no duration reported")]
    MissingDuration,
}

/// The persisted metadata cache could not be read or written
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A single streaming request failed
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("video not found")]
    NotFound,

    #[error("invalid range header: {0}")]
    InvalidRange(String),

    #[error("range not satisfiable for a {size}-byte file")]
    Unsatisfiable { size: u64 },

    #[error("I/O error while streaming: {0}")]
    Io(#[from] std::io::Error),
}
