//! Error types for the SimGuide core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the scene-record and point-cloud collaborators.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Filesystem access failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    
    /// Scene record could not be parsed or encoded
    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    
    /// Point cloud file is not in a supported layout
    #[error("PCD format error in {path}: {reason}")]
    PcdFormat { path: PathBuf, reason: String },
}

impl CoreError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
    
    /// Creates a YAML error bound to a path.
    pub fn yaml(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        Self::Yaml { path: path.into(), source }
    }
    
    /// Creates a PCD format error.
    pub fn pcd(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PcdFormat { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
