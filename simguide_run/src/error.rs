//! Error types for the frame synthesis runner.

use simguide_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an augmentation run.
#[derive(Debug, Error)]
pub enum AugmentError {
    /// Run configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    
    /// Template dataset root does not exist
    #[error("Source scenario not found: {0}")]
    SourceNotFound(PathBuf),
    
    /// Template has no numeric vehicle directories
    #[error("No vehicle directories found in {0}")]
    NoVehicles(PathBuf),
    
    /// First vehicle has no scene frames
    #[error("No frames found in {0}")]
    NoFrames(PathBuf),
    
    /// Filesystem access failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    
    /// YAML config or metadata could not be encoded/decoded
    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    
    /// Scene or point-cloud collaborator failed
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AugmentError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
    
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
