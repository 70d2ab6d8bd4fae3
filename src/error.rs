// src/error.rs
// ============================================================================
// ERRORES - Taxonomía de fallos de carga, transformación y escritura
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// Errores del migrador BN
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid topology {}: {message}", path.display())]
    InvalidTopology { path: PathBuf, message: String },

    #[error("Invalid weights file {}: {message}", path.display())]
    InvalidWeights { path: PathBuf, message: String },

    #[error("Unsupported dtype '{dtype}' for tensor '{tensor}'")]
    UnsupportedDtype { tensor: String, dtype: String },

    #[error("Topology/weights mismatch in layer '{layer}': {message}")]
    Mismatch { layer: String, message: String },

    #[error("BN layer '{layer}' has {found} params, expected at least {expected} (scale, bias, mean, variance)")]
    MissingBnParam {
        layer: String,
        expected: usize,
        found: usize,
    },

    #[error("{} is already migrated (bn_variance = inv_std); use --force to convert again", path.display())]
    AlreadyMigrated { path: PathBuf },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
