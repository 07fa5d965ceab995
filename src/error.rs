//! Failure kinds surfaced by the ingestion pipeline.
//!
//! Every component reports through [`IngestError`] so the orchestrator can tell
//! a per-file failure (conversion, read, load, archive) from a run-level one
//! (connection, configuration). Row-level malformation is never an error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to convert {path:?}: {message}")]
    Conversion { path: PathBuf, message: String },

    #[error("failed to read {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to load batch {batch} of {path:?}: {message}")]
    Load {
        path: PathBuf,
        batch: usize,
        message: String,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("failed to archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn conversion(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IngestError::Conversion {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn read(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        IngestError::Read {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
