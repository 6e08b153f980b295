use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for results returned by library modules.
pub type Result<T> = std::result::Result<T, VoxsetError>;

/// An audio file could not be opened or decoded.
#[derive(Debug, Clone, Error)]
#[error("failed to decode {}: {reason}", path.display())]
pub struct DecodeError {
    pub path: PathBuf,
    pub reason: String,
}

impl DecodeError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A single acoustic feature group failed for one file.
#[derive(Debug, Clone, Error)]
#[error("{group} features unavailable: {reason}")]
pub struct FeatureGroupError {
    pub group: &'static str,
    pub reason: String,
}

impl FeatureGroupError {
    pub fn new(group: &'static str, reason: impl Into<String>) -> Self {
        Self {
            group,
            reason: reason.into(),
        }
    }
}

/// Crate-level error taxonomy.
#[derive(Debug, Error)]
pub enum VoxsetError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    FeatureGroup(#[from] FeatureGroupError),

    /// No audio file survived extraction.
    #[error("no valid audio files processed under {} ({skipped} skipped)", base_dir.display())]
    EmptyDataset { base_dir: PathBuf, skipped: usize },

    /// A join key occurs more than once where a one-to-one match is required.
    #[error("join key `{key}` occurs {count} times in {table}; expected a one-to-one match")]
    JoinCardinality {
        table: String,
        key: String,
        count: usize,
    },

    #[error("table {table} has no column `{column}`")]
    MissingColumn { table: String, column: String },

    #[error("failed to read table {}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
