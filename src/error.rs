use std::path::PathBuf;

use crate::grid::Cell;

/// Errors that can occur when constructing a grid environment.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    InvalidDimensions { width: usize, height: usize },

    #[error("cell {cell} is outside the {width}x{height} grid")]
    OutOfBounds {
        cell: Cell,
        width: usize,
        height: usize,
    },

    #[error("navigator and goal cannot share cell {0}")]
    NavigatorOnGoal(Cell),
}

/// Errors that can occur when starting or running a training session.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("a training session is already active for the {0}")]
    SessionActive(&'static str),

    #[error("failed to spawn training worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("training worker for the {0} panicked")]
    WorkerPanicked(&'static str),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
