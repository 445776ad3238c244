// error.rs - Error types for validation, the media engine, archives and settings

use thiserror::Error;

/// Rejected user input. Nothing is processed when one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter valid dimensions ({field} is missing)")]
    MissingDimension { field: &'static str },

    #[error("Please enter valid dimensions ({field} must be a positive whole number, got '{value}')")]
    InvalidDimension { field: &'static str, value: String },

    #[error("Please enter a valid hex color code (got '{0}')")]
    InvalidColor(String),

    #[error("Please select at least one image")]
    NoFiles,

    #[error("A conversion is already running")]
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Media engine unavailable: {0}")]
    Unavailable(String),

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Working storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid working storage name: '{0}'")]
    InvalidName(String),

    #[error("No such file in working storage: '{0}'")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}
