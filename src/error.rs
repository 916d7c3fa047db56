use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cfnpp operations
#[derive(Error, Debug)]
pub enum CfnppError {
    /// IO error when reading files or directories
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File not found error with specific path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Malformed template or mapping declaration; aborts that one template only
    #[error("Malformed document {path}: {message}")]
    Document { path: PathBuf, message: String },

    /// Include path whose second segment is neither `configs` nor a userdata marker
    #[error("Unrecognized include root: {segment}")]
    UnrecognizedIncludeRoot { segment: String },

    /// Config include whose section segment is neither `files` nor `commands`
    #[error("Unrecognized config section: {segment}")]
    UnrecognizedConfigSection { segment: String },

    /// Image catalog (EC2) unreachable or rejected the request
    #[error("Provider error: {message}")]
    Provider { message: String },

    /// Regex compilation error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// `WalkDir` error when traversing directories
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Glob pattern error
    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CfnppError>;
