use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Malformed archive {}: {reason}", path.display())]
    MalformedArchive { path: PathBuf, reason: String },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Malformed patch {file}: {reason}")]
    PatchParse { file: String, reason: String },

    /// A hunk's context or removed lines did not match the baseline file.
    #[error("Patch conflict in {file} (hunk {hunk}, line {line}): {reason}")]
    PatchConflict {
        file: String,
        hunk: usize,
        line: usize,
        reason: String,
    },

    #[error("Patch file {patch} would be written for both {first} and {second}")]
    PatchCollision {
        patch: String,
        first: String,
        second: String,
    },

    #[error("More than one patch targets {0}")]
    DuplicatePatchTarget(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Wraps an I/O error, turning `NotFound` into [`ForgeError::NotFound`] for `path`.
    pub fn io_at(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ForgeError::NotFound(path.into())
        } else {
            ForgeError::Io(err)
        }
    }
}
