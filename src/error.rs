// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanwardError {
    #[error("I/O error: {source} (path: {path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Compilation database error: {0}")]
    CompilationDb(String),

    #[error("Malformed compiler invocation: {0}")]
    Invocation(String),

    #[error("Compiler error: {0}")]
    Compiler(String),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScanwardError>;

// Allow `?` on std::io::Error by converting to ScanwardError::Io with unknown path.
impl From<std::io::Error> for ScanwardError {
    fn from(source: std::io::Error) -> Self {
        ScanwardError::Io {
            source,
            path: PathBuf::from("<unknown>"),
        }
    }
}

// Gracefully convert WalkDir errors
impl From<walkdir::Error> for ScanwardError {
    fn from(e: walkdir::Error) -> Self {
        ScanwardError::Other(e.to_string())
    }
}

impl ScanwardError {
    /// Attaches a concrete path to a bare I/O error.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ScanwardError::Io {
            source,
            path: path.into(),
        }
    }
}
