//! Unified error types for wrapfinder.
//!
//! Library code uses `Error` and `Result<T>`.
//! Binary code (`main.rs`) uses `anyhow` for ergonomic CLI error handling.

use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Unified error type for wrapfinder library operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// API catalog could not be read or is malformed.
    #[error("catalog error in {}: {message}", path.display())]
    Catalog {
        /// Path to the problematic catalog file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Compilation database could not be read or is malformed.
    #[error("compilation database error in {}: {message}", path.display())]
    CompileDb {
        /// Path to the problematic database file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// A translation unit failed to parse (after the retry).
    #[error("parse error in {}: {message}", file.display())]
    Parse {
        /// Source file that failed to parse.
        file: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Command line usage error (exit code 2).
    #[error("{0}")]
    Usage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a catalog error.
    pub fn catalog(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Catalog {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a compilation database error.
    pub fn compile_db(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CompileDb {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result type alias for wrapfinder library operations.
pub type Result<T> = std::result::Result<T, Error>;
