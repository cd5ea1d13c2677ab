//! Error types for build settings and compiler backends

use std::path::PathBuf;
use thiserror::Error;

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompilerError>;

/// Errors raised before a build reaches the backend.
///
/// Build failures themselves are never errors: they travel inside
/// [`CompilationResult`](crate::CompilationResult).
#[derive(Debug, Error)]
pub enum CompilerError {
    /// Settings are not complete enough to submit
    #[error("Invalid build settings: {0}")]
    InvalidSettings(String),

    /// No source files were given
    #[error("Build request has no source files")]
    NoSources,

    /// Settings file could not be parsed
    #[error("Failed to parse settings file '{path}': {message}")]
    Config {
        path: PathBuf,
        message: String,
    },

    /// Settings file has an extension we do not read
    #[error("Unsupported settings format: '{0}'")]
    UnsupportedFormat(PathBuf),

    /// Backend process could not be started
    #[error("Failed to spawn '{program}': {message}")]
    Spawn {
        program: String,
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompilerError {
    /// Create a settings parse error
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CompilerError::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a process start error
    pub fn spawn(program: impl Into<String>, message: impl ToString) -> Self {
        CompilerError::Spawn {
            program: program.into(),
            message: message.to_string(),
        }
    }
}
