//! Error types for live class reloading

use std::path::PathBuf;
use thiserror::Error;
use void_compiler::CompilerError;

/// Result type for reload operations
pub type Result<T> = std::result::Result<T, ReloadError>;

/// Errors that can occur while watching or reloading a type
#[derive(Debug, Error)]
pub enum ReloadError {
    /// The backend reported a failed build
    #[error("Build of module '{module}' failed ({path}):\n{diagnostics}")]
    BuildFailed {
        module: String,
        path: PathBuf,
        diagnostics: String,
    },

    /// The build succeeded but the module file is not there
    #[error("Module '{module}' not found at {path}")]
    ModuleNotFound {
        module: String,
        path: PathBuf,
    },

    /// The module does not export an entry point we need
    #[error("Symbol '{symbol}' not found in module {path}")]
    SymbolNotFound {
        symbol: String,
        path: PathBuf,
    },

    /// The platform loader rejected the module
    #[error("Failed to load module '{path}': {message}")]
    LoadError {
        path: PathBuf,
        message: String,
    },

    /// An instance was destroyed and could not be rebuilt. Its memory no
    /// longer holds a valid object.
    #[error("FATAL: instance {address:#x} of '{type_name}' was destroyed and not reconstructed: {reason}")]
    InstanceLost {
        type_name: String,
        address: usize,
        reason: String,
    },

    /// The address is already registered
    #[error("Instance {address:#x} of '{type_name}' is already watched")]
    AlreadyWatched {
        type_name: String,
        address: usize,
    },

    /// File watching failed
    #[error("Watch error: {0}")]
    Watch(String),

    /// Build submission was rejected
    #[error("Compiler error: {0}")]
    Compiler(#[from] CompilerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReloadError {
    /// Create a module not found error
    pub fn module_not_found(module: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ReloadError::ModuleNotFound {
            module: module.into(),
            path: path.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(symbol: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ReloadError::SymbolNotFound {
            symbol: symbol.into(),
            path: path.into(),
        }
    }

    /// Create a load error
    pub fn load_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ReloadError::LoadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error left memory in an invalid state
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReloadError::InstanceLost { .. })
    }
}
