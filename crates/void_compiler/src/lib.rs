//! # void_compiler - Live Module Builds
//!
//! Everything needed to turn a watched source file into a loadable module
//! without knowing which toolchain does the work:
//!
//! - [`BuildSettings`]: how a module is built (paths, definitions, names)
//! - [`CompilerBackend`]: the asynchronous "build this" contract
//! - [`BuildCoordinator`]: at most one running build per primary source
//! - [`CompilationResult`]: the single outcome of a build attempt
//!
//! ## Example
//!
//! ```ignore
//! use void_compiler::{BuildCoordinator, BuildSettings, ProcessBackend};
//!
//! let backend = ProcessBackend::new("c++")
//!     .args(["-shared", "-fPIC", "$(Sources)", "-o", "$(ModuleFile)"]);
//! let mut builds = BuildCoordinator::new(backend);
//!
//! let settings = BuildSettings::with_defaults()
//!     .module_name("Clear")
//!     .type_name("app::Clear")
//!     .output_path("target/live/Clear");
//!
//! builds.submit(vec!["src/Clear.cpp".into()], settings, |result| {
//!     println!("built: {}", result.is_success());
//! })?;
//!
//! // once per frame
//! builds.poll();
//! ```

mod backend;
mod coordinator;
mod error;
mod result;
mod settings;
mod symbols;

pub use backend::{BuildCompletion, BuildRequest, CompilerBackend, ProcessBackend};
pub use coordinator::{BuildCallback, BuildCoordinator, Submission};
pub use error::{CompilerError, Result};
pub use result::{BuildId, CompilationResult};
pub use settings::{strip_namespace, BuildSettings};
pub use symbols::{SymbolScheme, PLACEMENT_CONSTRUCTOR_SYMBOL};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::{CompilerBackend, ProcessBackend};
    pub use crate::coordinator::{BuildCoordinator, Submission};
    pub use crate::error::{CompilerError, Result};
    pub use crate::result::CompilationResult;
    pub use crate::settings::BuildSettings;
    pub use crate::symbols::SymbolScheme;
}
