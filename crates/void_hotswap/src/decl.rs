//! Class declarations and path conventions
//!
//! Live modules are laid out under the intermediate directory as
//!
//! ```text
//! <intermediate>/runtime/<Type>/build/<Type>.dll
//! ```
//!
//! and a class declared in `Foo.h` is built from `Foo.cpp` next to it.

use std::path::{Path, PathBuf};
use void_compiler::{strip_namespace, BuildSettings};

/// Conventional module path for a type
pub fn module_path_for(intermediate: impl AsRef<Path>, type_name: &str) -> PathBuf {
    let name = strip_namespace(type_name);
    intermediate
        .as_ref()
        .join("runtime")
        .join(name)
        .join("build")
        .join(format!("{}{}", name, std::env::consts::DLL_SUFFIX))
}

/// Sources of a class declared in `header`: the sibling `.cpp` when it
/// exists, then the header itself.
pub fn discover_sources(header: impl AsRef<Path>) -> Vec<PathBuf> {
    let header = header.as_ref();
    let mut sources = Vec::with_capacity(2);
    let implementation = header.with_extension("cpp");
    if implementation != header && implementation.exists() {
        sources.push(implementation);
    }
    sources.push(header.to_path_buf());
    sources
}

/// Everything needed to register instances of one type
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub type_name: String,
    /// Watched sources; the first one keys the build
    pub sources: Vec<PathBuf>,
    pub module_path: PathBuf,
    pub settings: BuildSettings,
}

impl ClassDecl {
    pub fn new(
        type_name: impl Into<String>,
        sources: Vec<PathBuf>,
        module_path: impl Into<PathBuf>,
        settings: BuildSettings,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            sources,
            module_path: module_path.into(),
            settings,
        }
    }

    /// Declaration following the path conventions: sources discovered from
    /// `header`, module under the settings' intermediate directory.
    pub fn from_header(
        type_name: impl Into<String>,
        header: impl AsRef<Path>,
        settings: BuildSettings,
    ) -> Self {
        let type_name = type_name.into();
        let module_path = module_path_for(settings.get_intermediate_path(), &type_name);
        let settings = if settings.get_output_path().as_os_str().is_empty() {
            match module_path.parent() {
                Some(dir) => settings.output_path(dir),
                None => settings,
            }
        } else {
            settings
        };

        Self {
            sources: discover_sources(header),
            type_name,
            module_path,
            settings,
        }
    }
}
