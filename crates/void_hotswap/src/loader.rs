//! Dynamic code loading
//!
//! A [`ModuleLoader`] turns a file on disk into a [`LoadedUnit`] that can
//! answer symbol lookups. [`DylibLoader`] does this with the platform's
//! dynamic linker.

use crate::error::{ReloadError, Result};
use libloading::{Library, Symbol};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// One loaded unit of code
pub trait LoadedUnit {
    /// Address of an exported function or data symbol
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>>;

    /// File the unit was loaded from
    fn path(&self) -> &Path;
}

/// Loads code units from disk
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedUnit>>;
}

static SHADOW_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Loader backed by the platform dynamic linker.
///
/// By default every load goes through a uniquely named shadow copy of the
/// module. The dynamic linker caches libraries by name, so reopening the
/// same path would hand back the old code; the copy also leaves the built
/// file free for the next build.
#[derive(Debug, Clone, Copy)]
pub struct DylibLoader {
    shadow_copy: bool,
}

impl DylibLoader {
    /// Loader using shadow copies
    pub fn new() -> Self {
        Self { shadow_copy: true }
    }

    /// Loader opening modules in place
    pub fn in_place() -> Self {
        Self { shadow_copy: false }
    }

    fn shadow_path(path: &Path) -> PathBuf {
        let n = SHADOW_COUNTER.fetch_add(1, Ordering::Relaxed);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("module");
        let name = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.live{}.{}", stem, n, ext),
            None => format!("{}.live{}", stem, n),
        };
        path.with_file_name(name)
    }
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared library opened through `libloading`
pub struct Dylib {
    library: Option<Library>,
    path: PathBuf,
    shadow: Option<PathBuf>,
}

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedUnit>> {
        let shadow = if self.shadow_copy {
            let shadow = Self::shadow_path(path);
            std::fs::copy(path, &shadow)?;
            Some(shadow)
        } else {
            None
        };
        let open_path = shadow.as_deref().unwrap_or(path);

        // Safety: running a module's initializers is the point of loading it;
        // live modules are built from the host's own sources.
        let library = match unsafe { Library::new(open_path) } {
            Ok(library) => library,
            Err(e) => {
                if let Some(shadow) = &shadow {
                    let _ = std::fs::remove_file(shadow);
                }
                return Err(ReloadError::load_error(path, e.to_string()));
            }
        };

        log::info!("Loaded module {}", path.display());

        Ok(Box::new(Dylib {
            library: Some(library),
            path: path.to_path_buf(),
            shadow,
        }))
    }
}

impl LoadedUnit for Dylib {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);

        let library = self.library.as_ref()?;
        // Safety: the symbol is read as a raw address and never called here.
        let symbol: Symbol<'_, *mut c_void> = unsafe { library.get(&bytes).ok()? };
        NonNull::new(*symbol)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Dylib {
    fn drop(&mut self) {
        log::debug!("Unloading module {}", self.path.display());
        drop(self.library.take());

        if let Some(shadow) = &self.shadow {
            if let Err(e) = std::fs::remove_file(shadow) {
                log::debug!("Could not remove shadow copy {}: {}", shadow.display(), e);
            }
        }
    }
}
