//! Code modules
//!
//! A [`CodeModule`] owns the currently loaded code of one watched type. Its
//! identity is stable across reloads; only the loaded unit underneath is
//! swapped.
//!
//! ```text
//!  Unloaded ──update_handle──▶ Locked ──unlock_handle──▶ Unlocked
//!                                ▲                            │
//!                                └─update_handle, relock_handle┘
//! ```

use crate::error::{ReloadError, Result};
use crate::loader::{LoadedUnit, ModuleLoader};
use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;

/// Load state of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Nothing loaded yet
    Unloaded,
    /// Loaded and in service
    Locked,
    /// Old code still in service, file released for a rebuild
    Unlocked,
}

/// Handle returned by [`Signal::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

/// Module notification subscriber
pub type ModuleCallback = Rc<dyn Fn(&CodeModule)>;

/// Ordered, synchronous fan-out of module notifications.
///
/// Emission works on a snapshot of the subscriber list, so subscribers may
/// connect or disconnect while being notified.
#[derive(Default)]
pub struct Signal {
    slots: RefCell<Vec<(SlotId, ModuleCallback)>>,
    next_slot: Cell<u64>,
}

impl Signal {
    /// Subscribe; subscribers run in connection order
    pub fn connect(&self, callback: impl Fn(&CodeModule) + 'static) -> SlotId {
        let id = SlotId(self.next_slot.get());
        self.next_slot.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    /// Unsubscribe. Returns false when `id` was not connected.
    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(slot, _)| *slot != id);
        slots.len() != before
    }

    /// Number of subscribers
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    fn emit(&self, module: &CodeModule) {
        let snapshot: Vec<ModuleCallback> = self
            .slots
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in snapshot {
            callback(module);
        }
    }
}

/// One dynamically loaded code unit and its file on disk
pub struct CodeModule {
    path: PathBuf,
    loader: Rc<dyn ModuleLoader>,
    state: Cell<ModuleState>,
    unit: RefCell<Option<Box<dyn LoadedUnit>>>,
    /// Superseded units kept resident until instances are off them
    retired: RefCell<Vec<Box<dyn LoadedUnit>>>,
    /// Files moved aside by `unlock_handle`
    retired_files: RefCell<Vec<PathBuf>>,
    generation: Cell<u64>,
    cleanup: Signal,
    changed: Signal,
}

impl CodeModule {
    /// Create an unloaded module for the file at `path`
    pub fn new(path: impl Into<PathBuf>, loader: Rc<dyn ModuleLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            state: Cell::new(ModuleState::Unloaded),
            unit: RefCell::new(None),
            retired: RefCell::new(Vec::new()),
            retired_files: RefCell::new(Vec::new()),
            generation: Cell::new(0),
            cleanup: Signal::default(),
            changed: Signal::default(),
        }
    }

    /// Path of the module file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Module name derived from the file name
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn state(&self) -> ModuleState {
        self.state.get()
    }

    /// Number of successful loads so far
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Whether superseded units are still resident
    pub fn has_retired(&self) -> bool {
        !self.retired.borrow().is_empty()
    }

    /// Move the file aside so a backend can write a new one.
    ///
    /// The loaded code stays in service, and the module file only exists
    /// again once a build has produced it. Safe to call in any state.
    pub fn unlock_handle(&self) -> Result<()> {
        if self.state.get() != ModuleState::Locked {
            return Ok(());
        }

        if self.path.exists() {
            let aside = self.retired_file_path();
            std::fs::rename(&self.path, &aside)?;
            log::debug!("Moved {} aside to {}", self.path.display(), aside.display());
            self.retired_files.borrow_mut().push(aside);
        }

        self.state.set(ModuleState::Unlocked);
        Ok(())
    }

    /// Put the unit in service back in charge after a reload that did not
    /// happen.
    ///
    /// Restores the file moved aside by the last unlock, replacing whatever
    /// a failed build left at the module path.
    pub fn relock_handle(&self) -> Result<()> {
        if self.state.get() != ModuleState::Unlocked {
            return Ok(());
        }

        let aside = self.retired_files.borrow().last().cloned();
        if let Some(aside) = aside {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            std::fs::rename(&aside, &self.path)?;
            self.retired_files.borrow_mut().pop();
            log::debug!("Restored {} from {}", self.path.display(), aside.display());
        }

        self.state.set(ModuleState::Locked);
        Ok(())
    }

    fn retired_file_path(&self) -> PathBuf {
        let stem = self.name();
        let name = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}.retired.{}", stem, self.generation.get(), ext),
            None => format!("{}.{}.retired", stem, self.generation.get()),
        };
        self.path.with_file_name(name)
    }

    /// Load the module file, replacing the unit in service.
    ///
    /// The previous unit stays resident until [`release_retired`](Self::release_retired).
    pub fn update_handle(&self) -> Result<()> {
        if !self.path.exists() {
            return Err(ReloadError::module_not_found(self.name(), &self.path));
        }

        let unit = self.loader.load(&self.path)?;
        if let Some(previous) = self.unit.borrow_mut().replace(unit) {
            self.retired.borrow_mut().push(previous);
        }

        self.state.set(ModuleState::Locked);
        self.generation.set(self.generation.get() + 1);
        log::info!("Module {} now at generation {}", self.name(), self.generation.get());
        Ok(())
    }

    /// Unload superseded units and delete files moved aside
    pub fn release_retired(&self) {
        let units = std::mem::take(&mut *self.retired.borrow_mut());
        if !units.is_empty() {
            log::debug!("Releasing {} retired unit(s) of {}", units.len(), self.name());
        }
        drop(units);

        for file in self.retired_files.borrow_mut().drain(..) {
            if let Err(e) = std::fs::remove_file(&file) {
                log::debug!("Could not remove {}: {}", file.display(), e);
            }
        }
    }

    /// Address of a symbol in the unit in service.
    ///
    /// `None` when the symbol is missing or the module is not locked.
    pub fn symbol_address(&self, name: &str) -> Option<NonNull<c_void>> {
        if self.state.get() != ModuleState::Locked {
            return None;
        }
        self.unit.borrow().as_ref().and_then(|unit| unit.symbol(name))
    }

    /// Subscribe to "about to be replaced" notifications
    pub fn on_cleanup(&self, callback: impl Fn(&CodeModule) + 'static) -> SlotId {
        self.cleanup.connect(callback)
    }

    /// Subscribe to "was just replaced" notifications
    pub fn on_changed(&self, callback: impl Fn(&CodeModule) + 'static) -> SlotId {
        self.changed.connect(callback)
    }

    pub fn cleanup_signal(&self) -> &Signal {
        &self.cleanup
    }

    pub fn changed_signal(&self) -> &Signal {
        &self.changed
    }

    /// Notify that the unit is about to be replaced
    pub fn emit_cleanup(&self) {
        self.cleanup.emit(self);
    }

    /// Notify that the unit was replaced and instances migrated
    pub fn emit_changed(&self) {
        self.changed.emit(self);
    }
}

impl Drop for CodeModule {
    fn drop(&mut self) {
        self.unit.get_mut().take();
        self.release_retired();
    }
}
