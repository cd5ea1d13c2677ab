//! Per-type instance tracking and migration
//!
//! A [`TypeWatcher`] owns everything reloading needs for one live type: the
//! registered instances, the module their code comes from, and the build
//! settings. When a source changes it unlocks the module and submits a
//! build; when the build reports back it loads the new code and moves every
//! instance onto it.

use crate::changes::{ChangeSource, FileChange, SourceClass, WatchOptions};
use crate::class::LiveClass;
use crate::error::{ReloadError, Result};
use crate::loader::ModuleLoader;
use crate::module::CodeModule;
use crate::slot::{InstanceSlot, PlacementConstructor};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;
use void_compiler::{
    BuildCoordinator, BuildId, BuildSettings, CompilationResult, SymbolScheme,
    PLACEMENT_CONSTRUCTOR_SYMBOL,
};

/// How instances are moved onto new code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadMethod {
    /// Overwrite each instance's vtable pointer. Keeps all data; only valid
    /// while the object layout is unchanged.
    #[default]
    SwapVtable,
    /// Destroy each instance and construct it again in place
    Reconstruct,
}

/// Per-type reload options
#[derive(Debug, Clone, Default)]
pub struct ReloadOptions {
    method: ReloadMethod,
    build_settings: Option<BuildSettings>,
}

impl ReloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Method used for implementation changes. Header changes always
    /// reconstruct.
    pub fn method(mut self, method: ReloadMethod) -> Self {
        self.method = method;
        self
    }

    /// Settings used instead of the ones given at registration
    pub fn build_settings(mut self, settings: BuildSettings) -> Self {
        self.build_settings = Some(settings);
        self
    }

    pub fn get_method(&self) -> ReloadMethod {
        self.method
    }

    pub fn get_build_settings(&self) -> Option<&BuildSettings> {
        self.build_settings.as_ref()
    }
}

/// Outcome of one successful migration
#[derive(Debug, Clone)]
pub struct MigrationSummary {
    pub method: ReloadMethod,
    /// Instances now running the new code
    pub migrated: usize,
    /// Instances destroyed and not reconstructed
    pub lost: usize,
    /// Module generation after the reload
    pub generation: u64,
    pub build_id: BuildId,
    /// Time the build took
    pub build_time: Duration,
}

/// Result of one reload attempt for one type
#[derive(Debug)]
pub struct ReloadReport {
    pub type_name: String,
    pub module_path: PathBuf,
    pub outcome: Result<MigrationSummary>,
}

impl ReloadReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_fatal(&self) -> bool {
        self.outcome.as_ref().err().map(ReloadError::is_fatal).unwrap_or(false)
    }

    fn log(&self) {
        match &self.outcome {
            Ok(summary) => log::info!(
                "Reloaded {}: {} instance(s) via {:?}, generation {}",
                self.type_name,
                summary.migrated,
                summary.method,
                summary.generation
            ),
            Err(e) if e.is_fatal() => log::error!("{}", e),
            Err(e) => log::error!("Reload of {} failed: {}", self.type_name, e),
        }
    }
}

/// Reports shared by every watcher of a context
pub(crate) type ReportQueue = Rc<RefCell<Vec<ReloadReport>>>;

struct WatcherState<T> {
    type_name: String,
    instances: Vec<NonNull<T>>,
    /// Addresses destroyed by a failed reconstruction
    lost: Vec<usize>,
    module: Option<Rc<CodeModule>>,
    sources: Vec<PathBuf>,
    settings: BuildSettings,
    options: ReloadOptions,
    /// Strongest change not yet applied
    pending: Option<SourceClass>,
}

/// Registry of the live instances of one type.
///
/// Handles are cheap to clone and share the same registry. Not `Send`: all
/// use happens on the thread that owns the instances.
pub struct TypeWatcher<T: LiveClass> {
    state: Rc<RefCell<WatcherState<T>>>,
    loader: Rc<dyn ModuleLoader>,
    reports: ReportQueue,
}

impl<T: LiveClass> Clone for TypeWatcher<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            loader: self.loader.clone(),
            reports: self.reports.clone(),
        }
    }
}

impl<T: LiveClass> TypeWatcher<T> {
    pub(crate) fn new(loader: Rc<dyn ModuleLoader>, reports: ReportQueue) -> Self {
        Self {
            state: Rc::new(RefCell::new(WatcherState {
                type_name: String::new(),
                instances: Vec::new(),
                lost: Vec::new(),
                module: None,
                sources: Vec::new(),
                settings: BuildSettings::new(),
                options: ReloadOptions::default(),
                pending: None,
            })),
            loader,
            reports,
        }
    }

    /// Register an instance.
    ///
    /// The first registration fixes the type's sources, module path and
    /// settings, and subscribes the sources with `changes`.
    ///
    /// # Safety
    /// `instance` must stay valid and must not move until it is unwatched.
    pub(crate) unsafe fn watch(
        &self,
        instance: NonNull<T>,
        type_name: &str,
        sources: &[PathBuf],
        module_path: &Path,
        settings: BuildSettings,
        changes: &mut dyn ChangeSource,
    ) -> Result<()> {
        let address = instance.as_ptr() as usize;
        let mut state = self.state.borrow_mut();

        if state.instances.contains(&instance) {
            return Err(ReloadError::AlreadyWatched {
                type_name: state.type_name.clone(),
                address,
            });
        }

        if state.module.is_none() {
            if sources.is_empty() {
                return Err(ReloadError::Watch(format!("no source files for {}", type_name)));
            }

            let mut settings = settings;
            settings.apply_type_defaults(type_name);
            if settings.get_output_path().as_os_str().is_empty() {
                if let Some(dir) = module_path.parent() {
                    settings = settings.output_path(dir);
                }
            }
            if settings.is_verbose() {
                log::info!("{}", settings.describe());
            }

            changes.watch(sources, WatchOptions::default())?;

            state.type_name = type_name.to_string();
            state.sources = sources.to_vec();
            state.settings = settings;
            state.module = Some(Rc::new(CodeModule::new(module_path, self.loader.clone())));
            log::info!("Watching {} ({})", type_name, module_path.display());
        }

        state.lost.retain(|a| *a != address);
        state.instances.push(instance);
        log::debug!("Registered {} instance {:#x}", state.type_name, address);
        Ok(())
    }

    /// Remove an instance. Returns false when it was not registered.
    ///
    /// The module and source subscriptions stay in place for later
    /// registrations.
    pub fn unwatch(&self, instance: NonNull<T>) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.instances.len();
        state.instances.retain(|p| *p != instance);
        let removed = state.instances.len() != before;
        if removed {
            log::debug!(
                "Unregistered {} instance {:#x}",
                state.type_name,
                instance.as_ptr() as usize
            );
        }
        removed
    }

    pub fn is_watched(&self, instance: NonNull<T>) -> bool {
        self.state.borrow().instances.contains(&instance)
    }

    /// Whether the instance was destroyed by a failed reconstruction
    pub fn is_lost(&self, instance: NonNull<T>) -> bool {
        let address = instance.as_ptr() as usize;
        self.state.borrow().lost.contains(&address)
    }

    /// Forget a lost address once its memory has been released.
    /// Returns whether it was lost.
    pub fn forget_lost(&self, instance: NonNull<T>) -> bool {
        let address = instance.as_ptr() as usize;
        let mut state = self.state.borrow_mut();
        let before = state.lost.len();
        state.lost.retain(|a| *a != address);
        state.lost.len() != before
    }

    pub fn instance_count(&self) -> usize {
        self.state.borrow().instances.len()
    }

    /// Registered instances, in registration order
    pub fn instances(&self) -> Vec<NonNull<T>> {
        self.state.borrow().instances.clone()
    }

    pub fn type_name(&self) -> String {
        self.state.borrow().type_name.clone()
    }

    /// The type's module; `None` before the first registration
    pub fn module(&self) -> Option<Rc<CodeModule>> {
        self.state.borrow().module.clone()
    }

    pub fn sources(&self) -> Vec<PathBuf> {
        self.state.borrow().sources.clone()
    }

    pub fn settings(&self) -> BuildSettings {
        self.state.borrow().settings.clone()
    }

    pub fn options(&self) -> ReloadOptions {
        self.state.borrow().options.clone()
    }

    pub fn set_options(&self, options: ReloadOptions) {
        self.state.borrow_mut().options = options;
    }

    /// Whether `path` is one of the type's sources
    pub fn tracks(&self, path: &Path) -> bool {
        self.state.borrow().sources.iter().any(|p| p == path)
    }

    /// Whether this watcher reports into `queue`, i.e. belongs to the
    /// context owning that queue
    pub(crate) fn reports_to(&self, queue: &ReportQueue) -> bool {
        Rc::ptr_eq(&self.reports, queue)
    }

    pub(crate) fn module_path(&self) -> PathBuf {
        self.state
            .borrow()
            .module
            .as_ref()
            .map(|m| m.path().to_path_buf())
            .unwrap_or_default()
    }

    /// React to a source change: release the module file and submit a
    /// build whose result migrates the instances.
    pub(crate) fn on_change(&self, change: &FileChange, builds: &mut BuildCoordinator) {
        if let Err(e) = self.request_build(change, builds) {
            self.report(Err(e));
        }
    }

    fn request_build(&self, change: &FileChange, builds: &mut BuildCoordinator) -> Result<()> {
        let (module, primary, mut settings) = {
            let mut state = self.state.borrow_mut();
            let Some(module) = state.module.clone() else {
                return Ok(());
            };
            state.pending = state.pending.max(Some(change.class));

            let mut settings = match state.options.get_build_settings() {
                Some(settings) => settings.clone(),
                None => state.settings.clone(),
            };
            settings.apply_type_defaults(&state.type_name);
            if settings.get_output_path().as_os_str().is_empty() {
                if let Some(dir) = module.path().parent() {
                    settings = settings.output_path(dir);
                }
            }
            (module, state.sources[0].clone(), settings)
        };

        log::info!("{} changed, rebuilding {}", change.path.display(), module.name());
        module.unlock_handle()?;

        if change.class == SourceClass::Header {
            settings = settings.regenerate_precompiled_header(true);
        }
        let vtable_symbol = settings.vtable_symbol();
        let scheme = settings.get_symbol_scheme();
        let module_name = settings.get_module_name().to_string();

        let watcher = self.clone();
        let submitted = builds.submit(vec![primary], settings, move |result| {
            watcher.complete(result, &module_name, &vtable_symbol, scheme);
        });
        if let Err(e) = submitted {
            self.relock();
            return Err(e.into());
        }
        Ok(())
    }

    /// Put the unit in service back in place after a cycle that produced nothing to load
    fn relock(&self) {
        let module = self.state.borrow().module.clone();
        if let Some(module) = module {
            if let Err(e) = module.relock_handle() {
                log::warn!("Failed to relock {}: {}", module.path().display(), e);
            }
        }
    }

    fn report(&self, outcome: Result<MigrationSummary>) {
        let report = ReloadReport {
            type_name: self.type_name(),
            module_path: self.module_path(),
            outcome,
        };
        report.log();
        self.reports.borrow_mut().push(report);
    }

    /// Put back a change that could not be applied
    fn restore_pending(&self, kind: SourceClass) {
        let mut state = self.state.borrow_mut();
        state.pending = state.pending.max(Some(kind));
    }

    fn complete(
        &self,
        result: &CompilationResult,
        module_name: &str,
        vtable_symbol: &str,
        scheme: SymbolScheme,
    ) {
        if !result.is_success() {
            if !result.is_superseded() {
                self.relock();
            }
            self.report(Err(ReloadError::BuildFailed {
                module: module_name.to_string(),
                path: self.module_path(),
                diagnostics: result.diagnostics().to_string(),
            }));
            return;
        }
        if result.is_superseded() {
            log::debug!("Build {:?} of {} superseded, skipping", result.build_id(), module_name);
            return;
        }

        let (module, kind, method) = {
            let mut state = self.state.borrow_mut();
            let Some(module) = state.module.clone() else {
                return;
            };
            let Some(kind) = state.pending.take() else {
                log::debug!("No pending change for {}, skipping", module_name);
                return;
            };
            let method = match kind {
                SourceClass::Header => ReloadMethod::Reconstruct,
                SourceClass::Implementation => state.options.get_method(),
            };
            (module, kind, method)
        };

        if !module.path().exists() {
            self.restore_pending(kind);
            self.relock();
            self.report(Err(ReloadError::module_not_found(module_name, module.path())));
            return;
        }

        module.emit_cleanup();
        if let Err(e) = module.update_handle() {
            self.restore_pending(kind);
            self.relock();
            self.report(Err(e));
            return;
        }

        let migration = match method {
            ReloadMethod::SwapVtable => {
                let offset = scheme.address_point_offset();
                module
                    .symbol_address(vtable_symbol)
                    .and_then(|sym| NonNull::new(sym.as_ptr().cast::<u8>().wrapping_add(offset).cast::<c_void>()))
                    .map(Migration::Swap)
                    .ok_or_else(|| ReloadError::symbol_not_found(vtable_symbol, module.path()))
            }
            ReloadMethod::Reconstruct => module
                .symbol_address(PLACEMENT_CONSTRUCTOR_SYMBOL)
                .map(|sym| {
                    // Safety: the symbol is the module's placement constructor.
                    Migration::Rebuild(unsafe {
                        std::mem::transmute::<*mut c_void, PlacementConstructor>(sym.as_ptr())
                    })
                })
                .ok_or_else(|| ReloadError::symbol_not_found(PLACEMENT_CONSTRUCTOR_SYMBOL, module.path())),
        };

        let migration = match migration {
            Ok(migration) => migration,
            Err(e) => {
                self.restore_pending(kind);
                self.report(Err(e));
                return;
            }
        };

        let instances = self.instances();
        let mut migrated = 0;
        let mut lost = Vec::new();
        for instance in instances {
            // Safety: registered instances are valid until unwatched.
            match unsafe { migration.apply(instance) } {
                Ok(()) => migrated += 1,
                Err(reason) => lost.push((instance, reason)),
            }
        }

        let type_name = self.type_name();
        for (instance, reason) in &lost {
            let address = instance.as_ptr() as usize;
            {
                let mut state = self.state.borrow_mut();
                state.instances.retain(|p| p != instance);
                state.lost.push(address);
            }
            self.report(Err(ReloadError::InstanceLost {
                type_name: type_name.clone(),
                address,
                reason: reason.clone(),
            }));
        }

        module.emit_changed();
        module.release_retired();

        self.report(Ok(MigrationSummary {
            method,
            migrated,
            lost: lost.len(),
            generation: module.generation(),
            build_id: result.build_id(),
            build_time: result.elapsed(),
        }));
    }
}

/// Resolved migration for one reload
enum Migration {
    Swap(NonNull<c_void>),
    Rebuild(PlacementConstructor),
}

impl Migration {
    /// Move one instance onto the new code.
    ///
    /// # Safety
    /// `instance` must point to a live `T` that nothing else borrows.
    unsafe fn apply<T: LiveClass>(&self, instance: NonNull<T>) -> std::result::Result<(), String> {
        let mut slot = InstanceSlot::new(instance);
        let value = slot.get_mut();
        value.pre_reload();
        let saved = value.save_state();

        let mut slot = match self {
            Migration::Swap(vtable) => {
                slot.rebind_code_identity(*vtable);
                slot
            }
            Migration::Rebuild(constructor) => match slot.retire().rehost(*constructor) {
                Ok(slot) => slot,
                Err(_) => return Err("placement constructor did not rebuild the instance in place".into()),
            },
        };

        let value = slot.get_mut();
        value.post_reload();
        if let Some(state) = saved {
            value.load_state(&state);
        }
        Ok(())
    }
}
