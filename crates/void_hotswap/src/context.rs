//! Reload context
//!
//! [`ReloadContext`] ties the pieces together for one host thread: a change
//! source, a build coordinator, a module loader, and one [`TypeWatcher`]
//! per live type. Call [`ReloadContext::update`] once per frame.

use crate::changes::{ChangeSource, FileChange, SourceClass};
use crate::class::LiveClass;
use crate::error::{ReloadError, Result};
use crate::loader::{DylibLoader, ModuleLoader};
use crate::watcher::{ReloadOptions, ReloadReport, ReportQueue, TypeWatcher};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use void_compiler::{BuildCoordinator, BuildSettings, CompilerBackend};

/// Type-erased view of a watcher used for change dispatch
trait ChangeTarget {
    fn tracks(&self, path: &Path) -> bool;
    fn on_change(&self, change: &FileChange, builds: &mut BuildCoordinator);
}

impl<T: LiveClass> ChangeTarget for TypeWatcher<T> {
    fn tracks(&self, path: &Path) -> bool {
        TypeWatcher::tracks(self, path)
    }

    fn on_change(&self, change: &FileChange, builds: &mut BuildCoordinator) {
        TypeWatcher::on_change(self, change, builds)
    }
}

/// Owner of all live type registries on one thread
pub struct ReloadContext {
    builds: BuildCoordinator,
    changes: Box<dyn ChangeSource>,
    loader: Rc<dyn ModuleLoader>,
    /// TypeId -> TypeWatcher<T>
    watchers: HashMap<TypeId, Box<dyn Any>>,
    /// Same watchers, in creation order, for change dispatch
    targets: Vec<Rc<dyn ChangeTarget>>,
    reports: ReportQueue,
}

impl ReloadContext {
    /// Create a context loading modules with [`DylibLoader`]
    pub fn new(backend: impl CompilerBackend + 'static, changes: impl ChangeSource + 'static) -> Self {
        Self {
            builds: BuildCoordinator::new(backend),
            changes: Box::new(changes),
            loader: Rc::new(DylibLoader::new()),
            watchers: HashMap::new(),
            targets: Vec::new(),
            reports: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Replace the module loader.
    ///
    /// Watchers created earlier keep the loader they were created with.
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Rc::new(loader);
        self
    }

    /// The registry for `T`, created on first use
    pub fn watcher<T: LiveClass>(&mut self) -> TypeWatcher<T> {
        if let Some(existing) = self
            .watchers
            .get(&TypeId::of::<T>())
            .and_then(|w| w.downcast_ref::<TypeWatcher<T>>())
        {
            return existing.clone();
        }

        let watcher = TypeWatcher::<T>::new(self.loader.clone(), self.reports.clone());
        self.watchers.insert(TypeId::of::<T>(), Box::new(watcher.clone()));
        self.targets.push(Rc::new(watcher.clone()));
        watcher
    }

    /// Whether a registry for `T` exists
    pub fn has_watcher<T: LiveClass>(&self) -> bool {
        self.watchers.contains_key(&TypeId::of::<T>())
    }

    /// Register a live instance of `T`.
    ///
    /// The first registration of a type fixes its sources, module path and
    /// build settings; later ones only add the instance.
    ///
    /// # Safety
    /// `instance` must stay valid and must not move until it is unwatched.
    pub unsafe fn watch<T: LiveClass>(
        &mut self,
        instance: NonNull<T>,
        type_name: &str,
        sources: &[PathBuf],
        module_path: impl AsRef<Path>,
        settings: BuildSettings,
    ) -> Result<()> {
        let watcher = self.watcher::<T>();
        watcher.watch(
            instance,
            type_name,
            sources,
            module_path.as_ref(),
            settings,
            self.changes.as_mut(),
        )
    }

    /// Unregister an instance. Returns false when it was not registered.
    pub fn unwatch<T: LiveClass>(&mut self, instance: NonNull<T>) -> bool {
        match self.watchers.get(&TypeId::of::<T>()) {
            Some(w) => w
                .downcast_ref::<TypeWatcher<T>>()
                .map(|w| w.unwatch(instance))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Set reload options for `T`
    pub fn set_options<T: LiveClass>(&mut self, options: ReloadOptions) {
        self.watcher::<T>().set_options(options);
    }

    /// Rebuild `T` as if its primary source had changed
    pub fn request_reload<T: LiveClass>(&mut self, class: SourceClass) -> Result<()> {
        let watcher = self.watcher::<T>();
        let Some(primary) = watcher.sources().into_iter().next() else {
            return Err(ReloadError::Watch(format!(
                "{} has no registered instances",
                std::any::type_name::<T>()
            )));
        };
        watcher.on_change(
            &FileChange {
                path: primary,
                class,
            },
            &mut self.builds,
        );
        Ok(())
    }

    /// Poll for changes, start builds, and apply finished ones.
    ///
    /// Returns what happened since the last update.
    pub fn update(&mut self) -> Vec<ReloadReport> {
        let changes = self.changes.poll();
        for change in &changes {
            log::debug!("Source changed: {} ({:?})", change.path.display(), change.class);
            for target in &self.targets {
                if target.tracks(&change.path) {
                    target.on_change(change, &mut self.builds);
                }
            }
        }

        self.builds.poll();
        std::mem::take(&mut *self.reports.borrow_mut())
    }

    /// Whether `watcher` was created by this context
    pub(crate) fn owns<T: LiveClass>(&self, watcher: &TypeWatcher<T>) -> bool {
        watcher.reports_to(&self.reports)
    }

    pub fn builds(&self) -> &BuildCoordinator {
        &self.builds
    }

    pub fn change_source(&self) -> &dyn ChangeSource {
        self.changes.as_ref()
    }
}
