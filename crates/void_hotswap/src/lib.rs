//! # void_hotswap - Live Class Reloading
//!
//! Keeps long-lived native objects running while their code is edited.
//! When a watched source changes, the type's module is rebuilt in the
//! background, loaded, and every registered instance is moved onto the new
//! code without the host restarting.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  ChangeSource   │────▶│  ReloadContext   │────▶│ BuildCoordinator│
//! │ (notify/memory) │     │  (per thread)    │     │ (void_compiler) │
//! └─────────────────┘     └────────┬─────────┘     └────────┬────────┘
//!                                  │                        │ result
//!                                  ▼                        ▼
//!                         ┌──────────────────┐     ┌─────────────────┐
//!                         │  TypeWatcher<T>  │◀────│   CodeModule    │
//!                         │ (instances of T) │     │ (loaded unit)   │
//!                         └──────────────────┘     └─────────────────┘
//! ```
//!
//! Implementation changes swap each instance's vtable pointer by default.
//! Header changes, or [`ReloadMethod::Reconstruct`], destroy each instance
//! and rebuild it in place through the module's placement constructor,
//! with [`LiveClass::save_state`] / [`LiveClass::load_state`] carrying
//! state across.
//!
//! ## Example
//!
//! ```ignore
//! use void_hotswap::prelude::*;
//!
//! let backend = ProcessBackend::new("c++")
//!     .args(["-shared", "-fPIC", "$(Sources)", "-o", "$(ModuleFile)"]);
//! let mut ctx = ReloadContext::new(backend, NotifyChangeSource::new()?);
//!
//! let decl = ClassDecl::from_header("app::Clear", "src/Clear.h", BuildSettings::with_defaults());
//! let clear = LiveBox::new(&mut ctx, Clear::new(), &decl)?;
//!
//! loop {
//!     for report in ctx.update() {
//!         if report.is_fatal() {
//!             // the instance is gone
//!         }
//!     }
//! }
//! ```

mod changes;
mod class;
mod context;
mod decl;
mod error;
mod live_box;
mod loader;
mod module;
mod slot;
mod watcher;

#[cfg(feature = "file-watcher")]
pub use changes::NotifyChangeSource;
pub use changes::{ChangeSource, FileChange, MemoryChangeSource, SourceClass, WatchOptions};
pub use class::{decode_state, encode_state, LiveClass};
pub use context::ReloadContext;
pub use decl::{discover_sources, module_path_for, ClassDecl};
pub use error::{ReloadError, Result};
pub use live_box::LiveBox;
pub use loader::{Dylib, DylibLoader, LoadedUnit, ModuleLoader};
pub use module::{CodeModule, ModuleCallback, ModuleState, Signal, SlotId};
pub use slot::{InstanceSlot, PlacementConstructor, RetiredSlot};
pub use watcher::{MigrationSummary, ReloadMethod, ReloadOptions, ReloadReport, TypeWatcher};

pub use void_compiler::strip_namespace;

/// Re-export commonly used types
pub mod prelude {
    #[cfg(feature = "file-watcher")]
    pub use crate::changes::NotifyChangeSource;
    pub use crate::changes::{ChangeSource, MemoryChangeSource, SourceClass};
    pub use crate::class::{decode_state, encode_state, LiveClass};
    pub use crate::context::ReloadContext;
    pub use crate::decl::ClassDecl;
    pub use crate::error::{ReloadError, Result};
    pub use crate::live_box::LiveBox;
    pub use crate::watcher::{ReloadMethod, ReloadOptions, ReloadReport};
    pub use void_compiler::{BuildSettings, ProcessBackend, SymbolScheme};
}
