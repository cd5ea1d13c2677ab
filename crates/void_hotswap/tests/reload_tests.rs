//! Integration tests for void_hotswap
//!
//! Drives full reload cycles with an in-memory change source, a backend the
//! test finishes by hand, and a loader resolving symbols to static tables.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::rc::Rc;
use void_compiler::{BuildCompletion, BuildRequest, BuildSettings, CompilerBackend, SymbolScheme};
use void_hotswap::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn record(event: impl Into<String>) {
    EVENTS.with(|e| e.borrow_mut().push(event.into()));
}

fn take_events() -> Vec<String> {
    EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

// ========== Live type ==========

#[repr(C)]
struct WidgetTable {
    version: u32,
}

static V1: WidgetTable = WidgetTable { version: 1 };
static V2: WidgetTable = WidgetTable { version: 2 };
static V3: WidgetTable = WidgetTable { version: 3 };

/// Itanium-style vtable group: the address point follows two header words
#[repr(C)]
struct ItaniumTable {
    offset_to_top: usize,
    type_info: usize,
    table: WidgetTable,
}

static ITANIUM_V2: ItaniumTable = ItaniumTable {
    offset_to_top: 0,
    type_info: 0,
    table: WidgetTable { version: 2 },
};

#[repr(C)]
struct Widget {
    vtable: *const WidgetTable,
    name: String,
    counter: u32,
}

impl Widget {
    fn new(name: &str) -> Self {
        Self {
            vtable: &V1,
            name: name.to_string(),
            counter: 0,
        }
    }

    fn version(&self) -> u32 {
        unsafe { (*self.vtable).version }
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        record(format!("drop {}", self.name));
    }
}

unsafe impl LiveClass for Widget {
    fn pre_reload(&mut self) {
        record(format!("pre {}", self.name));
    }

    fn post_reload(&mut self) {
        record(format!("post {}", self.name));
    }

    fn save_state(&self) -> Option<Vec<u8>> {
        encode_state(&(self.name.clone(), self.counter))
    }

    fn load_state(&mut self, state: &[u8]) {
        if let Some((name, counter)) = decode_state::<(String, u32)>(state) {
            self.name = name;
            self.counter = counter;
        }
    }
}

unsafe extern "C" fn construct_widget(at: *mut c_void) -> *mut c_void {
    record("construct");
    at.cast::<Widget>().write(Widget {
        vtable: &V2,
        name: String::new(),
        counter: 0,
    });
    at
}

unsafe extern "C" fn construct_nothing(_at: *mut c_void) -> *mut c_void {
    std::ptr::null_mut()
}

// ========== Fake loader ==========

struct FakeUnit {
    path: PathBuf,
    symbols: HashMap<String, usize>,
}

impl LoadedUnit for FakeUnit {
    fn symbol(&self, name: &str) -> Option<NonNull<c_void>> {
        self.symbols
            .get(name)
            .and_then(|addr| NonNull::new(*addr as *mut c_void))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Loader whose units export whatever the test configured at load time
#[derive(Clone, Default)]
struct FakeLoader {
    exports: Rc<RefCell<HashMap<String, usize>>>,
}

impl FakeLoader {
    fn export(&self, name: &str, address: usize) {
        self.exports.borrow_mut().insert(name.into(), address);
    }

    fn export_vtable(&self, table: &'static WidgetTable) {
        self.export("rt_vtable_Widget", table as *const WidgetTable as usize);
    }

    fn export_constructor(&self, constructor: PlacementConstructor) {
        self.exports.borrow_mut().insert(
            void_compiler::PLACEMENT_CONSTRUCTOR_SYMBOL.into(),
            constructor as usize,
        );
    }
}

impl ModuleLoader for FakeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn LoadedUnit>> {
        Ok(Box::new(FakeUnit {
            path: path.to_path_buf(),
            symbols: self.exports.borrow().clone(),
        }))
    }
}

// ========== Fake backend ==========

enum Outcome {
    Built,
    BuiltWithoutArtifact,
    Failed,
}

#[derive(Clone, Default)]
struct FakeBackend {
    started: Rc<RefCell<Vec<(BuildRequest, BuildCompletion)>>>,
    invocations: Rc<Cell<usize>>,
}

impl CompilerBackend for FakeBackend {
    fn build(&self, request: BuildRequest, completion: BuildCompletion) {
        self.invocations.set(self.invocations.get() + 1);
        self.started.borrow_mut().push((request, completion));
    }
}

impl FakeBackend {
    fn invocations(&self) -> usize {
        self.invocations.get()
    }

    fn running(&self) -> usize {
        self.started.borrow().len()
    }

    fn last_settings(&self) -> BuildSettings {
        self.started.borrow().last().unwrap().0.settings.clone()
    }

    fn finish_next(&self, outcome: Outcome) {
        let (request, completion) = self.started.borrow_mut().remove(0);
        let result = match outcome {
            Outcome::Built => {
                let artifact = request.settings.module_output_file();
                std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
                std::fs::write(&artifact, b"module").unwrap();
                request.succeeded("")
            }
            Outcome::BuiltWithoutArtifact => request.succeeded(""),
            Outcome::Failed => request.failed("Widget.cpp(3): error: expected ';'"),
        };
        completion.finish(result);
    }
}

// ========== Harness ==========

struct Harness {
    dir: tempfile::TempDir,
    ctx: ReloadContext,
    backend: FakeBackend,
    loader: FakeLoader,
    changes: MemoryChangeSource,
    decl: ClassDecl,
    cpp: PathBuf,
    header: PathBuf,
}

fn harness() -> Harness {
    harness_with(SymbolScheme::Export)
}

fn harness_with(scheme: SymbolScheme) -> Harness {
    init_logging();
    take_events();

    let dir = tempfile::tempdir().unwrap();
    let cpp = dir.path().join("Widget.cpp");
    let header = dir.path().join("Widget.h");
    std::fs::write(&cpp, "// widget").unwrap();
    std::fs::write(&header, "// widget").unwrap();

    let settings = BuildSettings::new()
        .intermediate_path(dir.path().join("obj"))
        .symbol_scheme(scheme);
    let decl = ClassDecl::from_header("Widget", &header, settings);

    let backend = FakeBackend::default();
    let loader = FakeLoader::default();
    let changes = MemoryChangeSource::new();
    let ctx = ReloadContext::new(backend.clone(), changes.clone()).with_loader(loader.clone());

    Harness {
        dir,
        ctx,
        backend,
        loader,
        changes,
        decl,
        cpp,
        header,
    }
}

struct Counters {
    cleanups: Rc<Cell<usize>>,
    changed: Rc<Cell<usize>>,
}

fn subscribe(h: &mut Harness) -> Counters {
    let module = h.ctx.watcher::<Widget>().module().unwrap();
    let counters = Counters {
        cleanups: Rc::new(Cell::new(0)),
        changed: Rc::new(Cell::new(0)),
    };
    let c = counters.cleanups.clone();
    module.on_cleanup(move |_| c.set(c.get() + 1));
    let c = counters.changed.clone();
    module.on_changed(move |_| c.set(c.get() + 1));
    counters
}

// ========== Tests ==========

#[test]
fn test_registration_watches_sources() {
    let mut h = harness();
    assert_eq!(h.decl.sources, vec![h.cpp.clone(), h.header.clone()]);

    let _w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();

    assert!(h.changes.is_watching(&h.cpp));
    assert!(h.changes.is_watching(&h.header));
    assert_eq!(h.ctx.watcher::<Widget>().instance_count(), 1);
    assert_eq!(h.backend.invocations(), 0);

    let module = h.ctx.watcher::<Widget>().module().unwrap();
    assert_eq!(module.state(), ModuleState::Unloaded);
    assert_eq!(module.path(), h.decl.module_path.as_path());
}

#[test]
fn test_implementation_change_swaps_vtables() {
    let mut h = harness();
    let mut w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    w.get_mut(&h.ctx).unwrap().counter = 7;
    let counters = subscribe(&mut h);
    h.loader.export_vtable(&V2);

    assert!(h.changes.simulate_modify(&h.cpp));
    assert!(h.ctx.update().is_empty());
    assert_eq!(h.backend.invocations(), 1);
    assert!(!h.backend.last_settings().regenerates_precompiled_header());

    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert_eq!(reports.len(), 1);
    let summary = reports[0].outcome.as_ref().unwrap();
    assert_eq!(summary.method, ReloadMethod::SwapVtable);
    assert_eq!(summary.migrated, 1);
    assert_eq!(summary.generation, 1);
    assert_eq!(reports[0].type_name, "Widget");

    let widget = w.get(&h.ctx).unwrap();
    assert_eq!(widget.version(), 2);
    assert_eq!(widget.counter, 7);
    assert_eq!(take_events(), vec!["pre a", "post a"]);
    assert_eq!(counters.cleanups.get(), 1);
    assert_eq!(counters.changed.get(), 1);
}

#[test]
fn test_missing_artifact_reports_module_not_found() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let counters = subscribe(&mut h);
    h.loader.export_vtable(&V2);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::BuiltWithoutArtifact);
    let reports = h.ctx.update();

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].outcome, Err(ReloadError::ModuleNotFound { .. })));
    assert!(!reports[0].is_fatal());
    assert_eq!(w.get(&h.ctx).unwrap().version(), 1);
    assert!(take_events().is_empty());
    assert_eq!(counters.cleanups.get(), 0);
    assert_eq!(counters.changed.get(), 0);
}

#[test]
fn test_header_change_reconstructs_with_state() {
    let mut h = harness();
    let mut w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    w.get_mut(&h.ctx).unwrap().counter = 7;
    h.loader.export_constructor(construct_widget);

    h.changes.simulate_modify(&h.header);
    h.ctx.update();
    assert!(h.backend.last_settings().regenerates_precompiled_header());

    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert_eq!(reports.len(), 1);
    let summary = reports[0].outcome.as_ref().unwrap();
    assert_eq!(summary.method, ReloadMethod::Reconstruct);
    assert_eq!(summary.migrated, 1);

    let widget = w.get(&h.ctx).unwrap();
    assert_eq!(widget.version(), 2);
    assert_eq!(widget.name, "a");
    assert_eq!(widget.counter, 7);
    assert_eq!(take_events(), vec!["pre a", "drop a", "construct", "post "]);
}

#[test]
fn test_reconstruct_option_applies_to_implementation_changes() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    h.ctx
        .set_options::<Widget>(ReloadOptions::new().method(ReloadMethod::Reconstruct));
    h.loader.export_constructor(construct_widget);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    let summary = reports[0].outcome.as_ref().unwrap();
    assert_eq!(summary.method, ReloadMethod::Reconstruct);
    assert_eq!(w.get(&h.ctx).unwrap().name, "a");
    assert!(take_events().contains(&"construct".to_string()));
}

#[test]
fn test_instances_migrate_in_registration_order() {
    let mut h = harness();
    let boxes: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| LiveBox::new(&mut h.ctx, Widget::new(name), &h.decl).unwrap())
        .collect();
    h.loader.export_vtable(&V2);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert_eq!(reports[0].outcome.as_ref().unwrap().migrated, 3);
    assert!(boxes.iter().all(|b| b.get(&h.ctx).unwrap().version() == 2));
    assert_eq!(
        take_events(),
        vec!["pre a", "post a", "pre b", "post b", "pre c", "post c"]
    );
}

#[test]
fn test_failed_reconstruction_is_fatal() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let ptr = w.as_ptr();
    h.loader.export_constructor(construct_nothing);

    h.changes.simulate_modify(&h.header);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert_eq!(reports.len(), 2);
    assert!(reports[0].is_fatal());
    match &reports[0].outcome {
        Err(ReloadError::InstanceLost { address, .. }) => {
            assert_eq!(*address, ptr as usize)
        }
        other => panic!("expected InstanceLost, got {:?}", other),
    }
    let summary = reports[1].outcome.as_ref().unwrap();
    assert_eq!(summary.migrated, 0);
    assert_eq!(summary.lost, 1);

    assert!(w.is_lost());
    assert!(w.get(&h.ctx).is_none());
    assert_eq!(h.ctx.watcher::<Widget>().instance_count(), 0);
    assert_eq!(take_events(), vec!["pre a", "drop a"]);

    drop(w);
    assert!(take_events().is_empty());
}

#[test]
fn test_missing_vtable_symbol_leaves_instances_untouched() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let counters = subscribe(&mut h);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert!(matches!(reports[0].outcome, Err(ReloadError::SymbolNotFound { .. })));
    assert_eq!(w.get(&h.ctx).unwrap().version(), 1);
    assert!(take_events().is_empty());
    assert_eq!(counters.changed.get(), 0);

    // The change is still pending and applies with the next good build
    h.loader.export_vtable(&V2);
    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert!(reports[0].is_success());
    assert_eq!(w.get(&h.ctx).unwrap().version(), 2);
    assert_eq!(counters.changed.get(), 1);
}

#[test]
fn test_failed_build_is_reported_and_nothing_migrates() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    h.loader.export_vtable(&V2);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Failed);
    let reports = h.ctx.update();

    match &reports[0].outcome {
        Err(ReloadError::BuildFailed { diagnostics, .. }) => {
            assert!(diagnostics.contains("expected ';'"))
        }
        other => panic!("expected BuildFailed, got {:?}", other),
    }
    assert_eq!(w.get(&h.ctx).unwrap().version(), 1);
    assert!(take_events().is_empty());
}

#[test]
fn test_repeated_changes_build_once_and_migrate_once() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    h.loader.export_constructor(construct_widget);

    h.changes.simulate_modify(&h.cpp);
    h.changes.simulate_modify(&h.cpp);
    h.changes.simulate_modify(&h.header);
    assert!(h.ctx.update().is_empty());
    assert_eq!(h.backend.invocations(), 1);

    // The first result is superseded by the queued follow-up
    h.backend.finish_next(Outcome::Built);
    assert!(h.ctx.update().is_empty());
    assert_eq!(h.backend.invocations(), 2);
    assert_eq!(h.backend.running(), 1);

    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome.as_ref().unwrap().method, ReloadMethod::Reconstruct);
    assert_eq!(w.get(&h.ctx).unwrap().version(), 2);
    let events = take_events();
    assert_eq!(events.iter().filter(|e| e.starts_with("pre")).count(), 1);
}

#[test]
fn test_consecutive_reloads_release_old_code() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();

    for table in [&V2, &V3] {
        h.loader.export_vtable(table);
        h.changes.simulate_modify(&h.cpp);
        h.ctx.update();
        h.backend.finish_next(Outcome::Built);
        assert!(h.ctx.update()[0].is_success());
    }

    assert_eq!(w.get(&h.ctx).unwrap().version(), 3);
    let module = h.ctx.watcher::<Widget>().module().unwrap();
    assert_eq!(module.generation(), 2);
    assert_eq!(module.state(), ModuleState::Locked);
    assert!(!module.has_retired());

    let build_dir = h.decl.module_path.parent().unwrap();
    assert_eq!(std::fs::read_dir(build_dir).unwrap().count(), 1);
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let ptr = NonNull::new(w.as_ptr()).unwrap();

    let err = unsafe {
        h.ctx.watch(
            ptr,
            "Widget",
            &h.decl.sources,
            &h.decl.module_path,
            h.decl.settings.clone(),
        )
    }
    .err()
    .unwrap();

    assert!(matches!(err, ReloadError::AlreadyWatched { .. }));
    assert_eq!(h.ctx.watcher::<Widget>().instance_count(), 1);
}

#[test]
fn test_unwatch_is_idempotent() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let ptr = NonNull::new(w.as_ptr()).unwrap();

    assert!(h.ctx.unwatch(ptr));
    assert!(!h.ctx.unwatch(ptr));
    assert_eq!(h.ctx.watcher::<Widget>().instance_count(), 0);

    // Subscriptions stay for later registrations
    assert!(h.changes.is_watching(&h.cpp));
    drop(w);
    assert_eq!(take_events(), vec!["drop a"]);
}

#[test]
fn test_unwatched_instances_are_not_migrated() {
    let mut h = harness();
    let a = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let b = LiveBox::new(&mut h.ctx, Widget::new("b"), &h.decl).unwrap();
    h.ctx.unwatch(NonNull::new(a.as_ptr()).unwrap());
    h.loader.export_vtable(&V2);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    h.ctx.update();

    assert_eq!(a.get(&h.ctx).unwrap().version(), 1);
    assert_eq!(b.get(&h.ctx).unwrap().version(), 2);
    assert_eq!(take_events(), vec!["pre b", "post b"]);
}

#[test]
fn test_request_reload_without_file_event() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    h.loader.export_vtable(&V2);

    h.ctx.request_reload::<Widget>(SourceClass::Implementation).unwrap();
    assert_eq!(h.backend.invocations(), 1);
    h.backend.finish_next(Outcome::Built);
    assert!(h.ctx.update()[0].is_success());
    assert_eq!(w.get(&h.ctx).unwrap().version(), 2);
}

#[test]
fn test_changes_to_unrelated_files_are_ignored() {
    let mut h = harness();
    let _w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();

    let other = h.dir.path().join("Other.cpp");
    assert!(!h.changes.simulate_modify(&other));
    assert!(h.ctx.update().is_empty());
    assert_eq!(h.backend.invocations(), 0);
}

#[test]
fn test_itanium_swap_targets_address_point() {
    let mut h = harness_with(SymbolScheme::Itanium);
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let group = &ITANIUM_V2 as *const ItaniumTable as usize;
    h.loader.export("_ZTV6Widget", group);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    assert_eq!(h.backend.last_settings().vtable_symbol(), "_ZTV6Widget");
    h.backend.finish_next(Outcome::Built);
    let reports = h.ctx.update();

    assert!(reports[0].is_success(), "{:?}", reports[0].outcome);
    let widget = w.get(&h.ctx).unwrap();
    assert_eq!(
        widget.vtable as usize,
        group + SymbolScheme::Itanium.address_point_offset()
    );
    assert_eq!(widget.vtable, &ITANIUM_V2.table as *const WidgetTable);
    assert_eq!(widget.version(), 2);
}

#[test]
fn test_failed_build_keeps_loaded_module_readable() {
    let mut h = harness();
    let _w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    h.loader.export_vtable(&V2);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    assert!(h.ctx.update()[0].is_success());

    let module = h.ctx.watcher::<Widget>().module().unwrap();
    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    assert_eq!(module.state(), ModuleState::Unlocked);
    assert!(!module.path().exists());

    h.backend.finish_next(Outcome::Failed);
    let reports = h.ctx.update();

    assert!(matches!(reports[0].outcome, Err(ReloadError::BuildFailed { .. })));
    assert_eq!(module.state(), ModuleState::Locked);
    assert_eq!(module.generation(), 1);
    assert!(module.path().exists());
    assert_eq!(
        module.symbol_address("rt_vtable_Widget").map(|p| p.as_ptr() as usize),
        Some(&V2 as *const WidgetTable as usize)
    );
}

#[test]
fn test_missing_artifact_after_load_keeps_old_code() {
    let mut h = harness();
    let w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    h.loader.export_vtable(&V2);

    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    assert!(h.ctx.update()[0].is_success());
    let counters = subscribe(&mut h);
    take_events();

    // The old artifact must not stand in for the one this build skipped
    h.loader.export_vtable(&V3);
    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::BuiltWithoutArtifact);
    let reports = h.ctx.update();

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].outcome, Err(ReloadError::ModuleNotFound { .. })));
    assert_eq!(w.get(&h.ctx).unwrap().version(), 2);
    assert!(take_events().is_empty());
    assert_eq!(counters.cleanups.get(), 0);
    assert_eq!(counters.changed.get(), 0);

    let module = h.ctx.watcher::<Widget>().module().unwrap();
    assert_eq!(module.state(), ModuleState::Locked);
    assert_eq!(module.generation(), 1);
    assert!(module.symbol_address("rt_vtable_Widget").is_some());

    // The pending change applies with the next good build
    h.changes.simulate_modify(&h.cpp);
    h.ctx.update();
    h.backend.finish_next(Outcome::Built);
    assert!(h.ctx.update()[0].is_success());
    assert_eq!(w.get(&h.ctx).unwrap().version(), 3);
}

#[test]
fn test_access_requires_owning_context() {
    let mut h = harness();
    let mut w = LiveBox::new(&mut h.ctx, Widget::new("a"), &h.decl).unwrap();
    let other = ReloadContext::new(FakeBackend::default(), MemoryChangeSource::new());

    assert!(w.get(&other).is_none());
    assert!(w.get_mut(&other).is_none());
    assert_eq!(w.get(&h.ctx).unwrap().name, "a");
}
