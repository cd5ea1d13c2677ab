//! Owned live instances
//!
//! [`LiveBox`] heap-allocates a value, registers it with a
//! [`ReloadContext`], and unregisters it when dropped. It is the safe way to
//! keep instances whose address must not change.
//!
//! Access goes through the owning context. A reference borrows the context,
//! so it cannot outlive the next [`ReloadContext::update`], which may
//! rewrite or destroy the value:
//!
//! ```compile_fail
//! use void_hotswap::prelude::*;
//!
//! #[repr(C)]
//! struct Clear {
//!     vtable: *const (),
//! }
//!
//! unsafe impl LiveClass for Clear {}
//!
//! let mut ctx = ReloadContext::new(ProcessBackend::new("cc"), MemoryChangeSource::new());
//! let decl = ClassDecl::new("Clear", vec!["Clear.cpp".into()], "out/Clear.so", BuildSettings::new());
//! let clear = LiveBox::new(&mut ctx, Clear { vtable: std::ptr::null() }, &decl).unwrap();
//!
//! let value = clear.get(&ctx).unwrap();
//! ctx.update();
//! let _ = value.vtable;
//! ```

use crate::class::LiveClass;
use crate::context::ReloadContext;
use crate::decl::ClassDecl;
use crate::error::Result;
use crate::watcher::TypeWatcher;
use std::alloc::Layout;
use std::ptr::NonNull;

/// Heap-pinned, registered instance of a live type
pub struct LiveBox<T: LiveClass> {
    ptr: NonNull<T>,
    watcher: TypeWatcher<T>,
}

impl<T: LiveClass> LiveBox<T> {
    /// Move `value` to the heap and register it as described by `decl`
    pub fn new(ctx: &mut ReloadContext, value: T, decl: &ClassDecl) -> Result<Self> {
        let ptr = NonNull::from(Box::leak(Box::new(value)));

        // Safety: the allocation is owned by the box and only freed in
        // drop, after unregistering.
        let registered = unsafe {
            ctx.watch(
                ptr,
                &decl.type_name,
                &decl.sources,
                &decl.module_path,
                decl.settings.clone(),
            )
        };

        if let Err(e) = registered {
            // Safety: never registered, still uniquely owned.
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
            return Err(e);
        }

        Ok(Self {
            ptr,
            watcher: ctx.watcher::<T>(),
        })
    }

    /// The value, or `None` when a reload destroyed it or `ctx` is not the
    /// context it was registered with
    pub fn get<'a>(&'a self, ctx: &'a ReloadContext) -> Option<&'a T> {
        if !ctx.owns(&self.watcher) || self.is_lost() {
            return None;
        }
        // Safety: registered instances stay valid while the box lives, and
        // only `ReloadContext::update` rewrites them, which the shared
        // borrow of `ctx` rules out.
        Some(unsafe { self.ptr.as_ref() })
    }

    pub fn get_mut<'a>(&'a mut self, ctx: &'a ReloadContext) -> Option<&'a mut T> {
        if !ctx.owns(&self.watcher) || self.is_lost() {
            return None;
        }
        // Safety: as above; `&mut self` makes the access unique.
        Some(unsafe { self.ptr.as_mut() })
    }

    /// Whether a failed reconstruction destroyed the value
    pub fn is_lost(&self) -> bool {
        self.watcher.is_lost(self.ptr)
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T: LiveClass> Drop for LiveBox<T> {
    fn drop(&mut self) {
        self.watcher.unwatch(self.ptr);

        if self.watcher.forget_lost(self.ptr) {
            // The memory holds no valid value; free it without dropping.
            let layout = Layout::new::<T>();
            if layout.size() != 0 {
                // Safety: allocated by `Box::new` with this layout.
                unsafe { std::alloc::dealloc(self.ptr.as_ptr().cast(), layout) };
            }
        } else {
            // Safety: allocated by `Box::new`, no longer registered.
            drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
        }
    }
}
