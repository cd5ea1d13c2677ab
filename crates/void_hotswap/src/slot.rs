//! Raw instance memory
//!
//! Every write the reload layer makes into a live object goes through this
//! module. [`InstanceSlot::rebind_code_identity`] overwrites an object's
//! vtable pointer; [`InstanceSlot::retire`] and [`RetiredSlot::rehost`]
//! destroy an object in place and construct a new one at the same address.

use std::ffi::c_void;
use std::ptr::NonNull;

/// Placement constructor exported by a live module.
///
/// Constructs a fresh instance at the given address and returns it.
pub type PlacementConstructor = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// Address of a live object of type `T`
pub struct InstanceSlot<T> {
    ptr: NonNull<T>,
}

impl<T> InstanceSlot<T> {
    /// Wrap an address.
    ///
    /// # Safety
    /// `ptr` must point to a live, properly aligned `T` that nothing else
    /// accesses while the slot is in use.
    pub unsafe fn new(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Mutable access to the object
    ///
    /// # Safety
    /// No other reference to the object may be alive.
    pub unsafe fn get_mut(&mut self) -> &mut T {
        self.ptr.as_mut()
    }

    /// Current code identity: the first machine word of the object
    ///
    /// # Safety
    /// `T` must start with a pointer-sized field.
    pub unsafe fn code_identity(&self) -> *const c_void {
        self.ptr.cast::<*const c_void>().as_ptr().read()
    }

    /// Overwrite the object's vtable pointer with `vtable`.
    ///
    /// Only valid for single-inheritance layouts without virtual bases,
    /// where the first machine word of the object is the vtable pointer and
    /// the new vtable was built for the same data layout.
    ///
    /// # Safety
    /// Both conditions above must hold, and `vtable` must stay valid for as
    /// long as the object uses it.
    pub unsafe fn rebind_code_identity(&mut self, vtable: NonNull<c_void>) {
        self.ptr
            .cast::<*const c_void>()
            .as_ptr()
            .write(vtable.as_ptr() as *const c_void);
    }

    /// Run the destructor in place. The memory stays allocated.
    ///
    /// # Safety
    /// The object must not be used again until it is rehosted.
    pub unsafe fn retire(self) -> RetiredSlot<T> {
        std::ptr::drop_in_place(self.ptr.as_ptr());
        RetiredSlot { ptr: self.ptr }
    }
}

/// Memory of a destroyed object, waiting to be constructed again
pub struct RetiredSlot<T> {
    ptr: NonNull<T>,
}

impl<T> RetiredSlot<T> {
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Construct a new object in place with `constructor`.
    ///
    /// Fails, handing the slot back, when the constructor does not return
    /// the slot's own address. The memory then holds no valid object.
    ///
    /// # Safety
    /// `constructor` must build a valid `T` at the address it is given, and
    /// the allocation must be large enough for it.
    pub unsafe fn rehost(
        self,
        constructor: PlacementConstructor,
    ) -> Result<InstanceSlot<T>, RetiredSlot<T>> {
        let at = self.ptr.as_ptr().cast::<c_void>();
        let built = constructor(at);
        if built == at {
            Ok(InstanceSlot { ptr: self.ptr })
        } else {
            Err(self)
        }
    }
}
