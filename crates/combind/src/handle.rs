//! Owning handle to a foreign object.
//!
//! The object layout is fixed by the platform: its first word points at the vtable, and
//! slots 0, 1 and 2 of every vtable are the identity query, acquire and release entries.

use std::{ffi::c_void, fmt, mem::ManuallyDrop, ptr::NonNull};

use crate::{guid::Guid, hresult::HResult};

/// Universal vtable slot indices.
pub mod slots {
    pub const QUERY_INTERFACE: usize = 0;
    pub const ADD_REF: usize = 1;
    pub const RELEASE: usize = 2;
}

type QueryInterfaceFn = unsafe extern "system" fn(*mut c_void, *const Guid, *mut *mut c_void) -> i32;
type AddRefFn = unsafe extern "system" fn(*mut c_void) -> u32;
type ReleaseFn = unsafe extern "system" fn(*mut c_void) -> u32;

/// Reads vtable entry `index` of the object at `object`.
///
/// # Safety
/// `object` must point at a live foreign object whose vtable has more than `index` slots.
pub(crate) unsafe fn vtable_slot(object: NonNull<c_void>, index: usize) -> *const c_void {
    // SAFETY: the caller guarantees a live object; its first word is the vtable pointer.
    unsafe {
        let vtable = *object.as_ptr().cast::<*const *const c_void>();
        *vtable.add(index)
    }
}

/// One counted reference to a foreign object.
///
/// Creating a `ComPtr` takes ownership of exactly one reference unit and dropping it gives
/// that unit back through the release slot, so each handle performs one matched
/// acquire/release pair. `Clone` acquires a new unit. Handles are neither `Send` nor
/// `Sync`: whether the object tolerates other threads is its own contract.
pub struct ComPtr {
    raw: NonNull<c_void>,
}

impl ComPtr {
    /// Adopts a reference the caller already owns (e.g. one returned by activation or an
    /// identity query).
    ///
    /// # Safety
    /// `raw` must point at a live foreign object with the root vtable layout, and the
    /// caller must own one reference to it that is not released elsewhere.
    #[must_use]
    pub unsafe fn from_raw(raw: NonNull<c_void>) -> Self {
        Self { raw }
    }

    /// Acquires a new reference to an object the caller merely borrows.
    ///
    /// # Safety
    /// `raw` must point at a live foreign object with the root vtable layout.
    #[must_use]
    pub unsafe fn from_raw_borrowed(raw: NonNull<c_void>) -> Self {
        // SAFETY: forwarded from the caller.
        let handle = unsafe { Self::from_raw(raw) };
        handle.add_ref();
        handle
    }

    /// The object pointer, still owned by this handle.
    #[must_use]
    pub fn as_raw(&self) -> NonNull<c_void> {
        self.raw
    }

    /// Gives up ownership without releasing; the caller now owns the reference.
    #[must_use]
    pub fn into_raw(self) -> NonNull<c_void> {
        ManuallyDrop::new(self).raw
    }

    /// Whether both handles point at the same object pointer.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        self.raw == other.raw
    }

    /// Acquires a second reference, returning it with the count the object reported.
    #[must_use]
    pub fn acquire(&self) -> (Self, u32) {
        let count = self.add_ref();
        (Self { raw: self.raw }, count)
    }

    /// Releases this handle's reference now, returning the count the object reported.
    pub fn release(self) -> u32 {
        let this = ManuallyDrop::new(self);
        this.release_unit()
    }

    /// Asks the object for another interface through slot 0.
    ///
    /// On success the returned handle owns the reference the object added for the cast.
    /// A success status with a null pointer is reported as `E_POINTER`.
    pub fn query_interface(&self, iid: &Guid) -> Result<Self, HResult> {
        let mut out: *mut c_void = std::ptr::null_mut();
        // SAFETY: `self.raw` is live while the handle exists; slot 0 has the
        // QueryInterface signature on every root-derived vtable.
        let status = unsafe {
            let f: QueryInterfaceFn = std::mem::transmute(vtable_slot(self.raw, slots::QUERY_INTERFACE));
            HResult(f(self.raw.as_ptr(), iid, &raw mut out))
        };
        status.ok()?;
        let raw = NonNull::new(out).ok_or(HResult::E_POINTER)?;
        // SAFETY: a successful identity query hands one new reference to the caller.
        Ok(unsafe { Self::from_raw(raw) })
    }

    /// Reads vtable entry `index`.
    ///
    /// # Safety
    /// The vtable must have more than `index` slots.
    pub(crate) unsafe fn slot(&self, index: usize) -> *const c_void {
        // SAFETY: the handle keeps the object alive; the bound is the caller's promise.
        unsafe { vtable_slot(self.raw, index) }
    }

    fn add_ref(&self) -> u32 {
        // SAFETY: slot 1 is AddRef on every root-derived vtable.
        unsafe {
            let f: AddRefFn = std::mem::transmute(vtable_slot(self.raw, slots::ADD_REF));
            f(self.raw.as_ptr())
        }
    }

    fn release_unit(&self) -> u32 {
        // SAFETY: slot 2 is Release; callers make sure the unit is released only once.
        unsafe {
            let f: ReleaseFn = std::mem::transmute(vtable_slot(self.raw, slots::RELEASE));
            f(self.raw.as_ptr())
        }
    }
}

impl Clone for ComPtr {
    fn clone(&self) -> Self {
        self.acquire().0
    }
}

impl Drop for ComPtr {
    fn drop(&mut self) {
        self.release_unit();
    }
}

impl fmt::Debug for ComPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComPtr({:p})", self.raw)
    }
}
