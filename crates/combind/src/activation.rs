//! Object activation.
//!
//! Turning a class identity into a live object is the platform's job; this module only
//! defines the seam ([`Activator`]) and, on Windows, the `ole32` implementation.

use std::{ffi::c_void, ptr::NonNull};

use crate::{guid::Guid, hresult::HResult};

/// Creates foreign objects from class identities.
///
/// # Safety
/// A successful `activate` must return a pointer to a live object that implements `iid`,
/// with one counted reference whose ownership passes to the caller.
pub unsafe trait Activator {
    fn activate(&self, clsid: &Guid, iid: &Guid) -> Result<NonNull<c_void>, HResult>;
}

#[cfg(windows)]
pub use self::ole32::{Ole32Activator, initialize_apartment, uninitialize_apartment};

#[cfg(windows)]
mod ole32 {
    use std::{ffi::c_void, ptr::NonNull};

    use super::Activator;
    use crate::{
        config::{ApartmentModel, ClassContext},
        guid::Guid,
        hresult::HResult,
    };

    #[link(name = "ole32")]
    unsafe extern "system" {
        fn CoInitializeEx(reserved: *mut c_void, coinit: u32) -> i32;
        fn CoUninitialize();
        fn CoCreateInstance(
            rclsid: *const Guid,
            outer: *mut c_void,
            context: u32,
            riid: *const Guid,
            ppv: *mut *mut c_void,
        ) -> i32;
    }

    /// Initialises the calling thread's apartment.
    ///
    /// Returns `S_FALSE` when the thread was already initialised with the same model.
    pub fn initialize_apartment(model: ApartmentModel) -> Result<HResult, HResult> {
        // SAFETY: plain platform call; the reserved argument must be null.
        HResult(unsafe { CoInitializeEx(std::ptr::null_mut(), model.flags()) }).ok()
    }

    /// Balances one successful [`initialize_apartment`].
    pub fn uninitialize_apartment() {
        // SAFETY: plain platform call.
        unsafe { CoUninitialize() }
    }

    /// Activator backed by `CoCreateInstance`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Ole32Activator {
        context: ClassContext,
    }

    impl Ole32Activator {
        #[must_use]
        pub fn new(context: ClassContext) -> Self {
            Self { context }
        }

        #[must_use]
        pub fn context(&self) -> ClassContext {
            self.context
        }
    }

    // SAFETY: CoCreateInstance returns an AddRef'd interface pointer for `iid` on success.
    unsafe impl Activator for Ole32Activator {
        fn activate(&self, clsid: &Guid, iid: &Guid) -> Result<NonNull<c_void>, HResult> {
            let mut out: *mut c_void = std::ptr::null_mut();
            // SAFETY: all pointers are valid for the duration of the call.
            let status =
                unsafe { CoCreateInstance(clsid, std::ptr::null_mut(), self.context.bits(), iid, &raw mut out) };
            HResult(status).ok()?;
            NonNull::new(out).ok_or(HResult::E_POINTER)
        }
    }
}
