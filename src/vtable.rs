// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::ffi::c_void;

use crate::iunknown::{GUID, HRESULT};

/// Trait marking a struct as a VTable layout.
/// # Safety
/// The struct must have the same memory layout as the COM interface VTable,
/// starting with the `IUnknown` slots.
pub unsafe trait InterfaceVtable: Sized + 'static {
    const IID: GUID;

    /// Returns true when a pointer to this vtable also answers for `riid`,
    /// i.e. `riid` is this interface or one of its ancestors.
    fn is_compatible(riid: &GUID) -> bool;
}

/// Metadata associated with a COM interface (IID, VTable type).
pub trait ComInterfaceInfo {
    type Vtable: InterfaceVtable;
    const IID: GUID;
}

/// A vtable instantiated for implementation `T` living inside wrapper `W`.
pub trait ComVtable<T, W>: InterfaceVtable {
    const VTABLE: &'static Self;
}

/// Per-type capability hooks.
///
/// The hosting wrapper answers `IUnknown` and the ids of its primary interface
/// chain itself, then the ids of its secondary interface slots.
pub trait ComImpl: Send + Sync + 'static {
    /// Per-instance filter for secondary interfaces: returning `false` hides
    /// the slot answering `riid` on this object.
    #[inline]
    fn exposes(&self, riid: &GUID) -> bool {
        let _ = riid;
        true
    }

    /// Last resort for ids the wrapper does not answer.
    ///
    /// A returned pointer must carry the vtable of the interface `riid` names,
    /// and its `AddRef` must bump this object; the wrapper performs that
    /// `AddRef` before handing it out.
    #[inline]
    fn query_interface(&self, this: *mut c_void, riid: &GUID) -> Option<*mut c_void> {
        let _ = (this, riid);
        None
    }
}

/// Object layout that hosts an implementation `T` behind a COM pointer.
///
/// # Safety
/// The shims must implement the `IUnknown` contract for pointers produced by
/// the wrapper, and `inner` must return the hosted value for such a pointer.
pub unsafe trait ComWrapper<T>: Sized + 'static {
    /// # Safety
    /// `this` must be a primary interface pointer produced by this wrapper.
    unsafe extern "system" fn shim_query_interface(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT;

    /// # Safety
    /// `this` must be a primary interface pointer produced by this wrapper.
    unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32;

    /// # Safety
    /// `this` must be a primary interface pointer produced by this wrapper.
    unsafe extern "system" fn shim_release(this: *mut c_void) -> u32;

    /// # Safety
    /// `this` must be a live primary interface pointer produced by this wrapper.
    unsafe fn inner<'a>(this: *mut c_void) -> &'a T;
}
