// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::ffi::c_void;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use crate::iunknown::{IUnknownRaw, IUnknownVtbl, Status, StatusResult, HRESULT};
use crate::vtable::ComInterfaceInfo;

/// Marker trait for types that are valid COM interfaces.
///
/// # Safety
/// Implementors guarantee that:
/// 1. The type is `Sized` (no fat pointers allowed).
/// 2. The type is `#[repr(C)]` or `#[repr(transparent)]` and has the same memory layout
///    as a COM interface pointer (the first field is a pointer to the vtable).
/// 3. The vtable begins with the `IUnknown` methods.
pub unsafe trait ComInterface: Sized {}

/// Marker trait for COM interfaces that are free-threaded and safe to share.
///
/// # Safety
/// Implementors guarantee that the underlying COM object supports concurrent
/// calls from multiple threads and that reference counting is thread-safe.
pub unsafe trait ThreadSafeComInterface: ComInterface {}

/// Reference-counted COM interface pointer.
///
/// A `ComRc` always owns exactly one reference. The empty handle is
/// `Option<ComRc<T>>`, which has the layout of a nullable `*mut T` and can be
/// handed to out-parameter APIs through [`ComSlot`].
///
/// # Thread Safety
/// `ComRc<T>` is `Send + Sync` exactly when `T: ThreadSafeComInterface`.
/// Every interface declared with `declare_com_interface!` is free-threaded:
/// implementations are `ComImpl: Send + Sync` and all counts are atomic. A
/// hand-written pointee for a thread-affine interface leaves the marker off.
#[repr(transparent)]
pub struct ComRc<T: ComInterface> {
    ptr: NonNull<T>,
    _phantom: PhantomData<T>,
}

unsafe impl<T: ThreadSafeComInterface> Send for ComRc<T> {}
unsafe impl<T: ThreadSafeComInterface> Sync for ComRc<T> {}

impl<T: ComInterface> ComRc<T> {
    /// Attaches to a raw COM pointer without calling `AddRef`.
    ///
    /// # Safety
    /// `ptr` must be null or a valid COM interface pointer carrying a
    /// reference the caller hands over.
    pub unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            _phantom: PhantomData,
        })
    }

    /// Attaches to a non-null raw COM pointer without calling `AddRef`.
    ///
    /// # Safety
    /// `ptr` must be a valid, non-null COM interface pointer carrying a
    /// reference the caller hands over.
    pub unsafe fn from_raw_unchecked(ptr: *mut T) -> Self {
        Self {
            ptr: unsafe { NonNull::new_unchecked(ptr) },
            _phantom: PhantomData,
        }
    }

    /// Attaches to a raw COM pointer or returns `Status::NO_INTERFACE` if null.
    ///
    /// # Safety
    /// `ptr` must be a valid COM interface pointer when non-null.
    pub unsafe fn from_raw_or_status(ptr: *mut T) -> StatusResult<Self> {
        unsafe { Self::from_raw(ptr) }.ok_or(Status::NO_INTERFACE)
    }

    /// Retains a raw COM pointer: calls `AddRef` and wraps it.
    ///
    /// # Safety
    /// `ptr` must be null or a valid COM interface pointer.
    pub unsafe fn from_raw_addref(ptr: *mut T) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        // SAFETY: caller guarantees `ptr` is a valid COM interface pointer.
        unsafe { add_ref(ptr) };
        unsafe { Self::from_raw(ptr) }
    }

    /// Runs `fill` with an out-pointer and attaches whatever it wrote.
    ///
    /// A failed status is returned as `Err`, with any pointer written anyway
    /// released. A success status with a null output yields `Ok(None)`.
    ///
    /// # Safety
    /// A non-null pointer written by `fill` must be a valid COM interface
    /// pointer carrying one reference for the caller.
    pub unsafe fn from_out_param<F>(fill: F) -> StatusResult<Option<Self>>
    where
        F: FnOnce(*mut *mut T) -> HRESULT,
    {
        let mut slot: Option<Self> = None;
        let status = Status::from_raw(fill(slot.write_slot()));
        if status.is_error() {
            return Err(status);
        }
        Ok(slot)
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Detaches: gives up ownership without `Release`.
    #[inline]
    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        core::mem::forget(self);
        ptr
    }

    /// Views the pointer through its `IUnknown` prefix.
    #[inline]
    pub fn as_unknown(&self) -> &IUnknownRaw {
        // SAFETY: every interface vtable starts with the IUnknown slots.
        unsafe { &*(self.ptr.as_ptr() as *const IUnknownRaw) }
    }

    /// Points this handle at `other`'s object. `other` is retained before the
    /// old pointer is released, so aliasing never drops the count to zero.
    #[inline]
    pub fn assign(&mut self, other: &Self) {
        *self = other.clone();
    }

    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.ptr, &mut other.ptr);
    }

    /// Explicit release; same as dropping the handle.
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Reads the object's count with an `AddRef`/`Release` pair.
    ///
    /// A diagnostic snapshot only.
    pub fn ref_count(&self) -> u32 {
        unsafe {
            add_ref(self.ptr.as_ptr());
            release(self.ptr.as_ptr())
        }
    }

    /// Queries for another COM interface and returns a smart pointer on success.
    pub fn query_interface<U>(&self) -> StatusResult<ComRc<U>>
    where
        U: ComInterface + ComInterfaceInfo,
    {
        // SAFETY: `self` holds a live reference.
        unsafe { ComRc::<U>::query_from_raw(self.as_ptr()) }
    }

    /// Like [`Self::query_interface`], mapping every failure to `None`.
    #[inline]
    pub fn query_interface_or_none<U>(&self) -> Option<ComRc<U>>
    where
        U: ComInterface + ComInterfaceInfo,
    {
        self.query_interface().ok()
    }
}

impl<T: ComInterface + ComInterfaceInfo> ComRc<T> {
    /// QueryInterface on `source` for `T`, attaching the result.
    #[inline]
    pub fn from_query<S: ComInterface>(source: &ComRc<S>) -> StatusResult<Self> {
        source.query_interface()
    }

    /// QueryInterface on a raw pointer for `T`, attaching the result.
    ///
    /// # Safety
    /// `source` must be null or a live COM interface pointer.
    pub unsafe fn query_from_raw<S>(source: *mut S) -> StatusResult<Self> {
        if source.is_null() {
            return Err(Status::INVALID_POINTER);
        }
        let mut out = ptr::null_mut();
        let status = unsafe {
            let vtbl = *(source as *mut *mut IUnknownVtbl);
            ((*vtbl).QueryInterface)(source as *mut c_void, &T::IID, &mut out)
        };
        let status = Status::from_raw(status);
        if status.is_error() {
            return Err(status);
        }
        unsafe { Self::from_raw_or_status(out as *mut T) }
    }
}

impl<T: ComInterface> core::ops::Deref for ComRc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ComInterface> Clone for ComRc<T> {
    fn clone(&self) -> Self {
        unsafe { add_ref(self.ptr.as_ptr()) };
        Self {
            ptr: self.ptr,
            _phantom: PhantomData,
        }
    }
}

impl<T: ComInterface> Drop for ComRc<T> {
    fn drop(&mut self) {
        unsafe { release(self.ptr.as_ptr()) };
    }
}

// Identity is the interface pointer, as with the raw pointers it wraps.
impl<T: ComInterface> PartialEq for ComRc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: ComInterface> Eq for ComRc<T> {}

impl<T: ComInterface> Hash for ComRc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl<T: ComInterface> fmt::Debug for ComRc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComRc").field(&self.ptr).finish()
    }
}

/// Out-parameter interop for nullable handles.
pub trait ComSlot<T: ComInterface> {
    /// Releases the current value and returns the cleared slot as `T**`.
    fn write_slot(&mut self) -> *mut *mut T;

    /// Borrows the slot as `T* const*` without touching the count.
    fn read_slot(&self) -> *const *mut T;
}

impl<T: ComInterface> ComSlot<T> for Option<ComRc<T>> {
    #[inline]
    fn write_slot(&mut self) -> *mut *mut T {
        *self = None;
        // SAFETY: `Option<ComRc<T>>` is a nullable `*mut T` via the NonNull niche.
        self as *mut Self as *mut *mut T
    }

    #[inline]
    fn read_slot(&self) -> *const *mut T {
        self as *const Self as *const *mut T
    }
}

pub(crate) unsafe fn add_ref<T>(ptr: *mut T) -> u32 {
    let vtbl = unsafe { *(ptr as *mut *mut IUnknownVtbl) };
    unsafe { ((*vtbl).AddRef)(ptr as *mut c_void) }
}

pub(crate) unsafe fn release<T>(ptr: *mut T) -> u32 {
    let vtbl = unsafe { *(ptr as *mut *mut IUnknownVtbl) };
    unsafe { ((*vtbl).Release)(ptr as *mut c_void) }
}
