// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::alloc::Layout;
use core::ffi::c_void;
use core::mem::ManuallyDrop;
use core::sync::atomic::{self, AtomicU32, Ordering};

use crate::allocator::{try_alloc_layout, Allocator, GlobalAllocator};
use crate::facet::{FacetVtables, InterfaceSet};
use crate::iunknown::{
    E_INVALIDARG, E_NOINTERFACE, E_POINTER, GUID, HRESULT, IID_IUNKNOWN, IUnknownVtbl, S_OK,
    StatusResult,
};
use crate::refcount;
use crate::smart_ptr::{ComInterface, ComRc};
use crate::vtable::{ComImpl, ComInterfaceInfo, ComVtable, ComWrapper, InterfaceVtable};

/// Replacement for ordinary destruction, called with the object address once
/// the last reference is gone. It may run on any thread.
pub type Deleter = unsafe fn(*mut c_void);

/// Reference-counted object hosting `T` behind interface `I`.
///
/// A single atomic count backs `AddRef`/`Release`; the object is created with
/// a count of one. `S` lists secondary interfaces (a tuple of vtables) that
/// are answered with their own facet pointers. Use
/// [`crate::weak::WeakComObject`] when weak references are needed.
#[repr(C)]
pub struct ComObject<T, I, A = GlobalAllocator, S = ()>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    vtable: &'static I,
    facets: S::Entries,
    ref_count: AtomicU32,
    deleter: Option<Deleter>,
    pub inner: T,
    alloc: ManuallyDrop<A>,
}

impl<T, I, A, S> ComObject<T, I, A, S>
where
    T: ComImpl,
    I: ComVtable<T, Self>,
    A: Allocator + Send + Sync + 'static,
    S: FacetVtables<T, Self>,
{
    const LAYOUT: Layout = Layout::new::<Self>();

    #[inline]
    pub fn new_in(inner: T, alloc: A) -> StatusResult<*mut c_void> {
        Self::try_new_with(inner, alloc, None)
    }

    #[inline]
    pub fn try_new_in(inner: T, alloc: A) -> Option<*mut c_void> {
        Self::try_new_with(inner, alloc, None).ok()
    }

    /// Creates an object whose final release calls `deleter` instead of
    /// destroying it. The deleter may finish with [`Self::destroy`].
    #[inline]
    pub fn new_in_with_deleter(inner: T, alloc: A, deleter: Deleter) -> StatusResult<*mut c_void> {
        Self::try_new_with(inner, alloc, Some(deleter))
    }

    fn try_new_with(inner: T, alloc: A, deleter: Option<Deleter>) -> StatusResult<*mut c_void> {
        let ptr = try_alloc_layout(&alloc, Self::LAYOUT)?.cast::<Self>();
        let this = ptr.as_ptr() as *mut c_void;
        unsafe {
            ptr.as_ptr().write(Self {
                vtable: <I as ComVtable<T, Self>>::VTABLE,
                facets: <S as FacetVtables<T, Self>>::entries(this),
                ref_count: AtomicU32::new(1),
                deleter,
                inner,
                alloc: ManuallyDrop::new(alloc),
            });
        }
        Ok(this)
    }

    /// Creates a COM object and returns a smart pointer that owns the initial reference.
    #[inline]
    pub fn new_rc_in<R>(inner: T, alloc: A) -> StatusResult<ComRc<R>>
    where
        R: ComInterface + ComInterfaceInfo<Vtable = I>,
    {
        let ptr = Self::new_in(inner, alloc)?;
        // SAFETY: `ptr` is a freshly created COM pointer with refcount 1.
        Ok(unsafe { ComRc::from_raw_unchecked(ptr as *mut R) })
    }
}

impl<T, I, A, S> ComObject<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    #[inline]
    pub fn inner_ref(&self) -> &T {
        &self.inner
    }

    /// Current count. A snapshot: other threads may change it right away.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// The facet pointer this object answers `riid` with, without `AddRef`.
    ///
    /// Lets a [`ComImpl::query_interface`] hook hand out a facet under an
    /// extra id.
    #[inline]
    pub fn facet_ptr(&self, riid: &GUID) -> Option<*mut c_void> {
        S::find(&self.facets, riid)
    }

    #[inline(always)]
    /// # Safety
    /// `ptr` must be a valid pointer to a `ComObject<T, I, A, S>` allocated by this crate.
    /// The pointer must be properly aligned and remain valid for the returned lifetime.
    pub unsafe fn from_ptr<'a>(ptr: *mut c_void) -> &'a Self {
        unsafe { &*(ptr as *const Self) }
    }

    /// Ordinary destruction: drops the object and returns its memory to the allocator.
    ///
    /// # Safety
    /// `this` must point to a `ComObject<T, I, A, S>` with no remaining references,
    /// and must not be used afterwards.
    pub unsafe fn destroy(this: *mut c_void) {
        let ptr = this as *mut Self;
        let alloc = unsafe { core::ptr::read(&(*ptr).alloc) };
        let alloc = ManuallyDrop::into_inner(alloc);
        unsafe {
            core::ptr::drop_in_place(ptr);
            alloc.dealloc(ptr as *mut u8, Layout::new::<Self>());
        }
    }
}

unsafe impl<T, I, A, S> ComWrapper<T> for ComObject<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32 {
        let wrapper = unsafe { Self::from_ptr(this) };
        refcount::add(&wrapper.ref_count)
    }

    unsafe extern "system" fn shim_release(this: *mut c_void) -> u32 {
        let wrapper = unsafe { Self::from_ptr(this) };
        let count = refcount::sub(&wrapper.ref_count);

        if count == 0 {
            atomic::fence(Ordering::Acquire);
            match wrapper.deleter {
                Some(deleter) => unsafe { deleter(this) },
                None => unsafe { Self::destroy(this) },
            }
        }

        count
    }

    unsafe extern "system" fn shim_query_interface(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        if ppv.is_null() {
            return E_POINTER;
        }
        unsafe { *ppv = core::ptr::null_mut() };
        if riid.is_null() {
            return E_INVALIDARG;
        }

        let wrapper = unsafe { Self::from_ptr(this) };
        let riid = unsafe { &*riid };

        if *riid == IID_IUNKNOWN || I::is_compatible(riid) {
            unsafe { Self::shim_add_ref(this) };
            unsafe { *ppv = this };
            return S_OK;
        }

        if let Some(facet) = S::find(&wrapper.facets, riid) {
            if wrapper.inner.exposes(riid) {
                unsafe { Self::shim_add_ref(this) };
                unsafe { *ppv = facet };
                return S_OK;
            }
        }

        if let Some(ptr) = wrapper.inner.query_interface(this, riid) {
            let vtbl = unsafe { *(ptr as *mut *mut IUnknownVtbl) };
            unsafe { ((*vtbl).AddRef)(ptr) };
            unsafe { *ppv = ptr };
            return S_OK;
        }

        E_NOINTERFACE
    }

    #[inline(always)]
    unsafe fn inner<'a>(this: *mut c_void) -> &'a T {
        unsafe { &Self::from_ptr(this).inner }
    }
}

impl<T, I, S> ComObject<T, I, GlobalAllocator, S>
where
    T: ComImpl,
    I: ComVtable<T, Self>,
    S: FacetVtables<T, Self>,
{
    #[inline]
    pub fn new(inner: T) -> StatusResult<*mut c_void> {
        Self::new_in(inner, GlobalAllocator)
    }

    #[inline]
    pub fn try_new(inner: T) -> Option<*mut c_void> {
        Self::try_new_in(inner, GlobalAllocator)
    }

    #[inline]
    pub fn new_with_deleter(inner: T, deleter: Deleter) -> StatusResult<*mut c_void> {
        Self::new_in_with_deleter(inner, GlobalAllocator, deleter)
    }

    /// Creates a COM object and returns a smart pointer that owns the initial reference.
    #[inline]
    pub fn new_rc<R>(inner: T) -> StatusResult<ComRc<R>>
    where
        R: ComInterface + ComInterfaceInfo<Vtable = I>,
    {
        Self::new_rc_in(inner, GlobalAllocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());
    static DROP_COUNT: AtomicU32 = AtomicU32::new(0);
    static DELETER_COUNT: AtomicU32 = AtomicU32::new(0);

    const IID_UNRELATED: GUID = GUID::new(
        0x1234_5678,
        0x9ABC,
        0xDEF0,
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
    );

    struct Dummy;

    impl ComImpl for Dummy {}

    impl Drop for Dummy {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::Relaxed);
        }
    }

    type DummyObject = ComObject<Dummy, IUnknownVtbl>;

    unsafe fn counting_deleter(this: *mut c_void) {
        DELETER_COUNT.fetch_add(1, Ordering::Relaxed);
        unsafe { DummyObject::destroy(this) };
    }

    #[test]
    fn add_ref_release_drops() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);

        let ptr = DummyObject::new(Dummy).unwrap();

        unsafe {
            assert_eq!(DummyObject::shim_add_ref(ptr), 2);
            assert_eq!(DummyObject::shim_release(ptr), 1);
            assert_eq!(DummyObject::shim_release(ptr), 0);
        }

        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn query_interface_iunknown_returns_self() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);

        let ptr = DummyObject::new(Dummy).unwrap();
        let mut out = core::ptr::null_mut();

        let status = unsafe { DummyObject::shim_query_interface(ptr, &IID_IUNKNOWN, &mut out) };

        assert_eq!(status, S_OK);
        assert_eq!(out, ptr);
        assert_eq!(unsafe { DummyObject::from_ptr(ptr) }.ref_count(), 2);

        unsafe {
            assert_eq!(DummyObject::shim_release(ptr), 1);
            assert_eq!(DummyObject::shim_release(ptr), 0);
        }

        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn query_interface_miss_leaves_count_and_nulls_output() {
        let _guard = TEST_LOCK.lock().unwrap();

        let ptr = DummyObject::new(Dummy).unwrap();
        let mut out = ptr;

        let status = unsafe { DummyObject::shim_query_interface(ptr, &IID_UNRELATED, &mut out) };

        assert_eq!(status, E_NOINTERFACE);
        assert!(out.is_null());
        assert_eq!(unsafe { DummyObject::from_ptr(ptr) }.ref_count(), 1);

        unsafe {
            assert_eq!(DummyObject::shim_query_interface(ptr, core::ptr::null(), &mut out), E_INVALIDARG);
            assert_eq!(DummyObject::shim_query_interface(ptr, &IID_IUNKNOWN, core::ptr::null_mut()), E_POINTER);
            assert_eq!(DummyObject::shim_release(ptr), 0);
        }
    }

    #[test]
    fn deleter_replaces_destruction() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);
        DELETER_COUNT.store(0, Ordering::Relaxed);

        let ptr = DummyObject::new_with_deleter(Dummy, counting_deleter).unwrap();
        unsafe {
            assert_eq!(DummyObject::shim_add_ref(ptr), 2);
            assert_eq!(DummyObject::shim_release(ptr), 1);
        }
        assert_eq!(DELETER_COUNT.load(Ordering::Relaxed), 0);

        unsafe {
            assert_eq!(DummyObject::shim_release(ptr), 0);
        }
        assert_eq!(DELETER_COUNT.load(Ordering::Relaxed), 1);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }
}
