// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strong/weak lifetime state for weak-capable objects.
//!
//! A `ControlBlock` is a separate heap block shared by every strong and weak
//! handle of one object. It is also the weak token handed out by
//! `IWeakReferenceSource::GetWeakReference`: its `IWeakReference` vtable sits
//! at offset zero and its `AddRef`/`Release` move the weak count.
//!
//! The strong owners collectively hold one implicit weak unit. It is dropped
//! right after the payload is finalized, so the block is freed exactly once,
//! by whichever side brings the weak count to zero.

use core::alloc::Layout;
use core::ffi::c_void;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use core::sync::atomic::{self, AtomicU32, Ordering};

use crate::allocator::{try_alloc_layout, Allocator};
use crate::iunknown::{
    failed, E_INVALIDARG, E_NOINTERFACE, E_POINTER, GUID, HRESULT, IID_IUNKNOWN, IUnknownVtbl, S_OK,
    StatusResult,
};
use crate::refcount;
use crate::vtable::{ComVtable, ComWrapper, InterfaceVtable};
use crate::weak::{IWeakReference, IWeakReferenceRaw, IWeakReferenceVtbl};

/// Tears the payload down once the strong count reaches zero.
pub type Finalizer = unsafe fn(*mut c_void);

#[repr(C)]
pub struct ControlBlock {
    vtable: &'static IWeakReferenceVtbl,
    strong: AtomicU32,
    weak: AtomicU32,
    object: *mut c_void,
    finalize: Finalizer,
    free: unsafe fn(*mut ControlBlock),
}

/// Heap layout of a block: the block itself, then the allocator that owns it.
#[repr(C)]
struct BlockAlloc<B> {
    block: ControlBlock,
    alloc: ManuallyDrop<B>,
}

// The counters are atomics; `object` is only dereferenced while a strong unit is held.
unsafe impl Send for ControlBlock {}
unsafe impl Sync for ControlBlock {}

impl ControlBlock {
    /// Allocates a block for `object` with one strong reference, from `alloc`.
    /// The block keeps `alloc` and returns its memory there when freed.
    ///
    /// `object` must be a primary interface pointer whose `Release` ends in
    /// [`Self::release_strong`] on this block, and `finalize` must tear it down.
    pub(crate) fn allocate_in<B>(alloc: B, object: *mut c_void, finalize: Finalizer) -> StatusResult<NonNull<Self>>
    where
        B: Allocator + Send + Sync + 'static,
    {
        let ptr = try_alloc_layout(&alloc, Layout::new::<BlockAlloc<B>>())?.cast::<BlockAlloc<B>>();
        unsafe {
            ptr.as_ptr().write(BlockAlloc {
                block: Self {
                    vtable: <IWeakReferenceVtbl as ComVtable<Self, Self>>::VTABLE,
                    strong: AtomicU32::new(1),
                    weak: AtomicU32::new(1),
                    object,
                    finalize,
                    free: Self::free_in::<B>,
                },
                alloc: ManuallyDrop::new(alloc),
            });
        }
        Ok(ptr.cast::<Self>())
    }

    /// Reinterprets a weak token produced by this crate.
    ///
    /// # Safety
    /// `ptr` must be a live `IWeakReference` pointer handed out by an object of
    /// this crate, and must stay alive for `'a`.
    pub unsafe fn from_weak_reference<'a>(ptr: *mut IWeakReferenceRaw) -> &'a Self {
        unsafe { &*(ptr as *const Self) }
    }

    #[inline]
    pub fn strong_count(&self) -> u32 {
        self.strong.load(Ordering::Acquire)
    }

    /// Weak handles outstanding, excluding the unit held by strong owners.
    /// A snapshot: it may be off by that unit while the payload is being torn down.
    #[inline]
    pub fn weak_count(&self) -> u32 {
        let weak = self.weak.load(Ordering::Acquire);
        if self.strong_count() > 0 {
            weak.saturating_sub(1)
        } else {
            weak
        }
    }

    /// Advisory: `true` stays true, `false` can be stale by the time it is read.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.strong_count() == 0
    }

    #[inline]
    pub fn retain_strong(&self) -> u32 {
        refcount::add(&self.strong)
    }

    /// Takes a strong unit unless the count already reached zero.
    #[inline]
    pub fn upgrade(&self) -> bool {
        refcount::add_if_nonzero(&self.strong).is_some()
    }

    /// Drops a strong unit. On the last one the payload is finalized, then the
    /// strong owners' weak unit is given back.
    ///
    /// # Safety
    /// `this` must be live and the caller must own the strong unit it drops.
    pub unsafe fn release_strong(this: *const Self) -> u32 {
        let block = unsafe { &*this };
        let count = refcount::sub(&block.strong);
        if count == 0 {
            atomic::fence(Ordering::Acquire);
            unsafe {
                (block.finalize)(block.object);
                Self::release_weak(this);
            }
        }
        count
    }

    #[inline]
    pub fn retain_weak(&self) -> u32 {
        refcount::add(&self.weak)
    }

    /// Drops a weak unit and frees the block on the last one.
    ///
    /// # Safety
    /// `this` must be live and the caller must own the weak unit it drops.
    pub unsafe fn release_weak(this: *const Self) -> u32 {
        let count = refcount::sub(unsafe { &(*this).weak });
        if count == 0 {
            atomic::fence(Ordering::Acquire);
            unsafe { ((*this).free)(this as *mut Self) };
        }
        count
    }

    unsafe fn free_in<B: Allocator>(this: *mut Self) {
        let ptr = this as *mut BlockAlloc<B>;
        let alloc = ManuallyDrop::into_inner(unsafe { ptr::read(&(*ptr).alloc) });
        unsafe {
            ptr::drop_in_place(ptr);
            alloc.dealloc(ptr as *mut u8, Layout::new::<BlockAlloc<B>>());
        }
    }
}

impl IWeakReference for ControlBlock {
    fn is_expired(&self) -> bool {
        ControlBlock::is_expired(self)
    }

    fn upgrade_to_strong(&self, riid: *const GUID, out: *mut *mut c_void) -> HRESULT {
        if out.is_null() {
            return E_POINTER;
        }
        unsafe { *out = ptr::null_mut() };
        if riid.is_null() {
            return E_INVALIDARG;
        }

        // Expired is not an error: the caller sees S_OK with a null output.
        if !self.upgrade() {
            return S_OK;
        }

        // The temporary strong unit keeps the payload alive across the query.
        let hr = unsafe {
            let vtbl = *(self.object as *mut *mut IUnknownVtbl);
            let hr = ((*vtbl).QueryInterface)(self.object, riid, out);
            ((*vtbl).Release)(self.object);
            hr
        };
        if failed(hr) {
            unsafe { *out = ptr::null_mut() };
        }
        hr
    }
}

unsafe impl ComWrapper<ControlBlock> for ControlBlock {
    unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32 {
        unsafe { Self::inner(this) }.retain_weak()
    }

    unsafe extern "system" fn shim_release(this: *mut c_void) -> u32 {
        unsafe { Self::release_weak(this as *const Self) }
    }

    unsafe extern "system" fn shim_query_interface(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        if ppv.is_null() {
            return E_POINTER;
        }
        unsafe { *ppv = ptr::null_mut() };
        if riid.is_null() {
            return E_INVALIDARG;
        }

        let riid = unsafe { &*riid };
        if *riid == IID_IUNKNOWN || IWeakReferenceVtbl::is_compatible(riid) {
            unsafe { Self::shim_add_ref(this) };
            unsafe { *ppv = this };
            return S_OK;
        }
        E_NOINTERFACE
    }

    #[inline(always)]
    unsafe fn inner<'a>(this: *mut c_void) -> &'a ControlBlock {
        unsafe { &*(this as *const Self) }
    }
}
