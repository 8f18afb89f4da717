// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::alloc::Layout;
use core::cmp::Ordering as CmpOrdering;
use core::ffi::c_void;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};

use crate::allocator::{try_alloc_layout, Allocator, GlobalAllocator};
use crate::control::ControlBlock;
use crate::facet::{Facet, FacetVtables, InterfaceEntry, InterfaceSet};
use crate::iunknown::{
    E_INVALIDARG, E_NOINTERFACE, E_POINTER, GUID, HRESULT, IID_IUNKNOWN, IUnknownVtbl, S_OK, Status,
    StatusResult,
};
use crate::smart_ptr::{ComInterface, ComRc};
use crate::vtable::{ComImpl, ComInterfaceInfo, ComVtable, ComWrapper, InterfaceVtable};
use crate::wrapper::Deleter;

declare_com_interface! {
    /// Weak token: answers liveness and promotes back to a strong pointer.
    pub trait IWeakReference: IUnknown {
        const IID: GUID = GUID::new(
            0x4996_50F8,
            0x1305,
            0x4B50,
            [0x81, 0xFB, 0xEE, 0x00, 0x36, 0xB2, 0x61, 0xC8],
        );

        fn is_expired(&self) -> bool;

        /// Writes an owning pointer for `riid`, or null with `S_OK` when the
        /// object is already gone.
        fn upgrade_to_strong(&self, riid: *const GUID, out: *mut *mut c_void) -> HRESULT;
    }
}

declare_com_interface! {
    /// Implemented by objects that can hand out weak tokens.
    pub trait IWeakReferenceSource: IUnknown {
        const IID: GUID = GUID::new(
            0x502F_3D33,
            0xDA86,
            0x46C3,
            [0xA2, 0x9A, 0x4F, 0xCE, 0x73, 0xBE, 0x5D, 0xFA],
        );

        fn get_weak_reference(&self, out: *mut *mut IWeakReferenceRaw) -> HRESULT;
    }
}

/// Host-level view of a [`WeakComObject`], used as the implementation behind
/// its `IWeakReferenceSource` slot.
struct SourceHost<T, I, A, S>(PhantomData<fn() -> (T, I, A, S)>);

/// Reference-counted object hosting `T` behind interface `I`, with weak
/// reference support.
///
/// `AddRef`/`Release` act on the strong count of a separately allocated
/// [`ControlBlock`], which is also the weak token. The payload is torn down
/// when the strong count reaches zero; the block lives until the last weak
/// handle is gone. `IWeakReferenceSource` and the secondary interfaces in `S`
/// are answered with their own facet pointers.
#[repr(C)]
pub struct WeakComObject<T, I, A = GlobalAllocator, S = ()>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    vtable: &'static I,
    source: InterfaceEntry<IWeakReferenceSourceVtbl>,
    facets: S::Entries,
    control: NonNull<ControlBlock>,
    deleter: Option<Deleter>,
    pub inner: T,
    alloc: ManuallyDrop<A>,
}

unsafe impl<T, I, A, S> Send for WeakComObject<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
}

unsafe impl<T, I, A, S> Sync for WeakComObject<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
}

impl<T, I, A, S> WeakComObject<T, I, A, S>
where
    T: ComImpl,
    I: ComVtable<T, Self>,
    A: Allocator + Clone + Send + Sync + 'static,
    S: FacetVtables<T, Self>,
{
    const LAYOUT: Layout = Layout::new::<Self>();

    /// Creates an object in `alloc`. A clone of `alloc` also holds the
    /// control block.
    #[inline]
    pub fn new_in(inner: T, alloc: A) -> StatusResult<*mut c_void> {
        Self::try_new_with(inner, alloc, None)
    }

    /// Creates an object whose payload teardown calls `deleter` instead of
    /// destroying it. The deleter may finish with [`Self::destroy`].
    #[inline]
    pub fn new_in_with_deleter(inner: T, alloc: A, deleter: Deleter) -> StatusResult<*mut c_void> {
        Self::try_new_with(inner, alloc, Some(deleter))
    }

    fn try_new_with(inner: T, alloc: A, deleter: Option<Deleter>) -> StatusResult<*mut c_void> {
        let ptr = try_alloc_layout(&alloc, Self::LAYOUT)?.cast::<Self>();
        let this = ptr.as_ptr() as *mut c_void;
        let control = match ControlBlock::allocate_in(alloc.clone(), this, Self::finalize) {
            Ok(control) => control,
            Err(status) => {
                unsafe { alloc.dealloc(ptr.as_ptr() as *mut u8, Self::LAYOUT) };
                return Err(status);
            }
        };
        unsafe {
            ptr.as_ptr().write(Self {
                vtable: <I as ComVtable<T, Self>>::VTABLE,
                source: InterfaceEntry::new(
                    <IWeakReferenceSourceVtbl as ComVtable<Self, Facet<SourceHost<T, I, A, S>>>>::VTABLE,
                    this,
                ),
                facets: <S as FacetVtables<T, Self>>::entries(this),
                control,
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
        // SAFETY: `ptr` is a freshly created COM pointer with a strong count of 1.
        Ok(unsafe { ComRc::from_raw_unchecked(ptr as *mut R) })
    }
}

impl<T, I, A, S> WeakComObject<T, I, A, S>
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

    #[inline]
    pub fn control(&self) -> &ControlBlock {
        unsafe { self.control.as_ref() }
    }

    #[inline]
    pub fn strong_count(&self) -> u32 {
        self.control().strong_count()
    }

    #[inline]
    pub fn weak_count(&self) -> u32 {
        self.control().weak_count()
    }

    /// The facet pointer this object answers `riid` with, without `AddRef`.
    #[inline]
    pub fn facet_ptr(&self, riid: &GUID) -> Option<*mut c_void> {
        S::find(&self.facets, riid)
    }

    #[inline(always)]
    /// # Safety
    /// `ptr` must be a valid primary pointer to a `WeakComObject<T, I, A, S>`
    /// that remains alive for the returned lifetime.
    pub unsafe fn from_ptr<'a>(ptr: *mut c_void) -> &'a Self {
        unsafe { &*(ptr as *const Self) }
    }

    /// Ordinary payload destruction: drops the object and returns its memory
    /// to the allocator. The control block is not touched.
    ///
    /// # Safety
    /// `this` must point to a `WeakComObject<T, I, A, S>` whose strong count has
    /// reached zero, and must not be used afterwards.
    pub unsafe fn destroy(this: *mut c_void) {
        let ptr = this as *mut Self;
        let alloc = unsafe { core::ptr::read(&(*ptr).alloc) };
        let alloc = ManuallyDrop::into_inner(alloc);
        unsafe {
            core::ptr::drop_in_place(ptr);
            alloc.dealloc(ptr as *mut u8, Layout::new::<Self>());
        }
    }

    unsafe fn finalize(this: *mut c_void) {
        match unsafe { Self::from_ptr(this) }.deleter {
            Some(deleter) => unsafe { deleter(this) },
            None => unsafe { Self::destroy(this) },
        }
    }
}

unsafe impl<T, I, A, S> ComWrapper<T> for WeakComObject<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32 {
        unsafe { Self::from_ptr(this) }.control().retain_strong()
    }

    unsafe extern "system" fn shim_release(this: *mut c_void) -> u32 {
        // Read the block first: the last release frees the payload.
        let control = unsafe { Self::from_ptr(this) }.control.as_ptr();
        unsafe { ControlBlock::release_strong(control) }
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

        let wrapper = unsafe { Self::from_ptr(this) };
        let riid = unsafe { &*riid };

        if *riid == IID_IUNKNOWN || I::is_compatible(riid) {
            unsafe { Self::shim_add_ref(this) };
            unsafe { *ppv = this };
            return S_OK;
        }

        if *riid == IID_IWEAKREFERENCESOURCE {
            unsafe { Self::shim_add_ref(this) };
            unsafe { *ppv = wrapper.source.as_ptr() };
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

unsafe impl<T, I, A, S> ComWrapper<WeakComObject<T, I, A, S>> for SourceHost<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32 {
        unsafe { WeakComObject::<T, I, A, S>::shim_add_ref(this) }
    }

    unsafe extern "system" fn shim_release(this: *mut c_void) -> u32 {
        unsafe { WeakComObject::<T, I, A, S>::shim_release(this) }
    }

    unsafe extern "system" fn shim_query_interface(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        unsafe { WeakComObject::<T, I, A, S>::shim_query_interface(this, riid, ppv) }
    }

    #[inline(always)]
    unsafe fn inner<'a>(this: *mut c_void) -> &'a WeakComObject<T, I, A, S> {
        unsafe { WeakComObject::<T, I, A, S>::from_ptr(this) }
    }
}

impl<T, I, A, S> IWeakReferenceSource for WeakComObject<T, I, A, S>
where
    T: ComImpl,
    I: InterfaceVtable,
    A: Allocator + Send + Sync + 'static,
    S: InterfaceSet,
{
    fn get_weak_reference(&self, out: *mut *mut IWeakReferenceRaw) -> HRESULT {
        if out.is_null() {
            return E_POINTER;
        }
        self.control().retain_weak();
        unsafe { *out = self.control.as_ptr() as *mut IWeakReferenceRaw };
        S_OK
    }
}

impl<T, I, S> WeakComObject<T, I, GlobalAllocator, S>
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

/// Non-owning handle to an object exposing `IWeakReferenceSource`.
///
/// Holds one weak unit on the object's token. Cloning and dropping move only
/// the weak count; the payload is reached through [`WeakRc::upgrade`].
pub struct WeakRc<T: ComInterface> {
    weak: ComRc<IWeakReferenceRaw>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ComInterface> WeakRc<T> {
    /// Obtains a weak token from any strong pointer to a weak-capable object.
    pub fn from_source<S: ComInterface>(strong: &ComRc<S>) -> StatusResult<Self> {
        let source = strong.query_interface::<IWeakReferenceSourceRaw>()?;
        // SAFETY: `GetWeakReference` writes an owning token pointer.
        let weak = unsafe { ComRc::from_out_param(|out| source.get_weak_reference(out)) }?;
        weak.map(Self::from_weak_reference).ok_or(Status::NO_INTERFACE)
    }

    /// Wraps an owned weak token.
    #[inline]
    pub fn from_weak_reference(weak: ComRc<IWeakReferenceRaw>) -> Self {
        Self {
            weak,
            _marker: PhantomData,
        }
    }

    /// Retains a raw weak token.
    ///
    /// # Safety
    /// `ptr` must be null or a live `IWeakReference` pointer.
    #[inline]
    pub unsafe fn from_raw_addref(ptr: *mut IWeakReferenceRaw) -> Option<Self> {
        unsafe { ComRc::from_raw_addref(ptr) }.map(Self::from_weak_reference)
    }

    #[inline]
    pub fn as_weak_reference(&self) -> &ComRc<IWeakReferenceRaw> {
        &self.weak
    }

    #[inline]
    pub fn into_weak_reference(self) -> ComRc<IWeakReferenceRaw> {
        self.weak
    }

    /// Snapshot of liveness. Use [`Self::upgrade`] to actually reach the object.
    #[inline]
    pub fn is_expired(&self) -> bool {
        unsafe { self.weak.is_expired() }
    }

    /// Promotes to an interface of type `U`.
    ///
    /// `Ok(None)` means the object is gone. `Err` is reserved for malformed
    /// calls and for a live object that does not implement `U`.
    pub fn upgrade_as<U>(&self) -> StatusResult<Option<ComRc<U>>>
    where
        U: ComInterface + ComInterfaceInfo,
    {
        // SAFETY: `UpgradeToStrong` writes an owning pointer or null.
        unsafe {
            ComRc::<U>::from_out_param(|out| self.weak.upgrade_to_strong(&U::IID, out as *mut *mut c_void))
        }
    }
}

impl<T: ComInterface + ComInterfaceInfo> WeakRc<T> {
    /// Promotes to `T`, keeping the ok-with-null result for expired objects.
    #[inline]
    pub fn try_upgrade(&self) -> StatusResult<Option<ComRc<T>>> {
        self.upgrade_as::<T>()
    }

    #[inline]
    pub fn upgrade(&self) -> Option<ComRc<T>> {
        self.try_upgrade().ok().flatten()
    }
}

impl<T: ComInterface> ComRc<T> {
    /// Weak handle to the same object, through its `IWeakReferenceSource`.
    #[inline]
    pub fn downgrade(&self) -> StatusResult<WeakRc<T>> {
        WeakRc::from_source(self)
    }
}

impl<T: ComInterface> Clone for WeakRc<T> {
    fn clone(&self) -> Self {
        Self::from_weak_reference(self.weak.clone())
    }
}

impl<T: ComInterface> PartialEq for WeakRc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.weak == other.weak
    }
}

impl<T: ComInterface> Eq for WeakRc<T> {}

impl<T: ComInterface> PartialOrd for WeakRc<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T: ComInterface> Ord for WeakRc<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.weak.as_ptr() as usize).cmp(&(other.weak.as_ptr() as usize))
    }
}

impl<T: ComInterface> Hash for WeakRc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.weak.hash(state);
    }
}

impl<T: ComInterface> fmt::Debug for WeakRc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRc")
            .field("token", &self.weak.as_ptr())
            .field("expired", &self.is_expired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iunknown::IUnknownRaw;

    use core::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());
    static DROP_COUNT: AtomicU32 = AtomicU32::new(0);

    struct Payload;

    impl ComImpl for Payload {}

    impl Drop for Payload {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::Relaxed);
        }
    }

    type PayloadObject = WeakComObject<Payload, IUnknownVtbl>;

    #[test]
    fn weak_handle_sees_expiry() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);

        let strong: ComRc<IUnknownRaw> = PayloadObject::new_rc(Payload).unwrap();
        let weak = strong.downgrade().unwrap();
        assert!(!weak.is_expired());

        let token = unsafe { ControlBlock::from_weak_reference(weak.as_weak_reference().as_ptr()) };
        assert_eq!(token.strong_count(), 1);
        assert_eq!(token.weak_count(), 1);

        let upgraded = weak.upgrade().unwrap();
        assert_eq!(upgraded, strong);
        assert_eq!(token.strong_count(), 2);
        drop(upgraded);

        drop(strong);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
        assert!(matches!(weak.try_upgrade(), Ok(None)));
    }

    #[test]
    fn source_slot_shares_the_object_count() {
        let _guard = TEST_LOCK.lock().unwrap();
        DROP_COUNT.store(0, Ordering::Relaxed);

        let strong: ComRc<IUnknownRaw> = PayloadObject::new_rc(Payload).unwrap();
        let source = strong.query_interface::<IWeakReferenceSourceRaw>().unwrap();
        assert_ne!(source.as_ptr() as usize, strong.as_ptr() as usize);
        assert_eq!(strong.ref_count(), 2);

        let back = source.query_interface::<IUnknownRaw>().unwrap();
        assert_eq!(back, strong);

        drop(strong);
        drop(back);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 0);
        drop(source);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn plain_object_has_no_weak_source() {
        let _guard = TEST_LOCK.lock().unwrap();
        let strong: ComRc<IUnknownRaw> = crate::wrapper::ComObject::<Payload, IUnknownVtbl>::new_rc(Payload).unwrap();
        assert_eq!(strong.downgrade().unwrap_err(), Status::NO_INTERFACE);
    }

    #[test]
    fn weak_handles_compare_by_token() {
        let _guard = TEST_LOCK.lock().unwrap();
        let a: ComRc<IUnknownRaw> = PayloadObject::new_rc(Payload).unwrap();
        let b: ComRc<IUnknownRaw> = PayloadObject::new_rc(Payload).unwrap();

        let wa = a.downgrade().unwrap();
        let wa2 = WeakRc::<IUnknownRaw>::from_source(&a).unwrap();
        let wb = b.downgrade().unwrap();

        assert_eq!(wa, wa2);
        assert_eq!(wa, wa.clone());
        assert_ne!(wa, wb);
        assert_eq!(wa.cmp(&wb), (wa.as_weak_reference().as_ptr() as usize).cmp(&(wb.as_weak_reference().as_ptr() as usize)));
    }
}
