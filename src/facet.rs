// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secondary interface slots.
//!
//! A host object embeds one [`InterfaceEntry`] per secondary interface next to
//! its primary vtable. Each entry carries its own vtable and a pointer back to
//! the host, so calls through a facet pointer reach the hosted implementation
//! and `AddRef`/`Release` on it move the host's count.

use core::ffi::c_void;
use core::marker::PhantomData;

use crate::iunknown::{GUID, HRESULT};
use crate::vtable::{ComVtable, ComWrapper, InterfaceVtable};

/// One secondary interface slot: a vtable pointer followed by the host address.
#[repr(C)]
pub struct InterfaceEntry<V: 'static> {
    vtable: &'static V,
    parent: *mut c_void,
}

impl<V: InterfaceVtable> InterfaceEntry<V> {
    #[inline]
    pub const fn new(vtable: &'static V, parent: *mut c_void) -> Self {
        Self { vtable, parent }
    }

    /// The facet pointer handed out for this slot.
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }
}

/// Maps a facet pointer back to the primary pointer of its host.
///
/// # Safety
/// `entry` must point at a live [`InterfaceEntry`] of any vtable type.
#[inline(always)]
pub unsafe fn entry_parent(entry: *mut c_void) -> *mut c_void {
    // The layout does not depend on the vtable type.
    unsafe { (*(entry as *const InterfaceEntry<IUnknownSlot>)).parent }
}

struct IUnknownSlot;

/// Shims for a facet pointer: every call is forwarded to host `W`.
pub struct Facet<W>(PhantomData<fn() -> W>);

unsafe impl<T, W> ComWrapper<T> for Facet<W>
where
    T: 'static,
    W: ComWrapper<T>,
{
    unsafe extern "system" fn shim_query_interface(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT {
        unsafe { W::shim_query_interface(entry_parent(this), riid, ppv) }
    }

    unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32 {
        unsafe { W::shim_add_ref(entry_parent(this)) }
    }

    unsafe extern "system" fn shim_release(this: *mut c_void) -> u32 {
        unsafe { W::shim_release(entry_parent(this)) }
    }

    #[inline(always)]
    unsafe fn inner<'a>(this: *mut c_void) -> &'a T {
        unsafe { W::inner(entry_parent(this)) }
    }
}

/// A tuple of secondary interface vtables, `()` for none.
///
/// Lookup is a fixed sequence of id compares, in declaration order.
pub trait InterfaceSet: 'static {
    type Entries: 'static;

    /// The facet pointer answering `riid`, without touching any count.
    fn find(entries: &Self::Entries, riid: &GUID) -> Option<*mut c_void>;
}

/// Builds the slots of an [`InterfaceSet`] for implementation `T` in host `W`.
pub trait FacetVtables<T, W>: InterfaceSet {
    fn entries(parent: *mut c_void) -> Self::Entries;
}

impl InterfaceSet for () {
    type Entries = ();

    #[inline]
    fn find(_entries: &(), _riid: &GUID) -> Option<*mut c_void> {
        None
    }
}

impl<T, W> FacetVtables<T, W> for () {
    #[inline]
    fn entries(_parent: *mut c_void) {}
}

macro_rules! impl_interface_set {
    ($($vtbl:ident $idx:tt),+) => {
        impl<$($vtbl: InterfaceVtable),+> InterfaceSet for ($($vtbl,)+) {
            type Entries = ($(InterfaceEntry<$vtbl>,)+);

            #[inline]
            fn find(entries: &Self::Entries, riid: &GUID) -> Option<*mut c_void> {
                $(
                    if <$vtbl as InterfaceVtable>::is_compatible(riid) {
                        return Some(entries.$idx.as_ptr());
                    }
                )+
                None
            }
        }

        impl<T, W, $($vtbl),+> FacetVtables<T, W> for ($($vtbl,)+)
        where
            T: 'static,
            W: ComWrapper<T>,
            $($vtbl: ComVtable<T, Facet<W>>,)+
        {
            #[inline]
            fn entries(parent: *mut c_void) -> Self::Entries {
                ($(InterfaceEntry::new(<$vtbl as ComVtable<T, Facet<W>>>::VTABLE, parent),)+)
            }
        }
    };
}

impl_interface_set!(S0 0);
impl_interface_set!(S0 0, S1 1);
impl_interface_set!(S0 0, S1 1, S2 2);
impl_interface_set!(S0 0, S1 1, S2 2, S3 3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iunknown::{IUnknownVtbl, IID_IUNKNOWN};

    struct Host;

    unsafe impl ComWrapper<u32> for Host {
        unsafe extern "system" fn shim_query_interface(
            _this: *mut c_void,
            _riid: *const GUID,
            _ppv: *mut *mut c_void,
        ) -> HRESULT {
            crate::iunknown::E_NOTIMPL
        }

        unsafe extern "system" fn shim_add_ref(this: *mut c_void) -> u32 {
            unsafe { *(this as *const u32) + 1 }
        }

        unsafe extern "system" fn shim_release(this: *mut c_void) -> u32 {
            unsafe { *(this as *const u32) - 1 }
        }

        unsafe fn inner<'a>(this: *mut c_void) -> &'a u32 {
            unsafe { &*(this as *const u32) }
        }
    }

    #[test]
    fn facet_shims_reach_the_host() {
        let mut value = 41u32;
        let parent = &mut value as *mut u32 as *mut c_void;
        let entries = <(IUnknownVtbl,) as FacetVtables<u32, Host>>::entries(parent);
        let facet = entries.0.as_ptr();

        assert_ne!(facet, parent);
        assert_eq!(unsafe { entry_parent(facet) }, parent);
        assert_eq!(unsafe { *<Facet<Host> as ComWrapper<u32>>::inner(facet) }, 41);
        assert_eq!(unsafe { <Facet<Host> as ComWrapper<u32>>::shim_add_ref(facet) }, 42);

        assert_eq!(<(IUnknownVtbl,) as InterfaceSet>::find(&entries, &IID_IUNKNOWN), Some(facet));
        assert_eq!(<() as InterfaceSet>::find(&(), &IID_IUNKNOWN), None);
    }
}
