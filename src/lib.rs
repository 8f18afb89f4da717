// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intrusively reference-counted COM objects with weak references.
//!
//! Objects are hosted in [`ComObject`] (one atomic count) or
//! [`WeakComObject`] (strong and weak counts in a shared [`ControlBlock`]),
//! handed around as [`ComRc`] and observed through [`WeakRc`].

#![no_std]

#[doc(hidden)]
pub extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

#[macro_use]
mod macros;

pub mod allocator;
pub mod control;
pub mod facet;
pub mod helpers;
pub mod iunknown;
mod refcount;
pub mod smart_ptr;
pub mod trace;
pub mod trap;
pub mod vtable;
pub mod weak;
pub mod wrapper;

pub use allocator::{Allocator, GlobalAllocator};
pub use control::ControlBlock;
pub use facet::{Facet, FacetVtables, InterfaceEntry, InterfaceSet};
pub use iunknown::{
    failed, succeeded, GUID, HRESULT, IID_IUNKNOWN, IUnknownRaw, IUnknownVtbl, InterfaceId,
    Status, StatusResult, E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_NOTIMPL, E_OUTOFMEMORY,
    E_POINTER, S_FALSE, S_OK,
};
pub use paste;
pub use smart_ptr::{ComInterface, ComRc, ComSlot, ThreadSafeComInterface};
pub use trace::{clear_trace_hook, set_trace_hook};
pub use vtable::{ComImpl, ComInterfaceInfo, ComVtable, ComWrapper, InterfaceVtable};
pub use weak::{
    IWeakReference, IWeakReferenceRaw, IWeakReferenceSource, IWeakReferenceSourceRaw,
    IWeakReferenceSourceVtbl, IWeakReferenceVtbl, WeakComObject, WeakRc, IID_IWEAKREFERENCE,
    IID_IWEAKREFERENCESOURCE,
};
pub use wrapper::{ComObject, Deleter};
