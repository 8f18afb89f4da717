// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::ffi::c_void;
use core::fmt;
use core::hash::{Hash, Hasher};

use crate::smart_ptr::{ComInterface, ThreadSafeComInterface};
use crate::vtable::{ComInterfaceInfo, ComVtable, ComWrapper, InterfaceVtable};

pub type HRESULT = i32;

pub const S_OK: HRESULT = 0;
pub const S_FALSE: HRESULT = 1;
pub const E_NOINTERFACE: HRESULT = 0x8000_4002u32 as i32;
pub const E_FAIL: HRESULT = 0x8000_4005u32 as i32;
pub const E_INVALIDARG: HRESULT = 0x8007_0057u32 as i32;
pub const E_NOTIMPL: HRESULT = 0x8000_4001u32 as i32;
pub const E_OUTOFMEMORY: HRESULT = 0x8007_000Eu32 as i32;
pub const E_POINTER: HRESULT = 0x8000_4003u32 as i32;

#[inline]
pub const fn succeeded(hr: HRESULT) -> bool {
    hr >= 0
}

#[inline]
pub const fn failed(hr: HRESULT) -> bool {
    hr < 0
}

#[repr(transparent)]
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd, thiserror::Error)]
#[error("com status {0:#010x}")]
pub struct Status(pub HRESULT);

impl Status {
    pub const OK: Status = Status(S_OK);
    pub const FALSE: Status = Status(S_FALSE);
    pub const NO_INTERFACE: Status = Status(E_NOINTERFACE);
    pub const FAIL: Status = Status(E_FAIL);
    pub const INVALID_ARG: Status = Status(E_INVALIDARG);
    pub const NOT_IMPLEMENTED: Status = Status(E_NOTIMPL);
    pub const OUT_OF_MEMORY: Status = Status(E_OUTOFMEMORY);
    pub const INVALID_POINTER: Status = Status(E_POINTER);

    #[inline]
    pub const fn from_raw(raw: HRESULT) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> HRESULT {
        self.0
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        succeeded(self.0)
    }

    #[inline]
    pub const fn is_error(self) -> bool {
        failed(self.0)
    }

    #[inline]
    pub fn to_result(self) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Symbolic name of the well-known codes, `"UNKNOWN"` otherwise.
    pub const fn name(self) -> &'static str {
        match self.0 {
            S_OK => "S_OK",
            S_FALSE => "S_FALSE",
            E_NOINTERFACE => "E_NOINTERFACE",
            E_FAIL => "E_FAIL",
            E_INVALIDARG => "E_INVALIDARG",
            E_NOTIMPL => "E_NOTIMPL",
            E_OUTOFMEMORY => "E_OUTOFMEMORY",
            E_POINTER => "E_POINTER",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({}, {:#010x})", self.name(), self.0)
    }
}

impl From<HRESULT> for Status {
    #[inline]
    fn from(value: HRESULT) -> Self {
        Status(value)
    }
}

impl From<Status> for HRESULT {
    #[inline]
    fn from(value: Status) -> Self {
        value.0
    }
}

pub type StatusResult<T = ()> = Result<T, Status>;

/// 128-bit interface identifier.
///
/// Equality folds the four 32-bit words with xor/or so the comparison does not
/// branch per word. Ordering is not provided: ids are only ever matched.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

pub type InterfaceId = GUID;

impl GUID {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Native-endian view of the id as four words, matching its in-memory layout.
    #[inline]
    pub const fn words(&self) -> [u32; 4] {
        let d2 = self.data2.to_ne_bytes();
        let d3 = self.data3.to_ne_bytes();
        let d4 = &self.data4;
        [
            self.data1,
            u32::from_ne_bytes([d2[0], d2[1], d3[0], d3[1]]),
            u32::from_ne_bytes([d4[0], d4[1], d4[2], d4[3]]),
            u32::from_ne_bytes([d4[4], d4[5], d4[6], d4[7]]),
        ]
    }

    #[inline]
    pub const fn equals(&self, other: &GUID) -> bool {
        let a = self.words();
        let b = other.words();
        ((a[0] ^ b[0]) | (a[1] ^ b[1]) | (a[2] ^ b[2]) | (a[3] ^ b[3])) == 0
    }
}

impl PartialEq for GUID {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for GUID {}

impl Hash for GUID {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words().hash(state);
    }
}

impl fmt::Debug for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

pub const IID_IUNKNOWN: GUID = GUID {
    data1: 0x0000_0000,
    data2: 0x0000,
    data3: 0x0000,
    data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(non_snake_case)]
pub struct IUnknownVtbl {
    pub QueryInterface:
        unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
    pub AddRef: unsafe extern "system" fn(*mut c_void) -> u32,
    pub Release: unsafe extern "system" fn(*mut c_void) -> u32,
}

unsafe impl InterfaceVtable for IUnknownVtbl {
    const IID: GUID = IID_IUNKNOWN;

    #[inline]
    fn is_compatible(riid: &GUID) -> bool {
        *riid == IID_IUNKNOWN
    }
}

impl IUnknownVtbl {
    /// Compile-time construction of the IUnknown vtable for `T` hosted by wrapper `W`.
    pub const fn new<T, W>() -> Self
    where
        W: ComWrapper<T>,
    {
        Self {
            QueryInterface: W::shim_query_interface,
            AddRef: W::shim_add_ref,
            Release: W::shim_release,
        }
    }
}

impl<T, W> ComVtable<T, W> for IUnknownVtbl
where
    W: ComWrapper<T>,
{
    const VTABLE: &'static Self = &Self::new::<T, W>();
}

/// Raw pointee for a bare `IUnknown` pointer.
#[repr(C)]
#[allow(non_snake_case)]
pub struct IUnknownRaw {
    pub lpVtbl: *mut IUnknownVtbl,
}

unsafe impl ComInterface for IUnknownRaw {}
// Every object this crate builds counts atomically.
unsafe impl ThreadSafeComInterface for IUnknownRaw {}

impl ComInterfaceInfo for IUnknownRaw {
    type Vtable = IUnknownVtbl;
    const IID: GUID = IID_IUNKNOWN;
}
