// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use alloc::vec::Vec;

use crate::smart_ptr::{ComInterface, ComRc};

/// Retains every pointer in `ptrs`. Null entries become `None`.
///
/// # Safety
/// Each non-null entry must be a live COM interface pointer.
pub unsafe fn to_com_rc_vec<T: ComInterface>(ptrs: &[*mut T]) -> Vec<Option<ComRc<T>>> {
    ptrs.iter()
        .map(|&ptr| unsafe { ComRc::from_raw_addref(ptr) })
        .collect()
}

/// Borrows the raw pointers out of `handles` without touching their counts.
///
/// The pointers stay valid only as long as `handles` does.
pub fn to_raw_ptr_vec<T: ComInterface>(handles: &[ComRc<T>]) -> Vec<*mut T> {
    handles.iter().map(ComRc::as_ptr).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iunknown::{IUnknownRaw, IUnknownVtbl};
    use crate::vtable::ComImpl;
    use crate::wrapper::ComObject;

    struct Item;

    impl ComImpl for Item {}

    #[test]
    fn vec_conversions_balance_counts() {
        let a: ComRc<IUnknownRaw> = ComObject::<Item, IUnknownVtbl>::new_rc(Item).unwrap();
        let b: ComRc<IUnknownRaw> = ComObject::<Item, IUnknownVtbl>::new_rc(Item).unwrap();

        let raw = to_raw_ptr_vec(&[a.clone(), b.clone()]);
        assert_eq!(raw, [a.as_ptr(), b.as_ptr()]);
        assert_eq!(a.ref_count(), 1);

        let mut with_null = raw.clone();
        with_null.push(core::ptr::null_mut());
        let retained = unsafe { to_com_rc_vec(&with_null) };
        assert_eq!(retained.len(), 3);
        assert!(retained[2].is_none());
        assert_eq!(retained[0].as_ref(), Some(&a));
        assert_eq!(a.ref_count(), 2);
        assert_eq!(b.ref_count(), 2);

        drop(retained);
        assert_eq!(a.ref_count(), 1);
    }
}
