// Copyright (c) 2026 Exveria
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::iunknown::Status;

/// Memory source for COM objects.
///
/// Objects remember their allocator and hand the block back to it when the
/// last strong reference is released, on whichever thread that happens.
pub trait Allocator {
    /// # Safety
    /// `layout` must be valid and have a non-zero size.
    unsafe fn alloc(&self, layout: Layout) -> *mut u8;

    /// # Safety
    /// `ptr` must have been allocated by this allocator with the same `layout`.
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

/// Fallible allocation helper that returns `Status::OUT_OF_MEMORY` on OOM.
#[inline]
pub fn try_alloc_layout<A: Allocator>(alloc: &A, layout: Layout) -> Result<NonNull<u8>, Status> {
    let ptr = unsafe { alloc.alloc(layout) };
    NonNull::new(ptr).ok_or(Status::OUT_OF_MEMORY)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalAllocator;

impl Allocator for GlobalAllocator {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        alloc::alloc::alloc(layout)
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        alloc::alloc::dealloc(ptr, layout)
    }
}
