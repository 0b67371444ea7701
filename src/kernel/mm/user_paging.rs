// src/kernel/mm/user_paging.rs
//! User page mapping
//!
//! Installing frames into a user address space and tearing the whole space
//! down again. Frames that cannot be installed go straight back to the
//! allocator, so a failed load never leaks.

use alloc::boxed::Box;

use log::debug;

use super::{Frame, VirtAddr};
use crate::errors::{FormatError, LoadError};
use crate::kernel::core::{FrameAllocator, PageDirectory};
use crate::kernel::task::ThreadContext;

/// Map `frame` at page-aligned `upage`.
///
/// # Errors
///
/// `OverlappingSegment` if `upage` is already mapped, `OutOfMemory` if the
/// page tables cannot grow. The frame is freed in both cases.
pub fn install_page(
    pagedir: &mut dyn PageDirectory,
    frames: &dyn FrameAllocator,
    upage: VirtAddr,
    frame: Frame,
    writable: bool,
) -> Result<(), LoadError> {
    debug_assert!(upage.is_page_aligned());
    if pagedir.get_page(upage).is_some() {
        frames.deallocate_frame(frame);
        return Err(FormatError::OverlappingSegment.into());
    }
    pagedir.set_page(upage, frame, writable).map_err(|frame| {
        frames.deallocate_frame(frame);
        LoadError::OutOfMemory
    })
}

/// Unmap everything in `pagedir` and free its frames.
///
/// The directory must not be active on any CPU. Returns the number of frames
/// released.
pub fn destroy(mut pagedir: Box<dyn PageDirectory>, frames: &dyn FrameAllocator) -> usize {
    let mapped = pagedir.clear_all();
    let count = mapped.len();
    for frame in mapped {
        frames.deallocate_frame(frame);
    }
    drop(pagedir);
    count
}

/// Detach and destroy the address space of `thread`, if it has one.
///
/// The thread's pointer is cleared and the CPU switched to the kernel-only
/// tables before anything is unmapped, so no interrupt can observe a
/// half-destroyed directory.
pub fn release_address_space(thread: &mut ThreadContext) {
    let Some(pagedir) = thread.take_pagedir() else {
        return;
    };
    let kernel = thread.kernel();
    kernel.address_spaces().activate(None);
    let freed = destroy(pagedir, kernel.frames());
    debug!("[PAGING] {}: released {} user pages", thread.name(), freed);
}
