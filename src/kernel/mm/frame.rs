// src/kernel/mm/frame.rs
//! Physical frame handle
//!
//! A [`Frame`] owns one page of physical memory, reached through its kernel
//! virtual address. The allocator that produced it gets it back through
//! [`FrameAllocator::deallocate_frame`](crate::kernel::core::FrameAllocator).

use core::fmt;
use core::ptr::NonNull;

use bitflags::bitflags;
use userprog_abi::PAGE_SIZE;

bitflags! {
    /// Frame allocation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Zero the page before returning it
        const ZERO = 1 << 0;
        /// Page will be mapped into user space
        const USER = 1 << 1;
    }
}

/// Raw page storage
pub type PageBytes = [u8; PAGE_SIZE];

/// Owned physical page
pub struct Frame {
    page: NonNull<PageBytes>,
}

// SAFETY: a Frame is the unique owner of its page; the page is plain bytes.
unsafe impl Send for Frame {}
// SAFETY: shared references only hand out shared access to the bytes.
unsafe impl Sync for Frame {}

impl Frame {
    /// Take ownership of the page at `page`.
    ///
    /// # Safety
    ///
    /// `page` must be valid for reads and writes of [`PAGE_SIZE`] bytes and
    /// must not be accessed through any other path until the frame is turned
    /// back into a pointer with [`Frame::into_raw`].
    #[must_use]
    pub const unsafe fn from_raw(page: NonNull<PageBytes>) -> Self {
        Self { page }
    }

    /// Give up ownership, returning the page pointer
    #[must_use]
    pub const fn into_raw(self) -> NonNull<PageBytes> {
        self.page
    }

    /// Kernel virtual address of the page
    #[must_use]
    pub fn kernel_addr(&self) -> usize {
        self.page.as_ptr() as usize
    }

    /// Page contents
    #[must_use]
    pub const fn as_bytes(&self) -> &PageBytes {
        // SAFETY: guaranteed valid and exclusively owned by `from_raw`.
        unsafe { self.page.as_ref() }
    }

    /// Mutable page contents
    pub const fn as_bytes_mut(&mut self) -> &mut PageBytes {
        // SAFETY: guaranteed valid and exclusively owned by `from_raw`.
        unsafe { self.page.as_mut() }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.kernel_addr())
    }
}
