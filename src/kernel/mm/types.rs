// src/kernel/mm/types.rs
//! Type-safe user virtual addresses
//!
//! User space is 32 bits wide, so addresses are `u32` regardless of the
//! host's pointer size.

use core::fmt;

use userprog_abi::{PAGE_SIZE, PHYS_BASE};

const PAGE_MASK: u32 = PAGE_SIZE as u32 - 1;

/// User virtual address
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtAddr(u32);

impl VirtAddr {
    /// Wrap a raw address
    #[inline]
    #[must_use]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Raw address
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Offset within the page
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & PAGE_MASK
    }

    /// Start of the containing page
    #[inline]
    #[must_use]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Whether the offset within the page is zero
    #[inline]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Whether the address lies below `PHYS_BASE`
    #[inline]
    #[must_use]
    pub const fn is_user(self) -> bool {
        self.0 < PHYS_BASE
    }

    /// `self + offset`, or `None` on wrap-around
    #[inline]
    #[must_use]
    pub const fn checked_add(self, offset: u32) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Start of the next page, or `None` past the top of memory
    #[inline]
    #[must_use]
    pub const fn next_page(self) -> Option<Self> {
        self.page_round_down().checked_add(PAGE_SIZE as u32)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Round `value` up to a multiple of the page size
#[inline]
#[must_use]
pub const fn page_round_up(value: u64) -> u64 {
    let page = PAGE_SIZE as u64;
    value.div_ceil(page) * page
}
