// src/kernel/process/stack.rs
//! Initial user stack construction
//!
//! The stack page is filled while it is still a plain kernel buffer. A
//! cursor moves down from the top of the page; each push returns the user
//! address the data will have once the page is mapped at `page_base`.
//!
//! Layout produced by [`push_args`] for `echo a bc` (addresses relative to
//! `PHYS_BASE`):
//!
//! | Address | Name           | Data       |
//! |---------|----------------|------------|
//! | -5      | argv[0][..]    | `echo\0`   |
//! | -7      | argv[1][..]    | `a\0`      |
//! | -10     | argv[2][..]    | `bc\0`     |
//! | -12     | padding        | `0 0`      |
//! | -16     | argv[3]        | `0`        |
//! | -20     | argv[2]        | -10        |
//! | -24     | argv[1]        | -7         |
//! | -28     | argv[0]        | -5         |
//! | -32     | argv           | -28        |
//! | -36     | argc           | 3          |
//! | -40     | return address | 0          |

use alloc::vec::Vec;
use core::fmt;

use userprog_abi::{PAGE_SIZE, WORD_SIZE};

/// The pushed data no longer fits in the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackOverflow;

impl fmt::Display for StackOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stack page overflow")
    }
}

/// Top-down writer over one stack page
#[derive(Debug)]
pub struct StackBuilder<'a> {
    page: &'a mut [u8; PAGE_SIZE],
    page_base: u32,
    /// Offset of the lowest byte written so far
    cursor: usize,
}

impl<'a> StackBuilder<'a> {
    /// Empty stack over `page`, which will be mapped at `page_base`
    #[must_use]
    pub const fn new(page: &'a mut [u8; PAGE_SIZE], page_base: u32) -> Self {
        Self {
            page,
            page_base,
            cursor: PAGE_SIZE,
        }
    }

    /// User address of the lowest byte written
    #[must_use]
    pub const fn stack_pointer(&self) -> u32 {
        self.page_base + self.cursor as u32
    }

    /// Push raw bytes, returning their user address
    ///
    /// # Errors
    ///
    /// `StackOverflow` if they do not fit.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<u32, StackOverflow> {
        let start = self.cursor.checked_sub(bytes.len()).ok_or(StackOverflow)?;
        self.page[start..self.cursor].copy_from_slice(bytes);
        self.cursor = start;
        Ok(self.stack_pointer())
    }

    /// Push `s` followed by a NUL, returning the address of its first byte
    ///
    /// # Errors
    ///
    /// `StackOverflow` if it does not fit.
    pub fn push_str(&mut self, s: &str) -> Result<u32, StackOverflow> {
        self.push_bytes(&[0])?;
        self.push_bytes(s.as_bytes())
    }

    /// Push one little-endian word
    ///
    /// # Errors
    ///
    /// `StackOverflow` if it does not fit.
    pub fn push_word(&mut self, word: u32) -> Result<u32, StackOverflow> {
        self.push_bytes(&word.to_le_bytes())
    }

    /// Pad with zeros down to a multiple of `align`
    ///
    /// # Errors
    ///
    /// `StackOverflow` if the padding does not fit.
    pub fn align(&mut self, align: usize) -> Result<(), StackOverflow> {
        debug_assert!(align.is_power_of_two());
        let target = self.cursor & !(align - 1);
        let pad = self.cursor - target;
        if pad > 0 {
            self.push_bytes(&[0u8; 16][..pad])?;
        }
        Ok(())
    }
}

/// Lay out `args` the way the user-mode entry stub expects and return the
/// initial stack pointer.
///
/// `argv[argc]` is a NULL sentinel, `argv[0]` has the lowest slot, and the
/// stack pointer addresses a fake return address with `argc` and `argv`
/// above it.
///
/// # Errors
///
/// `StackOverflow` if the arguments do not fit in one page.
pub fn push_args(stack: &mut StackBuilder<'_>, args: &[&str]) -> Result<u32, StackOverflow> {
    debug_assert!(!args.is_empty());

    let mut addrs = Vec::with_capacity(args.len());
    for arg in args {
        addrs.push(stack.push_str(arg)?);
    }
    stack.align(WORD_SIZE)?;

    stack.push_word(0)?;
    for &addr in addrs.iter().rev() {
        stack.push_word(addr)?;
    }
    let argv = stack.stack_pointer();
    stack.push_word(argv)?;
    stack.push_word(addrs.len() as u32)?;
    stack.push_word(0)
}
