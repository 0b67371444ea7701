// src/kernel/security/mod.rs
//! Security validation for user memory
//!
//! Every pointer a user program hands to the kernel is checked here before
//! a single byte is read through it:
//!
//! 1. **Address range** - the whole range lies below `PHYS_BASE` and does
//!    not wrap
//! 2. **Mapping** - every page touched is mapped in the caller's address
//!    space
//! 3. **Permission** - pages written by the kernel are user-writable
//!
//! Accesses go through the page directory rather than raw pointers, so a
//! bad pointer is reported as a [`UserMemoryError`] instead of faulting in
//! the kernel.

use alloc::vec::Vec;

use userprog_abi::{PAGE_SIZE, PHYS_BASE};

use crate::errors::UserMemoryError;
use crate::kernel::core::PageDirectory;
use crate::kernel::mm::VirtAddr;
use crate::kernel::task::ThreadContext;

/// Check if `[addr, addr + len)` lies entirely in user space
#[inline]
#[must_use]
pub const fn is_user_range(addr: u32, len: u32) -> bool {
    match addr.checked_add(len) {
        Some(end) => end <= PHYS_BASE,
        None => false,
    }
}

fn check_range(addr: u32, len: usize) -> Result<(), UserMemoryError> {
    if addr == 0 {
        return Err(UserMemoryError::NullPointer(addr));
    }
    let len = u32::try_from(len).map_err(|_| UserMemoryError::KernelAddress(addr))?;
    if !is_user_range(addr, len) {
        return Err(UserMemoryError::KernelAddress(addr));
    }
    Ok(())
}

fn pagedir_of(thread: &ThreadContext, addr: u32) -> Result<&dyn PageDirectory, UserMemoryError> {
    thread.pagedir().map(|pd| pd as &dyn PageDirectory).ok_or(UserMemoryError::Unmapped(addr))
}

/// Walk `[addr, addr + len)` page by page, calling `f` with each page's
/// user address, the offset into the page and the chunk length.
fn for_each_chunk(
    addr: u32,
    len: usize,
    mut f: impl FnMut(VirtAddr, usize, usize, usize) -> Result<(), UserMemoryError>,
) -> Result<(), UserMemoryError> {
    let mut done = 0;
    while done < len {
        // check_range guarantees no wrap below PHYS_BASE
        let cur = VirtAddr::new(addr + done as u32);
        let offset = cur.page_offset() as usize;
        let chunk = (PAGE_SIZE - offset).min(len - done);
        f(cur, offset, chunk, done)?;
        done += chunk;
    }
    Ok(())
}

/// Verify that `[addr, addr + len)` is readable by the calling process
///
/// # Errors
///
/// The first violation found, reported at the offending address.
pub fn validate_user_read(thread: &ThreadContext, addr: u32, len: usize) -> Result<(), UserMemoryError> {
    check_range(addr, len)?;
    let pagedir = pagedir_of(thread, addr)?;
    for_each_chunk(addr, len, |cur, _, _, _| {
        pagedir
            .get_page(cur.page_round_down())
            .map(|_| ())
            .ok_or(UserMemoryError::Unmapped(cur.as_u32()))
    })
}

/// Verify that `[addr, addr + len)` is writable by the calling process
///
/// # Errors
///
/// The first violation found, reported at the offending address.
pub fn validate_user_write(thread: &ThreadContext, addr: u32, len: usize) -> Result<(), UserMemoryError> {
    validate_user_read(thread, addr, len)?;
    let pagedir = pagedir_of(thread, addr)?;
    for_each_chunk(addr, len, |cur, _, _, _| {
        if pagedir.is_writable(cur.page_round_down()) {
            Ok(())
        } else {
            Err(UserMemoryError::ReadOnly(cur.as_u32()))
        }
    })
}

/// Copy `buf.len()` bytes from user address `addr`
///
/// # Errors
///
/// See [`validate_user_read`].
pub fn copy_from_user(thread: &ThreadContext, addr: u32, buf: &mut [u8]) -> Result<(), UserMemoryError> {
    validate_user_read(thread, addr, buf.len())?;
    let pagedir = pagedir_of(thread, addr)?;
    for_each_chunk(addr, buf.len(), |cur, offset, chunk, done| {
        let frame = pagedir
            .get_page(cur.page_round_down())
            .ok_or(UserMemoryError::Unmapped(cur.as_u32()))?;
        buf[done..done + chunk].copy_from_slice(&frame.as_bytes()[offset..offset + chunk]);
        Ok(())
    })
}

/// Copy `bytes` to user address `addr`
///
/// # Errors
///
/// See [`validate_user_write`].
pub fn copy_to_user(thread: &mut ThreadContext, addr: u32, bytes: &[u8]) -> Result<(), UserMemoryError> {
    validate_user_write(thread, addr, bytes.len())?;
    let pagedir = thread.pagedir_mut().ok_or(UserMemoryError::Unmapped(addr))?;
    for_each_chunk(addr, bytes.len(), |cur, offset, chunk, done| {
        let frame = pagedir
            .get_page_mut(cur.page_round_down())
            .ok_or(UserMemoryError::Unmapped(cur.as_u32()))?;
        frame.as_bytes_mut()[offset..offset + chunk].copy_from_slice(&bytes[done..done + chunk]);
        Ok(())
    })
}

/// Read the little-endian word at user address `addr`
///
/// # Errors
///
/// See [`validate_user_read`].
pub fn read_user_u32(thread: &ThreadContext, addr: u32) -> Result<u32, UserMemoryError> {
    let mut word = [0u8; 4];
    copy_from_user(thread, addr, &mut word)?;
    Ok(u32::from_le_bytes(word))
}

/// Read a NUL-terminated string of at most `max_len` bytes (terminator not
/// counted) from user address `addr`.
///
/// Every byte up to and including the terminator is validated.
///
/// # Errors
///
/// `Unterminated` if no NUL appears within `max_len + 1` bytes; otherwise
/// the first invalid byte.
pub fn read_user_cstr(thread: &ThreadContext, addr: u32, max_len: usize) -> Result<Vec<u8>, UserMemoryError> {
    check_range(addr, 1)?;
    let pagedir = pagedir_of(thread, addr)?;
    let mut out = Vec::new();
    let mut cur = VirtAddr::new(addr);
    loop {
        if !cur.is_user() {
            return Err(UserMemoryError::KernelAddress(cur.as_u32()));
        }
        let frame = pagedir
            .get_page(cur.page_round_down())
            .ok_or(UserMemoryError::Unmapped(cur.as_u32()))?;
        let start = cur.page_offset() as usize;
        let page = &frame.as_bytes()[start..];
        let budget = max_len + 1 - out.len();
        let window = &page[..page.len().min(budget)];
        if let Some(nul) = window.iter().position(|&b| b == 0) {
            out.extend_from_slice(&window[..nul]);
            return Ok(out);
        }
        out.extend_from_slice(window);
        if out.len() > max_len {
            return Err(UserMemoryError::Unterminated(addr));
        }
        cur = cur
            .next_page()
            .ok_or(UserMemoryError::KernelAddress(cur.as_u32()))?;
    }
}
