// src/kernel/process/elf_impl.rs
//! ELF loading implementation
//!
//! Turns the plans produced by [`elf_loader`](super::elf_loader) into
//! mapped, initialized user pages, and builds the stack page.

use log::debug;
use userprog_abi::PAGE_SIZE;
use userprog_abi::layout::STACK_PAGE_BASE;

use super::elf_loader::SegmentPlan;
use super::stack::{StackBuilder, push_args};
use crate::errors::LoadError;
use crate::kernel::core::{File, FrameAllocator, PageDirectory};
use crate::kernel::mm::user_paging::install_page;
use crate::kernel::mm::{AllocFlags, VirtAddr};

/// Where a loaded program starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedProgram {
    /// Entry point address
    pub entry: u32,
    /// Initial stack pointer, addressing the fake return address
    pub stack_pointer: u32,
}

/// Map and initialize the pages of one segment
///
/// # Errors
///
/// `OutOfMemory` when no frame is left, `Io` when the file is shorter than
/// the plan, `Format(OverlappingSegment)` when a page is already mapped.
/// Pages installed before the failure stay mapped for the caller to tear
/// down with the rest of the address space.
pub fn load_segment(
    pagedir: &mut dyn PageDirectory,
    frames: &dyn FrameAllocator,
    file: &mut dyn File,
    plan: &SegmentPlan,
) -> Result<(), LoadError> {
    debug_assert_eq!((plan.read_bytes + plan.zero_bytes) as usize % PAGE_SIZE, 0);

    file.seek(plan.file_page);
    let mut read_bytes = plan.read_bytes as usize;
    let mut zero_bytes = plan.zero_bytes as usize;
    let mut upage = plan.user_page;

    while read_bytes > 0 || zero_bytes > 0 {
        let page_read = read_bytes.min(PAGE_SIZE);
        let page_zero = PAGE_SIZE - page_read;

        let mut frame = frames
            .allocate_frame(AllocFlags::USER)
            .ok_or(LoadError::OutOfMemory)?;
        let bytes = frame.as_bytes_mut();
        if file.read(&mut bytes[..page_read]) != page_read {
            frames.deallocate_frame(frame);
            return Err(LoadError::Io);
        }
        bytes[page_read..].fill(0);
        install_page(pagedir, frames, upage, frame, plan.writable)?;

        read_bytes -= page_read;
        zero_bytes -= page_zero;
        if read_bytes > 0 || zero_bytes > 0 {
            // Validated segments end below PHYS_BASE.
            upage = upage.next_page().ok_or(LoadError::OutOfMemory)?;
        }
    }
    Ok(())
}

/// Allocate the stack page, lay out `args` in it and map it just below
/// `PHYS_BASE`. Returns the initial stack pointer.
///
/// # Errors
///
/// `OutOfMemory` without a free frame, `ArgumentsTooLong` if the arguments
/// overflow the page, `Format(OverlappingSegment)` if a segment already
/// claimed the stack page.
pub fn setup_stack(
    pagedir: &mut dyn PageDirectory,
    frames: &dyn FrameAllocator,
    args: &[&str],
) -> Result<u32, LoadError> {
    let mut frame = frames
        .allocate_frame(AllocFlags::USER | AllocFlags::ZERO)
        .ok_or(LoadError::OutOfMemory)?;

    let mut stack = StackBuilder::new(frame.as_bytes_mut(), STACK_PAGE_BASE);
    let sp = match push_args(&mut stack, args) {
        Ok(sp) => sp,
        Err(_) => {
            frames.deallocate_frame(frame);
            return Err(LoadError::ArgumentsTooLong);
        }
    };

    install_page(pagedir, frames, VirtAddr::new(STACK_PAGE_BASE), frame, true)?;
    debug!("[ELF] stack: argc={} sp={:#010x}", args.len(), sp);
    Ok(sp)
}
