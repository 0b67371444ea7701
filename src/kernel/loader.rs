// src/kernel/loader.rs
//! Program loader
//!
//! Builds a fresh user address space for the calling thread from an ELF
//! executable and a command line.

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::errors::LoadError;
use crate::kernel::mm::user_paging::release_address_space;
use crate::kernel::process::elf_impl::{LoadedProgram, load_segment, setup_stack};
use crate::kernel::process::elf_loader::ElfImage;
use crate::kernel::task::ThreadContext;

/// Load the program named by the first word of `command` into a new address
/// space for `thread`, with the words of `command` as its arguments.
///
/// On success the address space is attached to `thread` and active. On
/// failure `thread` is left without an address space and every page that
/// was mapped has been freed.
///
/// # Errors
///
/// See [`LoadError`].
pub fn load(thread: &mut ThreadContext, command: &str) -> Result<LoadedProgram, LoadError> {
    let args: Vec<&str> = command.split_ascii_whitespace().collect();
    let Some(&program) = args.first() else {
        return Err(LoadError::EmptyCommand);
    };

    let kernel = Arc::clone(thread.kernel());
    let pagedir = kernel.address_spaces().create().ok_or(LoadError::OutOfMemory)?;
    thread.install_pagedir(pagedir);

    let result = load_into(thread, program, &args);
    match &result {
        Ok(loaded) => debug!(
            "[LOADER] {program}: entry={:#010x} sp={:#010x}",
            loaded.entry, loaded.stack_pointer
        ),
        Err(err) => {
            warn!("[LOADER] load: {program}: {err}");
            release_address_space(thread);
        }
    }
    result
}

fn load_into(
    thread: &mut ThreadContext,
    program: &str,
    args: &[&str],
) -> Result<LoadedProgram, LoadError> {
    let kernel = Arc::clone(thread.kernel());
    let mut file = kernel.file_system().open(program).ok_or(LoadError::NotFound)?;
    let image = ElfImage::read(file.as_mut(), kernel.config())?;

    let pagedir = thread.pagedir_mut().ok_or(LoadError::OutOfMemory)?;
    for plan in &image.segments {
        load_segment(pagedir, kernel.frames(), file.as_mut(), plan)?;
    }
    let stack_pointer = setup_stack(pagedir, kernel.frames(), args)?;

    Ok(LoadedProgram {
        entry: image.entry(),
        stack_pointer,
    })
}
