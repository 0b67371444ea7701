// src/kernel/task/mod.rs
//! Thread execution context
//!
//! Every operation of the process subsystem runs on behalf of some kernel
//! thread. [`ThreadContext`] is that thread's state, passed explicitly
//! instead of being looked up through a global "current thread".

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::kernel::Kernel;
use crate::kernel::core::{PageDirectory, ThreadId};
use crate::kernel::process::{EXIT_CODE_UNSET, Process};

/// State of one kernel thread as seen by the process subsystem
pub struct ThreadContext {
    kernel: Arc<Kernel>,
    tid: ThreadId,
    name: String,
    /// PCB of the user process this thread runs, if any
    process: Option<Arc<Process>>,
    pagedir: Option<Box<dyn PageDirectory>>,
    /// Spawned and not yet reaped, oldest first
    children: Vec<Arc<Process>>,
    exit_code: i32,
}

impl ThreadContext {
    pub(crate) fn new(
        kernel: Arc<Kernel>,
        tid: ThreadId,
        name: String,
        process: Option<Arc<Process>>,
    ) -> Self {
        Self {
            kernel,
            tid,
            name,
            process,
            pagedir: None,
            children: Vec::new(),
            exit_code: EXIT_CODE_UNSET,
        }
    }

    /// Kernel this thread runs in
    #[must_use]
    pub const fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Thread id
    #[must_use]
    pub const fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Thread name; for user processes the program name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// PCB of the process this thread runs
    #[must_use]
    pub const fn process(&self) -> Option<&Arc<Process>> {
        self.process.as_ref()
    }

    /// Current address space
    #[must_use]
    pub fn pagedir(&self) -> Option<&(dyn PageDirectory + 'static)> {
        self.pagedir.as_deref()
    }

    /// Current address space, mutably
    pub fn pagedir_mut(&mut self) -> Option<&mut (dyn PageDirectory + 'static)> {
        self.pagedir.as_deref_mut()
    }

    /// Attach `pagedir` and switch the CPU to it. Any previous address space
    /// is released first.
    pub fn install_pagedir(&mut self, pagedir: Box<dyn PageDirectory>) {
        crate::kernel::mm::user_paging::release_address_space(self);
        self.kernel.address_spaces().activate(Some(&*pagedir));
        self.pagedir = Some(pagedir);
    }

    /// Detach the address space without deactivating it
    pub(crate) fn take_pagedir(&mut self) -> Option<Box<dyn PageDirectory>> {
        self.pagedir.take()
    }

    /// Children that have not been reaped
    #[must_use]
    pub fn children(&self) -> &[Arc<Process>] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Arc<Process>> {
        &mut self.children
    }

    /// Code reported when this thread exits
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Record the code reported on exit
    pub fn set_exit_code(&mut self, code: i32) {
        self.exit_code = code;
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("has_pagedir", &self.pagedir.is_some())
            .field("children", &self.children.len())
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}
