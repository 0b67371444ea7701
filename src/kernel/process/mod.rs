// src/kernel/process/mod.rs
//! Process management module
//!
//! A user process is a kernel thread plus a [`Process`] control block shared
//! between the thread and its parent. The parent keeps the block in its
//! children list until it reaps the exit code with
//! [`wait`](lifecycle::wait).

use alloc::string::String;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, Once};
use userprog_abi::Pid;

use crate::kernel::core::{Scheduler, ThreadId};
use crate::sync::OneShot;

pub mod binary_reader;
pub mod elf_impl;
pub mod elf_loader;
pub mod lifecycle;
pub mod stack;

pub use lifecycle::{exit, get_child, spawn, wait};

/// Exit code of a process that has not exited, and of one that was killed
pub const EXIT_CODE_UNSET: i32 = -1;

/// Outcome of a child's attempt to load its executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Still loading
    Pending,
    /// Loaded; the child is about to enter user mode
    Loaded,
    /// The executable could not be loaded
    Failed,
}

/// Process control block
#[derive(Debug)]
pub struct Process {
    pid: Once<Pid>,
    parent: ThreadId,
    name: String,
    /// Taken by the child when it starts loading
    cmdline: Mutex<Option<String>>,
    load_done: OneShot<LoadStatus>,
    exit_done: OneShot<i32>,
    waiting: AtomicBool,
}

impl Process {
    pub(crate) fn new(parent: ThreadId, name: String, cmdline: String) -> Self {
        Self {
            pid: Once::new(),
            parent,
            name,
            cmdline: Mutex::new(Some(cmdline)),
            load_done: OneShot::new(),
            exit_done: OneShot::new(),
            waiting: AtomicBool::new(false),
        }
    }

    /// Process id, once the thread has been created
    #[must_use]
    pub fn pid(&self) -> Option<Pid> {
        self.pid.get().copied()
    }

    pub(crate) fn set_pid(&self, pid: Pid) {
        self.pid.call_once(|| pid);
    }

    /// Thread that spawned this process
    #[must_use]
    pub const fn parent(&self) -> ThreadId {
        self.parent
    }

    /// Program name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the command line. Only the first call gets it.
    pub(crate) fn take_cmdline(&self) -> Option<String> {
        self.cmdline.lock().take()
    }

    /// Current load status
    #[must_use]
    pub fn load_status(&self) -> LoadStatus {
        self.load_done.get().copied().unwrap_or(LoadStatus::Pending)
    }

    /// Publish the load outcome and wake the spawning thread. `Pending` is
    /// not an outcome and is ignored.
    pub(crate) fn finish_load(&self, status: LoadStatus, scheduler: &dyn Scheduler) {
        if status == LoadStatus::Pending {
            debug_assert!(false, "load finished as pending");
            return;
        }
        self.load_done.raise(status, scheduler);
    }

    /// Block `waiter` until the load outcome is published
    pub(crate) fn wait_loaded(&self, scheduler: &dyn Scheduler, waiter: ThreadId) -> LoadStatus {
        *self.load_done.wait(scheduler, waiter)
    }

    /// Exit code, or [`EXIT_CODE_UNSET`] while the process runs
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_done.get().copied().unwrap_or(EXIT_CODE_UNSET)
    }

    /// Whether the process has exited
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit_done.is_raised()
    }

    /// Record the exit code. Returns `false` if one was already recorded.
    pub(crate) fn finish_exit(&self, code: i32, scheduler: &dyn Scheduler) -> bool {
        self.exit_done.raise(code, scheduler)
    }

    /// Block `waiter` until the exit code is recorded
    pub(crate) fn wait_exited(&self, scheduler: &dyn Scheduler, waiter: ThreadId) -> i32 {
        *self.exit_done.wait(scheduler, waiter)
    }

    /// Whether a parent is blocked in `wait` on this process
    #[must_use]
    pub fn is_waited(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    /// Claim the right to wait. Fails if someone already did.
    pub(crate) fn begin_wait(&self) -> bool {
        self.waiting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
