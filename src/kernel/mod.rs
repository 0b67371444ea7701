// src/kernel/mod.rs
//! Kernel abstractions
//!
//! [`Kernel`] bundles the collaborator services and the configuration every
//! process-subsystem operation runs against. It is shared by all threads
//! through an `Arc`.

pub mod core;
pub mod loader;
pub mod mm;
pub mod process;
pub mod security;
pub mod syscall;
pub mod task;

use alloc::string::String;
use alloc::sync::Arc;

use spin::Mutex;

use crate::config::KernelConfig;
use self::core::{
    AddressSpaces, Console, FileSystem, FrameAllocator, Platform, Scheduler, ThreadId, UserMode,
};
use self::task::ThreadContext;

/// Collaborators provided by the rest of the kernel
#[derive(Clone)]
pub struct Services {
    /// File system holding the executables
    pub file_system: Arc<dyn FileSystem>,
    /// Physical page allocator
    pub frames: Arc<dyn FrameAllocator>,
    /// Page-directory factory and MMU switch
    pub address_spaces: Arc<dyn AddressSpaces>,
    /// Thread scheduler
    pub scheduler: Arc<dyn Scheduler>,
    /// User-mode entry
    pub user_mode: Arc<dyn UserMode>,
    /// Console for termination records
    pub console: Arc<dyn Console>,
    /// Power control
    pub platform: Arc<dyn Platform>,
}

/// Process subsystem instance
pub struct Kernel {
    services: Services,
    config: KernelConfig,
    /// Serializes name-based file system calls
    fs_gate: Mutex<()>,
}

impl Kernel {
    /// Build a kernel over `services`
    #[must_use]
    pub fn new(services: Services, config: KernelConfig) -> Arc<Self> {
        Arc::new(Self {
            services,
            config,
            fs_gate: Mutex::new(()),
        })
    }

    /// Context for the thread that boots the first user process.
    ///
    /// It has no address space and no PCB of its own; it can spawn and
    /// wait like any other thread.
    #[must_use]
    pub fn main_thread(self: &Arc<Self>, tid: ThreadId, name: &str) -> ThreadContext {
        ThreadContext::new(Arc::clone(self), tid, String::from(name), None)
    }

    /// Subsystem limits
    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// File system
    #[must_use]
    pub fn file_system(&self) -> &dyn FileSystem {
        &*self.services.file_system
    }

    /// Frame allocator
    #[must_use]
    pub fn frames(&self) -> &dyn FrameAllocator {
        &*self.services.frames
    }

    /// Address-space factory
    #[must_use]
    pub fn address_spaces(&self) -> &dyn AddressSpaces {
        &*self.services.address_spaces
    }

    /// Scheduler
    #[must_use]
    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.services.scheduler
    }

    /// User-mode entry
    #[must_use]
    pub fn user_mode(&self) -> &dyn UserMode {
        &*self.services.user_mode
    }

    /// Console
    #[must_use]
    pub fn console(&self) -> &dyn Console {
        &*self.services.console
    }

    /// Power control
    #[must_use]
    pub fn platform(&self) -> &dyn Platform {
        &*self.services.platform
    }

    /// Gate serializing name-based file system calls
    #[must_use]
    pub const fn fs_gate(&self) -> &Mutex<()> {
        &self.fs_gate
    }
}
