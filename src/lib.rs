// src/lib.rs
//! userprog - user process subsystem for a teaching kernel
//!
//! Creates user processes from ELF32 executables, tracks parent/child
//! relationships, and services the process-related system calls.
//!
//! Everything outside this crate (scheduler, page tables, frame allocator,
//! file system, console, power control, the trap entry stub) is reached
//! through the collaborator traits in [`kernel::core::traits`]. The crate is
//! `no_std` + `alloc`; host tests plug in in-memory doubles.
//!
//! # Modules
//!
//! - [`kernel::process`]: PCB, spawn / wait / exit, ELF parsing, stack setup
//! - [`kernel::loader`]: builds a user address space from an executable
//! - [`kernel::syscall`]: decodes trapped system calls
//! - [`kernel::security`]: user pointer validation
//! - [`sync`]: one-shot gates used for load and exit notification

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod errors;
pub mod kernel;
pub mod sync;

pub use config::KernelConfig;
pub use errors::{KernelError, KernelResult};
pub use kernel::{Kernel, Services};
pub use kernel::task::ThreadContext;
