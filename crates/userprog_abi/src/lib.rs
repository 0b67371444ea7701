//! Userprog Shared ABI Definitions
//!
//! This crate provides the Application Binary Interface (ABI) shared between
//! the kernel's process subsystem and the user-mode C runtime.
//!
//! # Architecture
//!
//! A user program enters the kernel with a trap. The trapped stack pointer
//! addresses a block of 32-bit words:
//!
//! - **word 0**: the system call number ([`SyscallNumber`])
//! - **words 1..=3**: up to three arguments
//!
//! The kernel answers through the `eax` slot of the trap frame.
//!
//! A freshly started program finds `argc` and `argv` at fixed offsets from its
//! initial stack pointer ([`layout`]).
//!
//! # Modules
//!
//! - [`native`]: syscall numbers and argument offsets
//! - [`layout`]: address-space constants and the initial stack view

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod layout;
pub mod native;

// Re-export commonly used types
pub use layout::{InitialStack, StackLayoutError, PAGE_SIZE, PHYS_BASE, WORD_SIZE};
pub use native::{ArgSlot, Pid, SyscallCategory, SyscallNumber, PID_ERROR};
