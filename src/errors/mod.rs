// src/errors/mod.rs

//! Error types of the process subsystem
//!
//! Each stage has its own enum; [`KernelError`] unifies them for callers that
//! only need to report.

pub mod unified;

pub use unified::{
    FormatError, KernelError, KernelResult, LoadError, SpawnError, UserMemoryError, WaitError,
};
