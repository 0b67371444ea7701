// src/kernel/core/mod.rs
//! Core kernel abstractions
//!
//! Collaborator traits and the shared identifier types.

pub mod traits;
pub mod types;

pub use traits::{
    AddressSpaces, Console, File, FileSystem, FrameAllocator, PageDirectory, Platform, Scheduler,
    ThreadEntry, UserMode,
};
pub use types::ThreadId;
