// src/kernel/mm/mod.rs
//! Memory management module
//!
//! User virtual addresses, the physical frame handle, and the helpers that
//! install and tear down user mappings.

pub mod frame;
pub mod types;
pub mod user_paging;

pub use frame::{AllocFlags, Frame};
pub use types::VirtAddr;
