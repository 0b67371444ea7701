// src/kernel/core/types.rs
//! Kernel common type definitions

use core::fmt;

use userprog_abi::Pid;

/// Kernel thread identifier, handed out by the scheduler.
///
/// A user process is identified by the id of the thread that runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub i32);

impl ThreadId {
    /// Raw identifier
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Process id of the process this thread runs
    #[must_use]
    pub const fn as_pid(self) -> Pid {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
