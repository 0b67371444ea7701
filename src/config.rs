// src/config.rs

//! Kernel configuration values
//!
//! Limits that bound how much untrusted input the loader and the syscall
//! layer will look at. Address-space constants shared with user space live
//! in `userprog_abi`.

use userprog_abi::PAGE_SIZE;

/// Default cap on `e_phnum`
pub const DEFAULT_MAX_PROGRAM_HEADERS: u16 = 1024;

/// Default command-line buffer size, terminator included
pub const DEFAULT_MAX_COMMAND_LEN: usize = PAGE_SIZE;

/// Process subsystem limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    max_program_headers: u16,
    max_command_len: usize,
}

impl KernelConfig {
    /// Configuration with the default limits
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_program_headers: DEFAULT_MAX_PROGRAM_HEADERS,
            max_command_len: DEFAULT_MAX_COMMAND_LEN,
        }
    }

    /// Set the largest accepted program-header count
    #[must_use]
    pub const fn with_max_program_headers(mut self, count: u16) -> Self {
        self.max_program_headers = count;
        self
    }

    /// Set the command-line buffer size (terminator included).
    ///
    /// Values below 2 are raised to 2 so that at least one byte of command
    /// survives truncation.
    #[must_use]
    pub const fn with_max_command_len(mut self, len: usize) -> Self {
        self.max_command_len = if len < 2 { 2 } else { len };
        self
    }

    /// Largest accepted `e_phnum`
    #[must_use]
    pub const fn max_program_headers(&self) -> u16 {
        self.max_program_headers
    }

    /// Command-line buffer size, terminator included
    #[must_use]
    pub const fn max_command_len(&self) -> usize {
        self.max_command_len
    }

    /// Longest command or user string kept, in bytes
    #[must_use]
    pub const fn max_string_bytes(&self) -> usize {
        self.max_command_len - 1
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
