// userprog_abi/src/native.rs
//! System call numbers and argument slots
//!
//! The numbers are fixed by the user-mode C library and must never be
//! renumbered.

/// Process identifier as seen by user programs.
pub type Pid = i32;

/// Returned by `exec` when no process could be started, and by `wait` when
/// there is nothing to wait for.
pub const PID_ERROR: Pid = -1;

/// Syscall number enumeration
///
/// Type-safe syscall numbers that replace raw integers read from the user
/// stack.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyscallNumber {
    /// Power the machine off
    Halt = 0,
    /// Terminate the calling process
    Exit = 1,
    /// Start a new process from a command line
    Exec = 2,
    /// Wait for a child process to exit
    Wait = 3,
    /// Create a file
    Create = 4,
    /// Delete a file
    Remove = 5,
    /// Open a file
    Open = 6,
    /// Size of an open file
    Filesize = 7,
    /// Read from a file descriptor
    Read = 8,
    /// Write to a file descriptor
    Write = 9,
    /// Change the position in an open file
    Seek = 10,
    /// Report the position in an open file
    Tell = 11,
    /// Close a file descriptor
    Close = 12,
}

impl SyscallNumber {
    /// Convert from the raw word found on the user stack
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Halt),
            1 => Some(Self::Exit),
            2 => Some(Self::Exec),
            3 => Some(Self::Wait),
            4 => Some(Self::Create),
            5 => Some(Self::Remove),
            6 => Some(Self::Open),
            7 => Some(Self::Filesize),
            8 => Some(Self::Read),
            9 => Some(Self::Write),
            10 => Some(Self::Seek),
            11 => Some(Self::Tell),
            12 => Some(Self::Close),
            _ => None,
        }
    }

    /// Number of argument words this call reads from the user stack
    #[must_use]
    pub const fn arg_count(self) -> usize {
        match self {
            Self::Halt => 0,
            Self::Exit
            | Self::Exec
            | Self::Wait
            | Self::Remove
            | Self::Open
            | Self::Filesize
            | Self::Tell
            | Self::Close => 1,
            Self::Create | Self::Seek => 2,
            Self::Read | Self::Write => 3,
        }
    }

    /// Get the category of this syscall
    #[must_use]
    pub const fn category(self) -> SyscallCategory {
        match self {
            Self::Halt | Self::Exit | Self::Exec | Self::Wait => SyscallCategory::Process,
            Self::Create | Self::Remove => SyscallCategory::FileSystem,
            Self::Open
            | Self::Filesize
            | Self::Read
            | Self::Write
            | Self::Seek
            | Self::Tell
            | Self::Close => SyscallCategory::FileDescriptor,
        }
    }
}

impl TryFrom<u32> for SyscallNumber {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_u32(value).ok_or(value)
    }
}

/// Syscall category for grouping related calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallCategory {
    /// Process lifecycle
    Process,
    /// Name-based file system operations
    FileSystem,
    /// Operations on open file descriptors
    FileDescriptor,
}

/// Position of a word in the trapped syscall block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSlot {
    /// The call number itself
    Number,
    /// First argument
    Arg0,
    /// Second argument
    Arg1,
    /// Third argument
    Arg2,
}

impl ArgSlot {
    /// Byte offset from the trapped stack pointer
    #[must_use]
    pub const fn offset(self) -> u32 {
        match self {
            Self::Number => 0,
            Self::Arg0 => 4,
            Self::Arg1 => 8,
            Self::Arg2 => 12,
        }
    }

    /// Slot of the `index`th argument, if the ABI has one
    #[must_use]
    pub const fn arg(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Arg0),
            1 => Some(Self::Arg1),
            2 => Some(Self::Arg2),
            _ => None,
        }
    }
}
