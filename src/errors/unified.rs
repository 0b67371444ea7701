// src/errors/unified.rs

//! Unified error types
//!
//! Hand-written enums with `as_str`, `Display` and `From` conversions so
//! that `?` carries a failure from the ELF parser up to `spawn`.

use core::fmt;

/// Rejected executable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// File shorter than the ELF header
    TruncatedHeader,
    /// Identification bytes are not 32-bit little-endian ELF version 1
    BadMagic,
    /// `e_type` is not an executable
    UnsupportedType(u16),
    /// `e_machine` is not i386
    UnsupportedMachine(u16),
    /// `e_version` is not 1
    UnsupportedVersion(u32),
    /// `e_phentsize` is not the ELF32 program-header size
    BadProgramHeaderSize(u16),
    /// `e_phnum` exceeds the configured cap
    TooManyProgramHeaders(u16),
    /// A program-header offset lies past the end of the file
    ProgramHeaderOutOfRange(u64),
    /// A program header could not be read in full
    TruncatedProgramHeader(u16),
    /// Dynamic linking or interpreter segment
    UnsupportedSegment(u32),
    /// `p_offset` and `p_vaddr` disagree modulo the page size
    MisalignedSegment,
    /// `p_offset` lies past the end of the file
    SegmentOutsideFile,
    /// `p_memsz < p_filesz`
    MemSizeSmallerThanFileSize,
    /// `p_memsz == 0`
    EmptySegment,
    /// Segment reaches into kernel space
    SegmentOutsideUserSpace,
    /// `p_vaddr + p_memsz` wraps around
    SegmentWraps,
    /// Segment would map page 0
    SegmentMapsPageZero,
    /// Two segments (or a segment and the stack) share a page
    OverlappingSegment,
}

impl FormatError {
    /// Short description without the offending value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TruncatedHeader => "truncated ELF header",
            Self::BadMagic => "not a 32-bit little-endian ELF file",
            Self::UnsupportedType(_) => "not an executable",
            Self::UnsupportedMachine(_) => "not an i386 executable",
            Self::UnsupportedVersion(_) => "unsupported ELF version",
            Self::BadProgramHeaderSize(_) => "bad program header size",
            Self::TooManyProgramHeaders(_) => "too many program headers",
            Self::ProgramHeaderOutOfRange(_) => "program header outside file",
            Self::TruncatedProgramHeader(_) => "truncated program header",
            Self::UnsupportedSegment(_) => "unsupported segment type",
            Self::MisalignedSegment => "segment offset and address disagree",
            Self::SegmentOutsideFile => "segment starts past end of file",
            Self::MemSizeSmallerThanFileSize => "segment memory size below file size",
            Self::EmptySegment => "empty segment",
            Self::SegmentOutsideUserSpace => "segment outside user space",
            Self::SegmentWraps => "segment wraps around",
            Self::SegmentMapsPageZero => "segment maps page 0",
            Self::OverlappingSegment => "overlapping segment",
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType(v) | Self::UnsupportedMachine(v) => {
                write!(f, "{} ({v})", self.as_str())
            }
            Self::UnsupportedVersion(v) => write!(f, "{} ({v})", self.as_str()),
            Self::BadProgramHeaderSize(v) | Self::TooManyProgramHeaders(v) => {
                write!(f, "{} ({v})", self.as_str())
            }
            Self::TruncatedProgramHeader(i) => write!(f, "{} #{i}", self.as_str()),
            Self::ProgramHeaderOutOfRange(ofs) => write!(f, "{} ({ofs:#x})", self.as_str()),
            Self::UnsupportedSegment(ty) => write!(f, "{} ({ty:#x})", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Why building an address space from an executable failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The image was rejected
    Format(FormatError),
    /// The file returned fewer bytes than it claims to hold
    Io,
    /// No frame or page directory available
    OutOfMemory,
    /// No file with the program's name
    NotFound,
    /// The command line holds no program name
    EmptyCommand,
    /// The arguments do not fit in the stack page
    ArgumentsTooLong,
}

impl LoadError {
    /// Get error message
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Format(_) => "error loading executable",
            Self::Io => "short read",
            Self::OutOfMemory => "out of memory",
            Self::NotFound => "open failed",
            Self::EmptyCommand => "empty command line",
            Self::ArgumentsTooLong => "arguments do not fit on the stack",
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{}: {e}", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl From<FormatError> for LoadError {
    fn from(err: FormatError) -> Self {
        Self::Format(err)
    }
}

/// Why `spawn` could not start a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The command line holds no program name
    EmptyCommand,
    /// The scheduler refused to create a thread
    ThreadCreation,
    /// The child thread could not load its executable
    LoadFailed,
}

impl SpawnError {
    /// Get error message
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyCommand => "empty command line",
            Self::ThreadCreation => "thread creation failed",
            Self::LoadFailed => "load failed",
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why `wait` returned without an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Not a direct child, or already reaped
    NoSuchChild,
    /// Another wait on the same child is in progress
    AlreadyWaiting,
}

impl WaitError {
    /// Get error message
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchChild => "no such child",
            Self::AlreadyWaiting => "already waiting",
        }
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid user memory access. Always fatal to the offending process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMemoryError {
    /// Address 0
    NullPointer(u32),
    /// Address at or above `PHYS_BASE`, or arithmetic past the top of memory
    KernelAddress(u32),
    /// No mapping in the current address space
    Unmapped(u32),
    /// Write to a read-only page
    ReadOnly(u32),
    /// No terminator within the allowed length
    Unterminated(u32),
}

impl UserMemoryError {
    /// Get error message
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NullPointer(_) => "null pointer",
            Self::KernelAddress(_) => "kernel address",
            Self::Unmapped(_) => "unmapped address",
            Self::ReadOnly(_) => "read-only address",
            Self::Unterminated(_) => "unterminated string",
        }
    }

    /// Faulting user address
    #[must_use]
    pub const fn address(&self) -> u32 {
        match *self {
            Self::NullPointer(a)
            | Self::KernelAddress(a)
            | Self::Unmapped(a)
            | Self::ReadOnly(a)
            | Self::Unterminated(a) => a,
        }
    }
}

impl fmt::Display for UserMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:#010x}", self.as_str(), self.address())
    }
}

/// Unified kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Executable loading
    Load(LoadError),
    /// Process creation
    Spawn(SpawnError),
    /// Child reaping
    Wait(WaitError),
    /// User pointer validation
    UserMemory(UserMemoryError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "load: {e}"),
            Self::Spawn(e) => write!(f, "spawn: {e}"),
            Self::Wait(e) => write!(f, "wait: {e}"),
            Self::UserMemory(e) => write!(f, "user memory: {e}"),
        }
    }
}

impl From<FormatError> for KernelError {
    fn from(err: FormatError) -> Self {
        Self::Load(LoadError::Format(err))
    }
}

impl From<LoadError> for KernelError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

impl From<SpawnError> for KernelError {
    fn from(err: SpawnError) -> Self {
        Self::Spawn(err)
    }
}

impl From<WaitError> for KernelError {
    fn from(err: WaitError) -> Self {
        Self::Wait(err)
    }
}

impl From<UserMemoryError> for KernelError {
    fn from(err: UserMemoryError) -> Self {
        Self::UserMemory(err)
    }
}

/// Result type alias for kernel operations
pub type KernelResult<T> = core::result::Result<T, KernelError>;
