// userprog_abi/src/layout.rs
//! User address-space layout and the initial stack contract
//!
//! User space spans `[0, PHYS_BASE)`. The kernel maps one stack page directly
//! below [`PHYS_BASE`] and hands control to the program with the stack pointer
//! at a fake return address:
//!
//! ```text
//!  PHYS_BASE ┌──────────────────────────┐
//!            │ argument strings (NUL)   │  argv[0] highest
//!            │ padding to WORD_SIZE     │
//!            │ NULL (argv[argc])        │
//!            │ argv[argc-1] .. argv[0]  │
//!            │ argv                     │  sp + 8
//!            │ argc                     │  sp + 4
//!  sp ───────│ return address (0)       │  sp + 0
//!            └──────────────────────────┘
//! ```

use core::fmt;

/// Size of one page in bytes
pub const PAGE_SIZE: usize = 4096;

/// First kernel virtual address; user space ends just below it.
pub const PHYS_BASE: u32 = 0xC000_0000;

/// Size of one machine word on the user side
pub const WORD_SIZE: usize = 4;

/// Base of the single initial stack page
pub const STACK_PAGE_BASE: u32 = PHYS_BASE - PAGE_SIZE as u32;

/// Offset of the fake return address from the initial stack pointer
pub const RETURN_ADDRESS_OFFSET: u32 = 0;
/// Offset of `argc` from the initial stack pointer
pub const ARGC_OFFSET: u32 = 4;
/// Offset of the `argv` pointer from the initial stack pointer
pub const ARGV_OFFSET: u32 = 8;

/// Errors while decoding an initial stack page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackLayoutError {
    /// The page slice is not exactly one page long
    BadPageSize,
    /// An address falls outside the stack page
    OutOfPage(u32),
    /// A word read is not word aligned
    Misaligned(u32),
    /// A string runs to the end of the page without a terminator
    Unterminated(u32),
}

impl fmt::Display for StackLayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPageSize => write!(f, "stack image is not one page"),
            Self::OutOfPage(addr) => write!(f, "address {addr:#010x} outside the stack page"),
            Self::Misaligned(addr) => write!(f, "misaligned word at {addr:#010x}"),
            Self::Unterminated(addr) => write!(f, "unterminated string at {addr:#010x}"),
        }
    }
}

/// Read-only view of an initial stack page, decoded the way the user-mode
/// entry stub sees it.
#[derive(Debug, Clone, Copy)]
pub struct InitialStack<'a> {
    page: &'a [u8],
    page_base: u32,
    sp: u32,
}

impl<'a> InitialStack<'a> {
    /// Wrap a stack page mapped at `page_base` with stack pointer `sp`.
    ///
    /// # Errors
    ///
    /// `BadPageSize` if `page` is not [`PAGE_SIZE`] bytes, `OutOfPage` if
    /// `sp` does not point into the page.
    pub fn new(page: &'a [u8], page_base: u32, sp: u32) -> Result<Self, StackLayoutError> {
        if page.len() != PAGE_SIZE {
            return Err(StackLayoutError::BadPageSize);
        }
        let stack = Self { page, page_base, sp };
        stack.offset_of(sp)?;
        Ok(stack)
    }

    /// The stack pointer this view was built with
    #[must_use]
    pub const fn stack_pointer(&self) -> u32 {
        self.sp
    }

    fn offset_of(&self, addr: u32) -> Result<usize, StackLayoutError> {
        addr.checked_sub(self.page_base)
            .map(|off| off as usize)
            .filter(|&off| off < PAGE_SIZE)
            .ok_or(StackLayoutError::OutOfPage(addr))
    }

    /// Read the word at user address `addr`
    ///
    /// # Errors
    ///
    /// Fails if the word is misaligned or not entirely inside the page.
    pub fn word_at(&self, addr: u32) -> Result<u32, StackLayoutError> {
        if addr as usize % WORD_SIZE != 0 {
            return Err(StackLayoutError::Misaligned(addr));
        }
        let off = self.offset_of(addr)?;
        let bytes = self
            .page
            .get(off..off + WORD_SIZE)
            .ok_or(StackLayoutError::OutOfPage(addr))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Fake return address at the stack pointer
    ///
    /// # Errors
    ///
    /// See [`Self::word_at`].
    pub fn return_address(&self) -> Result<u32, StackLayoutError> {
        self.word_at(self.sp + RETURN_ADDRESS_OFFSET)
    }

    /// Argument count
    ///
    /// # Errors
    ///
    /// See [`Self::word_at`].
    pub fn argc(&self) -> Result<u32, StackLayoutError> {
        self.word_at(self.sp + ARGC_OFFSET)
    }

    /// Address of the `argv[0]` slot
    ///
    /// # Errors
    ///
    /// See [`Self::word_at`].
    pub fn argv(&self) -> Result<u32, StackLayoutError> {
        self.word_at(self.sp + ARGV_OFFSET)
    }

    /// Raw `argv[index]` pointer
    ///
    /// # Errors
    ///
    /// See [`Self::word_at`].
    pub fn arg_ptr(&self, index: u32) -> Result<u32, StackLayoutError> {
        let argv = self.argv()?;
        let slot = index
            .checked_mul(WORD_SIZE as u32)
            .and_then(|delta| argv.checked_add(delta))
            .ok_or(StackLayoutError::OutOfPage(argv))?;
        self.word_at(slot)
    }

    /// Bytes of `argv[index]` without the terminator, or `None` for the NULL
    /// sentinel.
    ///
    /// # Errors
    ///
    /// Fails if the pointer leaves the page or the string is unterminated.
    pub fn arg(&self, index: u32) -> Result<Option<&'a [u8]>, StackLayoutError> {
        let ptr = self.arg_ptr(index)?;
        if ptr == 0 {
            return Ok(None);
        }
        let start = self.offset_of(ptr)?;
        let len = self.page[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(StackLayoutError::Unterminated(ptr))?;
        Ok(Some(&self.page[start..start + len]))
    }
}
