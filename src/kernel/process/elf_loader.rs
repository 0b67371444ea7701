// src/kernel/process/elf_loader.rs
//! ELF32 executable parser
//!
//! Reads the file header and program-header table of an i386 executable and
//! turns every loadable segment into a page-granular [`SegmentPlan`].
//!
//! # Loading Process
//!
//! 1. Read and validate the 52-byte header
//! 2. Read each 32-byte program header
//! 3. Reject dynamic-linking segments, skip informational ones
//! 4. Validate every LOAD segment and plan its pages
//!
//! Nothing is mapped here. The whole table is checked first so that a bad
//! image is refused before a single frame is allocated.
//!
//! # Security
//!
//! The file is untrusted: every offset is range checked, every read is
//! length checked, and address arithmetic never wraps silently.

use alloc::vec::Vec;

use bitflags::bitflags;
use log::{debug, warn};
use userprog_abi::{PAGE_SIZE, PHYS_BASE};

use super::binary_reader::BinaryReader;
use crate::config::KernelConfig;
use crate::errors::FormatError;
use crate::kernel::core::File;
use crate::kernel::mm::VirtAddr;
use crate::kernel::mm::types::page_round_up;

/// First seven identification bytes: magic, 32-bit class, little endian,
/// ELF version 1
pub const ELF32_IDENT: [u8; 7] = [0x7F, b'E', b'L', b'F', 1, 1, 1];

/// Size of the ELF32 file header
pub const ELF32_HEADER_SIZE: usize = 52;

/// Size of one ELF32 program header
pub const ELF32_PHDR_SIZE: usize = 32;

/// `e_type` of an executable file
pub const ET_EXEC: u16 = 2;

/// `e_machine` of Intel 80386
pub const EM_386: u16 = 3;

/// `e_version` of the current ELF version
pub const EV_CURRENT: u32 = 1;

/// ELF32 file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32Header {
    /// Magic number and other info
    pub e_ident: [u8; 16],
    /// Object file type
    pub e_type: u16,
    /// Architecture
    pub e_machine: u16,
    /// Object file version
    pub e_version: u32,
    /// Entry point virtual address
    pub e_entry: u32,
    /// Program header table file offset
    pub e_phoff: u32,
    /// Section header table file offset
    pub e_shoff: u32,
    /// Processor-specific flags
    pub e_flags: u32,
    /// ELF header size in bytes
    pub e_ehsize: u16,
    /// Program header table entry size
    pub e_phentsize: u16,
    /// Program header table entry count
    pub e_phnum: u16,
    /// Section header table entry size
    pub e_shentsize: u16,
    /// Section header table entry count
    pub e_shnum: u16,
    /// Section header string table index
    pub e_shstrndx: u16,
}

impl Elf32Header {
    /// Decode a header from its on-disk bytes
    ///
    /// # Errors
    ///
    /// `TruncatedHeader` if `data` is shorter than [`ELF32_HEADER_SIZE`].
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        Self::decode(&mut BinaryReader::new(data)).ok_or(FormatError::TruncatedHeader)
    }

    fn decode(r: &mut BinaryReader<'_>) -> Option<Self> {
        Some(Self {
            e_ident: r.read_array()?,
            e_type: r.read_u16()?,
            e_machine: r.read_u16()?,
            e_version: r.read_u32()?,
            e_entry: r.read_u32()?,
            e_phoff: r.read_u32()?,
            e_shoff: r.read_u32()?,
            e_flags: r.read_u32()?,
            e_ehsize: r.read_u16()?,
            e_phentsize: r.read_u16()?,
            e_phnum: r.read_u16()?,
            e_shentsize: r.read_u16()?,
            e_shnum: r.read_u16()?,
            e_shstrndx: r.read_u16()?,
        })
    }

    /// Check that this is an i386 executable this loader can handle
    ///
    /// # Errors
    ///
    /// The first identification or field check that fails.
    pub fn validate(&self, config: &KernelConfig) -> Result<(), FormatError> {
        if self.e_ident[..ELF32_IDENT.len()] != ELF32_IDENT {
            return Err(FormatError::BadMagic);
        }
        if self.e_type != ET_EXEC {
            return Err(FormatError::UnsupportedType(self.e_type));
        }
        if self.e_machine != EM_386 {
            return Err(FormatError::UnsupportedMachine(self.e_machine));
        }
        if self.e_version != EV_CURRENT {
            return Err(FormatError::UnsupportedVersion(self.e_version));
        }
        if usize::from(self.e_phentsize) != ELF32_PHDR_SIZE {
            return Err(FormatError::BadProgramHeaderSize(self.e_phentsize));
        }
        if self.e_phnum > config.max_program_headers() {
            return Err(FormatError::TooManyProgramHeaders(self.e_phnum));
        }
        Ok(())
    }
}

/// Program header type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramHeaderType {
    /// Unused entry
    Null,
    /// Loadable segment
    Load,
    /// Dynamic linking info
    Dynamic,
    /// Interpreter path
    Interp,
    /// Auxiliary info
    Note,
    /// Reserved
    ShLib,
    /// Program header table
    Phdr,
    /// GNU stack permissions
    GnuStack,
    /// Anything else
    Other(u32),
}

impl ProgramHeaderType {
    /// Classify a raw `p_type`
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Load,
            2 => Self::Dynamic,
            3 => Self::Interp,
            4 => Self::Note,
            5 => Self::ShLib,
            6 => Self::Phdr,
            0x6474_e551 => Self::GnuStack,
            other => Self::Other(other),
        }
    }

    /// Whether the loader must refuse an image carrying this segment
    #[must_use]
    pub const fn is_unsupported(self) -> bool {
        matches!(self, Self::Dynamic | Self::Interp | Self::ShLib)
    }
}

bitflags! {
    /// Program header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        /// Execute permission
        const X = 1 << 0;
        /// Write permission
        const W = 1 << 1;
        /// Read permission
        const R = 1 << 2;
    }
}

/// ELF32 program header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elf32ProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// Segment file offset
    pub p_offset: u32,
    /// Segment virtual address
    pub p_vaddr: u32,
    /// Segment physical address
    pub p_paddr: u32,
    /// Segment size in file
    pub p_filesz: u32,
    /// Segment size in memory
    pub p_memsz: u32,
    /// Segment flags
    pub p_flags: u32,
    /// Segment alignment
    pub p_align: u32,
}

impl Elf32ProgramHeader {
    /// Decode a program header from its on-disk bytes
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut r = BinaryReader::new(data);
        Some(Self {
            p_type: r.read_u32()?,
            p_offset: r.read_u32()?,
            p_vaddr: r.read_u32()?,
            p_paddr: r.read_u32()?,
            p_filesz: r.read_u32()?,
            p_memsz: r.read_u32()?,
            p_flags: r.read_u32()?,
            p_align: r.read_u32()?,
        })
    }

    /// Segment type
    #[must_use]
    pub const fn kind(&self) -> ProgramHeaderType {
        ProgramHeaderType::from_u32(self.p_type)
    }

    /// Permission flags; unknown bits are dropped
    #[must_use]
    pub const fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }

    /// Check a LOAD segment against a file of `file_len` bytes
    ///
    /// # Errors
    ///
    /// The first rule the segment breaks.
    pub fn validate(&self, file_len: u32) -> Result<(), FormatError> {
        let vaddr = VirtAddr::new(self.p_vaddr);
        if self.p_offset % PAGE_SIZE as u32 != vaddr.page_offset() {
            return Err(FormatError::MisalignedSegment);
        }
        if self.p_offset > file_len {
            return Err(FormatError::SegmentOutsideFile);
        }
        if self.p_memsz < self.p_filesz {
            return Err(FormatError::MemSizeSmallerThanFileSize);
        }
        if self.p_memsz == 0 {
            return Err(FormatError::EmptySegment);
        }
        if !vaddr.is_user() {
            return Err(FormatError::SegmentOutsideUserSpace);
        }
        let end = vaddr.checked_add(self.p_memsz).ok_or(FormatError::SegmentWraps)?;
        if !end.is_user() {
            return Err(FormatError::SegmentOutsideUserSpace);
        }
        // Mapping page 0 would make null pointers valid user pointers.
        if self.p_vaddr < PAGE_SIZE as u32 {
            return Err(FormatError::SegmentMapsPageZero);
        }
        Ok(())
    }
}

/// Pages of one LOAD segment, as the loader will map them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Page-aligned file offset of the first page
    pub file_page: u32,
    /// Page-aligned user address of the first page
    pub user_page: VirtAddr,
    /// Bytes read from the file, starting at `file_page`
    pub read_bytes: u32,
    /// Bytes zeroed after `read_bytes`
    pub zero_bytes: u32,
    /// Whether user code may write the pages
    pub writable: bool,
}

impl SegmentPlan {
    /// Plan the pages of a validated LOAD segment
    #[must_use]
    pub fn from_header(phdr: &Elf32ProgramHeader) -> Self {
        let vaddr = VirtAddr::new(phdr.p_vaddr);
        let page_offset = vaddr.page_offset();
        let span = page_round_up(u64::from(page_offset) + u64::from(phdr.p_memsz));
        let read_bytes = if phdr.p_filesz > 0 {
            page_offset + phdr.p_filesz
        } else {
            0
        };
        // Validation keeps the segment below PHYS_BASE, so the span fits.
        debug_assert!(span <= u64::from(PHYS_BASE));
        let zero_bytes = (span - u64::from(read_bytes)) as u32;
        Self {
            file_page: phdr.p_offset & !(PAGE_SIZE as u32 - 1),
            user_page: vaddr.page_round_down(),
            read_bytes,
            zero_bytes,
            writable: phdr.flags().contains(SegmentFlags::W),
        }
    }

    /// Number of pages the segment occupies
    #[must_use]
    pub const fn page_count(&self) -> usize {
        (self.read_bytes + self.zero_bytes) as usize / PAGE_SIZE
    }
}

/// Validated header and segment plans of an executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfImage {
    /// File header
    pub header: Elf32Header,
    /// One plan per LOAD segment, in table order
    pub segments: Vec<SegmentPlan>,
}

impl ElfImage {
    /// Entry point address
    #[must_use]
    pub const fn entry(&self) -> u32 {
        self.header.e_entry
    }

    /// Read and validate the headers of `file`
    ///
    /// # Errors
    ///
    /// A [`FormatError`] describing the first problem found.
    pub fn read(file: &mut dyn File, config: &KernelConfig) -> Result<Self, FormatError> {
        let mut raw = [0u8; ELF32_HEADER_SIZE];
        file.seek(0);
        if file.read(&mut raw) != raw.len() {
            return Err(FormatError::TruncatedHeader);
        }
        let header = Elf32Header::parse(&raw)?;
        header.validate(config)?;

        let file_len = file.length();
        let mut segments = Vec::new();
        for index in 0..header.e_phnum {
            let offset = u64::from(header.e_phoff) + u64::from(index) * ELF32_PHDR_SIZE as u64;
            if offset > u64::from(file_len) {
                return Err(FormatError::ProgramHeaderOutOfRange(offset));
            }
            // offset <= file_len, so it fits in u32
            file.seek(offset as u32);
            let mut raw = [0u8; ELF32_PHDR_SIZE];
            if file.read(&mut raw) != raw.len() {
                return Err(FormatError::TruncatedProgramHeader(index));
            }
            let phdr = Elf32ProgramHeader::parse(&raw)
                .ok_or(FormatError::TruncatedProgramHeader(index))?;

            match phdr.kind() {
                ProgramHeaderType::Load => {
                    phdr.validate(file_len).inspect_err(|err| {
                        warn!("[ELF] segment #{index} rejected: {err}");
                    })?;
                    let plan = SegmentPlan::from_header(&phdr);
                    debug!(
                        "[ELF] LOAD #{index}: {} +{:#x} ({} pages, {})",
                        plan.user_page,
                        phdr.p_memsz,
                        plan.page_count(),
                        if plan.writable { "rw" } else { "ro" }
                    );
                    segments.push(plan);
                }
                kind if kind.is_unsupported() => {
                    return Err(FormatError::UnsupportedSegment(phdr.p_type));
                }
                _ => {}
            }
        }

        debug!("[ELF] entry={:#x}, {} loadable segments", header.e_entry, segments.len());
        Ok(Self { header, segments })
    }
}
