// src/kernel/process/binary_reader.rs
//! Little-endian field reader for ELF structures
//!
//! Header bytes come from an untrusted file, so every read is bounds-checked
//! and reports running off the end as `None`.

/// Cursor over a byte slice
#[derive(Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    /// Reader positioned at the start of `data`
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes left after the current position
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Take the next `N` bytes
    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.remaining() < N {
            return None;
        }
        let end = self.offset + N;
        let bytes = self.data.get(self.offset..end)?;
        self.offset = end;
        bytes.try_into().ok()
    }

    /// Read a u16 (little endian)
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Read a u32 (little endian)
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }
}
