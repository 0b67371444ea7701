// tests/common/elf.rs
//! ELF32 image builder for tests

use userprog_abi::PAGE_SIZE;

pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_NOTE: u32 = 4;
pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

/// Header field offsets for patching built images
pub mod field {
    pub const E_TYPE: usize = 16;
    pub const E_MACHINE: usize = 18;
    pub const E_VERSION: usize = 20;
    pub const E_PHOFF: usize = 28;
    pub const E_PHENTSIZE: usize = 42;
    pub const E_PHNUM: usize = 44;
}

pub const DEFAULT_ENTRY: u32 = 0x0804_8074;
pub const TEXT_BASE: u32 = 0x0804_8000;

struct Segment {
    p_type: u32,
    vaddr: u32,
    data: Vec<u8>,
    memsz: u32,
    flags: u32,
}

pub struct ElfBuilder {
    entry: u32,
    segments: Vec<Segment>,
}

impl ElfBuilder {
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    /// Add a PT_LOAD segment with `data` as its file contents
    pub fn load(self, vaddr: u32, data: &[u8], memsz: u32, flags: u32) -> Self {
        self.segment(PT_LOAD, vaddr, data, memsz, flags)
    }

    pub fn segment(mut self, p_type: u32, vaddr: u32, data: &[u8], memsz: u32, flags: u32) -> Self {
        self.segments.push(Segment {
            p_type,
            vaddr,
            data: data.to_vec(),
            memsz,
            flags,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len();
        let table_end = 52 + 32 * phnum;
        let mut out = vec![0u8; table_end];

        out[..7].copy_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1]);
        put16(&mut out, field::E_TYPE, 2);
        put16(&mut out, field::E_MACHINE, 3);
        put32(&mut out, field::E_VERSION, 1);
        put32(&mut out, 24, self.entry);
        put32(&mut out, field::E_PHOFF, 52);
        put16(&mut out, 40, 52);
        put16(&mut out, field::E_PHENTSIZE, 32);
        put16(&mut out, field::E_PHNUM, phnum as u16);

        let mut next_page = round_up(table_end);
        for (i, seg) in self.segments.iter().enumerate() {
            let offset = next_page + seg.vaddr as usize % PAGE_SIZE;
            let end = offset + seg.data.len();
            if out.len() < end {
                out.resize(end, 0);
            }
            out[offset..end].copy_from_slice(&seg.data);
            next_page = round_up(end.max(offset + 1));

            let ph = 52 + 32 * i;
            for (k, word) in [
                seg.p_type,
                offset as u32,
                seg.vaddr,
                seg.vaddr,
                seg.data.len() as u32,
                seg.memsz,
                seg.flags,
                PAGE_SIZE as u32,
            ]
            .into_iter()
            .enumerate()
            {
                put32(&mut out, ph + 4 * k, word);
            }
        }
        out
    }
}

pub fn put16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn round_up(n: usize) -> usize {
    n.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Text bytes used by [`minimal`]
pub const TEXT: &[u8] = b"\x55\x89\xe5\xb8\x01\x00\x00\x00\xcd\x30\xeb\xfe";

/// One read-execute text segment at [`TEXT_BASE`]
pub fn minimal() -> Vec<u8> {
    ElfBuilder::new(DEFAULT_ENTRY)
        .load(TEXT_BASE, TEXT, TEXT.len() as u32, PF_R | PF_X)
        .build()
}
