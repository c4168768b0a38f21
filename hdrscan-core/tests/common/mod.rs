//! Builders for small, well-formed PE and ELF images used across the
//! integration tests. Tests corrupt the returned bytes to exercise the
//! failure paths.

#![allow(dead_code)]

use byteorder::{ByteOrder, BE, LE};

pub const PE_NT_OFFSET: usize = 0x80;
pub const PE_COFF_OFFSET: usize = PE_NT_OFFSET + 4;
pub const PE_NUMBER_OF_SECTIONS: usize = PE_COFF_OFFSET + 2;
pub const PE_OPTIONAL_OFFSET: usize = PE_COFF_OFFSET + 20;
pub const PE_IMAGE_LEN: usize = 0x400;

pub const PE_ENTRY_POINT: u32 = 0x1234;
pub const PE32_IMAGE_BASE: u64 = 0x0040_0000;
pub const PE64_IMAGE_BASE: u64 = 0x1_4000_0000;

#[derive(Debug, Clone)]
pub struct PeSection {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

pub fn default_sections() -> Vec<PeSection> {
    vec![
        PeSection {
            name: *b".text\0\0\0",
            virtual_size: 0x0E00,
            virtual_address: 0x1000,
            size_of_raw_data: 0x1000,
            pointer_to_raw_data: 0x400,
            characteristics: 0x6000_0020,
        },
        PeSection {
            name: *b".rdata\0\0",
            virtual_size: 0x0200,
            virtual_address: 0x2000,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0x1400,
            characteristics: 0x4000_0040,
        },
        PeSection {
            name: *b".data\0\0\0",
            virtual_size: 0x0100,
            virtual_address: 0x3000,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0x1600,
            characteristics: 0xC000_0040,
        },
    ]
}

/// Size of the optional header including all 16 data directories.
pub fn pe_optional_header_size(pe32plus: bool) -> usize {
    if pe32plus {
        112 + 16 * 8
    } else {
        96 + 16 * 8
    }
}

pub fn pe_section_table_offset(pe32plus: bool) -> usize {
    PE_OPTIONAL_OFFSET + pe_optional_header_size(pe32plus)
}

pub fn build_pe(pe32plus: bool, sections: &[PeSection]) -> Vec<u8> {
    let mut b = vec![0u8; PE_IMAGE_LEN];

    // DOS header, values as emitted by common linkers.
    b[0..2].copy_from_slice(b"MZ");
    LE::write_u16(&mut b[0x02..], 0x90);
    LE::write_u16(&mut b[0x04..], 0x03);
    LE::write_u16(&mut b[0x08..], 0x04);
    LE::write_u16(&mut b[0x0C..], 0xFFFF);
    LE::write_u16(&mut b[0x10..], 0xB8);
    LE::write_u16(&mut b[0x18..], 0x40);
    LE::write_u32(&mut b[0x3C..], PE_NT_OFFSET as u32);

    b[PE_NT_OFFSET..PE_NT_OFFSET + 4].copy_from_slice(b"PE\0\0");

    let c = PE_COFF_OFFSET;
    LE::write_u16(&mut b[c..], if pe32plus { 0x8664 } else { 0x014C });
    LE::write_u16(&mut b[c + 2..], sections.len() as u16);
    LE::write_u32(&mut b[c + 4..], 0x5F00_0000);
    LE::write_u16(&mut b[c + 16..], pe_optional_header_size(pe32plus) as u16);
    LE::write_u16(&mut b[c + 18..], if pe32plus { 0x0022 } else { 0x0102 });

    let o = PE_OPTIONAL_OFFSET;
    LE::write_u16(&mut b[o..], if pe32plus { 0x20B } else { 0x10B });
    b[o + 2] = 14;
    LE::write_u32(&mut b[o + 4..], 0x1000);
    LE::write_u32(&mut b[o + 8..], 0x600);
    LE::write_u32(&mut b[o + 16..], PE_ENTRY_POINT);
    LE::write_u32(&mut b[o + 20..], 0x1000);
    if pe32plus {
        LE::write_u64(&mut b[o + 24..], PE64_IMAGE_BASE);
    } else {
        LE::write_u32(&mut b[o + 24..], 0x2000);
        LE::write_u32(&mut b[o + 28..], PE32_IMAGE_BASE as u32);
    }
    LE::write_u32(&mut b[o + 32..], 0x1000);
    LE::write_u32(&mut b[o + 36..], 0x200);
    LE::write_u16(&mut b[o + 40..], 6);
    LE::write_u16(&mut b[o + 48..], 6);
    LE::write_u32(&mut b[o + 56..], 0x5000);
    LE::write_u32(&mut b[o + 60..], 0x400);
    LE::write_u16(&mut b[o + 68..], 3);
    LE::write_u16(&mut b[o + 70..], 0x8160);
    let (values, width) = (
        [0x10_0000u64, 0x1000, 0x10_0000, 0x1000],
        if pe32plus { 8 } else { 4 },
    );
    for (i, v) in values.iter().enumerate() {
        let at = o + 72 + i * width;
        if pe32plus {
            LE::write_u64(&mut b[at..], *v);
        } else {
            LE::write_u32(&mut b[at..], *v as u32);
        }
    }
    let rva_count_at = o + 72 + 4 * width + 4;
    LE::write_u32(&mut b[rva_count_at..], 16);
    // Import directory.
    let dirs_at = rva_count_at + 4;
    LE::write_u32(&mut b[dirs_at + 8..], 0x2000);
    LE::write_u32(&mut b[dirs_at + 12..], 0x28);

    let table = pe_section_table_offset(pe32plus);
    for (i, s) in sections.iter().enumerate() {
        let at = table + i * 40;
        b[at..at + 8].copy_from_slice(&s.name);
        LE::write_u32(&mut b[at + 8..], s.virtual_size);
        LE::write_u32(&mut b[at + 12..], s.virtual_address);
        LE::write_u32(&mut b[at + 16..], s.size_of_raw_data);
        LE::write_u32(&mut b[at + 20..], s.pointer_to_raw_data);
        LE::write_u32(&mut b[at + 36..], s.characteristics);
    }
    b
}

pub fn pe32() -> Vec<u8> {
    build_pe(false, &default_sections())
}

pub fn pe32plus() -> Vec<u8> {
    build_pe(true, &default_sections())
}

pub const ELF_ENTRY: u64 = 0x40_1000;

/// A built ELF image plus the layout facts tests need to corrupt it.
pub struct ElfImage {
    pub bytes: Vec<u8>,
    pub class64: bool,
    pub big_endian: bool,
    pub phoff: usize,
    pub shoff: usize,
    pub shstrtab_index: usize,
}

impl ElfImage {
    fn put_u16(&mut self, at: usize, v: u16) {
        if self.big_endian {
            BE::write_u16(&mut self.bytes[at..], v)
        } else {
            LE::write_u16(&mut self.bytes[at..], v)
        }
    }

    fn put_u32(&mut self, at: usize, v: u32) {
        if self.big_endian {
            BE::write_u32(&mut self.bytes[at..], v)
        } else {
            LE::write_u32(&mut self.bytes[at..], v)
        }
    }

    fn put_word(&mut self, at: usize, v: u64) {
        match (self.class64, self.big_endian) {
            (true, true) => BE::write_u64(&mut self.bytes[at..], v),
            (true, false) => LE::write_u64(&mut self.bytes[at..], v),
            (false, _) => self.put_u32(at, v as u32),
        }
    }

    fn word(&self) -> usize {
        if self.class64 {
            8
        } else {
            4
        }
    }

    /// Offset of `e_flags`; the 16-bit size/count fields follow it.
    fn after_words(&self) -> usize {
        24 + 3 * self.word()
    }

    pub fn set_phentsize(&mut self, v: u16) {
        let at = self.after_words() + 6;
        self.put_u16(at, v);
    }

    pub fn set_phnum(&mut self, v: u16) {
        let at = self.after_words() + 8;
        self.put_u16(at, v);
    }

    pub fn set_shnum(&mut self, v: u16) {
        let at = self.after_words() + 12;
        self.put_u16(at, v);
    }

    pub fn set_shstrndx(&mut self, v: u16) {
        let at = self.after_words() + 14;
        self.put_u16(at, v);
    }

    pub fn set_shoff(&mut self, v: u64) {
        let at = 24 + 2 * self.word();
        self.put_word(at, v);
    }

    pub fn program_header_size(&self) -> usize {
        if self.class64 {
            56
        } else {
            32
        }
    }

    pub fn section_header_size(&self) -> usize {
        if self.class64 {
            64
        } else {
            40
        }
    }

    /// Sets `p_filesz` of program header `index`.
    pub fn set_segment_filesz(&mut self, index: usize, v: u64) {
        let base = self.phoff + index * self.program_header_size();
        let at = if self.class64 { base + 32 } else { base + 16 };
        self.put_word(at, v);
    }

    /// Sets `sh_size` of section `index`.
    pub fn set_section_size(&mut self, index: usize, size: u64) {
        let w = self.word();
        let at = self.shoff + index * self.section_header_size() + 8 + 3 * w;
        self.put_word(at, size);
    }

    /// File offset of the section name string table contents.
    pub fn strtab_offset(&self) -> usize {
        self.phoff + self.phnum() * self.program_header_size()
    }

    fn phnum(&self) -> usize {
        let at = self.after_words() + 8;
        let raw = [self.bytes[at], self.bytes[at + 1]];
        if self.big_endian {
            u16::from_be_bytes(raw) as usize
        } else {
            u16::from_le_bytes(raw) as usize
        }
    }

    /// Sets `sh_size`, `sh_link` and `sh_info` of the null section 0, used
    /// for extended numbering.
    pub fn set_section_zero(&mut self, size: u64, link: u32, info: u32) {
        let w = self.word();
        let base = self.shoff;
        self.put_word(base + 8 + 3 * w, size);
        self.put_u32(base + 8 + 4 * w, link);
        self.put_u32(base + 8 + 4 * w + 4, info);
    }
}

pub fn section_name(i: usize) -> String {
    format!(".sec{}", i)
}

/// Builds an executable with `phnum` program headers and
/// `1 + named + 1` sections: the null section, `.sec1..=.secN`, and
/// `.shstrtab` last. The section header table sits at the very end of the
/// file.
pub fn build_elf(class64: bool, big_endian: bool, phnum: usize, named: usize) -> ElfImage {
    let (ehsize, phentsize, shentsize) = if class64 { (64, 56, 64) } else { (52, 32, 40) };

    let mut strtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for i in 1..=named {
        name_offsets.push(strtab.len() as u32);
        strtab.extend_from_slice(section_name(i).as_bytes());
        strtab.push(0);
    }
    let shstrtab_name = strtab.len() as u32;
    strtab.extend_from_slice(b".shstrtab\0");

    let phoff = ehsize;
    let strtab_off = phoff + phnum * phentsize;
    let shoff = (strtab_off + strtab.len() + 7) & !7;
    let shnum = named + 2;
    let len = shoff + shnum * shentsize;

    let mut img = ElfImage {
        bytes: vec![0u8; len],
        class64,
        big_endian,
        phoff,
        shoff,
        shstrtab_index: shnum - 1,
    };

    img.bytes[..4].copy_from_slice(b"\x7fELF");
    img.bytes[4] = if class64 { 2 } else { 1 };
    img.bytes[5] = if big_endian { 2 } else { 1 };
    img.bytes[6] = 1;
    img.bytes[7] = 0;

    let w = img.word();
    img.put_u16(16, 2);
    img.put_u16(18, if class64 { 62 } else { 8 });
    img.put_u32(20, 1);
    img.put_word(24, ELF_ENTRY);
    img.put_word(24 + w, phoff as u64);
    img.put_word(24 + 2 * w, shoff as u64);
    let aw = img.after_words();
    img.put_u32(aw, 0);
    img.put_u16(aw + 4, ehsize as u16);
    img.put_u16(aw + 6, phentsize as u16);
    img.put_u16(aw + 8, phnum as u16);
    img.put_u16(aw + 10, shentsize as u16);
    img.put_u16(aw + 12, shnum as u16);
    img.put_u16(aw + 14, (shnum - 1) as u16);

    // PT_PHDR, PT_INTERP, then PT_LOAD for the rest.
    for i in 0..phnum {
        let base = phoff + i * phentsize;
        let p_type = match i {
            0 => 6,
            1 => 3,
            _ => 1,
        };
        let vaddr = 0x40_0000 + (i as u64) * 0x1000;
        img.put_u32(base, p_type);
        if class64 {
            img.put_u32(base + 4, 5);
            img.put_word(base + 8, 0);
            img.put_word(base + 16, vaddr);
            img.put_word(base + 24, vaddr);
            img.put_word(base + 32, ehsize as u64);
            img.put_word(base + 40, ehsize as u64);
            img.put_word(base + 48, 0x1000);
        } else {
            img.put_word(base + 4, 0);
            img.put_word(base + 8, vaddr);
            img.put_word(base + 12, vaddr);
            img.put_word(base + 16, ehsize as u64);
            img.put_word(base + 20, ehsize as u64);
            img.put_u32(base + 24, 5);
            img.put_word(base + 28, 0x1000);
        }
    }

    img.bytes[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);

    for i in 1..shnum {
        let base = shoff + i * shentsize;
        let (name, sh_type, flags, addr, offset, size, align) = if i == shnum - 1 {
            (shstrtab_name, 3u32, 0u64, 0u64, strtab_off as u64, strtab.len() as u64, 1u64)
        } else {
            (
                name_offsets[i - 1],
                1u32,
                0x6u64,
                0x40_1000 + (i as u64) * 0x100,
                ehsize as u64,
                0x10u64,
                16u64,
            )
        };
        img.put_u32(base, name);
        img.put_u32(base + 4, sh_type);
        img.put_word(base + 8, flags);
        img.put_word(base + 8 + w, addr);
        img.put_word(base + 8 + 2 * w, offset);
        img.put_word(base + 8 + 3 * w, size);
        img.put_word(base + 8 + 4 * w + 8, align);
    }

    img
}
