use crate::cursor::{ByteCursor, Endianness};
use crate::error::{ElfParseError, OutOfBounds};
use crate::header::{Header, INVALID_NAME};
use goblin::elf::header::{
    EI_ABIVERSION, EI_CLASS, EI_DATA, EI_OSABI, EI_VERSION, ELFCLASS32, ELFCLASS64, ELFDATA2LSB,
    ELFDATA2MSB, ELFMAG, ET_DYN, ET_EXEC, SELFMAG, SIZEOF_IDENT,
};
use goblin::elf::program_header::PT_INTERP;
use goblin::elf::section_header::{SHN_UNDEF, SHN_XINDEX, SHT_NOBITS};
use std::fmt;

/// `e_phnum` value meaning the real count lives in section 0's `sh_info`.
pub const PN_XNUM: u16 = 0xffff;

/// Word width of an ELF file, taken from `e_ident[EI_CLASS]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    /// Size of the file header (`Elf32_Ehdr` / `Elf64_Ehdr`).
    pub fn header_size(self) -> u64 {
        match self {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    /// Size of one program header record.
    pub fn program_header_size(self) -> u64 {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    /// Size of one section header record.
    pub fn section_header_size(self) -> u64 {
        match self {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    fn word(self) -> u64 {
        match self {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }

    /// Reads an address/offset/size sized field (`ElfN_Addr`, `ElfN_Off`, ...).
    fn read_word(
        self,
        cur: &ByteCursor<'_>,
        offset: u64,
        endian: Endianness,
    ) -> Result<u64, OutOfBounds> {
        match self {
            ElfClass::Elf32 => cur.read_u32(offset, endian).map(u64::from),
            ElfClass::Elf64 => cur.read_u64(offset, endian),
        }
    }
}

/// The identification bytes `e_ident[0..16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdent {
    /// Decoded `EI_CLASS`.
    pub class: ElfClass,
    /// Decoded `EI_DATA`.
    pub endianness: Endianness,
    /// Raw `EI_CLASS` byte (`ELFCLASS32` = 1, `ELFCLASS64` = 2).
    pub ei_class: u8,
    /// Raw `EI_DATA` byte (`ELFDATA2LSB` = 1, `ELFDATA2MSB` = 2).
    pub ei_data: u8,
    /// `EI_VERSION`, normally `EV_CURRENT` (1).
    pub ei_version: u8,
    /// Target OS ABI (`ELFOSABI_SYSV` = 0, `ELFOSABI_LINUX` = 3, ...).
    pub ei_osabi: u8,
    pub ei_abiversion: u8,
}

/// The ELF file header, widened to 64-bit fields for both classes.
///
/// All values are kept exactly as stored in the file. In particular
/// `e_phnum`, `e_shnum` and `e_shstrndx` are *not* replaced by their
/// extended-numbering values; see [`ElfHeaders::section_count`] for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    pub ident: ElfIdent,

    /// Object file type.
    ///
    /// Common values:
    /// - `ET_REL` (1): Relocatable file
    /// - `ET_EXEC` (2): Executable file
    /// - `ET_DYN` (3): Shared object or PIE
    /// - `ET_CORE` (4): Core dump
    pub e_type: u16,

    /// Target architecture, e.g. `EM_X86_64` (62) or `EM_AARCH64` (183).
    pub e_machine: u16,

    /// Object file version (usually `EV_CURRENT` = 1).
    pub e_version: u32,

    /// Virtual address of the program entry point.
    pub e_entry: u64,

    /// File offset of the program header table.
    pub e_phoff: u64,

    /// File offset of the section header table.
    pub e_shoff: u64,

    /// Processor-specific flags.
    pub e_flags: u32,

    /// Size of this header as declared by the file (52 or 64 when sane).
    pub e_ehsize: u16,

    /// Size of one entry in the program header table.
    pub e_phentsize: u16,

    /// Number of entries in the program header table.
    pub e_phnum: u16,

    /// Size of one entry in the section header table.
    pub e_shentsize: u16,

    /// Number of entries in the section header table.
    pub e_shnum: u16,

    /// Index of the section that holds the section name string table.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    fn parse(cur: &ByteCursor<'_>, ident: ElfIdent) -> Result<Self, OutOfBounds> {
        let e = ident.endianness;
        let class = ident.class;
        // Layout is identical up to e_entry; after that every offset shifts
        // by the word size.
        let w = class.word();
        let after_words = 24 + 3 * w;

        Ok(ElfHeader {
            ident,
            e_type: cur.read_u16(16, e)?,
            e_machine: cur.read_u16(18, e)?,
            e_version: cur.read_u32(20, e)?,
            e_entry: class.read_word(cur, 24, e)?,
            e_phoff: class.read_word(cur, 24 + w, e)?,
            e_shoff: class.read_word(cur, 24 + 2 * w, e)?,
            e_flags: cur.read_u32(after_words, e)?,
            e_ehsize: cur.read_u16(after_words + 4, e)?,
            e_phentsize: cur.read_u16(after_words + 6, e)?,
            e_phnum: cur.read_u16(after_words + 8, e)?,
            e_shentsize: cur.read_u16(after_words + 10, e)?,
            e_shnum: cur.read_u16(after_words + 12, e)?,
            e_shstrndx: cur.read_u16(after_words + 14, e)?,
        })
    }
}

/// One program header (segment descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Segment type (`PT_LOAD`, `PT_DYNAMIC`, `PT_INTERP`, ...).
    pub p_type: u32,
    /// Permission bits: `PF_X` (1), `PF_W` (2), `PF_R` (4).
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ProgramHeader {
    fn parse(cur: &ByteCursor<'_>, class: ElfClass, e: Endianness) -> Result<Self, OutOfBounds> {
        // Elf64_Phdr moves p_flags up next to p_type to keep the words aligned.
        Ok(match class {
            ElfClass::Elf32 => ProgramHeader {
                p_type: cur.read_u32(0, e)?,
                p_offset: cur.read_u32(4, e)?.into(),
                p_vaddr: cur.read_u32(8, e)?.into(),
                p_paddr: cur.read_u32(12, e)?.into(),
                p_filesz: cur.read_u32(16, e)?.into(),
                p_memsz: cur.read_u32(20, e)?.into(),
                p_flags: cur.read_u32(24, e)?,
                p_align: cur.read_u32(28, e)?.into(),
            },
            ElfClass::Elf64 => ProgramHeader {
                p_type: cur.read_u32(0, e)?,
                p_flags: cur.read_u32(4, e)?,
                p_offset: cur.read_u64(8, e)?,
                p_vaddr: cur.read_u64(16, e)?,
                p_paddr: cur.read_u64(24, e)?,
                p_filesz: cur.read_u64(32, e)?,
                p_memsz: cur.read_u64(40, e)?,
                p_align: cur.read_u64(48, e)?,
            },
        })
    }
}

/// Name of a section after string-table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionName {
    Resolved(String),
    /// The string table was missing or out of bounds; holds `sh_name`.
    Unresolved(u32),
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionName::Resolved(name) => write!(f, "{}", name),
            SectionName::Unresolved(index) => write!(f, "<name@{:#x}>", index),
        }
    }
}

/// One section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: SectionName,
    /// Offset of the name inside the section name string table.
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    fn parse(cur: &ByteCursor<'_>, class: ElfClass, e: Endianness) -> Result<Self, OutOfBounds> {
        let w = class.word();
        let sh_name = cur.read_u32(0, e)?;
        let link_at = 8 + 4 * w;
        Ok(SectionHeader {
            name: SectionName::Unresolved(sh_name),
            sh_name,
            sh_type: cur.read_u32(4, e)?,
            sh_flags: class.read_word(cur, 8, e)?,
            sh_addr: class.read_word(cur, 8 + w, e)?,
            sh_offset: class.read_word(cur, 8 + 2 * w, e)?,
            sh_size: class.read_word(cur, 8 + 3 * w, e)?,
            sh_link: cur.read_u32(link_at, e)?,
            sh_info: cur.read_u32(link_at + 4, e)?,
            sh_addralign: class.read_word(cur, link_at + 8, e)?,
            sh_entsize: class.read_word(cur, link_at + 8 + w, e)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    ProgramHeaders,
    SectionHeaders,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::ProgramHeaders => write!(f, "program header table"),
            Table::SectionHeaders => write!(f, "section header table"),
        }
    }
}

/// A problem in a secondary table that did not stop the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElfWarning {
    /// The declared entry size is smaller than one record; the table was skipped.
    EntrySizeTooSmall {
        table: Table,
        entsize: u16,
        expected: u64,
    },
    /// The table runs past the end of the buffer; only `decoded` entries were read.
    TableOutOfBounds {
        table: Table,
        offset: u64,
        count: u64,
        decoded: u64,
    },
    /// A segment's file range lies outside the buffer.
    SegmentOutOfBounds { index: usize, offset: u64, size: u64 },
    /// Section names could not be resolved through this section index.
    StringTableUnavailable { index: u32 },
}

impl fmt::Display for ElfWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfWarning::EntrySizeTooSmall {
                table,
                entsize,
                expected,
            } => write!(
                f,
                "{} entry size {} is smaller than {}; table skipped",
                table, entsize, expected
            ),
            ElfWarning::TableOutOfBounds {
                table,
                offset,
                count,
                decoded,
            } => write!(
                f,
                "{} at {:#x} declares {} entries, only {} fit in the file",
                table, offset, count, decoded
            ),
            ElfWarning::SegmentOutOfBounds {
                index,
                offset,
                size,
            } => write!(
                f,
                "segment {} ({:#x}+{:#x}) extends past the end of the file",
                index, offset, size
            ),
            ElfWarning::StringTableUnavailable { index } => write!(
                f,
                "section name string table (index {}) is missing or out of bounds",
                index
            ),
        }
    }
}

/// All headers of an ELF file plus any soft warnings raised while reading them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeaders {
    pub header: ElfHeader,
    pub program_headers: Vec<ProgramHeader>,
    pub section_headers: Vec<SectionHeader>,
    pub warnings: Vec<ElfWarning>,
    section_count: u64,
    program_header_count: u64,
    string_table_index: u32,
}

impl ElfHeaders {
    /// Section count after extended numbering (`e_shnum == 0`).
    pub fn section_count(&self) -> u64 {
        self.section_count
    }

    /// Program header count after extended numbering (`e_phnum == PN_XNUM`).
    pub fn program_header_count(&self) -> u64 {
        self.program_header_count
    }

    /// Section name string table index after extended numbering.
    pub fn string_table_index(&self) -> u32 {
        self.string_table_index
    }
}

pub fn parse_elf(buffer: &[u8]) -> Result<ElfHeaders, ElfParseError> {
    if buffer.len() < SIZEOF_IDENT {
        return Err(ElfParseError::TooShort {
            expected: SIZEOF_IDENT,
            actual: buffer.len(),
        });
    }
    let image = ByteCursor::new(buffer);

    let magic = image.read_array::<SELFMAG>(0)?;
    if &magic != ELFMAG {
        return Err(ElfParseError::InvalidMagic { found: magic });
    }

    let ident = parse_ident(&image)?;
    let header_size = ident.class.header_size();
    let header = ElfHeader::parse(&image.sub(0, header_size)?, ident)?;
    let (class, endian) = (ident.class, ident.endianness);

    let mut warnings = Vec::new();

    let shentsize_ok = header.e_shentsize as u64 >= class.section_header_size();
    let section_zero = if header.e_shoff != 0 && shentsize_ok {
        image
            .sub(header.e_shoff, class.section_header_size())
            .and_then(|rec| SectionHeader::parse(&rec, class, endian))
            .ok()
    } else {
        None
    };

    let section_count = match (header.e_shoff, header.e_shnum, &section_zero) {
        (0, _, _) => 0,
        (_, 0, Some(zero)) => zero.sh_size,
        (_, n, _) => n as u64,
    };
    let program_header_count = match (header.e_phnum, &section_zero) {
        (PN_XNUM, Some(zero)) => zero.sh_info as u64,
        (n, _) => n as u64,
    };
    let string_table_index = match (header.e_shstrndx as u32, &section_zero) {
        (SHN_XINDEX, Some(zero)) => zero.sh_link,
        (n, _) => n,
    };

    let program_headers = decode_table(
        &image,
        Table::ProgramHeaders,
        header.e_phoff,
        program_header_count,
        header.e_phentsize,
        class.program_header_size(),
        &mut warnings,
        |rec| ProgramHeader::parse(rec, class, endian),
    );
    for (index, ph) in program_headers.iter().enumerate() {
        if ph.p_filesz != 0 && !image.contains(ph.p_offset, ph.p_filesz) {
            warnings.push(ElfWarning::SegmentOutOfBounds {
                index,
                offset: ph.p_offset,
                size: ph.p_filesz,
            });
        }
    }

    let mut section_headers = decode_table(
        &image,
        Table::SectionHeaders,
        header.e_shoff,
        section_count,
        header.e_shentsize,
        class.section_header_size(),
        &mut warnings,
        |rec| SectionHeader::parse(rec, class, endian),
    );
    resolve_section_names(
        &image,
        &mut section_headers,
        string_table_index,
        &mut warnings,
    );

    Ok(ElfHeaders {
        header,
        program_headers,
        section_headers,
        warnings,
        section_count,
        program_header_count,
        string_table_index,
    })
}

fn parse_ident(image: &ByteCursor<'_>) -> Result<ElfIdent, ElfParseError> {
    let ei_class = image.read_u8(EI_CLASS as u64)?;
    let ei_data = image.read_u8(EI_DATA as u64)?;

    let class = match ei_class {
        ELFCLASS32 => Some(ElfClass::Elf32),
        ELFCLASS64 => Some(ElfClass::Elf64),
        _ => None,
    };
    let endianness = match ei_data {
        ELFDATA2LSB => Some(Endianness::Little),
        ELFDATA2MSB => Some(Endianness::Big),
        _ => None,
    };
    let (Some(class), Some(endianness)) = (class, endianness) else {
        return Err(ElfParseError::UnsupportedElfVariant {
            class: ei_class,
            data: ei_data,
        });
    };

    Ok(ElfIdent {
        class,
        endianness,
        ei_class,
        ei_data,
        ei_version: image.read_u8(EI_VERSION as u64)?,
        ei_osabi: image.read_u8(EI_OSABI as u64)?,
        ei_abiversion: image.read_u8(EI_ABIVERSION as u64)?,
    })
}

/// Decodes up to `count` fixed-size records spaced `entsize` apart.
///
/// Stops at the first record that does not fit and records a warning, so a
/// bogus count never turns into a huge allocation or a hard failure.
#[allow(clippy::too_many_arguments)]
fn decode_table<T>(
    image: &ByteCursor<'_>,
    table: Table,
    offset: u64,
    count: u64,
    entsize: u16,
    record_size: u64,
    warnings: &mut Vec<ElfWarning>,
    decode: impl Fn(&ByteCursor<'_>) -> Result<T, OutOfBounds>,
) -> Vec<T> {
    if count == 0 {
        return Vec::new();
    }
    if (entsize as u64) < record_size {
        warnings.push(ElfWarning::EntrySizeTooSmall {
            table,
            entsize,
            expected: record_size,
        });
        return Vec::new();
    }

    let mut entries = Vec::new();
    for i in 0..count {
        let entry = offset
            .checked_add(i * entsize as u64)
            .ok_or(())
            .and_then(|at| image.sub(at, record_size).map_err(|_| ()))
            .and_then(|rec| decode(&rec).map_err(|_| ()));
        match entry {
            Ok(entry) => entries.push(entry),
            Err(()) => {
                warnings.push(ElfWarning::TableOutOfBounds {
                    table,
                    offset,
                    count,
                    decoded: i,
                });
                break;
            }
        }
    }
    entries
}

/// Second pass over the raw section headers: look names up in the section
/// name string table once that table is known to be in bounds.
fn resolve_section_names(
    image: &ByteCursor<'_>,
    sections: &mut [SectionHeader],
    index: u32,
    warnings: &mut Vec<ElfWarning>,
) {
    if index == SHN_UNDEF || sections.is_empty() {
        return;
    }
    let strtab = sections
        .get(index as usize)
        .filter(|sh| sh.sh_type != SHT_NOBITS)
        .and_then(|sh| image.read_bytes(sh.sh_offset, sh.sh_size).ok())
        .filter(|table| !table.is_empty());
    let Some(strtab) = strtab else {
        warnings.push(ElfWarning::StringTableUnavailable { index });
        return;
    };

    for section in sections.iter_mut() {
        if let Some(name) = string_at(strtab, section.sh_name) {
            section.name = SectionName::Resolved(name);
        }
    }
}

fn string_at(strtab: &[u8], offset: u32) -> Option<String> {
    let start = offset as usize;
    let tail = strtab.get(start..)?;
    if tail.is_empty() {
        return None;
    }
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Some(
        std::str::from_utf8(&tail[..end])
            .unwrap_or(INVALID_NAME)
            .to_string(),
    )
}

impl Header for ElfHeaders {
    fn entry_point(&self) -> u64 {
        self.header.e_entry
    }

    fn machine(&self) -> u16 {
        self.header.e_machine
    }

    fn is_64(&self) -> bool {
        self.header.ident.class == ElfClass::Elf64
    }

    fn format_name(&self) -> &'static str {
        "ELF"
    }

    fn is_executable(&self) -> bool {
        match self.header.e_type {
            ET_EXEC => true,
            ET_DYN => self.program_headers.iter().any(|ph| ph.p_type == PT_INTERP),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_lookup_stops_at_nul() {
        let table = b"\0.text\0.data\0";
        assert_eq!(string_at(table, 1).as_deref(), Some(".text"));
        assert_eq!(string_at(table, 7).as_deref(), Some(".data"));
        assert_eq!(string_at(table, 0).as_deref(), Some(""));
        assert_eq!(string_at(table, 13), None);
        assert_eq!(string_at(table, u32::MAX), None);
    }

    #[test]
    fn unterminated_names_run_to_the_end() {
        assert_eq!(string_at(b"\0abc", 1).as_deref(), Some("abc"));
        assert_eq!(string_at(b"\xff\xfe\0", 0).as_deref(), Some(INVALID_NAME));
    }

    #[test]
    fn record_sizes_follow_class() {
        assert_eq!(ElfClass::Elf32.header_size(), 52);
        assert_eq!(ElfClass::Elf64.header_size(), 64);
        assert_eq!(ElfClass::Elf32.program_header_size(), 32);
        assert_eq!(ElfClass::Elf64.program_header_size(), 56);
        assert_eq!(ElfClass::Elf32.section_header_size(), 40);
        assert_eq!(ElfClass::Elf64.section_header_size(), 64);
    }

    #[test]
    fn rejects_bad_magic_and_variants() {
        let mut ident = [0u8; 64];
        ident[..4].copy_from_slice(b"\x7fELG");
        assert!(matches!(
            parse_elf(&ident),
            Err(ElfParseError::InvalidMagic { .. })
        ));

        ident[..4].copy_from_slice(b"\x7fELF");
        ident[4] = 3;
        ident[5] = 1;
        assert_eq!(
            parse_elf(&ident),
            Err(ElfParseError::UnsupportedElfVariant { class: 3, data: 1 })
        );
    }

    #[test]
    fn truncated_file_header_is_a_hard_error() {
        let mut data = [0u8; 40];
        data[..4].copy_from_slice(ELFMAG);
        data[4] = ELFCLASS64;
        data[5] = ELFDATA2LSB;
        assert!(matches!(
            parse_elf(&data),
            Err(ElfParseError::OutOfBounds(_))
        ));
    }
}
