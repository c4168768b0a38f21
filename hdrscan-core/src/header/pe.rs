use crate::cursor::{ByteCursor, Endianness};
use crate::error::PeParseError;
use crate::header::{Header, INVALID_NAME};
use goblin::pe::header::{DOS_MAGIC, PE_MAGIC};
use goblin::pe::optional_header::{MAGIC_32, MAGIC_64};

const LE: Endianness = Endianness::Little;

pub const SIZEOF_DOS_HEADER: usize = 64;
pub const SIZEOF_PE_SIGNATURE: u64 = 4;
pub const SIZEOF_COFF_HEADER: u64 = 20;
pub const SIZEOF_SECTION_HEADER: u64 = 40;
pub const SIZEOF_DATA_DIRECTORY: u64 = 8;
pub const MAX_DATA_DIRECTORIES: u32 = 16;

pub const IMAGE_FILE_EXECUTABLE_IMAGE: u16 = 0x0002;
pub const IMAGE_FILE_DLL: u16 = 0x2000;

/// The MS-DOS stub header found at offset 0 of every PE image.
///
/// Only `e_magic` and `e_lfanew` matter to a loader; the rest are kept
/// because they are useful fingerprints of the toolchain that built the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// File offset of the `PE\0\0` signature.
    pub e_lfanew: u32,
}

impl DosHeader {
    fn parse(cur: &ByteCursor<'_>) -> Result<Self, PeParseError> {
        let mut e_res = [0u16; 4];
        for (i, slot) in e_res.iter_mut().enumerate() {
            *slot = cur.read_u16(0x1C + 2 * i as u64, LE)?;
        }
        let mut e_res2 = [0u16; 10];
        for (i, slot) in e_res2.iter_mut().enumerate() {
            *slot = cur.read_u16(0x28 + 2 * i as u64, LE)?;
        }

        Ok(DosHeader {
            e_magic: cur.read_u16(0x00, LE)?,
            e_cblp: cur.read_u16(0x02, LE)?,
            e_cp: cur.read_u16(0x04, LE)?,
            e_crlc: cur.read_u16(0x06, LE)?,
            e_cparhdr: cur.read_u16(0x08, LE)?,
            e_minalloc: cur.read_u16(0x0A, LE)?,
            e_maxalloc: cur.read_u16(0x0C, LE)?,
            e_ss: cur.read_u16(0x0E, LE)?,
            e_sp: cur.read_u16(0x10, LE)?,
            e_csum: cur.read_u16(0x12, LE)?,
            e_ip: cur.read_u16(0x14, LE)?,
            e_cs: cur.read_u16(0x16, LE)?,
            e_lfarlc: cur.read_u16(0x18, LE)?,
            e_ovno: cur.read_u16(0x1A, LE)?,
            e_res,
            e_oemid: cur.read_u16(0x24, LE)?,
            e_oeminfo: cur.read_u16(0x26, LE)?,
            e_res2,
            e_lfanew: cur.read_u32(0x3C, LE)?,
        })
    }
}

/// COFF file header, immediately after the PE signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffFileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffFileHeader {
    fn parse(cur: &ByteCursor<'_>) -> Result<Self, PeParseError> {
        Ok(CoffFileHeader {
            machine: cur.read_u16(0, LE)?,
            number_of_sections: cur.read_u16(2, LE)?,
            time_date_stamp: cur.read_u32(4, LE)?,
            pointer_to_symbol_table: cur.read_u32(8, LE)?,
            number_of_symbols: cur.read_u32(12, LE)?,
            size_of_optional_header: cur.read_u16(16, LE)?,
            characteristics: cur.read_u16(18, LE)?,
        })
    }

    pub fn is_dll(&self) -> bool {
        self.characteristics & IMAGE_FILE_DLL != 0
    }
}

/// Which optional header layout the image uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeaderKind {
    /// 32-bit layout, magic 0x10B.
    Pe32,
    /// 64-bit layout, magic 0x20B.
    Pe32Plus,
}

impl OptionalHeaderKind {
    pub fn from_magic(magic: u16) -> Option<Self> {
        match magic {
            MAGIC_32 => Some(OptionalHeaderKind::Pe32),
            MAGIC_64 => Some(OptionalHeaderKind::Pe32Plus),
            _ => None,
        }
    }

    /// Size of the fixed part of the header, up to and including
    /// `NumberOfRvaAndSizes`.
    pub fn fixed_size(self) -> u64 {
        match self {
            OptionalHeaderKind::Pe32 => 96,
            OptionalHeaderKind::Pe32Plus => 112,
        }
    }

    /// Width of image base and the stack/heap sizing fields.
    fn word_size(self) -> u64 {
        match self {
            OptionalHeaderKind::Pe32 => 4,
            OptionalHeaderKind::Pe32Plus => 8,
        }
    }

    fn read_word(self, cur: &ByteCursor<'_>, offset: u64) -> Result<u64, PeParseError> {
        Ok(match self {
            OptionalHeaderKind::Pe32 => cur.read_u32(offset, LE)? as u64,
            OptionalHeaderKind::Pe32Plus => cur.read_u64(offset, LE)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader {
    pub kind: OptionalHeaderKind,
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    /// Only present in PE32 images.
    pub base_of_data: Option<u32>,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    /// Directories that fit in the buffer, at most 16.
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    /// Parses the optional header starting at `offset` of the whole image.
    fn parse(image: &ByteCursor<'_>, offset: u64) -> Result<Self, PeParseError> {
        let magic = image.read_u16(offset, LE)?;
        let kind = OptionalHeaderKind::from_magic(magic)
            .ok_or(PeParseError::UnsupportedOptionalHeaderMagic(magic))?;
        let cur = image.sub(offset, kind.fixed_size())?;

        // PE32 has BaseOfData where PE32+ widens ImageBase to 8 bytes; from
        // SizeOfStackReserve on, every sizing field follows the word size.
        let (base_of_data, image_base) = match kind {
            OptionalHeaderKind::Pe32 => {
                (Some(cur.read_u32(24, LE)?), cur.read_u32(28, LE)? as u64)
            }
            OptionalHeaderKind::Pe32Plus => (None, cur.read_u64(24, LE)?),
        };
        let w = kind.word_size();
        let stack_reserve_at = 72;
        let loader_flags_at = stack_reserve_at + 4 * w;

        let number_of_rva_and_sizes = cur.read_u32(loader_flags_at + 4, LE)?;
        let dirs_at = offset + kind.fixed_size();
        let data_directories = (0..number_of_rva_and_sizes.min(MAX_DATA_DIRECTORIES) as u64)
            .map_while(|i| {
                let rec = image
                    .sub(dirs_at + i * SIZEOF_DATA_DIRECTORY, SIZEOF_DATA_DIRECTORY)
                    .ok()?;
                Some(DataDirectory {
                    virtual_address: rec.read_u32(0, LE).ok()?,
                    size: rec.read_u32(4, LE).ok()?,
                })
            })
            .collect();

        Ok(OptionalHeader {
            kind,
            magic,
            major_linker_version: cur.read_u8(2)?,
            minor_linker_version: cur.read_u8(3)?,
            size_of_code: cur.read_u32(4, LE)?,
            size_of_initialized_data: cur.read_u32(8, LE)?,
            size_of_uninitialized_data: cur.read_u32(12, LE)?,
            address_of_entry_point: cur.read_u32(16, LE)?,
            base_of_code: cur.read_u32(20, LE)?,
            base_of_data,
            image_base,
            section_alignment: cur.read_u32(32, LE)?,
            file_alignment: cur.read_u32(36, LE)?,
            major_operating_system_version: cur.read_u16(40, LE)?,
            minor_operating_system_version: cur.read_u16(42, LE)?,
            major_image_version: cur.read_u16(44, LE)?,
            minor_image_version: cur.read_u16(46, LE)?,
            major_subsystem_version: cur.read_u16(48, LE)?,
            minor_subsystem_version: cur.read_u16(50, LE)?,
            win32_version_value: cur.read_u32(52, LE)?,
            size_of_image: cur.read_u32(56, LE)?,
            size_of_headers: cur.read_u32(60, LE)?,
            check_sum: cur.read_u32(64, LE)?,
            subsystem: cur.read_u16(68, LE)?,
            dll_characteristics: cur.read_u16(70, LE)?,
            size_of_stack_reserve: kind.read_word(&cur, stack_reserve_at)?,
            size_of_stack_commit: kind.read_word(&cur, stack_reserve_at + w)?,
            size_of_heap_reserve: kind.read_word(&cur, stack_reserve_at + 2 * w)?,
            size_of_heap_commit: kind.read_word(&cur, stack_reserve_at + 3 * w)?,
            loader_flags: cur.read_u32(loader_flags_at, LE)?,
            number_of_rva_and_sizes,
            data_directories,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Name with trailing NULs stripped, or [`INVALID_NAME`].
    pub name: String,
    pub raw_name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    fn parse(cur: &ByteCursor<'_>) -> Result<Self, PeParseError> {
        let raw_name = cur.read_array::<8>(0)?;
        Ok(SectionHeader {
            name: decode_section_name(&raw_name),
            raw_name,
            virtual_size: cur.read_u32(8, LE)?,
            virtual_address: cur.read_u32(12, LE)?,
            size_of_raw_data: cur.read_u32(16, LE)?,
            pointer_to_raw_data: cur.read_u32(20, LE)?,
            pointer_to_relocations: cur.read_u32(24, LE)?,
            pointer_to_linenumbers: cur.read_u32(28, LE)?,
            number_of_relocations: cur.read_u16(32, LE)?,
            number_of_linenumbers: cur.read_u16(34, LE)?,
            characteristics: cur.read_u32(36, LE)?,
        })
    }
}

fn decode_section_name(raw: &[u8; 8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
    std::str::from_utf8(&raw[..end])
        .unwrap_or(INVALID_NAME)
        .to_string()
}

/// All headers of a PE image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeHeaders {
    pub dos_header: DosHeader,
    pub coff_header: CoffFileHeader,
    pub optional_header: OptionalHeader,
    pub section_headers: Vec<SectionHeader>,
}

pub fn parse_pe(buffer: &[u8]) -> Result<PeHeaders, PeParseError> {
    if buffer.len() < SIZEOF_DOS_HEADER {
        return Err(PeParseError::TooShort {
            expected: SIZEOF_DOS_HEADER,
            actual: buffer.len(),
        });
    }
    let image = ByteCursor::new(buffer);

    let dos_header = DosHeader::parse(&image)?;
    if dos_header.e_magic != DOS_MAGIC {
        return Err(PeParseError::InvalidMagic {
            found: dos_header.e_magic,
        });
    }

    let nt_at = dos_header.e_lfanew as u64;
    if !image.contains(nt_at, SIZEOF_PE_SIGNATURE + SIZEOF_COFF_HEADER) {
        return Err(PeParseError::NtHeadersOutOfBounds {
            e_lfanew: dos_header.e_lfanew,
            len: buffer.len(),
        });
    }
    let signature = image.read_u32(nt_at, LE)?;
    if signature != PE_MAGIC {
        return Err(PeParseError::InvalidPeSignature {
            offset: nt_at,
            found: signature,
        });
    }

    let coff_at = nt_at + SIZEOF_PE_SIGNATURE;
    let coff_header = CoffFileHeader::parse(&image.sub(coff_at, SIZEOF_COFF_HEADER)?)?;

    let optional_at = coff_at + SIZEOF_COFF_HEADER;
    let optional_header = OptionalHeader::parse(&image, optional_at)?;

    let table_at = optional_at + coff_header.size_of_optional_header as u64;
    let count = coff_header.number_of_sections;
    let section_headers = if count == 0 {
        Vec::new()
    } else {
        let table = image
            .sub(table_at, count as u64 * SIZEOF_SECTION_HEADER)
            .map_err(|_| PeParseError::TruncatedSectionTable {
                offset: table_at,
                count,
                len: buffer.len(),
            })?;
        (0..count as u64)
            .map(|i| {
                let rec = table.sub(i * SIZEOF_SECTION_HEADER, SIZEOF_SECTION_HEADER)?;
                SectionHeader::parse(&rec)
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(PeHeaders {
        dos_header,
        coff_header,
        optional_header,
        section_headers,
    })
}

impl Header for PeHeaders {
    fn entry_point(&self) -> u64 {
        self.optional_header.address_of_entry_point as u64
    }

    fn machine(&self) -> u16 {
        self.coff_header.machine
    }

    fn is_64(&self) -> bool {
        self.optional_header.kind == OptionalHeaderKind::Pe32Plus
    }

    fn format_name(&self) -> &'static str {
        "PE"
    }

    fn is_executable(&self) -> bool {
        self.coff_header.characteristics & IMAGE_FILE_EXECUTABLE_IMAGE != 0
            && !self.coff_header.is_dll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_names_strip_trailing_nuls() {
        assert_eq!(decode_section_name(b".text\0\0\0"), ".text");
        assert_eq!(decode_section_name(b"12345678"), "12345678");
        assert_eq!(decode_section_name(&[0; 8]), "");
    }

    #[test]
    fn undecodable_section_names_get_a_placeholder() {
        assert_eq!(decode_section_name(&[0xFF, 0xFE, b'x', 0, 0, 0, 0, 0]), INVALID_NAME);
    }

    #[test]
    fn optional_header_kind_follows_magic() {
        assert_eq!(OptionalHeaderKind::from_magic(0x10B), Some(OptionalHeaderKind::Pe32));
        assert_eq!(OptionalHeaderKind::from_magic(0x20B), Some(OptionalHeaderKind::Pe32Plus));
        assert_eq!(OptionalHeaderKind::from_magic(0x107), None);
    }

    #[test]
    fn short_buffers_fail_before_any_read() {
        assert_eq!(
            parse_pe(b"MZ"),
            Err(PeParseError::TooShort {
                expected: 64,
                actual: 2
            })
        );
    }
}
