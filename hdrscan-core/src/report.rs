//! Output records in the legacy JSON layout.
//!
//! Key names are fixed by downstream consumers and must not change. Integers
//! render as `0x`-prefixed lowercase hex except for counts and sizes that were
//! always emitted as decimal. Enumerated ELF fields render as their symbolic
//! constant names, falling back to the number when the value is unknown.

use crate::binary::{ParsedElf, ParsedPe};
use crate::header::elf::{ProgramHeader, SectionHeader as ElfSectionHeader, SectionName};
use crate::header::pe::SectionHeader as PeSectionHeader;
use goblin::elf::header::{et_to_str, machine_to_str};
use goblin::elf::program_header::pt_to_str;
use goblin::elf::section_header::sht_to_str;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// An integer that serializes as a `0x`-prefixed lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hex(pub u64);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for Hex {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).map(Hex)
    }
}

impl Serialize for Hex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! hex_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Hex {
            fn from(v: $t) -> Self {
                Hex(v.into())
            }
        })*
    };
}

hex_from!(u8, u16, u32, u64);

/// A symbolic constant name, or the raw number when the value is not known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Symbolic {
    Name(Cow<'static, str>),
    Number(u64),
}

impl Symbolic {
    fn lookup<N: Into<Cow<'static, str>>>(value: u64, name: Option<N>) -> Self {
        name.map_or(Symbolic::Number(value), |n| Symbolic::Name(n.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NameField {
    Name(String),
    Offset(u32),
}

impl From<&SectionName> for NameField {
    fn from(name: &SectionName) -> Self {
        match name {
            SectionName::Resolved(s) => NameField::Name(s.clone()),
            SectionName::Unresolved(offset) => NameField::Offset(*offset),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DosHeaderRecord {
    pub e_magic: Hex,
    pub e_cblp: Hex,
    pub e_cp: Hex,
    pub e_crlc: Hex,
    pub e_cparhdr: Hex,
    pub e_minalloc: Hex,
    pub e_maxalloc: Hex,
    pub e_ss: Hex,
    pub e_sp: Hex,
    pub e_csum: Hex,
    pub e_ip: Hex,
    pub e_cs: Hex,
    pub e_lfarlc: Hex,
    pub e_ovno: Hex,
    pub e_oemid: Hex,
    pub e_oeminfo: Hex,
    pub e_lfanew: Hex,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NtHeaderRecord {
    pub machine: Hex,
    pub number_of_sections: u16,
    pub time_date_stamp: Hex,
    pub pointer_to_symbol_table: Hex,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: Hex,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OptionalHeaderRecord {
    pub magic: Hex,
    pub entry_point_address: Hex,
    pub image_base: Hex,
    pub section_alignment: Hex,
    pub file_alignment: Hex,
    pub subsystem: u16,
    pub dll_characteristics: Hex,
    pub size_of_image: Hex,
    pub size_of_headers: Hex,
    pub size_of_stack_reserve: Hex,
    pub size_of_stack_commit: Hex,
    pub size_of_heap_reserve: Hex,
    pub size_of_heap_commit: Hex,
    pub loader_flags: Hex,
    pub number_of_rva_and_sizes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeSectionRecord {
    pub name: String,
    pub virtual_address: Hex,
    pub size_of_raw_data: Hex,
    pub pointer_to_raw_data: Hex,
    pub characteristics: Hex,
}

impl From<&PeSectionHeader> for PeSectionRecord {
    fn from(sh: &PeSectionHeader) -> Self {
        PeSectionRecord {
            name: sh.name.clone(),
            virtual_address: sh.virtual_address.into(),
            size_of_raw_data: sh.size_of_raw_data.into(),
            pointer_to_raw_data: sh.pointer_to_raw_data.into(),
            characteristics: sh.characteristics.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeRecord {
    #[serde(rename = "File_Hash")]
    pub file_hash: String,
    #[serde(rename = "DOS_Header")]
    pub dos_header: DosHeaderRecord,
    #[serde(rename = "NT_Header")]
    pub nt_header: NtHeaderRecord,
    #[serde(rename = "Optional_Header")]
    pub optional_header: OptionalHeaderRecord,
    #[serde(rename = "Section_Headers")]
    pub section_headers: Vec<PeSectionRecord>,
}

impl From<&ParsedPe> for PeRecord {
    fn from(parsed: &ParsedPe) -> Self {
        let dos = &parsed.headers.dos_header;
        let coff = &parsed.headers.coff_header;
        let opt = &parsed.headers.optional_header;

        PeRecord {
            file_hash: parsed.name.clone(),
            dos_header: DosHeaderRecord {
                e_magic: dos.e_magic.into(),
                e_cblp: dos.e_cblp.into(),
                e_cp: dos.e_cp.into(),
                e_crlc: dos.e_crlc.into(),
                e_cparhdr: dos.e_cparhdr.into(),
                e_minalloc: dos.e_minalloc.into(),
                e_maxalloc: dos.e_maxalloc.into(),
                e_ss: dos.e_ss.into(),
                e_sp: dos.e_sp.into(),
                e_csum: dos.e_csum.into(),
                e_ip: dos.e_ip.into(),
                e_cs: dos.e_cs.into(),
                e_lfarlc: dos.e_lfarlc.into(),
                e_ovno: dos.e_ovno.into(),
                e_oemid: dos.e_oemid.into(),
                e_oeminfo: dos.e_oeminfo.into(),
                e_lfanew: dos.e_lfanew.into(),
            },
            nt_header: NtHeaderRecord {
                machine: coff.machine.into(),
                number_of_sections: coff.number_of_sections,
                time_date_stamp: coff.time_date_stamp.into(),
                pointer_to_symbol_table: coff.pointer_to_symbol_table.into(),
                number_of_symbols: coff.number_of_symbols,
                size_of_optional_header: coff.size_of_optional_header,
                characteristics: coff.characteristics.into(),
            },
            optional_header: OptionalHeaderRecord {
                magic: opt.magic.into(),
                entry_point_address: opt.address_of_entry_point.into(),
                image_base: opt.image_base.into(),
                section_alignment: opt.section_alignment.into(),
                file_alignment: opt.file_alignment.into(),
                subsystem: opt.subsystem,
                dll_characteristics: opt.dll_characteristics.into(),
                size_of_image: opt.size_of_image.into(),
                size_of_headers: opt.size_of_headers.into(),
                size_of_stack_reserve: opt.size_of_stack_reserve.into(),
                size_of_stack_commit: opt.size_of_stack_commit.into(),
                size_of_heap_reserve: opt.size_of_heap_reserve.into(),
                size_of_heap_commit: opt.size_of_heap_commit.into(),
                loader_flags: opt.loader_flags.into(),
                number_of_rva_and_sizes: opt.number_of_rva_and_sizes,
            },
            section_headers: parsed
                .headers
                .section_headers
                .iter()
                .map(PeSectionRecord::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElfHeaderRecord {
    #[serde(rename = "EI_CLASS")]
    pub ei_class: Symbolic,
    #[serde(rename = "EI_DATA")]
    pub ei_data: Symbolic,
    #[serde(rename = "EI_VERSION")]
    pub ei_version: Symbolic,
    #[serde(rename = "EI_OSABI")]
    pub ei_osabi: Symbolic,
    #[serde(rename = "Type")]
    pub kind: Symbolic,
    pub machine: Symbolic,
    pub version: Symbolic,
    pub entry_point_address: Hex,
    pub program_header_offset: Hex,
    pub section_header_offset: Hex,
    pub flags: Hex,
    pub header_size: u16,
    pub program_header_entry_size: u16,
    pub program_header_count: u16,
    pub section_header_entry_size: u16,
    pub section_header_count: u16,
    pub section_header_string_table_index: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgramHeaderRecord {
    #[serde(rename = "Type")]
    pub kind: Symbolic,
    pub offset: Hex,
    pub virtual_address: Hex,
    pub physical_address: Hex,
    pub file_size: Hex,
    pub memory_size: Hex,
    pub flags: Hex,
    pub alignment: Hex,
}

impl From<&ProgramHeader> for ProgramHeaderRecord {
    fn from(ph: &ProgramHeader) -> Self {
        ProgramHeaderRecord {
            kind: Symbolic::lookup(ph.p_type as u64, known(pt_to_str(ph.p_type))),
            offset: ph.p_offset.into(),
            virtual_address: ph.p_vaddr.into(),
            physical_address: ph.p_paddr.into(),
            file_size: ph.p_filesz.into(),
            memory_size: ph.p_memsz.into(),
            flags: ph.p_flags.into(),
            alignment: ph.p_align.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElfSectionRecord {
    pub name: NameField,
    #[serde(rename = "Type")]
    pub kind: Symbolic,
    pub flags: Hex,
    pub address: Hex,
    pub offset: Hex,
    pub size: Hex,
    pub link: u32,
    pub info: u32,
    pub address_alignment: Hex,
    pub entry_size: Hex,
}

impl From<&ElfSectionHeader> for ElfSectionRecord {
    fn from(sh: &ElfSectionHeader) -> Self {
        ElfSectionRecord {
            name: NameField::from(&sh.name),
            kind: Symbolic::lookup(sh.sh_type as u64, known(sht_to_str(sh.sh_type))),
            flags: sh.sh_flags.into(),
            address: sh.sh_addr.into(),
            offset: sh.sh_offset.into(),
            size: sh.sh_size.into(),
            link: sh.sh_link,
            info: sh.sh_info,
            address_alignment: sh.sh_addralign.into(),
            entry_size: sh.sh_entsize.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ElfRecord {
    #[serde(rename = "ELF_Hash")]
    pub elf_hash: String,
    #[serde(rename = "ELF_Header")]
    pub elf_header: ElfHeaderRecord,
    #[serde(rename = "Program_Headers")]
    pub program_headers: Vec<ProgramHeaderRecord>,
    #[serde(rename = "Section_Headers")]
    pub section_headers: Vec<ElfSectionRecord>,
}

impl From<&ParsedElf> for ElfRecord {
    fn from(parsed: &ParsedElf) -> Self {
        let h = &parsed.headers.header;
        let ident = &h.ident;

        ElfRecord {
            elf_hash: parsed.name.clone(),
            elf_header: ElfHeaderRecord {
                ei_class: Symbolic::lookup(ident.ei_class.into(), elf_class_name(ident.ei_class)),
                ei_data: Symbolic::lookup(ident.ei_data.into(), elf_data_name(ident.ei_data)),
                ei_version: Symbolic::lookup(
                    ident.ei_version.into(),
                    elf_version_name(ident.ei_version.into()),
                ),
                ei_osabi: Symbolic::lookup(ident.ei_osabi.into(), elf_osabi_name(ident.ei_osabi)),
                kind: Symbolic::lookup(h.e_type.into(), elf_type_name(h.e_type)),
                machine: Symbolic::lookup(h.e_machine.into(), elf_machine_name(h.e_machine)),
                version: Symbolic::lookup(h.e_version.into(), elf_version_name(h.e_version)),
                entry_point_address: h.e_entry.into(),
                program_header_offset: h.e_phoff.into(),
                section_header_offset: h.e_shoff.into(),
                flags: h.e_flags.into(),
                header_size: h.e_ehsize,
                program_header_entry_size: h.e_phentsize,
                program_header_count: h.e_phnum,
                section_header_entry_size: h.e_shentsize,
                section_header_count: h.e_shnum,
                section_header_string_table_index: h.e_shstrndx,
            },
            program_headers: parsed
                .headers
                .program_headers
                .iter()
                .map(ProgramHeaderRecord::from)
                .collect(),
            section_headers: parsed
                .headers
                .section_headers
                .iter()
                .map(ElfSectionRecord::from)
                .collect(),
        }
    }
}

/// goblin reports unknown values as `UNKNOWN_PT` / `UNKNOWN_SHT` / `UNKNOWN_ET`.
fn known(name: &'static str) -> Option<&'static str> {
    (!name.starts_with("UNKNOWN")).then_some(name)
}

pub fn elf_class_name(class: u8) -> Option<&'static str> {
    match class {
        0 => Some("ELFCLASSNONE"),
        1 => Some("ELFCLASS32"),
        2 => Some("ELFCLASS64"),
        _ => None,
    }
}

pub fn elf_data_name(data: u8) -> Option<&'static str> {
    match data {
        0 => Some("ELFDATANONE"),
        1 => Some("ELFDATA2LSB"),
        2 => Some("ELFDATA2MSB"),
        _ => None,
    }
}

pub fn elf_version_name(version: u32) -> Option<&'static str> {
    match version {
        0 => Some("EV_NONE"),
        1 => Some("EV_CURRENT"),
        _ => None,
    }
}

pub fn elf_osabi_name(osabi: u8) -> Option<&'static str> {
    Some(match osabi {
        0 => "ELFOSABI_SYSV",
        1 => "ELFOSABI_HPUX",
        2 => "ELFOSABI_NETBSD",
        3 => "ELFOSABI_LINUX",
        4 => "ELFOSABI_HURD",
        6 => "ELFOSABI_SOLARIS",
        7 => "ELFOSABI_AIX",
        8 => "ELFOSABI_IRIX",
        9 => "ELFOSABI_FREEBSD",
        10 => "ELFOSABI_TRU64",
        11 => "ELFOSABI_MODESTO",
        12 => "ELFOSABI_OPENBSD",
        13 => "ELFOSABI_OPENVMS",
        14 => "ELFOSABI_NSK",
        15 => "ELFOSABI_AROS",
        16 => "ELFOSABI_FENIXOS",
        17 => "ELFOSABI_CLOUD",
        64 => "ELFOSABI_ARM_AEABI",
        97 => "ELFOSABI_ARM",
        255 => "ELFOSABI_STANDALONE",
        _ => return None,
    })
}

/// `ET_*` name of an object file type, via goblin's table.
pub fn elf_type_name(e_type: u16) -> Option<String> {
    known(et_to_str(e_type)).map(|name| format!("ET_{}", name))
}

/// `EM_*` name of a machine, via goblin's table.
pub fn elf_machine_name(machine: u16) -> Option<String> {
    match machine_to_str(machine) {
        "EM_UNKNOWN" => None,
        name => Some(format!("EM_{}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_matches_legacy_rendering() {
        assert_eq!(Hex(0).to_string(), "0x0");
        assert_eq!(Hex(0x5a4d).to_string(), "0x5a4d");
        assert_eq!(Hex(u64::MAX).to_string(), "0xffffffffffffffff");
        assert_eq!(serde_json::to_string(&Hex(0x10b)).unwrap(), "\"0x10b\"");
    }

    #[test]
    fn hex_parses_back() {
        for v in [0, 1, 0x1000, 0x140000000, u32::MAX as u64, u64::MAX] {
            let text = Hex(v).to_string();
            assert_eq!(text.parse::<Hex>().unwrap(), Hex(v));
        }
        assert!("0xzz".parse::<Hex>().is_err());
    }

    #[test]
    fn symbolic_falls_back_to_number() {
        assert_eq!(
            serde_json::to_value(Symbolic::lookup(62, elf_machine_name(62))).unwrap(),
            serde_json::json!("EM_X86_64")
        );
        assert_eq!(
            serde_json::to_value(Symbolic::lookup(0x9999, elf_machine_name(0x9999))).unwrap(),
            serde_json::json!(0x9999)
        );
    }

    #[test]
    fn machine_names_cover_embedded_targets() {
        assert_eq!(elf_machine_name(93).as_deref(), Some("EM_ARC_COMPACT"));
        assert_eq!(elf_machine_name(94).as_deref(), Some("EM_XTENSA"));
        assert_eq!(elf_machine_name(195).as_deref(), Some("EM_ARC_COMPACT2"));
        assert_eq!(elf_machine_name(88).as_deref(), Some("EM_M32R"));
        assert_eq!(elf_machine_name(62).as_deref(), Some("EM_X86_64"));
        assert_eq!(elf_machine_name(3).as_deref(), Some("EM_386"));
        assert_eq!(elf_machine_name(0x9999), None);
        assert_eq!(
            serde_json::to_value(Symbolic::lookup(93, elf_machine_name(93))).unwrap(),
            serde_json::json!("EM_ARC_COMPACT")
        );
    }

    #[test]
    fn type_names_carry_prefix() {
        assert_eq!(elf_type_name(2).as_deref(), Some("ET_EXEC"));
        assert_eq!(elf_type_name(3).as_deref(), Some("ET_DYN"));
        assert_eq!(elf_type_name(0xfe00), None);
    }

    #[test]
    fn unresolved_names_render_as_offsets() {
        let name = NameField::from(&SectionName::Unresolved(17));
        assert_eq!(serde_json::to_value(name).unwrap(), serde_json::json!(17));
        let name = NameField::from(&SectionName::Resolved(".text".into()));
        assert_eq!(serde_json::to_value(name).unwrap(), serde_json::json!(".text"));
    }
}
