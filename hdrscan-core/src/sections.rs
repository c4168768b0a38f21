use crate::header::elf::{ElfHeaders, SectionHeader as ElfSectionHeader};
use crate::header::pe::SectionHeader as PeSectionHeader;
use goblin::elf::program_header::PT_LOAD;

/// Format-independent view of one section, used for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub name: String,
    pub vma: u64,
    pub size: u64,
    pub file_offset: u64,
    pub flags: u64,
}

impl SectionSummary {
    pub fn from_pe_section(sh: &PeSectionHeader) -> Self {
        SectionSummary {
            name: sh.name.clone(),
            vma: sh.virtual_address as u64,
            size: sh.virtual_size as u64,
            file_offset: sh.pointer_to_raw_data as u64,
            flags: sh.characteristics as u64,
        }
    }

    pub fn from_elf_section(sh: &ElfSectionHeader) -> Self {
        SectionSummary {
            name: sh.name.to_string(),
            vma: sh.sh_addr,
            size: sh.sh_size,
            file_offset: sh.sh_offset,
            flags: sh.sh_flags,
        }
    }

    /// Stand-in sections built from `PT_LOAD` segments, for stripped ELF
    /// files that carry no section header table.
    pub fn from_elf_segments(elf: &ElfHeaders) -> Vec<Self> {
        elf.program_headers
            .iter()
            .enumerate()
            .filter(|(_, ph)| ph.p_type == PT_LOAD && ph.p_filesz != 0)
            .map(|(i, ph)| SectionSummary {
                name: format!(".segment_{}", i),
                vma: ph.p_vaddr,
                // Use p_memsz for virtual size
                size: ph.p_memsz,
                file_offset: ph.p_offset,
                flags: ph.p_flags as u64,
            })
            .collect()
    }
}
