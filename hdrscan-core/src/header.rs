pub mod elf;
pub mod pe;

pub use elf::{parse_elf, ElfHeaders};
pub use pe::{parse_pe, PeHeaders};

/// Placeholder used for PE and ELF section names that are not valid UTF-8.
pub const INVALID_NAME: &str = "<invalid_utf8>";

/// Summary view shared by the PE and ELF header records.
pub trait Header: std::fmt::Debug + Send + Sync {
    /// Returns the entry point: a virtual address for ELF, an RVA for PE.
    fn entry_point(&self) -> u64;

    /// Returns the machine architecture identifier.
    fn machine(&self) -> u16;

    /// Returns true if this is a 64-bit binary.
    fn is_64(&self) -> bool;

    /// Returns a short human-readable name, e.g. "ELF" or "PE".
    fn format_name(&self) -> &'static str;

    /// Returns true if the binary represents an executable (vs object/lib).
    fn is_executable(&self) -> bool;
}
