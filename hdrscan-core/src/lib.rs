pub mod batch;
pub mod binary;
pub mod cursor;
pub mod error;
pub mod header;
pub mod report;
pub mod sections;

pub use batch::*;
pub use binary::*;
pub use error::*;
pub use header::{parse_elf, parse_pe, ElfHeaders, Header, PeHeaders, INVALID_NAME};
pub use report::{ElfRecord, Hex, PeRecord};
pub use sections::*;
