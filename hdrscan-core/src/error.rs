//! Error types shared by the header parsers and the batch aggregator.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a failure, reported alongside every diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The bytes do not carry the claimed format's magic or signature.
    FormatMismatch,
    /// A declared offset, size or count points outside the buffer.
    OutOfBounds,
    /// A recognized but unhandled variant (optional header magic, ELF class).
    UnsupportedVariant,
    /// Discovery could not map the file to a parser.
    UnknownFileFormat,
    /// The file could not be read.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FormatMismatch => "FormatMismatch",
            ErrorKind::OutOfBounds => "OutOfBounds",
            ErrorKind::UnsupportedVariant => "UnsupportedVariant",
            ErrorKind::UnknownFileFormat => "UnknownFileFormat",
            ErrorKind::Io => "Io",
        };
        write!(f, "{}", name)
    }
}

/// A read of `width` bytes at `offset` that does not fit in a buffer of `len` bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("read of {width} bytes at offset {offset:#x} exceeds buffer of {len} bytes")]
pub struct OutOfBounds {
    pub offset: u64,
    pub width: u64,
    pub len: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeParseError {
    #[error("file too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid DOS magic: expected \"MZ\", got {found:#06x}")]
    InvalidMagic { found: u16 },

    #[error("NT headers at e_lfanew {e_lfanew:#x} do not fit in {len} bytes")]
    NtHeadersOutOfBounds { e_lfanew: u32, len: usize },

    #[error("invalid PE signature at {offset:#x}: {found:#010x}")]
    InvalidPeSignature { offset: u64, found: u32 },

    #[error("unsupported optional header magic {0:#x}")]
    UnsupportedOptionalHeaderMagic(u16),

    #[error("section table of {count} entries at {offset:#x} exceeds buffer of {len} bytes")]
    TruncatedSectionTable { offset: u64, count: u16, len: usize },

    #[error(transparent)]
    OutOfBounds(#[from] OutOfBounds),
}

impl PeParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PeParseError::InvalidMagic { .. } | PeParseError::InvalidPeSignature { .. } => {
                ErrorKind::FormatMismatch
            }
            PeParseError::UnsupportedOptionalHeaderMagic(_) => ErrorKind::UnsupportedVariant,
            PeParseError::TooShort { .. }
            | PeParseError::NtHeadersOutOfBounds { .. }
            | PeParseError::TruncatedSectionTable { .. }
            | PeParseError::OutOfBounds(_) => ErrorKind::OutOfBounds,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElfParseError {
    #[error("file too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("invalid ELF magic: {found:02x?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("unsupported ELF variant: class {class}, data encoding {data}")]
    UnsupportedElfVariant { class: u8, data: u8 },

    #[error(transparent)]
    OutOfBounds(#[from] OutOfBounds),
}

impl ElfParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ElfParseError::InvalidMagic { .. } => ErrorKind::FormatMismatch,
            ElfParseError::UnsupportedElfVariant { .. } => ErrorKind::UnsupportedVariant,
            ElfParseError::TooShort { .. } | ElfParseError::OutOfBounds(_) => {
                ErrorKind::OutOfBounds
            }
        }
    }
}

/// Failure of a single file inside a batch.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("[PE] {0}")]
    Pe(#[from] PeParseError),

    #[error("[ELF] {0}")]
    Elf(#[from] ElfParseError),

    #[error("unknown file format: {}", .0.display())]
    UnknownFileFormat(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Pe(e) => e.kind(),
            ScanError::Elf(e) => e.kind(),
            ScanError::UnknownFileFormat(_) => ErrorKind::UnknownFileFormat,
            ScanError::Io { .. } => ErrorKind::Io,
        }
    }
}
