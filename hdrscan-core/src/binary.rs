use crate::error::ScanError;
use crate::header::{parse_elf, parse_pe, ElfHeaders, Header, PeHeaders};
use crate::sections::SectionSummary;
use goblin::Hint;
use std::path::Path;

/// Which parser a file should be handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatHint {
    Pe,
    Elf,
    Unknown,
}

impl FormatHint {
    /// Classifies by extension: `.exe` is PE, `.elf` is ELF.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("exe") => FormatHint::Pe,
            Some("elf") => FormatHint::Elf,
            _ => FormatHint::Unknown,
        }
    }

    /// Classifies by leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        let Some(head) = bytes.get(..16).and_then(|b| <&[u8; 16]>::try_from(b).ok()) else {
            return FormatHint::Unknown;
        };
        match goblin::peek_bytes(head) {
            Ok(Hint::Elf(_)) => FormatHint::Elf,
            Ok(Hint::PE) => FormatHint::Pe,
            _ => FormatHint::Unknown,
        }
    }
}

/// Key used for a file in the output records: its base name without extension.
pub fn record_name<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File contents plus the name that identifies them in output.
#[derive(Debug, Clone)]
pub struct RawBinary {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawBinary {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(record_name(path), bytes))
    }

    pub fn parse(&self, hint: FormatHint) -> Result<ParsedFileRecord, ScanError> {
        match hint {
            FormatHint::Pe => Ok(ParsedFileRecord::Pe(Parsed {
                name: self.name.clone(),
                headers: parse_pe(&self.bytes)?,
            })),
            FormatHint::Elf => Ok(ParsedFileRecord::Elf(Parsed {
                name: self.name.clone(),
                headers: parse_elf(&self.bytes)?,
            })),
            FormatHint::Unknown => Err(ScanError::UnknownFileFormat(self.name.clone().into())),
        }
    }
}

/// Headers of one file, keyed by its record name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<H> {
    pub name: String,
    pub headers: H,
}

pub type ParsedPe = Parsed<PeHeaders>;
pub type ParsedElf = Parsed<ElfHeaders>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFileRecord {
    Pe(ParsedPe),
    Elf(ParsedElf),
}

impl ParsedFileRecord {
    /// Reads and parses one file, classifying it by extension and, when
    /// `sniff` is set and the extension says nothing, by content.
    pub fn open<P: AsRef<Path>>(path: P, sniff: bool) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let raw = RawBinary::read(path)?;
        let mut hint = FormatHint::from_path(path);
        if hint == FormatHint::Unknown && sniff {
            hint = FormatHint::sniff(&raw.bytes);
        }
        raw.parse(hint).map_err(|e| match e {
            ScanError::UnknownFileFormat(_) => ScanError::UnknownFileFormat(path.to_path_buf()),
            other => other,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            ParsedFileRecord::Pe(p) => &p.name,
            ParsedFileRecord::Elf(e) => &e.name,
        }
    }

    pub fn header(&self) -> &dyn Header {
        match self {
            ParsedFileRecord::Pe(p) => &p.headers,
            ParsedFileRecord::Elf(e) => &e.headers,
        }
    }

    /// Section listing; stripped ELF files fall back to their loadable segments.
    pub fn sections(&self) -> Vec<SectionSummary> {
        match self {
            ParsedFileRecord::Pe(p) => p
                .headers
                .section_headers
                .iter()
                .map(SectionSummary::from_pe_section)
                .collect(),
            ParsedFileRecord::Elf(e) if e.headers.section_headers.is_empty() => {
                log::warn!("{}: no section headers; using program headers", e.name);
                SectionSummary::from_elf_segments(&e.headers)
            }
            ParsedFileRecord::Elf(e) => e
                .headers
                .section_headers
                .iter()
                .map(SectionSummary::from_elf_section)
                .collect(),
        }
    }
}
