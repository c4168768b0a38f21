//! Per-file fault-isolated processing of a classified file list.

use crate::binary::{FormatHint, ParsedElf, ParsedFileRecord, ParsedPe, RawBinary};
use crate::error::{ErrorKind, ScanError};
use crate::report::{ElfRecord, PeRecord};
use rayon::prelude::*;
use std::path::PathBuf;

/// A file handed over by discovery, with the parser it should go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub path: PathBuf,
    pub hint: FormatHint,
}

impl ClassifiedFile {
    pub fn new(path: impl Into<PathBuf>, hint: FormatHint) -> Self {
        Self {
            path: path.into(),
            hint,
        }
    }

    /// Classifies `path` by its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let hint = FormatHint::from_path(&path);
        Self { path, hint }
    }
}

/// One file that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Worker threads; `1` processes files on the calling thread.
    pub jobs: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

/// Everything a batch produced, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub pe: Vec<ParsedPe>,
    pub elf: Vec<ParsedElf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchOutcome {
    fn record(&mut self, file: &ClassifiedFile, outcome: Result<ParsedFileRecord, ScanError>) {
        match outcome {
            Ok(ParsedFileRecord::Pe(pe)) => {
                log::debug!("[PE] parsed {}", file.path.display());
                self.pe.push(pe);
            }
            Ok(ParsedFileRecord::Elf(elf)) => {
                for warning in &elf.headers.warnings {
                    log::warn!("[ELF] {}: {}", file.path.display(), warning);
                }
                log::debug!("[ELF] parsed {}", file.path.display());
                self.elf.push(elf);
            }
            Err(err) => {
                let kind = err.kind();
                match kind {
                    ErrorKind::UnknownFileFormat => {
                        log::warn!("Unknown file format: {}", file.path.display())
                    }
                    _ => log::error!("Error processing file {}: {}", file.path.display(), err),
                }
                self.diagnostics.push(Diagnostic {
                    path: file.path.clone(),
                    kind,
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn pe_records(&self) -> Vec<PeRecord> {
        self.pe.iter().map(PeRecord::from).collect()
    }

    pub fn elf_records(&self) -> Vec<ElfRecord> {
        self.elf.iter().map(ElfRecord::from).collect()
    }
}

/// Reads and parses one file. Never panics on malformed content.
pub fn process_file(file: &ClassifiedFile) -> Result<ParsedFileRecord, ScanError> {
    if file.hint == FormatHint::Unknown {
        return Err(ScanError::UnknownFileFormat(file.path.clone()));
    }
    RawBinary::read(&file.path)?.parse(file.hint)
}

pub fn process_batch(files: &[ClassifiedFile]) -> BatchOutcome {
    process_batch_with(files, &BatchOptions::default())
}

pub fn process_batch_with(files: &[ClassifiedFile], options: &BatchOptions) -> BatchOutcome {
    let outcomes: Vec<Result<ParsedFileRecord, ScanError>> = if options.jobs > 1 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .build()
        {
            Ok(pool) => pool.install(|| files.par_iter().map(process_file).collect()),
            Err(e) => {
                log::warn!("Falling back to sequential processing: {}", e);
                files.iter().map(process_file).collect()
            }
        }
    } else {
        files.iter().map(process_file).collect()
    };

    // Join point: outcomes are in input order regardless of which worker
    // produced them.
    let mut batch = BatchOutcome::default();
    for (file, outcome) in files.iter().zip(outcomes) {
        batch.record(file, outcome);
    }
    log::info!(
        "Processed {} files: {} PE, {} ELF, {} failed",
        files.len(),
        batch.pe.len(),
        batch.elf.len(),
        batch.diagnostics.len()
    );
    batch
}
