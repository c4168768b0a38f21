use anyhow::{Context, Result};
use hdrscan_core::BatchOutcome;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const PE_ARTIFACT: &str = "pe_headers";
pub const ELF_ARTIFACT: &str = "elf_headers";

/// Where one category's two artifacts were written.
#[derive(Debug)]
pub struct Written {
    pub pe: PathBuf,
    pub elf: PathBuf,
}

/// Writes the PE and ELF records of `outcome` to `<out>/<category>/`.
pub fn write_category(out: &Path, category: &str, outcome: &BatchOutcome) -> Result<Written> {
    let dir = out.join(category);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let pe = dir.join(PE_ARTIFACT);
    write_json(&pe, &outcome.pe_records())?;
    let elf = dir.join(ELF_ARTIFACT);
    write_json(&elf, &outcome.elf_records())?;

    log::info!(
        "[{}] wrote {} PE and {} ELF records to {}",
        category,
        outcome.pe.len(),
        outcome.elf.len(),
        dir.display()
    );
    Ok(Written { pe, elf })
}

/// Serializes `value` as JSON indented with four spaces.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    to_writer_indented(&mut writer, value)?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn to_writer_indented<W: Write, T: Serialize + ?Sized>(writer: W, value: &T) -> Result<()> {
    let mut ser = Serializer::with_formatter(writer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser).context("failed to serialize records")
}
