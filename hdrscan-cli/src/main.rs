mod discover;
mod sink;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use hdrscan_core::{
    process_batch_with, BatchOptions, Diagnostic, ErrorKind, ParsedFileRecord, SectionSummary,
};
use hdrscan_core::{ElfRecord, PeRecord};
use std::path::PathBuf;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// PE/ELF header extraction for sample corpora
#[derive(Parser)]
#[command(
    name = "hdrscan",
    about = "Extract PE and ELF headers from binaries into JSON records",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan `<root>/<category>` directories and write one PE and one ELF file per category
    Scan {
        /// Directory holding one subdirectory per category
        #[arg(long)]
        root: PathBuf,
        /// Output directory; records land in `<out>/<category>/`
        #[arg(long)]
        out: PathBuf,
        #[arg(long = "category", default_values_t = ["Malware".to_string(), "Benign".to_string()])]
        categories: Vec<String>,
        /// Worker threads per category
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        /// Classify files without a known extension by their magic bytes
        #[arg(long)]
        sniff: bool,
    },
    /// Parse a single file and print its headers
    Show {
        path: PathBuf,
        /// Print the JSON record instead of a summary
        #[arg(long)]
        json: bool,
        #[arg(long)]
        sniff: bool,
    },
}

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "Section")]
    name: String,
    #[tabled(rename = "VMA")]
    vma: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Offset")]
    offset: String,
    #[tabled(rename = "Flags")]
    flags: String,
}

impl From<&SectionSummary> for SectionRow {
    fn from(s: &SectionSummary) -> Self {
        SectionRow {
            name: s.name.clone(),
            vma: format!("0x{:x}", s.vma),
            size: format!("0x{:x}", s.size),
            offset: format!("0x{:x}", s.file_offset),
            flags: format!("0x{:x}", s.flags),
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Scan {
            root,
            out,
            categories,
            jobs,
            sniff,
        } => {
            let options = BatchOptions { jobs: jobs.max(1) };
            for category in &categories {
                let files = discover::collect_files(&root.join(category), sniff);
                let outcome = process_batch_with(&files, &options);
                for diagnostic in &outcome.diagnostics {
                    report(diagnostic);
                }
                let written = sink::write_category(&out, category, &outcome)?;
                println!(
                    "{} {}: {} PE, {} ELF, {} failed -> {}, {}",
                    "done".green().bold(),
                    category,
                    outcome.pe.len(),
                    outcome.elf.len(),
                    outcome.diagnostics.len(),
                    written.pe.display(),
                    written.elf.display()
                );
            }
        }

        Command::Show { path, json, sniff } => {
            let parsed = ParsedFileRecord::open(&path, sniff)
                .with_context(|| format!("failed to parse {}", path.display()))?;

            if json {
                let mut stdout = std::io::stdout().lock();
                match &parsed {
                    ParsedFileRecord::Pe(pe) => {
                        sink::to_writer_indented(&mut stdout, &PeRecord::from(pe))?
                    }
                    ParsedFileRecord::Elf(elf) => {
                        sink::to_writer_indented(&mut stdout, &ElfRecord::from(elf))?
                    }
                }
                println!();
                return Ok(());
            }

            let header = parsed.header();
            println!("File:        {}", parsed.name());
            println!(
                "Format:      {} ({})",
                header.format_name(),
                if header.is_64() { "64-bit" } else { "32-bit" }
            );
            println!("Machine:     0x{:x}", header.machine());
            println!("Entry point: 0x{:x}", header.entry_point());
            println!("Executable:  {}", header.is_executable());
            if let ParsedFileRecord::Elf(elf) = &parsed {
                for warning in &elf.headers.warnings {
                    println!("{} {}", "warning:".yellow().bold(), warning);
                }
            }

            let sections = parsed.sections();
            if sections.is_empty() {
                println!("No sections found.");
            } else {
                let mut table = Table::new(sections.iter().map(SectionRow::from));
                table.with(Style::psql());
                println!("{table}");
            }
        }
    }

    Ok(())
}

fn report(diagnostic: &Diagnostic) {
    let label = match diagnostic.kind {
        ErrorKind::UnknownFileFormat => "skipped:".yellow().bold(),
        _ => "error:".red().bold(),
    };
    eprintln!(
        "{} {} [{}] {}",
        label,
        diagnostic.path.display(),
        diagnostic.kind,
        diagnostic.message
    );
}
