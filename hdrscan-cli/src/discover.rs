use anyhow::{Context, Result};
use hdrscan_core::{ClassifiedFile, FormatHint};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Collects the files under `dir`, recursively, in path order.
///
/// Without `sniff` only `.exe` and `.elf` files are returned. With `sniff`
/// every file is returned; those without a known extension are classified by
/// their leading bytes and may still come back as [`FormatHint::Unknown`].
///
/// Symlinks to files are included. Symlinked directories are not entered, and
/// directories that cannot be listed are logged and skipped.
pub fn collect_files(dir: &Path, sniff: bool) -> Vec<ClassifiedFile> {
    if !dir.is_dir() {
        log::warn!("{} is not a directory; nothing to scan", dir.display());
        return Vec::new();
    }

    let mut paths = Vec::new();
    walk(dir, &mut paths);
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let hint = FormatHint::from_path(&path);
        if hint != FormatHint::Unknown {
            files.push(ClassifiedFile::new(path, hint));
        } else if sniff {
            let hint = sniff_file(&path).unwrap_or_else(|e| {
                log::debug!("could not sniff {}: {:#}", path.display(), e);
                FormatHint::Unknown
            });
            files.push(ClassifiedFile::new(path, hint));
        }
    }
    log::info!("Found {} candidate files in {}", files.len(), dir.display());
    files
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("skipping {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let is_link = entry.file_type().is_ok_and(|t| t.is_symlink());
        // metadata() follows links, so a link to a sample counts as a file.
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() && !is_link => walk(&path, out),
            Ok(meta) if meta.is_dir() => {
                log::debug!("not following directory link {}", path.display())
            }
            Ok(meta) if meta.is_file() => out.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("skipping {}: {}", path.display(), e),
        }
    }
}

fn sniff_file(path: &Path) -> Result<FormatHint> {
    let mut head = Vec::with_capacity(16);
    fs::File::open(path)
        .and_then(|f| f.take(16).read_to_end(&mut head))
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(FormatHint::sniff(&head))
}
