//! Selective copying of archive entries into another archive or a directory.

use crate::archive::ArchiveHandle;
use crate::glob::FilterSet;
use crate::tree::{clear_dir, resolve_relative};
use modforge_common::{EntryKind, ForgeError};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of a filtered archive operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Regular files written to the destination
    pub copied: usize,
    /// Regular files left out by the filters
    pub skipped: usize,
}

/// Copy every regular file of `source` matching `filters` into `dest`,
/// byte for byte. Fails if `dest` already holds one of those paths.
pub fn filter_copy(
    source: &mut ArchiveHandle,
    dest: &mut ArchiveHandle,
    filters: &FilterSet,
) -> Result<CopyReport, ForgeError> {
    let (selected, skipped) = select_files(source, filters);
    for path in &selected {
        debug!("Copying {}", path);
        dest.copy_raw_from(source, path)?;
    }

    let report = CopyReport {
        copied: selected.len(),
        skipped,
    };
    warn_if_unmatched(filters, &report);
    info!(
        "Copied {} of {} files from {} to {}",
        report.copied,
        report.copied + report.skipped,
        source.path().display(),
        dest.path().display()
    );
    Ok(report)
}

/// Extract every regular file of `source` matching `filters` under
/// `dest_dir`, after clearing whatever a previous run left there.
pub fn extract(
    source: &mut ArchiveHandle,
    dest_dir: &Path,
    filters: &FilterSet,
) -> Result<CopyReport, ForgeError> {
    clear_dir(dest_dir)?;

    let (selected, skipped) = select_files(source, filters);
    let archive = source.path().to_path_buf();
    for path in &selected {
        let target = resolve_relative(dest_dir, path).ok_or_else(|| ForgeError::MalformedArchive {
            path: archive.clone(),
            reason: format!("entry {} escapes the extraction directory", path),
        })?;
        let data = source.read(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &data)?;
        debug!("Extracted {}", path);
    }

    let report = CopyReport {
        copied: selected.len(),
        skipped,
    };
    warn_if_unmatched(filters, &report);
    info!(
        "Extracted {} files from {} into {}",
        report.copied,
        archive.display(),
        dest_dir.display()
    );
    Ok(report)
}

/// Open `source`, copy the matching files into the archive at `dest`
/// (created empty if missing) and close both.
pub fn copy_archive(source: &Path, dest: &Path, filters: &FilterSet) -> Result<CopyReport, ForgeError> {
    let mut input = ArchiveHandle::open(source, false)?;
    let mut output = ArchiveHandle::open(dest, true)?;
    let report = filter_copy(&mut input, &mut output, filters)?;
    input.close()?;
    output.close()?;
    Ok(report)
}

/// Like [`copy_archive`], but `dest` is rebuilt from scratch so repeated
/// runs never trip over entries from an earlier run.
pub fn copy_archive_fresh(
    source: &Path,
    dest: &Path,
    filters: &FilterSet,
) -> Result<CopyReport, ForgeError> {
    let mut input = ArchiveHandle::open(source, false)?;
    let mut output = ArchiveHandle::create(dest)?;
    let report = filter_copy(&mut input, &mut output, filters)?;
    input.close()?;
    output.close()?;
    Ok(report)
}

/// Open `source` and extract the matching files into `dest_dir`.
pub fn extract_archive(
    source: &Path,
    dest_dir: &Path,
    filters: &FilterSet,
) -> Result<CopyReport, ForgeError> {
    let mut input = ArchiveHandle::open(source, false)?;
    let report = extract(&mut input, dest_dir, filters)?;
    input.close()?;
    Ok(report)
}

/// Write to `dest` a copy of `source` keeping only the regular files that
/// match `filters`, plus the directory entries that match themselves or
/// still have content.
/// `source` and `dest` may be the same file.
pub fn strip(source: &Path, dest: &Path, filters: &FilterSet) -> Result<CopyReport, ForgeError> {
    let mut input = ArchiveHandle::open(source, false)?;
    let (kept, skipped) = select_files(&input, filters);

    let kept_dirs: BTreeSet<String> = kept
        .iter()
        .flat_map(|path| {
            path.match_indices('/')
                .filter(|(pos, _)| *pos > 0)
                .map(|(pos, _)| path[..pos].to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    let kept_files: BTreeSet<&str> = kept.iter().map(String::as_str).collect();

    let plan: Vec<String> = input
        .entries()
        .filter(|(path, kind)| match kind {
            EntryKind::Directory => kept_dirs.contains(*path) || filters.matches(path),
            EntryKind::File => kept_files.contains(path),
        })
        .map(|(path, _)| path.to_string())
        .collect();
    let removed = input.len() - plan.len();

    let mut output = ArchiveHandle::create(dest)?;
    for path in &plan {
        output.copy_raw_from(&mut input, path)?;
    }
    input.close()?;
    output.close()?;

    let report = CopyReport {
        copied: kept.len(),
        skipped,
    };
    warn_if_unmatched(filters, &report);
    info!(
        "Stripped {} entries from {} into {}",
        removed,
        source.display(),
        dest.display()
    );
    Ok(report)
}

/// Matching regular-file paths in archive order, plus the count left out
fn select_files(source: &ArchiveHandle, filters: &FilterSet) -> (Vec<String>, usize) {
    let mut selected = Vec::new();
    let mut skipped = 0;
    for path in source.files() {
        if filters.matches(path) {
            selected.push(path.to_string());
        } else {
            skipped += 1;
        }
    }
    (selected, skipped)
}

fn warn_if_unmatched(filters: &FilterSet, report: &CopyReport) {
    if !filters.is_empty() && report.copied == 0 {
        let patterns: Vec<&str> = filters.patterns().collect();
        warn!("No archive entries matched {:?}", patterns);
    }
}
