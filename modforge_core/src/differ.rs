//! Unified diff generation between a baseline tree and a modified tree.

use crate::patch_serializer::PatchSerializer;
use crate::tree::{clear_dir, ensure_disjoint, list_files, resolve_relative};
use modforge_common::{FilePatch, ForgeConfig, ForgeError, Hunk, HunkLine, LineKind, CONTEXT_LINES};
use similar::{Algorithm, DiffTag};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Knobs for patch generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Extension given to patch files, without the dot
    pub patch_extension: String,
    /// Prefix of the `+++` header label
    pub label_prefix: String,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self::from(&ForgeConfig::default())
    }
}

impl From<&ForgeConfig> for DiffOptions {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            patch_extension: config.patch_extension.clone(),
            label_prefix: config.patch_label_prefix.clone(),
        }
    }
}

/// Outcome of a tree diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Relative paths of the patch files written, in order
    pub patches_written: Vec<String>,
    /// Baseline files identical in both trees
    pub unchanged: usize,
}

pub struct Differ {
    options: DiffOptions,
}

impl Differ {
    pub fn new() -> Self {
        Self {
            options: DiffOptions::default(),
        }
    }

    pub fn with_options(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Diff one file's contents. Returns `None` when there is nothing to patch.
    pub fn diff_file(&self, relative: &str, old: &str, new: &str) -> Option<FilePatch> {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let ops = similar::capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

        let mut patch = FilePatch::new(
            relative,
            format!("{}{}", self.options.label_prefix, relative),
        );

        for group in similar::group_diff_ops(ops, CONTEXT_LINES) {
            let Some(first) = group.first() else {
                continue;
            };
            let old_start = first.old_range().start;
            let new_start = first.new_range().start;

            let mut hunk = Hunk::new(0, 0);
            for op in &group {
                let (tag, old_range, new_range) = op.as_tag_tuple();
                match tag {
                    DiffTag::Equal => {
                        for line in &old_lines[old_range] {
                            hunk.lines.push(HunkLine::new(LineKind::Context, *line));
                        }
                    }
                    DiffTag::Delete => {
                        for line in &old_lines[old_range] {
                            hunk.lines.push(HunkLine::new(LineKind::Delete, *line));
                        }
                    }
                    DiffTag::Insert => {
                        for line in &new_lines[new_range] {
                            hunk.lines.push(HunkLine::new(LineKind::Insert, *line));
                        }
                    }
                    DiffTag::Replace => {
                        for line in &old_lines[old_range] {
                            hunk.lines.push(HunkLine::new(LineKind::Delete, *line));
                        }
                        for line in &new_lines[new_range] {
                            hunk.lines.push(HunkLine::new(LineKind::Insert, *line));
                        }
                    }
                }
            }

            hunk.recompute_counts();
            // an empty range is addressed by the line before it
            hunk.source_start = if hunk.source_count == 0 {
                old_start
            } else {
                old_start + 1
            };
            hunk.dest_start = if hunk.dest_count == 0 {
                new_start
            } else {
                new_start + 1
            };
            patch.hunks.push(hunk);
        }

        if patch.is_empty() {
            None
        } else {
            Some(patch)
        }
    }

    /// Relative path of the patch file for a baseline file.
    ///
    /// `a/Foo.src` becomes `a/Foo.patch`; names without an extension, and
    /// dot files, gain one.
    pub fn patch_file_name(&self, relative: &str) -> String {
        let (dir, name) = match relative.rfind('/') {
            Some(pos) => relative.split_at(pos + 1),
            None => ("", relative),
        };
        let stem = match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name,
        };
        format!("{}{}.{}", dir, stem, self.options.patch_extension)
    }

    /// Write one patch file under `patch_dir` for every baseline file whose
    /// contents differ in `modified`.
    ///
    /// Every patch is generated before `patch_dir` is cleared, so a run that
    /// fails leaves the previous patch set as it was.
    pub fn diff_trees(
        &self,
        baseline: &Path,
        modified: &Path,
        patch_dir: &Path,
    ) -> Result<DiffReport, ForgeError> {
        if !modified.is_dir() {
            return Err(ForgeError::NotFound(modified.to_path_buf()));
        }
        let files = list_files(baseline)?;
        ensure_disjoint(patch_dir, &[baseline, modified])?;

        let mut names: BTreeMap<String, &str> = BTreeMap::new();
        for relative in &files {
            let name = self.patch_file_name(relative);
            if let Some(first) = names.insert(name.clone(), relative) {
                return Err(ForgeError::PatchCollision {
                    patch: name,
                    first: first.to_string(),
                    second: relative.clone(),
                });
            }
        }

        let mut pending = Vec::new();
        let mut unchanged = 0;
        for relative in &files {
            let old_path = baseline.join(relative);
            let new_path = resolve_relative(modified, relative)
                .ok_or_else(|| ForgeError::NotFound(modified.join(relative)))?;
            let old = fs::read_to_string(&old_path).map_err(|e| ForgeError::io_at(&old_path, e))?;
            let new = fs::read_to_string(&new_path).map_err(|e| ForgeError::io_at(&new_path, e))?;

            match self.diff_file(relative, &old, &new) {
                Some(patch) => {
                    debug!(
                        "{}: {} hunks, {} changed lines",
                        relative,
                        patch.hunks.len(),
                        patch.change_count()
                    );
                    pending.push((
                        self.patch_file_name(relative),
                        PatchSerializer::serialize_file_patch(&patch),
                    ));
                }
                None => unchanged += 1,
            }
        }

        clear_dir(patch_dir)?;

        let mut report = DiffReport {
            patches_written: Vec::with_capacity(pending.len()),
            unchanged,
        };
        for (name, text) in pending {
            let target = patch_dir.join(&name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ForgeError::io_at(parent, e))?;
            }
            fs::write(&target, text).map_err(|e| ForgeError::io_at(&target, e))?;
            report.patches_written.push(name);
        }

        info!(
            "Wrote {} patches to {} ({} files unchanged)",
            report.patches_written.len(),
            patch_dir.display(),
            report.unchanged
        );
        Ok(report)
    }
}

impl Default for Differ {
    fn default() -> Self {
        Self::new()
    }
}

/// Diff `baseline` against `modified` and write the patches to `patch_dir`.
pub fn diff_trees(
    baseline: &Path,
    modified: &Path,
    patch_dir: &Path,
    options: &DiffOptions,
) -> Result<DiffReport, ForgeError> {
    Differ::with_options(options.clone()).diff_trees(baseline, modified, patch_dir)
}

/// Split text into lines, each keeping its `\n` (and any `\r` before it).
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}
