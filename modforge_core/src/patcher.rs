//! Strict application of a directory of unified diffs onto a baseline tree.

use crate::differ::split_lines;
use crate::patch_parser::PatchParser;
use crate::tree::{clear_dir, copy_tree, ensure_disjoint, list_files, resolve_relative};
use modforge_common::{FilePatch, ForgeConfig, ForgeError, LineKind};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Knobs for patch application
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Prefixes removed from `---` header paths before resolving the target
    pub strip_prefixes: Vec<String>,
}

impl From<&ForgeConfig> for PatchOptions {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            strip_prefixes: config.strip_prefixes.clone(),
        }
    }
}

/// Outcome of applying a patch directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Baseline files copied to the output
    pub files_copied: usize,
    /// Output files rewritten by a patch
    pub files_patched: usize,
}

pub struct Patcher {
    options: PatchOptions,
    parser: PatchParser,
}

impl Patcher {
    pub fn new() -> Self {
        Self::with_options(PatchOptions::default())
    }

    pub fn with_options(options: PatchOptions) -> Self {
        Self {
            options,
            parser: PatchParser::new(),
        }
    }

    /// Relative target path for a `---` header path.
    pub fn target_path(&self, header: &str) -> String {
        let stripped = self
            .options
            .strip_prefixes
            .iter()
            .filter(|prefix| !prefix.is_empty())
            .find_map(|prefix| header.strip_prefix(prefix.as_str()))
            .unwrap_or(header);
        stripped.trim_start_matches('/').to_string()
    }

    /// Parse every patch file under `patch_dir`, keyed by target path.
    pub fn load_patches(&self, patch_dir: &Path) -> Result<BTreeMap<String, FilePatch>, ForgeError> {
        let mut patches = BTreeMap::new();
        for relative in list_files(patch_dir)? {
            let path = patch_dir.join(&relative);
            let sections = self.parser.parse_file(&path)?;
            if sections.is_empty() {
                return Err(ForgeError::PatchParse {
                    file: relative,
                    reason: "no file header found".to_string(),
                });
            }
            for patch in sections {
                let target = self.target_path(&patch.source);
                if patches.contains_key(&target) {
                    return Err(ForgeError::DuplicatePatchTarget(target));
                }
                debug!("{} patches {}", relative, target);
                patches.insert(target, patch);
            }
        }
        Ok(patches)
    }

    /// Apply `patch` to `original`. Every context and removed line must match
    /// the baseline exactly; `label` names the file in conflict errors.
    pub fn apply_to_text(
        &self,
        label: &str,
        patch: &FilePatch,
        original: &str,
    ) -> Result<String, ForgeError> {
        let lines = split_lines(original);
        let mut output = String::with_capacity(original.len());
        let mut cursor = 0usize;

        for (number, hunk) in patch.hunks.iter().enumerate() {
            let conflict = |line: usize, reason: String| ForgeError::PatchConflict {
                file: label.to_string(),
                hunk: number + 1,
                line,
                reason,
            };

            let start = hunk.source_index();
            if start < cursor || start > lines.len() {
                return Err(conflict(
                    hunk.source_start,
                    format!(
                        "hunk starts outside the unpatched part of a {} line file",
                        lines.len()
                    ),
                ));
            }
            for line in &lines[cursor..start] {
                output.push_str(line);
            }

            let mut pos = start;
            for hunk_line in &hunk.lines {
                if hunk_line.kind == LineKind::Insert {
                    output.push_str(&hunk_line.text);
                    continue;
                }
                let Some(actual) = lines.get(pos) else {
                    return Err(conflict(pos + 1, "file ends before the hunk does".to_string()));
                };
                if *actual != hunk_line.text {
                    return Err(conflict(
                        pos + 1,
                        format!("expected {:?}, found {:?}", hunk_line.text, actual),
                    ));
                }
                if hunk_line.kind == LineKind::Context {
                    output.push_str(actual);
                }
                pos += 1;
            }
            cursor = pos;
        }

        for line in &lines[cursor..] {
            output.push_str(line);
        }
        Ok(output)
    }

    /// Rebuild `output` as `baseline` with every patch under `patch_dir`
    /// applied. Whatever `output` held before is removed; an `output` that
    /// overlaps the baseline or the patch directory is refused.
    pub fn apply(
        &self,
        baseline: &Path,
        patch_dir: &Path,
        output: &Path,
    ) -> Result<PatchReport, ForgeError> {
        if !baseline.is_dir() {
            return Err(ForgeError::NotFound(baseline.to_path_buf()));
        }
        ensure_disjoint(output, &[baseline, patch_dir])?;
        let patches = self.load_patches(patch_dir)?;

        clear_dir(output)?;
        let copied = copy_tree(baseline, output)?;

        let mut report = PatchReport {
            files_copied: copied.len(),
            files_patched: 0,
        };
        for (target, patch) in &patches {
            let escapes = || ForgeError::PatchParse {
                file: target.clone(),
                reason: "target path leaves the baseline tree".to_string(),
            };
            let source = resolve_relative(baseline, target).ok_or_else(escapes)?;
            let dest = resolve_relative(output, target).ok_or_else(escapes)?;
            let original = fs::read_to_string(&source).map_err(|e| ForgeError::io_at(&source, e))?;

            let patched = self.apply_to_text(target, patch, &original)?;
            fs::write(&dest, patched).map_err(|e| ForgeError::io_at(&dest, e))?;
            debug!("Patched {} ({} hunks)", target, patch.hunks.len());
            report.files_patched += 1;
        }

        info!(
            "Applied {} patches onto {} baseline files in {}",
            report.files_patched,
            report.files_copied,
            output.display()
        );
        Ok(report)
    }
}

impl Default for Patcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Materialize `baseline` plus the patches in `patch_dir` at `output`.
pub fn apply_patches(
    baseline: &Path,
    patch_dir: &Path,
    output: &Path,
    options: &PatchOptions,
) -> Result<PatchReport, ForgeError> {
    Patcher::with_options(options.clone()).apply(baseline, patch_dir, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::Differ;
    use tempfile::TempDir;

    fn ten_lines() -> String {
        (1..=10).map(|i| format!("line {i}\n")).collect()
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    struct Trees {
        _tmp: TempDir,
        base: std::path::PathBuf,
        modified: std::path::PathBuf,
        patches: std::path::PathBuf,
        out: std::path::PathBuf,
    }

    fn trees() -> Trees {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        Trees {
            _tmp: tmp,
            base: root.join("base"),
            modified: root.join("mod"),
            patches: root.join("patches"),
            out: root.join("out"),
        }
    }

    #[test]
    fn test_round_trip_reproduces_modified_tree() {
        let t = trees();
        let cases = [
            ("a/Foo.src", ten_lines(), ten_lines().replace("line 5", "changed")),
            ("crlf.txt", "one\r\ntwo\r\nthree\r\n".into(), "one\r\n2\r\nthree\r\n".into()),
            ("tail.txt", "x\ny".into(), "x\ny\n".into()),
            ("grow.txt", "".into(), "new\ncontent".into()),
            ("same.txt", "keep\n".into(), "keep\n".into()),
        ];
        for (rel, old, new) in &cases {
            write(&t.base, rel, old);
            write(&t.modified, rel, new);
        }

        Differ::new().diff_trees(&t.base, &t.modified, &t.patches).unwrap();
        let report = Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap();
        assert_eq!(report.files_copied, 5);
        assert_eq!(report.files_patched, 4);

        for (rel, _, new) in &cases {
            assert_eq!(&fs::read_to_string(t.out.join(rel)).unwrap(), new, "{rel}");
        }
    }

    #[test]
    fn test_conflict_names_the_file() {
        let t = trees();
        write(&t.base, "a/Foo.src", &ten_lines());
        write(&t.modified, "a/Foo.src", &ten_lines().replace("line 5", "LINE 5"));
        Differ::new().diff_trees(&t.base, &t.modified, &t.patches).unwrap();

        // baseline drifts around line 5
        write(&t.base, "a/Foo.src", &ten_lines().replace("line 4", "line four"));
        let err = Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap_err();
        match err {
            ForgeError::PatchConflict { file, hunk, line, .. } => {
                assert_eq!(file, "a/Foo.src");
                assert_eq!(hunk, 1);
                assert_eq!(line, 4);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_output_is_removed() {
        let t = trees();
        write(&t.base, "kept.txt", "k\n");
        fs::create_dir_all(&t.patches).unwrap();
        write(&t.out, "old/stale.txt", "from last run");

        let report = Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap();
        assert_eq!(report.files_patched, 0);
        assert!(t.out.join("kept.txt").exists());
        assert!(!t.out.join("old").exists());
    }

    #[test]
    fn test_missing_target_is_not_found() {
        let t = trees();
        write(&t.base, "present.txt", "p\n");
        write(
            &t.patches,
            "absent.patch",
            "--- absent.txt\n+++ patches/absent.txt\n@@ -1 +1 @@\n-a\n+b\n",
        );
        let err = Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(p) if p.ends_with("absent.txt")));
    }

    #[test]
    fn test_duplicate_targets_are_rejected() {
        let t = trees();
        write(&t.base, "f.txt", "a\n");
        let body = "--- f.txt\n+++ patches/f.txt\n@@ -1 +1 @@\n-a\n+b\n";
        write(&t.patches, "one.patch", body);
        write(&t.patches, "two.patch", body);

        let err = Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap_err();
        assert!(matches!(err, ForgeError::DuplicatePatchTarget(ref t) if t == "f.txt"));
    }

    #[test]
    fn test_target_comes_from_header_not_file_name() {
        let t = trees();
        write(&t.base, "src/real.txt", "a\n");
        write(
            &t.patches,
            "renamed-anything.patch",
            "--- src/real.txt\n+++ patches/src/real.txt\n@@ -1 +1 @@\n-a\n+b\n",
        );
        Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap();
        assert_eq!(fs::read_to_string(t.out.join("src/real.txt")).unwrap(), "b\n");
    }

    #[test]
    fn test_escaping_target_is_rejected() {
        let t = trees();
        write(&t.base, "f.txt", "a\n");
        write(
            &t.patches,
            "evil.patch",
            "--- ../f.txt\n+++ patches/../f.txt\n@@ -1 +1 @@\n-a\n+b\n",
        );
        let err = Patcher::new().apply(&t.base, &t.patches, &t.out).unwrap_err();
        assert!(matches!(err, ForgeError::PatchParse { .. }));
    }

    #[test]
    fn test_strip_prefixes() {
        let patcher = Patcher::with_options(PatchOptions {
            strip_prefixes: vec!["a/".to_string(), "b/".to_string()],
        });
        assert_eq!(patcher.target_path("a/src/x.txt"), "src/x.txt");
        assert_eq!(patcher.target_path("src/x.txt"), "src/x.txt");
        assert_eq!(Patcher::new().target_path("/abs/x"), "abs/x");
    }

    #[test]
    fn test_output_equal_to_baseline_is_refused() {
        let t = trees();
        write(&t.base, "f.txt", "a\n");
        fs::create_dir_all(&t.patches).unwrap();
        let err = Patcher::new().apply(&t.base, &t.patches, &t.base).unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        assert!(t.base.join("f.txt").exists());
    }

    #[test]
    fn test_output_enclosing_inputs_is_refused() {
        let tmp = TempDir::new().unwrap();
        let work = tmp.path().join("work");
        let base = work.join("base");
        write(&base, "Foo.src", "a\n");
        let patches = tmp.path().join("patches");
        fs::create_dir_all(&patches).unwrap();

        let err = Patcher::new().apply(&base, &patches, &work).unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        assert!(base.join("Foo.src").exists());

        let err = Patcher::new().apply(&base, &patches, tmp.path()).unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        assert!(patches.is_dir());
    }

    #[test]
    fn test_apply_to_text_overlapping_hunks() {
        let text = "a\nb\nc\n";
        let patch = PatchParser::new()
            .parse_str(
                "--- f\n+++ f\n@@ -2,1 +2,1 @@\n-b\n+B\n@@ -1,1 +1,1 @@\n-a\n+A\n",
                "f",
            )
            .unwrap()
            .remove(0);
        let err = Patcher::new().apply_to_text("f", &patch, text).unwrap_err();
        assert!(matches!(err, ForgeError::PatchConflict { hunk: 2, .. }));
    }
}
