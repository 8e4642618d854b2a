use serde::{Deserialize, Serialize};

/// Role of a single line inside a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    /// Present in both the baseline and the modified file
    Context,
    /// Present only in the baseline
    Delete,
    /// Present only in the modified file
    Insert,
}

impl LineKind {
    pub fn prefix(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Delete => '-',
            LineKind::Insert => '+',
        }
    }
}

/// One line of a hunk body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkLine {
    pub kind: LineKind,
    /// Line text including its terminator. Only the last line of a file may
    /// lack the trailing `\n`.
    pub text: String,
}

impl HunkLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn has_newline(&self) -> bool {
        self.text.ends_with('\n')
    }
}

/// A hunk groups related changes with surrounding context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Starting line number in the baseline file (1-based, or the line after
    /// which to insert when `source_count` is zero)
    pub source_start: usize,
    /// Number of baseline lines covered by this hunk
    pub source_count: usize,
    /// Starting line number in the modified file
    pub dest_start: usize,
    /// Number of modified-file lines covered by this hunk
    pub dest_count: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    pub fn new(source_start: usize, dest_start: usize) -> Self {
        Self {
            source_start,
            source_count: 0,
            dest_start,
            dest_count: 0,
            lines: Vec::new(),
        }
    }

    /// Recompute source_count and dest_count from the lines
    pub fn recompute_counts(&mut self) {
        let (src, dst) = self.counted_lines();
        self.source_count = src;
        self.dest_count = dst;
    }

    /// (baseline, modified) line counts implied by the hunk body
    pub fn counted_lines(&self) -> (usize, usize) {
        self.lines.iter().fold((0, 0), |(src, dst), line| match line.kind {
            LineKind::Context => (src + 1, dst + 1),
            LineKind::Delete => (src + 1, dst),
            LineKind::Insert => (src, dst + 1),
        })
    }

    /// Zero-based index of the first baseline line this hunk touches
    pub fn source_index(&self) -> usize {
        if self.source_count == 0 {
            self.source_start
        } else {
            self.source_start.saturating_sub(1)
        }
    }

    pub fn change_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.kind != LineKind::Context)
            .count()
    }
}

/// Unified diff for one file (baseline → modified)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePatch {
    /// Path from the `---` header
    pub source: String,
    /// Path from the `+++` header
    pub destination: String,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            hunks: Vec::new(),
        }
    }

    /// Total number of inserted and deleted lines across all hunks
    pub fn change_count(&self) -> usize {
        self.hunks.iter().map(Hunk::change_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hunk_recompute_counts() {
        let mut hunk = Hunk::new(1, 1);
        hunk.lines.push(HunkLine::new(LineKind::Context, "ctx\n"));
        hunk.lines.push(HunkLine::new(LineKind::Delete, "old\n"));
        hunk.lines.push(HunkLine::new(LineKind::Insert, "new1\n"));
        hunk.lines.push(HunkLine::new(LineKind::Insert, "new2\n"));
        hunk.recompute_counts();
        assert_eq!(hunk.source_count, 2);
        assert_eq!(hunk.dest_count, 3);
        assert_eq!(hunk.change_count(), 3);
    }

    #[test]
    fn test_source_index_for_pure_insertion() {
        let mut hunk = Hunk::new(4, 5);
        hunk.lines.push(HunkLine::new(LineKind::Insert, "added\n"));
        hunk.recompute_counts();
        // "-4,0" means insert after line 4
        assert_eq!(hunk.source_index(), 4);

        let mut hunk = Hunk::new(4, 4);
        hunk.lines.push(HunkLine::new(LineKind::Context, "ctx\n"));
        hunk.recompute_counts();
        assert_eq!(hunk.source_index(), 3);
    }

    #[test]
    fn test_file_patch_change_count() {
        let mut fp = FilePatch::new("a/Foo.src", "patches/a/Foo.src");
        assert!(fp.is_empty());
        let mut hunk = Hunk::new(1, 1);
        hunk.lines.push(HunkLine::new(LineKind::Delete, "x\n"));
        fp.hunks.push(hunk);
        assert_eq!(fp.change_count(), 1);
        assert!(!fp.is_empty());
    }

    #[test]
    fn test_line_without_newline() {
        assert!(!HunkLine::new(LineKind::Context, "last").has_newline());
        assert_eq!(LineKind::Insert.prefix(), '+');
    }
}
