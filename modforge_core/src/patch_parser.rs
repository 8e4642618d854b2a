use modforge_common::{FilePatch, ForgeError, Hunk, HunkLine, LineKind};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static HEADER1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--- ([^\t]+)(?:\t.*)?$").unwrap());

static HEADER2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+\+\+ ([^\t]+)(?:\t.*)?$").unwrap());

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").unwrap()
});

/// Marker following a line that has no terminating newline
pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Parser for unified diff text.
///
/// Hunk bodies are read strictly by the counts in their `@@` header, so
/// removed lines that themselves start with `--` are never mistaken for a
/// new file header.
pub struct PatchParser;

impl PatchParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse every file section in `input`. `origin` names the input in errors.
    pub fn parse_str(&self, input: &str, origin: &str) -> Result<Vec<FilePatch>, ForgeError> {
        let lines: Vec<&str> = input.split_inclusive('\n').collect();
        let mut file_patches = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let Some(cap1) = HEADER1.captures(strip_eol(lines[i])) else {
                // "diff --git", "Index:" and similar preamble lines
                i += 1;
                continue;
            };
            let Some(cap2) = lines.get(i + 1).and_then(|l| HEADER2.captures(strip_eol(l))) else {
                i += 1;
                continue;
            };

            let mut fp = FilePatch::new(Self::unescape_path(&cap1[1]), Self::unescape_path(&cap2[1]));
            i += 2;

            while i < lines.len() {
                let line = strip_eol(lines[i]);
                if let Some(hunk_cap) = HUNK_HEADER.captures(line) {
                    let hunk = parse_hunk_header(&hunk_cap, origin)?;
                    i += 1;
                    let (hunk, next) = parse_hunk_body(hunk, &lines, i, origin)?;
                    fp.hunks.push(hunk);
                    i = next;
                } else if HEADER1.is_match(line) {
                    break;
                } else {
                    i += 1;
                }
            }

            file_patches.push(fp);
        }

        Ok(file_patches)
    }

    /// Parse a patch file from disk.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<FilePatch>, ForgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| ForgeError::io_at(path, e))?;
        self.parse_str(&content, &path.display().to_string())
    }

    /// Escape a path for diff output (add quotes if it contains spaces).
    pub fn escape_path(path: &str) -> String {
        if path.contains(' ') {
            format!("\"{}\"", path.replace('\\', "\\\\").replace('"', "\\\""))
        } else {
            path.to_string()
        }
    }

    /// Unescape a path from diff output (remove surrounding quotes and backslash escapes).
    pub fn unescape_path(path: &str) -> String {
        let trimmed = path.trim();
        if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
            let inner = &trimmed[1..trimmed.len() - 1];
            inner.replace("\\\"", "\"").replace("\\\\", "\\")
        } else {
            trimmed.to_string()
        }
    }
}

impl Default for PatchParser {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn parse_hunk_header(cap: &regex::Captures<'_>, origin: &str) -> Result<Hunk, ForgeError> {
    let number = |idx: usize, default: usize| -> Result<usize, ForgeError> {
        match cap.get(idx) {
            Some(m) => m.as_str().parse().map_err(|_| ForgeError::PatchParse {
                file: origin.to_string(),
                reason: format!("bad number in hunk header '{}'", &cap[0]),
            }),
            None => Ok(default),
        }
    };

    let mut hunk = Hunk::new(number(1, 0)?, number(3, 0)?);
    hunk.source_count = number(2, 1)?;
    hunk.dest_count = number(4, 1)?;
    Ok(hunk)
}

/// Read hunk lines starting at `start` until the header counts are met.
/// Returns the hunk and the index of the first unconsumed line.
fn parse_hunk_body(
    mut hunk: Hunk,
    lines: &[&str],
    start: usize,
    origin: &str,
) -> Result<(Hunk, usize), ForgeError> {
    let mut i = start;
    let mut src = 0usize;
    let mut dst = 0usize;
    let malformed = |reason: String| ForgeError::PatchParse {
        file: origin.to_string(),
        reason,
    };

    while src < hunk.source_count || dst < hunk.dest_count {
        let Some(&raw) = lines.get(i) else {
            return Err(malformed(format!(
                "hunk at -{},{} ends early",
                hunk.source_start, hunk.source_count
            )));
        };
        let (kind, text) = match raw.as_bytes().first() {
            Some(b' ') => (LineKind::Context, &raw[1..]),
            Some(b'-') => (LineKind::Delete, &raw[1..]),
            Some(b'+') => (LineKind::Insert, &raw[1..]),
            // editors sometimes drop the lone space of an empty context line
            Some(b'\n') | Some(b'\r') => (LineKind::Context, raw),
            Some(b'\\') => {
                strip_last_newline(&mut hunk, raw, origin)?;
                i += 1;
                continue;
            }
            _ => {
                return Err(malformed(format!(
                    "unexpected line {} inside hunk: {:?}",
                    i + 1,
                    strip_eol(raw)
                )))
            }
        };
        match kind {
            LineKind::Context => {
                src += 1;
                dst += 1;
            }
            LineKind::Delete => src += 1,
            LineKind::Insert => dst += 1,
        }
        if src > hunk.source_count || dst > hunk.dest_count {
            return Err(malformed(format!(
                "hunk at -{},{} has more lines than its header declares",
                hunk.source_start, hunk.source_count
            )));
        }
        hunk.lines.push(HunkLine::new(kind, text));
        i += 1;
    }

    if let Some(&raw) = lines.get(i) {
        if raw.starts_with('\\') {
            strip_last_newline(&mut hunk, raw, origin)?;
            i += 1;
        }
    }

    Ok((hunk, i))
}

fn strip_last_newline(hunk: &mut Hunk, marker: &str, origin: &str) -> Result<(), ForgeError> {
    if !strip_eol(marker).starts_with("\\ ") {
        return Err(ForgeError::PatchParse {
            file: origin.to_string(),
            reason: format!("unexpected marker {:?}", strip_eol(marker)),
        });
    }
    if let Some(last) = hunk.lines.last_mut() {
        if last.text.ends_with('\n') {
            last.text.pop();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<FilePatch> {
        PatchParser::new().parse_str(input, "test.patch").unwrap()
    }

    #[test]
    fn test_parse_simple_unified() {
        let input = "\
--- a/Foo.src
+++ patches/a/Foo.src
@@ -1,3 +1,3 @@
 line1
-line2
+line2_modified
 line3
";
        let result = parse(input);
        assert_eq!(result.len(), 1);
        let fp = &result[0];
        assert_eq!(fp.source, "a/Foo.src");
        assert_eq!(fp.destination, "patches/a/Foo.src");

        let hunk = &fp.hunks[0];
        assert_eq!((hunk.source_start, hunk.source_count), (1, 3));
        assert_eq!((hunk.dest_start, hunk.dest_count), (1, 3));
        let kinds: Vec<LineKind> = hunk.lines.iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![LineKind::Context, LineKind::Delete, LineKind::Insert, LineKind::Context]
        );
        assert_eq!(hunk.lines[2].text, "line2_modified\n");
    }

    #[test]
    fn test_header_timestamps_are_ignored() {
        let input = "\
--- a/file.txt\t2024-01-01 00:00:00
+++ b/file.txt\t2024-01-02 00:00:00
@@ -1 +1 @@
-old
+new
";
        let result = parse(input);
        assert_eq!(result[0].source, "a/file.txt");
        assert_eq!(result[0].hunks[0].source_count, 1);
    }

    #[test]
    fn test_removed_line_looking_like_header() {
        let input = "\
--- a/notes.txt
+++ patches/a/notes.txt
@@ -1,2 +1,1 @@
--- not a header
 keep
";
        let result = parse(input);
        assert_eq!(result.len(), 1);
        let hunk = &result[0].hunks[0];
        assert_eq!(hunk.lines[0].kind, LineKind::Delete);
        assert_eq!(hunk.lines[0].text, "-- not a header\n");
    }

    #[test]
    fn test_multiple_hunks_and_files() {
        let input = "\
diff --git a/first.txt b/first.txt
--- a/first.txt
+++ b/first.txt
@@ -1,2 +1,2 @@
-old
+new
 ctx
@@ -10,2 +10,2 @@
 ctx10
-old10
+new10
--- a/second.txt
+++ b/second.txt
@@ -1,2 +1,2 @@
 ctx
-old2
+new2
";
        let result = parse(input);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].hunks.len(), 2);
        assert_eq!(result[0].hunks[1].source_start, 10);
        assert_eq!(result[1].source, "a/second.txt");
    }

    #[test]
    fn test_no_newline_marker() {
        let input = "\
--- a/f.txt
+++ patches/a/f.txt
@@ -1,2 +1,2 @@
 first
-last
\\ No newline at end of file
+LAST
\\ No newline at end of file
";
        let hunk = &parse(input)[0].hunks[0];
        assert_eq!(hunk.lines[1].text, "last");
        assert_eq!(hunk.lines[2].text, "LAST");
        assert_eq!(hunk.lines[0].text, "first\n");
    }

    #[test]
    fn test_crlf_content_is_preserved() {
        let input = "--- a/w.txt\n+++ patches/a/w.txt\n@@ -1 +1 @@\n-old\r\n+new\r\n";
        let hunk = &parse(input)[0].hunks[0];
        assert_eq!(hunk.lines[0].text, "old\r\n");
        assert_eq!(hunk.lines[1].text, "new\r\n");
    }

    #[test]
    fn test_empty_context_line_without_space() {
        let input = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n";
        let hunk = &parse(input)[0].hunks[0];
        assert_eq!(hunk.lines[1].kind, LineKind::Context);
        assert_eq!(hunk.lines[1].text, "\n");
    }

    #[test]
    fn test_truncated_hunk_is_an_error() {
        let input = "--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n a\n";
        let result = PatchParser::new().parse_str(input, "broken.patch");
        match result {
            Err(ForgeError::PatchParse { file, .. }) => assert_eq!(file, "broken.patch"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_inside_hunk_is_an_error() {
        let input = "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n?? what\n";
        assert!(PatchParser::new().parse_str(input, "x").is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_escape_unescape_path() {
        assert_eq!(PatchParser::escape_path("simple.txt"), "simple.txt");
        assert_eq!(
            PatchParser::escape_path("path with spaces/file.txt"),
            "\"path with spaces/file.txt\""
        );
        assert_eq!(
            PatchParser::unescape_path("\"path with spaces/file.txt\""),
            "path with spaces/file.txt"
        );
        assert_eq!(PatchParser::unescape_path("simple.txt"), "simple.txt");
    }
}
