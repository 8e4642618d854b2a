use crate::patch_parser::{PatchParser, NO_NEWLINE_MARKER};
use modforge_common::{FilePatch, Hunk, HunkLine};

/// Serializer that writes the unified diff text for a patch model.
///
/// This is the inverse of [`PatchParser::parse_str`]: the output parses back
/// to the same `FilePatch` values, including lines that lack a trailing
/// newline and lines ending in `\r\n`.
pub struct PatchSerializer;

impl PatchSerializer {
    /// Serialize several file patches back to back.
    pub fn serialize(patches: &[FilePatch]) -> String {
        let mut output = String::new();
        for fp in patches {
            output.push_str(&Self::serialize_file_patch(fp));
        }
        output
    }

    /// Serialize a single FilePatch to unified diff text.
    pub fn serialize_file_patch(fp: &FilePatch) -> String {
        let mut output = String::new();

        output.push_str(&format!("--- {}\n", PatchParser::escape_path(&fp.source)));
        output.push_str(&format!("+++ {}\n", PatchParser::escape_path(&fp.destination)));

        for hunk in &fp.hunks {
            output.push_str(&Self::serialize_hunk(hunk));
        }

        output
    }

    fn serialize_hunk(hunk: &Hunk) -> String {
        let mut output = format!(
            "@@ -{},{} +{},{} @@\n",
            hunk.source_start, hunk.source_count, hunk.dest_start, hunk.dest_count
        );
        for line in &hunk.lines {
            push_line(&mut output, line);
        }
        output
    }
}

fn push_line(output: &mut String, line: &HunkLine) {
    output.push(line.kind.prefix());
    output.push_str(strip_trailing_newline(&line.text));
    output.push('\n');
    if !line.has_newline() {
        output.push_str(NO_NEWLINE_MARKER);
        output.push('\n');
    }
}

fn strip_trailing_newline(s: &str) -> &str {
    s.strip_suffix('\n').unwrap_or(s)
}
