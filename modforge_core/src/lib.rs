pub mod archive;
pub mod checksum;
pub mod differ;
pub mod filter_copy;
pub mod glob;
pub mod patch_parser;
pub mod patch_serializer;
pub mod patcher;
pub mod tree;

pub use archive::{ArchiveHandle, EMPTY_ARCHIVE};
pub use checksum::{default_record_path, is_unchanged, ChecksumGate};
pub use differ::{diff_trees, DiffOptions, DiffReport, Differ};
pub use filter_copy::{
    copy_archive, copy_archive_fresh, extract, extract_archive, filter_copy, strip, CopyReport,
};
pub use glob::{glob_to_regex, FilterSet, GlobMatcher};
pub use patch_parser::PatchParser;
pub use patch_serializer::PatchSerializer;
pub use patcher::{apply_patches, PatchOptions, PatchReport, Patcher};
