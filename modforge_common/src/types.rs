use serde::{Deserialize, Serialize};

/// Kind of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File,
}

/// A single entry of a zip-structured archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Absolute path within the archive, always starting with `/`.
    /// Directories carry no trailing separator.
    pub path: String,
    pub kind: EntryKind,
    /// Entry payload. Always empty for directories.
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            data: Vec::new(),
        }
    }

    pub fn file(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            data,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Path relative to the archive root (leading `/` removed)
    pub fn relative_path(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

/// BLAKE3 digest of a tracked file's content (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    pub const LEN: usize = 32;

    pub fn of(content: &[u8]) -> Self {
        blake3::hash(content).into()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interprets raw record bytes; anything but exactly 32 bytes is not a digest.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<blake3::Hash> for ContentDigest {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}
