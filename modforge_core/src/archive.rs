//! Zip-structured archives viewed as a flat set of `/`-rooted entries.
//!
//! Reads go straight to the archive on disk. Writes are staged in a sibling
//! temporary archive and only replace the original when the handle is
//! closed; dropping a handle discards anything staged.

use modforge_common::{ArchiveEntry, EntryKind, ForgeError};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// End-of-central-directory record of an archive with no entries
pub const EMPTY_ARCHIVE: [u8; 22] = [
    0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

#[derive(Debug, Clone)]
struct IndexedEntry {
    /// Normalized path, `/`-prefixed, no trailing separator
    path: String,
    kind: EntryKind,
}

/// An open archive
pub struct ArchiveHandle {
    path: PathBuf,
    reader: Option<ZipArchive<File>>,
    index: Vec<IndexedEntry>,
    lookup: HashMap<String, usize>,
    /// Paths present once staged writes are committed
    present: BTreeSet<String>,
    staged: Option<ZipWriter<NamedTempFile>>,
}

impl ArchiveHandle {
    /// Open the archive at `path`.
    ///
    /// With `create_if_missing`, a valid zero-entry archive is written first
    /// when no file exists there.
    pub fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self, ForgeError> {
        let path = path.as_ref();
        if !path.is_file() {
            if !create_if_missing {
                return Err(ForgeError::NotFound(path.to_path_buf()));
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, EMPTY_ARCHIVE)?;
            debug!("Created empty archive at {}", path.display());
        }

        let file = File::open(path).map_err(|e| ForgeError::io_at(path, e))?;
        let mut reader = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;

        let mut index = Vec::with_capacity(reader.len());
        for i in 0..reader.len() {
            let file = reader.by_index_raw(i).map_err(|e| zip_error(path, e))?;
            let kind = if file.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            index.push(IndexedEntry {
                path: normalize(file.name()),
                kind,
            });
        }

        let lookup = index
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.path.clone(), i))
            .collect();
        let present = index.iter().map(|entry| entry.path.clone()).collect();

        debug!("Opened {} ({} entries)", path.display(), index.len());
        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            index,
            lookup,
            present,
            staged: None,
        })
    }

    /// Start a new, empty archive that replaces whatever is at `path` on close.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let path = path.as_ref().to_path_buf();
        let mut handle = Self {
            path,
            reader: None,
            index: Vec::new(),
            lookup: HashMap::new(),
            present: BTreeSet::new(),
            staged: None,
        };
        handle.staged = Some(handle.start_staging()?);
        Ok(handle)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries recorded in the archive as opened
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether an entry exists at `path`, counting staged writes
    pub fn contains(&self, path: &str) -> bool {
        self.present.contains(&normalize(path))
    }

    /// Regular-file paths in archive order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.index
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.path.as_str())
    }

    /// Explicitly recorded entries, without payloads
    pub fn entries(&self) -> impl Iterator<Item = (&str, EntryKind)> {
        self.index.iter().map(|e| (e.path.as_str(), e.kind))
    }

    /// Lazily walk every entry: recorded entries in archive order, then
    /// directories that only exist because they have children.
    pub fn walk(&mut self) -> Walk<'_> {
        let explicit: BTreeSet<&str> = self
            .index
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .map(|e| e.path.as_str())
            .collect();
        let implied: BTreeSet<String> = self
            .index
            .iter()
            .flat_map(|e| ancestors(&e.path))
            .filter(|dir| !explicit.contains(dir.as_str()))
            .collect();

        Walk {
            handle: self,
            next: 0,
            implied: implied.into_iter().collect::<Vec<_>>().into_iter(),
        }
    }

    /// Read the payload of the regular file at `path`.
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>, ForgeError> {
        let normalized = normalize(path);
        let idx = *self
            .lookup
            .get(&normalized)
            .ok_or_else(|| ForgeError::NotFound(PathBuf::from(&normalized)))?;
        if self.index[idx].kind == EntryKind::Directory {
            return Err(ForgeError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("{normalized} is a directory"),
            )));
        }
        self.read_index(idx).map(|entry| entry.data)
    }

    /// Add directory entries for `path` and all of its ancestors that are
    /// not present yet.
    pub fn create_dir_all(&mut self, path: &str) -> Result<(), ForgeError> {
        let normalized = normalize(path);
        let mut dirs = ancestors(&normalized);
        if normalized != "/" {
            dirs.push(normalized);
        }
        for dir in dirs {
            if self.present.contains(&dir) {
                continue;
            }
            let name = format!("{}/", dir.trim_start_matches('/'));
            let archive = self.path.clone();
            self.writer()?
                .add_directory(name, FileOptions::default())
                .map_err(|e| zip_error(&archive, e))?;
            self.present.insert(dir);
        }
        Ok(())
    }

    /// Write a new regular file. Fails if an entry already exists at `path`.
    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<(), ForgeError> {
        let normalized = normalize(path);
        self.ensure_absent(&normalized)?;
        self.create_parent_dirs(&normalized)?;

        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let archive = self.path.clone();
        let writer = self.writer()?;
        writer
            .start_file(normalized.trim_start_matches('/'), options)
            .map_err(|e| zip_error(&archive, e))?;
        writer.write_all(data)?;
        self.present.insert(normalized);
        Ok(())
    }

    /// Copy the entry at `path` from `source` without recompressing it.
    ///
    /// Regular files must not exist yet in this archive; directories that
    /// already exist are left alone.
    pub fn copy_raw_from(&mut self, source: &mut ArchiveHandle, path: &str) -> Result<(), ForgeError> {
        let normalized = normalize(path);
        let idx = *source
            .lookup
            .get(&normalized)
            .ok_or_else(|| ForgeError::NotFound(PathBuf::from(&normalized)))?;
        if source.index[idx].kind == EntryKind::Directory && self.present.contains(&normalized) {
            return Ok(());
        }
        self.ensure_absent(&normalized)?;
        self.create_parent_dirs(&normalized)?;

        let source_path = source.path.clone();
        let reader = source
            .reader
            .as_mut()
            .ok_or_else(|| ForgeError::NotFound(PathBuf::from(&normalized)))?;
        let file = reader
            .by_index_raw(idx)
            .map_err(|e| zip_error(&source_path, e))?;
        let archive = self.path.clone();
        self.writer()?
            .raw_copy_file(file)
            .map_err(|e| zip_error(&archive, e))?;
        self.present.insert(normalized);
        Ok(())
    }

    /// Commit staged writes and release the archive.
    pub fn close(mut self) -> Result<(), ForgeError> {
        // The original must not be held open while it is being replaced.
        self.reader = None;
        if let Some(mut writer) = self.staged.take() {
            let temp = writer.finish().map_err(|e| zip_error(&self.path, e))?;
            temp.as_file().sync_all()?;
            temp.persist(&self.path).map_err(|e| ForgeError::Io(e.error))?;
            debug!("Committed {} ({} entries)", self.path.display(), self.present.len());
        }
        Ok(())
    }

    fn read_index(&mut self, idx: usize) -> Result<ArchiveEntry, ForgeError> {
        let entry = self.index[idx].clone();
        if entry.kind == EntryKind::Directory {
            return Ok(ArchiveEntry::directory(entry.path));
        }
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ForgeError::NotFound(PathBuf::from(&entry.path)))?;
        let mut file = reader.by_index(idx).map_err(|e| zip_error(&self.path, e))?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(ArchiveEntry::file(entry.path, data))
    }

    fn ensure_absent(&self, normalized: &str) -> Result<(), ForgeError> {
        if self.present.contains(normalized) {
            return Err(ForgeError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already contains {normalized}", self.path.display()),
            )));
        }
        Ok(())
    }

    fn create_parent_dirs(&mut self, normalized: &str) -> Result<(), ForgeError> {
        match normalized.rfind('/') {
            Some(pos) if pos > 0 => self.create_dir_all(&normalized[..pos]),
            _ => Ok(()),
        }
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<NamedTempFile>, ForgeError> {
        if self.staged.is_none() {
            let writer = self.start_staging()?;
            self.staged = Some(writer);
        }
        self.staged.as_mut().ok_or_else(|| {
            ForgeError::Io(io::Error::new(io::ErrorKind::Other, "archive writer unavailable"))
        })
    }

    /// New temp archive next to the target, pre-filled with the current entries.
    fn start_staging(&mut self) -> Result<ZipWriter<NamedTempFile>, ForgeError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let mut writer = ZipWriter::new(NamedTempFile::new_in(&parent)?);
        if let Some(reader) = self.reader.as_mut() {
            for i in 0..reader.len() {
                let file = reader.by_index_raw(i).map_err(|e| zip_error(&self.path, e))?;
                writer.raw_copy_file(file).map_err(|e| zip_error(&self.path, e))?;
            }
        }
        Ok(writer)
    }
}

/// Lazy iterator over the entries of an [`ArchiveHandle`]
pub struct Walk<'a> {
    handle: &'a mut ArchiveHandle,
    next: usize,
    implied: std::vec::IntoIter<String>,
}

impl Iterator for Walk<'_> {
    type Item = Result<ArchiveEntry, ForgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next < self.handle.index.len() {
            let idx = self.next;
            self.next += 1;
            return Some(self.handle.read_index(idx));
        }
        self.implied.next().map(|dir| Ok(ArchiveEntry::directory(dir)))
    }
}

/// `a/b/` → `/a/b`
fn normalize(name: &str) -> String {
    let trimmed = name.trim_matches('/');
    format!("/{trimmed}")
}

/// Proper ancestors of a normalized path, outermost first (`/a/b/c` → `/a`, `/a/b`)
fn ancestors(path: &str) -> Vec<String> {
    path.match_indices('/')
        .map(|(pos, _)| pos)
        .filter(|&pos| pos > 0)
        .map(|pos| path[..pos].to_string())
        .collect()
}

fn zip_error(path: &Path, err: ZipError) -> ForgeError {
    match err {
        ZipError::Io(e) => ForgeError::Io(e),
        ZipError::FileNotFound => ForgeError::NotFound(path.to_path_buf()),
        other => ForgeError::MalformedArchive {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}
