//! Digest-record gate deciding whether downstream output must be rebuilt.

use crate::tree::write_atomic;
use modforge_common::{ContentDigest, ForgeError};
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension of the default record file next to tracked content
pub const RECORD_EXTENSION: &str = "blake3";

/// Compares a file's BLAKE3 digest against a persisted record.
///
/// The record is the 32 raw digest bytes and nothing else. It is replaced
/// through a temporary file and a rename, so a crash never leaves a partial
/// record that could compare equal.
pub struct ChecksumGate {
    buffer_size: usize,
}

impl ChecksumGate {
    pub fn new() -> Self {
        Self {
            buffer_size: 64 * 1024,
        }
    }

    /// Digest the full contents of `path`.
    pub fn digest_file(&self, path: &Path) -> Result<ContentDigest, ForgeError> {
        let mut file = File::open(path).map_err(|e| ForgeError::io_at(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; self.buffer_size];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize().into())
    }

    /// Stored digest at `record`, or `None` if absent or not a valid record.
    pub fn read_record(&self, record: &Path) -> Option<ContentDigest> {
        match fs::read(record) {
            Ok(bytes) => {
                let digest = ContentDigest::from_slice(&bytes);
                if digest.is_none() {
                    warn!(
                        "Ignoring checksum record {} of {} bytes",
                        record.display(),
                        bytes.len()
                    );
                }
                digest
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cannot read checksum record {}: {}", record.display(), e);
                None
            }
        }
    }

    /// Digest `content` and persist it at `record`.
    pub fn record(&self, content: &Path, record: &Path) -> Result<ContentDigest, ForgeError> {
        let digest = self.digest_file(content)?;
        write_atomic(record, digest.as_bytes())?;
        debug!("Recorded {} for {}", digest.to_hex(), content.display());
        Ok(digest)
    }

    /// True only if `record` exists and holds the current digest of `content`.
    ///
    /// Any other outcome returns false and refreshes the record, so an
    /// immediate second call on untouched content returns true. If `content`
    /// cannot be read the record is removed instead.
    pub fn is_unchanged(&self, content: &Path, record: &Path) -> Result<bool, ForgeError> {
        let current = match self.digest_file(content) {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Cannot digest {}: {}", content.display(), e);
                match fs::remove_file(record) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(ForgeError::io_at(record, e)),
                }
                return Ok(false);
            }
        };

        if self.read_record(record) == Some(current) {
            debug!("{} unchanged ({})", content.display(), current.to_hex());
            return Ok(true);
        }

        write_atomic(record, current.as_bytes())?;
        info!(
            "{} changed; record {} now {}",
            content.display(),
            record.display(),
            current.to_hex()
        );
        Ok(false)
    }

    /// Gate several (content, record) pairs at once. Every pair is checked,
    /// so all records are refreshed even after the first change is seen.
    pub fn all_unchanged<C, R>(&self, pairs: &[(C, R)]) -> Result<bool, ForgeError>
    where
        C: AsRef<Path>,
        R: AsRef<Path>,
    {
        let mut unchanged = true;
        for (content, record) in pairs {
            unchanged &= self.is_unchanged(content.as_ref(), record.as_ref())?;
        }
        Ok(unchanged)
    }
}

impl Default for ChecksumGate {
    fn default() -> Self {
        Self::new()
    }
}

/// `<content>.blake3`, the record path used when none is given.
pub fn default_record_path(content: &Path) -> PathBuf {
    let mut name = content.as_os_str().to_os_string();
    name.push(".");
    name.push(RECORD_EXTENSION);
    PathBuf::from(name)
}

/// Check `content` against `record`, refreshing the record on any mismatch.
pub fn is_unchanged(content: &Path, record: &Path) -> Result<bool, ForgeError> {
    ChecksumGate::new().is_unchanged(content, record)
}
