//! Plain directory tree helpers shared by extraction, diffing and patching.

use jwalk::WalkDir;
use modforge_common::ForgeError;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Relative, `/`-separated paths of every regular file under `root`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<String>, ForgeError> {
    if !root.is_dir() {
        return Err(ForgeError::NotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort(true).skip_hidden(false) {
        let entry = entry.map_err(|e| {
            ForgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Walk error: {}", e),
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| ForgeError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        files.push(to_slash_path(relative));
    }

    files.sort();
    debug!("Listed {} files under {:?}", files.len(), root);
    Ok(files)
}

/// Join path components with `/`, independent of the host separator.
pub fn to_slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a `/`-separated relative path under `root`, refusing anything that
/// would land outside it.
pub fn resolve_relative(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for part in relative.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ if part.contains('\\') || part.contains(':') => return None,
            _ => {
                out.push(part);
                pushed = true;
            }
        }
    }
    pushed.then_some(out)
}

/// Remove everything inside `dir`, creating it if it does not exist.
pub fn clear_dir(dir: &Path) -> Result<(), ForgeError> {
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Fail with [`ForgeError::Config`] if `dir` is, contains or lies inside any
/// of `protected`, so clearing `dir` can never touch them.
pub fn ensure_disjoint(dir: &Path, protected: &[&Path]) -> Result<(), ForgeError> {
    let target = canonical(dir)?;
    for other in protected {
        let other_path = canonical(other)?;
        if other_path.starts_with(&target) || target.starts_with(&other_path) {
            return Err(ForgeError::Config(format!(
                "{} overlaps {}; refusing to clear it",
                dir.display(),
                other.display()
            )));
        }
    }
    Ok(())
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
fn canonical(path: &Path) -> Result<PathBuf, ForgeError> {
    let mut existing = path;
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => break,
        }
    }
    let mut resolved = if existing.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        fs::canonicalize(existing).map_err(|e| ForgeError::io_at(existing, e))?
    };
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Copy every regular file under `from` to the same relative path under `to`.
/// Returns the relative paths copied.
pub fn copy_tree(from: &Path, to: &Path) -> Result<Vec<String>, ForgeError> {
    let files = list_files(from)?;
    for relative in &files {
        let src = from.join(relative);
        let dest = to.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, &dest)?;
    }
    Ok(files)
}

/// Write `data` to `path` through a sibling temporary file and a rename, so
/// readers never observe a half-written file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ForgeError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| ForgeError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_list_files_sorted_and_relative() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b/z.txt", "z");
        write(temp.path(), "a/y.txt", "y");
        write(temp.path(), "a/b/x.txt", "x");
        write(temp.path(), ".hidden", "h");
        fs::create_dir_all(temp.path().join("empty")).unwrap();

        let files = list_files(temp.path()).unwrap();
        assert_eq!(files, vec![".hidden", "a/b/x.txt", "a/y.txt", "b/z.txt"]);
    }

    #[test]
    fn test_list_files_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = list_files(&temp.path().join("nope"));
        assert!(matches!(result, Err(ForgeError::NotFound(_))));
    }

    #[test]
    fn test_resolve_relative_rejects_escape() {
        let root = Path::new("/work");
        assert_eq!(
            resolve_relative(root, "a/b.txt"),
            Some(PathBuf::from("/work/a/b.txt"))
        );
        assert_eq!(resolve_relative(root, "../etc/passwd"), None);
        assert_eq!(resolve_relative(root, "a/../../x"), None);
        assert_eq!(resolve_relative(root, ""), None);
    }

    #[test]
    fn test_ensure_disjoint() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "work/base/Foo.src", "x");
        let work = temp.path().join("work");
        let base = work.join("base");

        assert!(matches!(
            ensure_disjoint(&work, &[&base]),
            Err(ForgeError::Config(_))
        ));
        assert!(ensure_disjoint(&base, &[&base]).is_err());
        assert!(ensure_disjoint(&base.join("not/yet"), &[&base]).is_err());
        assert!(ensure_disjoint(&work.join("out"), &[&base]).is_ok());
        // sibling sharing a name prefix
        assert!(ensure_disjoint(&work.join("base2"), &[&base]).is_ok());
    }

    #[test]
    fn test_clear_dir_removes_contents_and_creates() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "out/stale/file.txt", "old");
        write(temp.path(), "out/top.txt", "old");

        let out = temp.path().join("out");
        clear_dir(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);

        let fresh = temp.path().join("fresh/nested");
        clear_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
    }

    #[test]
    fn test_copy_tree() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("from");
        write(&from, "a/one.txt", "1");
        write(&from, "two.txt", "2");

        let to = temp.path().join("to");
        let copied = copy_tree(&from, &to).unwrap();
        assert_eq!(copied.len(), 2);
        assert_eq!(fs::read_to_string(to.join("a/one.txt")).unwrap(), "1");
        assert_eq!(fs::read_to_string(to.join("two.txt")).unwrap(), "2");
    }

    #[test]
    fn test_write_atomic_replaces() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("record.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        // no temp files left behind
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
