use crate::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Other,
}

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
}

/// Raw file primitives the vault is built on. Each call either completes or
/// fails with the OS error; there is no partial-write recovery.
pub trait FileSystem: Send + Sync {
    /// Entries of `dir` in name order. Entries that cannot be read are left
    /// out and entries whose metadata cannot be read are reported with
    /// `EntryKind::Other`; either way their siblings are still listed.
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>>;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn read_dir(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(dir = %dir.to_string_lossy(), error = %error, "skipping unreadable directory entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            // Follows symlinks, like stat(2).
            let kind = match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_dir() => EntryKind::Directory,
                Ok(meta) if meta.is_file() => EntryKind::File,
                Ok(_) => EntryKind::Other,
                Err(error) => {
                    tracing::warn!(
                        path = %entry.path().to_string_lossy(),
                        error = %error,
                        "could not stat directory entry"
                    );
                    EntryKind::Other
                }
            };
            entries.push(DirEntryInfo { name, kind });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        fs::write(path, content)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub fn write_json_file<T: serde::Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|error| AppError::Internal(error.to_string()))?;
    fs::write(path, bytes).map_err(|error| AppError::Io(error.to_string()))
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|error| {
        AppError::InvalidData(format!("{}: {}", path.to_string_lossy(), error))
    })
}

/// Joins a vault-relative path onto `root`. Absolute paths and `..`
/// components are refused; the caller is the untrusted UI process.
pub fn resolve_relative(root: &Path, relative: &str) -> AppResult<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(AppError::Policy(format!(
                    "Path escapes the vault: {}",
                    relative
                )))
            }
            _ if segment.contains(':') => {
                return Err(AppError::Policy(format!("Invalid path segment: {}", segment)))
            }
            _ => resolved.push(segment),
        }
    }
    if relative.starts_with('/') || relative.starts_with('\\') {
        return Err(AppError::Policy(format!("Expected a vault-relative path: {}", relative)));
    }
    Ok(resolved)
}

/// `name` without its final extension (`"notes.md"` -> `"notes"`).
pub fn base_name(path: &str) -> &str {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(index) if index > 0 => &file_name[..index],
        _ => file_name,
    }
}

/// Final dot-delimited suffix including the dot, `""` when there is none.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(index) if index > 0 => name[index..].to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_rejects_escapes() {
        let root = Path::new("/vault");
        assert_eq!(
            resolve_relative(root, "School/week1.md").expect("resolved"),
            PathBuf::from("/vault/School/week1.md")
        );
        assert_eq!(
            resolve_relative(root, "School\\week1.md").expect("resolved"),
            PathBuf::from("/vault/School/week1.md")
        );
        assert_eq!(resolve_relative(root, "").expect("root"), PathBuf::from("/vault"));
        assert!(resolve_relative(root, "../etc/passwd").is_err());
        assert!(resolve_relative(root, "/etc/passwd").is_err());
        assert!(resolve_relative(root, "C:/Windows").is_err());
    }

    #[test]
    fn extension_and_base_name_follow_last_dot() {
        assert_eq!(extension_of("notes.md"), ".md");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".env"), "");
        assert_eq!(base_name("School/lecture.notes.md"), "lecture.notes");
        assert_eq!(base_name("plain"), "plain");
    }

    #[cfg(unix)]
    #[test]
    fn broken_entry_does_not_hide_its_siblings() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("a.md"), "a").expect("a");
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("b.md")).expect("dangling link");
        fs::write(dir.path().join("c.md"), "c").expect("c");

        let entries = LocalFileSystem.read_dir(dir.path()).expect("listing");
        let kinds: Vec<(String, EntryKind)> = entries.into_iter().map(|entry| (entry.name, entry.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a.md".to_string(), EntryKind::File),
                ("b.md".to_string(), EntryKind::Other),
                ("c.md".to_string(), EntryKind::File),
            ]
        );
    }

    #[test]
    fn json_helpers_roundtrip_pretty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested/data.json");
        write_json_file(&path, &serde_json::json!({"a": [1, 2]})).expect("write");
        let raw = fs::read_to_string(&path).expect("raw");
        assert!(raw.contains('\n'));
        let value: serde_json::Value = read_json_file(&path).expect("read");
        assert_eq!(value["a"][1], 2);
    }
}
