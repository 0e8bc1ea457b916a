pub mod scanner;

use crate::errors::{AppError, AppResult};
use crate::fs::{resolve_relative, FileSystem};
use crate::models::{NoteExtension, VaultCatalogue};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const VAULT_DIR_NAME: &str = "Notes";

/// Mutating and reading operations on the note vault.
///
/// The vault keeps no catalogue of its own: after a successful mutation the
/// caller runs [`Vault::scan`] again to see it.
#[derive(Clone)]
pub struct Vault {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl Vault {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self { root, fs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> AppResult<()> {
        self.fs.create_dir_all(&self.root).map_err(AppError::from)
    }

    pub fn scan(&self) -> VaultCatalogue {
        scanner::scan(self.fs.as_ref(), &self.root)
    }

    pub fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        resolve_relative(&self.root, relative)
    }

    /// Vault-relative, `/`-separated form of an absolute path inside the vault.
    pub fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn read_file(&self, relative: &str) -> AppResult<String> {
        let path = self.resolve(relative)?;
        self.fs
            .read_to_string(&path)
            .map_err(|error| AppError::from(error).context("read file"))
    }

    pub fn write_file(&self, relative: &str, content: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        require_non_root(&path, &self.root, relative)?;
        self.fs
            .write(&path, content)
            .map_err(|error| AppError::from(error).context("write file"))
    }

    /// Creates an empty note. The existence check is advisory: creation is a
    /// plain write, so a file appearing in between is overwritten.
    pub fn create_note(&self, folder: &str, name: &str, extension: NoteExtension) -> AppResult<String> {
        let name = validate_segment(name)?;
        let file_name = if name.ends_with(extension.as_str()) {
            name.to_string()
        } else {
            format!("{}{}", name, extension.as_str())
        };
        let dir = self.resolve(folder)?;
        let path = dir.join(&file_name);
        if self.fs.exists(&path) {
            return Err(AppError::Conflict(format!(
                "create note: {} already exists",
                self.relative_path(&path)
            )));
        }
        self.fs
            .write(&path, "")
            .map_err(|error| AppError::from(error).context("create note"))?;
        tracing::info!(path = %path.to_string_lossy(), "created note");
        Ok(self.relative_path(&path))
    }

    /// Recursive; an existing folder is not an error.
    pub fn create_folder(&self, name: &str) -> AppResult<String> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidData("Folder name cannot be empty".to_string()));
        }
        reject_hidden(name)?;
        let path = self.resolve(name)?;
        self.fs
            .create_dir_all(&path)
            .map_err(|error| AppError::from(error).context("create folder"))?;
        Ok(self.relative_path(&path))
    }

    pub fn rename_item(&self, old_path: &str, new_path: &str) -> AppResult<String> {
        let from = self.resolve(old_path)?;
        let to = self.resolve(new_path)?;
        require_non_root(&from, &self.root, old_path)?;
        require_non_root(&to, &self.root, new_path)?;
        reject_hidden(new_path)?;
        if !self.fs.exists(&from) {
            return Err(AppError::NotFound(format!("rename item: {} does not exist", old_path)));
        }
        if self.fs.exists(&to) {
            return Err(AppError::Conflict(format!("rename item: {} already exists", new_path)));
        }
        self.fs
            .rename(&from, &to)
            .map_err(|error| AppError::from(error).context("rename item"))?;
        tracing::info!(from = %old_path, to = %new_path, "renamed vault item");
        Ok(self.relative_path(&to))
    }

    pub fn delete_file(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        require_non_root(&path, &self.root, relative)?;
        self.fs
            .remove_file(&path)
            .map_err(|error| AppError::from(error).context("delete file"))?;
        tracing::info!(path = %relative, "deleted file");
        Ok(())
    }

    /// Removes the folder and everything below it. Irreversible; callers are
    /// expected to have confirmed with the user already.
    pub fn delete_folder(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        require_non_root(&path, &self.root, relative)?;
        self.fs
            .remove_dir_all(&path)
            .map_err(|error| AppError::from(error).context("delete folder"))?;
        tracing::info!(path = %relative, "deleted folder recursively");
        Ok(())
    }
}

fn validate_segment(name: &str) -> AppResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidData("Name cannot be empty".to_string()));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(AppError::InvalidData(format!("Invalid name: {}", name)));
    }
    reject_hidden(trimmed)?;
    Ok(trimmed)
}

/// Scans skip dot-entries, so nothing may be created under such a name.
fn reject_hidden(relative: &str) -> AppResult<()> {
    let hidden = relative.split(['/', '\\']).map(str::trim).any(|segment| {
        segment.starts_with('.') && segment != "." && segment != ".."
    });
    if hidden {
        return Err(AppError::InvalidData(format!(
            "Names starting with '.' are hidden from the vault: {}",
            relative
        )));
    }
    Ok(())
}

fn require_non_root(path: &Path, root: &Path, relative: &str) -> AppResult<()> {
    if path == root {
        return Err(AppError::Policy(format!(
            "Operation not allowed on the vault root: '{}'",
            relative
        )));
    }
    Ok(())
}
