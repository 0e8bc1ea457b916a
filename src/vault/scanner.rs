use crate::fs::{extension_of, EntryKind, FileSystem};
use crate::models::{FileDescriptor, FolderDescriptor, VaultCatalogue};
use std::path::Path;

/// Walks `root` depth-first and catalogues every visible folder and file.
///
/// A directory that cannot be read (the root included) is logged and
/// contributes nothing; the rest of the tree is still catalogued. Entries whose
/// name starts with `.` are skipped together with everything below them.
pub fn scan(fs: &dyn FileSystem, root: &Path) -> VaultCatalogue {
    tracing::info!(root = %root.to_string_lossy(), "starting vault scan");
    let mut catalogue = VaultCatalogue::default();
    scan_dir(fs, root, "", &mut catalogue);
    tracing::info!(
        folders = catalogue.folders.len(),
        files = catalogue.files.len(),
        "vault scan complete"
    );
    catalogue
}

fn scan_dir(fs: &dyn FileSystem, dir: &Path, prefix: &str, catalogue: &mut VaultCatalogue) {
    let entries = match fs.read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(path = %dir.to_string_lossy(), error = %error, "could not scan directory");
            return;
        }
    };

    for entry in entries {
        if entry.name.starts_with('.') {
            continue;
        }
        let filepath = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", prefix, entry.name)
        };

        match entry.kind {
            EntryKind::Directory => {
                catalogue.folders.push(FolderDescriptor {
                    name: entry.name.clone(),
                    filepath: filepath.clone(),
                });
                scan_dir(fs, &dir.join(&entry.name), &filepath, catalogue);
            }
            EntryKind::File => {
                catalogue.files.push(FileDescriptor {
                    filetype: extension_of(&entry.name),
                    name: entry.name,
                    filepath,
                });
            }
            EntryKind::Other => {}
        }
    }
}
