use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::io::store::{DocumentStore, StoreError, normalize_path};

/// Documents stored as plain files under a vault root
#[derive(Debug, Clone)]
pub struct FsDocuments {
    root: PathBuf,
}

impl FsDocuments {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsDocuments { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<(String, PathBuf), StoreError> {
        let rel = normalize_path(path)?;
        let full = self.root.join(&rel);
        Ok((rel, full))
    }
}

impl DocumentStore for FsDocuments {
    fn read_document(&self, path: &str) -> Result<String, StoreError> {
        let (rel, full) = self.full_path(path)?;
        fs::read_to_string(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(rel),
            _ => StoreError::Read {
                path: rel,
                source: e,
            },
        })
    }

    fn write_document(&self, path: &str, text: &str) -> Result<(), StoreError> {
        let (rel, full) = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                path: rel.clone(),
                source: e,
            })?;
        }
        atomic_write(&full, text.as_bytes()).map_err(|e| StoreError::Write {
            path: rel,
            source: e,
        })
    }

    fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        let (rel, full) = self.full_path(path)?;
        fs::remove_file(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(rel),
            _ => StoreError::Write {
                path: rel,
                source: e,
            },
        })
    }

    fn document_exists(&self, path: &str) -> bool {
        self.full_path(path).is_ok_and(|(_, full)| full.is_file())
    }

    fn list_documents(&self, folder: &str) -> Result<Vec<String>, StoreError> {
        let prefix = if folder.trim().trim_matches('/').is_empty() {
            String::new()
        } else {
            normalize_path(folder)?
        };
        let dir = self.root.join(&prefix);
        let mut out = Vec::new();
        if dir.is_dir() {
            walk(&dir, &prefix, &mut out)?;
        }
        out.sort();
        Ok(out)
    }
}

fn walk(dir: &Path, rel: &str, out: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::Read {
        path: rel.to_string(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with('.') {
            continue;
        }
        let child = if rel.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", rel, name)
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), &child, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

/// Write content to a file atomically: write to a temp file in the same
/// directory, then rename over the target.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
