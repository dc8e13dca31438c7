use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::io::store::{DocumentStore, StoreError, in_folder, normalize_path};

/// Documents held in memory, keyed by normalized vault path.
///
/// Used by tests and by callers embedding the engines without a disk. Writes
/// to paths registered with [`MemoryDocuments::fail_writes`] error out, which
/// lets rollback paths be exercised.
#[derive(Debug, Default)]
pub struct MemoryDocuments {
    files: Mutex<BTreeMap<String, String>>,
    failing: Mutex<BTreeSet<String>>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a vault from `(path, content)` pairs
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let docs = Self::new();
        {
            let mut map = docs.files();
            for (path, content) in files {
                if let Ok(path) = normalize_path(path) {
                    map.insert(path, content.to_string());
                }
            }
        }
        docs
    }

    /// Make every later write or delete of `path` fail
    pub fn fail_writes(&self, path: &str) {
        if let Ok(path) = normalize_path(path) {
            lock(&self.failing).insert(path);
        }
    }

    /// Undo [`MemoryDocuments::fail_writes`]
    pub fn allow_writes(&self, path: &str) {
        if let Ok(path) = normalize_path(path) {
            lock(&self.failing).remove(&path);
        }
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        lock(&self.files)
    }

    fn check_writable(&self, path: &str) -> Result<(), StoreError> {
        if lock(&self.failing).contains(path) {
            return Err(StoreError::Write {
                path: path.to_string(),
                source: std::io::Error::other("write rejected"),
            });
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DocumentStore for MemoryDocuments {
    fn read_document(&self, path: &str) -> Result<String, StoreError> {
        let path = normalize_path(path)?;
        self.files()
            .get(&path)
            .cloned()
            .ok_or(StoreError::NotFound(path))
    }

    fn write_document(&self, path: &str, text: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        self.check_writable(&path)?;
        self.files().insert(path, text.to_string());
        Ok(())
    }

    fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path)?;
        self.check_writable(&path)?;
        match self.files().remove(&path) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(path)),
        }
    }

    fn document_exists(&self, path: &str) -> bool {
        normalize_path(path).is_ok_and(|p| self.files().contains_key(&p))
    }

    fn list_documents(&self, folder: &str) -> Result<Vec<String>, StoreError> {
        let folder = if folder.trim().trim_matches('/').is_empty() {
            String::new()
        } else {
            normalize_path(folder)?
        };
        Ok(self
            .files()
            .keys()
            .filter(|p| in_folder(p, &folder))
            .filter(|p| !p.split('/').any(|part| part.starts_with('.')))
            .cloned()
            .collect())
    }
}
