use std::sync::mpsc::Receiver;

use crate::model::entity::{CreatedEntity, Entity, EntityFieldChange, EntityFields, EntityKind, FieldValue};
use crate::model::scope::DocumentContext;

/// Error type for document and entity storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid vault path \"{0}\"")]
    InvalidPath(String),
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid front matter in {path}: {source}")]
    FrontMatter {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whole-file text I/O on vault-relative paths
pub trait DocumentStore {
    fn read_document(&self, path: &str) -> Result<String, StoreError>;

    /// Replace the full content of an existing or new document
    fn write_document(&self, path: &str, text: &str) -> Result<(), StoreError>;

    /// Create a document that must not exist yet
    fn create_document(&self, path: &str, initial_content: &str) -> Result<(), StoreError> {
        if self.document_exists(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        self.write_document(path, initial_content)
    }

    fn delete_document(&self, path: &str) -> Result<(), StoreError>;

    fn document_exists(&self, path: &str) -> bool;

    /// Every file below `folder` (recursive, sorted). Dot-prefixed entries
    /// are skipped. An empty folder string lists the whole vault.
    fn list_documents(&self, folder: &str) -> Result<Vec<String>, StoreError>;
}

/// Entity persistence and change notification
pub trait EntityStore {
    /// Create a new entity note named `name` in the folder for `kind`.
    /// Fields are written in the order given.
    fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        fields: &EntityFields,
    ) -> Result<CreatedEntity, StoreError>;

    fn entity(&self, id: &str) -> Result<Option<Entity>, StoreError>;

    /// Look an entity up by the bare name used in links
    fn find_entity(&self, kind: EntityKind, name: &str) -> Result<Option<Entity>, StoreError>;

    fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>, StoreError>;

    /// Bare names of every entity of `kind`, sorted. Front matter is not
    /// read, so a note with broken YAML is still listed.
    fn list_entity_names(&self, kind: EntityKind) -> Result<Vec<String>, StoreError>;

    fn set_entity_field(&self, id: &str, field: &str, value: FieldValue)
    -> Result<(), StoreError>;

    fn delete_entity(&self, id: &str) -> Result<(), StoreError>;

    /// Field-change notifications for entities of `kind`. Dropping the
    /// receiver unsubscribes.
    fn subscribe(&self, kind: EntityKind) -> Receiver<EntityFieldChange>;
}

/// Classifies the document a checklist line lives in
pub trait ContextResolver {
    fn resolve_document_context(&self, path: &str) -> DocumentContext;
}

/// Everything the engines need from the host in one bound
pub trait NoteStore: DocumentStore + EntityStore + ContextResolver {}

impl<T: DocumentStore + EntityStore + ContextResolver + ?Sized> NoteStore for T {}

/// Canonical form of a vault-relative path: forward slashes, no `.` or
/// empty components. Absolute paths and `..` are rejected.
pub fn normalize_path(path: &str) -> Result<String, StoreError> {
    let unified = path.trim().replace('\\', "/");
    // Unix roots and Windows drive letters
    if unified.starts_with('/') || unified.get(1..2) == Some(":") {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(StoreError::InvalidPath(path.to_string())),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// True when `path` lies inside `folder` (both already normalized).
/// The empty folder is the vault root and contains everything.
pub fn in_folder(path: &str, folder: &str) -> bool {
    folder.is_empty()
        || path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// File stem of a vault path: `Areas/Finance.md` → `Finance`
pub fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".md").unwrap_or(name)
}

pub fn is_markdown(path: &str) -> bool {
    path.ends_with(".md")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_relative_paths() {
        assert_eq!(normalize_path("Tasks/Buy milk.md").unwrap(), "Tasks/Buy milk.md");
        assert_eq!(normalize_path("./Tasks//a.md").unwrap(), "Tasks/a.md");
        assert_eq!(normalize_path("Areas\\Home.md").unwrap(), "Areas/Home.md");
    }

    #[test]
    fn normalize_rejects_escapes() {
        assert!(normalize_path("../outside.md").is_err());
        assert!(normalize_path("Tasks/../../x.md").is_err());
        assert!(normalize_path("/etc/passwd").is_err());
        assert!(normalize_path("C:/x.md").is_err());
        assert!(normalize_path("").is_err());
        assert!(normalize_path("./").is_err());
    }

    #[test]
    fn folder_membership() {
        assert!(in_folder("Tasks/a.md", "Tasks"));
        assert!(in_folder("Tasks/sub/a.md", "Tasks"));
        assert!(!in_folder("Tasks.md", "Tasks"));
        assert!(!in_folder("TasksOld/a.md", "Tasks"));
        assert!(in_folder("anything.md", ""));
    }

    #[test]
    fn stems() {
        assert_eq!(file_stem("Areas/Finance.md"), "Finance");
        assert_eq!(file_stem("Inbox.md"), "Inbox");
        assert_eq!(file_stem("Bases/Tasks.base"), "Tasks.base");
    }
}
