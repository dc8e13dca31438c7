use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use serde_yaml::Mapping;

use crate::io::fs_store::FsDocuments;
use crate::io::memory_store::MemoryDocuments;
use crate::io::store::{
    ContextResolver, DocumentStore, EntityStore, StoreError, file_stem, in_folder, is_markdown,
    normalize_path,
};
use crate::model::config::{FolderSettings, Settings, normalize_folder};
use crate::model::entity::{
    CreatedEntity, Entity, EntityFieldChange, EntityFields, EntityKind, FieldValue,
};
use crate::model::scope::DocumentContext;
use crate::parse::front_matter::{
    fields_from_mapping, parse_front_matter, render_front_matter, set_field,
};

/// A vault of markdown notes: free-form documents plus task, project and
/// area entities kept as notes with YAML front matter in their folders.
pub struct Vault<D> {
    docs: D,
    folders: FolderSettings,
    subscribers: Mutex<Vec<(EntityKind, Sender<EntityFieldChange>)>>,
}

impl Vault<FsDocuments> {
    /// Vault backed by the directory at `root`
    pub fn open(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Vault::new(FsDocuments::new(root), settings)
    }
}

impl Vault<MemoryDocuments> {
    pub fn in_memory(settings: &Settings) -> Self {
        Vault::new(MemoryDocuments::new(), settings)
    }
}

impl<D: DocumentStore> Vault<D> {
    pub fn new(docs: D, settings: &Settings) -> Self {
        let f = &settings.folders;
        Vault {
            docs,
            folders: FolderSettings {
                tasks: normalize_folder(&f.tasks),
                areas: normalize_folder(&f.areas),
                projects: normalize_folder(&f.projects),
                bases: normalize_folder(&f.bases),
            },
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The underlying document backend
    pub fn documents(&self) -> &D {
        &self.docs
    }

    pub fn folder(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Task => &self.folders.tasks,
            EntityKind::Project => &self.folders.projects,
            EntityKind::Area => &self.folders.areas,
        }
    }

    /// Entity kind a note path belongs to. Nested folders resolve to the
    /// most specific match.
    pub fn kind_of(&self, path: &str) -> Option<EntityKind> {
        let path = normalize_path(path).ok()?;
        if !is_markdown(&path) {
            return None;
        }
        [EntityKind::Task, EntityKind::Project, EntityKind::Area]
            .into_iter()
            .filter(|k| in_folder(&path, self.folder(*k)))
            .max_by_key(|k| self.folder(*k).len())
    }

    fn entity_path(&self, kind: EntityKind, name: &str) -> Result<String, StoreError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StoreError::InvalidPath(name.to_string()));
        }
        let folder = self.folder(kind);
        let path = if folder.is_empty() {
            format!("{}.md", name)
        } else {
            format!("{}/{}.md", folder, name)
        };
        normalize_path(&path)
    }

    fn read_note(&self, id: &str) -> Result<(Mapping, String), StoreError> {
        let text = self.docs.read_document(id)?;
        parse_front_matter(&text).map_err(|e| StoreError::FrontMatter {
            path: id.to_string(),
            source: e,
        })
    }

    fn write_note(&self, id: &str, mapping: &Mapping, body: &str) -> Result<(), StoreError> {
        let text = render_front_matter(mapping, body).map_err(|e| StoreError::FrontMatter {
            path: id.to_string(),
            source: e,
        })?;
        self.docs.write_document(id, &text)
    }

    fn load(&self, id: &str, kind: EntityKind) -> Result<Entity, StoreError> {
        let (mapping, _) = self.read_note(id)?;
        Ok(Entity {
            id: id.to_string(),
            name: file_stem(id).to_string(),
            kind,
            fields: fields_from_mapping(&mapping),
        })
    }

    fn notify(&self, change: EntityFieldChange) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Dropped receivers unsubscribe
        subscribers.retain(|(kind, tx)| *kind != change.kind || tx.send(change.clone()).is_ok());
    }
}

impl<D: DocumentStore> DocumentStore for Vault<D> {
    fn read_document(&self, path: &str) -> Result<String, StoreError> {
        self.docs.read_document(path)
    }

    fn write_document(&self, path: &str, text: &str) -> Result<(), StoreError> {
        self.docs.write_document(path, text)
    }

    fn create_document(&self, path: &str, initial_content: &str) -> Result<(), StoreError> {
        self.docs.create_document(path, initial_content)
    }

    fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        self.docs.delete_document(path)
    }

    fn document_exists(&self, path: &str) -> bool {
        self.docs.document_exists(path)
    }

    fn list_documents(&self, folder: &str) -> Result<Vec<String>, StoreError> {
        self.docs.list_documents(folder)
    }
}

impl<D: DocumentStore> EntityStore for Vault<D> {
    fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        fields: &EntityFields,
    ) -> Result<CreatedEntity, StoreError> {
        let path = self.entity_path(kind, name)?;
        let mut mapping = Mapping::new();
        for (key, value) in fields {
            set_field(&mut mapping, key, value);
        }
        let text = render_front_matter(&mapping, "").map_err(|e| StoreError::FrontMatter {
            path: path.clone(),
            source: e,
        })?;
        self.docs.create_document(&path, &text)?;
        tracing::debug!(kind = %kind, path = %path, "created entity");
        Ok(CreatedEntity {
            id: path.clone(),
            path,
        })
    }

    fn entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let id = normalize_path(id)?;
        let Some(kind) = self.kind_of(&id) else {
            return Ok(None);
        };
        if !self.docs.document_exists(&id) {
            return Ok(None);
        }
        self.load(&id, kind).map(Some)
    }

    fn find_entity(&self, kind: EntityKind, name: &str) -> Result<Option<Entity>, StoreError> {
        let name = name.trim();
        if let Ok(path) = self.entity_path(kind, name)
            && self.docs.document_exists(&path)
        {
            return self.load(&path, kind).map(Some);
        }
        // Entities in subfolders are still linked by bare name
        for path in self.docs.list_documents(self.folder(kind))? {
            if is_markdown(&path)
                && file_stem(&path) == name
                && self.kind_of(&path) == Some(kind)
            {
                return self.load(&path, kind).map(Some);
            }
        }
        Ok(None)
    }

    fn list_entities(&self, kind: EntityKind) -> Result<Vec<Entity>, StoreError> {
        let mut out = Vec::new();
        for path in self.docs.list_documents(self.folder(kind))? {
            if self.kind_of(&path) == Some(kind) {
                out.push(self.load(&path, kind)?);
            }
        }
        Ok(out)
    }

    fn list_entity_names(&self, kind: EntityKind) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .docs
            .list_documents(self.folder(kind))?
            .into_iter()
            .filter(|path| self.kind_of(path) == Some(kind))
            .map(|path| file_stem(&path).to_string())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn set_entity_field(
        &self,
        id: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<(), StoreError> {
        let id = normalize_path(id)?;
        let kind = self
            .kind_of(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let (mut mapping, body) = self.read_note(&id)?;
        set_field(&mut mapping, field, &value);
        self.write_note(&id, &mapping, &body)?;
        self.notify(EntityFieldChange {
            kind,
            id,
            field: field.to_string(),
            value: Some(value),
        });
        Ok(())
    }

    fn delete_entity(&self, id: &str) -> Result<(), StoreError> {
        let id = normalize_path(id)?;
        let kind = self
            .kind_of(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.docs.delete_document(&id)?;
        tracing::debug!(kind = %kind, path = %id, "deleted entity");
        self.notify(EntityFieldChange {
            kind,
            id,
            field: String::new(),
            value: None,
        });
        Ok(())
    }

    fn subscribe(&self, kind: EntityKind) -> Receiver<EntityFieldChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, tx));
        rx
    }
}

impl<D: DocumentStore> ContextResolver for Vault<D> {
    fn resolve_document_context(&self, path: &str) -> DocumentContext {
        let Ok(path) = normalize_path(path) else {
            return DocumentContext::None;
        };
        let name = file_stem(&path).to_string();
        match self.kind_of(&path) {
            Some(EntityKind::Area) => DocumentContext::Area(name),
            Some(EntityKind::Project) => DocumentContext::Project(name),
            Some(EntityKind::Task) => DocumentContext::Task(name),
            None => DocumentContext::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault<MemoryDocuments> {
        Vault::new(
            MemoryDocuments::with_files([
                ("Areas/Finance.md", "---\nType: Area\n---\n- [ ] pay [[Rent]]\n"),
                ("Projects/Apollo.md", "# Apollo\n"),
                (
                    "Tasks/Rent.md",
                    "---\nTitle: Rent\nDone: false\nextra:\n  keep: me\n---\nbody text\n",
                ),
                ("Daily/2024-05-01.md", "- [ ] thing\n"),
            ]),
            &Settings::default(),
        )
    }

    #[test]
    fn test_context_resolution() {
        let v = vault();
        assert_eq!(
            v.resolve_document_context("Areas/Finance.md"),
            DocumentContext::Area("Finance".into())
        );
        assert_eq!(
            v.resolve_document_context("Projects/Apollo.md"),
            DocumentContext::Project("Apollo".into())
        );
        assert_eq!(
            v.resolve_document_context("Tasks/Rent.md"),
            DocumentContext::Task("Rent".into())
        );
        assert_eq!(
            v.resolve_document_context("Daily/2024-05-01.md"),
            DocumentContext::None
        );
        assert_eq!(v.resolve_document_context("../x.md"), DocumentContext::None);
    }

    #[test]
    fn test_create_find_and_list_entities() {
        let v = vault();
        let mut fields = EntityFields::new();
        fields.insert("Title".into(), FieldValue::text("Buy milk"));
        fields.insert("Done".into(), FieldValue::Bool(false));
        let created = v.create_entity(EntityKind::Task, "Buy milk", &fields).unwrap();
        assert_eq!(created.id, "Tasks/Buy milk.md");
        assert_eq!(
            v.read_document("Tasks/Buy milk.md").unwrap(),
            "---\nTitle: Buy milk\nDone: false\n---\n"
        );

        let found = v.find_entity(EntityKind::Task, "Buy milk").unwrap().unwrap();
        assert_eq!(found.name, "Buy milk");
        assert_eq!(found.field("Done"), Some(&FieldValue::Bool(false)));

        let names: Vec<String> = v
            .list_entities(EntityKind::Task)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Buy milk", "Rent"]);

        assert!(matches!(
            v.create_entity(EntityKind::Task, "Buy milk", &fields),
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            v.create_entity(EntityKind::Task, "a/b", &fields),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_set_field_preserves_body_and_unknown_keys() {
        let v = vault();
        v.set_entity_field("Tasks/Rent.md", "Done", FieldValue::Bool(true))
            .unwrap();
        let text = v.read_document("Tasks/Rent.md").unwrap();
        assert!(text.contains("Done: true"));
        assert!(text.contains("keep: me"));
        assert!(text.ends_with("---\nbody text\n"));
    }

    #[test]
    fn test_subscribers_receive_changes_for_their_kind() {
        let v = vault();
        let tasks = v.subscribe(EntityKind::Task);
        let areas = v.subscribe(EntityKind::Area);

        v.set_entity_field("Tasks/Rent.md", "Done", FieldValue::Bool(true))
            .unwrap();
        let change = tasks.try_recv().unwrap();
        assert_eq!(change.id, "Tasks/Rent.md");
        assert_eq!(change.field, "Done");
        assert_eq!(change.value, Some(FieldValue::Bool(true)));
        assert!(areas.try_recv().is_err());

        drop(tasks);
        v.delete_entity("Tasks/Rent.md").unwrap();
        assert!(v.entity("Tasks/Rent.md").unwrap().is_none());
    }

    #[test]
    fn test_entity_outside_entity_folders_is_none() {
        let v = vault();
        assert!(v.entity("Daily/2024-05-01.md").unwrap().is_none());
        assert!(matches!(
            v.set_entity_field("Daily/2024-05-01.md", "Done", FieldValue::Bool(true)),
            Err(StoreError::NotFound(_))
        ));
    }
}
