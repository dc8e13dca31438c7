use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::io::store::{NoteStore, StoreError, normalize_path};
use crate::model::config::Settings;
use crate::model::entity::{Entity, EntityFieldChange, EntityKind, FieldValue};
use crate::model::promotion::{PromotedTaskRecord, is_done};
use crate::model::property::{PropertyRegistry, keys};
use crate::model::scope::bare_name;
use crate::parse::{DocumentLines, links_to_entity, locate_line, parse_checklist_line};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("task {0} was not promoted from a checklist line")]
    NoProvenance(String),
    #[error("no checklist line in {document} links to [[{entity}]]")]
    LineNotFound { document: String, entity: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Which representation was brought in line with the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    EntityToDocument,
    DocumentToEntity,
}

/// One done-state propagated across a promotion binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncChange {
    pub direction: SyncDirection,
    pub entity_id: String,
    pub document: String,
    pub line: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub changes: Vec<SyncChange>,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    fn fail(&mut self, path: &str, error: SyncError) {
        tracing::warn!(path = %path, error = %error, "sync failed");
        self.failed.push(SyncFailure {
            path: path.to_string(),
            error: error.to_string(),
        });
    }
}

/// Keeps checklist marks and task done-states in step.
pub struct CompletionSync<'a, S: NoteStore + ?Sized> {
    store: &'a S,
    settings: &'a Settings,
    registry: &'a PropertyRegistry,
}

impl<'a, S: NoteStore + ?Sized> CompletionSync<'a, S> {
    pub fn new(store: &'a S, settings: &'a Settings, registry: &'a PropertyRegistry) -> Self {
        CompletionSync {
            store,
            settings,
            registry,
        }
    }

    /// Flip the checkbox of the line promoted into task `id` to match the
    /// task's done-state. `None` when nothing needed to change.
    pub fn sync_entity_to_document(&self, id: &str) -> Result<Option<SyncChange>, SyncError> {
        let entity = self
            .store
            .entity(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let record = PromotedTaskRecord::from_entity(&entity, self.registry)
            .ok_or_else(|| SyncError::NoProvenance(entity.id.clone()))?;

        let text = self.store.read_document(&record.source_document)?;
        let mut doc = DocumentLines::parse(&text);
        let line = locate_line(&doc, record.source_line, |l| links_to_entity(l, &entity.name))
            .ok_or_else(|| SyncError::LineNotFound {
                document: record.source_document.clone(),
                entity: entity.name.clone(),
            })?;

        if line != record.source_line {
            tracing::debug!(
                entity = %entity.id,
                from = record.source_line + 1,
                to = line + 1,
                "promoted line moved"
            );
            self.set_source_line(&entity, line)?;
        }

        let Some(m) = doc.get(line).and_then(|l| parse_checklist_line(l, line)) else {
            return Ok(None);
        };
        if m.completed == record.completed {
            return Ok(None);
        }

        doc.replace(line, m.with_completed(record.completed));
        self.store
            .write_document(&record.source_document, &doc.to_text())?;
        tracing::info!(
            entity = %entity.id,
            document = %record.source_document,
            line = line + 1,
            done = record.completed,
            "updated checklist mark"
        );

        Ok(Some(SyncChange {
            direction: SyncDirection::EntityToDocument,
            entity_id: entity.id,
            document: record.source_document,
            line,
            completed: record.completed,
        }))
    }

    /// Bring every task promoted from `document` in line with the checklist
    /// marks it currently shows. Only the mark is compared.
    pub fn sync_document_to_entities(&self, document: &str) -> Result<Vec<SyncChange>, SyncError> {
        let document = normalize_path(document)?;
        let text = self.store.read_document(&document)?;
        let doc = DocumentLines::parse(&text);

        let mut changes = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (i, raw) in doc.iter().enumerate() {
            let Some(m) = parse_checklist_line(raw, i) else {
                continue;
            };
            let Some(target) = m.promotion_target() else {
                continue;
            };
            let Some(entity) = self
                .store
                .find_entity(EntityKind::Task, &bare_name(target))?
            else {
                continue;
            };
            // First line wins when a task is linked more than once
            if !seen.insert(entity.id.clone()) {
                continue;
            }
            let Some(record) = PromotedTaskRecord::from_entity(&entity, self.registry) else {
                continue;
            };
            if normalize_path(&record.source_document).ok().as_deref() != Some(document.as_str()) {
                continue;
            }

            if record.source_line != i {
                self.set_source_line(&entity, i)?;
            }
            if record.completed == m.completed {
                continue;
            }

            self.set_done(&entity, m.completed)?;
            tracing::info!(
                entity = %entity.id,
                document = %document,
                line = i + 1,
                done = m.completed,
                "updated task done-state"
            );
            changes.push(SyncChange {
                direction: SyncDirection::DocumentToEntity,
                entity_id: entity.id,
                document: document.clone(),
                line: i,
                completed: m.completed,
            });
        }
        Ok(changes)
    }

    /// Document-to-entity sync over every document a task was promoted from
    pub fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let documents: BTreeSet<String> = self
            .store
            .list_entities(EntityKind::Task)?
            .iter()
            .filter_map(|e| PromotedTaskRecord::from_entity(e, self.registry))
            .map(|r| r.source_document)
            .collect();

        let mut report = SyncReport::default();
        for document in documents {
            match self.sync_document_to_entities(&document) {
                Ok(changes) => report.changes.extend(changes),
                Err(e) => report.fail(&document, e),
            }
        }
        Ok(report)
    }

    fn set_done(&self, entity: &Entity, done: bool) -> Result<(), StoreError> {
        if let Some(name) = self.registry.display_name(keys::DONE) {
            self.store
                .set_entity_field(&entity.id, name, FieldValue::Bool(done))?;
        }
        if let (Some(name), Some(status)) = (
            self.registry.display_name(keys::STATUS),
            self.settings.status_for(done),
        ) && entity.text_field(name) != Some(status)
        {
            self.store
                .set_entity_field(&entity.id, name, FieldValue::text(status))?;
        }
        Ok(())
    }

    fn set_source_line(&self, entity: &Entity, line: usize) -> Result<(), StoreError> {
        match self.registry.display_name(keys::SOURCE_LINE) {
            Some(name) => {
                self.store
                    .set_entity_field(&entity.id, name, FieldValue::Integer(line as i64))
            }
            None => Ok(()),
        }
    }
}

/// Long-running sync over a stream of change notifications.
///
/// Keeps the last seen done-state of every promoted task, so notifications
/// that don't change it (including the ones caused by our own writes) are
/// ignored.
pub struct SyncSession<'a, S: NoteStore + ?Sized> {
    sync: CompletionSync<'a, S>,
    done: HashMap<String, bool>,
}

impl<'a, S: NoteStore + ?Sized> SyncSession<'a, S> {
    pub fn new(sync: CompletionSync<'a, S>) -> Result<Self, SyncError> {
        let mut session = SyncSession {
            sync,
            done: HashMap::new(),
        };
        session.snapshot()?;
        Ok(session)
    }

    fn snapshot(&mut self) -> Result<(), SyncError> {
        self.done.clear();
        for entity in self.sync.store.list_entities(EntityKind::Task)? {
            if PromotedTaskRecord::from_entity(&entity, self.sync.registry).is_some() {
                let done = is_done(&entity, self.sync.registry);
                self.done.insert(entity.id, done);
            }
        }
        Ok(())
    }

    /// Number of promoted tasks being tracked
    pub fn tracked(&self) -> usize {
        self.done.len()
    }

    /// React to vault-relative paths reported by a file watcher
    pub fn handle_paths(&mut self, paths: &[String]) -> SyncReport {
        let mut report = SyncReport::default();
        for path in paths {
            if let Err(e) = self.handle_path(path, &mut report) {
                report.fail(path, e);
            }
        }
        report
    }

    fn handle_path(&mut self, path: &str, report: &mut SyncReport) -> Result<(), SyncError> {
        let store = self.sync.store;
        let registry = self.sync.registry;

        if !store.document_exists(path) {
            self.done.remove(path);
            return Ok(());
        }

        if let Some(entity) = store.entity(path)?
            && entity.kind == EntityKind::Task
            && PromotedTaskRecord::from_entity(&entity, registry).is_some()
        {
            let done = is_done(&entity, registry);
            if self.done.insert(entity.id.clone(), done) != Some(done)
                && let Some(change) = self.sync.sync_entity_to_document(&entity.id)?
            {
                report.changes.push(change);
            }
        }

        // Any note, task notes included, can hold promoted checklist lines
        for change in self.sync.sync_document_to_entities(path)? {
            self.done.insert(change.entity_id.clone(), change.completed);
            report.changes.push(change);
        }
        Ok(())
    }

    /// React to a field-change notification from an entity store
    pub fn handle_entity_change(
        &mut self,
        change: &EntityFieldChange,
    ) -> Result<Option<SyncChange>, SyncError> {
        if change.kind != EntityKind::Task {
            return Ok(None);
        }
        let Some(value) = &change.value else {
            self.done.remove(&change.id);
            return Ok(None);
        };
        if self.sync.registry.display_name(keys::DONE) != Some(change.field.as_str()) {
            return Ok(None);
        }
        let done = value.as_bool().unwrap_or(false);
        if self.done.insert(change.id.clone(), done) == Some(done) {
            return Ok(None);
        }
        match self.sync.sync_entity_to_document(&change.id) {
            Err(SyncError::NoProvenance(_)) => {
                self.done.remove(&change.id);
                Ok(None)
            }
            other => other,
        }
    }
}
