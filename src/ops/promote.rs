use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::io::store::{NoteStore, StoreError, normalize_path};
use crate::model::config::Settings;
use crate::model::entity::{Entity, EntityFields, EntityKind, FieldValue, link_text};
use crate::model::promotion::{PromotedTaskRecord, is_done};
use crate::model::property::{PropertyRegistry, PropertySet, PropertySetKind, keys};
use crate::model::scope::{DocumentContext, Scope, bare_name};
use crate::ops::base_gen::{BaseError, entity_folders};
use crate::ops::refresh::{WriteOutcome, write_base};
use crate::parse::{
    DocumentLines, TodoLineMatch, links_to_entity, locate_line, parse_bare_reference,
    parse_checklist_line, strip_link_syntax,
};

/// Error type for promotion and reversion. Line numbers are 0-based and
/// displayed 1-based.
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("no checklist item found at {document}:{}", .line + 1)]
    NoChecklistItem { document: String, line: usize },
    #[error("checklist item at {document}:{} has no text or link to promote", .line + 1)]
    NoReferenceFound { document: String, line: usize },
    #[error("{document}:{} is already promoted to [[{entity}]]", .line + 1)]
    AlreadyPromoted {
        document: String,
        line: usize,
        entity: String,
    },
    #[error("{document}:{} is not a promoted task link", .line + 1)]
    NotPromoted { document: String, line: usize },
    #[error("line {} is past the end of {document} ({len} lines)", .line + 1)]
    LineOutOfRange {
        document: String,
        line: usize,
        len: usize,
    },
    #[error("task {0} was not promoted from a checklist line")]
    NoProvenance(String),
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<BaseError> for PromotionError {
    fn from(e: BaseError) -> Self {
        match e {
            BaseError::ConfigurationInvalid(msg) => PromotionError::ConfigurationInvalid(msg),
            BaseError::Storage(e) => PromotionError::Storage(e),
            BaseError::Serialize(e) => PromotionError::ConfigurationInvalid(e.to_string()),
        }
    }
}

/// Result of a successful promotion
#[derive(Debug, Clone, Serialize)]
pub struct PromotedTask {
    pub entity_id: String,
    pub entity_path: String,
    pub entity_name: String,
    /// An existing task was linked instead of creating a new one
    pub relinked: bool,
    pub document: String,
    pub line: usize,
    pub line_text: String,
    /// Parent-task base regenerated as a side effect, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_base: Option<String>,
}

/// Result of a successful reversion
#[derive(Debug, Clone, Serialize)]
pub struct RevertedTask {
    pub entity_id: String,
    pub document: String,
    pub line: usize,
    pub line_text: String,
}

/// How a scanned checklist line relates to tracked tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineStatus {
    /// A bare link to an existing task
    Promoted { entity: String },
    /// Links to a task that does not exist yet; promotion creates it
    Linked { target: String },
    /// Plain text; promotion derives the title from it
    Plain,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannedLine {
    pub line: usize,
    pub completed: bool,
    pub body: String,
    #[serde(flatten)]
    pub status: LineStatus,
}

/// Promotes checklist lines to task entities and reverts them.
pub struct TodoPromoter<'a, S: NoteStore + ?Sized> {
    store: &'a S,
    settings: &'a Settings,
    registry: &'a PropertyRegistry,
    clock: Option<DateTime<Utc>>,
}

impl<'a, S: NoteStore + ?Sized> TodoPromoter<'a, S> {
    pub fn new(store: &'a S, settings: &'a Settings, registry: &'a PropertyRegistry) -> Self {
        TodoPromoter {
            store,
            settings,
            registry,
            clock: None,
        }
    }

    /// Stamp promotions with a fixed time instead of the current one
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.clock = Some(timestamp);
        self
    }

    fn now(&self) -> String {
        self.clock
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn field_name(&self, key: &str) -> Option<&'a str> {
        self.registry.display_name(key)
    }

    // -----------------------------------------------------------------------
    // Promotion
    // -----------------------------------------------------------------------

    /// Turn the checklist line at `line` (0-based) into a tracked task and
    /// replace its body with a link to it.
    pub fn promote_todo_to_task(
        &self,
        document: &str,
        line: usize,
    ) -> Result<PromotedTask, PromotionError> {
        entity_folders(self.settings)?;
        let document = normalize_path(document)?;
        let text = self.store.read_document(&document)?;
        let mut doc = DocumentLines::parse(&text);
        let raw = doc
            .get(line)
            .ok_or(PromotionError::LineOutOfRange {
                document: document.clone(),
                line,
                len: doc.len(),
            })?
            .to_string();

        if let Some(target) = parse_bare_reference(&raw)
            && let Some(entity) = self.store.find_entity(EntityKind::Task, &bare_name(&target))?
        {
            return Err(PromotionError::AlreadyPromoted {
                document,
                line,
                entity: entity.name,
            });
        }

        let m = parse_checklist_line(&raw, line).ok_or(PromotionError::NoChecklistItem {
            document: document.clone(),
            line,
        })?;

        let existing = match m.promotion_target() {
            Some(target) => self
                .store
                .find_entity(EntityKind::Task, &bare_name(target))?,
            None => None,
        };

        // Links to tasks without provenance here are adopted below
        if let Some(entity) = &existing
            && m.is_bare_reference()
            && self.promoted_from(entity, &document)
        {
            return Err(PromotionError::AlreadyPromoted {
                document,
                line,
                entity: entity.name.clone(),
            });
        }

        let outcome = match existing {
            Some(entity) => self.relink(&document, &mut doc, &m, entity)?,
            None => self.create(&document, &mut doc, &m)?,
        };
        Ok(outcome)
    }

    fn create(
        &self,
        document: &str,
        doc: &mut DocumentLines,
        m: &TodoLineMatch,
    ) -> Result<PromotedTask, PromotionError> {
        let title = match m.promotion_target() {
            Some(target) => sanitize_title(&bare_name(target)),
            None => derive_title(&m.body_text),
        };
        if title.is_empty() {
            return Err(PromotionError::NoReferenceFound {
                document: document.to_string(),
                line: m.line_number,
            });
        }

        let context = self.store.resolve_document_context(document);
        let fields = self.seed_fields(&title, m, document, &context);
        let created = self.store.create_entity(EntityKind::Task, &title, &fields)?;

        let line_text = m.with_body(&link_text(&title));
        if let Err(e) = self.rewrite_line(document, doc, m.line_number, &line_text) {
            // Don't leave an orphaned task behind
            if let Err(cleanup) = self.store.delete_entity(&created.id) {
                tracing::error!(
                    entity = %created.id,
                    error = %cleanup,
                    "could not remove task after failed promotion"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            document = %document,
            line = m.line_number + 1,
            entity = %created.id,
            "promoted checklist item"
        );

        let updated_base = self.update_parent_base(&context);
        Ok(PromotedTask {
            entity_id: created.id,
            entity_path: created.path,
            entity_name: title,
            relinked: false,
            document: document.to_string(),
            line: m.line_number,
            line_text,
            updated_base,
        })
    }

    /// Point an existing task's provenance at this line and make the line a
    /// bare link to it.
    fn relink(
        &self,
        document: &str,
        doc: &mut DocumentLines,
        m: &TodoLineMatch,
        entity: Entity,
    ) -> Result<PromotedTask, PromotionError> {
        let mut updates: Vec<(&str, FieldValue)> = Vec::new();
        if let Some(name) = self.field_name(keys::SOURCE_DOCUMENT) {
            updates.push((name, FieldValue::text(document)));
        }
        if let Some(name) = self.field_name(keys::SOURCE_LINE) {
            updates.push((name, FieldValue::Integer(m.line_number as i64)));
        }
        if let Some(name) = self.field_name(keys::PROMOTED_AT) {
            updates.push((name, FieldValue::text(self.now())));
        }
        if is_done(&entity, self.registry) != m.completed {
            if let Some(name) = self.field_name(keys::DONE) {
                updates.push((name, FieldValue::Bool(m.completed)));
            }
            if let (Some(name), Some(status)) = (
                self.field_name(keys::STATUS),
                self.settings.status_for(m.completed),
            ) {
                updates.push((name, FieldValue::text(status)));
            }
        }

        let previous: Vec<(&str, FieldValue)> = updates
            .iter()
            .map(|(name, _)| {
                (
                    *name,
                    entity.field(name).cloned().unwrap_or(FieldValue::Null),
                )
            })
            .collect();
        for (name, value) in &updates {
            self.store.set_entity_field(&entity.id, name, value.clone())?;
        }

        let line_text = m.with_body(&link_text(&entity.name));
        if let Err(e) = self.rewrite_line(document, doc, m.line_number, &line_text) {
            for (name, value) in previous {
                if let Err(restore) = self.store.set_entity_field(&entity.id, name, value) {
                    tracing::error!(
                        entity = %entity.id,
                        field = name,
                        error = %restore,
                        "could not restore field after failed relink"
                    );
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            document = %document,
            line = m.line_number + 1,
            entity = %entity.id,
            "linked checklist item to existing task"
        );

        Ok(PromotedTask {
            entity_path: entity.id.clone(),
            entity_id: entity.id,
            entity_name: entity.name,
            relinked: true,
            document: document.to_string(),
            line: m.line_number,
            line_text,
            updated_base: None,
        })
    }

    /// Front matter for a new task, in task front-matter order
    fn seed_fields(
        &self,
        title: &str,
        m: &TodoLineMatch,
        document: &str,
        context: &DocumentContext,
    ) -> EntityFields {
        let set = PropertySet::standard(PropertySetKind::TaskFrontMatter);
        let mut fields = EntityFields::new();
        for key in &set.keys {
            let Some(def) = self.registry.resolve(key) else {
                continue;
            };
            let value = match key.as_str() {
                keys::TITLE => Some(FieldValue::text(title)),
                keys::TYPE => Some(FieldValue::text("Task")),
                keys::CATEGORY => Some(FieldValue::text(
                    self.settings.default_category().unwrap_or("Task"),
                )),
                keys::AREAS => Some(match context {
                    DocumentContext::Area(name) => FieldValue::List(vec![link_text(name)]),
                    _ => FieldValue::List(Vec::new()),
                }),
                keys::PROJECT => Some(match context {
                    DocumentContext::Project(name) => FieldValue::link(name),
                    _ => FieldValue::Null,
                }),
                keys::PARENT_TASK => Some(match context {
                    DocumentContext::Task(name) => FieldValue::link(name),
                    _ => FieldValue::Null,
                }),
                keys::DONE => Some(FieldValue::Bool(m.completed)),
                keys::STATUS => self
                    .settings
                    .status_for(m.completed)
                    .map(FieldValue::text)
                    .or_else(|| def.default_value.clone()),
                keys::SOURCE_DOCUMENT => Some(FieldValue::text(document)),
                keys::SOURCE_LINE => Some(FieldValue::Integer(m.line_number as i64)),
                keys::PROMOTED_AT => Some(FieldValue::text(self.now())),
                _ => def.default_value.clone(),
            };
            if let Some(value) = value {
                fields.insert(def.display_name.clone(), value);
            }
        }
        fields
    }

    /// Provenance of `entity` when it points at `document`
    fn record_from(&self, entity: &Entity, document: &str) -> Option<PromotedTaskRecord> {
        PromotedTaskRecord::from_entity(entity, self.registry)
            .filter(|r| normalize_path(&r.source_document).ok().as_deref() == Some(document))
    }

    fn promoted_from(&self, entity: &Entity, document: &str) -> bool {
        self.record_from(entity, document).is_some()
    }

    fn rewrite_line(
        &self,
        document: &str,
        doc: &mut DocumentLines,
        line: usize,
        line_text: &str,
    ) -> Result<(), StoreError> {
        if doc.get(line) == Some(line_text) {
            return Ok(());
        }
        doc.replace(line, line_text.to_string());
        self.store.write_document(document, &doc.to_text())
    }

    fn update_parent_base(&self, context: &DocumentContext) -> Option<String> {
        let DocumentContext::Task(parent) = context else {
            return None;
        };
        if !self.settings.bases.auto_update {
            return None;
        }
        let scope = Scope::ParentTask(parent.clone());
        match write_base(self.store, self.settings, self.registry, &scope) {
            Ok((path, WriteOutcome::Written)) => Some(path),
            Ok((_, WriteOutcome::Unchanged)) => None,
            Err(e) => {
                tracing::warn!(scope = %scope.label(), error = %e, "could not update parent task base");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reversion
    // -----------------------------------------------------------------------

    /// Replace the promoted link at `line` with a plain checklist item built
    /// from the task's title and done-state, then delete the task.
    pub fn revert_promoted_todo(
        &self,
        document: &str,
        line: usize,
    ) -> Result<RevertedTask, PromotionError> {
        let document = normalize_path(document)?;
        let text = self.store.read_document(&document)?;
        let mut doc = DocumentLines::parse(&text);
        let raw = doc
            .get(line)
            .ok_or(PromotionError::LineOutOfRange {
                document: document.clone(),
                line,
                len: doc.len(),
            })?
            .to_string();

        let not_promoted = || PromotionError::NotPromoted {
            document: document.clone(),
            line,
        };
        let m = parse_checklist_line(&raw, line)
            .filter(TodoLineMatch::is_bare_reference)
            .ok_or_else(not_promoted)?;
        let target = m.promotion_target().ok_or_else(not_promoted)?;
        let entity = self
            .store
            .find_entity(EntityKind::Task, &bare_name(target))?
            .ok_or_else(not_promoted)?;
        let record = self.record_from(&entity, &document).ok_or_else(not_promoted)?;

        let line_text = m.rebuilt(record.completed, &record.entity_title);
        doc.replace(line, line_text.clone());
        self.store.write_document(&document, &doc.to_text())?;

        if let Err(e) = self.store.delete_entity(&entity.id) {
            // Put the link back so the task stays reachable
            if let Err(restore) = self.store.write_document(&document, &text) {
                tracing::error!(
                    document = %document,
                    error = %restore,
                    "could not restore document after failed revert"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            document = %document,
            line = line + 1,
            entity = %entity.id,
            "reverted promoted task"
        );

        Ok(RevertedTask {
            entity_id: entity.id,
            document,
            line,
            line_text,
        })
    }

    /// Revert by task id, finding the line through the task's provenance
    pub fn revert_entity(&self, id: &str) -> Result<RevertedTask, PromotionError> {
        let entity = self
            .store
            .entity(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let record = PromotedTaskRecord::from_entity(&entity, self.registry)
            .ok_or_else(|| PromotionError::NoProvenance(entity.id.clone()))?;

        let text = self.store.read_document(&record.source_document)?;
        let doc = DocumentLines::parse(&text);
        let line = locate_line(&doc, record.source_line, |l| links_to_entity(l, &entity.name))
            .ok_or(PromotionError::NotPromoted {
                document: record.source_document.clone(),
                line: record.source_line,
            })?;

        self.revert_promoted_todo(&record.source_document, line)
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Every checklist line in `document` with its promotion status
    pub fn scan(&self, document: &str) -> Result<Vec<ScannedLine>, PromotionError> {
        let text = self.store.read_document(document)?;
        let doc = DocumentLines::parse(&text);
        let mut out = Vec::new();
        for (i, raw) in doc.iter().enumerate() {
            let Some(m) = parse_checklist_line(raw, i) else {
                continue;
            };
            let status = match m.promotion_target() {
                Some(target) => {
                    let name = bare_name(target);
                    let exists = self.store.find_entity(EntityKind::Task, &name)?.is_some();
                    if exists && m.is_bare_reference() {
                        LineStatus::Promoted { entity: name }
                    } else {
                        LineStatus::Linked { target: name }
                    }
                }
                None => LineStatus::Plain,
            };
            out.push(ScannedLine {
                line: i,
                completed: m.completed,
                body: m.body_text,
                status,
            });
        }
        Ok(out)
    }
}

/// Title for a task promoted from plain checklist text
pub fn derive_title(body: &str) -> String {
    sanitize_title(&strip_link_syntax(body))
}

/// Make `raw` usable as a note file name: drop characters that are invalid
/// in file names or link syntax, collapse whitespace, no leading or
/// trailing dots.
pub fn sanitize_title(raw: &str) -> String {
    const INVALID: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '#', '^', '[', ']'];
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if INVALID.contains(&c) || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches('.')
        .trim()
        .to_string()
}
