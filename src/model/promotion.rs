use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::entity::Entity;
use crate::model::property::{PropertyRegistry, keys};

/// The binding between a tracked task and the checklist line it came from.
///
/// Stored as provenance fields in the task's own front matter; this struct
/// is the denormalized view the promotion and sync engines work with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotedTaskRecord {
    pub source_document: String,
    /// 0-based line in `source_document` at the time it was last seen
    pub source_line: usize,
    pub entity_id: String,
    pub entity_name: String,
    pub entity_title: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<DateTime<Utc>>,
}

impl PromotedTaskRecord {
    /// Read the record back from an entity. `None` if the entity carries no
    /// provenance (it was never promoted, or was created some other way).
    pub fn from_entity(entity: &Entity, registry: &PropertyRegistry) -> Option<Self> {
        let field = |key: &str| {
            registry
                .display_name(key)
                .and_then(|name| entity.field(name))
        };

        let source_document = field(keys::SOURCE_DOCUMENT)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        let source_line = field(keys::SOURCE_LINE)
            .and_then(|v| v.as_i64())
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let entity_title = field(keys::TITLE)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&entity.name)
            .to_string();
        let completed = is_done(entity, registry);
        let promoted_at = field(keys::PROMOTED_AT)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(PromotedTaskRecord {
            source_document,
            source_line,
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            entity_title,
            completed,
            promoted_at,
        })
    }
}

/// Done-state of an entity; missing or unreadable means not done
pub fn is_done(entity: &Entity, registry: &PropertyRegistry) -> bool {
    registry
        .display_name(keys::DONE)
        .and_then(|name| entity.field(name))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{EntityFields, EntityKind, FieldValue};

    fn entity(fields: &[(&str, FieldValue)]) -> Entity {
        let mut map = EntityFields::new();
        for (k, v) in fields {
            map.insert(k.to_string(), v.clone());
        }
        Entity {
            id: "Tasks/Buy milk.md".into(),
            name: "Buy milk".into(),
            kind: EntityKind::Task,
            fields: map,
        }
    }

    #[test]
    fn record_from_provenance_fields() {
        let reg = PropertyRegistry::standard();
        let e = entity(&[
            ("Title", FieldValue::text("Buy milk")),
            ("Done", FieldValue::Bool(true)),
            ("Source document", FieldValue::text("Daily/2024-05-01.md")),
            ("Source line", FieldValue::Integer(7)),
            ("Promoted at", FieldValue::text("2024-05-01T09:30:00Z")),
        ]);
        let rec = PromotedTaskRecord::from_entity(&e, &reg).unwrap();
        assert_eq!(rec.source_document, "Daily/2024-05-01.md");
        assert_eq!(rec.source_line, 7);
        assert!(rec.completed);
        assert_eq!(rec.entity_title, "Buy milk");
        assert!(rec.promoted_at.is_some());
    }

    #[test]
    fn no_source_document_means_no_record() {
        let reg = PropertyRegistry::standard();
        let e = entity(&[("Title", FieldValue::text("Buy milk"))]);
        assert!(PromotedTaskRecord::from_entity(&e, &reg).is_none());

        let blank = entity(&[("Source document", FieldValue::text("  "))]);
        assert!(PromotedTaskRecord::from_entity(&blank, &reg).is_none());
    }

    #[test]
    fn title_falls_back_to_entity_name() {
        let reg = PropertyRegistry::standard();
        let e = entity(&[("Source document", FieldValue::text("Inbox.md"))]);
        let rec = PromotedTaskRecord::from_entity(&e, &reg).unwrap();
        assert_eq!(rec.entity_title, "Buy milk");
        assert_eq!(rec.source_line, 0);
        assert!(!rec.completed);
    }
}
