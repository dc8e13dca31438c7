use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The kinds of tracked entity that live in their own note file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Project,
    Area,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Task => write!(f, "task"),
            EntityKind::Project => write!(f, "project"),
            EntityKind::Area => write!(f, "area"),
        }
    }
}

/// A single front-matter value.
///
/// Only the shapes the property registry can describe are modelled; richer
/// YAML (nested mappings) is preserved by the vault but never surfaces here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// A `[[name]]` link value
    pub fn link(name: &str) -> Self {
        FieldValue::Text(link_text(name))
    }

    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Names of every `[[link]]` held by this value, in order
    pub fn link_names(&self) -> Vec<String> {
        match self {
            FieldValue::Text(s) => crate::parse::extract_references(s),
            FieldValue::List(items) => items
                .iter()
                .flat_map(|s| crate::parse::extract_references(s))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Render `[[name]]`
pub fn link_text(name: &str) -> String {
    format!("[[{}]]", name)
}

/// Ordered front-matter fields keyed by display name
pub type EntityFields = IndexMap<String, FieldValue>;

/// A tracked entity as read back from the vault
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Stable identifier (vault-relative path of the entity note)
    pub id: String,
    /// Bare name used inside `[[...]]` links (the file stem)
    pub name: String,
    pub kind: EntityKind,
    pub fields: EntityFields,
}

impl Entity {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }
}

/// What the entity store hands back after creating an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedEntity {
    pub id: String,
    pub path: String,
}

/// Notification emitted by an entity store whenever a field is written.
/// `value` is `None` when the entity itself was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFieldChange {
    pub kind: EntityKind,
    pub id: String,
    pub field: String,
    pub value: Option<FieldValue>,
}
