use indexmap::IndexMap;
use serde::Serialize;

use crate::model::entity::FieldValue;

/// Registry keys. Property sets and settings refer to properties by these
/// keys; everything user-visible goes through the definition instead.
pub mod keys {
    pub const TITLE: &str = "TITLE";
    pub const NAME: &str = "NAME";
    pub const TYPE: &str = "TYPE";
    pub const CATEGORY: &str = "CATEGORY";
    pub const PRIORITY: &str = "PRIORITY";
    pub const AREAS: &str = "AREAS";
    pub const PROJECT: &str = "PROJECT";
    pub const DONE: &str = "DONE";
    pub const STATUS: &str = "STATUS";
    pub const PARENT_TASK: &str = "PARENT_TASK";
    pub const TAGS: &str = "TAGS";
    pub const CREATED_AT: &str = "CREATED_AT";
    pub const UPDATED_AT: &str = "UPDATED_AT";
    pub const SOURCE_DOCUMENT: &str = "SOURCE_DOCUMENT";
    pub const SOURCE_LINE: &str = "SOURCE_LINE";
    pub const PROMOTED_AT: &str = "PROMOTED_AT";
}

/// How a property is stored in front matter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageType {
    String,
    Number,
    Boolean,
    ArrayOfString,
    Date,
}

/// A single registry entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDefinition {
    pub key: String,
    /// Front-matter key and column label
    pub display_name: String,
    pub storage_type: StorageType,
    /// Expression used in filters/sorts instead of the display name
    /// (e.g. `file.mtime`, or `note["Parent task"]` for names with spaces)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_expression: Option<String>,
    /// Formula body when the source is `formula.<name>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    pub is_link: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<FieldValue>,
}

impl PropertyDefinition {
    pub fn new(key: &str, display_name: &str, storage_type: StorageType) -> Self {
        PropertyDefinition {
            key: key.to_string(),
            display_name: display_name.to_string(),
            storage_type,
            source_expression: None,
            formula: None,
            is_link: false,
            default_value: None,
        }
    }

    pub fn source(mut self, expr: &str) -> Self {
        self.source_expression = Some(expr.to_string());
        self
    }

    pub fn formula(mut self, name: &str, body: &str) -> Self {
        self.source_expression = Some(format!("formula.{}", name));
        self.formula = Some(body.to_string());
        self
    }

    pub fn link(mut self) -> Self {
        self.is_link = true;
        self
    }

    pub fn default_value(mut self, value: FieldValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Source if overridden, display name otherwise
    pub fn resolved_source(&self) -> &str {
        self.source_expression
            .as_deref()
            .unwrap_or(&self.display_name)
    }

    /// `(name, body)` of the formula this property renders through, if any
    pub fn formula_entry(&self) -> Option<(&str, &str)> {
        let body = self.formula.as_deref()?;
        let name = self.resolved_source().strip_prefix("formula.")?;
        Some((name, body))
    }
}

/// Immutable key → definition table, built once and passed to whoever needs it
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    definitions: IndexMap<String, PropertyDefinition>,
}

impl PropertyRegistry {
    pub fn from_definitions(definitions: impl IntoIterator<Item = PropertyDefinition>) -> Self {
        PropertyRegistry {
            definitions: definitions
                .into_iter()
                .map(|d| (d.key.clone(), d))
                .collect(),
        }
    }

    /// The built-in task/project/area properties
    pub fn standard() -> Self {
        Self::from_definitions([
            PropertyDefinition::new(keys::TITLE, "Title", StorageType::String)
                .formula("Title", "link(file.name, Title)")
                .link(),
            PropertyDefinition::new(keys::NAME, "Name", StorageType::String),
            PropertyDefinition::new(keys::TYPE, "Type", StorageType::String)
                .default_value(FieldValue::text("Task")),
            PropertyDefinition::new(keys::CATEGORY, "Category", StorageType::String),
            PropertyDefinition::new(keys::PRIORITY, "Priority", StorageType::String)
                .default_value(FieldValue::Null),
            PropertyDefinition::new(keys::AREAS, "Areas", StorageType::ArrayOfString)
                .link()
                .default_value(FieldValue::List(Vec::new())),
            PropertyDefinition::new(keys::PROJECT, "Project", StorageType::String)
                .link()
                .default_value(FieldValue::Null),
            PropertyDefinition::new(keys::DONE, "Done", StorageType::Boolean)
                .default_value(FieldValue::Bool(false)),
            PropertyDefinition::new(keys::STATUS, "Status", StorageType::String)
                .default_value(FieldValue::text("Backlog")),
            PropertyDefinition::new(keys::PARENT_TASK, "Parent task", StorageType::String)
                .source("note[\"Parent task\"]")
                .link()
                .default_value(FieldValue::Null),
            PropertyDefinition::new(keys::TAGS, "tags", StorageType::ArrayOfString)
                .default_value(FieldValue::List(Vec::new())),
            PropertyDefinition::new(keys::CREATED_AT, "Created At", StorageType::Date).source("file.ctime"),
            PropertyDefinition::new(keys::UPDATED_AT, "Updated At", StorageType::Date).source("file.mtime"),
            PropertyDefinition::new(keys::SOURCE_DOCUMENT, "Source document", StorageType::String)
                .source("note[\"Source document\"]"),
            PropertyDefinition::new(keys::SOURCE_LINE, "Source line", StorageType::Number)
                .source("note[\"Source line\"]"),
            PropertyDefinition::new(keys::PROMOTED_AT, "Promoted at", StorageType::Date)
                .source("note[\"Promoted at\"]"),
        ])
    }

    pub fn resolve(&self, key: &str) -> Option<&PropertyDefinition> {
        self.definitions.get(key)
    }

    /// Expression to use when `key` appears inside a filter, sort or order
    pub fn resolve_source(&self, key: &str) -> Option<&str> {
        self.resolve(key).map(PropertyDefinition::resolved_source)
    }

    /// Front-matter key for `key`
    pub fn display_name(&self, key: &str) -> Option<&str> {
        self.resolve(key).map(|d| d.display_name.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.definitions.values()
    }

    /// Keys from `keys` that have no definition, in the order given
    pub fn unknown_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        keys.into_iter()
            .filter(|k| !self.contains(k))
            .map(str::to_string)
            .collect()
    }
}

/// The contexts a property set can be selected for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertySetKind {
    TaskFrontMatter,
    TasksBase,
    AreaBase,
    ProjectBase,
    ParentTaskBase,
}

/// Ordered list of registry keys. Order is column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySet {
    pub kind: PropertySetKind,
    pub keys: Vec<String>,
}

const TASK_FRONTMATTER: &[&str] = &[
    keys::TITLE,
    keys::TYPE,
    keys::CATEGORY,
    keys::PRIORITY,
    keys::AREAS,
    keys::PROJECT,
    keys::DONE,
    keys::STATUS,
    keys::PARENT_TASK,
    keys::TAGS,
];

const PROVENANCE: &[&str] = &[keys::SOURCE_DOCUMENT, keys::SOURCE_LINE, keys::PROMOTED_AT];

const TASKS_BASE: &[&str] = &[
    keys::TITLE,
    keys::TYPE,
    keys::CATEGORY,
    keys::PRIORITY,
    keys::AREAS,
    keys::PROJECT,
    keys::DONE,
    keys::STATUS,
    keys::UPDATED_AT,
    keys::CREATED_AT,
];

impl PropertySet {
    /// Built-in set for a context
    pub fn standard(kind: PropertySetKind) -> Self {
        Self::with_columns(kind, None)
    }

    /// Like [`PropertySet::standard`], with the task-base columns replaced by
    /// `columns` when given. Scope-redundant columns are still dropped.
    pub fn with_columns(kind: PropertySetKind, columns: Option<&[String]>) -> Self {
        let keys: Vec<String> = match kind {
            PropertySetKind::TaskFrontMatter => TASK_FRONTMATTER
                .iter()
                .chain(PROVENANCE)
                .map(|k| k.to_string())
                .collect(),
            _ => {
                let base: Vec<String> = match columns {
                    Some(cols) if !cols.is_empty() => cols.to_vec(),
                    _ => TASKS_BASE.iter().map(|k| k.to_string()).collect(),
                };
                let dropped: &[&str] = match kind {
                    PropertySetKind::AreaBase => &[keys::AREAS],
                    PropertySetKind::ProjectBase => &[keys::PROJECT, keys::AREAS],
                    PropertySetKind::ParentTaskBase => &[keys::PARENT_TASK],
                    _ => &[],
                };
                base.into_iter()
                    .filter(|k| !dropped.contains(&k.as_str()))
                    .collect()
            }
        };
        PropertySet { kind, keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_source_prefers_override() {
        let reg = PropertyRegistry::standard();
        assert_eq!(reg.resolve_source(keys::AREAS), Some("Areas"));
        assert_eq!(reg.resolve_source(keys::UPDATED_AT), Some("file.mtime"));
        assert_eq!(reg.resolve_source(keys::PARENT_TASK), Some("note[\"Parent task\"]"));
        assert_eq!(reg.resolve_source(keys::TITLE), Some("formula.Title"));
        assert_eq!(reg.resolve_source("NOPE"), None);
    }

    #[test]
    fn formula_entry_only_for_formula_sources() {
        let reg = PropertyRegistry::standard();
        assert_eq!(
            reg.resolve(keys::TITLE).unwrap().formula_entry(),
            Some(("Title", "link(file.name, Title)"))
        );
        assert_eq!(reg.resolve(keys::DONE).unwrap().formula_entry(), None);
    }

    #[test]
    fn every_standard_set_key_is_registered() {
        let reg = PropertyRegistry::standard();
        for kind in [
            PropertySetKind::TaskFrontMatter,
            PropertySetKind::TasksBase,
            PropertySetKind::AreaBase,
            PropertySetKind::ProjectBase,
            PropertySetKind::ParentTaskBase,
        ] {
            let set = PropertySet::standard(kind);
            assert!(
                reg.unknown_keys(set.keys.iter().map(String::as_str)).is_empty(),
                "{:?}",
                kind
            );
        }
    }

    #[test]
    fn scoped_sets_drop_redundant_columns() {
        let area = PropertySet::standard(PropertySetKind::AreaBase);
        assert!(!area.keys.iter().any(|k| k == keys::AREAS));
        assert!(area.keys.iter().any(|k| k == keys::PROJECT));

        let project = PropertySet::standard(PropertySetKind::ProjectBase);
        assert!(!project.keys.iter().any(|k| k == keys::AREAS));
        assert!(!project.keys.iter().any(|k| k == keys::PROJECT));
    }

    #[test]
    fn column_override_keeps_given_order() {
        let cols = vec!["DONE".to_string(), "TITLE".to_string(), "AREAS".to_string()];
        let set = PropertySet::with_columns(PropertySetKind::AreaBase, Some(&cols));
        assert_eq!(set.keys, vec!["DONE", "TITLE"]);
    }

    #[test]
    fn unknown_keys_reported_in_order() {
        let reg = PropertyRegistry::standard();
        assert_eq!(
            reg.unknown_keys(["TITLE", "ESTIMATE", "DONE", "OWNER"]),
            vec!["ESTIMATE", "OWNER"]
        );
    }
}
