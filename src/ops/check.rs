use serde::Serialize;

use crate::io::store::{EntityStore, NoteStore, StoreError};
use crate::model::config::{Settings, normalize_folder};
use crate::model::entity::EntityKind;
use crate::model::promotion::PromotedTaskRecord;
use crate::model::property::PropertyRegistry;
use crate::model::scope::Scope;
use crate::ops::base_gen::{BaseError, entity_folder, entity_folders, tasks_folder};
use crate::ops::refresh::refresh_scopes;
use crate::parse::{DocumentLines, parse_bare_reference, parse_checklist_line};

/// Structured result from `tsync check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error (something that should be fixed).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// The tasks folder is empty or not a plain relative path
    #[serde(rename = "invalid_tasks_folder")]
    InvalidTasksFolder { folder: String, reason: String },
    /// An area or project folder is empty or not a plain relative path
    #[serde(rename = "invalid_entity_folder")]
    InvalidEntityFolder {
        setting: String,
        folder: String,
        reason: String,
    },
    /// A configured column names a key the registry does not define
    #[serde(rename = "unknown_property")]
    UnknownProperty { key: String, setting: String },
}

/// A validation warning (non-critical issue).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    #[serde(rename = "duplicate_category")]
    DuplicateCategory { name: String },
    #[serde(rename = "duplicate_priority")]
    DuplicatePriority { name: String },
    /// Priorities only produce views in combination with a category
    #[serde(rename = "priorities_without_categories")]
    PrioritiesWithoutCategories,
    /// Two entity folders overlap, so one kind shadows the other
    #[serde(rename = "overlapping_folders")]
    OverlappingFolders { first: String, second: String },
    /// A promoted task points at a document that no longer exists
    #[serde(rename = "missing_source_document")]
    MissingSourceDocument { entity: String, document: String },
    /// The source document exists but no line links back to the task
    #[serde(rename = "unlinked_promotion")]
    UnlinkedPromotion { entity: String, document: String },
    /// Several scopes generate the same base file; refresh keeps the first
    #[serde(rename = "base_path_collision")]
    BasePathCollision { path: String, scopes: Vec<String> },
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate settings against the registry. Read-only.
pub fn check_settings(settings: &Settings, registry: &PropertyRegistry) -> CheckResult {
    let mut result = CheckResult::default();

    if let Err(BaseError::ConfigurationInvalid(reason)) = tasks_folder(settings) {
        result.errors.push(CheckError::InvalidTasksFolder {
            folder: settings.folders.tasks.clone(),
            reason,
        });
    }
    for (kind, setting, folder) in [
        (EntityKind::Area, "folders.areas", &settings.folders.areas),
        (EntityKind::Project, "folders.projects", &settings.folders.projects),
    ] {
        if let Err(BaseError::ConfigurationInvalid(reason)) = entity_folder(settings, kind) {
            result.errors.push(CheckError::InvalidEntityFolder {
                setting: setting.to_string(),
                folder: folder.clone(),
                reason,
            });
        }
    }

    for key in registry.unknown_keys(settings.bases.columns.iter().map(String::as_str)) {
        result.errors.push(CheckError::UnknownProperty {
            key,
            setting: "bases.columns".to_string(),
        });
    }

    for name in repeated(settings.categories.iter().map(|c| c.name.as_str())) {
        result.warnings.push(CheckWarning::DuplicateCategory { name });
    }
    for name in repeated(settings.priorities.iter().map(|p| p.name.as_str())) {
        result.warnings.push(CheckWarning::DuplicatePriority { name });
    }
    if settings.category_names().is_empty() && !settings.priority_names().is_empty() {
        result.warnings.push(CheckWarning::PrioritiesWithoutCategories);
    }

    let folders = [
        normalize_folder(&settings.folders.tasks),
        normalize_folder(&settings.folders.areas),
        normalize_folder(&settings.folders.projects),
    ];
    for (i, first) in folders.iter().enumerate() {
        for second in &folders[i + 1..] {
            if overlaps(first, second) {
                result.warnings.push(CheckWarning::OverlappingFolders {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }

    result.valid = result.errors.is_empty();
    result
}

/// Settings checks plus provenance of every promoted task in the vault
pub fn check_vault<S: NoteStore + ?Sized>(
    settings: &Settings,
    registry: &PropertyRegistry,
    store: &S,
) -> Result<CheckResult, StoreError> {
    let mut result = check_settings(settings, registry);

    for entity in store.list_entities(EntityKind::Task)? {
        let Some(record) = PromotedTaskRecord::from_entity(&entity, registry) else {
            continue;
        };
        if !store.document_exists(&record.source_document) {
            result.warnings.push(CheckWarning::MissingSourceDocument {
                entity: entity.id.clone(),
                document: record.source_document,
            });
            continue;
        }
        let doc = DocumentLines::parse(&store.read_document(&record.source_document)?);
        let linked = doc.iter().any(|line| links_to(line, &entity.name));
        if !linked {
            result.warnings.push(CheckWarning::UnlinkedPromotion {
                entity: entity.id.clone(),
                document: record.source_document,
            });
        }
    }

    if entity_folders(settings).is_ok() {
        for (path, scopes) in base_path_collisions(settings, store)? {
            result.warnings.push(CheckWarning::BasePathCollision {
                path,
                scopes: scopes.iter().map(Scope::label).collect(),
            });
        }
    }

    result.valid = result.errors.is_empty();
    Ok(result)
}

/// Base paths claimed by more than one refreshable scope, compared
/// case-insensitively. Scopes are listed in refresh order.
pub fn base_path_collisions<S: EntityStore + ?Sized>(
    settings: &Settings,
    store: &S,
) -> Result<Vec<(String, Vec<Scope>)>, StoreError> {
    let mut claims: Vec<(String, Vec<Scope>)> = Vec::new();
    for scope in refresh_scopes(store)? {
        let path = scope.base_path(&settings.folders.bases);
        match claims
            .iter_mut()
            .find(|(claimed, _)| claimed.to_lowercase() == path.to_lowercase())
        {
            Some((_, scopes)) => scopes.push(scope),
            None => claims.push((path, vec![scope])),
        }
    }
    claims.retain(|(_, scopes)| scopes.len() > 1);
    Ok(claims)
}

/// Fail-fast form used at startup when `bases.strict_properties` is on
pub fn validate_settings(settings: &Settings, registry: &PropertyRegistry) -> Result<(), BaseError> {
    entity_folders(settings)?;
    if settings.bases.strict_properties {
        let unknown = registry.unknown_keys(settings.bases.columns.iter().map(String::as_str));
        if !unknown.is_empty() {
            return Err(BaseError::ConfigurationInvalid(format!(
                "unknown property keys in bases.columns: {}",
                unknown.join(", ")
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn links_to(line: &str, name: &str) -> bool {
    parse_checklist_line(line, 0)
        .and_then(|m| m.promotion_target().map(str::to_string))
        .or_else(|| parse_bare_reference(line))
        .is_some_and(|target| target == name)
}

/// Names that appear more than once, compared trimmed and case-insensitively.
/// Each is reported once, spelled as it first appeared.
fn repeated<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: Vec<(String, &'a str)> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for name in names.map(str::trim).filter(|n| !n.is_empty()) {
        let lower = name.to_lowercase();
        match seen.iter().position(|(key, _)| *key == lower) {
            Some(i) => {
                if !out.iter().any(|o| o.to_lowercase() == lower) {
                    out.push(seen[i].1.to_string());
                }
            }
            None => seen.push((lower, name)),
        }
    }
    out
}

fn overlaps(a: &str, b: &str) -> bool {
    a == b
        || a.is_empty()
        || b.is_empty()
        || b.strip_prefix(a).is_some_and(|r| r.starts_with('/'))
        || a.strip_prefix(b).is_some_and(|r| r.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryDocuments, Vault};
    use crate::model::config::{CategoryConfig, PriorityConfig};

    #[test]
    fn test_default_settings_are_valid() {
        let result = check_settings(&Settings::default(), &PropertyRegistry::standard());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unknown_columns_and_empty_folder_are_errors() {
        let mut s = Settings::default();
        s.folders.tasks = " / ".into();
        s.bases.columns = vec!["TITLE".into(), "ESTIMATE".into()];
        let result = check_settings(&s, &PropertyRegistry::standard());
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert!(matches!(
            &result.errors[1],
            CheckError::UnknownProperty { key, .. } if key == "ESTIMATE"
        ));
    }

    #[test]
    fn test_validate_settings_respects_strict_flag() {
        let reg = PropertyRegistry::standard();
        let mut s = Settings::default();
        s.bases.columns = vec!["OWNER".into()];
        assert!(matches!(
            validate_settings(&s, &reg),
            Err(BaseError::ConfigurationInvalid(msg)) if msg.contains("OWNER")
        ));
        s.bases.strict_properties = false;
        assert!(validate_settings(&s, &reg).is_ok());
    }

    #[test]
    fn test_duplicate_names_and_folder_overlap_warn() {
        let mut s = Settings::default();
        for name in ["Bug", "bug", "Feature"] {
            s.categories.push(CategoryConfig {
                name: name.into(),
                color: None,
            });
        }
        s.folders.areas = "Tasks/Areas".into();
        let result = check_settings(&s, &PropertyRegistry::standard());
        assert!(result.valid);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, CheckWarning::DuplicateCategory { name } if name == "Bug")));
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, CheckWarning::OverlappingFolders { .. })));
    }

    #[test]
    fn test_duplicates_are_reported_once_in_first_spelling() {
        assert_eq!(repeated(["bug", " Bug ", "BUG", "Feature"].into_iter()), vec!["bug"]);
        assert_eq!(
            repeated(["High", "Low", "low", "high"].into_iter()),
            vec!["Low", "High"]
        );
        assert!(repeated(["A", "B", ""].into_iter()).is_empty());
    }

    #[test]
    fn test_empty_entity_folders_are_errors() {
        let reg = PropertyRegistry::standard();
        let mut s = Settings::default();
        s.folders.areas = "".into();
        s.folders.projects = "./".into();
        let result = check_settings(&s, &reg);
        assert!(!result.valid);
        let settings: Vec<&str> = result
            .errors
            .iter()
            .filter_map(|e| match e {
                CheckError::InvalidEntityFolder { setting, .. } => Some(setting.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(settings, vec!["folders.areas", "folders.projects"]);
        assert!(matches!(
            validate_settings(&s, &reg),
            Err(BaseError::ConfigurationInvalid(msg)) if msg == "areas folder setting is empty"
        ));
    }

    #[test]
    fn test_colliding_base_paths_warn() {
        let settings = Settings::default();
        let vault = Vault::new(
            MemoryDocuments::with_files([
                ("Areas/Apollo.md", "---\n---\n"),
                ("Areas/Tasks.md", "---\n---\n"),
                ("Areas/Health.md", "---\n---\n"),
                ("Projects/Apollo.md", "---\n---\n"),
            ]),
            &settings,
        );
        let result = check_vault(&settings, &PropertyRegistry::standard(), &vault).unwrap();
        assert!(result.valid);
        let collisions: Vec<(&str, Vec<&str>)> = result
            .warnings
            .iter()
            .filter_map(|w| match w {
                CheckWarning::BasePathCollision { path, scopes } => {
                    Some((path.as_str(), scopes.iter().map(String::as_str).collect()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            collisions,
            vec![
                ("Bases/Tasks.base", vec!["Tasks", "area Tasks"]),
                ("Bases/Apollo.base", vec!["area Apollo", "project Apollo"]),
            ]
        );
    }

    #[test]
    fn test_priorities_without_categories_warn() {
        let mut s = Settings::default();
        s.priorities.push(PriorityConfig {
            name: "High".into(),
            color: None,
        });
        let result = check_settings(&s, &PropertyRegistry::standard());
        assert!(matches!(
            result.warnings.as_slice(),
            [CheckWarning::PrioritiesWithoutCategories]
        ));
    }

    #[test]
    fn test_vault_provenance_checks() {
        let settings = Settings::default();
        let vault = Vault::new(
            MemoryDocuments::with_files([
                ("Daily.md", "- [ ] [[Linked]]\n- [ ] plain\n"),
                ("Tasks/Linked.md", "---\nSource document: Daily.md\n---\n"),
                ("Tasks/Orphan.md", "---\nSource document: Daily.md\n---\n"),
                ("Tasks/Gone.md", "---\nSource document: Deleted.md\n---\n"),
                ("Tasks/Manual.md", "---\nTitle: Manual\n---\n"),
            ]),
            &settings,
        );
        let result = check_vault(&settings, &PropertyRegistry::standard(), &vault).unwrap();
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 2);
        assert!(matches!(
            &result.warnings[0],
            CheckWarning::MissingSourceDocument { entity, .. } if entity == "Tasks/Gone.md"
        ));
        assert!(matches!(
            &result.warnings[1],
            CheckWarning::UnlinkedPromotion { entity, .. } if entity == "Tasks/Orphan.md"
        ));
    }
}
