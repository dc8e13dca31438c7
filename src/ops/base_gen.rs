use indexmap::IndexMap;

use crate::model::base::{
    BaseConfig, Filter, FilterValue, PropertyDescriptor, SortDirection, SortKey, ViewDefinition,
    ViewKind,
};
use crate::model::config::{Settings, normalize_folder};
use crate::model::entity::EntityKind;
use crate::model::property::{PropertyRegistry, PropertySet, PropertySetKind, keys};
use crate::model::scope::{Scope, bare_name};
use crate::parse::serialize_base;

/// Error type for base generation
#[derive(Debug, thiserror::Error)]
pub enum BaseError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
    #[error(transparent)]
    Storage(#[from] crate::io::StoreError),
    #[error("could not serialize base: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// The container entities a scoped base can be filtered to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerScope {
    Area(String),
    Project(String),
}

// ---------------------------------------------------------------------------
// Generators, one per scope
// ---------------------------------------------------------------------------

/// `Tasks.base`: every top-level task, then one view per category and one
/// per category/priority pair.
pub fn generate_global_config(
    settings: &Settings,
    registry: &PropertyRegistry,
) -> Result<BaseConfig, BaseError> {
    let folder = tasks_folder(settings)?;
    let set = PropertySet::with_columns(PropertySetKind::TasksBase, settings.column_override());
    let base_filters = top_level_filters(registry, &folder);
    Ok(build_categorized(settings, registry, &set, base_filters))
}

/// `<Area>.base` / `<Project>.base`: the global layout, restricted to tasks
/// linking to the container.
pub fn generate_scoped_config(
    settings: &Settings,
    registry: &PropertyRegistry,
    scope: &ContainerScope,
) -> Result<BaseConfig, BaseError> {
    let folder = tasks_folder(settings)?;
    let (kind, key, name) = match scope {
        ContainerScope::Area(name) => (PropertySetKind::AreaBase, keys::AREAS, name),
        ContainerScope::Project(name) => (PropertySetKind::ProjectBase, keys::PROJECT, name),
    };
    let name = scope_name(name)?;
    let set = PropertySet::with_columns(kind, settings.column_override());

    let mut base_filters = top_level_filters(registry, &folder);
    if let Some(source) = registry.resolve_source(key) {
        base_filters.push(Filter::contains(source, FilterValue::Link(name)));
    }
    Ok(build_categorized(settings, registry, &set, base_filters))
}

/// `<parent task>.base`: "Sub-tasks" and "All Related" (the parent itself
/// or any of its children).
pub fn generate_parent_task_config(
    settings: &Settings,
    registry: &PropertyRegistry,
    parent_task: &str,
) -> Result<BaseConfig, BaseError> {
    let folder = tasks_folder(settings)?;
    let name = scope_name(parent_task)?;
    let set = PropertySet::with_columns(
        PropertySetKind::ParentTaskBase,
        settings.column_override(),
    );
    let (formulas, properties, columns) = columns_for(registry, &set);
    let sort = default_sort(registry);

    let child_of = registry
        .resolve_source(keys::PARENT_TASK)
        .map(|source| Filter::equals(source, FilterValue::Link(name.clone())));

    let mut sub_tasks = vec![Filter::InFolder(folder)];
    sub_tasks.extend(child_of.clone());

    let mut related = Vec::new();
    if let Some(title) = registry.resolve_source(keys::TITLE) {
        related.push(Filter::equals(title, FilterValue::Link(name.clone())));
    }
    related.extend(child_of);

    let view = |name: &str, filter: Filter| ViewDefinition {
        name: name.to_string(),
        kind: ViewKind::Table,
        filter,
        column_order: columns.clone(),
        sort: sort.clone(),
    };

    Ok(BaseConfig {
        formulas,
        properties,
        views: vec![
            view("Sub-tasks", Filter::And(sub_tasks)),
            view("All Related", Filter::Or(related)),
        ],
    })
}

/// Dispatch on [`Scope`]
pub fn generate_config(
    settings: &Settings,
    registry: &PropertyRegistry,
    scope: &Scope,
) -> Result<BaseConfig, BaseError> {
    match scope {
        Scope::Global => generate_global_config(settings, registry),
        Scope::Area(name) => {
            generate_scoped_config(settings, registry, &ContainerScope::Area(name.clone()))
        }
        Scope::Project(name) => {
            generate_scoped_config(settings, registry, &ContainerScope::Project(name.clone()))
        }
        Scope::ParentTask(name) => generate_parent_task_config(settings, registry, name),
    }
}

/// Generate and serialize the base for `scope`
pub fn render_base(
    settings: &Settings,
    registry: &PropertyRegistry,
    scope: &Scope,
) -> Result<String, BaseError> {
    Ok(serialize_base(&generate_config(settings, registry, scope)?)?)
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// The configured task folder, which every filter is anchored to
pub(crate) fn tasks_folder(settings: &Settings) -> Result<String, BaseError> {
    plain_folder("tasks", &settings.folders.tasks)
}

/// Check every entity folder setting. An empty area or project folder
/// would make every note in the vault an area or project.
pub(crate) fn entity_folders(settings: &Settings) -> Result<(), BaseError> {
    for kind in [EntityKind::Task, EntityKind::Area, EntityKind::Project] {
        entity_folder(settings, kind)?;
    }
    Ok(())
}

pub(crate) fn entity_folder(settings: &Settings, kind: EntityKind) -> Result<String, BaseError> {
    match kind {
        EntityKind::Task => tasks_folder(settings),
        EntityKind::Area => plain_folder("areas", &settings.folders.areas),
        EntityKind::Project => plain_folder("projects", &settings.folders.projects),
    }
}

fn plain_folder(setting: &str, raw: &str) -> Result<String, BaseError> {
    let folder = normalize_folder(raw);
    if folder.is_empty() {
        return Err(BaseError::ConfigurationInvalid(format!(
            "{} folder setting is empty",
            setting
        )));
    }
    if folder.split('/').any(|part| part == ".." || part == ".") {
        return Err(BaseError::ConfigurationInvalid(format!(
            "{} folder \"{}\" must be a plain vault-relative path",
            setting, raw
        )));
    }
    Ok(folder)
}

fn scope_name(name: &str) -> Result<String, BaseError> {
    let bare = bare_name(name);
    if bare.is_empty() {
        return Err(BaseError::ConfigurationInvalid(format!(
            "\"{}\" does not name a note",
            name
        )));
    }
    Ok(bare)
}

/// In the task folder and not a sub-task
fn top_level_filters(registry: &PropertyRegistry, folder: &str) -> Vec<Filter> {
    let mut filters = vec![Filter::InFolder(folder.to_string())];
    if let Some(parent) = registry.resolve_source(keys::PARENT_TASK) {
        filters.push(Filter::is_empty(parent));
    }
    filters
}

/// Formulas, property descriptors and column order for a property set.
/// Keys without a registry entry are skipped.
fn columns_for(
    registry: &PropertyRegistry,
    set: &PropertySet,
) -> (
    IndexMap<String, String>,
    IndexMap<String, PropertyDescriptor>,
    Vec<String>,
) {
    let mut formulas = IndexMap::new();
    let mut properties = IndexMap::new();
    let mut columns = Vec::new();
    for key in &set.keys {
        let Some(def) = registry.resolve(key) else {
            continue;
        };
        if let Some((name, body)) = def.formula_entry() {
            formulas.insert(name.to_string(), body.to_string());
        }
        let source = def.resolved_source().to_string();
        if properties.contains_key(&source) {
            continue;
        }
        properties.insert(
            source.clone(),
            PropertyDescriptor {
                display_name: def.display_name.clone(),
            },
        );
        columns.push(source);
    }
    (formulas, properties, columns)
}

/// Open before done, then most recently updated, most recently created,
/// and title.
fn default_sort(registry: &PropertyRegistry) -> Vec<SortKey> {
    [
        (keys::DONE, SortDirection::Asc),
        (keys::UPDATED_AT, SortDirection::Desc),
        (keys::CREATED_AT, SortDirection::Desc),
        (keys::TITLE, SortDirection::Asc),
    ]
    .into_iter()
    .filter_map(|(key, direction)| {
        registry.resolve_source(key).map(|property| SortKey {
            property: property.to_string(),
            direction,
        })
    })
    .collect()
}

/// Main "Tasks" view, then per category: "All <categories>" followed by
/// one view per priority.
fn build_categorized(
    settings: &Settings,
    registry: &PropertyRegistry,
    set: &PropertySet,
    base_filters: Vec<Filter>,
) -> BaseConfig {
    let (formulas, properties, columns) = columns_for(registry, set);
    let sort = default_sort(registry);
    let view = |name: String, filters: Vec<Filter>| ViewDefinition {
        name,
        kind: ViewKind::Table,
        filter: Filter::And(filters),
        column_order: columns.clone(),
        sort: sort.clone(),
    };

    let mut views = vec![view("Tasks".to_string(), base_filters.clone())];

    let category_source = registry.resolve_source(keys::CATEGORY);
    let priority_source = registry.resolve_source(keys::PRIORITY);
    if let Some(category_source) = category_source {
        for category in settings.category_names() {
            let mut filters = base_filters.clone();
            filters.push(Filter::equals(
                category_source,
                FilterValue::Text(category.to_string()),
            ));
            views.push(view(format!("All {}", pluralize(category)), filters.clone()));

            let Some(priority_source) = priority_source else {
                continue;
            };
            for priority in settings.priority_names() {
                let mut pair = filters.clone();
                pair.push(Filter::equals(
                    priority_source,
                    FilterValue::Text(priority.to_string()),
                ));
                views.push(view(format!("{} • {} priority", category, priority), pair));
            }
        }
    }

    BaseConfig {
        formulas,
        properties,
        views,
    }
}

/// English plural for view names: `Bug` → `Bugs`, `Story` → `Stories`,
/// `Fix` → `Fixes`.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with('y')
        && !lower.ends_with("ay")
        && !lower.ends_with("ey")
        && !lower.ends_with("oy")
        && !lower.ends_with("uy")
    {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::{CategoryConfig, PriorityConfig};
    use pretty_assertions::assert_eq;

    fn settings(categories: &[&str], priorities: &[&str]) -> Settings {
        let mut s = Settings::default();
        s.categories = categories
            .iter()
            .map(|c| CategoryConfig {
                name: c.to_string(),
                color: None,
            })
            .collect();
        s.priorities = priorities
            .iter()
            .map(|p| PriorityConfig {
                name: p.to_string(),
                color: None,
            })
            .collect();
        s
    }

    fn view_names(config: &BaseConfig) -> Vec<&str> {
        config.views.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_global_views_interleave_categories_and_priorities() {
        let reg = PropertyRegistry::standard();
        let config =
            generate_global_config(&settings(&["Bug", "Story"], &["High", "Low"]), &reg).unwrap();
        assert_eq!(
            view_names(&config),
            vec![
                "Tasks",
                "All Bugs",
                "Bug • High priority",
                "Bug • Low priority",
                "All Stories",
                "Story • High priority",
                "Story • Low priority",
            ]
        );

        let pair = config.view("Story • Low priority").unwrap();
        let Filter::And(filters) = &pair.filter else {
            panic!("expected an and-filter");
        };
        let rendered: Vec<String> = filters.iter().filter_map(Filter::predicate).collect();
        assert_eq!(
            rendered,
            vec![
                "file.inFolder(\"Tasks\")",
                "note[\"Parent task\"].isEmpty()",
                "Category == \"Story\"",
                "Priority == \"Low\"",
            ]
        );
    }

    #[test]
    fn test_area_base_without_categories_has_only_main_view() {
        let reg = PropertyRegistry::standard();
        let config = generate_scoped_config(
            &Settings::default(),
            &reg,
            &ContainerScope::Area("Finance".into()),
        )
        .unwrap();
        assert_eq!(view_names(&config), vec!["Tasks"]);

        let Filter::And(filters) = &config.views[0].filter else {
            panic!("expected an and-filter");
        };
        assert_eq!(
            filters.last().and_then(Filter::predicate).unwrap(),
            "Areas.contains(link(\"Finance\"))"
        );
        assert!(!config.properties.contains_key("Areas"));
        assert!(config.properties.contains_key("Project"));
    }

    #[test]
    fn test_project_scope_uses_bare_name_and_drops_columns() {
        let reg = PropertyRegistry::standard();
        let config = generate_scoped_config(
            &Settings::default(),
            &reg,
            &ContainerScope::Project("Projects/Apollo.md".into()),
        )
        .unwrap();
        let Filter::And(filters) = &config.views[0].filter else {
            panic!("expected an and-filter");
        };
        assert_eq!(
            filters.last().and_then(Filter::predicate).unwrap(),
            "Project.contains(link(\"Apollo\"))"
        );
        assert!(!config.views[0].column_order.iter().any(|c| c == "Project"));
        assert!(!config.views[0].column_order.iter().any(|c| c == "Areas"));
    }

    #[test]
    fn test_sort_is_fixed() {
        let reg = PropertyRegistry::standard();
        let config = generate_global_config(&Settings::default(), &reg).unwrap();
        let sort: Vec<(&str, SortDirection)> = config.views[0]
            .sort
            .iter()
            .map(|k| (k.property.as_str(), k.direction))
            .collect();
        assert_eq!(
            sort,
            vec![
                ("Done", SortDirection::Asc),
                ("file.mtime", SortDirection::Desc),
                ("file.ctime", SortDirection::Desc),
                ("formula.Title", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn test_empty_or_escaping_tasks_folder_is_rejected() {
        let reg = PropertyRegistry::standard();
        for folder in ["", "  ", "/", "../Tasks", "a/./b"] {
            let mut s = Settings::default();
            s.folders.tasks = folder.to_string();
            assert!(
                matches!(
                    generate_global_config(&s, &reg),
                    Err(BaseError::ConfigurationInvalid(_))
                ),
                "{:?}",
                folder
            );
        }
    }

    #[test]
    fn test_empty_entity_folders_are_rejected() {
        let mut s = Settings::default();
        assert!(entity_folders(&s).is_ok());
        s.folders.projects = " / ".into();
        assert!(matches!(
            entity_folder(&s, EntityKind::Project),
            Err(BaseError::ConfigurationInvalid(msg)) if msg == "projects folder setting is empty"
        ));
        assert!(entity_folders(&s).is_err());

        let mut s = Settings::default();
        s.folders.areas = "".into();
        assert!(entity_folder(&s, EntityKind::Area).is_err());
        assert_eq!(entity_folder(&s, EntityKind::Task).unwrap(), "Tasks");
    }

    #[test]
    fn test_unknown_column_keys_are_skipped() {
        let reg = PropertyRegistry::standard();
        let mut s = Settings::default();
        s.bases.columns = vec!["TITLE".into(), "ESTIMATE".into(), "DONE".into()];
        let config = generate_global_config(&s, &reg).unwrap();
        assert_eq!(config.views[0].column_order, vec!["formula.Title", "Done"]);
        assert_eq!(config.formulas.len(), 1);
    }

    #[test]
    fn test_generation_is_byte_identical() {
        let reg = PropertyRegistry::standard();
        let s = settings(&["Bug", "Feature"], &["High"]);
        let first = render_base(&s, &reg, &Scope::Global).unwrap();
        let second = render_base(&s, &reg, &Scope::Global).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("Bug"), "Bugs");
        assert_eq!(pluralize("Story"), "Stories");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Fix"), "Fixes");
        assert_eq!(pluralize("Research"), "Researches");
        assert_eq!(pluralize("Task"), "Tasks");
    }

    #[test]
    fn test_parent_task_base_snapshot() {
        let reg = PropertyRegistry::standard();
        let text = render_base(
            &Settings::default(),
            &reg,
            &Scope::ParentTask("Write docs".into()),
        )
        .unwrap();
        insta::assert_snapshot!(text, @r#"
formulas:
  Title: link(file.name, Title)
properties:
  formula.Title:
    displayName: Title
  Type:
    displayName: Type
  Category:
    displayName: Category
  Priority:
    displayName: Priority
  Areas:
    displayName: Areas
  Project:
    displayName: Project
  Done:
    displayName: Done
  Status:
    displayName: Status
  file.mtime:
    displayName: Updated At
  file.ctime:
    displayName: Created At
views:
- type: table
  name: Sub-tasks
  filters:
    and:
    - file.inFolder("Tasks")
    - note["Parent task"] == link("Write docs")
  order:
  - formula.Title
  - Type
  - Category
  - Priority
  - Areas
  - Project
  - Done
  - Status
  - file.mtime
  - file.ctime
  sort:
  - property: Done
    direction: ASC
  - property: file.mtime
    direction: DESC
  - property: file.ctime
    direction: DESC
  - property: formula.Title
    direction: ASC
- type: table
  name: All Related
  filters:
    or:
    - formula.Title == link("Write docs")
    - note["Parent task"] == link("Write docs")
  order:
  - formula.Title
  - Type
  - Category
  - Priority
  - Areas
  - Project
  - Done
  - Status
  - file.mtime
  - file.ctime
  sort:
  - property: Done
    direction: ASC
  - property: file.mtime
    direction: DESC
  - property: file.ctime
    direction: DESC
  - property: formula.Title
    direction: ASC
"#);
    }
}
