use std::fs;
use std::path::{Path, PathBuf};

use crate::io::fs_store::atomic_write;
use crate::model::config::{Settings, normalize_folder};

/// Directory holding vault settings and the lock file
pub const SETTINGS_DIR: &str = ".tasksync";
pub const SETTINGS_FILE: &str = "settings.toml";

/// Error type for settings discovery, loading and editing
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("not a tasksync vault: no .tasksync/settings.toml found")]
    NotAVault,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse settings.toml: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("could not edit settings.toml: {0}")]
    EditError(#[from] toml_edit::TomlError),
    #[error("unknown folder kind \"{0}\" (expected tasks, areas, projects or bases)")]
    UnknownFolder(String),
}

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Find the vault root by walking up from `start`, looking for
/// `.tasksync/settings.toml`.
pub fn discover_vault(start: &Path) -> Result<PathBuf, SettingsError> {
    let mut current = start.to_path_buf();
    loop {
        if settings_path(&current).is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(SettingsError::NotAVault);
        }
    }
}

pub fn load_settings(root: &Path) -> Result<Settings, SettingsError> {
    Ok(read_settings(root)?.0)
}

/// Read the settings, returning both the parsed form and the raw toml_edit
/// document for round-trip-safe editing.
pub fn read_settings(root: &Path) -> Result<(Settings, toml_edit::DocumentMut), SettingsError> {
    let path = settings_path(root);
    let text = fs::read_to_string(&path).map_err(|e| SettingsError::ReadError {
        path: path.clone(),
        source: e,
    })?;
    let settings: Settings = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok((settings, doc))
}

/// Write the settings document back, preserving comments and layout
pub fn write_settings(root: &Path, doc: &toml_edit::DocumentMut) -> Result<(), SettingsError> {
    let path = settings_path(root);
    atomic_write(&path, doc.to_string().as_bytes())
        .map_err(|e| SettingsError::WriteError { path, source: e })
}

/// Which named list an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedList {
    Categories,
    Priorities,
}

impl NamedList {
    fn table(self) -> &'static str {
        match self {
            NamedList::Categories => "categories",
            NamedList::Priorities => "priorities",
        }
    }
}

/// Append `[[categories]]`/`[[priorities]]` entry `name`. Returns false when
/// an entry with that name (ignoring case and surrounding space) exists.
pub fn add_named(doc: &mut toml_edit::DocumentMut, list: NamedList, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || position_of(doc, list, name).is_some() {
        return false;
    }
    if !doc.contains_key(list.table()) {
        doc[list.table()] = toml_edit::Item::ArrayOfTables(toml_edit::ArrayOfTables::new());
    }
    match doc[list.table()].as_array_of_tables_mut() {
        Some(tables) => {
            let mut table = toml_edit::Table::new();
            table["name"] = toml_edit::value(name);
            tables.push(table);
            true
        }
        None => false,
    }
}

/// Remove the entry named `name`. Returns false if there was none.
pub fn remove_named(doc: &mut toml_edit::DocumentMut, list: NamedList, name: &str) -> bool {
    let Some(index) = position_of(doc, list, name.trim()) else {
        return false;
    };
    let Some(tables) = doc[list.table()].as_array_of_tables_mut() else {
        return false;
    };
    tables.remove(index);
    if tables.is_empty() {
        doc.remove(list.table());
    }
    true
}

fn position_of(doc: &toml_edit::DocumentMut, list: NamedList, name: &str) -> Option<usize> {
    doc.get(list.table())?
        .as_array_of_tables()?
        .iter()
        .position(|t| {
            t.get("name")
                .and_then(|v| v.as_str())
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })
}

/// Set `[folders].<kind>`, normalizing the path
pub fn set_folder(
    doc: &mut toml_edit::DocumentMut,
    kind: &str,
    folder: &str,
) -> Result<String, SettingsError> {
    let kind = kind.trim().to_ascii_lowercase();
    if !matches!(kind.as_str(), "tasks" | "areas" | "projects" | "bases") {
        return Err(SettingsError::UnknownFolder(kind));
    }
    if !doc.contains_key("folders") {
        doc["folders"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let folder = normalize_folder(folder);
    doc["folders"][kind.as_str()] = toml_edit::value(folder.as_str());
    Ok(folder)
}

/// Settings written by `tsync init`
pub const SETTINGS_TEMPLATE: &str = r##"# tasksync vault settings

[folders]
tasks = "Tasks"
areas = "Areas"
projects = "Projects"
bases = "Bases"

[bases]
# Regenerate the parent task's base after promoting from inside a task note
auto_update = true
# Fail at startup when a configured column names an unknown property
strict_properties = true
# Override the task base columns with registry keys, e.g.
# columns = ["TITLE", "CATEGORY", "PRIORITY", "DONE", "UPDATED_AT"]

[defaults]
status = "Backlog"
done_status = "Done"
# category = "Task"

# --- Categories ---
# One base view per category, plus one per category and priority pair.
# Add entries with: tsync category add <name>
#
# [[categories]]
# name = "Bug"
# color = "#FF4444"

# --- Priorities ---
# Add entries with: tsync priority add <name>
#
# [[priorities]]
# name = "High"
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_vault(text: &str) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(SETTINGS_DIR)).unwrap();
        fs::write(settings_path(tmp.path()), text).unwrap();
        tmp
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let settings: Settings = toml::from_str(SETTINGS_TEMPLATE).unwrap();
        assert_eq!(settings.folders.tasks, "Tasks");
        assert!(settings.categories.is_empty());
        assert_eq!(settings.status_for(true), Some("Done"));
    }

    #[test]
    fn test_discover_walks_up() {
        let tmp = write_vault(SETTINGS_TEMPLATE);
        let nested = tmp.path().join("Areas/Deep");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(discover_vault(&nested).unwrap(), tmp.path());

        let other = TempDir::new().unwrap();
        assert!(matches!(
            discover_vault(other.path()),
            Err(SettingsError::NotAVault)
        ));
    }

    #[test]
    fn test_round_trip_preserves_comments() {
        let tmp = write_vault(SETTINGS_TEMPLATE);
        let (_, doc) = read_settings(tmp.path()).unwrap();
        write_settings(tmp.path(), &doc).unwrap();
        assert_eq!(
            fs::read_to_string(settings_path(tmp.path())).unwrap(),
            SETTINGS_TEMPLATE
        );
    }

    #[test]
    fn test_add_and_remove_categories() {
        let mut doc: toml_edit::DocumentMut = SETTINGS_TEMPLATE.parse().unwrap();
        assert!(add_named(&mut doc, NamedList::Categories, "Bug"));
        assert!(add_named(&mut doc, NamedList::Categories, "Feature"));
        assert!(!add_named(&mut doc, NamedList::Categories, " bug "));
        assert!(!add_named(&mut doc, NamedList::Categories, ""));

        let settings: Settings = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(settings.category_names(), vec!["Bug", "Feature"]);

        assert!(remove_named(&mut doc, NamedList::Categories, "bug"));
        assert!(!remove_named(&mut doc, NamedList::Categories, "Bug"));
        let settings: Settings = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(settings.category_names(), vec!["Feature"]);
        assert!(doc.to_string().contains("# tasksync vault settings"));
    }

    #[test]
    fn test_priorities_are_separate_from_categories() {
        let mut doc: toml_edit::DocumentMut = "".parse().unwrap();
        assert!(add_named(&mut doc, NamedList::Priorities, "High"));
        assert!(add_named(&mut doc, NamedList::Categories, "High"));
        let settings: Settings = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(settings.priority_names(), vec!["High"]);
        assert_eq!(settings.category_names(), vec!["High"]);
    }

    #[test]
    fn test_set_folder() {
        let mut doc: toml_edit::DocumentMut = SETTINGS_TEMPLATE.parse().unwrap();
        assert_eq!(
            set_folder(&mut doc, "Tasks", "/Work/Tasks/").unwrap(),
            "Work/Tasks"
        );
        let settings: Settings = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(settings.folders.tasks, "Work/Tasks");
        assert!(matches!(
            set_folder(&mut doc, "inbox", "x"),
            Err(SettingsError::UnknownFolder(_))
        ));
    }
}
