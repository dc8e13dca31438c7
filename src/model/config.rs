use serde::{Deserialize, Serialize};

/// Configuration from `.tasksync/settings.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub folders: FolderSettings,
    #[serde(default)]
    pub bases: BaseSettings,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub priorities: Vec<PriorityConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// Vault-relative folders. Leading/trailing slashes are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSettings {
    #[serde(default = "default_tasks_folder")]
    pub tasks: String,
    #[serde(default = "default_areas_folder")]
    pub areas: String,
    #[serde(default = "default_projects_folder")]
    pub projects: String,
    #[serde(default = "default_bases_folder")]
    pub bases: String,
}

impl Default for FolderSettings {
    fn default() -> Self {
        FolderSettings {
            tasks: default_tasks_folder(),
            areas: default_areas_folder(),
            projects: default_projects_folder(),
            bases: default_bases_folder(),
        }
    }
}

fn default_tasks_folder() -> String {
    "Tasks".to_string()
}

fn default_areas_folder() -> String {
    "Areas".to_string()
}

fn default_projects_folder() -> String {
    "Projects".to_string()
}

fn default_bases_folder() -> String {
    "Bases".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseSettings {
    /// Regenerate affected base files after promotions
    #[serde(default = "default_true")]
    pub auto_update: bool,
    /// Reject unknown property keys at startup instead of skipping them
    #[serde(default = "default_true")]
    pub strict_properties: bool,
    /// Registry keys for task-base columns. Empty means the built-in set.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Default for BaseSettings {
    fn default() -> Self {
        BaseSettings {
            auto_update: true,
            strict_properties: true,
            columns: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Values seeded into newly promoted tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub category: Option<String>,
    /// Status for open tasks; `None` leaves Status alone
    #[serde(default = "default_status")]
    pub status: Option<String>,
    /// Status for completed tasks; `None` leaves Status alone
    #[serde(default = "default_done_status")]
    pub done_status: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        DefaultsConfig {
            category: None,
            status: default_status(),
            done_status: default_done_status(),
        }
    }
}

fn default_status() -> Option<String> {
    Some("Backlog".to_string())
}

fn default_done_status() -> Option<String> {
    Some("Done".to_string())
}

impl Settings {
    /// Category names in configured order, blanks and repeats removed
    pub fn category_names(&self) -> Vec<&str> {
        dedup_names(self.categories.iter().map(|c| c.name.as_str()))
    }

    /// Priority names in configured order, blanks and repeats removed
    pub fn priority_names(&self) -> Vec<&str> {
        dedup_names(self.priorities.iter().map(|p| p.name.as_str()))
    }

    /// Category given to new tasks: explicit default, else the first configured one
    pub fn default_category(&self) -> Option<&str> {
        self.defaults
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.category_names().first().copied())
    }

    /// Status that matches a done-state, if statuses are in use
    pub fn status_for(&self, done: bool) -> Option<&str> {
        if done {
            self.defaults.done_status.as_deref()
        } else {
            self.defaults.status.as_deref()
        }
    }

    /// Column override, if any
    pub fn column_override(&self) -> Option<&[String]> {
        if self.bases.columns.is_empty() {
            None
        } else {
            Some(&self.bases.columns)
        }
    }
}

fn dedup_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for name in names.map(str::trim) {
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Normalize a vault-relative folder: trims whitespace and surrounding slashes,
/// converts backslashes.
pub fn normalize_folder(folder: &str) -> String {
    folder.trim().replace('\\', "/").trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_settings_use_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.folders.tasks, "Tasks");
        assert_eq!(settings.folders.bases, "Bases");
        assert!(settings.bases.auto_update);
        assert!(settings.bases.strict_properties);
        assert!(settings.categories.is_empty());
        assert_eq!(settings.status_for(false), Some("Backlog"));
        assert_eq!(settings.status_for(true), Some("Done"));
    }

    #[test]
    fn names_are_trimmed_and_deduplicated() {
        let settings: Settings = toml::from_str(
            r##"
[[categories]]
name = "Bug"

[[categories]]
name = " Bug "

[[categories]]
name = ""

[[categories]]
name = "Feature"
color = "#ff0000"
"##,
        )
        .unwrap();
        assert_eq!(settings.category_names(), vec!["Bug", "Feature"]);
        assert_eq!(settings.default_category(), Some("Bug"));
    }

    #[test]
    fn explicit_default_category_wins() {
        let mut settings = Settings::default();
        settings.categories.push(CategoryConfig {
            name: "Bug".into(),
            color: None,
        });
        settings.defaults.category = Some("Chore".into());
        assert_eq!(settings.default_category(), Some("Chore"));
    }

    #[test]
    fn normalize_folder_strips_slashes() {
        assert_eq!(normalize_folder(" /Work/Tasks/ "), "Work/Tasks");
        assert_eq!(normalize_folder("Work\\Tasks"), "Work/Tasks");
        assert_eq!(normalize_folder("/"), "");
    }
}
