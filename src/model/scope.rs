use serde::Serialize;

use crate::model::config::normalize_folder;

/// Classification of the document a checklist line lives in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum DocumentContext {
    Area(String),
    Project(String),
    Task(String),
    None,
}

/// What a generated base file is filtered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "kebab-case")]
pub enum Scope {
    Global,
    Area(String),
    Project(String),
    ParentTask(String),
}

impl Scope {
    /// File name of the base for this scope
    pub fn base_file_name(&self) -> String {
        match self {
            Scope::Global => "Tasks.base".to_string(),
            Scope::Area(name) | Scope::Project(name) | Scope::ParentTask(name) => {
                format!("{}.base", bare_name(name))
            }
        }
    }

    /// Vault-relative path of the base file under `bases_folder`
    pub fn base_path(&self, bases_folder: &str) -> String {
        let folder = normalize_folder(bases_folder);
        if folder.is_empty() {
            self.base_file_name()
        } else {
            format!("{}/{}", folder, self.base_file_name())
        }
    }

    pub fn label(&self) -> String {
        match self {
            Scope::Global => "Tasks".to_string(),
            Scope::Area(name) => format!("area {}", name),
            Scope::Project(name) => format!("project {}", name),
            Scope::ParentTask(name) => format!("task {}", name),
        }
    }
}

/// Reduce a note reference to the bare name the base engine links by:
/// no folder prefix, no `.md`/`.base` extension, no alias or heading.
pub fn bare_name(name: &str) -> String {
    let name = name.trim();
    let name = name
        .strip_prefix("[[")
        .and_then(|n| n.strip_suffix("]]"))
        .unwrap_or(name);
    let name = name.split('|').next().unwrap_or(name);
    let name = name.split('#').next().unwrap_or(name);
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let name = name
        .strip_suffix(".md")
        .or_else(|| name.strip_suffix(".base"))
        .unwrap_or(name);
    name.trim().to_string()
}
