use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::commands::InitArgs;
use crate::io::settings_io::{
    self, NamedList, SETTINGS_DIR, SETTINGS_TEMPLATE, SettingsError, add_named,
};
use crate::model::config::Settings;

/// Validate a category name given on the command line.
fn validate_category(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("category name cannot be empty".to_string());
    }
    if trimmed.contains(['"', '\n', '[', ']']) {
        return Err(format!(
            "invalid category \"{}\": quotes, brackets and newlines are not allowed",
            name
        ));
    }
    Ok(())
}

/// Settings template with `categories` filled in below the commented example
fn render_settings(categories: &[String]) -> Result<String, SettingsError> {
    if categories.is_empty() {
        return Ok(SETTINGS_TEMPLATE.to_string());
    }
    let mut doc: toml_edit::DocumentMut = SETTINGS_TEMPLATE.parse()?;
    for name in categories {
        add_named(&mut doc, NamedList::Categories, name);
    }
    Ok(doc.to_string())
}

/// Entity folders plus the bases folder, as configured
fn vault_folders(settings: &Settings) -> [&str; 4] {
    [
        settings.folders.tasks.as_str(),
        settings.folders.areas.as_str(),
        settings.folders.projects.as_str(),
        settings.folders.bases.as_str(),
    ]
}

fn target_dir(vault_dir: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match vault_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            Ok(fs::canonicalize(dir)?)
        }
        None => Ok(std::env::current_dir()?),
    }
}

pub fn cmd_init(args: InitArgs, vault_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let root = target_dir(vault_dir)?;
    let settings_file = settings_io::settings_path(&root);

    if settings_file.is_file() && !args.force {
        return Err(format!(
            "vault already initialized ({}/ exists, use --force to overwrite)",
            SETTINGS_DIR
        )
        .into());
    }

    // Nested vaults work, but the outer one will also see these notes
    if let Some(parent) = root.parent()
        && let Ok(parent_root) = settings_io::discover_vault(parent)
    {
        eprintln!("Note: enclosing vault found at {}/", parent_root.display());
    }

    for name in &args.category {
        validate_category(name)?;
    }

    let text = render_settings(&args.category)?;
    let settings: Settings = toml::from_str(&text)?;

    fs::create_dir_all(root.join(SETTINGS_DIR))?;
    fs::write(&settings_file, &text)?;

    let mut created: Vec<&str> = Vec::new();
    if !args.no_folders {
        for folder in vault_folders(&settings) {
            let path = root.join(folder);
            if !path.is_dir() {
                fs::create_dir_all(&path)?;
                created.push(folder);
            }
        }
    }

    tracing::debug!(root = %root.display(), "initialized vault");
    println!("Initialized tasksync vault in {}", display_root(&root));
    for folder in created {
        println!("  folder: {}/", folder);
    }
    for name in &args.category {
        println!("  category: {}", name.trim());
    }
    Ok(())
}

fn display_root(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .map(|n| format!("./{}", n))
        .unwrap_or_else(|| root.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_category() {
        assert!(validate_category("Bug").is_ok());
        assert!(validate_category("Tech debt").is_ok());
        assert!(validate_category("  ").is_err());
        assert!(validate_category("say \"hi\"").is_err());
        assert!(validate_category("[[Link]]").is_err());
    }

    #[test]
    fn test_render_settings_without_categories_is_template() {
        assert_eq!(render_settings(&[]).unwrap(), SETTINGS_TEMPLATE);
    }

    #[test]
    fn test_render_settings_with_categories() {
        let text = render_settings(&["Bug".to_string(), "Feature".to_string()]).unwrap();
        // Comments survive the edit
        assert!(text.contains("# Add entries with: tsync category add <name>"));
        let settings: Settings = toml::from_str(&text).unwrap();
        assert_eq!(settings.category_names(), vec!["Bug", "Feature"]);
        assert_eq!(settings.folders.bases, "Bases");
    }

    #[test]
    fn test_vault_folders_follow_settings() {
        let mut settings = Settings::default();
        settings.folders.tasks = "Work/Tasks".into();
        assert_eq!(
            vault_folders(&settings),
            ["Work/Tasks", "Areas", "Projects", "Bases"]
        );
    }
}
