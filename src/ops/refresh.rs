use serde::Serialize;

use crate::io::store::{DocumentStore, EntityStore, StoreError};
use crate::model::config::Settings;
use crate::model::entity::EntityKind;
use crate::model::property::PropertyRegistry;
use crate::model::scope::Scope;
use crate::ops::base_gen::{BaseError, entity_folders, render_base};

/// Whether a base write changed anything on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Result of regenerating every base
#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    /// Base paths whose content changed
    pub written: Vec<String>,
    /// Base paths that already held the generated content
    pub unchanged: Vec<String>,
    pub failed: Vec<RefreshFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub scope: Scope,
    pub error: String,
}

impl RefreshReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Generate the base for `scope` and write it under the bases folder.
/// Byte-identical content is not rewritten.
pub fn write_base<S: DocumentStore + ?Sized>(
    store: &S,
    settings: &Settings,
    registry: &PropertyRegistry,
    scope: &Scope,
) -> Result<(String, WriteOutcome), BaseError> {
    let text = render_base(settings, registry, scope)?;
    let path = scope.base_path(&settings.folders.bases);

    if store.document_exists(&path) && store.read_document(&path)? == text {
        tracing::debug!(path = %path, "base unchanged");
        return Ok((path, WriteOutcome::Unchanged));
    }
    store.write_document(&path, &text)?;
    tracing::debug!(path = %path, "base written");
    Ok((path, WriteOutcome::Written))
}

/// Regenerate the global base, then one base per area and per project in
/// name order. Runs sequentially and keeps going past individual failures.
/// A scope whose base file an earlier scope already claimed is reported as
/// failed instead of overwriting it.
pub fn refresh_all_bases<S: DocumentStore + EntityStore + ?Sized>(
    settings: &Settings,
    registry: &PropertyRegistry,
    store: &S,
) -> Result<RefreshReport, BaseError> {
    entity_folders(settings)?;
    let scopes = refresh_scopes(store)?;

    let mut report = RefreshReport::default();
    let mut claimed: Vec<(String, String)> = Vec::new();
    for scope in scopes {
        let path = scope.base_path(&settings.folders.bases).to_lowercase();
        if let Some((_, owner)) = claimed.iter().find(|(p, _)| *p == path) {
            let error = format!("base file is already generated for {}", owner);
            tracing::warn!(scope = %scope.label(), %error, "base refresh skipped");
            report.failed.push(RefreshFailure { scope, error });
            continue;
        }
        claimed.push((path, scope.label()));

        match write_base(store, settings, registry, &scope) {
            Ok((path, WriteOutcome::Written)) => report.written.push(path),
            Ok((path, WriteOutcome::Unchanged)) => report.unchanged.push(path),
            Err(e) => {
                tracing::warn!(scope = %scope.label(), error = %e, "base refresh failed");
                report.failed.push(RefreshFailure {
                    scope,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        failed = report.failed.len(),
        "refreshed bases"
    );
    Ok(report)
}

/// Every scope a full refresh writes: the global base, then areas and
/// projects in name order. Names come from file stems, so a note with
/// unreadable front matter still gets its base.
pub fn refresh_scopes<S: EntityStore + ?Sized>(store: &S) -> Result<Vec<Scope>, StoreError> {
    let mut scopes = vec![Scope::Global];
    scopes.extend(
        store
            .list_entity_names(EntityKind::Area)?
            .into_iter()
            .map(Scope::Area),
    );
    scopes.extend(
        store
            .list_entity_names(EntityKind::Project)?
            .into_iter()
            .map(Scope::Project),
    );
    Ok(scopes)
}
