use serde::Serialize;

use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::promote::{LineStatus, PromotedTask, RevertedTask, ScannedLine};
use crate::ops::refresh::RefreshReport;
use crate::ops::sync::{SyncChange, SyncDirection, SyncReport};
use crate::parse::TodoLineMatch;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ParseJson {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<TodoLineMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_target: Option<String>,
    /// Target of a link-only line without a checkbox
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bare_reference: Option<String>,
}

#[derive(Serialize)]
pub struct ScanJson<'a> {
    pub document: &'a str,
    pub lines: Vec<ScannedLineJson<'a>>,
}

/// A scanned line with its 1-based number
#[derive(Serialize)]
pub struct ScannedLineJson<'a> {
    pub line: usize,
    pub completed: bool,
    pub body: &'a str,
    #[serde(flatten)]
    pub status: &'a LineStatus,
}

#[derive(Serialize)]
pub struct BaseJson<'a> {
    pub path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<bool>,
    pub content: &'a str,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn scan_to_json<'a>(document: &'a str, lines: &'a [ScannedLine]) -> ScanJson<'a> {
    ScanJson {
        document,
        lines: lines
            .iter()
            .map(|l| ScannedLineJson {
                line: l.line + 1,
                completed: l.completed,
                body: &l.body,
                status: &l.status,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn mark(completed: bool) -> char {
    if completed { 'x' } else { ' ' }
}

/// Describe a parsed checklist line, one fact per line
pub fn format_parse(m: Option<&TodoLineMatch>, bare_reference: Option<&str>) -> Vec<String> {
    let Some(m) = m else {
        return match bare_reference {
            Some(target) => vec![format!("link-only line -> [[{}]]", target)],
            None => vec!["not a checklist item".to_string()],
        };
    };
    let mut lines = vec![
        format!("checklist item [{}]", mark(m.completed)),
        format!("indent: {:?}", m.indentation),
        format!("marker: {}", m.list_marker),
        format!("body: {}", m.body_text),
    ];
    if m.embedded_references.is_empty() {
        lines.push("references: none".to_string());
    } else {
        lines.push(format!(
            "references: {}",
            m.embedded_references
                .iter()
                .map(|r| format!("[[{}]]", r))
                .collect::<Vec<_>>()
                .join(" ")
        ));
    }
    if m.is_bare_reference() {
        lines.push("promoted link".to_string());
    }
    lines
}

pub fn format_scanned_line(l: &ScannedLine) -> String {
    let status = match &l.status {
        LineStatus::Promoted { entity } => format!("promoted -> {}", entity),
        LineStatus::Linked { target } => format!("links {}", target),
        LineStatus::Plain => "plain".to_string(),
    };
    format!("{:>4}  [{}] {}  ({})", l.line + 1, mark(l.completed), l.body, status)
}

pub fn format_promoted(p: &PromotedTask) -> Vec<String> {
    let verb = if p.relinked { "Linked" } else { "Promoted" };
    let mut lines = vec![
        format!("{} {}:{} -> {}", verb, p.document, p.line + 1, p.entity_path),
        format!("  {}", p.line_text),
    ];
    if let Some(base) = &p.updated_base {
        lines.push(format!("  updated {}", base));
    }
    lines
}

pub fn format_reverted(r: &RevertedTask) -> Vec<String> {
    vec![
        format!("Reverted {}:{} (deleted {})", r.document, r.line + 1, r.entity_id),
        format!("  {}", r.line_text),
    ]
}

pub fn format_sync_change(c: &SyncChange) -> String {
    let state = if c.completed { "done" } else { "open" };
    match c.direction {
        SyncDirection::EntityToDocument => format!(
            "{}:{} [{}] <- {} ({})",
            c.document,
            c.line + 1,
            mark(c.completed),
            c.entity_id,
            state
        ),
        SyncDirection::DocumentToEntity => format!(
            "{} -> {} ({}:{})",
            c.entity_id,
            state,
            c.document,
            c.line + 1
        ),
    }
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines: Vec<String> = report.changes.iter().map(format_sync_change).collect();
    for f in &report.failed {
        lines.push(format!("failed: {}: {}", f.path, f.error));
    }
    if lines.is_empty() {
        lines.push("Everything in sync".to_string());
    }
    lines
}

pub fn format_refresh_report(report: &RefreshReport) -> Vec<String> {
    let mut lines = Vec::new();
    for path in &report.written {
        lines.push(format!("wrote {}", path));
    }
    for f in &report.failed {
        lines.push(format!("failed {}: {}", f.scope.label(), f.error));
    }
    lines.push(format!(
        "{} written, {} unchanged, {} failed",
        report.written.len(),
        report.unchanged.len(),
        report.failed.len()
    ));
    lines
}

pub fn format_check_error(err: &CheckError) -> String {
    match err {
        CheckError::InvalidTasksFolder { folder, reason } => {
            format!("folders.tasks \"{}\": {}", folder, reason)
        }
        CheckError::InvalidEntityFolder {
            setting,
            folder,
            reason,
        } => format!("{} \"{}\": {}", setting, folder, reason),
        CheckError::UnknownProperty { key, setting } => {
            format!("{} names unknown property {}", setting, key)
        }
    }
}

pub fn format_check_warning(warn: &CheckWarning) -> String {
    match warn {
        CheckWarning::DuplicateCategory { name } => format!("category \"{}\" listed twice", name),
        CheckWarning::DuplicatePriority { name } => format!("priority \"{}\" listed twice", name),
        CheckWarning::PrioritiesWithoutCategories => {
            "priorities have no effect without categories".to_string()
        }
        CheckWarning::OverlappingFolders { first, second } => {
            format!("folders \"{}\" and \"{}\" overlap", first, second)
        }
        CheckWarning::MissingSourceDocument { entity, document } => {
            format!("{} was promoted from missing {}", entity, document)
        }
        CheckWarning::UnlinkedPromotion { entity, document } => {
            format!("{} is no longer linked from {}", entity, document)
        }
        CheckWarning::BasePathCollision { path, scopes } => {
            format!("{} is generated by {}", path, scopes.join(", "))
        }
    }
}

pub fn format_check_result(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.errors.is_empty() {
        lines.push("Errors:".to_string());
        for err in &result.errors {
            lines.push(format!("  {}", format_check_error(err)));
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            lines.push(String::new());
        }
        lines.push("Warnings:".to_string());
        for warn in &result.warnings {
            lines.push(format!("  {}", format_check_warning(warn)));
        }
    }
    if result.valid && result.warnings.is_empty() {
        lines.push("Vault is valid".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_checklist_line;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_parse_lists_references() {
        let m = parse_checklist_line("  - [x] call [[Bob]] about [[Plan|the plan]]", 0).unwrap();
        assert_eq!(
            format_parse(Some(&m), None),
            vec![
                "checklist item [x]",
                "indent: \"  \"",
                "marker: -",
                "body: call [[Bob]] about [[Plan|the plan]]",
                "references: [[Bob]] [[Plan]]",
            ]
        );
        assert_eq!(format_parse(None, Some("Bob")), vec!["link-only line -> [[Bob]]"]);
        assert_eq!(format_parse(None, None), vec!["not a checklist item"]);
    }

    #[test]
    fn test_scanned_lines_are_one_based() {
        let line = ScannedLine {
            line: 4,
            completed: true,
            body: "[[Pay rent]]".into(),
            status: LineStatus::Promoted {
                entity: "Pay rent".into(),
            },
        };
        assert_eq!(
            format_scanned_line(&line),
            "   5  [x] [[Pay rent]]  (promoted -> Pay rent)"
        );
        let json = serde_json::to_value(scan_to_json("Notes.md", std::slice::from_ref(&line)))
            .unwrap();
        assert_eq!(json["lines"][0]["line"], 5);
        assert_eq!(json["lines"][0]["status"], "promoted");
        assert_eq!(json["lines"][0]["entity"], "Pay rent");
    }

    #[test]
    fn test_check_lines_for_folders_and_collisions() {
        let err = CheckError::InvalidEntityFolder {
            setting: "folders.areas".into(),
            folder: "".into(),
            reason: "areas folder setting is empty".into(),
        };
        assert_eq!(
            format_check_error(&err),
            "folders.areas \"\": areas folder setting is empty"
        );
        let warn = CheckWarning::BasePathCollision {
            path: "Bases/Apollo.base".into(),
            scopes: vec!["area Apollo".into(), "project Apollo".into()],
        };
        assert_eq!(
            format_check_warning(&warn),
            "Bases/Apollo.base is generated by area Apollo, project Apollo"
        );
    }

    #[test]
    fn test_sync_change_formats() {
        let change = SyncChange {
            direction: SyncDirection::DocumentToEntity,
            entity_id: "Tasks/Pay rent.md".into(),
            document: "Notes.md".into(),
            line: 0,
            completed: true,
        };
        assert_eq!(
            format_sync_change(&change),
            "Tasks/Pay rent.md -> done (Notes.md:1)"
        );
        assert_eq!(
            format_sync_report(&SyncReport::default()),
            vec!["Everything in sync"]
        );
    }
}
