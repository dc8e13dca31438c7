use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::scope::bare_name;

static CHECKLIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)([-*])\s*\[([xX\s])\]\s*(.+)$").unwrap());

/// `[[target]]`, `[[target|alias]]`, `[[target#heading]]`. Empty and nested
/// brackets never match.
static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap());

/// A list item that is nothing but a link: `- [[Target]]` or `[[Target]]`
static BARE_REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*]\s+)?(\[\[[^\[\]]+\]\])\s*$").unwrap());

/// A recognized checklist line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoLineMatch {
    pub indentation: String,
    pub list_marker: char,
    /// The exact character between the brackets
    pub checkbox: char,
    pub completed: bool,
    pub body_text: String,
    /// 0-based line number in the source document
    pub line_number: usize,
    /// Link targets in the body, left to right
    pub embedded_references: Vec<String>,

    // --- Source tracking ---
    #[serde(skip)]
    pub source: String,
    #[serde(skip)]
    pub checkbox_range: Range<usize>,
    #[serde(skip)]
    pub body_start: usize,
}

impl TodoLineMatch {
    /// The link a promotion uses. Only the first reference counts.
    pub fn promotion_target(&self) -> Option<&str> {
        self.embedded_references.first().map(String::as_str)
    }

    /// True when the body is a single link and nothing else (a promoted line)
    pub fn is_bare_reference(&self) -> bool {
        let body = self.body_text.trim();
        REFERENCE_RE
            .find(body)
            .is_some_and(|m| m.start() == 0 && m.end() == body.len())
    }

    /// Same line with the body replaced; indentation, marker, checkbox and
    /// spacing are kept byte for byte.
    pub fn with_body(&self, body: &str) -> String {
        format!("{}{}", &self.source[..self.body_start], body)
    }

    /// Same line with only the checkbox character changed to reflect
    /// `completed`. An already-matching mark (including `X`) is kept.
    pub fn with_completed(&self, completed: bool) -> String {
        let mark = checkbox_for(self.checkbox, completed);
        format!(
            "{}{}{}",
            &self.source[..self.checkbox_range.start],
            mark,
            &self.source[self.checkbox_range.end..]
        )
    }

    /// Body replaced and checkbox set in one go
    pub fn rebuilt(&self, completed: bool, body: &str) -> String {
        let mark = checkbox_for(self.checkbox, completed);
        format!(
            "{}{}{}{}",
            &self.source[..self.checkbox_range.start],
            mark,
            &self.source[self.checkbox_range.end..self.body_start],
            body
        )
    }
}

fn checkbox_for(current: char, completed: bool) -> char {
    if current.eq_ignore_ascii_case(&'x') == completed {
        current
    } else if completed {
        'x'
    } else {
        ' '
    }
}

/// Recognize a checklist line regardless of whether it holds a link.
/// Returns `None` for anything that isn't `- [ ] text` shaped.
pub fn parse_checklist_line(line: &str, line_number: usize) -> Option<TodoLineMatch> {
    let caps = CHECKLIST_RE.captures(line)?;
    let indentation = caps.get(1)?.as_str().to_string();
    let list_marker = caps.get(2)?.as_str().chars().next()?;
    let checkbox_match = caps.get(3)?;
    let checkbox = checkbox_match.as_str().chars().next()?;
    let body = caps.get(4)?;

    Some(TodoLineMatch {
        indentation,
        list_marker,
        checkbox,
        completed: checkbox.eq_ignore_ascii_case(&'x'),
        body_text: body.as_str().to_string(),
        line_number,
        embedded_references: extract_references(body.as_str()),
        source: line.to_string(),
        checkbox_range: checkbox_match.range(),
        body_start: body.start(),
    })
}

/// Recognize a checklist line that carries at least one `[[reference]]`.
pub fn parse_todo_line(line: &str, line_number: usize) -> Option<TodoLineMatch> {
    parse_checklist_line(line, line_number).filter(|m| !m.embedded_references.is_empty())
}

/// All reference targets in `text`, left to right. Aliases and headings are
/// dropped from the target; malformed brackets are simply not references.
pub fn extract_references(text: &str) -> Vec<String> {
    REFERENCE_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| reference_target(m.as_str()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn reference_target(inner: &str) -> String {
    let target = inner.split('|').next().unwrap_or(inner);
    let target = target.split('#').next().unwrap_or(target);
    target.trim().to_string()
}

/// Target of a line that is only a link, with or without a list marker but
/// without a checkbox.
pub fn parse_bare_reference(line: &str) -> Option<String> {
    if parse_checklist_line(line, 0).is_some() {
        return None;
    }
    let caps = BARE_REFERENCE_RE.captures(line)?;
    extract_references(caps.get(1)?.as_str()).into_iter().next()
}

/// True when `line` is a checklist item whose first reference resolves to
/// the entity called `name`. Shared by everything that has to find a
/// promoted line again after the document moved around.
pub fn links_to_entity(line: &str, name: &str) -> bool {
    parse_checklist_line(line, 0)
        .and_then(|m| m.promotion_target().map(bare_name))
        .is_some_and(|target| target == name)
}

/// Remove link syntax, keeping the visible text: `[[a|b]]` → `b`, `[[a]]` → `a`.
pub fn strip_link_syntax(text: &str) -> String {
    REFERENCE_RE
        .replace_all(text, |caps: &regex::Captures| {
            let inner = &caps[1];
            match inner.split_once('|') {
                Some((_, alias)) => alias.trim().to_string(),
                None => inner.trim().to_string(),
            }
        })
        .into_owned()
}
