use indexmap::IndexMap;
use serde::Serialize;

/// Right-hand side of a predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FilterValue {
    Text(String),
    /// Rendered as `link("<name>")`; `name` must already be a bare name
    Link(String),
    Bool(bool),
}

/// Boolean filter expression attached to a view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Equals { source: String, value: FilterValue },
    NotEquals { source: String, value: FilterValue },
    Contains { source: String, value: FilterValue },
    IsEmpty { source: String },
    InFolder(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(source: &str, value: FilterValue) -> Self {
        Filter::Equals {
            source: source.to_string(),
            value,
        }
    }

    pub fn contains(source: &str, value: FilterValue) -> Self {
        Filter::Contains {
            source: source.to_string(),
            value,
        }
    }

    pub fn is_empty(source: &str) -> Self {
        Filter::IsEmpty {
            source: source.to_string(),
        }
    }

    /// Render a leaf predicate. Combinators return `None`; the serializer
    /// lays those out structurally.
    pub fn predicate(&self) -> Option<String> {
        match self {
            Filter::Equals { source, value } => Some(format!("{} == {}", source, value.render())),
            Filter::NotEquals { source, value } => {
                Some(format!("{} != {}", source, value.render()))
            }
            Filter::Contains { source, value } => {
                Some(format!("{}.contains({})", source, value.render()))
            }
            Filter::IsEmpty { source } => Some(format!("{}.isEmpty()", source)),
            Filter::InFolder(folder) => Some(format!("file.inFolder({})", quote(folder))),
            Filter::And(_) | Filter::Or(_) => None,
        }
    }
}

impl FilterValue {
    pub fn render(&self) -> String {
        match self {
            FilterValue::Text(s) => quote(s),
            FilterValue::Link(name) => format!("link({})", quote(name)),
            FilterValue::Bool(b) => b.to_string(),
        }
    }
}

/// Double-quoted expression string literal
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub property: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Table,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Table => "table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewDefinition {
    pub name: String,
    pub kind: ViewKind,
    pub filter: Filter,
    /// Resolved property sources, in column order
    pub column_order: Vec<String>,
    pub sort: Vec<SortKey>,
}

/// Column descriptor in the `properties` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyDescriptor {
    pub display_name: String,
}

/// A complete base file, in emission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaseConfig {
    pub formulas: IndexMap<String, String>,
    pub properties: IndexMap<String, PropertyDescriptor>,
    pub views: Vec<ViewDefinition>,
}

impl BaseConfig {
    pub fn view(&self, name: &str) -> Option<&ViewDefinition> {
        self.views.iter().find(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_link_predicate() {
        let f = Filter::contains("Areas", FilterValue::Link("Finance".into()));
        assert_eq!(f.predicate().unwrap(), r#"Areas.contains(link("Finance"))"#);
    }

    #[test]
    fn text_values_are_escaped() {
        let f = Filter::equals("Category", FilterValue::Text(r#"Say "hi" \o/"#.into()));
        assert_eq!(
            f.predicate().unwrap(),
            r#"Category == "Say \"hi\" \\o/""#
        );
    }

    #[test]
    fn combinators_have_no_predicate() {
        assert!(Filter::And(vec![]).predicate().is_none());
        assert!(Filter::Or(vec![]).predicate().is_none());
        assert_eq!(
            Filter::is_empty("note[\"Parent task\"]").predicate().unwrap(),
            "note[\"Parent task\"].isEmpty()"
        );
        assert_eq!(
            Filter::InFolder("Tasks".into()).predicate().unwrap(),
            "file.inFolder(\"Tasks\")"
        );
    }
}
