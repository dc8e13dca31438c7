use indexmap::IndexMap;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::model::base::{BaseConfig, Filter, SortKey, ViewDefinition, ViewKind};

// ---------------------------------------------------------------------------
// Wire shape
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct BaseFile<'a> {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    formulas: IndexMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    properties: IndexMap<&'a str, PropertyEntry<'a>>,
    views: Vec<ViewEntry<'a>>,
}

#[derive(Serialize)]
struct PropertyEntry<'a> {
    #[serde(rename = "displayName")]
    display_name: &'a str,
}

#[derive(Serialize)]
struct ViewEntry<'a> {
    #[serde(rename = "type")]
    kind: ViewKind,
    name: &'a str,
    filters: FilterEntry,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    order: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sort: Vec<&'a SortKey>,
}

/// Combinators are one-key `and:`/`or:` mappings, leaves are predicate strings
enum FilterEntry {
    Predicate(String),
    Group(&'static str, Vec<FilterEntry>),
}

impl Serialize for FilterEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FilterEntry::Predicate(p) => serializer.serialize_str(p),
            FilterEntry::Group(keyword, children) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(keyword, children)?;
                map.end()
            }
        }
    }
}

fn filter_entry(filter: &Filter) -> FilterEntry {
    match filter {
        Filter::And(children) => {
            FilterEntry::Group("and", children.iter().map(filter_entry).collect())
        }
        Filter::Or(children) => {
            FilterEntry::Group("or", children.iter().map(filter_entry).collect())
        }
        leaf => FilterEntry::Predicate(leaf.predicate().unwrap_or_default()),
    }
}

fn view_entry(view: &ViewDefinition) -> ViewEntry<'_> {
    // The top level of `filters` is always a combinator
    let filters = match &view.filter {
        Filter::And(_) | Filter::Or(_) => filter_entry(&view.filter),
        leaf => FilterEntry::Group("and", vec![filter_entry(leaf)]),
    };
    ViewEntry {
        kind: view.kind,
        name: &view.name,
        filters,
        order: view.column_order.iter().map(String::as_str).collect(),
        sort: view.sort.iter().collect(),
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serialize a base configuration to its YAML text form. Keys come out in
/// in-memory order, so the same config always yields the same bytes.
pub fn serialize_base(config: &BaseConfig) -> Result<String, serde_yaml::Error> {
    let file = BaseFile {
        formulas: config
            .formulas
            .iter()
            .map(|(name, expr)| (name.as_str(), expr.as_str()))
            .collect(),
        properties: config
            .properties
            .iter()
            .map(|(source, descriptor)| {
                (
                    source.as_str(),
                    PropertyEntry {
                        display_name: &descriptor.display_name,
                    },
                )
            })
            .collect(),
        views: config.views.iter().map(view_entry).collect(),
    };
    serde_yaml::to_string(&file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::base::{FilterValue, PropertyDescriptor, SortDirection};
    use pretty_assertions::assert_eq;
    use serde_yaml::Value;

    fn single_view(name: &str, filter: Filter) -> BaseConfig {
        BaseConfig {
            views: vec![ViewDefinition {
                name: name.into(),
                kind: ViewKind::Table,
                filter,
                column_order: vec![],
                sort: vec![],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn nested_filters_render_as_mappings() {
        let config = single_view(
            "Mixed",
            Filter::And(vec![
                Filter::InFolder("Tasks".into()),
                Filter::Or(vec![
                    Filter::equals("Category", FilterValue::Text("Bug".into())),
                    Filter::equals("Category", FilterValue::Text("Chore".into())),
                ]),
            ]),
        );
        let yaml: Value = serde_yaml::from_str(&serialize_base(&config).unwrap()).unwrap();
        let and = yaml["views"][0]["filters"]["and"].as_sequence().unwrap();
        assert_eq!(and[0].as_str(), Some("file.inFolder(\"Tasks\")"));
        let or: Vec<&str> = and[1]["or"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(or, vec!["Category == \"Bug\"", "Category == \"Chore\""]);
    }

    #[test]
    fn leaf_filter_is_wrapped_in_and() {
        let mut config = single_view("Open", Filter::equals("Done", FilterValue::Bool(false)));
        config.properties.insert(
            "Done".into(),
            PropertyDescriptor {
                display_name: "Done".into(),
            },
        );
        config.views[0].column_order = vec!["Done".into()];
        config.views[0].sort = vec![SortKey {
            property: "file.mtime".into(),
            direction: SortDirection::Desc,
        }];

        let text = serialize_base(&config).unwrap();
        assert!(!text.contains("formulas"));
        let yaml: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(yaml["properties"]["Done"]["displayName"].as_str(), Some("Done"));
        let view = &yaml["views"][0];
        assert_eq!(view["type"].as_str(), Some("table"));
        assert_eq!(view["filters"]["and"][0].as_str(), Some("Done == false"));
        assert_eq!(view["order"][0].as_str(), Some("Done"));
        assert_eq!(view["sort"][0]["property"].as_str(), Some("file.mtime"));
        assert_eq!(view["sort"][0]["direction"].as_str(), Some("DESC"));
    }

    #[test]
    fn names_that_look_like_other_types_stay_strings() {
        for name in ["0x10", "1e3", "true", "null", "~", "- dash", "Bug: urgent", "'quoted'", ""] {
            let text = serialize_base(&single_view(name, Filter::And(vec![]))).unwrap();
            let yaml: Value = serde_yaml::from_str(&text).unwrap();
            assert_eq!(
                yaml["views"][0]["name"],
                Value::String(name.to_string()),
                "{:?} in:\n{}",
                name,
                text
            );
        }
    }

    #[test]
    fn key_order_follows_insertion() {
        let mut config = single_view("Tasks", Filter::And(vec![]));
        for key in ["Status", "Areas", "Done"] {
            config.properties.insert(
                key.into(),
                PropertyDescriptor {
                    display_name: key.into(),
                },
            );
        }
        let text = serialize_base(&config).unwrap();
        let positions: Vec<usize> = ["Status:", "Areas:", "Done:"]
            .iter()
            .map(|k| text.find(k).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", text);
        assert_eq!(text, serialize_base(&config).unwrap());
    }
}
