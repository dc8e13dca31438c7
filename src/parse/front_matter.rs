use serde_yaml::{Mapping, Value};

use crate::model::entity::{EntityFields, FieldValue};

/// Split `---`-delimited front matter from the body. Returns `None` for the
/// YAML part when the document has no (closed) front matter block.
pub fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let rest = match text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, text),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse the front matter of a note into an ordered mapping plus the body.
/// A note without front matter yields an empty mapping.
pub fn parse_front_matter(text: &str) -> Result<(Mapping, String), serde_yaml::Error> {
    let (yaml, body) = split_front_matter(text);
    let mapping = match yaml {
        Some(y) if !y.trim().is_empty() => match serde_yaml::from_str::<Value>(y)? {
            Value::Mapping(m) => m,
            Value::Null => Mapping::new(),
            _ => return Err(serde::de::Error::custom("front matter is not a mapping")),
        },
        _ => Mapping::new(),
    };
    Ok((mapping, body.to_string()))
}

/// Emit `---\n<yaml>---\n<body>`, keys in mapping order
pub fn render_front_matter(mapping: &Mapping, body: &str) -> Result<String, serde_yaml::Error> {
    let yaml = if mapping.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(mapping)?
    };
    Ok(format!("---\n{}---\n{}", yaml, body))
}

/// Registry-shaped view of a front-matter mapping. Values the registry
/// cannot describe (nested mappings, tagged values) are left out.
pub fn fields_from_mapping(mapping: &Mapping) -> EntityFields {
    let mut fields = EntityFields::new();
    for (k, v) in mapping {
        let Some(key) = k.as_str() else { continue };
        if let Some(value) = field_from_yaml(v) {
            fields.insert(key.to_string(), value);
        }
    }
    fields
}

pub fn field_from_yaml(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Null),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(FieldValue::Integer)
            .or_else(|| n.as_f64().map(FieldValue::Float)),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Sequence(items) => Some(FieldValue::List(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

pub fn field_to_yaml(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Integer(n) => Value::Number((*n).into()),
        FieldValue::Float(f) => Value::Number((*f).into()),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::List(items) => {
            Value::Sequence(items.iter().cloned().map(Value::String).collect())
        }
    }
}

/// Set `key` in place (existing keys keep their position; new keys append)
pub fn set_field(mapping: &mut Mapping, key: &str, value: &FieldValue) {
    mapping.insert(Value::String(key.to_string()), field_to_yaml(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_with_and_without_front_matter() {
        let (yaml, body) = split_front_matter("---\nTitle: A\n---\nbody\n");
        assert_eq!(yaml, Some("Title: A\n"));
        assert_eq!(body, "body\n");

        let (yaml, body) = split_front_matter("no front matter\n");
        assert!(yaml.is_none());
        assert_eq!(body, "no front matter\n");

        // Unclosed block is treated as plain text
        let (yaml, body) = split_front_matter("---\nTitle: A\nbody\n");
        assert!(yaml.is_none());
        assert_eq!(body, "---\nTitle: A\nbody\n");
    }

    #[test]
    fn split_crlf_front_matter() {
        let (yaml, body) = split_front_matter("---\r\nDone: true\r\n---\r\nbody");
        assert_eq!(yaml, Some("Done: true\r\n"));
        assert_eq!(body, "body");
    }

    #[test]
    fn parse_keeps_key_order_and_unknown_keys() {
        let text = "---\nTitle: Buy milk\nDone: false\ncustom:\n  nested: 1\nAreas:\n  - \"[[Home]]\"\n---\n\nNotes\n";
        let (mapping, body) = parse_front_matter(text).unwrap();
        let keys: Vec<&str> = mapping.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Title", "Done", "custom", "Areas"]);
        assert_eq!(body, "\nNotes\n");

        let fields = fields_from_mapping(&mapping);
        assert_eq!(fields.get("Done"), Some(&FieldValue::Bool(false)));
        assert_eq!(
            fields.get("Areas"),
            Some(&FieldValue::List(vec!["[[Home]]".into()]))
        );
        assert!(!fields.contains_key("custom"));
    }

    #[test]
    fn render_then_parse_preserves_values() {
        let mut mapping = Mapping::new();
        set_field(&mut mapping, "Title", &FieldValue::text("Pay rent"));
        set_field(&mut mapping, "Project", &FieldValue::link("Home"));
        set_field(&mut mapping, "Done", &FieldValue::Bool(false));
        set_field(&mut mapping, "Source line", &FieldValue::Integer(4));
        let text = render_front_matter(&mapping, "").unwrap();
        assert!(text.starts_with("---\nTitle: Pay rent\n"));
        assert!(text.ends_with("---\n"));

        let (back, _) = parse_front_matter(&text).unwrap();
        let fields = fields_from_mapping(&back);
        assert_eq!(fields.get("Project"), Some(&FieldValue::text("[[Home]]")));
        assert_eq!(fields.get("Source line"), Some(&FieldValue::Integer(4)));
    }

    #[test]
    fn set_field_keeps_position() {
        let (mut mapping, _) = parse_front_matter("---\nA: 1\nDone: false\nB: 2\n---\n").unwrap();
        set_field(&mut mapping, "Done", &FieldValue::Bool(true));
        let keys: Vec<&str> = mapping.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "Done", "B"]);
    }

    #[test]
    fn empty_and_non_mapping_front_matter() {
        let (mapping, body) = parse_front_matter("---\n---\nbody").unwrap();
        assert!(mapping.is_empty());
        assert_eq!(body, "body");
        assert!(parse_front_matter("---\n- a\n- b\n---\n").is_err());
    }
}
