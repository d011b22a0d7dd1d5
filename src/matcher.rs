//! Case-insensitive keyword matching over a [`Document`].
//!
//! Every call is a full linear scan; there is no index and nothing is cached
//! between calls. Results keep document traversal order.
//!
//! Structural rules for each top-level entry:
//!
//! | Entry value | Records produced |
//! |-------------|------------------|
//! | sequence | one per mapping element that matches; scalar elements as `{key: value}` |
//! | mapping | the mapping itself, if it matches |
//! | scalar | `{key: value}`, if it matches |
//! | null | nothing |
//!
//! A mapping matches when any of its leaf values, stringified, contains the
//! query. Null fields are dropped from the projected record.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::knowledge::Document;

/// One matched knowledge-base entry. Null-valued fields are never present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn project(map: &Map<String, Value>) -> Self {
        let fields = map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { fields }
    }

    fn scalar(key: &str, value: &Value) -> Self {
        let mut fields = Map::new();
        fields.insert(key.to_string(), value.clone());
        Self { fields }
    }
}

/// Records returned by one [`search`], in traversal order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct MatchResult {
    records: Vec<Record>,
}

impl MatchResult {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Scans `doc` for records containing `query`. An empty query matches every
/// non-empty record.
pub fn search(query: &str, doc: &Document) -> MatchResult {
    let needle = query.to_lowercase();
    let mut records = Vec::new();

    for (key, value) in doc.entries() {
        match value {
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(map) => push_if_matches(&mut records, map, &needle),
                        Value::Array(_) | Value::Null => {}
                        scalar => {
                            if value_contains(scalar, &needle) {
                                records.push(Record::scalar(key, scalar));
                            }
                        }
                    }
                }
            }
            Value::Object(map) => push_if_matches(&mut records, map, &needle),
            Value::Null => {}
            scalar => {
                if value_contains(scalar, &needle) {
                    records.push(Record::scalar(key, scalar));
                }
            }
        }
    }

    MatchResult { records }
}

fn push_if_matches(records: &mut Vec<Record>, map: &Map<String, Value>, needle: &str) {
    let record = Record::project(map);
    if record.fields.values().any(|v| value_contains(v, needle)) {
        records.push(record);
    }
}

/// True if any leaf under `value` contains `needle` (already lowercased).
fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Bool(b) => b.to_string().contains(needle),
        Value::Number(n) => n.to_string().to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => map.values().any(|v| value_contains(v, needle)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value("test.json", value).unwrap()
    }

    #[test]
    fn test_finds_record_in_sequence() {
        let d = doc(json!({"facts": [{"q": "capital of France", "a": "Paris"}]}));
        let result = search("france", &d);
        assert_eq!(result.len(), 1);
        let record = &result.records()[0];
        assert_eq!(record.get("q"), Some(&json!("capital of France")));
        assert_eq!(record.get("a"), Some(&json!("Paris")));
    }

    #[test]
    fn test_empty_document_has_no_matches() {
        let d = doc(json!({}));
        assert!(search("anything", &d).is_empty());
        assert!(search("", &d).is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let d = doc(json!({"facts": [{"city": "paris"}]}));
        assert_eq!(search("PARIS", &d).len(), 1);
        assert_eq!(search("PaRi", &d).len(), 1);
    }

    #[test]
    fn test_no_match_yields_empty_not_error() {
        let d = doc(json!({"facts": [{"city": "Paris"}], "about": {"name": "kb"}}));
        assert!(search("tokyo", &d).is_empty());
    }

    #[test]
    fn test_empty_query_returns_every_eligible_record() {
        let d = doc(json!({
            "facts": [{"a": 1}, {"b": "two"}, [1, 2], null],
            "about": {"name": "kb"},
            "motto": "hello",
            "nothing": null
        }));
        let result = search("", &d);
        // two sequence mappings, the top-level mapping, the scalar entry
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_traversal_order_preserved() {
        let d = doc(json!({
            "facts": [
                {"name": "rust one"},
                {"name": "go"},
                {"name": "rust two"}
            ]
        }));
        let result = search("rust", &d);
        let names: Vec<&Value> = result
            .records()
            .iter()
            .filter_map(|r| r.get("name"))
            .collect();
        assert_eq!(names, vec![&json!("rust one"), &json!("rust two")]);
    }

    #[test]
    fn test_top_level_entries_keep_file_order() {
        let d = Document::parse(
            "test.json",
            r#"{"zeta": {"z": "x", "a": "y"}, "alpha": {"n": "x"}, "mid": "x"}"#,
        )
        .unwrap();
        let keys: Vec<&str> = d.entries().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let result = search("x", &d);
        assert_eq!(result.len(), 3);
        assert_eq!(
            serde_json::to_string(&result.records()[0]).unwrap(),
            r#"{"z":"x","a":"y"}"#
        );
        assert_eq!(result.records()[1].get("n"), Some(&json!("x")));
        assert_eq!(result.records()[2].get("mid"), Some(&json!("x")));
    }

    #[test]
    fn test_null_fields_are_dropped() {
        let d = doc(json!({"facts": [{"q": "France", "a": null}]}));
        let result = search("france", &d);
        assert_eq!(result.len(), 1);
        assert_eq!(result.records()[0].len(), 1);
        assert!(result.records()[0].get("a").is_none());
    }

    #[test]
    fn test_top_level_mapping_and_scalar_entries() {
        let d = doc(json!({
            "about": {"name": "Homestead KB", "version": 3},
            "motto": "Grow your own food"
        }));

        let by_map = search("homestead", &d);
        assert_eq!(by_map.len(), 1);
        assert_eq!(by_map.records()[0].len(), 2);

        let by_scalar = search("food", &d);
        assert_eq!(by_scalar.len(), 1);
        assert_eq!(
            by_scalar.records()[0].get("motto"),
            Some(&json!("Grow your own food"))
        );
    }

    #[test]
    fn test_numbers_and_nested_values_are_matched() {
        let d = doc(json!({
            "items": [
                {"sku": 4242, "tags": ["garden", "tools"]},
                {"sku": 17, "meta": {"origin": "Norway"}}
            ]
        }));
        assert_eq!(search("424", &d).len(), 1);
        assert_eq!(search("tools", &d).len(), 1);
        assert_eq!(search("norway", &d).len(), 1);
    }

    #[test]
    fn test_repeated_calls_rescan() {
        let d = doc(json!({"facts": [{"q": "x"}]}));
        assert_eq!(search("x", &d), search("x", &d));
    }
}
