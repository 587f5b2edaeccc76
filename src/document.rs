use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The decrypted contents of a store: string keys mapped to JSON values.
///
/// Serializes as a bare JSON object. Keys are kept in sorted order, so
/// encoding the same document twice produces byte-identical JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Document {
    entries: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get_works() {
        let mut doc = Document::new();
        doc.insert("a", json!(1));
        assert_eq!(doc.get("a"), Some(&json!(1)));
        assert_eq!(doc.get("b"), None);
    }

    #[test]
    fn insert_returns_previous_value() {
        let mut doc = Document::new();
        assert_eq!(doc.insert("a", json!(1)), None);
        assert_eq!(doc.insert("a", json!(2)), Some(json!(1)));
        assert_eq!(doc.get("a"), Some(&json!(2)));
    }

    #[test]
    fn remove_works() {
        let mut doc = Document::new();
        doc.insert("a", json!("x"));
        assert_eq!(doc.remove("a"), Some(json!("x")));
        assert_eq!(doc.remove("a"), None);
        assert!(doc.is_empty());
    }

    #[test]
    fn iteration_is_sorted_by_key() {
        let mut doc = Document::new();
        doc.insert("c", json!(3));
        doc.insert("a", json!(1));
        doc.insert("b", json!(2));

        assert!(doc.contains_key("b"));
        assert!(!doc.contains_key("d"));
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(
            doc.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>(),
            [json!(1), json!(2), json!(3)]
        );
    }

    #[test]
    fn serializes_as_bare_object() {
        let mut doc = Document::new();
        doc.insert("name", json!("syncstore"));
        doc.insert("count", json!(3));
        let text = serde_json::to_string(&doc).unwrap();
        assert_eq!(text, r#"{"count":3,"name":"syncstore"}"#);
    }

    #[test]
    fn empty_document_is_an_empty_object() {
        assert_eq!(serde_json::to_string(&Document::new()).unwrap(), "{}");
    }

    #[test]
    fn encoding_is_stable_regardless_of_insert_order() {
        let mut first = Document::new();
        first.insert("b", json!(2));
        first.insert("a", json!(1));

        let mut second = Document::new();
        second.insert("a", json!(1));
        second.insert("b", json!(2));

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn nested_values_roundtrip() {
        let mut doc = Document::new();
        doc.insert(
            "profile",
            json!({ "name": "ada", "tags": ["a", "b"], "active": true, "score": 0.5 }),
        );
        doc.insert("nothing", json!(null));

        let bytes = serde_json::to_vec(&doc).unwrap();
        let back: Document = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(serde_json::from_str::<Document>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<Document>("\"text\"").is_err());
    }
}
