use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Declared content type of a document (e.g. `text/html; charset=utf-8`).
pub const CONTENT_TYPE: &str = "document.contentType";
/// Declared character encoding of a document.
pub const CONTENT_ENCODING: &str = "document.contentEncoding";
/// Detected language code.
pub const LANGUAGE: &str = "document.language";

static CHARSET_PARAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)"#).unwrap());

/// Ordered, multi-valued document metadata.
///
/// Field names are case-sensitive. Fields keep their insertion order and so do
/// the values stored under each field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    fields: IndexMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values stored under `field`, empty when the field is absent.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value stored under `field`.
    pub fn get_first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Replaces every value of `field`. Setting no values removes the field.
    pub fn set<I, V>(&mut self, field: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let field = field.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.fields.shift_remove(&field);
        } else {
            self.fields.insert(field, values);
        }
    }

    /// Appends values after the ones already stored under `field`.
    pub fn add<I, V>(&mut self, field: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut values = values.into_iter().map(Into::into).peekable();
        if values.peek().is_none() {
            return;
        }
        self.fields.entry(field.into()).or_default().extend(values);
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<String>> {
        self.fields.shift_remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_first(CONTENT_TYPE)
    }

    pub fn language(&self) -> Option<&str> {
        self.get_first(LANGUAGE)
    }

    /// Charset declared either explicitly or as a content-type parameter.
    pub fn declared_charset(&self) -> Option<&str> {
        if let Some(encoding) = self.get_first(CONTENT_ENCODING)
            && !encoding.trim().is_empty()
        {
            return Some(encoding.trim());
        }
        let content_type = self.content_type()?;
        CHARSET_PARAM_REGEX
            .captures(content_type)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut metadata = Metadata::new();
        for (field, value) in iter {
            metadata.add(field, [value]);
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_preserves_order() {
        let mut metadata = Metadata::new();
        metadata.add("f", ["a", "b"]);
        metadata.add("f", ["c"]);
        assert_eq!(metadata.get("f"), ["a", "b", "c"]);
    }

    #[test]
    fn test_set_replaces_and_empty_set_removes() {
        let mut metadata = Metadata::new();
        metadata.add("f", ["a"]);
        metadata.set("f", ["x", "y"]);
        assert_eq!(metadata.get("f"), ["x", "y"]);

        metadata.set("f", Vec::<String>::new());
        assert!(!metadata.contains("f"));
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let metadata: Metadata = [("Title", "a")].into_iter().collect();
        assert!(metadata.contains("Title"));
        assert!(!metadata.contains("title"));
        assert!(metadata.get("title").is_empty());
    }

    #[test]
    fn test_declared_charset() {
        let metadata: Metadata = [(CONTENT_TYPE, "text/html; charset=ISO-8859-1")]
            .into_iter()
            .collect();
        assert_eq!(metadata.declared_charset(), Some("ISO-8859-1"));

        let mut metadata = metadata;
        metadata.set(CONTENT_ENCODING, ["windows-1252"]);
        assert_eq!(metadata.declared_charset(), Some("windows-1252"));
    }

    #[test]
    fn test_serializes_as_ordered_map() {
        let mut metadata = Metadata::new();
        metadata.add("z", ["1"]);
        metadata.add("a", ["2", "3"]);
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"z":["1"],"a":["2","3"]}"#);
    }
}
