use crate::records::{Coordinates, Record};
use crate::search::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// A schemaless record, as read from JSON lines files by the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversions: Option<BTreeMap<String, u64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalization: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub locations: BTreeMap<String, Coordinates>,
}

impl JsonRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_conversion(mut self, term: impl Into<String>, count: u64) -> Self {
        self.conversions
            .get_or_insert_with(BTreeMap::new)
            .insert(term.into(), count);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.personalization
            .get_or_insert_with(Vec::new)
            .push(actor.into());
        self
    }

    pub fn with_location(mut self, field: impl Into<String>, coordinates: Coordinates) -> Self {
        self.locations.insert(field.into(), coordinates);
        self
    }

    /// String attribute shortcut, mostly for assertions
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

impl Record for JsonRecord {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    fn attributes(&self) -> Map<String, Value> {
        self.attributes.clone()
    }

    fn conversions(&self) -> Option<BTreeMap<String, u64>> {
        self.conversions.clone()
    }

    fn personalization_actors(&self) -> Option<Vec<String>> {
        self.personalization.clone()
    }

    fn location(&self, field: &str) -> Option<Coordinates> {
        self.locations.get(field).cloned()
    }
}

/// Read one JSON record per line; blank lines are ignored
pub fn load_json_lines(path: &Path) -> SearchResult<Vec<JsonRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SearchError::RecordSource(format!("Failed to read {}: {}", path.display(), e))
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| {
                SearchError::RecordSource(format!(
                    "{}:{}: invalid record: {}",
                    path.display(),
                    number + 1,
                    e
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_record_from_json() {
        let record: JsonRecord = serde_json::from_value(json!({
            "id": "1",
            "attributes": { "name": "Gummy Bear", "orders_count": 3 },
            "conversions": { "bear": 5 },
            "personalization": ["u1"],
            "locations": { "location": { "lat": 37.77, "lon": -122.42 } }
        }))
        .unwrap();

        assert_eq!(record.attribute_str("name"), Some("Gummy Bear"));
        assert_eq!(record.conversions().unwrap()["bear"], 5);
        assert_eq!(record.personalization_actors().unwrap(), vec!["u1"]);
        assert_eq!(
            record.location("location").unwrap().latitude,
            Some(json!(37.77))
        );
        assert!(record.location("other").is_none());
    }

    #[test]
    fn test_load_json_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "1", "attributes": {{"name": "Dustin Bag"}}}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "2", "kind": "dog", "attributes": {{"name": "Rex"}}}}"#).unwrap();

        let records = load_json_lines(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind(), Some("dog"));
    }

    #[test]
    fn test_load_json_lines_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "1"}}"#).unwrap();
        writeln!(file, "not json").unwrap();

        let err = load_json_lines(file.path()).unwrap_err();
        assert!(err.to_string().contains(":2:"));
    }
}
