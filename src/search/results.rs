//! Turning engine responses back into hits and records

use crate::engine::EngineResponse;
use crate::records::{Record, RecordLoader};
use crate::search::config::{RecordClass, KIND_FIELD};
use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// One ranked hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,

    /// Concrete kind, for hierarchy classes
    pub kind: Option<String>,

    /// Relevance score (absent when the engine did not compute one)
    pub score: Option<f64>,

    /// Distance in kilometers when the request sorted by distance
    pub distance: Option<f64>,

    /// Stored document
    pub source: Value,
}

/// Records loaded for a page of hits, in hit order
#[derive(Debug)]
pub struct LoadedResults<R> {
    pub records: Vec<R>,

    /// Hits whose record is gone from the backing store
    pub skipped: Vec<SearchError>,
}

impl<R> LoadedResults<R> {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct ResultMapper;

impl ResultMapper {
    /// Ordered hits for `response`. `request` is the body the response answers;
    /// it tells where a `_geo_distance` value sits in each hit's sort values.
    pub fn to_hits(response: &EngineResponse, class: &RecordClass, request: &Value) -> Vec<SearchHit> {
        let distance_at = distance_sort_position(request);
        let mut seen = HashSet::new();

        response
            .hits
            .hits
            .iter()
            .filter(|hit| seen.insert(hit.id.clone()))
            .map(|hit| {
                let kind = if class.has_hierarchy() {
                    hit.source.get(KIND_FIELD).and_then(Value::as_str).map(str::to_string)
                } else {
                    None
                };
                SearchHit {
                    id: hit.id.clone(),
                    kind,
                    score: hit.score,
                    distance: distance_at.and_then(|i| hit.sort.get(i)).and_then(Value::as_f64),
                    source: hit.source.clone(),
                }
            })
            .collect()
    }

    /// Phrase-suggester options, best first, without duplicates
    pub fn suggestions(response: &EngineResponse) -> Vec<String> {
        let mut options: Vec<(f64, String)> = Vec::new();
        if let Some(Value::Object(suggesters)) = &response.suggest {
            for entries in suggesters.values() {
                let Some(entries) = entries.as_array() else {
                    continue;
                };
                for entry in entries {
                    let Some(entry_options) = entry.get("options").and_then(Value::as_array) else {
                        continue;
                    };
                    for option in entry_options {
                        if let Some(text) = option.get("text").and_then(Value::as_str) {
                            let score = option.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                            options.push((score, text.to_string()));
                        }
                    }
                }
            }
        }

        // stable: equal scores keep suggester order
        options.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut seen = HashSet::new();
        options
            .into_iter()
            .filter_map(|(_, text)| seen.insert(text.clone()).then_some(text))
            .collect()
    }

    /// Load the records behind `hits`, preserving hit order.
    ///
    /// The loader is asked once per kind; the base kind (and classes without a
    /// hierarchy) are loaded with `kind = None`. Hits whose record is missing
    /// are logged and reported in [`LoadedResults::skipped`].
    pub async fn load<L>(hits: &[SearchHit], class: &RecordClass, loader: &L) -> SearchResult<LoadedResults<L::Record>>
    where
        L: RecordLoader + ?Sized,
    {
        let mut groups: BTreeMap<Option<&str>, Vec<String>> = BTreeMap::new();
        for hit in hits {
            groups.entry(loader_kind(hit, class)).or_default().push(hit.id.clone());
        }

        let mut found: HashMap<String, L::Record> = HashMap::new();
        for (kind, ids) in groups {
            for record in loader.find_many(kind, &ids).await? {
                found.insert(record.id(), record);
            }
        }

        let mut records = Vec::with_capacity(hits.len());
        let mut skipped = Vec::new();
        for hit in hits {
            match found.remove(&hit.id) {
                Some(record) => records.push(record),
                None => {
                    let kind = hit.kind.clone().unwrap_or_else(|| class.name().to_string());
                    warn!(record_id = %hit.id, kind = %kind, "Indexed record not found in the store; skipping");
                    skipped.push(SearchError::PartialResult {
                        id: hit.id.clone(),
                        kind,
                    });
                }
            }
        }

        Ok(LoadedResults { records, skipped })
    }
}

fn loader_kind<'a>(hit: &'a SearchHit, class: &RecordClass) -> Option<&'a str> {
    match hit.kind.as_deref() {
        Some(kind) if class.has_hierarchy() && kind != class.name() => Some(kind),
        _ => None,
    }
}

fn distance_sort_position(request: &Value) -> Option<usize> {
    request
        .get("sort")?
        .as_array()?
        .iter()
        .position(|sort| sort.get("_geo_distance").is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{InMemoryRecordStore, JsonRecord};
    use crate::search::config::SearchConfig;
    use serde_json::json;

    fn animals() -> RecordClass {
        RecordClass::with_kinds("animal", ["dog", "cat"], SearchConfig::default()).unwrap()
    }

    fn response(hits: Value) -> EngineResponse {
        serde_json::from_value(json!({ "took": 1, "hits": { "total": { "value": 3 }, "hits": hits } })).unwrap()
    }

    #[test]
    fn test_hits_keep_order_and_collapse_duplicates() {
        let response = response(json!([
            { "_index": "a", "_id": "2", "_score": 2.0, "_source": { "kind": "dog" } },
            { "_index": "a", "_id": "1", "_score": 1.5, "_source": { "kind": "cat" } },
            { "_index": "b", "_id": "2", "_score": 1.0, "_source": { "kind": "dog" } }
        ]));

        let hits = ResultMapper::to_hits(&response, &animals(), &json!({}));
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(hits[0].kind.as_deref(), Some("dog"));
        assert_eq!(hits[0].distance, None);
    }

    #[test]
    fn test_distance_read_from_sort_values() {
        let response = response(json!([
            { "_id": "1", "_score": 1.0, "_source": {}, "sort": [3.5, "x"] }
        ]));
        let request = json!({ "sort": [{ "_geo_distance": { "location": { "lat": 0, "lon": 0 } } }, { "name": "asc" }] });

        let class = RecordClass::new("store", SearchConfig::default()).unwrap();
        let hits = ResultMapper::to_hits(&response, &class, &request);
        assert_eq!(hits[0].distance, Some(3.5));
        assert_eq!(hits[0].kind, None);
    }

    #[test]
    fn test_suggestions_ranked_and_deduplicated() {
        let mut response = response(json!([]));
        response.suggest = Some(json!({
            "name": [{ "text": "bare", "options": [
                { "text": "bear", "score": 0.4 },
                { "text": "bare", "score": 0.2 }
            ] }],
            "color": [{ "text": "bare", "options": [
                { "text": "beige", "score": 0.6 },
                { "text": "bear", "score": 0.1 }
            ] }]
        }));

        assert_eq!(ResultMapper::suggestions(&response), vec!["beige", "bear", "bare"]);
    }

    #[tokio::test]
    async fn test_load_skips_missing_records() {
        let class = animals();
        let store = InMemoryRecordStore::from_records([
            JsonRecord::new("1").with_kind("dog"),
            JsonRecord::new("3"),
        ]);
        let hits: Vec<SearchHit> = [("3", Some("animal")), ("2", Some("cat")), ("1", Some("dog"))]
            .into_iter()
            .map(|(id, kind)| SearchHit {
                id: id.to_string(),
                kind: kind.map(str::to_string),
                score: None,
                distance: None,
                source: json!({}),
            })
            .collect();

        let loaded = ResultMapper::load(&hits, &class, &store).await.unwrap();
        let ids: Vec<&str> = loaded.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
        assert_eq!(loaded.skipped.len(), 1);
        assert!(matches!(
            &loaded.skipped[0],
            SearchError::PartialResult { id, kind } if id == "2" && kind == "cat"
        ));
    }
}
