//! Common test utilities for search integration tests
//!
//! Builds services over a fresh in-memory engine and provides small record
//! factories used across the test files.

#![allow(dead_code)]

use searchlink::config::Config;
use searchlink::engine::InMemoryEngine;
use searchlink::records::{Coordinates, InMemoryRecordStore, JsonRecord};
use searchlink::search::{RecordClass, SearchConfig, SearchResponse, SearchService};
use std::sync::Arc;

/// A service for `class` over `engine`, with the `test` index suffix
pub fn service_for(engine: &InMemoryEngine, class: RecordClass) -> SearchService {
    let mut config = Config::default();
    config.indexing.index_suffix = Some("test".to_string());
    config.indexing.batch_size = 2;
    SearchService::new(Arc::new(engine.clone()), class, &config).unwrap()
}

pub fn product_class(config: SearchConfig) -> RecordClass {
    RecordClass::new("product", config).unwrap()
}

/// A product record with a name
pub fn product(id: &str, name: &str) -> JsonRecord {
    JsonRecord::new(id).with_attribute("name", name)
}

/// A store at `latitude`/`longitude`
pub fn store_at(id: &str, name: &str, latitude: f64, longitude: f64) -> JsonRecord {
    JsonRecord::new(id)
        .with_attribute("name", name)
        .with_location("location", Coordinates::new(latitude, longitude))
}

pub fn store_of(records: impl IntoIterator<Item = JsonRecord>) -> InMemoryRecordStore<JsonRecord> {
    InMemoryRecordStore::from_records(records)
}

/// Names of the hits, in ranking order
pub fn names(response: &SearchResponse) -> Vec<String> {
    response
        .hits
        .iter()
        .filter_map(|hit| hit.source.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

/// Ids of the hits, sorted
pub fn sorted_ids(response: &SearchResponse) -> Vec<String> {
    let mut ids: Vec<String> = response.hits.iter().map(|hit| hit.id.clone()).collect();
    ids.sort();
    ids
}
