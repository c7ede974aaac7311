//! Record-side boundary: what the search layer needs from the backing store

mod json;
mod memory;

pub use json::{load_json_lines, JsonRecord};
pub use memory::InMemoryRecordStore;

use crate::search::SearchResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A record that can be turned into a search document.
///
/// `attributes` is required; the other accessors are optional capabilities.
/// Returning `None` means the record does not provide that payload.
pub trait Record: Send + Sync {
    /// Stable identifier, used as the document id
    fn id(&self) -> String;

    /// Concrete kind within a type hierarchy (`None` = the base kind)
    fn kind(&self) -> Option<&str> {
        None
    }

    /// Plain attributes, copied verbatim into the document
    fn attributes(&self) -> Map<String, Value>;

    /// Search term -> interaction count
    fn conversions(&self) -> Option<BTreeMap<String, u64>> {
        None
    }

    /// Identifiers of actors who interacted with the record
    fn personalization_actors(&self) -> Option<Vec<String>> {
        None
    }

    /// Raw coordinates for a declared geo field
    fn location(&self, _field: &str) -> Option<Coordinates> {
        None
    }
}

/// Raw coordinates as stored on the record; coerced by the document mapper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, alias = "lat")]
    pub latitude: Option<Value>,
    #[serde(default, alias = "lon", alias = "lng")]
    pub longitude: Option<Value>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(Value::from(latitude)),
            longitude: Some(Value::from(longitude)),
        }
    }
}

/// Lazy, restartable sequence of all records of a class.
///
/// Every call to [`RecordSource::records`] starts a new pass over the store.
pub trait RecordSource: Send + Sync {
    type Record: Record;

    fn records(&self) -> BoxStream<'_, SearchResult<Self::Record>>;
}

/// Loads records back from the store for search results
#[async_trait]
pub trait RecordLoader: Send + Sync {
    type Record: Record;

    /// Fetch the records with these ids. Missing ids are simply absent from the result.
    async fn find_many(&self, kind: Option<&str>, ids: &[String]) -> SearchResult<Vec<Self::Record>>;
}
