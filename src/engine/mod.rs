//! Search engine client boundary
//!
//! Everything this crate needs from an Elasticsearch-compatible engine goes
//! through [`SearchEngine`]. Two implementations ship with the crate:
//!
//! - [`HttpEngine`]: talks to a real cluster over its REST API
//! - [`InMemoryEngine`]: an embedded engine that understands the subset of the
//!   query DSL produced by [`QueryBuilder`](crate::search::QueryBuilder), used by
//!   tests and local development

mod error;
mod factory;
mod http;
mod memory;

pub use error::{EngineError, EngineResult};
pub use factory::create_engine;
pub use http::HttpEngine;
pub use memory::InMemoryEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operations offered by the search engine
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create an index with the given settings/mappings body
    async fn create_index(&self, name: &str, body: &Value) -> EngineResult<()>;

    /// Delete an index. Returns `false` when it did not exist.
    async fn delete_index(&self, name: &str) -> EngineResult<bool>;

    /// Check whether an index or alias with this name exists
    async fn index_exists(&self, name: &str) -> EngineResult<bool>;

    /// List concrete index names matching a wildcard pattern (`products_*`)
    async fn list_indices(&self, pattern: &str) -> EngineResult<Vec<String>>;

    /// Concrete indices the alias currently points to (empty if none)
    async fn get_alias(&self, alias: &str) -> EngineResult<Vec<String>>;

    /// Apply all alias actions in a single atomic request
    async fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()>;

    /// Write a batch of operations
    async fn bulk(&self, index: &str, operations: &[BulkOperation]) -> EngineResult<BulkResponse>;

    /// Delete one document. Returns `false` when it did not exist.
    async fn delete_document(&self, index: &str, id: &str) -> EngineResult<bool>;

    /// Make all writes so far visible to search
    async fn refresh(&self, index: &str) -> EngineResult<()>;

    /// Execute a search request body
    async fn search(&self, index: &str, body: &Value) -> EngineResult<EngineResponse>;
}

/// One action of an atomic alias update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
    /// Delete a concrete index as part of the same atomic request
    RemoveIndex { index: String },
}

impl AliasAction {
    pub fn to_json(&self) -> Value {
        match self {
            AliasAction::Add { index, alias } => {
                serde_json::json!({ "add": { "index": index, "alias": alias } })
            }
            AliasAction::Remove { index, alias } => {
                serde_json::json!({ "remove": { "index": index, "alias": alias } })
            }
            AliasAction::RemoveIndex { index } => {
                serde_json::json!({ "remove_index": { "index": index } })
            }
        }
    }
}

/// One entry of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Index { id: String, source: Value },
    Delete { id: String },
}

impl BulkOperation {
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Delete { id } => id,
        }
    }
}

/// Bulk response as returned by the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Items the engine refused, in request order
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items
            .iter()
            .map(BulkItem::result)
            .filter(|result| result.error.is_some())
    }
}

/// Per-operation entry of a bulk response, keyed by operation type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkItem {
    Index(BulkItemResult),
    Create(BulkItemResult),
    Update(BulkItemResult),
    Delete(BulkItemResult),
}

impl BulkItem {
    pub fn result(&self) -> &BulkItemResult {
        match self {
            BulkItem::Index(r) | BulkItem::Create(r) | BulkItem::Update(r) | BulkItem::Delete(r) => r,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineErrorBody>,
}

/// Error object as reported inside engine responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineErrorBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: String,
}

/// Search response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub hits: EngineHits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineHits {
    #[serde(default)]
    pub total: HitsTotal,
    #[serde(default)]
    pub hits: Vec<EngineHit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitsTotal {
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
}
