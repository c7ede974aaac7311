//! searchlink: search-engine integration for application records
//!
//! Versioned indices behind atomically swapped aliases, record-to-document
//! mapping, and ranking-aware queries against an Elasticsearch-compatible engine.

pub mod config;
pub mod engine;
pub mod records;
pub mod search;

pub use config::Config;
pub use search::{SearchError, SearchResult, SearchService};
