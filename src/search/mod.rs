//! Search integration for application records
//!
//! This module binds record classes to an Elasticsearch-compatible engine:
//!
//! - **Index Lifecycle**: Versioned indices behind a stable alias, swapped atomically
//! - **Document Mapping**: Records to documents, with conversions, personalization and geo payloads
//! - **Query Building**: Synonyms, autocomplete, misspellings, filters, location and ordering
//! - **Suggest Fallback**: "Did you mean" matching when a search finds nothing
//! - **Result Mapping**: Ranked hits and records loaded back in ranking order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           Search Service API                     │
//! ├─────────────────────────────────────────────────┤
//! │  - search()          - search_records()         │
//! │  - reindex()         - delete_index()           │
//! │  - index_record()    - remove_record()          │
//! └─────────────────────────────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌────────────────────────┐  ┌────────────────────────┐
//! │  Index Manager          │  │  Query Builder          │
//! │  - Index Descriptor     │  │  - Result Mapper        │
//! │  - Document Mapper      │  │                         │
//! └────────────────────────┘  └────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │        SearchEngine (HTTP or in-memory)          │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use searchlink::config::Config;
//! use searchlink::engine::create_engine;
//! use searchlink::records::InMemoryRecordStore;
//! use searchlink::records::JsonRecord;
//! use searchlink::search::{RecordClass, SearchConfig, SearchOptions, SearchService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let engine = create_engine(&config.engine)?;
//!
//!     let class = RecordClass::new(
//!         "product",
//!         SearchConfig::builder()
//!             .synonyms(["clorox", "bleach"])
//!             .autocomplete("name")
//!             .build()?,
//!     )?;
//!     let search = SearchService::new(engine, class, &config)?;
//!
//!     let store: InMemoryRecordStore<JsonRecord> = InMemoryRecordStore::new();
//!     search.reindex(&store).await?;
//!
//!     let results = search.search("bleach", &SearchOptions::new().with_limit(20)).await?;
//!     println!("Found {} products", results.total);
//!
//!     Ok(())
//! }
//! ```

mod config;
mod descriptor;
mod document;
mod error;
mod index;
mod query;
mod results;
mod service;

pub use config::{RecordClass, SearchConfig, SearchConfigBuilder, ID_FIELD, KIND_FIELD, SEARCH_ALL_FIELD};
pub use descriptor::IndexDescriptor;
pub use document::{DocumentMapper, GeoPoint, SearchDocument};
pub use error::{SearchError, SearchResult};
pub use index::{DocumentFailure, IndexHandle, IndexManager, PopulationReport, ReindexReport};
pub use query::{
    Distance, DistanceUnit, Filter, Near, OrderBy, QueryBuilder, SearchOptions, SearchQuery, SortOrder,
};
pub use results::{LoadedResults, ResultMapper, SearchHit};
pub use service::{SearchResponse, SearchService};
