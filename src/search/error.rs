//! Error types for search operations

use crate::engine::EngineError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while configuring, populating or querying an index
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Invalid or conflicting search configuration, detected at setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The search engine could not be reached
    #[error("Search engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The search engine rejected a request
    #[error("Search engine rejected request ({status} {kind}): {reason}")]
    Engine {
        status: u16,
        kind: String,
        reason: String,
    },

    /// A record could not be converted into a search document
    #[error("Mapping error for record {id}: {reason}")]
    Mapping { id: String, reason: String },

    /// A hit references a record that no longer exists in the backing store
    #[error("Record {id} (kind {kind}) referenced by the index was not found")]
    PartialResult { id: String, kind: String },

    /// The record source failed while streaming records
    #[error("Record source error: {0}")]
    RecordSource(String),

    /// Search options that cannot be satisfied for this record class
    #[error("Invalid search options: {0}")]
    InvalidOptions(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A search request failed; carries the term and options to reproduce it
    #[error("Search for {term:?} failed (options: {options}): {source}")]
    Search {
        term: String,
        options: String,
        #[source]
        source: Box<SearchError>,
    },
}

impl SearchError {
    pub fn mapping(id: impl Into<String>, reason: impl Into<String>) -> Self {
        SearchError::Mapping {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True when the engine (directly or behind a search context) was unreachable
    pub fn is_unavailable(&self) -> bool {
        match self {
            SearchError::EngineUnavailable(_) => true,
            SearchError::Search { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    /// Stable error code string
    pub fn error_code(&self) -> &str {
        match self {
            SearchError::Configuration(_) => "CONFIGURATION_ERROR",
            SearchError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            SearchError::Engine { .. } => "ENGINE_ERROR",
            SearchError::Mapping { .. } => "MAPPING_ERROR",
            SearchError::PartialResult { .. } => "PARTIAL_RESULT",
            SearchError::RecordSource(_) => "RECORD_SOURCE_ERROR",
            SearchError::InvalidOptions(_) => "INVALID_OPTIONS",
            SearchError::Serialization(_) => "SERIALIZATION_ERROR",
            SearchError::Search { source, .. } => source.error_code(),
        }
    }
}

impl From<EngineError> for SearchError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(msg) => SearchError::EngineUnavailable(msg),
            EngineError::Rejected {
                status,
                kind,
                reason,
            } => SearchError::Engine {
                status,
                kind,
                reason,
            },
            EngineError::Decode(msg) => SearchError::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        SearchError::Configuration(err.to_string())
    }
}
