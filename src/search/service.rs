//! Main search service implementation

use crate::config::Config;
use crate::engine::SearchEngine;
use crate::records::{Record, RecordLoader, RecordSource};
use crate::search::config::RecordClass;
use crate::search::descriptor::IndexDescriptor;
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::{IndexManager, ReindexReport};
use crate::search::query::{QueryBuilder, SearchOptions};
use crate::search::results::{LoadedResults, ResultMapper, SearchHit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Search response with results and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Search term as executed (trimmed)
    pub term: String,

    /// Ranked hits for the requested page
    pub hits: Vec<SearchHit>,

    /// Total number of matches (before pagination)
    pub total: u64,

    /// "Did you mean" suggestions, filled when the fallback ran
    pub suggestions: Vec<String>,

    /// True when the primary query found nothing and the hits come from the fallback
    pub used_fallback: bool,

    /// Offset used for pagination
    pub offset: usize,

    /// Page size used for pagination
    pub limit: usize,

    /// Search execution time in milliseconds
    pub took_ms: u64,
}

/// Caller-facing search and index lifecycle API for one record class
pub struct SearchService {
    engine: Arc<dyn SearchEngine>,
    index_manager: IndexManager,
    query_builder: QueryBuilder,
}

impl SearchService {
    /// Create a new search service. Fails on an invalid class configuration.
    pub fn new(engine: Arc<dyn SearchEngine>, class: RecordClass, config: &Config) -> SearchResult<Self> {
        config.validate()?;
        class.config().validate()?;

        let descriptor = IndexDescriptor::new(class, &config.indexing);
        info!(
            class = %descriptor.class().name(),
            alias = %descriptor.alias(),
            "Search service ready"
        );

        Ok(Self {
            index_manager: IndexManager::new(Arc::clone(&engine), descriptor, &config.indexing),
            query_builder: QueryBuilder::new(config.query.clone()),
            engine,
        })
    }

    pub fn class(&self) -> &RecordClass {
        self.index_manager.descriptor().class()
    }

    /// Alias every query goes through
    pub fn alias(&self) -> &str {
        self.index_manager.alias()
    }

    pub fn index_manager(&self) -> &IndexManager {
        &self.index_manager
    }

    /// Run a search.
    ///
    /// When the primary query has no hits and suggest fields are declared, a
    /// fuzzy fallback runs and its hits are returned with the suggestions.
    pub async fn search(&self, term: &str, options: &SearchOptions) -> SearchResult<SearchResponse> {
        self.execute(term, options)
            .await
            .map_err(|e| search_error(term, options, e))
    }

    /// Run a search and load the matching records, in ranking order
    pub async fn search_records<L>(
        &self,
        term: &str,
        options: &SearchOptions,
        loader: &L,
    ) -> SearchResult<LoadedResults<L::Record>>
    where
        L: RecordLoader + ?Sized,
    {
        let response = self.search(term, options).await?;
        ResultMapper::load(&response.hits, self.class(), loader)
            .await
            .map_err(|e| search_error(term, options, e))
    }

    async fn execute(&self, term: &str, options: &SearchOptions) -> SearchResult<SearchResponse> {
        let start_time = Instant::now();
        let class = self.class();
        let query = self.query_builder.build(term, options, class)?;

        debug!(alias = %self.alias(), body = %query.body, "Executing search");
        let response = self.engine.search(self.alias(), &query.body).await?;

        let mut hits = ResultMapper::to_hits(&response, class, &query.body);
        let mut total = response.hits.total.value;
        let mut suggestions = Vec::new();
        let mut used_fallback = false;

        // a page past the end of a non-empty result set is not a miss
        if total == 0 {
            if let Some(ref fallback) = query.fallback {
                debug!(alias = %self.alias(), body = %fallback, "No hits; running suggest fallback");
                let response = self.engine.search(self.alias(), fallback).await?;
                hits = ResultMapper::to_hits(&response, class, fallback);
                total = response.hits.total.value;
                suggestions = ResultMapper::suggestions(&response);
                used_fallback = true;
            }
        }

        let took_ms = start_time.elapsed().as_millis() as u64;
        debug!(
            alias = %self.alias(),
            term = %query.term,
            total,
            used_fallback,
            took_ms,
            "Search complete"
        );

        Ok(SearchResponse {
            term: query.term,
            hits,
            total,
            suggestions,
            used_fallback,
            offset: query.from,
            limit: query.size,
            took_ms,
        })
    }

    /// Rebuild the index from `source` and swap it in
    pub async fn reindex<S>(&self, source: &S) -> SearchResult<ReindexReport>
    where
        S: RecordSource + ?Sized,
    {
        self.index_manager.reindex(source).await
    }

    /// Delete every index behind the alias, plus orphans from failed runs
    pub async fn delete_index(&self) -> SearchResult<Vec<String>> {
        let deleted = self.index_manager.delete_all().await?;
        info!(alias = %self.alias(), deleted = ?deleted, "Deleted indices");
        Ok(deleted)
    }

    pub async fn index_exists(&self) -> SearchResult<bool> {
        self.index_manager.index_exists().await
    }

    pub async fn refresh(&self) -> SearchResult<()> {
        self.index_manager.refresh().await
    }

    pub async fn index_record<R: Record + ?Sized>(&self, record: &R) -> SearchResult<()> {
        self.index_manager.index_record(record).await
    }

    pub async fn remove_record(&self, id: &str) -> SearchResult<bool> {
        self.index_manager.remove_record(id).await
    }
}

fn search_error(term: &str, options: &SearchOptions, source: SearchError) -> SearchError {
    SearchError::Search {
        term: term.to_string(),
        options: format!("{:?}", options),
        source: Box::new(source),
    }
}
