//! Index lifecycle: create, populate, swap, delete

use crate::config::IndexingConfig;
use crate::engine::{AliasAction, BulkOperation, SearchEngine};
use crate::records::{Record, RecordSource};
use crate::search::descriptor::IndexDescriptor;
use crate::search::document::DocumentMapper;
use crate::search::error::{SearchError, SearchResult};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A concrete, versioned index created for an alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHandle {
    /// Stable alias queries go through
    pub alias: String,

    /// Concrete index name (`{alias}_{yyyyMMddHHmmssSSS}[_n]`)
    pub name: String,
}

/// A record that did not make it into the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of populating one index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationReport {
    /// Documents accepted by the engine
    pub indexed: usize,

    /// Records skipped by the mapper or rejected by the engine
    pub failures: Vec<DocumentFailure>,
}

impl PopulationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a full reindex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexReport {
    /// The index now behind the alias
    pub handle: IndexHandle,

    pub population: PopulationReport,

    /// Indices the alias pointed to before the swap (now deleted)
    pub replaced: Vec<String>,

    /// Versioned indices left behind by earlier failed runs (now deleted)
    pub orphans_removed: Vec<String>,

    pub duration_ms: u64,
}

/// Manages the versioned indices behind one alias
pub struct IndexManager {
    engine: Arc<dyn SearchEngine>,
    descriptor: IndexDescriptor,
    batch_size: usize,
}

impl IndexManager {
    pub fn new(engine: Arc<dyn SearchEngine>, descriptor: IndexDescriptor, indexing: &IndexingConfig) -> Self {
        Self {
            engine,
            descriptor,
            batch_size: indexing.batch_size.max(1),
        }
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn alias(&self) -> &str {
        self.descriptor.alias()
    }

    /// Create a new, empty versioned index with the descriptor's settings and mappings
    pub async fn create_index(&self) -> SearchResult<IndexHandle> {
        let base = self.descriptor.versioned_name(Utc::now());
        let mut name = base.clone();
        let mut n = 0;
        while self.engine.index_exists(&name).await? {
            n += 1;
            name = format!("{}_{}", base, n);
        }

        self.engine.create_index(&name, &self.descriptor.body()).await?;
        info!(alias = %self.alias(), index = %name, "Created index");

        Ok(IndexHandle {
            alias: self.alias().to_string(),
            name,
        })
    }

    /// Stream every record into `handle` in batches.
    ///
    /// Unmappable records and engine-rejected documents are skipped and
    /// reported; an unreachable engine or a failing record source aborts.
    /// Ends with a refresh so the index is fully searchable before any swap.
    pub async fn populate<S>(&self, handle: &IndexHandle, source: &S) -> SearchResult<PopulationReport>
    where
        S: RecordSource + ?Sized,
    {
        let started = Instant::now();
        let class = self.descriptor.class();
        let mut report = PopulationReport::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        let mut records = source.records();
        while let Some(record) = records.next().await {
            let record = record?;
            match DocumentMapper::to_document(&record, class) {
                Ok(document) => batch.push(BulkOperation::Index {
                    id: document.id.clone(),
                    source: document.source(),
                }),
                Err(SearchError::Mapping { id, reason }) => {
                    warn!(index = %handle.name, record_id = %id, reason = %reason, "Skipping unmappable record");
                    report.failures.push(DocumentFailure { id, reason });
                }
                Err(e) => return Err(e),
            }

            if batch.len() >= self.batch_size {
                self.flush(handle, &mut batch, &mut report).await?;
            }
        }
        self.flush(handle, &mut batch, &mut report).await?;

        self.engine.refresh(&handle.name).await?;

        info!(
            index = %handle.name,
            indexed = report.indexed,
            failed = report.failures.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Populated index"
        );
        Ok(report)
    }

    async fn flush(
        &self,
        handle: &IndexHandle,
        batch: &mut Vec<BulkOperation>,
        report: &mut PopulationReport,
    ) -> SearchResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let operations = std::mem::take(batch);
        debug!(index = %handle.name, documents = operations.len(), "Sending bulk request");
        let response = self.engine.bulk(&handle.name, &operations).await?;

        let mut failed = 0;
        for item in &response.items {
            let result = item.result();
            if let Some(ref error) = result.error {
                failed += 1;
                let reason = format!("{}: {}", error.kind, error.reason);
                warn!(index = %handle.name, record_id = %result.id, reason = %reason, "Engine rejected document");
                report.failures.push(DocumentFailure {
                    id: result.id.clone(),
                    reason,
                });
            }
        }
        report.indexed += operations.len().saturating_sub(failed);
        Ok(())
    }

    /// Point the alias at `handle` in one atomic request.
    ///
    /// Returns the indices the alias pointed to before. A legacy concrete
    /// index occupying the alias name is dropped in the same request.
    pub async fn swap_alias(&self, handle: &IndexHandle) -> SearchResult<Vec<String>> {
        let alias = self.alias();
        let current = self.engine.get_alias(alias).await?;

        let mut actions = Vec::new();
        if current.is_empty() && self.engine.index_exists(alias).await? {
            warn!(alias = %alias, "Replacing concrete index that occupies the alias name");
            actions.push(AliasAction::RemoveIndex {
                index: alias.to_string(),
            });
        }

        let previous: Vec<String> = current.into_iter().filter(|name| *name != handle.name).collect();
        for old in &previous {
            actions.push(AliasAction::Remove {
                index: old.clone(),
                alias: alias.to_string(),
            });
        }
        actions.push(AliasAction::Add {
            index: handle.name.clone(),
            alias: alias.to_string(),
        });

        self.engine.update_aliases(&actions).await?;
        info!(alias = %alias, index = %handle.name, replaced = ?previous, "Swapped alias");
        Ok(previous)
    }

    /// Delete a concrete index; deleting a missing index is not an error
    pub async fn delete_index(&self, name: &str) -> SearchResult<bool> {
        let deleted = self.engine.delete_index(name).await?;
        if deleted {
            info!(index = %name, "Deleted index");
        } else {
            debug!(index = %name, "Index already absent");
        }
        Ok(deleted)
    }

    /// Create, populate, swap and clean up, strictly in that order.
    ///
    /// If population fails the new index is left orphaned (removed by the next
    /// run) and the alias keeps serving the previous index. Concurrent
    /// reindexes of the same class are not coordinated; callers must serialize them.
    pub async fn reindex<S>(&self, source: &S) -> SearchResult<ReindexReport>
    where
        S: RecordSource + ?Sized,
    {
        let started = Instant::now();
        info!(alias = %self.alias(), "Starting reindex");

        let handle = self.create_index().await?;
        let population = match self.populate(&handle, source).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    alias = %self.alias(),
                    index = %handle.name,
                    error = %e,
                    "Population failed; alias left untouched"
                );
                return Err(e);
            }
        };

        let replaced = self.swap_alias(&handle).await?;
        for old in &replaced {
            self.delete_index(old).await?;
        }
        let orphans_removed = self.remove_orphans(&handle.name).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            alias = %self.alias(),
            index = %handle.name,
            indexed = population.indexed,
            failed = population.failures.len(),
            duration_ms,
            "Reindex complete"
        );

        Ok(ReindexReport {
            handle,
            population,
            replaced,
            orphans_removed,
            duration_ms,
        })
    }

    /// Versioned indices of this alias that nothing points to, except `keep`
    pub async fn orphaned_indices(&self, keep: &str) -> SearchResult<Vec<String>> {
        let aliased = self.engine.get_alias(self.alias()).await?;
        let candidates = self.engine.list_indices(&self.descriptor.versioned_pattern()).await?;
        Ok(candidates
            .into_iter()
            .filter(|name| name != keep && !aliased.contains(name) && self.descriptor.is_versioned_name(name))
            .collect())
    }

    async fn remove_orphans(&self, keep: &str) -> SearchResult<Vec<String>> {
        let orphans = self.orphaned_indices(keep).await?;
        for orphan in &orphans {
            warn!(index = %orphan, "Removing orphaned index from an earlier run");
            self.delete_index(orphan).await?;
        }
        Ok(orphans)
    }

    /// Delete everything behind the alias: aliased indices, orphans and a
    /// concrete index occupying the alias name. Returns the deleted names.
    pub async fn delete_all(&self) -> SearchResult<Vec<String>> {
        let alias = self.alias();
        let mut targets = self.engine.get_alias(alias).await?;
        if targets.is_empty() && self.engine.index_exists(alias).await? {
            targets.push(alias.to_string());
        }
        for orphan in self.orphaned_indices("").await? {
            if !targets.contains(&orphan) {
                targets.push(orphan);
            }
        }

        let mut deleted = Vec::new();
        for name in targets {
            if self.delete_index(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Does the alias (or a concrete index with its name) exist?
    pub async fn index_exists(&self) -> SearchResult<bool> {
        Ok(self.engine.index_exists(self.alias()).await?)
    }

    /// Make all writes through the alias visible to search
    pub async fn refresh(&self) -> SearchResult<()> {
        Ok(self.engine.refresh(self.alias()).await?)
    }

    /// Concrete indices currently behind the alias
    pub async fn resolve_alias(&self) -> SearchResult<Vec<String>> {
        Ok(self.engine.get_alias(self.alias()).await?)
    }

    /// Index or overwrite one record through the alias
    pub async fn index_record<R: Record + ?Sized>(&self, record: &R) -> SearchResult<()> {
        let document = DocumentMapper::to_document(record, self.descriptor.class())?;
        let operation = BulkOperation::Index {
            id: document.id.clone(),
            source: document.source(),
        };

        let response = self.engine.bulk(self.alias(), std::slice::from_ref(&operation)).await?;
        if let Some(failure) = response.failures().next() {
            let error = failure.error.clone().unwrap_or_else(|| crate::engine::EngineErrorBody {
                kind: "unknown".to_string(),
                reason: String::new(),
            });
            return Err(SearchError::Engine {
                status: failure.status,
                kind: error.kind,
                reason: error.reason,
            });
        }

        debug!(alias = %self.alias(), record_id = %document.id, "Indexed record");
        Ok(())
    }

    /// Remove one record through the alias. Returns `false` if it was not indexed.
    pub async fn remove_record(&self, id: &str) -> SearchResult<bool> {
        let removed = self.engine.delete_document(self.alias(), id).await?;
        debug!(alias = %self.alias(), record_id = %id, removed, "Removed record");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use crate::records::{InMemoryRecordStore, JsonRecord};
    use crate::search::config::{RecordClass, SearchConfig};
    use serde_json::json;

    fn manager(engine: &InMemoryEngine, batch_size: usize) -> IndexManager {
        let class = RecordClass::new(
            "product",
            SearchConfig::builder().location("location").build().unwrap(),
        )
        .unwrap();
        let indexing = IndexingConfig {
            batch_size,
            ..Default::default()
        };
        IndexManager::new(
            Arc::new(engine.clone()),
            IndexDescriptor::new(class, &indexing),
            &indexing,
        )
    }

    fn store(names: &[&str]) -> InMemoryRecordStore<JsonRecord> {
        InMemoryRecordStore::from_records(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| JsonRecord::new((i + 1).to_string()).with_attribute("name", *name)),
        )
    }

    #[tokio::test]
    async fn test_create_index_disambiguates_names() {
        let engine = InMemoryEngine::new();
        let manager = manager(&engine, 10);

        let handles = futures::future::join_all((0..3).map(|_| manager.create_index())).await;
        let mut names: Vec<String> = handles.into_iter().map(|h| h.unwrap().name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| manager.descriptor().is_versioned_name(n)));
    }

    #[tokio::test]
    async fn test_populate_batches_and_refreshes() {
        let engine = InMemoryEngine::new();
        let manager = manager(&engine, 2);
        let handle = manager.create_index().await.unwrap();

        let report = manager
            .populate(&handle, &store(&["Dustin Bag", "Gummy Bear", "Altoid Mints"]))
            .await
            .unwrap();

        assert_eq!(report.indexed, 3);
        assert!(report.is_complete());
        assert_eq!(engine.document_count(&handle.name), 3);
    }

    #[tokio::test]
    async fn test_populate_reports_mapping_failures() {
        let engine = InMemoryEngine::new();
        let manager = manager(&engine, 10);
        let handle = manager.create_index().await.unwrap();

        let store = store(&["Dustin Bag"]);
        store.insert(JsonRecord::new("9").with_attribute("location", json!(["north", "west"])));

        let report = manager.populate(&handle, &store).await.unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "9");
    }

    #[tokio::test]
    async fn test_swap_alias_returns_previous() {
        let engine = InMemoryEngine::new();
        let manager = manager(&engine, 10);

        let first = manager.create_index().await.unwrap();
        assert!(manager.swap_alias(&first).await.unwrap().is_empty());

        let second = manager.create_index().await.unwrap();
        assert_eq!(manager.swap_alias(&second).await.unwrap(), vec![first.name.clone()]);
        assert_eq!(manager.resolve_alias().await.unwrap(), vec![second.name]);
    }

    #[tokio::test]
    async fn test_delete_index_is_idempotent() {
        let engine = InMemoryEngine::new();
        let manager = manager(&engine, 10);
        let handle = manager.create_index().await.unwrap();

        assert!(manager.delete_index(&handle.name).await.unwrap());
        assert!(!manager.delete_index(&handle.name).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_engine_aborts_creation() {
        let engine = InMemoryEngine::new();
        engine.set_offline(true);
        let manager = manager(&engine, 10);

        let err = manager.create_index().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_index_and_remove_record() {
        let engine = InMemoryEngine::new();
        let manager = manager(&engine, 10);
        manager.reindex(&store(&["Dustin Bag"])).await.unwrap();

        manager
            .index_record(&JsonRecord::new("2").with_attribute("name", "Gummy Bear"))
            .await
            .unwrap();
        manager.refresh().await.unwrap();
        assert_eq!(engine.document_count("products"), 2);

        assert!(manager.remove_record("2").await.unwrap());
        assert!(!manager.remove_record("42").await.unwrap());
        manager.refresh().await.unwrap();
        assert_eq!(engine.document_count("products"), 1);

        let bad = JsonRecord::new("3").with_attribute("location", json!(["x", "y"]));
        assert!(matches!(
            manager.index_record(&bad).await,
            Err(SearchError::Mapping { .. })
        ));
    }
}
