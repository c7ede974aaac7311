use crate::records::{Record, RecordLoader, RecordSource};
use crate::search::SearchResult;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

/// In-memory record store (for development and testing)
#[derive(Clone)]
pub struct InMemoryRecordStore<R> {
    records: Arc<DashMap<String, R>>,
}

impl<R: Record + Clone> InMemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn from_records(records: impl IntoIterator<Item = R>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: R) {
        let id = record.id();
        self.records.insert(id.clone(), record);
        tracing::debug!(record_id = %id, "Record saved");
    }

    pub fn remove(&self, id: &str) -> Option<R> {
        self.records.remove(id).map(|(_, record)| record)
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.records.get(id).map(|entry| entry.clone())
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R: Record + Clone> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record + Clone + 'static> RecordSource for InMemoryRecordStore<R> {
    type Record = R;

    fn records(&self) -> BoxStream<'_, SearchResult<R>> {
        // Snapshot so a concurrent insert cannot hold a shard lock across awaits
        let mut snapshot: Vec<R> = self.records.iter().map(|entry| entry.value().clone()).collect();
        snapshot.sort_by_key(|record| record.id());
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl<R: Record + Clone + 'static> RecordLoader for InMemoryRecordStore<R> {
    type Record = R;

    async fn find_many(&self, kind: Option<&str>, ids: &[String]) -> SearchResult<Vec<R>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|record| kind.is_none() || record.kind() == kind)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::JsonRecord;
    use futures::TryStreamExt;

    fn named(id: &str, name: &str) -> JsonRecord {
        JsonRecord::new(id).with_attribute("name", name)
    }

    #[tokio::test]
    async fn test_source_is_restartable() {
        let store = InMemoryRecordStore::from_records([named("2", "b"), named("1", "a")]);

        let first: Vec<_> = store.records().try_collect().await.unwrap();
        let second: Vec<_> = store.records().try_collect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].id, "1");
    }

    #[tokio::test]
    async fn test_find_many_skips_missing() {
        let store = InMemoryRecordStore::from_records([named("1", "a"), named("2", "b")]);
        store.remove("2");

        let found = store
            .find_many(None, &["2".to_string(), "1".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "1");
    }

    #[tokio::test]
    async fn test_find_many_filters_kind() {
        let store = InMemoryRecordStore::from_records([
            named("1", "Rex").with_kind("dog"),
            named("2", "Tom").with_kind("cat"),
        ]);

        let ids = vec!["1".to_string(), "2".to_string()];
        let dogs = store.find_many(Some("dog"), &ids).await.unwrap();
        assert_eq!(dogs.len(), 1);
        assert_eq!(dogs[0].id, "1");
    }
}
