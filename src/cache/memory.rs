//! Implements the `CacheStore` trait in memory.
//!
//! Note: this is compiled even in the "production" version of this app so that the whole client
//! can run, top-to-bottom, without a SQLite file.

use crate::cache::{CacheStore, Document};
use crate::model::{Collection, SyncStatus};
use anyhow::bail;
use std::sync::{Mutex, MutexGuard};

/// A `CacheStore` holding its documents in memory, with one lock per collection.
#[derive(Debug, Default)]
pub struct MemoryCache {
    categories: Mutex<Vec<Document>>,
    expenses: Mutex<Vec<Document>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, collection: Collection) -> anyhow::Result<MutexGuard<'_, Vec<Document>>> {
        let lock = match collection {
            Collection::Categories => &self.categories,
            Collection::Expenses => &self.expenses,
        };
        match lock.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => bail!("The in-memory {collection} cache is poisoned"),
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn list(&self, collection: Collection) -> anyhow::Result<Vec<Document>> {
        Ok(self.entries(collection)?.clone())
    }

    async fn list_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<Vec<Document>> {
        Ok(self
            .entries(collection)?
            .iter()
            .filter(|d| d.status() == status)
            .cloned()
            .collect())
    }

    async fn get(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Document>> {
        Ok(self
            .entries(collection)?
            .iter()
            .find(|d| d.id() == id)
            .cloned())
    }

    async fn add(&self, collection: Collection, document: &Document) -> anyhow::Result<()> {
        self.bulk_add(collection, std::slice::from_ref(document))
            .await
    }

    async fn bulk_add(&self, collection: Collection, documents: &[Document]) -> anyhow::Result<()> {
        let mut entries = self.entries(collection)?;
        for (ix, document) in documents.iter().enumerate() {
            let duplicate = entries.iter().any(|d| d.id() == document.id())
                || documents[..ix].iter().any(|d| d.id() == document.id());
            if duplicate {
                bail!(
                    "An entry with id '{}' already exists in the {collection} cache",
                    document.id()
                );
            }
        }
        entries.extend(documents.iter().cloned());
        Ok(())
    }

    async fn put(&self, collection: Collection, document: &Document) -> anyhow::Result<()> {
        let mut entries = self.entries(collection)?;
        match entries.iter_mut().find(|d| d.id() == document.id()) {
            Some(existing) => *existing = document.clone(),
            None => entries.push(document.clone()),
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries(collection)?;
        let before = entries.len();
        entries.retain(|d| d.id() != id);
        Ok(entries.len() != before)
    }

    async fn delete_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<u64> {
        let mut entries = self.entries(collection)?;
        let before = entries.len();
        entries.retain(|d| d.status() != status);
        Ok((before - entries.len()) as u64)
    }

    async fn clear(&self, collection: Collection) -> anyhow::Result<()> {
        self.entries(collection)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, status: SyncStatus) -> Document {
        Document::new(status, json!({"_id": id, "reason": id})).unwrap()
    }

    #[tokio::test]
    async fn test_add_get_delete() {
        let cache = MemoryCache::new();
        cache
            .add(Collection::Expenses, &doc("e1", SyncStatus::Synced))
            .await
            .unwrap();
        assert!(cache.get(Collection::Expenses, "e1").await.unwrap().is_some());
        assert!(cache.get(Collection::Categories, "e1").await.unwrap().is_none());
        assert!(cache.delete(Collection::Expenses, "e1").await.unwrap());
        assert!(!cache.delete(Collection::Expenses, "e1").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates() {
        let cache = MemoryCache::new();
        let d = doc("e1", SyncStatus::Synced);
        cache.add(Collection::Expenses, &d).await.unwrap();
        assert!(cache.add(Collection::Expenses, &d).await.is_err());
        let batch = [doc("e2", SyncStatus::Synced), doc("e2", SyncStatus::Synced)];
        assert!(cache.bulk_add(Collection::Expenses, &batch).await.is_err());
        assert_eq!(cache.list(Collection::Expenses).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_synced_keeps_pending() {
        let cache = MemoryCache::new();
        let initial = [
            doc("e1", SyncStatus::Synced),
            doc("pending_1", SyncStatus::Pending),
            doc("e2", SyncStatus::Synced),
        ];
        cache
            .bulk_add(Collection::Expenses, &initial)
            .await
            .unwrap();

        cache
            .replace_synced(Collection::Expenses, &[doc("e3", SyncStatus::Synced)])
            .await
            .unwrap();

        let ids: Vec<String> = cache
            .list(Collection::Expenses)
            .await
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        assert_eq!(ids, vec!["pending_1", "e3"]);
    }

    #[tokio::test]
    async fn test_put_overwrites_in_place() {
        let cache = MemoryCache::new();
        let batch = [doc("c1", SyncStatus::Synced), doc("c2", SyncStatus::Synced)];
        cache
            .bulk_add(Collection::Categories, &batch)
            .await
            .unwrap();
        let updated = Document::new(SyncStatus::Synced, json!({"_id": "c1", "name": "New"}))
            .unwrap();
        cache.put(Collection::Categories, &updated).await.unwrap();
        let all = cache.list(Collection::Categories).await.unwrap();
        assert_eq!(all[0], updated);
        assert_eq!(all.len(), 2);
        assert_eq!(
            cache
                .count_by_status(Collection::Categories, SyncStatus::Pending)
                .await
                .unwrap(),
            0
        );
    }
}
