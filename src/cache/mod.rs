//! The local cache of expense and category records.
//!
//! Records are stored as JSON documents, one collection per record type, each entry tagged with a
//! `SyncStatus`. The `CacheStore` trait is the capability handed to the synchronization
//! components; `Db` (SQLite) implements it for real use and `MemoryCache` for tests.

mod memory;

use crate::model::{Collection, Record, SyncStatus, ID_KEY, STATUS_KEY};
use anyhow::{bail, Context};
use serde_json::Value;

pub use memory::MemoryCache;

/// One cached record: its key, its synchronization status and the full JSON body.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Document {
    id: String,
    status: SyncStatus,
    body: Value,
}

impl Document {
    /// Creates a document from a JSON object that has a string `_id`. The body's `status` field is
    /// overwritten with `status` so that the two never disagree.
    pub fn new(status: SyncStatus, mut body: Value) -> anyhow::Result<Self> {
        let Some(map) = body.as_object_mut() else {
            bail!("A cached document must be a JSON object");
        };
        let id = match map.get(ID_KEY) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                bail!("The '{ID_KEY}' of a cached document must be a string, got {other}")
            }
            None => bail!("A cached document is missing its '{ID_KEY}' field"),
        };
        map.insert(STATUS_KEY.to_string(), Value::String(status.to_string()));
        Ok(Self { id, status, body })
    }

    pub fn from_record<R: Record>(record: &R) -> anyhow::Result<Self> {
        Self::new(record.status(), record.to_value()?)
    }

    /// Parses the document body into a record, e.g. an `Expense`.
    pub fn to_record<R: Record>(&self) -> anyhow::Result<R> {
        R::from_value(self.body.clone())
            .with_context(|| format!("Cached document '{}' is not a valid record", self.id))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

/// A document-oriented store holding one list of `Document` per `Collection`. Entries keep their
/// insertion order and are keyed by their identifier.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Every entry of the collection, in insertion order.
    async fn list(&self, collection: Collection) -> anyhow::Result<Vec<Document>>;

    /// The entries of the collection having `status`, in insertion order.
    async fn list_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<Vec<Document>>;

    async fn get(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Document>>;

    /// Adds a new entry. Fails if an entry with the same identifier exists.
    async fn add(&self, collection: Collection, document: &Document) -> anyhow::Result<()>;

    /// Adds many entries. Fails, without adding any, if one of them already exists.
    async fn bulk_add(&self, collection: Collection, documents: &[Document]) -> anyhow::Result<()>;

    /// Inserts or overwrites the entry with the document's identifier. An overwritten entry keeps
    /// its position.
    async fn put(&self, collection: Collection, document: &Document) -> anyhow::Result<()>;

    /// Removes the entry with `id`, returning whether there was one.
    async fn delete(&self, collection: Collection, id: &str) -> anyhow::Result<bool>;

    /// Removes every entry having `status`, returning how many were removed.
    async fn delete_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<u64>;

    /// Removes every entry of the collection.
    async fn clear(&self, collection: Collection) -> anyhow::Result<()>;

    /// Replaces all synced entries with `documents`, leaving pending entries untouched.
    async fn replace_synced(
        &self,
        collection: Collection,
        documents: &[Document],
    ) -> anyhow::Result<()> {
        self.delete_by_status(collection, SyncStatus::Synced).await?;
        self.bulk_add(collection, documents).await
    }

    async fn count_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<u64> {
        Ok(self.list_by_status(collection, status).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_new_sets_status() {
        let doc = Document::new(SyncStatus::Synced, json!({"_id": "e1", "status": "pending"}))
            .unwrap();
        assert_eq!(doc.id(), "e1");
        assert_eq!(doc.status(), SyncStatus::Synced);
        assert_eq!(doc.body()["status"], json!("synced"));
    }

    #[test]
    fn test_document_new_requires_id() {
        assert!(Document::new(SyncStatus::Synced, json!({"name": "Food"})).is_err());
        assert!(Document::new(SyncStatus::Synced, json!({"_id": 7})).is_err());
        assert!(Document::new(SyncStatus::Synced, json!(["e1"])).is_err());
    }
}
