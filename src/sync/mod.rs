//! The offline-first synchronization core.
//!
//! Every call to the server goes through the `Gateway`. When the server answers, the answer is
//! mirrored into the local cache (see `mirror`). When it cannot be reached, the Offline Fallback
//! answers reads from the cache and records creates as pending entries, which the `Reconciler`
//! later replays. `SyncClient` ties these together behind typed operations.

mod fallback;
mod gateway;
mod locks;
mod mirror;
mod reconcile;

pub use fallback::{is_pending_id, PENDING_PREFIX};
pub use gateway::Gateway;
pub use reconcile::{PassOutcome, Reconciler, Replayed, Retained, SyncReport};

use crate::api::{Endpoint, Request, Transport};
use crate::cache::CacheStore;
use crate::connectivity::Connectivity;
use crate::error::{Error, ErrorType, IntoResult};
use crate::model::{
    Category, CategoryUpdate, Collection, Expense, ExpenseFilter, ExpenseUpdate, NewCategory,
    NewExpense, Record, SyncStatus,
};
use anyhow::{anyhow, Context};
use locks::CollectionLocks;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Where the client stands: reachability and what the cache holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub online: bool,
    pub cached_categories: u64,
    pub pending_categories: u64,
    pub cached_expenses: u64,
    pub pending_expenses: u64,
}

/// The entry point to the synchronization core.
pub struct SyncClient {
    gateway: Gateway,
    reconciler: Arc<Reconciler>,
    cache: Arc<dyn CacheStore>,
    oracle: Arc<dyn Connectivity>,
}

impl SyncClient {
    /// - `entry_timeout`: how long reconciliation waits for the server on any one pending entry
    pub fn new(
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        oracle: Arc<dyn Connectivity>,
        entry_timeout: Duration,
    ) -> Self {
        let locks = Arc::new(CollectionLocks::new());
        let reconciler = Arc::new(Reconciler::new(
            cache.clone(),
            transport.clone(),
            oracle.clone(),
            locks.clone(),
            entry_timeout,
        ));
        let gateway = Gateway::new(
            cache.clone(),
            transport,
            oracle.clone(),
            locks,
            reconciler.clone(),
        );
        Self {
            gateway,
            reconciler,
            cache,
            oracle,
        }
    }

    /// Sends a raw request through the gateway.
    pub async fn request(&self, request: &Request) -> crate::Result<Option<Value>> {
        self.gateway.request(request).await
    }

    /// Replays every pending entry. See `Reconciler::run`.
    pub async fn sync_pending_data(&self) -> crate::Result<SyncReport> {
        self.reconciler.run().await
    }

    pub fn is_online(&self) -> bool {
        self.oracle.is_online()
    }

    pub fn oracle(&self) -> &Arc<dyn Connectivity> {
        &self.oracle
    }

    pub async fn status(&self) -> crate::Result<SyncState> {
        let pending_categories = self.count(Collection::Categories, SyncStatus::Pending).await?;
        let pending_expenses = self.count(Collection::Expenses, SyncStatus::Pending).await?;
        let synced_categories = self.count(Collection::Categories, SyncStatus::Synced).await?;
        let synced_expenses = self.count(Collection::Expenses, SyncStatus::Synced).await?;
        Ok(SyncState {
            online: self.oracle.is_online(),
            cached_categories: synced_categories + pending_categories,
            pending_categories,
            cached_expenses: synced_expenses + pending_expenses,
            pending_expenses,
        })
    }

    async fn count(&self, collection: Collection, status: SyncStatus) -> crate::Result<u64> {
        self.cache
            .count_by_status(collection, status)
            .await
            .pub_result(ErrorType::Cache)
    }

    pub async fn list_expenses(&self, filter: &ExpenseFilter) -> crate::Result<Vec<Expense>> {
        self.list(Endpoint::expenses(filter.clone())).await
    }

    pub async fn create_expense(&self, expense: &NewExpense) -> crate::Result<Expense> {
        self.create(expense).await
    }

    pub async fn update_expense(&self, id: &str, update: &ExpenseUpdate) -> crate::Result<Expense> {
        self.update(id, update).await
    }

    pub async fn delete_expense(&self, id: &str) -> crate::Result<()> {
        self.delete(Collection::Expenses, id).await
    }

    pub async fn list_categories(&self) -> crate::Result<Vec<Category>> {
        self.list(Endpoint::collection(Collection::Categories)).await
    }

    pub async fn create_category(&self, category: &NewCategory) -> crate::Result<Category> {
        self.create(category).await
    }

    pub async fn update_category(
        &self,
        id: &str,
        update: &CategoryUpdate,
    ) -> crate::Result<Category> {
        self.update(id, update).await
    }

    pub async fn delete_category(&self, id: &str) -> crate::Result<()> {
        self.delete(Collection::Categories, id).await
    }

    async fn list<R: Record>(&self, endpoint: Endpoint) -> crate::Result<Vec<R>> {
        let body = self.request(&Request::get(endpoint)).await?;
        let items = match body {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::new(
                    ErrorType::Payload,
                    anyhow!("Expected a list of {}, got {other}", R::COLLECTION),
                ))
            }
            None => Vec::new(),
        };
        items
            .into_iter()
            .map(R::from_value)
            .collect::<anyhow::Result<Vec<R>>>()
            .pub_result(ErrorType::Payload)
    }

    async fn create<R: Record>(&self, payload: &(impl Serialize + Sync)) -> crate::Result<R> {
        let payload = serde_json::to_value(payload)
            .context("Unable to serialize the new record")
            .pub_result(ErrorType::Payload)?;
        let request = Request::post(Endpoint::collection(R::COLLECTION), payload);
        let body = self.request(&request).await?;
        parse_one(&request, body)
    }

    async fn update<R: Record>(
        &self,
        id: &str,
        update: &(impl Serialize + Sync),
    ) -> crate::Result<R> {
        let changes = serde_json::to_value(update)
            .context("Unable to serialize the update")
            .pub_result(ErrorType::Payload)?;
        let request = Request::patch(Endpoint::item(R::COLLECTION, id), changes);
        let body = self.request(&request).await?;
        parse_one(&request, body)
    }

    async fn delete(&self, collection: Collection, id: &str) -> crate::Result<()> {
        self.request(&Request::delete(Endpoint::item(collection, id)))
            .await
            .map(|_| ())
    }
}

fn parse_one<R: Record>(request: &Request, body: Option<Value>) -> crate::Result<R> {
    let body = body
        .with_context(|| format!("The server returned no record for {request}"))
        .pub_result(ErrorType::Payload)?;
    R::from_value(body).pub_result(ErrorType::Payload)
}
