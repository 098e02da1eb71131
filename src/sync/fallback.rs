//! The Offline Fallback: answers a request from the cache when the server cannot be reached.

use crate::api::{Endpoint, Method, Request};
use crate::cache::{CacheStore, Document};
use crate::connectivity::{Connectivity, SYNC_TAG};
use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::model::{Collection, Expense, Record, SyncStatus, ID_KEY};
use crate::sync::locks::CollectionLocks;
use anyhow::anyhow;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

/// The prefix of identifiers generated for records created while offline.
pub const PENDING_PREFIX: &str = "pending";

/// Serves `request` without the network.
///
/// - A collection read returns every cached entry, synced and pending, filtered locally when the
///   request carries an expense filter. An empty cache gives an empty list.
/// - A create stores the payload as a pending entry under a new `pending_<millis>` identifier and
///   returns it. A background reconciliation is then requested from `oracle`; failing to register
///   it is logged and otherwise ignored.
/// - Anything else fails with an `ErrorType::Offline` error.
pub(crate) async fn handle_offline_request(
    cache: &dyn CacheStore,
    oracle: &dyn Connectivity,
    locks: &CollectionLocks,
    request: &Request,
) -> crate::Result<Option<Value>> {
    match (request.method(), request.endpoint()) {
        (Method::Get, Endpoint::Collection { collection, filter }) => {
            let documents = cache.list(*collection).await.pub_result(ErrorType::Cache)?;
            let bodies = documents.into_iter().map(Document::into_body);
            let items: Vec<Value> = if *collection == Collection::Expenses && !filter.is_empty() {
                bodies
                    .filter(|body| match Expense::from_value(body.clone()) {
                        Ok(expense) => filter.matches(&expense),
                        Err(e) => {
                            warn!("Skipping an unreadable cached expense: {e:#}");
                            false
                        }
                    })
                    .collect()
            } else {
                bodies.collect()
            };
            info!("Offline: served {} {collection} from the cache", items.len());
            Ok(Some(Value::Array(items)))
        }
        (Method::Post, Endpoint::Collection { collection, .. }) => {
            let document = record_pending(cache, locks, *collection, request.body())
                .await
                .pub_result(ErrorType::Cache)?;
            info!(
                "Offline: recorded {collection} entry '{}' as pending",
                document.id()
            );
            if let Err(e) = oracle.register_background_sync(SYNC_TAG).await {
                warn!("Background sync registration failed: {e:#}");
            }
            Ok(Some(document.into_body()))
        }
        _ => {
            info!("Offline: {request} requires an internet connection");
            Err(Error::offline())
        }
    }
}

async fn record_pending(
    cache: &dyn CacheStore,
    locks: &CollectionLocks,
    collection: Collection,
    payload: Option<&Value>,
) -> Res<Document> {
    let Some(Value::Object(payload)) = payload else {
        return Err(anyhow!("A create request needs a JSON object body"));
    };
    let _guard = locks.lock(collection).await;
    let id = next_pending_id(cache, collection).await?;
    let mut body = payload.clone();
    body.insert(ID_KEY.to_string(), Value::String(id));
    let document = Document::new(SyncStatus::Pending, Value::Object(body))?;
    cache.add(collection, &document).await?;
    Ok(document)
}

/// `pending_<unix millis>`, moved forward a millisecond at a time while the cache already has
/// that identifier.
async fn next_pending_id(cache: &dyn CacheStore, collection: Collection) -> Res<String> {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let id = format!("{PENDING_PREFIX}_{millis}");
        if cache.get(collection, &id).await?.is_none() {
            return Ok(id);
        }
        millis += 1;
    }
}

/// True for identifiers generated by this module.
pub fn is_pending_id(id: &str) -> bool {
    id.strip_prefix(PENDING_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::connectivity::FixedOracle;
    use crate::model::ExpenseFilter;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_cache_reads_as_empty_list() {
        let cache = MemoryCache::new();
        let oracle = FixedOracle::offline();
        for collection in Collection::RECONCILE_ORDER {
            let request = Request::get(Endpoint::collection(collection));
            let result =
                handle_offline_request(&cache, &oracle, &CollectionLocks::new(), &request)
                    .await
                    .unwrap();
            assert_eq!(result, Some(json!([])));
        }
    }

    #[tokio::test]
    async fn test_create_records_pending_and_registers() {
        let cache = MemoryCache::new();
        let oracle = FixedOracle::offline();
        let locks = CollectionLocks::new();
        let request = Request::post(
            Endpoint::collection(Collection::Expenses),
            json!({"amount": 50, "reason": "Coffee", "categoryId": "cat_1"}),
        );

        let first = handle_offline_request(&cache, &oracle, &locks, &request)
            .await
            .unwrap()
            .unwrap();
        let second = handle_offline_request(&cache, &oracle, &locks, &request)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first["status"], "pending");
        assert!(is_pending_id(first["_id"].as_str().unwrap()));
        assert_ne!(first["_id"], second["_id"]);
        assert_eq!(
            cache
                .count_by_status(Collection::Expenses, SyncStatus::Pending)
                .await
                .unwrap(),
            2
        );
        assert_eq!(oracle.registered(), vec![SYNC_TAG, SYNC_TAG]);
    }

    #[tokio::test]
    async fn test_registration_failure_does_not_fail_the_write() {
        let cache = MemoryCache::new();
        let oracle = FixedOracle::offline();
        oracle.fail_registration(true);
        let request = Request::post(
            Endpoint::collection(Collection::Categories),
            json!({"name": "Gifts"}),
        );
        let created = handle_offline_request(&cache, &oracle, &CollectionLocks::new(), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created["name"], "Gifts");
        assert_eq!(cache.list(Collection::Categories).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_updates_and_deletes_need_the_network() {
        let cache = MemoryCache::new();
        let oracle = FixedOracle::offline();
        let locks = CollectionLocks::new();
        let requests = [
            Request::patch(Endpoint::item(Collection::Expenses, "e1"), json!({})),
            Request::delete(Endpoint::item(Collection::Categories, "c1")),
            Request::get(Endpoint::item(Collection::Expenses, "e1")),
            Request::get(Endpoint::Other("/auth/me".to_string())),
        ];
        for request in &requests {
            let err = handle_offline_request(&cache, &oracle, &locks, request)
                .await
                .unwrap_err();
            assert!(err.is_offline());
            assert_eq!(
                err.to_string(),
                "Offline: This action requires an internet connection."
            );
        }
    }

    #[tokio::test]
    async fn test_offline_filter_is_applied_locally() {
        let cache = MemoryCache::new();
        let docs = [
            Document::new(
                SyncStatus::Synced,
                json!({"_id": "e1", "categoryId": "c1", "amount": 5, "reason": "Tea"}),
            )
            .unwrap(),
            Document::new(
                SyncStatus::Pending,
                json!({"_id": "pending_7", "categoryId": "c2", "amount": 9, "reason": "Bus"}),
            )
            .unwrap(),
        ];
        cache.bulk_add(Collection::Expenses, &docs).await.unwrap();
        let request = Request::get(Endpoint::expenses(ExpenseFilter::category("c2")));
        let result = handle_offline_request(
            &cache,
            &FixedOracle::offline(),
            &CollectionLocks::new(),
            &request,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.as_array().unwrap().len(), 1);
        assert_eq!(result[0]["_id"], "pending_7");
    }

    #[test]
    fn test_is_pending_id() {
        assert!(is_pending_id("pending_1700000000000"));
        assert!(!is_pending_id("pending_"));
        assert!(!is_pending_id("pending_12a"));
        assert!(!is_pending_id("e9"));
    }
}
