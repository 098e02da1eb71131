//! The cache-mirroring rule: how a successful server answer is reflected in the local cache.

use crate::api::{Endpoint, Method, Request};
use crate::cache::{CacheStore, Document};
use crate::error::Res;
use crate::model::{SyncStatus, ID_KEY};
use crate::sync::locks::CollectionLocks;
use anyhow::{bail, Context};
use serde_json::Value;
use tracing::debug;

/// Applies the server's answer `body` to `request` to the cache.
///
/// | Request              | Cache                                                        |
/// |----------------------|--------------------------------------------------------------|
/// | list                 | synced entries replaced by the list, pending entries kept     |
/// | get one              | the record upserted as synced                                |
/// | update               | the record overwritten as synced                             |
/// | delete               | the entry removed                                            |
/// | create               | nothing, the next list read picks it up                      |
///
/// A filtered list replaces the synced entries too, so afterwards the cache mirrors exactly what
/// the server last listed.
///
/// Endpoints outside the cached collections are never mirrored.
pub(crate) async fn mirror(
    cache: &dyn CacheStore,
    locks: &CollectionLocks,
    request: &Request,
    body: Option<&Value>,
) -> Res<()> {
    let Some(collection) = request.endpoint().target() else {
        return Ok(());
    };

    match (request.method(), request.endpoint()) {
        (Method::Get, Endpoint::Collection { .. }) => {
            let Some(Value::Array(items)) = body else {
                bail!("Expected a list in the response to {request}");
            };
            let documents = items
                .iter()
                .map(|item| Document::new(SyncStatus::Synced, item.clone()))
                .collect::<Res<Vec<_>>>()
                .with_context(|| format!("Unable to cache the response to {request}"))?;

            let _guard = locks.lock(collection).await;
            cache.replace_synced(collection, &documents).await?;
            debug!("Replaced the synced {collection} with {} records", documents.len());
        }
        (Method::Get | Method::Patch, Endpoint::Item { id, .. }) => {
            let Some(body) = body else {
                debug!("Nothing to mirror for {request}");
                return Ok(());
            };
            let mut body = body.clone();
            if let Value::Object(map) = &mut body {
                map.entry(ID_KEY)
                    .or_insert_with(|| Value::String(id.clone()));
            }
            let document = Document::new(SyncStatus::Synced, body)
                .with_context(|| format!("Unable to cache the response to {request}"))?;
            let _guard = locks.lock(collection).await;
            cache.put(collection, &document).await?;
            debug!("Cached {collection} entry '{}' as synced", document.id());
        }
        (Method::Delete, Endpoint::Item { id, .. }) => {
            let _guard = locks.lock(collection).await;
            let removed = cache.delete(collection, id).await?;
            debug!("Removed {collection} entry '{id}' from the cache: {removed}");
        }
        (Method::Post, _) => {
            debug!("Creates are not mirrored, {request}");
        }
        _ => {}
    }
    Ok(())
}
