//! The Reconciliation Engine: replays pending entries against the server.

use crate::api::{Endpoint, Request, Transport};
use crate::cache::{CacheStore, Document};
use crate::connectivity::Connectivity;
use crate::error::{Error, ErrorType, IntoResult};
use crate::model::{replay_payload, Collection, SyncStatus};
use crate::sync::locks::CollectionLocks;
use anyhow::anyhow;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How a reconciliation pass ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every pending entry was attempted.
    #[default]
    Completed,
    /// The server is unreachable, nothing was attempted.
    Offline,
    /// Another pass was in flight, nothing was attempted.
    AlreadyRunning,
}

serde_plain::derive_display_from_serialize!(PassOutcome);

/// A pending entry the server accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replayed {
    pub collection: Collection,
    pub pending_id: String,
    /// `None` when the server accepted the record but its answer held no usable record. The
    /// next list read brings it into the cache.
    pub server_id: Option<String>,
}

/// A pending entry that stays pending until the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retained {
    pub collection: Collection,
    pub pending_id: String,
    pub reason: String,
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub outcome: PassOutcome,
    pub synced: Vec<Replayed>,
    pub failed: Vec<Retained>,
}

impl SyncReport {
    fn skipped(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            ..Self::default()
        }
    }

    /// True when the pass sent nothing to the server.
    pub fn is_noop(&self) -> bool {
        self.synced.is_empty() && self.failed.is_empty()
    }
}

/// Drains pending entries, categories first and then expenses, each batch in insertion order.
///
/// Replays go straight to the `Transport` rather than through the gateway, so a replay that
/// fails for lack of network never turns into a second pending entry.
///
/// An expense that references a category by its pending identifier keeps that reference after
/// the category is replayed and receives its server identifier.
pub struct Reconciler {
    cache: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    oracle: Arc<dyn Connectivity>,
    locks: Arc<CollectionLocks>,
    entry_timeout: Duration,
    running: Mutex<()>,
}

impl Reconciler {
    pub(crate) fn new(
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        oracle: Arc<dyn Connectivity>,
        locks: Arc<CollectionLocks>,
        entry_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            transport,
            oracle,
            locks,
            entry_timeout,
            running: Mutex::new(()),
        }
    }

    /// Runs one pass. Returns right away when offline or when another pass holds the engine.
    /// Server rejections and network failures keep the entry pending and move on to the next
    /// one; only a failing cache aborts the pass.
    pub async fn run(&self) -> crate::Result<SyncReport> {
        let Ok(_running) = self.running.try_lock() else {
            debug!("A reconciliation pass is already running");
            return Ok(SyncReport::skipped(PassOutcome::AlreadyRunning));
        };
        if !self.oracle.is_online() {
            debug!("Offline, reconciliation deferred");
            return Ok(SyncReport::skipped(PassOutcome::Offline));
        }

        let mut report = SyncReport::default();
        for collection in Collection::RECONCILE_ORDER {
            let pending = self
                .cache
                .list_by_status(collection, SyncStatus::Pending)
                .await
                .pub_result(ErrorType::Cache)?;
            if pending.is_empty() {
                continue;
            }
            info!("Syncing {} pending {collection}", pending.len());
            for document in pending {
                self.replay(collection, document, &mut report).await?;
            }
        }

        if !report.is_noop() {
            info!(
                "Reconciliation finished: {} synced, {} still pending",
                report.synced.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }

    async fn replay(
        &self,
        collection: Collection,
        pending: Document,
        report: &mut SyncReport,
    ) -> crate::Result<()> {
        let pending_id = pending.id().to_string();
        let request = Request::post(
            Endpoint::collection(collection),
            replay_payload(pending.body()),
        );

        let synced = match self.submit(&request).await {
            Ok(synced) => synced,
            Err(reason) => {
                warn!("Failed to sync {collection} entry '{pending_id}': {reason}");
                report.failed.push(Retained {
                    collection,
                    pending_id,
                    reason,
                });
                return Ok(());
            }
        };

        // The server holds the record from here on, so the pending entry goes even when the
        // answer cannot be cached. Keeping it would create the record again on the next pass.
        let _guard = self.locks.lock(collection).await;
        self.cache
            .delete(collection, &pending_id)
            .await
            .pub_result(ErrorType::Cache)?;
        let server_id = match synced {
            Ok(synced) => {
                self.cache
                    .put(collection, &synced)
                    .await
                    .pub_result(ErrorType::Cache)?;
                debug!("{collection} entry '{pending_id}' is now '{}'", synced.id());
                Some(synced.id().to_string())
            }
            Err(e) => {
                error!(
                    "The server accepted {collection} entry '{pending_id}' but its answer \
                    cannot be cached: {e:#}"
                );
                None
            }
        };
        report.synced.push(Replayed {
            collection,
            pending_id,
            server_id,
        });
        Ok(())
    }

    /// Sends one create. `Err` explains why the server did not take the record. `Ok` holds the
    /// server's record as a synced document, or why its 2xx answer could not be read as one.
    async fn submit(&self, request: &Request) -> Result<anyhow::Result<Document>, String> {
        let response = match tokio::time::timeout(self.entry_timeout, self.transport.send(request))
            .await
        {
            Err(_) => return Err(format!("no answer within {:?}", self.entry_timeout)),
            Ok(Err(e)) => {
                if self.oracle.is_connectivity_failure(&e) {
                    self.oracle.observe(false);
                }
                return Err(e.to_string());
            }
            Ok(Ok(response)) => response,
        };
        if !response.is_success() {
            return Err(Error::server(response.status, response.error_message()).to_string());
        }
        Ok(match response.body {
            Some(body) => Document::new(SyncStatus::Synced, body),
            None => Err(anyhow!("the server returned no record")),
        })
    }
}
