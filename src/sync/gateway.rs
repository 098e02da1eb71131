//! The Sync Gateway: the one path every server call takes.

use crate::api::{Request, Response, Transport};
use crate::cache::CacheStore;
use crate::connectivity::Connectivity;
use crate::error::{Error, ErrorType};
use crate::sync::fallback::handle_offline_request;
use crate::sync::locks::CollectionLocks;
use crate::sync::mirror::mirror;
use crate::sync::reconcile::Reconciler;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Gateway {
    cache: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    oracle: Arc<dyn Connectivity>,
    locks: Arc<CollectionLocks>,
    reconciler: Arc<Reconciler>,
    /// Set whenever a request is served offline; cleared by the next successful online write,
    /// which then runs a reconciliation pass. Starts set because a new client cannot tell how the
    /// previous session ended.
    offline_since_last_write: AtomicBool,
}

impl Gateway {
    pub(crate) fn new(
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        oracle: Arc<dyn Connectivity>,
        locks: Arc<CollectionLocks>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            cache,
            transport,
            oracle,
            locks,
            reconciler,
            offline_since_last_write: AtomicBool::new(true),
        }
    }

    /// Sends `request` to the server and mirrors the answer into the cache.
    ///
    /// - 2xx: the parsed body, `None` for 204 No Content.
    /// - Other statuses: an `ErrorType::Server` error with the server's message.
    /// - Offline, or no answer at all: whatever the Offline Fallback makes of the request.
    /// - An answer that cannot be read: an `ErrorType::Transport` error.
    pub async fn request(&self, request: &Request) -> crate::Result<Option<Value>> {
        if !self.oracle.is_online() {
            debug!("Offline, {request} goes to the offline fallback");
            return self.fallback(request).await;
        }

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) if self.oracle.is_connectivity_failure(&e) => {
                info!("{request} could not reach the server: {e}");
                self.oracle.observe(false);
                return self.fallback(request).await;
            }
            Err(e) => return Err(Error::new(ErrorType::Transport, e)),
        };
        self.oracle.observe(true);
        self.on_response(request, response).await
    }

    async fn fallback(&self, request: &Request) -> crate::Result<Option<Value>> {
        self.offline_since_last_write.store(true, Ordering::SeqCst);
        handle_offline_request(&*self.cache, &*self.oracle, &self.locks, request).await
    }

    async fn on_response(
        &self,
        request: &Request,
        response: Response,
    ) -> crate::Result<Option<Value>> {
        if !response.is_success() {
            debug!("{request} was rejected with {}", response.status);
            return Err(Error::server(response.status, response.error_message()));
        }
        let body = if response.status == 204 {
            None
        } else {
            response.body
        };

        // The server has the change either way; a stale cache heals on the next list read.
        if let Err(e) = mirror(&*self.cache, &self.locks, request, body.as_ref()).await {
            warn!("Unable to mirror {request} into the cache: {e:#}");
        }

        if !request.method().is_read() && self.offline_since_last_write.swap(false, Ordering::SeqCst)
        {
            match self.reconciler.run().await {
                Ok(report) if !report.is_noop() => info!(
                    "Synced {} pending entries after reconnecting",
                    report.synced.len()
                ),
                Ok(_) => {}
                Err(e) => warn!("Reconciliation after reconnecting failed: {e}"),
            }
        }
        Ok(body)
    }
}
