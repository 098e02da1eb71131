//! The Connectivity Oracle: whether the server is reachable right now, which request failures
//! mean "offline", and a best-effort hook for scheduling a reconciliation once the network
//! returns.

use crate::api::{TransportError, TransportErrorKind};
use crate::error::Res;
use anyhow::{bail, Context};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use url::Url;

/// The tag under which pending writes ask for a background reconciliation.
pub const SYNC_TAG: &str = "sync-expenses";

/// True when `error` means the request never got an answer, as opposed to a malformed answer.
pub fn is_connectivity_failure(error: &TransportError) -> bool {
    matches!(
        error.kind(),
        TransportErrorKind::Connect | TransportErrorKind::Timeout | TransportErrorKind::Interrupted
    )
}

/// Reports network reachability to the synchronization components.
#[async_trait::async_trait]
pub trait Connectivity: Send + Sync {
    /// The current reachability signal.
    fn is_online(&self) -> bool;

    /// Classifies a failed request. See `is_connectivity_failure`.
    fn is_connectivity_failure(&self, error: &TransportError) -> bool {
        is_connectivity_failure(error)
    }

    /// Tells the oracle what a real request just found out about the network.
    fn observe(&self, _reachable: bool) {}

    /// Asks for a reconciliation pass under `tag` once connectivity returns. Best effort: callers
    /// log and ignore the error.
    async fn register_background_sync(&self, tag: &str) -> Res<()>;
}

/// The oracle used by the program: a periodic TCP probe of the server's host and port feeds a
/// `watch` channel, and background registrations are queued on an `mpsc` channel for whoever
/// runs the reconciliation loop (see `mezgeb watch`).
pub struct LiveOracle {
    sender: watch::Sender<bool>,
    online: watch::Receiver<bool>,
    registrations: mpsc::UnboundedSender<String>,
    queued: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl LiveOracle {
    /// Creates an oracle for the server at `api_url`, probing it once before returning.
    pub async fn new(api_url: &str, probe_timeout: Duration) -> Res<Self> {
        let target = probe_target(api_url)?;
        let initial = probe(&target, probe_timeout).await;
        debug!("Initial probe of {target}: online = {initial}");
        let (sender, online) = watch::channel(initial);
        let (registrations, queued) = mpsc::unbounded_channel();
        Ok(Self {
            sender,
            online,
            registrations,
            queued: Mutex::new(Some(queued)),
            monitor: Mutex::new(None),
        })
    }

    /// Starts re-probing the server every `interval` in a background task. Calling it again
    /// replaces the previous monitor.
    pub fn start_monitor(&self, api_url: &str, interval: Duration) -> Res<()> {
        let target = probe_target(api_url)?;
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = probe(&target, interval).await;
                trace!("Probe of {target}: online = {reachable}");
                sender.send_if_modified(|online| {
                    let changed = *online != reachable;
                    *online = reachable;
                    changed
                });
            }
        });
        let mut monitor = match self.monitor.lock() {
            Ok(m) => m,
            Err(_) => bail!("The connectivity monitor handle is poisoned"),
        };
        if let Some(previous) = monitor.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// A receiver that changes whenever reachability flips.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.clone()
    }

    /// Takes the queue of background-sync registrations. Only the first caller gets it.
    pub fn take_registrations(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.queued.lock().ok().and_then(|mut q| q.take())
    }
}

impl Drop for LiveOracle {
    fn drop(&mut self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(handle) = monitor.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait::async_trait]
impl Connectivity for LiveOracle {
    fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    fn observe(&self, reachable: bool) {
        let changed = self.sender.send_if_modified(|online| {
            let changed = *online != reachable;
            *online = reachable;
            changed
        });
        if changed {
            info!(
                "The server is now {}",
                if reachable { "reachable" } else { "unreachable" }
            );
        }
    }

    async fn register_background_sync(&self, tag: &str) -> Res<()> {
        self.registrations
            .send(tag.to_string())
            .context("No reconciliation loop is listening for background sync registrations")
    }
}

/// The `host:port` to probe for the server at `api_url`.
fn probe_target(api_url: &str) -> Res<String> {
    let url = Url::parse(api_url).with_context(|| format!("Invalid API URL '{api_url}'"))?;
    let host = url
        .host_str()
        .with_context(|| format!("The API URL '{api_url}' has no host"))?;
    let port = url
        .port_or_known_default()
        .with_context(|| format!("The API URL '{api_url}' has no port"))?;
    Ok(format!("{host}:{port}"))
}

async fn probe(target: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}

/// An oracle whose answer is set by hand. Used by tests and by `Mode::Test`.
#[derive(Debug)]
pub struct FixedOracle {
    online: AtomicBool,
    fail_registration: AtomicBool,
    registered: Mutex<Vec<String>>,
}

impl FixedOracle {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            fail_registration: AtomicBool::new(false),
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes `register_background_sync` fail from now on.
    pub fn fail_registration(&self, fail: bool) {
        self.fail_registration.store(fail, Ordering::SeqCst);
    }

    /// Tags registered so far, oldest first.
    pub fn registered(&self) -> Vec<String> {
        self.registered
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Connectivity for FixedOracle {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn register_background_sync(&self, tag: &str) -> Res<()> {
        if self.fail_registration.load(Ordering::SeqCst) {
            bail!("Background sync is not supported here");
        }
        match self.registered.lock() {
            Ok(mut registered) => registered.push(tag.to_string()),
            Err(_) => bail!("The background sync registry is poisoned"),
        }
        Ok(())
    }
}
