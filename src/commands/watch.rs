use crate::api::Mode;
use crate::commands::sync::describe;
use crate::commands::{client, oracle, Oracle, Out};
use crate::error::{ErrorType, IntoResult};
use crate::sync::{PassOutcome, SyncClient};
use crate::{Config, Result};
use std::future::Future;
use tokio::sync::{mpsc, watch as channel};
use tracing::{debug, info, warn};

/// Runs until interrupted, replaying pending records each time the server becomes reachable
/// again or a background sync is requested.
///
/// In `Mode::Test` there is no network to watch, so a single pass is run.
pub async fn watch(config: Config, mode: Mode) -> Result<Out<usize>> {
    let oracle = oracle(&config, mode).await?;
    let client = client(&config, mode, &oracle)?;

    let passes = match &oracle {
        Oracle::Live(live) => {
            live.start_monitor(config.api_url(), config.probe_interval())
                .pub_result(ErrorType::Config)?;
            let (_unused, empty) = mpsc::unbounded_channel();
            let registrations = live.take_registrations().unwrap_or(empty);
            info!(
                "Watching {} every {}s, press Ctrl-C to stop",
                config.api_url(),
                config.probe_interval().as_secs()
            );
            reconcile_loop(&client, live.subscribe(), registrations, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Unable to listen for Ctrl-C: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await
        }
        Oracle::Fixed(_) => usize::from(run_pass(&client).await),
    };

    Ok(Out::new(format!("Stopped after {passes} sync passes"), passes))
}

/// Runs a pass at startup if online, then one on every offline-to-online transition and one
/// for every registration received while online. Returns the number of completed passes once
/// `shutdown` resolves or the reachability sender goes away.
pub(crate) async fn reconcile_loop<F>(
    client: &SyncClient,
    mut online: channel::Receiver<bool>,
    mut registrations: mpsc::UnboundedReceiver<String>,
    shutdown: F,
) -> usize
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut passes = 0;
    let mut was_online = *online.borrow_and_update();
    if was_online && run_pass(client).await {
        passes += 1;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = online.changed() => {
                if changed.is_err() {
                    debug!("The reachability monitor stopped");
                    break;
                }
                let now = *online.borrow_and_update();
                if now && !was_online {
                    info!("The server is reachable again");
                    if run_pass(client).await {
                        passes += 1;
                    }
                } else if !now && was_online {
                    info!("The server is unreachable, changes will be kept locally");
                }
                was_online = now;
            }
            Some(tag) = registrations.recv() => {
                debug!("Background sync requested: {tag}");
                if client.is_online() && run_pass(client).await {
                    passes += 1;
                }
            }
        }
    }
    passes
}

/// Returns true when the pass ran to completion.
async fn run_pass(client: &SyncClient) -> bool {
    match client.sync_pending_data().await {
        Ok(report) => {
            info!("{}", describe(&report));
            report.outcome == PassOutcome::Completed
        }
        Err(e) => {
            warn!("Sync failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestServer;
    use crate::connectivity::{FixedOracle, SYNC_TAG};
    use crate::model::{Collection, SyncStatus};
    use crate::test::TestEnv;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_for_drain(env: &TestEnv) {
        for _ in 0..200 {
            if env.count(Collection::Expenses, SyncStatus::Pending).await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pending expenses were never replayed");
    }

    #[tokio::test]
    async fn test_reconciles_when_back_online() {
        let env = TestEnv::new().await;
        env.add_pending(
            Collection::Expenses,
            json!({"_id": "pending_1", "categoryId": "c1", "amount": 5, "reason": "Bus"}),
        )
        .await;
        let server = Arc::new(TestServer::seeded());
        let oracle = Arc::new(FixedOracle::offline());
        let client = env.client(server.clone(), oracle.clone());

        let (online_tx, online_rx) = channel::channel(false);
        let (_reg_tx, reg_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let driver = async {
            // Nothing is sent while offline.
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(server.requests().is_empty());

            oracle.set_online(true);
            online_tx.send(true).unwrap();
            wait_for_drain(&env).await;
            stop_tx.send(()).unwrap();
        };
        let looped = reconcile_loop(&client, online_rx, reg_rx, async {
            let _ = stop_rx.await;
        });

        let (passes, ()) = tokio::join!(looped, driver);
        assert_eq!(passes, 1);
        assert_eq!(server.records(Collection::Expenses).len(), 5);
    }

    #[tokio::test]
    async fn test_registration_triggers_pass() {
        let env = TestEnv::new().await;
        let server = Arc::new(TestServer::seeded());
        let oracle = Arc::new(FixedOracle::online());
        let client = env.client(server.clone(), oracle.clone());

        // The monitor has not reported yet, so only the registration can start a pass.
        let (_online_tx, online_rx) = channel::channel(false);
        let (reg_tx, reg_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let driver = async {
            env.add_pending(
                Collection::Expenses,
                json!({"_id": "pending_1", "categoryId": "c2", "amount": 9, "reason": "Taxi"}),
            )
            .await;
            reg_tx.send(SYNC_TAG.to_string()).unwrap();
            wait_for_drain(&env).await;
            stop_tx.send(()).unwrap();
        };
        let looped = reconcile_loop(&client, online_rx, reg_rx, async {
            let _ = stop_rx.await;
        });

        let (passes, ()) = tokio::join!(looped, driver);
        assert_eq!(passes, 1);
        assert_eq!(
            env.cached_ids(Collection::Expenses).await,
            vec!["e5".to_string()]
        );
    }

    #[tokio::test]
    async fn test_watch_in_test_mode_runs_once() {
        let env = TestEnv::new().await;
        let out = watch(env.config(), Mode::Test).await.unwrap();
        assert_eq!(out.structure(), Some(&1));
    }
}
