use crate::api::Mode;
use crate::commands::{connect, Out};
use crate::sync::{PassOutcome, SyncReport, SyncState};
use crate::{Config, Result};
use std::fmt::Write;

/// Replays every pending category and expense against the server, categories first.
///
/// Entries the server rejects stay pending and are listed in the output. When the server cannot
/// be reached nothing is sent and the command still succeeds.
pub async fn sync(config: Config, mode: Mode) -> Result<Out<SyncReport>> {
    let client = connect(&config, mode).await?;
    let report = client.sync_pending_data().await?;
    Ok(Out::new(describe(&report), report))
}

/// Reports whether the server is reachable and how many records the cache holds.
pub async fn status(config: Config, mode: Mode) -> Result<Out<SyncState>> {
    let client = connect(&config, mode).await?;
    let state = client.status().await?;
    let message = format!(
        "The server at {} is {}. Cached: {} categories ({} pending), {} expenses ({} pending)",
        config.api_url(),
        if state.online { "reachable" } else { "unreachable" },
        state.cached_categories,
        state.pending_categories,
        state.cached_expenses,
        state.pending_expenses,
    );
    Ok(Out::new(message, state))
}

pub(super) fn describe(report: &SyncReport) -> String {
    match report.outcome {
        PassOutcome::Offline => return "The server is unreachable, nothing was synced".to_string(),
        PassOutcome::AlreadyRunning => return "A sync is already in progress".to_string(),
        PassOutcome::Completed => {}
    }
    if report.is_noop() {
        return "Nothing to sync".to_string();
    }
    let mut message = format!(
        "Synced {} pending records, {} remain pending",
        report.synced.len(),
        report.failed.len()
    );
    for r in &report.synced {
        let _ = write!(
            message,
            "\n  {} {} -> {}",
            r.collection,
            r.pending_id,
            r.server_id.as_deref().unwrap_or("(refreshed on the next list)")
        );
    }
    for r in &report.failed {
        let _ = write!(
            message,
            "\n  {} {} kept: {}",
            r.collection, r.pending_id, r.reason
        );
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Collection;
    use crate::test::TestEnv;
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_replays_pending_records() {
        let env = TestEnv::new().await;
        env.add_pending(
            Collection::Categories,
            json!({"_id": "pending_1", "name": "Gifts", "icon": "gift"}),
        )
        .await;
        env.add_pending(
            Collection::Expenses,
            json!({"_id": "pending_2", "categoryId": "c1", "amount": 50, "reason": "Coffee"}),
        )
        .await;

        let before = status(env.config(), Mode::Test).await.unwrap();
        let state = before.structure().unwrap();
        assert_eq!(state.pending_categories, 1);
        assert_eq!(state.pending_expenses, 1);
        assert!(state.online);

        let out = sync(env.config(), Mode::Test).await.unwrap();
        let report = out.structure().unwrap();
        assert_eq!(report.outcome, PassOutcome::Completed);
        let replayed: Vec<(Collection, &str)> = report
            .synced
            .iter()
            .map(|r| (r.collection, r.server_id.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(
            replayed,
            vec![(Collection::Categories, "c4"), (Collection::Expenses, "e5")]
        );
        assert!(out.message().starts_with("Synced 2 pending records, 0 remain pending"));

        let after = status(env.config(), Mode::Test).await.unwrap();
        let state = after.structure().unwrap();
        assert_eq!(state.pending_categories, 0);
        assert_eq!(state.pending_expenses, 0);
        assert_eq!(state.cached_expenses, 1);
        assert_eq!(env.cached_ids(Collection::Expenses).await, vec!["e5"]);
    }

    #[tokio::test]
    async fn test_sync_with_nothing_pending() {
        let env = TestEnv::new().await;
        let out = sync(env.config(), Mode::Test).await.unwrap();
        assert_eq!(out.message(), "Nothing to sync");
        assert!(out.structure().unwrap().is_noop());
    }

    #[test]
    fn test_describe_skipped_passes() {
        let report = SyncReport {
            outcome: PassOutcome::Offline,
            ..SyncReport::default()
        };
        assert_eq!(describe(&report), "The server is unreachable, nothing was synced");
    }
}
