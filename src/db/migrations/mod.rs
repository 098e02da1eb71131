//! Versioned schema of the cache database.
//!
//! Each migration is a pair of SQL files in this directory:
//! - `migration_NN_up.sql` takes the schema from version `NN-1` to `NN`
//! - `migration_NN_down.sql` takes the schema from version `NN` back to `NN-1`
//!
//! The current version is the single row of the `schema_version` table.

use crate::error::Res;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// The schema version this build of the crate expects.
pub(crate) const SCHEMA_VERSION: i32 = 1;

struct Migration {
    version: i32,
    up_sql: &'static str,
    down_sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up_sql: include_str!("migration_01_up.sql"),
    down_sql: include_str!("migration_01_down.sql"),
}];

/// Creates the `schema_version` table at version 0 unless it already exists.
pub(crate) async fn bootstrap(pool: &SqlitePool) -> Res<()> {
    pool.execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .await
        .context("Failed to create schema_version table")?;
    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to read schema_version")?;
    if rows == 0 {
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(pool)
            .await
            .context("Failed to insert initial schema version")?;
    }
    Ok(())
}

/// Reads the schema version recorded in the database.
pub(crate) async fn current_version(pool: &SqlitePool) -> Res<i32> {
    let (version,): (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to query schema version")?;
    Ok(version)
}

/// Moves the schema from version `from` to version `to`, up or down, one migration at a time.
/// Every required migration is checked for before the first one runs.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Res<()> {
    if from == to {
        debug!("Cache schema already at version {to}");
        return Ok(());
    }
    validate(from, to)?;

    if from < to {
        for version in (from + 1)..=to {
            debug!("Applying cache migration {version:02} (up)");
            apply(pool, find(version)?.up_sql, version).await?;
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            debug!("Applying cache migration {version:02} (down)");
            apply(pool, find(version)?.down_sql, version - 1).await?;
        }
    }

    debug!("Cache schema now at version {to}");
    Ok(())
}

fn find(version: i32) -> Res<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version} not found"))
}

/// Runs one migration's SQL and records `new_version`, in a single transaction.
async fn apply(pool: &SqlitePool, sql: &str, new_version: i32) -> Res<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;

    tx.execute(sql)
        .await
        .context("Failed to execute migration SQL")?;

    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;

    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}

fn validate(from: i32, to: i32) -> Res<()> {
    let (low, high) = if from < to { (from + 1, to) } else { (to + 1, from) };
    for version in low..=high {
        if !MIGRATIONS.iter().any(|m| m.version == version) {
            bail!("Migration {version} is missing but required to migrate from {from} to {to}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn create_test_db() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        bootstrap(&pool).await.unwrap();
        (temp_dir, pool)
    }

    async fn table_exists(pool: &SqlitePool, table_name: &str) -> bool {
        let (count,): (i32,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table_name)
                .fetch_one(pool)
                .await
                .unwrap();
        count > 0
    }

    #[tokio::test]
    async fn test_bootstrap_is_repeatable() {
        let (_temp_dir, pool) = create_test_db().await;
        bootstrap(&pool).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (_temp_dir, pool) = create_test_db().await;

        run(&pool, 0, SCHEMA_VERSION).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 1);
        assert!(table_exists(&pool, "expenses").await);
        assert!(table_exists(&pool, "categories").await);

        run(&pool, 1, 0).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 0);
        assert!(!table_exists(&pool, "expenses").await);
        assert!(!table_exists(&pool, "categories").await);
    }

    #[tokio::test]
    async fn test_no_op_at_target() {
        let (_temp_dir, pool) = create_test_db().await;
        run(&pool, 0, 1).await.unwrap();
        run(&pool, 1, 1).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(validate(0, 1).is_ok());
        assert!(validate(1, 0).is_ok());
        assert!(validate(0, 2).is_err());
        assert!(validate(3, 1).is_err());
    }
}
