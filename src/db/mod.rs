//! This module is responsible for reading, writing and managing the SQLite cache database.

mod migrations;

use crate::cache::{CacheStore, Document};
use crate::error::Res;
use crate::model::{Collection, SyncStatus};
use anyhow::{bail, Context};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// The SQLite implementation of `CacheStore`.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Initializes the schema
    pub async fn init(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A cache database already exists at '{}'", path.display());
        }
        let db = Self::connect(path, true).await?;
        migrations::bootstrap(&db.pool).await?;
        migrations::run(&db.pool, 0, migrations::SCHEMA_VERSION).await?;
        Ok(db)
    }

    /// - Validates that there is a SQLite file at `path`
    /// - Updates the schema with migrations if it is out-of-date
    pub async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The cache database is missing '{}'", path.display());
        }
        let db = Self::connect(path, false).await?;
        migrations::bootstrap(&db.pool).await?;
        let version = migrations::current_version(&db.pool).await?;
        if version > migrations::SCHEMA_VERSION {
            bail!(
                "The cache database schema version {version} is newer than this program \
                supports ({})",
                migrations::SCHEMA_VERSION
            );
        }
        migrations::run(&db.pool, version, migrations::SCHEMA_VERSION).await?;
        Ok(db)
    }

    async fn connect(path: &Path, create: bool) -> Res<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .context("Failed to parse SQLite connection string")?
            .create_if_missing(create);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Unable to open the cache database '{}'", path.display()))?;
        debug!("Opened cache database {}", path.display());
        Ok(Self { pool })
    }
}

type Row = (String, String, String);

fn to_document(row: Row) -> Res<Document> {
    let (id, status, document) = row;
    let status = SyncStatus::from_str(&status)
        .with_context(|| format!("Invalid status '{status}' for cached entry '{id}'"))?;
    let body = serde_json::from_str(&document)
        .with_context(|| format!("Invalid JSON for cached entry '{id}'"))?;
    Document::new(status, body)
}

fn to_documents(rows: Vec<Row>) -> Res<Vec<Document>> {
    rows.into_iter().map(to_document).collect()
}

async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    collection: Collection,
    document: &Document,
) -> Res<()> {
    let sql = format!(
        "INSERT INTO {} (id, status, document) VALUES (?, ?, ?)",
        collection.table()
    );
    sqlx::query(&sql)
        .bind(document.id())
        .bind(document.status().to_string())
        .bind(document.body().to_string())
        .execute(&mut **tx)
        .await
        .with_context(|| {
            format!(
                "Unable to add entry '{}' to the {collection} cache",
                document.id()
            )
        })?;
    Ok(())
}

#[async_trait::async_trait]
impl CacheStore for Db {
    async fn list(&self, collection: Collection) -> anyhow::Result<Vec<Document>> {
        let sql = format!(
            "SELECT id, status, document FROM {} ORDER BY seq",
            collection.table()
        );
        let rows: Vec<Row> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Unable to read the {collection} cache"))?;
        to_documents(rows)
    }

    async fn list_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<Vec<Document>> {
        let sql = format!(
            "SELECT id, status, document FROM {} WHERE status = ? ORDER BY seq",
            collection.table()
        );
        let rows: Vec<Row> = sqlx::query_as(&sql)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Unable to read {status} entries of the {collection} cache"))?;
        to_documents(rows)
    }

    async fn get(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Document>> {
        let sql = format!(
            "SELECT id, status, document FROM {} WHERE id = ?",
            collection.table()
        );
        let row: Option<Row> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Unable to read entry '{id}' of the {collection} cache"))?;
        row.map(to_document).transpose()
    }

    async fn add(&self, collection: Collection, document: &Document) -> anyhow::Result<()> {
        self.bulk_add(collection, std::slice::from_ref(document))
            .await
    }

    async fn bulk_add(&self, collection: Collection, documents: &[Document]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for document in documents {
            insert(&mut tx, collection, document).await?;
        }
        tx.commit().await.context("Failed to commit transaction")
    }

    async fn put(&self, collection: Collection, document: &Document) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, status, document) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, document = excluded.document",
            collection.table()
        );
        sqlx::query(&sql)
            .bind(document.id())
            .bind(document.status().to_string())
            .bind(document.body().to_string())
            .execute(&self.pool)
            .await
            .with_context(|| {
                format!(
                    "Unable to write entry '{}' to the {collection} cache",
                    document.id()
                )
            })?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> anyhow::Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to delete entry '{id}' of the {collection} cache"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<u64> {
        let sql = format!("DELETE FROM {} WHERE status = ?", collection.table());
        let result = sqlx::query(&sql)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to delete {status} entries of the {collection} cache"))?;
        Ok(result.rows_affected())
    }

    async fn clear(&self, collection: Collection) -> anyhow::Result<()> {
        let sql = format!("DELETE FROM {}", collection.table());
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to clear the {collection} cache"))?;
        Ok(())
    }

    /// Runs the delete and the inserts in one transaction so a failed refresh leaves the previous
    /// mirror in place.
    async fn replace_synced(
        &self,
        collection: Collection,
        documents: &[Document],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let sql = format!("DELETE FROM {} WHERE status = ?", collection.table());
        sqlx::query(&sql)
            .bind(SyncStatus::Synced.to_string())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Unable to drop synced entries of the {collection} cache"))?;
        for document in documents {
            insert(&mut tx, collection, document).await?;
        }
        tx.commit().await.context("Failed to commit transaction")
    }

    async fn count_by_status(
        &self,
        collection: Collection,
        status: SyncStatus,
    ) -> anyhow::Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE status = ?", collection.table());
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Unable to count {status} entries of the {collection} cache"))?;
        Ok(count as u64)
    }
}
