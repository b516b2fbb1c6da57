//! `PostgreSQL` entity store implementation for the plot marketplace.
//!
//! This crate provides [`PostgresEntityStore`], which implements the
//! `EntityStore` trait from `plotmarket-core` on a single `documents` table:
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version BIGINT NOT NULL,
//!     body JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (collection, id)
//! );
//! ```
//!
//! Each write batch runs in one transaction. Inserts are guarded with
//! `ON CONFLICT DO NOTHING` and updates with `WHERE version = $expected`; a
//! write that affects no row aborts the transaction, so a batch never applies
//! partially. Dropping an uncommitted `sqlx` transaction rolls it back, which
//! also covers timeouts and cancelled requests.
//!
//! # Example
//!
//! ```ignore
//! use plotmarket_postgres::PostgresEntityStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresEntityStore::new("postgres://localhost/plotmarket").await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use plotmarket_core::document::{Collection, Document, DocumentKey, Version};
use plotmarket_core::entity_store::{
    EntityStore, EntityStoreError, Precondition, StoreFuture, Write, WriteBatch,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;

/// `SQLSTATE` for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Connection pool settings for [`PostgresEntityStore::connect`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Minimum number of idle connections kept open
    pub min_connections: u32,
    /// How long to wait for a connection before failing
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// `PostgreSQL`-backed [`EntityStore`].
#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::DatabaseError`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, EntityStoreError> {
        Self::connect(database_url, &PoolSettings::default()).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::DatabaseError`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        settings: &PoolSettings,
    ) -> Result<Self, EntityStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(database_error)?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL entity store"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool (e.g. one used to run migrations).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_version(
        tx: &mut Transaction<'_, Postgres>,
        key: &DocumentKey,
    ) -> Result<Option<Version>, EntityStoreError> {
        let row = sqlx::query("SELECT version FROM documents WHERE collection = $1 AND id = $2")
            .bind(key.collection().as_str())
            .bind(key.id())
            .fetch_optional(&mut **tx)
            .await
            .map_err(database_error)?;

        row.map(|row| row.try_get::<i64, _>("version").map(version_from_db))
            .transpose()
            .map_err(database_error)
    }

    async fn apply_write(
        tx: &mut Transaction<'_, Postgres>,
        write: &Write,
    ) -> Result<Version, EntityStoreError> {
        let new_version = write.resulting_version();
        let result = match write.precondition {
            Precondition::Absent => {
                sqlx::query(
                    r"
                    INSERT INTO documents (collection, id, version, body)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (collection, id) DO NOTHING
                    ",
                )
                .bind(write.key.collection().as_str())
                .bind(write.key.id())
                .bind(version_to_db(new_version)?)
                .bind(&write.body)
                .execute(&mut **tx)
                .await
            }
            Precondition::AtVersion(expected) => {
                sqlx::query(
                    r"
                    UPDATE documents
                    SET body = $4, version = $3, updated_at = now()
                    WHERE collection = $1 AND id = $2 AND version = $5
                    ",
                )
                .bind(write.key.collection().as_str())
                .bind(write.key.id())
                .bind(version_to_db(new_version)?)
                .bind(&write.body)
                .bind(version_to_db(expected)?)
                .execute(&mut **tx)
                .await
            }
        }
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            let actual = Self::fetch_version(tx, &write.key).await?;
            return Err(EntityStoreError::ConcurrencyConflict {
                key: write.key.clone(),
                expected: write.precondition,
                actual,
            });
        }

        Ok(new_version)
    }
}

impl EntityStore for PostgresEntityStore {
    fn get(&self, key: DocumentKey) -> StoreFuture<'_, Option<Document>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT version, body FROM documents WHERE collection = $1 AND id = $2",
            )
            .bind(key.collection().as_str())
            .bind(key.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;

            row.map(|row| {
                Ok(Document {
                    version: version_from_db(row.try_get("version").map_err(database_error)?),
                    body: row.try_get("body").map_err(database_error)?,
                    key: key.clone(),
                })
            })
            .transpose()
        })
    }

    fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Document>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, version, body FROM documents WHERE collection = $1 ORDER BY id",
            )
            .bind(collection.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

            rows.into_iter()
                .map(|row| {
                    let id: String = row.try_get("id").map_err(database_error)?;
                    Ok(Document {
                        key: DocumentKey::new(collection.clone(), id),
                        version: version_from_db(row.try_get("version").map_err(database_error)?),
                        body: row.try_get("body").map_err(database_error)?,
                    })
                })
                .collect()
        })
    }

    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, Vec<Version>> {
        Box::pin(async move {
            batch.validate()?;
            if batch.is_empty() {
                return Ok(Vec::new());
            }

            let mut tx = self.pool.begin().await.map_err(database_error)?;

            let mut versions = Vec::with_capacity(batch.len());
            for write in batch.iter() {
                let outcome = Self::apply_write(&mut tx, write).await;
                match outcome {
                    Ok(version) => versions.push(version),
                    Err(error) => {
                        // Rollback failure is secondary; the original error is what the caller needs.
                        if let Err(rollback) = tx.rollback().await {
                            tracing::warn!(error = %rollback, "Rollback after failed write batch failed");
                        }
                        return Err(error);
                    }
                }
            }

            tx.commit().await.map_err(write_error)?;

            tracing::debug!(writes = versions.len(), "Write batch committed");
            metrics::counter!("entity_store.batches.committed").increment(1);

            Ok(versions)
        })
    }
}

#[allow(clippy::cast_sign_loss)] // versions are written by this crate and never negative
const fn version_from_db(raw: i64) -> Version {
    Version::new(raw as u64)
}

fn version_to_db(version: Version) -> Result<i64, EntityStoreError> {
    i64::try_from(version.value())
        .map_err(|_| EntityStoreError::DatabaseError(format!("version {version} out of range")))
}

fn database_error(error: sqlx::Error) -> EntityStoreError {
    EntityStoreError::DatabaseError(error.to_string())
}

/// Like [`database_error`], but unique violations become constraint violations.
fn write_error(error: sqlx::Error) -> EntityStoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return EntityStoreError::ConstraintViolation(db_error.message().to_string());
        }
    }
    database_error(error)
}
