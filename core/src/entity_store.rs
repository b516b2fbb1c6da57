//! Entity store trait and related types.
//!
//! An entity store keeps versioned JSON documents and applies writes in
//! atomic batches. Every write in a batch carries a [`Precondition`] on the
//! document it touches; if any precondition fails, nothing in the batch is
//! applied. This is what lets two records (a plot and its booking) move in
//! lockstep without a lost update.
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `plotmarket-postgres`): one database transaction per batch
//! - `InMemoryEntityStore` (in `plotmarket-testing`): `BTreeMap` behind an async lock
//!
//! # Example
//!
//! ```no_run
//! use plotmarket_core::document::{Collection, DocumentKey, Version};
//! use plotmarket_core::entity_store::{EntityStore, EntityStoreError, Write, WriteBatch};
//! use serde_json::json;
//!
//! async fn example<S: EntityStore>(store: &S) -> Result<(), EntityStoreError> {
//!     let plot = DocumentKey::new(Collection::new("plots"), "p-1");
//!     let booking = DocumentKey::new(Collection::new("bookings"), "b-1");
//!
//!     // Both writes commit together, or neither does.
//!     let batch = WriteBatch::new()
//!         .with(Write::update(plot, Version::new(3), json!({"status": "booked"})))
//!         .with(Write::insert(booking, json!({"status": "pending"})));
//!     let versions = store.commit(batch).await?;
//!     assert_eq!(versions.len(), 2);
//!     Ok(())
//! }
//! ```

use crate::document::{Collection, Document, DocumentKey, Version};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EntityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EntityStoreError>> + Send + 'a>>;

/// What must be true about a document for a write to it to apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not exist yet (insert).
    Absent,
    /// The document must currently be at exactly this version (update).
    AtVersion(Version),
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::AtVersion(version) => write!(f, "version {version}"),
        }
    }
}

/// A single guarded write.
#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    /// Document to write
    pub key: DocumentKey,
    /// Condition the stored document must satisfy
    pub precondition: Precondition,
    /// New body
    pub body: serde_json::Value,
}

impl Write {
    /// Insert a new document; fails if the key already exists.
    #[must_use]
    pub const fn insert(key: DocumentKey, body: serde_json::Value) -> Self {
        Self {
            key,
            precondition: Precondition::Absent,
            body,
        }
    }

    /// Replace a document that must still be at `expected`.
    #[must_use]
    pub const fn update(key: DocumentKey, expected: Version, body: serde_json::Value) -> Self {
        Self {
            key,
            precondition: Precondition::AtVersion(expected),
            body,
        }
    }

    /// The version the document will have once this write applies.
    #[must_use]
    pub const fn resulting_version(&self) -> Version {
        match self.precondition {
            Precondition::Absent => Version::FIRST,
            Precondition::AtVersion(version) => version.next(),
        }
    }
}

/// An ordered set of writes applied atomically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { writes: Vec::new() }
    }

    /// Append a write (builder style).
    #[must_use]
    pub fn with(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// Append a write.
    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    /// Number of writes in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the batch has no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Iterate over the writes in order.
    pub fn iter(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter()
    }

    /// Consume the batch, yielding its writes in order.
    #[must_use]
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    /// Check the batch is well formed: no key may be written twice.
    ///
    /// # Errors
    ///
    /// Returns [`EntityStoreError::InvalidBatch`] naming the repeated key.
    pub fn validate(&self) -> Result<(), EntityStoreError> {
        let mut seen = HashSet::with_capacity(self.writes.len());
        for write in &self.writes {
            if !seen.insert(&write.key) {
                return Err(EntityStoreError::InvalidBatch(format!(
                    "document {} written more than once",
                    write.key
                )));
            }
        }
        Ok(())
    }
}

/// Errors that can occur during entity store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityStoreError {
    /// A write's precondition did not hold: another writer got there first.
    #[error("Concurrency conflict on {key}: expected {expected}, found {}", display_actual(.actual))]
    ConcurrencyConflict {
        /// The document whose precondition failed.
        key: DocumentKey,
        /// What the writer expected.
        expected: Precondition,
        /// The stored version at the time of the check (`None` if absent).
        actual: Option<Version>,
    },

    /// A uniqueness or integrity constraint of the backend rejected the batch.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The batch itself was malformed.
    #[error("Invalid write batch: {0}")]
    InvalidBatch(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn display_actual(actual: &Option<Version>) -> String {
    actual.map_or_else(|| "absent".to_string(), |version| format!("version {version}"))
}

impl EntityStoreError {
    /// Whether this error means the caller lost a race and may retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::ConstraintViolation(_)
        )
    }
}

/// Entity store abstraction: versioned documents with atomic write batches.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across request tasks.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can
/// be used as `Arc<dyn EntityStore>`.
pub trait EntityStore: Send + Sync {
    /// Load a document by key.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: Backend unavailable or query failed
    fn get(&self, key: DocumentKey) -> StoreFuture<'_, Option<Document>>;

    /// Load every document of a collection, ordered by id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: Backend unavailable or query failed
    fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Document>>;

    /// Apply a batch of guarded writes atomically.
    ///
    /// Either every write applies and the new versions are returned in batch
    /// order, or none applies. An empty batch is a no-op returning no versions.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: a precondition failed (nothing was applied)
    /// - `ConstraintViolation`: a backend constraint rejected the batch
    /// - `InvalidBatch`: the same key appears twice
    /// - `DatabaseError`: backend unavailable; nothing was applied
    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, Vec<Version>>;
}
