//! In-memory entity store for fast, deterministic tests and local development.
//!
//! All documents live in one map behind a `tokio::sync::RwLock`. A batch is
//! validated and applied while the write lock is held, so no reader ever
//! observes half of a batch and two competing batches are totally ordered.

use plotmarket_core::document::{Collection, Document, DocumentKey, Version};
use plotmarket_core::entity_store::{
    EntityStore, EntityStoreError, Precondition, StoreFuture, WriteBatch,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory [`EntityStore`].
///
/// Cloning is cheap and clones share the same documents.
///
/// # Fault injection
///
/// [`fail_next_commits`](Self::fail_next_commits) makes the following commits
/// fail with [`EntityStoreError::DatabaseError`] before anything is applied,
/// which lets tests check that a failed transition leaves no partial state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    documents: Arc<RwLock<BTreeMap<DocumentKey, Document>>>,
    failing_commits: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail without applying anything.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Number of batches successfully applied so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of stored documents across all collections.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get(&self, key: DocumentKey) -> StoreFuture<'_, Option<Document>> {
        Box::pin(async move { Ok(self.documents.read().await.get(&key).cloned()) })
    }

    fn list(&self, collection: Collection) -> StoreFuture<'_, Vec<Document>> {
        Box::pin(async move {
            let documents = self.documents.read().await;
            Ok(documents
                .values()
                .filter(|document| document.key.collection() == &collection)
                .cloned()
                .collect())
        })
    }

    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, Vec<Version>> {
        Box::pin(async move {
            batch.validate()?;
            if batch.is_empty() {
                return Ok(Vec::new());
            }

            let mut documents = self.documents.write().await;

            if self.take_injected_failure() {
                return Err(EntityStoreError::DatabaseError(
                    "injected commit failure".to_string(),
                ));
            }

            // Check every precondition before touching anything.
            for write in batch.iter() {
                let actual = documents.get(&write.key).map(|document| document.version);
                let holds = match write.precondition {
                    Precondition::Absent => actual.is_none(),
                    Precondition::AtVersion(expected) => actual == Some(expected),
                };
                if !holds {
                    return Err(EntityStoreError::ConcurrencyConflict {
                        key: write.key.clone(),
                        expected: write.precondition,
                        actual,
                    });
                }
            }

            let mut versions = Vec::with_capacity(batch.len());
            for write in batch.into_writes() {
                let version = write.resulting_version();
                documents.insert(
                    write.key.clone(),
                    Document {
                        key: write.key,
                        version,
                        body: write.body,
                    },
                );
                versions.push(version);
            }

            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(versions)
        })
    }
}
