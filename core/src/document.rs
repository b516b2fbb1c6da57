//! Document identification and versioning types.
//!
//! This module defines strong types for addressing stored records
//! (`Collection`, `DocumentKey`) and for optimistic concurrency (`Version`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `Collection` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid collection name: {0}")]
pub struct ParseCollectionError(String);

/// Name of a group of documents of the same kind (e.g. `"plots"`).
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty or non-identifier names)
/// - `new()`: No validation (for application-controlled constants)
///
/// # Examples
///
/// ```
/// use plotmarket_core::document::Collection;
///
/// let plots = Collection::new("plots");
/// assert_eq!(plots.as_str(), "plots");
///
/// assert!("".parse::<Collection>().is_err());
/// assert!("bad name".parse::<Collection>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Collection(String);

impl Collection {
    /// Create a new `Collection` from a trusted name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the collection name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Collection {
    type Err = ParseCollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseCollectionError("collection name cannot be empty".to_string()));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ParseCollectionError(format!(
                "collection name must be alphanumeric, '_' or '-': {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

/// Address of a single document: its collection plus its id within it.
///
/// # Examples
///
/// ```
/// use plotmarket_core::document::{Collection, DocumentKey};
///
/// let key = DocumentKey::new(Collection::new("plots"), "42");
/// assert_eq!(key.to_string(), "plots/42");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    collection: Collection,
    id: String,
}

impl DocumentKey {
    /// Create a key for `id` inside `collection`.
    #[must_use]
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }

    /// The collection this document belongs to.
    #[must_use]
    pub const fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The document id within its collection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Document version number for optimistic concurrency control.
///
/// A document is created at [`Version::FIRST`] and every successful update
/// moves it to [`Version::next`]. Writers state the version they read; if the
/// stored version moved in the meantime the write is rejected.
///
/// # Examples
///
/// ```
/// use plotmarket_core::document::Version;
///
/// let v1 = Version::FIRST;
/// assert_eq!(v1.next(), Version::new(2));
/// assert_eq!(Version::new(5).value(), 5);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly inserted document.
    pub const FIRST: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A stored document: key, current version and JSON body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Where the document lives
    pub key: DocumentKey,
    /// Current version (the optimistic concurrency token)
    pub version: Version,
    /// Document body
    pub body: serde_json::Value,
}
