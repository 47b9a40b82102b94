use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::error::StoreError;

/// Field every stored document carries its version in.
pub const VERSION_FIELD: &str = "version";

/// Full content of a collection at one point in time.
pub type Snapshot = Vec<RawDocument>;

pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub version: u64,
    pub document: Document,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, document: Document) -> RawDocument {
        let version = version_of(&document);
        RawDocument {
            id: id.into(),
            version,
            document,
        }
    }
}

/// Condition a write is applied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Blind overwrite. Concurrent writers silently replace each other.
    None,
    /// The document must not exist yet.
    Absent,
    /// The stored version must still be the given one.
    Version(u64),
}

impl Precondition {
    /// Checks the precondition against the currently stored version.
    pub fn holds(&self, current: Option<u64>) -> bool {
        match self {
            Precondition::None => true,
            Precondition::Absent => current.is_none(),
            Precondition::Version(expected) => current == Some(*expected),
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::None => f.write_str("any version"),
            Precondition::Absent => f.write_str("no document"),
            Precondition::Version(version) => write!(f, "version {}", version),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        SubscriptionId(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Generic document store: whole-document reads and writes plus collection
/// snapshots pushed on every change.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError>;

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError>;

    /// Replaces the whole document and returns its new version.
    async fn write(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError>;

    /// Registers a callback that receives the current snapshot right away and
    /// a fresh one after every change of the collection.
    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError>;

    /// Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

pub fn version_of(document: &Document) -> u64 {
    match document.get(VERSION_FIELD) {
        Some(Bson::Int32(version)) => u64::try_from(*version).unwrap_or_default(),
        Some(Bson::Int64(version)) => u64::try_from(*version).unwrap_or_default(),
        _ => 0,
    }
}

pub fn stamp_version(document: &mut Document, version: u64) {
    document.insert(VERSION_FIELD, Bson::Int64(version as i64));
}
