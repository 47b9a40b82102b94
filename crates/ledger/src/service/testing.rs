use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, TimeZone as _, Utc};
use model::training::{Training, TrainingSession};
use parking_lot::Mutex;
use storage::{
    adapter::{DocumentStore, Precondition, RawDocument, Snapshot, SnapshotCallback, SubscriptionId},
    error::StoreError,
    memory::MemoryStore,
    training::{TrainingStore, COLLECTION},
};
use tokio::sync::Barrier;

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 5, day, 9, 0, 0)
        .single()
        .unwrap()
}

/// `mon-beg` holds two members, `wed-adv` is unlimited, `solo` holds one.
pub fn training(id: &str) -> Training {
    Training::new(
        id.into(),
        format!("Week {}", id),
        at(1),
        at(7),
        vec![
            TrainingSession::new("mon-beg".into(), "Monday beginners".to_owned(), 2),
            TrainingSession::new("wed-adv".into(), "Wednesday advanced".to_owned(), -1),
            TrainingSession::new("solo".into(), "Private lesson".to_owned(), 1),
        ],
    )
}

/// T1 and T2 are open on day 1, T3 opens on day 8.
pub async fn seed(trainings: &TrainingStore) {
    trainings.create(&training("T1")).await.unwrap();
    trainings.create(&training("T2")).await.unwrap();
    let mut later = training("T3");
    later.opens = at(8);
    later.closes = at(14);
    trainings.create(&later).await.unwrap();
}

pub async fn corrupt(memory: &MemoryStore, id: &str) {
    memory
        .write(
            COLLECTION,
            id,
            doc! { "title": "broken", "sessions": "none" },
            Precondition::None,
        )
        .await
        .unwrap();
}

/// Fails reads once a number of them went through.
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryStore,
    reads_left: Arc<Mutex<Option<usize>>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        FlakyStore {
            inner,
            reads_left: Arc::new(Mutex::new(None)),
        }
    }

    pub fn fail_reads_after(&self, reads: usize) {
        *self.reads_left.lock() = Some(reads);
    }

    pub fn heal(&self) {
        *self.reads_left.lock() = None;
    }

    fn check(&self) -> Result<(), StoreError> {
        let mut reads_left = self.reads_left.lock();
        match reads_left.as_mut() {
            Some(0) => Err(StoreError::from(mongodb::error::Error::from(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            )))),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        self.check()?;
        self.inner.read(collection, id).await
    }

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        self.check()?;
        self.inner.read_all(collection).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        self.inner.write(collection, id, document, precondition).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError> {
        self.inner.subscribe(collection, callback).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }
}

/// When armed, a reader waits after its read until a second reader has read
/// too. The first write disarms it, so two racing operations both hold the
/// same version when they write.
#[derive(Clone)]
pub struct GatedStore {
    inner: MemoryStore,
    armed: Arc<AtomicBool>,
    gate: Arc<Barrier>,
    writes: Arc<AtomicUsize>,
}

impl GatedStore {
    pub fn new(inner: MemoryStore) -> Self {
        GatedStore {
            inner,
            armed: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Barrier::new(2)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let read = self.inner.read(collection, id).await;
        if self.armed.load(Ordering::SeqCst) {
            self.gate.wait().await;
        }
        read
    }

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        self.inner.read_all(collection).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        self.armed.store(false, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(collection, id, document, precondition).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError> {
        self.inner.subscribe(collection, callback).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }
}

/// Answers reads and writes after their own delays.
#[derive(Clone)]
pub struct SlowStore {
    inner: MemoryStore,
    read_delay: Duration,
    write_delay: Duration,
}

impl SlowStore {
    pub fn new(inner: MemoryStore, read_delay: Duration, write_delay: Duration) -> Self {
        SlowStore {
            inner,
            read_delay,
            write_delay,
        }
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.read(collection, id).await
    }

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.read_all(collection).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        tokio::time::sleep(self.write_delay).await;
        self.inner.write(collection, id, document, precondition).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError> {
        self.inner.subscribe(collection, callback).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }
}

/// Rejects the next `conflicts` writes as if another writer got there first.
#[derive(Clone)]
pub struct ConflictingStore {
    inner: MemoryStore,
    conflicts: Arc<Mutex<usize>>,
    writes: Arc<Mutex<usize>>,
}

impl ConflictingStore {
    pub fn new(inner: MemoryStore, conflicts: usize) -> Self {
        ConflictingStore {
            inner,
            conflicts: Arc::new(Mutex::new(conflicts)),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

#[async_trait]
impl DocumentStore for ConflictingStore {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        self.inner.read(collection, id).await
    }

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        self.inner.read_all(collection).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        *self.writes.lock() += 1;
        {
            let mut conflicts = self.conflicts.lock();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(StoreError::Conflict {
                    collection: collection.to_owned(),
                    id: id.to_owned(),
                    expected: precondition,
                    found: None,
                });
            }
        }
        self.inner.write(collection, id, document, precondition).await
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError> {
        self.inner.subscribe(collection, callback).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }
}
