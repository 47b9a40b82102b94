use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bson::Document;
use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    adapter::{
        stamp_version, DocumentStore, Precondition, RawDocument, Snapshot, SnapshotCallback,
        SubscriptionId,
    },
    error::StoreError,
};

struct Subscriber {
    collection: String,
    callback: SnapshotCallback,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, RawDocument>>,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
}

impl State {
    fn snapshot(&self, collection: &str) -> Snapshot {
        self.collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn callbacks(&self, collection: &str) -> Vec<SnapshotCallback> {
        self.subscribers
            .values()
            .filter(|sub| sub.collection == collection)
            .map(|sub| sub.callback.clone())
            .collect()
    }
}

/// In-process document store. Subscribers are notified synchronously, after
/// the write is applied and outside of the store lock.
///
/// Writes and initial deliveries are serialized on `notify`, so every
/// subscriber sees snapshots in the order the writes were applied.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    notify: Arc<Mutex<()>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribers(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        Ok(self.state.lock().snapshot(collection))
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        mut document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        let _notify = self.notify.lock();
        let (version, snapshot, callbacks) = {
            let mut state = self.state.lock();
            let docs = state.collections.entry(collection.to_owned()).or_default();
            let current = docs.get(id).map(|doc| doc.version);
            if !precondition.holds(current) {
                return Err(StoreError::Conflict {
                    collection: collection.to_owned(),
                    id: id.to_owned(),
                    expected: precondition,
                    found: current,
                });
            }

            let version = current.map_or(1, |version| version + 1);
            stamp_version(&mut document, version);
            docs.insert(
                id.to_owned(),
                RawDocument {
                    id: id.to_owned(),
                    version,
                    document,
                },
            );
            (version, state.snapshot(collection), state.callbacks(collection))
        };

        debug!("Write {}/{}: version {}", collection, id, version);
        for callback in callbacks {
            callback(snapshot.clone());
        }
        Ok(version)
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError> {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let _notify = self.notify.lock();
        let snapshot = {
            let mut state = self.state.lock();
            state.subscribers.insert(
                id,
                Subscriber {
                    collection: collection.to_owned(),
                    callback: callback.clone(),
                },
            );
            state.snapshot(collection)
        };
        info!("Subscribe {}: {}", collection, id);
        callback(snapshot);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.state.lock().subscribers.remove(&id).is_some() {
            info!("Unsubscribe: {}", id);
        }
    }
}
