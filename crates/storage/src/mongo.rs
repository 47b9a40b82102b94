use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use eyre::{Context as _, Error};
use futures_util::{StreamExt as _, TryStreamExt as _};
use log::{error, info, warn};
use mongodb::{
    change_stream::{
        event::{ChangeStreamEvent, ResumeToken},
        ChangeStream,
    },
    error::{ErrorKind, WriteFailure},
    options::ReplaceOptions,
    Client, Collection, Database,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    adapter::{
        stamp_version, version_of, DocumentStore, Precondition, RawDocument, Snapshot,
        SnapshotCallback, SubscriptionId,
    },
    error::StoreError,
};

const DUPLICATE_KEY: i32 = 11000;
const REOPEN_DELAY_MIN: Duration = Duration::from_millis(100);
const REOPEN_DELAY_MAX: Duration = Duration::from_secs(30);

type Watcher = ChangeStream<ChangeStreamEvent<Document>>;

/// MongoDB backed document store.
///
/// Conditional writes filter on `{_id, version}`, so a stale writer matches
/// nothing and gets a conflict. Subscriptions need a replica set: each one is
/// a task following the collection's change stream. A failed stream is
/// reopened with backoff and the subscriber gets a fresh snapshot once it is
/// back.
#[derive(Clone)]
pub struct MongoStore {
    _client: Client,
    db: Database,
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, JoinHandle<()>>>>,
    next_id: Arc<AtomicU64>,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, Error> {
        let client = Client::with_uri_str(uri)
            .await
            .context("Failed to connect to MongoDB")?;
        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .context("Failed to ping MongoDB")?;
        Ok(MongoStore {
            _client: client,
            db,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    async fn current_version(
        &self,
        collection: &Collection<Document>,
        id: &str,
    ) -> Result<Option<u64>, StoreError> {
        Ok(collection
            .find_one(doc! { "_id": id })
            .await?
            .map(|doc| version_of(&doc)))
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn read(&self, collection: &str, id: &str) -> Result<Option<RawDocument>, StoreError> {
        let doc = self.collection(collection).find_one(doc! { "_id": id }).await?;
        Ok(doc.map(|mut doc| {
            doc.remove("_id");
            RawDocument::new(id, doc)
        }))
    }

    async fn read_all(&self, collection: &str) -> Result<Snapshot, StoreError> {
        snapshot(&self.collection(collection)).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        mut document: Document,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        info!("Write {}/{} ({})", collection, id, precondition);
        let store = self.collection(collection);
        let conflict = |found| StoreError::Conflict {
            collection: collection.to_owned(),
            id: id.to_owned(),
            expected: precondition,
            found,
        };

        match precondition {
            Precondition::Absent => {
                stamp_version(&mut document, 1);
                document.insert("_id", id);
                match store.insert_one(document).await {
                    Ok(_) => Ok(1),
                    Err(err) if is_duplicate_key(&err) => {
                        Err(conflict(self.current_version(&store, id).await?))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Precondition::Version(expected) => {
                let version = expected + 1;
                stamp_version(&mut document, version);
                document.insert("_id", id);
                let filter = if expected == 0 {
                    doc! {
                        "_id": id,
                        "$or": [
                            { "version": 0_i64 },
                            { "version": { "$exists": false } },
                        ]
                    }
                } else {
                    doc! { "_id": id, "version": expected as i64 }
                };
                let result = store.replace_one(filter, document).await?;
                if result.matched_count != 1 {
                    return Err(conflict(self.current_version(&store, id).await?));
                }
                Ok(version)
            }
            Precondition::None => {
                let version = self
                    .current_version(&store, id)
                    .await?
                    .map_or(1, |version| version + 1);
                stamp_version(&mut document, version);
                document.insert("_id", id);
                store
                    .replace_one(doc! { "_id": id }, document)
                    .with_options(ReplaceOptions::builder().upsert(true).build())
                    .await?;
                Ok(version)
            }
        }
    }

    async fn subscribe(
        &self,
        collection: &str,
        callback: SnapshotCallback,
    ) -> Result<SubscriptionId, StoreError> {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let store = self.collection(collection);
        let mut stream = store.watch().await?;
        callback(snapshot(&store).await?);

        let subscriptions = self.subscriptions.clone();
        let mut subscriptions_guard = self.subscriptions.lock();
        let handle = tokio::spawn(async move {
            loop {
                while let Some(event) = stream.next().await {
                    if let Err(err) = event {
                        error!("Change stream {} for {} failed: {:#}", id, store.name(), err);
                        break;
                    }
                    deliver(&store, &callback).await;
                }
                warn!("Change stream {} for {} interrupted, reopening", id, store.name());
                match reopen(&store, id, stream.resume_token()).await {
                    Some(reopened) => stream = reopened,
                    None => break,
                }
                deliver(&store, &callback).await;
            }
            subscriptions.lock().remove(&id);
        });
        subscriptions_guard.insert(id, handle);
        drop(subscriptions_guard);
        info!("Subscribe {}: {}", collection, id);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(handle) = self.subscriptions.lock().remove(&id) {
            info!("Unsubscribe: {}", id);
            handle.abort();
        }
    }
}

async fn deliver(collection: &Collection<Document>, callback: &SnapshotCallback) {
    match snapshot(collection).await {
        Ok(snapshot) => callback(snapshot),
        Err(err) => error!("Failed to read {} snapshot: {:#}", collection.name(), err),
    }
}

/// Reopens a change stream, resuming after `token` on the first attempt.
/// Gives up only when the collection no longer accepts watches at all.
async fn reopen(
    collection: &Collection<Document>,
    id: SubscriptionId,
    token: Option<ResumeToken>,
) -> Option<Watcher> {
    let mut token = token;
    for attempt in 0.. {
        tokio::time::sleep(reopen_delay(attempt)).await;
        match collection.watch().resume_after(token.take()).await {
            Ok(stream) => {
                info!("Change stream {} for {} reopened", id, collection.name());
                return Some(stream);
            }
            Err(err) => {
                error!(
                    "Failed to reopen change stream {} for {} (attempt {}): {:#}",
                    id,
                    collection.name(),
                    attempt + 1,
                    err
                );
                if is_fatal(&err) {
                    return None;
                }
            }
        }
    }
    None
}

fn reopen_delay(attempt: u32) -> Duration {
    REOPEN_DELAY_MIN
        .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        .min(REOPEN_DELAY_MAX)
}

fn is_fatal(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::InvalidArgument { .. } | ErrorKind::Authentication { .. }
    )
}

async fn snapshot(collection: &Collection<Document>) -> Result<Snapshot, StoreError> {
    let docs: Vec<Document> = collection.find(doc! {}).await?.try_collect().await?;
    Ok(docs
        .into_iter()
        .filter_map(|mut doc| {
            let id = match doc.remove("_id") {
                Some(Bson::String(id)) => id,
                Some(Bson::ObjectId(id)) => id.to_hex(),
                Some(other) => other.to_string(),
                None => {
                    warn!("Skipping document without _id in {}", collection.name());
                    return None;
                }
            };
            Some(RawDocument::new(id, doc))
        })
        .collect())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}
