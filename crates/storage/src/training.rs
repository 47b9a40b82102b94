use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use model::{
    errors::DecodeError,
    ids::TrainingId,
    proto::TrainingProto,
    training::Training,
};

use crate::{
    adapter::{DocumentStore, Precondition, RawDocument, Snapshot, SubscriptionId},
    error::StoreError,
};

pub const COLLECTION: &str = "weekly_trainings";

/// Typed access to the weekly trainings collection.
#[derive(Clone)]
pub struct TrainingStore {
    store: Arc<dyn DocumentStore>,
}

impl TrainingStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        TrainingStore { store }
    }

    /// A corrupt document fails the read instead of being skipped.
    pub async fn get(&self, id: &TrainingId) -> Result<Option<Training>, StoreError> {
        let raw = self.store.read(COLLECTION, id.as_str()).await?;
        raw.map(|raw| {
            let id = raw.id.clone();
            decode(raw).map_err(|source| StoreError::Malformed { id, source })
        })
        .transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<Training>, StoreError> {
        Ok(decode_snapshot(self.store.read_all(COLLECTION).await?))
    }

    pub async fn get_open(&self, now: DateTime<Utc>) -> Result<Vec<Training>, StoreError> {
        let mut trainings = self.get_all().await?;
        trainings.retain(|training| training.is_open(now));
        Ok(trainings)
    }

    pub async fn create(&self, training: &Training) -> Result<u64, StoreError> {
        info!("Create training: {} ({})", training.id, training.title);
        self.save(training, Precondition::Absent).await
    }

    /// Writes the whole training and returns its new version.
    pub async fn save(
        &self,
        training: &Training,
        precondition: Precondition,
    ) -> Result<u64, StoreError> {
        let document = TrainingProto::from(training).to_document()?;
        self.store
            .write(COLLECTION, training.id.as_str(), document, precondition)
            .await
    }

    /// Corrupt documents are left out of the delivered snapshots.
    pub async fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId, StoreError>
    where
        F: Fn(Vec<Training>) + Send + Sync + 'static,
    {
        self.store
            .subscribe(
                COLLECTION,
                Arc::new(move |snapshot: Snapshot| callback(decode_snapshot(snapshot))),
            )
            .await
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.store.unsubscribe(id);
    }
}

pub fn decode(raw: RawDocument) -> Result<Training, DecodeError> {
    let mut training =
        TrainingProto::from_document(raw.document)?.into_training(TrainingId::new(raw.id))?;
    training.version = raw.version;
    Ok(training)
}

pub fn decode_snapshot(snapshot: Snapshot) -> Vec<Training> {
    snapshot
        .into_iter()
        .filter_map(|raw| {
            let id = raw.id.clone();
            match decode(raw) {
                Ok(training) => Some(training),
                Err(err) => {
                    warn!("Skipping malformed training {}: {}", id, err);
                    None
                }
            }
        })
        .collect()
}
