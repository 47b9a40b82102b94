use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use log::info;
use model::training::Training;
use parking_lot::Mutex;
use storage::{adapter::SubscriptionId, training::TrainingStore};

use super::signups::SignupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Registry of training listeners.
///
/// Every listener owns one store subscription and receives the decoded
/// collection after each change.
#[derive(Clone)]
pub struct Feed {
    trainings: TrainingStore,
    listeners: Arc<Mutex<HashMap<ListenerId, SubscriptionId>>>,
    next_id: Arc<AtomicU64>,
}

impl Feed {
    pub fn new(trainings: TrainingStore) -> Self {
        Feed {
            trainings,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The callback is called with the current trainings right away and again
    /// after every change.
    pub async fn listen<F>(&self, callback: F) -> Result<ListenerId, SignupError>
    where
        F: Fn(Vec<Training>) + Send + Sync + 'static,
    {
        let subscription = self.trainings.subscribe(callback).await?;
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().insert(id, subscription);
        info!("Listen: {} ({})", id, subscription);
        Ok(id)
    }

    /// Like [`Feed::listen`], without the delivery made on registration.
    pub async fn listen_changes<F>(&self, callback: F) -> Result<ListenerId, SignupError>
    where
        F: Fn(Vec<Training>) + Send + Sync + 'static,
    {
        let initial = AtomicBool::new(true);
        self.listen(move |trainings| {
            if !initial.swap(false, Ordering::SeqCst) {
                callback(trainings);
            }
        })
        .await
    }

    pub fn unlisten(&self, id: ListenerId) {
        let subscription = self.listeners.lock().remove(&id);
        if let Some(subscription) = subscription {
            self.trainings.unsubscribe(subscription);
            info!("Unlisten: {}", id);
        }
    }

    pub fn listeners(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn shutdown(&self) {
        let listeners: Vec<_> = self.listeners.lock().drain().collect();
        for (id, subscription) in listeners {
            self.trainings.unsubscribe(subscription);
            info!("Unlisten: {}", id);
        }
    }
}
