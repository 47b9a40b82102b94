pub mod adapter;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod training;

use std::sync::Arc;

use adapter::DocumentStore;
use eyre::Result;
use memory::MemoryStore;
use mongo::MongoStore;
use training::TrainingStore;

#[derive(Clone)]
pub struct Storage {
    pub store: Arc<dyn DocumentStore>,
    pub trainings: TrainingStore,
}

impl Storage {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        let store = MongoStore::connect(uri, db_name).await?;
        Ok(Storage::with_store(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Storage::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        let trainings = TrainingStore::new(store.clone());
        Storage { store, trainings }
    }
}
