use model::errors::DecodeError;
use thiserror::Error;

use crate::adapter::Precondition;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Mongo error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("Failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),
    #[error("Write conflict on {collection}/{id}: expected {expected}, found {}", describe(.found))]
    Conflict {
        collection: String,
        id: String,
        expected: Precondition,
        found: Option<u64>,
    },
    #[error("Malformed document {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: DecodeError,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

fn describe(found: &Option<u64>) -> String {
    match found {
        Some(version) => format!("version {}", version),
        None => "no document".to_owned(),
    }
}
