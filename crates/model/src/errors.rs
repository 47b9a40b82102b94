use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::{SessionId, TrainingId};

/// Structural problems found while turning a stored document into a [`Training`].
///
/// [`Training`]: crate::training::Training
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Invalid document shape: {0}")]
    Shape(String),
    #[error("trainingId {found} does not match document id {expected}")]
    IdMismatch { expected: TrainingId, found: TrainingId },
    #[error("Session without id at position {0}")]
    EmptySessionId(usize),
    #[error("Duplicate session id: {0}")]
    DuplicateSession(SessionId),
    #[error("Training opens at {opens} after it closes at {closes}")]
    InvertedWindow {
        opens: DateTime<Utc>,
        closes: DateTime<Utc>,
    },
}

impl From<bson::de::Error> for DecodeError {
    fn from(err: bson::de::Error) -> Self {
        DecodeError::Shape(err.to_string())
    }
}
