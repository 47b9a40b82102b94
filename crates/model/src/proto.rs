//! Persisted shape of a training, as it is laid out in the `weekly_trainings`
//! collection, and its validated conversion into [`Training`].

use std::collections::{BTreeMap, HashSet};

use bson::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::DecodeError,
    ids::{MemberId, SessionId, TrainingId},
    training::{SignupEntry, Training, TrainingSession},
};

/// Newlines are not stored verbatim in notes.
pub const NEWLINE_MARKER: &str = "%%NEWLINE%%";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_id: Option<TrainingId>,
    pub title: String,
    #[serde(with = "crate::timestamp")]
    pub opens: DateTime<Utc>,
    #[serde(with = "crate::timestamp")]
    pub closes: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    pub sessions: Vec<SessionProto>,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub open_to_public: bool,
    #[serde(default)]
    pub use_inter_sem_members: bool,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionProto {
    pub session_id: SessionId,
    pub title: String,
    pub limit: i64,
    #[serde(default)]
    pub trainers: Vec<String>,
    #[serde(default)]
    pub members: BTreeMap<MemberId, SignupEntryProto>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignupEntryProto {
    pub name: String,
    #[serde(with = "crate::timestamp")]
    pub time_added: DateTime<Utc>,
}

impl TrainingProto {
    pub fn from_document(document: Document) -> Result<TrainingProto, DecodeError> {
        Ok(bson::from_document(document)?)
    }

    pub fn to_document(&self) -> Result<Document, bson::ser::Error> {
        bson::to_document(self)
    }

    /// Validates the proto read under document id `id`.
    pub fn into_training(self, id: TrainingId) -> Result<Training, DecodeError> {
        if let Some(found) = &self.training_id {
            if found != &id {
                return Err(DecodeError::IdMismatch {
                    expected: id,
                    found: found.clone(),
                });
            }
        }

        if self.opens > self.closes {
            return Err(DecodeError::InvertedWindow {
                opens: self.opens,
                closes: self.closes,
            });
        }

        let mut seen = HashSet::new();
        let mut sessions = Vec::with_capacity(self.sessions.len());
        for (position, session) in self.sessions.into_iter().enumerate() {
            if session.session_id.is_blank() {
                return Err(DecodeError::EmptySessionId(position));
            }
            if !seen.insert(session.session_id.clone()) {
                return Err(DecodeError::DuplicateSession(session.session_id));
            }
            sessions.push(TrainingSession::from(session));
        }

        Ok(Training {
            id,
            title: self.title,
            opens: self.opens,
            closes: self.closes,
            notes: self.notes.replace(NEWLINE_MARKER, "\n"),
            sessions,
            feedback: self.feedback,
            open_to_public: self.open_to_public,
            use_inter_sem_members: self.use_inter_sem_members,
            version: self.version,
        })
    }
}

impl From<&Training> for TrainingProto {
    fn from(training: &Training) -> Self {
        TrainingProto {
            training_id: Some(training.id.clone()),
            title: training.title.clone(),
            opens: training.opens,
            closes: training.closes,
            notes: training.notes.replace('\n', NEWLINE_MARKER),
            sessions: training.sessions.iter().map(SessionProto::from).collect(),
            feedback: training.feedback.clone(),
            open_to_public: training.open_to_public,
            use_inter_sem_members: training.use_inter_sem_members,
            version: training.version,
        }
    }
}

impl From<SessionProto> for TrainingSession {
    fn from(proto: SessionProto) -> Self {
        TrainingSession {
            id: proto.session_id,
            title: proto.title,
            limit: proto.limit,
            trainers: proto.trainers,
            members: proto
                .members
                .into_iter()
                .map(|(member, entry)| (member, SignupEntry::new(entry.name, entry.time_added)))
                .collect(),
        }
    }
}

impl From<&TrainingSession> for SessionProto {
    fn from(session: &TrainingSession) -> Self {
        SessionProto {
            session_id: session.id.clone(),
            title: session.title.clone(),
            limit: session.limit,
            trainers: session.trainers.clone(),
            members: session
                .members
                .iter()
                .map(|(member, entry)| {
                    (
                        member.clone(),
                        SignupEntryProto {
                            name: entry.name.clone(),
                            time_added: entry.time_added,
                        },
                    )
                })
                .collect(),
        }
    }
}
