use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use model::{
    errors::DecodeError,
    ids::{MemberId, SessionId, TrainingId},
    training::{SignupEntry, Training},
};
use storage::{adapter::Precondition, error::StoreError, training::TrainingStore};
use strum::Display;
use thiserror::Error;

use crate::config::{CapacityPolicy, LedgerConfig, MoveMode, WriteMode};

/// Signup engine.
///
/// Every operation is a read-modify-write of one whole training document. The
/// engine never retries: a conflicting write is reported as
/// [`SignupError::Conflict`] and the caller decides what to do.
#[derive(Clone)]
pub struct Signups {
    trainings: TrainingStore,
    config: LedgerConfig,
}

impl Signups {
    pub fn new(trainings: TrainingStore, config: LedgerConfig) -> Self {
        Signups { trainings, config }
    }

    pub async fn get_training(&self, id: &TrainingId) -> Result<Training, SignupError> {
        validate(&[("training id", id.as_str())])?;
        self.load(id).await
    }

    /// Corrupt trainings are skipped.
    pub async fn get_all_trainings(&self) -> Result<Vec<Training>, SignupError> {
        self.call(StoreCall::Read, self.trainings.get_all()).await
    }

    pub async fn get_open_trainings(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Training>, SignupError> {
        self.call(StoreCall::Read, self.trainings.get_open(now)).await
    }

    /// Signs the member up to `session`.
    ///
    /// The member is dropped from any other session of the training in the same
    /// write, so a member never holds two signups in one training.
    pub async fn sign_up(
        &self,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        training: &TrainingId,
        session: &SessionId,
        feedback: &str,
    ) -> Result<(), SignupError> {
        validate(&[
            ("member id", member.as_str()),
            ("training id", training.as_str()),
            ("session id", session.as_str()),
        ])?;
        info!("Sign up: {} -> {}/{}", member, training, session);

        let mut doc = self.load(training).await?;
        if doc.session(session).is_none() {
            return Err(SignupError::SessionNotFound {
                training: training.clone(),
                session: session.clone(),
            });
        }
        let previous = doc.remove_member(member);
        if !previous.is_empty() {
            debug!("Sign up: {} leaves {:?}", member, previous);
        }
        self.place(&mut doc, member, name, time, session)?;
        if doc.add_feedback(feedback) {
            debug!("Sign up: feedback added to {}", training);
        }
        self.commit(&doc).await
    }

    /// Removing a member that is not signed up is a no-op.
    pub async fn remove(
        &self,
        member: &MemberId,
        training: &TrainingId,
        session: &SessionId,
    ) -> Result<(), SignupError> {
        validate(&[
            ("member id", member.as_str()),
            ("training id", training.as_str()),
            ("session id", session.as_str()),
        ])?;
        info!("Remove: {} <- {}/{}", member, training, session);

        let mut doc = self.load(training).await?;
        let removed = doc
            .session_mut(session)
            .ok_or_else(|| SignupError::SessionNotFound {
                training: training.clone(),
                session: session.clone(),
            })?
            .remove(member);
        if removed.is_none() {
            debug!("Remove: {} is not in {}/{}", member, training, session);
            return Ok(());
        }
        self.commit(&doc).await
    }

    pub async fn move_member(
        &self,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        training: &TrainingId,
        from: &SessionId,
        to: &SessionId,
    ) -> Result<(), SignupError> {
        match self.config.move_mode {
            MoveMode::Atomic => self.move_atomic(member, name, time, training, from, to).await,
            MoveMode::TwoPhase => {
                self.move_two_phase(member, name, time, training, from, to)
                    .await
            }
        }
    }

    /// Returns the session the member is signed up to. With `remove_signup`
    /// that signup is removed before returning.
    pub async fn is_signed_up(
        &self,
        member: &MemberId,
        training: &TrainingId,
        remove_signup: bool,
    ) -> Result<Option<SessionId>, SignupError> {
        validate(&[
            ("member id", member.as_str()),
            ("training id", training.as_str()),
        ])?;
        let doc = self.load(training).await?;
        let session = doc.find_member(member).cloned();
        if let (Some(session), true) = (&session, remove_signup) {
            self.remove(member, training, session).await?;
        }
        Ok(session)
    }

    async fn move_atomic(
        &self,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        training: &TrainingId,
        from: &SessionId,
        to: &SessionId,
    ) -> Result<(), SignupError> {
        validate(&[
            ("member id", member.as_str()),
            ("training id", training.as_str()),
            ("session id", from.as_str()),
            ("session id", to.as_str()),
        ])?;
        info!("Move: {} {}/{} -> {}", member, training, from, to);

        let mut doc = self.load(training).await?;
        for session in [from, to] {
            if doc.session(session).is_none() {
                return Err(SignupError::SessionNotFound {
                    training: training.clone(),
                    session: session.clone(),
                });
            }
        }
        let previous = doc.remove_member(member);
        if !previous.contains(from) {
            warn!("Move: {} was not signed up to {}/{}", member, training, from);
        }
        self.place(&mut doc, member, name, time, to)?;
        self.commit(&doc).await
    }

    async fn move_two_phase(
        &self,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        training: &TrainingId,
        from: &SessionId,
        to: &SessionId,
    ) -> Result<(), SignupError> {
        self.sign_up(member, name, time, training, to, "").await?;
        self.remove(member, training, from).await.map_err(|err| {
            error!(
                "Move: {} signed up to {}/{} but removal from {} failed: {}",
                member, training, to, from, err
            );
            SignupError::PartiallyApplied {
                from: from.clone(),
                to: to.clone(),
                source: Box::new(err),
            }
        })
    }

    fn place(
        &self,
        doc: &mut Training,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        session: &SessionId,
    ) -> Result<(), SignupError> {
        let training = doc.id.clone();
        let target = doc
            .session_mut(session)
            .ok_or_else(|| SignupError::SessionNotFound {
                training: training.clone(),
                session: session.clone(),
            })?;
        if target.is_full() {
            match self.config.capacity_policy {
                CapacityPolicy::Enforced => {
                    return Err(SignupError::SessionFull {
                        training,
                        session: session.clone(),
                        limit: target.limit,
                    });
                }
                CapacityPolicy::Advisory => {
                    warn!(
                        "Sign up: {}/{} is over its limit of {}",
                        training, session, target.limit
                    );
                }
            }
        }
        target.insert(member.clone(), SignupEntry::new(name, time));
        Ok(())
    }

    async fn load(&self, id: &TrainingId) -> Result<Training, SignupError> {
        self.call(StoreCall::Read, self.trainings.get(id))
            .await?
            .ok_or_else(|| SignupError::TrainingNotFound(id.clone()))
    }

    async fn commit(&self, training: &Training) -> Result<(), SignupError> {
        let precondition = match self.config.write_mode {
            WriteMode::Optimistic => Precondition::Version(training.version),
            WriteMode::LastWriteWins => Precondition::None,
        };
        let version = self
            .call(StoreCall::Write, self.trainings.save(training, precondition))
            .await?;
        debug!("Training {}: version {}", training.id, version);
        Ok(())
    }

    async fn call<T, F>(&self, call: StoreCall, fut: F) -> Result<T, SignupError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_conflict() {
                    warn!("{}", err);
                } else {
                    error!("{}", err);
                }
                Err(err.into())
            }
            Err(_) => {
                let after = self.config.store_timeout;
                error!("Store {} timed out after {:?}", call, after);
                Err(SignupError::Timeout { call, after })
            }
        }
    }
}

fn validate(ids: &[(&str, &str)]) -> Result<(), SignupError> {
    for (what, id) in ids {
        if id.trim().is_empty() {
            return Err(SignupError::Validation(format!("{} is empty", what)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StoreCall {
    Read,
    Write,
}

#[derive(Error, Debug)]
pub enum SignupError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Training not found: {0}")]
    TrainingNotFound(TrainingId),
    #[error("Session {session} not found in training {training}")]
    SessionNotFound {
        training: TrainingId,
        session: SessionId,
    },
    #[error("Session {session} of training {training} is full ({limit} places)")]
    SessionFull {
        training: TrainingId,
        session: SessionId,
        limit: i64,
    },
    #[error("Training {id} is malformed: {source}")]
    MalformedTraining {
        id: String,
        #[source]
        source: DecodeError,
    },
    #[error("Training was changed concurrently, re-read and try again: {0}")]
    Conflict(#[source] StoreError),
    #[error("Store {call} timed out after {after:?}{}", outcome(.call))]
    Timeout { call: StoreCall, after: Duration },
    #[error("Signed up to {to} but removal from {from} failed, re-read the training: {source}")]
    PartiallyApplied {
        from: SessionId,
        to: SessionId,
        #[source]
        source: Box<SignupError>,
    },
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl SignupError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SignupError::Conflict(_))
    }
}

fn outcome(call: &StoreCall) -> &'static str {
    match call {
        StoreCall::Read => ", nothing was changed",
        StoreCall::Write => ", the write may or may not have been applied",
    }
}

impl From<StoreError> for SignupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => SignupError::Conflict(err),
            StoreError::Malformed { id, source } => SignupError::MalformedTraining { id, source },
            err => SignupError::Store(err),
        }
    }
}
