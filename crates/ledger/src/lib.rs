use chrono::{DateTime, Utc};
use log::info;
use model::{
    ids::{MemberId, SessionId, TrainingId},
    training::Training,
};
use service::{
    feed::{Feed, ListenerId},
    signups::{SignupError, Signups},
};
use storage::Storage;

use retry_macro::retry;

pub mod config;
pub mod service;

pub use config::LedgerConfig;

/// Entry point for the UI layer. Mutations that lose a write race are re-read
/// and retried up to `conflict_retries` times.
#[derive(Clone)]
pub struct Ledger {
    pub signups: Signups,
    pub feed: Feed,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(storage: Storage, config: LedgerConfig) -> Self {
        let signups = Signups::new(storage.trainings.clone(), config);
        let feed = Feed::new(storage.trainings);
        Ledger {
            signups,
            feed,
            config,
        }
    }

    pub fn conflict_retries(&self) -> u32 {
        self.config.conflict_retries
    }

    #[retry]
    pub async fn sign_up(
        &self,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        training: &TrainingId,
        session: &SessionId,
        feedback: &str,
    ) -> Result<(), SignupError> {
        self.signups
            .sign_up(member, name, time, training, session, feedback)
            .await
    }

    #[retry]
    pub async fn remove(
        &self,
        member: &MemberId,
        training: &TrainingId,
        session: &SessionId,
    ) -> Result<(), SignupError> {
        self.signups.remove(member, training, session).await
    }

    #[retry]
    pub async fn move_member(
        &self,
        member: &MemberId,
        name: &str,
        time: DateTime<Utc>,
        training: &TrainingId,
        from: &SessionId,
        to: &SessionId,
    ) -> Result<(), SignupError> {
        self.signups
            .move_member(member, name, time, training, from, to)
            .await
    }

    #[retry]
    pub async fn is_signed_up(
        &self,
        member: &MemberId,
        training: &TrainingId,
        remove_signup: bool,
    ) -> Result<Option<SessionId>, SignupError> {
        self.signups
            .is_signed_up(member, training, remove_signup)
            .await
    }

    pub async fn get_training(&self, id: &TrainingId) -> Result<Training, SignupError> {
        self.signups.get_training(id).await
    }

    pub async fn get_all_trainings(&self) -> Result<Vec<Training>, SignupError> {
        self.signups.get_all_trainings().await
    }

    pub async fn get_open_trainings(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Training>, SignupError> {
        self.signups.get_open_trainings(now).await
    }

    pub async fn listen<F>(&self, callback: F) -> Result<ListenerId, SignupError>
    where
        F: Fn(Vec<Training>) + Send + Sync + 'static,
    {
        self.feed.listen(callback).await
    }

    pub async fn listen_changes<F>(&self, callback: F) -> Result<ListenerId, SignupError>
    where
        F: Fn(Vec<Training>) + Send + Sync + 'static,
    {
        self.feed.listen_changes(callback).await
    }

    pub fn unlisten(&self, id: ListenerId) {
        self.feed.unlisten(id)
    }

    /// Releases every feed listener.
    pub fn shutdown(&self) {
        info!("Shutting down ledger");
        self.feed.shutdown();
    }
}
