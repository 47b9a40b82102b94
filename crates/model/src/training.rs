use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::ids::{MemberId, SessionId, TrainingId};

/// A weekly training: a signup form offering one or more sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Training {
    pub id: TrainingId,
    pub title: String,
    pub opens: DateTime<Utc>,
    pub closes: DateTime<Utc>,
    pub notes: String,
    pub sessions: Vec<TrainingSession>,
    pub feedback: Vec<String>,
    pub open_to_public: bool,
    pub use_inter_sem_members: bool,
    /// Store version the training was read at. Zero for a training that was never stored.
    pub version: u64,
}

impl Training {
    pub fn new(
        id: TrainingId,
        title: String,
        opens: DateTime<Utc>,
        closes: DateTime<Utc>,
        sessions: Vec<TrainingSession>,
    ) -> Training {
        Training {
            id,
            title,
            opens,
            closes,
            notes: String::new(),
            sessions,
            feedback: Vec::new(),
            open_to_public: false,
            use_inter_sem_members: false,
            version: 0,
        }
    }

    pub fn session(&self, id: &SessionId) -> Option<&TrainingSession> {
        self.sessions.iter().find(|session| &session.id == id)
    }

    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut TrainingSession> {
        self.sessions.iter_mut().find(|session| &session.id == id)
    }

    /// Session the member is currently signed up to.
    pub fn find_member(&self, member: &MemberId) -> Option<&SessionId> {
        self.sessions
            .iter()
            .find(|session| session.members.contains_key(member))
            .map(|session| &session.id)
    }

    /// Drops the member from every session and returns the sessions it was removed from.
    pub fn remove_member(&mut self, member: &MemberId) -> Vec<SessionId> {
        self.sessions
            .iter_mut()
            .filter_map(|session| session.remove(member).map(|_| session.id.clone()))
            .collect()
    }

    /// Stores the feedback verbatim. Only an empty string is ignored.
    pub fn add_feedback(&mut self, feedback: &str) -> bool {
        if feedback.is_empty() {
            return false;
        }
        self.feedback.push(feedback.to_owned());
        true
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.opens <= now && now <= self.closes
    }

    pub fn signups(&self) -> usize {
        self.sessions.iter().map(|session| session.members.len()).sum()
    }
}

/// A capacity-limited slot of a training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub id: SessionId,
    pub title: String,
    /// Negative means unlimited.
    pub limit: i64,
    pub trainers: Vec<String>,
    pub members: BTreeMap<MemberId, SignupEntry>,
}

impl TrainingSession {
    pub fn new(id: SessionId, title: String, limit: i64) -> TrainingSession {
        TrainingSession {
            id,
            title,
            limit,
            trainers: Vec::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit < 0
    }

    pub fn is_full(&self) -> bool {
        !self.is_unlimited() && self.members.len() as i64 >= self.limit
    }

    pub fn free_places(&self) -> Option<usize> {
        if self.is_unlimited() {
            return None;
        }
        Some((self.limit as usize).saturating_sub(self.members.len()))
    }

    pub fn insert(&mut self, member: MemberId, entry: SignupEntry) -> Option<SignupEntry> {
        self.members.insert(member, entry)
    }

    pub fn remove(&mut self, member: &MemberId) -> Option<SignupEntry> {
        self.members.remove(member)
    }
}

/// A member's reservation. The name is a copy taken at signup time and is not
/// refreshed when the member renames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupEntry {
    pub name: String,
    pub time_added: DateTime<Utc>,
}

impl SignupEntry {
    pub fn new(name: impl Into<String>, time_added: DateTime<Utc>) -> SignupEntry {
        SignupEntry {
            name: name.into(),
            time_added,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 5, 11, hour, 0, 0)
            .single()
            .unwrap()
    }

    fn training() -> Training {
        let mut mon = TrainingSession::new("mon-beg".into(), "Monday beginners".to_owned(), 2);
        mon.insert("u1".into(), SignupEntry::new("Alice", at(9)));
        let wed = TrainingSession::new("wed-adv".into(), "Wednesday advanced".to_owned(), -1);
        Training::new("T1".into(), "Week 1".to_owned(), at(8), at(20), vec![mon, wed])
    }

    #[test]
    fn test_find_member() {
        let training = training();
        assert_eq!(
            training.find_member(&"u1".into()),
            Some(&SessionId::from("mon-beg"))
        );
        assert_eq!(training.find_member(&"u2".into()), None);
    }

    #[test]
    fn test_remove_member_everywhere() {
        let mut training = training();
        training
            .session_mut(&"wed-adv".into())
            .unwrap()
            .insert("u1".into(), SignupEntry::new("Alice", at(10)));

        let removed = training.remove_member(&"u1".into());
        assert_eq!(removed, vec![SessionId::from("mon-beg"), SessionId::from("wed-adv")]);
        assert_eq!(training.signups(), 0);
        assert!(training.remove_member(&"u1".into()).is_empty());
    }

    #[test]
    fn test_capacity() {
        let mut training = training();
        let mon = training.session_mut(&"mon-beg".into()).unwrap();
        assert!(!mon.is_full());
        assert_eq!(mon.free_places(), Some(1));
        mon.insert("u2".into(), SignupEntry::new("Bob", at(10)));
        assert!(mon.is_full());
        assert_eq!(mon.free_places(), Some(0));

        let wed = training.session(&"wed-adv".into()).unwrap();
        assert!(wed.is_unlimited());
        assert!(!wed.is_full());
        assert_eq!(wed.free_places(), None);
    }

    #[test]
    fn test_zero_limit_is_always_full() {
        let session = TrainingSession::new("closed".into(), String::new(), 0);
        assert!(session.is_full());
    }

    #[test]
    fn test_feedback() {
        let mut training = training();
        assert!(!training.add_feedback(""));
        assert!(training.add_feedback(" more sparring "));
        assert!(training.add_feedback("   "));
        assert_eq!(
            training.feedback,
            vec![" more sparring ".to_owned(), "   ".to_owned()]
        );
    }

    #[test]
    fn test_is_open() {
        let training = training();
        assert!(!training.is_open(at(7)));
        assert!(training.is_open(at(8)));
        assert!(training.is_open(at(20)));
        assert!(!training.is_open(at(21)));
    }
}
