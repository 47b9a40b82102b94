use std::time::Duration;

use env::Env;
use eyre::{Context as _, Result};
use strum::{Display, EnumString};

/// Whether a session's limit is checked when members sign up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CapacityPolicy {
    /// Limits are only shown to the UI, signups are never rejected for them.
    #[default]
    Advisory,
    /// A signup into a full session fails with `SessionFull`.
    Enforced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum WriteMode {
    /// Writes carry the version that was read and fail on mismatch.
    #[default]
    Optimistic,
    /// Blind overwrites. Concurrent signups can be lost.
    LastWriteWins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MoveMode {
    /// One write moves the member.
    #[default]
    Atomic,
    /// Sign up to the target session, then remove from the source one.
    TwoPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    pub capacity_policy: CapacityPolicy,
    pub write_mode: WriteMode,
    pub move_mode: MoveMode,
    /// How many times the ledger retries an operation that hit a write conflict.
    pub conflict_retries: u32,
    pub store_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            capacity_policy: CapacityPolicy::default(),
            write_mode: WriteMode::default(),
            move_mode: MoveMode::default(),
            conflict_retries: 3,
            store_timeout: Duration::from_secs(10),
        }
    }
}

impl LedgerConfig {
    pub fn from_env(env: &Env) -> Result<LedgerConfig> {
        let mut config = LedgerConfig::default();
        if let Some(policy) = env.capacity_policy() {
            config.capacity_policy = policy
                .parse()
                .with_context(|| format!("Invalid CAPACITY_POLICY: {}", policy))?;
        }
        if let Some(mode) = env.write_mode() {
            config.write_mode = mode
                .parse()
                .with_context(|| format!("Invalid WRITE_MODE: {}", mode))?;
        }
        if let Some(mode) = env.move_mode() {
            config.move_mode = mode
                .parse()
                .with_context(|| format!("Invalid MOVE_MODE: {}", mode))?;
        }
        if let Some(retries) = env.conflict_retries() {
            config.conflict_retries = retries
                .parse()
                .with_context(|| format!("Invalid CONFLICT_RETRIES: {}", retries))?;
        }
        if let Some(timeout) = env.store_timeout_ms() {
            let millis: u64 = timeout
                .parse()
                .with_context(|| format!("Invalid STORE_TIMEOUT_MS: {}", timeout))?;
            config.store_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let env = Env::from_vars([("STORE", "memory")]).unwrap();
        assert_eq!(LedgerConfig::from_env(&env).unwrap(), LedgerConfig::default());
    }

    #[test]
    fn test_parse_config() {
        let env = Env::from_vars([
            ("STORE", "memory"),
            ("CAPACITY_POLICY", "enforced"),
            ("WRITE_MODE", "last_write_wins"),
            ("MOVE_MODE", "two_phase"),
            ("CONFLICT_RETRIES", "0"),
            ("STORE_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        let config = LedgerConfig::from_env(&env).unwrap();
        assert_eq!(config.capacity_policy, CapacityPolicy::Enforced);
        assert_eq!(config.write_mode, WriteMode::LastWriteWins);
        assert_eq!(config.move_mode, MoveMode::TwoPhase);
        assert_eq!(config.conflict_retries, 0);
        assert_eq!(config.store_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_config() {
        let env = Env::from_vars([("STORE", "memory"), ("WRITE_MODE", "yolo")]).unwrap();
        assert!(LedgerConfig::from_env(&env).is_err());
        let env = Env::from_vars([("STORE", "memory"), ("CONFLICT_RETRIES", "-1")]).unwrap();
        assert!(LedgerConfig::from_env(&env).is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        assert_eq!(WriteMode::LastWriteWins.to_string(), "last_write_wins");
        assert_eq!("two_phase".parse::<MoveMode>().unwrap(), MoveMode::TwoPhase);
    }
}
