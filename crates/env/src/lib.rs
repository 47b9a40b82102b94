use std::{collections::HashMap, env::vars, sync::Arc};

use dotenv::dotenv;
use eyre::{bail, eyre, Error};
use log::info;

const DEFAULT_DB_NAME: &str = "ledger_db";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Mongo,
    Memory,
}

#[derive(Clone)]
pub struct Env(Arc<EnvInner>);

#[derive(Clone)]
pub struct EnvInner {
    store: StoreKind,
    mongo_url: Option<String>,
    db_name: String,
    rust_log: Option<String>,
    capacity_policy: Option<String>,
    write_mode: Option<String>,
    move_mode: Option<String>,
    conflict_retries: Option<String>,
    store_timeout_ms: Option<String>,
}

impl Env {
    pub fn store(&self) -> StoreKind {
        self.0.store
    }

    pub fn mongo_url(&self) -> Result<&str, Error> {
        self.0
            .mongo_url
            .as_deref()
            .ok_or_else(|| eyre!("MONGO_URL is not set"))
    }

    pub fn db_name(&self) -> &str {
        &self.0.db_name
    }

    pub fn rust_log(&self) -> Option<&str> {
        self.0.rust_log.as_deref()
    }

    pub fn capacity_policy(&self) -> Option<&str> {
        self.0.capacity_policy.as_deref()
    }

    pub fn write_mode(&self) -> Option<&str> {
        self.0.write_mode.as_deref()
    }

    pub fn move_mode(&self) -> Option<&str> {
        self.0.move_mode.as_deref()
    }

    pub fn conflict_retries(&self) -> Option<&str> {
        self.0.conflict_retries.as_deref()
    }

    pub fn store_timeout_ms(&self) -> Option<&str> {
        self.0.store_timeout_ms.as_deref()
    }

    /// Loads `.env` (if present) into the process environment and reads it.
    pub fn load() -> Result<Env, Error> {
        if let Err(err) = dotenv() {
            info!("Failed to load .env file: {}", err);
        }
        Env::from_vars(vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Env, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();

        let store = match vars.remove("STORE").as_deref() {
            None | Some("mongo") => StoreKind::Mongo,
            Some("memory") => StoreKind::Memory,
            Some(other) => bail!("STORE must be `mongo` or `memory`, got `{}`", other),
        };
        let mongo_url = vars.remove("MONGO_URL");
        if store == StoreKind::Mongo && mongo_url.is_none() {
            bail!("MONGO_URL is not set");
        }

        Ok(Env(Arc::new(EnvInner {
            store,
            mongo_url,
            db_name: vars
                .remove("DB_NAME")
                .unwrap_or_else(|| DEFAULT_DB_NAME.to_owned()),
            rust_log: vars.remove("RUST_LOG"),
            capacity_policy: vars.remove("CAPACITY_POLICY"),
            write_mode: vars.remove("WRITE_MODE"),
            move_mode: vars.remove("MOVE_MODE"),
            conflict_retries: vars.remove("CONFLICT_RETRIES"),
            store_timeout_ms: vars.remove("STORE_TIMEOUT_MS"),
        })))
    }
}
