//! Credential store: user records keyed by unique email.
//!
//! A `StoreConnector` opens a `StoreConnection` to one named host; the
//! `HostFailoverPool` decides which host. Connections are per request and
//! never shared.

mod memory;
mod mysql;

pub use memory::{MemoryConnector, MemoryCredentialStore};
pub use mysql::MySqlConnector;

use async_trait::async_trait;
use bridge_core::config::StoreConfig;
use bridge_core::PublicUser;

/// A stored user. `password_hash` never leaves the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl UserRecord {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Insert payload. The hash is computed before the store sees the user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The unique-email constraint rejected an insert.
    #[error("a user with email {0} already exists")]
    DuplicateEmail(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait StoreConnection: Send {
    /// Insert a user. Racing inserts for one email are resolved by the store:
    /// exactly one succeeds, the rest see `DuplicateEmail`.
    async fn insert_user(&mut self, user: &NewUser) -> Result<i64, StoreError>;

    /// Exact-match lookup.
    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Create the users table if the backend needs one.
    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a connection to `host`. The pool bounds how long this may take.
    async fn connect(
        &self,
        host: &str,
        config: &StoreConfig,
    ) -> Result<Box<dyn StoreConnection>, StoreError>;
}
