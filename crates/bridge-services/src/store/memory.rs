use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_core::config::StoreConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{NewUser, StoreConnection, StoreConnector, StoreError, UserRecord};

/// In-memory credential store. Email uniqueness is enforced by the map's
/// entry lock, the same way a unique index serializes racing inserts.
#[derive(Clone)]
pub struct MemoryCredentialStore {
    users: Arc<DashMap<String, UserRecord>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, email: &str) -> Option<UserRecord> {
        self.users.get(email).map(|u| u.clone())
    }

    fn insert(&self, user: &NewUser) -> Result<i64, StoreError> {
        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail(user.email.clone())),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                slot.insert(UserRecord {
                    id,
                    name: user.name.clone(),
                    email: user.email.clone(),
                    password_hash: user.password_hash.clone(),
                });
                Ok(id)
            }
        }
    }
}

struct MemoryConnection {
    store: MemoryCredentialStore,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn insert_user(&mut self, user: &NewUser) -> Result<i64, StoreError> {
        self.store.insert(user)
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.store.get(email))
    }
}

/// Connector over a shared `MemoryCredentialStore`. Hosts can be marked
/// unreachable or stalled, and every attempt is recorded in order.
#[derive(Clone)]
pub struct MemoryConnector {
    store: MemoryCredentialStore,
    /// `None` = every host answers.
    reachable: Option<Arc<HashSet<String>>>,
    stalled: Arc<HashSet<String>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl MemoryConnector {
    pub fn new(store: MemoryCredentialStore) -> Self {
        Self {
            store,
            reachable: None,
            stalled: Arc::new(HashSet::new()),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Only these hosts accept connections; all others refuse immediately.
    pub fn with_reachable<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reachable = Some(Arc::new(hosts.into_iter().map(Into::into).collect()));
        self
    }

    /// These hosts never answer, so only the pool's timeout ends the attempt.
    pub fn with_stalled<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stalled = Arc::new(hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Hosts tried so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn store(&self) -> &MemoryCredentialStore {
        &self.store
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(
        &self,
        host: &str,
        _config: &StoreConfig,
    ) -> Result<Box<dyn StoreConnection>, StoreError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(host.to_string());
        }
        if self.stalled.contains(host) {
            std::future::pending::<()>().await;
        }
        let reachable = self.reachable.as_ref().map_or(true, |r| r.contains(host));
        if !reachable {
            return Err(StoreError::Connect(format!("{host}: connection refused")));
        }
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
        }))
    }
}
