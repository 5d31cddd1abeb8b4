//! SQLite-backed broker. One database file holds every queue; any number
//! of worker and gateway processes may open it at once.
//!
//! A claim is a single `DELETE … RETURNING` statement, so SQLite's write
//! lock guarantees each message leaves the table exactly once.
//!
//! Transient queues record when they were last consumed from. A gateway
//! that died without deleting its reply queue leaves a row whose
//! `last_seen` stops moving; the next declaration past the TTL removes it
//! and whatever late replies piled up in it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{Broker, BrokerError, Durability, DEFAULT_TRANSIENT_TTL};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS queues (
    name        TEXT PRIMARY KEY,
    durable     INTEGER NOT NULL,
    declared_at INTEGER NOT NULL,
    last_seen   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    queue       TEXT NOT NULL,
    body        BLOB NOT NULL,
    enqueued_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_by_queue ON messages (queue, seq);
";

/// Concurrent writers from other processes wait this long for the lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteBroker {
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
    transient_ttl: Duration,
    path: PathBuf,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl SqliteBroker {
    /// Open (creating if needed) the queue database at `path`.
    pub fn open(path: &Path, poll_interval: Duration) -> Result<Self, BrokerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BrokerError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "queue database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval,
            transient_ttl: DEFAULT_TRANSIENT_TTL,
            path: path.to_path_buf(),
        })
    }

    pub fn with_transient_ttl(mut self, ttl: Duration) -> Self {
        self.transient_ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages waiting in `queue`.
    pub async fn pending(&self, queue: &str) -> Result<usize, BrokerError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE queue = ?1",
                params![queue],
                |row| row.get::<_, i64>(0),
            )
        })
        .await
        .map(|n| n as usize)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, BrokerError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| BrokerError::Unavailable("queue connection poisoned".into()))?;
            f(&guard).map_err(BrokerError::from)
        })
        .await?
    }

    /// Mark `queue` as having a live consumer. Durable queues never expire,
    /// so only transient rows are written.
    async fn touch(&self, queue: &str) -> Result<(), BrokerError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE queues SET last_seen = ?2 WHERE name = ?1 AND durable = 0",
                params![queue, now_ms()],
            )
        })
        .await?;
        Ok(())
    }

    async fn claim(&self, queue: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "DELETE FROM messages
                 WHERE seq = (SELECT seq FROM messages WHERE queue = ?1 ORDER BY seq LIMIT 1)
                 RETURNING body",
                params![queue],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
        .await
    }
}

#[async_trait]
impl Broker for SqliteBroker {
    async fn declare_queue(&self, queue: &str, durability: Durability) -> Result<(), BrokerError> {
        let queue = queue.to_string();
        let durable = matches!(durability, Durability::Durable);
        let ttl_ms = self.transient_ttl.as_millis() as i64;
        let purged = self
            .with_conn(move |conn| {
                let now = now_ms();
                let cutoff = now - ttl_ms;
                conn.execute_batch("BEGIN IMMEDIATE")?;
                let result = (|| -> rusqlite::Result<usize> {
                    conn.execute(
                        "DELETE FROM messages WHERE queue IN
                           (SELECT name FROM queues WHERE durable = 0 AND last_seen < ?1)",
                        params![cutoff],
                    )?;
                    let purged = conn.execute(
                        "DELETE FROM queues WHERE durable = 0 AND last_seen < ?1",
                        params![cutoff],
                    )?;
                    conn.execute(
                        "INSERT INTO queues (name, durable, declared_at, last_seen)
                         VALUES (?1, ?2, ?3, ?3)
                         ON CONFLICT(name) DO UPDATE SET last_seen = excluded.last_seen",
                        params![queue, durable, now],
                    )?;
                    Ok(purged)
                })();
                match result {
                    Ok(purged) => conn.execute_batch("COMMIT").map(|_| purged),
                    Err(e) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        Err(e)
                    }
                }
            })
            .await?;
        if purged > 0 {
            tracing::info!(purged, "abandoned transient queues purged");
        }
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let queue = queue.to_string();
        self.with_conn(move |conn| {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            let result = conn
                .execute("DELETE FROM messages WHERE queue = ?1", params![queue])
                .and_then(|_| conn.execute("DELETE FROM queues WHERE name = ?1", params![queue]));
            match result {
                Ok(_) => conn.execute_batch("COMMIT"),
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                }
            }
        })
        .await
    }

    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        let name = queue.to_string();
        let inserted = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO messages (queue, body, enqueued_at)
                     SELECT ?1, ?2, ?3 WHERE EXISTS (SELECT 1 FROM queues WHERE name = ?1)",
                    params![name, body, now_ms()],
                )
            })
            .await?;
        if inserted == 0 {
            tracing::debug!(queue, "publish to undeclared queue dropped");
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, wait: Duration) -> Result<Option<Vec<u8>>, BrokerError> {
        let deadline = tokio::time::Instant::now() + wait;
        self.touch(queue).await?;
        loop {
            if let Some(body) = self.claim(queue).await? {
                return Ok(Some(body));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
