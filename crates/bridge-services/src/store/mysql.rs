//! MySQL credential store over `sqlx`.
//!
//! Expected schema (created by `bridged --init-schema`):
//!
//! ```sql
//! CREATE TABLE users (
//!     id       INT AUTO_INCREMENT PRIMARY KEY,
//!     name     VARCHAR(255) NOT NULL,
//!     email    VARCHAR(255) NOT NULL UNIQUE,
//!     password VARCHAR(255) NOT NULL
//! );
//! ```

use async_trait::async_trait;
use bridge_core::config::StoreConfig;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Row};

use super::{NewUser, StoreConnection, StoreConnector, StoreError, UserRecord};

const CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
    id       INT AUTO_INCREMENT PRIMARY KEY,
    name     VARCHAR(255) NOT NULL,
    email    VARCHAR(255) NOT NULL UNIQUE,
    password VARCHAR(255) NOT NULL
)";

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    fn options(host: &str, config: &StoreConfig) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .charset("utf8mb4")
    }
}

#[async_trait]
impl StoreConnector for MySqlConnector {
    async fn connect(
        &self,
        host: &str,
        config: &StoreConfig,
    ) -> Result<Box<dyn StoreConnection>, StoreError> {
        let conn = Self::options(host, config)
            .connect()
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        Ok(Box::new(MySqlStoreConnection { conn }))
    }
}

struct MySqlStoreConnection {
    conn: MySqlConnection,
}

#[async_trait]
impl StoreConnection for MySqlStoreConnection {
    async fn insert_user(&mut self, user: &NewUser) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO users (name, email, password) VALUES (?, ?, ?)")
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&mut self.conn)
            .await;
        match result {
            Ok(done) => Ok(done.last_insert_id() as i64),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateEmail(user.email.clone()))
            }
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT CAST(id AS SIGNED) AS id, name, email, password
             FROM users WHERE email = ? LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&mut self.conn)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(|r| -> Result<UserRecord, sqlx::Error> {
            Ok(UserRecord {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                email: r.try_get("email")?,
                password_hash: r.try_get("password")?,
            })
        })
        .transpose()
        .map_err(|e| StoreError::Query(e.to_string()))
    }

    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        sqlx::query(CREATE_USERS)
            .execute(&mut self.conn)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}
