//! Password hashing. Argon2id with fixed parameters; the cost is a property
//! of the deployment, never of the request.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

const MEMORY_KIB: u32 = 19_456;
const ITERATIONS: u32 = 2;
const LANES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid hashing parameters: {0}")]
    Params(argon2::Error),
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Shared hasher. Hashing and verification run on the blocking pool.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Arc<Argon2<'static>>,
    // Verified against when the email is unknown, so both login failures
    // cost one verification.
    decoy_hash: Arc<str>,
}

impl CredentialHasher {
    pub fn new() -> Result<Self, CredentialError> {
        let params =
            Params::new(MEMORY_KIB, ITERATIONS, LANES, None).map_err(CredentialError::Params)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy_hash = hash_with(&argon2, "decoy-password-never-matches")?;
        Ok(Self {
            argon2: Arc::new(argon2),
            decoy_hash: decoy_hash.into(),
        })
    }

    /// Salted PHC hash string of `password`.
    pub async fn hash(&self, password: String) -> Result<String, CredentialError> {
        let argon2 = self.argon2.clone();
        tokio::task::spawn_blocking(move || hash_with(&argon2, &password)).await?
    }

    /// Check `password` against `stored`. `None` verifies against the decoy
    /// and always fails. Unparseable stored hashes fail verification.
    pub async fn verify(
        &self,
        password: String,
        stored: Option<String>,
    ) -> Result<bool, CredentialError> {
        let argon2 = self.argon2.clone();
        let known = stored.is_some();
        let stored = stored.unwrap_or_else(|| self.decoy_hash.to_string());
        let matched = tokio::task::spawn_blocking(move || match PasswordHash::new(&stored) {
            Ok(parsed) => argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is not a PHC string");
                false
            }
        })
        .await?;
        Ok(known && matched)
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(CredentialError::Hash)
}
