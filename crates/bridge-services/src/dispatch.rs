//! Routes decoded requests to their handlers and turns every outcome into a
//! `Response`.
//!
//! Per request: reject unknown actions, acquire a store connection from the
//! failover pool, then let the handler check its fields and run. Only an
//! unknown action is answered without touching the store, so a dead store
//! always surfaces as "all nodes failed". Errors never escape `dispatch`.

use bridge_core::request::{LoginFields, SignupFields};
use bridge_core::{ErrorCode, Request, Response};
use serde_json::json;

use crate::credentials::{CredentialError, CredentialHasher};
use crate::pool::{AcquireError, HostFailoverPool};
use crate::store::{NewUser, StoreConnection, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Missing signup fields")]
    MissingSignupFields,
    #[error("All DB nodes failed. Cannot process request.")]
    AllNodesFailed(#[from] AcquireError),
    #[error("User already exists")]
    AlreadyExists,
    /// Unknown email and wrong password both end here.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Server error: {0}")]
    Store(#[from] StoreError),
    #[error("Server error: {0}")]
    Credentials(#[from] CredentialError),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownAction(_) => ErrorCode::UnknownAction,
            Self::MissingSignupFields => ErrorCode::MissingFields,
            Self::AllNodesFailed(_) => ErrorCode::AllNodesFailed,
            Self::AlreadyExists => ErrorCode::AlreadyExists,
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::Store(_) | Self::Credentials(_) => ErrorCode::StoreFailure,
        }
    }

    pub fn into_response(self) -> Response {
        Response::error(self.code(), self.to_string())
    }
}

struct Signup {
    name: String,
    email: String,
    password: String,
}

struct Login {
    email: String,
    password: String,
}

impl TryFrom<SignupFields> for Signup {
    type Error = DispatchError;

    fn try_from(fields: SignupFields) -> Result<Self, Self::Error> {
        let name = fields.display_name().map(str::to_string);
        match (name, fields.email, fields.password) {
            (Some(name), Some(email), Some(password)) => Ok(Self {
                name,
                email,
                password,
            }),
            _ => Err(DispatchError::MissingSignupFields),
        }
    }
}

// A missing email or password is just a login that cannot succeed.
impl From<LoginFields> for Login {
    fn from(fields: LoginFields) -> Self {
        Self {
            email: fields.email.unwrap_or_default(),
            password: fields.password.unwrap_or_default(),
        }
    }
}

pub struct Dispatcher {
    pool: HostFailoverPool,
    hasher: CredentialHasher,
}

impl Dispatcher {
    pub fn new(pool: HostFailoverPool, hasher: CredentialHasher) -> Self {
        Self { pool, hasher }
    }

    pub fn pool(&self) -> &HostFailoverPool {
        &self.pool
    }

    /// Run `request` to completion. The response has no correlation id yet.
    pub async fn dispatch(&self, request: Request) -> Response {
        let action = request.action().to_string();
        match self.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                match e.code() {
                    ErrorCode::AllNodesFailed | ErrorCode::StoreFailure => {
                        tracing::error!(action = %action, error = %e, "request failed")
                    }
                    _ => tracing::debug!(action = %action, error = %e, "request rejected"),
                }
                e.into_response()
            }
        }
    }

    async fn execute(&self, request: Request) -> Result<Response, DispatchError> {
        match request {
            Request::Unknown { action } => Err(DispatchError::UnknownAction(action)),
            Request::Signup(fields) => {
                let mut conn = self.pool.acquire().await?;
                self.signup(Signup::try_from(fields)?, conn.as_mut()).await
            }
            Request::Login(fields) => {
                let mut conn = self.pool.acquire().await?;
                self.login(Login::from(fields), conn.as_mut()).await
            }
        }
    }

    async fn signup(
        &self,
        signup: Signup,
        conn: &mut dyn StoreConnection,
    ) -> Result<Response, DispatchError> {
        let password_hash = self.hasher.hash(signup.password).await?;
        let user = NewUser {
            name: signup.name,
            email: signup.email,
            password_hash,
        };
        match conn.insert_user(&user).await {
            Ok(id) => {
                tracing::info!(user_id = id, "user registered");
                Ok(Response::success("Signup successful"))
            }
            Err(StoreError::DuplicateEmail(_)) => Err(DispatchError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn login(
        &self,
        login: Login,
        conn: &mut dyn StoreConnection,
    ) -> Result<Response, DispatchError> {
        let user = match login.email.as_str() {
            "" => None,
            email => conn.find_by_email(email).await?,
        };
        let stored = user.as_ref().map(|u| u.password_hash.clone());
        let verified = self.hasher.verify(login.password, stored).await?;

        match user {
            Some(user) if verified => {
                tracing::info!(user_id = user.id, "login succeeded");
                let public = user.public();
                Ok(Response::success("Login successful").with_data(json!({
                    "id": public.id,
                    "name": public.name,
                    "email": public.email,
                })))
            }
            _ => Err(DispatchError::InvalidCredentials),
        }
    }
}
