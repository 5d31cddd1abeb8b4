//! Request envelope: the JSON body carried on the request queue.
//!
//! Action fields sit at the top level next to `action`; transport metadata
//! travels in a reserved `_transport` object:
//!
//! ```json
//! { "action": "login", "email": "a@x.com", "password": "…",
//!   "_transport": { "correlation_id": "…", "reply_to": "reply.…" } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the reserved transport block inside a request body.
pub const TRANSPORT_KEY: &str = "_transport";

/// Well-known action names.
pub mod actions {
    pub const SIGNUP: &str = "signup";
    pub const LOGIN: &str = "login";
}

/// Correlation and reply addressing attached by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl Transport {
    pub fn new(correlation_id: impl Into<String>, reply_to: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            reply_to: Some(reply_to.into()),
        }
    }

    /// `(correlation_id, reply_to)` when both are present and non-empty.
    /// Anything else is fire-and-forget.
    pub fn reply_address(&self) -> Option<(&str, &str)> {
        let correlation_id = self.correlation_id.as_deref().filter(|s| !s.is_empty())?;
        let reply_to = self.reply_to.as_deref().filter(|s| !s.is_empty())?;
        Some((correlation_id, reply_to))
    }
}

/// Raw signup fields. `username` is the legacy spelling of `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupFields {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl SignupFields {
    /// Display name, preferring `name` over `username`.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.username.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginFields {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// A request decoded into the known action set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Signup(SignupFields),
    Login(LoginFields),
    /// Any action without a handler. Carries the action as received.
    Unknown { action: String },
}

impl Request {
    pub fn action(&self) -> &str {
        match self {
            Self::Signup(_) => actions::SIGNUP,
            Self::Login(_) => actions::LOGIN,
            Self::Unknown { action } => action,
        }
    }
}

/// A decoded request plus its transport block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub request: Request,
    pub transport: Transport,
}

/// Bodies that cannot be dispatched at all. These are dropped without a reply.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("body is not a JSON object")]
    NotAnObject,
    #[error("'action' missing")]
    MissingAction,
}

impl Inbound {
    /// Decode a request body.
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };

        let action = match fields.remove("action") {
            None | Some(Value::Null) => return Err(EnvelopeError::MissingAction),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };

        // A malformed transport block only loses the ability to reply.
        let transport = fields
            .remove(TRANSPORT_KEY)
            .and_then(|v| serde_json::from_value::<Transport>(v).ok())
            .unwrap_or_default();

        let request = match action.as_str() {
            actions::SIGNUP => Request::Signup(SignupFields {
                name: text_field(&fields, "name"),
                username: text_field(&fields, "username"),
                email: text_field(&fields, "email"),
                password: text_field(&fields, "password"),
            }),
            actions::LOGIN => Request::Login(LoginFields {
                email: text_field(&fields, "email"),
                password: text_field(&fields, "password"),
            }),
            _ => Request::Unknown { action },
        };

        Ok(Self { request, transport })
    }
}

/// Non-empty string value of `key`. Missing, empty and non-string values
/// all read as absent.
fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a request body for `action`. Any `action` or `_transport` keys in
/// `fields` are overwritten.
pub fn encode(action: &str, mut fields: Map<String, Value>, transport: &Transport) -> Vec<u8> {
    fields.insert("action".to_string(), Value::String(action.to_string()));
    fields.insert(
        TRANSPORT_KEY.to_string(),
        serde_json::json!({
            "correlation_id": transport.correlation_id,
            "reply_to": transport.reply_to,
        }),
    );
    // A map of JSON values always serializes.
    serde_json::to_vec(&Value::Object(fields)).unwrap_or_default()
}

/// Fresh correlation identifier.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
