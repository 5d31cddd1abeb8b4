//! bridge-core: configuration and wire envelopes shared by the worker,
//! the gateway and the command-line client.

pub mod config;
pub mod request;
pub mod response;

pub use request::{Inbound, Request, Transport};
pub use response::{ErrorCode, PublicUser, Response, Status};
