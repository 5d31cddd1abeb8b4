//! bridge-services: everything between a queue message and a reply.
//!
//! The worker side is `Worker` → `HostFailoverPool` + `Dispatcher` →
//! `ReplyRouter`; the caller side is `Gateway`. Both talk to a `Broker`.

pub mod broker;
pub mod credentials;
pub mod dispatch;
pub mod gateway;
pub mod pool;
pub mod reply;
pub mod store;
pub mod worker;

pub use broker::{Broker, BrokerError, Durability, MemoryBroker, SqliteBroker};
pub use credentials::{CredentialError, CredentialHasher};
pub use dispatch::{DispatchError, Dispatcher};
pub use gateway::{Gateway, RetryPolicy};
pub use pool::{AcquireError, HostFailoverPool};
pub use reply::ReplyRouter;
pub use store::{
    MemoryConnector, MemoryCredentialStore, MySqlConnector, NewUser, StoreConnection,
    StoreConnector, StoreError, UserRecord,
};
pub use worker::Worker;
