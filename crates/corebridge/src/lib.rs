//! # corebridge
//!
//! Schema-driven client for calling remote services through the core's
//! message broker.
//!
//! A [`CoreClient`] takes a [`TypeRegistry`](corebridge_schema::TypeRegistry)
//! loaded from the service schema and a transport
//! [`Connection`](corebridge_transport::Connection), and turns
//! `invoke(session, service, function, params)` into an envelope on the
//! core's inbound queue, then waits for the reply (and data payload) on
//! queues scoped to the session.
//!
//! ## Layers
//!
//! ```text
//! corebridge            CoreClient, sessions, CoreError
//!   └─ corebridge-protocol   envelopes, graph codec
//!        └─ corebridge-schema     type registry, Value
//!   └─ corebridge-transport  Connection / Session / Sender / Receiver
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use corebridge::prelude::*;
//!
//! # async fn run() -> Result<(), CoreError> {
//! let registry = Arc::new(TypeRegistry::load(&DirectorySource::new("api"))?);
//! let client = CoreClient::connect(MemoryBroker::new().connect(), registry, ClientConfig::default()).await?;
//!
//! client.initiate_session("my-session").await?;
//! let entries = client
//!     .invoke(
//!         "my-session",
//!         "SyndicationService",
//!         "fetchLatest",
//!         [("maxEntries", Value::from(5)), ("feedUrl", Value::from("http://example.org/rss"))],
//!     )
//!     .await?;
//! client.end_session("my-session").await?;
//! client.close().await?;
//! # let _ = entries;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod session;
mod subscriber;

pub use client::{CoreClient, CoreClientBuilder, DataReply};
pub use config::{ClientConfig, DEFAULT_TIMEOUT_MS};
pub use error::CoreError;
pub use session::SessionRecord;
pub use subscriber::CoreSubscriber;

/// Re-exports for applications: the client, the schema and value model,
/// the envelope types and the transport contract.
pub mod prelude {
    pub use crate::{ClientConfig, CoreClient, CoreClientBuilder, CoreError, DataReply, SessionRecord};

    pub use corebridge_protocol::{CoreMessage, ErrorType, Fault, MessageBody, MessageType, ResponseStatus};
    pub use corebridge_schema::{
        DirectorySource, HostBindings, Object, ObjectRef, SchemaDocument, SchemaSource, TypeRegistry,
        Value,
    };
    pub use corebridge_transport::{Connection, MemoryBroker, Receiver, Sender, Session};
}
