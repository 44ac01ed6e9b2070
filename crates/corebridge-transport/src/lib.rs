//! Transport abstraction layer for corebridge.
//!
//! The core service is reached through a publish/subscribe broker. This
//! crate only fixes the contract the client relies on:
//!
//! - a [`Connection`] opens [`Session`]s and can be closed,
//! - a session creates [`Sender`]s and [`Receiver`]s bound to an
//!   [`Address`],
//! - a receiver fetches the next [`Message`] with a timeout.
//!
//! # Feature Flags
//!
//! - `memory` (default): a process-local broker ([`MemoryBroker`]) used
//!   for tests and for embedding a core service in the same process.

#![allow(async_fn_in_trait)]

mod address;
mod error;
#[cfg(feature = "memory")]
mod memory;

pub use address::{Address, DIRECT_EXCHANGE, QueueDefinition, Routing, TOPIC_EXCHANGE};
pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryBroker, MemoryConnection, MemoryReceiver, MemorySender, MemorySession};

use std::collections::BTreeMap;
use std::time::Duration;

/// A message travelling through the broker: text content plus string
/// properties (headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// The message body.
    pub content: String,
    /// Application properties, readable without parsing the body.
    pub properties: BTreeMap<String, String>,
}

impl Message {
    /// Creates a message with the given body and no properties.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Sets a property, returning the message for chaining.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Looks up a property by name.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// An open connection to the broker.
pub trait Connection: Send + Sync + 'static {
    /// The session type produced by this connection.
    type Session: Session;

    /// Opens a new session on this connection.
    async fn create_session(&self) -> Result<Self::Session, TransportError>;

    /// Closes the connection. Closing an already-closed connection is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// Returns `true` while the connection is open.
    fn is_open(&self) -> bool;
}

/// A session groups senders and receivers on one connection.
pub trait Session: Send + Sync + 'static {
    /// The sender type produced by this session.
    type Sender: Sender;
    /// The receiver type produced by this session.
    type Receiver: Receiver;

    /// Creates a sender publishing to `address`.
    async fn create_sender(&self, address: &Address) -> Result<Self::Sender, TransportError>;

    /// Creates a receiver consuming from `address`, creating the queue if
    /// the address asks for it.
    async fn create_receiver(&self, address: &Address) -> Result<Self::Receiver, TransportError>;
}

/// Publishes messages to a fixed address.
pub trait Sender: Send + Sync + 'static {
    /// Sends one message.
    async fn send(&self, message: Message) -> Result<(), TransportError>;
}

/// Consumes messages from a fixed address.
pub trait Receiver: Send + Sync + 'static {
    /// Waits up to `timeout` for the next message.
    ///
    /// Returns [`TransportError::NoMessage`] when nothing arrives in time
    /// and [`TransportError::ResourceDeleted`] when the queue is deleted
    /// underneath the receiver.
    async fn fetch(&self, timeout: Duration) -> Result<Message, TransportError>;

    /// Releases the receiver. Closing twice is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// Returns `true` once the receiver has been closed.
    fn is_closed(&self) -> bool;

    /// The address this receiver consumes from.
    fn address(&self) -> &Address;
}
