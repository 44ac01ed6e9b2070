//! Unified error type for the corebridge client.

use corebridge_protocol::{ErrorType, Fault, ProtocolError};
use corebridge_schema::SchemaError;
use corebridge_transport::TransportError;

/// Everything a client call can fail with.
///
/// The first group is raised locally by the client, the second carries
/// failures the core reported in a reply, and the last wraps the errors
/// of the lower layers. The `#[from]` attributes let `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request had no session id; nothing was sent.
    #[error("a session is required")]
    SessionRequired,

    /// No reply arrived within the configured timeout, or the transport
    /// failed in a way that leaves no reply to wait for.
    #[error("there was no response from server")]
    NoResponse,

    /// The reply queue was deleted while the call was waiting on it.
    #[error("message queue was deleted")]
    QueueDeleted,

    /// The client was closed, or its connection is gone.
    #[error("client is not connected")]
    NotConnected,

    /// The core reported a system failure (error type 1001).
    #[error("system error {0}")]
    System(Fault),

    /// The core rejected the request's input (error type 1002).
    #[error("validation error {0}")]
    Validation(Fault),

    /// The called service failed (error type 1003).
    #[error("service error {0}")]
    Service(Fault),

    /// The core blamed the client (error type 1004).
    #[error("client error {0}")]
    Client(Fault),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl CoreError {
    /// Picks the variant matching the fault's error type.
    pub fn from_fault(fault: Fault) -> Self {
        match fault.error_type {
            ErrorType::System => Self::System(fault),
            ErrorType::Validation => Self::Validation(fault),
            ErrorType::Service => Self::Service(fault),
            ErrorType::Client => Self::Client(fault),
        }
    }

    /// The remote fault, for errors the core reported.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::System(fault)
            | Self::Validation(fault)
            | Self::Service(fault)
            | Self::Client(fault) => Some(fault),
            _ => None,
        }
    }

    /// A short machine-readable code: the fault's own code for remote
    /// failures, a fixed code for the local ones.
    pub fn code(&self) -> &str {
        match self {
            Self::SessionRequired => "session.required",
            Self::NoResponse => "noResponse",
            Self::QueueDeleted => "queue.deleted",
            Self::NotConnected => "notConnected",
            Self::System(fault)
            | Self::Validation(fault)
            | Self::Service(fault)
            | Self::Client(fault) => &fault.code,
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Schema(_) => "schema",
        }
    }
}

impl From<Fault> for CoreError {
    fn from(fault: Fault) -> Self {
        Self::from_fault(fault)
    }
}
