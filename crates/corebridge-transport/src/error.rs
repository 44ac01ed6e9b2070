/// Errors that can occur in the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// No message arrived before the fetch timeout elapsed.
    #[error("no message to fetch")]
    NoMessage,

    /// The queue behind a receiver was deleted while it was in use.
    #[error("resource-deleted: {0}")]
    ResourceDeleted(String),

    /// The receiver was already closed.
    #[error("receiver for {0} is closed")]
    ReceiverClosed(String),

    /// Sending a message failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}
