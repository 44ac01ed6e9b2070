//! Call-scoped receivers.
//!
//! Each call listens on its own `<queue>.<sessionId>` address, so replies
//! reach only the session that asked. The queue is created when the
//! subscriber opens and disappears once it closes.

use std::time::Duration;

use corebridge_protocol::{CoreMessage, EnvelopeCodec};
use corebridge_transport::{Address, Receiver, Session, TransportError};

use crate::CoreError;

/// A receiver for one call's reply (or data), decoding what it fetches.
///
/// Close it on every exit path; dropping also releases the underlying
/// receiver, but only [`close`](Self::close) logs failures.
pub struct CoreSubscriber<'a, R: Receiver> {
    receiver: R,
    codec: &'a EnvelopeCodec,
}

impl<'a, R: Receiver> CoreSubscriber<'a, R> {
    /// Opens a receiver on `<queue>.<session_id>`.
    pub async fn open<S>(
        session: &S,
        codec: &'a EnvelopeCodec,
        queue: &str,
        session_id: &str,
    ) -> Result<Self, CoreError>
    where
        S: Session<Receiver = R>,
    {
        let address = Address::session_scoped(queue, session_id);
        let receiver = session.create_receiver(&address).await?;
        Ok(Self { receiver, codec })
    }

    pub fn address(&self) -> &Address {
        self.receiver.address()
    }

    /// Waits up to `timeout` for the next message and decodes it.
    ///
    /// Unsuccessful replies are returned as they are (with a warning);
    /// turning them into errors is the caller's decision.
    pub async fn next(&self, timeout: Duration) -> Result<CoreMessage, CoreError> {
        let queue = self.address().name();
        let message = self
            .receiver
            .fetch(timeout)
            .await
            .map_err(|e| messaging_error(e, queue))?;

        if message.content.trim().is_empty() {
            tracing::warn!(queue, "empty message from server");
            return Err(CoreError::NoResponse);
        }
        tracing::debug!(queue, content = %message.content, "received");

        let reply = self.codec.deserialize(&message.content)?;
        if let Some(fault) = reply.status().and_then(|status| status.fault()) {
            tracing::warn!(
                queue,
                guid = %reply.guid,
                code = %fault.code,
                message = %fault.message,
                "request was unsuccessful"
            );
        }
        Ok(reply)
    }

    /// Releases the receiver. Safe to call more than once.
    pub async fn close(&self) {
        if self.receiver.is_closed() {
            return;
        }
        if let Err(e) = self.receiver.close().await {
            tracing::warn!(queue = self.address().name(), error = %e, "failed to close receiver");
        }
    }
}

/// Maps a transport failure during a fetch to the client taxonomy.
fn messaging_error(error: TransportError, queue: &str) -> CoreError {
    match error {
        TransportError::NoMessage => {
            tracing::debug!(queue, "no message to fetch");
            CoreError::NoResponse
        }
        TransportError::ResourceDeleted(_) => {
            tracing::warn!(queue, "queue deleted while waiting for a reply");
            CoreError::QueueDeleted
        }
        other => {
            tracing::error!(queue, error = %other, "messaging error");
            CoreError::NoResponse
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use corebridge_protocol::{MessageBody, ResponseStatus};
    use corebridge_schema::TypeRegistry;
    use corebridge_transport::{Connection, MemoryBroker, Message, Sender};

    use super::*;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(Arc::new(TypeRegistry::builtins()))
    }

    #[tokio::test]
    async fn test_next_decodes_reply_on_session_queue() {
        let broker = MemoryBroker::new();
        let session = broker.connect().create_session().await.unwrap();
        let codec = codec();

        let subscriber = CoreSubscriber::open(&session, &codec, "core.core-client", "s-1")
            .await
            .unwrap();
        assert_eq!(subscriber.address().name(), "core.core-client.s-1");

        let request = CoreMessage::initiate_session("s-1");
        let reply = CoreMessage::reply_to(
            &request,
            MessageBody::InitiateSessionResponse(ResponseStatus::success()),
        );
        let sender = session.create_sender(subscriber.address()).await.unwrap();
        sender
            .send(Message::new(codec.serialize(&reply).unwrap()))
            .await
            .unwrap();

        let received = subscriber.next(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.guid, request.guid);
        subscriber.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_times_out_as_no_response() {
        let broker = MemoryBroker::new();
        let session = broker.connect().create_session().await.unwrap();
        let codec = codec();
        let subscriber = CoreSubscriber::open(&session, &codec, "core.data", "s-1")
            .await
            .unwrap();

        let result = subscriber.next(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CoreError::NoResponse)));
    }

    #[tokio::test]
    async fn test_next_on_empty_content_is_no_response() {
        let broker = MemoryBroker::new();
        let session = broker.connect().create_session().await.unwrap();
        let codec = codec();
        let subscriber = CoreSubscriber::open(&session, &codec, "core.core-client", "s-1")
            .await
            .unwrap();
        let sender = session.create_sender(subscriber.address()).await.unwrap();
        sender.send(Message::new("  ")).await.unwrap();

        let result = subscriber.next(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CoreError::NoResponse)));
    }

    #[tokio::test]
    async fn test_close_removes_session_queue() {
        let broker = MemoryBroker::new();
        let session = broker.connect().create_session().await.unwrap();
        let codec = codec();
        let subscriber = CoreSubscriber::open(&session, &codec, "core.core-client", "s-1")
            .await
            .unwrap();
        assert_eq!(broker.consumer_count("core.core-client.s-1"), 1);

        subscriber.close().await;
        subscriber.close().await;
        assert!(!broker.queue_exists("core.core-client.s-1"));
    }

    #[test]
    fn test_messaging_error_translation() {
        assert!(matches!(
            messaging_error(TransportError::NoMessage, "q"),
            CoreError::NoResponse
        ));
        assert!(matches!(
            messaging_error(TransportError::ResourceDeleted("q".into()), "q"),
            CoreError::QueueDeleted
        ));
        assert!(matches!(
            messaging_error(TransportError::ConnectionClosed("x".into()), "q"),
            CoreError::NoResponse
        ));
    }
}
