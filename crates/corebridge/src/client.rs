//! `CoreClient` and its builder.
//!
//! One client owns one transport connection, one session on it and one
//! long-lived sender to the core's inbound queue. Every call opens its own
//! [`CoreSubscriber`] on `<replyQueue>.<sessionId>` before sending, waits
//! for the reply with a timeout, and closes the subscriber whatever the
//! outcome:
//!
//! ```text
//! Idle ──send──▶ AwaitingReply ──┬─▶ Completed ─┐
//!                                ├─▶ TimedOut  ─┼─▶ Closed (receiver released)
//!                                └─▶ Failed    ─┘
//! ```
//!
//! Calls only need `&self`, so a client behind an `Arc` serves several
//! sessions at once; each call is isolated by its session-scoped queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use corebridge_protocol::{
    CoreMessage, EnvelopeCodec, MessageBody, ProtocolError, RequestParameter, ResponseStatus,
    ServiceCall,
};
use corebridge_schema::{TypeRegistry, Value};
use corebridge_transport::{Address, Connection, Message, Sender, Session};
use parking_lot::Mutex;

use crate::session::{SessionBook, SessionRecord};
use crate::{ClientConfig, CoreError, CoreSubscriber};

type SenderOf<C> = <<C as Connection>::Session as Session>::Sender;
type ReceiverOf<C> = <<C as Connection>::Session as Session>::Receiver;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`CoreClient`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), corebridge::CoreError> {
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use corebridge::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::load(&DirectorySource::new("api"))?);
/// let broker = MemoryBroker::new();
/// let client = CoreClientBuilder::new()
///     .timeout(Duration::from_secs(5))
///     .connect(broker.connect(), registry)
///     .await?;
/// client.initiate_session("my-session").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CoreClientBuilder {
    config: ClientConfig,
}

impl CoreClientBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long a call waits for its reply.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn outbound_queue(mut self, queue: impl Into<String>) -> Self {
        self.config.outbound_queue = queue.into();
        self
    }

    pub fn reply_queue(mut self, queue: impl Into<String>) -> Self {
        self.config.reply_queue = queue.into();
        self
    }

    pub fn data_queue(mut self, queue: impl Into<String>) -> Self {
        self.config.data_queue = queue.into();
        self
    }

    /// Connects a client over `connection`.
    pub async fn connect<C: Connection>(
        self,
        connection: C,
        registry: Arc<TypeRegistry>,
    ) -> Result<CoreClient<C>, CoreError> {
        CoreClient::connect(connection, registry, self.config).await
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The result of a data-bearing call: the service reply plus the payload
/// that arrived on the data channel, if the reply announced one.
#[derive(Debug, Clone, PartialEq)]
pub struct DataReply {
    pub reply: CoreMessage,
    pub data: Option<Value>,
}

/// A connected client of the core.
pub struct CoreClient<C: Connection> {
    connection: C,
    session: C::Session,
    sender: SenderOf<C>,
    codec: EnvelopeCodec,
    config: ClientConfig,
    sessions: Mutex<SessionBook>,
    closed: AtomicBool,
}

impl<C: Connection> CoreClient<C> {
    /// Opens a session on `connection` and a sender to the outbound queue.
    ///
    /// # Errors
    /// Transport errors from creating the session or the sender.
    pub async fn connect(
        connection: C,
        registry: Arc<TypeRegistry>,
        config: ClientConfig,
    ) -> Result<Self, CoreError> {
        let session = connection.create_session().await?;
        let sender = session
            .create_sender(&Address::direct(config.outbound_queue.clone()))
            .await?;

        tracing::info!(
            outbound = %config.outbound_queue,
            timeout_ms = config.timeout_ms,
            "client connected"
        );

        Ok(Self {
            connection,
            session,
            sender,
            codec: EnvelopeCodec::new(registry),
            config,
            sessions: Mutex::new(SessionBook::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.codec.graph().registry()
    }

    /// The envelope codec the client serializes with.
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// `false` once the client is closed or its connection dropped.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.connection.is_open()
    }

    /// Closes the connection. Closing twice is a no-op.
    ///
    /// Sessions initiated through this client and never ended are
    /// forgotten with a warning; the core will expire them on its own.
    pub async fn close(&self) -> Result<(), CoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let lingering = self.sessions.lock().drain();
        for record in lingering {
            tracing::warn!(
                session_id = %record.session_id,
                calls = record.calls,
                "closing with a session that was never ended"
            );
        }

        if self.connection.is_open() {
            self.connection.close().await?;
        }
        tracing::info!("client closed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Asks the core to open `session_id`.
    pub async fn initiate_session(&self, session_id: &str) -> Result<CoreMessage, CoreError> {
        let reply = self.make_request(&CoreMessage::initiate_session(session_id)).await?;
        self.sessions.lock().record(session_id);
        Ok(reply)
    }

    /// Asks the core to end `session_id`.
    pub async fn end_session(&self, session_id: &str) -> Result<CoreMessage, CoreError> {
        let reply = self.make_request(&CoreMessage::kill_session(session_id)).await?;
        self.sessions.lock().forget(session_id);
        Ok(reply)
    }

    /// Sessions initiated through this client and not yet ended, sorted.
    pub fn active_sessions(&self) -> Vec<String> {
        self.sessions.lock().ids()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions.lock().contains(session_id)
    }

    pub fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.lock().get(session_id)
    }

    // -----------------------------------------------------------------------
    // Service calls
    // -----------------------------------------------------------------------

    /// Calls `service.function` with named arguments.
    ///
    /// Arguments are checked against the schema and encoded with their
    /// declared types, in declaration order. A function with a return type
    /// goes through the data channel and yields its payload; one without
    /// yields `None` once the core acknowledges it.
    ///
    /// # Errors
    /// [`SchemaError::UndefinedService`](corebridge_schema::SchemaError::UndefinedService),
    /// `UndefinedFunction` or `UndefinedParameter` before anything is
    /// sent; otherwise whatever [`make_request`](Self::make_request) or
    /// [`make_data_request`](Self::make_data_request) raise.
    pub async fn invoke<I, K, V>(
        &self,
        session_id: &str,
        service: &str,
        function: &str,
        params: I,
    ) -> Result<Option<Value>, CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let method = self.registry().resolve_service(service)?.method(function)?;

        let mut supplied: Vec<(String, Value)> = params
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        for (name, _) in &supplied {
            method.parameter(name)?;
        }

        let parameters = method
            .parameters
            .iter()
            .filter_map(|declared| {
                let index = supplied.iter().position(|(name, _)| *name == declared.name)?;
                let (name, value) = supplied.remove(index);
                Some(RequestParameter {
                    name,
                    ty: Some(declared.ty.clone()),
                    value,
                })
            })
            .collect();

        if !session_id.is_empty() && !self.sessions.lock().touch(session_id) {
            tracing::debug!(%session_id, service, function, "invoking on a session this client did not initiate");
        }

        let call = ServiceCall {
            location: None,
            function: function.to_string(),
            parameters,
        };
        let message = CoreMessage::service_request(session_id, service, call);

        if method.returns_data() {
            Ok(self.make_data_request(&message).await?.data)
        } else {
            self.make_request(&message).await?;
            Ok(None)
        }
    }

    /// Sends `message` and waits for the reply on the session's reply queue.
    ///
    /// # Errors
    /// - [`CoreError::SessionRequired`] if the message has no session id
    /// - [`CoreError::NotConnected`] after [`close`](Self::close)
    /// - [`CoreError::NoResponse`] / [`CoreError::QueueDeleted`] from the wait
    /// - `System`, `Validation`, `Service` or `Client` when the reply
    ///   reports a failure
    pub async fn make_request(&self, message: &CoreMessage) -> Result<CoreMessage, CoreError> {
        self.check_request(message)?;
        let reply = self.exchange(message).await?;
        raise_fault(reply)
    }

    /// Like [`make_request`](Self::make_request), then fetches the data
    /// payload the reply announces from the session's data queue.
    ///
    /// The data receiver is opened before the request goes out, so a
    /// payload published ahead of the reply isn't lost. Nothing is fetched
    /// when the reply fails or announces no data.
    pub async fn make_data_request(&self, message: &CoreMessage) -> Result<DataReply, CoreError> {
        self.check_request(message)?;

        let data_channel = CoreSubscriber::open(
            &self.session,
            &self.codec,
            &self.config.data_queue,
            &message.session_id,
        )
        .await?;

        let outcome = self.data_exchange(message, &data_channel).await;
        data_channel.close().await;
        outcome
    }

    fn check_request(&self, message: &CoreMessage) -> Result<(), CoreError> {
        if message.session_id.is_empty() {
            tracing::error!(guid = %message.guid, "error sending message: requires session id");
            return Err(CoreError::SessionRequired);
        }
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }
        Ok(())
    }

    /// One request/reply round trip on a fresh reply subscriber.
    async fn exchange(&self, message: &CoreMessage) -> Result<CoreMessage, CoreError> {
        let replies = CoreSubscriber::open(
            &self.session,
            &self.codec,
            &self.config.reply_queue,
            &message.session_id,
        )
        .await?;

        let outcome = self.send_and_wait(message, &replies).await;
        replies.close().await;
        outcome
    }

    async fn send_and_wait(
        &self,
        message: &CoreMessage,
        replies: &CoreSubscriber<'_, ReceiverOf<C>>,
    ) -> Result<CoreMessage, CoreError> {
        self.send(message).await?;
        replies.next(self.config.timeout()).await
    }

    async fn data_exchange(
        &self,
        message: &CoreMessage,
        data_channel: &CoreSubscriber<'_, ReceiverOf<C>>,
    ) -> Result<DataReply, CoreError> {
        let reply = raise_fault(self.exchange(message).await?)?;
        let has_data = matches!(reply.body, MessageBody::ServiceResponse { has_data: true, .. });
        if !has_data {
            return Ok(DataReply { reply, data: None });
        }

        let delivery = data_channel.next(self.config.timeout()).await?;
        match delivery.body {
            MessageBody::DataResponse { status, data } => match status.fault() {
                Some(fault) => Err(fault.into()),
                None => Ok(DataReply { reply, data }),
            },
            other => Err(ProtocolError::InvalidMessage(format!(
                "expected DataResponse on the data channel, got {}",
                other.message_type()
            ))
            .into()),
        }
    }

    async fn send(&self, message: &CoreMessage) -> Result<(), CoreError> {
        let content = self.codec.serialize(message)?;
        tracing::debug!(
            session_id = %message.session_id,
            guid = %message.guid,
            message_type = %message.message_type(),
            content = %content,
            "sending"
        );

        let request = Message::new(content)
            .with_property("choreography", &message.choreography)
            .with_property("guid", &message.guid)
            .with_property("messageType", message.message_type().as_str())
            .with_property("sessionId", &message.session_id);
        self.sender.send(request).await?;
        Ok(())
    }
}

fn raise_fault(reply: CoreMessage) -> Result<CoreMessage, CoreError> {
    let fault = reply.status().and_then(ResponseStatus::fault);
    match fault {
        Some(fault) => Err(fault.into()),
        None => Ok(reply),
    }
}
