//! In-process broker implementing the transport contract.
//!
//! Every queue is an unbounded Tokio channel. Receivers on the same queue
//! compete for messages; auto-delete queues disappear with their last
//! receiver, and deleting a queue wakes its receivers with
//! [`TransportError::ResourceDeleted`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::{Address, Connection, Message, Receiver, Sender, Session, TransportError};

type SharedInbox = Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>;

struct Queue {
    tx: mpsc::UnboundedSender<Message>,
    rx: SharedInbox,
    consumers: usize,
    auto_delete: bool,
}

impl Queue {
    fn new(auto_delete: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
            consumers: 0,
            auto_delete,
        }
    }
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, Queue>,
}

/// A process-local message broker.
///
/// Cheap to clone; clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    next_session: Arc<AtomicU64>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection to this broker.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            broker: self.clone(),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Deletes a queue, failing any receiver still waiting on it.
    ///
    /// Returns `false` if no such queue existed.
    pub fn delete_queue(&self, name: &str) -> bool {
        let removed = self.state.lock().queues.remove(name).is_some();
        if removed {
            tracing::debug!(queue = name, "queue deleted");
        }
        removed
    }

    /// Returns `true` if a queue with this name currently exists.
    pub fn queue_exists(&self, name: &str) -> bool {
        self.state.lock().queues.contains_key(name)
    }

    /// Number of open receivers on a queue (0 if it doesn't exist).
    pub fn consumer_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(name)
            .map_or(0, |queue| queue.consumers)
    }

    fn declare(&self, address: &Address) {
        self.state
            .lock()
            .queues
            .entry(address.name().to_string())
            .or_insert_with(|| Queue::new(address.is_auto_delete()));
    }

    fn attach(&self, address: &Address) -> SharedInbox {
        let mut state = self.state.lock();
        let queue = state
            .queues
            .entry(address.name().to_string())
            .or_insert_with(|| Queue::new(address.is_auto_delete()));
        queue.consumers += 1;
        Arc::clone(&queue.rx)
    }

    fn detach(&self, name: &str, inbox: &SharedInbox) {
        let mut state = self.state.lock();
        let Some(queue) = state.queues.get_mut(name) else {
            return;
        };
        // The queue may have been deleted and re-created since this
        // receiver attached; only the original one is ours to release.
        if !Arc::ptr_eq(&queue.rx, inbox) {
            return;
        }
        queue.consumers = queue.consumers.saturating_sub(1);
        if queue.consumers == 0 && queue.auto_delete {
            state.queues.remove(name);
            tracing::debug!(queue = name, "auto-delete queue removed");
        }
    }

    fn publish(&self, name: &str, message: Message) {
        let state = self.state.lock();
        match state.queues.get(name) {
            Some(queue) => {
                // The queue holds its own inbox, so the channel can't be closed here.
                let _ = queue.tx.send(message);
            }
            None => {
                tracing::debug!(queue = name, "no queue bound, message dropped");
            }
        }
    }
}

/// A connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    broker: MemoryBroker,
    open: Arc<AtomicBool>,
}

impl MemoryConnection {
    /// The broker behind this connection.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }
}

impl Connection for MemoryConnection {
    type Session = MemorySession;

    async fn create_session(&self) -> Result<Self::Session, TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(
                "cannot create a session on a closed connection".into(),
            ));
        }
        let id = self.broker.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session = id, "memory session created");
        Ok(MemorySession {
            broker: self.broker.clone(),
            open: Arc::clone(&self.open),
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!("memory connection closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// A session on a [`MemoryConnection`].
pub struct MemorySession {
    broker: MemoryBroker,
    open: Arc<AtomicBool>,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed("session's connection is closed".into()))
        }
    }
}

impl Session for MemorySession {
    type Sender = MemorySender;
    type Receiver = MemoryReceiver;

    async fn create_sender(&self, address: &Address) -> Result<Self::Sender, TransportError> {
        self.ensure_open()?;
        if !address.is_auto_delete() {
            self.broker.declare(address);
        }
        Ok(MemorySender {
            broker: self.broker.clone(),
            address: address.clone(),
            open: Arc::clone(&self.open),
        })
    }

    async fn create_receiver(&self, address: &Address) -> Result<Self::Receiver, TransportError> {
        self.ensure_open()?;
        let inbox = self.broker.attach(address);
        tracing::debug!(queue = address.name(), "receiver attached");
        Ok(MemoryReceiver {
            broker: self.broker.clone(),
            address: address.clone(),
            inbox,
            open: Arc::clone(&self.open),
            closed: AtomicBool::new(false),
        })
    }
}

/// Publishes to one address of a [`MemoryBroker`].
pub struct MemorySender {
    broker: MemoryBroker,
    address: Address,
    open: Arc<AtomicBool>,
}

impl Sender for MemorySender {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(format!(
                "cannot send to {}",
                self.address.name()
            )));
        }
        self.broker.publish(self.address.name(), message);
        Ok(())
    }
}

/// Consumes from one queue of a [`MemoryBroker`].
///
/// Dropping the receiver releases it like [`Receiver::close`].
pub struct MemoryReceiver {
    broker: MemoryBroker,
    address: Address,
    inbox: SharedInbox,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl MemoryReceiver {
    fn release(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.broker.detach(self.address.name(), &self.inbox);
        }
        first
    }
}

impl Receiver for MemoryReceiver {
    async fn fetch(&self, timeout: Duration) -> Result<Message, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ReceiverClosed(self.address.name().to_string()));
        }
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed(format!(
                "cannot fetch from {}",
                self.address.name()
            )));
        }

        let next = tokio::time::timeout(timeout, async {
            let mut inbox = self.inbox.lock().await;
            inbox.recv().await
        })
        .await;

        match next {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(TransportError::ResourceDeleted(self.address.name().to_string())),
            Err(_) => Err(TransportError::NoMessage),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.release() {
            tracing::debug!(queue = self.address.name(), "receiver closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn address(&self) -> &Address {
        &self.address
    }
}

impl Drop for MemoryReceiver {
    fn drop(&mut self) {
        self.release();
    }
}
