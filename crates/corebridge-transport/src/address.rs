//! Queue definitions and broker addresses.
//!
//! The core service talks over a handful of well-known queues. Requests
//! go out on a direct queue; replies and data come back on topic queues
//! that are namespaced per session (`<baseQueue>.<sessionId>`), so a
//! receiver only ever sees traffic for the session it was opened for.

use std::fmt;

/// Exchange used for point-to-point queues.
pub const DIRECT_EXCHANGE: &str = "core.direct";

/// Exchange used for session-scoped (routed) queues.
pub const TOPIC_EXCHANGE: &str = "core.topic";

/// How messages reach a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// A single named queue.
    Direct,
    /// Routed through the topic exchange by key.
    Topic,
}

/// A well-known queue of the core service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDefinition {
    /// Base queue name.
    pub name: &'static str,
    /// Routing type of the queue.
    pub routing: Routing,
}

impl QueueDefinition {
    /// Client → core requests.
    pub const CLIENT_TO_CORE: Self = Self::new("core.client-core", Routing::Direct);
    /// Core → service requests.
    pub const CORE_TO_SERVICE: Self = Self::new("core.core-service", Routing::Topic);
    /// Service → core replies.
    pub const SERVICE_TO_CORE: Self = Self::new("core.service-core", Routing::Direct);
    /// Core → client replies.
    pub const CORE_TO_CLIENT: Self = Self::new("core.core-client", Routing::Topic);
    /// Core → session notifications.
    pub const CORE_TO_SESSION: Self = Self::new("core.core-session", Routing::Topic);
    /// Data payloads produced by services.
    pub const DATA: Self = Self::new("core.data", Routing::Topic);

    const fn new(name: &'static str, routing: Routing) -> Self {
        Self { name, routing }
    }

    /// Returns `true` for queues routed through the topic exchange.
    pub fn is_topic(&self) -> bool {
        self.routing == Routing::Topic
    }

    /// Returns `true` for point-to-point queues.
    pub fn is_direct(&self) -> bool {
        self.routing == Routing::Direct
    }

    /// The queue on which replies to this departure queue arrive.
    pub fn arrival(&self) -> Option<Self> {
        match *self {
            Self::CLIENT_TO_CORE => Some(Self::CORE_TO_CLIENT),
            Self::CORE_TO_SERVICE => Some(Self::SERVICE_TO_CORE),
            _ => None,
        }
    }
}

/// A broker address a sender publishes to or a receiver consumes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    name: String,
    exchange: Option<String>,
    auto_delete: bool,
}

impl Address {
    /// A direct address naming a queue that outlives its consumers.
    pub fn direct(queue: impl Into<String>) -> Self {
        Self {
            name: queue.into(),
            exchange: None,
            auto_delete: false,
        }
    }

    /// A session-scoped topic address: `<base>.<filter>`.
    ///
    /// The queue is created on demand, bound to the topic exchange under
    /// its own name, and deleted when its last receiver goes away.
    pub fn session_scoped(base: &str, filter: &str) -> Self {
        Self {
            name: format!("{base}.{filter}"),
            exchange: Some(TOPIC_EXCHANGE.to_string()),
            auto_delete: true,
        }
    }

    /// The queue name (also the binding key for topic addresses).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The exchange the queue is bound to, if any.
    pub fn exchange(&self) -> Option<&str> {
        self.exchange.as_deref()
    }

    /// Whether the queue is deleted when its receivers close.
    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }
}

/// Renders the broker address string.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exchange {
            Some(exchange) => write!(
                f,
                "{name};{{create:always, mode:consume, delete:{delete}, \
                 node:{{type: queue, x-bindings: [{{exchange: {exchange}, \
                 queue: {name}, key: {name}}}]}}}}",
                name = self.name,
                delete = if self.auto_delete { "receiver" } else { "never" },
            ),
            None => f.write_str(&self.name),
        }
    }
}
