//! Core message envelopes.
//!
//! Every message exchanged with the core is a [`CoreMessage`]: a header
//! (session, guid, type, choreography, description, timestamp) and a
//! body that depends on the message type.
//!
//! ```text
//! client ──InitiateSessionRequest──▶ core ──InitiateSessionResponse──▶ client
//! client ──ServiceRequest──────────▶ core ──ServiceResponse──────────▶ client
//!                                         └─DataResponse (data queue)─▶ client
//! client ──KillSessionRequest──────▶ core ──KillSessionResponse──────▶ client
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use corebridge_schema::{TypeRef, Value};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Message type
// ---------------------------------------------------------------------------

/// The `messageType` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    InitiateSessionRequest,
    KillSessionRequest,
    ServiceRequest,
    InitiateSessionResponse,
    KillSessionResponse,
    ServiceResponse,
    DataResponse,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        Self::InitiateSessionRequest,
        Self::KillSessionRequest,
        Self::ServiceRequest,
        Self::InitiateSessionResponse,
        Self::KillSessionResponse,
        Self::ServiceResponse,
        Self::DataResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitiateSessionRequest => "InitiateSessionRequest",
            Self::KillSessionRequest => "KillSessionRequest",
            Self::ServiceRequest => "ServiceRequest",
            Self::InitiateSessionResponse => "InitiateSessionResponse",
            Self::KillSessionResponse => "KillSessionResponse",
            Self::ServiceResponse => "ServiceResponse",
            Self::DataResponse => "DataResponse",
        }
    }

    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::InitiateSessionRequest | Self::KillSessionRequest | Self::ServiceRequest
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidMessage(format!("unknown message type `{s}`")))
    }
}

// ---------------------------------------------------------------------------
// Errors reported by the core
// ---------------------------------------------------------------------------

/// Category of a failure reported in a response, by its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// 1001: the core or a service broke.
    System,
    /// 1002: the request was rejected as invalid.
    Validation,
    /// 1003: the service reported a business failure.
    Service,
    /// 1004: the client did something it shouldn't have.
    Client,
}

impl ErrorType {
    pub fn code(self) -> u32 {
        match self {
            Self::System => 1001,
            Self::Validation => 1002,
            Self::Service => 1003,
            Self::Client => 1004,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1001 => Some(Self::System),
            1002 => Some(Self::Validation),
            1003 => Some(Self::Service),
            1004 => Some(Self::Client),
            _ => None,
        }
    }
}

/// A failure reported by the core, ready to be raised to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub error_type: ErrorType,
    pub code: String,
    pub message: String,
    /// Substitution variables for the message template, in order.
    pub vars: Vec<String>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.vars.is_empty() {
            write!(f, " ({})", self.vars.join(", "))?;
        }
        Ok(())
    }
}

/// Outcome fields shared by every response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseStatus {
    pub successful: bool,
    /// Numeric error type, as sent. Unknown codes are kept verbatim.
    pub error_type: Option<u32>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_vars: Vec<String>,
}

impl ResponseStatus {
    pub fn success() -> Self {
        Self {
            successful: true,
            ..Self::default()
        }
    }

    pub fn failure(fault: &Fault) -> Self {
        Self {
            successful: false,
            error_type: Some(fault.error_type.code()),
            error_code: Some(fault.code.clone()),
            error_message: Some(fault.message.clone()),
            error_vars: fault.vars.clone(),
        }
    }

    /// The reported failure, if the response is unsuccessful or carries
    /// an error code or error type. A missing or unknown error type counts
    /// as [`ErrorType::System`].
    pub fn fault(&self) -> Option<Fault> {
        let has_code = self.error_code.as_deref().is_some_and(|c| !c.is_empty());
        if self.successful && !has_code && self.error_type.is_none() {
            return None;
        }
        Some(Fault {
            error_type: self
                .error_type
                .and_then(ErrorType::from_code)
                .unwrap_or(ErrorType::System),
            code: self.error_code.clone().unwrap_or_default(),
            message: self.error_message.clone().unwrap_or_default(),
            vars: self.error_vars.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// One named argument of a service request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParameter {
    pub name: String,
    /// Declared type to encode against. `None` encodes by value kind;
    /// decoded requests always have `None`.
    pub ty: Option<TypeRef>,
    pub value: Value,
}

/// Body of a `ServiceRequest`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub location: Option<String>,
    pub function: String,
    /// In declaration order.
    pub parameters: Vec<RequestParameter>,
}

impl ServiceCall {
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// Message-type specific part of a [`CoreMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    InitiateSessionRequest,
    KillSessionRequest,
    ServiceRequest(ServiceCall),
    InitiateSessionResponse(ResponseStatus),
    KillSessionResponse(ResponseStatus),
    ServiceResponse {
        status: ResponseStatus,
        has_data: bool,
    },
    DataResponse {
        status: ResponseStatus,
        data: Option<Value>,
    },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::InitiateSessionRequest => MessageType::InitiateSessionRequest,
            Self::KillSessionRequest => MessageType::KillSessionRequest,
            Self::ServiceRequest(_) => MessageType::ServiceRequest,
            Self::InitiateSessionResponse(_) => MessageType::InitiateSessionResponse,
            Self::KillSessionResponse(_) => MessageType::KillSessionResponse,
            Self::ServiceResponse { .. } => MessageType::ServiceResponse,
            Self::DataResponse { .. } => MessageType::DataResponse,
        }
    }

    /// Response fields, for response bodies.
    pub fn status(&self) -> Option<&ResponseStatus> {
        match self {
            Self::InitiateSessionResponse(status)
            | Self::KillSessionResponse(status)
            | Self::ServiceResponse { status, .. }
            | Self::DataResponse { status, .. } => Some(status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One message to or from the core.
///
/// The builders below fill the header the way the core expects: requests
/// get a fresh guid, responses reuse the request's guid, and the
/// description defaults to `Session Id: <id> Type: <messageType>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreMessage {
    pub session_id: String,
    pub guid: String,
    /// Target service name; empty for session messages.
    pub choreography: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
}

impl CoreMessage {
    fn request(session_id: impl Into<String>, choreography: String, body: MessageBody) -> Self {
        let session_id = session_id.into();
        Self {
            description: default_description(&session_id, body.message_type()),
            guid: uuid::Uuid::new_v4().to_string(),
            session_id,
            choreography,
            timestamp: Utc::now().trunc_subsecs(3),
            body,
        }
    }

    pub fn initiate_session(session_id: impl Into<String>) -> Self {
        Self::request(session_id, String::new(), MessageBody::InitiateSessionRequest)
    }

    pub fn kill_session(session_id: impl Into<String>) -> Self {
        Self::request(session_id, String::new(), MessageBody::KillSessionRequest)
    }

    pub fn service_request(
        session_id: impl Into<String>,
        choreography: impl Into<String>,
        call: ServiceCall,
    ) -> Self {
        Self::request(session_id, choreography.into(), MessageBody::ServiceRequest(call))
    }

    /// A response to `request`: same session, guid and choreography.
    pub fn reply_to(request: &CoreMessage, body: MessageBody) -> Self {
        Self {
            session_id: request.session_id.clone(),
            guid: request.guid.clone(),
            choreography: request.choreography.clone(),
            description: default_description(&request.session_id, body.message_type()),
            timestamp: Utc::now().trunc_subsecs(3),
            body,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    pub fn status(&self) -> Option<&ResponseStatus> {
        self.body.status()
    }
}

fn default_description(session_id: &str, message_type: MessageType) -> String {
    format!("Session Id: {session_id} Type: {message_type}")
}
