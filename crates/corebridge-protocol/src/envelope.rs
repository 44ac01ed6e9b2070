//! Serialization of [`CoreMessage`] envelopes to and from wire text.
//!
//! ```text
//! <coreMessage>
//!   <sessionId>s-1</sessionId>
//!   <messageType>ServiceRequest</messageType>
//!   <guid>…</guid>
//!   <choreography>Svc</choreography>
//!   <description>Session Id: s-1 Type: ServiceRequest</description>
//!   <timeStamp>20240315T093000.250</timeStamp>
//!   <function>greet</function>
//!   <parameters>
//!     <parameter>
//!       <name>who</name>
//!       <value>&lt;Foo&gt;&lt;name&gt;Ada&lt;/name&gt;&lt;/Foo&gt;</value>
//!     </parameter>
//!   </parameters>
//! </coreMessage>
//! ```
//!
//! Parameter values and response data are encoded payload trees carried
//! as escaped XML text inside the envelope.

use std::sync::Arc;

use corebridge_schema::{TypeRegistry, Value};

use crate::types::{CoreMessage, MessageBody, MessageType, RequestParameter, ResponseStatus, ServiceCall};
use crate::{timestamp, Element, GraphCodec, ProtocolError};

const ROOT_TAG: &str = "coreMessage";

/// Turns envelopes into wire text and back, encoding payloads with a
/// [`GraphCodec`] over the same registry.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    graph: GraphCodec,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            graph: GraphCodec::new(registry),
        }
    }

    pub fn graph(&self) -> &GraphCodec {
        &self.graph
    }

    /// Renders a message as wire text.
    ///
    /// # Errors
    /// Any error from encoding a parameter or the data payload, and
    /// [`ProtocolError::InvalidCharacter`] for header or status text XML
    /// can't carry.
    pub fn serialize(&self, message: &CoreMessage) -> Result<String, ProtocolError> {
        let mut root = Element::new(ROOT_TAG)
            .with_child(Element::leaf("sessionId", &message.session_id))
            .with_child(Element::leaf("messageType", message.message_type().as_str()))
            .with_child(Element::leaf("guid", &message.guid))
            .with_child(Element::leaf("choreography", &message.choreography))
            .with_child(Element::leaf("description", &message.description))
            .with_child(Element::leaf("timeStamp", timestamp::format(&message.timestamp)));

        match &message.body {
            MessageBody::InitiateSessionRequest | MessageBody::KillSessionRequest => {}
            MessageBody::ServiceRequest(call) => self.write_call(&mut root, call)?,
            MessageBody::InitiateSessionResponse(status) | MessageBody::KillSessionResponse(status) => {
                write_status(&mut root, status);
            }
            MessageBody::ServiceResponse { status, has_data } => {
                write_status(&mut root, status);
                root.push(Element::leaf("hasData", flag(*has_data)));
            }
            MessageBody::DataResponse { status, data } => {
                write_status(&mut root, status);
                let text = match data {
                    Some(value) => self.graph.encode_value(value)?.to_xml()?,
                    None => String::new(),
                };
                root.push(Element::leaf("data", text));
            }
        }

        root.to_xml()
    }

    fn write_call(&self, root: &mut Element, call: &ServiceCall) -> Result<(), ProtocolError> {
        if let Some(location) = &call.location {
            root.push(Element::leaf("location", location));
        }
        root.push(Element::leaf("function", &call.function));

        let mut parameters = Element::new("parameters");
        for parameter in &call.parameters {
            let encoded = match &parameter.ty {
                Some(ty) => self.graph.encode(ty, &parameter.value)?,
                None => self.graph.encode_value(&parameter.value)?,
            };
            parameters.push(
                Element::new("parameter")
                    .with_child(Element::leaf("name", &parameter.name))
                    .with_child(Element::leaf("value", encoded.to_xml()?)),
            );
        }
        root.push(parameters);
        Ok(())
    }

    /// Parses wire text into a message.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidMessage`] for a wrong root, a missing or
    /// empty `sessionId`/`guid`/`messageType`, or an unknown message
    /// type; decode errors from the embedded payloads.
    pub fn deserialize(&self, text: &str) -> Result<CoreMessage, ProtocolError> {
        let root = Element::parse(text)?;
        if root.tag() != ROOT_TAG {
            return Err(ProtocolError::InvalidMessage(format!(
                "expected `{ROOT_TAG}` root, found `{}`",
                root.tag()
            )));
        }

        let session_id = required(&root, "sessionId")?;
        let guid = required(&root, "guid")?;
        let message_type: MessageType = required(&root, "messageType")?.parse()?;
        let timestamp = timestamp::parse(required(&root, "timeStamp")?)?;

        let body = match message_type {
            MessageType::InitiateSessionRequest => MessageBody::InitiateSessionRequest,
            MessageType::KillSessionRequest => MessageBody::KillSessionRequest,
            MessageType::ServiceRequest => MessageBody::ServiceRequest(self.read_call(&root)?),
            MessageType::InitiateSessionResponse => MessageBody::InitiateSessionResponse(read_status(&root)?),
            MessageType::KillSessionResponse => MessageBody::KillSessionResponse(read_status(&root)?),
            MessageType::ServiceResponse => MessageBody::ServiceResponse {
                status: read_status(&root)?,
                has_data: read_flag(&root, "hasData"),
            },
            MessageType::DataResponse => MessageBody::DataResponse {
                status: read_status(&root)?,
                data: match root.child("data") {
                    Some(data) => self.read_payload(data)?,
                    None => None,
                },
            },
        };

        Ok(CoreMessage {
            session_id: session_id.to_string(),
            guid: guid.to_string(),
            choreography: root.child_text("choreography").unwrap_or_default().to_string(),
            description: root.child_text("description").unwrap_or_default().to_string(),
            timestamp,
            body,
        })
    }

    fn read_call(&self, root: &Element) -> Result<ServiceCall, ProtocolError> {
        let function = required(root, "function")?.to_string();
        let location = optional(root, "location").map(str::to_string);

        let mut parameters = Vec::new();
        if let Some(block) = root.child("parameters") {
            for parameter in block.children().iter().filter(|p| p.tag() == "parameter") {
                let name = required(parameter, "name")?.to_string();
                let value = match parameter.child("value") {
                    Some(value) => self.read_payload(value)?.unwrap_or(Value::Null),
                    None => Value::Null,
                };
                parameters.push(RequestParameter { name, ty: None, value });
            }
        }

        Ok(ServiceCall {
            location,
            function,
            parameters,
        })
    }

    /// A payload carried as escaped text or as a nested element.
    fn read_payload(&self, holder: &Element) -> Result<Option<Value>, ProtocolError> {
        if let Some(tree) = holder.children().first() {
            return self.graph.decode(tree).map(Some);
        }
        let text = holder.text().trim();
        if text.is_empty() {
            return Ok(None);
        }
        self.graph.decode_text(text).map(Some)
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn read_flag(root: &Element, tag: &str) -> bool {
    matches!(root.child_text(tag).map(str::trim), Some("1" | "true"))
}

fn required<'a>(root: &'a Element, tag: &str) -> Result<&'a str, ProtocolError> {
    optional(root, tag).ok_or_else(|| ProtocolError::InvalidMessage(format!("missing `{tag}`")))
}

fn optional<'a>(root: &'a Element, tag: &str) -> Option<&'a str> {
    root.child_text(tag).map(str::trim).filter(|text| !text.is_empty())
}

fn write_status(root: &mut Element, status: &ResponseStatus) {
    if let Some(error_type) = status.error_type {
        root.push(Element::leaf("errorType", error_type.to_string()));
    }
    root.push(Element::leaf("errorCode", status.error_code.clone().unwrap_or_default()));
    root.push(Element::leaf("errorMessage", status.error_message.clone().unwrap_or_default()));
    if !status.error_vars.is_empty() {
        let mut vars = Element::new("errorVars");
        for var in &status.error_vars {
            vars.push(Element::leaf("errorVar", var));
        }
        root.push(vars);
    }
    root.push(Element::leaf("successful", flag(status.successful)));
}

fn read_status(root: &Element) -> Result<ResponseStatus, ProtocolError> {
    let error_type = optional(root, "errorType")
        .map(|code| {
            code.parse::<u32>()
                .map_err(|_| ProtocolError::InvalidMessage(format!("bad errorType `{code}`")))
        })
        .transpose()?;

    Ok(ResponseStatus {
        successful: read_flag(root, "successful"),
        error_type,
        error_code: optional(root, "errorCode").map(str::to_string),
        error_message: optional(root, "errorMessage").map(str::to_string),
        error_vars: root
            .child("errorVars")
            .map(|vars| vars.children().iter().map(|v| v.text().to_string()).collect())
            .unwrap_or_default(),
    })
}
