//! Error types for the protocol layer.
//!
//! Each corebridge crate defines its own error enum. A `ProtocolError`
//! means the problem is in turning values or envelopes into wire text
//! and back, not in the schema itself or in moving messages around.

use corebridge_schema::SchemaError;

/// Errors raised while encoding or decoding payloads and envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A tag names no known type. Fatal: the payload can't be read
    /// without knowing what it is.
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// The tree is well-formed XML but doesn't decode as a value:
    /// bad primitive text, a dangling reference, a malformed map entry.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The text isn't well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The envelope violates the message layout: wrong root, missing
    /// header field, unknown message type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A string holds a character XML 1.0 can't carry, so no text form
    /// of it would parse back.
    #[error("character {0:?} cannot be written as XML")]
    InvalidCharacter(char),

    /// A value nests deeper than the wire format accepts.
    #[error("value nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    /// A value doesn't fit the type it is being encoded as.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A type lookup failed against the registry.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
