//! Wire protocol for corebridge.
//!
//! This crate defines what travels between a client and the core:
//!
//! - **Tree** ([`Element`]): the tagged tree with its XML text form.
//! - **Graph codec** ([`GraphCodec`]): typed values, including shared
//!   and cyclic object graphs, to trees and back.
//! - **Envelopes** ([`CoreMessage`], [`EnvelopeCodec`]): the message
//!   header and per-type bodies, serialized around encoded payloads.
//! - **Errors** ([`ProtocolError`]): what can go wrong on the way.
//!
//! # Architecture
//!
//! ```text
//! TypeRegistry ──▶ GraphCodec (payloads) ──▶ EnvelopeCodec (messages) ──▶ transport text
//! ```
//!
//! Nothing here knows about queues or sessions; it only turns values and
//! messages into text and back.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod envelope;
mod error;
pub mod path;
pub mod timestamp;
mod tree;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{CLASS_ATTRIBUTE, ENTRY_TAG, GraphCodec, NULL_TAG, REFERENCE_ATTRIBUTE};
pub use envelope::EnvelopeCodec;
pub use error::ProtocolError;
pub use tree::{Element, MAX_DEPTH};
pub use types::{
    CoreMessage, ErrorType, Fault, MessageBody, MessageType, RequestParameter, ResponseStatus,
    ServiceCall,
};
