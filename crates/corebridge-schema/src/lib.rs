//! Schema-driven type registry for corebridge.
//!
//! The registry knows every type a remote service can exchange: the
//! built-in primitives and containers, the structured types declared in
//! the schema (with single-parent inheritance), and the services with
//! their function signatures. Payloads are modelled as dynamic
//! [`Value`]s checked against it.
//!
//! # Key types
//!
//! - [`TypeRegistry`]: loads and indexes types and services
//! - [`SchemaSource`]: where schema records come from
//!   ([`SchemaDocument`], [`DirectorySource`])
//! - [`TypeRef`]: a parsed type string like `Map<String,List<Foo>>`
//! - [`HostBindings`]: host constructors for structured types
//! - [`Value`] / [`ObjectRef`]: dynamic, possibly shared, payload values

mod error;
mod host;
mod registry;
mod source;
mod type_ref;
mod types;
mod value;

pub use error::SchemaError;
pub use host::HostBindings;
pub use registry::TypeRegistry;
pub use source::{
    AttributeRecord, DirectorySource, FunctionRecord, ParameterRecord, SchemaDocument,
    SchemaSource, ServiceRecord, TypeRecord,
};
pub use type_ref::TypeRef;
pub use types::{
    Attribute, Coercion, Constructor, GenericType, MethodDefinition, Parameter, PrimitiveType,
    ServiceDefinition, StructuredType, TypeDefinition,
};
pub use value::{Object, ObjectRef, Shape, Value};
