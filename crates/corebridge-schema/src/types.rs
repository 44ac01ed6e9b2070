//! Type and service definitions held by the registry.

use std::collections::BTreeMap;

use crate::{Object, SchemaError, TypeRef};

// ---------------------------------------------------------------------------
// Type definitions
// ---------------------------------------------------------------------------

/// How a primitive's wire text is coerced into a host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Parsed as a signed integer.
    Integer,
    /// Parsed as a floating point number.
    Float,
    /// Taken verbatim.
    Text,
    /// Parsed with the fixed `YYYYMMDDThhmmss.mmm` UTC format.
    Timestamp,
}

/// A leaf type rendered as text (`int`, `string`, `date`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveType {
    /// Tag used on the wire.
    pub wire_name: String,
    /// Coercion target; `None` for booleans, which decode from the
    /// literal token instead.
    pub host: Option<Coercion>,
}

/// A container type whose parameters are filled per use site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericType {
    /// Tag used on the wire (`map`, `list`, `set`).
    pub wire_name: String,
    /// Number of type parameter slots.
    pub arity: usize,
}

/// Builds the host object a structured type decodes into.
pub type Constructor = fn() -> Object;

/// One declared attribute of a structured type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name; also its tag on the wire.
    pub name: String,
    /// Declared type, including any type parameters.
    pub ty: TypeRef,
}

/// A named record type.
#[derive(Debug, Clone)]
pub struct StructuredType {
    /// Tag used on the wire; also the registry key.
    pub wire_name: String,
    /// Attributes in declaration order. After inheritance resolution this
    /// includes every inherited attribute the type doesn't redeclare.
    pub attributes: Vec<Attribute>,
    /// Name of the parent type, if any.
    pub inherits_from: Option<String>,
    /// `true` once some other type inherits from this one; values typed
    /// as this type then carry a `class` marker on the wire.
    pub is_inherited: bool,
    /// `true` for types that only exist because something referenced them.
    pub is_placeholder: bool,
    pub(crate) constructor: Option<Constructor>,
}

impl StructuredType {
    pub(crate) fn new(wire_name: impl Into<String>) -> Self {
        Self {
            wire_name: wire_name.into(),
            attributes: Vec::new(),
            inherits_from: None,
            is_inherited: false,
            is_placeholder: false,
            constructor: None,
        }
    }

    pub(crate) fn placeholder(wire_name: impl Into<String>) -> Self {
        Self {
            is_placeholder: true,
            ..Self::new(wire_name)
        }
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Whether a host constructor is bound to this type.
    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// Creates the empty object a decoded value of this type starts from:
    /// the bound host object, or a map-shaped record if nothing is bound.
    pub fn instantiate(&self) -> Object {
        match self.constructor {
            Some(construct) => construct(),
            None => Object::record(self.wire_name.clone()),
        }
    }
}

/// Any type the registry knows about.
#[derive(Debug, Clone)]
pub enum TypeDefinition {
    Primitive(PrimitiveType),
    Generic(GenericType),
    Structured(StructuredType),
}

impl TypeDefinition {
    /// The tag this type uses on the wire.
    pub fn wire_name(&self) -> &str {
        match self {
            Self::Primitive(p) => &p.wire_name,
            Self::Generic(g) => &g.wire_name,
            Self::Structured(s) => &s.wire_name,
        }
    }

    /// Returns the structured definition, if this is one.
    pub fn as_structured(&self) -> Option<&StructuredType> {
        match self {
            Self::Structured(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Service definitions
// ---------------------------------------------------------------------------

/// One named parameter of a service function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
}

/// A function exposed by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// `None` for functions that return no data.
    pub return_type: Option<TypeRef>,
}

impl MethodDefinition {
    /// Looks up a parameter's declared type.
    ///
    /// # Errors
    /// [`SchemaError::UndefinedParameter`] if the function has no such parameter.
    pub fn parameter(&self, name: &str) -> Result<&TypeRef, SchemaError> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.ty)
            .ok_or_else(|| SchemaError::UndefinedParameter {
                function: self.name.clone(),
                parameter: name.to_string(),
            })
    }

    /// Whether a call to this function produces a data payload.
    pub fn returns_data(&self) -> bool {
        self.return_type.is_some()
    }
}

/// A remote service and its functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub methods: BTreeMap<String, MethodDefinition>,
}

impl ServiceDefinition {
    /// Looks up a function by name.
    ///
    /// # Errors
    /// [`SchemaError::UndefinedFunction`] if the service has no such function.
    pub fn method(&self, name: &str) -> Result<&MethodDefinition, SchemaError> {
        self.methods
            .get(name)
            .ok_or_else(|| SchemaError::UndefinedFunction {
                service: self.name.clone(),
                function: name.to_string(),
            })
    }
}
