//! Host bindings: which constructor builds which structured type.

use std::collections::HashMap;

use crate::Constructor;

/// Explicit mapping from wire type name to the host constructor that
/// builds decoded values of that type.
///
/// Types left unbound still load; they decode as map-shaped records.
///
/// ```rust
/// use corebridge_schema::{HostBindings, Object};
///
/// fn blank_person() -> Object {
///     Object::new("com.example.Person")
/// }
///
/// let hosts = HostBindings::new().bind("com.example.Person", blank_person);
/// assert!(hosts.get("com.example.Person").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HostBindings {
    constructors: HashMap<String, Constructor>,
}

impl HostBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a constructor to a wire type name, replacing any earlier one.
    pub fn bind(mut self, wire_name: impl Into<String>, constructor: Constructor) -> Self {
        self.constructors.insert(wire_name.into(), constructor);
        self
    }

    /// The constructor bound to a wire type name.
    pub fn get(&self, wire_name: &str) -> Option<Constructor> {
        self.constructors.get(wire_name).copied()
    }

    /// Every bound wire name.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}
