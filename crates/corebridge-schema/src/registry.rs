//! The type registry: every type and service a client can talk about.
//!
//! A registry is built once from a [`SchemaSource`] and is read-only
//! afterwards, so it can sit behind an `Arc` and serve any number of
//! concurrent encode/decode calls without locking.
//!
//! # Load order
//!
//! 1. Built-in primitives and generics are registered.
//! 2. Explicit structured types are registered. A name that collides
//!    with a built-in is ignored with a warning.
//! 3. Services are registered. Any type a function signature mentions
//!    that nothing declares becomes an empty placeholder type.
//! 4. Inheritance is resolved depth-first: parents are merged into
//!    children before their own children see them, so file order never
//!    matters.
//! 5. Every attribute and signature type is checked to resolve.
//!
//! Any failure aborts the load; there is no partially built registry.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::source::{ServiceRecord, TypeRecord};
use crate::{
    Attribute, Coercion, GenericType, HostBindings, MethodDefinition, Parameter, PrimitiveType,
    SchemaError, SchemaSource, ServiceDefinition, StructuredType, TypeDefinition, TypeRef,
};

/// Built-in primitives: declared name, wire name, host coercion.
const PRIMITIVES: &[(&str, &str, Option<Coercion>)] = &[
    ("Integer", "int", Some(Coercion::Integer)),
    ("String", "string", Some(Coercion::Text)),
    ("Long", "long", Some(Coercion::Integer)),
    ("Float", "float", Some(Coercion::Float)),
    ("Boolean", "boolean", None),
    ("Double", "double", Some(Coercion::Float)),
    ("Date", "date", Some(Coercion::Timestamp)),
];

/// Built-in generics: declared name, wire name, arity.
const GENERICS: &[(&str, &str, usize)] = &[("Map", "map", 2), ("List", "list", 1), ("Set", "set", 1)];

/// Tags the codec itself uses; no type may claim them.
const RESERVED_NAMES: &[&str] = &["null"];

/// Index of type and service definitions, keyed by wire name.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDefinition>,
    /// Declared names of built-ins (`Integer`) to their wire names (`int`).
    aliases: HashMap<String, String>,
    services: HashMap<String, ServiceDefinition>,
}

impl TypeRegistry {
    /// A registry holding only the built-in types and no services.
    pub fn builtins() -> Self {
        let mut types = HashMap::new();
        let mut aliases = HashMap::new();

        for &(declared, wire, host) in PRIMITIVES {
            types.insert(
                wire.to_string(),
                TypeDefinition::Primitive(PrimitiveType {
                    wire_name: wire.to_string(),
                    host,
                }),
            );
            aliases.insert(declared.to_string(), wire.to_string());
        }
        for &(declared, wire, arity) in GENERICS {
            types.insert(
                wire.to_string(),
                TypeDefinition::Generic(GenericType {
                    wire_name: wire.to_string(),
                    arity,
                }),
            );
            aliases.insert(declared.to_string(), wire.to_string());
        }

        Self {
            types,
            aliases,
            services: HashMap::new(),
        }
    }

    /// Loads a registry with no host bindings; every structured type
    /// decodes as a map-shaped record.
    pub fn load(source: &impl SchemaSource) -> Result<Self, SchemaError> {
        Self::load_with(source, &HostBindings::new())
    }

    /// Loads a registry, binding host constructors to structured types.
    ///
    /// # Errors
    ///
    /// Any [`SchemaError`] other than the lookup variants: unreadable or
    /// unparseable sources, duplicate types or services, inheritance
    /// cycles, malformed type strings, and attribute types that resolve
    /// to nothing.
    pub fn load_with(source: &impl SchemaSource, hosts: &HostBindings) -> Result<Self, SchemaError> {
        let type_records = source.type_records()?;
        let service_records = source.service_records()?;

        let mut registry = Self::builtins();
        let mut explicit = HashSet::new();

        for record in type_records {
            if let Some(name) = registry.register_type(record, hosts)? {
                explicit.insert(name);
            }
        }
        for record in service_records {
            registry.register_service(record, hosts)?;
        }

        registry.resolve_inheritance(hosts)?;
        registry.validate()?;

        for name in &explicit {
            let unbound = registry
                .structured(name)
                .is_some_and(|ty| !ty.has_constructor());
            if unbound {
                warn!(type_name = %name, "no host binding, values decode as records");
            }
        }
        if let Some(unused) = hosts_without_type(hosts, &registry) {
            warn!(type_name = %unused, "host binding names no structured type");
        }

        debug!(
            types = registry.types.len(),
            services = registry.services.len(),
            "type registry loaded"
        );
        Ok(registry)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Looks a type up by wire name or by a built-in's declared name.
    pub fn lookup(&self, name: &str) -> Option<&TypeDefinition> {
        self.types
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|wire| self.types.get(wire)))
    }

    /// Like [`lookup`](Self::lookup), failing with `UndefinedType`.
    pub fn resolve_name(&self, name: &str) -> Result<&TypeDefinition, SchemaError> {
        self.lookup(name)
            .ok_or_else(|| SchemaError::UndefinedType(name.to_string()))
    }

    /// Resolves the base of a type reference. Type parameters are the
    /// caller's business; they are checked at load time.
    pub fn resolve(&self, ty: &TypeRef) -> Result<&TypeDefinition, SchemaError> {
        self.resolve_name(&ty.base)
    }

    /// The structured definition registered under `name`, if any.
    pub fn structured(&self, name: &str) -> Option<&StructuredType> {
        self.lookup(name).and_then(TypeDefinition::as_structured)
    }

    /// The wire name `name` is known by.
    pub fn wire_name(&self, name: &str) -> Option<&str> {
        self.lookup(name).map(TypeDefinition::wire_name)
    }

    pub fn resolve_service(&self, name: &str) -> Result<&ServiceDefinition, SchemaError> {
        self.services
            .get(name)
            .ok_or_else(|| SchemaError::UndefinedService(name.to_string()))
    }

    /// Whether `child` is `ancestor` or inherits from it, directly or not.
    pub fn is_subtype(&self, child: &str, ancestor: &str) -> bool {
        let mut current = self.structured(child);
        while let Some(ty) = current {
            if ty.wire_name == ancestor {
                return true;
            }
            current = ty.inherits_from.as_deref().and_then(|p| self.structured(p));
        }
        false
    }

    /// All registered types, in no particular order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// All registered services, in no particular order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Registers one explicit type. Returns its name, or `None` if a
    /// built-in shadows it.
    fn register_type(
        &mut self,
        record: TypeRecord,
        hosts: &HostBindings,
    ) -> Result<Option<String>, SchemaError> {
        let name = record.name.trim().to_string();
        check_type_name(&name)?;

        match self.lookup(&name) {
            Some(TypeDefinition::Structured(_)) => return Err(SchemaError::DuplicateType(name)),
            Some(_) => {
                warn!(type_name = %name, "schema type shadows a built-in, using the built-in");
                return Ok(None);
            }
            None => {}
        }

        let mut ty = StructuredType::new(name.clone());
        for attribute in record.attributes {
            if ty.attribute(&attribute.name).is_some() {
                return Err(SchemaError::Malformed(format!(
                    "type `{name}` declares attribute `{}` twice",
                    attribute.name
                )));
            }
            ty.attributes.push(Attribute {
                name: attribute.name,
                ty: TypeRef::parse(&attribute.ty)?,
            });
        }
        ty.inherits_from = record
            .inherits_from
            .map(|parent| parent.trim().to_string())
            .filter(|parent| !parent.is_empty());
        ty.constructor = hosts.get(&name);

        self.types.insert(name.clone(), TypeDefinition::Structured(ty));
        Ok(Some(name))
    }

    fn register_service(&mut self, record: ServiceRecord, hosts: &HostBindings) -> Result<(), SchemaError> {
        if self.services.contains_key(&record.name) {
            return Err(SchemaError::DuplicateService(record.name));
        }

        let mut methods = BTreeMap::new();
        for function in record.functions {
            if methods.contains_key(&function.name) {
                return Err(SchemaError::Malformed(format!(
                    "service `{}` declares function `{}` twice",
                    record.name, function.name
                )));
            }

            let mut parameters: Vec<Parameter> = Vec::with_capacity(function.parameters.len());
            for parameter in function.parameters {
                if parameters.iter().any(|p| p.name == parameter.name) {
                    return Err(SchemaError::Malformed(format!(
                        "function `{}` declares parameter `{}` twice",
                        function.name, parameter.name
                    )));
                }
                let ty = TypeRef::parse(&parameter.ty)?;
                self.ensure_signature_types(&ty, hosts);
                parameters.push(Parameter {
                    name: parameter.name,
                    ty,
                });
            }

            let return_type = match function.return_type.as_deref().map(str::trim) {
                Some(text) if !text.is_empty() => {
                    let ty = TypeRef::parse(text)?;
                    self.ensure_signature_types(&ty, hosts);
                    Some(ty)
                }
                _ => None,
            };

            methods.insert(
                function.name.clone(),
                MethodDefinition {
                    name: function.name,
                    description: function.description,
                    parameters,
                    return_type,
                },
            );
        }

        self.services.insert(
            record.name.clone(),
            ServiceDefinition {
                name: record.name,
                methods,
            },
        );
        Ok(())
    }

    /// Registers a placeholder for every type in a signature that
    /// nothing declares.
    fn ensure_signature_types(&mut self, ty: &TypeRef, hosts: &HostBindings) {
        let mut missing = Vec::new();
        ty.walk(&mut |t| {
            if self.lookup(&t.base).is_none() {
                missing.push(t.base.clone());
            }
        });
        for name in missing {
            self.insert_placeholder(name, hosts);
        }
    }

    fn insert_placeholder(&mut self, name: String, hosts: &HostBindings) {
        if self.types.contains_key(&name) {
            return;
        }
        warn!(type_name = %name, "type is referenced but never declared, registering a placeholder");
        let mut ty = StructuredType::placeholder(name.clone());
        ty.constructor = hosts.get(&name);
        self.types.insert(name, TypeDefinition::Structured(ty));
    }

    fn resolve_inheritance(&mut self, hosts: &HostBindings) -> Result<(), SchemaError> {
        let mut children: Vec<String> = self
            .types
            .values()
            .filter_map(TypeDefinition::as_structured)
            .filter(|ty| ty.inherits_from.is_some())
            .map(|ty| ty.wire_name.clone())
            .collect();
        children.sort();

        let mut done = HashSet::new();
        for name in children {
            let mut stack = Vec::new();
            self.merge_parent(&name, hosts, &mut done, &mut stack)?;
        }
        Ok(())
    }

    /// Merges the (already merged) parent of `name` into it.
    fn merge_parent(
        &mut self,
        name: &str,
        hosts: &HostBindings,
        done: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> Result<(), SchemaError> {
        if done.contains(name) {
            return Ok(());
        }
        if stack.iter().any(|n| n == name) {
            return Err(SchemaError::InheritanceCycle(name.to_string()));
        }

        let Some(parent) = self
            .structured(name)
            .and_then(|ty| ty.inherits_from.clone())
        else {
            done.insert(name.to_string());
            return Ok(());
        };

        match self.lookup(&parent) {
            Some(TypeDefinition::Structured(_)) => {}
            Some(other) => {
                return Err(SchemaError::Malformed(format!(
                    "type `{name}` inherits from non-structured type `{}`",
                    other.wire_name()
                )));
            }
            None => self.insert_placeholder(parent.clone(), hosts),
        }

        stack.push(name.to_string());
        self.merge_parent(&parent, hosts, done, stack)?;
        stack.pop();

        let inherited = match self.types.get_mut(&parent) {
            Some(TypeDefinition::Structured(p)) => {
                p.is_inherited = true;
                p.attributes.clone()
            }
            _ => Vec::new(),
        };
        if let Some(TypeDefinition::Structured(child)) = self.types.get_mut(name) {
            for attribute in inherited {
                if child.attribute(&attribute.name).is_none() {
                    child.attributes.push(attribute);
                }
            }
        }

        done.insert(name.to_string());
        Ok(())
    }

    /// Every attribute and signature type must resolve, and generics may
    /// not carry more parameters than they have slots.
    fn validate(&self) -> Result<(), SchemaError> {
        for ty in self.types.values().filter_map(TypeDefinition::as_structured) {
            for attribute in &ty.attributes {
                self.check_ref(&attribute.ty)?;
            }
        }
        for service in self.services.values() {
            for method in service.methods.values() {
                for parameter in &method.parameters {
                    self.check_ref(&parameter.ty)?;
                }
                if let Some(ty) = &method.return_type {
                    self.check_ref(ty)?;
                }
            }
        }
        Ok(())
    }

    fn check_ref(&self, ty: &TypeRef) -> Result<(), SchemaError> {
        let arity = match self.resolve(ty)? {
            TypeDefinition::Generic(generic) => generic.arity,
            _ => 0,
        };
        if ty.parameters.len() > arity {
            return Err(SchemaError::Malformed(format!(
                "`{ty}` has {} type parameters, `{}` takes {arity}",
                ty.parameters.len(),
                ty.base
            )));
        }
        ty.parameters.iter().try_for_each(|p| self.check_ref(p))
    }
}

fn check_type_name(name: &str) -> Result<(), SchemaError> {
    let valid = !name.is_empty()
        && !name.contains(['<', '>', ',', '/', '[', ']'])
        && !name.chars().any(char::is_whitespace)
        && !RESERVED_NAMES.contains(&name);
    if valid {
        Ok(())
    } else {
        Err(SchemaError::Malformed(format!("`{name}` is not a usable type name")))
    }
}

/// The first bound name (alphabetically) with no structured type behind it.
fn hosts_without_type(hosts: &HostBindings, registry: &TypeRegistry) -> Option<String> {
    let mut unused: Vec<&str> = hosts
        .names()
        .filter(|name| registry.structured(name).is_none())
        .collect();
    unused.sort_unstable();
    unused.first().map(|name| name.to_string())
}
