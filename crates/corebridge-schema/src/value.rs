//! Dynamic values typed against the registry.
//!
//! Decoded payloads are object graphs that may share nodes or contain
//! cycles, so structured values live behind [`ObjectRef`], a shared
//! handle whose pointer is the object's identity. Everything else is a
//! plain value.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A value that can be encoded against a declared type.
#[derive(Clone)]
pub enum Value {
    /// Absent. An attribute holding `Null` is not written to the wire.
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// An instant. The wire carries milliseconds, so anything finer is
    /// lost in transit. `Value::from` on a `DateTime<Utc>` truncates up
    /// front.
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Set(Vec<Value>),
    /// Key/value pairs in wire order.
    Map(Vec<(Value, Value)>),
    Object(ObjectRef),
}

impl Value {
    /// Short name of the value's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Entries of a map.
    pub fn as_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Structural equality that terminates on cyclic graphs: a pair of
    /// objects already under comparison is assumed equal.
    fn graph_eq(&self, other: &Self, visiting: &mut HashSet<(usize, usize)>) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.graph_eq(y, visiting))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| {
                        ka.graph_eq(kb, visiting) && va.graph_eq(vb, visiting)
                    })
            }
            (Self::Object(a), Self::Object(b)) => a.graph_eq(b, visiting),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.graph_eq(other, &mut HashSet::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Integer(i) => write!(f, "Integer({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Timestamp(t) => write!(f, "Timestamp({t})"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Object(o) => fmt::Debug::fmt(o, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t.trunc_subsecs(3))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Self::Object(ObjectRef::new(o))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Whether an object came from a bound host constructor or is a plain
/// attribute bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Built by a host constructor registered for its type.
    Instance,
    /// Map-shaped record for a type with no host binding.
    Record,
}

/// A structured value: its concrete type and its attributes.
#[derive(Clone)]
pub struct Object {
    type_name: String,
    shape: Shape,
    fields: Vec<(String, Value)>,
}

impl Object {
    /// A host instance of the given concrete type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            shape: Shape::Instance,
            fields: Vec::new(),
        }
    }

    /// A map-shaped record of the given type.
    pub fn record(type_name: impl Into<String>) -> Self {
        Self {
            shape: Shape::Record,
            ..Self::new(type_name)
        }
    }

    /// Sets a field, returning the object for chaining.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// The concrete type's wire name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Sets or replaces a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Returns a field's value; `None` when unset or set to `Null`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(index).1)
    }

    /// Fields in insertion order, including ones set to `Null`.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

/// Shared, mutable handle to an [`Object`].
///
/// Cloning the handle shares the object; mutations through one clone are
/// visible through all of them. Equality is structural (see [`Value`]);
/// use [`ObjectRef::ptr_eq`] to test identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.0.write()
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Identity key, stable for the object's lifetime.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// The concrete type's wire name.
    pub fn type_name(&self) -> String {
        self.read().type_name.clone()
    }

    /// Clones a field's value (shallow for nested objects).
    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    /// Sets or replaces a field.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.write().set(name, value);
    }

    fn graph_eq(&self, other: &Self, visiting: &mut HashSet<(usize, usize)>) -> bool {
        if Self::ptr_eq(self, other) || !visiting.insert((self.id(), other.id())) {
            return true;
        }
        // Snapshot the fields so no lock is held while recursing.
        let (a_type, a_fields) = self.snapshot();
        let (b_type, b_fields) = other.snapshot();
        if a_type != b_type {
            return false;
        }
        let a_present: Vec<_> = a_fields.iter().filter(|(_, v)| !v.is_null()).collect();
        let b_present: Vec<_> = b_fields.iter().filter(|(_, v)| !v.is_null()).collect();
        a_present.len() == b_present.len()
            && a_present.iter().all(|(name, a)| {
                b_present
                    .iter()
                    .find(|(n, _)| n == name)
                    .is_some_and(|(_, b)| a.graph_eq(b, visiting))
            })
    }

    fn snapshot(&self) -> (String, Vec<(String, Value)>) {
        let object = self.read();
        (object.type_name.clone(), object.fields.clone())
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.graph_eq(other, &mut HashSet::new())
    }
}

thread_local! {
    static DEBUG_VISITING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.id();
        let first_visit = DEBUG_VISITING.with(|v| v.borrow_mut().insert(id));
        let (type_name, fields) = self.snapshot();
        if !first_visit {
            return write!(f, "{type_name} {{ <cycle> }}");
        }
        let mut out = f.debug_struct(&type_name);
        for (name, value) in &fields {
            out.field(name, value);
        }
        let result = out.finish();
        DEBUG_VISITING.with(|v| v.borrow_mut().remove(&id));
        result
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(&self.type_name);
        for (name, value) in &self.fields {
            out.field(name, value);
        }
        out.finish()
    }
}
