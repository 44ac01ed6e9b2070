//! Graph codec: dynamic values to tagged trees and back.
//!
//! Encoding walks a [`Value`] against a declared [`TypeRef`]. Decoding
//! reads the tags back against the registry. Both directions handle
//! object graphs with shared nodes and cycles: the second time the
//! encoder meets the same [`ObjectRef`] it writes a reference leaf
//! instead of the object, and the decoder turns that leaf back into the
//! same shared handle.
//!
//! # Tags
//!
//! | position                          | tag                          |
//! |-----------------------------------|------------------------------|
//! | top level, list/set element, map key or value | wire name of the value's type |
//! | structured attribute              | attribute name               |
//! | map entry                         | `entry` (key, then value)    |
//! | null element                      | `null`                       |
//!
//! Attributes whose value is null are not written at all.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use corebridge_protocol::GraphCodec;
//! use corebridge_schema::{Object, SchemaDocument, TypeRecord, TypeRef, TypeRegistry, Value};
//!
//! let schema = SchemaDocument::new().with_type(TypeRecord::new("Foo").attribute("name", "String"));
//! let codec = GraphCodec::new(Arc::new(TypeRegistry::load(&schema).unwrap()));
//!
//! let ada = Value::from(Object::new("Foo").with("name", "Ada"));
//! let text = codec.encode_text(&TypeRef::named("Foo"), &ada).unwrap();
//! assert_eq!(text, "<Foo><name>Ada</name></Foo>");
//! assert_eq!(codec.decode_text(&text).unwrap(), ada);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use corebridge_schema::{
    Coercion, ObjectRef, PrimitiveType, StructuredType, TypeDefinition, TypeRef, TypeRegistry,
    Value,
};
use tracing::warn;

use crate::path::{self, Segment, Siblings, Step};
use crate::{timestamp, Element, ProtocolError, MAX_DEPTH};

/// Marks an element that stands for an already-written object.
pub const REFERENCE_ATTRIBUTE: &str = "reference";
/// Names the concrete type of a value written through an inherited type.
pub const CLASS_ATTRIBUTE: &str = "class";
/// Tag of a null element.
pub const NULL_TAG: &str = "null";
/// Tag of one map entry.
pub const ENTRY_TAG: &str = "entry";

/// Encodes and decodes values against a shared type registry.
///
/// The codec itself holds no per-call state: every `encode` and `decode`
/// starts from an empty reference map, so one codec can serve any number
/// of concurrent calls.
#[derive(Debug, Clone)]
pub struct GraphCodec {
    registry: Arc<TypeRegistry>,
}

impl GraphCodec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Encodes `value` as a value of the declared type.
    ///
    /// # Errors
    /// [`ProtocolError::TypeMismatch`] if the value doesn't fit the type,
    /// [`ProtocolError::UnknownType`] for objects of unregistered types,
    /// [`ProtocolError::TooDeep`] past [`MAX_DEPTH`] levels of nesting.
    pub fn encode(&self, declared: &TypeRef, value: &Value) -> Result<Element, ProtocolError> {
        Encoder::new(&self.registry).encode_root(Some(declared), value)
    }

    /// Encodes `value` with no declared type; tags come from the value.
    pub fn encode_value(&self, value: &Value) -> Result<Element, ProtocolError> {
        Encoder::new(&self.registry).encode_root(None, value)
    }

    /// Decodes a tree produced by [`encode`](Self::encode).
    ///
    /// # Errors
    /// [`ProtocolError::UnknownType`] for tags that name no type,
    /// [`ProtocolError::Decode`] for malformed leaves, dangling
    /// references and trees nested past [`MAX_DEPTH`].
    pub fn decode(&self, tree: &Element) -> Result<Value, ProtocolError> {
        Decoder::new(&self.registry).decode_element(tree, None, None)
    }

    /// [`encode`](Self::encode), rendered as XML text.
    pub fn encode_text(&self, declared: &TypeRef, value: &Value) -> Result<String, ProtocolError> {
        self.encode(declared, value)?.to_xml()
    }

    /// [`decode`](Self::decode) from XML text.
    pub fn decode_text(&self, text: &str) -> Result<Value, ProtocolError> {
        self.decode(&Element::parse(text)?)
    }
}

fn mismatch(expected: impl ToString, value: &Value) -> ProtocolError {
    ProtocolError::TypeMismatch {
        expected: expected.to_string(),
        found: value.kind().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// State of one encode call.
struct Encoder<'r> {
    registry: &'r TypeRegistry,
    /// Position of the element being written.
    path: Vec<Segment>,
    /// Object identity to the position of its first occurrence. The
    /// handle keeps the object alive so no identity is reused mid-call.
    seen: HashMap<usize, (Vec<Segment>, ObjectRef)>,
}

impl<'r> Encoder<'r> {
    fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            path: Vec::new(),
            seen: HashMap::new(),
        }
    }

    fn encode_root(&mut self, declared: Option<&TypeRef>, value: &Value) -> Result<Element, ProtocolError> {
        let tag = self.tag_for(declared, value)?;
        self.path.push(Segment::new(tag.clone(), 1));
        let element = self.encode_node(tag, declared, value);
        self.path.pop();
        element
    }

    /// Encodes a value that is tagged by its type (element, key or value).
    fn encode_tagged(
        &mut self,
        siblings: &mut Siblings,
        declared: Option<&TypeRef>,
        value: &Value,
    ) -> Result<Element, ProtocolError> {
        let tag = self.tag_for(declared, value)?;
        self.encode_child(siblings, tag, declared, value)
    }

    fn encode_child(
        &mut self,
        siblings: &mut Siblings,
        tag: String,
        declared: Option<&TypeRef>,
        value: &Value,
    ) -> Result<Element, ProtocolError> {
        self.path.push(siblings.next(&tag));
        let element = self.encode_node(tag, declared, value);
        self.path.pop();
        element
    }

    fn encode_node(
        &mut self,
        tag: String,
        declared: Option<&TypeRef>,
        value: &Value,
    ) -> Result<Element, ProtocolError> {
        if self.path.len() > MAX_DEPTH {
            return Err(ProtocolError::TooDeep { limit: MAX_DEPTH });
        }

        let registry = self.registry;
        let definition = declared.map(|ty| registry.resolve(ty)).transpose()?;

        match value {
            Value::Null => Ok(Element::new(tag)),
            Value::Object(object) => self.encode_object(tag, declared, definition, object),
            Value::List(items) | Value::Set(items) => {
                match definition {
                    None => {}
                    Some(TypeDefinition::Generic(g)) if g.arity == 1 => {}
                    Some(_) => return Err(mismatch(display(declared), value)),
                }
                let element_type = declared.and_then(|ty| ty.parameters.first());
                let mut container = Element::new(tag);
                let mut siblings = Siblings::default();
                for item in items {
                    container.push(self.encode_tagged(&mut siblings, element_type, item)?);
                }
                Ok(container)
            }
            Value::Map(entries) => {
                match definition {
                    None => {}
                    Some(TypeDefinition::Generic(g)) if g.arity == 2 => {}
                    Some(_) => return Err(mismatch(display(declared), value)),
                }
                let key_type = declared.and_then(|ty| ty.parameters.first());
                let value_type = declared.and_then(|ty| ty.parameters.get(1));
                let mut container = Element::new(tag);
                let mut siblings = Siblings::default();
                for (key, item) in entries {
                    self.path.push(siblings.next(ENTRY_TAG));
                    let entry = self.encode_entry(key_type, key, value_type, item);
                    self.path.pop();
                    container.push(entry?);
                }
                Ok(container)
            }
            primitive => {
                if let Some(definition) = definition {
                    check_primitive(definition, declared, primitive)?;
                }
                Ok(Element::leaf(tag, render_primitive(primitive)))
            }
        }
    }

    fn encode_entry(
        &mut self,
        key_type: Option<&TypeRef>,
        key: &Value,
        value_type: Option<&TypeRef>,
        value: &Value,
    ) -> Result<Element, ProtocolError> {
        let mut siblings = Siblings::default();
        let key = self.encode_tagged(&mut siblings, key_type, key)?;
        let value = self.encode_tagged(&mut siblings, value_type, value)?;
        Ok(Element::new(ENTRY_TAG).with_child(key).with_child(value))
    }

    fn encode_object(
        &mut self,
        tag: String,
        declared: Option<&TypeRef>,
        definition: Option<&TypeDefinition>,
        object: &ObjectRef,
    ) -> Result<Element, ProtocolError> {
        if let Some((first, _)) = self.seen.get(&object.id()) {
            let reference = path::relative(&self.path, first);
            return Ok(Element::new(tag).with_attribute(REFERENCE_ATTRIBUTE, reference));
        }

        let registry = self.registry;
        let type_name = object.type_name();
        let concrete = registry
            .structured(&type_name)
            .ok_or_else(|| ProtocolError::UnknownType(type_name.clone()))?;

        let mut element = Element::new(tag);
        match definition {
            None => {}
            Some(TypeDefinition::Structured(parent)) => {
                if !registry.is_subtype(&concrete.wire_name, &parent.wire_name) {
                    return Err(ProtocolError::TypeMismatch {
                        expected: display(declared),
                        found: concrete.wire_name.clone(),
                    });
                }
                if parent.is_inherited {
                    element.set_attribute(CLASS_ATTRIBUTE, concrete.wire_name.clone());
                }
            }
            Some(_) => {
                return Err(ProtocolError::TypeMismatch {
                    expected: display(declared),
                    found: concrete.wire_name.clone(),
                });
            }
        }

        self.seen.insert(object.id(), (self.path.clone(), object.clone()));

        // Snapshot the fields so no lock is held while descending.
        let fields: Vec<(&str, &TypeRef, Value)> = {
            let guard = object.read();
            concrete
                .attributes
                .iter()
                .filter_map(|a| guard.get(&a.name).map(|v| (a.name.as_str(), &a.ty, v.clone())))
                .collect()
        };

        let mut siblings = Siblings::default();
        for (name, ty, value) in &fields {
            element.push(self.encode_child(&mut siblings, name.to_string(), Some(*ty), value)?);
        }
        Ok(element)
    }

    /// The tag a type-tagged position uses for `value`.
    fn tag_for(&self, declared: Option<&TypeRef>, value: &Value) -> Result<String, ProtocolError> {
        let declared_wire = declared.and_then(|ty| self.registry.wire_name(&ty.base));
        let tag = match value {
            Value::Null => NULL_TAG,
            Value::Object(object) => {
                let type_name = object.type_name();
                return self
                    .registry
                    .wire_name(&type_name)
                    .map(str::to_string)
                    .ok_or(ProtocolError::UnknownType(type_name));
            }
            Value::List(_) | Value::Set(_) | Value::Map(_) => match declared_wire {
                Some(wire) if matches!(self.registry.lookup(wire), Some(TypeDefinition::Generic(_))) => wire,
                _ => default_tag(value),
            },
            _ => match declared_wire {
                Some(wire) if matches!(self.registry.lookup(wire), Some(TypeDefinition::Primitive(_))) => wire,
                _ => default_tag(value),
            },
        };
        Ok(tag.to_string())
    }
}

/// Wire name used for a value when nothing more specific is declared.
fn default_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => NULL_TAG,
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "long",
        Value::Float(_) => "double",
        Value::String(_) => "string",
        Value::Timestamp(_) => "date",
        Value::List(_) => "list",
        Value::Set(_) => "set",
        Value::Map(_) => "map",
        Value::Object(_) => "object",
    }
}

fn display(declared: Option<&TypeRef>) -> String {
    declared.map_or_else(|| "any".to_string(), TypeRef::to_string)
}

fn check_primitive(
    definition: &TypeDefinition,
    declared: Option<&TypeRef>,
    value: &Value,
) -> Result<(), ProtocolError> {
    let TypeDefinition::Primitive(PrimitiveType { host, .. }) = definition else {
        return Err(mismatch(display(declared), value));
    };
    let fits = match (host, value) {
        (None, Value::Boolean(_)) => true,
        (Some(Coercion::Integer), Value::Integer(_)) => true,
        (Some(Coercion::Float), Value::Float(_) | Value::Integer(_)) => true,
        (Some(Coercion::Text), Value::String(_)) => true,
        (Some(Coercion::Timestamp), Value::Timestamp(_)) => true,
        _ => false,
    };
    if fits { Ok(()) } else { Err(mismatch(display(declared), value)) }
}

fn render_primitive(value: &Value) -> String {
    match value {
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Timestamp(at) => timestamp::format(at),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

type SlotId = usize;

/// One decoded container: an object, list, set, map or map entry.
#[derive(Default)]
struct Slot {
    parent: Option<SlotId>,
    /// Set for structured values only; references can point at these.
    object: Option<ObjectRef>,
    /// Every child element in document order, with its slot if it is a
    /// container.
    children: Vec<(String, Option<SlotId>)>,
}

/// State of one decode call: an arena of slots with parent edges.
struct Decoder<'r> {
    registry: &'r TypeRegistry,
    slots: Vec<Slot>,
    /// Elements currently being decoded, outermost first.
    depth: usize,
}

impl<'r> Decoder<'r> {
    fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            depth: 0,
        }
    }

    /// Records a child edge on `parent` and returns the new child's slot,
    /// if the child is a container.
    fn link(&mut self, parent: Option<SlotId>, tag: &str, container: bool) -> Option<SlotId> {
        let slot = container.then(|| {
            self.slots.push(Slot {
                parent,
                ..Slot::default()
            });
            self.slots.len() - 1
        });
        if let Some(parent) = parent {
            self.slots[parent].children.push((tag.to_string(), slot));
        }
        slot
    }

    /// Decodes one element. `declared` is the attribute type for
    /// structured fields and `None` where the tag names the type.
    fn decode_element(
        &mut self,
        element: &Element,
        parent: Option<SlotId>,
        declared: Option<&TypeRef>,
    ) -> Result<Value, ProtocolError> {
        if self.depth == MAX_DEPTH {
            return Err(ProtocolError::Decode(format!(
                "value nests deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let value = self.decode_node(element, parent, declared);
        self.depth -= 1;
        value
    }

    fn decode_node(
        &mut self,
        element: &Element,
        parent: Option<SlotId>,
        declared: Option<&TypeRef>,
    ) -> Result<Value, ProtocolError> {
        if let Some(reference) = element.attribute(REFERENCE_ATTRIBUTE) {
            self.link(parent, element.tag(), false);
            return self.resolve_reference(parent, reference).map(Value::Object);
        }

        let definition = match declared {
            Some(ty) => self.field_type(ty, element)?,
            None if element.tag() == NULL_TAG => {
                self.link(parent, element.tag(), false);
                return Ok(Value::Null);
            }
            None => self.tagged_type(element)?,
        };

        match definition {
            TypeDefinition::Primitive(primitive) => {
                self.link(parent, element.tag(), false);
                decode_primitive(primitive, element.text())
            }
            TypeDefinition::Generic(generic) => {
                let slot = self.link(parent, element.tag(), true);
                match generic.wire_name.as_str() {
                    "map" => self.decode_map(element, slot),
                    "set" => self.decode_sequence(element, slot).map(Value::Set),
                    _ => self.decode_sequence(element, slot).map(Value::List),
                }
            }
            TypeDefinition::Structured(structured) => {
                let slot = self.link(parent, element.tag(), true);
                self.decode_object(element, slot, structured)
            }
        }
    }

    /// The type of an element tagged with a wire name.
    fn tagged_type(&self, element: &Element) -> Result<&'r TypeDefinition, ProtocolError> {
        let name = element.attribute(CLASS_ATTRIBUTE).unwrap_or(element.tag());
        self.registry
            .lookup(name)
            .ok_or_else(|| ProtocolError::UnknownType(name.to_string()))
    }

    /// The type of a structured attribute: the declared one, or the
    /// subtype named by `class` when the declared type is inherited.
    fn field_type(&self, declared: &TypeRef, element: &Element) -> Result<&'r TypeDefinition, ProtocolError> {
        let definition = self.registry.resolve(declared)?;
        let class = match (definition, element.attribute(CLASS_ATTRIBUTE)) {
            (TypeDefinition::Structured(parent), Some(class)) if parent.is_inherited => class,
            _ => return Ok(definition),
        };

        let concrete = self
            .registry
            .lookup(class)
            .ok_or_else(|| ProtocolError::UnknownType(class.to_string()))?;
        if !self.registry.is_subtype(concrete.wire_name(), definition.wire_name()) {
            return Err(ProtocolError::Decode(format!(
                "`{class}` is not a subtype of `{}`",
                definition.wire_name()
            )));
        }
        Ok(concrete)
    }

    fn decode_object(
        &mut self,
        element: &Element,
        slot: Option<SlotId>,
        structured: &'r StructuredType,
    ) -> Result<Value, ProtocolError> {
        let object = ObjectRef::new(structured.instantiate());
        if let Some(slot) = slot {
            self.slots[slot].object = Some(object.clone());
        }

        for child in element.children() {
            let Some(attribute) = structured.attribute(child.tag()) else {
                warn!(
                    type_name = %structured.wire_name,
                    field = %child.tag(),
                    "skipping field not declared on type"
                );
                self.link(slot, child.tag(), false);
                continue;
            };
            let value = self.decode_element(child, slot, Some(&attribute.ty))?;
            object.set(attribute.name.clone(), value);
        }
        Ok(Value::Object(object))
    }

    fn decode_sequence(&mut self, element: &Element, slot: Option<SlotId>) -> Result<Vec<Value>, ProtocolError> {
        element
            .children()
            .iter()
            .map(|child| self.decode_element(child, slot, None))
            .collect()
    }

    fn decode_map(&mut self, element: &Element, slot: Option<SlotId>) -> Result<Value, ProtocolError> {
        let mut entries = Vec::with_capacity(element.children().len());
        for entry in element.children() {
            let [key, value] = entry.children() else {
                return Err(ProtocolError::Decode(format!(
                    "map entry needs a key and a value, found {} children",
                    entry.children().len()
                )));
            };
            if entry.tag() != ENTRY_TAG {
                return Err(ProtocolError::Decode(format!(
                    "expected `{ENTRY_TAG}` in map, found `{}`",
                    entry.tag()
                )));
            }
            let entry_slot = self.link(slot, ENTRY_TAG, true);
            let key = self.decode_element(key, entry_slot, None)?;
            let value = self.decode_element(value, entry_slot, None)?;
            entries.push((key, value));
        }
        Ok(Value::Map(entries))
    }

    /// Follows a reference path from the reference element, whose parent
    /// container is `parent`.
    fn resolve_reference(&self, parent: Option<SlotId>, reference: &str) -> Result<ObjectRef, ProtocolError> {
        let dangling = |why: &str| ProtocolError::Decode(format!("reference `{reference}` {why}"));

        let steps = path::parse(reference)?;
        let mut cursor = parent.ok_or_else(|| dangling("has no enclosing element"))?;

        // The first step leaves the reference element itself.
        for step in &steps[1..] {
            cursor = match step {
                Step::Up => self.slots[cursor]
                    .parent
                    .ok_or_else(|| dangling("climbs above the root"))?,
                Step::Down(segment) => self.slots[cursor]
                    .children
                    .iter()
                    .filter(|(tag, _)| *tag == segment.tag)
                    .nth(segment.index - 1)
                    .and_then(|(_, slot)| *slot)
                    .ok_or_else(|| dangling("names no decoded value"))?,
            };
        }

        self.slots[cursor]
            .object
            .clone()
            .ok_or_else(|| dangling("does not point at an object"))
    }
}

fn decode_primitive(primitive: &PrimitiveType, text: &str) -> Result<Value, ProtocolError> {
    let bad = |e: &dyn std::fmt::Display| {
        ProtocolError::Decode(format!("bad `{}` value `{text}`: {e}", primitive.wire_name))
    };
    match primitive.host {
        None => match text.trim() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            other => Err(bad(&format!("`{other}` is not true or false"))),
        },
        Some(Coercion::Integer) => text.trim().parse().map(Value::Integer).map_err(|e| bad(&e)),
        Some(Coercion::Float) => text.trim().parse().map(Value::Float).map_err(|e| bad(&e)),
        Some(Coercion::Text) => Ok(Value::String(text.to_string())),
        Some(Coercion::Timestamp) => timestamp::parse(text).map(Value::Timestamp),
    }
}
