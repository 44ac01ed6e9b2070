//! Graph codec behaviour on realistic schemas: sharing, cycles,
//! inheritance and optional attributes.

use std::sync::Arc;

use corebridge_protocol::{Element, GraphCodec, ProtocolError, CLASS_ATTRIBUTE, REFERENCE_ATTRIBUTE};
use corebridge_schema::{
    HostBindings, Object, ObjectRef, SchemaDocument, Shape, TypeRecord, TypeRef, TypeRegistry, Value,
};

fn blank_employee() -> Object {
    Object::new("Employee")
}

fn codec() -> GraphCodec {
    let schema = SchemaDocument::new()
        .with_type(TypeRecord::new("Foo").attribute("name", "String"))
        .with_type(
            TypeRecord::new("Person")
                .attribute("name", "String")
                .attribute("age", "Integer")
                .attribute("friend", "Person"),
        )
        .with_type(
            TypeRecord::new("Employee")
                .inherits("Person")
                .attribute("salary", "Double"),
        )
        .with_type(
            TypeRecord::new("Team")
                .attribute("lead", "Person")
                .attribute("members", "List<Person>")
                .attribute("roles", "Map<String,Person>"),
        );
    let hosts = HostBindings::new().bind("Employee", blank_employee);
    GraphCodec::new(Arc::new(TypeRegistry::load_with(&schema, &hosts).unwrap()))
}

fn ty(text: &str) -> TypeRef {
    TypeRef::parse(text).unwrap()
}

fn person(name: &str) -> ObjectRef {
    ObjectRef::new(Object::new("Person").with("name", name))
}

// =========================================================================
// Sharing
// =========================================================================

#[test]
fn test_repeated_list_element_becomes_reference() {
    let codec = codec();
    let a = ObjectRef::new(Object::new("Foo").with("name", "a"));
    let b = ObjectRef::new(Object::new("Foo").with("name", "b"));
    let list = Value::List(vec![a.clone().into(), b.into(), a.into()]);

    let text = codec.encode_text(&ty("List<Foo>"), &list).unwrap();
    assert_eq!(
        text,
        r#"<list><Foo><name>a</name></Foo><Foo><name>b</name></Foo><Foo reference="../Foo"/></list>"#
    );

    let decoded = codec.decode_text(&text).unwrap();
    let items = decoded.as_slice().unwrap();
    assert_eq!(items.len(), 3);
    assert!(ObjectRef::ptr_eq(items[0].as_object().unwrap(), items[2].as_object().unwrap()));
    assert!(!ObjectRef::ptr_eq(items[0].as_object().unwrap(), items[1].as_object().unwrap()));
}

#[test]
fn test_shared_instance_decodes_as_one_object() {
    let codec = codec();
    let lead = person("Grace");
    let team = Object::new("Team")
        .with("lead", lead.clone())
        .with("members", vec![Value::from(person("Alan")), Value::from(lead)]);

    let tree = codec.encode(&ty("Team"), &Value::from(team)).unwrap();
    let members = tree.child("members").unwrap();
    assert_eq!(members.children()[1].attribute(REFERENCE_ATTRIBUTE), Some("../../lead"));

    let decoded = codec.decode(&tree).unwrap();
    let team = decoded.as_object().unwrap();
    let lead = team.get("lead").unwrap();
    let members = team.get("members").unwrap();
    let second = &members.as_slice().unwrap()[1];

    lead.as_object().unwrap().set("age", 85);
    assert_eq!(second.as_object().unwrap().get("age"), Some(Value::from(85)));
}

#[test]
fn test_shared_map_values_resolve_through_entries() {
    let codec = codec();
    let ada = person("Ada");
    let roles = Value::Map(vec![
        (Value::from("author"), Value::from(ada.clone())),
        (Value::from("reviewer"), Value::from(ada)),
    ]);
    let team = Object::new("Team").with("roles", roles);

    let tree = codec.encode(&ty("Team"), &Value::from(team)).unwrap();
    let second_entry = &tree.child("roles").unwrap().children()[1];
    assert_eq!(
        second_entry.children()[1].attribute(REFERENCE_ATTRIBUTE),
        Some("../../entry/Person")
    );

    let decoded = codec.decode(&tree).unwrap();
    let roles = decoded.as_object().unwrap().get("roles").unwrap();
    let entries = roles.as_entries().unwrap();
    assert!(ObjectRef::ptr_eq(
        entries[0].1.as_object().unwrap(),
        entries[1].1.as_object().unwrap()
    ));
}

#[test]
fn test_mutual_cycle_round_trips() {
    let codec = codec();
    let ada = person("Ada");
    let charles = person("Charles");
    ada.set("friend", charles.clone());
    charles.set("friend", ada.clone());

    let text = codec.encode_text(&ty("Person"), &Value::from(ada.clone())).unwrap();
    assert_eq!(
        text,
        concat!(
            r#"<Person class="Person"><name>Ada</name>"#,
            r#"<friend class="Person"><name>Charles</name><friend reference="../.."/></friend>"#,
            "</Person>"
        )
    );

    let decoded = codec.decode_text(&text).unwrap();
    assert_eq!(decoded, Value::from(ada));
    let root = decoded.as_object().unwrap();
    let back = root.get("friend").unwrap().as_object().unwrap().get("friend").unwrap();
    assert!(ObjectRef::ptr_eq(root, back.as_object().unwrap()));
}

#[test]
fn test_each_call_starts_with_empty_reference_map() {
    let codec = codec();
    let shared = Value::from(person("Ada"));
    let first = codec.encode_text(&ty("Person"), &shared).unwrap();
    let second = codec.encode_text(&ty("Person"), &shared).unwrap();
    assert_eq!(first, second);
    assert!(!second.contains(REFERENCE_ATTRIBUTE));
}

// =========================================================================
// Inheritance
// =========================================================================

#[test]
fn test_subtype_through_parent_field_carries_class() {
    let codec = codec();
    let boss = Object::new("Employee")
        .with("name", "Grace")
        .with("age", 40)
        .with("salary", 1000.5);
    let team = Object::new("Team").with("lead", boss);

    let tree = codec.encode(&ty("Team"), &Value::from(team)).unwrap();
    let lead = tree.child("lead").unwrap();
    assert_eq!(lead.attribute(CLASS_ATTRIBUTE), Some("Employee"));
    let fields: Vec<&str> = lead.children().iter().map(Element::tag).collect();
    assert_eq!(fields, ["salary", "name", "age"]);

    let decoded = codec.decode(&tree).unwrap();
    let lead = decoded.as_object().unwrap().get("lead").unwrap();
    let lead = lead.as_object().unwrap();
    assert_eq!(lead.type_name(), "Employee");
    assert_eq!(lead.read().shape(), Shape::Instance);
    assert_eq!(lead.get("salary"), Some(Value::Float(1000.5)));
}

#[test]
fn test_list_of_parent_type_keeps_concrete_types() {
    let codec = codec();
    let members = Value::List(vec![
        Value::from(person("Alan")),
        Value::from(Object::new("Employee").with("name", "Grace")),
    ]);

    let tree = codec.encode(&ty("List<Person>"), &members).unwrap();
    let tags: Vec<&str> = tree.children().iter().map(Element::tag).collect();
    assert_eq!(tags, ["Person", "Employee"]);

    let decoded = codec.decode(&tree).unwrap();
    let items = decoded.as_slice().unwrap();
    assert_eq!(items[0].as_object().unwrap().type_name(), "Person");
    assert_eq!(items[1].as_object().unwrap().type_name(), "Employee");
}

#[test]
fn test_encode_rejects_unrelated_structured_type() {
    let codec = codec();
    let team = Object::new("Team").with("lead", Object::new("Foo").with("name", "x"));
    match codec.encode(&ty("Team"), &Value::from(team)) {
        Err(ProtocolError::TypeMismatch { expected, found }) => {
            assert_eq!(expected, "Person");
            assert_eq!(found, "Foo");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}

#[test]
fn test_class_naming_non_subtype_fails() {
    let codec = codec();
    let result = codec.decode_text(
        r#"<Person><name>Ada</name><friend class="Foo"><name>Bob</name></friend></Person>"#,
    );
    assert!(matches!(result, Err(ProtocolError::Decode(_))));
}

// =========================================================================
// Optional attributes and round trips
// =========================================================================

#[test]
fn test_absent_attribute_has_no_tag_and_stays_absent() {
    let codec = codec();
    let ada = Value::from(Object::new("Person").with("name", "Ada"));
    let text = codec.encode_text(&ty("Person"), &ada).unwrap();
    assert_eq!(text, r#"<Person class="Person"><name>Ada</name></Person>"#);

    let decoded = codec.decode_text(&text).unwrap();
    let object = decoded.as_object().unwrap();
    assert_eq!(object.get("age"), None);
    assert_eq!(object.get("friend"), None);
}

#[test]
fn test_tree_without_sharing_round_trips() {
    let codec = codec();
    let team = Value::from(
        Object::new("Team")
            .with("lead", Object::new("Person").with("name", "Grace").with("age", 40))
            .with(
                "members",
                vec![
                    Value::from(Object::new("Person").with("name", "Alan")),
                    Value::from(Object::new("Employee").with("name", "Joan").with("salary", 2.0)),
                ],
            )
            .with(
                "roles",
                Value::Map(vec![(
                    Value::from("tester"),
                    Value::from(Object::new("Person").with("name", "Edsger")),
                )]),
            ),
    );

    let text = codec.encode_text(&ty("Team"), &team).unwrap();
    assert_eq!(codec.decode_text(&text).unwrap(), team);
}
