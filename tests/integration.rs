//! Integration tests: compile declarations, inspect the wire model, and
//! round-trip values through the assembled codecs.

use tagwire::codec::{AssembleError, CodecError, UnknownFieldPolicy, WireCodec};
use tagwire::model::ModelKind;
use tagwire::{
    CollectingSink, DiagnosticKind, FieldDecl, Schema, SchemaCompiler, SymbolicProvider, TypeDecl,
    TypeRef, Value,
};

const ZOO: &str = r#"
package zoo;

message Animal {
  name: string @1;
}

message Dog : Animal {
  mut breed: string;
}
"#;

const GENERICS: &str = r#"
package zoo;

message Box<T> {
  value: T;
}

message StringBox : Box<string> {
  label: string;
}

message Holder {
  b: Box<string>;
}
"#;

const SCALARS: &str = r#"
package p;

message Everything {
  flag: bool;
  count: i32;
  offset: i32 [zigzag];
  stamp: u64 [fixed];
  ratio: f64;
  title: string;
  blob: bytes;
}
"#;

fn compile(source: &str) -> (Schema, CollectingSink) {
    let provider = SymbolicProvider::parse(source).expect("parse");
    let mut sink = CollectingSink::new();
    let schema = SchemaCompiler::new(&provider, &mut sink).compile().expect("compile");
    (schema, sink)
}

fn codec(source: &str) -> WireCodec {
    let (schema, _) = compile(source);
    WireCodec::assemble(schema, UnknownFieldPolicy::Preserve).expect("assemble")
}

#[test]
fn test_inheritance_rederives_fields() {
    let (schema, sink) = compile(ZOO);
    assert!(sink.diagnostics.is_empty(), "{:?}", sink.diagnostics);

    let dog = schema.message("zoo.Dog").expect("Dog");
    let names: Vec<_> = dog.fields.iter().map(|f| (f.name.as_str(), f.tag)).collect();
    assert_eq!(names, vec![("name", 1), ("breed", 2)]);
    assert_eq!(dog.fields[0].declared_by, "zoo.Animal");
    assert_eq!(dog.fields[1].declared_by, "zoo.Dog");
    assert!(dog.fields[1].mutable);
}

#[test]
fn test_inherited_roundtrip() {
    let codec = codec(ZOO);
    let dog = Value::message(vec![
        ("name", Value::Str("Rex".into())),
        ("breed", Value::Str("Collie".into())),
    ]);
    let bytes = codec.encode_message("zoo.Dog", &dog).expect("encode");
    // 1: "Rex", 2: "Collie"
    assert_eq!(bytes[0], 0x0a);
    assert_eq!(codec.encoded_size("zoo.Dog", &dog).expect("size"), bytes.len());
    let back = codec.decode_message("zoo.Dog", &bytes).expect("decode");
    assert_eq!(back.as_message().and_then(|m| m.get("breed")), Some(&Value::Str("Collie".into())));
}

#[test]
fn test_template_instantiation_materializes_fields() {
    let (schema, sink) = compile(GENERICS);
    assert!(sink.diagnostics.is_empty(), "{:?}", sink.diagnostics);

    let template = schema.message("zoo.Box").expect("Box");
    assert!(template.template);

    // StringBox inherits value with string substituted for T.
    let sb = schema.message("zoo.StringBox").expect("StringBox");
    let names: Vec<_> = sb.fields.iter().map(|f| (f.name.as_str(), f.tag)).collect();
    assert_eq!(names, vec![("value", 1), ("label", 2)]);
    assert!(matches!(
        schema.registry.arena.get(sb.fields[0].model),
        ModelKind::Primitive(tagwire::ScalarKind::String)
    ));

    // The field-site instantiation is registered as a nested impl.
    let impl_id = schema.registry.get("zoo.Holder.B").expect("impl registered");
    assert!(matches!(schema.registry.arena.get(impl_id), ModelKind::Impl(_)));
}

#[test]
fn test_template_has_no_codec() {
    let codec = codec(GENERICS);
    let err = codec.encode_message("zoo.Box", &Value::message(vec![])).unwrap_err();
    assert!(matches!(err, CodecError::Template(_)), "{:?}", err);
}

#[test]
fn test_instantiation_roundtrip() {
    let codec = codec(GENERICS);
    let holder = Value::message(vec![(
        "b",
        Value::message(vec![("value", Value::Str("inside".into()))]),
    )]);
    let bytes = codec.encode_message("zoo.Holder", &holder).expect("encode");
    let back = codec.decode_message("zoo.Holder", &bytes).expect("decode");
    let b = back.as_message().and_then(|m| m.get("b")).and_then(Value::as_message).expect("b");
    assert_eq!(b.get("value"), Some(&Value::Str("inside".into())));
}

#[test]
fn test_scalar_roundtrip() {
    let codec = codec(SCALARS);
    let value = Value::message(vec![
        ("flag", Value::Bool(true)),
        ("count", Value::I32(-2)),
        ("offset", Value::I32(-2)),
        ("stamp", Value::U64(7)),
        ("ratio", Value::F64(2.5)),
        ("title", Value::Str("hi".into())),
        ("blob", Value::Bytes(vec![1, 2, 3])),
    ]);
    let bytes = codec.encode_message("p.Everything", &value).expect("encode");
    assert_eq!(codec.encoded_size("p.Everything", &value).expect("size"), bytes.len());
    let back = codec.decode_message("p.Everything", &bytes).expect("decode");
    let m = back.as_message().expect("message");
    assert_eq!(m.get("flag"), Some(&Value::Bool(true)));
    // Plain int32 sign-extends; zigzag folds. Both recover -2.
    assert_eq!(m.get("count"), Some(&Value::I32(-2)));
    assert_eq!(m.get("offset"), Some(&Value::I32(-2)));
    assert_eq!(m.get("stamp"), Some(&Value::U64(7)));
    assert_eq!(m.get("ratio"), Some(&Value::F64(2.5)));
    assert_eq!(m.get("blob"), Some(&Value::Bytes(vec![1, 2, 3])));
}

#[test]
fn test_negative_int32_costs_ten_bytes_zigzag_two() {
    let codec = codec(SCALARS);
    let negative = Value::message(vec![("count", Value::I32(-1))]);
    let zigzag = Value::message(vec![("offset", Value::I32(-1))]);
    let plain = codec.encoded_size("p.Everything", &negative).expect("size");
    let folded = codec.encoded_size("p.Everything", &zigzag).expect("size");
    // The always-present scalars differ only in the varied field.
    assert_eq!(plain - folded, 9);
}

#[test]
fn test_explicit_then_implicit_tags() {
    let (schema, _) = compile(
        r#"
        package p;
        message M {
          a: i32 @3;
          b: i32 @1;
          c: i32;
        }
        "#,
    );
    let m = schema.message("p.M").expect("M");
    let tags: Vec<_> = m.fields.iter().map(|f| (f.name.as_str(), f.tag)).collect();
    // Implicit continues after the highest tag seen so far.
    assert_eq!(tags, vec![("a", 3), ("b", 1), ("c", 4)]);
}

#[test]
fn test_tag_collision_last_write_wins() {
    let (schema, sink) = compile(
        r#"
        package p;
        message M {
          a: i32 @1;
          b: string @1;
        }
        "#,
    );
    assert_eq!(sink.count_of(DiagnosticKind::TagCollision), 1);
    let schema_msg = schema.message("p.M").expect("M");
    let index = schema_msg.fields_by_tag[&1];
    assert_eq!(schema_msg.fields[index].name, "b");
}

#[test]
fn test_enum_travels_by_tag_not_ordinal() {
    let source = r#"
    package p;
    enum Color {
      RED = 3;
      GREEN;
      BLUE = 1;
    }
    message Paint {
      color: Color;
    }
    "#;
    let (schema, _) = compile(source);
    let color = schema.enumeration("p.Color").expect("Color");
    let tags: Vec<_> = color.constants.iter().map(|c| (c.name.as_str(), c.ordinal, c.tag)).collect();
    assert_eq!(tags, vec![("RED", 0, 3), ("GREEN", 1, 4), ("BLUE", 2, 1)]);

    let codec = codec(source);
    // Constant names are accepted on encode and resolve through the tag.
    let paint = Value::message(vec![("color", Value::Str("GREEN".into()))]);
    let bytes = codec.encode_message("p.Paint", &paint).expect("encode");
    let back = codec.decode_message("p.Paint", &bytes).expect("decode");
    assert_eq!(back.as_message().and_then(|m| m.get("color")), Some(&Value::Enum(4)));
}

#[test]
fn test_repeated_and_packed() {
    let source = r#"
    package p;
    message Batch {
      names: list<string>;
      samples: list<f32> [packed];
    }
    "#;
    let codec = codec(source);
    let batch = Value::message(vec![
        ("names", Value::List(vec![Value::Str("a".into()), Value::Str("b".into())])),
        ("samples", Value::List(vec![Value::F32(1.0), Value::F32(2.0)])),
    ]);
    let bytes = codec.encode_message("p.Batch", &batch).expect("encode");
    // Packed floats: one key, length 8, two little-endian payloads.
    let tail = &bytes[bytes.len() - 10..];
    assert_eq!(tail[0], (2 << 3) | 2);
    assert_eq!(tail[1], 8);
    let back = codec.decode_message("p.Batch", &bytes).expect("decode");
    let m = back.as_message().expect("message");
    assert_eq!(m.get("names").and_then(Value::as_list).map(|l| l.len()), Some(2));
    assert_eq!(
        m.get("samples"),
        Some(&Value::List(vec![Value::F32(1.0), Value::F32(2.0)]))
    );
}

#[test]
fn test_packed_requires_fixed_width() {
    let (schema, _) = compile(
        r#"
        package p;
        message Bad {
          xs: list<i32> [packed];
        }
        "#,
    );
    let err = WireCodec::assemble(schema, UnknownFieldPolicy::Discard).unwrap_err();
    assert!(matches!(err, AssembleError::PackedNotFixedWidth { .. }), "{:?}", err);
}

#[test]
fn test_map_roundtrip() {
    let source = r#"
    package p;
    message Index {
      counts: map<string, i32>;
    }
    "#;
    let codec = codec(source);
    let index = Value::message(vec![(
        "counts",
        Value::Map(vec![
            (Value::Str("a".into()), Value::I32(1)),
            (Value::Str("b".into()), Value::I32(2)),
        ]),
    )]);
    let bytes = codec.encode_message("p.Index", &index).expect("encode");
    // First entry: key 1, length 5, then 1:"a" and 2:1.
    assert_eq!(&bytes[..7], &[0x0a, 5, 0x0a, 1, b'a', 0x10, 1]);
    let back = codec.decode_message("p.Index", &bytes).expect("decode");
    assert_eq!(back.as_message().and_then(|m| m.get("counts")), index.as_message().and_then(|m| m.get("counts")));
}

#[test]
fn test_nested_message_names() {
    let source = r#"
    package p;
    message Outer {
      inner: Inner;
      message Inner {
        n: i32;
      }
    }
    "#;
    let (schema, sink) = compile(source);
    assert!(sink.diagnostics.is_empty(), "{:?}", sink.diagnostics);
    let inner = schema.message("p.Outer.Inner").expect("nested canonical name");
    assert_eq!(inner.declared.relative_name, "Outer.Inner");
    let outer = schema.message("p.Outer").expect("Outer");
    assert!(outer.declared.nested.contains_key("p.Outer.Inner"));

    let codec = codec(source);
    let value = Value::message(vec![("inner", Value::message(vec![("n", Value::I32(9))]))]);
    let bytes = codec.encode_message("p.Outer", &value).expect("encode");
    let back = codec.decode_message("p.Outer", &bytes).expect("decode");
    assert_eq!(back, Value::message(vec![("inner", Value::message(vec![("n", Value::I32(9))]))]));
}

#[test]
fn test_wildcard_bound_resolves_through_supertype() {
    let (schema, sink) = compile(
        r#"
        package zoo;
        message Dog {
          name: string;
        }
        message Pen<T> {
          occupant: ? : T;
        }
        message Cage : Pen<Dog> {
        }
        "#,
    );
    assert!(sink.diagnostics.is_empty(), "{:?}", sink.diagnostics);
    let cage = schema.message("zoo.Cage").expect("Cage");
    assert_eq!(cage.fields.len(), 1);
    let occupant = &cage.fields[0];
    assert_eq!(occupant.name, "occupant");
    match schema.registry.arena.get(occupant.model) {
        ModelKind::Message(m) => assert_eq!(m.declared.name, "zoo.Dog"),
        other => panic!("expected message model, got {:?}", other),
    }
}

#[test]
fn test_unresolvable_variable_drops_field() {
    let (schema, sink) = compile(
        r#"
        package p;
        message Pair<A, B> {
          first: A;
          second: B;
        }
        message Lopsided : Pair<string> {
        }
        "#,
    );
    assert!(sink.count_of(DiagnosticKind::UnresolvedTypeVariable) >= 1);
    let m = schema.message("p.Lopsided").expect("Lopsided");
    let names: Vec<_> = m.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["first"]);
}

#[test]
fn test_unclassifiable_field_is_dropped_not_fatal() {
    let (schema, sink) = compile(
        r#"
        package p;
        message M {
          ok: i32;
          gone: NoSuchType;
        }
        "#,
    );
    assert_eq!(sink.count_of(DiagnosticKind::ClassificationFailure), 1);
    let m = schema.message("p.M").expect("M");
    assert_eq!(m.fields.len(), 1);
    assert_eq!(m.fields[0].name, "ok");
}

#[test]
fn test_unknown_fields_preserved_roundtrip() {
    let v2 = codec(
        r#"
        package p;
        message M {
          a: i32 @1;
          b: string @2;
        }
        "#,
    );
    let v1_source = r#"
    package p;
    message M {
      a: i32 @1;
    }
    "#;
    let value = Value::message(vec![("a", Value::I32(5)), ("b", Value::Str("x".into()))]);
    let bytes = v2.encode_message("p.M", &value).expect("encode");

    let v1 = codec(v1_source);
    let back = v1.decode_message("p.M", &bytes).expect("decode");
    let m = back.as_message().expect("message");
    assert_eq!(m.unknown.len(), 1);
    assert_eq!(m.unknown[0].tag, 2);
    // Re-encoding emits the retained bytes, restoring the original.
    let again = v1.encode_message("p.M", &back).expect("re-encode");
    assert_eq!(again, bytes);

    let (schema, _) = compile(v1_source);
    let discarding = WireCodec::assemble(schema, UnknownFieldPolicy::Discard).expect("assemble");
    let dropped = discarding.decode_message("p.M", &bytes).expect("decode");
    assert!(dropped.as_message().expect("message").unknown.is_empty());
}

#[test]
fn test_accessors_and_mutability() {
    let (schema, sink) = compile(
        r#"
        package p;
        message Person {
          name: string;
          alive: bool;
          fn getName(): string;
          fn name(): string;
          fn setName(string);
          fn isAlive(): bool;
        }
        "#,
    );
    assert_eq!(sink.count_of(DiagnosticKind::AccessorAmbiguity), 1);
    let person = schema.message("p.Person").expect("Person");
    let name = person.field("name").expect("name");
    // The later, fluent getter wins the ambiguity.
    let getter = name.getter.as_ref().expect("getter");
    assert_eq!(getter.method, "name");
    assert!(getter.fluent);
    assert!(name.setter.is_some());
    assert!(name.mutable);
    let alive = person.field("alive").expect("alive");
    assert_eq!(alive.getter.as_ref().map(|g| g.method.as_str()), Some("isAlive"));
}

#[test]
fn test_constructor_binding() {
    let (schema, _) = compile(
        r#"
        package p;
        message Person {
          name: string;
          age: i32;
          ctor();
          ctor(name: string, age: i32);
          ctor(i32, i32);
        }
        "#,
    );
    let person = schema.message("p.Person").expect("Person");
    assert!(person.has_empty_ctor);
    assert_eq!(person.constructors.len(), 2);
    // Named parameters bind fully.
    assert!(person.constructors[0].is_fully_bound());
    // Positional: i32 does not match the string field at position 0.
    let positional = &person.constructors[1];
    assert!(!positional.is_fully_bound());
    assert_eq!(positional.params[0].field, None);
    assert_eq!(positional.params[1].field, Some(1));
}

#[test]
fn test_recursive_message() {
    let source = r#"
    package p;
    message Node {
      val: i32;
      next: Node;
    }
    "#;
    let codec = codec(source);
    let chain = Value::message(vec![
        ("val", Value::I32(1)),
        ("next", Value::message(vec![("val", Value::I32(2))])),
    ]);
    let bytes = codec.encode_message("p.Node", &chain).expect("encode");
    let back = codec.decode_message("p.Node", &bytes).expect("decode");
    let next = back
        .as_message()
        .and_then(|m| m.get("next"))
        .and_then(Value::as_message)
        .expect("next");
    assert_eq!(next.get("val"), Some(&Value::I32(2)));
}

#[test]
fn test_reflective_provider_matches_symbolic() {
    let symbolic = SymbolicProvider::parse(ZOO).expect("parse");

    let mut animal = TypeDecl::message("zoo", "Animal");
    animal.fields.push(FieldDecl::new("name", TypeRef::named("string")).with_tag(1));
    let mut dog = TypeDecl::message("zoo", "Dog");
    dog.super_ref = Some(TypeRef::named("Animal"));
    dog.fields.push(FieldDecl::new("breed", TypeRef::named("string")).mutable());
    let reflective = tagwire::ReflectiveProvider::new().with(animal).with(dog);

    let mut sink_a = CollectingSink::new();
    let mut sink_b = CollectingSink::new();
    let a = SchemaCompiler::new(&symbolic, &mut sink_a).compile().expect("compile");
    let b = SchemaCompiler::new(&reflective, &mut sink_b).compile().expect("compile");

    let fields = |s: &Schema| -> Vec<(String, u32)> {
        s.message("zoo.Dog")
            .expect("Dog")
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.tag))
            .collect()
    };
    assert_eq!(fields(&a), fields(&b));
}

#[test]
fn test_absent_fields_encode_defaults_only_for_numeric() {
    let codec = codec(SCALARS);
    let empty = Value::message(vec![]);
    let bytes = codec.encode_message("p.Everything", &empty).expect("encode");
    let back = codec.decode_message("p.Everything", &bytes).expect("decode");
    let m = back.as_message().expect("message");
    // Numeric and bool scalars come back as defaults; string and bytes
    // were never written.
    assert_eq!(m.get("count"), Some(&Value::I32(0)));
    assert_eq!(m.get("flag"), Some(&Value::Bool(false)));
    assert_eq!(m.get("title"), None);
    assert_eq!(m.get("blob"), None);
}

#[test]
fn test_container_component_instantiation_roundtrip() {
    let codec = codec(
        r#"
package p;

message Box<T> {
  value: T;
}

message Holder {
  bs: list<Box<string>>;
  by_key: map<string, Box<string>>;
}
"#,
    );
    let boxed = |s: &str| Value::message(vec![("value", Value::Str(s.into()))]);
    let holder = Value::message(vec![
        ("bs", Value::List(vec![boxed("a"), boxed("b")])),
        ("by_key", Value::Map(vec![(Value::Str("k".into()), boxed("c"))])),
    ]);
    let bytes = codec.encode_message("p.Holder", &holder).expect("encode");
    let back = codec.decode_message("p.Holder", &bytes).expect("decode");
    let m = back.as_message().expect("message");
    match m.get("bs") {
        Some(Value::List(items)) => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0], boxed("a"));
        }
        other => panic!("expected list, got {:?}", other),
    }
    match m.get("by_key") {
        Some(Value::Map(entries)) => assert_eq!(entries[0].1, boxed("c")),
        other => panic!("expected map, got {:?}", other),
    }
}

#[test]
fn test_inherited_instantiation_field_roundtrip() {
    let codec = codec(
        r#"
package p;

message Box<T> {
  value: T;
}

message Super<U> {
  u: U;
}

message Sub : Super<Box<string>> {
}
"#,
    );
    let sub = Value::message(vec![(
        "u",
        Value::message(vec![("value", Value::Str("x".into()))]),
    )]);
    let bytes = codec.encode_message("p.Sub", &sub).expect("encode");
    let back = codec.decode_message("p.Sub", &bytes).expect("decode");
    assert_eq!(back, sub);
}

#[test]
fn test_oversized_length_prefix_is_an_error() {
    let codec = codec(ZOO);
    // Key (1, length-delimited) followed by a length of u64::MAX.
    let mut bytes = vec![0x0a];
    bytes.extend([0xff; 9]);
    bytes.push(0x01);
    let err = codec.decode_message("zoo.Animal", &bytes);
    assert!(matches!(err, Err(CodecError::Wire(_))), "{:?}", err);
}

#[test]
fn test_zero_tags_dropped_with_diagnostic() {
    let (schema, sink) = compile(
        r#"
package p;

enum E {
  NONE = 0;
  SOME;
}

message M {
  a: i32 @0;
  b: i32;
}
"#,
    );
    let m = schema.message("p.M").expect("M");
    let names: Vec<_> = m.fields.iter().map(|f| (f.name.as_str(), f.tag)).collect();
    assert_eq!(names, vec![("b", 1)]);
    let e = schema.enumeration("p.E").expect("E");
    let constants: Vec<_> = e.constants.iter().map(|c| (c.name.as_str(), c.tag)).collect();
    assert_eq!(constants, vec![("SOME", 1)]);
    assert_eq!(sink.count_of(DiagnosticKind::InvalidTag), 2);
}

#[test]
fn test_wildcard_container_bound_resolves_through_supertype() {
    let (schema, sink) = compile(
        r#"
package zoo;

message Dog {
  name: string;
}

message Pen<T> {
  occupants: ? : list<T>;
}

message Cage : Pen<Dog> {
}
"#,
    );
    assert!(sink.diagnostics.is_empty(), "{:?}", sink.diagnostics);
    let cage = schema.message("zoo.Cage").expect("Cage");
    let field = cage.field("occupants").expect("occupants");
    match schema.registry.arena.get(field.model) {
        ModelKind::List(l) => {
            let dog = schema.registry.arena.message(l.component).expect("component");
            assert_eq!(dog.declared.name, "zoo.Dog");
        }
        other => panic!("expected list model, got {:?}", other),
    }
}
