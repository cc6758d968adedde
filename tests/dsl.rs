//! Declaration DSL tests: parsing into `TypeDecl`s, before any compilation.

use tagwire::{DeclKind, EncodingOverride, SymbolicProvider, TypeProvider, TypeRef};

const FULL: &str = r#"
// A comment before anything else.
package zoo.pets;

message Animal {
  name: string @1;
}

/* Block comment. */
message Dog<T> : Animal {
  mut breed: string;
  toy: T;
  samples: list<f32> [packed];
  offset: i32 [zigzag];
  stamp: u64 [fixed];
  lineage: Dog<T>[];
  friend: ? : Animal;
  fn getBreed(): string;
  fn setBreed(string);
  ctor(breed: string);

  enum Mood {
    CALM;
    PLAYFUL = 5;
    SLEEPY;
  }
}
"#;

#[test]
fn test_parse_full_declaration() {
    let provider = SymbolicProvider::parse(FULL).expect("parse");
    let names = provider.declared_names();
    assert_eq!(names, vec!["zoo.pets.Animal", "zoo.pets.Dog", "zoo.pets.Dog.Mood"]);

    let dog = provider.lookup("zoo.pets.Dog").expect("Dog");
    assert_eq!(dog.kind, DeclKind::Message);
    assert_eq!(dog.type_params, vec!["T"]);
    assert_eq!(dog.super_ref, Some(TypeRef::named("Animal")));
    assert_eq!(dog.fields.len(), 7);
    assert_eq!(dog.methods.len(), 2);
    assert_eq!(dog.ctors.len(), 1);
}

#[test]
fn test_field_shapes() {
    let provider = SymbolicProvider::parse(FULL).expect("parse");
    let dog = provider.lookup("zoo.pets.Dog").expect("Dog");

    let breed = &dog.fields[0];
    assert!(breed.mutable);
    assert_eq!(breed.tag, None);

    // A bare name matching a type parameter parses as a variable.
    let toy = &dog.fields[1];
    assert_eq!(toy.type_ref, TypeRef::variable("T"));

    let samples = &dog.fields[2];
    assert!(samples.packed);
    assert_eq!(samples.type_ref, TypeRef::parameterized("list", vec![TypeRef::named("f32")]));

    assert_eq!(dog.fields[3].encoding, Some(EncodingOverride::Zigzag));
    assert_eq!(dog.fields[4].encoding, Some(EncodingOverride::Fixed));

    let lineage = &dog.fields[5];
    assert_eq!(
        lineage.type_ref,
        TypeRef::Array(Box::new(TypeRef::parameterized("Dog", vec![TypeRef::variable("T")])))
    );
}

#[test]
fn test_wildcard_and_methods() {
    let provider = SymbolicProvider::parse(FULL).expect("parse");
    let dog = provider.lookup("zoo.pets.Dog").expect("Dog");

    let friend = dog.fields.iter().find(|f| f.name == "friend").expect("friend");
    assert_eq!(
        friend.type_ref,
        TypeRef::Wildcard { bound: Some(Box::new(TypeRef::named("Animal"))) }
    );

    let getter = &dog.methods[0];
    assert_eq!(getter.name, "getBreed");
    assert!(getter.params.is_empty());
    assert_eq!(getter.returns, Some(TypeRef::named("string")));

    let setter = &dog.methods[1];
    assert_eq!(setter.params, vec![TypeRef::named("string")]);
}

#[test]
fn test_enum_constants() {
    let provider = SymbolicProvider::parse(FULL).expect("parse");
    let mood = provider.lookup("zoo.pets.Dog.Mood").expect("Mood");
    assert_eq!(mood.kind, DeclKind::Enum);
    assert_eq!(mood.enclosing.as_deref(), Some("zoo.pets.Dog"));
    let tags: Vec<_> = mood.constants.iter().map(|c| (c.name.as_str(), c.tag)).collect();
    assert_eq!(tags, vec![("CALM", None), ("PLAYFUL", Some(5)), ("SLEEPY", None)]);
}

#[test]
fn test_ctor_named_params_all_or_nothing() {
    let provider = SymbolicProvider::parse(
        r#"
        package p;
        message M {
          a: string;
          b: i32;
          ctor(a: string, i32);
          ctor(a: string, b: i32);
        }
        "#,
    )
    .expect("parse");
    let m = provider.lookup("p.M").expect("M");
    assert_eq!(m.ctors[0].param_fields, None);
    assert_eq!(m.ctors[1].param_fields, Some(vec!["a".to_string(), "b".to_string()]));
}

#[test]
fn test_mut_is_a_keyword_not_a_prefix() {
    let provider = SymbolicProvider::parse(
        r#"
        package p;
        message M {
          mutable: i32;
          mut able: i32;
        }
        "#,
    )
    .expect("parse");
    let m = provider.lookup("p.M").expect("M");
    assert_eq!(m.fields[0].name, "mutable");
    assert!(!m.fields[0].mutable);
    assert_eq!(m.fields[1].name, "able");
    assert!(m.fields[1].mutable);
}

#[test]
fn test_parse_error_reports_location() {
    let err = SymbolicProvider::parse("message {").unwrap_err();
    assert!(err.starts_with("Parse error:"), "{}", err);
}

#[test]
fn test_duplicate_declaration_rejected() {
    let err = SymbolicProvider::parse(
        r#"
        package p;
        message M { a: i32; }
        message M { b: i32; }
        "#,
    )
    .unwrap_err();
    assert!(err.contains("Duplicate declaration"), "{}", err);
}

#[test]
fn test_empty_schema_parses() {
    let provider = SymbolicProvider::parse("package p;").expect("parse");
    assert!(provider.declared_names().is_empty());
}
