//! Member extraction: fields, accessor matching, and constructor binding for
//! one message declaration.
//!
//! Field extraction is lossy by design: an unclassifiable field type reports
//! a `ClassificationFailure` and the field is dropped, compilation continues.
//! Wire tags come from an explicit override when present, otherwise the next
//! tag after the highest one assigned so far. A duplicate tag reports a
//! `TagCollision` and the last write wins.
//!
//! Accessors follow the conventional shapes: `get`/`is` prefixes and fluent
//! bare names for getters, `set` prefix and fluent single-argument methods
//! for setters. The `is` prefix only matches bool fields. A second match for
//! the same slot reports an `AccessorAmbiguity`; the later method wins. Any
//! matched setter makes its field mutable.

use crate::classify::{Classifier, Scope};
use crate::descriptor::{EncodingOverride, MethodDecl, TypeDecl, TypeRef};
use crate::diag::{CompileError, Diagnostic, DiagnosticKind};
use crate::model::{
    Accessor, ConstructorModel, CtorParam, FieldModel, ModelId, ModelKind, ScalarKind,
};

/// Extract fields, accessors and constructors of `decl` into message `owner`.
pub fn extract_members(
    cls: &mut Classifier<'_>,
    owner: ModelId,
    decl: &TypeDecl,
    scope: &Scope<'_>,
) -> Result<(), CompileError> {
    extract_fields(cls, owner, decl, scope)?;
    for method in &decl.methods {
        match_accessor(cls, owner, method);
    }
    bind_constructors(cls, owner, decl, scope)?;
    Ok(())
}

fn extract_fields(
    cls: &mut Classifier<'_>,
    owner: ModelId,
    decl: &TypeDecl,
    scope: &Scope<'_>,
) -> Result<(), CompileError> {
    let owner_name = match cls.registry.arena.declared(owner) {
        Some(info) => info.name.clone(),
        None => return Ok(()),
    };
    for f in &decl.fields {
        let mut model = cls.classify(&f.type_ref, scope)?;
        if model.is_nothing() {
            cls.sink.report(Diagnostic::warning(
                DiagnosticKind::ClassificationFailure,
                format!("{}.{}: unclassifiable type '{}'", owner_name, f.name, f.type_ref),
            ));
            continue;
        }
        if let Some(encoding) = f.encoding {
            model = apply_encoding(cls, model, encoding);
        }

        // Tag 0 would produce a key byte the reader rejects.
        if f.tag == Some(0) {
            cls.sink.report(Diagnostic::warning(
                DiagnosticKind::InvalidTag,
                format!("{}.{}: tag 0 is not a valid wire tag, field dropped", owner_name, f.name),
            ));
            continue;
        }

        let (tag, collided) = match cls.registry.arena.message(owner) {
            Some(msg) => {
                let tag = f.tag.unwrap_or_else(|| msg.next_tag());
                (tag, msg.fields_by_tag.contains_key(&tag))
            }
            None => return Ok(()),
        };
        if collided {
            cls.sink.report(Diagnostic::warning(
                DiagnosticKind::TagCollision,
                format!("{}.{}: tag {} already assigned, last write wins", owner_name, f.name, tag),
            ));
        }

        register_impl_site(cls, owner, &f.name, model);

        let field = FieldModel {
            name: f.name.clone(),
            model,
            type_ref: f.type_ref.clone(),
            tag,
            mutable: f.mutable,
            packed: f.packed,
            declared_by: owner_name.clone(),
            getter: None,
            setter: None,
        };
        if let Some(msg) = cls.registry.arena.message_mut(owner) {
            msg.push_field(field);
        }
    }
    Ok(())
}

/// Integer encoding overrides swap the scalar singleton: `fixed` selects the
/// fixed-width little-endian kinds, `zigzag` the sign-folded varint kinds.
fn apply_encoding(cls: &Classifier<'_>, model: ModelId, encoding: EncodingOverride) -> ModelId {
    let kind = match cls.registry.arena.get(model) {
        ModelKind::Primitive(k) => *k,
        _ => return model,
    };
    let mapped = match (encoding, kind) {
        (EncodingOverride::Fixed, ScalarKind::Int32 | ScalarKind::Sint32) => ScalarKind::Sfixed32,
        (EncodingOverride::Fixed, ScalarKind::Uint32) => ScalarKind::Fixed32,
        (EncodingOverride::Fixed, ScalarKind::Int64 | ScalarKind::Sint64) => ScalarKind::Sfixed64,
        (EncodingOverride::Fixed, ScalarKind::Uint64) => ScalarKind::Fixed64,
        (EncodingOverride::Zigzag, ScalarKind::Int32) => ScalarKind::Sint32,
        (EncodingOverride::Zigzag, ScalarKind::Int64) => ScalarKind::Sint64,
        _ => return model,
    };
    cls.registry.arena.scalar(mapped)
}

/// A field whose model is a concrete template instantiation gets an impl
/// record nested under the owning message.
fn register_impl_site(cls: &mut Classifier<'_>, owner: ModelId, field_name: &str, model: ModelId) {
    let is_impl = matches!(
        cls.registry.arena.get(model),
        ModelKind::Message(m) if m.is_impl
    );
    if !is_impl {
        return;
    }
    let template = cls
        .registry
        .arena
        .message(model)
        .map(|m| m.declared.name.clone())
        .and_then(|name| {
            let base = name.split('<').next().unwrap_or(&name).to_string();
            cls.registry.get_message(&base)
        });
    if let Some(template) = template {
        cls.registry.register_impl(owner, field_name, template, model);
    }
}

fn match_accessor(cls: &mut Classifier<'_>, owner: ModelId, method: &MethodDecl) {
    match method.params.len() {
        0 => match_getter(cls, owner, method),
        1 => match_setter(cls, owner, method),
        _ => {}
    }
}

fn match_getter(cls: &mut Classifier<'_>, owner: ModelId, method: &MethodDecl) {
    let name = &method.name;
    let (field_name, fluent) = if let Some(rest) = prefixed(name, "get") {
        (decapitalize(rest), false)
    } else if let Some(rest) = prefixed(name, "is") {
        let candidate = decapitalize(rest);
        if !field_is_bool(cls, owner, &candidate) {
            return;
        }
        (candidate, false)
    } else {
        (name.clone(), true)
    };

    let owner_name = match cls.registry.arena.declared(owner) {
        Some(info) => info.name.clone(),
        None => return,
    };
    let ambiguous = match cls.registry.arena.message(owner).and_then(|m| m.field(&field_name)) {
        Some(field) => field.getter.is_some(),
        None => return,
    };
    if ambiguous {
        cls.sink.report(Diagnostic::warning(
            DiagnosticKind::AccessorAmbiguity,
            format!("{}.{}: second getter '{}' wins", owner_name, field_name, name),
        ));
    }
    if let Some(field) =
        cls.registry.arena.message_mut(owner).and_then(|m| m.field_mut(&field_name))
    {
        field.getter = Some(Accessor { method: name.clone(), fluent });
    }
}

fn match_setter(cls: &mut Classifier<'_>, owner: ModelId, method: &MethodDecl) {
    let name = &method.name;
    let (field_name, fluent) = match prefixed(name, "set") {
        Some(rest) => (decapitalize(rest), false),
        None => (name.clone(), true),
    };

    let owner_name = match cls.registry.arena.declared(owner) {
        Some(info) => info.name.clone(),
        None => return,
    };
    let ambiguous = match cls.registry.arena.message(owner).and_then(|m| m.field(&field_name)) {
        Some(field) => field.setter.is_some(),
        None => return,
    };
    if ambiguous {
        cls.sink.report(Diagnostic::warning(
            DiagnosticKind::AccessorAmbiguity,
            format!("{}.{}: second setter '{}' wins", owner_name, field_name, name),
        ));
    }
    if let Some(field) =
        cls.registry.arena.message_mut(owner).and_then(|m| m.field_mut(&field_name))
    {
        field.setter = Some(Accessor { method: name.clone(), fluent });
        field.mutable = true;
    }
}

fn bind_constructors(
    cls: &mut Classifier<'_>,
    owner: ModelId,
    decl: &TypeDecl,
    scope: &Scope<'_>,
) -> Result<(), CompileError> {
    for ctor in &decl.ctors {
        if ctor.params.is_empty() {
            if let Some(msg) = cls.registry.arena.message_mut(owner) {
                msg.has_empty_ctor = true;
            }
            continue;
        }

        // Explicit parameter-to-field names from the host win outright.
        if let Some(names) = &ctor.param_fields {
            let params = match cls.registry.arena.message(owner) {
                Some(msg) => names
                    .iter()
                    .map(|n| CtorParam { field: msg.fields.iter().position(|f| f.name == *n) })
                    .collect(),
                None => continue,
            };
            if let Some(msg) = cls.registry.arena.message_mut(owner) {
                msg.constructors.push(ConstructorModel { params });
            }
            continue;
        }

        // Positional binding only when the arities line up. A parameter binds
        // to the field at its position when the classified types agree; a
        // miss binds to no field but the constructor is still recorded.
        let field_count = match cls.registry.arena.message(owner) {
            Some(msg) => msg.fields.len(),
            None => continue,
        };
        if ctor.params.len() != field_count {
            continue;
        }
        let mut params = Vec::with_capacity(ctor.params.len());
        for (index, param) in ctor.params.iter().enumerate() {
            let param_model = cls.classify(param, scope)?;
            let bound = match cls.registry.arena.message(owner).map(|m| &m.fields[index]) {
                Some(field) => {
                    param_model == field.model || types_agree(param, &field.type_ref)
                }
                None => false,
            };
            params.push(CtorParam { field: if bound { Some(index) } else { None } });
        }
        if let Some(msg) = cls.registry.arena.message_mut(owner) {
            msg.constructors.push(ConstructorModel { params });
        }
    }
    Ok(())
}

/// Fallback textual comparison for references whose classified models are not
/// shared singletons.
fn types_agree(a: &TypeRef, b: &TypeRef) -> bool {
    a == b || a.to_string() == b.to_string()
}

fn field_is_bool(cls: &Classifier<'_>, owner: ModelId, field_name: &str) -> bool {
    cls.registry
        .arena
        .message(owner)
        .and_then(|m| m.field(field_name))
        .map(|f| matches!(cls.registry.arena.get(f.model), ModelKind::Primitive(ScalarKind::Bool)))
        .unwrap_or(false)
}

/// Strip `prefix` when it is followed by at least one character.
fn prefixed<'n>(name: &'n str, prefix: &str) -> Option<&'n str> {
    name.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
