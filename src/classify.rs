//! Type classification: mapping host type references onto wire model records.
//!
//! Dispatch order matters and is fixed: type variables, then wildcards, then
//! arrays, then the container raw names (`list`, `set`, `queue`, `map`), then
//! the scalar table, and only then declared enums and messages. Containers are
//! checked before the declared fallthrough so a user type can never shadow
//! them.
//!
//! Classification of an unknown reference is not an error here: it yields the
//! `Nothing` sentinel and the caller decides what to drop. Enums are
//! registered the moment they are classified, messages get a registered shell
//! before their fields are walked, so self-referential types terminate.

use std::collections::BTreeMap;

use crate::descriptor::{DeclKind, TypeDecl, TypeProvider, TypeRef};
use crate::diag::{CompileError, Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::extract;
use crate::model::{
    ContainerKind, DeclaredInfo, EnclosingModel, EnumConstant, EnumModel, ListModel, MapModel,
    MessageModel, ModelId, ModelKind, ScalarKind, VariableModel, WildcardModel,
};
use crate::registry::SchemaRegistry;
use crate::resolve::{substitute, GenericResolver};

/// Lexical context a reference is classified in: the declaring type's
/// parameter names for variable lookup, and its names for relative
/// resolution.
#[derive(Clone, Copy)]
pub struct Scope<'s> {
    pub params: &'s [String],
    pub package: &'s str,
    /// Canonical name of the declaring type, if any.
    pub enclosing: Option<&'s str>,
}

impl Scope<'static> {
    pub const TOP: Scope<'static> = Scope { params: &[], package: "", enclosing: None };
}

pub struct Classifier<'a> {
    pub provider: &'a dyn TypeProvider,
    pub registry: &'a mut SchemaRegistry,
    pub sink: &'a mut dyn DiagnosticSink,
    /// Template instantiations already materialized, by rendered reference.
    /// Also the cycle breaker for recursive generic fields.
    insts: BTreeMap<String, ModelId>,
}

impl<'a> Classifier<'a> {
    pub fn new(
        provider: &'a dyn TypeProvider,
        registry: &'a mut SchemaRegistry,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Classifier { provider, registry, sink, insts: BTreeMap::new() }
    }

    /// Classify one top-level declaration.
    pub fn classify_decl(&mut self, decl: &TypeDecl) -> Result<ModelId, CompileError> {
        match decl.kind {
            DeclKind::Enum => self.classify_enum(decl),
            DeclKind::Message => self.classify_message(decl, &[], &Scope::TOP),
        }
    }

    /// Classify a reference to a wire model id. Unclassifiable references
    /// yield [`ModelId::NOTHING`]; only registration conflicts are fatal.
    pub fn classify(&mut self, r: &TypeRef, scope: &Scope<'_>) -> Result<ModelId, CompileError> {
        match r {
            TypeRef::Variable(name) => {
                let index = scope.params.iter().position(|p| p == name);
                Ok(self
                    .registry
                    .arena
                    .alloc(ModelKind::Variable(VariableModel { name: name.clone(), index })))
            }
            TypeRef::Wildcard { bound } => self.classify_wildcard(bound.as_deref(), scope),
            TypeRef::Array(component) => {
                let component = self.classify(component, scope)?;
                if component.is_nothing() {
                    return Ok(ModelId::NOTHING);
                }
                Ok(self.registry.arena.alloc(ModelKind::List(ListModel {
                    kind: ContainerKind::Array,
                    component,
                    packed: false,
                })))
            }
            TypeRef::Named(_) | TypeRef::Parameterized { .. } => self.classify_named(r, scope),
        }
    }

    fn classify_wildcard(
        &mut self,
        bound: Option<&TypeRef>,
        scope: &Scope<'_>,
    ) -> Result<ModelId, CompileError> {
        let model = match bound {
            None => WildcardModel { bound: None, var: None },
            Some(b) if b.is_variable() => {
                let var = self.classify(b, scope)?;
                WildcardModel { bound: None, var: Some(var) }
            }
            Some(b) => {
                let bound = self.classify(b, scope)?;
                let bound = if bound.is_nothing() { None } else { Some(bound) };
                WildcardModel { bound, var: None }
            }
        };
        Ok(self.registry.arena.alloc(ModelKind::Wildcard(model)))
    }

    fn classify_named(&mut self, r: &TypeRef, scope: &Scope<'_>) -> Result<ModelId, CompileError> {
        let raw = match r.raw_name() {
            Some(raw) => raw,
            None => return Ok(ModelId::NOTHING),
        };
        let args: &[TypeRef] = match r {
            TypeRef::Parameterized { args, .. } => args,
            _ => &[],
        };

        // Containers before the declared fallthrough.
        match raw {
            "list" | "set" | "queue" => {
                let kind = match raw {
                    "list" => ContainerKind::List,
                    "set" => ContainerKind::Set,
                    _ => ContainerKind::Queue,
                };
                let component = match args.first() {
                    Some(arg) => self.classify(arg, scope)?,
                    None => return Ok(ModelId::NOTHING),
                };
                if component.is_nothing() {
                    return Ok(ModelId::NOTHING);
                }
                return Ok(self.registry.arena.alloc(ModelKind::List(ListModel {
                    kind,
                    component,
                    packed: false,
                })));
            }
            "map" => {
                if args.len() != 2 {
                    return Ok(ModelId::NOTHING);
                }
                let key = self.classify(&args[0], scope)?;
                let value = self.classify(&args[1], scope)?;
                if key.is_nothing() || value.is_nothing() {
                    return Ok(ModelId::NOTHING);
                }
                return Ok(self.registry.arena.alloc(ModelKind::Map(MapModel { key, value })));
            }
            _ => {}
        }

        if args.is_empty() {
            if let Some(kind) = ScalarKind::by_name(scalar_alias(raw)) {
                return Ok(self.registry.arena.scalar(kind));
            }
        }

        let provider = self.provider;
        let decl = match self.resolve_decl_name(raw, scope).and_then(|n| provider.lookup(&n)) {
            Some(decl) => decl,
            None => return Ok(ModelId::NOTHING),
        };
        match decl.kind {
            DeclKind::Enum => self.classify_enum(decl),
            DeclKind::Message => self.classify_message(decl, args, scope),
        }
    }

    /// Resolve a possibly-relative raw name to a canonical declared name:
    /// exact, then relative to the declaring type and its enclosing chain,
    /// then package-qualified.
    fn resolve_decl_name(&self, raw: &str, scope: &Scope<'_>) -> Option<String> {
        if self.provider.lookup(raw).is_some() {
            return Some(raw.to_string());
        }
        let mut outer = scope.enclosing.map(str::to_string);
        while let Some(current) = outer {
            let candidate = format!("{}.{}", current, raw);
            if self.provider.lookup(&candidate).is_some() {
                return Some(candidate);
            }
            outer = self.provider.lookup(&current).and_then(|d| d.enclosing.clone());
        }
        if !scope.package.is_empty() {
            let candidate = format!("{}.{}", scope.package, raw);
            if self.provider.lookup(&candidate).is_some() {
                return Some(candidate);
            }
        }
        None
    }

    /// Classify and register an enum declaration. Registration happens
    /// immediately, before any caller continues with its own fields.
    pub fn classify_enum(&mut self, decl: &TypeDecl) -> Result<ModelId, CompileError> {
        let canonical = decl.canonical_name();
        if let Some(id) = self.registry.get_enum(&canonical) {
            return Ok(id);
        }

        let mut constants = Vec::with_capacity(decl.constants.len());
        let mut last_tag = 0u32;
        for (ordinal, c) in decl.constants.iter().enumerate() {
            if c.tag == Some(0) {
                self.sink.report(Diagnostic::warning(
                    DiagnosticKind::InvalidTag,
                    format!(
                        "{}.{}: tag 0 is not a valid wire tag, constant dropped",
                        canonical, c.name
                    ),
                ));
                continue;
            }
            let tag = c.tag.unwrap_or(last_tag + 1);
            last_tag = tag;
            constants.push(EnumConstant { name: c.name.clone(), ordinal: ordinal as u32, tag });
        }

        let declared = self.declared_info(decl, &canonical)?;
        self.registry.add(ModelKind::Enum(EnumModel { declared, constants }))
    }

    /// Classify a message declaration, with `args` from the referencing site
    /// (empty for a bare declaration) classified against `arg_scope`.
    pub fn classify_message(
        &mut self,
        decl: &TypeDecl,
        args: &[TypeRef],
        arg_scope: &Scope<'_>,
    ) -> Result<ModelId, CompileError> {
        let canonical = decl.canonical_name();

        let inst_key = if args.is_empty() {
            if let Some(id) = self.registry.get(&canonical) {
                match self.registry.arena.get(id) {
                    ModelKind::Message(_) => return Ok(id),
                    ModelKind::Enclosing(_) => {}
                    _ => return Err(CompileError::DuplicateTypeConflict(canonical)),
                }
            }
            None
        } else {
            let rendered = render_instantiation(&canonical, args);
            if let Some(&id) = self.insts.get(&rendered) {
                return Ok(id);
            }
            Some(rendered)
        };

        let scope = Scope {
            params: &decl.type_params,
            package: &decl.package,
            enclosing: Some(&canonical),
        };

        let template = if args.is_empty() {
            !decl.type_params.is_empty()
        } else {
            args.iter().any(|a| !a.is_concrete())
        };
        let is_impl = !args.is_empty() && !template;

        let mut shell = if let Some(rendered) = &inst_key {
            let mut declared = self.declared_info(decl, &canonical)?;
            declared.name = rendered.clone();
            declared.relative_name = render_instantiation(&declared.relative_name, args);
            MessageModel::new(declared)
        } else {
            MessageModel::new(self.declared_info(decl, &canonical)?)
        };
        shell.type_params = decl.type_params.clone();
        shell.type_args = args.to_vec();
        shell.template = template;
        shell.is_impl = is_impl;

        // Supertype first. For an instantiation the super clause is rewritten
        // with the actual arguments, so StringBox : Box<string> chains work.
        if let Some(super_ref) = &decl.super_ref {
            let super_ref = if args.is_empty() {
                super_ref.clone()
            } else {
                substitute(super_ref, &decl.type_params, args)
            };
            let super_id = self.classify(&super_ref, &scope)?;
            if self.registry.arena.message(super_id).is_some() {
                shell.super_type = Some(super_id);
            }
        }
        let super_type = shell.super_type;

        // Register the shell before walking fields. Self-references hit the
        // registry (or the instantiation cache) and terminate.
        let id = match &inst_key {
            None => self.registry.add(ModelKind::Message(shell))?,
            Some(rendered) => {
                let id = self.registry.arena.alloc(ModelKind::Message(shell));
                self.insts.insert(rendered.clone(), id);
                self.registry.record_instantiation(rendered.clone(), id);
                id
            }
        };

        // Re-derive inherited fields through the supertype's parameter list.
        if let Some(super_id) = super_type {
            self.inherit_fields(id, super_id, &scope)?;
        }

        extract::extract_members(self, id, decl, &scope)?;

        // An instantiation's own fields are resolved against its own
        // parameter list, so Box<string> materializes value as string.
        if !args.is_empty() {
            self.resolve_own_fields(id, &decl.type_params, args, arg_scope)?;
        }

        Ok(id)
    }

    /// Copy the supertype's effective fields into `id`, resolving template
    /// models through the supertype's parameters and the subtype's arguments.
    fn inherit_fields(
        &mut self,
        id: ModelId,
        super_id: ModelId,
        scope: &Scope<'_>,
    ) -> Result<(), CompileError> {
        let (params, args, fields) = match self.registry.arena.message(super_id) {
            Some(sup) => (sup.type_params.clone(), sup.type_args.clone(), sup.fields.clone()),
            None => return Ok(()),
        };
        let resolver = GenericResolver::new(&params, &args);
        for mut field in fields {
            if self.registry.arena.is_template(field.model) {
                match resolver.resolve(self, scope, field.model)? {
                    Some(model) => field.model = model,
                    None => continue,
                }
            }
            if let Some(msg) = self.registry.arena.message_mut(id) {
                msg.push_field(field);
            }
        }
        Ok(())
    }

    fn resolve_own_fields(
        &mut self,
        id: ModelId,
        params: &[String],
        args: &[TypeRef],
        arg_scope: &Scope<'_>,
    ) -> Result<(), CompileError> {
        let own: Vec<(usize, ModelId)> = match self.registry.arena.message(id) {
            Some(msg) => msg
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| self.registry.arena.is_template(f.model))
                .map(|(i, f)| (i, f.model))
                .collect(),
            None => return Ok(()),
        };
        let resolver = GenericResolver::new(params, args);
        let mut dropped = Vec::new();
        for (index, model) in own {
            match resolver.resolve(self, arg_scope, model)? {
                Some(resolved) => {
                    if let Some(msg) = self.registry.arena.message_mut(id) {
                        msg.fields[index].model = resolved;
                    }
                }
                None => dropped.push(index),
            }
        }
        if !dropped.is_empty() {
            if let Some(msg) = self.registry.arena.message_mut(id) {
                for index in dropped.into_iter().rev() {
                    let field = msg.fields.remove(index);
                    msg.fields_by_tag.remove(&field.tag);
                }
                let fields_by_tag = msg
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (f.tag, i))
                    .collect::<BTreeMap<_, _>>();
                msg.fields_by_tag = fields_by_tag;
            }
        }
        Ok(())
    }

    /// Declared info for `decl`, creating enclosing placeholders as needed.
    fn declared_info(
        &mut self,
        decl: &TypeDecl,
        canonical: &str,
    ) -> Result<DeclaredInfo, CompileError> {
        let enclosing = self.resolve_enclosing(decl.enclosing.as_deref())?;
        let relative_name = match enclosing.and_then(|id| self.registry.arena.declared(id)) {
            Some(outer) => format!("{}.{}", outer.relative_name, decl.name),
            None => decl.name.clone(),
        };
        Ok(DeclaredInfo {
            package: decl.package.clone(),
            name: canonical.to_string(),
            simple_name: decl.name.clone(),
            relative_name,
            enclosing,
            nested: BTreeMap::new(),
        })
    }

    /// The enclosing chain is materialized top-down as placeholders; a later
    /// classification of the real declaration upgrades them in place.
    fn resolve_enclosing(&mut self, name: Option<&str>) -> Result<Option<ModelId>, CompileError> {
        let name = match name {
            Some(name) => name,
            None => return Ok(None),
        };
        if let Some(id) = self.registry.get(name) {
            return Ok(Some(id));
        }
        let provider = self.provider;
        let declared = match provider.lookup(name) {
            Some(decl) => {
                let outer = self.resolve_enclosing(decl.enclosing.as_deref())?;
                let relative_name = match outer.and_then(|id| self.registry.arena.declared(id)) {
                    Some(info) => format!("{}.{}", info.relative_name, decl.name),
                    None => decl.name.clone(),
                };
                DeclaredInfo {
                    package: decl.package.clone(),
                    name: name.to_string(),
                    simple_name: decl.name.clone(),
                    relative_name,
                    enclosing: outer,
                    nested: BTreeMap::new(),
                }
            }
            None => {
                let simple = name.rsplit('.').next().unwrap_or(name).to_string();
                DeclaredInfo {
                    package: String::new(),
                    name: name.to_string(),
                    simple_name: simple.clone(),
                    relative_name: simple,
                    enclosing: None,
                    nested: BTreeMap::new(),
                }
            }
        };
        let id = self.registry.add(ModelKind::Enclosing(EnclosingModel { declared }))?;
        Ok(Some(id))
    }
}

/// Host aliases accepted in addition to the canonical scalar table names.
fn scalar_alias(raw: &str) -> &str {
    match raw {
        "i32" => "int32",
        "u32" => "uint32",
        "i64" => "int64",
        "u64" => "uint64",
        "f32" => "float",
        "f64" => "double",
        other => other,
    }
}

fn render_instantiation(base: &str, args: &[TypeRef]) -> String {
    let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    format!("{}<{}>", base, rendered.join(", "))
}
