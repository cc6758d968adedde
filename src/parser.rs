//! Parse declaration source into [`TypeDecl`]s using PEST.
//!
//! This is the symbolic introspection adapter: the pre-compilation analog of
//! [`ReflectiveProvider`](crate::descriptor::ReflectiveProvider). Both feed
//! the same classifier through [`TypeProvider`].

use std::collections::BTreeMap;

use pest::Parser;
use pest_derive::Parser as PestParser;

use crate::descriptor::{
    CtorDecl, EncodingOverride, EnumConstantDecl, FieldDecl, MethodDecl, TypeDecl, TypeProvider,
    TypeRef,
};

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Pre-compilation adapter: declarations parsed from source text.
#[derive(Debug, Default)]
pub struct SymbolicProvider {
    decls: BTreeMap<String, TypeDecl>,
    /// Canonical names in source order; compile passes walk this order.
    order: Vec<String>,
}

impl SymbolicProvider {
    /// Parse declaration source into a provider.
    pub fn parse(source: &str) -> Result<Self, String> {
        let pairs = SchemaParser::parse(Rule::schema, source)
            .map_err(|e| format!("Parse error: {}", e))?;
        let schema = pairs.into_iter().next().ok_or("Empty parse")?;

        let mut provider = SymbolicProvider::default();
        let mut package = String::new();
        for inner in schema.into_inner() {
            match inner.as_rule() {
                Rule::package_decl => {
                    package = inner
                        .into_inner()
                        .next()
                        .ok_or("package: missing name")?
                        .as_str()
                        .to_string();
                }
                Rule::message_decl => provider.build_message(inner, &package, None)?,
                Rule::enum_decl => provider.build_enum(inner, &package, None)?,
                _ => {}
            }
        }
        Ok(provider)
    }

    fn insert(&mut self, decl: TypeDecl) -> Result<(), String> {
        let name = decl.canonical_name();
        if self.decls.insert(name.clone(), decl).is_some() {
            return Err(format!("Duplicate declaration: {}", name));
        }
        self.order.push(name);
        Ok(())
    }

    fn build_message(
        &mut self,
        pair: pest::iterators::Pair<Rule>,
        package: &str,
        enclosing: Option<&str>,
    ) -> Result<(), String> {
        let mut decl = TypeDecl::message(package, "");
        decl.enclosing = enclosing.map(|s| s.to_string());
        let mut nested = Vec::new();

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::ident => decl.name = inner.as_str().to_string(),
                Rule::type_params => {
                    decl.type_params =
                        inner.into_inner().map(|p| p.as_str().to_string()).collect();
                }
                Rule::super_clause => {
                    let type_pair = inner.into_inner().next().ok_or("super: missing type")?;
                    decl.super_ref = Some(build_type_ref(type_pair)?);
                }
                Rule::field_decl => decl.fields.push(build_field(inner)?),
                Rule::method_decl => decl.methods.push(build_method(inner)?),
                Rule::ctor_decl => decl.ctors.push(build_ctor(inner)?),
                Rule::message_decl | Rule::enum_decl => nested.push(inner),
                _ => {}
            }
        }
        if decl.name.is_empty() {
            return Err("message: missing name".to_string());
        }

        // A bare name matching one of the declared type parameters is a
        // type variable, not a class-like reference.
        let params = decl.type_params.clone();
        for f in &mut decl.fields {
            mark_variables(&mut f.type_ref, &params);
        }
        for m in &mut decl.methods {
            for p in &mut m.params {
                mark_variables(p, &params);
            }
            if let Some(r) = &mut m.returns {
                mark_variables(r, &params);
            }
        }
        for c in &mut decl.ctors {
            for p in &mut c.params {
                mark_variables(p, &params);
            }
        }
        if let Some(s) = &mut decl.super_ref {
            mark_variables(s, &params);
        }

        let canonical = decl.canonical_name();
        self.insert(decl)?;
        for pair in nested {
            match pair.as_rule() {
                Rule::message_decl => self.build_message(pair, package, Some(&canonical))?,
                Rule::enum_decl => self.build_enum(pair, package, Some(&canonical))?,
                _ => {}
            }
        }
        Ok(())
    }

    fn build_enum(
        &mut self,
        pair: pest::iterators::Pair<Rule>,
        package: &str,
        enclosing: Option<&str>,
    ) -> Result<(), String> {
        let mut decl = TypeDecl::enumeration(package, "");
        decl.enclosing = enclosing.map(|s| s.to_string());
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::ident => decl.name = inner.as_str().to_string(),
                Rule::enum_constant => {
                    let mut it = inner.into_inner();
                    let name = it.next().ok_or("enum constant: name")?.as_str().to_string();
                    let tag = match it.next() {
                        Some(p) => {
                            Some(p.as_str().parse::<u32>().map_err(|e| e.to_string())?)
                        }
                        None => None,
                    };
                    decl.constants.push(EnumConstantDecl { name, tag });
                }
                _ => {}
            }
        }
        if decl.name.is_empty() {
            return Err("enum: missing name".to_string());
        }
        self.insert(decl)
    }
}

impl TypeProvider for SymbolicProvider {
    fn lookup(&self, canonical: &str) -> Option<&TypeDecl> {
        self.decls.get(canonical)
    }

    fn declared_names(&self) -> Vec<String> {
        self.order.clone()
    }
}

fn build_field(pair: pest::iterators::Pair<Rule>) -> Result<FieldDecl, String> {
    let mut field = FieldDecl::new("", TypeRef::named(""));
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::mut_kw => field.mutable = true,
            Rule::ident => field.name = inner.as_str().to_string(),
            Rule::type_ref => field.type_ref = build_type_ref(inner)?,
            Rule::tag_override => {
                let digits = inner.into_inner().next().ok_or("tag: missing number")?;
                field.tag = Some(digits.as_str().parse::<u32>().map_err(|e| e.to_string())?);
            }
            Rule::field_options => {
                for opt in inner.into_inner() {
                    match opt.as_str() {
                        "packed" => field.packed = true,
                        "fixed" => field.encoding = Some(EncodingOverride::Fixed),
                        "zigzag" => field.encoding = Some(EncodingOverride::Zigzag),
                        other => return Err(format!("unknown field option: {}", other)),
                    }
                }
            }
            _ => {}
        }
    }
    if field.name.is_empty() {
        return Err("field: missing name".to_string());
    }
    Ok(field)
}

fn build_method(pair: pest::iterators::Pair<Rule>) -> Result<MethodDecl, String> {
    let mut method = MethodDecl { name: String::new(), params: Vec::new(), returns: None };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => method.name = inner.as_str().to_string(),
            Rule::method_params => {
                for p in inner.into_inner() {
                    method.params.push(build_type_ref(p)?);
                }
            }
            Rule::return_clause => {
                let type_pair = inner.into_inner().next().ok_or("return: missing type")?;
                method.returns = Some(build_type_ref(type_pair)?);
            }
            _ => {}
        }
    }
    if method.name.is_empty() {
        return Err("method: missing name".to_string());
    }
    Ok(method)
}

fn build_ctor(pair: pest::iterators::Pair<Rule>) -> Result<CtorDecl, String> {
    let mut params = Vec::new();
    let mut names: Vec<Option<String>> = Vec::new();
    for inner in pair.into_inner() {
        if inner.as_rule() != Rule::ctor_params {
            continue;
        }
        for param in inner.into_inner() {
            let mut name = None;
            let mut type_ref = None;
            for part in param.into_inner() {
                match part.as_rule() {
                    Rule::ident => name = Some(part.as_str().to_string()),
                    Rule::type_ref => type_ref = Some(build_type_ref(part)?),
                    _ => {}
                }
            }
            params.push(type_ref.ok_or("ctor param: missing type")?);
            names.push(name);
        }
    }
    // The explicit param-to-field mapping is all-or-nothing.
    let param_fields = if !names.is_empty() && names.iter().all(Option::is_some) {
        Some(names.into_iter().flatten().collect())
    } else {
        None
    };
    Ok(CtorDecl { params, param_fields })
}

fn build_type_ref(pair: pest::iterators::Pair<Rule>) -> Result<TypeRef, String> {
    let inner = pair.into_inner().next().ok_or("empty type reference")?;
    match inner.as_rule() {
        Rule::wildcard_ref => {
            let bound = match inner.into_inner().next() {
                Some(b) => Some(Box::new(build_type_ref(b)?)),
                None => None,
            };
            Ok(TypeRef::Wildcard { bound })
        }
        Rule::base_ref => {
            let mut name = String::new();
            let mut args = Vec::new();
            let mut array_depth = 0usize;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::dotted_ident => name = part.as_str().to_string(),
                    Rule::type_args => {
                        for a in part.into_inner() {
                            args.push(build_type_ref(a)?);
                        }
                    }
                    Rule::array_suffix => array_depth += 1,
                    _ => {}
                }
            }
            let mut out = if args.is_empty() {
                TypeRef::Named(name)
            } else {
                TypeRef::Parameterized { raw: name, args }
            };
            for _ in 0..array_depth {
                out = TypeRef::Array(Box::new(out));
            }
            Ok(out)
        }
        other => Err(format!("unexpected type reference rule: {:?}", other)),
    }
}

/// Rewrite bare names matching a declared type parameter into variables.
fn mark_variables(type_ref: &mut TypeRef, params: &[String]) {
    match type_ref {
        TypeRef::Named(n) => {
            if params.iter().any(|p| p == n) {
                *type_ref = TypeRef::Variable(n.clone());
            }
        }
        TypeRef::Parameterized { args, .. } => {
            for a in args {
                mark_variables(a, params);
            }
        }
        TypeRef::Wildcard { bound: Some(b) } => mark_variables(b, params),
        TypeRef::Array(c) => mark_variables(c, params),
        _ => {}
    }
}
