//! Generic resolution: substituting actual type arguments for the type
//! variables left behind by classification.
//!
//! A [`GenericResolver`] is constructed per target message against one
//! parameter list and one argument list. For inheritance the parameters come
//! from the direct supertype's declaration and the arguments from the
//! subtype's `:` clause; for a template instantiation the parameters are the
//! template's own and the arguments come from the referencing site. Container
//! models are rebuilt recursively, so a resolved field is never partially
//! resolved: any unresolvable part drops the whole field.

use crate::classify::{Classifier, Scope};
use crate::descriptor::TypeRef;
use crate::diag::{CompileError, Diagnostic, DiagnosticKind};
use crate::model::{ListModel, MapModel, MessageModel, ModelId, ModelKind, VariableModel};

pub struct GenericResolver<'r> {
    /// Ordered type parameter names of the declaring side.
    params: &'r [String],
    /// Actual arguments of the referencing side, positionally matched.
    args: &'r [TypeRef],
}

impl<'r> GenericResolver<'r> {
    pub fn new(params: &'r [String], args: &'r [TypeRef]) -> Self {
        GenericResolver { params, args }
    }

    /// Resolve one field model. `Ok(None)` means the field must be dropped;
    /// a diagnostic has already been reported. Argument references are
    /// classified in `scope`, the referencing side's declaration scope.
    pub fn resolve(
        &self,
        cls: &mut Classifier<'_>,
        scope: &Scope<'_>,
        model: ModelId,
    ) -> Result<Option<ModelId>, CompileError> {
        let kind = cls.registry.arena.get(model).clone();
        match kind {
            ModelKind::Variable(v) => self.resolve_variable(cls, scope, &v),
            ModelKind::Wildcard(w) => {
                // A resolved bound wins over the captured variable. A bound
                // that still carries variables, e.g. `? : list<T>`, resolves
                // like any other template model.
                if let Some(bound) = w.bound {
                    if cls.registry.arena.is_template(bound) {
                        return self.resolve(cls, scope, bound);
                    }
                    return Ok(Some(bound));
                }
                if let Some(var) = w.var {
                    return self.resolve(cls, scope, var);
                }
                cls.sink.report(Diagnostic::warning(
                    DiagnosticKind::UnresolvedTypeVariable,
                    "unbounded wildcard cannot be resolved to a wire model",
                ));
                Ok(None)
            }
            ModelKind::List(l) => {
                let component = match self.resolve(cls, scope, l.component)? {
                    Some(id) => id,
                    None => return Ok(None),
                };
                if component == l.component {
                    return Ok(Some(model));
                }
                Ok(Some(cls.registry.arena.alloc(ModelKind::List(ListModel {
                    kind: l.kind,
                    component,
                    packed: l.packed,
                }))))
            }
            ModelKind::Map(m) => {
                let key = match self.resolve(cls, scope, m.key)? {
                    Some(id) => id,
                    None => return Ok(None),
                };
                let value = match self.resolve(cls, scope, m.value)? {
                    Some(id) => id,
                    None => return Ok(None),
                };
                if key == m.key && value == m.value {
                    return Ok(Some(model));
                }
                Ok(Some(cls.registry.arena.alloc(ModelKind::Map(MapModel { key, value }))))
            }
            ModelKind::Message(ref msg) if msg.template => self.resolve_message(cls, scope, msg),
            _ => Ok(Some(model)),
        }
    }

    fn resolve_variable(
        &self,
        cls: &mut Classifier<'_>,
        scope: &Scope<'_>,
        var: &VariableModel,
    ) -> Result<Option<ModelId>, CompileError> {
        let index = match self.params.iter().position(|p| *p == var.name) {
            Some(i) => i,
            None => {
                cls.sink.report(Diagnostic::warning(
                    DiagnosticKind::UnresolvedTypeVariable,
                    format!("type variable '{}' is not declared by the supertype", var.name),
                ));
                return Ok(None);
            }
        };
        let arg = match self.args.get(index) {
            Some(arg) => arg.clone(),
            None => {
                cls.sink.report(Diagnostic::warning(
                    DiagnosticKind::UnresolvedTypeVariable,
                    format!("no type argument supplied for variable '{}'", var.name),
                ));
                return Ok(None);
            }
        };
        // A variable argument stays a variable: the subtype re-parameterizes.
        if let TypeRef::Variable(name) = &arg {
            let index = scope.params.iter().position(|p| p == name);
            let id = cls
                .registry
                .arena
                .alloc(ModelKind::Variable(VariableModel { name: name.clone(), index }));
            return Ok(Some(id));
        }
        let id = cls.classify(&arg, scope)?;
        if id.is_nothing() {
            cls.sink.report(Diagnostic::warning(
                DiagnosticKind::UnresolvedTypeVariable,
                format!("type argument '{}' for variable '{}' is unclassifiable", arg, var.name),
            ));
            return Ok(None);
        }
        Ok(Some(id))
    }

    /// A nested template message, e.g. a field of type `Box<T>` inside the
    /// supertype: substitute into its argument list and reclassify.
    fn resolve_message(
        &self,
        cls: &mut Classifier<'_>,
        scope: &Scope<'_>,
        msg: &MessageModel,
    ) -> Result<Option<ModelId>, CompileError> {
        if msg.type_args.is_empty() {
            cls.sink.report(Diagnostic::warning(
                DiagnosticKind::UnresolvedTypeVariable,
                format!("template '{}' referenced without type arguments", msg.declared.name),
            ));
            return Ok(None);
        }
        let substituted: Vec<TypeRef> =
            msg.type_args.iter().map(|a| substitute(a, self.params, self.args)).collect();
        if substituted.iter().any(|a| !a.is_concrete()) {
            cls.sink.report(Diagnostic::warning(
                DiagnosticKind::UnresolvedTypeVariable,
                format!("template '{}' cannot be fully instantiated", msg.declared.name),
            ));
            return Ok(None);
        }
        let raw = base_name(&msg.declared.name);
        let reference = TypeRef::parameterized(raw, substituted);
        let id = cls.classify(&reference, scope)?;
        if id.is_nothing() {
            return Ok(None);
        }
        Ok(Some(id))
    }
}

/// Rewrite every variable in `r` that names one of `params` to the argument
/// at the same position. Unknown variables are kept as-is.
pub fn substitute(r: &TypeRef, params: &[String], args: &[TypeRef]) -> TypeRef {
    match r {
        TypeRef::Variable(name) => match params.iter().position(|p| p == name) {
            Some(i) => args.get(i).cloned().unwrap_or_else(|| r.clone()),
            None => r.clone(),
        },
        TypeRef::Parameterized { raw, args: inner } => TypeRef::Parameterized {
            raw: raw.clone(),
            args: inner.iter().map(|a| substitute(a, params, args)).collect(),
        },
        TypeRef::Wildcard { bound } => TypeRef::Wildcard {
            bound: bound.as_ref().map(|b| Box::new(substitute(b, params, args))),
        },
        TypeRef::Array(c) => TypeRef::Array(Box::new(substitute(c, params, args))),
        TypeRef::Named(_) => r.clone(),
    }
}

/// Canonical name of an instantiation with its `<...>` suffix stripped.
fn base_name(name: &str) -> &str {
    match name.find('<') {
        Some(i) => &name[..i],
        None => name,
    }
}
