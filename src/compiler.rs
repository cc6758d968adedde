//! The compilation driver: walks every declaration a [`TypeProvider`] knows
//! about and produces a finalized [`Schema`].
//!
//! Only a duplicate conflicting registration aborts compilation. Everything
//! else degrades per field or per type through the diagnostic sink, so one
//! bad declaration never takes the schema down.

use crate::classify::Classifier;
use crate::descriptor::TypeProvider;
use crate::diag::{CompileError, DiagnosticSink};
use crate::model::{EnumModel, MessageModel, ModelId, ModelKind};
use crate::registry::SchemaRegistry;

/// A compiled schema: the registry with every declared model resolved.
#[derive(Debug)]
pub struct Schema {
    pub registry: SchemaRegistry,
}

impl Schema {
    pub fn message(&self, name: &str) -> Option<&MessageModel> {
        self.registry.get_message(name).and_then(|id| self.registry.arena.message(id))
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumModel> {
        self.registry.get_enum(name).and_then(|id| self.registry.arena.enum_model(id))
    }

    /// Every registered model in name order.
    pub fn models(&self) -> impl Iterator<Item = (&String, ModelId, &ModelKind)> {
        self.registry
            .declared_names()
            .map(move |(name, id)| (name, id, self.registry.arena.get(id)))
    }
}

pub struct SchemaCompiler<'a> {
    provider: &'a dyn TypeProvider,
    sink: &'a mut dyn DiagnosticSink,
}

impl<'a> SchemaCompiler<'a> {
    pub fn new(provider: &'a dyn TypeProvider, sink: &'a mut dyn DiagnosticSink) -> Self {
        SchemaCompiler { provider, sink }
    }

    pub fn compile(self) -> Result<Schema, CompileError> {
        let mut registry = SchemaRegistry::new();
        let mut classifier = Classifier::new(self.provider, &mut registry, self.sink);
        for name in self.provider.declared_names() {
            if let Some(decl) = self.provider.lookup(&name) {
                classifier.classify_decl(decl)?;
            }
        }
        Ok(Schema { registry })
    }
}
