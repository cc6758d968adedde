//! The canonical table of declared types.
//!
//! The registry is the single source of truth for canonical names. It owns
//! the [`ModelArena`]; every other collaborator (classifier, resolver,
//! extractor) borrows it. Not safe for concurrent mutation: one compiler
//! instance owns one registry for the duration of one pass.

use std::collections::BTreeMap;

use crate::diag::CompileError;
use crate::model::{DeclaredInfo, ImplModel, ModelArena, ModelId, ModelKind};

/// Package-level namespace. Tracked separately from the type table; holds
/// only top-level declared types with no enclosing type.
#[derive(Debug, Clone)]
pub struct PackageModel {
    pub name: String,
    pub simple_name: String,
    pub nested: BTreeMap<String, ModelId>,
}

impl PackageModel {
    fn of_name(name: &str) -> Self {
        let simple_name = name.rsplit('.').next().unwrap_or("").to_string();
        PackageModel { name: name.to_string(), simple_name, nested: BTreeMap::new() }
    }
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    pub arena: ModelArena,
    declared: BTreeMap<String, ModelId>,
    packages: BTreeMap<String, PackageModel>,
    /// Template instantiations by rendered reference, e.g. `a.Box<string>`.
    /// Instantiations can be materialized at non-field sites (container
    /// components, inherited supertypes), so they are tracked here in
    /// addition to any impl records.
    instantiations: BTreeMap<String, ModelId>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partial lookup by canonical name: `None` on miss, never an error.
    pub fn get(&self, name: &str) -> Option<ModelId> {
        self.declared.get(name).copied()
    }

    pub fn get_message(&self, name: &str) -> Option<ModelId> {
        self.get(name)
            .filter(|&id| matches!(self.arena.get(id), ModelKind::Message(_)))
    }

    pub fn get_enum(&self, name: &str) -> Option<ModelId> {
        self.get(name)
            .filter(|&id| matches!(self.arena.get(id), ModelKind::Enum(_)))
    }

    pub fn declared_names(&self) -> impl Iterator<Item = (&String, ModelId)> {
        self.declared.iter().map(|(n, &id)| (n, id))
    }

    pub fn record_instantiation(&mut self, name: String, id: ModelId) {
        self.instantiations.insert(name, id);
    }

    /// Every materialized template instantiation, by rendered reference.
    pub fn instantiations(&self) -> impl Iterator<Item = (&String, ModelId)> {
        self.instantiations.iter().map(|(n, &id)| (n, id))
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageModel> {
        self.packages.values()
    }

    pub fn package(&self, name: &str) -> Option<&PackageModel> {
        self.packages.get(name)
    }

    /// Insert a declared model by canonical name.
    ///
    /// An existing `Enclosing` placeholder is upgraded in place: the new kind
    /// replaces the placeholder record at the same index, carrying the
    /// placeholder's nested children, so every back-reference stays valid.
    /// An existing fully resolved model of any kind is a fatal conflict.
    pub fn add(&mut self, mut kind: ModelKind) -> Result<ModelId, CompileError> {
        // Non-declared kinds have no name to register under; allocate those
        // directly on the arena instead.
        let declared = match kind.declared() {
            Some(info) => info.clone(),
            None => return Ok(self.arena.alloc(kind)),
        };
        let name = declared.name.clone();

        if let Some(&existing) = self.declared.get(&name) {
            if self.arena.get(existing).is_enclosing() {
                if kind.is_enclosing() {
                    // Placeholder already present; reuse it.
                    return Ok(existing);
                }
                // Upgrade: children keep their enclosing ModelId, which now
                // points at the upgraded record.
                let old = self.arena.replace(existing, ModelKind::Nothing);
                let nested = match old {
                    ModelKind::Enclosing(e) => e.declared.nested,
                    _ => BTreeMap::new(),
                };
                if let Some(info) = kind.declared_mut() {
                    info.nested.extend(nested);
                }
                self.arena.replace(existing, kind);
                return Ok(existing);
            }
            return Err(CompileError::DuplicateTypeConflict(name));
        }

        let id = self.arena.alloc(kind);
        self.declared.insert(name.clone(), id);
        match declared.enclosing {
            Some(parent) => {
                if let Some(info) = self.arena.get_mut(parent).declared_mut() {
                    info.nested.insert(name, id);
                }
            }
            None => {
                self.package_mut(&declared.package).nested.insert(name, id);
            }
        }
        Ok(id)
    }

    fn package_mut(&mut self, name: &str) -> &mut PackageModel {
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| PackageModel::of_name(name))
    }

    /// Register a concrete template instantiation as a nested type under its
    /// owning message. Name collisions are disambiguated with a counter.
    pub fn register_impl(
        &mut self,
        owner: ModelId,
        field_name: &str,
        template: ModelId,
        message: ModelId,
    ) -> ModelId {
        let owner_info = match self.arena.declared(owner) {
            Some(info) => info.clone(),
            None => return ModelId::NOTHING,
        };

        let base = capitalize(field_name);
        let mut simple = base.clone();
        let mut counter = 0u32;
        while owner_info.nested.contains_key(&format!("{}.{}", owner_info.name, simple)) {
            counter += 1;
            simple = format!("{}{}", base, counter);
        }
        let name = format!("{}.{}", owner_info.name, simple);

        let declared = DeclaredInfo {
            package: owner_info.package.clone(),
            name: name.clone(),
            simple_name: simple.clone(),
            relative_name: format!("{}.{}", owner_info.relative_name, simple),
            enclosing: Some(owner),
            nested: BTreeMap::new(),
        };
        let id = self.arena.alloc(ModelKind::Impl(ImplModel { declared, template, message }));
        if let Some(info) = self.arena.get_mut(owner).declared_mut() {
            info.nested.insert(name.clone(), id);
        }
        self.declared.insert(name, id);
        id
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
