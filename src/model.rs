//! The canonical wire model.
//!
//! Every classified type becomes a record in a [`ModelArena`]: an index-stable
//! arena whose records hold a tagged [`ModelKind`]. Back-references between
//! records are [`ModelId`] indices, so a record's kind can be replaced in
//! place (the `Enclosing` placeholder upgrade) without invalidating anything
//! that points at it. Index 0 is the `Nothing` sentinel: the explicit
//! "unclassifiable" result, distinguishable from a registry miss.

use std::collections::BTreeMap;

use crate::descriptor::TypeRef;

/// Index of a record in the [`ModelArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId(u32);

impl ModelId {
    /// The unclassifiable sentinel, always at index 0.
    pub const NOTHING: ModelId = ModelId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_nothing(self) -> bool {
        self == ModelId::NOTHING
    }
}

/// The scalar table. Signed varint (`Int32`/`Int64`) is the default integer
/// encoding; the `sint` family is zig-zag varint and the `fixed`/`sfixed`
/// family is fixed-width little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int32,
    Uint32,
    Sint32,
    Fixed32,
    Sfixed32,
    Int64,
    Uint64,
    Sint64,
    Fixed64,
    Sfixed64,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarKind {
    /// The fixed scalar table, matched by exact type identity.
    pub const TABLE: [(&'static str, ScalarKind); 15] = [
        ("bool", ScalarKind::Bool),
        ("int32", ScalarKind::Int32),
        ("uint32", ScalarKind::Uint32),
        ("sint32", ScalarKind::Sint32),
        ("fixed32", ScalarKind::Fixed32),
        ("sfixed32", ScalarKind::Sfixed32),
        ("int64", ScalarKind::Int64),
        ("uint64", ScalarKind::Uint64),
        ("sint64", ScalarKind::Sint64),
        ("fixed64", ScalarKind::Fixed64),
        ("sfixed64", ScalarKind::Sfixed64),
        ("float", ScalarKind::Float),
        ("double", ScalarKind::Double),
        ("string", ScalarKind::String),
        ("bytes", ScalarKind::Bytes),
    ];

    pub fn by_name(name: &str) -> Option<ScalarKind> {
        Self::TABLE.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
    }

    pub fn proto_name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(_, k)| *k == self)
            .map(|(n, _)| *n)
            .unwrap_or("bool")
    }

    /// Fixed-width scalars are the only valid packed-list components.
    pub fn is_fixed_width(self) -> bool {
        matches!(
            self,
            ScalarKind::Fixed32
                | ScalarKind::Sfixed32
                | ScalarKind::Float
                | ScalarKind::Fixed64
                | ScalarKind::Sfixed64
                | ScalarKind::Double
        )
    }
}

/// Host container flavor of a repeated field. All encode identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Set,
    Queue,
    Array,
}

/// Name/namespace information shared by every declared model.
#[derive(Debug, Clone)]
pub struct DeclaredInfo {
    pub package: String,
    /// Canonical name, globally unique.
    pub name: String,
    pub simple_name: String,
    /// Name relative to the outermost enclosing type, e.g. `Outer.Inner`.
    pub relative_name: String,
    pub enclosing: Option<ModelId>,
    /// Nested declared types by canonical name. Reciprocal with `enclosing`.
    pub nested: BTreeMap<String, ModelId>,
}

impl DeclaredInfo {
    pub fn top_level(package: impl Into<String>, simple_name: impl Into<String>) -> Self {
        let package = package.into();
        let simple_name = simple_name.into();
        let name = if package.is_empty() {
            simple_name.clone()
        } else {
            format!("{}.{}", package, simple_name)
        };
        DeclaredInfo {
            package,
            name,
            relative_name: simple_name.clone(),
            simple_name,
            enclosing: None,
            nested: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListModel {
    pub kind: ContainerKind,
    pub component: ModelId,
    pub packed: bool,
}

#[derive(Debug, Clone)]
pub struct MapModel {
    pub key: ModelId,
    pub value: ModelId,
}

/// Enum constant. `ordinal` follows declaration order from 0; `tag` is the
/// wire number (explicit override, else previous tag + 1, starting at 1).
/// The two numbering spaces are independent and both are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumConstant {
    pub name: String,
    pub ordinal: u32,
    pub tag: u32,
}

#[derive(Debug, Clone)]
pub struct EnumModel {
    pub declared: DeclaredInfo,
    pub constants: Vec<EnumConstant>,
}

impl EnumModel {
    pub fn constant_by_tag(&self, tag: u32) -> Option<&EnumConstant> {
        self.constants.iter().find(|c| c.tag == tag)
    }
}

/// A matched read or write accessor.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub method: String,
    /// Bare-name match without a `get`/`is`/`set` prefix.
    pub fluent: bool,
}

#[derive(Debug, Clone)]
pub struct FieldModel {
    pub name: String,
    pub model: ModelId,
    /// The declared host reference; kept for constructor type matching.
    pub type_ref: TypeRef,
    pub tag: u32,
    pub mutable: bool,
    pub packed: bool,
    /// Canonical name of the message that originally declared the field.
    pub declared_by: String,
    pub getter: Option<Accessor>,
    pub setter: Option<Accessor>,
}

/// One constructor parameter slot: the bound field index, or no field.
#[derive(Debug, Clone)]
pub struct CtorParam {
    pub field: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ConstructorModel {
    pub params: Vec<CtorParam>,
}

impl ConstructorModel {
    /// Fully valid when every parameter is bound to a field.
    pub fn is_fully_bound(&self) -> bool {
        self.params.iter().all(|p| p.field.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct MessageModel {
    pub declared: DeclaredInfo,
    pub super_type: Option<ModelId>,
    /// Declared type parameter names from the declaration itself.
    pub type_params: Vec<String>,
    /// Actual type arguments from the reference this model was built for;
    /// empty for a bare declaration.
    pub type_args: Vec<TypeRef>,
    /// Has at least one unresolved type parameter.
    pub template: bool,
    /// Concrete instantiation of a template: all arguments resolved.
    pub is_impl: bool,
    /// Effective field set in declaration order: inherited (re-derived), then own.
    pub fields: Vec<FieldModel>,
    /// Sparse tag to field index. On a tag collision the last write wins.
    pub fields_by_tag: BTreeMap<u32, usize>,
    pub constructors: Vec<ConstructorModel>,
    pub has_empty_ctor: bool,
}

impl MessageModel {
    pub fn new(declared: DeclaredInfo) -> Self {
        MessageModel {
            declared,
            super_type: None,
            type_params: Vec::new(),
            type_args: Vec::new(),
            template: false,
            is_impl: false,
            fields: Vec::new(),
            fields_by_tag: BTreeMap::new(),
            constructors: Vec::new(),
            has_empty_ctor: false,
        }
    }

    /// Next default tag: (max existing tag) + 1, starting at 1.
    pub fn next_tag(&self) -> u32 {
        match self.fields_by_tag.keys().next_back() {
            Some(last) => last + 1,
            None => 1,
        }
    }

    /// Insert a field; on a tag collision the new field takes the slot.
    /// Returns true when the tag was already taken.
    pub fn push_field(&mut self, field: FieldModel) -> bool {
        let tag = field.tag;
        let collided = self.fields_by_tag.contains_key(&tag);
        self.fields.push(field);
        self.fields_by_tag.insert(tag, self.fields.len() - 1);
        collided
    }

    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldModel> {
        self.fields.iter_mut().find(|f| f.name == name)
    }
}

/// Unresolved generic placeholder: the variable name and its declaration
/// index in the declaring type's parameter list, when known.
#[derive(Debug, Clone)]
pub struct VariableModel {
    pub name: String,
    pub index: Option<usize>,
}

/// Bounded existential referencing zero or one captured type variable.
#[derive(Debug, Clone)]
pub struct WildcardModel {
    /// Already-resolved bound, preferred by the resolver when present.
    pub bound: Option<ModelId>,
    /// The single captured variable, if any.
    pub var: Option<ModelId>,
}

/// Concrete instantiation of a template message, registered as a nested
/// type under its owning message.
#[derive(Debug, Clone)]
pub struct ImplModel {
    pub declared: DeclaredInfo,
    /// The template message this instantiates.
    pub template: ModelId,
    /// The materialized message with fully resolved fields.
    pub message: ModelId,
}

/// Pure namespace holder for nested declared types; never serializable.
/// May be upgraded in place to a message at most once per name.
#[derive(Debug, Clone)]
pub struct EnclosingModel {
    pub declared: DeclaredInfo,
}

/// A wire model record. Closed set of variants.
#[derive(Debug, Clone)]
pub enum ModelKind {
    /// Unclassifiable sentinel.
    Nothing,
    Primitive(ScalarKind),
    List(ListModel),
    Map(MapModel),
    Enum(EnumModel),
    Message(MessageModel),
    Variable(VariableModel),
    Wildcard(WildcardModel),
    Impl(ImplModel),
    Enclosing(EnclosingModel),
}

impl ModelKind {
    pub fn declared(&self) -> Option<&DeclaredInfo> {
        match self {
            ModelKind::Enum(m) => Some(&m.declared),
            ModelKind::Message(m) => Some(&m.declared),
            ModelKind::Impl(m) => Some(&m.declared),
            ModelKind::Enclosing(m) => Some(&m.declared),
            _ => None,
        }
    }

    pub fn declared_mut(&mut self) -> Option<&mut DeclaredInfo> {
        match self {
            ModelKind::Enum(m) => Some(&mut m.declared),
            ModelKind::Message(m) => Some(&mut m.declared),
            ModelKind::Impl(m) => Some(&mut m.declared),
            ModelKind::Enclosing(m) => Some(&mut m.declared),
            _ => None,
        }
    }

    pub fn is_enclosing(&self) -> bool {
        matches!(self, ModelKind::Enclosing(_))
    }
}

/// Index-stable arena of wire model records.
#[derive(Debug)]
pub struct ModelArena {
    records: Vec<ModelKind>,
    scalars: Vec<(ScalarKind, ModelId)>,
}

impl Default for ModelArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelArena {
    pub fn new() -> Self {
        let mut arena = ModelArena { records: vec![ModelKind::Nothing], scalars: Vec::new() };
        // Primitive singletons, one record per scalar kind.
        for (_, kind) in ScalarKind::TABLE {
            let id = arena.alloc(ModelKind::Primitive(kind));
            arena.scalars.push((kind, id));
        }
        arena
    }

    pub fn alloc(&mut self, kind: ModelKind) -> ModelId {
        self.records.push(kind);
        ModelId((self.records.len() - 1) as u32)
    }

    pub fn get(&self, id: ModelId) -> &ModelKind {
        &self.records[id.index()]
    }

    pub fn get_mut(&mut self, id: ModelId) -> &mut ModelKind {
        &mut self.records[id.index()]
    }

    /// Replace the record kind at `id`, keeping the index (and therefore every
    /// back-reference) valid. Returns the previous kind.
    pub fn replace(&mut self, id: ModelId, kind: ModelKind) -> ModelKind {
        std::mem::replace(&mut self.records[id.index()], kind)
    }

    /// The shared singleton for a scalar kind.
    pub fn scalar(&self, kind: ScalarKind) -> ModelId {
        self.scalars
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .unwrap_or(ModelId::NOTHING)
    }

    pub fn message(&self, id: ModelId) -> Option<&MessageModel> {
        match self.get(id) {
            ModelKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn message_mut(&mut self, id: ModelId) -> Option<&mut MessageModel> {
        match self.get_mut(id) {
            ModelKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn enum_model(&self, id: ModelId) -> Option<&EnumModel> {
        match self.get(id) {
            ModelKind::Enum(m) => Some(m),
            _ => None,
        }
    }

    pub fn declared(&self, id: ModelId) -> Option<&DeclaredInfo> {
        self.get(id).declared()
    }

    /// A model is a template when any unresolved variable or wildcard occurs
    /// anywhere inside it.
    pub fn is_template(&self, id: ModelId) -> bool {
        match self.get(id) {
            ModelKind::Variable(_) | ModelKind::Wildcard(_) => true,
            ModelKind::List(l) => self.is_template(l.component),
            ModelKind::Map(m) => self.is_template(m.key) || self.is_template(m.value),
            ModelKind::Message(m) => m.template,
            _ => false,
        }
    }

    /// Render a model for diagnostics.
    pub fn render(&self, id: ModelId) -> String {
        match self.get(id) {
            ModelKind::Nothing => "nothing".to_string(),
            ModelKind::Primitive(k) => k.proto_name().to_string(),
            ModelKind::List(l) => {
                let kind = match l.kind {
                    ContainerKind::List => "list",
                    ContainerKind::Set => "set",
                    ContainerKind::Queue => "queue",
                    ContainerKind::Array => "array",
                };
                format!("{}<{}>", kind, self.render(l.component))
            }
            ModelKind::Map(m) => format!("map<{}, {}>", self.render(m.key), self.render(m.value)),
            ModelKind::Enum(e) => format!("enum {}", e.declared.name),
            ModelKind::Message(m) => m.declared.name.clone(),
            ModelKind::Variable(v) => v.name.clone(),
            ModelKind::Wildcard(_) => "?".to_string(),
            ModelKind::Impl(i) => i.declared.name.clone(),
            ModelKind::Enclosing(e) => e.declared.name.clone(),
        }
    }
}
