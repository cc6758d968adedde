//! Host type metadata: references, declarations, and the introspection capability.
//!
//! The compiler never talks to a real type system. It consumes [`TypeDecl`]s
//! through the [`TypeProvider`] capability, which has two interchangeable
//! adapters: [`SymbolicProvider`](crate::parser::SymbolicProvider) builds
//! declarations from source text before any compilation, and
//! [`ReflectiveProvider`] is populated programmatically at runtime. The
//! classifier is written once against this interface.

use std::collections::BTreeMap;
use std::fmt;

/// One opaque type reference from the host type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// A class-like reference by name: a scalar table entry, a container raw
    /// name (`list`, `set`, `queue`, `map`), or a declared message/enum.
    Named(String),
    /// A parameterized reference, e.g. `list<string>` or `Box<T>`.
    Parameterized { raw: String, args: Vec<TypeRef> },
    /// An unresolved type variable, e.g. `T`.
    Variable(String),
    /// A bounded existential, e.g. `?` or `? : T` or `? : Animal`.
    Wildcard { bound: Option<Box<TypeRef>> },
    /// An array of a component type.
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn parameterized(raw: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Parameterized { raw: raw.into(), args }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        TypeRef::Variable(name.into())
    }

    /// Raw name of a class-like reference, ignoring type arguments.
    pub fn raw_name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(n) => Some(n),
            TypeRef::Parameterized { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, TypeRef::Variable(_))
    }

    /// True when no variable or wildcard occurs anywhere in the reference.
    pub fn is_concrete(&self) -> bool {
        match self {
            TypeRef::Named(_) => true,
            TypeRef::Parameterized { args, .. } => args.iter().all(TypeRef::is_concrete),
            TypeRef::Variable(_) | TypeRef::Wildcard { .. } => false,
            TypeRef::Array(c) => c.is_concrete(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(n) => write!(f, "{}", n),
            TypeRef::Parameterized { raw, args } => {
                write!(f, "{}<", raw)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ">")
            }
            TypeRef::Variable(n) => write!(f, "{}", n),
            TypeRef::Wildcard { bound: None } => write!(f, "?"),
            TypeRef::Wildcard { bound: Some(b) } => write!(f, "? : {}", b),
            TypeRef::Array(c) => write!(f, "{}[]", c),
        }
    }
}

/// Per-field integer encoding override; signed varint is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingOverride {
    /// Fixed-width little-endian (`fixed32`/`sfixed32`/`fixed64`/`sfixed64`).
    Fixed,
    /// Zig-zag varint (`sint32`/`sint64`).
    Zigzag,
}

/// A declared field as the host presents it.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub type_ref: TypeRef,
    /// Declared mutable; a matched setter makes a field mutable as well.
    pub mutable: bool,
    /// Explicit wire tag override.
    pub tag: Option<u32>,
    pub encoding: Option<EncodingOverride>,
    /// Packed list encoding requested.
    pub packed: bool,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        FieldDecl {
            name: name.into(),
            type_ref,
            mutable: false,
            tag: None,
            encoding: None,
            packed: false,
        }
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }
}

/// A declared method: candidate getter (zero args) or setter (one arg).
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<TypeRef>,
    pub returns: Option<TypeRef>,
}

impl MethodDecl {
    pub fn getter(name: impl Into<String>, returns: TypeRef) -> Self {
        MethodDecl { name: name.into(), params: Vec::new(), returns: Some(returns) }
    }

    pub fn setter(name: impl Into<String>, param: TypeRef) -> Self {
        MethodDecl { name: name.into(), params: vec![param], returns: None }
    }
}

/// A declared constructor, optionally with an explicit positional
/// parameter-to-field-name mapping from the host metadata.
#[derive(Debug, Clone)]
pub struct CtorDecl {
    pub params: Vec<TypeRef>,
    pub param_fields: Option<Vec<String>>,
}

/// An enum constant declaration; tag defaults to previous + 1, starting at 1.
#[derive(Debug, Clone)]
pub struct EnumConstantDecl {
    pub name: String,
    pub tag: Option<u32>,
}

/// What a declaration is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Message,
    Enum,
}

/// One declared type as enumerated by the host.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub package: String,
    /// Simple name, e.g. `Dog`.
    pub name: String,
    pub kind: DeclKind,
    /// Declared type parameter names, e.g. `["T"]` for `Box<T>`.
    pub type_params: Vec<String>,
    /// Supertype reference, possibly parameterized.
    pub super_ref: Option<TypeRef>,
    /// Canonical name of the enclosing declared type, if nested.
    pub enclosing: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub ctors: Vec<CtorDecl>,
    pub constants: Vec<EnumConstantDecl>,
}

impl TypeDecl {
    pub fn message(package: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDecl {
            package: package.into(),
            name: name.into(),
            kind: DeclKind::Message,
            type_params: Vec::new(),
            super_ref: None,
            enclosing: None,
            fields: Vec::new(),
            methods: Vec::new(),
            ctors: Vec::new(),
            constants: Vec::new(),
        }
    }

    pub fn enumeration(package: impl Into<String>, name: impl Into<String>) -> Self {
        let mut decl = Self::message(package, name);
        decl.kind = DeclKind::Enum;
        decl
    }

    /// Fully qualified name: `package.Enclosing.Simple`.
    pub fn canonical_name(&self) -> String {
        match &self.enclosing {
            Some(outer) => format!("{}.{}", outer, self.name),
            None if self.package.is_empty() => self.name.clone(),
            None => format!("{}.{}", self.package, self.name),
        }
    }
}

/// The type introspection capability consumed by the compiler.
pub trait TypeProvider {
    /// Look up a declaration by canonical name. Partial: `None` on miss.
    fn lookup(&self, canonical: &str) -> Option<&TypeDecl>;

    /// Canonical names of every declared type, in deterministic order.
    fn declared_names(&self) -> Vec<String>;
}

/// Runtime-reflective adapter: declarations registered through a builder API.
#[derive(Debug, Default)]
pub struct ReflectiveProvider {
    decls: BTreeMap<String, TypeDecl>,
}

impl ReflectiveProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration under its canonical name.
    pub fn register(&mut self, decl: TypeDecl) -> &mut Self {
        self.decls.insert(decl.canonical_name(), decl);
        self
    }

    pub fn with(mut self, decl: TypeDecl) -> Self {
        self.register(decl);
        self
    }
}

impl TypeProvider for ReflectiveProvider {
    fn lookup(&self, canonical: &str) -> Option<&TypeDecl> {
        self.decls.get(canonical)
    }

    fn declared_names(&self) -> Vec<String> {
        self.decls.keys().cloned().collect()
    }
}
