//! # tagwire — Schema Compiler and Wire Codec
//!
//! Compiles object-oriented type declarations (generic, inheriting, nested)
//! into a canonical wire model, then assembles Protocol Buffers
//! wire-compatible binary codecs from it.
//!
//! ## Pipeline
//!
//! - **Introspection**: declarations arrive through the [`TypeProvider`]
//!   capability, either parsed from the declaration DSL
//!   ([`SymbolicProvider`]) or registered programmatically
//!   ([`ReflectiveProvider`])
//! - **Classification**: every type reference maps onto a wire model record
//!   (scalars, containers, maps, enums, messages, variables, wildcards)
//! - **Generic resolution**: inherited and instantiated fields have their
//!   type variables substituted with actual arguments
//! - **Assembly**: each non-template message gets an encode/decode adapter
//!   over the Protocol Buffers wire format
//!
//! ## Example DSL
//!
//! ```text
//! package zoo;
//!
//! message Animal {
//!   name: string @1;
//! }
//!
//! message Dog : Animal {
//!   mut breed: string;
//!   tricks: list<string>;
//! }
//!
//! enum Mood {
//!   CALM;
//!   PLAYFUL = 5;
//!   SLEEPY;
//! }
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use tagwire::{CollectingSink, SchemaCompiler, SymbolicProvider, UnknownFieldPolicy, WireCodec};
//!
//! let provider = SymbolicProvider::parse("package zoo; message Animal { name: string; }")?;
//! let mut sink = CollectingSink::new();
//! let schema = SchemaCompiler::new(&provider, &mut sink).compile()?;
//! let codec = WireCodec::assemble(schema, UnknownFieldPolicy::Preserve)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod classify;
pub mod codec;
pub mod compiler;
pub mod descriptor;
pub mod diag;
pub mod extract;
pub mod model;
pub mod parser;
pub mod registry;
pub mod resolve;
pub mod value;
pub mod wire;

pub use classify::{Classifier, Scope};
pub use codec::{AssembleError, CodecError, UnknownFieldPolicy, WireCodec};
pub use compiler::{Schema, SchemaCompiler};
pub use descriptor::{
    CtorDecl, DeclKind, EncodingOverride, EnumConstantDecl, FieldDecl, MethodDecl,
    ReflectiveProvider, TypeDecl, TypeProvider, TypeRef,
};
pub use diag::{CollectingSink, CompileError, Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use model::{ModelArena, ModelId, ModelKind, ScalarKind};
pub use parser::SymbolicProvider;
pub use registry::SchemaRegistry;
pub use resolve::GenericResolver;
pub use value::{MessageValue, Value};
pub use wire::{WireError, WireReader, WireType, WireWriter};
