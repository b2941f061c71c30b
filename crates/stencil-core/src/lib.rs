//! Stencil Core crate.
//!
//! Compiles pre-parsed tag templates into host-language code. The layers:
//!
//! - `ast` + `reader`: node contract handed over by the parsing front end and
//!   the JSON node-document reader.
//! - `attributes`: tag argument contracts and their resolver.
//! - `security`: the policy consulted before any privileged construct is
//!   emitted.
//! - `tags`: one compiler function per tag kind, selected through a
//!   name-keyed table.
//! - `compiler`: the driver, merge-inlining session and compiled artifact.
//! - `engine`: instance-scoped entry point bundling loader, parser, config,
//!   policy and tag table.
//!
//! Compile flow (high level):
//!
//! 1. Resolve the template through the `ResourceLoader` and parse it.
//! 2. For each tag: lower structured expressions (policy gated), resolve
//!    attributes, gate the tag, dispatch to its compiler.
//! 3. Merge-inlined includes recurse into the driver with the same session;
//!    records are deduplicated by template name and compile identity.
//!
//! Every error is fatal to the whole pass, including enclosing passes.

pub mod ast;
pub mod attributes;
pub mod compiler;
pub mod config;
pub mod emit;
pub mod engine;
pub mod error;
pub mod expr;
pub mod modifiers;
pub mod reader;
pub mod resource;
pub mod security;
pub mod state;
pub mod tags;

pub use ast::{ArgValue, Assignment, Expr, ModifierCall, Node, PrintNode, TagArg, TagInvocation};
pub use attributes::{resolve_attributes, AttributeContract, ResolvedAttributes};
pub use compiler::{compile_template, CompileEnv, CompiledTemplate, MergedFunction, Session};
pub use config::{CompilerConfig, SafeLookups};
pub use engine::Engine;
pub use error::{AttributeError, CompileError, CompileResult, NestingReason, PolicyKind};
pub use reader::{read_nodes, JsonNodeParser, TemplateParser};
pub use resource::{FileLoader, MemoryLoader, ResourceLoader, SourceKind, TemplateSource};
pub use security::{DirList, SecurityPolicy};
pub use state::{CompilerState, FileDependency, PluginRef, TagKind};
pub use tags::{TagContext, TagOutput, TagRegistry, TagSpec};
