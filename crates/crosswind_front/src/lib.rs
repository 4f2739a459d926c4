//! # crosswind-front
//!
//! The semantic-analysis core of the crosswind compiler. Given
//! s-expression module sources, the frontend:
//!
//! 1. loads and binds the module graph, specializing parameterized
//!    modules through an import fixed point ([`pool`]),
//! 2. binds every identifier to its defining node across scopes,
//!    module namespaces, and the builtin module, expanding hygienic
//!    macros along the way ([`symbolize`], [`macros`]),
//! 3. assigns every typed node a canonical type interned in the type
//!    corpus, dispatching polymorphic calls on their first argument
//!    ([`typify`], [`corpus`]), and
//! 4. audits all of it ([`verify`]).
//!
//! The produced artifact is the annotated AST inside the returned
//! [`Ctx`], ready for later compiler stages.
//!
//! ```
//! use crosswind_front::compile::{analyze_source, Options};
//!
//! let ctx = analyze_source(
//!     "(module main [
//!        (fun pub add [(param x u32) (param y u32)] u32 [
//!          (return (+ x y))
//!        ])
//!      ])",
//!     Options::default(),
//! )
//! .unwrap();
//! assert!(ctx.corpus.lookup("fun(u32,u32,u32)").is_some());
//! ```

pub mod ast;
pub mod compile;
pub mod corpus;
pub mod ctx;
pub mod lexer;
pub mod macros;
pub mod pool;
pub mod reader;
pub mod symbolize;
pub mod symtab;
pub mod typify;
pub mod verify;

pub use ast::{Ast, BaseTypeKind, ModId, NodeFlags, NodeId, NodeKind, TypeId};
pub use compile::{analyze, analyze_source, run, Options};
pub use corpus::{TypeCorpus, TypeShape};
pub use ctx::{Ctx, Module};
pub use pool::{FileLoader, MemLoader, ModLoader, ModPool};
pub use symtab::SymTab;
