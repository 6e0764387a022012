//! Front-end and middle-end of a self-hosted compiler: lexer, parser,
//! symbol/type data model, and the `RegisterTypes` / `TypeChecker` /
//! `ReorderStructs` passes that turn source text into a fully resolved,
//! dependency-ordered `Program` ready for code generation.
//!
//! Code generation itself lives behind the [`codegen::CodeGen`] trait;
//! this crate ships a minimal text emitter but does not own the final
//! C-compiler invocation, CLI, or file I/O around it.

pub mod codegen;
pub mod diag;
pub mod entities;
pub mod idx;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod passes;
pub mod prelude;
pub mod program;
pub mod scope;
pub mod span;
pub mod symbol;
pub mod symtab;
pub mod types;

pub use diag::Diagnostic;
pub use program::{CompileOptions, Program};

/// Run the full front/middle-end pipeline over `prog`'s already-loaded
/// files: `RegisterTypes`, `TypeChecker`, then `ReorderStructs`. Stops
/// after `RegisterTypes`/`TypeChecker` if they produced errors, since
/// `ReorderStructs` assumes a fully resolved struct-field graph.
pub fn check(prog: &mut Program) {
  passes::register_types::run(prog);
  passes::typecheck::run(prog);
  if prog.has_errors() {
    return;
  }
  passes::reorder::run(prog);
}
