//! The fixed `std` prelude namespace (SPEC_FULL.md's Parser module;
//! grounded in `std/prelude.h` and `std/og/interface.c`): installed once,
//! before the user's root file is parsed, so a handful of libc-shaped
//! extern declarations are callable without redeclaration.

use crate::entities::{Function, Variable};
use crate::idx::Idx;
use crate::program::Program;
use crate::span::{FileId, Position, Span};
use crate::symbol::intern;
use crate::symtab::{SymKind, SymPayload, SymbolInfo};
use crate::types::ast::{Node, NodeKind};
use crate::types::ty::{Scalar, Type};
use crate::types::{NamespaceId, SymId, VarId};

fn builtin_span() -> Span {
  Span::point(Position { file: FileId::new(0), line: 0, column: 0, index: 0 })
}

fn ident_type(prog: &mut Program, name: &str) -> Type {
  let node = prog.nodes.push(Node::new(builtin_span(), NodeKind::Identifier(intern(name))));
  Type::Unresolved(node)
}

fn declare_extern_fn(prog: &mut Program, ns: NamespaceId, name: &str, params: &[(&str, Type)], ret: Type, exits: bool) {
  let parent_sym = prog.namespaces[ns].symbol;
  let span = builtin_span();
  let mut param_ids = smallvec::SmallVec::new();
  for (pname, pty) in params {
    let psym = prog.symbols.push(SymbolInfo::new(SymKind::Variable, intern(pname), None, span, SymPayload::Variable(VarId::new(0))));
    let vid = prog.vars.push(Variable { symbol: psym, ty: pty.clone(), default: None });
    if let SymPayload::Variable(ref mut v) = prog.symbols[psym].payload { *v = vid; }
    param_ids.push(vid);
  }
  let scope = prog.namespaces[ns].scope;
  let func_id = prog.funcs.push(Function {
    symbol: SymId::new(0), params: param_ids, ret, body: None, exits,
    is_method: false, is_static: false, parent_ty: None, captured_scope: scope,
    decl_span: span, checked: false,
  });
  let sym = prog.symbols.push(SymbolInfo::new(SymKind::Function, intern(name), Some(parent_sym), span, SymPayload::Function(func_id)));
  prog.symbols[sym].is_extern = true;
  prog.symbols[sym].extern_name = Some(intern(name));
  prog.funcs[func_id].symbol = sym;
  prog.namespaces[ns].functions.push(func_id);
}

/// Build the `std` namespace and its libc-shaped extern declarations
/// under `prog.global`. A second call is a no-op if `std` already
/// exists, so multiple root files parsed into one `Program` (as in the
/// unit tests) don't double-register it.
pub fn install(prog: &mut Program) -> NamespaceId {
  if let Some(&existing) = prog.namespaces[prog.global].children.get(&intern("std")) {
    return existing;
  }
  let span = builtin_span();
  let std_ns = prog.new_namespace(prog.global, intern("std"), span, intern("std"));
  prog.namespaces[std_ns].always_add_to_scope = true;

  let u64_ty = Type::Scalar(Scalar::U64);
  let i32_ty = Type::Scalar(Scalar::I32);
  let void_ty = Type::Scalar(Scalar::Void);
  let untyped_ptr = ident_type(prog, "untyped_ptr");
  let str_ty = ident_type(prog, "str");

  declare_extern_fn(prog, std_ns, "malloc", &[("size", u64_ty.clone())], Type::ptr(untyped_ptr.clone()), false);
  declare_extern_fn(prog, std_ns, "free", &[("ptr", Type::ptr(untyped_ptr))], void_ty.clone(), false);
  declare_extern_fn(prog, std_ns, "printf", &[("fmt", str_ty)], i32_ty.clone(), false);
  declare_extern_fn(prog, std_ns, "exit", &[("code", i32_ty)], void_ty, true);

  std_ns
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::program::CompileOptions;

  #[test]
  fn installs_std_namespace_with_libc_externs() {
    let mut prog = Program::new(CompileOptions::default());
    let ns = install(&mut prog);
    assert_eq!(prog.namespaces[ns].functions.len(), 4);
    assert!(prog.namespaces[prog.global].children.contains_key(&intern("std")));
  }

  #[test]
  fn install_is_idempotent() {
    let mut prog = Program::new(CompileOptions::default());
    let ns1 = install(&mut prog);
    let ns2 = install(&mut prog);
    assert_eq!(ns1.index(), ns2.index());
  }
}
