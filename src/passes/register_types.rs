//! `RegisterTypes`: walks the namespace tree in definition order, installs
//! struct/enum symbols into their owning scope (duplicate -> diagnostic
//! with a previous-definition hint), synthesizes each enum's `dbg`
//! method, and seeds the builtin scalar types plus the `untyped_ptr`/`str`
//! aliases (spec.md §4.3).

use smallvec::SmallVec;

use crate::diag::Diagnostic;
use crate::entities::{Function, Variable};
use crate::idx::Idx;
use crate::program::Program;
use crate::span::{FileId, Position, Span};
use crate::symbol::{intern, Symbol};
use crate::symtab::{SymKind, SymPayload, SymbolInfo};
use crate::types::ty::{Scalar, Type};
use crate::types::{NamespaceId, SymId, VarId};

fn builtin_span() -> Span {
  Span::point(Position { file: FileId::new(0), line: 0, column: 0, index: 0 })
}

/// Insert `name -> sym` into `ns`'s scope, pushing a `WithHint` diagnostic
/// against the previous definition on collision. Returns whether the
/// insertion succeeded (no prior binding).
fn install_in_scope(prog: &mut Program, ns: NamespaceId, name: Symbol, sym: SymId, span: Span) -> bool {
  let scope = prog.namespaces[ns].scope;
  if let Some(prev) = prog.scopes[scope].lookup_local(name) {
    prog.error(Diagnostic::with_hint(
      span, format!("redefinition of '{name}'"),
      prog.symbols[prev].span, "previous definition here",
    ));
    false
  } else {
    prog.scopes[scope].insert(name, sym);
    true
  }
}

/// Install a builtin scalar or alias `TypeDef` symbol into the global
/// scope, where every namespace's parent-chain lookup can see it.
fn install_builtin(prog: &mut Program, name: &str, ty: Type) -> SymId {
  let global_scope = prog.namespaces[prog.global].scope;
  let global_sym = prog.namespaces[prog.global].symbol;
  prog.declare_type_def(global_scope, intern(name), Some(global_sym), builtin_span(), ty)
}

/// Synthesize the `dbg(this): str` method every enum gets for free
/// (spec.md §3, §4.3): returns a string literal selected by the matched
/// variant. `body` is left `None`, a sentinel the code generator reads as
/// "emit the synthesized switch", rather than type-checking a real body.
fn synthesize_dbg_method(prog: &mut Program, enum_id: crate::types::EnumId, str_ty: Type) {
  let enum_sym = prog.enums[enum_id].symbol;
  let span = prog.symbols[enum_sym].span;
  let enum_ty = Type::Enum(enum_id);
  let this_sym = prog.symbols.push(SymbolInfo::new(SymKind::Variable, intern("this"), None, span, SymPayload::Variable(VarId::new(0))));
  let this_var = prog.vars.push(Variable { symbol: this_sym, ty: Type::ptr(enum_ty.clone()), default: None });
  if let SymPayload::Variable(ref mut v) = prog.symbols[this_sym].payload { *v = this_var; }

  let mut params: SmallVec<[VarId; 4]> = SmallVec::new();
  params.push(this_var);
  let scope = prog.namespaces[prog.global].scope;
  let func_id = prog.funcs.push(Function {
    symbol: SymId::new(0), params, ret: str_ty, body: None, exits: false,
    is_method: true, is_static: false, parent_ty: Some(enum_ty), captured_scope: scope,
    decl_span: span, checked: true,
  });
  let sym = prog.symbols.push(SymbolInfo::new(SymKind::Function, intern("dbg"), Some(enum_sym), span, SymPayload::Function(func_id)));
  prog.funcs[func_id].symbol = sym;
  prog.enums[enum_id].methods.insert(intern("dbg"), func_id);
  prog.enums[enum_id].dbg_method = Some(func_id);
}

/// Walk the namespace tree rooted at `ns`, registering every struct and
/// enum declared directly in it before recursing into children (spec.md
/// §4.3: "definition order").
fn walk_namespace(prog: &mut Program, ns: NamespaceId, str_ty: &Type) {
  for i in 0..prog.namespaces[ns].structs.len() {
    let struct_id = prog.namespaces[ns].structs[i];
    let sym = prog.structs[struct_id].symbol;
    let name = prog.symbols[sym].name;
    let span = prog.symbols[sym].span;
    install_in_scope(prog, ns, name, sym, span);
  }
  for i in 0..prog.namespaces[ns].enums.len() {
    let enum_id = prog.namespaces[ns].enums[i];
    let sym = prog.enums[enum_id].symbol;
    let name = prog.symbols[sym].name;
    let span = prog.symbols[sym].span;
    install_in_scope(prog, ns, name, sym, span);
    synthesize_dbg_method(prog, enum_id, str_ty.clone());
  }
  let children: Vec<NamespaceId> = prog.namespaces[ns].children.values().copied().collect();
  for child in children {
    walk_namespace(prog, child, str_ty);
  }
}

/// Run the pass: seed builtins, allocate the error sentinel, then walk
/// the whole namespace tree from `prog.global`.
pub fn run(prog: &mut Program) {
  log::debug!("RegisterTypes: seeding builtins and walking namespace tree from the global namespace");
  for scalar in [
    Scalar::Char, Scalar::Bool, Scalar::Void,
    Scalar::I8, Scalar::I16, Scalar::I32, Scalar::I64,
    Scalar::U8, Scalar::U16, Scalar::U32, Scalar::U64,
    Scalar::F32, Scalar::F64,
  ] {
    install_builtin(prog, scalar.name(), Type::Scalar(scalar));
  }

  let untyped_ptr_sym = install_builtin(prog, "untyped_ptr", Type::ptr(Type::Scalar(Scalar::Void)));
  let untyped_ptr_ty = Type::Alias(intern("untyped_ptr"), std::rc::Rc::new(Type::ptr(Type::Scalar(Scalar::Void))), untyped_ptr_sym);
  let str_sym = install_builtin(prog, "str", Type::ptr(Type::Scalar(Scalar::Char)));
  let str_ty = Type::Alias(intern("str"), std::rc::Rc::new(Type::ptr(Type::Scalar(Scalar::Char))), str_sym);
  // Re-record the alias-wrapped forms so later lookups via `type_defs`
  // return the named alias, not the bare pointer (P7 makes both equal).
  prog.type_defs.insert(untyped_ptr_sym, untyped_ptr_ty);
  prog.type_defs.insert(str_sym, str_ty.clone());

  let err_scope = prog.namespaces[prog.global].scope;
  let err_parent = prog.namespaces[prog.global].symbol;
  let err_sym = prog.declare_type_def(err_scope, intern("<error>"), Some(err_parent), builtin_span(), Type::Error);
  prog.error_sym = Some(err_sym);

  let global = prog.global;
  walk_namespace(prog, global, &str_ty);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::loader::MemoryLoader;
  use crate::parser::load_file;
  use crate::program::CompileOptions;
  use std::path::PathBuf;

  fn parse(src: &str) -> Program {
    let mut loader = MemoryLoader::new();
    loader.add_file("main.oc", src);
    let mut prog = Program::new(CompileOptions::default());
    let global = prog.global;
    load_file(&mut prog, &loader, PathBuf::new(), PathBuf::new(), "main.oc".into(), global, true);
    prog
  }

  #[test]
  fn installs_builtin_scalars_in_global_scope() {
    let mut prog = parse("struct P { x: i32 }");
    run(&mut prog);
    let scope = prog.namespaces[prog.global].scope;
    assert!(prog.scopes[scope].lookup_local(intern("i32")).is_some());
    assert!(prog.scopes[scope].lookup_local(intern("str")).is_some());
    assert!(prog.scopes[scope].lookup_local(intern("untyped_ptr")).is_some());
  }

  #[test]
  fn duplicate_struct_name_is_diagnosed_with_hint() {
    let mut prog = parse("struct P { x: i32 }\nstruct P { y: i32 }");
    run(&mut prog);
    assert!(prog.has_errors());
    assert!(matches!(prog.errors[0], Diagnostic::WithHint { .. }));
  }

  #[test]
  fn enum_gets_synthesized_dbg_method() {
    let mut prog = parse("enum Color { Red, Green }");
    run(&mut prog);
    let enum_id = crate::types::EnumId::new(0);
    assert!(prog.enums[enum_id].dbg_method.is_some());
    assert!(prog.enums[enum_id].methods.contains_key(&intern("dbg")));
  }
}
