//! Expression checking (spec.md §4.4.1): literals, name resolution, the
//! binary/unary operator rules, calls (free functions, static and
//! instance methods, struct constructors), and member/index access.

use crate::diag::Diagnostic;
use crate::program::Program;
use crate::symtab::SymPayload;
use crate::types::ast::{BinOp, CallArg, NodeKind, UnOp};
use crate::types::ty::{Scalar, Type};
use crate::types::{NodeId, ScopeId};

use super::{resolve_scoped_symbol, resolve_type};

/// Two types may appear on either side of an assignment or parameter
/// binding: identical types, or a `null`/`untyped_ptr`-shaped pointer
/// assigned to any other pointer type (spec.md §3, `untyped_ptr`).
pub(super) fn assignable(from: &Type, to: &Type) -> bool {
  if crate::types::ty::eq(from, to) {
    return true;
  }
  match (from.as_pointer(), to.as_pointer()) {
    (Some(f), _) if f.is_void() => to.as_pointer().is_some(),
    (_, Some(t)) if t.is_void() => from.as_pointer().is_some(),
    _ => false,
  }
}

fn str_type() -> Type { Type::ptr(Type::Scalar(Scalar::Char)) }

fn set_etype(prog: &mut Program, node: NodeId, ty: Type) -> Type {
  prog.nodes[node].etype = Some(ty.clone());
  ty
}

/// `print`/`println` arguments and format-string embedded expressions
/// that are enum-typed are implicitly rendered through the synthesized
/// `dbg` method rather than requiring the caller to write `.dbg()`
/// (spec.md §4.4.1). Returns a new `Member`+`Call` node wrapping `value`
/// when `ty` is an enum, or `None` when no wrapping is needed.
fn wrap_enum_dbg(prog: &mut Program, ty: Type, value: NodeId) -> Option<NodeId> {
  let eid = ty.as_enum()?;
  let dbg_fn = prog.enums[eid].dbg_method?;
  let span = prog.nodes[value].span;
  let dbg_sym = crate::symbol::intern("dbg");
  let member = prog.nodes.push(crate::types::ast::Node::new(span, NodeKind::Member(value, dbg_sym)));
  let call = prog.nodes.push(crate::types::ast::Node::new(span, NodeKind::Call(member, Vec::new())));
  prog.nodes[call].resolved_sym = Some(prog.funcs[dbg_fn].symbol);
  prog.nodes[call].call_flags.added_method_arg = true;
  prog.nodes[call].etype = Some(str_type());
  Some(call)
}

pub(in crate::passes) fn check_expr(prog: &mut Program, scope: ScopeId, node: NodeId) -> Type {
  let ty = check_expr_inner(prog, scope, node);
  set_etype(prog, node, ty)
}

fn check_expr_inner(prog: &mut Program, scope: ScopeId, node: NodeId) -> Type {
  match prog.nodes[node].kind.clone() {
    NodeKind::IntLiteral { suffix, .. } => suffix
      .and_then(|s| Scalar::from_name(s.as_str()))
      .filter(|s| s.is_integer())
      .map_or(Type::Scalar(Scalar::I32), Type::Scalar),
    NodeKind::FloatLiteral { suffix, .. } => suffix
      .and_then(|s| Scalar::from_name(s.as_str()))
      .filter(|s| s.is_float())
      .map_or(Type::Scalar(Scalar::F64), Type::Scalar),
    NodeKind::CharLiteral(_) => Type::Scalar(Scalar::Char),
    NodeKind::StringLiteral(_) => str_type(),
    NodeKind::BoolLiteral(_) => Type::Scalar(Scalar::Bool),
    NodeKind::Null => Type::ptr(Type::Scalar(Scalar::Void)),
    NodeKind::FormatString { literals, specs, mut exprs } => {
      for e in &mut exprs {
        let et = check_expr(prog, scope, *e);
        if let Some(wrapped) = wrap_enum_dbg(prog, et, *e) {
          *e = wrapped;
        }
      }
      prog.nodes[node].kind = NodeKind::FormatString { literals, specs, exprs };
      str_type()
    }
    NodeKind::Identifier(_) | NodeKind::NSLookup(_, _) => check_name(prog, scope, node),
    NodeKind::Specialization(..) => {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "template arguments are not valid here"));
      Type::Error
    }
    NodeKind::Binary(op, l, r) => check_binary(prog, scope, node, op, l, r),
    NodeKind::Unary(op, operand) => check_unary(prog, scope, node, op, operand),
    NodeKind::Assign(lhs, rhs) => check_assign(prog, scope, node, lhs, rhs),
    NodeKind::CompoundAssign(op, lhs, rhs) => {
      let result = check_binary(prog, scope, node, op, lhs, rhs);
      let lt = prog.nodes[lhs].etype.clone().unwrap_or(Type::Error);
      if !lt.is_error() && !result.is_error() && !assignable(&result, &lt) {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "compound assignment changes the operand's type"));
      }
      lt
    }
    NodeKind::Call(callee, args) => check_call(prog, scope, node, callee, args),
    NodeKind::Member(recv, name) => check_member(prog, scope, node, recv, name),
    NodeKind::Index(base, idx) => check_index(prog, scope, node, base, idx),
    NodeKind::Cast(expr, ty_node) => {
      check_expr(prog, scope, expr);
      resolve_type(prog, scope, ty_node)
    }
    NodeKind::SizeOf(ty_node) => {
      resolve_type(prog, scope, ty_node);
      Type::Scalar(Scalar::U64)
    }
    NodeKind::Block(_) => super::stmt::check_block_expr(prog, scope, node),
    NodeKind::If { cond, then_blk, else_blk } => super::stmt::check_if_expr(prog, scope, node, cond, then_blk, else_blk),
    NodeKind::Match { scrutinee, cases, default } => super::stmt::check_match_expr(prog, scope, node, scrutinee, cases, default),
    _ => {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "not valid in an expression"));
      Type::Error
    }
  }
}

/// `Identifier`/`NSLookup` as a value: resolve to a symbol and read off
/// the type its kind implies.
fn check_name(prog: &mut Program, scope: ScopeId, node: NodeId) -> Type {
  let Some(sym) = resolve_scoped_symbol(prog, scope, node) else {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "unknown name"));
    return Type::Error;
  };
  prog.nodes[node].resolved_sym = Some(sym);
  match prog.symbols[sym].payload {
    SymPayload::Variable(v) | SymPayload::Constant(v) => prog.vars[v].ty.clone(),
    SymPayload::Function(f) => {
      let params: Vec<_> = prog.funcs[f].params.iter()
        .map(|&p| crate::types::ty::Param { name: prog.symbols[prog.vars[p].symbol].name, ty: std::rc::Rc::new(prog.vars[p].ty.clone()) })
        .collect();
      Type::Function(params.into(), std::rc::Rc::new(prog.funcs[f].ret.clone()))
    }
    _ => {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "not a value"));
      Type::Error
    }
  }
}

fn check_binary(prog: &mut Program, scope: ScopeId, node: NodeId, op: BinOp, l: NodeId, r: NodeId) -> Type {
  let lt = check_expr(prog, scope, l);
  let rt = check_expr(prog, scope, r);
  if lt.is_error() || rt.is_error() {
    return Type::Error;
  }
  if op.is_logical() {
    if !lt.is_bool() || !rt.is_bool() {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "'&&'/'||' require bool operands"));
      return Type::Error;
    }
    return Type::Scalar(Scalar::Bool);
  }
  if op.is_comparison() {
    let ok = (lt.is_numeric() && rt.is_numeric()) || (lt.as_pointer().is_some() && rt.as_pointer().is_some());
    if !ok {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "operands to a comparison must be the same kind of type"));
    }
    return Type::Scalar(Scalar::Bool);
  }
  if op.is_bitwise_or_shift() {
    if !lt.is_integer() || !rt.is_integer() {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "bitwise operators require integer operands"));
      return Type::Error;
    }
    return lt;
  }
  // Add/Sub/Mul/Div/Mod.
  if let Some(pointee) = lt.as_pointer() {
    if matches!(op, BinOp::Add | BinOp::Sub) && rt.is_integer() {
      let _ = pointee;
      return lt;
    }
  }
  if !lt.is_numeric() || !rt.is_numeric() {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "arithmetic requires numeric operands"));
    return Type::Error;
  }
  if !crate::types::ty::eq(&lt, &rt) {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "mismatched operand types"));
    return Type::Error;
  }
  lt
}

fn check_unary(prog: &mut Program, scope: ScopeId, node: NodeId, op: UnOp, operand: NodeId) -> Type {
  let ty = check_expr(prog, scope, operand);
  if ty.is_error() {
    return Type::Error;
  }
  match op {
    UnOp::Neg => {
      if !ty.is_numeric() {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "unary '-' requires a numeric operand"));
        return Type::Error;
      }
      ty
    }
    UnOp::Not => {
      if !ty.is_bool() {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "'!' requires a bool operand"));
        return Type::Error;
      }
      ty
    }
    UnOp::BitNot => {
      if !ty.is_integer() {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "'~' requires an integer operand"));
        return Type::Error;
      }
      ty
    }
    UnOp::Deref => {
      let Some(pointee) = ty.as_pointer() else {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "cannot dereference a non-pointer"));
        return Type::Error;
      };
      pointee.clone()
    }
    UnOp::AddressOf => Type::ptr(ty),
    UnOp::Try => ty,
  }
}

fn is_lvalue(prog: &Program, node: NodeId) -> bool {
  matches!(prog.nodes[node].kind,
    NodeKind::Identifier(_) | NodeKind::Member(..) | NodeKind::Index(..) | NodeKind::Unary(UnOp::Deref, _))
}

fn check_assign(prog: &mut Program, scope: ScopeId, node: NodeId, lhs: NodeId, rhs: NodeId) -> Type {
  if !is_lvalue(prog, lhs) {
    prog.error(Diagnostic::standard(prog.nodes[lhs].span, "left side of an assignment must be a variable, field, or index"));
  }
  let lt = check_expr(prog, scope, lhs);
  let rt = check_expr(prog, scope, rhs);
  if !lt.is_error() && !rt.is_error() && !assignable(&rt, &lt) {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "cannot assign a value of a different type"));
  }
  lt
}

fn check_args_against(prog: &mut Program, scope: ScopeId, call_span: crate::span::Span, args: &[CallArg], param_tys: &[Type]) {
  if args.len() != param_tys.len() {
    prog.error(Diagnostic::standard(call_span, format!("expected {} argument(s), got {}", param_tys.len(), args.len())));
  }
  for (arg, pty) in args.iter().zip(param_tys.iter()) {
    let at = check_expr(prog, scope, arg.value);
    if !at.is_error() && !pty.is_error() && !assignable(&at, pty) {
      prog.error(Diagnostic::standard(arg.span, "argument type does not match the parameter's type"));
    }
  }
}

fn check_call(prog: &mut Program, scope: ScopeId, node: NodeId, callee: NodeId, args: Vec<CallArg>) -> Type {
  let span = prog.nodes[node].span;

  if let NodeKind::Identifier(name) = prog.nodes[callee].kind.clone() {
    if (name.as_str() == "print" || name.as_str() == "println")
      && crate::scope::lookup(&prog.scopes, scope, name).is_none()
    {
      let mut args = args;
      for a in &mut args {
        let at = check_expr(prog, scope, a.value);
        if let Some(wrapped) = wrap_enum_dbg(prog, at, a.value) {
          a.value = wrapped;
        }
      }
      prog.nodes[node].kind = NodeKind::Call(callee, args);
      return Type::Scalar(Scalar::Void);
    }
  }

  if let NodeKind::Member(recv, name) = prog.nodes[callee].kind.clone() {
    return check_method_call(prog, scope, node, recv, name, args);
  }

  let Some(sym) = resolve_scoped_symbol(prog, scope, callee) else {
    prog.error(Diagnostic::standard(span, "unknown name"));
    return Type::Error;
  };
  prog.nodes[callee].resolved_sym = Some(sym);

  match prog.symbols[sym].payload {
    SymPayload::Function(f) => {
      let param_tys: Vec<Type> = prog.funcs[f].params.iter().map(|&p| prog.vars[p].ty.clone()).collect();
      check_args_against(prog, scope, span, &args, &param_tys);
      prog.funcs[f].ret.clone()
    }
    SymPayload::Structure(struct_id) => check_struct_constructor(prog, scope, span, struct_id, &args),
    _ => {
      prog.error(Diagnostic::standard(span, "not callable"));
      Type::Error
    }
  }
}

/// `Type::static_method(...)` and `Type::InstanceMethod` invoked like a
/// free function both flow through ordinary symbol resolution since
/// `RegisterTypes`/`TypeChecker` file every `Type::name` function into
/// the same `methods` map regardless of whether `this` is a parameter;
/// only `recv.method(...)` dot-call syntax needs the receiver synthesis
/// handled in [`check_method_call`].
fn check_struct_constructor(prog: &mut Program, scope: ScopeId, span: crate::span::Span, struct_id: crate::types::StructId, args: &[CallArg]) -> Type {
  if prog.structs[struct_id].is_templated {
    prog.error(Diagnostic::standard(span, "this type requires template arguments before it can be constructed"));
    return Type::Error;
  }
  for arg in args {
    let at = check_expr(prog, scope, arg.value);
    let Some(label) = arg.label else {
      prog.error(Diagnostic::standard(arg.span, "struct constructor arguments must be labeled 'field: value'"));
      continue;
    };
    let field = prog.structs[struct_id].fields.iter().find(|f| prog.symbols[f.symbol].name == label).cloned();
    match field {
      Some(f) => {
        if !at.is_error() && !f.ty.is_error() && !assignable(&at, &f.ty) {
          prog.error(Diagnostic::standard(arg.span, format!("field '{label}' has a different type")));
        }
      }
      None => { prog.error(Diagnostic::standard(arg.span, format!("no field named '{label}'"))); }
    }
  }
  Type::Structure(struct_id)
}

fn check_method_call(prog: &mut Program, scope: ScopeId, node: NodeId, recv: NodeId, name: crate::symbol::Symbol, args: Vec<CallArg>) -> Type {
  let span = prog.nodes[node].span;
  let recv_ty = check_expr(prog, scope, recv);
  let lookup_ty = recv_ty.as_pointer().cloned().unwrap_or_else(|| recv_ty.clone());

  let func_id = if let Some(struct_id) = lookup_ty.as_struct() {
    prog.structs[struct_id].methods.get(&name).copied()
  } else if let Some(enum_id) = lookup_ty.as_enum() {
    prog.enums[enum_id].methods.get(&name).copied()
  } else {
    None
  };

  let Some(func_id) = func_id else {
    if !recv_ty.is_error() {
      prog.error(Diagnostic::standard(span, format!("no method named '{name}'")));
    }
    return Type::Error;
  };

  prog.nodes[node].resolved_sym = Some(prog.funcs[func_id].symbol);
  prog.nodes[node].call_flags.added_method_arg = true;

  let param_tys: Vec<Type> = prog.funcs[func_id].params.iter().skip(1).map(|&p| prog.vars[p].ty.clone()).collect();
  check_args_against(prog, scope, span, &args, &param_tys);
  prog.funcs[func_id].ret.clone()
}

fn check_member(prog: &mut Program, scope: ScopeId, node: NodeId, recv: NodeId, name: crate::symbol::Symbol) -> Type {
  let recv_ty = check_expr(prog, scope, recv);
  if recv_ty.is_error() {
    return Type::Error;
  }
  let lookup_ty = recv_ty.as_pointer().cloned().unwrap_or(recv_ty);

  if let Some(struct_id) = lookup_ty.as_struct() {
    if let Some(field) = prog.structs[struct_id].fields.iter().find(|f| prog.symbols[f.symbol].name == name) {
      return field.ty.clone();
    }
    prog.error(Diagnostic::standard(prog.nodes[node].span, format!("no field named '{name}'")));
    return Type::Error;
  }
  if let Some(enum_id) = lookup_ty.as_enum() {
    if let Some(&func_id) = prog.enums[enum_id].methods.get(&name) {
      return prog.funcs[func_id].ret.clone();
    }
    prog.error(Diagnostic::standard(prog.nodes[node].span, format!("no field named '{name}'")));
    return Type::Error;
  }
  prog.error(Diagnostic::standard(prog.nodes[node].span, "not a struct or enum"));
  Type::Error
}

fn check_index(prog: &mut Program, scope: ScopeId, node: NodeId, base: NodeId, idx: NodeId) -> Type {
  let bt = check_expr(prog, scope, base);
  let it = check_expr(prog, scope, idx);
  if !it.is_integer() && !it.is_error() {
    prog.error(Diagnostic::standard(prog.nodes[idx].span, "index must be an integer"));
  }
  match bt.decay().as_pointer() {
    Some(elem) => elem.clone(),
    None => {
      if !bt.is_error() {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "cannot index a non-pointer, non-array value"));
      }
      Type::Error
    }
  }
}
