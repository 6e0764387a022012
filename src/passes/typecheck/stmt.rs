//! Statement checking: control-flow "returns on every path" propagation
//! (P12), defer stack bookkeeping (P11), loop/break/continue validity,
//! and `match` variant-exhaustiveness (P10).

use crate::diag::Diagnostic;
use crate::entities::Variable;
use crate::idx::Idx;
use crate::program::Program;
use crate::scope::Scope;
use crate::symtab::{SymKind, SymPayload, SymbolInfo};
use crate::types::ast::{MatchCase, NodeKind};
use crate::types::ty::Type;
use crate::types::{NodeId, ScopeId, SymId};

use super::{expr, resolve_scoped_symbol, resolve_type};

fn push_child(prog: &mut Program, scope: ScopeId) -> ScopeId {
  let child = Scope::child(scope, &prog.scopes[scope]);
  prog.scopes.push(child)
}

/// Type-check every statement in `block` in order, returning whether it
/// returns a value on every path (P12).
pub(in crate::passes) fn check_block(prog: &mut Program, scope: ScopeId, block: NodeId) -> bool {
  let NodeKind::Block(stmts) = prog.nodes[block].kind.clone() else {
    unreachable!("check_block called on a non-Block node")
  };
  let mut returns = false;
  for s in stmts {
    let r = check_stmt(prog, scope, s);
    prog.nodes[s].returns = r;
    returns |= r;
  }
  returns
}

fn check_stmt(prog: &mut Program, scope: ScopeId, node: NodeId) -> bool {
  match prog.nodes[node].kind.clone() {
    NodeKind::Block(_) => {
      let child = push_child(prog, scope);
      check_block(prog, child, node)
    }
    NodeKind::If { cond, then_blk, else_blk } => check_if(prog, scope, cond, then_blk, else_blk),
    NodeKind::Match { scrutinee, cases, default } => check_match(prog, scope, node, scrutinee, cases, default),
    NodeKind::While { cond, body } => check_while(prog, scope, cond, body),
    NodeKind::For { init, cond, step, body } => check_for(prog, scope, init, cond, step, body),
    NodeKind::VarDecl { name, is_const, declared_ty, value, .. } =>
      check_var_decl(prog, scope, node, name, is_const, declared_ty, value),
    NodeKind::Return(value) => check_return(prog, scope, node, value),
    NodeKind::Yield(value) => check_yield(prog, scope, node, value),
    NodeKind::Break => {
      if prog.scopes[scope].loop_depth == 0 {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "'break' outside a loop"));
      }
      false
    }
    NodeKind::Continue => {
      if prog.scopes[scope].loop_depth == 0 {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "'continue' outside a loop"));
      }
      false
    }
    NodeKind::Defer(inner) => {
      check_stmt(prog, scope, inner);
      prog.scopes[scope].defers.push(inner);
      false
    }
    NodeKind::Assert { cond, msg } => {
      let ct = expr::check_expr(prog, scope, cond);
      if !ct.is_bool() && !ct.is_error() {
        prog.error(Diagnostic::standard(prog.nodes[cond].span, "'assert' condition must be bool"));
      }
      if let Some(m) = msg {
        expr::check_expr(prog, scope, m);
      }
      false
    }
    NodeKind::ExprStmt(e) => {
      expr::check_expr(prog, scope, e);
      expr_diverges(prog, e)
    }
    _ => unreachable!("not a statement node"),
  }
}

fn check_if(prog: &mut Program, scope: ScopeId, cond: NodeId, then_blk: NodeId, else_blk: Option<NodeId>) -> bool {
  let ct = expr::check_expr(prog, scope, cond);
  if !ct.is_bool() && !ct.is_error() {
    prog.error(Diagnostic::standard(prog.nodes[cond].span, "'if' condition must be bool"));
  }
  let then_returns = check_stmt(prog, scope, then_blk);
  match else_blk {
    Some(e) => then_returns && check_stmt(prog, scope, e),
    None => false,
  }
}

fn check_while(prog: &mut Program, scope: ScopeId, cond: NodeId, body: NodeId) -> bool {
  let ct = expr::check_expr(prog, scope, cond);
  if !ct.is_bool() && !ct.is_error() {
    prog.error(Diagnostic::standard(prog.nodes[cond].span, "'while' condition must be bool"));
  }
  let mut inner = Scope::child(scope, &prog.scopes[scope]);
  inner.loop_depth += 1;
  let inner_id = prog.scopes.push(inner);
  // A while loop might run zero times, so its body never forces the
  // enclosing function to have returned.
  check_stmt(prog, inner_id, body);
  false
}

fn check_for(prog: &mut Program, scope: ScopeId, init: Option<NodeId>, cond: Option<NodeId>, step: Option<NodeId>, body: NodeId) -> bool {
  let outer = Scope::child(scope, &prog.scopes[scope]);
  let outer_id = prog.scopes.push(outer);
  if let Some(i) = init {
    check_stmt(prog, outer_id, i);
  }
  if let Some(c) = cond {
    let ct = expr::check_expr(prog, outer_id, c);
    if !ct.is_bool() && !ct.is_error() {
      prog.error(Diagnostic::standard(prog.nodes[c].span, "'for' condition must be bool"));
    }
  }
  if let Some(s) = step {
    expr::check_expr(prog, outer_id, s);
  }
  let mut inner = Scope::child(outer_id, &prog.scopes[outer_id]);
  inner.loop_depth += 1;
  let inner_id = prog.scopes.push(inner);
  check_stmt(prog, inner_id, body);
  false
}

/// `yield value` sets the `etype` of the nearest enclosing if/match/block
/// used in expression position (`scope.yield_target`), unifying with
/// whatever a sibling branch already yielded.
fn check_yield(prog: &mut Program, scope: ScopeId, node: NodeId, value: NodeId) -> bool {
  let vt = expr::check_expr(prog, scope, value);
  let Some(target) = prog.scopes[scope].yield_target else {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "'yield' is not valid here"));
    return true;
  };
  match prog.nodes[target].etype.clone() {
    Some(prev) if !prev.is_error() && !vt.is_error() && !crate::types::ty::eq(&prev, &vt) => {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "'yield' does not match the type yielded elsewhere in this expression"));
    }
    _ => prog.nodes[target].etype = Some(vt),
  }
  true
}

fn check_return(prog: &mut Program, scope: ScopeId, node: NodeId, value: Option<NodeId>) -> bool {
  let ret_ty = prog.scopes[scope].cur_func.map_or(Type::Error, |f| prog.funcs[f].ret.clone());
  match value {
    Some(v) => {
      let vt = expr::check_expr(prog, scope, v);
      if !ret_ty.is_error() && !vt.is_error() && !expr::assignable(&vt, &ret_ty) {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "returned value does not match the function's return type"));
      }
    }
    None if !ret_ty.is_void() && !ret_ty.is_error() => {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "function must return a value"));
    }
    None => {}
  }
  true
}

#[allow(clippy::too_many_arguments)]
fn check_var_decl(
  prog: &mut Program, scope: ScopeId, node: NodeId,
  name: crate::symbol::Symbol, is_const: bool, declared_ty: Option<NodeId>, value: Option<NodeId>,
) -> bool {
  let declared = declared_ty.map(|t| resolve_type(prog, scope, t));
  let value_ty = value.map(|v| expr::check_expr(prog, scope, v));
  let span = prog.nodes[node].span;
  let ty = match (&declared, &value_ty) {
    (Some(d), Some(v)) => {
      if !d.is_error() && !v.is_error() && !expr::assignable(v, d) {
        prog.error(Diagnostic::standard(span, format!("cannot initialize '{name}' with a value of a different type")));
      }
      d.clone()
    }
    (Some(d), None) => d.clone(),
    (None, Some(v)) => v.clone(),
    (None, None) => {
      prog.error(Diagnostic::standard(span, format!("'{name}' needs a type annotation or an initializer")));
      Type::Error
    }
  };

  let kind = if is_const { SymKind::Constant } else { SymKind::Variable };
  let var_id = prog.vars.push(Variable { symbol: SymId::new(0), ty, default: value });
  let payload = if is_const { SymPayload::Constant(var_id) } else { SymPayload::Variable(var_id) };
  let sym = prog.symbols.push(SymbolInfo::new(kind, name, None, span, payload));
  prog.vars[var_id].symbol = sym;

  if let Some(prev) = prog.scopes[scope].insert(name, sym) {
    prog.error(Diagnostic::with_hint(
      span, format!("redefinition of '{name}'"),
      prog.symbols[prev].span, "previous definition here",
    ));
  }
  if let NodeKind::VarDecl { sym: ref mut s, .. } = prog.nodes[node].kind {
    *s = Some(sym);
  }
  false
}

fn check_match(
  prog: &mut Program, scope: ScopeId, node: NodeId,
  scrutinee: NodeId, cases: Vec<MatchCase>, default: Option<NodeId>,
) -> bool {
  let sty = expr::check_expr(prog, scope, scrutinee);
  let enum_id = sty.as_enum();
  let mut covered = std::collections::HashSet::new();
  let mut case_patterns: std::collections::HashMap<SymId, NodeId> = std::collections::HashMap::new();
  let mut case_returns = Vec::with_capacity(cases.len());

  for case in &cases {
    for &pat in &case.patterns {
      if let Some(eid) = enum_id {
        match resolve_scoped_symbol(prog, scope, pat) {
          Some(sym) if prog.symbols[sym].parent == Some(prog.enums[eid].symbol) => {
            if let Some(&prev_pat) = case_patterns.get(&sym) {
              prog.error(Diagnostic::with_hint(
                prog.nodes[pat].span, "this variant is already covered by a previous case",
                prog.nodes[prev_pat].span, "previous case here",
              ));
            }
            case_patterns.insert(sym, pat);
            covered.insert(sym);
            prog.nodes[pat].resolved_sym = Some(sym);
            prog.nodes[pat].etype = Some(sty.clone());
          }
          _ => { prog.error(Diagnostic::standard(prog.nodes[pat].span, "pattern does not name a variant of this enum")); }
        }
      } else {
        let pt = expr::check_expr(prog, scope, pat);
        if !pt.is_error() && !sty.is_error() && !crate::types::ty::eq(&pt, &sty) {
          prog.error(Diagnostic::standard(prog.nodes[pat].span, "pattern type does not match the matched value's type"));
        }
      }
    }
    let case_scope = push_child(prog, scope);
    case_returns.push(check_stmt(prog, case_scope, case.body));
  }

  let default_returns = default.map(|d| {
    let default_scope = push_child(prog, scope);
    check_stmt(prog, default_scope, d)
  });

  match enum_id {
    Some(eid) if default.is_none() => {
      let total = prog.enums[eid].fields.len();
      if covered.len() < total {
        prog.error(Diagnostic::standard(prog.nodes[node].span, "match does not cover every variant of this enum"));
      }
    }
    None if default.is_none() => {
      prog.error(Diagnostic::standard(prog.nodes[node].span, "match must have an 'else' arm"));
    }
    _ => {}
  }

  let all_cases_return = !case_returns.is_empty() && case_returns.iter().all(|&r| r);
  match default_returns {
    Some(d) => all_cases_return && d,
    None => all_cases_return && enum_id.is_some(),
  }
}

/// Check an `if` used in expression position: both arms are required and
/// are checked under a scope targeting `node` for `yield`, after which
/// `node`'s `etype` (set by whichever `yield`s ran) must be populated.
pub(in crate::passes) fn check_if_expr(prog: &mut Program, scope: ScopeId, node: NodeId, cond: NodeId, then_blk: NodeId, else_blk: Option<NodeId>) -> Type {
  let ct = expr::check_expr(prog, scope, cond);
  if !ct.is_bool() && !ct.is_error() {
    prog.error(Diagnostic::standard(prog.nodes[cond].span, "'if' condition must be bool"));
  }
  let yield_scope = prog.scopes.push(Scope::yield_scope(scope, &prog.scopes[scope], node));
  check_stmt(prog, yield_scope, then_blk);
  match else_blk {
    Some(e) => { check_stmt(prog, yield_scope, e); }
    None => prog.error(Diagnostic::standard(prog.nodes[node].span, "'if' used as a value needs an 'else' branch")),
  }
  prog.nodes[node].etype.clone().unwrap_or_else(|| {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "'if' does not yield a value in every branch"));
    Type::Error
  })
}

/// Check a `match` used in expression position, analogous to
/// [`check_if_expr`]: every case (and any `else`) is checked under a scope
/// targeting `node`, exhaustiveness is still required (P10), and `node`'s
/// `etype` must end up populated.
pub(in crate::passes) fn check_match_expr(
  prog: &mut Program, scope: ScopeId, node: NodeId,
  scrutinee: NodeId, cases: Vec<MatchCase>, default: Option<NodeId>,
) -> Type {
  let yield_scope = prog.scopes.push(Scope::yield_scope(scope, &prog.scopes[scope], node));
  check_match(prog, yield_scope, node, scrutinee, cases, default);
  prog.nodes[node].etype.clone().unwrap_or_else(|| {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "'match' does not yield a value in every case"));
    Type::Error
  })
}

/// Check a `{ ... }` block used in expression position.
pub(in crate::passes) fn check_block_expr(prog: &mut Program, scope: ScopeId, node: NodeId) -> Type {
  let yield_scope = prog.scopes.push(Scope::yield_scope(scope, &prog.scopes[scope], node));
  check_block(prog, yield_scope, node);
  prog.nodes[node].etype.clone().unwrap_or_else(|| {
    prog.error(Diagnostic::standard(prog.nodes[node].span, "block does not yield a value"));
    Type::Error
  })
}

/// A call to a function declared `exits` diverges, so the `ExprStmt`
/// wrapping it counts as returning on every (non-)path past it.
fn expr_diverges(prog: &Program, node: NodeId) -> bool {
  let NodeKind::Call(callee, _) = &prog.nodes[node].kind else { return false };
  let sym = if matches!(prog.nodes[*callee].kind, NodeKind::Member(..)) {
    prog.nodes[node].resolved_sym
  } else {
    prog.nodes[*callee].resolved_sym
  };
  sym.is_some_and(|s| matches!(prog.symbols[s].payload, SymPayload::Function(f) if prog.funcs[f].exits))
}
