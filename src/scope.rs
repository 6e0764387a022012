//! Lexical scopes: local symbol bindings, the defer stack, and loop/yield
//! tracking (spec.md §3, §4.4.3).

use hashbrown::HashMap;
use crate::symbol::Symbol;
use crate::types::{FuncId, NodeId, ScopeId, SymId};

/// Which enclosing `if`/`match`/block-as-expression node a `yield` inside
/// this scope targets, if any (spec.md §4.4.3: "yield is valid only
/// inside a block whose enclosing expression context permits yielding").
pub type YieldTarget = Option<NodeId>;

/// A dynamic lexical environment of symbol bindings plus a defer stack.
///
/// Lookup is local-then-parent-chain (P4): inserting into a scope only
/// ever touches its own `locals` map, so ancestor scopes are never
/// mutated by a child's declarations, and a local-only lookup never
/// walks `parent`.
#[derive(Clone, Debug)]
pub struct Scope {
  locals: HashMap<Symbol, SymId>,
  /// Statements scheduled to run, in reverse declaration order (so LIFO
  /// pop order matches textual declaration order), at this scope's exit
  /// (spec.md §4.4.3, P11).
  pub defers: Vec<NodeId>,
  /// Distance from the nearest enclosing loop; 0 outside any loop.
  pub loop_depth: u32,
  /// Whether this scope is inside an if/match/block expression context
  /// that a `yield` may target (derived from `yield_target.is_some()`,
  /// kept as its own field to mirror spec.md §3's scope shape).
  pub can_yield: bool,
  /// The node whose `etype` a `yield` reached from this scope should set:
  /// the nearest enclosing `If`/`Match`/`Block` used in expression
  /// position. Inherited through child scopes the same way `loop_depth`
  /// is, so a `yield` nested inside an ordinary statement block still
  /// reaches the expression context around it.
  pub yield_target: YieldTarget,
  pub cur_func: Option<FuncId>,
  pub parent: Option<ScopeId>,
}

impl Scope {
  #[must_use] pub fn root() -> Self {
    Self {
      locals: HashMap::new(), defers: Vec::new(), loop_depth: 0,
      can_yield: false, yield_target: None, cur_func: None, parent: None,
    }
  }

  #[must_use] pub fn child(parent: ScopeId, of: &Scope) -> Self {
    Self {
      locals: HashMap::new(), defers: Vec::new(),
      loop_depth: of.loop_depth, can_yield: of.can_yield, yield_target: of.yield_target,
      cur_func: of.cur_func, parent: Some(parent),
    }
  }

  /// Enter a new expression context (`If`/`Match`/`Block` used in
  /// expression position): a fresh scope whose `yield_target` is `node`.
  #[must_use] pub fn yield_scope(parent: ScopeId, of: &Scope, node: NodeId) -> Self {
    let mut s = Self::child(parent, of);
    s.can_yield = true;
    s.yield_target = Some(node);
    s
  }

  /// Insert a symbol into this scope's local map only. Returns the
  /// previously bound symbol, if any, so callers can emit a duplicate-
  /// definition diagnostic with a "previous definition" hint.
  pub fn insert(&mut self, name: Symbol, sym: SymId) -> Option<SymId> {
    self.locals.insert(name, sym)
  }

  /// Look up a name in this scope only, never the parent chain (P4).
  #[must_use] pub fn lookup_local(&self, name: Symbol) -> Option<SymId> {
    self.locals.get(&name).copied()
  }
}

/// Resolve a name by walking `scope`, then its ancestors, stopping at the
/// first hit.
#[must_use] pub fn lookup(scopes: &crate::idx::IdxVec<ScopeId, Scope>, mut scope: ScopeId, name: Symbol) -> Option<SymId> {
  loop {
    let s = &scopes[scope];
    if let Some(sym) = s.lookup_local(name) {
      return Some(sym);
    }
    scope = s.parent?;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::idx::{Idx, IdxVec};
  use crate::symbol::intern;

  #[test]
  fn insertion_does_not_leak_to_parent() {
    let mut scopes: IdxVec<ScopeId, Scope> = IdxVec::new();
    let root_id = scopes.push(Scope::root());
    let child = Scope::child(root_id, &scopes[root_id]);
    let child_id = scopes.push(child);
    scopes[child_id].insert(intern("x"), SymId::new(0));
    assert!(scopes[root_id].lookup_local(intern("x")).is_none());
    assert!(scopes[child_id].lookup_local(intern("x")).is_some());
  }

  #[test]
  fn lookup_walks_parent_chain() {
    let mut scopes: IdxVec<ScopeId, Scope> = IdxVec::new();
    let root_id = scopes.push(Scope::root());
    scopes[root_id].insert(intern("g"), SymId::new(7));
    let child = Scope::child(root_id, &scopes[root_id]);
    let child_id = scopes.push(child);
    assert_eq!(lookup(&scopes, child_id, intern("g")), Some(SymId::new(7)));
    assert_eq!(scopes[child_id].lookup_local(intern("g")), None);
  }
}
