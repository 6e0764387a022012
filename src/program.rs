//! `Namespace` and `Program` (spec.md §3): the hierarchical container of
//! declarations, and the single owned context threaded through the whole
//! pipeline (DESIGN NOTES §9).

use hashbrown::HashMap;
use crate::diag::Diagnostic;
use crate::entities::{Enum, Function, Structure, Variable};
use crate::idx::IdxVec;
use crate::scope::Scope;
use crate::span::FileId;
use crate::symbol::Symbol;
use crate::symtab::SymbolInfo;
use crate::types::ast::Node;
use crate::types::ty::Type;
use crate::types::{EnumId, FuncId, NamespaceId, NodeId, ScopeId, StructId, SymId, VarId};

/// One loaded source file, kept alive for the whole compilation because
/// later passes slice into it (template re-lexing, diagnostics).
#[derive(Clone, Debug)]
pub struct SourceFile {
  pub filename: String,
  pub content: String,
}

/// Diagnostic detail level and other pass-wide knobs (spec.md §6, §7).
#[derive(Copy, Clone, Debug)]
pub struct CompileOptions {
  pub detail: crate::diag::DetailLevel,
  /// `-d`: emit `#line` directives in generated C.
  pub debug_info: bool,
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self { detail: crate::diag::DetailLevel::Normal, debug_info: false }
  }
}

/// A named container of declarations and nested namespaces, each with its
/// own scope (spec.md §3).
#[derive(Clone, Debug)]
pub struct Namespace {
  pub parent: Option<NamespaceId>,
  pub symbol: SymId,
  pub functions: Vec<FuncId>,
  pub structs: Vec<StructId>,
  pub enums: Vec<EnumId>,
  pub constants: Vec<VarId>,
  pub variables: Vec<VarId>,
  pub imports: Vec<NodeId>,
  pub children: HashMap<Symbol, NamespaceId>,
  pub scope: ScopeId,
  /// Filesystem-relative path segments, for files and the `std` root.
  pub path: Vec<Symbol>,
  /// Whether this namespace corresponds 1:1 to a loaded source file.
  pub is_file: bool,
  /// Child namespaces created with an explicit `namespace name { }` block
  /// are always visible in scope, unlike ones created purely by the
  /// import resolver walking directories.
  pub always_add_to_scope: bool,
  pub is_top_level: bool,
}

impl Namespace {
  fn new(parent: Option<NamespaceId>, symbol: SymId, scope: ScopeId, path: Vec<Symbol>) -> Self {
    Self {
      parent, symbol, functions: Vec::new(), structs: Vec::new(), enums: Vec::new(),
      constants: Vec::new(), variables: Vec::new(), imports: Vec::new(),
      children: HashMap::new(), scope, path, is_file: false,
      always_add_to_scope: false, is_top_level: false,
    }
  }
}

/// The hierarchical container of declarations with per-namespace scope;
/// owns every arena in the compiler (spec.md §3).
pub struct Program {
  pub symbols: IdxVec<SymId, SymbolInfo>,
  pub namespaces: IdxVec<NamespaceId, Namespace>,
  pub structs: IdxVec<StructId, Structure>,
  pub enums: IdxVec<EnumId, Enum>,
  pub funcs: IdxVec<FuncId, Function>,
  pub vars: IdxVec<VarId, Variable>,
  pub scopes: IdxVec<ScopeId, Scope>,
  pub nodes: IdxVec<NodeId, Node>,
  pub sources: IdxVec<FileId, SourceFile>,

  pub global: NamespaceId,
  pub errors: Vec<Diagnostic>,
  pub ordered_structs: Vec<StructId>,
  pub c_includes: Vec<String>,
  pub c_flags: Vec<String>,
  pub options: CompileOptions,

  /// The process-wide error sentinel type's owning pseudo-symbol, and the
  /// handful of builtin aliases, allocated by `RegisterTypes`.
  pub error_sym: Option<SymId>,

  /// The `Type` a `TypeDef`-kind [`crate::symtab::SymbolInfo`] denotes:
  /// builtin scalars and `untyped_ptr`/`str` (installed by `RegisterTypes`),
  /// plus template-parameter shadow bindings pushed per-instantiation by
  /// the template instantiator (spec.md §4.3, §4.4).
  pub type_defs: HashMap<SymId, Type>,

  /// Work list of freshly re-parsed template-instantiation methods still
  /// needing a body check (spec.md §4.4 phase 5, §5): draining happens
  /// after the main namespace walk and may itself spawn further
  /// instantiations, so it runs until empty rather than just once.
  pub pending_checks: Vec<FuncId>,
}

impl Program {
  /// Construct an empty program with a freshly allocated global namespace.
  #[must_use] pub fn new(options: CompileOptions) -> Self {
    let mut symbols = IdxVec::new();
    let mut scopes = IdxVec::new();
    let root_scope = scopes.push(Scope::root());
    let root_sym = symbols.push(SymbolInfo::new(
      crate::symtab::SymKind::Namespace,
      crate::symbol::intern(""),
      None,
      crate::span::Span::point(crate::span::Position {
        file: FileId::new(0), line: 0, column: 0, index: 0,
      }),
      crate::symtab::SymPayload::Namespace(NamespaceId::new(0)),
    ));
    let mut namespaces = IdxVec::new();
    let global = namespaces.push(Namespace::new(None, root_sym, root_scope, Vec::new()));

    Self {
      symbols, namespaces, structs: IdxVec::new(), enums: IdxVec::new(),
      funcs: IdxVec::new(), vars: IdxVec::new(), scopes, nodes: IdxVec::new(),
      sources: IdxVec::new(), global, errors: Vec::new(), ordered_structs: Vec::new(),
      c_includes: Vec::new(), c_flags: Vec::new(), options, error_sym: None,
      type_defs: HashMap::new(), pending_checks: Vec::new(),
    }
  }

  /// Declare a `TypeDef` symbol bound to `ty` in `scope`'s local map,
  /// recording the binding in `type_defs` so `resolve_type` can fetch it
  /// back out. Used both for RegisterTypes' builtin scalars/aliases and
  /// for the template instantiator's per-call parameter shadowing.
  pub fn declare_type_def(&mut self, scope: ScopeId, name: Symbol, parent: Option<SymId>, span: crate::span::Span, ty: Type) -> SymId {
    let sym = self.symbols.push(SymbolInfo::new(crate::symtab::SymKind::TypeDef, name, parent, span, crate::symtab::SymPayload::TypeDef));
    self.type_defs.insert(sym, ty);
    self.scopes[scope].insert(name, sym);
    sym
  }

  /// Record a diagnostic. Passes never throw; they push here and keep
  /// going (spec.md §7).
  pub fn error(&mut self, diag: Diagnostic) {
    log::debug!("diagnostic raised: {diag:?}");
    self.errors.push(diag);
  }

  #[must_use] pub fn has_errors(&self) -> bool { !self.errors.is_empty() }

  /// Render the accumulated error list at the configured detail level,
  /// governed by `OCEN_NUM_ERRORS` (spec.md §7).
  #[must_use] pub fn render_errors(&self) -> String {
    crate::diag::render_errors(&self.errors, self.options.detail)
  }

  /// Add a new child namespace under `parent`, installing its symbol into
  /// `parent`'s scope unless it is a directory-only traversal stop.
  pub fn new_namespace(
    &mut self, parent: NamespaceId, name: Symbol, span: crate::span::Span, path_extra: Symbol,
  ) -> NamespaceId {
    let parent_sym = self.namespaces[parent].symbol;
    let scope = self.scopes.push(Scope::child(self.namespaces[parent].scope, &self.scopes[self.namespaces[parent].scope]));
    let mut path = self.namespaces[parent].path.clone();
    path.push(path_extra);
    let placeholder = NamespaceId::new(0);
    let sym = self.symbols.push(SymbolInfo::new(
      crate::symtab::SymKind::Namespace, name, Some(parent_sym), span,
      crate::symtab::SymPayload::Namespace(placeholder),
    ));
    let ns_id = self.namespaces.push(Namespace::new(Some(parent), sym, scope, path));
    if let crate::symtab::SymPayload::Namespace(ref mut id) = self.symbols[sym].payload {
      *id = ns_id;
    }
    self.namespaces[parent].children.insert(name, ns_id);
    ns_id
  }

  /// Display name of a symbol (`parent.display + "::" + name`).
  #[must_use] pub fn display_name(&self, id: SymId) -> String {
    crate::symtab::display_name(&self.symbols, id)
  }

  /// Out-name of a symbol, honoring extern pinning and template suffixes.
  #[must_use] pub fn out_name(&self, id: SymId) -> String {
    crate::symtab::out_name(&self.symbols, id)
  }

  /// P5: after RegisterTypes + TypeChecker, no two non-extern symbols
  /// reachable from the global namespace share an out-name.
  #[must_use] pub fn check_out_name_uniqueness(&self) -> Vec<(SymId, SymId)> {
    let mut seen: HashMap<String, SymId> = HashMap::new();
    let mut collisions = Vec::new();
    for (id, info) in self.symbols.iter_enum() {
      if info.is_extern {
        continue;
      }
      let name = self.out_name(id);
      if let Some(&prev) = seen.get(&name) {
        collisions.push((prev, id));
      } else {
        seen.insert(name, id);
      }
    }
    collisions
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;

  #[test]
  fn new_program_has_empty_global_namespace() {
    let prog = Program::new(CompileOptions::default());
    assert!(prog.namespaces[prog.global].functions.is_empty());
    assert!(!prog.has_errors());
  }

  #[test]
  fn nested_namespace_is_registered_in_parent() {
    let mut prog = Program::new(CompileOptions::default());
    let span = crate::span::Span::point(crate::span::Position {
      file: FileId::new(0), line: 1, column: 1, index: 0,
    });
    let child = prog.new_namespace(prog.global, intern("foo"), span, intern("foo"));
    assert_eq!(prog.namespaces[prog.global].children.get(&intern("foo")), Some(&child));
    assert_eq!(prog.display_name(prog.namespaces[child].symbol), "foo");
  }
}
