//! `Symbol` (spec.md §3): the canonical identity of a named entity.
//!
//! Not to be confused with [`crate::symbol::Symbol`], which is an interned
//! *string* (mmcc's own naming for that concept, kept as-is since it is
//! what every identifier/name field below is made of). The declaration
//! entity spec.md calls a "Symbol" is [`SymbolInfo`], indexed by [`SymId`].

use crate::span::Span;
use crate::symbol::Symbol;
use crate::types::{EnumId, FuncId, NamespaceId, StructId, SymId, VarId};

/// What kind of declaration a [`SymbolInfo`] denotes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymKind {
  Function, Structure, Enum, TypeDef, Namespace, Variable, Constant,
}

/// The declaration a symbol resolves to, by arena index.
#[derive(Copy, Clone, Debug)]
pub enum SymPayload {
  Function(FuncId),
  Structure(StructId),
  Enum(EnumId),
  /// A `TypeDef` alias; the aliased `Type` lives on the `Alias` variant
  /// constructed in `RegisterTypes`, not duplicated here.
  TypeDef,
  Namespace(NamespaceId),
  Variable(VarId),
  Constant(VarId),
}

/// The canonical identity of a named entity: a function, type, variable
/// or namespace (spec.md §3).
#[derive(Clone, Debug)]
pub struct SymbolInfo {
  pub kind: SymKind,
  pub name: Symbol,
  /// The symbol this one is nested under for display/out-name purposes
  /// (an owning namespace, or a struct/enum for methods and fields).
  /// `None` only for the root namespace symbol.
  pub parent: Option<SymId>,
  pub span: Span,
  pub payload: SymPayload,
  pub is_extern: bool,
  /// A verbatim C identifier pinned by `extern(...)`; when set, this is
  /// used as the out-name directly instead of the composed `parent_out +
  /// "_" + name` form.
  pub extern_name: Option<Symbol>,
  /// Suffix appended to a template instantiation's symbols to keep
  /// out-names dense and unique (spec.md §3, "Lifecycles").
  pub template_suffix: Option<u32>,
}

impl SymbolInfo {
  #[must_use] pub fn new(kind: SymKind, name: Symbol, parent: Option<SymId>, span: Span, payload: SymPayload) -> Self {
    Self { kind, name, parent, span, payload, is_extern: false, extern_name: None, template_suffix: None }
  }
}

/// Compute a symbol's display name (`parent.display + "::" + name`) by
/// walking the parent chain through the symbol arena.
#[must_use] pub fn display_name(symbols: &crate::idx::IdxVec<SymId, SymbolInfo>, id: SymId) -> String {
  let info = &symbols[id];
  let mut base = match info.parent {
    Some(p) => {
      let parent_display = display_name(symbols, p);
      if parent_display.is_empty() { String::new() } else { format!("{parent_display}::") }
    }
    None => String::new(),
  };
  base.push_str(info.name.as_str());
  base
}

/// Compute a symbol's out-name: `parent.out_name + "_" + name`, unless the
/// symbol is extern, in which case its pinned `extern_name` is used
/// verbatim (spec.md §3).
#[must_use] pub fn out_name(symbols: &crate::idx::IdxVec<SymId, SymbolInfo>, id: SymId) -> String {
  let info = &symbols[id];
  if let Some(name) = info.extern_name {
    return name.as_str().to_owned();
  }
  let mut base = match info.parent {
    Some(p) if symbols[p].parent.is_some() || !matches!(symbols[p].kind, SymKind::Namespace) => {
      format!("{}_", out_name(symbols, p))
    }
    Some(p) => {
      let parent_out = out_name(symbols, p);
      if parent_out.is_empty() { String::new() } else { format!("{parent_out}_") }
    }
    None => String::new(),
  };
  base.push_str(info.name.as_str());
  if let Some(n) = info.template_suffix {
    base.push_str(&format!("_{n}"));
  }
  base
}
