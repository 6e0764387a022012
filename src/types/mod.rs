//! Tagged node and type trees; the index types that tie the whole
//! compiler's arenas together (spec.md §3, DESIGN NOTES §9).

pub mod ty;
pub mod ast;

use crate::idx::mk_idx;

mk_idx! {
  /// Index of a [`crate::program::Namespace`] in `Program.namespaces`.
  pub struct NamespaceId;
}
mk_idx! {
  /// Index of a [`crate::entities::Structure`] in `Program.structs`.
  pub struct StructId;
}
mk_idx! {
  /// Index of a [`crate::entities::Enum`] in `Program.enums`.
  pub struct EnumId;
}
mk_idx! {
  /// Index of a [`crate::entities::Function`] in `Program.funcs`.
  pub struct FuncId;
}
mk_idx! {
  /// Index of a [`crate::entities::Variable`] in `Program.vars`.
  pub struct VarId;
}
mk_idx! {
  /// Index of a [`crate::symtab::SymbolInfo`] in `Program.symbols`.
  pub struct SymId;
}
mk_idx! {
  /// Index of a [`crate::scope::Scope`] in `Program.scopes`.
  pub struct ScopeId;
}
mk_idx! {
  /// Index of an [`ast::Node`] in `Program.nodes`.
  pub struct NodeId;
}
