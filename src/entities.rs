//! `Variable`, `Structure`, `Enum` and `Function` (spec.md §3).

use hashbrown::HashMap;
use smallvec::SmallVec;
use crate::scope::ScopeId;
use crate::span::Span;
use crate::symbol::Symbol;
use crate::types::ty::Type;
use crate::types::{FuncId, NodeId, StructId, SymId};

/// A variable: used for let/const declarations, struct fields, function
/// parameters, and enum members (whose type is the owning enum itself).
#[derive(Clone, Debug)]
pub struct Variable {
  pub symbol: SymId,
  pub ty: Type,
  pub default: Option<NodeId>,
}

/// A struct (or, with `is_union` set, a C union) declaration.
#[derive(Clone, Debug)]
pub struct Structure {
  pub symbol: SymId,
  pub fields: Vec<Variable>,
  pub is_union: bool,
  pub is_templated: bool,
  pub template_params: Vec<Symbol>,
  /// Methods declared `Parent::name`, re-parented onto this type.
  pub methods: HashMap<Symbol, FuncId>,
  /// `(argument types, instantiation)` cache, keyed by structural type
  /// equality of the argument list (spec.md §4.4, P8). A templated
  /// structure's own `StructId` never appears as an `Structure`'s `Type`;
  /// only entries in `instances` do.
  pub instances: Vec<(Vec<Type>, StructId)>,
}

impl Structure {
  /// Look up a previous instantiation by its (already-resolved) argument
  /// list, per the memoization law P8.
  #[must_use] pub fn find_instance(&self, args: &[Type]) -> Option<StructId> {
    self.instances.iter()
      .find(|(a, _)| a.len() == args.len() && a.iter().zip(args).all(|(x, y)| crate::types::ty::eq(x, y)))
      .map(|&(_, id)| id)
  }
}

/// An enum declaration. Each field is a `Variable` whose type is the enum
/// itself; enums synthesize a `dbg(this): str` method (RegisterTypes).
#[derive(Clone, Debug)]
pub struct Enum {
  pub symbol: SymId,
  pub fields: Vec<Variable>,
  pub methods: HashMap<Symbol, FuncId>,
  /// The synthesized `dbg` method, once RegisterTypes has run.
  pub dbg_method: Option<FuncId>,
}

impl Enum {
  #[must_use] pub fn variant_index(&self, symbols: &crate::idx::IdxVec<SymId, crate::symtab::SymbolInfo>, name: Symbol) -> Option<usize> {
    self.fields.iter().position(|v| symbols[v.symbol].name == name)
  }
}

/// A function: top-level, a static method, or an instance method.
#[derive(Clone, Debug)]
pub struct Function {
  pub symbol: SymId,
  pub params: SmallVec<[VarId; 4]>,
  pub ret: Type,
  pub body: Option<NodeId>,
  /// Set when the function is declared `exits` (never returns normally).
  pub exits: bool,
  pub is_method: bool,
  pub is_static: bool,
  /// The type this is a method of, if `is_method`.
  pub parent_ty: Option<Type>,
  /// The lexical scope the function was declared in (for name resolution
  /// of its signature; the body gets its own child scope).
  pub captured_scope: ScopeId,
  /// Byte span of the whole declaration (`def` through the closing brace
  /// or expression body), kept so a templated struct's methods can be
  /// re-lexed and re-parsed once per instantiation (spec.md §4.4, P8).
  pub decl_span: Span,
  pub checked: bool,
}

use crate::types::VarId;

#[cfg(test)]
mod tests {
  use super::*;
  use crate::idx::Idx;
  use crate::types::ty::{Scalar, Type};

  #[test]
  fn instance_memoization_is_structural() {
    let mut s = Structure {
      symbol: SymId::new(0), fields: vec![], is_union: false, is_templated: true,
      template_params: vec![], methods: HashMap::new(), instances: vec![],
    };
    s.instances.push((vec![Type::Scalar(Scalar::I32)], StructId::new(1)));
    assert_eq!(s.find_instance(&[Type::Scalar(Scalar::I32)]), Some(StructId::new(1)));
    assert_eq!(s.find_instance(&[Type::Scalar(Scalar::I64)]), None);
  }
}
