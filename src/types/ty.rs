//! The `Type` tagged variant (spec.md §3) and its structural equality /
//! alias-transparency laws (P6, P7).

use std::rc::Rc;
use super::{EnumId, NodeId, StructId, SymId};

/// Scalar base types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
  Char, Bool, Void,
  I8, I16, I32, I64,
  U8, U16, U32, U64,
  F32, F64,
}

impl Scalar {
  #[must_use] pub fn is_integer(self) -> bool {
    matches!(self, Scalar::I8 | Scalar::I16 | Scalar::I32 | Scalar::I64
      | Scalar::U8 | Scalar::U16 | Scalar::U32 | Scalar::U64)
  }
  #[must_use] pub fn is_float(self) -> bool { matches!(self, Scalar::F32 | Scalar::F64) }
  #[must_use] pub fn is_numeric(self) -> bool { self.is_integer() || self.is_float() }
  #[must_use] pub fn is_signed(self) -> bool {
    matches!(self, Scalar::I8 | Scalar::I16 | Scalar::I32 | Scalar::I64)
  }

  #[must_use] pub fn name(self) -> &'static str {
    match self {
      Scalar::Char => "char", Scalar::Bool => "bool", Scalar::Void => "void",
      Scalar::I8 => "i8", Scalar::I16 => "i16", Scalar::I32 => "i32", Scalar::I64 => "i64",
      Scalar::U8 => "u8", Scalar::U16 => "u16", Scalar::U32 => "u32", Scalar::U64 => "u64",
      Scalar::F32 => "f32", Scalar::F64 => "f64",
    }
  }

  /// Reverse of [`Scalar::name`], used by `RegisterTypes` to seed the
  /// builtin scalar symbols (spec.md §4.3).
  #[must_use] pub fn from_name(s: &str) -> Option<Self> {
    Some(match s {
      "char" => Scalar::Char, "bool" => Scalar::Bool, "void" => Scalar::Void,
      "i8" => Scalar::I8, "i16" => Scalar::I16, "i32" => Scalar::I32, "i64" => Scalar::I64,
      "u8" => Scalar::U8, "u16" => Scalar::U16, "u32" => Scalar::U32, "u64" => Scalar::U64,
      "f32" => Scalar::F32, "f64" => Scalar::F64,
      _ => return None,
    })
  }
}

/// A resolved or (temporarily) unresolved type (spec.md §3).
///
/// `Structure`/`Enum` reference their backing entity by id rather than
/// embedding a method table directly on every `Type` value: the method
/// table lives once on the `Structure`/`Enum`/alias-target entity in
/// `Program`'s arenas, and is looked up through the id when needed. This
/// avoids cloning a `HashMap` every time an expression's `etype` is set.
#[derive(Clone, Debug)]
pub enum Type {
  Scalar(Scalar),
  Pointer(Rc<Type>),
  Array(Rc<Type>, NodeId),
  Function(Rc<[super::ty::Param]>, Rc<Type>),
  Structure(StructId),
  Enum(EnumId),
  /// A named alias: `(name, target, defining symbol)`.
  Alias(crate::symbol::Symbol, Rc<Type>, SymId),
  /// A not-yet-resolved identifier, wrapping the unresolved AST node.
  Unresolved(NodeId),
  /// The process-wide error sentinel, allocated once in `RegisterTypes`.
  Error,
}

/// A function parameter type, used inside `Type::Function`.
#[derive(Clone, Debug)]
pub struct Param {
  pub name: crate::symbol::Symbol,
  pub ty: Rc<Type>,
}

impl Type {
  #[must_use] pub fn ptr(to: Type) -> Type { Type::Pointer(Rc::new(to)) }

  /// Strip away `Alias` layers to find the concrete type underneath.
  /// Terminates for every well-formed `Alias` chain because `RegisterTypes`
  /// rejects cyclic aliases before they can be constructed (see
  /// `passes::register_types`).
  #[must_use] pub fn unaliased(&self) -> &Type {
    let mut cur = self;
    while let Type::Alias(_, target, _) = cur {
      cur = target;
    }
    cur
  }

  #[must_use] pub fn is_scalar(&self, s: Scalar) -> bool {
    matches!(self.unaliased(), Type::Scalar(x) if *x == s)
  }

  #[must_use] pub fn as_scalar(&self) -> Option<Scalar> {
    if let Type::Scalar(s) = self.unaliased() { Some(*s) } else { None }
  }

  #[must_use] pub fn is_numeric(&self) -> bool { self.as_scalar().is_some_and(Scalar::is_numeric) }
  #[must_use] pub fn is_integer(&self) -> bool { self.as_scalar().is_some_and(Scalar::is_integer) }
  #[must_use] pub fn is_float(&self) -> bool { self.as_scalar().is_some_and(Scalar::is_float) }
  #[must_use] pub fn is_bool(&self) -> bool { self.is_scalar(Scalar::Bool) }
  #[must_use] pub fn is_void(&self) -> bool { self.is_scalar(Scalar::Void) }
  #[must_use] pub fn is_error(&self) -> bool { matches!(self.unaliased(), Type::Error) }

  #[must_use] pub fn as_pointer(&self) -> Option<&Type> {
    if let Type::Pointer(t) = self.unaliased() { Some(t) } else { None }
  }

  #[must_use] pub fn as_struct(&self) -> Option<StructId> {
    if let Type::Structure(id) = self.unaliased() { Some(*id) } else { None }
  }

  #[must_use] pub fn as_enum(&self) -> Option<EnumId> {
    if let Type::Enum(id) = self.unaliased() { Some(*id) } else { None }
  }

  /// Array-decay: `[N]T -> *T` at expression boundaries (spec.md §4.4).
  #[must_use] pub fn decay(&self) -> Type {
    match self {
      Type::Array(elem, _) => Type::ptr((**elem).clone()),
      other => other.clone(),
    }
  }
}

/// Structural type equality with alias transparency (P6, P7): `eq(alias(A),
/// T) == eq(A, T)` for every `A`/`T`, and `eq` is reflexive and symmetric.
#[must_use] pub fn eq(a: &Type, b: &Type) -> bool {
  match (a.unaliased(), b.unaliased()) {
    (Type::Scalar(x), Type::Scalar(y)) => x == y,
    (Type::Pointer(x), Type::Pointer(y)) => eq(x, y),
    (Type::Array(x, nx), Type::Array(y, ny)) => eq(x, y) && nx == ny,
    (Type::Structure(x), Type::Structure(y)) => x == y,
    (Type::Enum(x), Type::Enum(y)) => x == y,
    (Type::Function(px, rx), Type::Function(py, ry)) =>
      px.len() == py.len() && px.iter().zip(py.iter()).all(|(p, q)| eq(&p.ty, &q.ty)) && eq(rx, ry),
    (Type::Error, Type::Error) => true,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::idx::Idx;
  use crate::symbol::intern;

  fn i32_() -> Type { Type::Scalar(Scalar::I32) }

  #[test]
  fn reflexive_and_symmetric() {
    let a = i32_();
    let b = Type::ptr(i32_());
    assert!(eq(&a, &a));
    assert!(eq(&b, &b));
    assert!(!eq(&a, &b));
    assert_eq!(eq(&a, &b), eq(&b, &a));
  }

  #[test]
  fn alias_is_transparent() {
    let target = Rc::new(i32_());
    let sym = SymId::new(0);
    let alias = Type::Alias(intern("myint"), target, sym);
    assert!(eq(&alias, &i32_()));
    assert!(eq(&i32_(), &alias));
  }

  #[test]
  fn unaliased_terminates_on_chains() {
    let sym = SymId::new(0);
    let base = i32_();
    let a1 = Type::Alias(intern("a"), Rc::new(base), sym);
    let a2 = Type::Alias(intern("b"), Rc::new(a1), sym);
    assert!(matches!(a2.unaliased(), Type::Scalar(Scalar::I32)));
  }
}
