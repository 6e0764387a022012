//! Global string interning.
//!
//! Every identifier, display name and out-name in the compiler is an
//! interned [`Symbol`] rather than an owned `String`, so that symbol
//! equality is a pointer-width integer comparison. Mirrors the
//! `symbol::Interner` / `intern()` shape used throughout mmcc's
//! `types::entity`.

use std::cell::RefCell;
use hashbrown::HashMap;

/// An interned string.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
  /// The interned `_` symbol, used for unnamed/ignored bindings.
  #[must_use] pub fn underscore() -> Self { intern("_") }

  /// Get the raw dense index of this symbol, for use as a dense map key.
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }

  /// Look up the string this symbol was interned from.
  #[must_use] pub fn as_str(self) -> &'static str {
    INTERNER.with(|i| i.borrow().resolve(self))
  }
}

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", self.as_str())
  }
}

impl std::fmt::Display for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A string interning table. Strings are leaked to get `'static` slices back
/// out, which is sound because the compiler runs once per process and frees
/// everything at exit (see spec.md §5, Resource policy).
#[derive(Default)]
pub struct Interner {
  map: HashMap<&'static str, Symbol>,
  strings: Vec<&'static str>,
}

impl Interner {
  /// Intern a string, returning its (possibly freshly allocated) symbol.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) {
      return sym;
    }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    let sym = Symbol(u32::try_from(self.strings.len()).expect("too many symbols"));
    self.strings.push(leaked);
    self.map.insert(leaked, sym);
    sym
  }

  /// Resolve a symbol back to its string. Panics if the symbol did not come
  /// from this interner.
  #[must_use] fn resolve(&self, sym: Symbol) -> &'static str {
    self.strings[sym.0 as usize]
  }
}

thread_local! {
  static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

/// Intern a string into the global, thread-local interner.
pub fn intern(s: &str) -> Symbol {
  INTERNER.with(|i| i.borrow_mut().intern(s))
}

/// Build a dense `Symbol -> T` lookup table out of a list of `(Symbol, T)`
/// pairs, suitable for O(1) "is this symbol one of these keywords" checks.
#[must_use]
pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let max = pairs.iter().map(|(s, _)| s.into_usize()).max().map_or(0, |m| m + 1);
  let mut map = vec![None; max].into_boxed_slice();
  for &(s, v) in pairs {
    map[s.into_usize()] = Some(v);
  }
  map
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_idempotent() {
    let a = intern("hello");
    let b = intern("hello");
    let c = intern("world");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str(), "hello");
  }
}
