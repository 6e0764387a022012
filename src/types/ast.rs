//! The tagged AST node (spec.md §3). Every node carries its span, a
//! nullable-until-checked `etype`, a nullable resolved symbol, and a
//! `returns` flag set by control-flow analysis.

use smallvec::SmallVec;
use crate::span::Span;
use crate::symbol::Symbol;
use crate::types::ty::Type;
use crate::types::{NodeId, SymId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
  Add, Sub, Mul, Div, Mod,
  Eq, Ne, Lt, Le, Gt, Ge,
  And, Or,
  BitAnd, BitOr, BitXor, Shl, Shr,
}

impl BinOp {
  #[must_use] pub fn is_comparison(self) -> bool {
    matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
  }
  #[must_use] pub fn is_logical(self) -> bool { matches!(self, BinOp::And | BinOp::Or) }
  #[must_use] pub fn is_bitwise_or_shift(self) -> bool {
    matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr)
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp { Neg, Not, BitNot, Deref, AddressOf, Try }

/// One argument to a call, optionally labeled (for constructor calls).
#[derive(Clone, Debug)]
pub struct CallArg {
  pub label: Option<Symbol>,
  pub value: NodeId,
  pub span: Span,
}

/// One `pattern [| pattern ...] => body` arm of a `match`.
#[derive(Clone, Debug)]
pub struct MatchCase {
  pub patterns: SmallVec<[NodeId; 1]>,
  pub body: NodeId,
  pub span: Span,
}

/// One segment of a parsed import statement's item list.
#[derive(Clone, Debug)]
pub enum ImportItem {
  Single { path: Vec<Symbol>, alias: Option<Symbol>, span: Span },
  Wildcard { span: Span },
}

/// A fully-parsed `import` declaration (spec.md §4.2, §6).
#[derive(Clone, Debug, Default)]
pub struct ImportStmt {
  /// Number of leading `.` path-walk-up markers (0 if none were written).
  pub leading_dots: u32,
  /// Set by a leading `@` or by the path starting with `std`.
  pub force_root: bool,
  pub base_path: Vec<Symbol>,
  pub items: Vec<ImportItem>,
}

/// The tagged variant every AST node's payload is one of.
#[derive(Clone, Debug)]
pub enum NodeKind {
  IntLiteral { value: u64, suffix: Option<Symbol> },
  FloatLiteral { value: f64, suffix: Option<Symbol> },
  CharLiteral(u8),
  StringLiteral(Box<str>),
  BoolLiteral(bool),
  Null,
  FormatString { literals: Vec<Box<str>>, specs: Vec<Option<Box<str>>>, exprs: Vec<NodeId> },

  Identifier(Symbol),
  /// `A::B`, left-associated: `(A, B)`.
  NSLookup(NodeId, Symbol),
  /// `Base<T, U, ...>` template specialization.
  Specialization(NodeId, Vec<NodeId>),

  Binary(BinOp, NodeId, NodeId),
  Unary(UnOp, NodeId),
  Assign(NodeId, NodeId),
  CompoundAssign(BinOp, NodeId, NodeId),
  Call(NodeId, Vec<CallArg>),
  Member(NodeId, Symbol),
  Index(NodeId, NodeId),
  Cast(NodeId, NodeId),
  SizeOf(NodeId),

  /// `&T` in type position.
  TypePointer(NodeId),
  /// `[N]T` in type position.
  TypeArray(NodeId, NodeId),

  Block(Vec<NodeId>),
  If { cond: NodeId, then_blk: NodeId, else_blk: Option<NodeId> },
  Match { scrutinee: NodeId, cases: Vec<MatchCase>, default: Option<NodeId> },
  While { cond: NodeId, body: NodeId },
  For { init: Option<NodeId>, cond: Option<NodeId>, step: Option<NodeId>, body: NodeId },
  VarDecl { name: Symbol, is_const: bool, declared_ty: Option<NodeId>, value: Option<NodeId>, sym: Option<SymId> },

  Return(Option<NodeId>),
  Yield(NodeId),
  Break,
  Continue,
  Defer(NodeId),
  Assert { cond: NodeId, msg: Option<NodeId> },
  ExprStmt(NodeId),
  Import(ImportStmt),
}

/// Extra per-call bookkeeping set during checking (spec.md §4.4.1): once a
/// method-call receiver has been prepended as the synthesized first
/// argument, this flag makes re-checking idempotent.
#[derive(Copy, Clone, Debug, Default)]
pub struct CallFlags {
  pub added_method_arg: bool,
}

/// A tagged AST node. `etype`/`resolved_sym` are `None` until the
/// TypeChecker pass visits the node; `returns` starts `false` and is set
/// by control-flow analysis (spec.md §3).
#[derive(Clone, Debug)]
pub struct Node {
  pub span: Span,
  pub kind: NodeKind,
  pub etype: Option<Type>,
  pub resolved_sym: Option<SymId>,
  pub returns: bool,
  pub call_flags: CallFlags,
}

impl Node {
  #[must_use] pub fn new(span: Span, kind: NodeKind) -> Self {
    Self { span, kind, etype: None, resolved_sym: None, returns: false, call_flags: CallFlags::default() }
  }
}
