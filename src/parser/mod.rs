//! Recursive-descent parser with Pratt-style expression precedence
//! (spec.md §4.2). Consumes a token stream; produces, into a supplied
//! namespace, lists of top-level declarations and a tree of AST bodies.

mod expr;
mod import;

use std::path::{Path, PathBuf};

use crate::diag::Diagnostic;
use crate::entities::{Enum, Function, Structure, Variable};
use crate::lexer::{self, Keyword, Token, TokenKind};
use crate::loader::FileLoader;
use crate::program::Program;
use crate::scope::Scope;
use crate::span::{FileId, Position, Span};
use crate::symbol::{intern, Symbol};
use crate::symtab::{SymKind, SymPayload, SymbolInfo};
use crate::types::ast::{Node, NodeKind};
use crate::types::{EnumId, FuncId, NamespaceId, NodeId, ScopeId, StructId, SymId, VarId};

pub use import::resolve_import;

/// Parser state for a single file. Recursive imports spin up a fresh
/// `Parser` over the imported file's own token stream (via [`load_file`]),
/// so each `Parser` only ever walks one file's tokens at a time.
pub struct Parser<'p> {
  prog: &'p mut Program,
  loader: &'p dyn FileLoader,
  root_dir: PathBuf,
  tokens: Vec<Token>,
  pos: usize,
  file: FileId,
  cur_dir: PathBuf,
  /// Whether the current parse point is inside an instance method body,
  /// so that a leading `.name` shorthand is legal (spec.md §4.2).
  in_instance_method: bool,
  /// Whether the enclosing namespace is the top-level file namespace
  /// (affects leading-dot import path counting, spec.md §4.2).
  at_top_level: bool,
}

/// Fatal parser conditions dump all accumulated diagnostics and stop
/// (spec.md §4.2, §7). Recoverable problems push a `Diagnostic` and the
/// parser keeps going; this type only wraps the irrecoverable ones.
pub struct FatalParseError;

pub(crate) type PResult<T> = Result<T, FatalParseError>;

/// Load and parse a single file's top-level declarations into `ns`.
/// Returns the new file's id, or `None` if the file could not be read.
///
/// A free function with its own lifetime parameter, rather than a method
/// tied to some already-live `Parser<'p>`: recursive imports need to
/// reborrow the *caller's* `&mut Program`/`&dyn FileLoader` for a fresh,
/// shorter-lived `Parser`, not extend them to the original `'p`.
pub fn load_file<'q>(
  prog: &'q mut Program, loader: &'q dyn FileLoader, root_dir: PathBuf,
  cur_dir: PathBuf, filename: String, ns: NamespaceId, is_top_level: bool,
) -> Option<FileId> {
  if is_top_level {
    crate::prelude::install(prog);
  }
  let full_path = cur_dir.join(&filename);
  let content = loader.read_to_string(&full_path).ok()?;
  log::trace!("loading {} ({} bytes)", full_path.display(), content.len());
  let file = prog.sources.push(crate::program::SourceFile { filename: full_path.display().to_string(), content: content.clone() });
  let (tokens, errors) = lexer::lex(&content, file);
  prog.errors.extend(errors);
  prog.namespaces[ns].is_file = true;
  prog.namespaces[ns].is_top_level = is_top_level;
  let mut parser = Parser {
    prog, loader, root_dir, tokens, pos: 0, file, cur_dir,
    in_instance_method: false, at_top_level: is_top_level,
  };
  let _ = parser.parse_top_level_items(ns);
  Some(file)
}

impl<'p> Parser<'p> {
  // ---- token cursor -----------------------------------------------------

  fn cur(&self) -> &Token { &self.tokens[self.pos] }
  fn cur_kind(&self) -> TokenKind { self.cur().kind }
  fn cur_span(&self) -> Span { self.cur().span }

  fn at_eof(&self) -> bool { self.cur_kind() == TokenKind::Eof }

  fn advance(&mut self) -> Token {
    let tok = self.tokens[self.pos].clone();
    if self.pos + 1 < self.tokens.len() { self.pos += 1; }
    tok
  }

  fn check(&self, kind: TokenKind) -> bool { self.cur_kind() == kind }

  fn check_keyword(&self, kw: Keyword) -> bool { self.cur().keyword() == Some(kw) }

  fn eat(&mut self, kind: TokenKind) -> bool {
    if self.check(kind) { self.advance(); true } else { false }
  }

  fn eat_keyword(&mut self, kw: Keyword) -> bool {
    if self.check_keyword(kw) { self.advance(); true } else { false }
  }

  /// Consume a required token or dump accumulated diagnostics and abort
  /// the whole compilation (spec.md §4.2: "missing expected token ...
  /// triggers immediate fatal exit").
  fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
    if self.check(kind) {
      Ok(self.advance())
    } else {
      self.prog.error(Diagnostic::standard(self.cur_span(), format!("expected {what}")));
      Err(FatalParseError)
    }
  }

  fn expect_ident(&mut self) -> PResult<(Symbol, Span)> {
    if self.check(TokenKind::Identifier) {
      let tok = self.advance();
      Ok((intern(&tok.text), tok.span))
    } else {
      self.prog.error(Diagnostic::standard(self.cur_span(), "expected an identifier"));
      Err(FatalParseError)
    }
  }

  /// `return`/`break`/`continue`/`defer` end with newline or `;`.
  fn eat_statement_terminator(&mut self) {
    if self.check(TokenKind::Semicolon) {
      self.advance();
    } else if !self.cur().seen_newline && !self.check(TokenKind::RBrace) && !self.at_eof() {
      self.prog.error(Diagnostic::standard(self.cur_span(), "expected newline or ';' to end statement"));
    }
  }

  fn push_node(&mut self, span: Span, kind: NodeKind) -> NodeId {
    self.prog.nodes.push(Node::new(span, kind))
  }

  // ---- top level ----------------------------------------------------

  fn parse_top_level_items(&mut self, ns: NamespaceId) -> PResult<()> {
    while !self.at_eof() {
      self.parse_top_level_item(ns)?;
    }
    Ok(())
  }

  fn parse_top_level_item(&mut self, ns: NamespaceId) -> PResult<()> {
    if self.eat(TokenKind::At) {
      return self.parse_compiler_directive();
    }
    if self.check_keyword(Keyword::Import) {
      return self.parse_import(ns);
    }
    if self.check_keyword(Keyword::Namespace) {
      return self.parse_namespace_block(ns);
    }
    if self.check_keyword(Keyword::Def) {
      return self.parse_function(ns, false);
    }
    if self.check_keyword(Keyword::Struct) {
      return self.parse_struct(ns, false);
    }
    if self.check_keyword(Keyword::Union) {
      return self.parse_struct(ns, true);
    }
    if self.check_keyword(Keyword::Enum) {
      return self.parse_enum(ns);
    }
    if self.check_keyword(Keyword::Let) || self.check_keyword(Keyword::Const) {
      return self.parse_global_var(ns);
    }
    if self.check_keyword(Keyword::Extern) {
      // `extern` prefixing a struct/enum/function/let/const declaration.
      self.advance();
      let is_extern_c = if self.eat(TokenKind::LParen) {
        let _ = self.expect_ident();
        self.eat(TokenKind::RParen);
        true
      } else { true };
      let _ = is_extern_c;
      return self.parse_extern_item(ns);
    }
    self.prog.error(Diagnostic::standard(self.cur_span(), "expected a top-level declaration"));
    Err(FatalParseError)
  }

  fn parse_extern_item(&mut self, ns: NamespaceId) -> PResult<()> {
    if self.check_keyword(Keyword::Struct) { self.parse_struct(ns, false) }
    else if self.check_keyword(Keyword::Union) { self.parse_struct(ns, true) }
    else if self.check_keyword(Keyword::Enum) { self.parse_enum(ns) }
    else if self.check_keyword(Keyword::Def) { self.parse_function(ns, true) }
    else if self.check_keyword(Keyword::Let) || self.check_keyword(Keyword::Const) { self.parse_global_var(ns) }
    else {
      self.prog.error(Diagnostic::standard(self.cur_span(), "expected a declaration after 'extern'"));
      Err(FatalParseError)
    }
  }

  fn parse_compiler_directive(&mut self) -> PResult<()> {
    let _ = self.expect(TokenKind::Identifier, "'compiler'")?;
    let (kw, span) = self.expect_ident()?;
    match kw.as_str() {
      "c_include" => {
        let path = self.expect(TokenKind::StringLiteral, "a string literal path")?;
        self.prog.c_includes.push(unescape_string(&path.text));
      }
      "c_flag" => {
        let flag = self.expect(TokenKind::StringLiteral, "a string literal flag")?;
        self.prog.c_flags.push(unescape_string(&flag.text));
      }
      other => {
        self.prog.error(Diagnostic::standard(span, format!("unknown compiler directive '{other}'")));
      }
    }
    Ok(())
  }

  fn parse_namespace_block(&mut self, ns: NamespaceId) -> PResult<()> {
    self.advance(); // 'namespace'
    let (name, span) = self.expect_ident()?;
    let child = self.new_or_existing_child(ns, name, span);
    self.prog.namespaces[child].always_add_to_scope = true;
    self.expect(TokenKind::LBrace, "'{'")?;
    let was_top = self.at_top_level;
    self.at_top_level = false;
    while !self.check(TokenKind::RBrace) && !self.at_eof() {
      self.parse_top_level_item(child)?;
    }
    self.at_top_level = was_top;
    self.expect(TokenKind::RBrace, "'}'")?;
    Ok(())
  }

  fn new_or_existing_child(&mut self, ns: NamespaceId, name: Symbol, span: Span) -> NamespaceId {
    if let Some(&existing) = self.prog.namespaces[ns].children.get(&name) {
      existing
    } else {
      self.prog.new_namespace(ns, name, span, name)
    }
  }

  // ---- struct / union -------------------------------------------------

  fn parse_struct(&mut self, ns: NamespaceId, is_union: bool) -> PResult<()> {
    let start = self.cur_span();
    self.advance(); // 'struct' / 'union'
    let (name, name_span) = self.expect_ident()?;

    let mut template_params = Vec::new();
    if self.eat(TokenKind::Lt) {
      loop {
        let (p, _) = self.expect_ident()?;
        template_params.push(p);
        if !self.eat(TokenKind::Comma) { break; }
      }
      self.expect(TokenKind::Gt, "'>'")?;
    }

    let mut is_extern = false;
    let mut extern_name = None;
    if self.eat_keyword(Keyword::Extern) {
      is_extern = true;
      if self.eat(TokenKind::LParen) {
        let (n, _) = self.expect_ident()?;
        extern_name = Some(n);
        self.expect(TokenKind::RParen, "')'")?;
      }
    }

    self.expect(TokenKind::LBrace, "'{'")?;
    let mut fields = Vec::new();
    while !self.check(TokenKind::RBrace) && !self.at_eof() {
      let (fname, fspan) = self.expect_ident()?;
      self.expect(TokenKind::Colon, "':'")?;
      let ty_node = self.parse_type_expr()?;
      let fsym = self.prog.symbols.push(SymbolInfo::new(SymKind::Variable, fname, None, fspan, SymPayload::Variable(VarId::new(0))));
      let var = Variable { symbol: fsym, ty: crate::types::ty::Type::Unresolved(ty_node), default: None };
      let vid = self.prog.vars.push(var);
      if let SymPayload::Variable(ref mut v) = self.prog.symbols[fsym].payload { *v = vid; }
      fields.push(self.prog.vars[vid].clone());
      if !self.eat(TokenKind::Comma) {
        break;
      }
    }
    self.expect(TokenKind::RBrace, "'}'")?;

    let struct_id = self.prog.structs.push(Structure {
      symbol: SymId::new(0), fields, is_union, is_templated: !template_params.is_empty(),
      template_params, methods: hashbrown::HashMap::new(), instances: Vec::new(),
    });
    let parent_sym = self.prog.namespaces[ns].symbol;
    let sym = self.prog.symbols.push(SymbolInfo::new(SymKind::Structure, name, Some(parent_sym), name_span, SymPayload::Structure(struct_id)));
    self.prog.symbols[sym].is_extern = is_extern;
    self.prog.symbols[sym].extern_name = extern_name;
    self.prog.structs[struct_id].symbol = sym;
    self.prog.namespaces[ns].structs.push(struct_id);
    let full = self.cur_span_since(start);
    let _ = full;
    Ok(())
  }

  fn cur_span_since(&self, start: Span) -> Span { start.join(self.cur_span()) }

  // ---- enum -----------------------------------------------------------

  fn parse_enum(&mut self, ns: NamespaceId) -> PResult<()> {
    self.advance(); // 'enum'
    let (name, name_span) = self.expect_ident()?;
    self.expect(TokenKind::LBrace, "'{'")?;

    let enum_id = self.prog.enums.push(Enum { symbol: SymId::new(0), fields: Vec::new(), methods: hashbrown::HashMap::new(), dbg_method: None });
    let parent_sym = self.prog.namespaces[ns].symbol;
    let sym = self.prog.symbols.push(SymbolInfo::new(SymKind::Enum, name, Some(parent_sym), name_span, SymPayload::Enum(enum_id)));
    self.prog.enums[enum_id].symbol = sym;

    while !self.check(TokenKind::RBrace) && !self.at_eof() {
      let (vname, vspan) = self.expect_ident()?;
      let mut extern_name = None;
      if self.eat(TokenKind::Eq) {
        if self.eat_keyword(Keyword::Extern) {
          self.expect(TokenKind::LParen, "'('")?;
          let name_tok = self.expect(TokenKind::StringLiteral, "a string literal")?;
          extern_name = Some(intern(&unescape_string(&name_tok.text)));
          self.expect(TokenKind::RParen, "')'")?;
        } else {
          // literal numeric discriminant; parsed but not stored beyond
          // the field's declaration order (spec.md gives no further use
          // for explicit discriminants).
          let _ = self.parse_expr()?;
        }
      }
      let vsym = self.prog.symbols.push(SymbolInfo::new(SymKind::Variable, vname, Some(sym), vspan, SymPayload::Variable(VarId::new(0))));
      if let Some(en) = extern_name {
        self.prog.symbols[vsym].is_extern = true;
        self.prog.symbols[vsym].extern_name = Some(en);
      }
      let vid = self.prog.vars.push(Variable { symbol: vsym, ty: crate::types::ty::Type::Enum(enum_id), default: None });
      if let SymPayload::Variable(ref mut v) = self.prog.symbols[vsym].payload { *v = vid; }
      self.prog.enums[enum_id].fields.push(self.prog.vars[vid].clone());
      if !self.eat(TokenKind::Comma) { break; }
    }
    self.expect(TokenKind::RBrace, "'}'")?;
    self.prog.namespaces[ns].enums.push(enum_id);
    Ok(())
  }

  // ---- let / const ------------------------------------------------------

  fn parse_global_var(&mut self, ns: NamespaceId) -> PResult<()> {
    let is_const = self.check_keyword(Keyword::Const);
    self.advance(); // 'let' / 'const'
    let (name, span) = self.expect_ident()?;
    let declared_ty = if self.eat(TokenKind::Colon) { Some(self.parse_type_expr()?) } else { None };
    let is_extern = declared_ty.is_some() && !self.check(TokenKind::Eq);
    let value = if self.eat(TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
    self.eat_statement_terminator();

    let kind = if is_const { SymKind::Constant } else { SymKind::Variable };
    let parent_sym = self.prog.namespaces[ns].symbol;
    let sym = self.prog.symbols.push(SymbolInfo::new(kind, name, Some(parent_sym), span, SymPayload::Variable(VarId::new(0))));
    self.prog.symbols[sym].is_extern = is_extern;
    let ty = declared_ty.map_or(crate::types::ty::Type::Error, crate::types::ty::Type::Unresolved);
    let vid = self.prog.vars.push(Variable { symbol: sym, ty, default: value });
    let payload = if is_const { SymPayload::Constant(vid) } else { SymPayload::Variable(vid) };
    self.prog.symbols[sym].payload = payload;
    if is_const { self.prog.namespaces[ns].constants.push(vid); } else { self.prog.namespaces[ns].variables.push(vid); }
    Ok(())
  }

  // ---- functions --------------------------------------------------------

  fn parse_function(&mut self, ns: NamespaceId, is_extern: bool) -> PResult<()> {
    let scope = self.prog.namespaces[ns].scope;
    let parent_sym = self.prog.namespaces[ns].symbol;
    let (func_id, parent_name) = self.parse_function_decl(scope, parent_sym)?;
    self.prog.symbols[self.prog.funcs[func_id].symbol].is_extern = is_extern;
    self.prog.namespaces[ns].functions.push(func_id);
    if let Some(pname) = parent_name {
      // Methods are re-parented onto their declared type at check time
      // (spec.md §4.2, §4.4 phase 2); stash the unresolved parent name by
      // recording it against the namespace for now.
      self.pending_method_parent(func_id, pname);
    }
    Ok(())
  }

  /// Parse one `def [Type::]name(params) [: ret] { body }` declaration
  /// starting at the current `def` token, binding its signature and body
  /// against `scope` and its new symbol's parent against `parent_sym`.
  /// Returns the method's unresolved parent-type name, if any, so the
  /// caller can decide how to re-parent it: normal top-level parsing defers
  /// that to the checker (spec.md §4.4 phase 2); re-parsing a template
  /// method for a concrete instantiation binds it immediately instead (see
  /// [`reparse_method_for_instantiation`]).
  fn parse_function_decl(&mut self, scope: ScopeId, parent_sym: SymId) -> PResult<(FuncId, Option<Symbol>)> {
    let decl_start = self.cur_span().start;
    self.advance(); // 'def'
    let (mut name, name_span) = self.expect_ident()?;
    let mut parent_name = None;
    if self.eat(TokenKind::ColonColon) {
      parent_name = Some(name);
      let (real_name, _) = self.expect_ident()?;
      name = real_name;
    }

    self.expect(TokenKind::LParen, "'('")?;
    let mut params = Vec::new();
    let mut is_method = false;
    let mut takes_pointer_receiver = false;
    let mut first = true;
    while !self.check(TokenKind::RParen) && !self.at_eof() {
      let is_receiver_ptr = first && self.eat(TokenKind::Amp);
      let (pname, pspan) = self.expect_ident()?;
      if first && pname.as_str() == "this" {
        is_method = true;
        takes_pointer_receiver = is_receiver_ptr;
      }
      let pty = if self.eat(TokenKind::Colon) { Some(self.parse_type_expr()?) } else { None };
      let default = if self.eat(TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
      let psym = self.prog.symbols.push(SymbolInfo::new(SymKind::Variable, pname, None, pspan, SymPayload::Variable(VarId::new(0))));
      let ty = pty.map_or(crate::types::ty::Type::Error, crate::types::ty::Type::Unresolved);
      let vid = self.prog.vars.push(Variable { symbol: psym, ty, default });
      if let SymPayload::Variable(ref mut v) = self.prog.symbols[psym].payload { *v = vid; }
      params.push(vid);
      first = false;
      if !self.eat(TokenKind::Comma) { break; }
    }
    self.expect(TokenKind::RParen, "')'")?;

    let ret_ty_node = if self.eat(TokenKind::Colon) { Some(self.parse_type_expr()?) } else { None };

    let mut exits = false;
    let was_in_method = self.in_instance_method;
    self.in_instance_method = is_method;
    let body = if self.eat(TokenKind::FatArrow) {
      let e = self.parse_expr()?;
      self.eat_statement_terminator();
      let ret_span = self.prog.nodes[e].span;
      let ret = self.push_node(ret_span, NodeKind::Return(Some(e)));
      Some(self.push_node(ret_span, NodeKind::Block(vec![ret])))
    } else if self.check(TokenKind::LBrace) {
      let b = self.parse_block()?;
      if self.check_keyword(Keyword::Exits) {
        self.advance();
        exits = true;
      }
      Some(b)
    } else {
      None
    };
    self.in_instance_method = was_in_method;
    let decl_end = self.tokens[self.pos.saturating_sub(1)].span.end;

    let func_id = self.prog.funcs.push(Function {
      symbol: SymId::new(0), params: params.into(), ret: ret_ty_node.map_or(crate::types::ty::Type::Scalar(crate::types::ty::Scalar::Void), crate::types::ty::Type::Unresolved),
      body, exits, is_method, is_static: parent_name.is_some() && !is_method,
      parent_ty: None, captured_scope: scope, decl_span: Span { start: decl_start, end: decl_end }, checked: false,
    });
    let _ = takes_pointer_receiver;
    let sym = self.prog.symbols.push(SymbolInfo::new(SymKind::Function, name, Some(parent_sym), name_span, SymPayload::Function(func_id)));
    self.prog.funcs[func_id].symbol = sym;

    Ok((func_id, parent_name))
  }

  fn pending_method_parent(&mut self, func_id: FuncId, parent_name: Symbol) {
    // Encoded via a synthetic Unresolved-identifier etype slot on the
    // function's own symbol span; the TypeChecker's namespace pre-pass
    // resolves `parent_name` in-namespace and re-parents the function.
    self.prog.funcs[func_id].parent_ty = Some(crate::types::ty::Type::Unresolved(
      self.push_node(self.prog.funcs[func_id].symbol_span(&self.prog.symbols), NodeKind::Identifier(parent_name)),
    ));
  }

  // ---- blocks / statements -----------------------------------------------

  fn parse_block(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    self.expect(TokenKind::LBrace, "'{'")?;
    let mut stmts = Vec::new();
    while !self.check(TokenKind::RBrace) && !self.at_eof() {
      stmts.push(self.parse_statement()?);
    }
    let end = self.cur_span();
    self.expect(TokenKind::RBrace, "'}'")?;
    Ok(self.push_node(start.join(end), NodeKind::Block(stmts)))
  }

  fn parse_statement(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    if self.check(TokenKind::LBrace) { return self.parse_block(); }
    if self.check_keyword(Keyword::Return) {
      self.advance();
      let value = if self.cur().seen_newline || self.check(TokenKind::Semicolon) || self.check(TokenKind::RBrace) {
        None
      } else {
        Some(self.parse_expr()?)
      };
      self.eat_statement_terminator();
      return Ok(self.push_node(start, NodeKind::Return(value)));
    }
    if self.check_keyword(Keyword::Yield) {
      self.advance();
      let value = self.parse_expr()?;
      self.eat_statement_terminator();
      return Ok(self.push_node(start, NodeKind::Yield(value)));
    }
    if self.check_keyword(Keyword::Break) {
      self.advance();
      self.eat_statement_terminator();
      return Ok(self.push_node(start, NodeKind::Break));
    }
    if self.check_keyword(Keyword::Continue) {
      self.advance();
      self.eat_statement_terminator();
      return Ok(self.push_node(start, NodeKind::Continue));
    }
    if self.check_keyword(Keyword::Defer) {
      self.advance();
      let stmt = self.parse_statement_no_terminator_check()?;
      return Ok(self.push_node(start, NodeKind::Defer(stmt)));
    }
    if self.check_keyword(Keyword::Assert) {
      self.advance();
      self.expect(TokenKind::LParen, "'('")?;
      let cond = self.parse_expr()?;
      let msg = if self.eat(TokenKind::Comma) { Some(self.parse_expr()?) } else { None };
      self.expect(TokenKind::RParen, "')'")?;
      self.eat_statement_terminator();
      return Ok(self.push_node(start, NodeKind::Assert { cond, msg }));
    }
    if self.check_keyword(Keyword::If) { return self.parse_if(); }
    if self.check_keyword(Keyword::While) { return self.parse_while(); }
    if self.check_keyword(Keyword::For) { return self.parse_for(); }
    if self.check_keyword(Keyword::Match) { return self.parse_match(); }
    if self.check_keyword(Keyword::Let) || self.check_keyword(Keyword::Const) { return self.parse_local_var(); }
    let e = self.parse_expr()?;
    self.eat_statement_terminator();
    Ok(self.push_node(start, NodeKind::ExprStmt(e)))
  }

  fn parse_statement_no_terminator_check(&mut self) -> PResult<NodeId> {
    if self.check(TokenKind::LBrace) { return self.parse_block(); }
    let start = self.cur_span();
    let e = self.parse_expr()?;
    self.eat_statement_terminator();
    Ok(self.push_node(start, NodeKind::ExprStmt(e)))
  }

  fn parse_local_var(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    let is_const = self.check_keyword(Keyword::Const);
    self.advance();
    let (name, _) = self.expect_ident()?;
    let declared_ty = if self.eat(TokenKind::Colon) { Some(self.parse_type_expr()?) } else { None };
    let value = if self.eat(TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
    self.eat_statement_terminator();
    Ok(self.push_node(start, NodeKind::VarDecl { name, is_const, declared_ty, value, sym: None }))
  }

  fn parse_if(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    self.advance(); // 'if'
    let cond = self.parse_expr()?;
    let then_blk = self.parse_block()?;
    let else_blk = if self.eat_keyword(Keyword::Else) {
      if self.check_keyword(Keyword::If) { Some(self.parse_if()?) } else { Some(self.parse_block()?) }
    } else { None };
    Ok(self.push_node(start, NodeKind::If { cond, then_blk, else_blk }))
  }

  fn parse_while(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    self.advance();
    let cond = self.parse_expr()?;
    let body = self.parse_block()?;
    Ok(self.push_node(start, NodeKind::While { cond, body }))
  }

  fn parse_for(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    self.advance();
    self.expect(TokenKind::LParen, "'('")?;
    let init = if self.check(TokenKind::Semicolon) { None } else { Some(self.parse_for_clause()?) };
    self.expect(TokenKind::Semicolon, "';'")?;
    let cond = if self.check(TokenKind::Semicolon) { None } else { Some(self.parse_expr()?) };
    self.expect(TokenKind::Semicolon, "';'")?;
    let step = if self.check(TokenKind::RParen) { None } else { Some(self.parse_expr()?) };
    self.expect(TokenKind::RParen, "')'")?;
    let body = self.parse_block()?;
    Ok(self.push_node(start, NodeKind::For { init, cond, step, body }))
  }

  fn parse_for_clause(&mut self) -> PResult<NodeId> {
    if self.check_keyword(Keyword::Let) || self.check_keyword(Keyword::Const) {
      let start = self.cur_span();
      let is_const = self.check_keyword(Keyword::Const);
      self.advance();
      let (name, _) = self.expect_ident()?;
      let declared_ty = if self.eat(TokenKind::Colon) { Some(self.parse_type_expr()?) } else { None };
      let value = if self.eat(TokenKind::Eq) { Some(self.parse_expr()?) } else { None };
      Ok(self.push_node(start, NodeKind::VarDecl { name, is_const, declared_ty, value, sym: None }))
    } else {
      let start = self.cur_span();
      let e = self.parse_expr()?;
      Ok(self.push_node(start, NodeKind::ExprStmt(e)))
    }
  }

  fn parse_match(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    self.advance(); // 'match'
    let scrutinee = self.parse_expr()?;
    self.expect(TokenKind::LBrace, "'{'")?;
    let mut cases = Vec::new();
    let mut default = None;
    while !self.check(TokenKind::RBrace) && !self.at_eof() {
      let cstart = self.cur_span();
      if self.eat_keyword(Keyword::Else) {
        self.expect(TokenKind::FatArrow, "'=>'")?;
        default = Some(self.parse_case_body()?);
      } else {
        let mut patterns = smallvec::SmallVec::new();
        patterns.push(self.parse_expr()?);
        while self.eat(TokenKind::Pipe) {
          patterns.push(self.parse_expr()?);
        }
        self.expect(TokenKind::FatArrow, "'=>'")?;
        let body = self.parse_case_body()?;
        cases.push(crate::types::ast::MatchCase { patterns, body, span: cstart.join(self.cur_span()) });
      }
      self.eat(TokenKind::Comma);
    }
    self.expect(TokenKind::RBrace, "'}'")?;
    Ok(self.push_node(start, NodeKind::Match { scrutinee, cases, default }))
  }

  fn parse_case_body(&mut self) -> PResult<NodeId> {
    if self.check(TokenKind::LBrace) { self.parse_block() } else {
      let start = self.cur_span();
      let e = self.parse_expr()?;
      Ok(self.push_node(start, NodeKind::ExprStmt(e)))
    }
  }

  // ---- type expressions ---------------------------------------------------

  fn parse_type_expr(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    if self.eat(TokenKind::Amp) {
      let inner = self.parse_type_expr()?;
      return Ok(self.push_node(start.join(self.cur_span()), NodeKind::TypePointer(inner)));
    }
    if self.eat(TokenKind::LBracket) {
      let size = self.parse_expr()?;
      self.expect(TokenKind::RBracket, "']'")?;
      let elem = self.parse_type_expr()?;
      return Ok(self.push_node(start.join(self.cur_span()), NodeKind::TypeArray(elem, size)));
    }
    self.parse_scoped_path(true)
  }

  /// Parses `ident`, `ident::ident...`, and an optional trailing
  /// `<T, ...>` template specialization, used both in type position and
  /// for namespace-qualified expression identifiers.
  fn parse_scoped_path(&mut self, in_type_position: bool) -> PResult<NodeId> {
    let (name, span) = self.expect_ident()?;
    let mut node = self.push_node(span, NodeKind::Identifier(name));
    loop {
      if self.check(TokenKind::ColonColon) {
        self.advance();
        let (part, pspan) = self.expect_ident()?;
        let joined = self.prog.nodes[node].span.join(pspan);
        node = self.push_node(joined, NodeKind::NSLookup(node, part));
      } else if in_type_position && self.check(TokenKind::Lt) && self.prev_adjacent_to_cur() {
        self.advance();
        let mut args = vec![self.parse_type_expr()?];
        while self.eat(TokenKind::Comma) {
          args.push(self.parse_type_expr()?);
        }
        self.expect(TokenKind::Gt, "'>'")?;
        let joined = self.prog.nodes[node].span.join(self.cur_span());
        node = self.push_node(joined, NodeKind::Specialization(node, args));
      } else {
        break;
      }
    }
    Ok(node)
  }

  /// The previous token's end touches the current `<` with no
  /// intervening whitespace (spec.md §4.2): required to disambiguate
  /// `Foo<Bar>` specialization from a less-than comparison.
  fn prev_adjacent_to_cur(&self) -> bool {
    if self.pos == 0 { return false; }
    self.tokens[self.pos - 1].span.adjacent(self.cur_span())
  }

  /// The kind of the token right after the current one, but only if it
  /// touches the current token with no intervening whitespace. Used to
  /// reassemble `<<`/`>>`/`<<=`/`>>=` from the single-`<`/`>` tokens the
  /// lexer emits (spec.md §4.2, §9: "whitespace between them is
  /// intentionally significant").
  fn next_adjacent_kind(&self) -> Option<TokenKind> {
    let nxt = self.tokens.get(self.pos + 1)?;
    self.cur_span().adjacent(nxt.span).then_some(nxt.kind)
  }

  /// Temporarily swap in a spliced token stream (a format-string
  /// interpolation body, or a template argument's re-lexed text) and run
  /// `f` over it, then restore the outer stream. Mirrors how template
  /// instantiation re-lexes an original declaration's span (spec.md
  /// §4.4, P8).
  fn with_sub_tokens<T>(&mut self, tokens: Vec<Token>, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
    let old_tokens = std::mem::replace(&mut self.tokens, tokens);
    let old_pos = std::mem::replace(&mut self.pos, 0);
    let result = f(self);
    self.tokens = old_tokens;
    self.pos = old_pos;
    result
  }
}

/// Re-lex and re-parse a method declaration from its original source span
/// for one template instantiation (spec.md §4.4, P8): the template's own
/// copy of the method is checked once against the unbound type parameter
/// and shared between instantiations, so a concrete instance needs its own
/// fresh body AST, bound under `scope` (the instantiation's scratch scope,
/// with the template parameters already shadowed to concrete types) and
/// parented on `parent_sym` (the instantiation's own struct symbol), rather
/// than the template's.
pub(crate) fn reparse_method_for_instantiation(
  prog: &mut Program, decl_span: Span, scope: ScopeId, parent_sym: SymId,
) -> PResult<FuncId> {
  let file = decl_span.start.file;
  let snippet = prog.sources[file].content[decl_span.start.index as usize..decl_span.end.index as usize].to_string();
  let (raw_tokens, errors) = lexer::lex(&snippet, file);
  prog.errors.extend(errors);
  let tokens: Vec<Token> = raw_tokens.into_iter()
    .map(|mut t| { t.span = offset_span(decl_span.start, t.span); t })
    .collect();
  let loader = crate::loader::MemoryLoader::new();
  let mut parser = Parser {
    prog, loader: &loader, root_dir: PathBuf::new(), tokens, pos: 0, file,
    cur_dir: PathBuf::new(), in_instance_method: false, at_top_level: false,
  };
  let (func_id, _parent_name) = parser.parse_function_decl(scope, parent_sym)?;
  Ok(func_id)
}

/// Strip the surrounding quote characters and resolve backslash escapes.
/// The lexer only skips over escapes without interpreting them (spec.md
/// §4.1); interpretation happens here, once, at parse time.
fn unescape_string(lexeme: &str) -> String {
  let bytes = lexeme.as_bytes();
  if bytes.len() < 2 { return String::new(); }
  let body = &lexeme[1..bytes.len() - 1];
  unescape_body(body)
}

fn unescape_body(body: &str) -> String {
  let mut out = String::with_capacity(body.len());
  let mut chars = body.chars();
  while let Some(c) = chars.next() {
    if c != '\\' { out.push(c); continue; }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some('r') => out.push('\r'),
      Some('0') => out.push('\0'),
      Some('\\') => out.push('\\'),
      Some('\'') => out.push('\''),
      Some('"') => out.push('"'),
      Some('`') => out.push('`'),
      Some(other) => out.push(other),
      None => {}
    }
  }
  out
}

/// Absolute position for a point produced by a sub-lexer that was started
/// fresh at `line 1, column 1, index 0` over a spliced-out snippet
/// (format-string interpolations; template-instantiation bodies use the
/// same trick). `base` is where the snippet begins in the real file.
fn offset_position(base: Position, p: Position) -> Position {
  if p.line == 1 {
    Position { file: base.file, line: base.line, column: base.column + p.column - 1, index: base.index + p.index }
  } else {
    Position { file: base.file, line: base.line + p.line - 1, column: p.column, index: base.index + p.index }
  }
}

fn offset_span(base: Position, s: Span) -> Span {
  Span { start: offset_position(base, s.start), end: offset_position(base, s.end) }
}

impl Function {
  fn symbol_span(&self, symbols: &crate::idx::IdxVec<SymId, SymbolInfo>) -> Span {
    symbols[self.symbol].span
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::program::{CompileOptions, Program};
  use crate::loader::MemoryLoader;

  fn parse_source(src: &str) -> Program {
    let mut loader = MemoryLoader::new();
    loader.add_file("main.oc", src);
    let mut prog = Program::new(CompileOptions::default());
    let global = prog.global;
    load_file(&mut prog, &loader, PathBuf::new(), PathBuf::new(), "main.oc".into(), global, true);
    prog
  }

  #[test]
  fn parses_simple_function() {
    let prog = parse_source("def main(): i32 { return 1 + 2 }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
    assert_eq!(prog.namespaces[prog.global].functions.len(), 1);
  }

  #[test]
  fn parses_struct_with_fields() {
    let prog = parse_source("struct P { x: i32, y: i32 }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
    assert_eq!(prog.namespaces[prog.global].structs.len(), 1);
    assert_eq!(prog.structs[StructId::new(0)].fields.len(), 2);
  }

  #[test]
  fn parses_templated_struct() {
    let prog = parse_source("struct P<T> { x: T, y: T }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
    assert!(prog.structs[StructId::new(0)].is_templated);
  }

  #[test]
  fn parses_enum_with_methods_namespace() {
    let prog = parse_source("enum Color { Red, Green, Blue }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
    assert_eq!(prog.enums[EnumId::new(0)].fields.len(), 3);
  }

  #[test]
  fn parses_method_declaration() {
    let prog = parse_source("struct P { x: i32 }\ndef P::get(&this): i32 => this.x");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
    assert_eq!(prog.namespaces[prog.global].functions.len(), 1);
    assert!(prog.funcs[FuncId::new(0)].is_method);
  }

  #[test]
  fn parses_match_with_else() {
    let prog = parse_source("def f(x: i32): i32 { match x { 1 => return 1, else => return 0 } }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
  }

  #[test]
  fn parses_defer_and_assert() {
    let prog = parse_source("def f() { defer println(\"bye\") assert(1 == 1, \"ok\") }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
  }

  #[test]
  fn generic_specialization_requires_adjacency() {
    let prog = parse_source("let a: Vec<i32> = 0");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
  }

  #[test]
  fn adjacent_lt_lt_parses_as_shift() {
    let prog = parse_source("def f(x: i32): i32 => x << 1");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
    let func = &prog.funcs[FuncId::new(0)];
    let body = func.body.expect("function body");
    let ret = match &prog.nodes[body].kind { NodeKind::Block(stmts) => stmts[0], _ => panic!("expected block") };
    let value = match &prog.nodes[ret].kind { NodeKind::Return(Some(v)) => *v, _ => panic!("expected return") };
    assert!(matches!(prog.nodes[value].kind, NodeKind::Binary(crate::types::ast::BinOp::Shl, _, _)));
  }

  #[test]
  fn spaced_lt_lt_stays_two_comparisons() {
    // `a < < b` (whitespace between the two `<`s) must NOT fold into a
    // shift (spec.md §9: the space is significant), so `< b` alone isn't a
    // valid right-hand side and parsing fails rather than silently
    // producing a shift.
    let prog = parse_source("def f(x: i32): i32 => x < < 1");
    assert!(prog.has_errors());
  }

  #[test]
  fn shift_assign_parses_as_compound_assignment() {
    let prog = parse_source("def f() { let x: i32 = 1\n x <<= 2 }");
    assert!(!prog.has_errors(), "{:?}", prog.errors);
  }
}
