//! Expression grammar: precedence-climbing binary operators, prefix/
//! postfix unary forms, casts, and format-string interpolation
//! (spec.md §4.2).

use crate::diag::Diagnostic;
use crate::lexer::{Keyword, Token, TokenKind};
use crate::span::Position;
use crate::symbol::intern;
use crate::types::ast::{BinOp, CallArg, NodeKind, UnOp};
use crate::types::NodeId;

use super::{offset_span, unescape_body, unescape_string, FatalParseError, PResult, Parser};

fn binop_for(kind: TokenKind) -> Option<(BinOp, u8, u8)> {
  use TokenKind::*;
  Some(match kind {
    PipePipe => (BinOp::Or, 1, 2),
    AmpAmp => (BinOp::And, 3, 4),
    Pipe => (BinOp::BitOr, 5, 6),
    Caret => (BinOp::BitXor, 7, 8),
    Amp => (BinOp::BitAnd, 9, 10),
    EqEq => (BinOp::Eq, 11, 12),
    BangEq => (BinOp::Ne, 11, 12),
    Lt => (BinOp::Lt, 13, 14),
    Le => (BinOp::Le, 13, 14),
    Gt => (BinOp::Gt, 13, 14),
    Ge => (BinOp::Ge, 13, 14),
    Shl => (BinOp::Shl, 15, 16),
    Shr => (BinOp::Shr, 15, 16),
    Plus => (BinOp::Add, 17, 18),
    Minus => (BinOp::Sub, 17, 18),
    Star => (BinOp::Mul, 19, 20),
    Slash => (BinOp::Div, 19, 20),
    Percent => (BinOp::Mod, 19, 20),
    _ => return None,
  })
}

fn compound_assign_op(kind: TokenKind) -> Option<BinOp> {
  use TokenKind::*;
  Some(match kind {
    PlusEq => BinOp::Add, MinusEq => BinOp::Sub, StarEq => BinOp::Mul,
    SlashEq => BinOp::Div, PercentEq => BinOp::Mod, AmpEq => BinOp::BitAnd,
    PipeEq => BinOp::BitOr, CaretEq => BinOp::BitXor, ShlEq => BinOp::Shl, ShrEq => BinOp::Shr,
    _ => return None,
  })
}

impl<'p> Parser<'p> {
  /// Entry point: assignment is the lowest-precedence, right-associative
  /// level (spec.md §4.2).
  pub(super) fn parse_expr(&mut self) -> PResult<NodeId> {
    let lhs = self.parse_binary(0)?;
    if self.check(TokenKind::Eq) {
      self.advance();
      let rhs = self.parse_expr()?;
      let span = self.prog.nodes[lhs].span.join(self.prog.nodes[rhs].span);
      return Ok(self.push_node(span, NodeKind::Assign(lhs, rhs)));
    }
    if let Some(op) = compound_assign_op(self.cur_kind()) {
      self.advance();
      let rhs = self.parse_expr()?;
      let span = self.prog.nodes[lhs].span.join(self.prog.nodes[rhs].span);
      return Ok(self.push_node(span, NodeKind::CompoundAssign(op, lhs, rhs)));
    }
    // `<<=`/`>>=`: the lexer never emits a single token for these (it has
    // already folded the trailing `=` into `Le`/`Ge`), so the two halves
    // show up as adjacent `Lt, Le` / `Gt, Ge` pairs (spec.md §4.2, §9).
    if self.check(TokenKind::Lt) && self.next_adjacent_kind() == Some(TokenKind::Le) {
      self.advance(); self.advance();
      let rhs = self.parse_expr()?;
      let span = self.prog.nodes[lhs].span.join(self.prog.nodes[rhs].span);
      return Ok(self.push_node(span, NodeKind::CompoundAssign(BinOp::Shl, lhs, rhs)));
    }
    if self.check(TokenKind::Gt) && self.next_adjacent_kind() == Some(TokenKind::Ge) {
      self.advance(); self.advance();
      let rhs = self.parse_expr()?;
      let span = self.prog.nodes[lhs].span.join(self.prog.nodes[rhs].span);
      return Ok(self.push_node(span, NodeKind::CompoundAssign(BinOp::Shr, lhs, rhs)));
    }
    Ok(lhs)
  }

  fn parse_binary(&mut self, min_bp: u8) -> PResult<NodeId> {
    let mut lhs = self.parse_cast()?;
    loop {
      let kind = self.cur_kind();
      // Leave `<<=`/`>>=` for parse_expr's compound-assignment check.
      if (kind == TokenKind::Lt && self.next_adjacent_kind() == Some(TokenKind::Le))
        || (kind == TokenKind::Gt && self.next_adjacent_kind() == Some(TokenKind::Ge)) {
        break;
      }
      // `<<`/`>>` only exist as two adjacent `Lt`/`Gt` tokens with no
      // intervening space; otherwise a lone `<`/`>` is comparison, and a
      // space-separated `< <` stays two comparisons (spec.md §4.2, §9).
      let shift = if kind == TokenKind::Lt && self.next_adjacent_kind() == Some(TokenKind::Lt) {
        Some(TokenKind::Shl)
      } else if kind == TokenKind::Gt && self.next_adjacent_kind() == Some(TokenKind::Gt) {
        Some(TokenKind::Shr)
      } else {
        None
      };
      let logical = if self.check_keyword(Keyword::And) { Some(TokenKind::AmpAmp) }
        else if self.check_keyword(Keyword::Or) { Some(TokenKind::PipePipe) }
        else { None };
      let effective_kind = shift.or(logical).unwrap_or(kind);
      let Some((op, lbp, rbp)) = binop_for(effective_kind) else { break };
      if lbp < min_bp { break; }
      self.advance();
      if shift.is_some() { self.advance(); }
      let rhs = self.parse_binary(rbp)?;
      let span = self.prog.nodes[lhs].span.join(self.prog.nodes[rhs].span);
      lhs = self.push_node(span, NodeKind::Binary(op, lhs, rhs));
    }
    Ok(lhs)
  }

  /// `expr as Type`, left-associative, above the binary operators and
  /// below unary prefix forms.
  fn parse_cast(&mut self) -> PResult<NodeId> {
    let mut node = self.parse_unary()?;
    while self.eat_keyword(Keyword::As) {
      let ty = self.parse_type_expr()?;
      let span = self.prog.nodes[node].span.join(self.prog.nodes[ty].span);
      node = self.push_node(span, NodeKind::Cast(node, ty));
    }
    Ok(node)
  }

  fn parse_unary(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    let op = if self.check(TokenKind::Minus) { Some(UnOp::Neg) }
      else if self.check(TokenKind::Bang) || self.check_keyword(Keyword::Not) { Some(UnOp::Not) }
      else if self.check(TokenKind::Tilde) { Some(UnOp::BitNot) }
      else if self.check(TokenKind::Star) { Some(UnOp::Deref) }
      else if self.check(TokenKind::Amp) { Some(UnOp::AddressOf) }
      else { None };
    if let Some(op) = op {
      self.advance();
      let operand = self.parse_unary()?;
      let span = start.join(self.prog.nodes[operand].span);
      return Ok(self.push_node(span, NodeKind::Unary(op, operand)));
    }
    self.parse_postfix()
  }

  fn parse_postfix(&mut self) -> PResult<NodeId> {
    let mut node = self.parse_primary()?;
    loop {
      if self.check(TokenKind::Dot) {
        self.advance();
        let (name, span) = self.expect_ident()?;
        let joined = self.prog.nodes[node].span.join(span);
        node = self.push_node(joined, NodeKind::Member(node, name));
      } else if self.check(TokenKind::LParen) {
        node = self.parse_call(node)?;
      } else if self.check(TokenKind::LBracket) {
        self.advance();
        let index = self.parse_expr()?;
        let end = self.cur_span();
        self.expect(TokenKind::RBracket, "']'")?;
        let joined = self.prog.nodes[node].span.join(end);
        node = self.push_node(joined, NodeKind::Index(node, index));
      } else if self.check(TokenKind::Question) {
        let span = self.prog.nodes[node].span.join(self.cur_span());
        self.advance();
        node = self.push_node(span, NodeKind::Unary(UnOp::Try, node));
      } else {
        break;
      }
    }
    Ok(node)
  }

  fn parse_call(&mut self, callee: NodeId) -> PResult<NodeId> {
    let start = self.prog.nodes[callee].span;
    self.expect(TokenKind::LParen, "'('")?;
    let mut args = Vec::new();
    while !self.check(TokenKind::RParen) && !self.at_eof() {
      let arg_start = self.cur_span();
      let label = if self.check(TokenKind::Identifier) && self.peek_is_colon_label() {
        let (l, _) = self.expect_ident()?;
        self.expect(TokenKind::Colon, "':'")?;
        Some(l)
      } else {
        None
      };
      let value = self.parse_expr()?;
      let span = arg_start.join(self.prog.nodes[value].span);
      args.push(CallArg { label, value, span });
      if !self.eat(TokenKind::Comma) { break; }
    }
    let end = self.cur_span();
    self.expect(TokenKind::RParen, "')'")?;
    Ok(self.push_node(start.join(end), NodeKind::Call(callee, args)))
  }

  /// `name:` lookahead for a labeled constructor argument, without
  /// consuming tokens on failure.
  fn peek_is_colon_label(&self) -> bool {
    self.pos + 1 < self.tokens.len() && self.tokens[self.pos + 1].kind == TokenKind::Colon
  }

  fn parse_primary(&mut self) -> PResult<NodeId> {
    let start = self.cur_span();
    match self.cur_kind() {
      TokenKind::IntLiteral => {
        let tok = self.advance();
        let value = parse_int_literal(&tok.text);
        let suffix = tok.suffix.as_ref().map(|s| intern(&s.text));
        Ok(self.push_node(start, NodeKind::IntLiteral { value, suffix }))
      }
      TokenKind::FloatLiteral => {
        let tok = self.advance();
        let text: String = tok.text.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
        let value = text.parse().unwrap_or(0.0);
        let suffix = tok.suffix.as_ref().map(|s| intern(&s.text));
        Ok(self.push_node(start, NodeKind::FloatLiteral { value, suffix }))
      }
      TokenKind::CharLiteral => {
        let tok = self.advance();
        Ok(self.push_node(start, NodeKind::CharLiteral(parse_char_literal(&tok.text))))
      }
      TokenKind::StringLiteral => {
        let tok = self.advance();
        Ok(self.push_node(start, NodeKind::StringLiteral(unescape_string(&tok.text).into_boxed_str())))
      }
      TokenKind::FormatStringLiteral => self.parse_format_string(),
      TokenKind::Keyword(Keyword::True) => { self.advance(); Ok(self.push_node(start, NodeKind::BoolLiteral(true))) }
      TokenKind::Keyword(Keyword::False) => { self.advance(); Ok(self.push_node(start, NodeKind::BoolLiteral(false))) }
      TokenKind::Keyword(Keyword::Null) => { self.advance(); Ok(self.push_node(start, NodeKind::Null)) }
      TokenKind::Keyword(Keyword::Sizeof) => {
        self.advance();
        self.expect(TokenKind::LParen, "'('")?;
        let ty = self.parse_type_expr()?;
        let end = self.cur_span();
        self.expect(TokenKind::RParen, "')'")?;
        Ok(self.push_node(start.join(end), NodeKind::SizeOf(ty)))
      }
      TokenKind::LParen => {
        self.advance();
        let inner = self.parse_expr()?;
        let end = self.cur_span();
        self.expect(TokenKind::RParen, "')'")?;
        // Keep the parenthesized form's full span for accurate diagnostics
        // without introducing a distinct AST node (spec.md gives grouping
        // parens no semantic meaning beyond precedence).
        let mut node = self.prog.nodes[inner].clone();
        node.span = start.join(end);
        Ok(self.prog.nodes.push(node))
      }
      TokenKind::Dot => {
        // `.name` shorthand for `this.name` inside an instance method body.
        self.advance();
        let (name, span) = self.expect_ident()?;
        if !self.in_instance_method {
          self.prog.error(Diagnostic::standard(start.join(span), "'.name' shorthand is only valid inside an instance method"));
        }
        let this = self.push_node(start, NodeKind::Identifier(intern("this")));
        Ok(self.push_node(start.join(span), NodeKind::Member(this, name)))
      }
      TokenKind::Identifier => self.parse_scoped_path(false),
      TokenKind::Keyword(Keyword::If) => self.parse_if(),
      TokenKind::Keyword(Keyword::Match) => self.parse_match(),
      TokenKind::LBrace => self.parse_block(),
      _ => {
        self.prog.error(Diagnostic::standard(start, "expected an expression"));
        Err(FatalParseError)
      }
    }
  }

  /// Split a `f"...{expr[:spec]}..."`/`` `...{expr}...` `` token into its
  /// literal segments and re-parsed interpolated expressions.
  fn parse_format_string(&mut self) -> PResult<NodeId> {
    let tok = self.advance();
    let span = tok.span;
    let raw: &str = &tok.text;
    let bytes = raw.as_bytes();
    let (body_start, body_end) = if bytes.first() == Some(&b'f') {
      (2usize, bytes.len() - 1)
    } else {
      (1usize, bytes.len() - 1)
    };
    let body = &raw[body_start..body_end];

    let mut literals = Vec::new();
    let mut specs = Vec::new();
    let mut exprs = Vec::new();
    let mut literal_buf = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
      if c == '\\' {
        if let Some(&(_, next)) = chars.peek() {
          literal_buf.push(c);
          literal_buf.push(next);
          chars.next();
        }
        continue;
      }
      if c != '{' {
        literal_buf.push(c);
        continue;
      }
      let expr_start_byte = i + 1;
      let mut depth = 1usize;
      let mut end_byte = body.len();
      let mut colon_byte = None;
      for (j, cc) in body[expr_start_byte..].char_indices() {
        let abs = expr_start_byte + j;
        match cc {
          '{' | '(' | '[' => depth += 1,
          ')' | ']' => depth -= 1,
          '}' if depth == 1 => { end_byte = abs; break; }
          '}' => depth -= 1,
          ':' if depth == 1 && colon_byte.is_none() => colon_byte = Some(abs),
          _ => {}
        }
      }
      let (expr_text, spec_text) = match colon_byte {
        Some(cb) => (&body[expr_start_byte..cb], Some(body[cb + 1..end_byte].to_owned())),
        None => (&body[expr_start_byte..end_byte], None),
      };

      literals.push(std::mem::take(&mut literal_buf).into_boxed_str());
      specs.push(spec_text.map(String::into_boxed_str));

      let base = position_at(span.start, raw, body_start + expr_start_byte);
      let (sub_tokens, sub_errors) = crate::lexer::lex(expr_text, span.start.file);
      self.prog.errors.extend(sub_errors);
      let sub_tokens: Vec<Token> = sub_tokens.into_iter().map(|mut t| { t.span = offset_span(base, t.span); t }).collect();
      let expr_node = self.with_sub_tokens(sub_tokens, Parser::parse_expr)?;
      exprs.push(expr_node);

      // Skip the rest of the outer char iterator up to and including '}'.
      while let Some(&(k, _)) = chars.peek() {
        if k >= end_byte { break; }
        chars.next();
      }
      chars.next(); // consume '}'
    }
    literals.push(literal_buf.into_boxed_str());

    Ok(self.push_node(span, NodeKind::FormatString { literals, specs, exprs }))
  }
}

/// Computes the absolute `Position` of byte `byte_offset` into `raw`
/// (the full original token text), given the token's own start
/// position, by scanning for newlines the same way the main lexer does.
fn position_at(tok_start: Position, raw: &str, byte_offset: usize) -> Position {
  let mut line = tok_start.line;
  let mut column = tok_start.column;
  for &b in &raw.as_bytes()[..byte_offset] {
    if b == b'\n' { line += 1; column = 1; } else { column += 1; }
  }
  Position { file: tok_start.file, line, column, index: tok_start.index + u32::try_from(byte_offset).unwrap_or(0) }
}

fn parse_int_literal(text: &str) -> u64 {
  if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
    u64::from_str_radix(hex, 16).unwrap_or(0)
  } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
    u64::from_str_radix(bin, 2).unwrap_or(0)
  } else {
    text.parse().unwrap_or(0)
  }
}

fn parse_char_literal(text: &str) -> u8 {
  let body = &text[1..text.len().saturating_sub(1)];
  let unescaped = unescape_body(body);
  unescaped.bytes().next().unwrap_or(0)
}
