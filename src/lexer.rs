//! Byte stream -> token stream (spec.md §4.1).
//!
//! `lex` is a pure function of its input bytes (P1): no IO, no global
//! state beyond [`crate::symbol`]'s interner (which only ever grows, and
//! never changes what a given string maps to).

use crate::diag::Diagnostic;
use crate::span::{FileId, Position, Span};

/// The ~30 reserved words of the source language.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
  Def, Struct, Union, Enum, Extern, Import, As, Namespace,
  Let, Const, Return, Yield, Break, Continue, Defer,
  If, Else, While, For, Match, Assert,
  True, False, Null, Sizeof, Exits,
  And, Or, Not,
}

impl Keyword {
  const ALL: &'static [(&'static str, Keyword)] = &[
    ("def", Keyword::Def), ("struct", Keyword::Struct), ("union", Keyword::Union),
    ("enum", Keyword::Enum), ("extern", Keyword::Extern), ("import", Keyword::Import),
    ("as", Keyword::As), ("namespace", Keyword::Namespace),
    ("let", Keyword::Let), ("const", Keyword::Const),
    ("return", Keyword::Return), ("yield", Keyword::Yield),
    ("break", Keyword::Break), ("continue", Keyword::Continue), ("defer", Keyword::Defer),
    ("if", Keyword::If), ("else", Keyword::Else), ("while", Keyword::While),
    ("for", Keyword::For), ("match", Keyword::Match), ("assert", Keyword::Assert),
    ("true", Keyword::True), ("false", Keyword::False), ("null", Keyword::Null),
    ("sizeof", Keyword::Sizeof), ("exits", Keyword::Exits),
    ("and", Keyword::And), ("or", Keyword::Or), ("not", Keyword::Not),
  ];

  /// Look up a keyword by its exact spelling (P3: a lexeme equal to a
  /// keyword is tokenized as that keyword, never as an identifier).
  #[must_use] pub fn from_str(s: &str) -> Option<Self> {
    Self::ALL.iter().find(|(name, _)| *name == s).map(|(_, k)| *k)
  }
}

/// A token kind: punctuation, operator, literal, identifier or keyword.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
  IntLiteral, FloatLiteral, CharLiteral, StringLiteral, FormatStringLiteral,
  Identifier, Keyword(Keyword),

  LParen, RParen, LBrace, RBrace, LBracket, RBracket,
  Comma, Colon, ColonColon, Semicolon, Dot, At, Question,
  Arrow, FatArrow,

  Eq, EqEq, Bang, BangEq, Lt, Gt, Le, Ge, Shl, Shr,
  Plus, Minus, Star, Slash, Percent,
  Amp, Pipe, Caret, Tilde, AmpAmp, PipePipe,

  PlusEq, MinusEq, StarEq, SlashEq, PercentEq,
  AmpEq, PipeEq, CaretEq, ShlEq, ShrEq,

  Eof,
}

impl TokenKind {
  /// Whether this token kind begins a compound-assignment form
  /// (`+=`, `-=`, ...).
  #[must_use] pub fn is_compound_assign(self) -> bool {
    matches!(self,
      TokenKind::PlusEq | TokenKind::MinusEq | TokenKind::StarEq | TokenKind::SlashEq |
      TokenKind::PercentEq | TokenKind::AmpEq | TokenKind::PipeEq | TokenKind::CaretEq |
      TokenKind::ShlEq | TokenKind::ShrEq)
  }
}

/// A single token: kind, span, exact source text, an optional numeric
/// suffix sub-token, and whether a newline was seen before it in the
/// source (used by statement terminators).
#[derive(Clone, Debug)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
  pub text: Box<str>,
  pub suffix: Option<Box<Token>>,
  pub seen_newline: bool,
}

impl Token {
  #[must_use] pub fn keyword(&self) -> Option<Keyword> {
    if let TokenKind::Keyword(k) = self.kind { Some(k) } else { None }
  }
}

struct Lexer<'a> {
  file: FileId,
  src: &'a [u8],
  pos: usize,
  line: u32,
  column: u32,
  pending_newline: bool,
  tokens: Vec<Token>,
  errors: Vec<Diagnostic>,
}

fn is_ident_start(b: u8) -> bool { b.is_ascii_alphabetic() || b == b'_' }
fn is_ident_cont(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' }

impl<'a> Lexer<'a> {
  fn new(file: FileId, src: &'a str) -> Self {
    Self {
      file, src: src.as_bytes(), pos: 0, line: 1, column: 1,
      pending_newline: false, tokens: Vec::new(), errors: Vec::new(),
    }
  }

  fn peek(&self) -> Option<u8> { self.src.get(self.pos).copied() }
  fn peek_at(&self, off: usize) -> Option<u8> { self.src.get(self.pos + off).copied() }

  fn pos_here(&self) -> Position {
    Position { file: self.file, line: self.line, column: self.column, index: u32::try_from(self.pos).expect("file too large") }
  }

  fn advance(&mut self) -> Option<u8> {
    let b = self.peek()?;
    self.pos += 1;
    if b == b'\n' {
      self.line += 1;
      self.column = 1;
      self.pending_newline = true;
    } else {
      self.column += 1;
    }
    Some(b)
  }

  fn text(&self, start: usize) -> Box<str> {
    String::from_utf8_lossy(&self.src[start..self.pos]).into_owned().into_boxed_str()
  }

  fn push(&mut self, kind: TokenKind, start: Position, start_idx: usize) {
    let span = Span { start, end: self.pos_here() };
    let seen_newline = std::mem::take(&mut self.pending_newline);
    let text = self.text(start_idx);
    let suffix = self.maybe_suffix(kind);
    self.tokens.push(Token { kind, span, text, suffix, seen_newline });
  }

  /// After a numeric literal, if the next byte looks like a type suffix
  /// (`u`, `i`, `f` followed by an identifier), consume it as a sub-token.
  fn maybe_suffix(&mut self, kind: TokenKind) -> Option<Box<Token>> {
    if !matches!(kind, TokenKind::IntLiteral | TokenKind::FloatLiteral) {
      return None;
    }
    match self.peek() {
      Some(b'u') | Some(b'i') | Some(b'f') if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {}
      _ => return None,
    }
    let start = self.pos_here();
    let start_idx = self.pos;
    self.advance();
    while self.peek().is_some_and(is_ident_cont) { self.advance(); }
    let span = Span { start, end: self.pos_here() };
    let text = self.text(start_idx);
    Some(Box::new(Token { kind: TokenKind::Identifier, span, text, suffix: None, seen_newline: false }))
  }

  fn skip_trivia(&mut self) {
    loop {
      match self.peek() {
        Some(b) if b == b' ' || b == b'\t' || b == b'\r' || b == b'\n' => { self.advance(); }
        Some(b'/') if self.peek_at(1) == Some(b'/') => {
          while self.peek().is_some_and(|b| b != b'\n') { self.advance(); }
        }
        _ => break,
      }
    }
  }

  fn lex_number(&mut self) {
    let start = self.pos_here();
    let start_idx = self.pos;
    let mut is_float = false;
    if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
      self.advance(); self.advance();
      while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) { self.advance(); }
    } else if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'b') | Some(b'B')) {
      self.advance(); self.advance();
      while matches!(self.peek(), Some(b'0') | Some(b'1')) { self.advance(); }
    } else {
      while self.peek().is_some_and(|b| b.is_ascii_digit()) { self.advance(); }
      if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
        is_float = true;
        self.advance();
        while self.peek().is_some_and(|b| b.is_ascii_digit()) { self.advance(); }
      }
    }
    let kind = if is_float { TokenKind::FloatLiteral } else { TokenKind::IntLiteral };
    self.push(kind, start, start_idx);
  }

  fn lex_ident(&mut self) {
    let start = self.pos_here();
    let start_idx = self.pos;
    while self.peek().is_some_and(is_ident_cont) { self.advance(); }
    let text = std::str::from_utf8(&self.src[start_idx..self.pos]).unwrap_or("");
    let kind = Keyword::from_str(text).map_or(TokenKind::Identifier, TokenKind::Keyword);
    self.push(kind, start, start_idx);
  }

  fn lex_char(&mut self) {
    let start = self.pos_here();
    let start_idx = self.pos;
    self.advance(); // opening quote
    if self.peek() == Some(b'\\') { self.advance(); self.advance(); } else { self.advance(); }
    if self.peek() == Some(b'\'') {
      self.advance();
    } else {
      self.errors.push(Diagnostic::standard(
        Span { start, end: self.pos_here() }, "unterminated character literal"));
    }
    self.push(TokenKind::CharLiteral, start, start_idx);
  }

  fn lex_string(&mut self, format: bool) {
    let start = self.pos_here();
    let start_idx = self.pos;
    if format { self.advance(); } // the leading `f` of f"..."
    let quote = self.peek();
    self.advance(); // opening quote/backtick
    let backtick = quote == Some(b'`');
    loop {
      match self.peek() {
        None => {
          self.errors.push(Diagnostic::standard(
            Span { start, end: self.pos_here() }, "unterminated string literal"));
          break;
        }
        Some(b'\\') => { self.advance(); self.advance(); }
        Some(b) if (backtick && b == b'`') || (!backtick && b == b'"') => { self.advance(); break; }
        Some(_) => { self.advance(); }
      }
    }
    let kind = if format || backtick { TokenKind::FormatStringLiteral } else { TokenKind::StringLiteral };
    self.push(kind, start, start_idx);
  }

  /// Maximal-munch operator/punctuation scan.
  fn lex_operator(&mut self) {
    let start = self.pos_here();
    let start_idx = self.pos;
    macro_rules! two {
      ($a:expr, $b:expr, $then:expr, $else_:expr) => {
        if self.peek_at(1) == Some($b) { self.advance(); self.advance(); $then }
        else { self.advance(); $else_ }
      }
    }
    let b0 = self.peek().expect("lex_operator called at EOF");
    let kind = match b0 {
      b'(' => { self.advance(); TokenKind::LParen }
      b')' => { self.advance(); TokenKind::RParen }
      b'{' => { self.advance(); TokenKind::LBrace }
      b'}' => { self.advance(); TokenKind::RBrace }
      b'[' => { self.advance(); TokenKind::LBracket }
      b']' => { self.advance(); TokenKind::RBracket }
      b',' => { self.advance(); TokenKind::Comma }
      b';' => { self.advance(); TokenKind::Semicolon }
      b'.' => { self.advance(); TokenKind::Dot }
      b'@' => { self.advance(); TokenKind::At }
      b'?' => { self.advance(); TokenKind::Question }
      b'~' => { self.advance(); TokenKind::Tilde }
      b':' => two!(b':', b':', TokenKind::ColonColon, TokenKind::Colon),
      b'=' => {
        if self.peek_at(1) == Some(b'=') { self.advance(); self.advance(); TokenKind::EqEq }
        else if self.peek_at(1) == Some(b'>') { self.advance(); self.advance(); TokenKind::FatArrow }
        else { self.advance(); TokenKind::Eq }
      }
      b'!' => two!(b'!', b'=', TokenKind::BangEq, TokenKind::Bang),
      b'<' => two!(b'<', b'=', TokenKind::Le, TokenKind::Lt),
      b'>' => two!(b'>', b'=', TokenKind::Ge, TokenKind::Gt),
      b'+' => two!(b'+', b'=', TokenKind::PlusEq, TokenKind::Plus),
      b'-' => {
        if self.peek_at(1) == Some(b'=') { self.advance(); self.advance(); TokenKind::MinusEq }
        else if self.peek_at(1) == Some(b'>') { self.advance(); self.advance(); TokenKind::Arrow }
        else { self.advance(); TokenKind::Minus }
      }
      b'*' => two!(b'*', b'=', TokenKind::StarEq, TokenKind::Star),
      b'/' => two!(b'/', b'=', TokenKind::SlashEq, TokenKind::Slash),
      b'%' => two!(b'%', b'=', TokenKind::PercentEq, TokenKind::Percent),
      b'^' => two!(b'^', b'=', TokenKind::CaretEq, TokenKind::Caret),
      b'&' => {
        if self.peek_at(1) == Some(b'&') { self.advance(); self.advance(); TokenKind::AmpAmp }
        else if self.peek_at(1) == Some(b'=') { self.advance(); self.advance(); TokenKind::AmpEq }
        else { self.advance(); TokenKind::Amp }
      }
      b'|' => {
        if self.peek_at(1) == Some(b'|') { self.advance(); self.advance(); TokenKind::PipePipe }
        else if self.peek_at(1) == Some(b'=') { self.advance(); self.advance(); TokenKind::PipeEq }
        else { self.advance(); TokenKind::Pipe }
      }
      _ => {
        self.advance();
        self.errors.push(Diagnostic::standard(
          Span { start, end: self.pos_here() },
          format!("unrecognized character {:?}", b0 as char)));
        self.push(TokenKind::Eof, start, start_idx);
        return;
      }
    };
    self.push(kind, start, start_idx);
  }

  fn run(&mut self) {
    loop {
      self.skip_trivia();
      let Some(b) = self.peek() else { break };
      if is_ident_start(b) {
        if b == b'f' && self.peek_at(1) == Some(b'"') {
          self.lex_string(true);
        } else {
          self.lex_ident();
        }
      } else if b.is_ascii_digit() {
        self.lex_number();
      } else if b == b'\'' {
        self.lex_char();
      } else if b == b'"' || b == b'`' {
        self.lex_string(false);
      } else {
        self.lex_operator();
      }
    }
    let eof_pos = self.pos_here();
    let seen_newline = std::mem::take(&mut self.pending_newline);
    self.tokens.push(Token {
      kind: TokenKind::Eof,
      span: Span::point(eof_pos),
      text: Box::from(""),
      suffix: None,
      seen_newline,
    });
  }
}

/// Lex a full source file into a terminated token sequence (EOF last) and
/// a parallel list of recoverable errors (spec.md §4.1).
#[must_use] pub fn lex(src: &str, file: FileId) -> (Vec<Token>, Vec<Diagnostic>) {
  let mut lexer = Lexer::new(file, src);
  lexer.run();
  (lexer.tokens, lexer.errors)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    lex(src, FileId::new(0)).0.into_iter().map(|t| t.kind).collect()
  }

  #[test]
  fn determinism() {
    let (a, ea) = lex("def f(x: i32): i32 => x + 1", FileId::new(0));
    let (b, eb) = lex("def f(x: i32): i32 => x + 1", FileId::new(0));
    assert_eq!(a.len(), b.len());
    assert_eq!(ea.len(), eb.len());
    for (x, y) in a.iter().zip(&b) { assert_eq!(x.kind, y.kind); assert_eq!(x.text, y.text); }
  }

  #[test]
  fn keyword_vs_identifier() {
    assert_eq!(kinds("def"), vec![TokenKind::Keyword(Keyword::Def), TokenKind::Eof]);
    assert_eq!(kinds("define"), vec![TokenKind::Identifier, TokenKind::Eof]);
  }

  #[test]
  fn shift_operators_lex_as_adjacent_lt_gt_pairs() {
    // The lexer never merges `<<`/`>>` into a single token kind: each
    // `<`/`>` is its own token, and it's the parser that folds an
    // *adjacent* pair back into a shift (spec.md §4.2, §9) so that
    // `Foo<Bar>` specialization stays unambiguous at the token level.
    assert_eq!(kinds("a<<b"), vec![
      TokenKind::Identifier, TokenKind::Lt, TokenKind::Lt, TokenKind::Identifier, TokenKind::Eof]);
    assert_eq!(kinds("a>>b"), vec![
      TokenKind::Identifier, TokenKind::Gt, TokenKind::Gt, TokenKind::Identifier, TokenKind::Eof]);
    let (toks, _) = lex("a<<b", FileId::new(0));
    assert!(toks[1].span.adjacent(toks[2].span));
  }

  #[test]
  fn numeric_suffix_attached_as_subtoken() {
    let (toks, _) = lex("1u32", FileId::new(0));
    assert_eq!(toks[0].kind, TokenKind::IntLiteral);
    let suffix = toks[0].suffix.as_ref().expect("suffix token");
    assert_eq!(&*suffix.text, "u32");
  }

  #[test]
  fn hex_and_binary_literals() {
    assert_eq!(kinds("0xFF 0b101"), vec![
      TokenKind::IntLiteral, TokenKind::IntLiteral, TokenKind::Eof]);
  }

  #[test]
  fn format_string_is_distinct_kind() {
    assert_eq!(kinds(r#"f"x={1}""#), vec![TokenKind::FormatStringLiteral, TokenKind::Eof]);
    assert_eq!(kinds("`x`"), vec![TokenKind::FormatStringLiteral, TokenKind::Eof]);
  }

  #[test]
  fn unterminated_string_is_recoverable() {
    let (toks, errs) = lex("\"abc", FileId::new(0));
    assert_eq!(toks[0].kind, TokenKind::StringLiteral);
    assert_eq!(errs.len(), 1);
  }

  #[test]
  fn seen_newline_flag_on_next_token() {
    let (toks, _) = lex("a\nb", FileId::new(0));
    assert!(!toks[0].seen_newline);
    assert!(toks[1].seen_newline);
  }

  #[test]
  fn span_monotonicity() {
    let (toks, _) = lex("let x: i32 = 1 + 2", FileId::new(0));
    for w in toks.windows(2) {
      assert!(w[0].span.start.index <= w[0].span.end.index);
      assert!(w[0].span.end.index <= w[1].span.start.index);
    }
  }
}
