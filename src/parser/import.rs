//! `import` statement grammar and the directory-walking resolution
//! algorithm (spec.md §4.2, §6).

use std::path::PathBuf;

use crate::diag::Diagnostic;
use crate::idx::Idx;
use crate::lexer::{Keyword, TokenKind};
use crate::loader::FileLoader;
use crate::span::{FileId, Position, Span};
use crate::symbol::Symbol;
use crate::types::ast::{ImportItem, ImportStmt, NodeKind};
use crate::types::NamespaceId;

use super::{PResult, Parser};

fn synthetic_span() -> Span {
  Span::point(Position { file: FileId::new(0), line: 0, column: 0, index: 0 })
}

/// Walk `segments` under `start_dir`: a directory-named segment descends
/// into it; a segment matching `name.oc` loads that file and stops the
/// walk (remaining segments, if any, are item names inside it, not
/// further path components). Returns the `.oc` file path found and how
/// many leading segments were consumed to reach it.
///
/// Pure and loader-generic so spec.md §6's algorithm is testable without
/// touching the real filesystem (see `MemoryLoader` in `crate::loader`).
pub fn resolve_import(
  loader: &dyn FileLoader, mut dir: PathBuf, segments: &[Symbol],
) -> Result<(PathBuf, usize), usize> {
  if segments.is_empty() {
    return Err(0);
  }
  for (i, seg) in segments.iter().enumerate() {
    let name = seg.as_str();
    let as_dir = dir.join(name);
    if loader.is_dir(&as_dir) {
      dir = as_dir;
      continue;
    }
    let as_file = dir.join(format!("{name}.oc"));
    if loader.is_file(&as_file) {
      return Ok((as_file, i + 1));
    }
    return Err(i);
  }
  Err(segments.len() - 1)
}

impl<'p> Parser<'p> {
  pub(super) fn parse_import(&mut self, ns: NamespaceId) -> PResult<()> {
    let start = self.cur_span();
    self.advance(); // 'import'

    let mut force_root = self.eat(TokenKind::At);
    let mut leading_dots = 0u32;
    while self.eat(TokenKind::Dot) {
      leading_dots += 1;
    }

    let mut base_path = Vec::new();
    loop {
      let (seg, _) = self.expect_ident()?;
      if base_path.is_empty() && seg.as_str() == "std" {
        force_root = true;
      }
      base_path.push(seg);
      let next_is_item_list = matches!(
        self.tokens.get(self.pos + 1).map(|t| t.kind),
        Some(TokenKind::LBrace) | Some(TokenKind::Star)
      );
      if self.check(TokenKind::ColonColon) && !next_is_item_list {
        self.advance();
        continue;
      }
      if self.check(TokenKind::ColonColon) {
        self.advance();
      }
      break;
    }

    let mut items = Vec::new();
    if self.eat(TokenKind::Star) {
      items.push(ImportItem::Wildcard { span: self.cur_span() });
    } else if self.eat(TokenKind::LBrace) {
      loop {
        let item_start = self.cur_span();
        let (first, _) = self.expect_ident()?;
        let mut path = vec![first];
        while self.eat(TokenKind::ColonColon) {
          let (p, _) = self.expect_ident()?;
          path.push(p);
        }
        let alias = if self.eat_keyword(Keyword::As) { Some(self.expect_ident()?.0) } else { None };
        let span = item_start.join(self.cur_span());
        items.push(ImportItem::Single { path, alias, span });
        if !self.eat(TokenKind::Comma) { break; }
      }
      self.expect(TokenKind::RBrace, "'}'")?;
    } else {
      let last = *base_path.last().expect("at least one path segment");
      let alias = if self.eat_keyword(Keyword::As) { Some(self.expect_ident()?.0) } else { None };
      items.push(ImportItem::Single { path: vec![last], alias, span: start });
    }
    self.eat_statement_terminator();

    let segments = base_path.clone();
    let stmt = ImportStmt { leading_dots, force_root, base_path, items };
    let node = self.push_node(start, NodeKind::Import(stmt));
    self.prog.namespaces[ns].imports.push(node);

    self.load_import_target(start, force_root, leading_dots, &segments);
    Ok(())
  }

  /// Resolve and (recursively) load the file an `import` refers to,
  /// registering it as a namespace reachable from the global root. Load
  /// failures become diagnostics, not fatal errors (spec.md §7): a
  /// missing import shouldn't stop the rest of the file from parsing.
  fn load_import_target(&mut self, span: Span, force_root: bool, leading_dots: u32, segments: &[Symbol]) {
    if segments.is_empty() {
      return;
    }
    let mut start_dir = if force_root { self.root_dir.clone() } else { self.cur_dir.clone() };
    for _ in 0..leading_dots {
      start_dir = start_dir.parent().map(std::path::Path::to_path_buf).unwrap_or_default();
    }
    match resolve_import(self.loader, start_dir.clone(), segments) {
      Ok((file_path, consumed)) => {
        let file_dir = file_path.parent().map(std::path::Path::to_path_buf).unwrap_or(start_dir);
        let file_name = file_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let target_ns = self.namespace_for_path(&segments[..consumed]);
        if !self.prog.namespaces[target_ns].is_file {
          super::load_file(self.prog, self.loader, self.root_dir.clone(), file_dir, file_name, target_ns, false);
        }
      }
      Err(bad_idx) => {
        let missing = segments[bad_idx].as_str();
        self.prog.error(Diagnostic::standard(span, format!("no such import path segment '{missing}'")));
      }
    }
  }

  /// Ensure (creating if needed) a chain of child namespaces under the
  /// global namespace mirroring `segments`, so a resolved import target
  /// is reachable the same way whether or not it was already loaded by
  /// an earlier `import` of a sibling item.
  fn namespace_for_path(&mut self, segments: &[Symbol]) -> NamespaceId {
    let mut cur = self.prog.global;
    for &seg in segments {
      cur = self.new_or_existing_child(cur, seg, synthetic_span());
    }
    cur
  }
}
