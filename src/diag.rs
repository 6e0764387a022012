//! The error model (spec.md §7). Three diagnostic shapes, all accumulated
//! rather than thrown; only display/formatting is this crate's concern
//! for the CLI-level pretty-printer to consume.

use std::fmt;
use crate::span::Span;

/// How much detail a diagnostic should be rendered with (`-e0/1/2`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
  /// Message only.
  Terse,
  /// Message plus primary span (the default).
  Normal,
  /// Message plus every span and note/hint this diagnostic carries.
  Verbose,
}

impl Default for DetailLevel {
  fn default() -> Self { DetailLevel::Normal }
}

/// A single accumulated diagnostic. Never thrown: passes push these onto
/// [`crate::program::Program::errors`] and keep going.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
  /// One span, one message.
  Standard { span: Span, message: String },
  /// One span, one message, plus a free-form note.
  WithNote { span: Span, message: String, note: String },
  /// A primary span/message plus a secondary span/message (e.g. "previous
  /// definition here").
  WithHint { span: Span, message: String, hint_span: Span, hint: String },
}

impl Diagnostic {
  #[must_use] pub fn standard(span: Span, message: impl Into<String>) -> Self {
    Diagnostic::Standard { span, message: message.into() }
  }

  #[must_use] pub fn with_note(span: Span, message: impl Into<String>, note: impl Into<String>) -> Self {
    Diagnostic::WithNote { span, message: message.into(), note: note.into() }
  }

  #[must_use] pub fn with_hint(
    span: Span, message: impl Into<String>, hint_span: Span, hint: impl Into<String>,
  ) -> Self {
    Diagnostic::WithHint { span, message: message.into(), hint_span, hint: hint.into() }
  }

  /// The diagnostic's primary span.
  #[must_use] pub fn span(&self) -> Span {
    match *self {
      Diagnostic::Standard { span, .. }
      | Diagnostic::WithNote { span, .. }
      | Diagnostic::WithHint { span, .. } => span,
    }
  }

  /// The primary message text.
  #[must_use] pub fn message(&self) -> &str {
    match self {
      Diagnostic::Standard { message, .. }
      | Diagnostic::WithNote { message, .. }
      | Diagnostic::WithHint { message, .. } => message,
    }
  }

  /// Render at the given detail level. This is the one sliver of
  /// error-display formatting this crate owns (spec.md §7); a CLI-level
  /// collaborator is free to do something fancier with the same data.
  #[must_use] pub fn render(&self, level: DetailLevel) -> String {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = write!(out, "{}", self.message());
    if level == DetailLevel::Terse {
      return out;
    }
    let _ = write!(out, " at {:?}:{}:{}", self.span().start.file, self.span().start.line, self.span().start.column);
    if level < DetailLevel::Verbose {
      return out;
    }
    match self {
      Diagnostic::WithNote { note, .. } => { let _ = write!(out, "\n  note: {note}"); }
      Diagnostic::WithHint { hint_span, hint, .. } => {
        let _ = write!(out, "\n  {hint} at {:?}:{}:{}", hint_span.start.file, hint_span.start.line, hint_span.start.column);
      }
      Diagnostic::Standard { .. } => {}
    }
    out
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render(DetailLevel::Verbose))
  }
}

/// Default for `OCEN_NUM_ERRORS` (spec.md §7): only the most recent N
/// errors are displayed.
pub const DEFAULT_NUM_ERRORS: usize = 10;

/// Read the `OCEN_NUM_ERRORS` environment override, falling back to
/// [`DEFAULT_NUM_ERRORS`]. This is the only place in the pipeline that
/// reads the environment directly; it happens at render time, not at
/// pass time (see SPEC_FULL.md's Configuration section).
#[must_use] pub fn num_errors_to_show() -> usize {
  std::env::var("OCEN_NUM_ERRORS").ok()
    .and_then(|s| s.parse().ok())
    .unwrap_or(DEFAULT_NUM_ERRORS)
}

/// Render the tail of an error list, governed by `OCEN_NUM_ERRORS`.
#[must_use] pub fn render_errors(errors: &[Diagnostic], level: DetailLevel) -> String {
  let n = num_errors_to_show();
  let start = errors.len().saturating_sub(n);
  errors[start..].iter().map(|d| d.render(level)).collect::<Vec<_>>().join("\n")
}
