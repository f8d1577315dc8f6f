//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are kept lightweight on purpose – these routines format
//! messages in a style reminiscent of chibicc, pointing at the offending
//! byte with a caret under the source line that contains it.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// A diagnostic anchored at a byte offset of the source buffer.
  #[snafu(display("{source_line}\n{}^ {message}", " ".repeat(*column)))]
  WithLocation {
    source_line: String,
    column: usize,
    loc: usize,
    message: String,
  },

  /// A generator contract violation; well-formed parses never produce one.
  #[snafu(display("{message}"))]
  Internal { message: String },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let loc = clamp_to_boundary(source, loc);
    let line_start = source[..loc].rfind('\n').map_or(0, |nl| nl + 1);
    let line_end = source[loc..]
      .find('\n')
      .map_or(source.len(), |nl| loc + nl);
    let column = source[line_start..loc].chars().count();
    Self::WithLocation {
      source_line: source[line_start..line_end].to_string(),
      column,
      loc,
      message: message.into(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// Byte offset of a positioned diagnostic.
  pub fn loc(&self) -> Option<usize> {
    match self {
      Self::WithLocation { loc, .. } => Some(*loc),
      Self::Internal { .. } => None,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::WithLocation { message, .. } | Self::Internal { message } => message,
    }
  }
}

fn clamp_to_boundary(source: &str, loc: usize) -> usize {
  let mut loc = loc.min(source.len());
  while !source.is_char_boundary(loc) {
    loc -= 1;
  }
  loc
}
