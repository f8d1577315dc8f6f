//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer is intentionally tiny – it knows nothing about semantics
//! beyond recognising identifiers, punctuators and numeric literals.
//! Multi-character punctuators are matched before single-character ones to
//! avoid ambiguity, and keywords are recognised in a separate pass once the
//! whole input has been scanned.

use crate::error::{CompileError, CompileResult};

const KEYWORDS: [&str; 1] = ["return"];

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Punctuator,
  Keyword,
  Num,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<i64>) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
    }
  }
}

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
  is_ident_start(c) || c.is_ascii_digit()
}

/// Length of the punctuator starting at `input`, or 0 if there is none.
fn read_punct(input: &str) -> usize {
  if ["==", "!=", "<=", ">="]
    .into_iter()
    .any(|op| input.starts_with(op))
  {
    return 2;
  }
  match input.as_bytes().first() {
    Some(c) if c.is_ascii_punctuation() => 1,
    _ => 0,
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    // Vertical tab counts as whitespace too.
    if c.is_ascii_whitespace() || c == b'\x0b' {
      i += 1;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<i64>()
        .map_err(|err| CompileError::at(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::new(TokenKind::Num, start, i - start, Some(value)));
      continue;
    }

    if is_ident_start(c) {
      let start = i;
      i += 1;
      while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
      }
      tokens.push(Token::new(TokenKind::Ident, start, i - start, None));
      continue;
    }

    let punct_len = read_punct(&input[i..]);
    if punct_len > 0 {
      tokens.push(Token::new(TokenKind::Punctuator, i, punct_len, None));
      i += punct_len;
      continue;
    }

    return Err(CompileError::at(input, i, "invalid token"));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, None));
  convert_keywords(&mut tokens, input);
  Ok(tokens)
}

/// Reclassify identifiers that spell a reserved word.
fn convert_keywords(tokens: &mut [Token], source: &str) {
  for token in tokens.iter_mut() {
    if token.kind == TokenKind::Ident && KEYWORDS.contains(&token_text(token, source)) {
      token.kind = TokenKind::Keyword;
    }
  }
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
