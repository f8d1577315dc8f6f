//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns a function AST with locals.
//! - `codegen` lowers the parsed function into x86-64 AT&T assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod tokenizer;

use tracing::debug;

pub use ast::Function;
pub use error::{CompileError, CompileResult};

/// What the compiler prints for a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emit {
  /// x86-64 assembly text.
  #[default]
  Asm,
  /// The parsed program as an S-expression.
  Ast,
}

/// Tokenize and parse a source string.
pub fn parse_program(source: &str) -> CompileResult<Function> {
  let tokens = tokenizer::tokenize(source)?;
  debug!(tokens = tokens.len(), "tokenized input");
  parser::parse(tokens, source)
}

/// Compile a source string into AT&T assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let mut program = parse_program(source)?;
  codegen::generate(&mut program)
}

/// Run the pipeline up to the requested output.
pub fn compile(source: &str, emit: Emit) -> CompileResult<String> {
  match emit {
    Emit::Asm => generate_assembly(source),
    Emit::Ast => parse_program(source).map(|program| program.render() + "\n"),
  }
}
