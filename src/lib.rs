//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces tokens on demand.
//! - `parser` owns all syntactic knowledge and builds the AST, accumulating
//!   positioned errors with panic-mode recovery.
//! - `semantic` resolves names against a lexical scope stack and checks
//!   types, annotating the tree.
//! - `codegen` lowers the analyzed tree into x86-64 System V assembly.
//! - `error` centralises the diagnostic types shared by the stages.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod semantic;
pub mod tokenizer;
pub mod ty;

pub use error::{CompileError, CompileResult, Diagnostic};

use codegen::CodeGen;
use parser::Parser;
use semantic::SemanticAnalyzer;
use snafu::ensure;
use tokenizer::Tokenizer;

/// Compile a TinyC source string into AT&T assembly text.
///
/// The pipeline stops after any stage that reports errors; the returned
/// error carries that stage's accumulated diagnostics.
pub fn compile(source: &str) -> CompileResult<String> {
  let tokenizer = Tokenizer::new(source);
  let mut parser = Parser::new(tokenizer);
  let mut program = parser.parse_program();
  ensure!(
    !parser.has_errors(),
    error::ParseSnafu {
      diagnostics: parser.into_diagnostics()
    }
  );

  let mut analyzer = SemanticAnalyzer::new();
  analyzer.analyze(&mut program);
  ensure!(
    !analyzer.has_errors(),
    error::SemanticSnafu {
      diagnostics: analyzer.into_diagnostics()
    }
  );

  Ok(CodeGen::new().generate(&program))
}
