//! Shared error utilities used across the compilation pipeline.
//!
//! Each stage accumulates positioned [`Diagnostic`]s and keeps going via its
//! own recovery discipline; the pipeline stops between stages when a stage
//! reports any. [`CompileError`] is the coarse result the driver sees.

use snafu::Snafu;
use std::fmt;

pub type CompileResult<T> = Result<T, CompileError>;

/// A single positioned message from one stage.
///
/// `line`/`column` are 1-based and point at the first character of the
/// offending token. `context` names the enclosing function where one is
/// known (semantic analysis fills it in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub message: String,
  pub line: usize,
  pub column: usize,
  pub context: Option<String>,
}

impl Diagnostic {
  pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
    Self {
      message: message.into(),
      line,
      column,
      context: None,
    }
  }

  pub fn in_context(mut self, context: impl Into<String>) -> Self {
    self.context = Some(context.into());
    self
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.line > 0 {
      write!(f, " at line {}, column {}", self.line, self.column)?;
    }
    if let Some(context) = &self.context {
      write!(f, " in {context}")?;
    }
    write!(f, ": {}", self.message)
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  #[snafu(display("parsing failed with {} error(s)", diagnostics.len()))]
  Parse { diagnostics: Vec<Diagnostic> },

  #[snafu(display("semantic analysis failed with {} error(s)", diagnostics.len()))]
  Semantic { diagnostics: Vec<Diagnostic> },
}

impl CompileError {
  /// Diagnostics carried by the failing stage.
  pub fn diagnostics(&self) -> &[Diagnostic] {
    match self {
      CompileError::Parse { diagnostics } | CompileError::Semantic { diagnostics } => diagnostics,
    }
  }

  /// Stage name used as the prefix of user-visible diagnostic lines.
  pub fn stage(&self) -> &'static str {
    match self {
      CompileError::Parse { .. } => "Parse",
      CompileError::Semantic { .. } => "Semantic",
    }
  }
}
