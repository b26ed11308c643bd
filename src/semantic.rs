//! Semantic analysis: scope-aware name resolution and type checking.
//!
//! Analysis runs in two passes over the program node. The first pass
//! declares every top-level function so bodies can call forward; the second
//! walks bodies and global variables in order, checking types against the
//! nominal rules and annotating every expression node with its type. Errors
//! are collected per node and analysis keeps going, so one bad statement
//! does not hide the next one.

use crate::ast::{AstNode, BinaryOp, Pos, UnaryOp};
use crate::error::Diagnostic;
use crate::ty::DataType;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
  Variable,
  Function,
  Parameter,
}

/// Extra payload carried by function symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
  pub parameter_types: Vec<DataType>,
  /// True when the declaration had a body.
  pub defined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
  pub name: String,
  pub kind: SymbolKind,
  pub data_type: DataType,
  pub scope_level: usize,
  pub function_info: Option<FunctionInfo>,
}

impl Symbol {
  pub fn new(name: impl Into<String>, kind: SymbolKind, data_type: DataType) -> Self {
    Self {
      name: name.into(),
      kind,
      data_type,
      scope_level: 0,
      function_info: None,
    }
  }
}

/// One lexical scope: a name → symbol map plus its depth in the stack.
#[derive(Debug)]
struct Scope {
  symbols: HashMap<String, Symbol>,
  level: usize,
}

/// Stack of scopes; the innermost scope is the last element. Lookup walks
/// outward so inner declarations shadow outer ones.
#[derive(Debug)]
pub struct ScopeStack {
  scopes: Vec<Scope>,
}

impl ScopeStack {
  /// Start with the global scope (level 0) already in place.
  pub fn new() -> Self {
    Self {
      scopes: vec![Scope {
        symbols: HashMap::new(),
        level: 0,
      }],
    }
  }

  pub fn push(&mut self) {
    let level = self.scopes.len();
    self.scopes.push(Scope {
      symbols: HashMap::new(),
      level,
    });
  }

  pub fn pop(&mut self) {
    if self.scopes.len() > 1 {
      self.scopes.pop();
    }
  }

  pub fn level(&self) -> usize {
    self.scopes.len() - 1
  }

  /// Declare a symbol in the innermost scope. Fails when the name is
  /// already bound in that scope; shadowing an outer binding is fine.
  pub fn declare(&mut self, mut symbol: Symbol) -> bool {
    let scope = match self.scopes.last_mut() {
      Some(scope) => scope,
      None => return false,
    };
    if scope.symbols.contains_key(&symbol.name) {
      return false;
    }
    symbol.scope_level = scope.level;
    scope.symbols.insert(symbol.name.clone(), symbol);
    true
  }

  /// Resolve a name, innermost scope first.
  pub fn lookup(&self, name: &str) -> Option<&Symbol> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.symbols.get(name))
  }
}

impl Default for ScopeStack {
  fn default() -> Self {
    Self::new()
  }
}

/// Return type and name of the function whose body is being analyzed.
struct FunctionContext {
  name: String,
  return_type: DataType,
}

pub struct SemanticAnalyzer {
  scopes: ScopeStack,
  diagnostics: Vec<Diagnostic>,
  current_function: Option<FunctionContext>,
}

impl SemanticAnalyzer {
  pub fn new() -> Self {
    Self {
      scopes: ScopeStack::new(),
      diagnostics: Vec::new(),
      current_function: None,
    }
  }

  pub fn has_errors(&self) -> bool {
    !self.diagnostics.is_empty()
  }

  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  pub fn into_diagnostics(self) -> Vec<Diagnostic> {
    self.diagnostics
  }

  fn error(&mut self, message: impl Into<String>, pos: Pos) {
    let mut diagnostic = Diagnostic::new(message, pos.line, pos.column);
    if let Some(function) = &self.current_function {
      diagnostic = diagnostic.in_context(function.name.clone());
    }
    self.diagnostics.push(diagnostic);
  }

  /// Analyze a whole program. Returns `true` when no errors were reported.
  pub fn analyze(&mut self, program: &mut AstNode) -> bool {
    let AstNode::Program { declarations, .. } = program else {
      return false;
    };

    // First pass: declare every top-level function for forward references.
    for declaration in declarations.iter() {
      if let AstNode::FunctionDecl {
        return_type,
        name,
        parameters,
        body,
        pos,
        ..
      } = declaration
      {
        let parameter_types = parameters
          .iter()
          .filter_map(|param| match param {
            AstNode::Parameter { param_type, .. } => Some(*param_type),
            _ => None,
          })
          .collect();

        let mut symbol = Symbol::new(name.clone(), SymbolKind::Function, *return_type);
        symbol.function_info = Some(FunctionInfo {
          parameter_types,
          defined: body.is_some(),
        });

        if !self.scopes.declare(symbol) {
          self.error(format!("Function '{name}' already declared"), *pos);
        }
      }
    }

    // Second pass: function bodies and global variables, in program order.
    for declaration in declarations.iter_mut() {
      match declaration {
        AstNode::FunctionDecl { .. } => self.analyze_function_decl(declaration),
        AstNode::VariableDecl { .. } => self.analyze_variable_decl(declaration),
        _ => {}
      }
    }

    !self.has_errors()
  }

  fn analyze_function_decl(&mut self, node: &mut AstNode) {
    let AstNode::FunctionDecl {
      return_type,
      name,
      parameters,
      body,
      ..
    } = node
    else {
      return;
    };

    let Some(body) = body else {
      return; // prototype only
    };

    self.scopes.push();

    for parameter in parameters.iter() {
      if let AstNode::Parameter {
        param_type,
        name: param_name,
        pos,
        ..
      } = parameter
      {
        let symbol = Symbol::new(param_name.clone(), SymbolKind::Parameter, *param_type);
        if !self.scopes.declare(symbol) {
          let message = format!("Parameter '{param_name}' already declared");
          self.error(message, *pos);
        }
      }
    }

    self.current_function = Some(FunctionContext {
      name: name.clone(),
      return_type: *return_type,
    });

    self.analyze_statement(body);

    self.scopes.pop();
    self.current_function = None;
  }

  fn analyze_variable_decl(&mut self, node: &mut AstNode) {
    let AstNode::VariableDecl {
      var_type,
      name,
      initializer,
      pos,
      ..
    } = node
    else {
      return;
    };
    let (var_type, name, pos) = (*var_type, name.clone(), *pos);

    let symbol = Symbol::new(name.clone(), SymbolKind::Variable, var_type);
    if !self.scopes.declare(symbol) {
      self.error(format!("Variable '{name}' already declared"), pos);
    }

    if let Some(initializer) = initializer {
      let init_type = self.analyze_expression(initializer);
      if var_type != init_type {
        let message = format!(
          "Cannot initialize variable '{name}' of type '{var_type}' \
           with expression of type '{init_type}'"
        );
        let init_pos = initializer.pos();
        self.error(message, init_pos);
      }
    }
  }

  // ----- Statements -----

  fn analyze_statement(&mut self, node: &mut AstNode) {
    match node {
      AstNode::CompoundStmt { statements, .. } => {
        self.scopes.push();
        for statement in statements.iter_mut() {
          self.analyze_statement(statement);
        }
        self.scopes.pop();
      }
      AstNode::IfStmt {
        condition,
        then_stmt,
        else_stmt,
        ..
      } => {
        let cond_type = self.analyze_expression(condition);
        if !cond_type.is_numeric() {
          let pos = condition.pos();
          self.error("If condition must be boolean expression", pos);
        }
        self.analyze_statement(then_stmt);
        if let Some(else_stmt) = else_stmt {
          self.analyze_statement(else_stmt);
        }
      }
      AstNode::WhileStmt {
        condition, body, ..
      } => {
        let cond_type = self.analyze_expression(condition);
        if !cond_type.is_numeric() {
          let pos = condition.pos();
          self.error("While condition must be boolean expression", pos);
        }
        self.analyze_statement(body);
      }
      AstNode::ForStmt {
        init,
        condition,
        update,
        body,
        ..
      } => {
        self.scopes.push();
        if let Some(init) = init {
          self.analyze_statement(init);
        }
        if let Some(condition) = condition {
          let cond_type = self.analyze_expression(condition);
          if !cond_type.is_numeric() {
            let pos = condition.pos();
            self.error("For condition must be boolean expression", pos);
          }
        }
        if let Some(update) = update {
          self.analyze_expression(update);
        }
        self.analyze_statement(body);
        self.scopes.pop();
      }
      AstNode::ReturnStmt { value, pos, .. } => {
        let pos = *pos;
        self.analyze_return_stmt(value, pos);
      }
      AstNode::ExpressionStmt { expression, .. } => {
        if let Some(expression) = expression {
          self.analyze_expression(expression);
        }
      }
      AstNode::VariableDecl { .. } => self.analyze_variable_decl(node),
      _ => {}
    }
  }

  fn analyze_return_stmt(&mut self, value: &mut Option<Box<AstNode>>, pos: Pos) {
    let (function_name, expected) = match &self.current_function {
      Some(function) => (function.name.clone(), function.return_type),
      None => {
        self.error("Return statement outside of a function", pos);
        return;
      }
    };

    match value {
      Some(value) => {
        let value_type = self.analyze_expression(value);
        if value_type != expected {
          let message = format!(
            "Return type '{value_type}' does not match function return type '{expected}'"
          );
          let value_pos = value.pos();
          self.error(message, value_pos);
        }
      }
      None => {
        if expected != DataType::Void {
          self.error(format!("Function '{function_name}' must return a value"), pos);
        }
      }
    }
  }

  // ----- Expressions -----

  /// Infer and check the type of an expression, writing it back onto the
  /// node. Ill-typed expressions come out as `void`, which poisons their
  /// parents without cascading duplicate reports for every ancestor.
  fn analyze_expression(&mut self, node: &mut AstNode) -> DataType {
    let inferred = match node {
      AstNode::Number { .. } => DataType::Int,
      AstNode::String { .. } => DataType::CharPtr,
      AstNode::Identifier { name, pos, .. } => {
        let (name, pos) = (name.clone(), *pos);
        match self.scopes.lookup(&name) {
          Some(symbol) => symbol.data_type,
          None => {
            self.error(format!("Undefined identifier '{name}'"), pos);
            DataType::Void
          }
        }
      }
      AstNode::BinaryOp {
        op,
        left,
        right,
        pos,
        ..
      } => {
        let (op, pos) = (*op, *pos);
        let left_type = self.analyze_expression(left);
        let right_type = self.analyze_expression(right);
        match binary_result_type(op, left_type, right_type) {
          Some(result) => result,
          None => {
            let message = format!(
              "Cannot apply operator '{op}' to types '{left_type}' and '{right_type}'"
            );
            self.error(message, pos);
            DataType::Void
          }
        }
      }
      AstNode::UnaryOp {
        op, operand, pos, ..
      } => {
        let (op, pos) = (*op, *pos);
        let operand_type = self.analyze_expression(operand);
        match unary_result_type(op, operand_type) {
          Some(result) => result,
          None => {
            let message =
              format!("Cannot apply unary operator '{op}' to type '{operand_type}'");
            self.error(message, pos);
            DataType::Void
          }
        }
      }
      AstNode::FunctionCall { .. } => self.analyze_function_call(node),
      _ => DataType::Void,
    };

    node.set_data_type(inferred);
    inferred
  }

  fn analyze_function_call(&mut self, node: &mut AstNode) -> DataType {
    let AstNode::FunctionCall {
      name,
      arguments,
      pos,
      ..
    } = node
    else {
      return DataType::Void;
    };
    let (name, pos) = (name.clone(), *pos);

    let (return_type, parameter_types) = match self.scopes.lookup(&name) {
      None => {
        self.error(format!("Undefined function '{name}'"), pos);
        return DataType::Void;
      }
      Some(symbol) if symbol.kind != SymbolKind::Function => {
        self.error(format!("'{name}' is not a function"), pos);
        return DataType::Void;
      }
      Some(symbol) => {
        let parameter_types = symbol
          .function_info
          .as_ref()
          .map(|info| info.parameter_types.clone())
          .unwrap_or_default();
        (symbol.data_type, parameter_types)
      }
    };

    if arguments.len() != parameter_types.len() {
      let message = format!(
        "Function '{name}' expects {} arguments, got {}",
        parameter_types.len(),
        arguments.len()
      );
      self.error(message, pos);
      // Arity is already wrong; skip the per-argument comparison.
      for argument in arguments.iter_mut() {
        self.analyze_expression(argument);
      }
      return return_type;
    }

    for (index, argument) in arguments.iter_mut().enumerate() {
      let argument_type = self.analyze_expression(argument);
      let expected = parameter_types[index];
      if argument_type != expected {
        let message = format!(
          "Argument {} to function '{name}' has type '{argument_type}', expected '{expected}'",
          index + 1
        );
        let argument_pos = argument.pos();
        self.error(message, argument_pos);
      }
    }

    return_type
  }
}

impl Default for SemanticAnalyzer {
  fn default() -> Self {
    Self::new()
  }
}

/// Result type of a binary operator application, or `None` when the operand
/// types reject it. INT and CHAR mix freely in arithmetic and logic but are
/// distinct for assignment; comparisons only relate equal types.
fn binary_result_type(op: BinaryOp, left: DataType, right: DataType) -> Option<DataType> {
  match op {
    BinaryOp::Assign => (left == right).then_some(left),
    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
      (left.is_numeric() && right.is_numeric()).then_some(DataType::Int)
    }
    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
      (left == right).then_some(DataType::Int)
    }
    BinaryOp::And | BinaryOp::Or => {
      (left.is_numeric() && right.is_numeric()).then_some(DataType::Int)
    }
  }
}

fn unary_result_type(op: UnaryOp, operand: DataType) -> Option<DataType> {
  match op {
    UnaryOp::Plus | UnaryOp::Minus | UnaryOp::Not => operand.is_numeric().then_some(DataType::Int),
  }
}
