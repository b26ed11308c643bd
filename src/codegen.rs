//! Code generation: lower the analyzed AST into AT&T x86-64 assembly.
//!
//! Every function gets a stack-allocated activation record addressed off
//! `%rbp`; expressions evaluate into pseudo-registers handed out by a small
//! bitmap allocator over RAX..R9. String literals are interned into a
//! deduplicated table that becomes the `.data` section. The text section is
//! built in a buffer first, because the frame size and the literal table are
//! only known once the bodies have been walked.

use crate::ast::{AstNode, BinaryOp, UnaryOp};
use crate::ty::DataType;

pub const MAX_REGISTERS: usize = 8;

/// Pseudo-registers used as generic operand holders. No spilling: when all
/// eight are taken the allocator hands out RAX again and the caller accepts
/// the clobber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
  Rax,
  Rbx,
  Rcx,
  Rdx,
  Rsi,
  Rdi,
  R8,
  R9,
}

/// 64/32/8-bit spellings, indexed in allocation order.
const REGISTER_NAMES: [[&str; 3]; MAX_REGISTERS] = [
  ["rax", "eax", "al"],
  ["rbx", "ebx", "bl"],
  ["rcx", "ecx", "cl"],
  ["rdx", "edx", "dl"],
  ["rsi", "esi", "sil"],
  ["rdi", "edi", "dil"],
  ["r8", "r8d", "r8b"],
  ["r9", "r9d", "r9b"],
];

const ALL_REGISTERS: [Reg; MAX_REGISTERS] = [
  Reg::Rax,
  Reg::Rbx,
  Reg::Rcx,
  Reg::Rdx,
  Reg::Rsi,
  Reg::Rdi,
  Reg::R8,
  Reg::R9,
];

/// SysV integer argument registers, in order.
pub const ARG_REGISTERS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

impl Reg {
  fn index(self) -> usize {
    match self {
      Reg::Rax => 0,
      Reg::Rbx => 1,
      Reg::Rcx => 2,
      Reg::Rdx => 3,
      Reg::Rsi => 4,
      Reg::Rdi => 5,
      Reg::R8 => 6,
      Reg::R9 => 7,
    }
  }

  /// Register spelling for an operand of `size` bytes (8, 4 or 1).
  pub fn name(self, size: i64) -> &'static str {
    let column = match size {
      8 => 0,
      4 => 1,
      1 => 2,
      _ => 0,
    };
    REGISTER_NAMES[self.index()][column]
  }
}

/// Bitmap allocator over the pseudo-registers.
struct RegisterSet {
  used: [bool; MAX_REGISTERS],
}

impl RegisterSet {
  fn new() -> Self {
    Self {
      used: [false; MAX_REGISTERS],
    }
  }

  /// Lowest-indexed free register, or RAX when everything is taken.
  fn allocate(&mut self) -> Reg {
    for reg in ALL_REGISTERS {
      if !self.used[reg.index()] {
        self.used[reg.index()] = true;
        return reg;
      }
    }
    Reg::Rax
  }

  fn free(&mut self, reg: Reg) {
    self.used[reg.index()] = false;
  }

  fn free_all(&mut self) {
    self.used = [false; MAX_REGISTERS];
  }

  /// Registers currently handed out, in allocation order.
  fn in_use(&self) -> Vec<Reg> {
    ALL_REGISTERS
      .into_iter()
      .filter(|reg| self.used[reg.index()])
      .collect()
  }
}

/// One local or parameter slot in the activation record.
struct StackVar {
  name: String,
  data_type: DataType,
  offset: i64,
}

/// Per-function emission state: the frame layout built up as declarations
/// are encountered.
struct FunctionContext {
  stack_size: i64,
  variables: Vec<StackVar>,
}

impl FunctionContext {
  fn new() -> Self {
    Self {
      stack_size: 0,
      variables: Vec::new(),
    }
  }

  /// Reserve a slot, padded to 8 bytes, below any existing ones.
  fn add_variable(&mut self, name: &str, data_type: DataType) -> i64 {
    let padded = (data_type.size() + 7) & !7;
    self.stack_size += padded;
    let offset = -self.stack_size;
    self.variables.push(StackVar {
      name: name.to_string(),
      data_type,
      offset,
    });
    offset
  }

  fn find_variable(&self, name: &str) -> Option<&StackVar> {
    self.variables.iter().find(|var| var.name == name)
  }
}

/// Interned string literals in insertion order. Equal values share a label.
struct StringTable {
  literals: Vec<(String, String)>,
}

impl StringTable {
  fn new() -> Self {
    Self {
      literals: Vec::new(),
    }
  }

  fn intern(&mut self, value: &str) -> String {
    if let Some((_, label)) = self.literals.iter().find(|(v, _)| v == value) {
      return label.clone();
    }
    let label = format!(".LC{}", self.literals.len());
    self.literals.push((value.to_string(), label.clone()));
    label
  }
}

pub struct CodeGen {
  text: String,
  strings: StringTable,
  registers: RegisterSet,
  label_counter: usize,
  /// Words pushed on the stack by in-flight expression sequences, used to
  /// keep `%rsp` 16-byte aligned at call instructions.
  stack_depth: usize,
  return_label: String,
  current_function: Option<FunctionContext>,
}

impl CodeGen {
  pub fn new() -> Self {
    Self {
      text: String::new(),
      strings: StringTable::new(),
      registers: RegisterSet::new(),
      label_counter: 0,
      stack_depth: 0,
      return_label: String::new(),
      current_function: None,
    }
  }

  /// Lower a whole program to assembly text.
  pub fn generate(mut self, program: &AstNode) -> String {
    if let AstNode::Program { declarations, .. } = program {
      for declaration in declarations {
        if let AstNode::FunctionDecl { body: Some(_), .. } = declaration {
          self.emit_function(declaration);
        }
      }
    }

    let mut out = String::new();
    out.push_str("    # Generated by TinyC Compiler\n");
    out.push_str(".section .data\n");
    for (value, label) in &self.strings.literals {
      out.push_str(label);
      out.push_str(":\n    .string \"");
      out.push_str(value);
      out.push_str("\"\n");
    }
    if !self.strings.literals.is_empty() {
      out.push('\n');
    }
    out.push_str(".section .text\n");
    out.push_str(&self.text);
    out
  }

  // ----- Emission helpers -----

  fn emit(&mut self, line: impl AsRef<str>) {
    self.text.push_str("    ");
    self.text.push_str(line.as_ref());
    self.text.push('\n');
  }

  fn emit_label(&mut self, label: &str) {
    self.text.push_str(label);
    self.text.push_str(":\n");
  }

  fn push(&mut self, operand: &str) {
    self.emit(format!("pushq {operand}"));
    self.stack_depth += 1;
  }

  fn pop(&mut self, operand: &str) {
    self.emit(format!("popq {operand}"));
    self.stack_depth -= 1;
  }

  /// Drop a stack word without restoring it anywhere.
  fn drop_word(&mut self) {
    self.emit("addq $8, %rsp");
    self.stack_depth -= 1;
  }

  fn generate_label(&mut self, prefix: &str) -> String {
    let label = format!(".L{prefix}{}", self.label_counter);
    self.label_counter += 1;
    label
  }

  // ----- Functions -----

  fn emit_function(&mut self, node: &AstNode) {
    let AstNode::FunctionDecl {
      return_type,
      name,
      parameters,
      body: Some(body),
      ..
    } = node
    else {
      return;
    };

    let mut context = FunctionContext::new();
    for parameter in parameters {
      if let AstNode::Parameter {
        param_type,
        name: param_name,
        ..
      } = parameter
      {
        context.add_variable(param_name, *param_type);
      }
    }

    self.current_function = Some(context);
    self.registers.free_all();
    self.stack_depth = 0;
    self.return_label = self.generate_label("return");

    // Body first: locals declared inside it grow the frame, and the final
    // size has to be known before the prologue's subq can be written.
    let outer = std::mem::take(&mut self.text);
    self.spill_parameters(parameters);
    self.emit_statement(body);
    let body_text = std::mem::replace(&mut self.text, outer);

    if name == "main" {
      self.text.push_str(".global main\n");
    }
    self.emit_label(name);
    self.emit("pushq %rbp");
    self.emit("movq %rsp, %rbp");
    let stack_size = self
      .current_function
      .as_ref()
      .map(|context| context.stack_size)
      .unwrap_or(0);
    if stack_size > 0 {
      self.emit(format!("subq ${}, %rsp", (stack_size + 15) & !15));
    }

    self.text.push_str(&body_text);

    let return_label = self.return_label.clone();
    self.emit_label(&return_label);
    if *return_type == DataType::Void {
      self.emit("movq $0, %rax");
    }
    self.emit("movq %rbp, %rsp");
    self.emit("popq %rbp");
    self.emit("ret");
    self.text.push('\n');

    self.current_function = None;
  }

  /// Move each parameter from its SysV argument register into its slot.
  fn spill_parameters(&mut self, parameters: &[AstNode]) {
    for (index, parameter) in parameters.iter().enumerate() {
      let AstNode::Parameter {
        param_type,
        name: param_name,
        ..
      } = parameter
      else {
        continue;
      };
      let Some(arg_reg) = ARG_REGISTERS.get(index) else {
        continue;
      };
      let offset = match self
        .current_function
        .as_ref()
        .and_then(|context| context.find_variable(param_name))
      {
        Some(var) => var.offset,
        None => continue,
      };
      let size = param_type.size().max(1);
      self.emit(format!(
        "mov{} %{}, {}(%rbp)",
        param_type.suffix(),
        arg_reg.name(size),
        offset
      ));
    }
  }

  // ----- Statements -----

  fn emit_statement(&mut self, node: &AstNode) {
    match node {
      AstNode::CompoundStmt { statements, .. } => {
        for statement in statements {
          self.emit_statement(statement);
        }
      }
      AstNode::IfStmt {
        condition,
        then_stmt,
        else_stmt,
        ..
      } => self.emit_if(condition, then_stmt, else_stmt.as_deref()),
      AstNode::WhileStmt {
        condition, body, ..
      } => self.emit_while(condition, body),
      AstNode::ForStmt {
        init,
        condition,
        update,
        body,
        ..
      } => self.emit_for(init.as_deref(), condition.as_deref(), update.as_deref(), body),
      AstNode::ReturnStmt { value, .. } => self.emit_return(value.as_deref()),
      AstNode::ExpressionStmt { expression, .. } => {
        if let Some(expression) = expression {
          if let Some(reg) = self.emit_expression(expression) {
            self.registers.free(reg);
          }
        }
      }
      AstNode::VariableDecl {
        var_type,
        name,
        initializer,
        ..
      } => self.emit_variable_decl(*var_type, name, initializer.as_deref()),
      _ => {}
    }
  }

  fn emit_variable_decl(&mut self, var_type: DataType, name: &str, initializer: Option<&AstNode>) {
    let Some(context) = self.current_function.as_mut() else {
      return;
    };
    let offset = context.add_variable(name, var_type);

    if let Some(initializer) = initializer {
      if let Some(reg) = self.emit_expression(initializer) {
        let size = var_type.size().max(1);
        self.emit(format!(
          "mov{} %{}, {}(%rbp)",
          var_type.suffix(),
          reg.name(size),
          offset
        ));
        self.registers.free(reg);
      }
    }
  }

  fn emit_condition_jump(&mut self, condition: &AstNode, target: &str) {
    if let Some(reg) = self.emit_expression(condition) {
      let name = reg.name(8);
      self.emit(format!("testq %{name}, %{name}"));
      self.registers.free(reg);
      self.emit(format!("jz {target}"));
    }
  }

  fn emit_if(&mut self, condition: &AstNode, then_stmt: &AstNode, else_stmt: Option<&AstNode>) {
    let else_label = self.generate_label("else");
    let end_label = self.generate_label("endif");

    match else_stmt {
      Some(else_stmt) => {
        self.emit_condition_jump(condition, &else_label);
        self.emit_statement(then_stmt);
        self.emit(format!("jmp {end_label}"));
        self.emit_label(&else_label);
        self.emit_statement(else_stmt);
      }
      None => {
        self.emit_condition_jump(condition, &end_label);
        self.emit_statement(then_stmt);
      }
    }

    self.emit_label(&end_label);
  }

  fn emit_while(&mut self, condition: &AstNode, body: &AstNode) {
    let loop_label = self.generate_label("while");
    let end_label = self.generate_label("endwhile");

    self.emit_label(&loop_label);
    self.emit_condition_jump(condition, &end_label);
    self.emit_statement(body);
    self.emit(format!("jmp {loop_label}"));
    self.emit_label(&end_label);
  }

  fn emit_for(
    &mut self,
    init: Option<&AstNode>,
    condition: Option<&AstNode>,
    update: Option<&AstNode>,
    body: &AstNode,
  ) {
    let loop_label = self.generate_label("for");
    let update_label = self.generate_label("forupdate");
    let end_label = self.generate_label("endfor");

    if let Some(init) = init {
      self.emit_statement(init);
    }

    self.emit_label(&loop_label);
    if let Some(condition) = condition {
      self.emit_condition_jump(condition, &end_label);
    }

    self.emit_statement(body);

    self.emit_label(&update_label);
    if let Some(update) = update {
      if let Some(reg) = self.emit_expression(update) {
        self.registers.free(reg);
      }
    }
    self.emit(format!("jmp {loop_label}"));
    self.emit_label(&end_label);
  }

  fn emit_return(&mut self, value: Option<&AstNode>) {
    if let Some(value) = value {
      if let Some(reg) = self.emit_expression(value) {
        if reg != Reg::Rax {
          self.emit(format!("movq %{}, %rax", reg.name(8)));
        }
        self.registers.free(reg);
      }
    }
    let return_label = self.return_label.clone();
    self.emit(format!("jmp {return_label}"));
  }

  // ----- Expressions -----

  /// Evaluate an expression into a pseudo-register. Returns `None` when the
  /// node produces no value (an identifier with no stack slot).
  fn emit_expression(&mut self, node: &AstNode) -> Option<Reg> {
    match node {
      AstNode::Number { value, .. } => {
        let reg = self.registers.allocate();
        self.emit(format!("movq ${value}, %{}", reg.name(8)));
        Some(reg)
      }
      AstNode::String { value, .. } => {
        let label = self.strings.intern(value);
        let reg = self.registers.allocate();
        self.emit(format!("movq ${label}, %{}", reg.name(8)));
        Some(reg)
      }
      AstNode::Identifier { name, .. } => self.emit_identifier_load(name),
      AstNode::UnaryOp { op, operand, .. } => self.emit_unary_op(*op, operand),
      AstNode::BinaryOp {
        op, left, right, ..
      } => self.emit_binary_op(*op, left, right),
      AstNode::FunctionCall {
        name, arguments, ..
      } => self.emit_function_call(name, arguments),
      _ => None,
    }
  }

  fn emit_identifier_load(&mut self, name: &str) -> Option<Reg> {
    let (offset, data_type) = {
      let var = self.current_function.as_ref()?.find_variable(name)?;
      (var.offset, var.data_type)
    };

    let reg = self.registers.allocate();
    match data_type {
      // 8-bit locals are sign-extended on load
      DataType::Char => self.emit(format!("movsbl {}(%rbp), %{}", offset, reg.name(4))),
      DataType::CharPtr => self.emit(format!("movq {}(%rbp), %{}", offset, reg.name(8))),
      _ => self.emit(format!("movl {}(%rbp), %{}", offset, reg.name(4))),
    }
    Some(reg)
  }

  fn emit_unary_op(&mut self, op: UnaryOp, operand: &AstNode) -> Option<Reg> {
    let reg = self.emit_expression(operand)?;
    match op {
      UnaryOp::Plus => {}
      UnaryOp::Minus => self.emit(format!("negq %{}", reg.name(8))),
      UnaryOp::Not => {
        let name = reg.name(8);
        self.emit(format!("testq %{name}, %{name}"));
        self.emit(format!("sete %{}", reg.name(1)));
        self.emit(format!("movzbl %{}, %{}", reg.name(1), reg.name(4)));
      }
    }
    Some(reg)
  }

  fn emit_binary_op(&mut self, op: BinaryOp, left: &AstNode, right: &AstNode) -> Option<Reg> {
    match op {
      BinaryOp::Assign => return self.emit_assignment(left, right),
      BinaryOp::And | BinaryOp::Or => return self.emit_logical_op(op, left, right),
      _ => {}
    }

    let left_reg = self.emit_expression(left)?;
    let right_reg = match self.emit_expression(right) {
      Some(reg) => reg,
      None => return Some(left_reg),
    };
    let l = left_reg.name(8);
    let r = right_reg.name(8);

    match op {
      BinaryOp::Add => self.emit(format!("addq %{r}, %{l}")),
      BinaryOp::Sub => self.emit(format!("subq %{r}, %{l}")),
      BinaryOp::Mul => self.emit(format!("imulq %{r}, %{l}")),
      BinaryOp::Div | BinaryOp::Mod => self.emit_division(op, left_reg, right_reg),
      BinaryOp::Lt => self.emit_comparison("setl", left_reg, right_reg),
      BinaryOp::Le => self.emit_comparison("setle", left_reg, right_reg),
      BinaryOp::Gt => self.emit_comparison("setg", left_reg, right_reg),
      BinaryOp::Ge => self.emit_comparison("setge", left_reg, right_reg),
      BinaryOp::Eq => self.emit_comparison("sete", left_reg, right_reg),
      BinaryOp::Ne => self.emit_comparison("setne", left_reg, right_reg),
      BinaryOp::Assign | BinaryOp::And | BinaryOp::Or => {}
    }

    self.registers.free(right_reg);
    Some(left_reg)
  }

  fn emit_comparison(&mut self, set_instruction: &str, left: Reg, right: Reg) {
    self.emit(format!("cmpq %{}, %{}", right.name(8), left.name(8)));
    self.emit(format!("{set_instruction} %{}", left.name(1)));
    self.emit(format!("movzbl %{}, %{}", left.name(1), left.name(4)));
  }

  /// `idivq` insists on rax/rdx, so the divisor goes through the stack and
  /// the live copies of both registers are preserved around the divide. The
  /// saved word belonging to the result register is dropped, not popped.
  fn emit_division(&mut self, op: BinaryOp, left: Reg, right: Reg) {
    self.push("%rax");
    self.push("%rdx");
    self.push(&format!("%{}", right.name(8)));
    if left != Reg::Rax {
      self.emit(format!("movq %{}, %rax", left.name(8)));
    }
    self.emit("cqto");
    self.emit("idivq (%rsp)");
    self.drop_word();

    let result = if op == BinaryOp::Div { Reg::Rax } else { Reg::Rdx };
    if left != result {
      self.emit(format!("movq %{}, %{}", result.name(8), left.name(8)));
    }
    if left == Reg::Rdx {
      self.drop_word();
    } else {
      self.pop("%rdx");
    }
    if left == Reg::Rax {
      self.drop_word();
    } else {
      self.pop("%rax");
    }
  }

  /// Short-circuit `&&`/`||`, normalizing the result to 0 or 1 in the left
  /// operand's register.
  fn emit_logical_op(&mut self, op: BinaryOp, left: &AstNode, right: &AstNode) -> Option<Reg> {
    let prefix = if op == BinaryOp::And { "and" } else { "or" };
    let short_label = self.generate_label(&format!("{prefix}short"));
    let end_label = self.generate_label(&format!("{prefix}end"));

    let left_reg = self.emit_expression(left)?;
    let l = left_reg.name(8);
    self.emit(format!("testq %{l}, %{l}"));
    match op {
      BinaryOp::And => self.emit(format!("jz {short_label}")),
      _ => self.emit(format!("jnz {short_label}")),
    }

    if let Some(right_reg) = self.emit_expression(right) {
      let r = right_reg.name(8);
      self.emit(format!("testq %{r}, %{r}"));
      self.registers.free(right_reg);
      match op {
        BinaryOp::And => self.emit(format!("jz {short_label}")),
        _ => self.emit(format!("jnz {short_label}")),
      }
    }

    // fell through: && saw two truthy values, || saw two falsy ones
    let fallthrough = if op == BinaryOp::And { 1 } else { 0 };
    let shorted = 1 - fallthrough;
    self.emit(format!("movq ${fallthrough}, %{l}"));
    self.emit(format!("jmp {end_label}"));
    self.emit_label(&short_label);
    self.emit(format!("movq ${shorted}, %{l}"));
    self.emit_label(&end_label);

    Some(left_reg)
  }

  fn emit_assignment(&mut self, left: &AstNode, right: &AstNode) -> Option<Reg> {
    let right_reg = self.emit_expression(right)?;

    if let AstNode::Identifier { name, .. } = left {
      let slot = self
        .current_function
        .as_ref()
        .and_then(|context| context.find_variable(name))
        .map(|var| (var.offset, var.data_type));
      if let Some((offset, data_type)) = slot {
        let size = data_type.size().max(1);
        self.emit(format!(
          "mov{} %{}, {}(%rbp)",
          data_type.suffix(),
          right_reg.name(size),
          offset
        ));
      }
    }

    // the stored value is also the value of the expression
    Some(right_reg)
  }

  /// SysV call: arguments are staged on the stack left to right, popped into
  /// the argument registers right to left, and any live pseudo-registers are
  /// preserved around the call. `%rsp` is padded to 16 bytes when the
  /// outstanding pushes leave it misaligned.
  fn emit_function_call(&mut self, name: &str, arguments: &[AstNode]) -> Option<Reg> {
    let live = self.registers.in_use();
    for reg in &live {
      self.push(&format!("%{}", reg.name(8)));
    }

    for argument in arguments {
      match self.emit_expression(argument) {
        Some(reg) => {
          self.push(&format!("%{}", reg.name(8)));
          self.registers.free(reg);
        }
        None => self.push("$0"),
      }
    }

    for index in (0..arguments.len().min(ARG_REGISTERS.len())).rev() {
      self.pop(&format!("%{}", ARG_REGISTERS[index].name(8)));
    }

    let padded = self.stack_depth % 2 == 1;
    if padded {
      self.emit("subq $8, %rsp");
    }
    self.emit(format!("call {name}"));
    if padded {
      self.emit("addq $8, %rsp");
    }

    let result = self.registers.allocate();
    if result != Reg::Rax {
      self.emit(format!("movq %rax, %{}", result.name(8)));
    }

    for reg in live.iter().rev() {
      self.pop(&format!("%{}", reg.name(8)));
    }

    Some(result)
  }
}

impl Default for CodeGen {
  fn default() -> Self {
    Self::new()
  }
}
