//! Code generation: lower the parsed AST into AT&T x86-64 assembly.
//!
//! The emitter uses a single accumulator: every expression leaves its value
//! in `%rax`, and binary operators spill one operand to the machine stack
//! while the other is computed. Locals live on the stack frame and are
//! addressed relative to `%rbp`.

use tracing::{debug, trace};

use crate::ast::{BinaryOp, Function, NodeId, NodeKind};
use crate::error::{CompileError, CompileResult};

/// Label of the epilogue every `return` jumps to.
const RETURN_LABEL: &str = ".L.return";

/// Lay out the stack frame, then emit assembly for the function.
pub fn generate(func: &mut Function) -> CompileResult<String> {
  assign_lvar_offsets(func);
  debug!(
    locals = func.locals.len(),
    stack_size = func.stack_size,
    "laid out stack frame"
  );

  let mut emitter = Emitter::new(func);
  emitter.emit_function()?;
  Ok(emitter.asm)
}

/// Give every local its own 8-byte slot below `%rbp`.
fn assign_lvar_offsets(func: &mut Function) {
  let mut offset = 0;
  // Most recently declared locals come first.
  for obj in func.locals.iter_mut().rev() {
    offset += 8;
    obj.offset = Some(offset);
  }
  func.stack_size = align_to(offset, 16);
}

fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

struct Emitter<'f> {
  func: &'f Function,
  asm: String,
  /// Values currently pushed on the evaluation stack.
  depth: usize,
}

impl<'f> Emitter<'f> {
  fn new(func: &'f Function) -> Self {
    Self {
      func,
      asm: String::new(),
      depth: 0,
    }
  }

  fn emit_function(&mut self) -> CompileResult<()> {
    self.asm.push_str(".global main\n");
    self.asm.push_str("main:\n");

    // Prologue
    self.asm.push_str("    push %rbp\n");
    self.asm.push_str("    mov %rsp, %rbp\n");
    self
      .asm
      .push_str(&format!("    sub ${}, %rsp\n", self.func.stack_size));

    self.emit_stmt(self.func.body)?;
    self.check_balanced(self.func.body)?;

    // Epilogue
    self.asm.push_str(&format!("{RETURN_LABEL}:\n"));
    self.asm.push_str("    mov %rbp, %rsp\n");
    self.asm.push_str("    pop %rbp\n");
    self.asm.push_str("    ret\n");
    Ok(())
  }

  fn push(&mut self) {
    self.asm.push_str("    push %rax\n");
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) -> CompileResult<()> {
    self.depth = self
      .depth
      .checked_sub(1)
      .ok_or_else(|| CompileError::internal("evaluation stack underflow"))?;
    self.asm.push_str(&format!("    pop {reg}\n"));
    Ok(())
  }

  fn check_balanced(&self, stmt: NodeId) -> CompileResult<()> {
    if self.depth == 0 {
      return Ok(());
    }
    Err(CompileError::internal(format!(
      "evaluation stack unbalanced after statement at offset {} (depth {})",
      self.func.node(stmt).loc,
      self.depth
    )))
  }

  fn emit_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let func = self.func;
    let node = func.node(id);
    trace!(loc = node.loc, "emitting statement");

    match node.kind {
      NodeKind::ExprStmt { expr } => self.emit_expr(expr),
      NodeKind::Return { expr } => {
        self.emit_expr(expr)?;
        self.asm.push_str(&format!("    jmp {RETURN_LABEL}\n"));
        Ok(())
      }
      NodeKind::Block { body } => {
        for (stmt, _) in func.stmts(body) {
          self.emit_stmt(stmt)?;
          self.check_balanced(stmt)?;
        }
        Ok(())
      }
      _ => Err(CompileError::internal("invalid statement")),
    }
  }

  /// Compute the address of an lvalue into `%rax`.
  fn emit_addr(&mut self, id: NodeId) -> CompileResult<()> {
    match self.func.node(id).kind {
      NodeKind::Var { var } => {
        let obj = self.func.local(var);
        let offset = obj.offset.ok_or_else(|| {
          CompileError::internal(format!("local \"{}\" has no stack slot", obj.name))
        })?;
        self
          .asm
          .push_str(&format!("    lea -{offset}(%rbp), %rax\n"));
        Ok(())
      }
      _ => Err(CompileError::internal("not an lvalue")),
    }
  }

  /// Emit code that leaves the value of an expression in `%rax`.
  fn emit_expr(&mut self, id: NodeId) -> CompileResult<()> {
    match self.func.node(id).kind {
      NodeKind::Num { value } => {
        self.asm.push_str(&format!("    mov ${value}, %rax\n"));
        Ok(())
      }
      NodeKind::Neg { operand } => {
        self.emit_expr(operand)?;
        self.asm.push_str("    neg %rax\n");
        Ok(())
      }
      NodeKind::Var { .. } => {
        self.emit_addr(id)?;
        self.asm.push_str("    mov (%rax), %rax\n");
        Ok(())
      }
      NodeKind::Assign { lhs, rhs } => {
        self.emit_addr(lhs)?;
        self.push();
        self.emit_expr(rhs)?;
        self.pop("%rdi")?;
        self.asm.push_str("    mov %rax, (%rdi)\n");
        Ok(())
      }
      NodeKind::Binary { op, lhs, rhs } => {
        self.emit_expr(rhs)?;
        self.push();
        self.emit_expr(lhs)?;
        self.pop("%rdi")?;
        self.emit_binary(op);
        Ok(())
      }
      _ => Err(CompileError::internal("invalid expression")),
    }
  }

  /// Combine `%rax` (left operand) with `%rdi` (right operand) into `%rax`.
  fn emit_binary(&mut self, op: BinaryOp) {
    match op {
      BinaryOp::Add => self.asm.push_str("    add %rdi, %rax\n"),
      BinaryOp::Sub => self.asm.push_str("    sub %rdi, %rax\n"),
      BinaryOp::Mul => self.asm.push_str("    imul %rdi, %rax\n"),
      BinaryOp::Div => {
        self.asm.push_str("    cqo\n");
        self.asm.push_str("    idiv %rdi\n");
      }
      BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le => {
        let setcc = match op {
          BinaryOp::Eq => "sete",
          BinaryOp::Ne => "setne",
          BinaryOp::Lt => "setl",
          _ => "setle",
        };
        self.asm.push_str("    cmp %rdi, %rax\n");
        self.asm.push_str(&format!("    {setcc} %al\n"));
        self.asm.push_str("    movzb %al, %rax\n");
      }
    }
  }
}
