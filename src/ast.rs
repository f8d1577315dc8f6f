//! Syntax tree produced by the parser.
//!
//! Nodes and locals live in arenas owned by [`Function`] and refer to each
//! other through [`NodeId`] and [`VarId`]. Statement lists are chains linked
//! through `Node::next`, rooted at a block's `body`.

use std::fmt::Write;

/// Binary operators recognised by the language. `>` and `>=` never reach the
/// tree: the parser swaps their operands into `Lt` / `Le`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
  Num { value: i64 },
  Var { var: VarId },
  Neg { operand: NodeId },
  Binary { op: BinaryOp, lhs: NodeId, rhs: NodeId },
  Assign { lhs: NodeId, rhs: NodeId },
  ExprStmt { expr: NodeId },
  Return { expr: NodeId },
  Block { body: Option<NodeId> },
}

#[derive(Debug, Clone)]
pub struct Node {
  pub kind: NodeKind,
  /// Following statement in the enclosing block; unused for expressions.
  pub next: Option<NodeId>,
  /// Byte offset of the token that introduced the node.
  pub loc: usize,
}

/// A local variable bound to a stack slot.
#[derive(Debug, Clone)]
pub struct Obj {
  pub name: String,
  /// Distance below `%rbp`; assigned by the code generator's frame layout.
  pub offset: Option<i64>,
}

/// The whole compiled program unit.
#[derive(Debug, Clone)]
pub struct Function {
  pub nodes: Vec<Node>,
  /// Locals in declaration order.
  pub locals: Vec<Obj>,
  pub body: NodeId,
  pub stack_size: i64,
}

impl Function {
  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id.0]
  }

  pub fn local(&self, id: VarId) -> &Obj {
    &self.locals[id.0]
  }

  /// Find a local by its exact name.
  pub fn find_local(&self, name: &str) -> Option<VarId> {
    self.locals.iter().position(|obj| obj.name == name).map(VarId)
  }

  /// Iterate a statement chain starting at `first`.
  pub fn stmts(&self, first: Option<NodeId>) -> StmtIter<'_> {
    StmtIter {
      func: self,
      current: first,
    }
  }

  /// Render the program as an S-expression, e.g. `(block (return (+ 1 2)))`.
  pub fn render(&self) -> String {
    self.render_node(self.body)
  }

  pub fn render_node(&self, id: NodeId) -> String {
    let mut out = String::new();
    self.write_node(id, &mut out);
    out
  }

  fn write_node(&self, id: NodeId, out: &mut String) {
    match &self.node(id).kind {
      NodeKind::Num { value } => {
        let _ = write!(out, "{value}");
      }
      NodeKind::Var { var } => out.push_str(&self.local(*var).name),
      NodeKind::Neg { operand } => self.write_list("neg", &[*operand], out),
      NodeKind::Binary { op, lhs, rhs } => self.write_list(op.symbol(), &[*lhs, *rhs], out),
      NodeKind::Assign { lhs, rhs } => self.write_list("=", &[*lhs, *rhs], out),
      NodeKind::ExprStmt { expr } => self.write_list("expr", &[*expr], out),
      NodeKind::Return { expr } => self.write_list("return", &[*expr], out),
      NodeKind::Block { body } => {
        let stmts: Vec<NodeId> = self.stmts(*body).map(|(id, _)| id).collect();
        self.write_list("block", &stmts, out);
      }
    }
  }

  fn write_list(&self, head: &str, items: &[NodeId], out: &mut String) {
    out.push('(');
    out.push_str(head);
    for item in items {
      out.push(' ');
      self.write_node(*item, out);
    }
    out.push(')');
  }
}

pub struct StmtIter<'a> {
  func: &'a Function,
  current: Option<NodeId>,
}

impl<'a> Iterator for StmtIter<'a> {
  type Item = (NodeId, &'a Node);

  fn next(&mut self) -> Option<Self::Item> {
    let id = self.current?;
    let node = self.func.node(id);
    self.current = node.next;
    Some((id, node))
  }
}
