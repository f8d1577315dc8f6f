//! Recursive-descent parser producing a block of statements and its locals.
//!
//! The parser mirrors the classic chibicc structure: we maintain a
//! precedence-climbing set of helpers and a thin statement layer on top.
//!
//! ```text
//! program       = "{" compound_stmt
//! compound_stmt = stmt* "}"
//! stmt          = "return" expr ";" | "{" compound_stmt | ";" | expr ";"
//! expr          = assign
//! assign        = equality ("=" assign)?
//! equality      = relational ("==" relational | "!=" relational)*
//! relational    = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add           = mul ("+" mul | "-" mul)*
//! mul           = unary ("*" unary | "/" unary)*
//! unary         = ("+" | "-") unary | primary
//! primary       = num | ident | "(" expr ")"
//! ```

use tracing::{debug, warn};

use crate::ast::{BinaryOp, Function, Node, NodeId, NodeKind, Obj, VarId};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};

/// Deepest recursion the grammar may enter through parentheses, unary
/// operators, nested blocks and chained assignments.
const MAX_NESTING: usize = 256;

/// Tallest tree the later passes will walk recursively.
const MAX_TREE_HEIGHT: usize = 2048;

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Function> {
  let mut parser = Parser::new(TokenStream::new(tokens, source));

  let open = parser.stream.loc();
  parser.stream.skip("{")?;
  let body = parse_compound_stmt(&mut parser, open)?;

  if !parser.stream.is_eof() {
    let got = describe_token(parser.stream.peek(), source);
    warn!(
      loc = parser.stream.loc(),
      "ignoring tokens after the closing brace, starting at \"{got}\""
    );
  }

  debug!(
    nodes = parser.nodes.len(),
    locals = parser.locals.len(),
    "parsed program"
  );

  Ok(Function {
    nodes: parser.nodes,
    locals: parser.locals,
    body,
    stack_size: 0,
  })
}

/// Parser state: the token cursor plus the arenas the tree is built into.
struct Parser<'a> {
  stream: TokenStream<'a>,
  nodes: Vec<Node>,
  /// Height of the subtree rooted at each node, indexed like `nodes`.
  heights: Vec<usize>,
  locals: Vec<Obj>,
  nesting: usize,
}

impl<'a> Parser<'a> {
  fn new(stream: TokenStream<'a>) -> Self {
    Self {
      stream,
      nodes: Vec::new(),
      heights: Vec::new(),
      locals: Vec::new(),
      nesting: 0,
    }
  }

  fn new_node(&mut self, kind: NodeKind, loc: usize) -> CompileResult<NodeId> {
    let height = 1 + self.children_height(&kind);
    if height > MAX_TREE_HEIGHT {
      return Err(CompileError::at(
        self.stream.source,
        loc,
        "expression nested too deeply",
      ));
    }

    let id = NodeId(self.nodes.len());
    self.nodes.push(Node {
      kind,
      next: None,
      loc,
    });
    self.heights.push(height);
    Ok(id)
  }

  fn children_height(&self, kind: &NodeKind) -> usize {
    let height = |id: &NodeId| self.heights[id.0];
    match kind {
      NodeKind::Num { .. } | NodeKind::Var { .. } => 0,
      NodeKind::Neg { operand } => height(operand),
      NodeKind::Binary { lhs, rhs, .. } | NodeKind::Assign { lhs, rhs } => {
        height(lhs).max(height(rhs))
      }
      NodeKind::ExprStmt { expr } | NodeKind::Return { expr } => height(expr),
      NodeKind::Block { body } => {
        let mut tallest = 0;
        let mut current = *body;
        while let Some(id) = current {
          tallest = tallest.max(height(&id));
          current = self.nodes[id.0].next;
        }
        tallest
      }
    }
  }

  fn new_binary(
    &mut self,
    op: BinaryOp,
    lhs: NodeId,
    rhs: NodeId,
    loc: usize,
  ) -> CompileResult<NodeId> {
    self.new_node(NodeKind::Binary { op, lhs, rhs }, loc)
  }

  /// Step one level deeper into a recursive production starting at `loc`.
  fn enter(&mut self, loc: usize) -> CompileResult<()> {
    if self.nesting >= MAX_NESTING {
      return Err(CompileError::at(
        self.stream.source,
        loc,
        "expression nested too deeply",
      ));
    }
    self.nesting += 1;
    Ok(())
  }

  fn leave(&mut self) {
    self.nesting -= 1;
  }

  /// Resolve a name to its local, declaring it on first use.
  fn local(&mut self, name: &str) -> VarId {
    if let Some(pos) = self.locals.iter().position(|obj| obj.name == name) {
      return VarId(pos);
    }
    self.locals.push(Obj {
      name: name.to_string(),
      offset: None,
    });
    VarId(self.locals.len() - 1)
  }
}

// compound_stmt = stmt* "}"
fn parse_compound_stmt(parser: &mut Parser, loc: usize) -> CompileResult<NodeId> {
  let mut head = None;
  let mut tail: Option<NodeId> = None;

  while !parser.stream.equal("}") {
    if parser.stream.is_eof() {
      parser.stream.skip("}")?;
    }
    let stmt = parse_stmt(parser)?;
    match tail {
      Some(prev) => parser.nodes[prev.0].next = Some(stmt),
      None => head = Some(stmt),
    }
    tail = Some(stmt);
  }

  parser.new_node(NodeKind::Block { body: head }, loc)
}

fn parse_stmt(parser: &mut Parser) -> CompileResult<NodeId> {
  let loc = parser.stream.loc();

  if parser.stream.equal("return") {
    let expr = parse_expr(parser)?;
    parser.stream.skip(";")?;
    return parser.new_node(NodeKind::Return { expr }, loc);
  }

  if parser.stream.equal("{") {
    parser.enter(loc)?;
    let block = parse_compound_stmt(parser, loc)?;
    parser.leave();
    return Ok(block);
  }

  if parser.stream.equal(";") {
    return parser.new_node(NodeKind::Block { body: None }, loc);
  }

  parse_expr_stmt(parser)
}

fn parse_expr_stmt(parser: &mut Parser) -> CompileResult<NodeId> {
  let loc = parser.stream.loc();
  let expr = parse_expr(parser)?;
  parser.stream.skip(";")?;
  parser.new_node(NodeKind::ExprStmt { expr }, loc)
}

fn parse_expr(parser: &mut Parser) -> CompileResult<NodeId> {
  parse_assign(parser)
}

fn parse_assign(parser: &mut Parser) -> CompileResult<NodeId> {
  let node = parse_equality(parser)?;

  let loc = parser.stream.loc();
  if parser.stream.equal("=") {
    parser.enter(loc)?;
    let rhs = parse_assign(parser)?;
    parser.leave();
    return parser.new_node(NodeKind::Assign { lhs: node, rhs }, loc);
  }

  Ok(node)
}

fn parse_equality(parser: &mut Parser) -> CompileResult<NodeId> {
  let mut node = parse_relational(parser)?;

  loop {
    let loc = parser.stream.loc();
    let op = match parser.stream.peek_punct() {
      Some("==") => BinaryOp::Eq,
      Some("!=") => BinaryOp::Ne,
      _ => break,
    };

    parser.stream.advance();
    let rhs = parse_relational(parser)?;
    node = parser.new_binary(op, node, rhs, loc)?;
  }

  Ok(node)
}

fn parse_relational(parser: &mut Parser) -> CompileResult<NodeId> {
  let mut node = parse_add(parser)?;

  loop {
    let loc = parser.stream.loc();
    // `>` and `>=` are expressed through `<` and `<=` with swapped operands.
    let (op, swapped) = match parser.stream.peek_punct() {
      Some("<") => (BinaryOp::Lt, false),
      Some("<=") => (BinaryOp::Le, false),
      Some(">") => (BinaryOp::Lt, true),
      Some(">=") => (BinaryOp::Le, true),
      _ => break,
    };

    parser.stream.advance();
    let rhs = parse_add(parser)?;
    node = if swapped {
      parser.new_binary(op, rhs, node, loc)?
    } else {
      parser.new_binary(op, node, rhs, loc)?
    };
  }

  Ok(node)
}

fn parse_add(parser: &mut Parser) -> CompileResult<NodeId> {
  let mut node = parse_mul(parser)?;

  loop {
    let loc = parser.stream.loc();
    let op = match parser.stream.peek_punct() {
      Some("+") => BinaryOp::Add,
      Some("-") => BinaryOp::Sub,
      _ => break,
    };

    parser.stream.advance();
    let rhs = parse_mul(parser)?;
    node = parser.new_binary(op, node, rhs, loc)?;
  }

  Ok(node)
}

fn parse_mul(parser: &mut Parser) -> CompileResult<NodeId> {
  let mut node = parse_unary(parser)?;

  loop {
    let loc = parser.stream.loc();
    let op = match parser.stream.peek_punct() {
      Some("*") => BinaryOp::Mul,
      Some("/") => BinaryOp::Div,
      _ => break,
    };

    parser.stream.advance();
    let rhs = parse_unary(parser)?;
    node = parser.new_binary(op, node, rhs, loc)?;
  }

  Ok(node)
}

fn parse_unary(parser: &mut Parser) -> CompileResult<NodeId> {
  let loc = parser.stream.loc();

  if parser.stream.equal("+") {
    parser.enter(loc)?;
    let operand = parse_unary(parser)?;
    parser.leave();
    return Ok(operand);
  }

  if parser.stream.equal("-") {
    parser.enter(loc)?;
    let operand = parse_unary(parser)?;
    parser.leave();
    return parser.new_node(NodeKind::Neg { operand }, loc);
  }

  parse_primary(parser)
}

fn parse_primary(parser: &mut Parser) -> CompileResult<NodeId> {
  let loc = parser.stream.loc();

  if parser.stream.equal("(") {
    parser.enter(loc)?;
    let node = parse_expr(parser)?;
    parser.leave();
    parser.stream.skip(")")?;
    return Ok(node);
  }

  if let Some(name) = parser.stream.get_ident() {
    let var = parser.local(name);
    return parser.new_node(NodeKind::Var { var }, loc);
  }

  if let Some(value) = parser.stream.get_number() {
    return parser.new_node(NodeKind::Num { value }, loc);
  }

  Err(parser.stream.error_here("expected an expression"))
}

/// Lightweight cursor over the token vector. It only ever moves forward.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  /// Byte offset of the current token, or the end of input past the last one.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  fn advance(&mut self) {
    if self.pos < self.tokens.len() {
      self.pos += 1;
    }
  }

  fn peek_punct(&self) -> Option<&'a str> {
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, self.source))
  }

  /// Consume the current token if it spells the given punctuator or keyword.
  fn equal(&mut self, op: &str) -> bool {
    if let Some(token) = self.peek()
      && matches!(token.kind, TokenKind::Punctuator | TokenKind::Keyword)
      && token.len == op.len()
      && token_text(token, self.source) == op
    {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      let got = describe_token(self.peek(), self.source);
      Err(self.error_here(format!("expected \"{s}\", but got \"{got}\"")))
    }
  }

  /// Consume the current token if it is a number literal.
  fn get_number(&mut self) -> Option<i64> {
    let value = self
      .peek()
      .filter(|token| token.kind == TokenKind::Num)
      .and_then(|token| token.value)?;
    self.pos += 1;
    Some(value)
  }

  /// Consume the current token if it is an identifier.
  fn get_ident(&mut self) -> Option<&'a str> {
    let source = self.source;
    let name = self
      .peek()
      .filter(|token| token.kind == TokenKind::Ident)
      .map(|token| token_text(token, source))?;
    self.pos += 1;
    Some(name)
  }

  fn error_here(&self, message: impl Into<String>) -> CompileError {
    CompileError::at(self.source, self.loc(), message)
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), None | Some(TokenKind::Eof))
  }
}
