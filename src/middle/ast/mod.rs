//! The typed syntax tree consumed by the optimizer. The frontend hands us one
//! tree per function after name resolution and type checking. Every node owns
//! its children exclusively, so a subtree can be detached, rebuilt or replaced
//! without worrying about aliasing. Nodes intentionally do not implement
//! `Clone`: duplicating a subtree must go through [`clone::clone_node`] which
//! validates the shape of whatever it copies.

use strum::{Display, EnumIter, EnumString};

use crate::simple_index;

pub mod clone;
pub mod pretty_print;
pub mod visit;

simple_index! {
    /// Identifies a variable (local or parameter) within a program. Resolved
    /// by the frontend and never interpreted by the optimizer
    pub struct VarId;
}

simple_index! {
    /// Identifies a function definition within a program
    pub struct FunctionId;
}

/// Byte range of the source text a node was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Used for nodes that have no origin in the source text
    pub const fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }
}

/// All the functions of a single compilation unit. Each entry is a
/// [`NodeKind::Function`] node.
#[derive(Debug, Default, PartialEq)]
pub struct Program {
    pub functions: Vec<Node>,
}

impl Program {
    pub fn new(functions: impl IntoIterator<Item = Function>) -> Self {
        Self {
            functions: functions.into_iter().map(Node::function).collect(),
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter_map(Node::as_function)
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions().find(|function| function.id == id)
    }
}

#[derive(Debug, PartialEq)]
pub struct Node {
    pub span: Span,
    pub kind: NodeKind,
}

#[derive(Debug, PartialEq)]
pub enum NodeKind {
    /// `{ a; b; c; }`
    Block(Block),
    Function(Box<Function>),
    /// `f(a, b)`
    FunctionCall(FunctionCall),
    /// `if (c) a else b`
    If(If),
    /// `while (c) body`
    While(While),
    /// `return e`
    Return(Box<Node>),
    Break,
    Continue,
    /// `-a`, `!a`
    Math1(Math1),
    /// `a + b`, `a < b`, `a = b`, ...
    Math2(Math2),
    IntLit(i64),
    FloatLit(f64),
    CharLit(char),
    StringLit(String),
    Var(VarId),
    /// `s[i]`
    Indexing(Indexing),
    /// `size(s)`
    Size(Box<Node>),
    /// `int(e)`
    ToInt(Box<Node>),
    /// `double(e)`
    ToDouble(Box<Node>),
    /// `string(e)`
    ToString(Box<Node>),
}

#[derive(Debug, PartialEq)]
pub struct Block {
    pub statements: Vec<Node>,
}

#[derive(Debug, PartialEq)]
pub struct Function {
    pub id: FunctionId,
    /// Formal parameters in declaration order
    pub parameters: Vec<VarId>,
    pub body: Box<Node>,
}

impl Function {
    pub fn new(id: FunctionId, parameters: Vec<VarId>, body: Node) -> Self {
        Self {
            id,
            parameters,
            body: Box::new(body),
        }
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn parameters(&self) -> &[VarId] {
        &self.parameters
    }

    pub fn is_parameter(&self, var: VarId) -> bool {
        self.parameters.contains(&var)
    }
}

#[derive(Debug, PartialEq)]
pub struct FunctionCall {
    pub callee: FunctionId,
    pub arguments: Vec<Node>,
}

impl FunctionCall {
    pub fn callee(&self) -> FunctionId {
        self.callee
    }
}

#[derive(Debug, PartialEq)]
pub struct If {
    pub condition: Box<Node>,
    pub then_branch: Box<Node>,
    pub else_branch: Option<Box<Node>>,
}

#[derive(Debug, PartialEq)]
pub struct While {
    pub condition: Box<Node>,
    pub body: Box<Node>,
}

#[derive(Debug, PartialEq)]
pub struct Math1 {
    pub op: UnaryOp,
    pub operand: Box<Node>,
}

impl Math1 {
    pub fn op(&self) -> UnaryOp {
        self.op
    }
}

#[derive(Debug, PartialEq)]
pub struct Math2 {
    pub op: BinaryOp,
    pub lhs: Box<Node>,
    pub rhs: Box<Node>,
}

impl Math2 {
    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

#[derive(Debug, PartialEq)]
pub struct Indexing {
    pub base: Box<Node>,
    pub index: Box<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum BinaryOp {
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpClass {
    Assignment,
    Arithmetic,
    Comparison,
    Logical,
}

impl BinaryOp {
    pub fn class(self) -> BinaryOpClass {
        match self {
            Self::Assign => BinaryOpClass::Assignment,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulus => {
                BinaryOpClass::Arithmetic
            }
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::Equals
            | Self::NotEquals => BinaryOpClass::Comparison,
            Self::LogicalAnd | Self::LogicalOr => BinaryOpClass::Logical,
        }
    }
}

/* Construction */

impl Node {
    pub fn new(span: Span, kind: NodeKind) -> Self {
        Self { span, kind }
    }

    /// Moves the node to a different source location
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn synthetic(kind: NodeKind) -> Self {
        Self::new(Span::dummy(), kind)
    }

    pub fn int(value: i64) -> Self {
        Self::synthetic(NodeKind::IntLit(value))
    }

    pub fn float(value: f64) -> Self {
        Self::synthetic(NodeKind::FloatLit(value))
    }

    pub fn char(value: char) -> Self {
        Self::synthetic(NodeKind::CharLit(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::synthetic(NodeKind::StringLit(value.into()))
    }

    pub fn var(id: VarId) -> Self {
        Self::synthetic(NodeKind::Var(id))
    }

    pub fn math1(op: UnaryOp, operand: Node) -> Self {
        Self::synthetic(NodeKind::Math1(Math1 {
            op,
            operand: Box::new(operand),
        }))
    }

    pub fn math2(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        Self::synthetic(NodeKind::Math2(Math2 {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }))
    }

    /// `var = value`
    pub fn assign(var: VarId, value: Node) -> Self {
        Self::math2(BinaryOp::Assign, Self::var(var), value)
    }

    pub fn call(callee: FunctionId, arguments: Vec<Node>) -> Self {
        Self::synthetic(NodeKind::FunctionCall(FunctionCall { callee, arguments }))
    }

    pub fn block(statements: Vec<Node>) -> Self {
        Self::synthetic(NodeKind::Block(Block { statements }))
    }

    pub fn if_else(condition: Node, then_branch: Node, else_branch: Option<Node>) -> Self {
        Self::synthetic(NodeKind::If(If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        }))
    }

    pub fn while_loop(condition: Node, body: Node) -> Self {
        Self::synthetic(NodeKind::While(While {
            condition: Box::new(condition),
            body: Box::new(body),
        }))
    }

    pub fn ret(value: Node) -> Self {
        Self::synthetic(NodeKind::Return(Box::new(value)))
    }

    pub fn break_loop() -> Self {
        Self::synthetic(NodeKind::Break)
    }

    pub fn continue_loop() -> Self {
        Self::synthetic(NodeKind::Continue)
    }

    pub fn indexing(base: Node, index: Node) -> Self {
        Self::synthetic(NodeKind::Indexing(Indexing {
            base: Box::new(base),
            index: Box::new(index),
        }))
    }

    pub fn size(operand: Node) -> Self {
        Self::synthetic(NodeKind::Size(Box::new(operand)))
    }

    pub fn to_int(operand: Node) -> Self {
        Self::synthetic(NodeKind::ToInt(Box::new(operand)))
    }

    pub fn to_double(operand: Node) -> Self {
        Self::synthetic(NodeKind::ToDouble(Box::new(operand)))
    }

    pub fn to_string_cast(operand: Node) -> Self {
        Self::synthetic(NodeKind::ToString(Box::new(operand)))
    }

    pub fn function(function: Function) -> Self {
        Self::synthetic(NodeKind::Function(Box::new(function)))
    }
}

/* Typed accessors */

impl Node {
    pub fn var_id(&self) -> Option<VarId> {
        match self.kind {
            NodeKind::Var(id) => Some(id),
            _ => None,
        }
    }

    pub fn int_value(&self) -> Option<i64> {
        match self.kind {
            NodeKind::IntLit(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_math2(&self) -> Option<&Math2> {
        match &self.kind {
            NodeKind::Math2(math2) => Some(math2),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&FunctionCall> {
        match &self.kind {
            NodeKind::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match &self.kind {
            NodeKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.kind {
            NodeKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_while(&self) -> Option<&While> {
        match &self.kind {
            NodeKind::While(while_loop) => Some(while_loop),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            NodeKind::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut Function> {
        match &mut self.kind {
            NodeKind::Function(function) => Some(function),
            _ => None,
        }
    }

    /// The variable written by this node if it is a plain `var = value`
    pub fn assigned_var(&self) -> Option<VarId> {
        match self.as_math2() {
            Some(Math2 {
                op: BinaryOp::Assign,
                lhs,
                ..
            }) => lhs.var_id(),
            _ => None,
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Math2(Math2 {
                op: BinaryOp::Assign,
                ..
            })
        )
    }
}

/* Generic child slot access */

impl Node {
    /// Number of child slots of this node. Nullable slots (the else branch of
    /// an `if`) are counted even when empty.
    pub fn child_count(&self) -> usize {
        match &self.kind {
            NodeKind::Block(block) => block.statements.len(),
            NodeKind::FunctionCall(call) => call.arguments.len(),
            NodeKind::If(_) => 3,
            NodeKind::While(_) | NodeKind::Math2(_) | NodeKind::Indexing(_) => 2,
            NodeKind::Function(_)
            | NodeKind::Return(_)
            | NodeKind::Math1(_)
            | NodeKind::Size(_)
            | NodeKind::ToInt(_)
            | NodeKind::ToDouble(_)
            | NodeKind::ToString(_) => 1,
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::IntLit(_)
            | NodeKind::FloatLit(_)
            | NodeKind::CharLit(_)
            | NodeKind::StringLit(_)
            | NodeKind::Var(_) => 0,
        }
    }

    pub fn has_child(&self, index: usize) -> bool {
        self.child(index).is_some()
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        match (&self.kind, index) {
            (NodeKind::Block(block), i) => block.statements.get(i),
            (NodeKind::FunctionCall(call), i) => call.arguments.get(i),
            (NodeKind::Function(function), 0) => Some(&*function.body),
            (NodeKind::If(if_node), 0) => Some(&*if_node.condition),
            (NodeKind::If(if_node), 1) => Some(&*if_node.then_branch),
            (NodeKind::If(if_node), 2) => if_node.else_branch.as_deref(),
            (NodeKind::While(while_loop), 0) => Some(&*while_loop.condition),
            (NodeKind::While(while_loop), 1) => Some(&*while_loop.body),
            (NodeKind::Math1(math1), 0) => Some(&*math1.operand),
            (NodeKind::Math2(math2), 0) => Some(&*math2.lhs),
            (NodeKind::Math2(math2), 1) => Some(&*math2.rhs),
            (NodeKind::Indexing(indexing), 0) => Some(&*indexing.base),
            (NodeKind::Indexing(indexing), 1) => Some(&*indexing.index),
            (
                NodeKind::Return(operand)
                | NodeKind::Size(operand)
                | NodeKind::ToInt(operand)
                | NodeKind::ToDouble(operand)
                | NodeKind::ToString(operand),
                0,
            ) => Some(&**operand),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut Node> {
        match (&mut self.kind, index) {
            (NodeKind::Block(block), i) => block.statements.get_mut(i),
            (NodeKind::FunctionCall(call), i) => call.arguments.get_mut(i),
            (NodeKind::Function(function), 0) => Some(&mut *function.body),
            (NodeKind::If(if_node), 0) => Some(&mut *if_node.condition),
            (NodeKind::If(if_node), 1) => Some(&mut *if_node.then_branch),
            (NodeKind::If(if_node), 2) => if_node.else_branch.as_deref_mut(),
            (NodeKind::While(while_loop), 0) => Some(&mut *while_loop.condition),
            (NodeKind::While(while_loop), 1) => Some(&mut *while_loop.body),
            (NodeKind::Math1(math1), 0) => Some(&mut *math1.operand),
            (NodeKind::Math2(math2), 0) => Some(&mut *math2.lhs),
            (NodeKind::Math2(math2), 1) => Some(&mut *math2.rhs),
            (NodeKind::Indexing(indexing), 0) => Some(&mut *indexing.base),
            (NodeKind::Indexing(indexing), 1) => Some(&mut *indexing.index),
            (
                NodeKind::Return(operand)
                | NodeKind::Size(operand)
                | NodeKind::ToInt(operand)
                | NodeKind::ToDouble(operand)
                | NodeKind::ToString(operand),
                0,
            ) => Some(&mut **operand),
            _ => None,
        }
    }

    /// Puts `node` into the child slot at `index`, returning whatever
    /// previously occupied it. The parent keeps its identity. Fails (handing
    /// the node back) if this kind has no such slot.
    pub fn replace_child(&mut self, index: usize, node: Node) -> Result<Option<Node>, Node> {
        if let NodeKind::If(if_node) = &mut self.kind {
            if index == 2 {
                return Ok(if_node.else_branch.replace(Box::new(node)).map(|old| *old));
            }
        }

        match self.child_mut(index) {
            Some(slot) => Ok(Some(std::mem::replace(slot, node))),
            None => Err(node),
        }
    }

    /// Empties a nullable slot, returning its previous occupant. Mandatory
    /// slots cannot be emptied and yield `None`.
    pub fn take_child(&mut self, index: usize) -> Option<Node> {
        match (&mut self.kind, index) {
            (NodeKind::If(if_node), 2) => if_node.else_branch.take().map(|old| *old),
            _ => None,
        }
    }

    /// Iterates over the occupied child slots in order
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        (0..self.child_count()).filter_map(|i| self.child(i))
    }
}
