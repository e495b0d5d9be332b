#![allow(dead_code)]

//! A reference interpreter for optimizer output plus tree builders shared by
//! the integration tests. Each test runs a program before and after a pass
//! and compares results and the `record` trace.

use hashbrown::HashMap;
use tubular_opt::{
    Function, FunctionId, Node, NodeKind, Program, VarId,
    index::Index,
    middle::ast::{BinaryOp, UnaryOp, clone::clone_function},
};

/// Calls to this function are not resolved against the program. The
/// interpreter appends the argument to its trace and returns 0.
pub fn record_id() -> FunctionId {
    FunctionId::new(999)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Char(char),
    Str(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Int(value) => *value != 0,
            Value::Double(value) => *value != 0.0,
            Value::Char(value) => *value != '\0',
            Value::Str(value) => !value.is_empty(),
        }
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter<'p> {
    program: &'p Program,
    pub trace: Vec<Value>,
    fuel: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            trace: Vec::new(),
            fuel: 1_000_000,
        }
    }

    pub fn call(&mut self, id: FunctionId, arguments: Vec<Value>) -> Value {
        if id == record_id() {
            self.trace.extend(arguments);
            return Value::Int(0);
        }

        let function = self
            .program
            .function(id)
            .unwrap_or_else(|| panic!("call to undefined function {id:?}"));
        assert_eq!(function.parameters.len(), arguments.len(), "arity of {id:?}");

        let mut env: HashMap<VarId, Value> = function
            .parameters
            .iter()
            .copied()
            .zip(arguments)
            .collect();

        match self.exec(&function.body, &mut env) {
            Flow::Return(value) => value,
            Flow::Normal => Value::Int(0),
            Flow::Break | Flow::Continue => panic!("loop control escaped {id:?}"),
        }
    }

    fn tick(&mut self) {
        self.fuel = self
            .fuel
            .checked_sub(1)
            .expect("program ran out of fuel");
    }

    fn exec(&mut self, node: &Node, env: &mut HashMap<VarId, Value>) -> Flow {
        self.tick();

        match &node.kind {
            NodeKind::Block(block) => {
                for statement in &block.statements {
                    match self.exec(statement, env) {
                        Flow::Normal => {}
                        flow => return flow,
                    }
                }
                Flow::Normal
            }
            NodeKind::If(if_node) => {
                if self.eval(&if_node.condition, env).truthy() {
                    self.exec(&if_node.then_branch, env)
                } else if let Some(else_branch) = &if_node.else_branch {
                    self.exec(else_branch, env)
                } else {
                    Flow::Normal
                }
            }
            NodeKind::While(while_loop) => {
                while self.eval(&while_loop.condition, env).truthy() {
                    self.tick();
                    match self.exec(&while_loop.body, env) {
                        Flow::Break => break,
                        Flow::Return(value) => return Flow::Return(value),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Flow::Normal
            }
            NodeKind::Return(value) => Flow::Return(self.eval(value, env)),
            NodeKind::Break => Flow::Break,
            NodeKind::Continue => Flow::Continue,
            NodeKind::Function(_) => panic!("nested function definition"),
            _ => {
                self.eval(node, env);
                Flow::Normal
            }
        }
    }

    fn eval(&mut self, node: &Node, env: &mut HashMap<VarId, Value>) -> Value {
        match &node.kind {
            NodeKind::IntLit(value) => Value::Int(*value),
            NodeKind::FloatLit(value) => Value::Double(*value),
            NodeKind::CharLit(value) => Value::Char(*value),
            NodeKind::StringLit(value) => Value::Str(value.clone()),
            NodeKind::Var(id) => env
                .get(id)
                .cloned()
                .unwrap_or_else(|| panic!("read of unassigned {id:?}")),
            NodeKind::FunctionCall(call) => {
                let arguments = call
                    .arguments
                    .iter()
                    .map(|argument| self.eval(argument, env))
                    .collect();
                self.call(call.callee, arguments)
            }
            NodeKind::Math1(math1) => match (math1.op, self.eval(&math1.operand, env)) {
                (UnaryOp::Negate, Value::Int(value)) => Value::Int(value.wrapping_neg()),
                (UnaryOp::Negate, Value::Double(value)) => Value::Double(-value),
                (UnaryOp::Not, value) => Value::Int(i64::from(!value.truthy())),
                (op, value) => panic!("cannot apply {op} to {value:?}"),
            },
            NodeKind::Math2(math2) => match math2.op {
                BinaryOp::Assign => {
                    let id = math2.lhs.var_id().expect("assignment to a non-variable");
                    let value = self.eval(&math2.rhs, env);
                    env.insert(id, value.clone());
                    value
                }
                BinaryOp::LogicalAnd => {
                    let result =
                        self.eval(&math2.lhs, env).truthy() && self.eval(&math2.rhs, env).truthy();
                    Value::Int(i64::from(result))
                }
                BinaryOp::LogicalOr => {
                    let result =
                        self.eval(&math2.lhs, env).truthy() || self.eval(&math2.rhs, env).truthy();
                    Value::Int(i64::from(result))
                }
                op => {
                    let lhs = self.eval(&math2.lhs, env);
                    let rhs = self.eval(&math2.rhs, env);
                    binary(op, lhs, rhs)
                }
            },
            NodeKind::Indexing(indexing) => {
                match (self.eval(&indexing.base, env), self.eval(&indexing.index, env)) {
                    (Value::Str(s), Value::Int(i)) => Value::Char(
                        usize::try_from(i)
                            .ok()
                            .and_then(|i| s.chars().nth(i))
                            .expect("index out of bounds"),
                    ),
                    (base, index) => panic!("cannot index {base:?} with {index:?}"),
                }
            }
            NodeKind::Size(operand) => match self.eval(operand, env) {
                Value::Str(s) => Value::Int(s.chars().count() as i64),
                other => panic!("no size for {other:?}"),
            },
            NodeKind::ToInt(operand) => match self.eval(operand, env) {
                Value::Int(value) => Value::Int(value),
                Value::Double(value) => Value::Int(value as i64),
                Value::Char(value) => Value::Int(i64::from(u32::from(value))),
                other => panic!("cannot convert {other:?} to int"),
            },
            NodeKind::ToDouble(operand) => match self.eval(operand, env) {
                Value::Int(value) => Value::Double(value as f64),
                Value::Double(value) => Value::Double(value),
                other => panic!("cannot convert {other:?} to double"),
            },
            NodeKind::ToString(operand) => Value::Str(match self.eval(operand, env) {
                Value::Int(value) => value.to_string(),
                Value::Double(value) => value.to_string(),
                Value::Char(value) => value.to_string(),
                Value::Str(value) => value,
            }),
            _ => panic!("statement in expression position: {node}"),
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Value {
    use std::cmp::Ordering;

    let ordering = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        _ => panic!("mismatched operands {lhs:?} {op} {rhs:?}"),
    };

    let compare = |test: fn(Ordering) -> bool| Value::Int(i64::from(ordering.is_some_and(test)));

    match (op, lhs, rhs) {
        (BinaryOp::LessThan, ..) => compare(Ordering::is_lt),
        (BinaryOp::LessThanOrEqualTo, ..) => compare(Ordering::is_le),
        (BinaryOp::GreaterThan, ..) => compare(Ordering::is_gt),
        (BinaryOp::GreaterThanOrEqualTo, ..) => compare(Ordering::is_ge),
        (BinaryOp::Equals, ..) => compare(Ordering::is_eq),
        (BinaryOp::NotEquals, ..) => compare(Ordering::is_ne),
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
        (BinaryOp::Subtract, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(b)),
        (BinaryOp::Multiply, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(b)),
        (BinaryOp::Divide, Value::Int(a), Value::Int(b)) => Value::Int(a / b),
        (BinaryOp::Modulus, Value::Int(a), Value::Int(b)) => Value::Int(a % b),
        (BinaryOp::Add, Value::Double(a), Value::Double(b)) => Value::Double(a + b),
        (BinaryOp::Subtract, Value::Double(a), Value::Double(b)) => Value::Double(a - b),
        (BinaryOp::Multiply, Value::Double(a), Value::Double(b)) => Value::Double(a * b),
        (BinaryOp::Divide, Value::Double(a), Value::Double(b)) => Value::Double(a / b),
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
        (op, lhs, rhs) => panic!("cannot apply {op} to {lhs:?} and {rhs:?}"),
    }
}

/// Calls `function` and returns its result along with everything recorded
pub fn run(program: &Program, function: FunctionId, arguments: Vec<Value>) -> (Value, Vec<Value>) {
    let mut interpreter = Interpreter::new(program);
    let result = interpreter.call(function, arguments);
    (result, interpreter.trace)
}

pub fn snapshot(program: &Program) -> Program {
    Program::new(
        program
            .functions()
            .map(|function| clone_function(function).expect("program is clonable")),
    )
}

/* Builders */

pub fn v(n: usize) -> VarId {
    VarId::new(n)
}

pub fn f(n: usize) -> FunctionId {
    FunctionId::new(n)
}

pub fn int(value: i64) -> Node {
    Node::int(value)
}

pub fn var(n: usize) -> Node {
    Node::var(v(n))
}

pub fn add(lhs: Node, rhs: Node) -> Node {
    Node::math2(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: Node, rhs: Node) -> Node {
    Node::math2(BinaryOp::Subtract, lhs, rhs)
}

pub fn mul(lhs: Node, rhs: Node) -> Node {
    Node::math2(BinaryOp::Multiply, lhs, rhs)
}

pub fn modulus(lhs: Node, rhs: Node) -> Node {
    Node::math2(BinaryOp::Modulus, lhs, rhs)
}

pub fn cmp(op: BinaryOp, lhs: Node, rhs: Node) -> Node {
    Node::math2(op, lhs, rhs)
}

pub fn assign(n: usize, value: Node) -> Node {
    Node::assign(v(n), value)
}

/// `vN = vN + step`
pub fn step(n: usize, step: i64) -> Node {
    if step < 0 {
        assign(n, sub(var(n), int(-step)))
    } else {
        assign(n, add(var(n), int(step)))
    }
}

pub fn call(n: usize, arguments: Vec<Node>) -> Node {
    Node::call(f(n), arguments)
}

pub fn record(value: Node) -> Node {
    Node::call(record_id(), vec![value])
}

pub fn ret(value: Node) -> Node {
    Node::ret(value)
}

pub fn block(statements: Vec<Node>) -> Node {
    Node::block(statements)
}

pub fn function(n: usize, parameters: &[usize], body: Vec<Node>) -> Function {
    Function::new(
        f(n),
        parameters.iter().map(|&p| v(p)).collect(),
        Node::block(body),
    )
}
