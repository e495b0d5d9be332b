//! Trait definition for a read-only AST visitor which walks the tree in DFS
//! order, plus the structural queries the optimization passes are built on.

use hashbrown::HashSet;

use super::{BinaryOp, FunctionCall, FunctionId, Math2, Node, NodeKind, VarId, While};

pub trait Visitor<'ast>: Sized {
    fn visit_node(&mut self, node: &'ast Node) {
        walk_node(self, node)
    }

    fn visit_function_call(&mut self, call: &'ast FunctionCall) {
        walk_function_call(self, call)
    }

    fn visit_math2(&mut self, math2: &'ast Math2) {
        walk_math2(self, math2)
    }

    fn visit_while(&mut self, while_loop: &'ast While) {
        walk_while(self, while_loop)
    }

    fn visit_var(&mut self, _id: VarId) {}
}

pub fn walk_node<'a>(visitor: &mut impl Visitor<'a>, node: &'a Node) {
    match &node.kind {
        NodeKind::FunctionCall(call) => visitor.visit_function_call(call),
        NodeKind::Math2(math2) => visitor.visit_math2(math2),
        NodeKind::While(while_loop) => visitor.visit_while(while_loop),
        NodeKind::Var(id) => visitor.visit_var(*id),
        _ => {
            for child in node.children() {
                visitor.visit_node(child);
            }
        }
    }
}

pub fn walk_function_call<'a>(visitor: &mut impl Visitor<'a>, call: &'a FunctionCall) {
    for argument in &call.arguments {
        visitor.visit_node(argument);
    }
}

pub fn walk_math2<'a>(visitor: &mut impl Visitor<'a>, math2: &'a Math2) {
    visitor.visit_node(&math2.lhs);
    visitor.visit_node(&math2.rhs);
}

pub fn walk_while<'a>(visitor: &mut impl Visitor<'a>, while_loop: &'a While) {
    visitor.visit_node(&while_loop.condition);
    visitor.visit_node(&while_loop.body);
}

/* Queries */

/// Total number of nodes in the subtree, including `node` itself
pub fn count_nodes(node: &Node) -> usize {
    1 + node.children().map(count_nodes).sum::<usize>()
}

/// Whether any node in the subtree satisfies `predicate`
pub fn any_node(node: &Node, predicate: &impl Fn(&Node) -> bool) -> bool {
    predicate(node) || node.children().any(|child| any_node(child, predicate))
}

pub fn contains_call(node: &Node) -> bool {
    any_node(node, &|n| matches!(n.kind, NodeKind::FunctionCall(_)))
}

pub fn contains_call_to(node: &Node, callee: FunctionId) -> bool {
    any_node(node, &|n| n.as_call().is_some_and(|call| call.callee == callee))
}

pub fn contains_assignment(node: &Node) -> bool {
    any_node(node, &Node::is_assignment)
}

pub fn contains_loop(node: &Node) -> bool {
    any_node(node, &|n| matches!(n.kind, NodeKind::While(_)))
}

/// `break`, `continue` or `return` anywhere in the subtree
pub fn contains_control_transfer(node: &Node) -> bool {
    any_node(node, &|n| {
        matches!(
            n.kind,
            NodeKind::Break | NodeKind::Continue | NodeKind::Return(_)
        )
    })
}

/// An expression is side effect free when evaluating it cannot write to any
/// variable or run arbitrary code
pub fn is_side_effect_free(node: &Node) -> bool {
    !contains_call(node) && !contains_assignment(node)
}

pub fn count_assignments_to(node: &Node, var: VarId) -> usize {
    let own = usize::from(node.assigned_var() == Some(var));
    own + node
        .children()
        .map(|child| count_assignments_to(child, var))
        .sum::<usize>()
}

/// Collects every variable whose value is read by the subtree. The target of
/// a plain `var = ...` assignment is a write, not a read.
#[derive(Debug, Default)]
pub struct VariableReads {
    pub reads: HashSet<VarId>,
}

impl VariableReads {
    pub fn collect(node: &Node) -> HashSet<VarId> {
        let mut collector = Self::default();
        collector.visit_node(node);
        collector.reads
    }
}

impl<'ast> Visitor<'ast> for VariableReads {
    fn visit_math2(&mut self, math2: &'ast Math2) {
        if math2.op == BinaryOp::Assign && math2.lhs.var_id().is_some() {
            self.visit_node(&math2.rhs);
        } else {
            walk_math2(self, math2);
        }
    }

    fn visit_var(&mut self, id: VarId) {
        self.reads.insert(id);
    }
}

/// Division and indexing are the only operations that can fail at runtime
pub fn cannot_trap(node: &Node) -> bool {
    !any_node(node, &|n| match &n.kind {
        NodeKind::Math2(math2) => matches!(math2.op, BinaryOp::Divide | BinaryOp::Modulus),
        NodeKind::Indexing(_) => true,
        _ => false,
    })
}
