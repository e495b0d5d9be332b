//! Deep copies of syntax subtrees.
//!
//! Every kind is matched explicitly (no wildcard arm) so adding a node kind
//! without teaching the cloner about it is a build error rather than a clone
//! that silently drops children. A clone either reproduces the whole subtree
//! or fails with `None`; callers abandon the rewrite they were attempting in
//! that case and never apply a partial copy.

use super::{
    Block, Function, FunctionCall, If, Indexing, Math1, Math2, Node, NodeKind, While,
};

/// Clones a subtree that may legally appear inside a function body. Returns
/// `None` if the subtree contains a function definition.
pub fn clone_node(node: &Node) -> Option<Node> {
    let kind = match &node.kind {
        NodeKind::Block(block) => NodeKind::Block(Block {
            statements: clone_all(&block.statements)?,
        }),
        // Function definitions only exist at the top level of a program
        NodeKind::Function(_) => return None,
        NodeKind::FunctionCall(call) => NodeKind::FunctionCall(FunctionCall {
            callee: call.callee,
            arguments: clone_all(&call.arguments)?,
        }),
        NodeKind::If(if_node) => NodeKind::If(If {
            condition: clone_boxed(&if_node.condition)?,
            then_branch: clone_boxed(&if_node.then_branch)?,
            else_branch: match &if_node.else_branch {
                Some(else_branch) => Some(clone_boxed(else_branch)?),
                None => None,
            },
        }),
        NodeKind::While(while_loop) => NodeKind::While(While {
            condition: clone_boxed(&while_loop.condition)?,
            body: clone_boxed(&while_loop.body)?,
        }),
        NodeKind::Return(value) => NodeKind::Return(clone_boxed(value)?),
        NodeKind::Break => NodeKind::Break,
        NodeKind::Continue => NodeKind::Continue,
        NodeKind::Math1(math1) => NodeKind::Math1(Math1 {
            op: math1.op,
            operand: clone_boxed(&math1.operand)?,
        }),
        NodeKind::Math2(math2) => NodeKind::Math2(Math2 {
            op: math2.op,
            lhs: clone_boxed(&math2.lhs)?,
            rhs: clone_boxed(&math2.rhs)?,
        }),
        NodeKind::IntLit(value) => NodeKind::IntLit(*value),
        NodeKind::FloatLit(value) => NodeKind::FloatLit(*value),
        NodeKind::CharLit(value) => NodeKind::CharLit(*value),
        NodeKind::StringLit(value) => NodeKind::StringLit(value.clone()),
        NodeKind::Var(id) => NodeKind::Var(*id),
        NodeKind::Indexing(indexing) => NodeKind::Indexing(Indexing {
            base: clone_boxed(&indexing.base)?,
            index: clone_boxed(&indexing.index)?,
        }),
        NodeKind::Size(operand) => NodeKind::Size(clone_boxed(operand)?),
        NodeKind::ToInt(operand) => NodeKind::ToInt(clone_boxed(operand)?),
        NodeKind::ToDouble(operand) => NodeKind::ToDouble(clone_boxed(operand)?),
        NodeKind::ToString(operand) => NodeKind::ToString(clone_boxed(operand)?),
    };

    Some(Node::new(node.span, kind))
}

/// Clones a whole function definition, including its body
pub fn clone_function(function: &Function) -> Option<Function> {
    Some(Function {
        id: function.id,
        parameters: function.parameters.clone(),
        body: clone_boxed(&function.body)?,
    })
}

/// Clones every node in the list or none of them
pub fn clone_all(nodes: &[Node]) -> Option<Vec<Node>> {
    nodes.iter().map(clone_node).collect()
}

fn clone_boxed(node: &Node) -> Option<Box<Node>> {
    clone_node(node).map(Box::new)
}
