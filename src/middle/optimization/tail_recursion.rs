//! Turns self tail calls into a loop. A function such as
//!
//! ```text
//! fn fact(n, acc) {
//!     if (n <= 1) { return acc; } else { return fact(n - 1, acc * n); }
//! }
//! ```
//!
//! becomes
//!
//! ```text
//! fn fact(n, acc) {
//!     while (1) {
//!         if (n <= 1) { return acc; } else { acc = acc * n; n = n - 1; continue; }
//!     }
//!     return 0;
//! }
//! ```
//!
//! Parameters are reassigned in an order where no update clobbers a value a
//! later update still needs. Call sites where no such order exists are left as
//! ordinary recursion.

use std::collections::VecDeque;

use super::Pass;
use crate::middle::{
    ast::{
        Function, FunctionId, Node, NodeKind, VarId,
        clone::clone_node,
        visit::{VariableReads, cannot_trap, contains_assignment, contains_call},
    },
    ty::TypeLookup,
};

#[derive(Debug, Default)]
pub struct TailRecursion;

impl TailRecursion {
    pub fn new() -> Self {
        Self
    }

    fn loopify(&self, function: &mut Function, types: &dyn TypeLookup) -> usize {
        if !matches!(function.body.kind, NodeKind::Block(_)) {
            return 0;
        }

        let Some(return_type) = types.return_type(function.id) else {
            log::debug!("return type of {:?} is unknown, leaving it alone", function.id);
            return 0;
        };

        let rewrites = rewrite_tail_calls(&mut function.body, function.id, &function.parameters);
        if rewrites == 0 {
            return 0;
        }

        let span = function.body.span;
        let mut body = std::mem::replace(&mut *function.body, Node::block(vec![]));
        if falls_through(&body) {
            if let Some(block) = body.as_block_mut() {
                block.statements.push(Node::break_loop().with_span(span));
            }
        }

        *function.body = Node::block(vec![
            Node::while_loop(Node::int(1).with_span(span), body).with_span(span),
            Node::ret(return_type.default_literal(span)).with_span(span),
        ])
        .with_span(span);

        log::debug!(
            "turned {rewrites} tail call(s) of {:?} into a loop",
            function.id
        );

        rewrites
    }
}

impl Pass for TailRecursion {
    fn name(&self) -> &'static str {
        "TailRecursion"
    }

    fn run(&mut self, root: &mut Node, types: &dyn TypeLookup) -> usize {
        match root.as_function_mut() {
            Some(function) => self.loopify(function, types),
            None => 0,
        }
    }
}

/// Replaces every `return f(...)` reachable through blocks and ifs with
/// parameter updates and a `continue`. Loops are not entered, a `continue`
/// there would restart the wrong loop.
fn rewrite_tail_calls(node: &mut Node, function: FunctionId, parameters: &[VarId]) -> usize {
    match &mut node.kind {
        NodeKind::Block(block) => block
            .statements
            .iter_mut()
            .map(|statement| rewrite_tail_calls(statement, function, parameters))
            .sum(),
        NodeKind::If(if_node) => {
            let mut rewrites = rewrite_tail_calls(&mut if_node.then_branch, function, parameters);
            if let Some(else_branch) = &mut if_node.else_branch {
                rewrites += rewrite_tail_calls(else_branch, function, parameters);
            }
            rewrites
        }
        NodeKind::Return(value) => match parameter_updates(value, function, parameters) {
            Some(updates) => {
                let span = node.span;
                *node = updates.with_span(span);
                1
            }
            None => 0,
        },
        _ => 0,
    }
}

/// Builds `{ p_i = a_i; ...; continue; }` for a self call returned by
/// `value`, or `None` if this call site has to stay a call
fn parameter_updates(value: &Node, function: FunctionId, parameters: &[VarId]) -> Option<Node> {
    let call = value.as_call().filter(|call| call.callee == function)?;

    if call.arguments.len() != parameters.len() {
        log::debug!(
            "tail call to {function:?} has {} arguments, expected {}",
            call.arguments.len(),
            parameters.len()
        );
        return None;
    }

    // Evaluation order of the arguments is not preserved
    if call.arguments.iter().any(contains_assignment)
        || call.arguments.iter().filter(|argument| contains_call(argument)).count() > 1
    {
        log::debug!("tail call to {function:?} has arguments with side effects");
        return None;
    }

    // `p = p` needs no update
    let updates: Vec<(VarId, &Node)> = parameters
        .iter()
        .copied()
        .zip(&call.arguments)
        .filter(|(parameter, argument)| argument.var_id() != Some(*parameter))
        .collect();

    let Some(order) = update_order(&updates) else {
        log::debug!("tail call to {function:?} has circular parameter updates");
        return None;
    };

    if !keeps_effects_in_place(&updates, &order) {
        log::debug!("tail call to {function:?} would move a call across a trap");
        return None;
    }

    let mut statements = Vec::with_capacity(order.len() + 1);
    for i in order {
        let (parameter, argument) = updates[i];
        statements.push(Node::assign(parameter, clone_node(argument)?).with_span(argument.span));
    }
    statements.push(Node::continue_loop().with_span(value.span));

    Some(Node::block(statements))
}

/// Orders the updates so that an update reading parameter `p` runs before
/// the update overwriting `p`. Ties are broken by parameter position. `None`
/// if the reads form a cycle.
fn update_order(updates: &[(VarId, &Node)]) -> Option<Vec<usize>> {
    // successors[i] must run after i
    let mut successors = vec![Vec::new(); updates.len()];
    let mut in_degree = vec![0usize; updates.len()];

    for (i, (_, argument)) in updates.iter().enumerate() {
        let reads = VariableReads::collect(argument);
        for (j, (parameter, _)) in updates.iter().enumerate() {
            if i != j && reads.contains(parameter) {
                successors[i].push(j);
                in_degree[j] += 1;
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..updates.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(updates.len());

    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &j in &successors[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push_back(j);
            }
        }
    }

    (order.len() == updates.len()).then_some(order)
}

/// With a call among the arguments, every update that can trap has to stay
/// on the same side of that call as its argument was in the original call.
fn keeps_effects_in_place(updates: &[(VarId, &Node)], order: &[usize]) -> bool {
    let Some(effectful) = updates
        .iter()
        .position(|(_, argument)| contains_call(argument))
    else {
        return true;
    };

    let emitted_at = |update: usize| order.iter().position(|&i| i == update);
    let Some(effect_slot) = emitted_at(effectful) else {
        return false;
    };

    updates
        .iter()
        .enumerate()
        .filter(|(i, (_, argument))| *i != effectful && !cannot_trap(argument))
        .all(|(i, _)| {
            emitted_at(i).is_some_and(|slot| (slot < effect_slot) == (i < effectful))
        })
}

/// Whether control can reach the end of `node` without returning or leaving
/// the loop
fn falls_through(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Return(_) | NodeKind::Break | NodeKind::Continue => false,
        NodeKind::Block(block) => block.statements.last().is_none_or(falls_through),
        NodeKind::If(if_node) => match &if_node.else_branch {
            Some(else_branch) => falls_through(&if_node.then_branch) || falls_through(else_branch),
            None => true,
        },
        _ => true,
    }
}
