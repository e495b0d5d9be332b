//! Loop unrolling for counting loops of the shape
//!
//! ```text
//! while (i < B) {
//!     ...
//!     i = i + 1;
//!     ...
//! }
//! ```
//!
//! The loop is replaced by a main loop running `factor` copies of the body per
//! iteration, stopping early enough that it can never overshoot `B`, followed
//! by an untouched copy of the original loop which finishes whatever
//! iterations are left.

use super::Pass;
use crate::middle::{
    ast::{
        BinaryOp, Block, Math2, Node, NodeKind, VarId,
        clone::clone_node,
        visit::{
            contains_call, contains_control_transfer, contains_loop, count_assignments_to,
            count_nodes,
        },
    },
    ty::TypeLookup,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrollOptions {
    /// Number of body copies in the main loop. 1 disables unrolling.
    pub factor: usize,
    /// Accepts variable bounds and steps other than 1
    pub aggressive: bool,
    /// Unrolls inner loops first, then lets loops containing loops be unrolled
    pub unroll_nested: bool,
    /// Largest main loop body (in nodes) the pass will build
    pub max_unrolled_nodes: usize,
}

impl Default for UnrollOptions {
    fn default() -> Self {
        Self {
            factor: 4,
            aggressive: false,
            unroll_nested: false,
            max_unrolled_nodes: 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Literal(i64),
    Variable(VarId),
}

/// The shape of an unrollable loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CountingLoop {
    var: VarId,
    comparison: BinaryOp,
    bound: Bound,
    step: i64,
    /// Position of `var = var + step` in the body
    increment: usize,
}

pub struct LoopUnrolling {
    options: UnrollOptions,
}

impl LoopUnrolling {
    pub fn new(options: UnrollOptions) -> Self {
        Self { options }
    }

    /// Unrolls every eligible loop below `node`, returning how many were
    /// unrolled
    fn unroll_in(&self, node: &mut Node) -> usize {
        let mut rewrites = 0;

        // Statements of a block can be spliced in place
        if let Some(block) = node.as_block_mut() {
            let statements = std::mem::take(&mut block.statements);
            let mut spliced = Vec::with_capacity(statements.len());

            for mut statement in statements {
                if let Some((main, remainder)) = self.visit_loop(&mut statement, &mut rewrites) {
                    spliced.push(main);
                    spliced.push(remainder);
                } else {
                    spliced.push(statement);
                }
            }

            block.statements = spliced;
            return rewrites;
        }

        for i in 0..node.child_count() {
            let Some(child) = node.child_mut(i) else {
                continue;
            };

            if let Some((main, remainder)) = self.visit_loop(child, &mut rewrites) {
                let span = main.span;
                *child = Node::block(vec![main, remainder]).with_span(span);
            }
        }

        rewrites
    }

    /// Tries to unroll `node` if it is a loop, otherwise keeps looking below
    /// it. Returns the main and remainder loops that should replace `node`.
    fn visit_loop(&self, node: &mut Node, rewrites: &mut usize) -> Option<(Node, Node)> {
        if !matches!(node.kind, NodeKind::While(_)) {
            *rewrites += self.unroll_in(node);
            return None;
        }

        if self.options.unroll_nested {
            if let NodeKind::While(while_loop) = &mut node.kind {
                *rewrites += self.unroll_in(&mut while_loop.body);
            }
        }

        let unrolled = match self.analyze(node) {
            Ok(counting) => self.unroll(node, counting),
            Err(reason) => {
                log::debug!("not unrolling loop at {:?}: {reason}", node.span);
                None
            }
        };

        if unrolled.is_some() {
            *rewrites += 1;
            return unrolled;
        }

        // Inner loops may still be unrollable
        if !self.options.unroll_nested {
            if let NodeKind::While(while_loop) = &mut node.kind {
                *rewrites += self.unroll_in(&mut while_loop.body);
            }
        }

        None
    }

    fn analyze(&self, node: &Node) -> Result<CountingLoop, &'static str> {
        let while_loop = node.as_while().ok_or("not a loop")?;

        let condition = while_loop
            .condition
            .as_math2()
            .filter(|math2| is_ordering(math2.op))
            .ok_or("condition is not an ordering comparison")?;

        let var = condition
            .lhs
            .var_id()
            .ok_or("left side of the condition is not a variable")?;

        let bound = match (&condition.rhs.kind, self.options.aggressive) {
            (NodeKind::IntLit(value), _) => Bound::Literal(*value),
            (NodeKind::Var(id), true) if *id != var => Bound::Variable(*id),
            _ => return Err("bound is not a constant"),
        };

        let body = while_loop.body.as_block().ok_or("body is not a block")?;

        if !self.options.unroll_nested && contains_loop(&while_loop.body) {
            return Err("body contains a nested loop");
        }

        if contains_control_transfer(&while_loop.body) {
            return Err("body contains break, continue or return");
        }

        if count_assignments_to(&while_loop.body, var) != 1 {
            return Err("induction variable is not assigned exactly once");
        }

        let (increment, step) =
            find_increment(body, var).ok_or("no constant step of the induction variable")?;

        if step.unsigned_abs() != 1 && !self.options.aggressive {
            return Err("step is not 1");
        }

        let increasing = matches!(condition.op, BinaryOp::LessThan | BinaryOp::LessThanOrEqualTo);
        if (increasing && step <= 0) || (!increasing && step >= 0) {
            return Err("step moves away from the bound");
        }

        if let Bound::Variable(bound) = bound {
            if count_assignments_to(&while_loop.body, bound) != 0
                || contains_call(&while_loop.body)
            {
                return Err("bound may change inside the loop");
            }
        }

        Ok(CountingLoop {
            var,
            comparison: condition.op,
            bound,
            step,
            increment,
        })
    }

    /// Builds the main and remainder loops. `None` if any piece cannot be
    /// built safely, in which case the loop is left as it is.
    fn unroll(&self, node: &Node, counting: CountingLoop) -> Option<(Node, Node)> {
        let while_loop = node.as_while()?;
        let body = while_loop.body.as_block()?;
        let factor = i64::try_from(self.options.factor).ok()?;

        let condition = adjusted_condition(&while_loop.condition, counting, factor)?;

        let mut statements = Vec::with_capacity(body.statements.len() * self.options.factor);
        for copy in 0..factor {
            for (i, statement) in body.statements.iter().enumerate() {
                if i == counting.increment {
                    continue;
                }

                // Statements after the increment observe the stepped value
                let offset = if i < counting.increment {
                    copy.checked_mul(counting.step)?
                } else {
                    (copy + 1).checked_mul(counting.step)?
                };

                let mut statement = clone_node(statement)?;
                offset_reads(&mut statement, counting.var, offset);
                statements.push(statement);
            }
        }

        let increment = body.statements.get(counting.increment)?;
        statements.push(
            Node::assign(
                counting.var,
                offset_var(counting.var, factor.checked_mul(counting.step)?),
            )
            .with_span(increment.span),
        );

        let unrolled_body = Node::block(statements).with_span(while_loop.body.span);
        let size = count_nodes(&unrolled_body);
        if size > self.options.max_unrolled_nodes {
            log::debug!(
                "not unrolling loop at {:?}, body would have {size} nodes",
                node.span
            );
            return None;
        }

        let main = Node::while_loop(condition, unrolled_body).with_span(node.span);
        let remainder = clone_node(node)?;

        log::debug!(
            "unrolled loop at {:?} over {:?} by {}",
            node.span,
            counting.var,
            self.options.factor
        );

        Some((main, remainder))
    }
}

impl Pass for LoopUnrolling {
    fn name(&self) -> &'static str {
        "LoopUnrolling"
    }

    fn run(&mut self, root: &mut Node, _types: &dyn TypeLookup) -> usize {
        if self.options.factor <= 1 {
            return 0;
        }

        self.unroll_in(root)
    }
}

fn is_ordering(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::LessThan
            | BinaryOp::LessThanOrEqualTo
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqualTo
    )
}

/// Finds the one statement of the form `var = var + k`, `var = k + var` or
/// `var = var - k` and returns its position and `k` (negated for `-`)
fn find_increment(body: &Block, var: VarId) -> Option<(usize, i64)> {
    body.statements
        .iter()
        .enumerate()
        .filter(|(_, statement)| statement.assigned_var() == Some(var))
        .find_map(|(i, statement)| {
            let value = &statement.as_math2()?.rhs;
            Some((i, step_of(value, var)?))
        })
}

fn step_of(value: &Node, var: VarId) -> Option<i64> {
    let Math2 { op, lhs, rhs } = value.as_math2()?;

    match (op, lhs.var_id(), rhs.var_id()) {
        (BinaryOp::Add, Some(id), _) if id == var => rhs.int_value(),
        (BinaryOp::Add, _, Some(id)) if id == var => lhs.int_value(),
        (BinaryOp::Subtract, Some(id), _) if id == var => rhs.int_value()?.checked_neg(),
        _ => None,
    }
}

/// The main loop condition, tightened so that `factor` iterations never run
/// past the original bound
fn adjusted_condition(condition: &Node, counting: CountingLoop, factor: i64) -> Option<Node> {
    let magnitude = counting.step.checked_abs()?;

    // How far the bound moves towards the start
    let copies = match counting.comparison {
        BinaryOp::LessThan | BinaryOp::GreaterThan => factor,
        _ => factor - 1,
    };
    let distance = copies.checked_mul(magnitude)?;
    let increasing = counting.step > 0;
    let original = condition.as_math2()?;

    let adjusted = match counting.bound {
        Bound::Literal(value) => {
            let bound = if increasing {
                value.checked_sub(distance)?
            } else {
                value.checked_add(distance)?
            };
            Node::math2(
                counting.comparison,
                clone_node(&original.lhs)?,
                Node::int(bound).with_span(original.rhs.span),
            )
        }
        // `var < bound - distance` could wrap at runtime. The gap between
        // the two is only computed once the original condition holds, and
        // a gap too large to represent wraps negative and fails the test.
        Bound::Variable(id) => {
            let gap = if increasing {
                Node::math2(BinaryOp::Subtract, Node::var(id), Node::var(counting.var))
            } else {
                Node::math2(BinaryOp::Subtract, Node::var(counting.var), Node::var(id))
            };
            let gap_test = match counting.comparison {
                BinaryOp::LessThan | BinaryOp::GreaterThan => BinaryOp::GreaterThan,
                _ => BinaryOp::GreaterThanOrEqualTo,
            };

            Node::math2(
                BinaryOp::LogicalAnd,
                clone_node(condition)?,
                Node::math2(gap_test, gap, Node::int(distance)).with_span(original.rhs.span),
            )
        }
    };

    Some(adjusted.with_span(condition.span))
}

/// `var + offset`, or `var - |offset|` for negative offsets
fn offset_var(var: VarId, offset: i64) -> Node {
    if offset < 0 {
        Node::math2(
            BinaryOp::Subtract,
            Node::var(var),
            Node::int(offset.unsigned_abs() as i64),
        )
    } else {
        Node::math2(BinaryOp::Add, Node::var(var), Node::int(offset))
    }
}

/// Rewrites every read of `var` below `node` to `var + offset`
fn offset_reads(node: &mut Node, var: VarId, offset: i64) {
    if offset == 0 {
        return;
    }

    if node.var_id() == Some(var) {
        let span = node.span;
        *node = offset_var(var, offset).with_span(span);
        return;
    }

    for i in 0..node.child_count() {
        // Left side of an assignment is a write
        if i == 0 && node.assigned_var().is_some() {
            continue;
        }

        if let Some(child) = node.child_mut(i) {
            offset_reads(child, var, offset);
        }
    }
}
