//! Replaces calls to small pure functions with the callee's return
//! expression, parameters substituted by the call's arguments.

use hashbrown::HashMap;

use super::Pass;
use crate::middle::{
    ast::{
        BinaryOp, Function, FunctionCall, FunctionId, Node, NodeKind, Program, Span, VarId,
        clone::clone_node,
        visit::{
            any_node, cannot_trap, contains_assignment, contains_call, contains_call_to,
            count_nodes, is_side_effect_free,
        },
    },
    ty::{Type, TypeLookup},
    type_check::check_expression,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineOptions {
    /// Doubles the callee size ceiling
    pub aggressive: bool,
    /// Lets self-recursive functions be inlined into themselves, bounded by
    /// `max_depth`
    pub allow_recursive: bool,
    pub max_depth: usize,
    /// Largest return expression (in nodes) considered for inlining
    pub max_nodes: usize,
    /// Largest argument that may be duplicated into a parameter used more
    /// than once
    pub max_duplicated_argument_nodes: usize,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            aggressive: false,
            allow_recursive: false,
            max_depth: 3,
            max_nodes: 40,
            max_duplicated_argument_nodes: 5,
        }
    }
}

impl InlineOptions {
    fn node_limit(&self) -> usize {
        if self.aggressive {
            self.max_nodes.saturating_mul(2)
        } else {
            self.max_nodes
        }
    }
}

/// What the pass remembers about a function between `prepare` and `run`
#[derive(Debug)]
struct Callee {
    parameters: Vec<VarId>,
    recursive: bool,
    /// Present only if the function is eligible for inlining
    expression: Option<Node>,
    return_type: Option<Type>,
    /// How many times each parameter is read by `expression`
    uses: HashMap<VarId, usize>,
    /// `expression` contains `&&` or `||`, so parts of it may never be
    /// evaluated
    short_circuits: bool,
    /// `expression` can stop the program on its own (division, indexing or a
    /// recursive call)
    may_trap: bool,
}

impl Callee {
    fn uses_of(&self, parameter: VarId) -> usize {
        self.uses.get(&parameter).copied().unwrap_or(0)
    }
}

pub struct FunctionInlining {
    options: InlineOptions,
    callees: HashMap<FunctionId, Callee>,
}

impl FunctionInlining {
    pub fn new(options: InlineOptions) -> Self {
        Self {
            options,
            callees: HashMap::new(),
        }
    }

    /// Whether `prepare` found the function eligible for inlining
    pub fn is_eligible(&self, function: FunctionId) -> bool {
        self.callees
            .get(&function)
            .is_some_and(|callee| callee.expression.is_some())
    }

    fn analyze(&self, function: &Function, types: &dyn TypeLookup) -> Callee {
        let mut callee = Callee {
            parameters: function.parameters.clone(),
            recursive: contains_call_to(&function.body, function.id),
            expression: None,
            return_type: types.return_type(function.id),
            uses: HashMap::new(),
            short_circuits: false,
            may_trap: false,
        };

        if callee.recursive && !self.options.allow_recursive {
            log::debug!("{:?} is self-recursive, not inlining it", function.id);
            return callee;
        }

        let Some(expression) = single_return_expression(&function.body) else {
            log::trace!("{:?} is not a single return", function.id);
            return callee;
        };

        let mut uses = HashMap::new();
        if !self.is_pure(expression, function, &mut uses) {
            log::debug!("{:?} returns an impure expression, not inlining it", function.id);
            return callee;
        }

        let size = count_nodes(expression);
        if size > self.options.node_limit() {
            log::debug!(
                "{:?} is too large to inline ({size} > {} nodes)",
                function.id,
                self.options.node_limit()
            );
            return callee;
        }

        callee.uses = uses;
        callee.short_circuits = any_node(expression, &|node| {
            node.as_math2().is_some_and(|math2| {
                matches!(math2.op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
            })
        });
        callee.may_trap = !cannot_trap(expression) || contains_call(expression);
        callee.expression = clone_node(expression);
        callee
    }

    /// Literals, parameter reads, arithmetic, indexing, `size` and casts.
    /// Counts parameter reads into `uses` along the way.
    fn is_pure(&self, node: &Node, function: &Function, uses: &mut HashMap<VarId, usize>) -> bool {
        match &node.kind {
            NodeKind::IntLit(_)
            | NodeKind::FloatLit(_)
            | NodeKind::CharLit(_)
            | NodeKind::StringLit(_) => true,
            NodeKind::Var(id) => {
                if !function.is_parameter(*id) {
                    return false;
                }
                *uses.entry(*id).or_insert(0) += 1;
                true
            }
            NodeKind::Math1(math1) => self.is_pure(&math1.operand, function, uses),
            NodeKind::Math2(math2) => {
                math2.op != BinaryOp::Assign
                    && self.is_pure(&math2.lhs, function, uses)
                    && self.is_pure(&math2.rhs, function, uses)
            }
            NodeKind::Indexing(indexing) => {
                self.is_pure(&indexing.base, function, uses)
                    && self.is_pure(&indexing.index, function, uses)
            }
            NodeKind::Size(operand)
            | NodeKind::ToInt(operand)
            | NodeKind::ToDouble(operand)
            | NodeKind::ToString(operand) => self.is_pure(operand, function, uses),
            // Only reachable through the recursive override, depth bounded at
            // the call site
            NodeKind::FunctionCall(call) => {
                self.options.allow_recursive
                    && call.callee == function.id
                    && call
                        .arguments
                        .iter()
                        .all(|argument| self.is_pure(argument, function, uses))
            }
            NodeKind::Block(_)
            | NodeKind::Function(_)
            | NodeKind::If(_)
            | NodeKind::While(_)
            | NodeKind::Return(_)
            | NodeKind::Break
            | NodeKind::Continue => false,
        }
    }

    /// Inlines every eligible call below `node`. Returns the number of calls
    /// replaced.
    fn inline_calls(&self, node: &mut Node, depth: usize, types: &dyn TypeLookup) -> usize {
        let mut rewrites = 0;

        for i in 0..node.child_count() {
            let replacement = node
                .child(i)
                .and_then(|child| Some((child.as_call()?, child.span)))
                .and_then(|(call, span)| self.inline_call(call, span, depth, types));

            match replacement {
                Some((inlined, nested)) => {
                    if node.replace_child(i, inlined).is_ok() {
                        rewrites += 1 + nested;
                    }
                }
                None => {
                    if let Some(child) = node.child_mut(i) {
                        rewrites += self.inline_calls(child, depth, types);
                    }
                }
            }
        }

        rewrites
    }

    /// Like `inline_calls`, but `node` itself may be the call being replaced
    fn inline_expression(
        &self,
        mut node: Node,
        depth: usize,
        types: &dyn TypeLookup,
    ) -> (Node, usize) {
        if let Some(call) = node.as_call() {
            if let Some((inlined, nested)) = self.inline_call(call, node.span, depth, types) {
                return (inlined, nested + 1);
            }
        }

        let rewrites = self.inline_calls(&mut node, depth, types);
        (node, rewrites)
    }

    /// Builds the replacement for one call site, along with the number of
    /// nested calls that were inlined into it. `None` leaves the call alone.
    fn inline_call(
        &self,
        call: &FunctionCall,
        span: Span,
        depth: usize,
        types: &dyn TypeLookup,
    ) -> Option<(Node, usize)> {
        let callee = self.callees.get(&call.callee)?;
        let expression = callee.expression.as_ref()?;

        if depth >= self.options.max_depth {
            log::trace!("not inlining {:?}, depth limit reached", call.callee);
            return None;
        }

        if call.arguments.len() != callee.parameters.len() {
            log::debug!(
                "not inlining {:?}, expected {} arguments but found {}",
                call.callee,
                callee.parameters.len(),
                call.arguments.len()
            );
            return None;
        }

        // Arguments belong to the caller, so they are expanded at its depth
        let mut nested = 0;
        let mut arguments = Vec::with_capacity(call.arguments.len());
        for argument in &call.arguments {
            let (argument, rewrites) = self.inline_expression(clone_node(argument)?, depth, types);
            nested += rewrites;
            arguments.push(argument);
        }

        if !self.arguments_are_safe(callee, &arguments) {
            log::debug!("not inlining {:?}, arguments could change behavior", call.callee);
            return None;
        }

        let substitutions: HashMap<VarId, Node> =
            callee.parameters.iter().copied().zip(arguments).collect();

        // Calls inside the callee are expanded before the arguments go in, so
        // the arguments are never walked a second time
        let (mut inlined, rewrites) =
            self.inline_expression(clone_node(expression)?, depth + 1, types);
        nested += rewrites;
        substitute(&mut inlined, &substitutions)?;

        match check_expression(&inlined, types) {
            Err(error) => {
                log::debug!("not inlining {:?}: {error}", call.callee);
                return None;
            }
            Ok(Some(ty)) if callee.return_type.is_some_and(|declared| declared != ty) => {
                log::debug!("not inlining {:?}, the result would have type {ty}", call.callee);
                return None;
            }
            Ok(_) => {}
        }

        log::debug!("inlined call to {:?} at depth {depth}", call.callee);
        Some((inlined.with_span(span), nested))
    }

    /// The callee may read its parameters in any order and may skip some of
    /// them. A call site is only safe when that cannot change which effects
    /// happen, or whether they happen before the program traps.
    fn arguments_are_safe(&self, callee: &Callee, arguments: &[Node]) -> bool {
        let mut effectful = 0;
        let mut trapping = 0;

        for (parameter, argument) in callee.parameters.iter().zip(arguments) {
            let uses = callee.uses_of(*parameter);
            let pure = is_side_effect_free(argument);
            let safe = pure && cannot_trap(argument);

            // Substitution may move the write before or after reads of the
            // same variable in sibling arguments
            if contains_assignment(argument) {
                return false;
            }

            // Dropping an argument must not drop its evaluation
            if uses == 0 && !safe {
                return false;
            }

            // The callee may skip part of its expression
            if callee.short_circuits && !safe {
                return false;
            }

            if uses > 1
                && (!pure || count_nodes(argument) > self.options.max_duplicated_argument_nodes)
            {
                return false;
            }

            if !pure {
                effectful += 1;
            } else if !safe {
                trapping += 1;
            }
        }

        // An effect may not move across anything that can trap
        if effectful > 0 && (trapping > 0 || callee.may_trap) {
            return false;
        }

        effectful <= 1
    }
}

impl Pass for FunctionInlining {
    fn name(&self) -> &'static str {
        "FunctionInlining"
    }

    fn prepare(&mut self, program: &Program, types: &dyn TypeLookup) {
        let callees = program
            .functions()
            .map(|function| (function.id, self.analyze(function, types)))
            .collect();
        self.callees = callees;
    }

    fn run(&mut self, root: &mut Node, types: &dyn TypeLookup) -> usize {
        self.inline_calls(root, 0, types)
    }
}

/// The expression of a body that is `return e` or `{ return e; }`
fn single_return_expression(body: &Node) -> Option<&Node> {
    let statement = match &body.kind {
        NodeKind::Block(block) if block.statements.len() == 1 => &block.statements[0],
        NodeKind::Block(_) => return None,
        _ => body,
    };

    match &statement.kind {
        NodeKind::Return(value) => Some(value),
        _ => None,
    }
}

/// Replaces every read of a parameter by a copy of its argument
fn substitute(node: &mut Node, substitutions: &HashMap<VarId, Node>) -> Option<()> {
    if let Some(argument) = node.var_id().and_then(|id| substitutions.get(&id)) {
        *node = clone_node(argument)?;
        return Some(());
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child_mut(i) {
            substitute(child, substitutions)?;
        }
    }

    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{index::Index, middle::ty::SymbolTable};

    fn f(n: usize) -> FunctionId {
        FunctionId::new(n)
    }

    fn v(n: usize) -> VarId {
        VarId::new(n)
    }

    fn run(program: &mut Program, options: InlineOptions) -> usize {
        let types = SymbolTable::new();
        let mut pass = FunctionInlining::new(options);
        pass.prepare(program, &types);
        program
            .functions
            .iter_mut()
            .map(|function| pass.run(function, &types))
            .sum()
    }

    fn caller_body(program: &Program, id: FunctionId) -> &Node {
        &program.function(id).unwrap().body
    }

    #[test]
    fn finds_single_return_expressions() {
        let direct = Node::ret(Node::int(1));
        assert_eq!(single_return_expression(&direct), Some(&Node::int(1)));

        let wrapped = Node::block(vec![Node::ret(Node::int(1))]);
        assert_eq!(single_return_expression(&wrapped), Some(&Node::int(1)));

        let two = Node::block(vec![Node::break_loop(), Node::ret(Node::int(1))]);
        assert_eq!(single_return_expression(&two), None);
    }

    #[test]
    fn substitutes_literal_arguments() {
        // fn f0(v0) { return v0 * 2; }  fn f1() { return f0(5); }
        let mut program = Program::new([
            Function::new(
                f(0),
                vec![v(0)],
                Node::block(vec![Node::ret(Node::math2(
                    BinaryOp::Multiply,
                    Node::var(v(0)),
                    Node::int(2),
                ))]),
            ),
            Function::new(
                f(1),
                vec![],
                Node::block(vec![Node::ret(Node::call(f(0), vec![Node::int(5)]))]),
            ),
        ]);

        assert_eq!(run(&mut program, InlineOptions::default()), 1);
        assert_eq!(
            caller_body(&program, f(1)),
            &Node::block(vec![Node::ret(Node::math2(
                BinaryOp::Multiply,
                Node::int(5),
                Node::int(2)
            ))])
        );
    }

    #[test]
    fn keeps_spans_of_the_call_site() {
        let mut program = Program::new([
            Function::new(f(0), vec![], Node::ret(Node::int(7))),
            Function::new(
                f(1),
                vec![],
                Node::ret(Node::call(f(0), vec![]).with_span(Span::new(10, 14))),
            ),
        ]);

        run(&mut program, InlineOptions::default());
        assert_eq!(
            caller_body(&program, f(1)),
            &Node::ret(Node::int(7).with_span(Span::new(10, 14)))
        );
    }

    #[test]
    fn skips_callee_reading_locals() {
        let mut program = Program::new([
            Function::new(f(0), vec![v(0)], Node::ret(Node::var(v(9)))),
            Function::new(f(1), vec![], Node::ret(Node::call(f(0), vec![Node::int(1)]))),
        ]);

        assert_eq!(run(&mut program, InlineOptions::default()), 0);
    }

    #[test]
    fn duplicated_parameter_needs_small_pure_argument() {
        // fn f0(v0) { return v0 + v0; }
        let square = || {
            Function::new(
                f(0),
                vec![v(0)],
                Node::ret(Node::math2(BinaryOp::Add, Node::var(v(0)), Node::var(v(0)))),
            )
        };

        let mut with_call = Program::new([
            square(),
            Function::new(
                f(1),
                vec![],
                Node::ret(Node::call(f(0), vec![Node::call(f(3), vec![])])),
            ),
        ]);
        assert_eq!(run(&mut with_call, InlineOptions::default()), 0);

        let mut with_var = Program::new([
            square(),
            Function::new(
                f(1),
                vec![v(1)],
                Node::ret(Node::call(f(0), vec![Node::var(v(1))])),
            ),
        ]);
        assert_eq!(run(&mut with_var, InlineOptions::default()), 1);
    }

    #[test]
    fn unused_parameter_cannot_swallow_side_effects() {
        // fn f0(v0) { return 1; }  fn f1() { return f0(f9()); }
        let mut program = Program::new([
            Function::new(f(0), vec![v(0)], Node::ret(Node::int(1))),
            Function::new(
                f(1),
                vec![],
                Node::ret(Node::call(f(0), vec![Node::call(f(9), vec![])])),
            ),
        ]);

        assert_eq!(run(&mut program, InlineOptions::default()), 0);
    }

    #[test]
    fn calls_never_move_across_a_division() {
        // fn f0(v0, v1) { return (10 / v1) + v0; }  fn f1(v2) { return f0(f9(), v2); }
        let mut program = Program::new([
            Function::new(
                f(0),
                vec![v(0), v(1)],
                Node::ret(Node::math2(
                    BinaryOp::Add,
                    Node::math2(BinaryOp::Divide, Node::int(10), Node::var(v(1))),
                    Node::var(v(0)),
                )),
            ),
            Function::new(
                f(1),
                vec![v(2)],
                Node::ret(Node::call(
                    f(0),
                    vec![Node::call(f(9), vec![]), Node::var(v(2))],
                )),
            ),
        ]);
        assert_eq!(run(&mut program, InlineOptions::default()), 0);

        // Without the call the division may go anywhere
        let mut pure = Program::new([
            Function::new(
                f(0),
                vec![v(0), v(1)],
                Node::ret(Node::math2(
                    BinaryOp::Add,
                    Node::math2(BinaryOp::Divide, Node::int(10), Node::var(v(1))),
                    Node::var(v(0)),
                )),
            ),
            Function::new(
                f(1),
                vec![v(2)],
                Node::ret(Node::call(f(0), vec![Node::int(1), Node::var(v(2))])),
            ),
        ]);
        assert_eq!(run(&mut pure, InlineOptions::default()), 1);
    }

    #[test]
    fn recursive_functions_need_the_override() {
        // fn f0(v0) { return f0(v0); }
        let recursive = || {
            Function::new(
                f(0),
                vec![v(0)],
                Node::ret(Node::call(f(0), vec![Node::var(v(0))])),
            )
        };

        let mut program = Program::new([recursive()]);
        let types = SymbolTable::new();
        let mut pass = FunctionInlining::new(InlineOptions::default());
        pass.prepare(&program, &types);
        assert!(!pass.is_eligible(f(0)));
        assert_eq!(pass.run(&mut program.functions[0], &types), 0);

        let mut pass = FunctionInlining::new(InlineOptions {
            allow_recursive: true,
            ..InlineOptions::default()
        });
        pass.prepare(&program, &types);
        assert!(pass.is_eligible(f(0)));

        // The call in the body is expanded until the depth limit stops it
        assert_eq!(pass.run(&mut program.functions[0], &types), 3);
        assert_eq!(
            caller_body(&program, f(0)),
            &Node::ret(Node::call(f(0), vec![Node::var(v(0))]))
        );
    }

    #[test]
    fn aggressive_mode_raises_the_size_ceiling() {
        // ((v0 + 1) + 1) + ... with 10 additions, 21 nodes
        let mut expression = Node::var(v(0));
        for _ in 0..10 {
            expression = Node::math2(BinaryOp::Add, expression, Node::int(1));
        }
        let function = Function::new(f(0), vec![v(0)], Node::ret(expression));
        let program = Program::new([function]);
        let types = SymbolTable::new();

        let options = InlineOptions {
            max_nodes: 15,
            ..InlineOptions::default()
        };
        let mut pass = FunctionInlining::new(options.clone());
        pass.prepare(&program, &types);
        assert!(!pass.is_eligible(f(0)));

        let mut pass = FunctionInlining::new(InlineOptions {
            aggressive: true,
            ..options
        });
        pass.prepare(&program, &types);
        assert!(pass.is_eligible(f(0)));
    }

    #[test]
    fn rejects_results_that_fail_type_checking() {
        // fn f0(v0) { return v0 % 2; }  called with a double
        let mut program = Program::new([
            Function::new(
                f(0),
                vec![v(0)],
                Node::ret(Node::math2(BinaryOp::Modulus, Node::var(v(0)), Node::int(2))),
            ),
            Function::new(f(1), vec![], Node::ret(Node::call(f(0), vec![Node::float(1.5)]))),
        ]);

        assert_eq!(run(&mut program, InlineOptions::default()), 0);
    }
}
