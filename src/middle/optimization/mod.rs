//! Tree to tree optimizations run between type checking and code emission.
//!
//! Each pass rewrites one function at a time and keeps no state between
//! functions except what it gathered in [`Pass::prepare`]. Every rewrite is
//! best effort: when a precondition does not hold, or a subtree cannot be
//! cloned, the site in question is left exactly as it was.

use strum::{Display, EnumIter, EnumString};

use crate::{
    config::OptimizationConfig,
    middle::{
        ast::{Node, Program},
        ty::TypeLookup,
    },
};

pub mod inline;
pub mod tail_recursion;
pub mod unroll;

pub use inline::{FunctionInlining, InlineOptions};
pub use tail_recursion::TailRecursion;
pub use unroll::{LoopUnrolling, UnrollOptions};

pub trait Pass {
    fn name(&self) -> &'static str;

    /// Called once with the whole program before any function is rewritten
    fn prepare(&mut self, _program: &Program, _types: &dyn TypeLookup) {}

    /// Rewrites the tree rooted at `root` (normally a function node) in place
    /// and returns the number of rewrites performed
    fn run(&mut self, root: &mut Node, types: &dyn TypeLookup) -> usize;
}

/// The passes that can be named in a pass ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PassKind {
    Inline,
    Unroll,
    Tail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass: &'static str,
    pub rewrites: usize,
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the enabled passes in the configured order
    pub fn from_config(config: &OptimizationConfig) -> Self {
        let mut manager = Self::new();

        for kind in config.pass_order.iter() {
            match kind {
                PassKind::Inline if config.inline_enabled => {
                    manager.add_pass(FunctionInlining::new(config.inline.clone()));
                }
                PassKind::Unroll if config.unroll_enabled => {
                    manager.add_pass(LoopUnrolling::new(config.unroll.clone()));
                }
                PassKind::Tail if config.tail_enabled => {
                    manager.add_pass(TailRecursion::new());
                }
                _ => log::trace!("pass `{kind}` is disabled"),
            }
        }

        manager
    }

    pub fn add_pass(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every pass over every function of the program. A pass finishes
    /// with all functions before the next one starts.
    pub fn run(&mut self, program: &mut Program, types: &dyn TypeLookup) -> Vec<PassReport> {
        self.passes
            .iter_mut()
            .map(|pass| Self::run_pass(pass.as_mut(), program, types))
            .collect()
    }

    pub fn run_pass(
        pass: &mut dyn Pass,
        program: &mut Program,
        types: &dyn TypeLookup,
    ) -> PassReport {
        pass.prepare(program, types);

        let mut rewrites = 0;
        for function in &mut program.functions {
            log::trace!("running {} on {}", pass.name(), function_label(function));
            rewrites += pass.run(function, types);
        }

        log::debug!("{} performed {rewrites} rewrite(s)", pass.name());

        PassReport {
            pass: pass.name(),
            rewrites,
        }
    }
}

fn function_label(node: &Node) -> String {
    match node.as_function() {
        Some(function) => format!("{:?}", function.id),
        None => "<non-function root>".to_owned(),
    }
}
