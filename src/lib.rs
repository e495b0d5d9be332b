//! Optimizing middle-end of the Tubular compiler: function inlining, loop
//! unrolling and tail recursion elimination over the type checked syntax
//! tree.

pub mod config;
pub mod index;
pub mod middle;

pub use config::{ConfigError, OptimizationArgs, OptimizationConfig, PassOrder, TailMode};
pub use middle::{
    ast::{Function, FunctionId, Node, NodeKind, Program, Span, VarId},
    optimization::{Pass, PassKind, PassManager, PassReport},
    ty::{SymbolTable, Type, TypeLookup},
};
