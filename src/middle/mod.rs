//! The optimizing middle of the compiler. The frontend hands over a type
//! checked syntax tree per function, the passes in [`optimization`] rewrite
//! it in place and the backend emits whatever is left.

pub mod ast;
pub mod optimization;
pub mod ty;
pub mod type_check;
