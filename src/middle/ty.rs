use hashbrown::HashMap;
use strum::{Display, EnumIter, EnumString};

use crate::middle::ast::{FunctionId, Node, Span, VarId};

/// Value types of the source language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Int,
    Double,
    Char,
    String,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Double)
    }

    /// Builds the zero value of this type
    pub fn default_literal(self, span: Span) -> Node {
        match self {
            Type::Int => Node::int(0),
            Type::Double => Node::float(0.0),
            Type::Char => Node::char('\0'),
            Type::String => Node::string(""),
        }
        .with_span(span)
    }
}

/// Access to the symbol table owned by the frontend. The optimizer only ever
/// needs the declared return type of a function; variable types are used
/// opportunistically when re-checking rewritten expressions.
pub trait TypeLookup {
    fn return_type(&self, function: FunctionId) -> Option<Type>;

    fn variable_type(&self, _var: VarId) -> Option<Type> {
        None
    }
}

/// Simple in-memory symbol table
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    functions: HashMap<FunctionId, Type>,
    variables: HashMap<VarId, Type>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_function(&mut self, function: FunctionId, return_type: Type) -> &mut Self {
        self.functions.insert(function, return_type);
        self
    }

    pub fn declare_variable(&mut self, var: VarId, ty: Type) -> &mut Self {
        self.variables.insert(var, ty);
        self
    }
}

impl TypeLookup for SymbolTable {
    fn return_type(&self, function: FunctionId) -> Option<Type> {
        self.functions.get(&function).copied()
    }

    fn variable_type(&self, var: VarId) -> Option<Type> {
        self.variables.get(&var).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index;

    #[test]
    fn default_literals_match_their_type() {
        assert_eq!(Type::Int.default_literal(Span::dummy()), Node::int(0));
        assert_eq!(Type::Double.default_literal(Span::dummy()), Node::float(0.0));
        assert_eq!(Type::String.default_literal(Span::dummy()), Node::string(""));
        assert_eq!(
            Type::Char.default_literal(Span::new(3, 4)).span,
            Span::new(3, 4)
        );
    }

    #[test]
    fn symbol_table_answers_lookups() {
        let mut table = SymbolTable::new();
        table
            .declare_function(FunctionId::new(0), Type::Double)
            .declare_variable(VarId::new(4), Type::String);

        assert_eq!(table.return_type(FunctionId::new(0)), Some(Type::Double));
        assert_eq!(table.return_type(FunctionId::new(1)), None);
        assert_eq!(table.variable_type(VarId::new(4)), Some(Type::String));
        assert_eq!("double".parse::<Type>(), Ok(Type::Double));
    }
}
