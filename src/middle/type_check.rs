//! Local type checking of rewritten expressions.
//!
//! The frontend already verified the program, so this is not a full type
//! checker. Passes that synthesize new expressions (the inliner substituting
//! caller arguments into a callee body) re-check the result here before
//! committing to it. Types are inferred bottom up from literals, the symbol
//! table and operator rules. Variables the symbol table does not know about
//! are treated as unknown and never cause an error on their own.

use thiserror::Error;

use crate::middle::{
    ast::{BinaryOp, BinaryOpClass, Node, NodeKind, UnaryOp},
    ty::{Type, TypeLookup},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("operator `{op}` cannot combine `{lhs}` and `{rhs}`")]
    MismatchedOperands { op: BinaryOp, lhs: Type, rhs: Type },
    #[error("binary operator `{op}` is not defined for `{ty}`")]
    UnsupportedBinaryOperand { op: BinaryOp, ty: Type },
    #[error("unary operator `{op}` is not defined for `{ty}`")]
    UnsupportedUnaryOperand { op: UnaryOp, ty: Type },
    #[error("left side of an assignment must be a variable or an index")]
    InvalidAssignmentTarget,
    #[error("cannot index into a value of type `{0}`")]
    NotIndexable(Type),
    #[error("index must be an `int`, found `{0}`")]
    NonIntegerIndex(Type),
    #[error("`size` is not defined for `{0}`")]
    NoSize(Type),
    #[error("cannot convert `{from}` to `{to}`")]
    InvalidConversion { from: Type, to: Type },
    #[error("statement found where an expression was expected")]
    NotAnExpression,
}

/// Infers the type of `node`. `Ok(None)` means the type could not be
/// determined from the information available but nothing conflicts.
pub fn check_expression(node: &Node, types: &dyn TypeLookup) -> Result<Option<Type>, TypeError> {
    match &node.kind {
        NodeKind::IntLit(_) => Ok(Some(Type::Int)),
        NodeKind::FloatLit(_) => Ok(Some(Type::Double)),
        NodeKind::CharLit(_) => Ok(Some(Type::Char)),
        NodeKind::StringLit(_) => Ok(Some(Type::String)),
        NodeKind::Var(id) => Ok(types.variable_type(*id)),
        NodeKind::FunctionCall(call) => {
            for argument in &call.arguments {
                check_expression(argument, types)?;
            }
            Ok(types.return_type(call.callee))
        }
        NodeKind::Math1(math1) => {
            let operand = check_expression(&math1.operand, types)?;
            match (math1.op, operand) {
                (_, None) => Ok(None),
                (UnaryOp::Negate, Some(ty)) if ty.is_numeric() => Ok(Some(ty)),
                (UnaryOp::Not, Some(ty)) if ty.is_numeric() => Ok(Some(Type::Int)),
                (op, Some(ty)) => Err(TypeError::UnsupportedUnaryOperand { op, ty }),
            }
        }
        NodeKind::Math2(math2) => {
            if math2.op == BinaryOp::Assign
                && !matches!(math2.lhs.kind, NodeKind::Var(_) | NodeKind::Indexing(_))
            {
                return Err(TypeError::InvalidAssignmentTarget);
            }

            let lhs = check_expression(&math2.lhs, types)?;
            let rhs = check_expression(&math2.rhs, types)?;
            check_binary(math2.op, lhs, rhs)
        }
        NodeKind::Indexing(indexing) => {
            match check_expression(&indexing.index, types)? {
                Some(Type::Int) | None => {}
                Some(other) => return Err(TypeError::NonIntegerIndex(other)),
            }
            match check_expression(&indexing.base, types)? {
                Some(Type::String) | None => Ok(Some(Type::Char)),
                Some(other) => Err(TypeError::NotIndexable(other)),
            }
        }
        NodeKind::Size(operand) => match check_expression(operand, types)? {
            Some(Type::String) | None => Ok(Some(Type::Int)),
            Some(other) => Err(TypeError::NoSize(other)),
        },
        NodeKind::ToInt(operand) => check_conversion(operand, Type::Int, types),
        NodeKind::ToDouble(operand) => check_conversion(operand, Type::Double, types),
        NodeKind::ToString(operand) => {
            check_expression(operand, types)?;
            Ok(Some(Type::String))
        }
        NodeKind::Block(_)
        | NodeKind::Function(_)
        | NodeKind::If(_)
        | NodeKind::While(_)
        | NodeKind::Return(_)
        | NodeKind::Break
        | NodeKind::Continue => Err(TypeError::NotAnExpression),
    }
}

fn check_binary(
    op: BinaryOp,
    lhs: Option<Type>,
    rhs: Option<Type>,
) -> Result<Option<Type>, TypeError> {
    if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
        if lhs != rhs {
            return Err(TypeError::MismatchedOperands { op, lhs, rhs });
        }
    }

    let Some(ty) = lhs.or(rhs) else {
        // Comparisons and logic always produce an int even if the operands
        // are unknown
        return Ok(match op.class() {
            BinaryOpClass::Comparison | BinaryOpClass::Logical => Some(Type::Int),
            BinaryOpClass::Assignment | BinaryOpClass::Arithmetic => None,
        });
    };

    let supported = match op {
        BinaryOp::Assign => true,
        BinaryOp::Add => ty != Type::Char,
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => ty.is_numeric(),
        BinaryOp::Modulus => ty == Type::Int,
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqualTo
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqualTo
        | BinaryOp::Equals
        | BinaryOp::NotEquals => true,
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => ty.is_numeric(),
    };

    if !supported {
        return Err(TypeError::UnsupportedBinaryOperand { op, ty });
    }

    Ok(match op.class() {
        BinaryOpClass::Assignment | BinaryOpClass::Arithmetic => Some(ty),
        BinaryOpClass::Comparison | BinaryOpClass::Logical => Some(Type::Int),
    })
}

fn check_conversion(
    operand: &Node,
    to: Type,
    types: &dyn TypeLookup,
) -> Result<Option<Type>, TypeError> {
    match check_expression(operand, types)? {
        Some(Type::String) => Err(TypeError::InvalidConversion {
            from: Type::String,
            to,
        }),
        Some(Type::Char) if to == Type::Double => Err(TypeError::InvalidConversion {
            from: Type::Char,
            to,
        }),
        _ => Ok(Some(to)),
    }
}
