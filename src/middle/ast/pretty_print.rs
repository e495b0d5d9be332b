use core::fmt::{self, Write};

use colored::Colorize;
use itertools::Itertools;

use super::{Function, Node, NodeKind, Program};
use crate::index::Index;

/// Prints the program to stdout with syntax highlighting
pub fn pretty_print_program(program: &Program) {
    print!("{}", highlight_program(program));
}

/// The rendering of [`pretty_print_program`]. Colors follow the `colored`
/// settings, so it matches the `Display` output when they are turned off.
pub fn highlight_program(program: &Program) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = Printer::new(&mut out, true).program(program);
    out
}

impl core::fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f, false).program(self)
    }
}

impl core::fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f, false).function(self)
    }
}

/// Statements (blocks, loops, ...) render across multiple lines while
/// expressions render on a single line
impl core::fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::new(f, false);
        if is_statement(self) {
            printer.statement(self)
        } else {
            let expr = printer.expression(self);
            f.write_str(&expr)
        }
    }
}

fn is_statement(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Block(_)
            | NodeKind::Function(_)
            | NodeKind::If(_)
            | NodeKind::While(_)
            | NodeKind::Return(_)
            | NodeKind::Break
            | NodeKind::Continue
    )
}

struct Printer<'w, W: Write> {
    out: &'w mut W,
    indent: usize,
    colored: bool,
}

impl<'w, W: Write> Printer<'w, W> {
    fn new(out: &'w mut W, colored: bool) -> Self {
        Self {
            out,
            indent: 0,
            colored,
        }
    }

    fn keyword(&self, keyword: &str) -> String {
        if self.colored {
            keyword.magenta().to_string()
        } else {
            keyword.to_owned()
        }
    }

    fn function_name(&self, function: impl Index) -> String {
        let name = format!("f{}", function.index());
        if self.colored {
            name.blue().to_string()
        } else {
            name
        }
    }

    fn literal(&self, literal: String) -> String {
        if self.colored {
            literal.purple().to_string()
        } else {
            literal
        }
    }

    fn line(&mut self, text: &str) -> fmt::Result {
        writeln!(self.out, "{:width$}{text}", "", width = self.indent * 4)
    }

    fn program(&mut self, program: &Program) -> fmt::Result {
        for (i, node) in program.functions.iter().enumerate() {
            if i > 0 {
                writeln!(self.out)?;
            }
            self.statement(node)?;
        }
        Ok(())
    }

    fn function(&mut self, function: &Function) -> fmt::Result {
        let header = format!(
            "{} {}({}) {{",
            self.keyword("fn"),
            self.function_name(function.id),
            function
                .parameters
                .iter()
                .map(|p| format!("v{}", p.index()))
                .join(", ")
        );
        self.line(&header)?;
        self.block_contents(&function.body)?;
        self.line("}")
    }

    /// Writes the statements of `node` one level deeper, unwrapping blocks
    fn block_contents(&mut self, node: &Node) -> fmt::Result {
        self.indent += 1;
        match &node.kind {
            NodeKind::Block(block) => {
                for statement in &block.statements {
                    self.statement(statement)?;
                }
            }
            _ => self.statement(node)?,
        }
        self.indent -= 1;
        Ok(())
    }

    fn statement(&mut self, node: &Node) -> fmt::Result {
        match &node.kind {
            NodeKind::Block(_) => {
                self.line("{")?;
                self.block_contents(node)?;
                self.line("}")
            }
            NodeKind::Function(function) => self.function(function),
            NodeKind::If(if_node) => {
                let header = format!(
                    "{} {} {{",
                    self.keyword("if"),
                    self.condition(&if_node.condition)
                );
                self.line(&header)?;
                self.block_contents(&if_node.then_branch)?;
                if let Some(else_branch) = &if_node.else_branch {
                    let middle = format!("}} {} {{", self.keyword("else"));
                    self.line(&middle)?;
                    self.block_contents(else_branch)?;
                }
                self.line("}")
            }
            NodeKind::While(while_loop) => {
                let header = format!(
                    "{} {} {{",
                    self.keyword("while"),
                    self.condition(&while_loop.condition)
                );
                self.line(&header)?;
                self.block_contents(&while_loop.body)?;
                self.line("}")
            }
            NodeKind::Return(value) => {
                let text = format!("{} {};", self.keyword("return"), self.expression(value));
                self.line(&text)
            }
            NodeKind::Break => {
                let text = format!("{};", self.keyword("break"));
                self.line(&text)
            }
            NodeKind::Continue => {
                let text = format!("{};", self.keyword("continue"));
                self.line(&text)
            }
            _ => {
                let text = format!("{};", self.expression(node));
                self.line(&text)
            }
        }
    }

    /// Binary expressions already carry their own parentheses
    fn condition(&self, node: &Node) -> String {
        let expr = self.expression(node);
        match &node.kind {
            NodeKind::Math2(_) if !node.is_assignment() => expr,
            _ => format!("({expr})"),
        }
    }

    fn expression(&self, node: &Node) -> String {
        match &node.kind {
            NodeKind::IntLit(value) => self.literal(value.to_string()),
            NodeKind::FloatLit(value) => self.literal(format!("{value:?}")),
            NodeKind::CharLit(value) => self.literal(format!("{value:?}")),
            NodeKind::StringLit(value) => self.literal(format!("{value:?}")),
            NodeKind::Var(id) => format!("v{}", id.index()),
            NodeKind::Math1(math1) => format!("{}{}", math1.op, self.expression(&math1.operand)),
            NodeKind::Math2(math2) if node.is_assignment() => format!(
                "{} {} {}",
                self.expression(&math2.lhs),
                math2.op,
                self.expression(&math2.rhs)
            ),
            NodeKind::Math2(math2) => format!(
                "({} {} {})",
                self.expression(&math2.lhs),
                math2.op,
                self.expression(&math2.rhs)
            ),
            NodeKind::FunctionCall(call) => format!(
                "{}({})",
                self.function_name(call.callee),
                call.arguments
                    .iter()
                    .map(|argument| self.expression(argument))
                    .join(", ")
            ),
            NodeKind::Indexing(indexing) => format!(
                "{}[{}]",
                self.expression(&indexing.base),
                self.expression(&indexing.index)
            ),
            NodeKind::Size(operand) => format!("size({})", self.expression(operand)),
            NodeKind::ToInt(operand) => format!("int({})", self.expression(operand)),
            NodeKind::ToDouble(operand) => format!("double({})", self.expression(operand)),
            NodeKind::ToString(operand) => format!("string({})", self.expression(operand)),
            // Statements never appear in expression position in a well formed
            // tree, render them inline so debugging output stays readable
            NodeKind::Block(_)
            | NodeKind::Function(_)
            | NodeKind::If(_)
            | NodeKind::While(_)
            | NodeKind::Return(_)
            | NodeKind::Break
            | NodeKind::Continue => {
                let mut out = String::new();
                let _ = Printer::new(&mut out, self.colored).statement(node);
                out.lines().map(str::trim).join(" ")
            }
        }
    }
}
