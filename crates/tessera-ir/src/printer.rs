//! Human-readable rendering of expressions and statements.
//!
//! `i32` and `bool` immediates print bare; other immediates carry a type
//! prefix such as `(u8)3`. Statements print one per line, with nested bodies
//! indented by two spaces.

use std::fmt::{self, Display, Formatter, Write};

use crate::expr::{BinaryOp, Callee, Expr, ExprKind, UnaryOp};
use crate::stmt::{Stmt, StmtKind};
use crate::types::Type;

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::IntImm(v) if self.ty() == Type::int(32) => write!(f, "{v}"),
            ExprKind::IntImm(v) if self.ty().is_bool() => {
                f.write_str(if *v != 0 { "true" } else { "false" })
            }
            ExprKind::IntImm(v) => write!(f, "({}){v}", self.ty()),
            ExprKind::FloatImm(v) => write!(f, "({}){v:?}", self.ty()),
            ExprKind::StringImm(s) => write!(f, "{s:?}"),
            ExprKind::Var(name) => f.write_str(name),
            ExprKind::Unary { op, value } => match op {
                UnaryOp::Neg => write!(f, "-{value}"),
                UnaryOp::Not => write!(f, "!{value}"),
            },
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::Min | BinaryOp::Max => write!(f, "{}({lhs}, {rhs})", op.symbol()),
                _ => write!(f, "({lhs} {} {rhs})", op.symbol()),
            },
            ExprKind::Compare { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            ExprKind::Select {
                condition,
                then_value,
                else_value,
            } => write!(f, "select({condition}, {then_value}, {else_value})"),
            ExprKind::Load { buffer, index } => write!(f, "{buffer}[{index}]"),
            ExprKind::Call { callee, args } => {
                match callee {
                    Callee::Intrinsic(kind) => f.write_str(kind.name())?,
                    Callee::Extern(name) => f.write_str(name)?,
                    Callee::Builtin(builtin) => f.write_str(builtin.name())?,
                }
                f.write_char('(')?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_char(')')
            }
            ExprKind::Cast { value } => write!(f, "{}({value})", self.ty()),
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        print_stmt(self, 0, f)
    }
}

fn indent(f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

fn print_stmt(stmt: &Stmt, depth: usize, f: &mut Formatter<'_>) -> fmt::Result {
    match stmt.kind() {
        StmtKind::Block(stmts) => {
            for s in stmts {
                print_stmt(s, depth, f)?;
            }
            Ok(())
        }
        StmtKind::LetStmt(op) => {
            indent(f, depth)?;
            writeln!(f, "let {} = {}", op.name, op.value)?;
            print_stmt(&op.body, depth, f)
        }
        StmtKind::Allocate(op) => {
            indent(f, depth)?;
            write!(f, "allocate {}[{}", op.name, op.ty)?;
            for extent in &op.extents {
                write!(f, " * {extent}")?;
            }
            f.write_char(']')?;
            if !op.condition.is_const(1) {
                write!(f, " if {}", op.condition)?;
            }
            if let Some(destructor) = &op.destructor {
                write!(f, " custom_delete {{ {destructor} }}")?;
            }
            f.write_char('\n')?;
            print_stmt(&op.body, depth, f)
        }
        StmtKind::Free(op) => {
            indent(f, depth)?;
            writeln!(f, "free {}", op.name)
        }
        StmtKind::For(op) => {
            indent(f, depth)?;
            writeln!(
                f,
                "for<{}, {}> ({}, {}, {}) {{",
                op.kind.name(),
                op.device.name(),
                op.var,
                op.min,
                op.extent
            )?;
            print_stmt(&op.body, depth + 1, f)?;
            indent(f, depth)?;
            writeln!(f, "}}")
        }
        StmtKind::ProducerConsumer(op) => {
            print_section(f, depth, "produce", &op.name, &op.produce)?;
            if let Some(update) = &op.update {
                print_section(f, depth, "update", &op.name, update)?;
            }
            print_section(f, depth, "consume", &op.name, &op.consume)
        }
        StmtKind::Store(op) => {
            indent(f, depth)?;
            writeln!(f, "{}[{}] = {}", op.buffer, op.index, op.value)
        }
        StmtKind::Assert(op) => {
            indent(f, depth)?;
            writeln!(f, "assert({}, {})", op.condition, op.message)
        }
        StmtKind::Evaluate(op) => {
            indent(f, depth)?;
            writeln!(f, "{}", op.value)
        }
    }
}

fn print_section(
    f: &mut Formatter<'_>,
    depth: usize,
    label: &str,
    name: &str,
    body: &Stmt,
) -> fmt::Result {
    indent(f, depth)?;
    writeln!(f, "{label} {name} {{")?;
    print_stmt(body, depth + 1, f)?;
    indent(f, depth)?;
    writeln!(f, "}}")
}
