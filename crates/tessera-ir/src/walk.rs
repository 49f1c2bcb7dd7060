//! Read-only recursive traversal.
//!
//! # Example
//!
//! ```
//! use std::ops::ControlFlow;
//! use tessera_ir::walk::{IrWalk, WalkAction};
//! use tessera_ir::{Expr, Stmt, Type};
//!
//! let x = Expr::var(Type::int(32), "x");
//! let stmt = Stmt::store("out", x.clone() + Expr::i32(1), x);
//!
//! // Count variable references
//! let mut vars = 0;
//! let _ = stmt.walk_exprs::<()>(|e| {
//!     if e.as_var().is_some() {
//!         vars += 1;
//!     }
//!     ControlFlow::Continue(WalkAction::Advance)
//! });
//! assert_eq!(vars, 2);
//! ```

use std::ops::ControlFlow;

use crate::expr::{Expr, ExprKind};
use crate::stmt::{Stmt, StmtKind};

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into children.
    Advance,
    /// Skip the children of the current node.
    Skip,
}

/// A node visited by [`IrWalk::walk_all`].
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Expr(&'a Expr),
    Stmt(&'a Stmt),
}

pub trait IrWalk {
    /// Walk every node in pre-order, children in declaration order.
    fn walk_all<'a, B>(
        &'a self,
        f: impl FnMut(Node<'a>) -> ControlFlow<B, WalkAction>,
    ) -> ControlFlow<B, ()>;

    /// Walk only expression nodes. Statements are always descended into.
    fn walk_exprs<'a, B>(
        &'a self,
        mut f: impl FnMut(&'a Expr) -> ControlFlow<B, WalkAction>,
    ) -> ControlFlow<B, ()> {
        self.walk_all(|node| match node {
            Node::Expr(e) => f(e),
            Node::Stmt(_) => ControlFlow::Continue(WalkAction::Advance),
        })
    }

    /// Walk only statement nodes, without entering expressions.
    fn walk_stmts<'a, B>(
        &'a self,
        mut f: impl FnMut(&'a Stmt) -> ControlFlow<B, WalkAction>,
    ) -> ControlFlow<B, ()> {
        self.walk_all(|node| match node {
            Node::Stmt(s) => f(s),
            Node::Expr(_) => ControlFlow::Continue(WalkAction::Skip),
        })
    }
}

fn walk_expr_internal<'a, B>(
    expr: &'a Expr,
    f: &mut dyn FnMut(Node<'a>) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(Node::Expr(expr)) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    match expr.kind() {
        ExprKind::IntImm(_) | ExprKind::FloatImm(_) | ExprKind::StringImm(_) | ExprKind::Var(_) => {}
        ExprKind::Unary { value, .. } | ExprKind::Cast { value } => walk_expr_internal(value, f)?,
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::Compare { lhs, rhs, .. } => {
            walk_expr_internal(lhs, f)?;
            walk_expr_internal(rhs, f)?;
        }
        ExprKind::Select {
            condition,
            then_value,
            else_value,
        } => {
            walk_expr_internal(condition, f)?;
            walk_expr_internal(then_value, f)?;
            walk_expr_internal(else_value, f)?;
        }
        ExprKind::Load { index, .. } => walk_expr_internal(index, f)?,
        ExprKind::Call { args, .. } => {
            for arg in args {
                walk_expr_internal(arg, f)?;
            }
        }
    }
    ControlFlow::Continue(())
}

fn walk_stmt_internal<'a, B>(
    stmt: &'a Stmt,
    f: &mut dyn FnMut(Node<'a>) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(Node::Stmt(stmt)) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    match stmt.kind() {
        StmtKind::Block(stmts) => {
            for s in stmts {
                walk_stmt_internal(s, f)?;
            }
        }
        StmtKind::LetStmt(op) => {
            walk_expr_internal(&op.value, f)?;
            walk_stmt_internal(&op.body, f)?;
        }
        StmtKind::Allocate(op) => {
            for extent in &op.extents {
                walk_expr_internal(extent, f)?;
            }
            walk_expr_internal(&op.condition, f)?;
            walk_stmt_internal(&op.body, f)?;
            if let Some(destructor) = &op.destructor {
                walk_expr_internal(destructor, f)?;
            }
        }
        StmtKind::Free(_) => {}
        StmtKind::For(op) => {
            walk_expr_internal(&op.min, f)?;
            walk_expr_internal(&op.extent, f)?;
            walk_stmt_internal(&op.body, f)?;
        }
        StmtKind::ProducerConsumer(op) => {
            walk_stmt_internal(&op.produce, f)?;
            if let Some(update) = &op.update {
                walk_stmt_internal(update, f)?;
            }
            walk_stmt_internal(&op.consume, f)?;
        }
        StmtKind::Store(op) => {
            walk_expr_internal(&op.value, f)?;
            walk_expr_internal(&op.index, f)?;
        }
        StmtKind::Assert(op) => {
            walk_expr_internal(&op.condition, f)?;
            walk_expr_internal(&op.message, f)?;
        }
        StmtKind::Evaluate(op) => walk_expr_internal(&op.value, f)?,
    }
    ControlFlow::Continue(())
}

impl IrWalk for Expr {
    fn walk_all<'a, B>(
        &'a self,
        mut f: impl FnMut(Node<'a>) -> ControlFlow<B, WalkAction>,
    ) -> ControlFlow<B, ()> {
        walk_expr_internal(self, &mut f)
    }
}

impl IrWalk for Stmt {
    fn walk_all<'a, B>(
        &'a self,
        mut f: impl FnMut(Node<'a>) -> ControlFlow<B, WalkAction>,
    ) -> ControlFlow<B, ()> {
        walk_stmt_internal(self, &mut f)
    }
}

/// Count the calls to the named extern function anywhere under `root`.
pub fn count_extern_calls(root: &impl IrWalk, name: &str) -> usize {
    let mut count = 0;
    let _ = root.walk_exprs::<()>(|e| {
        if e.is_extern_call(name) {
            count += 1;
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsic::Intrinsic;
    use crate::types::Type;

    #[test]
    fn test_find_first_intrinsic() {
        let a = Expr::var(Type::uint(8), "a");
        let b = Expr::var(Type::uint(8), "b");
        let sum = Expr::intrinsic(Intrinsic::WideningAdd, [a.clone(), b]);
        let stmt = Stmt::block([
            Stmt::store("x", a.clone(), Expr::i32(0)),
            Stmt::store("y", sum, Expr::i32(0)),
        ]);
        let found = stmt.walk_exprs(|e| match e.as_intrinsic() {
            Some((kind, _)) => ControlFlow::Break(kind),
            None => ControlFlow::Continue(WalkAction::Advance),
        });
        assert_eq!(found, ControlFlow::Break(Intrinsic::WideningAdd));
    }

    #[test]
    fn test_skip_prunes_children() {
        let inner = Stmt::evaluate(Expr::call_extern(Type::int(32), "probe", []));
        let stmt = Stmt::serial("i", Expr::i32(0), Expr::i32(2), inner.clone());
        assert_eq!(count_extern_calls(&stmt, "probe"), 1);

        let mut seen = 0;
        let _ = stmt.walk_all::<()>(|node| {
            seen += 1;
            match node {
                Node::Stmt(s) if !s.same_as(&stmt) => ControlFlow::Continue(WalkAction::Skip),
                _ => ControlFlow::Continue(WalkAction::Advance),
            }
        });
        // loop, min, extent, body (skipped)
        assert_eq!(seen, 4);
    }
}
