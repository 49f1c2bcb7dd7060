//! Rewriting traversal with structural sharing.
//!
//! A [`Mutator`] maps a tree to a new tree. Each node kind has a hook; the
//! default hook mutates the children in declaration order and rebuilds the
//! node only if some child came back as a different node. An untouched subtree
//! therefore comes back as the very same `Arc`, and a pass that changes nothing
//! returns its input.
//!
//! Overriding a hook replaces the default for that node kind. Call the matching
//! `walk_*` function from the override to keep recursing into children.
//!
//! # Example
//!
//! ```
//! # use tessera_ir::{Expr, ExprKind, Mutator, Type};
//! struct RenameX;
//!
//! impl Mutator for RenameX {
//!     fn visit_leaf(&mut self, expr: &Expr) -> Expr {
//!         match expr.kind() {
//!             ExprKind::Var(name) if name == "x" => Expr::var(expr.ty(), "y"),
//!             _ => expr.clone(),
//!         }
//!     }
//! }
//!
//! let x = Expr::var(Type::int(32), "x");
//! let e = x + Expr::i32(1);
//! assert_eq!(RenameX.mutate_expr(&e).to_string(), "(y + 1)");
//! ```

use crate::expr::{BinaryOp, Callee, CmpOp, Expr, ExprKind, ExprVec, UnaryOp};
use crate::stmt::{
    Allocate, Assert, Evaluate, For, Free, LetStmt, ProducerConsumer, Stmt, StmtKind, Store,
};

pub trait Mutator {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        match expr.kind() {
            ExprKind::IntImm(_)
            | ExprKind::FloatImm(_)
            | ExprKind::StringImm(_)
            | ExprKind::Var(_) => self.visit_leaf(expr),
            ExprKind::Unary { op, value } => self.visit_unary(expr, *op, value),
            ExprKind::Binary { op, lhs, rhs } => self.visit_binary(expr, *op, lhs, rhs),
            ExprKind::Compare { op, lhs, rhs } => self.visit_compare(expr, *op, lhs, rhs),
            ExprKind::Select {
                condition,
                then_value,
                else_value,
            } => self.visit_select(expr, condition, then_value, else_value),
            ExprKind::Load { buffer, index } => self.visit_load(expr, buffer, index),
            ExprKind::Call { callee, args } => self.visit_call(expr, callee, args),
            ExprKind::Cast { value } => self.visit_cast(expr, value),
        }
    }

    fn mutate_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt.kind() {
            StmtKind::Block(stmts) => self.visit_block(stmt, stmts),
            StmtKind::LetStmt(op) => self.visit_let(stmt, op),
            StmtKind::Allocate(op) => self.visit_allocate(stmt, op),
            StmtKind::Free(op) => self.visit_free(stmt, op),
            StmtKind::For(op) => self.visit_for(stmt, op),
            StmtKind::ProducerConsumer(op) => self.visit_producer_consumer(stmt, op),
            StmtKind::Store(op) => self.visit_store(stmt, op),
            StmtKind::Assert(op) => self.visit_assert(stmt, op),
            StmtKind::Evaluate(op) => self.visit_evaluate(stmt, op),
        }
    }

    // -------------------------------------------------------------------------
    // Expression hooks
    // -------------------------------------------------------------------------

    /// Immediates and variables.
    fn visit_leaf(&mut self, expr: &Expr) -> Expr {
        expr.clone()
    }

    fn visit_unary(&mut self, expr: &Expr, op: UnaryOp, value: &Expr) -> Expr {
        walk_unary(self, expr, op, value)
    }

    fn visit_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Expr {
        walk_binary(self, expr, op, lhs, rhs)
    }

    fn visit_compare(&mut self, expr: &Expr, op: CmpOp, lhs: &Expr, rhs: &Expr) -> Expr {
        walk_compare(self, expr, op, lhs, rhs)
    }

    fn visit_select(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_value: &Expr,
        else_value: &Expr,
    ) -> Expr {
        walk_select(self, expr, condition, then_value, else_value)
    }

    fn visit_load(&mut self, expr: &Expr, buffer: &str, index: &Expr) -> Expr {
        walk_load(self, expr, buffer, index)
    }

    fn visit_call(&mut self, expr: &Expr, callee: &Callee, args: &[Expr]) -> Expr {
        walk_call(self, expr, callee, args)
    }

    fn visit_cast(&mut self, expr: &Expr, value: &Expr) -> Expr {
        walk_cast(self, expr, value)
    }

    // -------------------------------------------------------------------------
    // Statement hooks
    // -------------------------------------------------------------------------

    fn visit_block(&mut self, stmt: &Stmt, stmts: &[Stmt]) -> Stmt {
        walk_block(self, stmt, stmts)
    }

    fn visit_let(&mut self, stmt: &Stmt, op: &LetStmt) -> Stmt {
        walk_let(self, stmt, op)
    }

    fn visit_allocate(&mut self, stmt: &Stmt, op: &Allocate) -> Stmt {
        walk_allocate(self, stmt, op)
    }

    fn visit_free(&mut self, stmt: &Stmt, _op: &Free) -> Stmt {
        stmt.clone()
    }

    fn visit_for(&mut self, stmt: &Stmt, op: &For) -> Stmt {
        walk_for(self, stmt, op)
    }

    fn visit_producer_consumer(&mut self, stmt: &Stmt, op: &ProducerConsumer) -> Stmt {
        walk_producer_consumer(self, stmt, op)
    }

    fn visit_store(&mut self, stmt: &Stmt, op: &Store) -> Stmt {
        walk_store(self, stmt, op)
    }

    fn visit_assert(&mut self, stmt: &Stmt, op: &Assert) -> Stmt {
        walk_assert(self, stmt, op)
    }

    fn visit_evaluate(&mut self, stmt: &Stmt, op: &Evaluate) -> Stmt {
        walk_evaluate(self, stmt, op)
    }
}

// =============================================================================
// Default traversals
// =============================================================================

/// Mutate a list of expressions. Returns `None` if every element came back
/// unchanged.
pub fn mutate_exprs<M: Mutator + ?Sized>(m: &mut M, exprs: &[Expr]) -> Option<ExprVec> {
    let mutated: ExprVec = exprs.iter().map(|e| m.mutate_expr(e)).collect();
    let changed = mutated.iter().zip(exprs).any(|(new, old)| !new.same_as(old));
    changed.then_some(mutated)
}

pub fn walk_unary<M: Mutator + ?Sized>(m: &mut M, expr: &Expr, op: UnaryOp, value: &Expr) -> Expr {
    let new_value = m.mutate_expr(value);
    if new_value.same_as(value) {
        expr.clone()
    } else {
        Expr::unary(op, new_value)
    }
}

pub fn walk_binary<M: Mutator + ?Sized>(
    m: &mut M,
    expr: &Expr,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
) -> Expr {
    let new_lhs = m.mutate_expr(lhs);
    let new_rhs = m.mutate_expr(rhs);
    if new_lhs.same_as(lhs) && new_rhs.same_as(rhs) {
        expr.clone()
    } else {
        Expr::binary(op, new_lhs, new_rhs)
    }
}

pub fn walk_compare<M: Mutator + ?Sized>(
    m: &mut M,
    expr: &Expr,
    op: CmpOp,
    lhs: &Expr,
    rhs: &Expr,
) -> Expr {
    let new_lhs = m.mutate_expr(lhs);
    let new_rhs = m.mutate_expr(rhs);
    if new_lhs.same_as(lhs) && new_rhs.same_as(rhs) {
        expr.clone()
    } else {
        Expr::compare(op, new_lhs, new_rhs)
    }
}

pub fn walk_select<M: Mutator + ?Sized>(
    m: &mut M,
    expr: &Expr,
    condition: &Expr,
    then_value: &Expr,
    else_value: &Expr,
) -> Expr {
    let new_condition = m.mutate_expr(condition);
    let new_then = m.mutate_expr(then_value);
    let new_else = m.mutate_expr(else_value);
    if new_condition.same_as(condition) && new_then.same_as(then_value) && new_else.same_as(else_value)
    {
        expr.clone()
    } else {
        Expr::select(new_condition, new_then, new_else)
    }
}

pub fn walk_load<M: Mutator + ?Sized>(m: &mut M, expr: &Expr, buffer: &str, index: &Expr) -> Expr {
    let new_index = m.mutate_expr(index);
    if new_index.same_as(index) {
        expr.clone()
    } else {
        Expr::load(expr.ty(), buffer, new_index)
    }
}

pub fn walk_call<M: Mutator + ?Sized>(
    m: &mut M,
    expr: &Expr,
    callee: &Callee,
    args: &[Expr],
) -> Expr {
    match mutate_exprs(m, args) {
        Some(new_args) => Expr::rebuild_call(expr.ty(), callee, new_args),
        None => expr.clone(),
    }
}

pub fn walk_cast<M: Mutator + ?Sized>(m: &mut M, expr: &Expr, value: &Expr) -> Expr {
    let new_value = m.mutate_expr(value);
    if new_value.same_as(value) {
        expr.clone()
    } else {
        Expr::cast(expr.ty(), new_value)
    }
}

pub fn walk_block<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, stmts: &[Stmt]) -> Stmt {
    let mutated: Vec<Stmt> = stmts.iter().map(|s| m.mutate_stmt(s)).collect();
    if mutated.iter().zip(stmts).all(|(new, old)| new.same_as(old)) {
        stmt.clone()
    } else {
        Stmt::from_kind(StmtKind::Block(mutated))
    }
}

pub fn walk_let<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, op: &LetStmt) -> Stmt {
    let value = m.mutate_expr(&op.value);
    let body = m.mutate_stmt(&op.body);
    if value.same_as(&op.value) && body.same_as(&op.body) {
        stmt.clone()
    } else {
        Stmt::let_stmt(op.name.clone(), value, body)
    }
}

pub fn walk_allocate<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, op: &Allocate) -> Stmt {
    let extents = mutate_exprs(m, &op.extents);
    let condition = m.mutate_expr(&op.condition);
    let body = m.mutate_stmt(&op.body);
    let destructor = op.destructor.as_ref().map(|d| m.mutate_expr(d));
    let destructor_same = match (&destructor, &op.destructor) {
        (Some(new), Some(old)) => new.same_as(old),
        _ => true,
    };
    if extents.is_none() && condition.same_as(&op.condition) && body.same_as(&op.body) && destructor_same
    {
        return stmt.clone();
    }
    let extents = match extents {
        Some(extents) => extents.into_vec(),
        None => op.extents.clone(),
    };
    Stmt::allocate_with_destructor(op.name.clone(), op.ty, extents, condition, body, destructor)
}

pub fn walk_for<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, op: &For) -> Stmt {
    let min = m.mutate_expr(&op.min);
    let extent = m.mutate_expr(&op.extent);
    let body = m.mutate_stmt(&op.body);
    if min.same_as(&op.min) && extent.same_as(&op.extent) && body.same_as(&op.body) {
        stmt.clone()
    } else {
        Stmt::for_loop(op.var.clone(), min, extent, op.kind, op.device, body)
    }
}

pub fn walk_producer_consumer<M: Mutator + ?Sized>(
    m: &mut M,
    stmt: &Stmt,
    op: &ProducerConsumer,
) -> Stmt {
    let produce = m.mutate_stmt(&op.produce);
    let update = op.update.as_ref().map(|u| m.mutate_stmt(u));
    let consume = m.mutate_stmt(&op.consume);
    let update_same = match (&update, &op.update) {
        (Some(new), Some(old)) => new.same_as(old),
        _ => true,
    };
    if produce.same_as(&op.produce) && update_same && consume.same_as(&op.consume) {
        stmt.clone()
    } else {
        Stmt::producer_consumer(op.name.clone(), produce, update, consume)
    }
}

pub fn walk_store<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, op: &Store) -> Stmt {
    let value = m.mutate_expr(&op.value);
    let index = m.mutate_expr(&op.index);
    if value.same_as(&op.value) && index.same_as(&op.index) {
        stmt.clone()
    } else {
        Stmt::store(op.buffer.clone(), value, index)
    }
}

pub fn walk_assert<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, op: &Assert) -> Stmt {
    let condition = m.mutate_expr(&op.condition);
    let message = m.mutate_expr(&op.message);
    if condition.same_as(&op.condition) && message.same_as(&op.message) {
        stmt.clone()
    } else {
        Stmt::assert(condition, message)
    }
}

pub fn walk_evaluate<M: Mutator + ?Sized>(m: &mut M, stmt: &Stmt, op: &Evaluate) -> Stmt {
    let value = m.mutate_expr(&op.value);
    if value.same_as(&op.value) {
        stmt.clone()
    } else {
        Stmt::evaluate(value)
    }
}
