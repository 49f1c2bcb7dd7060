//! Bottom-up constant folding and algebraic identities.
//!
//! Folds integer constants and a handful of identities. Anything it does not
//! recognize is returned unchanged (and shared).

use crate::arith;
use crate::expr::{BinaryOp, CmpOp, Expr, ExprKind, UnaryOp};
use crate::mutator::{walk_binary, walk_cast, walk_compare, walk_select, walk_unary, Mutator};

pub fn simplify(expr: &Expr) -> Expr {
    Simplifier.mutate_expr(expr)
}

struct Simplifier;

impl Mutator for Simplifier {
    fn visit_unary(&mut self, expr: &Expr, op: UnaryOp, value: &Expr) -> Expr {
        let e = walk_unary(self, expr, op, value);
        let ExprKind::Unary { value, .. } = e.kind() else {
            return e;
        };
        match value.as_int() {
            Some(v) => Expr::int(e.ty(), arith::unary(op, e.ty(), v)),
            None => e,
        }
    }

    fn visit_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Expr {
        let e = walk_binary(self, expr, op, lhs, rhs);
        let ExprKind::Binary { lhs, rhs, .. } = e.kind() else {
            return e;
        };
        fold_binary(op, lhs, rhs).unwrap_or(e)
    }

    fn visit_compare(&mut self, expr: &Expr, op: CmpOp, lhs: &Expr, rhs: &Expr) -> Expr {
        let e = walk_compare(self, expr, op, lhs, rhs);
        let ExprKind::Compare { lhs, rhs, .. } = e.kind() else {
            return e;
        };
        match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) if e.ty().is_scalar() => Expr::bool(arith::compare(op, a, b)),
            _ => e,
        }
    }

    fn visit_select(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_value: &Expr,
        else_value: &Expr,
    ) -> Expr {
        let e = walk_select(self, expr, condition, then_value, else_value);
        let Some((condition, then_value, else_value)) = e.as_select() else {
            return e;
        };
        match condition.as_int() {
            Some(0) => else_value.clone(),
            Some(_) => then_value.clone(),
            None if then_value == else_value => then_value.clone(),
            None => e,
        }
    }

    fn visit_cast(&mut self, expr: &Expr, value: &Expr) -> Expr {
        let e = walk_cast(self, expr, value);
        let Some(value) = e.as_cast() else {
            return e;
        };
        match value.as_int() {
            Some(v) if e.ty().is_integer() => Expr::int(e.ty(), v),
            _ => e,
        }
    }
}

fn fold_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let ty = lhs.ty();
    if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
        return Some(Expr::int(ty, arith::binary(op, ty, a, b)));
    }
    match op {
        BinaryOp::Add if rhs.is_zero() => Some(lhs.clone()),
        BinaryOp::Add if lhs.is_zero() => Some(rhs.clone()),
        BinaryOp::Sub if rhs.is_zero() => Some(lhs.clone()),
        BinaryOp::Mul | BinaryOp::Div if rhs.is_const(1) => Some(lhs.clone()),
        BinaryOp::Mul if lhs.is_const(1) => Some(rhs.clone()),
        BinaryOp::Mul if ty.is_integer() && (lhs.is_zero() || rhs.is_zero()) => {
            Some(Expr::int(ty, 0))
        }
        BinaryOp::Shl | BinaryOp::Shr if rhs.is_zero() => Some(lhs.clone()),
        BinaryOp::Min | BinaryOp::Max if lhs == rhs => Some(lhs.clone()),
        BinaryOp::Min | BinaryOp::Max => fold_nested_bound(op, lhs, rhs),
        _ => None,
    }
}

/// `max(max(x, c1), c2)` to `max(x, max(c1, c2))`, and the same for `min`.
fn fold_nested_bound(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let (outer_const, inner) = match (lhs.as_int(), rhs.as_int()) {
        (_, Some(c)) => (c, lhs),
        (Some(c), _) => (c, rhs),
        _ => return None,
    };
    let (x, inner_const) = inner.as_binary(op)?;
    let c = inner_const.as_int()?;
    let ty = lhs.ty();
    let bound = Expr::int(ty, arith::binary(op, ty, outer_const, c));
    Some(Expr::binary(op, x.clone(), bound))
}
