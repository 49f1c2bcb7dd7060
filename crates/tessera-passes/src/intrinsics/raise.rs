//! Raising: recognize arithmetic idioms and replace them with intrinsic calls.
//!
//! The traversal is bottom-up, so by the time a node is inspected its operands
//! are already in raised form. A node that matched is inspected again, since
//! one rewrite can expose another (a widening add under a shift becomes a
//! halving add under a cast, and so on).
//!
//! Every pattern checks operand types exactly. Matching a shape at the wrong
//! width or signedness would change overflow behavior, so such near-misses are
//! left alone.

use tessera_ir::expr::make_const;
use tessera_ir::mutator::{walk_binary, walk_call, walk_cast, walk_select};
use tessera_ir::{
    BinaryOp, Callee, CmpOp, Expr, ExprKind, Intrinsic, Mutator, Stmt, Type, TypeCode, UnaryOp,
};
use tracing::trace;

/// Replace recognized arithmetic shapes in `expr` with intrinsic calls.
pub fn raise(expr: &Expr) -> Expr {
    Raiser.mutate_expr(expr)
}

/// [`raise`] every expression of a statement tree.
pub fn raise_stmt(stmt: &Stmt) -> Stmt {
    Raiser.mutate_stmt(stmt)
}

struct Raiser;

impl Mutator for Raiser {
    fn visit_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Expr {
        rewrite_until_stable(walk_binary(self, expr, op, lhs, rhs))
    }

    fn visit_select(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_value: &Expr,
        else_value: &Expr,
    ) -> Expr {
        rewrite_until_stable(walk_select(self, expr, condition, then_value, else_value))
    }

    fn visit_call(&mut self, expr: &Expr, callee: &Callee, args: &[Expr]) -> Expr {
        rewrite_until_stable(walk_call(self, expr, callee, args))
    }

    fn visit_cast(&mut self, expr: &Expr, value: &Expr) -> Expr {
        rewrite_until_stable(walk_cast(self, expr, value))
    }
}

fn rewrite_until_stable(mut expr: Expr) -> Expr {
    while let Some(raised) = match_pattern(&expr) {
        trace!(from = %expr, to = %raised, "raised");
        expr = raised;
    }
    expr
}

fn match_pattern(expr: &Expr) -> Option<Expr> {
    match expr.kind() {
        ExprKind::Binary { op, lhs, rhs } => match op {
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::Shl => match_widening(*op, expr.ty(), lhs, rhs),
            BinaryOp::Sub => match_widening(*op, expr.ty(), lhs, rhs)
                .or_else(|| match_absd_of_min_max(expr.ty(), lhs, rhs)),
            _ => None,
        },
        ExprKind::Cast { value } => match_narrowing_cast(expr.ty(), value),
        ExprKind::Select { .. } if expr.ty().is_uint() => match_absd_select(expr),
        ExprKind::Call {
            callee: Callee::Intrinsic(kind),
            args,
        } => match_intrinsic_call(*kind, args),
        _ => None,
    }
}

// =============================================================================
// Operand views
// =============================================================================

/// `x` as a value of type `narrow`: either a cast from exactly that type, or a
/// constant that type can represent.
fn narrow_operand(x: &Expr, narrow: Type) -> Option<Expr> {
    if let Some(value) = x.as_cast() {
        return (value.ty() == narrow).then(|| value.clone());
    }
    let v = x.as_int()?;
    narrow.can_represent(v).then(|| Expr::int(narrow, v))
}

/// Both operands viewed at type `narrow`, with at least one of them a real cast.
fn narrow_operands(lhs: &Expr, rhs: &Expr, narrow: Type) -> Option<(Expr, Expr)> {
    if lhs.as_cast().is_none() && rhs.as_cast().is_none() {
        return None;
    }
    Some((narrow_operand(lhs, narrow)?, narrow_operand(rhs, narrow)?))
}

fn intrinsic_args(expr: &Expr, kind: Intrinsic) -> Option<&[Expr]> {
    match expr.as_intrinsic() {
        Some((k, args)) if k == kind => Some(args),
        _ => None,
    }
}

fn unsigned_of(ty: Type) -> Type {
    ty.with_code(TypeCode::UInt)
}

// =============================================================================
// Widening arithmetic
// =============================================================================

fn match_widening(op: BinaryOp, wide: Type, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let narrow = wide.narrow().filter(|n| n.widen() == Some(wide))?;
    let kind = match op {
        BinaryOp::Add => Intrinsic::WideningAdd,
        BinaryOp::Sub => Intrinsic::WideningSub,
        BinaryOp::Mul => Intrinsic::WideningMul,
        BinaryOp::Shl => Intrinsic::WideningShiftLeft,
        _ => return None,
    };
    let (a, b) = narrow_operands(lhs, rhs, narrow)?;
    Some(Expr::intrinsic(kind, [a, b]))
}

// =============================================================================
// Narrowing casts
// =============================================================================

fn match_narrowing_cast(narrow: Type, value: &Expr) -> Option<Expr> {
    if !narrow.is_integer() || narrow.is_bool() {
        return None;
    }
    match_shift_family(narrow, value)
        .or_else(|| match_saturating(narrow, value))
        .or_else(|| match_signed_abs(narrow, value))
}

/// `narrow(x >> k)` where `x` is a widening operation on `narrow` operands.
fn match_shift_family(narrow: Type, value: &Expr) -> Option<Expr> {
    if value.ty().narrow() != Some(narrow) {
        return None;
    }
    let (inner, amount) = value.as_binary(BinaryOp::Shr)?;
    let k = amount.as_int()?;
    if k < 1 {
        return None;
    }

    // narrow((widen(a) + 2^(k-1)) >> k)
    if let Some(args) = intrinsic_args(inner, Intrinsic::WideningAdd)
        && args[0].ty() == narrow
        && k <= i128::from(narrow.bits())
    {
        let bias = 1i128 << (k - 1);
        for (a, c) in [(&args[0], &args[1]), (&args[1], &args[0])] {
            if c.is_const(bias) && narrow.can_represent(k) {
                return Some(Expr::intrinsic(
                    Intrinsic::RoundingShiftRight,
                    [a.clone(), Expr::int(narrow, k)],
                ));
            }
        }
    }

    if k == 1 {
        // narrow((a + b) >> 1) and narrow((a - b) >> 1)
        for widening in [Intrinsic::WideningAdd, Intrinsic::WideningSub] {
            if let Some(args) = intrinsic_args(inner, widening)
                && args[0].ty() == narrow
            {
                return Some(halving(widening, false, args));
            }
        }
        // narrow((a + b + 1) >> 1) and narrow((a - b + 1) >> 1)
        if let Some((x, y)) = inner.as_binary(BinaryOp::Add) {
            for (sum, one) in [(x, y), (y, x)] {
                if !one.is_const(1) {
                    continue;
                }
                for widening in [Intrinsic::WideningAdd, Intrinsic::WideningSub] {
                    if let Some(args) = intrinsic_args(sum, widening)
                        && args[0].ty() == narrow
                    {
                        return Some(halving(widening, true, args));
                    }
                }
            }
        }
    }

    // narrow(widening_mul(a, b) >> k) with k at least the narrow width
    if let Some(args) = intrinsic_args(inner, Intrinsic::WideningMul)
        && args[0].ty() == narrow
    {
        let shift = k - i128::from(narrow.bits());
        if shift >= 0 && narrow.can_represent(shift) {
            return Some(Expr::intrinsic(
                Intrinsic::MulhiShr,
                [args[0].clone(), args[1].clone(), Expr::int(narrow, shift)],
            ));
        }
    }
    None
}

fn halving(widening: Intrinsic, rounding: bool, args: &[Expr]) -> Expr {
    let kind = if widening == Intrinsic::WideningAdd {
        Intrinsic::HalvingAdd { rounding }
    } else {
        Intrinsic::HalvingSub { rounding }
    };
    Expr::intrinsic(kind, [args[0].clone(), args[1].clone()])
}

/// `x` clamped by constant bounds: `min(max(x, lo), hi)`, `max(min(x, hi), lo)`,
/// or a single bound.
fn parse_clamp(e: &Expr) -> Option<(&Expr, Option<i128>, Option<i128>)> {
    if let Some((inner, hi)) = e.as_binary(BinaryOp::Min) {
        let hi = hi.as_int()?;
        if let Some((x, lo)) = inner.as_binary(BinaryOp::Max)
            && let Some(lo) = lo.as_int()
        {
            return Some((x, Some(lo), Some(hi)));
        }
        return Some((inner, None, Some(hi)));
    }
    if let Some((inner, lo)) = e.as_binary(BinaryOp::Max) {
        let lo = lo.as_int()?;
        if let Some((x, hi)) = inner.as_binary(BinaryOp::Min)
            && let Some(hi) = hi.as_int()
        {
            return Some((x, Some(lo), Some(hi)));
        }
        return Some((inner, Some(lo), None));
    }
    None
}

/// `x` as an exact add or subtract of two `narrow` values.
fn exact_add_sub(x: &Expr, narrow: Type) -> Option<(BinaryOp, Expr, Expr)> {
    for (kind, op) in [
        (Intrinsic::WideningAdd, BinaryOp::Add),
        (Intrinsic::WideningSub, BinaryOp::Sub),
    ] {
        if let Some(args) = intrinsic_args(x, kind)
            && args[0].ty() == narrow
        {
            return Some((op, args[0].clone(), args[1].clone()));
        }
    }
    let wide = x.ty();
    if wide.bits() < narrow.bits() * 2 {
        return None;
    }
    for op in [BinaryOp::Add, BinaryOp::Sub] {
        if let Some((lhs, rhs)) = x.as_binary(op) {
            let (a, b) = narrow_operands(lhs, rhs, narrow)?;
            return Some((op, a, b));
        }
    }
    None
}

/// `narrow(clamp(a ± b, narrow::MIN, narrow::MAX))` computed exactly in a wider type.
fn match_saturating(narrow: Type, value: &Expr) -> Option<Expr> {
    let (x, lo, hi) = parse_clamp(value)?;
    let wide = x.ty();
    let (op, a, b) = exact_add_sub(x, narrow)?;

    if lo.is_some_and(|lo| lo != narrow.min_value()) || hi.is_some_and(|hi| hi != narrow.max_value()) {
        return None;
    }
    // A bound may only be omitted when the operation cannot cross it.
    let bounds_ok = match (op, narrow.is_uint()) {
        (BinaryOp::Add, true) => hi.is_some(),
        (BinaryOp::Sub, true) => lo.is_some() && wide.is_int(),
        _ => lo.is_some() && hi.is_some() && wide.is_int(),
    };
    if !bounds_ok {
        return None;
    }
    let kind = if op == BinaryOp::Add {
        Intrinsic::SaturatingAdd
    } else {
        Intrinsic::SaturatingSub
    };
    Some(Expr::intrinsic(kind, [a, b]))
}

/// `select(a < b, b - a, a - b)`, returning `(a, b)`.
fn parse_distance(e: &Expr) -> Option<(Expr, Expr)> {
    let (condition, then_value, else_value) = e.as_select()?;
    let (a, b) = condition.as_compare(CmpOp::Lt)?;
    let (t0, t1) = then_value.as_binary(BinaryOp::Sub)?;
    let (e0, e1) = else_value.as_binary(BinaryOp::Sub)?;
    (t0 == b && t1 == a && e0 == a && e1 == b).then(|| (a.clone(), b.clone()))
}

/// `max(a, b) - min(a, b)`, in either operand order, returning `(a, b)`.
fn parse_max_minus_min(lhs: &Expr, rhs: &Expr) -> Option<(Expr, Expr)> {
    let (a, b) = lhs.as_binary(BinaryOp::Max)?;
    let (c, d) = rhs.as_binary(BinaryOp::Min)?;
    ((a == c && b == d) || (a == d && b == c)).then(|| (a.clone(), b.clone()))
}

/// Unsigned distance computed directly in the operand type.
fn match_absd_select(expr: &Expr) -> Option<Expr> {
    let (a, b) = parse_distance(expr)?;
    Some(Expr::intrinsic(Intrinsic::Absd, [a, b]))
}

fn match_absd_of_min_max(ty: Type, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    if !ty.is_uint() {
        return None;
    }
    let (a, b) = parse_max_minus_min(lhs, rhs)?;
    Some(Expr::intrinsic(Intrinsic::Absd, [a, b]))
}

/// `unsigned(select(a < 0, -a, a))` and signed distances reinterpreted as unsigned.
fn match_signed_abs(result: Type, value: &Expr) -> Option<Expr> {
    let signed = value.ty();
    if !signed.is_int() || unsigned_of(signed) != result {
        return None;
    }

    if let Some((a, b)) = parse_distance(value) {
        return Some(Expr::intrinsic(Intrinsic::Absd, [a, b]));
    }
    if let Some((lhs, rhs)) = value.as_binary(BinaryOp::Sub)
        && let Some((a, b)) = parse_max_minus_min(lhs, rhs)
    {
        return Some(Expr::intrinsic(Intrinsic::Absd, [a, b]));
    }

    let (condition, negated, a) = value.as_select()?;
    let (x, zero) = condition.as_compare(CmpOp::Lt)?;
    if x != a || !zero.is_zero() || !is_negation_of(negated, a) {
        return None;
    }
    Some(Expr::intrinsic(Intrinsic::Abs, [a.clone()]))
}

fn is_negation_of(e: &Expr, a: &Expr) -> bool {
    match e.kind() {
        ExprKind::Unary {
            op: UnaryOp::Neg,
            value,
        } => value == a,
        _ => e
            .as_binary(BinaryOp::Sub)
            .is_some_and(|(zero, value)| zero.is_zero() && value == a),
    }
}

// =============================================================================
// Rewrites of intrinsic calls
// =============================================================================

fn match_intrinsic_call(kind: Intrinsic, args: &[Expr]) -> Option<Expr> {
    match kind {
        Intrinsic::HalvingAdd { rounding: false } if provably_le(&args[0], &args[1]) => Some(
            Expr::intrinsic(Intrinsic::SortedAvg, [args[0].clone(), args[1].clone()]),
        ),
        Intrinsic::RoundingShiftRight => {
            let amount = &args[1];
            if !amount.ty().is_int() {
                return None;
            }
            let negated = negated_operand(amount)?;
            Some(Expr::intrinsic(
                Intrinsic::RoundingShiftLeft,
                [args[0].clone(), negated],
            ))
        }
        _ => None,
    }
}

/// `b` when `amount` is `0 - b` or `-b`, or `-k` for a negative constant `k`.
fn negated_operand(amount: &Expr) -> Option<Expr> {
    if let Some(k) = amount.as_int() {
        return (k < 0 && amount.ty().can_represent(-k)).then(|| make_const(amount, -k));
    }
    match amount.kind() {
        ExprKind::Unary {
            op: UnaryOp::Neg,
            value,
        } => Some(value.clone()),
        _ => {
            let (zero, b) = amount.as_binary(BinaryOp::Sub)?;
            zero.is_zero().then(|| b.clone())
        }
    }
}

/// Whether `a <= b` holds for every value of the free variables.
fn provably_le(a: &Expr, b: &Expr) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return x <= y;
    }
    let min_of = a.as_binary(BinaryOp::Min);
    let max_of = b.as_binary(BinaryOp::Max);
    if let Some((p, q)) = min_of
        && (p == b || q == b)
    {
        return true;
    }
    if let Some((p, q)) = max_of
        && (p == a || q == a)
    {
        return true;
    }
    match (min_of, max_of) {
        (Some((p, q)), Some((r, s))) => (p == r && q == s) || (p == s && q == r),
        _ => false,
    }
}
