//! Lowering: expand intrinsic calls into core arithmetic.
//!
//! Each `lower_*` function is a pure function of the operand expressions. The
//! expansion computes the intrinsic's exact result for every operand value,
//! overflow cases included, using only operations of the operand type (or of
//! the widened type, for the widening family).

use tessera_ir::expr::{cast, make_const, select};
use tessera_ir::mutator::walk_call;
use tessera_ir::{Callee, Expr, Intrinsic, Mutator, Stmt, Type, TypeCode, simplify};
use tracing::trace;

use crate::target::Target;

fn wide_type(a: &Expr) -> Type {
    a.ty()
        .widen()
        .unwrap_or_else(|| panic!("no type wider than {} to lower into", a.ty()))
}

fn check_same_type(a: &Expr, b: &Expr) {
    assert_eq!(a.ty(), b.ty(), "intrinsic operands {a} and {b} differ in type");
}

pub fn lower_widening_add(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let wide = wide_type(a);
    cast(wide, a.clone()) + cast(wide, b.clone())
}

pub fn lower_widening_sub(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let wide = wide_type(a);
    cast(wide, a.clone()) - cast(wide, b.clone())
}

pub fn lower_widening_mul(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let wide = wide_type(a);
    cast(wide, a.clone()) * cast(wide, b.clone())
}

pub fn lower_widening_shift_left(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let wide = wide_type(a);
    cast(wide, a.clone()) << cast(wide, b.clone())
}

/// `(a >> b) + bit (b - 1) of a`, with a non-positive `b` shifting left.
pub fn lower_rounding_shift_right(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let one = make_const(a, 1);
    if let Some(k) = b.as_int()
        && k > 0
    {
        let round_bit = (a.clone() >> make_const(b, k - 1)) & one;
        return (a.clone() >> b.clone()) + round_bit;
    }
    let rounding = select(b.clone().gt(make_const(b, 0)), one.clone(), make_const(a, 0));
    let round_bit = (a.clone() >> (b.clone() - make_const(b, 1))) & rounding;
    (a.clone() >> b.clone()) + round_bit
}

pub fn lower_rounding_shift_left(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    if b.ty().is_uint() {
        return a.clone() << b.clone();
    }
    let negated = match b.as_int() {
        Some(k) => make_const(b, -k),
        None => make_const(b, 0) - b.clone(),
    };
    lower_rounding_shift_right(a, &negated)
}

pub fn lower_saturating_add(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let ty = a.ty();
    let max = make_const(a, ty.max_value());
    if ty.is_uint() {
        let sum = a.clone() + b.clone();
        return select(sum.clone().lt(a.clone()), max, sum);
    }
    let min = make_const(a, ty.min_value());
    let sum = a.clone() + b.clone();
    select(
        b.clone().gt(make_const(b, 0)),
        select(a.clone().gt(max.clone() - b.clone()), max, sum.clone()),
        select(a.clone().lt(min.clone() - b.clone()), min, sum),
    )
}

pub fn lower_saturating_sub(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let ty = a.ty();
    if ty.is_uint() {
        return select(b.clone().lt(a.clone()), a.clone() - b.clone(), make_const(a, 0));
    }
    let max = make_const(a, ty.max_value());
    let min = make_const(a, ty.min_value());
    let diff = a.clone() - b.clone();
    select(
        b.clone().gt(make_const(b, 0)),
        select(a.clone().lt(min.clone() + b.clone()), min, diff.clone()),
        select(a.clone().gt(max.clone() + b.clone()), max, diff),
    )
}

fn halves(a: &Expr, b: &Expr) -> (Expr, Expr, Expr) {
    let one = make_const(a, 1);
    (a.clone() >> one.clone(), b.clone() >> one.clone(), one)
}

pub fn lower_halving_add(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let (ha, hb, one) = halves(a, b);
    ha + hb + (a.clone() & b.clone() & one)
}

pub fn lower_rounding_halving_add(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let (ha, hb, one) = halves(a, b);
    ha + hb + ((a.clone() | b.clone()) & one)
}

pub fn lower_halving_sub(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let (ha, hb, one) = halves(a, b);
    ha - hb - (!a.clone() & b.clone() & one)
}

pub fn lower_rounding_halving_sub(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let (ha, hb, one) = halves(a, b);
    ha - hb + (a.clone() & !b.clone() & one)
}

/// `narrow((widen(a) * widen(b)) >> (bits + shift))`
pub fn lower_mulhi_shr(a: &Expr, b: &Expr, shift: &Expr) -> Expr {
    check_same_type(a, b);
    check_same_type(a, shift);
    let ty = a.ty();
    let wide = wide_type(a);
    let product = cast(wide, a.clone()) * cast(wide, b.clone());
    let amount = simplify(&(Expr::int(wide, ty.bits().into()) + cast(wide, shift.clone())));
    cast(ty, product >> amount)
}

/// `a + (b - a) / 2`, valid when `a <= b`.
pub fn lower_sorted_avg(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let ty = a.ty();
    if ty.is_uint() {
        return a.clone() + ((b.clone() - a.clone()) >> make_const(a, 1));
    }
    let unsigned = ty.with_code(TypeCode::UInt);
    let half = cast(unsigned, b.clone() - a.clone()) >> Expr::int(unsigned, 1);
    a.clone() + cast(ty, half)
}

pub fn lower_abs(a: &Expr) -> Expr {
    let ty = a.ty();
    if ty.is_uint() {
        return a.clone();
    }
    let zero = make_const(a, 0);
    let magnitude = select(a.clone().lt(zero.clone()), zero - a.clone(), a.clone());
    cast(ty.with_code(TypeCode::UInt), magnitude)
}

pub fn lower_absd(a: &Expr, b: &Expr) -> Expr {
    check_same_type(a, b);
    let ty = a.ty();
    let distance = select(
        a.clone().lt(b.clone()),
        b.clone() - a.clone(),
        a.clone() - b.clone(),
    );
    cast(ty.with_code(TypeCode::UInt), distance)
}

/// Expand one intrinsic call into core arithmetic.
///
/// # Panics
///
/// Panics if `call` is not an intrinsic call.
pub fn lower_intrinsic(call: &Expr) -> Expr {
    let Some((kind, args)) = call.as_intrinsic() else {
        panic!("lower_intrinsic on non-intrinsic expression {call}");
    };
    let lowered = match kind {
        Intrinsic::WideningAdd => lower_widening_add(&args[0], &args[1]),
        Intrinsic::WideningSub => lower_widening_sub(&args[0], &args[1]),
        Intrinsic::WideningMul => lower_widening_mul(&args[0], &args[1]),
        Intrinsic::WideningShiftLeft => lower_widening_shift_left(&args[0], &args[1]),
        Intrinsic::RoundingShiftRight => lower_rounding_shift_right(&args[0], &args[1]),
        Intrinsic::RoundingShiftLeft => lower_rounding_shift_left(&args[0], &args[1]),
        Intrinsic::SaturatingAdd => lower_saturating_add(&args[0], &args[1]),
        Intrinsic::SaturatingSub => lower_saturating_sub(&args[0], &args[1]),
        Intrinsic::HalvingAdd { rounding: false } => lower_halving_add(&args[0], &args[1]),
        Intrinsic::HalvingAdd { rounding: true } => lower_rounding_halving_add(&args[0], &args[1]),
        Intrinsic::HalvingSub { rounding: false } => lower_halving_sub(&args[0], &args[1]),
        Intrinsic::HalvingSub { rounding: true } => lower_rounding_halving_sub(&args[0], &args[1]),
        Intrinsic::MulhiShr => lower_mulhi_shr(&args[0], &args[1], &args[2]),
        Intrinsic::SortedAvg => lower_sorted_avg(&args[0], &args[1]),
        Intrinsic::Abs => lower_abs(&args[0]),
        Intrinsic::Absd => lower_absd(&args[0], &args[1]),
    };
    assert_eq!(
        lowered.ty(),
        call.ty(),
        "lowering {kind} changed the type of {call}"
    );
    lowered
}

/// Lower every intrinsic call in `expr` that `target` does not implement natively.
pub fn lower_intrinsics(expr: &Expr, target: &Target) -> Expr {
    IntrinsicLowerer { target }.mutate_expr(expr)
}

/// [`lower_intrinsics`] over every expression of a statement tree.
pub fn lower_intrinsics_stmt(stmt: &Stmt, target: &Target) -> Stmt {
    IntrinsicLowerer { target }.mutate_stmt(stmt)
}

struct IntrinsicLowerer<'t> {
    target: &'t Target,
}

impl Mutator for IntrinsicLowerer<'_> {
    fn visit_call(&mut self, expr: &Expr, callee: &Callee, args: &[Expr]) -> Expr {
        let e = walk_call(self, expr, callee, args);
        match e.as_intrinsic() {
            Some((kind, _)) if !self.target.has_native(kind) => {
                let lowered = lower_intrinsic(&e);
                trace!(from = %e, to = %lowered, "lowered");
                lowered
            }
            _ => e,
        }
    }
}
