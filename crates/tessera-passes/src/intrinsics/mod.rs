//! Intrinsic pattern engine.
//!
//! [`raise`] turns arithmetic idioms into calls to [`Intrinsic`]s that a code
//! generator can map onto single instructions. [`lower_intrinsics`] turns the
//! calls a target cannot execute back into core arithmetic. Raising then
//! lowering preserves the value of every expression.
//!
//! [`as_add`] and [`as_mul`] let other passes treat a widening call as the
//! plain operation it computes.

mod lower;
mod raise;


pub use lower::*;
pub use raise::{raise, raise_stmt};

use tessera_ir::expr::cast;
use tessera_ir::{BinaryOp, Expr, Intrinsic};

/// View `e` as an addition.
///
/// Returns `e` itself for an `Add`, and an `Add` of widened operands for a
/// `widening_add` call.
pub fn as_add(e: &Expr) -> Option<Expr> {
    if e.as_binary(BinaryOp::Add).is_some() {
        return Some(e.clone());
    }
    let (Intrinsic::WideningAdd, args) = e.as_intrinsic()? else {
        return None;
    };
    let wide = e.ty();
    Some(cast(wide, args[0].clone()) + cast(wide, args[1].clone()))
}

/// View `e` as a multiplication.
///
/// Besides `Mul` and `widening_mul`, a left shift by a constant smaller than
/// the operand width is a multiplication by a power of two.
pub fn as_mul(e: &Expr) -> Option<Expr> {
    if e.as_binary(BinaryOp::Mul).is_some() {
        return Some(e.clone());
    }
    if let Some((a, amount)) = e.as_binary(BinaryOp::Shl) {
        let k = shift_as_multiplier(amount, e.ty().bits())?;
        return Some(a.clone() * Expr::int(e.ty(), 1 << k));
    }
    let (kind, args) = e.as_intrinsic()?;
    let wide = e.ty();
    match kind {
        Intrinsic::WideningMul => Some(cast(wide, args[0].clone()) * cast(wide, args[1].clone())),
        Intrinsic::WideningShiftLeft => {
            let k = shift_as_multiplier(&args[1], args[0].ty().bits())?;
            Some(cast(wide, args[0].clone()) * Expr::int(wide, 1 << k))
        }
        _ => None,
    }
}

fn shift_as_multiplier(amount: &Expr, bits: u8) -> Option<i128> {
    amount
        .as_int()
        .filter(|k| (0..i128::from(bits)).contains(k))
}
