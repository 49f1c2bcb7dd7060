//! Exact integer semantics shared by constant folding and the interpreter.
//!
//! Values are carried as `i128` and always normalized into their type's range
//! with [`Type::wrap`], so arithmetic wraps modulo 2^bits.
//!
//! Conventions:
//! - Shifting by a negative amount shifts the other way.
//! - Shifting by at least the bit width yields zero, or the sign fill for a
//!   signed right shift.
//! - Division is Euclidean: the remainder is never negative. Division or
//!   remainder by zero yields zero.

use crate::expr::{BinaryOp, CmpOp, UnaryOp};
use crate::intrinsic::Intrinsic;
use crate::types::{Type, TypeCode};

pub fn shift_left(ty: Type, value: i128, amount: i128) -> i128 {
    if amount < 0 {
        return shift_right(ty, value, amount.saturating_neg());
    }
    if amount >= i128::from(ty.bits()) {
        return 0;
    }
    ty.wrap(value << amount)
}

pub fn shift_right(ty: Type, value: i128, amount: i128) -> i128 {
    if amount < 0 {
        return shift_left(ty, value, amount.saturating_neg());
    }
    if amount >= i128::from(ty.bits()) {
        return if value < 0 { -1 } else { 0 };
    }
    // Values are normalized, so an arithmetic shift of the i128 is exact for
    // both signed and unsigned types.
    ty.wrap(value >> amount)
}

pub fn binary(op: BinaryOp, ty: Type, a: i128, b: i128) -> i128 {
    let raw = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                0
            } else {
                a.div_euclid(b)
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                0
            } else {
                a.rem_euclid(b)
            }
        }
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => return shift_left(ty, a, b),
        BinaryOp::Shr => return shift_right(ty, a, b),
    };
    ty.wrap(raw)
}

pub fn unary(op: UnaryOp, ty: Type, a: i128) -> i128 {
    match op {
        UnaryOp::Neg => ty.wrap(-a),
        UnaryOp::Not if ty.is_bool() => 1 - a,
        UnaryOp::Not => ty.wrap(!a),
    }
}

pub fn compare(op: CmpOp, a: i128, b: i128) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

/// Reference semantics of an intrinsic applied to operands of type `ty`.
///
/// `sorted_avg` assumes its first operand is not greater than the second;
/// outside that domain it matches its expansion in core arithmetic.
pub fn intrinsic(kind: Intrinsic, ty: Type, args: &[i128]) -> i128 {
    let a = args[0];
    let b = args.get(1).copied().unwrap_or(0);
    let unsigned = ty.with_code(TypeCode::UInt);
    match kind {
        Intrinsic::WideningAdd => wider(ty).wrap(a + b),
        Intrinsic::WideningSub => wider(ty).wrap(a - b),
        Intrinsic::WideningMul => wider(ty).wrap(a * b),
        Intrinsic::WideningShiftLeft => shift_left(wider(ty), a, b),
        Intrinsic::RoundingShiftRight => rounding_shift_right(ty, a, b),
        Intrinsic::RoundingShiftLeft => {
            if ty.is_uint() {
                shift_left(ty, a, b)
            } else {
                rounding_shift_right(ty, a, ty.wrap(-b))
            }
        }
        Intrinsic::SaturatingAdd => (a + b).clamp(ty.min_value(), ty.max_value()),
        Intrinsic::SaturatingSub => (a - b).clamp(ty.min_value(), ty.max_value()),
        Intrinsic::HalvingAdd { rounding } => ty.wrap((a + b + i128::from(rounding)) >> 1),
        Intrinsic::HalvingSub { rounding } => ty.wrap((a - b + i128::from(rounding)) >> 1),
        Intrinsic::MulhiShr => {
            let wide = wider(ty);
            let product = wide.wrap(a * b);
            let amount = wide.wrap(i128::from(ty.bits()) + args[2]);
            ty.wrap(shift_right(wide, product, amount))
        }
        Intrinsic::SortedAvg => {
            let half = shift_right(unsigned, unsigned.wrap(b - a), 1);
            ty.wrap(a + half)
        }
        Intrinsic::Abs => unsigned.wrap(a.abs()),
        Intrinsic::Absd => unsigned.wrap((a - b).abs()),
    }
}

fn wider(ty: Type) -> Type {
    ty.widen()
        .unwrap_or_else(|| panic!("widening intrinsic on {ty}"))
}

/// `round(a / 2^b)` with ties toward positive infinity; a non-positive `b`
/// shifts left instead.
fn rounding_shift_right(ty: Type, a: i128, b: i128) -> i128 {
    if b <= 0 {
        return shift_left(ty, a, -b);
    }
    // Beyond 100 bits the rounded quotient of any 64-bit value is zero.
    let b = b.min(100);
    ty.wrap((a + (1i128 << (b - 1))) >> b)
}
