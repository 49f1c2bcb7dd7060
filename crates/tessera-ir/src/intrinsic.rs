//! Arithmetic intrinsics and their typing rules.

use std::fmt;
use std::str::FromStr;

use crate::types::{Type, TypeCode};

/// A named arithmetic operation with exact, target-independent semantics.
///
/// Backends either implement these natively or have them expanded into core
/// arithmetic by the lowering pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Intrinsic {
    WideningAdd,
    WideningSub,
    WideningMul,
    WideningShiftLeft,
    RoundingShiftRight,
    RoundingShiftLeft,
    SaturatingAdd,
    SaturatingSub,
    HalvingAdd { rounding: bool },
    HalvingSub { rounding: bool },
    MulhiShr,
    SortedAvg,
    Abs,
    Absd,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 16] = [
        Intrinsic::WideningAdd,
        Intrinsic::WideningSub,
        Intrinsic::WideningMul,
        Intrinsic::WideningShiftLeft,
        Intrinsic::RoundingShiftRight,
        Intrinsic::RoundingShiftLeft,
        Intrinsic::SaturatingAdd,
        Intrinsic::SaturatingSub,
        Intrinsic::HalvingAdd { rounding: false },
        Intrinsic::HalvingAdd { rounding: true },
        Intrinsic::HalvingSub { rounding: false },
        Intrinsic::HalvingSub { rounding: true },
        Intrinsic::MulhiShr,
        Intrinsic::SortedAvg,
        Intrinsic::Abs,
        Intrinsic::Absd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::WideningAdd => "widening_add",
            Intrinsic::WideningSub => "widening_sub",
            Intrinsic::WideningMul => "widening_mul",
            Intrinsic::WideningShiftLeft => "widening_shift_left",
            Intrinsic::RoundingShiftRight => "rounding_shift_right",
            Intrinsic::RoundingShiftLeft => "rounding_shift_left",
            Intrinsic::SaturatingAdd => "saturating_add",
            Intrinsic::SaturatingSub => "saturating_sub",
            Intrinsic::HalvingAdd { rounding: false } => "halving_add",
            Intrinsic::HalvingAdd { rounding: true } => "rounding_halving_add",
            Intrinsic::HalvingSub { rounding: false } => "halving_sub",
            Intrinsic::HalvingSub { rounding: true } => "rounding_halving_sub",
            Intrinsic::MulhiShr => "mulhi_shr",
            Intrinsic::SortedAvg => "sorted_avg",
            Intrinsic::Abs => "abs",
            Intrinsic::Absd => "absd",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Intrinsic::Abs => 1,
            Intrinsic::MulhiShr => 3,
            _ => 2,
        }
    }

    /// Whether the result is twice as wide as the operands.
    pub fn is_widening(self) -> bool {
        matches!(
            self,
            Intrinsic::WideningAdd
                | Intrinsic::WideningSub
                | Intrinsic::WideningMul
                | Intrinsic::WideningShiftLeft
        )
    }

    /// Result type for a call with the given argument types.
    ///
    /// # Panics
    ///
    /// Panics on a wrong argument count, on non-integer or mismatched
    /// arguments, and when a widening operation has no wider type available.
    pub fn result_type(self, args: &[Type]) -> Type {
        assert_eq!(
            args.len(),
            self.arity(),
            "{self} takes {} arguments, got {}",
            self.arity(),
            args.len()
        );
        let ty = args[0];
        assert!(
            ty.is_integer() && !ty.element_of().is_bool(),
            "{self} applied to type {ty}"
        );
        for other in &args[1..] {
            assert_eq!(ty, *other, "{self} applied to mismatched types");
        }

        match self {
            _ if self.is_widening() => ty
                .widen()
                .unwrap_or_else(|| panic!("{self} of {ty} has no wider type")),
            Intrinsic::MulhiShr => {
                assert!(ty.widen().is_some(), "{self} of {ty} has no wider type");
                ty
            }
            Intrinsic::Abs | Intrinsic::Absd => ty.with_code(TypeCode::UInt),
            _ => ty,
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Intrinsic {
    type Err = UnknownIntrinsic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intrinsic::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownIntrinsic(s.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, derive_more::Display)]
#[display("unknown intrinsic `{_0}`")]
pub struct UnknownIntrinsic(pub String);

impl std::error::Error for UnknownIntrinsic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in Intrinsic::ALL {
            assert_eq!(kind.name().parse::<Intrinsic>(), Ok(kind));
        }
        assert!("fused_multiply_add".parse::<Intrinsic>().is_err());
    }

    #[test]
    fn test_result_types() {
        let u8_ = Type::uint(8);
        let i16_ = Type::int(16);
        assert_eq!(Intrinsic::WideningAdd.result_type(&[u8_, u8_]), Type::uint(16));
        assert_eq!(Intrinsic::WideningSub.result_type(&[i16_, i16_]), Type::int(32));
        assert_eq!(Intrinsic::SaturatingAdd.result_type(&[u8_, u8_]), u8_);
        assert_eq!(Intrinsic::MulhiShr.result_type(&[i16_, i16_, i16_]), i16_);
        assert_eq!(Intrinsic::Abs.result_type(&[i16_]), Type::uint(16));
        assert_eq!(Intrinsic::Absd.result_type(&[u8_, u8_]), u8_);
    }

    #[test]
    #[should_panic(expected = "no wider type")]
    fn test_widening_64_bit_panics() {
        let t = Type::int(64);
        Intrinsic::WideningMul.result_type(&[t, t]);
    }

    #[test]
    #[should_panic(expected = "mismatched types")]
    fn test_mismatched_arguments_panic() {
        Intrinsic::HalvingAdd { rounding: false }.result_type(&[Type::uint(8), Type::int(8)]);
    }
}
