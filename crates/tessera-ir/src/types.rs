//! Value types carried by every expression.
//!
//! A type is a scalar code (signed, unsigned, float, handle), a bit width, and a
//! lane count. Integer widths are not restricted to powers of two: a `u33` is a
//! perfectly valid type, it just has no narrower or wider partner.

use std::fmt;

/// The scalar category of a [`Type`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeCode {
    Int,
    UInt,
    Float,
    Handle,
}

/// A statically known expression type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    code: TypeCode,
    bits: u8,
    lanes: u16,
}

impl Type {
    pub const fn new(code: TypeCode, bits: u8, lanes: u16) -> Self {
        Self { code, bits, lanes }
    }

    pub const fn int(bits: u8) -> Self {
        Self::new(TypeCode::Int, bits, 1)
    }

    pub const fn uint(bits: u8) -> Self {
        Self::new(TypeCode::UInt, bits, 1)
    }

    pub const fn float(bits: u8) -> Self {
        Self::new(TypeCode::Float, bits, 1)
    }

    /// Booleans are one-bit unsigned integers.
    pub const fn bool() -> Self {
        Self::uint(1)
    }

    /// Opaque pointer-sized handle (buffers, strings, runtime state).
    pub const fn handle() -> Self {
        Self::new(TypeCode::Handle, 64, 1)
    }

    pub fn code(self) -> TypeCode {
        self.code
    }

    pub fn bits(self) -> u8 {
        self.bits
    }

    pub fn lanes(self) -> u16 {
        self.lanes
    }

    pub fn with_lanes(self, lanes: u16) -> Self {
        Self { lanes, ..self }
    }

    pub fn with_code(self, code: TypeCode) -> Self {
        Self { code, ..self }
    }

    pub fn with_bits(self, bits: u8) -> Self {
        Self { bits, ..self }
    }

    /// The scalar type of a single lane.
    pub fn element_of(self) -> Self {
        self.with_lanes(1)
    }

    pub fn is_int(self) -> bool {
        self.code == TypeCode::Int
    }

    pub fn is_uint(self) -> bool {
        self.code == TypeCode::UInt
    }

    pub fn is_bool(self) -> bool {
        self.code == TypeCode::UInt && self.bits == 1
    }

    pub fn is_float(self) -> bool {
        self.code == TypeCode::Float
    }

    pub fn is_handle(self) -> bool {
        self.code == TypeCode::Handle
    }

    /// Signed or unsigned integer (booleans included).
    pub fn is_integer(self) -> bool {
        matches!(self.code, TypeCode::Int | TypeCode::UInt)
    }

    pub fn is_scalar(self) -> bool {
        self.lanes == 1
    }

    /// Storage size of one lane in bytes.
    pub fn bytes(self) -> u32 {
        u32::from(self.bits).div_ceil(8)
    }

    /// The integer type with twice the bits and the same signedness.
    ///
    /// Returns `None` for non-integers and for widths whose double would not
    /// fit in 64 bits.
    pub fn widen(self) -> Option<Self> {
        if !self.is_integer() || self.is_bool() || self.bits > 32 {
            return None;
        }
        Some(self.with_bits(self.bits * 2))
    }

    /// The integer type with half the bits and the same signedness.
    ///
    /// Returns `None` for odd widths and for widths below 16.
    pub fn narrow(self) -> Option<Self> {
        if !self.is_integer() || self.bits < 16 || self.bits % 2 != 0 {
            return None;
        }
        Some(self.with_bits(self.bits / 2))
    }

    /// Smallest representable integer value.
    ///
    /// # Panics
    ///
    /// Panics if the type is not an integer type.
    pub fn min_value(self) -> i128 {
        match self.code {
            TypeCode::Int => -(1i128 << (self.bits - 1)),
            TypeCode::UInt => 0,
            _ => panic!("min_value of non-integer type {self}"),
        }
    }

    /// Largest representable integer value.
    ///
    /// # Panics
    ///
    /// Panics if the type is not an integer type.
    pub fn max_value(self) -> i128 {
        match self.code {
            TypeCode::Int => (1i128 << (self.bits - 1)) - 1,
            TypeCode::UInt => (1i128 << self.bits) - 1,
            _ => panic!("max_value of non-integer type {self}"),
        }
    }

    pub fn can_represent(self, value: i128) -> bool {
        self.is_integer() && self.min_value() <= value && value <= self.max_value()
    }

    /// Reduce `value` modulo 2^bits into this type's range (two's complement).
    pub fn wrap(self, value: i128) -> i128 {
        assert!(self.is_integer(), "wrap on non-integer type {self}");
        let modulus = 1i128 << self.bits;
        let reduced = value.rem_euclid(modulus);
        if self.is_int() && reduced > self.max_value() {
            reduced - modulus
        } else {
            reduced
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            TypeCode::UInt if self.bits == 1 => write!(f, "bool")?,
            TypeCode::Int => write!(f, "i{}", self.bits)?,
            TypeCode::UInt => write!(f, "u{}", self.bits)?,
            TypeCode::Float => write!(f, "f{}", self.bits)?,
            TypeCode::Handle => write!(f, "handle")?,
        }
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_and_narrow() {
        assert_eq!(Type::uint(16).widen(), Some(Type::uint(32)));
        assert_eq!(Type::int(8).widen(), Some(Type::int(16)));
        assert_eq!(Type::int(64).widen(), None);
        assert_eq!(Type::float(32).widen(), None);
        assert_eq!(Type::uint(32).narrow(), Some(Type::uint(16)));
        assert_eq!(Type::uint(33).narrow(), None);
        assert_eq!(Type::uint(8).narrow(), None);
        assert_eq!(Type::uint(8).with_lanes(16).widen(), Some(Type::uint(16).with_lanes(16)));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(Type::int(8).min_value(), -128);
        assert_eq!(Type::int(8).max_value(), 127);
        assert_eq!(Type::uint(8).max_value(), 255);
        assert_eq!(Type::uint(64).max_value(), u64::MAX as i128);
        assert!(Type::bool().can_represent(1));
        assert!(!Type::bool().can_represent(2));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(Type::int(8).wrap(128), -128);
        assert_eq!(Type::int(8).wrap(-129), 127);
        assert_eq!(Type::uint(8).wrap(-1), 255);
        assert_eq!(Type::uint(8).wrap(256), 0);
        assert_eq!(Type::int(64).wrap(i64::MAX as i128 + 1), i64::MIN as i128);
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::uint(8).to_string(), "u8");
        assert_eq!(Type::int(32).to_string(), "i32");
        assert_eq!(Type::bool().to_string(), "bool");
        assert_eq!(Type::uint(16).with_lanes(8).to_string(), "u16x8");
        assert_eq!(Type::handle().to_string(), "handle");
    }
}
