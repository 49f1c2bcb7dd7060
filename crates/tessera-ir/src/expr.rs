//! Expression nodes.
//!
//! Expressions are immutable, reference-counted trees. Cloning an [`Expr`] is a
//! pointer copy, and rewriting passes rely on [`Expr::same_as`] to tell a node
//! they returned untouched from an equal-but-rebuilt one.
//!
//! Every constructor checks operand types. A mismatch is a compiler bug, not a
//! user error, so it panics with both types in the message.

use std::fmt;
use std::ops;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::intrinsic::Intrinsic;
use crate::types::Type;

/// Argument list of a call node.
pub type ExprVec = SmallVec<[Expr; 3]>;

/// A shared, immutable expression tree.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

#[derive(Debug, PartialEq)]
pub struct ExprNode {
    ty: Type,
    kind: ExprKind,
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    /// Integer immediate, already wrapped into the node's type.
    IntImm(i128),
    FloatImm(f64),
    /// String literal; handle typed.
    StringImm(String),
    Var(String),
    Unary {
        op: UnaryOp,
        value: Expr,
    },
    Binary {
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
    },
    Compare {
        op: CmpOp,
        lhs: Expr,
        rhs: Expr,
    },
    Select {
        condition: Expr,
        then_value: Expr,
        else_value: Expr,
    },
    Load {
        buffer: String,
        index: Expr,
    },
    Call {
        callee: Callee,
        args: ExprVec,
    },
    Cast {
        value: Expr,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// Bitwise and shift operators only make sense on integers.
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// What a call node invokes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Arithmetic intrinsic with target-independent semantics.
    Intrinsic(Intrinsic),
    /// Function provided by the runtime, called by name.
    Extern(String),
    /// Compiler builtin understood by every backend.
    Builtin(Builtin),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Address of a `Load` node's element.
    AddressOf,
    /// Queue `args[0]` (a function name) to be called with `args[1]` when the
    /// pipeline invocation exits, on every exit path.
    RegisterDestructor,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::AddressOf => "address_of",
            Builtin::RegisterDestructor => "register_destructor",
        }
    }
}

// =============================================================================
// Construction
// =============================================================================

impl Expr {
    fn make(ty: Type, kind: ExprKind) -> Self {
        Expr(Arc::new(ExprNode { ty, kind }))
    }

    /// Integer immediate. The value is wrapped into `ty`.
    pub fn int(ty: Type, value: i128) -> Self {
        assert!(ty.is_integer(), "integer immediate of non-integer type {ty}");
        Self::make(ty, ExprKind::IntImm(ty.wrap(value)))
    }

    pub fn i32(value: i32) -> Self {
        Self::int(Type::int(32), value.into())
    }

    pub fn i64(value: i64) -> Self {
        Self::int(Type::int(64), value.into())
    }

    pub fn bool(value: bool) -> Self {
        Self::int(Type::bool(), value.into())
    }

    pub fn float(ty: Type, value: f64) -> Self {
        assert!(ty.is_float(), "float immediate of non-float type {ty}");
        Self::make(ty, ExprKind::FloatImm(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::make(Type::handle(), ExprKind::StringImm(value.into()))
    }

    pub fn var(ty: Type, name: impl Into<String>) -> Self {
        Self::make(ty, ExprKind::Var(name.into()))
    }

    pub fn unary(op: UnaryOp, value: Expr) -> Self {
        let ty = value.ty();
        match op {
            UnaryOp::Neg => assert!(
                ty.is_integer() || ty.is_float(),
                "negation of non-numeric type {ty}"
            ),
            UnaryOp::Not => assert!(ty.is_integer(), "not of non-integer type {ty}"),
        }
        Self::make(ty, ExprKind::Unary { op, value })
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        let ty = lhs.ty();
        assert_eq!(
            ty,
            rhs.ty(),
            "type mismatch in `{lhs} {} {rhs}`",
            op.symbol()
        );
        if op.is_bitwise() {
            assert!(ty.is_integer(), "bitwise `{}` on type {ty}", op.symbol());
        }
        Self::make(ty, ExprKind::Binary { op, lhs, rhs })
    }

    pub fn compare(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        assert_eq!(
            lhs.ty(),
            rhs.ty(),
            "type mismatch in `{lhs} {} {rhs}`",
            op.symbol()
        );
        let ty = Type::bool().with_lanes(lhs.ty().lanes());
        Self::make(ty, ExprKind::Compare { op, lhs, rhs })
    }

    pub fn select(condition: Expr, then_value: Expr, else_value: Expr) -> Self {
        assert!(
            condition.ty().element_of().is_bool(),
            "select condition has type {}",
            condition.ty()
        );
        assert_eq!(
            then_value.ty(),
            else_value.ty(),
            "select arms have different types"
        );
        let ty = then_value.ty();
        Self::make(
            ty,
            ExprKind::Select {
                condition,
                then_value,
                else_value,
            },
        )
    }

    pub fn load(ty: Type, buffer: impl Into<String>, index: Expr) -> Self {
        assert!(
            index.ty().is_integer(),
            "load index has type {}",
            index.ty()
        );
        Self::make(
            ty,
            ExprKind::Load {
                buffer: buffer.into(),
                index,
            },
        )
    }

    /// Call an intrinsic; the result type follows from the argument types.
    pub fn intrinsic(kind: Intrinsic, args: impl IntoIterator<Item = Expr>) -> Self {
        let args: ExprVec = args.into_iter().collect();
        let arg_types: SmallVec<[Type; 3]> = args.iter().map(Expr::ty).collect();
        let ty = kind.result_type(&arg_types);
        Self::make(
            ty,
            ExprKind::Call {
                callee: Callee::Intrinsic(kind),
                args,
            },
        )
    }

    pub fn call_extern(
        ty: Type,
        name: impl Into<String>,
        args: impl IntoIterator<Item = Expr>,
    ) -> Self {
        Self::make(
            ty,
            ExprKind::Call {
                callee: Callee::Extern(name.into()),
                args: args.into_iter().collect(),
            },
        )
    }

    /// Address of element `index` of `buffer`.
    pub fn address_of(buffer: impl Into<String>, elem_ty: Type, index: Expr) -> Self {
        let load = Self::load(elem_ty, buffer, index);
        Self::make(
            Type::handle(),
            ExprKind::Call {
                callee: Callee::Builtin(Builtin::AddressOf),
                args: smallvec::smallvec![load],
            },
        )
    }

    pub fn register_destructor(function: impl Into<String>, arg: Expr) -> Self {
        Self::make(
            Type::int(32),
            ExprKind::Call {
                callee: Callee::Builtin(Builtin::RegisterDestructor),
                args: smallvec::smallvec![Self::string(function), arg],
            },
        )
    }

    /// Rebuild a call node with new arguments, keeping its callee.
    pub fn rebuild_call(ty: Type, callee: &Callee, args: ExprVec) -> Self {
        match callee {
            Callee::Intrinsic(kind) => Self::intrinsic(*kind, args),
            _ => Self::make(
                ty,
                ExprKind::Call {
                    callee: callee.clone(),
                    args,
                },
            ),
        }
    }

    /// Convert `value` to `ty`. Returns `value` itself when it already has that type.
    pub fn cast(ty: Type, value: Expr) -> Self {
        if value.ty() == ty {
            return value;
        }
        assert_eq!(
            ty.lanes(),
            value.ty().lanes(),
            "cast of {} to {ty} changes the lane count",
            value.ty()
        );
        Self::make(ty, ExprKind::Cast { value })
    }
}

// =============================================================================
// Inspection
// =============================================================================

impl Expr {
    pub fn ty(&self) -> Type {
        self.0.ty
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Reference identity: true only for the very same node.
    pub fn same_as(&self, other: &Expr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_int(&self) -> Option<i128> {
        match self.kind() {
            ExprKind::IntImm(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_const(&self, value: i128) -> bool {
        self.as_int() == Some(value)
    }

    pub fn is_zero(&self) -> bool {
        self.is_const(0)
    }

    pub fn as_var(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    /// The operands of a binary node with the given operator.
    pub fn as_binary(&self, op: BinaryOp) -> Option<(&Expr, &Expr)> {
        match self.kind() {
            ExprKind::Binary { op: o, lhs, rhs } if *o == op => Some((lhs, rhs)),
            _ => None,
        }
    }

    pub fn as_compare(&self, op: CmpOp) -> Option<(&Expr, &Expr)> {
        match self.kind() {
            ExprKind::Compare { op: o, lhs, rhs } if *o == op => Some((lhs, rhs)),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<(&Expr, &Expr, &Expr)> {
        match self.kind() {
            ExprKind::Select {
                condition,
                then_value,
                else_value,
            } => Some((condition, then_value, else_value)),
            _ => None,
        }
    }

    pub fn as_cast(&self) -> Option<&Expr> {
        match self.kind() {
            ExprKind::Cast { value } => Some(value),
            _ => None,
        }
    }

    pub fn as_intrinsic(&self) -> Option<(Intrinsic, &[Expr])> {
        match self.kind() {
            ExprKind::Call {
                callee: Callee::Intrinsic(kind),
                args,
            } => Some((*kind, args)),
            _ => None,
        }
    }

    /// True if this is a call to the named extern function.
    pub fn is_extern_call(&self, name: &str) -> bool {
        matches!(
            self.kind(),
            ExprKind::Call { callee: Callee::Extern(n), .. } if n == name
        )
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) || *self.0 == *other.0
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// =============================================================================
// Operator sugar
// =============================================================================

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

binary_operator!(Add, add, BinaryOp::Add);
binary_operator!(Sub, sub, BinaryOp::Sub);
binary_operator!(Mul, mul, BinaryOp::Mul);
binary_operator!(Div, div, BinaryOp::Div);
binary_operator!(Rem, rem, BinaryOp::Mod);
binary_operator!(BitAnd, bitand, BinaryOp::And);
binary_operator!(BitOr, bitor, BinaryOp::Or);
binary_operator!(BitXor, bitxor, BinaryOp::Xor);
binary_operator!(Shl, shl, BinaryOp::Shl);
binary_operator!(Shr, shr, BinaryOp::Shr);

impl ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::unary(UnaryOp::Not, self)
    }
}

impl Expr {
    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Lt, self, rhs)
    }

    pub fn le(self, rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Le, self, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Gt, self, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Ge, self, rhs)
    }

    pub fn equal(self, rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Eq, self, rhs)
    }

    pub fn not_equal(self, rhs: Expr) -> Expr {
        Expr::compare(CmpOp::Ne, self, rhs)
    }
}

pub fn min(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Min, a, b)
}

pub fn max(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Max, a, b)
}

pub fn select(condition: Expr, then_value: Expr, else_value: Expr) -> Expr {
    Expr::select(condition, then_value, else_value)
}

pub fn cast(ty: Type, value: Expr) -> Expr {
    Expr::cast(ty, value)
}

/// An integer immediate of the same type as `like`.
pub fn make_const(like: &Expr, value: i128) -> Expr {
    Expr::int(like.ty(), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_wrap_into_type() {
        assert_eq!(Expr::int(Type::uint(8), 300).as_int(), Some(44));
        assert_eq!(Expr::int(Type::int(8), 200).as_int(), Some(-56));
    }

    #[test]
    fn test_structural_equality_and_identity() {
        let a = Expr::var(Type::int(32), "a");
        let x = a.clone() + Expr::i32(1);
        let y = Expr::var(Type::int(32), "a") + Expr::i32(1);
        assert_eq!(x, y);
        assert!(!x.same_as(&y));
        assert!(x.same_as(&x.clone()));
    }

    #[test]
    fn test_cast_to_same_type_is_identity() {
        let a = Expr::var(Type::uint(8), "a");
        assert!(cast(Type::uint(8), a.clone()).same_as(&a));
        assert_eq!(cast(Type::uint(16), a).ty(), Type::uint(16));
    }

    #[test]
    fn test_compare_yields_bool_with_lanes() {
        let a = Expr::var(Type::uint(8).with_lanes(4), "a");
        let b = Expr::var(Type::uint(8).with_lanes(4), "b");
        assert_eq!(a.lt(b).ty(), Type::bool().with_lanes(4));
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn test_binary_type_mismatch_panics() {
        let a = Expr::var(Type::uint(8), "a");
        let b = Expr::var(Type::int(8), "b");
        let _ = a + b;
    }
}
