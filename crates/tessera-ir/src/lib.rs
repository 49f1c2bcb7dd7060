//! Tessera IR crate.
//!
//! The intermediate representation of lowered pipelines: typed expressions,
//! imperative statements over named buffers, and the traversal machinery that
//! compiler passes are built from.

// === Node definitions ===
pub mod expr;
pub mod intrinsic;
pub mod stmt;
pub mod types;

// === Traversal ===
pub mod mutator;
pub mod scope;
pub mod walk;

// === Evaluation ===
pub mod arith;
pub mod eval;
pub mod simplify;

mod printer;

pub use expr::{BinaryOp, Builtin, Callee, CmpOp, Expr, ExprKind, ExprVec, UnaryOp};
pub use intrinsic::Intrinsic;
pub use mutator::Mutator;
pub use scope::{Scope, ScopeMark};
pub use simplify::simplify;
pub use stmt::{DeviceApi, ForKind, Stmt, StmtKind};
pub use types::{Type, TypeCode};
pub use walk::{IrWalk, WalkAction};

// Re-export smallvec for callers building call argument lists
pub use smallvec;
