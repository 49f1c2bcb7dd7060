//! Statement nodes.
//!
//! Statements share the same ownership model as expressions: immutable nodes
//! behind an `Arc`, compared for identity with [`Stmt::same_as`].

use std::fmt;
use std::sync::Arc;

use crate::expr::Expr;
use crate::types::Type;

#[derive(Clone)]
pub struct Stmt(Arc<StmtKind>);

#[derive(Debug, PartialEq)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    LetStmt(LetStmt),
    Allocate(Allocate),
    Free(Free),
    For(For),
    ProducerConsumer(ProducerConsumer),
    Store(Store),
    Assert(Assert),
    Evaluate(Evaluate),
}

/// Binds `name` to `value` for the duration of `body`.
#[derive(Debug, PartialEq)]
pub struct LetStmt {
    pub name: String,
    pub value: Expr,
    pub body: Stmt,
}

/// A buffer of `ty` elements, one per point of the `extents` box, alive for
/// the duration of `body` when `condition` holds.
#[derive(Debug, PartialEq)]
pub struct Allocate {
    pub name: String,
    pub ty: Type,
    pub extents: Vec<Expr>,
    pub condition: Expr,
    pub body: Stmt,
    /// Custom release function, if the buffer is not freed the default way.
    pub destructor: Option<Expr>,
}

impl Allocate {
    /// Product of the extents, if all of them are constants.
    ///
    /// Returns `None` if any extent is symbolic or the product overflows `i64`.
    pub fn constant_elements(&self) -> Option<i64> {
        self.extents.iter().try_fold(1i64, |acc, extent| {
            let value = i64::try_from(extent.as_int()?).ok()?;
            acc.checked_mul(value)
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct Free {
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForKind {
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
}

impl ForKind {
    pub fn name(self) -> &'static str {
        match self {
            ForKind::Serial => "serial",
            ForKind::Parallel => "parallel",
            ForKind::Vectorized => "vectorized",
            ForKind::Unrolled => "unrolled",
        }
    }
}

/// Where a loop body executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceApi {
    /// Inherit the device of the enclosing code.
    None,
    Host,
    Gpu,
    Hexagon,
    HexagonDma,
}

impl DeviceApi {
    pub fn name(self) -> &'static str {
        match self {
            DeviceApi::None => "none",
            DeviceApi::Host => "host",
            DeviceApi::Gpu => "gpu",
            DeviceApi::Hexagon => "hexagon",
            DeviceApi::HexagonDma => "hexagon_dma",
        }
    }

    pub fn runs_on_host(self) -> bool {
        matches!(self, DeviceApi::None | DeviceApi::Host)
    }
}

#[derive(Debug, PartialEq)]
pub struct For {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
    pub kind: ForKind,
    pub device: DeviceApi,
    pub body: Stmt,
}

impl For {
    /// True when every iteration runs on the thread that entered the loop.
    pub fn runs_on_entering_thread(&self) -> bool {
        self.device.runs_on_host() && self.kind != ForKind::Parallel
    }
}

/// Marks the code that computes a pipeline stage and the code that reads it.
#[derive(Debug, PartialEq)]
pub struct ProducerConsumer {
    pub name: String,
    pub produce: Stmt,
    pub update: Option<Stmt>,
    pub consume: Stmt,
}

#[derive(Debug, PartialEq)]
pub struct Store {
    pub buffer: String,
    pub value: Expr,
    pub index: Expr,
}

/// Fails the pipeline with `message` (an integer code) unless `condition` holds.
#[derive(Debug, PartialEq)]
pub struct Assert {
    pub condition: Expr,
    pub message: Expr,
}

#[derive(Debug, PartialEq)]
pub struct Evaluate {
    pub value: Expr,
}

impl Stmt {
    pub fn from_kind(kind: StmtKind) -> Self {
        Stmt(Arc::new(kind))
    }

    /// Sequence of statements. Nested blocks are flattened and a single
    /// statement is returned as is.
    pub fn block(stmts: impl IntoIterator<Item = Stmt>) -> Self {
        let mut flat = Vec::new();
        for stmt in stmts {
            match stmt.kind() {
                StmtKind::Block(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(stmt),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        Self::from_kind(StmtKind::Block(flat))
    }

    pub fn let_stmt(name: impl Into<String>, value: Expr, body: Stmt) -> Self {
        Self::from_kind(StmtKind::LetStmt(LetStmt {
            name: name.into(),
            value,
            body,
        }))
    }

    pub fn allocate(
        name: impl Into<String>,
        ty: Type,
        extents: Vec<Expr>,
        condition: Expr,
        body: Stmt,
    ) -> Self {
        Self::allocate_with_destructor(name, ty, extents, condition, body, None)
    }

    pub fn allocate_with_destructor(
        name: impl Into<String>,
        ty: Type,
        extents: Vec<Expr>,
        condition: Expr,
        body: Stmt,
        destructor: Option<Expr>,
    ) -> Self {
        for extent in &extents {
            assert!(
                extent.ty().is_integer() && extent.ty().is_scalar(),
                "allocation extent {extent} has type {}",
                extent.ty()
            );
        }
        assert!(
            condition.ty().is_bool(),
            "allocation condition has type {}",
            condition.ty()
        );
        Self::from_kind(StmtKind::Allocate(Allocate {
            name: name.into(),
            ty,
            extents,
            condition,
            body,
            destructor,
        }))
    }

    pub fn free(name: impl Into<String>) -> Self {
        Self::from_kind(StmtKind::Free(Free { name: name.into() }))
    }

    pub fn for_loop(
        var: impl Into<String>,
        min: Expr,
        extent: Expr,
        kind: ForKind,
        device: DeviceApi,
        body: Stmt,
    ) -> Self {
        assert_eq!(min.ty(), extent.ty(), "loop bounds have different types");
        Self::from_kind(StmtKind::For(For {
            var: var.into(),
            min,
            extent,
            kind,
            device,
            body,
        }))
    }

    /// Serial loop on the enclosing device.
    pub fn serial(var: impl Into<String>, min: Expr, extent: Expr, body: Stmt) -> Self {
        Self::for_loop(var, min, extent, ForKind::Serial, DeviceApi::None, body)
    }

    pub fn producer_consumer(
        name: impl Into<String>,
        produce: Stmt,
        update: Option<Stmt>,
        consume: Stmt,
    ) -> Self {
        Self::from_kind(StmtKind::ProducerConsumer(ProducerConsumer {
            name: name.into(),
            produce,
            update,
            consume,
        }))
    }

    pub fn store(buffer: impl Into<String>, value: Expr, index: Expr) -> Self {
        Self::from_kind(StmtKind::Store(Store {
            buffer: buffer.into(),
            value,
            index,
        }))
    }

    pub fn assert(condition: Expr, message: Expr) -> Self {
        assert!(
            condition.ty().is_bool(),
            "assert condition has type {}",
            condition.ty()
        );
        Self::from_kind(StmtKind::Assert(Assert { condition, message }))
    }

    pub fn evaluate(value: Expr) -> Self {
        Self::from_kind(StmtKind::Evaluate(Evaluate { value }))
    }

    /// A statement that does nothing.
    pub fn no_op() -> Self {
        Self::evaluate(Expr::i32(0))
    }

    pub fn kind(&self) -> &StmtKind {
        &self.0
    }

    pub fn same_as(&self, other: &Stmt) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_allocate(&self) -> Option<&Allocate> {
        match self.kind() {
            StmtKind::Allocate(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_let(&self) -> Option<&LetStmt> {
        match self.kind() {
            StmtKind::LetStmt(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&[Stmt]> {
        match self.kind() {
            StmtKind::Block(stmts) => Some(stmts),
            _ => None,
        }
    }
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) || *self.0 == *other.0
    }
}

impl fmt::Debug for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
