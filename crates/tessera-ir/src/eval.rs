//! Reference interpreter for scalar IR.
//!
//! Executes a statement against an environment of variable bindings and a set
//! of named buffers. Extern calls are delegated to an [`ExternHandler`], which
//! is how runtimes (the profiler, tests) observe a running pipeline.
//!
//! Vector types are not supported; evaluating one is an error rather than a
//! panic, so a caller can run whatever a pass produced and report the result.

use std::collections::HashMap;
use std::fmt;

use derive_more::Display;
use tracing::trace;

use crate::arith;
use crate::expr::{Builtin, Callee, Expr, ExprKind};
use crate::scope::Scope;
use crate::stmt::{Stmt, StmtKind};
use crate::types::Type;

// =============================================================================
// Errors
// =============================================================================

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Display, Debug)]
#[display("{kind}")]
pub struct ExecError {
    kind: Box<ExecErrorKind>,
}

impl ExecError {
    pub fn kind(&self) -> &ExecErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ExecErrorKind {
        *self.kind
    }

    pub fn extern_failed(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        ExecErrorKind::ExternFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn unsupported(what: impl fmt::Display) -> Self {
        ExecErrorKind::Unsupported(what.to_string()).into()
    }
}

impl From<ExecErrorKind> for ExecError {
    fn from(kind: ExecErrorKind) -> Self {
        ExecError {
            kind: Box::new(kind),
        }
    }
}

impl std::error::Error for ExecError {}

#[derive(Display, Debug)]
pub enum ExecErrorKind {
    #[display("unbound variable `{_0}`")]
    UnboundVariable(String),

    #[display("unknown buffer `{_0}`")]
    UnknownBuffer(String),

    #[display("index {index} out of bounds for `{buffer}` of length {len}")]
    OutOfBounds {
        buffer: String,
        index: i64,
        len: usize,
    },

    /// An `Assert` statement failed; `code` is the evaluated message.
    #[display("assertion failed with code {code}: {message}")]
    AssertionFailed { code: i128, message: Expr },

    #[display("unknown extern function `{_0}`")]
    UnknownExtern(String),

    #[display("extern `{name}` failed: {reason}")]
    ExternFailed { name: String, reason: String },

    #[display("unsupported: {_0}")]
    Unsupported(String),
}

// =============================================================================
// Values and memory
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Str(String),
    Handle(Handle),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handle {
    Null,
    /// Address of an element of an interpreter buffer.
    Buffer { name: String, offset: i64 },
    /// A pointer owned by an extern runtime.
    Opaque(u64),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(h) => Some(h),
            _ => None,
        }
    }

    /// The zero value stored in fresh buffers of `ty`.
    pub fn zero(ty: Type) -> Self {
        if ty.is_float() {
            Value::Float(0.0)
        } else if ty.is_handle() {
            Value::Handle(Handle::Null)
        } else {
            Value::Int(0)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Handle(Handle::Null) => f.write_str("null"),
            Value::Handle(Handle::Buffer { name, offset }) => write!(f, "&{name}[{offset}]"),
            Value::Handle(Handle::Opaque(p)) => write!(f, "{p:#x}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Buffer {
    pub ty: Type,
    pub data: Vec<Value>,
}

impl Buffer {
    pub fn zeroed(ty: Type, len: usize) -> Self {
        Buffer {
            ty,
            data: vec![Value::zero(ty); len],
        }
    }
}

/// Named buffers. A name allocated twice shadows the outer buffer until freed.
#[derive(Debug, Default)]
pub struct Memory {
    buffers: HashMap<String, Vec<Buffer>>,
}

impl Memory {
    pub fn allocate(&mut self, name: impl Into<String>, buffer: Buffer) {
        self.buffers.entry(name.into()).or_default().push(buffer);
    }

    pub fn free(&mut self, name: &str) -> ExecResult<Buffer> {
        let stack = self
            .buffers
            .get_mut(name)
            .ok_or_else(|| ExecErrorKind::UnknownBuffer(name.to_owned()))?;
        let buffer = stack
            .pop()
            .ok_or_else(|| ExecErrorKind::UnknownBuffer(name.to_owned()))?;
        if stack.is_empty() {
            self.buffers.remove(name);
        }
        Ok(buffer)
    }

    /// Number of live buffers under `name`, shadowed ones included.
    pub fn depth(&self, name: &str) -> usize {
        self.buffers.get(name).map_or(0, Vec::len)
    }

    pub fn get(&self, name: &str) -> Option<&Buffer> {
        self.buffers.get(name).and_then(|stack| stack.last())
    }

    fn get_mut(&mut self, name: &str) -> ExecResult<&mut Buffer> {
        self.buffers
            .get_mut(name)
            .and_then(|stack| stack.last_mut())
            .ok_or_else(|| ExecErrorKind::UnknownBuffer(name.to_owned()).into())
    }

    fn slot(len: usize, buffer: &str, index: i64) -> ExecResult<usize> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or_else(|| {
                ExecErrorKind::OutOfBounds {
                    buffer: buffer.to_owned(),
                    index,
                    len,
                }
                .into()
            })
    }

    pub fn load(&self, name: &str, index: i64) -> ExecResult<Value> {
        let buffer = self
            .get(name)
            .ok_or_else(|| ExecErrorKind::UnknownBuffer(name.to_owned()))?;
        let slot = Self::slot(buffer.data.len(), name, index)?;
        Ok(buffer.data[slot].clone())
    }

    pub fn store(&mut self, name: &str, index: i64, value: Value) -> ExecResult<()> {
        let buffer = self.get_mut(name)?;
        let slot = Self::slot(buffer.data.len(), name, index)?;
        buffer.data[slot] = value;
        Ok(())
    }

    /// Read `len` consecutive elements starting at a buffer handle.
    pub fn read(&self, handle: &Handle, len: usize) -> ExecResult<Vec<Value>> {
        let Handle::Buffer { name, offset } = handle else {
            return Err(ExecError::unsupported(format!("read through handle {handle:?}")));
        };
        (0..len as i64)
            .map(|i| self.load(name, offset + i))
            .collect()
    }
}

// =============================================================================
// Extern calls
// =============================================================================

/// Implements the extern functions a pipeline calls.
pub trait ExternHandler {
    fn call_extern(&mut self, name: &str, args: &[Value], memory: &Memory) -> ExecResult<Value>;
}

/// Rejects every extern call.
pub struct NoExterns;

impl ExternHandler for NoExterns {
    fn call_extern(&mut self, name: &str, _args: &[Value], _memory: &Memory) -> ExecResult<Value> {
        Err(ExecErrorKind::UnknownExtern(name.to_owned()).into())
    }
}

// =============================================================================
// Interpreter
// =============================================================================

/// Upper bound on interpreter buffer sizes, in elements.
const MAX_BUFFER_ELEMENTS: i64 = 1 << 26;

pub struct Interpreter<'h> {
    env: Scope<Value>,
    memory: Memory,
    externs: &'h mut dyn ExternHandler,
    destructors: Vec<(String, Value)>,
}

impl<'h> Interpreter<'h> {
    pub fn new(externs: &'h mut dyn ExternHandler) -> Self {
        Interpreter {
            env: Scope::new(),
            memory: Memory::default(),
            externs,
            destructors: Vec::new(),
        }
    }

    /// Bind a free variable of the program being run.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.env.push(name, value);
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Execute `stmt` as a whole pipeline invocation.
    ///
    /// Registered destructors run after the body, in reverse registration
    /// order, whether or not the body failed. A body failure takes precedence
    /// over a destructor failure.
    pub fn run(&mut self, stmt: &Stmt) -> ExecResult<()> {
        let result = self.exec(stmt);
        let cleanup = self.run_destructors();
        result.and(cleanup)
    }

    fn run_destructors(&mut self) -> ExecResult<()> {
        let mut first_error = None;
        while let Some((function, arg)) = self.destructors.pop() {
            trace!(%function, "running destructor");
            if let Err(e) = self.externs.call_extern(&function, &[arg], &self.memory) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn exec(&mut self, stmt: &Stmt) -> ExecResult<()> {
        match stmt.kind() {
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.exec(s)?;
                }
                Ok(())
            }
            StmtKind::LetStmt(op) => {
                let value = self.eval(&op.value)?;
                let mark = self.env.mark();
                self.env.push(op.name.clone(), value);
                let result = self.exec(&op.body);
                self.env.unwind_to(mark);
                result
            }
            StmtKind::Allocate(op) => {
                let mut elements: i64 = 1;
                for extent in &op.extents {
                    let extent = i64::try_from(self.eval_int(extent)?).unwrap_or(i64::MAX);
                    elements = elements.saturating_mul(extent.max(0));
                }
                if self.eval_int(&op.condition)? == 0 {
                    elements = 0;
                }
                if elements > MAX_BUFFER_ELEMENTS {
                    return Err(ExecError::unsupported(format!(
                        "allocation of {elements} elements for `{}`",
                        op.name
                    )));
                }
                let depth = self.memory.depth(&op.name);
                self.memory
                    .allocate(op.name.clone(), Buffer::zeroed(op.ty, elements as usize));
                let result = self.exec(&op.body);
                if self.memory.depth(&op.name) > depth {
                    self.memory.free(&op.name)?;
                }
                result
            }
            StmtKind::Free(op) => self.memory.free(&op.name).map(drop),
            StmtKind::For(op) => {
                let min = self.eval_int(&op.min)?;
                let extent = self.eval_int(&op.extent)?;
                for i in min..min + extent.max(0) {
                    let mark = self.env.mark();
                    self.env.push(op.var.clone(), Value::Int(i));
                    let result = self.exec(&op.body);
                    self.env.unwind_to(mark);
                    result?;
                }
                Ok(())
            }
            StmtKind::ProducerConsumer(op) => {
                self.exec(&op.produce)?;
                if let Some(update) = &op.update {
                    self.exec(update)?;
                }
                self.exec(&op.consume)
            }
            StmtKind::Store(op) => {
                let value = self.eval(&op.value)?;
                let index = self.eval_index(&op.index)?;
                self.memory.store(&op.buffer, index, value)
            }
            StmtKind::Assert(op) => {
                if self.eval_int(&op.condition)? != 0 {
                    return Ok(());
                }
                let code = self.eval_int(&op.message)?;
                Err(ExecErrorKind::AssertionFailed {
                    code,
                    message: op.message.clone(),
                }
                .into())
            }
            StmtKind::Evaluate(op) => self.eval(&op.value).map(drop),
        }
    }

    fn eval_int(&mut self, expr: &Expr) -> ExecResult<i128> {
        match self.eval(expr)? {
            Value::Int(v) => Ok(v),
            other => Err(ExecError::unsupported(format!(
                "expected an integer from {expr}, got {other}"
            ))),
        }
    }

    fn eval_index(&mut self, expr: &Expr) -> ExecResult<i64> {
        let index = self.eval_int(expr)?;
        i64::try_from(index).map_err(|_| ExecError::unsupported(format!("index {index}")))
    }

    fn eval_float(&mut self, expr: &Expr) -> ExecResult<f64> {
        match self.eval(expr)? {
            Value::Float(v) => Ok(v),
            other => Err(ExecError::unsupported(format!(
                "expected a float from {expr}, got {other}"
            ))),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> ExecResult<Value> {
        let ty = expr.ty();
        if !ty.is_scalar() {
            return Err(ExecError::unsupported(format!("vector expression {expr}")));
        }
        match expr.kind() {
            ExprKind::IntImm(v) => Ok(Value::Int(*v)),
            ExprKind::FloatImm(v) => Ok(Value::Float(round_float(ty, *v))),
            ExprKind::StringImm(s) => Ok(Value::Str(s.clone())),
            ExprKind::Var(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ExecErrorKind::UnboundVariable(name.clone()).into()),
            ExprKind::Unary { op, value } => {
                if ty.is_float() {
                    let v = self.eval_float(value)?;
                    return Ok(Value::Float(-v));
                }
                let v = self.eval_int(value)?;
                Ok(Value::Int(arith::unary(*op, ty, v)))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                if ty.is_float() {
                    let a = self.eval_float(lhs)?;
                    let b = self.eval_float(rhs)?;
                    return float_binary(*op, ty, a, b).map(Value::Float);
                }
                let a = self.eval_int(lhs)?;
                let b = self.eval_int(rhs)?;
                Ok(Value::Int(arith::binary(*op, ty, a, b)))
            }
            ExprKind::Compare { op, lhs, rhs } => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                let result = match (&a, &b) {
                    (Value::Int(a), Value::Int(b)) => arith::compare(*op, *a, *b),
                    (Value::Float(a), Value::Float(b)) => {
                        let ordering = a.partial_cmp(b);
                        match op {
                            crate::expr::CmpOp::Eq => a == b,
                            crate::expr::CmpOp::Ne => a != b,
                            _ => ordering.is_some_and(|o| arith::compare(*op, o as i128, 0)),
                        }
                    }
                    _ => match op {
                        crate::expr::CmpOp::Eq => a == b,
                        crate::expr::CmpOp::Ne => a != b,
                        _ => {
                            return Err(ExecError::unsupported(format!(
                                "ordering comparison {expr}"
                            )));
                        }
                    },
                };
                Ok(Value::Int(result.into()))
            }
            ExprKind::Select {
                condition,
                then_value,
                else_value,
            } => {
                if self.eval_int(condition)? != 0 {
                    self.eval(then_value)
                } else {
                    self.eval(else_value)
                }
            }
            ExprKind::Load { buffer, index } => {
                let index = self.eval_index(index)?;
                self.memory.load(buffer, index)
            }
            ExprKind::Call { callee, args } => self.eval_call(expr, callee, args),
            ExprKind::Cast { value } => {
                let v = self.eval(value)?;
                cast_value(ty, v, expr)
            }
        }
    }

    fn eval_call(&mut self, expr: &Expr, callee: &Callee, args: &[Expr]) -> ExecResult<Value> {
        match callee {
            Callee::Intrinsic(kind) => {
                let arg_ty = args[0].ty();
                let values = args
                    .iter()
                    .map(|a| self.eval_int(a))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(Value::Int(arith::intrinsic(*kind, arg_ty, &values)))
            }
            Callee::Extern(name) => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<ExecResult<Vec<_>>>()?;
                trace!(%name, ?values, "extern call");
                self.externs.call_extern(name, &values, &self.memory)
            }
            Callee::Builtin(Builtin::AddressOf) => {
                let Some(ExprKind::Load { buffer, index }) = args.first().map(Expr::kind) else {
                    return Err(ExecError::unsupported(format!("{expr}")));
                };
                if self.memory.get(buffer).is_none() {
                    return Err(ExecErrorKind::UnknownBuffer(buffer.clone()).into());
                }
                let offset = self.eval_index(index)?;
                Ok(Value::Handle(Handle::Buffer {
                    name: buffer.clone(),
                    offset,
                }))
            }
            Callee::Builtin(Builtin::RegisterDestructor) => {
                let function = match args.first().map(Expr::kind) {
                    Some(ExprKind::StringImm(function)) => function.clone(),
                    _ => return Err(ExecError::unsupported(format!("{expr}"))),
                };
                let arg = match args.get(1) {
                    Some(arg) => self.eval(arg)?,
                    None => return Err(ExecError::unsupported(format!("{expr}"))),
                };
                self.destructors.push((function, arg));
                Ok(Value::Int(0))
            }
        }
    }
}

fn round_float(ty: Type, value: f64) -> f64 {
    if ty.bits() == 32 {
        f64::from(value as f32)
    } else {
        value
    }
}

fn float_binary(op: crate::expr::BinaryOp, ty: Type, a: f64, b: f64) -> ExecResult<f64> {
    use crate::expr::BinaryOp;
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a.rem_euclid(b),
        BinaryOp::Min => a.min(b),
        BinaryOp::Max => a.max(b),
        _ => return Err(ExecError::unsupported(format!("float `{}`", op.symbol()))),
    };
    Ok(round_float(ty, v))
}

fn cast_value(ty: Type, value: Value, expr: &Expr) -> ExecResult<Value> {
    match value {
        Value::Int(v) if ty.is_integer() => Ok(Value::Int(ty.wrap(v))),
        Value::Int(v) if ty.is_float() => Ok(Value::Float(round_float(ty, v as f64))),
        Value::Float(v) if ty.is_integer() => Ok(Value::Int(ty.wrap(v as i128))),
        Value::Float(v) if ty.is_float() => Ok(Value::Float(round_float(ty, v))),
        v @ (Value::Handle(_) | Value::Str(_)) if ty.is_handle() => Ok(v),
        other => Err(ExecError::unsupported(format!("{expr} applied to {other}"))),
    }
}

/// Evaluate a closed expression with the given variable bindings.
pub fn eval_expr(expr: &Expr, bindings: &[(&str, Value)]) -> ExecResult<Value> {
    let mut externs = NoExterns;
    let mut interpreter = Interpreter::new(&mut externs);
    for (name, value) in bindings {
        interpreter.bind(*name, value.clone());
    }
    interpreter.eval(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{cast, select};
    use crate::intrinsic::Intrinsic;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(String, Vec<Value>)>,
    }

    impl ExternHandler for Recorder {
        fn call_extern(&mut self, name: &str, args: &[Value], _memory: &Memory) -> ExecResult<Value> {
            self.calls.push((name.to_owned(), args.to_vec()));
            Ok(Value::Int(0))
        }
    }

    #[test]
    fn test_eval_wraps_arithmetic() {
        let a = Expr::var(Type::uint(8), "a");
        let e = a.clone() + Expr::int(Type::uint(8), 100);
        let v = eval_expr(&e, &[("a", Value::Int(200))]).unwrap();
        assert_eq!(v, Value::Int(44));

        let wide = cast(Type::uint(16), a.clone()) + Expr::int(Type::uint(16), 100);
        let v = eval_expr(&wide, &[("a", Value::Int(200))]).unwrap();
        assert_eq!(v, Value::Int(300));
    }

    #[test]
    fn test_eval_intrinsic() {
        let a = Expr::var(Type::int(8), "a");
        let b = Expr::var(Type::int(8), "b");
        let e = Expr::intrinsic(Intrinsic::SaturatingAdd, [a, b]);
        let v = eval_expr(&e, &[("a", Value::Int(100)), ("b", Value::Int(100))]).unwrap();
        assert_eq!(v, Value::Int(127));
    }

    #[test]
    fn test_unbound_variable() {
        let e = Expr::var(Type::int(32), "nope");
        let err = eval_expr(&e, &[]).unwrap_err();
        assert!(matches!(err.kind(), ExecErrorKind::UnboundVariable(n) if n == "nope"));
    }

    #[test]
    fn test_loops_and_buffers() {
        let x = Expr::var(Type::int(32), "x");
        let body = Stmt::store("out", x.clone() * x.clone(), x.clone());
        let program = Stmt::allocate(
            "out",
            Type::int(32),
            vec![Expr::i32(4)],
            Expr::bool(true),
            Stmt::block([
                Stmt::serial("x", Expr::i32(0), Expr::i32(4), body),
                Stmt::evaluate(Expr::call_extern(
                    Type::int(32),
                    "observe",
                    [Expr::load(Type::int(32), "out", Expr::i32(3))],
                )),
            ]),
        );
        let mut recorder = Recorder::default();
        Interpreter::new(&mut recorder).run(&program).unwrap();
        assert_eq!(recorder.calls, vec![("observe".to_owned(), vec![Value::Int(9)])]);
    }

    #[test]
    fn test_out_of_bounds_store() {
        let program = Stmt::allocate(
            "buf",
            Type::uint(8),
            vec![Expr::i32(2)],
            Expr::bool(true),
            Stmt::store("buf", Expr::int(Type::uint(8), 1), Expr::i32(2)),
        );
        let err = Interpreter::new(&mut NoExterns).run(&program).unwrap_err();
        assert!(matches!(err.kind(), ExecErrorKind::OutOfBounds { index: 2, len: 2, .. }));
    }

    #[test]
    fn test_destructors_run_after_failed_assert() {
        let program = Stmt::block([
            Stmt::evaluate(Expr::register_destructor("cleanup", Expr::i32(7))),
            Stmt::assert(Expr::bool(false), Expr::i32(-3)),
            Stmt::evaluate(Expr::call_extern(Type::int(32), "unreachable", [])),
        ]);
        let mut recorder = Recorder::default();
        let err = Interpreter::new(&mut recorder).run(&program).unwrap_err();
        assert!(matches!(err.kind(), ExecErrorKind::AssertionFailed { code: -3, .. }));
        assert_eq!(recorder.calls, vec![("cleanup".to_owned(), vec![Value::Int(7)])]);
    }

    #[test]
    fn test_select_only_evaluates_taken_arm() {
        let e = select(
            Expr::bool(true),
            Expr::i32(1),
            Expr::var(Type::int(32), "unbound"),
        );
        assert_eq!(eval_expr(&e, &[]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_vectors_are_rejected() {
        let v = Expr::var(Type::uint(8).with_lanes(4), "v");
        let err = eval_expr(&v, &[]).unwrap_err();
        assert!(matches!(err.kind(), ExecErrorKind::Unsupported(_)));
    }
}
